use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use sqlx::MySqlPool;

use crate::behavior_engine::ranked_counts;
use crate::db::{self, parse_row_timestamp, MoodEventRow};

const TOP_MOODS_LIMIT: usize = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MoodPatterns {
  pub top_current: Vec<(String, i64)>,
  pub top_desired: Vec<(String, i64)>,
  pub common_transitions: Vec<(String, i64)>,
  pub mood_by_hour: BTreeMap<u32, i64>,
  pub total_entries: i64,
}

pub fn compute_mood_patterns(rows: &[MoodEventRow]) -> MoodPatterns {
  let mut top_current = ranked_counts(
    rows
      .iter()
      .map(|r| r.current_feeling.as_str())
      .filter(|f| !f.is_empty()),
  );
  top_current.truncate(TOP_MOODS_LIMIT);

  let mut top_desired = ranked_counts(
    rows
      .iter()
      .map(|r| r.desired_feeling.as_str())
      .filter(|f| !f.is_empty()),
  );
  top_desired.truncate(TOP_MOODS_LIMIT);

  // Transition pairs where either side is absent are excluded.
  let pairs: Vec<String> = rows
    .iter()
    .filter(|r| !r.current_feeling.is_empty() && !r.desired_feeling.is_empty())
    .map(|r| format!("{} → {}", r.current_feeling, r.desired_feeling))
    .collect();
  let mut common_transitions = ranked_counts(pairs.iter().map(|p| p.as_str()));
  common_transitions.truncate(TOP_MOODS_LIMIT);

  let mut mood_by_hour: BTreeMap<u32, i64> = BTreeMap::new();
  for row in rows {
    let Some(ts) = parse_row_timestamp(&row.created_at) else {
      continue;
    };
    *mood_by_hour.entry(ts.hour()).or_insert(0) += 1;
  }

  MoodPatterns {
    top_current,
    top_desired,
    common_transitions,
    mood_by_hour,
    total_entries: rows.len() as i64,
  }
}

/// Consecutive days with at least one mood entry, walking backward from
/// today. A day without an entry ends the walk; no entry today means 0.
pub fn compute_streak(entry_days: &[NaiveDate], today: NaiveDate) -> i64 {
  let days: HashSet<NaiveDate> = entry_days.iter().copied().collect();

  let mut streak = 0;
  let mut cursor = today;
  while days.contains(&cursor) {
    streak += 1;
    let Some(prev) = cursor.pred_opt() else {
      break;
    };
    cursor = prev;
  }

  streak
}

/// Mood pattern summary over the trailing window; empty on store failure.
pub async fn mood_patterns(
  pool: &MySqlPool,
  user_id: &str,
  days: i64,
  now: DateTime<Utc>,
) -> MoodPatterns {
  match db::fetch_mood_events_since(pool, user_id, now - Duration::days(days)).await {
    Ok(rows) => compute_mood_patterns(&rows),
    Err(err) => {
      eprintln!("mood_engine: mood_patterns fetch failed for user {user_id}: {err}");
      MoodPatterns::default()
    }
  }
}

/// Day-streak count ending today; 0 on store failure.
pub async fn mood_streak(pool: &MySqlPool, user_id: &str, now: DateTime<Utc>) -> i64 {
  match db::fetch_mood_entry_days(pool, user_id, 400).await {
    Ok(days) => compute_streak(&days, now.date_naive()),
    Err(err) => {
      eprintln!("mood_engine: mood_streak fetch failed for user {user_id}: {err}");
      0
    }
  }
}

/// Appends one mood selection to the log. Returns false (and logs) on store
/// failure instead of surfacing the error.
pub async fn track_mood(
  pool: &MySqlPool,
  user_id: &str,
  current_feeling: &str,
  desired_feeling: &str,
  source: &str,
) -> bool {
  match db::insert_mood_event(pool, user_id, current_feeling, desired_feeling, source).await {
    Ok(()) => true,
    Err(err) => {
      eprintln!("mood_engine: track_mood insert failed for user {user_id}: {err}");
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(current: &str, desired: &str, created_at: &str) -> MoodEventRow {
    MoodEventRow {
      current_feeling: current.to_string(),
      desired_feeling: desired.to_string(),
      created_at: created_at.to_string(),
    }
  }

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn patterns_over_empty_log_are_empty() {
    let patterns = compute_mood_patterns(&[]);
    assert!(patterns.top_current.is_empty());
    assert!(patterns.top_desired.is_empty());
    assert!(patterns.common_transitions.is_empty());
    assert!(patterns.mood_by_hour.is_empty());
    assert_eq!(patterns.total_entries, 0);
  }

  #[test]
  fn patterns_rank_moods_and_transitions_by_frequency() {
    let rows = vec![
      row("sad", "happy", "2026-08-01 21:00:00"),
      row("sad", "happy", "2026-08-02 21:30:00"),
      row("bored", "excited", "2026-08-03 09:00:00"),
      row("sad", "calm", "2026-08-04 21:00:00"),
    ];

    let patterns = compute_mood_patterns(&rows);
    assert_eq!(patterns.total_entries, 4);
    assert_eq!(patterns.top_current[0], ("sad".to_string(), 3));
    assert_eq!(patterns.top_desired[0], ("happy".to_string(), 2));
    assert_eq!(patterns.common_transitions[0], ("sad → happy".to_string(), 2));
    assert_eq!(patterns.mood_by_hour.get(&21), Some(&3));
  }

  #[test]
  fn transitions_with_an_absent_side_are_excluded() {
    let rows = vec![
      row("sad", "", "2026-08-01 10:00:00"),
      row("", "happy", "2026-08-01 11:00:00"),
      row("sad", "happy", "2026-08-01 12:00:00"),
    ];

    let patterns = compute_mood_patterns(&rows);
    assert_eq!(patterns.common_transitions.len(), 1);
    assert_eq!(patterns.common_transitions[0].0, "sad → happy");
  }

  #[test]
  fn top_lists_are_capped_at_five() {
    let rows: Vec<MoodEventRow> = (0..8)
      .map(|i| row(&format!("mood{i}"), "happy", "2026-08-01 10:00:00"))
      .collect();

    let patterns = compute_mood_patterns(&rows);
    assert_eq!(patterns.top_current.len(), 5);
  }

  #[test]
  fn tied_moods_keep_first_seen_order() {
    let rows = vec![
      row("tired", "rested", "2026-08-02 22:00:00"),
      row("anxious", "calm", "2026-08-02 08:00:00"),
      row("tired", "rested", "2026-08-01 22:00:00"),
      row("anxious", "calm", "2026-08-01 08:00:00"),
    ];

    let patterns = compute_mood_patterns(&rows);
    assert_eq!(patterns.top_current[0].0, "tired");
    assert_eq!(patterns.top_current[1].0, "anxious");
  }

  #[test]
  fn streak_counts_back_from_today_until_the_first_gap() {
    let today = day(2026, 8, 6);
    // Entries today, yesterday, and three days ago (gap on day minus two).
    let entry_days = vec![day(2026, 8, 6), day(2026, 8, 5), day(2026, 8, 3)];
    assert_eq!(compute_streak(&entry_days, today), 2);
  }

  #[test]
  fn streak_is_zero_without_an_entry_today() {
    let today = day(2026, 8, 6);
    let entry_days = vec![day(2026, 8, 5), day(2026, 8, 4)];
    assert_eq!(compute_streak(&entry_days, today), 0);
    assert_eq!(compute_streak(&[], today), 0);
  }
}
