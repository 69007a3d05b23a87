use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use sqlx::MySqlPool;

use crate::db::{self, parse_row_timestamp, BehaviorEventRow};

#[derive(Debug, Clone, Serialize)]
pub struct EngagementScore {
  pub total_actions: i64,
  pub unique_days: i64,
  pub avg_daily_actions: f64,
  pub most_common_action: Option<String>,
  pub engagement_level: &'static str,
}

impl Default for EngagementScore {
  fn default() -> EngagementScore {
    EngagementScore {
      total_actions: 0,
      unique_days: 0,
      avg_daily_actions: 0.0,
      most_common_action: None,
      engagement_level: "low",
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct BehaviorSummary {
  pub favorite_content_types: Vec<(String, i64)>,
  pub peak_hours: BTreeMap<u32, i64>,
  pub time_preference: &'static str,
}

impl Default for BehaviorSummary {
  fn default() -> BehaviorSummary {
    BehaviorSummary {
      favorite_content_types: Vec::new(),
      peak_hours: BTreeMap::new(),
      time_preference: compute_time_preference(&BTreeMap::new()),
    }
  }
}

/// Frequency ranking with a deterministic tie-break: counting preserves the
/// first occurrence order of the input stream (newest-first as fetched), and
/// the sort is stable, so equal counts keep first-seen order.
pub(crate) fn ranked_counts<'a, I>(keys: I) -> Vec<(String, i64)>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut order: Vec<&str> = Vec::new();
  let mut counts: HashMap<&str, i64> = HashMap::new();

  for key in keys {
    let entry = counts.entry(key).or_insert(0);
    if *entry == 0 {
      order.push(key);
    }
    *entry += 1;
  }

  let mut out: Vec<(String, i64)> = order
    .into_iter()
    .map(|key| (key.to_string(), counts[key]))
    .collect();
  out.sort_by(|a, b| b.1.cmp(&a.1));
  out
}

fn round_one_decimal(value: f64) -> f64 {
  (value * 10.0).round() / 10.0
}

fn engagement_level_for(avg_daily_actions: f64) -> &'static str {
  if avg_daily_actions >= 10.0 {
    "high"
  } else if avg_daily_actions >= 3.0 {
    "medium"
  } else {
    "low"
  }
}

pub fn compute_engagement(rows: &[BehaviorEventRow]) -> EngagementScore {
  let total_actions = rows.len() as i64;

  let mut active_days: HashSet<NaiveDate> = HashSet::new();
  for row in rows {
    let Some(ts) = parse_row_timestamp(&row.created_at) else {
      continue;
    };
    active_days.insert(ts.date());
  }

  let unique_days = active_days.len() as i64;
  let avg_daily_actions = if unique_days > 0 {
    round_one_decimal(total_actions as f64 / unique_days as f64)
  } else {
    0.0
  };

  let most_common_action = ranked_counts(rows.iter().map(|r| r.action_type.as_str()))
    .into_iter()
    .next()
    .map(|(action, _)| action);

  EngagementScore {
    total_actions,
    unique_days,
    avg_daily_actions,
    most_common_action,
    engagement_level: engagement_level_for(avg_daily_actions),
  }
}

pub fn compute_favorite_content_types(rows: &[BehaviorEventRow]) -> Vec<(String, i64)> {
  ranked_counts(
    rows
      .iter()
      .filter_map(|r| r.content_type.as_deref())
      .filter(|t| !t.is_empty()),
  )
}

pub fn compute_peak_hours(rows: &[BehaviorEventRow]) -> BTreeMap<u32, i64> {
  let mut hours: BTreeMap<u32, i64> = BTreeMap::new();
  for row in rows {
    let Some(ts) = parse_row_timestamp(&row.created_at) else {
      continue;
    };
    *hours.entry(ts.hour()).or_insert(0) += 1;
  }
  hours
}

fn time_bracket(hour: u32) -> usize {
  match hour {
    5..=11 => 0,  // morning
    12..=16 => 1, // afternoon
    17..=21 => 2, // evening
    _ => 3,       // night (22-4)
  }
}

const TIME_BRACKETS: [&str; 4] = ["morning", "afternoon", "evening", "night"];

/// Picks the bracket with the strictly highest activity; any tie for the
/// maximum (including the no-data case) resolves to "evening".
pub fn compute_time_preference(peak_hours: &BTreeMap<u32, i64>) -> &'static str {
  let mut sums = [0i64; 4];
  for (&hour, &count) in peak_hours {
    sums[time_bracket(hour)] += count;
  }

  let max = sums.iter().copied().max().unwrap_or(0);
  let winners = sums.iter().filter(|&&sum| sum == max).count();
  if winners != 1 {
    return "evening";
  }

  let index = sums.iter().position(|&sum| sum == max).unwrap_or(2);
  TIME_BRACKETS[index]
}

pub fn compute_behavior_summary(rows: &[BehaviorEventRow]) -> BehaviorSummary {
  let peak_hours = compute_peak_hours(rows);
  let time_preference = compute_time_preference(&peak_hours);

  BehaviorSummary {
    favorite_content_types: compute_favorite_content_types(rows),
    peak_hours,
    time_preference,
  }
}

/// Engagement summary over the trailing window. A store failure degrades to
/// the zero-valued summary; callers cannot tell it apart from "no data".
pub async fn engagement_score(
  pool: &MySqlPool,
  user_id: &str,
  days: i64,
  now: DateTime<Utc>,
) -> EngagementScore {
  match db::fetch_behavior_events_since(pool, user_id, now - Duration::days(days)).await {
    Ok(rows) => compute_engagement(&rows),
    Err(err) => {
      eprintln!("behavior_engine: engagement_score fetch failed for user {user_id}: {err}");
      EngagementScore::default()
    }
  }
}

pub async fn behavior_summary(
  pool: &MySqlPool,
  user_id: &str,
  days: i64,
  now: DateTime<Utc>,
) -> BehaviorSummary {
  match db::fetch_behavior_events_since(pool, user_id, now - Duration::days(days)).await {
    Ok(rows) => compute_behavior_summary(&rows),
    Err(err) => {
      eprintln!("behavior_engine: behavior_summary fetch failed for user {user_id}: {err}");
      BehaviorSummary::default()
    }
  }
}

/// Appends one event to the behavior log. Returns false (and logs) on store
/// failure instead of surfacing the error.
pub async fn track_behavior(
  pool: &MySqlPool,
  user_id: &str,
  action_type: &str,
  content_id: Option<&str>,
  content_type: Option<&str>,
  metadata_json: Option<&str>,
) -> bool {
  match db::insert_behavior_event(pool, user_id, action_type, content_id, content_type, metadata_json)
    .await
  {
    Ok(()) => true,
    Err(err) => {
      eprintln!("behavior_engine: track_behavior insert failed for user {user_id}: {err}");
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(action_type: &str, content_type: Option<&str>, created_at: &str) -> BehaviorEventRow {
    BehaviorEventRow {
      action_type: action_type.to_string(),
      content_id: None,
      content_type: content_type.map(|t| t.to_string()),
      metadata_json: None,
      created_at: created_at.to_string(),
    }
  }

  #[test]
  fn engagement_over_empty_log_is_the_zero_summary() {
    let score = compute_engagement(&[]);
    assert_eq!(score.total_actions, 0);
    assert_eq!(score.unique_days, 0);
    assert_eq!(score.avg_daily_actions, 0.0);
    assert_eq!(score.most_common_action, None);
    assert_eq!(score.engagement_level, "low");
  }

  #[test]
  fn engagement_averages_over_distinct_days() {
    // 5 + 10 + 15 actions spread over three days.
    let mut rows = Vec::new();
    for i in 0..5 {
      rows.push(row("view", None, &format!("2026-08-01 09:{i:02}:00")));
    }
    for i in 0..10 {
      rows.push(row("view", None, &format!("2026-08-02 12:{i:02}:00")));
    }
    for i in 0..15 {
      rows.push(row("save", None, &format!("2026-08-03 20:{i:02}:00")));
    }

    let score = compute_engagement(&rows);
    assert_eq!(score.total_actions, 30);
    assert_eq!(score.unique_days, 3);
    assert_eq!(score.avg_daily_actions, 10.0);
    assert_eq!(score.engagement_level, "high");
  }

  #[test]
  fn engagement_level_thresholds() {
    assert_eq!(engagement_level_for(10.0), "high");
    assert_eq!(engagement_level_for(9.9), "medium");
    assert_eq!(engagement_level_for(3.0), "medium");
    assert_eq!(engagement_level_for(2.9), "low");
  }

  #[test]
  fn malformed_timestamps_are_skipped_not_fatal() {
    let rows = vec![
      row("view", None, "2026-08-01 09:00:00"),
      row("view", None, "garbage"),
      row("view", None, "2026-08-01 10:00:00"),
    ];

    let score = compute_engagement(&rows);
    // The malformed row still counts as an action but contributes no day.
    assert_eq!(score.total_actions, 3);
    assert_eq!(score.unique_days, 1);
  }

  #[test]
  fn most_common_action_breaks_ties_by_first_seen_order() {
    let rows = vec![
      row("save", None, "2026-08-03 10:00:00"),
      row("view", None, "2026-08-02 10:00:00"),
      row("save", None, "2026-08-02 09:00:00"),
      row("view", None, "2026-08-01 10:00:00"),
    ];

    // Both reach 2; "save" appears first in the fetched ordering.
    let score = compute_engagement(&rows);
    assert_eq!(score.most_common_action.as_deref(), Some("save"));
  }

  #[test]
  fn favorite_content_types_rank_descending_with_stable_ties() {
    let mut rows = Vec::new();
    for _ in 0..5 {
      rows.push(row("view", Some("movie"), "2026-08-01 10:00:00"));
    }
    for _ in 0..5 {
      rows.push(row("view", Some("tv"), "2026-08-01 11:00:00"));
    }
    rows.push(row("view", Some("podcast"), "2026-08-01 12:00:00"));
    rows.push(row("view", Some("podcast"), "2026-08-01 13:00:00"));

    let ranked = compute_favorite_content_types(&rows);
    assert_eq!(
      ranked,
      vec![
        ("movie".to_string(), 5),
        ("tv".to_string(), 5),
        ("podcast".to_string(), 2),
      ]
    );
  }

  #[test]
  fn peak_hours_bucket_by_hour_of_day() {
    let rows = vec![
      row("view", None, "2026-08-01 09:15:00"),
      row("view", None, "2026-08-02 09:45:00"),
      row("view", None, "2026-08-02 22:00:00"),
    ];

    let hours = compute_peak_hours(&rows);
    assert_eq!(hours.get(&9), Some(&2));
    assert_eq!(hours.get(&22), Some(&1));
    assert_eq!(hours.get(&10), None);
  }

  #[test]
  fn time_preference_picks_the_busiest_bracket() {
    let mut hours = BTreeMap::new();
    hours.insert(6, 4i64);
    hours.insert(13, 1);
    assert_eq!(compute_time_preference(&hours), "morning");

    let mut night = BTreeMap::new();
    night.insert(23, 2i64);
    night.insert(2, 3);
    assert_eq!(compute_time_preference(&night), "night");
  }

  #[test]
  fn time_preference_ties_default_to_evening() {
    let mut hours = BTreeMap::new();
    hours.insert(8, 3i64);
    hours.insert(14, 3);
    assert_eq!(compute_time_preference(&hours), "evening");

    assert_eq!(compute_time_preference(&BTreeMap::new()), "evening");
  }

  #[test]
  fn behavior_summary_without_events_still_defaults_to_evening() {
    let summary = compute_behavior_summary(&[]);
    assert!(summary.favorite_content_types.is_empty());
    assert!(summary.peak_hours.is_empty());
    assert_eq!(summary.time_preference, "evening");
  }
}
