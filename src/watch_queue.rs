use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;

use crate::db::{self, QueueItemRow};

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_WATCHING: &str = "watching";
pub const STATUS_WATCHED: &str = "watched";

pub fn is_valid_status(status: &str) -> bool {
  matches!(status, STATUS_QUEUED | STATUS_WATCHING | STATUS_WATCHED)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
  pub total: i64,
  pub queued: i64,
  pub watching: i64,
  pub watched: i64,
  pub by_type: BTreeMap<String, i64>,
}

pub fn compute_queue_stats(rows: &[QueueItemRow]) -> QueueStats {
  let mut stats = QueueStats {
    total: rows.len() as i64,
    ..QueueStats::default()
  };

  for row in rows {
    match row.status.as_str() {
      STATUS_QUEUED => stats.queued += 1,
      STATUS_WATCHING => stats.watching += 1,
      STATUS_WATCHED => stats.watched += 1,
      _ => {}
    }
    *stats.by_type.entry(row.content_type.clone()).or_insert(0) += 1;
  }

  stats
}

/// Idempotent insert keyed on (user, content, type). Returns false when the
/// item is already queued; a store failure also reports false after logging.
pub async fn add_to_queue(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
  title: &str,
  poster_path: Option<&str>,
  mood_when_saved: Option<&str>,
) -> bool {
  match db::insert_queue_item(
    pool,
    user_id,
    content_id,
    content_type,
    title,
    poster_path,
    mood_when_saved,
  )
  .await
  {
    Ok(added) => added,
    Err(err) => {
      eprintln!("watch_queue: add_to_queue insert failed for user {user_id}: {err}");
      false
    }
  }
}

/// Moves an item through queued → watching → watched. `watched_at` is set
/// only when the new status is watched, cleared otherwise.
pub async fn update_status(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
  status: &str,
  now: DateTime<Utc>,
) -> bool {
  if !is_valid_status(status) {
    return false;
  }

  let watched_at = (status == STATUS_WATCHED).then_some(now);
  match db::update_queue_item_status(pool, user_id, content_id, content_type, status, watched_at)
    .await
  {
    Ok(updated) => updated,
    Err(err) => {
      eprintln!("watch_queue: update_status failed for user {user_id}: {err}");
      false
    }
  }
}

/// Removes an item outright. False when nothing matched or on failure.
pub async fn remove_from_queue(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
) -> bool {
  match db::delete_queue_item(pool, user_id, content_id, content_type).await {
    Ok(removed) => removed,
    Err(err) => {
      eprintln!("watch_queue: remove_from_queue failed for user {user_id}: {err}");
      false
    }
  }
}

/// Newest-first listing, optionally filtered by status; empty on failure.
pub async fn get_queue(pool: &MySqlPool, user_id: &str, status: Option<&str>) -> Vec<QueueItemRow> {
  match db::fetch_queue_items(pool, user_id, status).await {
    Ok(rows) => rows,
    Err(err) => {
      eprintln!("watch_queue: get_queue fetch failed for user {user_id}: {err}");
      Vec::new()
    }
  }
}

pub async fn get_queue_stats(pool: &MySqlPool, user_id: &str) -> QueueStats {
  match db::fetch_queue_items(pool, user_id, None).await {
    Ok(rows) => compute_queue_stats(&rows),
    Err(err) => {
      eprintln!("watch_queue: get_queue_stats fetch failed for user {user_id}: {err}");
      QueueStats::default()
    }
  }
}
