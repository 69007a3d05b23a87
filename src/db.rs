use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use tokio::sync::OnceCell;
use vercel_runtime::Error;

static POOL: OnceCell<MySqlPool> = OnceCell::const_new();

#[derive(Debug, Clone, Default)]
pub struct DailyUsageRow {
  pub recommendations_count: i64,
  pub mr_dp_chats_count: i64,
  pub quick_dope_hits_count: i64,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRow {
  pub plan_type: String,
  pub status: String,
}

#[derive(Debug, Clone)]
pub struct BehaviorEventRow {
  pub action_type: String,
  pub content_id: Option<String>,
  pub content_type: Option<String>,
  pub metadata_json: Option<String>,
  pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct MoodEventRow {
  pub current_feeling: String,
  pub desired_feeling: String,
  pub created_at: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueItemRow {
  pub content_id: String,
  pub content_type: String,
  pub title: String,
  pub poster_path: Option<String>,
  pub mood_when_saved: Option<String>,
  pub status: String,
  pub added_at: String,
  pub watched_at: Option<String>,
}

/// Event timestamps come back from the store as plain strings; rows whose
/// value does not parse are skipped by the aggregators rather than aborting
/// the whole computation.
pub fn parse_row_timestamp(raw: &str) -> Option<NaiveDateTime> {
  let trimmed = raw.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
    return Some(dt.naive_utc());
  }
  for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
      return Some(dt);
    }
  }
  None
}

async fn ensure_schema(pool: &MySqlPool) -> Result<(), Error> {
  // Keep schema creation idempotent; avoids footguns in early MVP.
  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS daily_usage (
        user_id VARCHAR(128) NOT NULL,
        day_key DATE NOT NULL,
        recommendations_count INT NOT NULL DEFAULT 0,
        mr_dp_chats_count INT NOT NULL DEFAULT 0,
        quick_dope_hits_count INT NOT NULL DEFAULT 0,
        created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3),
        PRIMARY KEY (user_id, day_key)
      );
    "#,
  )
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS user_behavior (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        user_id VARCHAR(128) NOT NULL,
        action_type VARCHAR(64) NOT NULL,
        content_id VARCHAR(128) NULL,
        content_type VARCHAR(32) NULL,
        metadata_json TEXT NULL,
        created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        KEY idx_user_behavior_day (user_id, created_at),
        KEY idx_user_behavior_action (user_id, action_type)
      );
    "#,
  )
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS mood_history (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        user_id VARCHAR(128) NOT NULL,
        current_feeling VARCHAR(64) NOT NULL,
        desired_feeling VARCHAR(64) NOT NULL,
        source VARCHAR(32) NOT NULL DEFAULT 'manual',
        created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        KEY idx_mood_history_day (user_id, created_at)
      );
    "#,
  )
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS watch_queue (
        id BIGINT PRIMARY KEY AUTO_INCREMENT,
        user_id VARCHAR(128) NOT NULL,
        content_id VARCHAR(128) NOT NULL,
        content_type VARCHAR(32) NOT NULL,
        title VARCHAR(255) NOT NULL,
        poster_path VARCHAR(255) NULL,
        mood_when_saved VARCHAR(64) NULL,
        status VARCHAR(16) NOT NULL DEFAULT 'queued',
        added_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        watched_at TIMESTAMP(3) NULL,
        UNIQUE KEY uq_watch_queue_item (user_id, content_id, content_type),
        KEY idx_watch_queue_status (user_id, status)
      );
    "#,
  )
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  sqlx::query(
    r#"
      CREATE TABLE IF NOT EXISTS subscriptions (
        user_id VARCHAR(128) PRIMARY KEY,
        plan_type VARCHAR(32) NOT NULL DEFAULT 'free',
        status VARCHAR(16) NOT NULL,
        current_period_end TIMESTAMP(3) NULL,
        created_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
        updated_at TIMESTAMP(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3) ON UPDATE CURRENT_TIMESTAMP(3),
        KEY idx_subscriptions_status (status, updated_at)
      );
    "#,
  )
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(())
}

pub async fn get_pool() -> Result<&'static MySqlPool, Error> {
  POOL
    .get_or_try_init(|| async {
      let url = std::env::var("TIDB_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| -> Error {
          Box::new(std::io::Error::other(
            "Missing TIDB_DATABASE_URL (or DATABASE_URL)",
          ))
        })?;

      let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await
        .map_err(|e| -> Error { Box::new(e) })?;

      ensure_schema(&pool).await?;
      Ok::<_, Error>(pool)
    })
    .await
}

pub async fn fetch_subscription(
  pool: &MySqlPool,
  user_id: &str,
) -> Result<Option<SubscriptionRow>, Error> {
  let row = sqlx::query_as::<_, (String, String)>(
    r#"
      SELECT plan_type, status
      FROM subscriptions
      WHERE user_id = ?
      LIMIT 1;
    "#,
  )
  .bind(user_id)
  .fetch_optional(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(row.map(|(plan_type, status)| SubscriptionRow { plan_type, status }))
}

pub async fn ensure_daily_usage_row(
  pool: &MySqlPool,
  user_id: &str,
  day: NaiveDate,
) -> Result<(), Error> {
  sqlx::query(
    r#"
      INSERT INTO daily_usage (user_id, day_key, recommendations_count, mr_dp_chats_count, quick_dope_hits_count)
      VALUES (?, ?, 0, 0, 0)
      ON DUPLICATE KEY UPDATE user_id = user_id;
    "#,
  )
  .bind(user_id)
  .bind(day)
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(())
}

pub async fn fetch_daily_usage(
  pool: &MySqlPool,
  user_id: &str,
  day: NaiveDate,
) -> Result<Option<DailyUsageRow>, Error> {
  let row = sqlx::query_as::<_, (i64, i64, i64)>(
    r#"
      SELECT
        CAST(recommendations_count AS SIGNED),
        CAST(mr_dp_chats_count AS SIGNED),
        CAST(quick_dope_hits_count AS SIGNED)
      FROM daily_usage
      WHERE user_id = ? AND day_key = ?
      LIMIT 1;
    "#,
  )
  .bind(user_id)
  .bind(day)
  .fetch_optional(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(row.map(
    |(recommendations_count, mr_dp_chats_count, quick_dope_hits_count)| DailyUsageRow {
      recommendations_count,
      mr_dp_chats_count,
      quick_dope_hits_count,
    },
  ))
}

pub async fn update_daily_usage_count(
  pool: &MySqlPool,
  user_id: &str,
  day: NaiveDate,
  counter_column: &'static str,
  count: i64,
) -> Result<(), Error> {
  // counter_column is one of the three fixed feature columns, never user input.
  let sql = format!(
    r#"
      UPDATE daily_usage
      SET {counter_column} = ?
      WHERE user_id = ? AND day_key = ?;
    "#
  );

  sqlx::query(&sql)
    .bind(count)
    .bind(user_id)
    .bind(day)
    .execute(pool)
    .await
    .map_err(|e| -> Error { Box::new(e) })?;

  Ok(())
}

pub async fn insert_behavior_event(
  pool: &MySqlPool,
  user_id: &str,
  action_type: &str,
  content_id: Option<&str>,
  content_type: Option<&str>,
  metadata_json: Option<&str>,
) -> Result<(), Error> {
  sqlx::query(
    r#"
      INSERT INTO user_behavior
        (user_id, action_type, content_id, content_type, metadata_json)
      VALUES
        (?, ?, ?, ?, ?);
    "#,
  )
  .bind(user_id)
  .bind(action_type)
  .bind(content_id)
  .bind(content_type)
  .bind(metadata_json)
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(())
}

pub async fn fetch_behavior_events_since(
  pool: &MySqlPool,
  user_id: &str,
  since: DateTime<Utc>,
) -> Result<Vec<BehaviorEventRow>, Error> {
  let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>, String)>(
    r#"
      SELECT action_type, content_id, content_type, metadata_json, CAST(created_at AS CHAR)
      FROM user_behavior
      WHERE user_id = ? AND created_at >= ?
      ORDER BY created_at DESC;
    "#,
  )
  .bind(user_id)
  .bind(since)
  .fetch_all(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(
    rows
      .into_iter()
      .map(
        |(action_type, content_id, content_type, metadata_json, created_at)| BehaviorEventRow {
          action_type,
          content_id,
          content_type,
          metadata_json,
          created_at,
        },
      )
      .collect(),
  )
}

pub async fn insert_mood_event(
  pool: &MySqlPool,
  user_id: &str,
  current_feeling: &str,
  desired_feeling: &str,
  source: &str,
) -> Result<(), Error> {
  sqlx::query(
    r#"
      INSERT INTO mood_history
        (user_id, current_feeling, desired_feeling, source)
      VALUES
        (?, ?, ?, ?);
    "#,
  )
  .bind(user_id)
  .bind(current_feeling)
  .bind(desired_feeling)
  .bind(source)
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(())
}

pub async fn fetch_mood_events_since(
  pool: &MySqlPool,
  user_id: &str,
  since: DateTime<Utc>,
) -> Result<Vec<MoodEventRow>, Error> {
  let rows = sqlx::query_as::<_, (String, String, String)>(
    r#"
      SELECT current_feeling, desired_feeling, CAST(created_at AS CHAR)
      FROM mood_history
      WHERE user_id = ? AND created_at >= ?
      ORDER BY created_at DESC;
    "#,
  )
  .bind(user_id)
  .bind(since)
  .fetch_all(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(
    rows
      .into_iter()
      .map(|(current_feeling, desired_feeling, created_at)| MoodEventRow {
        current_feeling,
        desired_feeling,
        created_at,
      })
      .collect(),
  )
}

pub async fn fetch_mood_entry_days(
  pool: &MySqlPool,
  user_id: &str,
  limit: i64,
) -> Result<Vec<NaiveDate>, Error> {
  let limit = limit.clamp(1, 400);
  let rows = sqlx::query_as::<_, (NaiveDate,)>(
    r#"
      SELECT DISTINCT DATE(created_at) AS entry_day
      FROM mood_history
      WHERE user_id = ?
      ORDER BY entry_day DESC
      LIMIT ?;
    "#,
  )
  .bind(user_id)
  .bind(limit)
  .fetch_all(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(rows.into_iter().map(|(day,)| day).collect())
}

pub async fn insert_queue_item(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
  title: &str,
  poster_path: Option<&str>,
  mood_when_saved: Option<&str>,
) -> Result<bool, Error> {
  let insert_result = sqlx::query(
    r#"
      INSERT INTO watch_queue
        (user_id, content_id, content_type, title, poster_path, mood_when_saved, status)
      VALUES
        (?, ?, ?, ?, ?, ?, 'queued');
    "#,
  )
  .bind(user_id)
  .bind(content_id)
  .bind(content_type)
  .bind(title)
  .bind(poster_path)
  .bind(mood_when_saved)
  .execute(pool)
  .await;

  match insert_result {
    Ok(_) => Ok(true),
    Err(err) => {
      if err.as_database_error().is_some_and(|e| e.is_unique_violation()) {
        return Ok(false);
      }
      Err(Box::new(err))
    }
  }
}

pub async fn update_queue_item_status(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
  status: &str,
  watched_at: Option<DateTime<Utc>>,
) -> Result<bool, Error> {
  let result = sqlx::query(
    r#"
      UPDATE watch_queue
      SET status = ?, watched_at = ?
      WHERE user_id = ? AND content_id = ? AND content_type = ?;
    "#,
  )
  .bind(status)
  .bind(watched_at)
  .bind(user_id)
  .bind(content_id)
  .bind(content_type)
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(result.rows_affected() > 0)
}

pub async fn delete_queue_item(
  pool: &MySqlPool,
  user_id: &str,
  content_id: &str,
  content_type: &str,
) -> Result<bool, Error> {
  let result = sqlx::query(
    r#"
      DELETE FROM watch_queue
      WHERE user_id = ? AND content_id = ? AND content_type = ?;
    "#,
  )
  .bind(user_id)
  .bind(content_id)
  .bind(content_type)
  .execute(pool)
  .await
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(result.rows_affected() > 0)
}

pub async fn fetch_queue_items(
  pool: &MySqlPool,
  user_id: &str,
  status: Option<&str>,
) -> Result<Vec<QueueItemRow>, Error> {
  type Row = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    Option<String>,
  );

  let rows: Vec<Row> = match status {
    Some(status) => {
      sqlx::query_as::<_, Row>(
        r#"
          SELECT content_id, content_type, title, poster_path, mood_when_saved,
                 status, CAST(added_at AS CHAR), CAST(watched_at AS CHAR)
          FROM watch_queue
          WHERE user_id = ? AND status = ?
          ORDER BY added_at DESC;
        "#,
      )
      .bind(user_id)
      .bind(status)
      .fetch_all(pool)
      .await
    }
    None => {
      sqlx::query_as::<_, Row>(
        r#"
          SELECT content_id, content_type, title, poster_path, mood_when_saved,
                 status, CAST(added_at AS CHAR), CAST(watched_at AS CHAR)
          FROM watch_queue
          WHERE user_id = ?
          ORDER BY added_at DESC;
        "#,
      )
      .bind(user_id)
      .fetch_all(pool)
      .await
    }
  }
  .map_err(|e| -> Error { Box::new(e) })?;

  Ok(
    rows
      .into_iter()
      .map(
        |(content_id, content_type, title, poster_path, mood_when_saved, status, added_at, watched_at)| {
          QueueItemRow {
            content_id,
            content_type,
            title,
            poster_path,
            mood_when_saved,
            status,
            added_at,
            watched_at,
          }
        },
      )
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_row_timestamp_accepts_store_datetime_format() {
    let parsed = parse_row_timestamp("2026-08-06 14:03:21.000").unwrap();
    assert_eq!(parsed.format("%Y-%m-%d %H").to_string(), "2026-08-06 14");
  }

  #[test]
  fn parse_row_timestamp_accepts_rfc3339() {
    let parsed = parse_row_timestamp("2026-08-06T14:03:21Z").unwrap();
    assert_eq!(parsed.format("%Y-%m-%d").to_string(), "2026-08-06");
  }

  #[test]
  fn parse_row_timestamp_rejects_garbage() {
    assert!(parse_row_timestamp("not-a-timestamp").is_none());
    assert!(parse_row_timestamp("").is_none());
  }
}
