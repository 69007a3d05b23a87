use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::MySqlPool;
use vercel_runtime::Error;

use crate::db::{self, DailyUsageRow};

/// Sentinel returned for premium and unknown features. Not literal infinity:
/// the UI renders it as "unlimited".
pub const UNLIMITED: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
  Recommendation,
  MrDpChat,
  QuickDopeHit,
}

impl Feature {
  pub fn from_name(name: &str) -> Option<Feature> {
    match name {
      "recommendation" => Some(Feature::Recommendation),
      "mr_dp" => Some(Feature::MrDpChat),
      "quick_dope" => Some(Feature::QuickDopeHit),
      _ => None,
    }
  }

  pub fn daily_limit(self) -> i64 {
    match self {
      Feature::Recommendation => 5,
      Feature::MrDpChat => 10,
      Feature::QuickDopeHit => 3,
    }
  }

  pub fn counter_column(self) -> &'static str {
    match self {
      Feature::Recommendation => "recommendations_count",
      Feature::MrDpChat => "mr_dp_chats_count",
      Feature::QuickDopeHit => "quick_dope_hits_count",
    }
  }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GateDecision {
  pub allowed: bool,
  pub remaining: i64,
  pub limit: i64,
}

impl GateDecision {
  pub fn unlimited() -> GateDecision {
    GateDecision {
      allowed: true,
      remaining: UNLIMITED,
      limit: UNLIMITED,
    }
  }
}

pub fn is_premium(plan_type: &str, status: &str) -> bool {
  status == "active" && plan_type == "premium"
}

pub fn decide(used: i64, limit: i64) -> GateDecision {
  let remaining = (limit - used).max(0);
  GateDecision {
    allowed: remaining > 0,
    remaining,
    limit,
  }
}

fn feature_count(row: &DailyUsageRow, feature: Feature) -> i64 {
  match feature {
    Feature::Recommendation => row.recommendations_count,
    Feature::MrDpChat => row.mr_dp_chats_count,
    Feature::QuickDopeHit => row.quick_dope_hits_count,
  }
}

/// Gate decision for one metered feature. Unknown feature names gate as
/// unlimited, and a store failure fails open to the same decision so the UI
/// is never blocked on the ledger.
pub async fn can_use(
  pool: &MySqlPool,
  user_id: &str,
  feature_name: &str,
  now: DateTime<Utc>,
) -> GateDecision {
  let Some(feature) = Feature::from_name(feature_name) else {
    return GateDecision::unlimited();
  };

  match gate_for_feature(pool, user_id, feature, now).await {
    Ok(decision) => decision,
    Err(err) => {
      eprintln!("usage_ledger: can_use failed for user {user_id}: {err}");
      GateDecision::unlimited()
    }
  }
}

async fn gate_for_feature(
  pool: &MySqlPool,
  user_id: &str,
  feature: Feature,
  now: DateTime<Utc>,
) -> Result<GateDecision, Error> {
  if let Some(sub) = db::fetch_subscription(pool, user_id).await? {
    if is_premium(&sub.plan_type, &sub.status) {
      return Ok(GateDecision::unlimited());
    }
  }

  let day = now.date_naive();
  db::ensure_daily_usage_row(pool, user_id, day).await?;
  let row = db::fetch_daily_usage(pool, user_id, day)
    .await?
    .unwrap_or_default();

  Ok(decide(feature_count(&row, feature), feature.daily_limit()))
}

/// Records one use of a metered feature. No-op for unknown feature names;
/// a store failure is logged and swallowed.
pub async fn increment(pool: &MySqlPool, user_id: &str, feature_name: &str, now: DateTime<Utc>) {
  let Some(feature) = Feature::from_name(feature_name) else {
    return;
  };

  if let Err(err) = increment_feature(pool, user_id, feature, now).await {
    eprintln!("usage_ledger: increment failed for user {user_id}: {err}");
  }
}

async fn increment_feature(
  pool: &MySqlPool,
  user_id: &str,
  feature: Feature,
  now: DateTime<Utc>,
) -> Result<(), Error> {
  let day = now.date_naive();
  db::ensure_daily_usage_row(pool, user_id, day).await?;

  // Known limitation: read-then-write, not an atomic counter update. Two
  // concurrent increments for the same user can observe the same count and
  // under-count by one. The only writer in practice is the user's own
  // sequential UI session.
  let row = db::fetch_daily_usage(pool, user_id, day)
    .await?
    .unwrap_or_default();
  let next = feature_count(&row, feature) + 1;

  db::update_daily_usage_count(pool, user_id, day, feature.counter_column(), next).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decide_counts_down_to_denial_at_the_limit() {
    let limit = 5;
    for used in 0..8 {
      let decision = decide(used, limit);
      assert_eq!(decision.allowed, used < limit);
      assert_eq!(decision.remaining, (limit - used).max(0));
      assert_eq!(decision.limit, limit);
    }
  }

  #[test]
  fn decide_denies_past_the_limit_without_negative_remaining() {
    let decision = decide(7, 3);
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);
  }

  #[test]
  fn feature_names_map_to_fixed_daily_limits() {
    assert_eq!(Feature::from_name("recommendation").unwrap().daily_limit(), 5);
    assert_eq!(Feature::from_name("mr_dp").unwrap().daily_limit(), 10);
    assert_eq!(Feature::from_name("quick_dope").unwrap().daily_limit(), 3);
  }

  #[test]
  fn unknown_feature_names_are_not_an_error() {
    assert!(Feature::from_name("time_travel").is_none());
    let decision = GateDecision::unlimited();
    assert!(decision.allowed);
    assert_eq!(decision.remaining, UNLIMITED);
    assert_eq!(decision.limit, UNLIMITED);
  }

  #[test]
  fn premium_requires_active_status_and_premium_plan() {
    assert!(is_premium("premium", "active"));
    assert!(!is_premium("premium", "cancelled"));
    assert!(!is_premium("free", "active"));
  }

  #[test]
  fn feature_count_picks_the_matching_counter() {
    let row = DailyUsageRow {
      recommendations_count: 4,
      mr_dp_chats_count: 9,
      quick_dope_hits_count: 1,
    };
    assert_eq!(feature_count(&row, Feature::Recommendation), 4);
    assert_eq!(feature_count(&row, Feature::MrDpChat), 9);
    assert_eq!(feature_count(&row, Feature::QuickDopeHit), 1);
  }
}
