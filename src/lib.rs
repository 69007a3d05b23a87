pub mod behavior_engine;
pub mod db;
pub mod mood_engine;
pub mod session;
pub mod usage_ledger;
pub mod watch_queue;
