use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bookkeeping row written after every cycle, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub item_id: i64,
    pub checked_at: DateTime<Utc>,
    pub success: bool,
    pub change_percent: u8,
    pub error: Option<String>,
    pub response_time_ms: u64,
}

impl CheckRecord {
    pub fn success(item_id: i64, checked_at: DateTime<Utc>, change_percent: u8, response_time_ms: u64) -> Self {
        Self {
            item_id,
            checked_at,
            success: true,
            change_percent,
            error: None,
            response_time_ms,
        }
    }

    pub fn failure(item_id: i64, checked_at: DateTime<Utc>, error: String, response_time_ms: u64) -> Self {
        Self {
            item_id,
            checked_at,
            success: false,
            change_percent: 0,
            error: Some(error),
            response_time_ms,
        }
    }
}
