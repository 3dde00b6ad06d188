use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded session of device activity between a START and a FINISH event.
/// `end_time` is `None` while the session is open; at most one timeline per
/// device is open at any instant.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub id: Uuid,
    pub device_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Timeline {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

/// An open timeline joined with its device metadata, as returned by the
/// active-timelines query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimeline {
    pub id: Uuid,
    pub device_id: Uuid,
    pub device_name: String,
    pub device_os: String,
    pub start_time: DateTime<Utc>,
}
