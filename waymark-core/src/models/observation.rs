use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::EventKind;

/// A single location sample. Immutable once appended; `timeline_id` is `None`
/// for orphan observations (recorded while no timeline was open).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: Uuid,
    pub timeline_id: Option<Uuid>,
    pub device_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub reverse_data: Option<serde_json::Value>,
    pub event_type: EventKind,
    /// Store-assigned, strictly increasing per timeline.
    pub sequence: i64,
    pub recorded_at: DateTime<Utc>,
}

/// An observation before the store assigns its sequence number. The id is
/// chosen by the caller so a retried append stays idempotent.
#[derive(Debug, Clone)]
pub struct NewObservation {
    pub id: Uuid,
    pub timeline_id: Option<Uuid>,
    pub device_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub reverse_data: Option<serde_json::Value>,
    pub event_type: EventKind,
    pub recorded_at: DateTime<Utc>,
}
