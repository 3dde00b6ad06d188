use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ActiveTimeline, Observation};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TrackRequest {
    Ping,
    Health,
    LocationUpdate {
        payload: serde_json::Value,
    },
    ActiveTimeline,
    #[serde(rename_all = "camelCase")]
    DetailActivity {
        timeline_id: Uuid,
        after: Option<i64>,
        limit: Option<u32>,
    },
    Subscribe {
        topics: Vec<TopicSpec>,
    },
    Unsubscribe,
}

/// Wire form of a fan-out topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "topic", rename_all = "camelCase")]
pub enum TopicSpec {
    LocationUpdate,
    ActiveTimeline,
    #[serde(rename_all = "camelCase")]
    Timeline {
        timeline_id: Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TrackResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl TrackResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }
}

/// Server-initiated broadcast frame, pushed to subscribed connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TrackPush {
    #[serde(rename_all = "camelCase")]
    LocationUpdate {
        device_id: Uuid,
        latitude: f64,
        longitude: f64,
        reverse_data: Option<serde_json::Value>,
    },
    ActiveTimeline {
        timelines: Vec<ActiveTimeline>,
    },
    #[serde(rename_all = "camelCase")]
    TimelineUpdate {
        timeline_id: Uuid,
        observation: Observation,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_action_tags_are_stable() {
        let req: TrackRequest = serde_json::from_value(serde_json::json!({
            "action": "locationUpdate",
            "payload": {"latitude": 1.0}
        }))
        .unwrap();
        assert!(matches!(req, TrackRequest::LocationUpdate { .. }));

        let req: TrackRequest =
            serde_json::from_value(serde_json::json!({"action": "activeTimeline"})).unwrap();
        assert!(matches!(req, TrackRequest::ActiveTimeline));

        let req: TrackRequest = serde_json::from_value(serde_json::json!({
            "action": "detailActivity",
            "timelineId": "7b5c24ab-1234-5678-9abc-def012345678"
        }))
        .unwrap();
        assert!(matches!(req, TrackRequest::DetailActivity { .. }));
    }

    #[test]
    fn push_event_tag_matches_wire_contract() {
        let push = TrackPush::LocationUpdate {
            device_id: Uuid::nil(),
            latitude: 1.0,
            longitude: 2.0,
            reverse_data: None,
        };
        let v = serde_json::to_value(&push).unwrap();
        assert_eq!(v["event"], "locationUpdate");
        assert!(v["deviceId"].is_string());
        assert!(v.get("reverseData").is_some());
    }

    #[test]
    fn response_helpers() {
        let ok = TrackResponse::ok(serde_json::json!({"n": 1}));
        assert_eq!(ok.status, "ok");
        assert!(ok.error.is_none());

        let err = TrackResponse::err("boom");
        assert_eq!(err.status, "error");
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
