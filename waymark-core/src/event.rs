//! Event normalizer — validates and canonicalizes inbound location events.
//!
//! Raw payloads arrive with optional device identity and untrusted
//! coordinates. Normalization assigns a fresh device id when none is given,
//! stamps the server receipt time, and rejects out-of-range or malformed
//! input before anything touches the state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle tag carried by every location event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Start,
    Finish,
    Ping,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "START",
            EventKind::Finish => "FINISH",
            EventKind::Ping => "PING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "START" => Some(EventKind::Start),
            "FINISH" => Some(EventKind::Finish),
            "PING" => Some(EventKind::Ping),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("latitude {0} out of range (must be within ±90)")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} out of range (must be within ±180)")]
    LongitudeOutOfRange(f64),

    #[error("unknown event type: {0:?}")]
    UnknownEventType(String),

    #[error("malformed payload: {0}")]
    Payload(String),
}

/// Wire shape of an inbound `locationUpdate` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocationEvent {
    pub device_id: Option<Uuid>,
    pub device_name: Option<String>,
    pub os: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub reverse_data: Option<serde_json::Value>,
    pub event_type: Option<String>,
    pub client_timestamp: Option<DateTime<Utc>>,
}

/// Device identity carried by a canonical event. `newly_assigned` is true
/// when the inbound payload had no device id and one was generated here.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub id: Uuid,
    pub name: String,
    pub os: String,
    pub newly_assigned: bool,
}

/// A validated, canonicalized location event. The server receipt timestamp
/// is kept alongside any client timestamp for later clock-skew analysis;
/// the two are never reconciled here.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    pub device: DeviceIdentity,
    pub kind: EventKind,
    pub latitude: f64,
    pub longitude: f64,
    pub reverse_data: Option<serde_json::Value>,
    pub client_time: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// Validate and canonicalize a raw event. No side effects beyond validation.
pub fn normalize(raw: RawLocationEvent) -> Result<CanonicalEvent, ValidationError> {
    let latitude = raw
        .latitude
        .ok_or(ValidationError::MissingField("latitude"))?;
    let longitude = raw
        .longitude
        .ok_or(ValidationError::MissingField("longitude"))?;

    if !latitude.is_finite() || latitude.abs() > 90.0 {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }

    let kind = match raw.event_type {
        Some(ref s) => {
            EventKind::parse(s).ok_or_else(|| ValidationError::UnknownEventType(s.clone()))?
        }
        None => return Err(ValidationError::MissingField("eventType")),
    };

    let (id, newly_assigned) = match raw.device_id {
        Some(id) => (id, false),
        None => {
            let id = Uuid::new_v4();
            tracing::info!(device_id = %id, "assigned id to unregistered device");
            (id, true)
        }
    };

    Ok(CanonicalEvent {
        device: DeviceIdentity {
            id,
            name: raw.device_name.unwrap_or_else(|| "Unknown Device".to_string()),
            os: raw.os.unwrap_or_else(|| "Unknown OS".to_string()),
            newly_assigned,
        },
        kind,
        latitude,
        longitude,
        reverse_data: raw.reverse_data,
        client_time: raw.client_timestamp,
        received_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_ping(lat: f64, lon: f64) -> RawLocationEvent {
        RawLocationEvent {
            device_id: Some(Uuid::new_v4()),
            device_name: Some("Pixel 9".to_string()),
            os: Some("Android 15".to_string()),
            latitude: Some(lat),
            longitude: Some(lon),
            reverse_data: None,
            event_type: Some("PING".to_string()),
            client_timestamp: None,
        }
    }

    #[test]
    fn valid_ping_normalizes() {
        let raw = raw_ping(1.5, 2.5);
        let device_id = raw.device_id.unwrap();
        let event = normalize(raw).unwrap();
        assert_eq!(event.kind, EventKind::Ping);
        assert_eq!(event.latitude, 1.5);
        assert_eq!(event.longitude, 2.5);
        assert_eq!(event.device.id, device_id);
        assert!(!event.device.newly_assigned);
    }

    #[test]
    fn missing_latitude_rejected() {
        let mut raw = raw_ping(0.0, 0.0);
        raw.latitude = None;
        assert!(matches!(
            normalize(raw),
            Err(ValidationError::MissingField("latitude"))
        ));
    }

    #[test]
    fn latitude_out_of_range_rejected() {
        let raw = raw_ping(200.0, 0.0);
        assert!(matches!(
            normalize(raw),
            Err(ValidationError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn longitude_out_of_range_rejected() {
        let raw = raw_ping(0.0, -180.5);
        assert!(matches!(
            normalize(raw),
            Err(ValidationError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn nan_coordinates_rejected() {
        let raw = raw_ping(f64::NAN, 0.0);
        assert!(matches!(
            normalize(raw),
            Err(ValidationError::LatitudeOutOfRange(_))
        ));
    }

    #[test]
    fn unknown_event_type_rejected() {
        let mut raw = raw_ping(0.0, 0.0);
        raw.event_type = Some("RESUME".to_string());
        assert!(matches!(
            normalize(raw),
            Err(ValidationError::UnknownEventType(_))
        ));
    }

    #[test]
    fn missing_device_id_generates_one() {
        let mut raw = raw_ping(0.0, 0.0);
        raw.device_id = None;
        let event = normalize(raw).unwrap();
        assert!(event.device.newly_assigned);
    }

    #[test]
    fn missing_name_and_os_get_defaults() {
        let mut raw = raw_ping(0.0, 0.0);
        raw.device_name = None;
        raw.os = None;
        let event = normalize(raw).unwrap();
        assert_eq!(event.device.name, "Unknown Device");
        assert_eq!(event.device.os, "Unknown OS");
    }

    #[test]
    fn client_timestamp_preserved() {
        let mut raw = raw_ping(0.0, 0.0);
        let ts = "2026-08-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        raw.client_timestamp = Some(ts);
        let event = normalize(raw).unwrap();
        assert_eq!(event.client_time, Some(ts));
        // Receipt time is server-assigned, independent of the client clock.
        assert_ne!(event.received_at, ts);
    }

    #[test]
    fn boundary_coordinates_accepted() {
        let raw = raw_ping(90.0, -180.0);
        assert!(normalize(raw).is_ok());
    }
}
