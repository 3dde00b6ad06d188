//! Router-level integration tests for the ingest write path and queries,
//! run against the in-memory storage backend.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;
use waymark_core::config::{ServiceConfig, WaymarkConfig};
use waymark_core::ipc::{TrackRequest, TrackResponse};
use waymark_core::mem_store::MemoryStore;
use waymark_core::store::TrackStore;
use waymark_server::router;
use waymark_server::subsystems::broadcast::Topic;
use waymark_server::AppContext;

fn make_ctx() -> AppContext {
    let store: Arc<dyn TrackStore> = Arc::new(MemoryStore::new());
    let config = WaymarkConfig {
        service: ServiceConfig {
            socket_path: "/tmp/waymark-test.sock".to_string(),
            log_level: "info".to_string(),
        },
        storage: Default::default(),
        database: None,
        ingest: Default::default(),
        broadcast: Default::default(),
        http: Default::default(),
    };
    AppContext::new(store, config)
}

fn location_payload(device_id: Uuid, event_type: &str, lat: f64, lon: f64) -> serde_json::Value {
    json!({
        "deviceId": device_id,
        "deviceName": "Pixel 9",
        "os": "Android 15",
        "latitude": lat,
        "longitude": lon,
        "eventType": event_type,
    })
}

async fn send_location(
    ctx: &AppContext,
    device_id: Uuid,
    event_type: &str,
    lat: f64,
    lon: f64,
) -> TrackResponse {
    router::handle_request(
        TrackRequest::LocationUpdate {
            payload: location_payload(device_id, event_type, lat, lon),
        },
        ctx,
    )
    .await
}

#[tokio::test]
async fn scenario_start_ping_finish() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let started = send_location(&ctx, device, "START", 0.0, 0.0).await;
    assert_eq!(started.status, "ok");
    let started_data = started.data.unwrap();
    assert_eq!(started_data["timelineStarted"], true);
    let timeline_id: Uuid = started_data["timelineId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let ping = send_location(&ctx, device, "PING", 1.0, 2.0).await;
    assert_eq!(ping.status, "ok");

    let finished = send_location(&ctx, device, "FINISH", 0.0, 0.0).await;
    assert_eq!(finished.status, "ok");
    assert_eq!(finished.data.unwrap()["timelineClosed"], true);

    // No open timelines remain.
    let active = router::handle_request(TrackRequest::ActiveTimeline, &ctx).await;
    assert_eq!(active.status, "ok");
    let active_data = active.data.unwrap();
    assert_eq!(active_data["count"], 0);
    assert!(active_data["timelines"].as_array().unwrap().is_empty());

    // Detail holds exactly the one PING observation.
    let detail = router::handle_request(
        TrackRequest::DetailActivity {
            timeline_id,
            after: None,
            limit: None,
        },
        &ctx,
    )
    .await;
    assert_eq!(detail.status, "ok");
    let detail_data = detail.data.unwrap();
    assert_eq!(detail_data["count"], 1);
    let obs = &detail_data["observations"][0];
    assert_eq!(obs["latitude"], 1.0);
    assert_eq!(obs["longitude"], 2.0);
    assert_eq!(obs["eventType"], "PING");
}

#[tokio::test]
async fn scenario_ping_without_start_is_orphaned() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let response = send_location(&ctx, device, "PING", 3.0, 4.0).await;
    assert_eq!(response.status, "ok");
    let data = response.data.unwrap();
    // Stored, but with no timeline association.
    assert!(data["observationId"].is_string());
    assert!(data["timelineId"].is_null());

    let active = router::handle_request(TrackRequest::ActiveTimeline, &ctx).await;
    assert_eq!(active.data.unwrap()["count"], 0);
}

#[tokio::test]
async fn scenario_unknown_timeline_detail_is_empty() {
    let ctx = make_ctx();

    let detail = router::handle_request(
        TrackRequest::DetailActivity {
            timeline_id: Uuid::new_v4(),
            after: None,
            limit: None,
        },
        &ctx,
    )
    .await;

    assert_eq!(detail.status, "ok");
    let data = detail.data.unwrap();
    assert_eq!(data["count"], 0);
    assert!(data["observations"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_malformed_event_rejected_without_broadcast() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let (tx, mut rx) = mpsc::channel(8);
    ctx.broadcaster
        .subscribe(
            vec![Topic::LocationUpdates, Topic::ActiveTimelines],
            tx,
        )
        .await;

    let response = send_location(&ctx, device, "PING", 200.0, 0.0).await;
    assert_eq!(response.status, "error");
    assert!(response.error.unwrap().contains("latitude"));

    // Rejected input reaches the originator only.
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn broadcasts_reach_matching_subscribers() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let (loc_tx, mut loc_rx) = mpsc::channel(8);
    let (active_tx, mut active_rx) = mpsc::channel(8);
    ctx.broadcaster
        .subscribe(vec![Topic::LocationUpdates], loc_tx)
        .await;
    ctx.broadcaster
        .subscribe(vec![Topic::ActiveTimelines], active_tx)
        .await;

    send_location(&ctx, device, "START", 0.0, 0.0).await;

    // Every accepted event emits a locationUpdate; the transition also
    // refreshes the active-timelines stream.
    let push = loc_rx.try_recv().expect("locationUpdate push expected");
    let v = serde_json::to_value(&push).unwrap();
    assert_eq!(v["event"], "locationUpdate");
    assert_eq!(v["deviceId"], device.to_string());

    let push = active_rx.try_recv().expect("activeTimeline push expected");
    let v = serde_json::to_value(&push).unwrap();
    assert_eq!(v["event"], "activeTimeline");
    assert_eq!(v["timelines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn timeline_detail_stream_receives_attached_pings() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let started = send_location(&ctx, device, "START", 0.0, 0.0).await;
    let timeline_id: Uuid = started.data.unwrap()["timelineId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    ctx.broadcaster
        .subscribe(vec![Topic::Timeline(timeline_id)], tx)
        .await;

    send_location(&ctx, device, "PING", 5.0, 6.0).await;

    let push = rx.try_recv().expect("timelineUpdate push expected");
    let v = serde_json::to_value(&push).unwrap();
    assert_eq!(v["event"], "timelineUpdate");
    assert_eq!(v["observation"]["latitude"], 5.0);
}

#[tokio::test]
async fn duplicate_start_keeps_single_active_timeline() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    send_location(&ctx, device, "START", 0.0, 0.0).await;
    let second = send_location(&ctx, device, "START", 0.0, 0.0).await;
    assert_eq!(second.status, "ok");
    assert_eq!(second.data.unwrap()["timelineStarted"], false);

    let active = router::handle_request(TrackRequest::ActiveTimeline, &ctx).await;
    assert_eq!(active.data.unwrap()["count"], 1);
}

#[tokio::test]
async fn detail_pagination_restarts_from_cursor() {
    let ctx = make_ctx();
    let device = Uuid::new_v4();

    let started = send_location(&ctx, device, "START", 0.0, 0.0).await;
    let timeline_id: Uuid = started.data.unwrap()["timelineId"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    for i in 0..5 {
        send_location(&ctx, device, "PING", i as f64, 0.0).await;
    }

    let first = router::handle_request(
        TrackRequest::DetailActivity {
            timeline_id,
            after: None,
            limit: Some(2),
        },
        &ctx,
    )
    .await;
    let first_data = first.data.unwrap();
    assert_eq!(first_data["count"], 2);
    let cursor = first_data["nextAfter"].as_i64().unwrap();

    let rest = router::handle_request(
        TrackRequest::DetailActivity {
            timeline_id,
            after: Some(cursor),
            limit: None,
        },
        &ctx,
    )
    .await;
    let rest_data = rest.data.unwrap();
    assert_eq!(rest_data["count"], 3);

    // Ascending and contiguous across pages.
    let seqs: Vec<i64> = first_data["observations"]
        .as_array()
        .unwrap()
        .iter()
        .chain(rest_data["observations"].as_array().unwrap().iter())
        .map(|o| o["sequence"].as_i64().unwrap())
        .collect();
    let mut sorted = seqs.clone();
    sorted.sort_unstable();
    assert_eq!(seqs, sorted);
    assert_eq!(seqs.len(), 5);
}

#[tokio::test]
async fn payload_without_device_id_registers_new_device() {
    let ctx = make_ctx();

    let response = router::handle_request(
        TrackRequest::LocationUpdate {
            payload: json!({
                "latitude": 1.0,
                "longitude": 2.0,
                "eventType": "START",
            }),
        },
        &ctx,
    )
    .await;

    assert_eq!(response.status, "ok");
    let data = response.data.unwrap();
    assert!(data["deviceId"].is_string());
    assert_eq!(data["timelineStarted"], true);

    let active = router::handle_request(TrackRequest::ActiveTimeline, &ctx).await;
    let active_data = active.data.unwrap();
    assert_eq!(active_data["count"], 1);
    assert_eq!(active_data["timelines"][0]["deviceName"], "Unknown Device");
}
