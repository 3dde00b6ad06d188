use serde::Serialize;
use uuid::Uuid;

use waymark_core::event::{normalize, CanonicalEvent, RawLocationEvent, ValidationError};
use waymark_core::ipc::{TrackPush, TrackRequest, TrackResponse};
use waymark_core::TrackError;

use crate::context::AppContext;
use crate::subsystems::query;
use crate::subsystems::session::{EventOutcome, Transition};

/// Acknowledgment returned to the originator of a `locationUpdate`.
/// `observation_id`/`sequence` are present for PINGs only — START and FINISH
/// move session state without entering the ledger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReceipt {
    pub device_id: Uuid,
    pub timeline_id: Option<Uuid>,
    pub observation_id: Option<Uuid>,
    pub sequence: Option<i64>,
    pub timeline_started: bool,
    pub timeline_closed: bool,
}

pub async fn handle_request(request: TrackRequest, ctx: &AppContext) -> TrackResponse {
    match request {
        TrackRequest::Ping => TrackResponse::pong(),
        TrackRequest::Health => match ctx.store.health().await {
            Ok(store) => {
                let subscribers = ctx.broadcaster.subscriber_count().await;
                TrackResponse::ok(serde_json::json!({
                    "status": "healthy",
                    "store": store,
                    "subscribers": subscribers,
                }))
            }
            Err(e) => TrackResponse::err(format!("Store health check failed: {}", e)),
        },
        TrackRequest::LocationUpdate { payload } => match ingest_location(payload, ctx).await {
            Ok(receipt) => match serde_json::to_value(&receipt) {
                Ok(data) => TrackResponse::ok(data),
                Err(e) => TrackResponse::err(format!("Serialization error: {}", e)),
            },
            Err(e) => TrackResponse::err(e.to_string()),
        },
        TrackRequest::ActiveTimeline => match query::list_active_timelines(&ctx.store).await {
            Ok(data) => match serde_json::to_value(&data) {
                Ok(data) => TrackResponse::ok(data),
                Err(e) => TrackResponse::err(format!("Serialization error: {}", e)),
            },
            Err(e) => TrackResponse::err(e.to_string()),
        },
        TrackRequest::DetailActivity {
            timeline_id,
            after,
            limit,
        } => match query::timeline_detail(&ctx.ledger, timeline_id, after, limit).await {
            Ok(data) => match serde_json::to_value(&data) {
                Ok(data) => TrackResponse::ok(data),
                Err(e) => TrackResponse::err(format!("Serialization error: {}", e)),
            },
            Err(e) => TrackResponse::err(e.to_string()),
        },
        // Subscriptions need the connection's push channel; the socket loop
        // handles them before requests reach the router.
        TrackRequest::Subscribe { .. } | TrackRequest::Unsubscribe => {
            TrackResponse::err("subscriptions require a streaming connection")
        }
    }
}

/// The write path: normalize, apply the session transition, append to the
/// ledger, then fan out. Shared by the IPC router and the HTTP surface.
pub async fn ingest_location(
    payload: serde_json::Value,
    ctx: &AppContext,
) -> Result<EventReceipt, TrackError> {
    let raw: RawLocationEvent = serde_json::from_value(payload)
        .map_err(|e| ValidationError::Payload(e.to_string()))?;
    let event = normalize(raw)?;

    let outcome = ctx.sessions.apply(&event).await?;

    // Fan-out happens only after the durable writes committed; a validation
    // or store failure above means nothing is broadcast.
    publish_outcome(ctx, &event, &outcome).await;

    Ok(EventReceipt {
        device_id: outcome.device_id,
        timeline_id: outcome.timeline_id,
        observation_id: outcome.observation.as_ref().map(|o| o.id),
        sequence: outcome.observation.as_ref().map(|o| o.sequence),
        timeline_started: matches!(outcome.transition, Some(Transition::Started(_))),
        timeline_closed: matches!(outcome.transition, Some(Transition::Closed(_))),
    })
}

async fn publish_outcome(ctx: &AppContext, event: &CanonicalEvent, outcome: &EventOutcome) {
    ctx.broadcaster
        .publish(&TrackPush::LocationUpdate {
            device_id: outcome.device_id,
            latitude: event.latitude,
            longitude: event.longitude,
            reverse_data: event.reverse_data.clone(),
        })
        .await;

    if let Some(observation) = &outcome.observation {
        if let Some(timeline_id) = observation.timeline_id {
            ctx.broadcaster
                .publish(&TrackPush::TimelineUpdate {
                    timeline_id,
                    observation: observation.clone(),
                })
                .await;
        }
    }

    if outcome.transition.is_some() {
        match ctx.store.list_active_timelines().await {
            Ok(timelines) => {
                ctx.broadcaster
                    .publish(&TrackPush::ActiveTimeline { timelines })
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load active timelines for broadcast");
            }
        }
    }
}
