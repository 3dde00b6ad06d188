//! Timeline state machine — per-device session tracking.
//!
//! Transitions for a device are serialized behind a keyed mutex so two
//! concurrent STARTs can never race into two open timelines; different
//! devices proceed fully in parallel. Session state is derived from the
//! durable store only (an open timeline is one with no `end_time`), so a
//! failed write leaves the machine in its last-known-good state.
//!
//! Transition table:
//! - `NO_SESSION --START-->  OPEN`        (creates a timeline)
//! - `OPEN       --START-->  OPEN`        (duplicate, logged no-op)
//! - `OPEN       --FINISH--> NO_SESSION`  (sets `end_time`)
//! - `NO_SESSION --FINISH--> NO_SESSION`  (no-op)
//! - `PING` never changes session state; without an open timeline the
//!   observation is stored orphaned, never dropped.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use uuid::Uuid;

use waymark_core::config::IngestConfig;
use waymark_core::event::{CanonicalEvent, EventKind};
use waymark_core::models::{NewObservation, Observation, Timeline};
use waymark_core::store::{StoreError, TrackStore};

use super::ledger::Ledger;

/// A session-state change produced by an event.
#[derive(Debug, Clone)]
pub enum Transition {
    Started(Timeline),
    Closed(Timeline),
}

/// What applying one event did: an optional transition, the timeline the
/// event landed on (if any), and the appended observation for PINGs.
/// START and FINISH are lifecycle events; only PINGs reach the ledger.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub device_id: Uuid,
    pub transition: Option<Transition>,
    pub timeline_id: Option<Uuid>,
    pub observation: Option<Observation>,
}

pub struct SessionTracker {
    store: Arc<dyn TrackStore>,
    ledger: Ledger,
    config: IngestConfig,
    // Grows with the device population; devices are never deleted.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn TrackStore>, ledger: Ledger, config: IngestConfig) -> Self {
        Self {
            store,
            ledger,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn device_lock(&self, device_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(device_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Bounded exponential backoff around one store operation. Validation
    /// never reaches this point; only storage faults are retried.
    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let strategy = ExponentialBackoff::from_millis(self.config.retry_base_delay_ms)
            .map(jitter)
            .take(self.config.retry_max_attempts);
        Retry::spawn(strategy, op).await
    }

    /// Apply one canonical event: upsert the device, run the session
    /// transition, append the observation. Serialized per device.
    pub async fn apply(&self, event: &CanonicalEvent) -> Result<EventOutcome, StoreError> {
        let device_id = event.device.id;
        let lock = self.device_lock(device_id).await;
        let _guard = lock.lock().await;

        self.with_retry(|| {
            self.store
                .upsert_device(device_id, &event.device.name, &event.device.os)
        })
        .await?;

        let open = self
            .with_retry(|| self.store.find_open_timeline(device_id))
            .await?;

        let mut transition = None;
        let current: Option<Timeline> = match event.kind {
            EventKind::Start => match open {
                Some(timeline) => {
                    tracing::debug!(
                        device_id = %device_id,
                        timeline_id = %timeline.id,
                        "duplicate START ignored"
                    );
                    Some(timeline)
                }
                None => {
                    // Id chosen outside the retry loop: a replayed create
                    // finds the row it already made.
                    let timeline_id = Uuid::new_v4();
                    let timeline = self
                        .with_retry(|| {
                            self.store
                                .create_timeline(timeline_id, device_id, event.received_at)
                        })
                        .await?;
                    tracing::info!(device_id = %device_id, timeline_id = %timeline.id, "timeline started");
                    transition = Some(Transition::Started(timeline.clone()));
                    Some(timeline)
                }
            },
            EventKind::Finish => match open {
                Some(timeline) => {
                    let closed = self
                        .with_retry(|| self.store.close_timeline(timeline.id, event.received_at))
                        .await?
                        .unwrap_or(timeline);
                    tracing::info!(device_id = %device_id, timeline_id = %closed.id, "timeline closed");
                    transition = Some(Transition::Closed(closed.clone()));
                    Some(closed)
                }
                None => {
                    tracing::debug!(device_id = %device_id, "FINISH with no open timeline ignored");
                    None
                }
            },
            EventKind::Ping => open,
        };
        let timeline_id = current.as_ref().map(|t| t.id);

        // START and FINISH only move session state; location samples enter
        // the ledger on PING.
        let observation = match event.kind {
            EventKind::Ping => {
                // Id chosen outside the retry loop keeps a replayed append
                // idempotent.
                let pending = NewObservation {
                    id: Uuid::new_v4(),
                    timeline_id,
                    device_id,
                    latitude: event.latitude,
                    longitude: event.longitude,
                    reverse_data: event.reverse_data.clone(),
                    event_type: event.kind,
                    recorded_at: event.received_at,
                };
                let observation =
                    self.with_retry(|| self.ledger.append(pending.clone())).await?;
                if observation.timeline_id.is_none() {
                    tracing::debug!(device_id = %device_id, "orphan observation recorded (no open timeline)");
                }
                Some(observation)
            }
            EventKind::Start | EventKind::Finish => None,
        };

        Ok(EventOutcome {
            device_id,
            transition,
            timeline_id,
            observation,
        })
    }
}
