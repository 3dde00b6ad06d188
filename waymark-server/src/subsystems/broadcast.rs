//! Broadcast fan-out — per-topic delivery to subscribed observers.
//!
//! Delivery is best-effort and at-most-once per observer connection: a full
//! or closed queue drops that delivery. There is no replay buffer; observers
//! that reconnect re-query through the query service. Publishing snapshots
//! the matching senders and releases the registry lock before sending, so
//! subscribe/unsubscribe take effect at the next publish and a slow observer
//! never blocks the write path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use waymark_core::ipc::{TopicSpec, TrackPush};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every new observation.
    LocationUpdates,
    /// The set of currently open timelines, on every transition.
    ActiveTimelines,
    /// Detail stream for one timeline.
    Timeline(Uuid),
}

impl From<&TopicSpec> for Topic {
    fn from(spec: &TopicSpec) -> Self {
        match spec {
            TopicSpec::LocationUpdate => Topic::LocationUpdates,
            TopicSpec::ActiveTimeline => Topic::ActiveTimelines,
            TopicSpec::Timeline { timeline_id } => Topic::Timeline(*timeline_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberId(u64);

struct Subscriber {
    topics: Vec<Topic>,
    tx: mpsc::Sender<TrackPush>,
}

#[derive(Default)]
pub struct Broadcaster {
    subscribers: RwLock<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(
        &self,
        topics: Vec<Topic>,
        tx: mpsc::Sender<TrackPush>,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.write().await;
        subscribers.insert(id, Subscriber { topics, tx });
        tracing::debug!(subscriber = id, "observer subscribed");
        SubscriberId(id)
    }

    pub async fn unsubscribe(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(&id.0).is_some() {
            tracing::debug!(subscriber = id.0, "observer unsubscribed");
        }
    }

    pub async fn publish(&self, push: &TrackPush) {
        let topic = topic_of(push);

        // Snapshot under the read lock, send outside it.
        let targets: Vec<(u64, mpsc::Sender<TrackPush>)> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .iter()
                .filter(|(_, s)| s.topics.contains(&topic))
                .map(|(id, s)| (*id, s.tx.clone()))
                .collect()
        };

        for (id, tx) in targets {
            match tx.try_send(push.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(subscriber = id, ?topic, "observer queue full, delivery dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(subscriber = id, ?topic, "observer gone, delivery dropped");
                }
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

fn topic_of(push: &TrackPush) -> Topic {
    match push {
        TrackPush::LocationUpdate { .. } => Topic::LocationUpdates,
        TrackPush::ActiveTimeline { .. } => Topic::ActiveTimelines,
        TrackPush::TimelineUpdate { timeline_id, .. } => Topic::Timeline(*timeline_id),
    }
}
