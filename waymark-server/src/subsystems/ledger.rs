//! Location ledger — append-only observation log per timeline.
//!
//! Sole writer of observations. Appends carry a caller-assigned id so the
//! state machine can replay a failed append without duplicating rows; reads
//! are ascending by sequence with a restartable cursor.

use std::sync::Arc;

use uuid::Uuid;
use waymark_core::models::{NewObservation, Observation};
use waymark_core::store::{StoreError, TrackStore};

/// Default page size for timeline reads
const DEFAULT_LIMIT: i64 = 100;

/// Maximum allowed page size
const MAX_LIMIT: i64 = 500;

#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn TrackStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn TrackStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, obs: NewObservation) -> Result<Observation, StoreError> {
        let observation = self.store.append_observation(obs).await?;
        tracing::debug!(
            observation_id = %observation.id,
            device_id = %observation.device_id,
            timeline_id = ?observation.timeline_id,
            sequence = observation.sequence,
            event_type = observation.event_type.as_str(),
            "observation appended"
        );
        Ok(observation)
    }

    /// One page of a timeline's observations, ascending by sequence.
    /// Restart from the last sequence seen to continue.
    pub async fn read_page(
        &self,
        timeline_id: Uuid,
        after: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Vec<Observation>, StoreError> {
        self.store
            .list_observations(timeline_id, after, effective_limit(limit))
            .await
    }
}

fn effective_limit(limit: Option<u32>) -> i64 {
    limit
        .map(|l| (l as i64).clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT)
}
