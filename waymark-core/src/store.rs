//! Storage seam for the tracking core — multi-backend persistent store
//!
//! Provides a `TrackStore` trait with implementations for:
//! - **Postgres** — durable storage via `sqlx` (production)
//! - **Memory** — in-process storage (ephemeral mode and tests)
//!
//! The state machine and ledger are the only writers; queries read through
//! the same trait. Every method observes a consistent snapshot (a single
//! SQL statement or a single lock acquisition).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::WaymarkConfig;
use crate::error::TrackError;
use crate::models::{ActiveTimeline, NewObservation, Observation, Timeline};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt stored value: {0}")]
    Decode(String),
}

/// Abstraction over durable storage backends.
///
/// Writes take caller-assigned ids so a retried call lands exactly once:
/// `create_timeline` and `append_observation` are no-ops (returning the
/// existing row) when their id already exists, and `close_timeline` only
/// sets `end_time` if it is still unset.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Create the device on first contact, update its metadata afterwards.
    async fn upsert_device(&self, id: Uuid, name: &str, os: &str) -> Result<(), StoreError>;

    /// The device's open timeline (`end_time` null), if any.
    async fn find_open_timeline(&self, device_id: Uuid) -> Result<Option<Timeline>, StoreError>;

    async fn create_timeline(
        &self,
        id: Uuid,
        device_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Result<Timeline, StoreError>;

    /// Close a timeline. Returns the closed row, or `None` for an unknown id.
    async fn close_timeline(
        &self,
        timeline_id: Uuid,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Timeline>, StoreError>;

    /// Append an observation, assigning the next sequence number.
    async fn append_observation(&self, obs: NewObservation) -> Result<Observation, StoreError>;

    /// Open timelines joined with device metadata, newest first.
    async fn list_active_timelines(&self) -> Result<Vec<ActiveTimeline>, StoreError>;

    /// Observations for a timeline, ascending by sequence, restartable via
    /// the `after` cursor. Unknown timeline ids yield an empty page.
    async fn list_observations(
        &self,
        timeline_id: Uuid,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Backend identity and liveness, for health checks.
    async fn health(&self) -> Result<String, StoreError>;
}

/// Build the configured storage backend.
pub async fn create_store(config: &WaymarkConfig) -> Result<Arc<dyn TrackStore>, TrackError> {
    match config.storage.backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory storage backend — data is not durable");
            Ok(Arc::new(crate::mem_store::MemoryStore::new()))
        }
        "postgres" => {
            let db = config.database.as_ref().ok_or_else(|| {
                TrackError::Other(
                    "storage.backend = \"postgres\" requires a [database] section".to_string(),
                )
            })?;
            let pool = crate::db::create_pool(db).await.map_err(StoreError::from)?;
            let store = crate::pg_store::PgStore::new(pool);
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
        other => Err(TrackError::Other(format!(
            "unsupported storage backend: {other:?}"
        ))),
    }
}
