//! PostgreSQL storage backend.
//!
//! Queries use the non-macro `sqlx` API so the crate builds without a live
//! database. Sequence numbers come from a `BIGSERIAL`; the partial unique
//! index on open timelines backstops the one-open-timeline-per-device
//! invariant in multi-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::event::EventKind;
use crate::models::{ActiveTimeline, NewObservation, Observation, Timeline};
use crate::store::{StoreError, TrackStore};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id          UUID PRIMARY KEY,
    name        TEXT NOT NULL,
    os          TEXT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS timelines (
    id          UUID PRIMARY KEY,
    device_id   UUID NOT NULL REFERENCES devices(id),
    start_time  TIMESTAMPTZ NOT NULL,
    end_time    TIMESTAMPTZ
);

CREATE UNIQUE INDEX IF NOT EXISTS timelines_one_open_per_device
    ON timelines (device_id) WHERE end_time IS NULL;

CREATE TABLE IF NOT EXISTS observations (
    id           UUID PRIMARY KEY,
    timeline_id  UUID REFERENCES timelines(id),
    device_id    UUID NOT NULL REFERENCES devices(id),
    latitude     DOUBLE PRECISION NOT NULL,
    longitude    DOUBLE PRECISION NOT NULL,
    reverse_data JSONB,
    event_type   TEXT NOT NULL,
    sequence     BIGSERIAL,
    recorded_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS observations_timeline_seq
    ON observations (timeline_id, sequence);
"#;

type ObservationRow = (
    Uuid,
    Option<Uuid>,
    Uuid,
    f64,
    f64,
    Option<serde_json::Value>,
    String,
    i64,
    DateTime<Utc>,
);

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    fn row_to_observation(row: ObservationRow) -> Result<Observation, StoreError> {
        let (id, timeline_id, device_id, latitude, longitude, reverse_data, kind, sequence, recorded_at) =
            row;
        let event_type = EventKind::parse(&kind)
            .ok_or_else(|| StoreError::Decode(format!("unknown event_type {kind:?}")))?;
        Ok(Observation {
            id,
            timeline_id,
            device_id,
            latitude,
            longitude,
            reverse_data,
            event_type,
            sequence,
            recorded_at,
        })
    }
}

#[async_trait]
impl TrackStore for PgStore {
    async fn upsert_device(&self, id: Uuid, name: &str, os: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO devices (id, name, os)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, os = EXCLUDED.os
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(os)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_open_timeline(&self, device_id: Uuid) -> Result<Option<Timeline>, StoreError> {
        let timeline = sqlx::query_as::<_, Timeline>(
            r#"
            SELECT id, device_id, start_time, end_time
            FROM timelines
            WHERE device_id = $1 AND end_time IS NULL
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(timeline)
    }

    async fn create_timeline(
        &self,
        id: Uuid,
        device_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Result<Timeline, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO timelines (id, device_id, start_time)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(device_id)
        .bind(start_time)
        .execute(&self.pool)
        .await?;

        let timeline = sqlx::query_as::<_, Timeline>(
            "SELECT id, device_id, start_time, end_time FROM timelines WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(timeline)
    }

    async fn close_timeline(
        &self,
        timeline_id: Uuid,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Timeline>, StoreError> {
        // COALESCE keeps a retried close from moving an already-set end_time.
        let timeline = sqlx::query_as::<_, Timeline>(
            r#"
            UPDATE timelines
            SET end_time = COALESCE(end_time, $2)
            WHERE id = $1
            RETURNING id, device_id, start_time, end_time
            "#,
        )
        .bind(timeline_id)
        .bind(end_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(timeline)
    }

    async fn append_observation(&self, obs: NewObservation) -> Result<Observation, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO observations
                (id, timeline_id, device_id, latitude, longitude, reverse_data, event_type, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(obs.id)
        .bind(obs.timeline_id)
        .bind(obs.device_id)
        .bind(obs.latitude)
        .bind(obs.longitude)
        .bind(&obs.reverse_data)
        .bind(obs.event_type.as_str())
        .bind(obs.recorded_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT id, timeline_id, device_id, latitude, longitude, reverse_data,
                   event_type, sequence, recorded_at
            FROM observations
            WHERE id = $1
            "#,
        )
        .bind(obs.id)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_observation(row)
    }

    async fn list_active_timelines(&self) -> Result<Vec<ActiveTimeline>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, String, DateTime<Utc>)>(
            r#"
            SELECT t.id, t.device_id, d.name, d.os, t.start_time
            FROM timelines t
            JOIN devices d ON d.id = t.device_id
            WHERE t.end_time IS NULL
            ORDER BY t.start_time DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, device_id, device_name, device_os, start_time)| ActiveTimeline {
                id,
                device_id,
                device_name,
                device_os,
                start_time,
            })
            .collect())
    }

    async fn list_observations(
        &self,
        timeline_id: Uuid,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Observation>, StoreError> {
        let rows = sqlx::query_as::<_, ObservationRow>(
            r#"
            SELECT id, timeline_id, device_id, latitude, longitude, reverse_data,
                   event_type, sequence, recorded_at
            FROM observations
            WHERE timeline_id = $1 AND sequence > $2
            ORDER BY sequence ASC
            LIMIT $3
            "#,
        )
        .bind(timeline_id)
        .bind(after.unwrap_or(0))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_observation).collect()
    }

    async fn health(&self) -> Result<String, StoreError> {
        let version = crate::db::health_check(&self.pool).await?;
        Ok(format!("postgresql: {version}"))
    }
}
