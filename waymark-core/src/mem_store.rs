//! In-memory storage backend — ephemeral mode and test double.
//!
//! All state sits behind one `RwLock`; each trait method takes the lock
//! exactly once, so every read observes a consistent snapshot.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{ActiveTimeline, Device, NewObservation, Observation, Timeline};
use crate::store::{StoreError, TrackStore};

#[derive(Default)]
struct Inner {
    devices: HashMap<Uuid, Device>,
    timelines: HashMap<Uuid, Timeline>,
    /// Append-only, in sequence order.
    observations: Vec<Observation>,
    /// Observation id -> index into `observations`, for idempotent appends.
    observation_ids: HashMap<Uuid, usize>,
    next_sequence: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn upsert_device(&self, id: Uuid, name: &str, os: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .devices
            .entry(id)
            .and_modify(|device| {
                device.name = name.to_string();
                device.os = os.to_string();
            })
            .or_insert_with(|| Device {
                id,
                name: name.to_string(),
                os: os.to_string(),
                created_at: Utc::now(),
            });
        Ok(())
    }

    async fn find_open_timeline(&self, device_id: Uuid) -> Result<Option<Timeline>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .timelines
            .values()
            .find(|t| t.device_id == device_id && t.is_open())
            .cloned())
    }

    async fn create_timeline(
        &self,
        id: Uuid,
        device_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Result<Timeline, StoreError> {
        let mut inner = self.inner.write().await;
        let timeline = inner
            .timelines
            .entry(id)
            .or_insert_with(|| Timeline {
                id,
                device_id,
                start_time,
                end_time: None,
            })
            .clone();
        Ok(timeline)
    }

    async fn close_timeline(
        &self,
        timeline_id: Uuid,
        end_time: DateTime<Utc>,
    ) -> Result<Option<Timeline>, StoreError> {
        let mut inner = self.inner.write().await;
        Ok(inner.timelines.get_mut(&timeline_id).map(|t| {
            if t.end_time.is_none() {
                t.end_time = Some(end_time);
            }
            t.clone()
        }))
    }

    async fn append_observation(&self, obs: NewObservation) -> Result<Observation, StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(&idx) = inner.observation_ids.get(&obs.id) {
            return Ok(inner.observations[idx].clone());
        }

        inner.next_sequence += 1;
        let stored = Observation {
            id: obs.id,
            timeline_id: obs.timeline_id,
            device_id: obs.device_id,
            latitude: obs.latitude,
            longitude: obs.longitude,
            reverse_data: obs.reverse_data,
            event_type: obs.event_type,
            sequence: inner.next_sequence,
            recorded_at: obs.recorded_at,
        };
        let idx = inner.observations.len();
        inner.observations.push(stored.clone());
        inner.observation_ids.insert(obs.id, idx);
        Ok(stored)
    }

    async fn list_active_timelines(&self) -> Result<Vec<ActiveTimeline>, StoreError> {
        let inner = self.inner.read().await;
        let mut active: Vec<ActiveTimeline> = inner
            .timelines
            .values()
            .filter(|t| t.is_open())
            .map(|t| {
                let device = inner.devices.get(&t.device_id);
                ActiveTimeline {
                    id: t.id,
                    device_id: t.device_id,
                    device_name: device.map(|d| d.name.clone()).unwrap_or_default(),
                    device_os: device.map(|d| d.os.clone()).unwrap_or_default(),
                    start_time: t.start_time,
                }
            })
            .collect();
        active.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(active)
    }

    async fn list_observations(
        &self,
        timeline_id: Uuid,
        after: Option<i64>,
        limit: i64,
    ) -> Result<Vec<Observation>, StoreError> {
        let inner = self.inner.read().await;
        let cursor = after.unwrap_or(0);
        Ok(inner
            .observations
            .iter()
            .filter(|o| o.timeline_id == Some(timeline_id) && o.sequence > cursor)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn health(&self) -> Result<String, StoreError> {
        let inner = self.inner.read().await;
        Ok(format!(
            "memory: {} devices, {} timelines, {} observations",
            inner.devices.len(),
            inner.timelines.len(),
            inner.observations.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn new_obs(device_id: Uuid, timeline_id: Option<Uuid>, lat: f64) -> NewObservation {
        NewObservation {
            id: Uuid::new_v4(),
            timeline_id,
            device_id,
            latitude: lat,
            longitude: 2.0,
            reverse_data: None,
            event_type: EventKind::Ping,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_assigns_increasing_sequences() {
        let store = MemoryStore::new();
        let device = Uuid::new_v4();
        let tl = Uuid::new_v4();
        store.create_timeline(tl, device, Utc::now()).await.unwrap();

        let a = store.append_observation(new_obs(device, Some(tl), 1.0)).await.unwrap();
        let b = store.append_observation(new_obs(device, Some(tl), 2.0)).await.unwrap();
        assert!(b.sequence > a.sequence);
    }

    #[tokio::test]
    async fn append_is_idempotent_by_id() {
        let store = MemoryStore::new();
        let device = Uuid::new_v4();
        let obs = new_obs(device, None, 1.0);

        let first = store.append_observation(obs.clone()).await.unwrap();
        let second = store.append_observation(obs).await.unwrap();
        assert_eq!(first.sequence, second.sequence);

        let active = store.list_active_timelines().await.unwrap();
        assert!(active.is_empty());
    }

    #[tokio::test]
    async fn round_trip_preserves_fields() {
        let store = MemoryStore::new();
        let device = Uuid::new_v4();
        let tl = Uuid::new_v4();
        store.create_timeline(tl, device, Utc::now()).await.unwrap();

        let mut obs = new_obs(device, Some(tl), -12.5);
        obs.reverse_data = Some(serde_json::json!({"road": "Jalan Sudirman"}));
        let appended = store.append_observation(obs.clone()).await.unwrap();

        let page = store.list_observations(tl, None, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        let got = &page[0];
        assert_eq!(got.id, obs.id);
        assert_eq!(got.latitude, -12.5);
        assert_eq!(got.longitude, 2.0);
        assert_eq!(got.reverse_data, obs.reverse_data);
        assert_eq!(got.sequence, appended.sequence);
    }

    #[tokio::test]
    async fn observations_paginate_in_order() {
        let store = MemoryStore::new();
        let device = Uuid::new_v4();
        let tl = Uuid::new_v4();
        store.create_timeline(tl, device, Utc::now()).await.unwrap();

        for i in 0..5 {
            store
                .append_observation(new_obs(device, Some(tl), i as f64))
                .await
                .unwrap();
        }

        let first = store.list_observations(tl, None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let next = store
            .list_observations(tl, Some(first[1].sequence), 10)
            .await
            .unwrap();
        assert_eq!(next.len(), 3);

        let mut all: Vec<i64> = first.iter().chain(next.iter()).map(|o| o.sequence).collect();
        let sorted = {
            let mut s = all.clone();
            s.sort_unstable();
            s
        };
        assert_eq!(all, sorted);
        all.dedup();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn close_timeline_is_idempotent() {
        let store = MemoryStore::new();
        let device = Uuid::new_v4();
        let tl = Uuid::new_v4();
        store.create_timeline(tl, device, Utc::now()).await.unwrap();

        let closed = store.close_timeline(tl, Utc::now()).await.unwrap().unwrap();
        let first_end = closed.end_time.unwrap();
        let again = store.close_timeline(tl, Utc::now()).await.unwrap().unwrap();
        assert_eq!(again.end_time, Some(first_end));
    }

    #[tokio::test]
    async fn active_timelines_join_device_and_sort_newest_first() {
        let store = MemoryStore::new();
        let d1 = Uuid::new_v4();
        let d2 = Uuid::new_v4();
        store.upsert_device(d1, "Alpha", "Android").await.unwrap();
        store.upsert_device(d2, "Beta", "iOS").await.unwrap();

        let t0 = Utc::now();
        store
            .create_timeline(Uuid::new_v4(), d1, t0 - chrono::Duration::seconds(10))
            .await
            .unwrap();
        store.create_timeline(Uuid::new_v4(), d2, t0).await.unwrap();

        let active = store.list_active_timelines().await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].device_name, "Beta");
        assert_eq!(active[1].device_os, "Android");
    }

    #[tokio::test]
    async fn unknown_timeline_yields_empty_page() {
        let store = MemoryStore::new();
        let page = store
            .list_observations(Uuid::new_v4(), None, 10)
            .await
            .unwrap();
        assert!(page.is_empty());
    }
}
