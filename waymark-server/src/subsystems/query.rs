//! Query service — read side, independent of the write path.
//!
//! Absence is not exceptional here: no open timelines is an empty list, an
//! unknown timeline id is an empty page.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use waymark_core::models::{ActiveTimeline, Observation};
use waymark_core::store::{StoreError, TrackStore};

use super::ledger::Ledger;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTimelinesResponse {
    pub timelines: Vec<ActiveTimeline>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDetailResponse {
    pub timeline_id: Uuid,
    pub observations: Vec<Observation>,
    pub count: usize,
    /// Cursor to resume reading; absent when the page was empty.
    pub next_after: Option<i64>,
}

/// All open timelines joined with device metadata, newest first.
pub async fn list_active_timelines(
    store: &Arc<dyn TrackStore>,
) -> Result<ActiveTimelinesResponse, StoreError> {
    let timelines = store.list_active_timelines().await?;
    let count = timelines.len();
    Ok(ActiveTimelinesResponse { timelines, count })
}

/// One page of a timeline's observations, ascending by sequence.
pub async fn timeline_detail(
    ledger: &Ledger,
    timeline_id: Uuid,
    after: Option<i64>,
    limit: Option<u32>,
) -> Result<TimelineDetailResponse, StoreError> {
    let observations = ledger.read_page(timeline_id, after, limit).await?;
    let count = observations.len();
    let next_after = observations.last().map(|o| o.sequence);
    Ok(TimelineDetailResponse {
        timeline_id,
        observations,
        count,
        next_after,
    })
}
