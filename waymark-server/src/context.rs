//! Process-wide wiring. Built once in main and passed by reference —
//! there is no global broadcaster or store.

use std::sync::Arc;

use waymark_core::store::TrackStore;
use waymark_core::WaymarkConfig;

use crate::subsystems::broadcast::Broadcaster;
use crate::subsystems::ledger::Ledger;
use crate::subsystems::session::SessionTracker;

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn TrackStore>,
    pub ledger: Ledger,
    pub sessions: Arc<SessionTracker>,
    pub broadcaster: Arc<Broadcaster>,
    pub config: WaymarkConfig,
}

impl AppContext {
    pub fn new(store: Arc<dyn TrackStore>, config: WaymarkConfig) -> Self {
        let ledger = Ledger::new(store.clone());
        let sessions = Arc::new(SessionTracker::new(
            store.clone(),
            ledger.clone(),
            config.ingest.clone(),
        ));
        Self {
            store,
            ledger,
            sessions,
            broadcaster: Arc::new(Broadcaster::new()),
            config,
        }
    }
}
