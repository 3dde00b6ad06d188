pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod ipc;
pub mod mem_store;
pub mod models;
pub mod pg_store;
pub mod store;

pub use config::WaymarkConfig;
pub use error::TrackError;
pub use event::{normalize, CanonicalEvent, EventKind, ValidationError};
pub use store::{create_store, StoreError, TrackStore};
