use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Validation error: {0}")]
    Validation(#[from] crate::event::ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Other error: {0}")]
    Other(String),
}
