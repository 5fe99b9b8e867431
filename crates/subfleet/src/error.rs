use crate::link::LinkError;

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("controller not initialized")]
    NotInitialized,
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("no vehicle with system id {0}")]
    UnknownVehicle(u8),
    #[error("mode '{0}' not available for this vehicle")]
    ModeNotAvailable(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
