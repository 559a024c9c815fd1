use thiserror::Error;

#[derive(Error, Debug)]
pub enum VeditError {
    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VeditError>;
