use thiserror::Error;

/// Top-level error type for Selah.
///
/// Subsystem crates define their own error types and implement
/// `From<SelahError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SelahError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<toml::de::Error> for SelahError {
    fn from(err: toml::de::Error) -> Self {
        SelahError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SelahError {
    fn from(err: toml::ser::Error) -> Self {
        SelahError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SelahError {
    fn from(err: serde_json::Error) -> Self {
        SelahError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Selah operations.
pub type Result<T> = std::result::Result<T, SelahError>;
