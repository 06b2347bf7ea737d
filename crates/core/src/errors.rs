use thiserror::Error;

/// Errors raised by the core building blocks (configuration, serialization).
///
/// Execution failures of wrapped operations never surface as this type: they
/// are normalized into [`crate::ApiErrorEnvelope`] by the interceptor.
#[derive(Debug, Error)]
pub enum TrazaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unified result type for the core crate
pub type TrazaResult<T> = std::result::Result<T, TrazaError>;
