use serde::{Deserialize, Serialize};

use crate::logging::log_level::LogLevel;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Output format of the diagnostic subscriber
    pub format: OutputFormat,
    /// Where structured execution entries are written
    pub sink: SinkKind,
    /// Maximum serialized size of request/response payloads; `None` means unlimited
    pub max_log_size: Option<usize>,
    /// Whether to include file and line of the call site
    pub include_location: bool,
    /// Whether to include thread ids
    pub include_thread_id: bool,
    /// Whether to include thread names
    pub include_thread_name: bool,
}

/// Output format of the diagnostic subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Multi-line human readable
    Pretty,
    /// Single-line human readable
    Compact,
}

/// Destination of structured execution entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Raw JSON lines on stdout
    Stdout,
    /// Re-emitted as `tracing` events through the installed subscriber
    Tracing,
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::errors::TrazaError;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.trim().to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" | "text" => Ok(OutputFormat::Compact),
            _ => Err(crate::errors::TrazaError::Configuration(format!(
                "Invalid log format: {format}"
            ))),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: OutputFormat::Json,
            sink: SinkKind::Stdout,
            max_log_size: None,
            include_location: false,
            include_thread_id: false,
            include_thread_name: false,
        }
    }
}

impl LogConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level_str) = std::env::var("LOG_LEVEL") {
            if let Ok(level) = level_str.parse::<LogLevel>() {
                config.level = level;
            }
        }

        if let Ok(format_str) = std::env::var("LOG_FORMAT") {
            config.format = format_str.parse().unwrap_or(OutputFormat::Json);
        }

        config.max_log_size = parse_max_log_size(std::env::var("MAX_LOG_SIZE").ok().as_deref());

        config
    }

    /// Create configuration with custom settings
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }

    /// Set output format
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the payload size limit
    pub fn with_max_log_size(mut self, max_log_size: Option<usize>) -> Self {
        self.max_log_size = max_log_size.filter(|size| *size > 0);
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_log_size == Some(0) {
            return Err("max_log_size must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}

/// Parse the `MAX_LOG_SIZE` setting.
///
/// Absent, empty, non-numeric and zero values all mean "unlimited".
pub fn parse_max_log_size(raw: Option<&str>) -> Option<usize> {
    raw.map(str::trim)
        .and_then(|value| value.parse::<usize>().ok())
        .filter(|size| *size > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_log_size() {
        assert_eq!(parse_max_log_size(Some("2048")), Some(2048));
        assert_eq!(parse_max_log_size(Some(" 10 ")), Some(10));
        assert_eq!(parse_max_log_size(Some("")), None);
        assert_eq!(parse_max_log_size(Some("lots")), None);
        assert_eq!(parse_max_log_size(Some("-5")), None);
        assert_eq!(parse_max_log_size(Some("0")), None);
        assert_eq!(parse_max_log_size(None), None);
    }

    #[test]
    fn test_builder_methods() {
        let config = LogConfig::with_level(LogLevel::Debug)
            .with_format(OutputFormat::Compact)
            .with_max_log_size(Some(0));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, OutputFormat::Compact);
        assert_eq!(config.max_log_size, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Compact);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_zero_size_is_invalid() {
        let config = LogConfig {
            max_log_size: Some(0),
            ..LogConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
