//! Service configuration: TOML file, `TRAZA__*` environment overrides and
//! the flat legacy variables (`MAX_LOG_SIZE`, `APM_ACTIVE`).

use std::net::SocketAddr;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{TrazaError, TrazaResult};
use crate::logging::{parse_max_log_size, LogConfig};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/traza.toml", "traza.toml"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrazaConfig {
    pub logging: LogConfig,
    pub apm: ApmConfig,
    pub server: ServerConfig,
}

/// Tracing backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApmConfig {
    /// When false every tracing call is a no-op
    pub active: bool,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    /// OTLP/HTTP traces endpoint
    pub otlp_endpoint: String,
}

impl Default for ApmConfig {
    fn default() -> Self {
        Self {
            active: false,
            service_name: "traza".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
            otlp_endpoint: "http://localhost:4318/v1/traces".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Budget for one inbound HTTP request, enforced outside the interceptor
    pub request_timeout_ms: u64,
    /// Redeliveries of a message before it is dead-lettered
    pub consumer_max_retries: u32,
    pub reconciliation_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            request_timeout_ms: 30_000,
            consumer_max_retries: 3,
            reconciliation_interval_secs: 300,
        }
    }
}

impl TrazaConfig {
    /// Load from an explicit TOML file (which must exist) or the first default
    /// path found, then environment overrides, then legacy variables.
    pub fn load(config_path: Option<&str>) -> TrazaResult<Self> {
        let mut builder = Config::builder();

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(TrazaError::Configuration(format!(
                        "Configuration file not found: {path}"
                    )));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS
                    .iter()
                    .find(|path| Path::new(path).exists())
                {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("TRAZA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: TrazaConfig = builder.build()?.try_deserialize()?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Apply `MAX_LOG_SIZE` and `APM_ACTIVE` when present.
    ///
    /// A present but unusable `MAX_LOG_SIZE` switches truncation off.
    pub fn apply_legacy_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("MAX_LOG_SIZE") {
            self.logging.max_log_size = parse_max_log_size(Some(&raw));
        }

        if let Some(raw) = lookup("APM_ACTIVE") {
            self.apm.active = matches!(
                raw.trim().to_lowercase().as_str(),
                "true" | "1" | "yes" | "on"
            );
        }
    }

    pub fn from_toml(toml_str: &str) -> TrazaResult<Self> {
        let config: TrazaConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> TrazaResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> TrazaResult<()> {
        self.logging
            .validate()
            .map_err(TrazaError::Configuration)?;

        if self.apm.service_name.trim().is_empty() {
            return Err(TrazaError::Configuration(
                "apm.service_name must not be empty".to_string(),
            ));
        }

        if self.apm.active && self.apm.otlp_endpoint.trim().is_empty() {
            return Err(TrazaError::Configuration(
                "apm.otlp_endpoint is required when APM is active".to_string(),
            ));
        }

        self.bind_address()?;

        if self.server.request_timeout_ms == 0 {
            return Err(TrazaError::Configuration(
                "server.request_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn bind_address(&self) -> TrazaResult<SocketAddr> {
        self.server.bind_address.parse().map_err(|e| {
            TrazaError::Configuration(format!(
                "Invalid server.bind_address '{}': {e}",
                self.server.bind_address
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, OutputFormat};
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TrazaConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.apm.active);
        assert_eq!(config.logging.max_log_size, None);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = TrazaConfig::from_toml(
            r#"
            [logging]
            level = "debug"
            format = "compact"
            max_log_size = 4096

            [apm]
            active = true
            service_name = "pagos"
            "#,
        )
        .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, OutputFormat::Compact);
        assert_eq!(config.logging.max_log_size, Some(4096));
        assert!(config.apm.active);
        assert_eq!(config.apm.service_name, "pagos");
        assert_eq!(config.server.request_timeout_ms, 30_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = TrazaConfig::default();
        config.server.bind_address = "127.0.0.1:8080".to_string();
        let text = config.to_toml().unwrap();
        assert_eq!(TrazaConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = TrazaConfig::default();
        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        let mut config = TrazaConfig::default();
        config.server.request_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = TrazaConfig::default();
        config.apm.service_name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_env_max_log_size() {
        let mut config = TrazaConfig::default();
        config.apply_legacy_env(lookup_from(&[("MAX_LOG_SIZE", "512")]));
        assert_eq!(config.logging.max_log_size, Some(512));

        config.apply_legacy_env(lookup_from(&[("MAX_LOG_SIZE", "abc")]));
        assert_eq!(config.logging.max_log_size, None);

        config.logging.max_log_size = Some(64);
        config.apply_legacy_env(lookup_from(&[]));
        assert_eq!(config.logging.max_log_size, Some(64));
    }

    #[test]
    fn test_legacy_env_apm_active() {
        let mut config = TrazaConfig::default();
        config.apply_legacy_env(lookup_from(&[("APM_ACTIVE", "TRUE")]));
        assert!(config.apm.active);

        config.apply_legacy_env(lookup_from(&[("APM_ACTIVE", "false")]));
        assert!(!config.apm.active);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nbind_address = \"127.0.0.1:9000\"\nconsumer_max_retries = 5"
        )
        .unwrap();

        let config = TrazaConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.server.bind_address, "127.0.0.1:9000");
        assert_eq!(config.server.consumer_max_retries, 5);
        assert_eq!(
            config.bind_address().unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = TrazaConfig::load(Some("/definitely/not/here/traza.toml"));
        assert!(matches!(result, Err(TrazaError::Configuration(_))));
    }
}
