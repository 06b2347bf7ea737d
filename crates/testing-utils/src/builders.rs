//! Test data builders with sensible defaults

use traza_core::{LogLevel, TrazaConfig};

/// Builder for a [`TrazaConfig`] suited to tests: loopback bind, debug logging.
pub struct TrazaConfigBuilder {
    config: TrazaConfig,
}

impl TrazaConfigBuilder {
    pub fn new() -> Self {
        let mut config = TrazaConfig::default();
        config.server.bind_address = "127.0.0.1:0".to_string();
        config.logging.level = LogLevel::Debug;
        config.apm.service_name = "traza-test".to_string();
        Self { config }
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.server.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_log_size(mut self, max_log_size: usize) -> Self {
        self.config.logging.max_log_size = Some(max_log_size);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.config.server.consumer_max_retries = max_retries;
        self
    }

    pub fn with_apm_active(mut self, active: bool) -> Self {
        self.config.apm.active = active;
        self
    }

    pub fn build(self) -> TrazaConfig {
        self.config
    }
}

impl Default for TrazaConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
