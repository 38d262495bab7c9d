use crate::backoff::BackoffStrategy;
use crate::error::ConfigError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Knobs for one transfer run. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    /// Starting funds of each account.
    pub initial_balance: i64,
    /// Amount moved by every transfer.
    pub transfer_amount: i64,
    /// Transfers attempted by each worker.
    pub iterations: u64,
    /// Delay between two progress reports.
    pub report_interval_ms: u64,
    /// Consecutive reports without progress before a run counts as stalled.
    pub stall_reports: u32,
    pub backoff: BackoffStrategy,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            initial_balance: 1000,
            transfer_amount: 1,
            iterations: 1000,
            report_interval_ms: 100,
            stall_reports: 20,
            backoff: BackoffStrategy::default(),
        }
    }
}

impl DemoConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DemoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_balance < 0 {
            return Err(ConfigError::invalid_value(
                "initial_balance",
                format!("must not be negative (got {})", self.initial_balance),
            ));
        }
        // Either account may end up holding both starting balances.
        if self.initial_balance.checked_mul(2).is_none() {
            return Err(ConfigError::invalid_value(
                "initial_balance",
                format!("too large for two accounts to share (got {})", self.initial_balance),
            ));
        }
        if self.transfer_amount <= 0 {
            return Err(ConfigError::invalid_value(
                "transfer_amount",
                format!("must be positive (got {})", self.transfer_amount),
            ));
        }
        if self.iterations == 0 {
            return Err(ConfigError::invalid_value("iterations", "must be greater than zero"));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                "report_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.stall_reports == 0 {
            return Err(ConfigError::invalid_value("stall_reports", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }
}
