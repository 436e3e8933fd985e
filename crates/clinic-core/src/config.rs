//! Clinic configuration
//!
//! Loaded once at session start from JSON. Missing keys fall back to the
//! defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::units::UnitSystem;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not parse clinic config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid clinic config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClinicConfig {
    pub clinic_name: String,
    /// Cards expiring in fewer days than this are "expiring soon".
    pub expiring_soon_days: i64,
    /// Simulated latency of the mocked BHYT lookup.
    pub lookup_delay_ms: u64,
    pub unit_system: UnitSystem,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            clinic_name: "Mycelix Clinic".to_string(),
            expiring_soon_days: 30,
            lookup_delay_ms: 1500,
            unit_system: UnitSystem::Metric,
        }
    }
}

impl ClinicConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: ClinicConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clinic_name.trim().is_empty() {
            return Err(ConfigError::Invalid("clinic_name cannot be empty".to_string()));
        }
        if self.expiring_soon_days <= 0 {
            return Err(ConfigError::Invalid(format!(
                "expiring_soon_days must be positive, got {}",
                self.expiring_soon_days
            )));
        }
        Ok(())
    }

    pub fn lookup_delay(&self) -> Duration {
        Duration::from_millis(self.lookup_delay_ms)
    }
}
