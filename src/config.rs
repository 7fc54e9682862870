//! Engine configuration

use crate::error::{Result, TradeError};
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::types::ActorId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest negotiation window a config may ask for (30 days)
pub const MAX_NEGOTIATION_WINDOW_SECS: u64 = 30 * 24 * 60 * 60;

/// Tunables for the negotiation and settlement core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a session may stay open, in seconds (default: 10 minutes)
    pub negotiation_window_secs: u64,

    /// Maximum number of asset lines per offer
    pub max_offer_lines: usize,

    /// Period of the expiry sweeper, in milliseconds
    pub sweep_interval_ms: u64,

    /// Upper bound on a single ledger/inventory call, in milliseconds
    pub collaborator_timeout_ms: u64,

    /// Attempts per compensating step before the trade is declared inconsistent
    pub compensation_attempts: u32,

    /// Ledger account that holds withdrawn currency between withdraw and deposit
    pub escrow_account: ActorId,

    /// Events buffered per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            negotiation_window_secs: 600,
            max_offer_lines: 12,
            sweep_interval_ms: 5_000,
            collaborator_timeout_ms: 2_000,
            compensation_attempts: 3,
            escrow_account: ActorId::nil(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.negotiation_window_secs == 0 {
            return Err(TradeError::Configuration(
                "negotiation_window_secs must be positive".to_string(),
            ));
        }
        if self.negotiation_window_secs > MAX_NEGOTIATION_WINDOW_SECS {
            return Err(TradeError::Configuration(format!(
                "negotiation_window_secs must be at most {}",
                MAX_NEGOTIATION_WINDOW_SECS
            )));
        }
        if self.max_offer_lines == 0 {
            return Err(TradeError::Configuration(
                "max_offer_lines must be positive".to_string(),
            ));
        }
        if self.sweep_interval_ms == 0 || self.collaborator_timeout_ms == 0 {
            return Err(TradeError::Configuration(
                "sweep and collaborator intervals must be positive".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(TradeError::Configuration(
                "event_capacity must be positive".to_string(),
            ));
        }
        if self.compensation_attempts == 0 {
            return Err(TradeError::Configuration(
                "compensation_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn negotiation_window(&self) -> Result<chrono::Duration> {
        i64::try_from(self.negotiation_window_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                TradeError::Configuration(format!(
                    "negotiation window of {}s is out of range",
                    self.negotiation_window_secs
                ))
            })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.collaborator_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.negotiation_window().unwrap(), chrono::Duration::minutes(10));
        assert_eq!(config.escrow_account, ActorId::nil());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_offer_lines": 4}"#).unwrap();
        assert_eq!(config.max_offer_lines, 4);
        assert_eq!(config.negotiation_window_secs, 600);
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let config = EngineConfig {
            compensation_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TradeError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_oversized_window() {
        let config = EngineConfig {
            negotiation_window_secs: u64::MAX,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TradeError::Configuration(_))
        ));
        assert!(config.negotiation_window().is_err());

        let longest = EngineConfig {
            negotiation_window_secs: MAX_NEGOTIATION_WINDOW_SECS,
            ..EngineConfig::default()
        };
        assert!(longest.validate().is_ok());
        assert_eq!(longest.negotiation_window().unwrap(), chrono::Duration::days(30));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("trade-escrow-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"negotiation_window_secs": 30}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.negotiation_window_secs, 30);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(EngineConfig::load(&path), Err(TradeError::Io(_))));
    }
}
