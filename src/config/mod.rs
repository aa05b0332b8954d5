//! Configuration management for StakeDuel
//!
//! Centralized configuration with:
//! - Environment-based loading (dev, staging, prod)
//! - Runtime validation
//! - Environment-variable overrides

use crate::error::{Error, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Server-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0".to_string(),
            listen_port: 8090,
            log_level: "info".to_string(),
        }
    }
}

/// Match and turn-timer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// How long the current player has to move before forfeiting
    #[serde(with = "humantime_serde")]
    pub turn_timeout: Duration,
    /// Minimum accepted stake per player
    pub min_stake: Decimal,
    /// Maximum accepted stake per player
    pub max_stake: Decimal,
    /// How long a settled match stays readable before eviction
    #[serde(with = "humantime_serde")]
    pub eviction_grace: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(45),
            min_stake: dec!(1),
            max_stake: dec!(10000),
            eviction_grace: Duration::from_secs(60),
        }
    }
}

/// Settlement and anti-abuse configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Platform fee on real-money wins, in percent. The only place this
    /// value lives.
    pub fee_percent: Decimal,
    /// Matches settled faster than this are flagged as suspicious
    #[serde(with = "humantime_serde")]
    pub fast_win_threshold: Duration,
    /// Self-aborts per 24h before a player is flagged
    pub abort_flag_threshold: u32,
    /// Matches between the same pair per 24h before both are flagged
    pub collusion_flag_threshold: u32,
    /// Rolling window for the abort and collusion counters
    #[serde(with = "humantime_serde")]
    pub heuristics_window: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            fee_percent: dec!(10),
            fast_win_threshold: Duration::from_secs(10),
            abort_flag_threshold: 3,
            collusion_flag_threshold: 5,
            heuristics_window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Recovery sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// How often the sweeper scans for stuck matches
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// An active match with no progress for this long is force-refunded
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(600),
            stale_after: Duration::from_secs(3600),
        }
    }
}

/// Environment enumeration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let env = env::var("STAKEDUEL_ENV").unwrap_or_else(|_| "development".to_string());

        let environment = match env.to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            "testing" | "test" => Environment::Testing,
            _ => Environment::Development,
        };

        let config_path = Self::get_config_path(&environment);
        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Config::default()
        };

        config.override_from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Get configuration file path based on environment
    fn get_config_path(environment: &Environment) -> PathBuf {
        let base_path = env::var("STAKEDUEL_CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        let filename = match environment {
            Environment::Production => "production.toml",
            Environment::Staging => "staging.toml",
            Environment::Testing => "testing.toml",
            Environment::Development => "development.toml",
        };

        PathBuf::from(base_path).join(filename)
    }

    /// Override configuration with environment variables
    fn override_from_env(&mut self) -> Result<()> {
        if let Ok(val) = env::var("STAKEDUEL_LISTEN_PORT") {
            self.server.listen_port = val
                .parse()
                .map_err(|_| Error::Config("Invalid listen port".to_string()))?;
        }

        if let Ok(val) = env::var("STAKEDUEL_TURN_TIMEOUT_SECS") {
            let secs: u64 = val
                .parse()
                .map_err(|_| Error::Config("Invalid turn timeout".to_string()))?;
            self.game.turn_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = env::var("STAKEDUEL_FEE_PERCENT") {
            self.settlement.fee_percent = val
                .parse()
                .map_err(|_| Error::Config("Invalid fee percent".to_string()))?;
        }

        if let Ok(val) = env::var("STAKEDUEL_STALE_AFTER_SECS") {
            let secs: u64 = val
                .parse()
                .map_err(|_| Error::Config("Invalid staleness threshold".to_string()))?;
            self.sweeper.stale_after = Duration::from_secs(secs);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.game.turn_timeout < Duration::from_secs(5) {
            return Err(Error::Config("Turn timeout must be >= 5s".to_string()));
        }

        if self.game.min_stake <= Decimal::ZERO {
            return Err(Error::Config("Min stake must be positive".to_string()));
        }

        if self.game.min_stake > self.game.max_stake {
            return Err(Error::Config("Min stake cannot exceed max stake".to_string()));
        }

        if self.settlement.fee_percent < Decimal::ZERO
            || self.settlement.fee_percent > dec!(100)
        {
            return Err(Error::Config(
                "Fee percent must be between 0 and 100".to_string(),
            ));
        }

        if self.sweeper.stale_after < self.game.turn_timeout {
            return Err(Error::Config(
                "Staleness threshold must not be shorter than the turn timeout".to_string(),
            ));
        }

        Ok(())
    }
}
