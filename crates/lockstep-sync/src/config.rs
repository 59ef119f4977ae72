//! Participant clock configuration
//!
//! Loaded from TOML with kebab-case keys; every field has a default.
//!
//! ```toml
//! [clock]
//! main-clock = "local_system_simtime"
//! step-size = 100000000
//! time-factor = 1.0
//!
//! [clock-synchronization]
//! timing-master = "master"
//! sync-cycle-time = 100000000
//! ```

use std::path::Path;
use std::str::FromStr;

use lockstep_clock::{ClockError, DEFAULT_STEP_SIZE, DEFAULT_TIME_FACTOR};
use lockstep_core::{Duration, LOCAL_SYSTEM_REAL_CLOCK};
use serde::Deserialize;
use thiserror::Error;

use crate::{SyncError, DEFAULT_TIME_UPDATE_TIMEOUT};

/// Default pull period of the interpolating slave: 100 ms
pub const DEFAULT_SYNC_CYCLE_TIME: Duration = Duration::from_millis(100);

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub clock_synchronization: ClockSyncConfig,
}

impl Config {
    /// Parse config from file
    pub fn from_file(file: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(file)?;
        contents.parse()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

/// `[clock]`: main clock selection and simulation clock pacing
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ClockConfig {
    pub main_clock: String,
    /// Simulation clock step in nanoseconds
    pub step_size: i64,
    /// Simulation clock pacing, 0.0 runs as fast as possible
    pub time_factor: f64,
    /// Per-slave RPC timeout of the master fan-out in nanoseconds
    pub time_update_timeout: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            main_clock: LOCAL_SYSTEM_REAL_CLOCK.to_string(),
            step_size: DEFAULT_STEP_SIZE.as_nanos(),
            time_factor: DEFAULT_TIME_FACTOR,
            time_update_timeout: DEFAULT_TIME_UPDATE_TIMEOUT.as_nanos(),
        }
    }
}

impl ClockConfig {
    pub fn step_size(&self) -> Duration {
        Duration(self.step_size)
    }

    pub fn time_update_timeout(&self) -> Duration {
        Duration(self.time_update_timeout)
    }

    /// Check that the simulation clock settings are usable
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.step_size <= 0 {
            return Err(ClockError::InvalidStepSize(self.step_size()).into());
        }
        if !self.time_factor.is_finite() || self.time_factor < 0.0 {
            return Err(ClockError::InvalidTimeFactor(self.time_factor).into());
        }
        Ok(())
    }
}

/// `[clock-synchronization]`: slave side settings
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
pub struct ClockSyncConfig {
    /// Participant name of the timing master
    pub timing_master: String,
    /// Pull period of the interpolating slave in nanoseconds
    pub sync_cycle_time: i64,
    /// Discrete slave: subscribe to and forward the before/after update events
    pub forward_update_brackets: bool,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        ClockSyncConfig {
            timing_master: String::new(),
            sync_cycle_time: DEFAULT_SYNC_CYCLE_TIME.as_nanos(),
            forward_update_brackets: false,
        }
    }
}

impl ClockSyncConfig {
    pub fn sync_cycle_time(&self) -> Duration {
        Duration(self.sync_cycle_time)
    }

    /// Check the settings a timing slave cannot run without
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.timing_master.trim().is_empty() {
            return Err(SyncError::MissingTimingMaster);
        }
        if self.sync_cycle_time <= 0 {
            return Err(SyncError::InvalidSyncCycleTime(self.sync_cycle_time));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("io error while reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("config toml parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::{LOCAL_SYSTEM_SIM_CLOCK, SLAVE_MASTER_ON_DEMAND};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = "".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.clock.main_clock, LOCAL_SYSTEM_REAL_CLOCK);
        assert_eq!(config.clock.step_size(), Duration::from_millis(100));
        assert_eq!(config.clock.time_factor, 1.0);
        assert_eq!(config.clock.time_update_timeout(), Duration::from_secs(5));
        assert_eq!(config.clock_synchronization.sync_cycle_time(), Duration::from_millis(100));
        assert!(config.clock_synchronization.timing_master.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = r#"
            [clock]
            main-clock = "local_system_simtime"
            step-size = 10000000
            time-factor = 0.0

            [clock-synchronization]
            timing-master = "master"
            sync-cycle-time = 50000000
            forward-update-brackets = true
        "#
        .parse()
        .unwrap();

        assert_eq!(config.clock.main_clock, LOCAL_SYSTEM_SIM_CLOCK);
        assert_eq!(config.clock.step_size(), Duration::from_millis(10));
        assert_eq!(config.clock.time_factor, 0.0);
        assert_eq!(config.clock_synchronization.timing_master, "master");
        assert_eq!(config.clock_synchronization.sync_cycle_time(), Duration::from_millis(50));
        assert!(config.clock_synchronization.forward_update_brackets);
        assert!(config.clock.validate().is_ok());
        assert!(config.clock_synchronization.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = format!("[clock]\nmain-clock = \"{SLAVE_MASTER_ON_DEMAND}\"\nspeed = 2\n")
            .parse::<Config>();
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_missing_timing_master() {
        let config = ClockSyncConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SyncError::MissingTimingMaster));
        assert!(err.to_string().starts_with("No timing master configured"));
    }

    #[test]
    fn test_invalid_sync_cycle_time() {
        let config = ClockSyncConfig {
            timing_master: "master".to_string(),
            sync_cycle_time: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, SyncError::InvalidSyncCycleTime(0)));
        assert_eq!(
            err.to_string(),
            "Invalid slave sync cycle time of 0. Slave sync cycle time has to be > 0."
        );
    }

    #[test]
    fn test_invalid_clock_settings() {
        let config = ClockConfig {
            time_factor: -2.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncError::Clock(ClockError::InvalidTimeFactor(_)))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/lockstep.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
