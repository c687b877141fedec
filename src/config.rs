//! Settings read from a TOML file. Every field has a default, so an empty file is valid.

use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use bevy::log::Level;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    domain::{Arena, AutopilotConfig, KinematicsConfig, LayoutConfig},
    transport::BrokerConfig,
};

pub const DEFAULT_CONFIG_PATH: &str = "warehouse.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid log level {0:?}")]
    InvalidLogLevel(String),
    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub arena: Arena,
    pub layout: LayoutConfig,
    pub kinematics: KinematicsConfig,
    pub simulation: SimulationConfig,
    pub autopilot: AutopilotConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub tick_rate_hz: f64,
    /// Ticks between two world status broadcasts.
    pub status_interval_ticks: u64,
    pub max_forklifts: usize,
    pub topic_queue_capacity: usize,
    /// Stops the simulation after this many ticks, runs forever if absent.
    pub max_ticks: Option<u64>,
    pub token_file: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            status_interval_ticks: 60,
            max_forklifts: 10,
            topic_queue_capacity: 4,
            max_ticks: None,
            token_file: PathBuf::from("tokens.csv"),
        }
    }
}

impl SimulationConfig {
    /// Duration of one fixed tick.
    pub fn tick_period(&self) -> Result<Duration, ConfigError> {
        let invalid = |reason: &str| ConfigError::Invalid {
            field: "simulation.tick_rate_hz",
            reason: reason.to_owned(),
        };
        if !(self.tick_rate_hz > 0.0) {
            return Err(invalid("must be positive"));
        }
        match Duration::try_from_secs_f64(1.0 / self.tick_rate_hz) {
            Ok(period) if !period.is_zero() => Ok(period),
            Ok(_) => Err(invalid("too high")),
            Err(_) => Err(invalid("too low")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    pub level: String,
    /// Additional per-target directives, e.g. `rumqttc=warn`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            filter: "rumqttc=warn".to_owned(),
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.level.trim())
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

impl SimulatorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: SimulatorConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_owned(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named on the command line, or the default file if present.
    pub fn load(args: impl IntoIterator<Item = String>) -> Result<Self, ConfigError> {
        match config_path(args) {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_owned(),
            })
        };
        if !(self.arena.width > 0.0 && self.arena.height > 0.0) {
            return invalid("arena", "width and height must be positive");
        }
        self.simulation.tick_period()?;
        if self.simulation.status_interval_ticks == 0 {
            return invalid("simulation.status_interval_ticks", "must be at least 1");
        }
        if self.simulation.topic_queue_capacity == 0 {
            return invalid("simulation.topic_queue_capacity", "must be at least 1");
        }
        if !(self.autopilot.sensor_radius < self.autopilot.long_sensor_radius) {
            return invalid(
                "autopilot.sensor_radius",
                "must be smaller than autopilot.long_sensor_radius",
            );
        }
        self.logging.level()?;
        Ok(())
    }
}

/// Supports `<bin> <path>` and `<bin> --config <path>`.
fn config_path(args: impl IntoIterator<Item = String>) -> Option<PathBuf> {
    let args = args.into_iter().skip(1).collect::<Vec<_>>();
    if let Some(i) = args.iter().position(|arg| arg == "--config" || arg == "-c") {
        return args.get(i + 1).map(PathBuf::from);
    }
    args.into_iter()
        .find(|arg| !arg.starts_with('-'))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[rstest]
    #[case::none(&["sim"], None)]
    #[case::positional(&["sim", "a.toml"], Some("a.toml"))]
    #[case::flag(&["sim", "--config", "b.toml"], Some("b.toml"))]
    #[case::short_flag(&["sim", "-c", "c.toml"], Some("c.toml"))]
    #[case::flag_without_value(&["sim", "--config"], None)]
    fn test_config_path(#[case] arguments: &[&str], #[case] expected: Option<&str>) {
        assert_eq!(config_path(args(arguments)), expected.map(PathBuf::from));
    }

    #[test]
    fn test_empty_config_gives_defaults() {
        let config: SimulatorConfig = toml::from_str("").unwrap();
        assert_eq!(config, SimulatorConfig::default());
        config.validate().unwrap();
        assert_eq!(config.logging.level().unwrap(), Level::INFO);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config: SimulatorConfig = toml::from_str(include_str!("../warehouse.toml")).unwrap();
        assert_eq!(config, SimulatorConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config: SimulatorConfig = toml::from_str(
            r#"
            [arena]
            width = 1000.0

            [layout]
            seed = 7

            [simulation]
            max_ticks = 600

            [broker]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.arena.width, 1000.0);
        assert_eq!(config.arena.height, 600.0);
        assert_eq!(config.layout.seed, Some(7));
        assert_eq!(config.layout.containers, 50);
        assert_eq!(config.simulation.max_ticks, Some(600));
        assert_eq!(config.simulation.tick_rate_hz, 60.0);
        assert!(!config.broker.enabled);
        assert_eq!(config.broker.topic_prefix, "warehouse");
    }

    #[rstest]
    #[case::arena("[arena]\nwidth = 0.0", "arena")]
    #[case::tick_rate("[simulation]\ntick_rate_hz = -1.0", "simulation.tick_rate_hz")]
    #[case::tick_rate_too_low("[simulation]\ntick_rate_hz = 1e-300", "simulation.tick_rate_hz")]
    #[case::tick_rate_too_high("[simulation]\ntick_rate_hz = 1e300", "simulation.tick_rate_hz")]
    #[case::sensors("[autopilot]\nsensor_radius = 300.0", "autopilot.sensor_radius")]
    fn test_validate_rejects(#[case] toml: &str, #[case] expected: &str) {
        let config: SimulatorConfig = toml::from_str(toml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == expected
        ));
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(
            SimulationConfig::default().tick_period().unwrap(),
            Duration::from_secs_f64(1.0 / 60.0)
        );
    }

    #[test]
    fn test_validate_rejects_log_level() {
        let config: SimulatorConfig = toml::from_str("[logging]\nlevel = \"loud\"").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn test_from_file_reports_path() {
        let error = SimulatorConfig::from_file("does/not/exist.toml").unwrap_err();
        assert!(matches!(error, ConfigError::Io { ref path, .. } if path == Path::new("does/not/exist.toml")));
    }
}
