//! Controller settings. Every field has a default, so a configuration file only needs to list
//! what it changes.

use std::{fs, ops::RangeInclusive, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

use super::{Arena, ArenaError, TileCoord};

/// Each freakout iteration queues two motions per robot.
pub const MAX_FREAKOUT_ITERATIONS: u32 = 1_000;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Number of tiles on one side of the arena.
    pub arena_size: usize,
    /// Side length of the arena walls.
    pub arena_size_cm: f64,
    pub goal_locations: Vec<TileCoord>,
    /// Robots that must have reported before sensors are polled.
    pub number_of_devices: usize,
    /// Accepted distance between a robot and its tile center, in cm.
    pub max_center_misalignment: f64,
    /// Accepted deviation from north, in degrees.
    pub max_north_misalignment: f64,
    pub freakout_iterations: u32,
    pub freakout_distance: DistanceRange,
    /// Tile mapping failures tolerated before every robot freaks out.
    pub scramble_threshold: u32,
    pub loop_sleep_interval_ms: u64,
    /// Stop the controller after reporting a failed tick.
    pub raise_errors_after_catch: bool,
    /// Copy every message addressed to the movement level to the top level.
    pub dump_messages_to_main: bool,
    pub show_sensor_dumps: bool,
    pub robots_planned_per_iteration: usize,
    pub seed: Option<u64>,
    pub simulator: SimulatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arena_size: 5,
            arena_size_cm: 81.5,
            goal_locations: vec![
                TileCoord::new(2, 1),
                TileCoord::new(2, 2),
                TileCoord::new(2, 3),
            ],
            number_of_devices: 3,
            max_center_misalignment: 3.0,
            max_north_misalignment: 5.0,
            freakout_iterations: 1,
            freakout_distance: DistanceRange { min: 8, max: 16 },
            scramble_threshold: 5,
            loop_sleep_interval_ms: 1,
            raise_errors_after_catch: true,
            dump_messages_to_main: false,
            show_sensor_dumps: true,
            robots_planned_per_iteration: 3,
            seed: None,
            simulator: SimulatorConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.arena()?;
        if self.max_center_misalignment < 0.0 || self.max_north_misalignment < 0.0 {
            return Err(ConfigError::Invalid(
                "misalignment tolerances must not be negative".to_string(),
            ));
        }
        if self.freakout_distance.min > self.freakout_distance.max {
            return Err(ConfigError::Invalid(format!(
                "freakout distance range {}..={} is empty",
                self.freakout_distance.min, self.freakout_distance.max
            )));
        }
        if self.freakout_iterations > MAX_FREAKOUT_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "at most {MAX_FREAKOUT_ITERATIONS} freakout iterations are allowed"
            )));
        }
        if self.scramble_threshold == 0 {
            return Err(ConfigError::Invalid(
                "scramble threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn arena(&self) -> Result<Arena, ArenaError> {
        Arena::new(self.arena_size, self.arena_size_cm, &self.goal_locations)
    }

    pub fn loop_sleep_interval(&self) -> Duration {
        Duration::from_millis(self.loop_sleep_interval_ms)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
pub struct DistanceRange {
    pub min: u32,
    pub max: u32,
}

impl From<DistanceRange> for RangeInclusive<u32> {
    fn from(value: DistanceRange) -> Self {
        value.min..=value.max
    }
}

/// Settings of the built-in robot simulator standing in for the communication level.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulatorConfig {
    pub robots: usize,
    /// Largest random offset of a reported position, in cm.
    pub position_noise_cm: f64,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            robots: 3,
            position_noise_cm: 0.5,
            seed: None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_config_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.arena().unwrap().tiles().len(), 25);
        assert_eq!(config.loop_sleep_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_config_partial_file() {
        let config: Config = serde_json::from_str(
            r#"{"number_of_devices": 2, "goal_locations": [{"row": 0, "col": 4}],
                "simulator": {"robots": 2}}"#,
        )
        .unwrap();

        assert_eq!(config.number_of_devices, 2);
        assert_eq!(config.goal_locations, vec![TileCoord::new(0, 4)]);
        assert_eq!(config.simulator.robots, 2);
        assert_eq!(config.arena_size, 5);
        assert_eq!(config.freakout_distance, DistanceRange { min: 8, max: 16 });
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        assert!(serde_json::from_str::<Config>(r#"{"arena": 5}"#).is_err());
    }

    #[test]
    fn test_config_invalid_goal() {
        let config = Config {
            goal_locations: vec![TileCoord::new(9, 9)],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Arena(ArenaError::GoalOutOfBounds(..)))
        ));
    }

    #[test]
    fn test_config_invalid_freakout_range() {
        let config = Config {
            freakout_distance: DistanceRange { min: 20, max: 10 },
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_config_too_many_freakout_iterations() {
        let config = Config {
            freakout_iterations: u32::MAX,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(reason)) if reason == "at most 1000 freakout iterations are allowed"
        ));
        assert!(Config {
            freakout_iterations: MAX_FREAKOUT_ITERATIONS,
            ..Config::default()
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn test_config_load_missing_file() {
        assert!(matches!(
            Config::load(Path::new("/nonexistent/amoebots.json")),
            Err(ConfigError::Read { .. })
        ));
    }
}
