use std::{fs, io, path::Path};

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG: &str = include_str!("../package-content/lodestone_config.json5");

/// Errors raised while loading a [`TickConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("config io error: {0}")]
    Io(#[from] io::Error),
    /// The file is not valid json5 or has the wrong shape.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json5::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Simulation settings, loaded from `lodestone_config.json5`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TickConfig {
    /// Ticks per second the runner aims for.
    pub tick_rate: f64,
    /// Scheduled updates executed per tick at most. The rest stay queued.
    pub max_scheduled_ticks_per_tick: usize,
    /// Block events delivered per tick at most. The rest carry over.
    pub max_block_events_per_tick: usize,
    /// Maximum nesting of neighbour updates.
    pub max_update_depth: u32,
    /// Player-less ticks after which the entity pass is skipped.
    pub entity_idle_timeout_ticks: u32,
    /// Bound of the cross-thread mutation inbox.
    pub inbox_capacity: usize,
}

impl TickConfig {
    /// Loads the config at `path`, writing the bundled default there first if the file does not exist.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let config_str = fs::read_to_string(path)?;
            Self::parse(&config_str)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, DEFAULT_CONFIG)?;
            log::info!("Wrote default config to {}", path.display());
            Self::default()
        };
        Ok(config)
    }

    /// Parses and validates a json5 document. Missing fields take their defaults.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let config: TickConfig = serde_json5::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every field is in range.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first field out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=1000.0).contains(&self.tick_rate) {
            return Err(ConfigError::Invalid("Tick rate must be in range 1..1000"));
        }
        if self.max_scheduled_ticks_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "Max scheduled ticks per tick must be greater than 0",
            ));
        }
        if self.max_block_events_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "Max block events per tick must be greater than 0",
            ));
        }
        if self.max_update_depth == 0 {
            return Err(ConfigError::Invalid("Max update depth must be greater than 0"));
        }
        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid("Inbox capacity must be greater than 0"));
        }
        Ok(())
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20.0,
            max_scheduled_ticks_per_tick: 65536,
            max_block_events_per_tick: 65536,
            max_update_depth: 512,
            entity_idle_timeout_ticks: 1200,
            inbox_capacity: 1024,
        }
    }
}
