use std::path::PathBuf;
use std::str::FromStr;

use crate::game::constants::game::RESET_DELAY_SECS;
use crate::game::constants::physics::TICK_RATE;

/// Server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Physics driver rate in Hz
    pub tick_rate: u32,
    /// Maximum number of registered arenas
    pub max_arenas: usize,
    /// Root directory for player data and arena definitions
    pub data_dir: PathBuf,
    /// Lobby countdown between an arena becoming ready and the match start
    pub start_countdown_secs: u64,
    /// Delay between match end and arena reset
    pub reset_delay_secs: u64,
    /// Height of the flat world floor
    pub floor_y: f64,
    /// Port of the metrics endpoint
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: TICK_RATE,
            max_arenas: 100,
            data_dir: PathBuf::from("data"),
            start_countdown_secs: 10,
            reset_delay_secs: RESET_DELAY_SECS,
            floor_y: 0.0,
            metrics_port: 9090,
        }
    }
}

/// Parse `key` from the environment into `target` when it passes `accept`
fn env_override<T: FromStr>(key: &str, target: &mut T, accept: impl Fn(&T) -> bool, rule: &str) {
    let Ok(raw) = std::env::var(key) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(parsed) if accept(&parsed) => *target = parsed,
        Ok(_) => tracing::warn!("{} must be {}, using default", key, rule),
        Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        env_override("TICK_RATE", &mut config.tick_rate, |v| (1..=1000).contains(v), "1-1000");
        env_override("MAX_ARENAS", &mut config.max_arenas, |v| (1..=10000).contains(v), "1-10000");
        env_override("START_COUNTDOWN", &mut config.start_countdown_secs, |v| *v <= 3600, "<= 3600");
        env_override("RESET_DELAY", &mut config.reset_delay_secs, |v| *v <= 3600, "<= 3600");
        env_override("FLOOR_Y", &mut config.floor_y, |v| v.is_finite(), "finite");
        env_override("METRICS_PORT", &mut config.metrics_port, |v| *v > 0, "> 0");

        if let Ok(dir) = std::env::var("DATA_DIR") {
            if dir.trim().is_empty() {
                tracing::warn!("DATA_DIR is empty, using default");
            } else {
                config.data_dir = PathBuf::from(dir);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_rate == 0 {
            return Err("tick_rate must be at least 1".to_string());
        }
        if self.max_arenas == 0 {
            return Err("max_arenas must be at least 1".to_string());
        }
        if !self.floor_y.is_finite() {
            return Err("floor_y must be finite".to_string());
        }
        Ok(())
    }

    /// Wall-clock length of one tick
    pub fn tick_duration(&self) -> std::time::Duration {
        std::time::Duration::from_micros(1_000_000 / self.tick_rate.max(1) as u64)
    }
}
