use std::path::Path;
use std::time::Duration;

use presence_core::LivenessThresholds;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Capture session configuration. Constant for the lifetime of a session.
///
/// Loaded from an optional TOML file, then overridden by `PRESENCE_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Accepted frames needed before the liveness check runs.
    pub required_frames: usize,
    /// Cadence of the capture loop, in milliseconds.
    pub capture_interval_ms: u64,
    /// Overall capture deadline, in milliseconds, counted from the end of warmup.
    pub session_timeout_ms: u64,
    /// Delay after acquiring the camera before capture begins (AGC/AE settling).
    pub warmup_ms: u64,
    /// Upper bound on waiting for a location fix before capture.
    pub geo_timeout_ms: u64,
    /// Motion bounds for the liveness check.
    pub liveness: LivenessThresholds,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            required_frames: 8,
            capture_interval_ms: 600,
            session_timeout_ms: 25_000,
            warmup_ms: 2_000,
            geo_timeout_ms: 15_000,
            liveness: LivenessThresholds::default(),
        }
    }
}

impl CaptureConfig {
    /// Build a validated config with default warmup, geolocation and liveness settings.
    pub fn new(
        required_frames: usize,
        capture_interval: Duration,
        session_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            required_frames,
            capture_interval_ms: capture_interval.as_millis() as u64,
            session_timeout_ms: session_timeout.as_millis() as u64,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PRESENCE_*` environment variables, validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_env_overrides(self) -> Self {
        Self {
            required_frames: env_usize("PRESENCE_REQUIRED_FRAMES", self.required_frames),
            capture_interval_ms: env_u64("PRESENCE_CAPTURE_INTERVAL_MS", self.capture_interval_ms),
            session_timeout_ms: env_u64("PRESENCE_SESSION_TIMEOUT_MS", self.session_timeout_ms),
            warmup_ms: env_u64("PRESENCE_WARMUP_MS", self.warmup_ms),
            geo_timeout_ms: env_u64("PRESENCE_GEO_TIMEOUT_MS", self.geo_timeout_ms),
            liveness: LivenessThresholds {
                min_avg_variation: env_f64(
                    "PRESENCE_LIVENESS_MIN_AVG",
                    self.liveness.min_avg_variation,
                ),
                max_avg_variation: env_f64(
                    "PRESENCE_LIVENESS_MAX_AVG",
                    self.liveness.max_avg_variation,
                ),
                max_peak_variation: env_f64(
                    "PRESENCE_LIVENESS_MAX_PEAK",
                    self.liveness.max_peak_variation,
                ),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.required_frames < 1 {
            return Err(ConfigError::Invalid(
                "required_frames must be at least 1".to_string(),
            ));
        }
        if self.capture_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "capture_interval_ms must be positive".to_string(),
            ));
        }
        if self.session_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "session_timeout_ms must be positive".to_string(),
            ));
        }
        if self.geo_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "geo_timeout_ms must be positive".to_string(),
            ));
        }
        let l = &self.liveness;
        if l.min_avg_variation >= l.max_avg_variation {
            return Err(ConfigError::Invalid(format!(
                "liveness band is empty: min {} >= max {}",
                l.min_avg_variation, l.max_avg_variation
            )));
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_millis(self.geo_timeout_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
