//! Engine configuration
//!
//! Immutable per engine instance. Resolution order when loading from the
//! environment: `CINE_ENGINE_CONFIG` env var, explicit path, compiled
//! defaults. Every field has a default so partial TOML files are fine.

use cine_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Frame rate bounds (fps)
pub const FRAME_RATE_MIN: f64 = 1.0;
pub const FRAME_RATE_MAX: f64 = 60.0;

/// Playback speed multiplier bounds
pub const SPEED_MIN: f64 = 0.1;
pub const SPEED_MAX: f64 = 5.0;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frame rate applied to a freshly constructed engine (fps)
    pub default_frame_rate: f64,

    /// Target number of buffered slices; also the base for adaptive
    /// radius rescaling
    pub buffer_size: usize,

    /// Slices ahead/behind the cursor the planner keeps warm
    pub preload_radius: usize,

    /// Compute the smoothness score from frame-time variance; when off the
    /// score reports a fixed 1.0
    pub enable_smoothing: bool,

    /// Re-plan buffering after navigation and retune the radius from
    /// observed latency/health
    pub adaptive_buffering: bool,

    /// In-flight load cap enforced by the concurrency gate
    pub max_concurrent_loads: usize,

    /// Per-load deadline (seconds); a stuck loader must not hold a gate
    /// permit forever
    pub load_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_frame_rate: 10.0,
            buffer_size: 20,
            preload_radius: 5,
            enable_smoothing: true,
            adaptive_buffering: true,
            max_concurrent_loads: 3,
            load_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Validate and normalize
    ///
    /// Numeric fields with a defined legal range are clamped; structural
    /// zeros (no buffer, no gate permits) are rejected.
    pub fn validated(mut self) -> Result<Self> {
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be at least 1".into()));
        }
        if self.max_concurrent_loads == 0 {
            return Err(Error::Config("max_concurrent_loads must be at least 1".into()));
        }
        if self.preload_radius == 0 {
            return Err(Error::Config("preload_radius must be at least 1".into()));
        }
        if self.load_timeout_secs == 0 {
            return Err(Error::Config("load_timeout_secs must be at least 1".into()));
        }
        self.default_frame_rate = self.default_frame_rate.clamp(FRAME_RATE_MIN, FRAME_RATE_MAX);
        Ok(self)
    }

    /// Parse from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validated()
    }

    /// Load configuration
    ///
    /// Priority order: `CINE_ENGINE_CONFIG` environment variable, then the
    /// given path, then compiled defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_path) = std::env::var("CINE_ENGINE_CONFIG") {
            let text = std::fs::read_to_string(&env_path)
                .map_err(|e| Error::Config(format!("{env_path}: {e}")))?;
            return Self::from_toml_str(&text);
        }

        if let Some(path) = path {
            let text = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
            return Self::from_toml_str(&text);
        }

        Ok(Self::default())
    }

    /// Gate deadline as a `Duration`
    pub fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default().validated().unwrap();
        assert_eq!(config.buffer_size, 20);
        assert_eq!(config.max_concurrent_loads, 3);
        assert_eq!(config.load_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("preload_radius = 8\n").unwrap();
        assert_eq!(config.preload_radius, 8);
        assert_eq!(config.buffer_size, 20);
        assert!(config.adaptive_buffering);
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let err = EngineConfig::from_toml_str("buffer_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("buffer_size"));
    }

    #[test]
    fn test_frame_rate_clamped_not_rejected() {
        let config = EngineConfig::from_toml_str("default_frame_rate = 240.0\n").unwrap();
        assert_eq!(config.default_frame_rate, FRAME_RATE_MAX);

        let config = EngineConfig::from_toml_str("default_frame_rate = 0.25\n").unwrap();
        assert_eq!(config.default_frame_rate, FRAME_RATE_MIN);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("buffer_size = \"many\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
