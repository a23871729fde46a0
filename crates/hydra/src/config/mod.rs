//! Driver and engine configuration
//!
//! [`HydraConfig`] loads from `.toml` or `.ron` files; every field has a
//! default, so a file only needs the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::foundation::Size;

/// Settings that round-trip through a file, picking the format by extension
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Read settings from a `.toml` or `.ron` file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let toml = path.ends_with(".toml");
        if !toml && !path.ends_with(".ron") {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        }
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if toml {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Write settings to a `.toml` or `.ron` file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Failures reading or writing a config file
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file contents are not valid settings
    #[error("invalid config: {0}")]
    Parse(String),

    /// The settings could not be encoded
    #[error("could not encode config: {0}")]
    Serialize(String),

    /// The extension is neither `.toml` nor `.ron`
    #[error("config file {0}: unsupported format, expected .toml or .ron")]
    UnsupportedFormat(String),
}

/// Requested graphics context version
///
/// With `core` unset the context is created as OpenGL ES with any profile,
/// which is what EGL-backed drivers hand out most reliably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlVersion {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Request a desktop core profile instead of GLES
    pub core: bool,
}

impl Default for GlVersion {
    fn default() -> Self {
        Self {
            major: 3,
            minor: 1,
            core: false,
        }
    }
}

/// Runtime configuration for the driver loop, window actors and the impulse engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraConfig {
    /// Context creation parameters installed when the backend starts
    pub gl: GlVersion,

    /// Size used for windows created without one (and for fullscreen requests)
    pub default_size: Size,

    /// Longest an owner loop waits for work before re-checking its liveness flags
    pub idle_cap_ms: u64,

    /// Pause granted to the backend after the last window closes
    pub no_windows_grace_ms: u64,

    /// Upper bound on how long a stopping driver waits for windows to finish destruction
    pub drain_timeout_ms: u64,

    /// Stop every window when Escape is pressed in any of them
    pub quit_on_escape: bool,

    /// Beat frequency of the impulse engine
    pub frequency_hz: u32,
}

impl Default for HydraConfig {
    fn default() -> Self {
        Self {
            gl: GlVersion::default(),
            default_size: Size::default(),
            idle_cap_ms: 1,
            no_windows_grace_ms: 1000,
            drain_timeout_ms: 2000,
            quit_on_escape: true,
            frequency_hz: 60,
        }
    }
}

impl Config for HydraConfig {}

impl HydraConfig {
    /// Idle cap as a duration
    pub const fn idle_cap(&self) -> Duration {
        Duration::from_millis(self.idle_cap_ms)
    }

    /// Shutdown grace period as a duration
    pub const fn no_windows_grace(&self) -> Duration {
        Duration::from_millis(self.no_windows_grace_ms)
    }

    /// Drain timeout as a duration
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Beat period of the impulse engine
    pub fn beat_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.frequency_hz.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = HydraConfig::default();
        assert_eq!(config.default_size, Size::new(640, 480));
        assert_eq!(config.gl, GlVersion { major: 3, minor: 1, core: false });
        assert_eq!(config.idle_cap(), Duration::from_millis(1));
        assert_eq!(config.no_windows_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config: HydraConfig = toml::from_str(
            r#"
            idle_cap_ms = 4
            [default_size]
            width = 800
            height = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.idle_cap_ms, 4);
        assert_eq!(config.default_size, Size::new(800, 600));
        assert_eq!(config.gl, GlVersion::default());
        assert!(config.quit_on_escape);
    }

    #[test]
    fn test_save_and_load_ron() {
        let path = std::env::temp_dir().join(format!("hydra-config-{}.ron", std::process::id()));
        let path = path.to_str().unwrap();

        let mut config = HydraConfig::default();
        config.gl.core = true;
        config.frequency_hz = 144;
        config.save_to_file(path).unwrap();

        let loaded = HydraConfig::load_from_file(path).unwrap();
        std::fs::remove_file(path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let err = HydraConfig::load_from_file("hydra.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
        assert_eq!(
            err.to_string(),
            "config file hydra.yaml: unsupported format, expected .toml or .ron"
        );
    }

    #[test]
    fn test_beat_period_never_divides_by_zero() {
        let config = HydraConfig {
            frequency_hz: 0,
            ..HydraConfig::default()
        };
        assert_eq!(config.beat_period(), Duration::from_secs(1));
    }
}
