//! Configuration file handling

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Report output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for each setup command
    #[serde(default = "default_setup")]
    pub setup_secs: u64,

    /// Timeout for each scenario step
    #[serde(default = "default_step")]
    pub step_secs: u64,

    /// Timeout for each teardown command
    #[serde(default = "default_teardown")]
    pub teardown_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            setup_secs: default_setup(),
            step_secs: default_step(),
            teardown_secs: default_teardown(),
        }
    }
}

fn default_setup() -> u64 {
    300
}
fn default_step() -> u64 {
    60
}
fn default_teardown() -> u64 {
    120
}

impl Timeouts {
    /// A zero timeout would kill every command immediately
    pub fn validate(&self) -> Result<()> {
        for (key, secs) in [
            ("setup_secs", self.setup_secs),
            ("step_secs", self.step_secs),
            ("teardown_secs", self.teardown_secs),
        ] {
            if secs == 0 {
                return Err(super::Error::Config(format!(
                    "timeouts.{key} must be at least 1"
                )));
            }
        }
        Ok(())
    }

    pub fn setup(&self) -> Duration {
        Duration::from_secs(self.setup_secs)
    }

    pub fn step(&self) -> Duration {
        Duration::from_secs(self.step_secs)
    }

    pub fn teardown(&self) -> Duration {
        Duration::from_secs(self.teardown_secs)
    }
}

/// Report output configuration
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Colorize the human-readable report
    #[serde(default = "default_color")]
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            color: default_color(),
        }
    }
}

fn default_color() -> bool {
    true
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| super::Error::file_read(path, &e))?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.timeouts.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.timeouts.setup_secs, 300);
        assert_eq!(config.timeouts.step_secs, 60);
        assert_eq!(config.timeouts.teardown_secs, 120);
        assert!(config.output.color);
    }

    #[test]
    fn test_partial_config_keeps_other_defaults() {
        let config = Config::parse(
            r#"
[timeouts]
step_secs = 5

[output]
color = false
"#,
        )
        .unwrap();
        assert_eq!(config.timeouts.step(), Duration::from_secs(5));
        assert_eq!(config.timeouts.setup(), Duration::from_secs(300));
        assert!(!config.output.color);
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let err = Config::parse("[timeouts]\nstep_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, crate::common::Error::ConfigParse(_)));
    }

    #[test]
    fn test_zero_timeout_is_config_error() {
        let err = Config::parse("[timeouts]\nteardown_secs = 0").unwrap_err();
        assert!(matches!(err, crate::common::Error::Config(_)));
        assert_eq!(
            err.to_string(),
            "Configuration error: timeouts.teardown_secs must be at least 1"
        );
    }
}
