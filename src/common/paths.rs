//! Configuration paths
//!
//! Uses the directories crate for platform-appropriate locations.

use std::path::{Path, PathBuf};

/// Name used for the configuration directory
const APP_NAME: &str = "scenario-harness";

/// Get the configuration directory path
///
/// - Linux: `~/.config/scenario-harness/`
/// - macOS: `~/Library/Application Support/scenario-harness/`
/// - Windows: `%APPDATA%\scenario-harness\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve `path` against `base` unless it is already absolute
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_ends_with_file_name() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_resolve_relative() {
        let base = Path::new("/srv/scenarios");
        assert_eq!(
            resolve_relative(base, Path::new("../chess")),
            PathBuf::from("/srv/scenarios/../chess")
        );
        assert_eq!(
            resolve_relative(base, Path::new("/opt/chess")),
            PathBuf::from("/opt/chess")
        );
    }
}
