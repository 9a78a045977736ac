// SPDX-License-Identifier: MPL-2.0

//! Resolver options and the settings file of the command line.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Options of a [Resolver](crate::resolver::Resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct ResolverConfig {
    /// Let installed packages move to another version.
    /// When false, an installed package is pinned to its installed version.
    pub upgrade_installed: bool,
    /// Drop the pin on an installed package when it is the only thing in the way.
    pub relax_installed: bool,
    /// Origins whose packages are never relaxed.
    pub origin_blacklist: Vec<String>,
    /// Size of the worker pool, defaults to the available parallelism.
    pub jobs: Option<usize>,
    /// How many times a single package may be recomputed.
    /// Defaults to one more than its number of available versions.
    pub max_recomputations: Option<usize>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            upgrade_installed: false,
            relax_installed: true,
            origin_blacklist: Vec::new(),
            jobs: None,
            max_recomputations: None,
        }
    }
}

/// Errors loading the settings file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("unable to read settings file {}", .path.display())]
    Io {
        /// Settings path.
        path: PathBuf,
        /// Underlying io error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has unknown keys.
    #[cfg(feature = "cli")]
    #[error("invalid settings file {}", .path.display())]
    Parse {
        /// Settings path.
        path: PathBuf,
        /// Underlying toml error.
        source: toml::de::Error,
    },
}

/// Location looked up when no settings file is given.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/mobros/config.toml";

/// Options of the command line itself.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CliSettings {
    /// Directory holding the `mobros-<command>` scripts.
    pub scripts_dir: PathBuf,
    /// ROS distribution used to map workspace names to system packages.
    pub ros_distro: String,
    /// Where plan files are written.
    pub output_dir: PathBuf,
    /// Package installer program.
    pub installer: String,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            scripts_dir: PathBuf::from("/usr/share/mobros/scripts"),
            ros_distro: "humble".to_string(),
            output_dir: PathBuf::from("."),
            installer: "apt-get".to_string(),
        }
    }
}

/// Content of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct Settings {
    /// `[resolver]` section.
    pub resolver: ResolverConfig,
    /// `[cli]` section.
    pub cli: CliSettings,
}

#[cfg(feature = "cli")]
impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if given, else the default location when it exists,
    /// else the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_PATH);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text, &path)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let text = r#"
[resolver]
origin_blacklist = ["ROS"]
jobs = 2

[cli]
ros_distro = "jazzy"
"#;
        let settings = Settings::from_toml(text, Path::new("config.toml")).unwrap();
        assert_eq!(settings.resolver.origin_blacklist, vec!["ROS"]);
        assert_eq!(settings.resolver.jobs, Some(2));
        assert!(settings.resolver.relax_installed);
        assert_eq!(settings.cli.ros_distro, "jazzy");
        assert_eq!(settings.cli.installer, "apt-get");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml("[resolver]\nupgrade = true\n", Path::new("c.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn explicit_missing_file() {
        let err = Settings::load(Some(Path::new("/nonexistent/mobros.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
