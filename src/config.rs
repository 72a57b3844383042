//! Driver options loaded via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// User configuration consulted when no path is given explicitly.
///
/// The file is TOML. INI-style `stratuslab-user.cfg` files written for the
/// StratusLab command-line client are not accepted: unquoted values such as
/// `selected_section = lal` fail with [`ConfigError::Parse`]. Quote the
/// values (`selected_section = "lal"`) to convert such a file.
pub const DEFAULT_USER_CONFIG: &str = "~/.stratuslab/stratuslab-user.toml";

/// Options accepted by the driver constructor.
///
/// Values merge defaults, configuration files, and environment variables
/// (`STRATUSLAB_USER_CONFIG`, `STRATUSLAB_DEFAULT_LOCATION`). The backend does
/// not authenticate with key, secret, host, or port, so none are captured here.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "STRATUSLAB")]
pub struct DriverOptions {
    /// Path to the user configuration file. Sections in this file are the
    /// driver's locations. Supports a leading `~/`.
    #[ortho_config(default = DEFAULT_USER_CONFIG.to_owned())]
    pub user_config: String,
    /// Section to use as the default location, overriding the
    /// `selected_section` key of the `[default]` section.
    pub default_location: Option<String>,
}

impl DriverOptions {
    /// Builds options for an explicit configuration path.
    #[must_use]
    pub fn new(user_config: impl Into<String>) -> Self {
        Self {
            user_config: user_config.into(),
            default_location: None,
        }
    }

    /// Sets the default location override.
    #[must_use]
    pub fn with_default_location(mut self, value: Option<String>) -> Self {
        self.default_location = value;
        self
    }

    /// Loads options without parsing CLI arguments. Values still merge
    /// defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratuslab")])
            .map_err(|err| ConfigError::Load(err.to_string()))
    }

    /// Returns the user configuration path with `~/` expanded.
    #[must_use]
    pub fn user_config_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(expand_tilde(self.user_config.trim()))
    }

    /// Returns the trimmed default location override, ignoring blank values.
    #[must_use]
    pub fn default_location_override(&self) -> Option<&str> {
        self.default_location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// The input is returned unchanged when `HOME` is not set.
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Errors raised while loading or interpreting configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// No default location was given and the file has no `[default]` section.
    #[error("configuration file must have [default] section")]
    MissingDefaultSection,
    /// The resolved default location does not name a section.
    #[error("requested default location ({0}) not defined")]
    UnknownDefaultLocation(String),
    /// The configuration file could not be read.
    #[error("failed to read {path}: {message}")]
    Io {
        /// Path, or stream label, that could not be read.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// The configuration source is not valid TOML.
    #[error("failed to parse {origin}: {message}")]
    Parse {
        /// File path or other label for the source.
        origin: String,
        /// Parser error message.
        message: String,
    },
    /// A section entry has a value that cannot be used.
    #[error("invalid value for {section}.{key}: {message}")]
    InvalidValue {
        /// Section containing the entry.
        section: String,
        /// Offending key.
        key: String,
        /// Description of the problem.
        message: String,
    },
    /// An `instance_types` entry is not a `cpu, ram, swap` triple.
    #[error("invalid instance type {name}: {message}")]
    InvalidInstanceType {
        /// Instance type name.
        name: String,
        /// Description of the problem.
        message: String,
    },
    /// A node was built without a location.
    #[error("node location must be specified")]
    MissingNodeLocation,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Load(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Load(value.to_string())
    }
}
