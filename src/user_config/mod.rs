//! StratusLab user configuration: named sections of flat key/value pairs.
//!
//! Each TOML table is a section. The `[default]` section supplies values for
//! every location and may name the default location through
//! `selected_section`; `[instance_types]` defines extra sizes as
//! `name = [cpu, ram, swap]`. Every other section is a location.

use std::collections::BTreeMap;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use ortho_config::toml;

use crate::backend::{BackendConfig, PDISK_PROTOCOL, VERBOSE_LEVEL};
use crate::catalog::Resources;
use crate::config::ConfigError;

/// Section holding values shared by all locations.
pub const DEFAULT_SECTION: &str = "default";

/// Section holding user-defined instance types.
pub const INSTANCE_TYPES_SECTION: &str = "instance_types";

/// Key of `[default]` naming the default location.
pub const SELECTED_SECTION_KEY: &str = "selected_section";

type Section = BTreeMap<String, String>;

/// Parsed user configuration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UserConfig {
    sections: BTreeMap<String, Section>,
    instance_types: Vec<(String, Resources)>,
}

impl UserConfig {
    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and any error
    /// from [`UserConfig::from_toml_str`] when its content is invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let contents = read_config(path)?;
        Self::from_toml_str(path.as_str(), &contents)
    }

    /// Reads and parses configuration from a stream. `origin` labels the
    /// source in error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the stream cannot be read as UTF-8
    /// text and any error from [`UserConfig::from_toml_str`] when its content
    /// is invalid.
    pub fn from_reader<R: Read>(origin: &str, reader: R) -> Result<Self, ConfigError> {
        let contents = std::io::read_to_string(reader).map_err(|err| ConfigError::Io {
            path: Utf8PathBuf::from(origin),
            message: err.to_string(),
        })?;
        Self::from_toml_str(origin, &contents)
    }

    /// Parses configuration from TOML text. `origin` labels the source in
    /// error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML,
    /// [`ConfigError::InvalidValue`] for top-level keys or non-scalar section
    /// values, and [`ConfigError::InvalidInstanceType`] for malformed
    /// `instance_types` entries.
    pub fn from_toml_str(origin: &str, contents: &str) -> Result<Self, ConfigError> {
        let value = parse_toml(origin, contents)?;
        let Some(root) = value.as_table() else {
            return Err(ConfigError::Parse {
                origin: origin.to_owned(),
                message: String::from("configuration root is not a table"),
            });
        };

        let mut config = Self::default();
        for (name, body) in root {
            let Some(table) = body.as_table() else {
                return Err(ConfigError::InvalidValue {
                    section: String::new(),
                    key: name.clone(),
                    message: String::from("top-level keys must belong to a section"),
                });
            };

            if name == INSTANCE_TYPES_SECTION {
                config.instance_types = parse_instance_types(table)?;
                continue;
            }
            config
                .sections
                .insert(name.clone(), parse_section(name, table)?);
        }
        Ok(config)
    }

    /// Returns `true` when a section with this name exists.
    #[must_use]
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Returns a section value.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|values| values.get(key))
            .map(String::as_str)
    }

    /// Iterates over the location sections (everything except
    /// `instance_types`), ordered by name.
    pub fn location_sections(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        self.sections
            .iter()
            .map(|(name, values)| (name.as_str(), values))
    }

    /// Returns the instance types defined in `[instance_types]`.
    #[must_use]
    pub fn user_defined_instance_types(&self) -> &[(String, Resources)] {
        &self.instance_types
    }

    /// Builds the backend configuration for a section.
    ///
    /// Values from `[default]` are overlaid with those of `section`, keys are
    /// converted to the backend's camel case, verbosity is silenced, and
    /// persistent disks are reached over HTTPS.
    #[must_use]
    pub fn backend_config(&self, section: Option<&str>) -> BackendConfig {
        let mut options = BTreeMap::new();
        let overlays = [Some(DEFAULT_SECTION), section.filter(|name| *name != DEFAULT_SECTION)];
        for values in overlays
            .into_iter()
            .flatten()
            .filter_map(|name| self.sections.get(name))
        {
            for (key, value) in values {
                options.insert(format_key(key), value.clone());
            }
        }
        options.insert(String::from(VERBOSE_LEVEL), String::from("-1"));
        options.insert(String::from(PDISK_PROTOCOL), String::from("https"));

        BackendConfig::new(section.map(str::to_owned), options)
    }
}

/// Converts a `snake_case` configuration key into the backend's `camelCase`
/// option name.
#[must_use]
pub fn format_key(key: &str) -> String {
    let mut parts = key.split('_').filter(|part| !part.is_empty());
    let mut formatted = parts.next().map(str::to_owned).unwrap_or_default();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            formatted.extend(first.to_uppercase());
            formatted.push_str(chars.as_str());
        }
    }
    formatted
}

fn read_config(path: &Utf8Path) -> Result<String, ConfigError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| ConfigError::Io {
        path: path.to_path_buf(),
        message: String::from("configuration file path is missing a filename"),
    })?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| ConfigError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;

    dir.read_to_string(file_name).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn parse_toml(origin: &str, contents: &str) -> Result<toml::Value, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(toml::Value::Table(toml::value::Table::new()));
    }

    toml::from_str(contents).map_err(|err| ConfigError::Parse {
        origin: origin.to_owned(),
        message: err.to_string(),
    })
}

fn parse_section(name: &str, table: &toml::value::Table) -> Result<Section, ConfigError> {
    table
        .iter()
        .map(|(key, value)| {
            scalar_text(value)
                .map(|text| (key.clone(), text))
                .ok_or_else(|| ConfigError::InvalidValue {
                    section: name.to_owned(),
                    key: key.clone(),
                    message: String::from("expected a string, number, or boolean"),
                })
        })
        .collect()
}

fn scalar_text(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(text) => Some(text.clone()),
        toml::Value::Integer(number) => Some(number.to_string()),
        toml::Value::Float(number) => Some(number.to_string()),
        toml::Value::Boolean(flag) => Some(flag.to_string()),
        toml::Value::Datetime(stamp) => Some(stamp.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

fn parse_instance_types(
    table: &toml::value::Table,
) -> Result<Vec<(String, Resources)>, ConfigError> {
    table
        .iter()
        .map(|(name, value)| parse_resources(name, value).map(|res| (name.clone(), res)))
        .collect()
}

fn parse_resources(name: &str, value: &toml::Value) -> Result<Resources, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidInstanceType {
        name: name.to_owned(),
        message: message.to_owned(),
    };

    let fields: Vec<u64> = match value {
        toml::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_integer()
                    .and_then(|number| u64::try_from(number).ok())
                    .ok_or_else(|| invalid("values must be non-negative integers"))
            })
            .collect::<Result<_, _>>()?,
        toml::Value::String(text) => text
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(|field| {
                field
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("values must be non-negative integers"))
            })
            .collect::<Result<_, _>>()?,
        _ => return Err(invalid("expected [cpu, ram, swap]")),
    };

    let [cpu, ram, swap] = fields.as_slice() else {
        return Err(invalid("expected exactly three values: cpu, ram, swap"));
    };
    let cpu = u32::try_from(*cpu).map_err(|_| invalid("cpu count is out of range"))?;
    Ok(Resources::new(cpu, *ram, *swap))
}
