//! Location and size catalogs computed once from the user configuration.
//!
//! Locations are the named sections of the user configuration file, except
//! for the reserved `instance_types` section. Sizes merge the backend's
//! default instance types with the user-defined ones; a user-defined entry
//! replaces the default of the same name.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ConfigError;
use crate::user_config::{DEFAULT_SECTION, SELECTED_SECTION_KEY, UserConfig};

/// Country reported for a location whose section has no `country` key.
pub const UNKNOWN_COUNTRY: &str = "unknown";

/// Placeholder bandwidth reported for every size.
pub const SIZE_BANDWIDTH: u64 = 1000;

/// Placeholder price reported for every size.
pub const SIZE_PRICE: u32 = 1;

/// Instance types every StratusLab client knows about, as
/// `(name, cpu, ram MiB, swap MiB)`.
pub const DEFAULT_INSTANCE_TYPES: &[(&str, Resources)] = &[
    ("t1.micro", Resources::new(1, 128, 512)),
    ("m1.small", Resources::new(1, 1024, 1024)),
    ("c1.medium", Resources::new(2, 1024, 1024)),
    ("m1.large", Resources::new(2, 2048, 1024)),
    ("m1.xlarge", Resources::new(2, 4096, 1024)),
    ("c1.xlarge", Resources::new(4, 2048, 2048)),
];

/// A deployment site backed by one configuration section.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Location {
    /// Section name in the user configuration.
    pub id: String,
    /// Display name (the section's `name` key, or the id).
    pub name: String,
    /// Country code (the section's `country` key, or `unknown`).
    pub country: String,
}

impl Location {
    /// Creates a location from its parts.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            country: country.into(),
        }
    }
}

/// CPU, memory, and swap allocation of an instance type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Resources {
    /// Number of CPUs.
    pub cpu: u32,
    /// Memory in MiB.
    pub ram: u64,
    /// Swap in MiB.
    pub swap: u64,
}

impl Resources {
    /// Creates a resource triple.
    #[must_use]
    pub const fn new(cpu: u32, ram: u64, swap: u64) -> Self {
        Self { cpu, ram, swap }
    }
}

/// A named resource profile.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Size {
    /// Identifier, equal to the name.
    pub id: String,
    /// Instance type name (for example `m1.large`).
    pub name: String,
    /// Number of CPUs.
    pub cpu: u32,
    /// Memory in MiB.
    pub ram: u64,
    /// Swap in MiB.
    pub disk: u64,
    /// Placeholder bandwidth.
    pub bandwidth: u64,
    /// Placeholder price.
    pub price: u32,
}

impl Size {
    /// Creates a size for a profile that does not specify CPUs; one CPU is
    /// assumed.
    #[must_use]
    pub fn new(name: impl Into<String>, ram: u64, disk: u64) -> Self {
        Self::with_resources(name, Resources::new(1, ram, disk))
    }

    /// Creates a size from an instance type definition.
    #[must_use]
    pub fn with_resources(name: impl Into<String>, resources: Resources) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            cpu: resources.cpu,
            ram: resources.ram,
            disk: resources.swap,
            bandwidth: SIZE_BANDWIDTH,
            price: SIZE_PRICE,
        }
    }

    /// Returns the profile as a resource triple.
    #[must_use]
    pub const fn resources(&self) -> Resources {
        Resources::new(self.cpu, self.ram, self.disk)
    }
}

/// Returns [`DEFAULT_INSTANCE_TYPES`] as owned entries.
#[must_use]
pub fn default_instance_types() -> Vec<(String, Resources)> {
    DEFAULT_INSTANCE_TYPES
        .iter()
        .map(|(name, resources)| ((*name).to_owned(), *resources))
        .collect()
}

/// Location and size catalogs of one user configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Catalogs {
    /// Locations and the designated default.
    pub locations: LocationCatalog,
    /// Instance types.
    pub sizes: SizeCatalog,
}

impl Catalogs {
    /// Builds both catalogs. `default_instance_types` are the types known
    /// without configuration; `[instance_types]` entries replace them by name.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`LocationCatalog::from_user_config`].
    pub fn from_user_config<D>(
        config: &UserConfig,
        default_instance_types: D,
        default_override: Option<&str>,
    ) -> Result<Self, ConfigError>
    where
        D: IntoIterator<Item = (String, Resources)>,
    {
        let locations = LocationCatalog::from_user_config(config, default_override)?;
        let sizes = SizeCatalog::build(
            default_instance_types,
            config.user_defined_instance_types().iter().cloned(),
        );
        Ok(Self { locations, sizes })
    }
}

/// All locations plus the designated default.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocationCatalog {
    default: Location,
    locations: BTreeMap<String, Location>,
}

impl LocationCatalog {
    /// Builds the catalog from the user configuration.
    ///
    /// The default location is, in order of preference: `default_override`,
    /// the `selected_section` key of `[default]`, and `default` itself. The
    /// `default` entry only stays in the catalog when it is the chosen
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingDefaultSection`] when no override is
    /// given and the configuration has no `[default]` section, and
    /// [`ConfigError::UnknownDefaultLocation`] when the chosen default does
    /// not name a location.
    pub fn from_user_config(
        config: &UserConfig,
        default_override: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let default_id = Self::resolve_default_id(config, default_override)?;

        let mut locations: BTreeMap<String, Location> = config
            .location_sections()
            .map(|(id, _)| (id.to_owned(), Self::location_for(config, id)))
            .collect();

        let default = locations
            .get(&default_id)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDefaultLocation(default_id.clone()))?;

        if default_id != DEFAULT_SECTION {
            locations.remove(DEFAULT_SECTION);
        }

        Ok(Self { default, locations })
    }

    fn resolve_default_id(
        config: &UserConfig,
        default_override: Option<&str>,
    ) -> Result<String, ConfigError> {
        if let Some(requested) = default_override
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Ok(requested.to_owned());
        }

        if !config.has_section(DEFAULT_SECTION) {
            return Err(ConfigError::MissingDefaultSection);
        }

        Ok(config
            .get(DEFAULT_SECTION, SELECTED_SECTION_KEY)
            .unwrap_or(DEFAULT_SECTION)
            .to_owned())
    }

    fn location_for(config: &UserConfig, id: &str) -> Location {
        let name = config.get(id, "name").unwrap_or(id);
        let country = config.get(id, "country").unwrap_or(UNKNOWN_COUNTRY);
        Location::new(id, name, country)
    }

    /// Returns the default location.
    #[must_use]
    pub const fn default_location(&self) -> &Location {
        &self.default
    }

    /// Looks up a location by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Location> {
        self.locations.get(id)
    }

    /// Iterates over locations ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.values()
    }

    /// Returns the number of locations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Returns `true` when the catalog holds no locations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

/// Sizes keyed by name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SizeCatalog {
    sizes: BTreeMap<String, Size>,
}

impl SizeCatalog {
    /// Builds the catalog from default and user-defined instance types. Later
    /// entries replace earlier ones with the same name, so user-defined types
    /// win over defaults.
    #[must_use]
    pub fn build<D, U>(defaults: D, user_defined: U) -> Self
    where
        D: IntoIterator<Item = (String, Resources)>,
        U: IntoIterator<Item = (String, Resources)>,
    {
        let sizes = defaults
            .into_iter()
            .chain(user_defined)
            .map(|(name, resources)| (name.clone(), Size::with_resources(name, resources)))
            .collect();
        Self { sizes }
    }

    /// Looks up a size by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Size> {
        self.sizes.get(name)
    }

    /// Iterates over sizes ordered by name.
    pub fn iter(&self) -> impl Iterator<Item = &Size> {
        self.sizes.values()
    }

    /// Returns the number of sizes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    /// Returns `true` when the catalog holds no sizes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}
