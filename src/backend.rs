//! Interfaces of the StratusLab client components the driver delegates to.
//!
//! Each component is built for one [`BackendConfig`], the configuration of a
//! single location: the instance monitor reports instance attributes, the
//! runner launches and kills instances of one image, and the persistent disk
//! client manages volumes and hot attachment.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::catalog::{self, Resources};
use crate::marketplace::DEFAULT_MARKETPLACE_URL;

/// Backend verbosity option.
pub const VERBOSE_LEVEL: &str = "verboseLevel";
/// Protocol used to reach the persistent disk service.
pub const PDISK_PROTOCOL: &str = "pdiskProtocol";
/// Template used to describe new instances.
pub const VM_TEMPLATE_FILE: &str = "vmTemplateFile";
/// Marketplace endpoint used to resolve images.
pub const MARKETPLACE_ENDPOINT: &str = "marketplaceEndpoint";
/// Scheduling requirements for new instances.
pub const VM_REQUIREMENTS: &str = "vmRequirements";
/// File receiving the identifiers of started instances.
pub const OUT_VM_IDS_FILE: &str = "outVmIdsFile";
/// File listing instance identifiers to act upon.
pub const IN_VM_IDS_FILE: &str = "inVmIdsFile";
/// VNC port of new instances.
pub const VNC_PORT: &str = "vncPort";
/// Name given to a new instance.
pub const VM_NAME: &str = "vmName";
/// CPU count of a new instance.
pub const VM_CPU: &str = "vmCpu";
/// Memory of a new instance in MiB.
pub const VM_RAM: &str = "vmRam";
/// Swap of a new instance in MiB.
pub const VM_SWAP: &str = "vmSwap";
/// SSH public key file installed on a new instance.
pub const USER_PUBLIC_KEY_FILE: &str = "userPublicKeyFile";

/// Options the runner needs; missing ones are filled from
/// [`Backend::default_run_options`].
pub const REQUIRED_RUN_OPTIONS: [&str; 7] = [
    VERBOSE_LEVEL,
    VM_TEMPLATE_FILE,
    MARKETPLACE_ENDPOINT,
    VM_REQUIREMENTS,
    OUT_VM_IDS_FILE,
    IN_VM_IDS_FILE,
    VNC_PORT,
];

/// Configuration of one location as seen by the backend components.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BackendConfig {
    section: Option<String>,
    options: BTreeMap<String, String>,
}

impl BackendConfig {
    /// Creates a configuration for `section` with the given options.
    #[must_use]
    pub const fn new(section: Option<String>, options: BTreeMap<String, String>) -> Self {
        Self { section, options }
    }

    /// Returns the configuration section this was built from.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Returns an option value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Returns `true` when the option is present and non-empty.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|value| !value.is_empty())
    }

    /// Sets an option value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.options.insert(key.into(), value.to_string());
    }

    /// Returns all options.
    #[must_use]
    pub const fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }
}

/// Run options StratusLab applies when the configuration leaves them out.
#[must_use]
pub fn default_run_options() -> BTreeMap<String, String> {
    [
        (VERBOSE_LEVEL, "0"),
        (VM_TEMPLATE_FILE, "/etc/stratuslab/vm-template.one"),
        (MARKETPLACE_ENDPOINT, DEFAULT_MARKETPLACE_URL),
        (VM_REQUIREMENTS, ""),
        (OUT_VM_IDS_FILE, ""),
        (IN_VM_IDS_FILE, ""),
        (VNC_PORT, ""),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value.to_owned()))
    .collect()
}

/// Flat attribute map describing one backend record.
pub type Attributes = BTreeMap<String, String>;

/// Instance attribute holding the identifier.
pub const ATTR_ID: &str = "id";
/// Instance attribute holding the name.
pub const ATTR_NAME: &str = "name";
/// Instance attribute holding the state summary.
pub const ATTR_STATE_SUMMARY: &str = "state_summary";
/// Instance attribute holding the primary NIC address.
pub const ATTR_NIC_IP: &str = "template_nic_ip";
/// Instance attribute holding the CPU count.
pub const ATTR_CPU: &str = "template_cpu";
/// Instance attribute holding the memory in MiB.
pub const ATTR_MEMORY: &str = "template_memory";
/// Instance attribute holding the disk (swap) size in MiB.
pub const ATTR_DISK_SIZE: &str = "template_disk_size";
/// Instance attribute holding the disk source URL.
pub const ATTR_DISK_SOURCE: &str = "template_disk_source";
/// Instance attribute holding the physical host name.
pub const ATTR_HOST: &str = "history_records_history_hostname";
/// Volume attribute holding the identifier.
pub const ATTR_VOLUME_UUID: &str = "uuid";
/// Volume attribute holding the tag.
pub const ATTR_VOLUME_TAG: &str = "tag";
/// Volume attribute holding the size in GiB.
pub const ATTR_VOLUME_SIZE: &str = "size";

/// Errors raised when a backend attribute map cannot be turned into a record.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RecordError {
    /// A required attribute is absent or empty.
    #[error("{record} record is missing attribute '{attribute}'")]
    MissingAttribute {
        /// Kind of record being built.
        record: &'static str,
        /// Name of the missing attribute.
        attribute: &'static str,
    },
    /// An attribute could not be parsed.
    #[error("{record} attribute '{attribute}' has invalid value '{value}'")]
    InvalidAttribute {
        /// Kind of record being built.
        record: &'static str,
        /// Name of the attribute.
        attribute: &'static str,
        /// Raw value reported by the backend.
        value: String,
    },
}

/// Instance description reported by the instance monitor.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VmInfo {
    /// Backend instance identifier.
    pub id: String,
    /// Instance name.
    pub name: Option<String>,
    /// Raw lifecycle state (for example `running`).
    pub state_summary: Option<String>,
    /// Primary network address.
    pub nic_ip: Option<String>,
    /// CPU count.
    pub cpu: Option<u32>,
    /// Memory in MiB.
    pub memory: Option<u64>,
    /// Disk (swap) size in MiB.
    pub disk_size: Option<u64>,
    /// URL of the image the instance booted from.
    pub disk_source: Option<String>,
    /// Physical host running the instance.
    pub host: Option<String>,
}

impl VmInfo {
    const RECORD: &'static str = "instance";

    /// Creates a description with only an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Builds a description from a flat attribute map. Empty values count as
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::MissingAttribute`] when `id` is absent and
    /// [`RecordError::InvalidAttribute`] when a numeric attribute does not
    /// parse.
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, RecordError> {
        let text = |key: &str| attribute(attributes, key).map(str::to_owned);
        let id = text(ATTR_ID).ok_or(RecordError::MissingAttribute {
            record: Self::RECORD,
            attribute: ATTR_ID,
        })?;

        Ok(Self {
            id,
            name: text(ATTR_NAME),
            state_summary: text(ATTR_STATE_SUMMARY),
            nic_ip: text(ATTR_NIC_IP),
            cpu: parse_number(attributes, Self::RECORD, ATTR_CPU)?,
            memory: parse_number(attributes, Self::RECORD, ATTR_MEMORY)?,
            disk_size: parse_number(attributes, Self::RECORD, ATTR_DISK_SIZE)?,
            disk_source: text(ATTR_DISK_SOURCE),
            host: text(ATTR_HOST),
        })
    }

    /// Returns the marketplace identifier: the last path segment of the disk
    /// source URL.
    #[must_use]
    pub fn marketplace_id(&self) -> Option<&str> {
        self.disk_source
            .as_deref()
            .and_then(|url| url.rsplit('/').next())
            .filter(|id| !id.is_empty())
    }

    /// Returns the instance's resource profile; a missing CPU count means one
    /// CPU and missing memory or swap means zero.
    #[must_use]
    pub fn resources(&self) -> Resources {
        Resources::new(
            self.cpu.unwrap_or(1),
            self.memory.unwrap_or_default(),
            self.disk_size.unwrap_or_default(),
        )
    }
}

/// Volume description reported by the persistent disk client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeInfo {
    /// Volume identifier.
    pub uuid: String,
    /// Volume tag, used as its name.
    pub tag: String,
    /// Size in GiB.
    pub size: u64,
}

impl VolumeInfo {
    const RECORD: &'static str = "volume";

    /// Builds a description from a flat attribute map (`uuid`, `tag`,
    /// `size`). A missing tag yields an empty name.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError`] when `uuid` or `size` is absent or `size` does
    /// not parse.
    pub fn from_attributes(attributes: &Attributes) -> Result<Self, RecordError> {
        let uuid = attribute(attributes, ATTR_VOLUME_UUID).ok_or(RecordError::MissingAttribute {
            record: Self::RECORD,
            attribute: ATTR_VOLUME_UUID,
        })?;
        let size = parse_number(attributes, Self::RECORD, ATTR_VOLUME_SIZE)?.ok_or(
            RecordError::MissingAttribute {
                record: Self::RECORD,
                attribute: ATTR_VOLUME_SIZE,
            },
        )?;
        Ok(Self {
            uuid: uuid.to_owned(),
            tag: attribute(attributes, ATTR_VOLUME_TAG)
                .unwrap_or_default()
                .to_owned(),
            size,
        })
    }
}

fn attribute<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    attributes: &Attributes,
    record: &'static str,
    key: &'static str,
) -> Result<Option<T>, RecordError> {
    attribute(attributes, key)
        .map(|raw| {
            raw.parse().map_err(|_| RecordError::InvalidAttribute {
                record,
                attribute: key,
                value: raw.to_owned(),
            })
        })
        .transpose()
}

/// Network details of a started instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NetworkDetail {
    /// Network the address belongs to, when reported.
    pub network: Option<String>,
    /// Address of the instance.
    pub address: String,
}

/// Visibility of a persistent disk.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    /// Only the owner can use the volume.
    Private,
    /// Every user can see the volume.
    Public,
}

/// Reports current instance attributes. Records are returned raw and
/// validated by the driver with [`VmInfo::from_attributes`].
pub trait InstanceMonitor {
    /// Error type returned by the monitor.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists all instances visible at this location.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the query fails.
    fn list_vms(&self) -> Result<Vec<Attributes>, Self::Error>;

    /// Describes the given instances. Unknown ids are left out.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the query fails.
    fn vm_detail(&self, ids: &[String]) -> Result<Vec<Attributes>, Self::Error>;
}

/// Launches and kills instances of one image.
pub trait Runner {
    /// Error type returned by the runner.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Starts the configured instance(s) and returns their identifiers.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the launch fails.
    fn run_instance(&self) -> Result<Vec<String>, Self::Error>;

    /// Returns the network details of a started instance.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the instance has no address yet.
    fn network_detail(&self, id: &str) -> Result<NetworkDetail, Self::Error>;

    /// Kills the given instances.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the kill request fails.
    fn kill_instances(&self, ids: &[String]) -> Result<(), Self::Error>;
}

/// Manages persistent disks.
pub trait PersistentDisk {
    /// Error type returned by the client.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Describes the volumes matching `filters` (all volumes when empty).
    /// Each record carries `uuid`, `tag` and `size` attributes.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the query fails.
    fn describe_volumes(
        &self,
        filters: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Attributes>, Self::Error>;

    /// Creates a volume of `size` GiB and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when creation fails.
    fn create_volume(
        &self,
        size: u64,
        tag: &str,
        visibility: Visibility,
    ) -> Result<String, Self::Error>;

    /// Deletes a volume.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when deletion fails.
    fn delete_volume(&self, volume_id: &str) -> Result<(), Self::Error>;

    /// Attaches a volume to a running instance on `host`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the attachment fails.
    fn hot_attach(&self, host: &str, node_id: &str, volume_id: &str) -> Result<(), Self::Error>;

    /// Detaches a volume from a running instance.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the detachment fails.
    fn hot_detach(&self, node_id: &str, volume_id: &str) -> Result<(), Self::Error>;
}

/// Builds the client components for a location's configuration.
pub trait Backend {
    /// Error type shared by all components.
    type Error: std::error::Error + Send + Sync + 'static;
    /// Instance monitor component.
    type Monitor: InstanceMonitor<Error = Self::Error>;
    /// Runner component.
    type Runner: Runner<Error = Self::Error>;
    /// Persistent disk component.
    type Disk: PersistentDisk<Error = Self::Error>;

    /// Creates an instance monitor.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the configuration is unusable.
    fn monitor(&self, config: &BackendConfig) -> Result<Self::Monitor, Self::Error>;

    /// Creates a runner for `image_id`.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the configuration is unusable.
    fn runner(&self, image_id: &str, config: &BackendConfig) -> Result<Self::Runner, Self::Error>;

    /// Creates a persistent disk client.
    ///
    /// # Errors
    ///
    /// Returns the backend's error when the configuration is unusable.
    fn persistent_disk(&self, config: &BackendConfig) -> Result<Self::Disk, Self::Error>;

    /// Instance types known without any user configuration.
    fn default_instance_types(&self) -> Vec<(String, Resources)> {
        catalog::default_instance_types()
    }

    /// Values for [`REQUIRED_RUN_OPTIONS`] the configuration leaves out.
    fn default_run_options(&self) -> BTreeMap<String, String> {
        default_run_options()
    }
}
