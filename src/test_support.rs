//! Test support utilities shared across unit and integration tests.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use thiserror::Error;

use crate::backend::{
    ATTR_CPU, ATTR_DISK_SIZE, ATTR_DISK_SOURCE, ATTR_HOST, ATTR_ID, ATTR_MEMORY, ATTR_NAME,
    ATTR_NIC_IP, ATTR_STATE_SUMMARY, ATTR_VOLUME_SIZE, ATTR_VOLUME_TAG, ATTR_VOLUME_UUID,
    Attributes, Backend, BackendConfig, InstanceMonitor, NetworkDetail, PersistentDisk, Runner,
    USER_PUBLIC_KEY_FILE, Visibility, VmInfo, VolumeInfo,
};
use crate::marketplace::{CatalogFetcher, MarketplaceError};

/// Backend operations that can be scripted to fail.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum FakeOperation {
    /// Building an instance monitor.
    Monitor,
    /// Building a runner.
    Runner,
    /// Launching instances.
    RunInstance,
    /// Recovering an instance address.
    NetworkDetail,
    /// Killing instances.
    KillInstances,
    /// Building a persistent disk client.
    PersistentDisk,
    /// Hot-attaching a volume.
    HotAttach,
    /// Hot-detaching a volume.
    HotDetach,
}

/// Error returned by [`FakeBackend`] components.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("simulated {operation:?} failure")]
pub struct FakeBackendError {
    /// Operation that was scripted to fail.
    pub operation: FakeOperation,
}

/// Records a single call made through a [`FakeBackend`] component.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BackendCall {
    /// `Backend::monitor` for a configuration section.
    Monitor {
        /// Section the configuration was built from.
        section: Option<String>,
    },
    /// `InstanceMonitor::list_vms`.
    ListVms {
        /// Section the monitor was built for.
        section: Option<String>,
    },
    /// `InstanceMonitor::vm_detail`.
    VmDetail {
        /// Requested identifiers.
        ids: Vec<String>,
    },
    /// `Backend::runner`.
    Runner {
        /// Image the runner launches.
        image_id: String,
        /// Configuration handed to the runner.
        config: BackendConfig,
    },
    /// `Runner::run_instance`.
    RunInstance,
    /// `Runner::network_detail`.
    NetworkDetail {
        /// Instance identifier.
        id: String,
    },
    /// `Runner::kill_instances`.
    KillInstances {
        /// Instance identifiers.
        ids: Vec<String>,
    },
    /// `Backend::persistent_disk`.
    PersistentDisk {
        /// Section the configuration was built from.
        section: Option<String>,
    },
    /// `PersistentDisk::describe_volumes`.
    DescribeVolumes {
        /// Filters passed to the client.
        filters: BTreeMap<String, Vec<String>>,
    },
    /// `PersistentDisk::create_volume`.
    CreateVolume {
        /// Size in GiB.
        size: u64,
        /// Volume tag.
        tag: String,
        /// Requested visibility.
        visibility: Visibility,
    },
    /// `PersistentDisk::delete_volume`.
    DeleteVolume {
        /// Volume identifier.
        volume_id: String,
    },
    /// `PersistentDisk::hot_attach`.
    HotAttach {
        /// Physical host.
        host: String,
        /// Instance identifier.
        node_id: String,
        /// Volume identifier.
        volume_id: String,
    },
    /// `PersistentDisk::hot_detach`.
    HotDetach {
        /// Instance identifier.
        node_id: String,
        /// Volume identifier.
        volume_id: String,
    },
}

/// What the runner saw of the SSH key file while launching an instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyFileObservation {
    /// Path configured as `userPublicKeyFile`.
    pub path: String,
    /// File contents at launch time, or `None` when the file was missing.
    pub contents: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    vms: BTreeMap<String, Vec<Attributes>>,
    launches: VecDeque<Vec<String>>,
    addresses: BTreeMap<String, String>,
    volumes: Vec<Attributes>,
    created_volume_ids: VecDeque<String>,
    failures: BTreeSet<FakeOperation>,
    calls: Vec<BackendCall>,
    key_files: Vec<KeyFileObservation>,
}

impl FakeState {
    fn check(&self, operation: FakeOperation) -> Result<(), FakeBackendError> {
        if self.failures.contains(&operation) {
            return Err(FakeBackendError { operation });
        }
        Ok(())
    }
}

/// Scripted in-memory backend.
///
/// Instances are seeded per configuration section; components share state
/// with the backend they were built from, so clones observe the same calls.
#[derive(Clone, Debug, Default)]
pub struct FakeBackend {
    state: Rc<RefCell<FakeState>>,
}

impl FakeBackend {
    /// Creates a backend with no instances or volumes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an instance reported by monitors built for `section`.
    pub fn push_vm(&self, section: &str, info: &VmInfo) {
        self.push_vm_attributes(section, vm_attributes(info));
    }

    /// Seeds a raw instance record, which may be malformed.
    pub fn push_vm_attributes(&self, section: &str, attributes: Attributes) {
        self.state
            .borrow_mut()
            .vms
            .entry(section.to_owned())
            .or_default()
            .push(attributes);
    }

    /// Queues the identifiers returned by the next `run_instance` call.
    pub fn push_launch(&self, ids: &[&str]) {
        self.state
            .borrow_mut()
            .launches
            .push_back(ids.iter().map(|id| (*id).to_owned()).collect());
    }

    /// Sets the address reported by `network_detail` for an instance.
    pub fn set_address(&self, id: &str, address: &str) {
        self.state
            .borrow_mut()
            .addresses
            .insert(id.to_owned(), address.to_owned());
    }

    /// Seeds a volume reported by `describe_volumes`.
    pub fn push_volume(&self, info: &VolumeInfo) {
        self.push_volume_attributes(volume_attributes(info));
    }

    /// Seeds a raw volume record, which may be malformed.
    pub fn push_volume_attributes(&self, attributes: Attributes) {
        self.state.borrow_mut().volumes.push(attributes);
    }

    /// Queues the identifier returned by the next `create_volume` call.
    pub fn push_created_volume_id(&self, id: &str) {
        self.state
            .borrow_mut()
            .created_volume_ids
            .push_back(id.to_owned());
    }

    /// Makes every later call of `operation` fail.
    pub fn fail(&self, operation: FakeOperation) {
        self.state.borrow_mut().failures.insert(operation);
    }

    /// Returns a snapshot of all calls recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state.borrow().calls.clone()
    }

    /// Returns the configurations handed to runners, in call order.
    #[must_use]
    pub fn runner_configs(&self) -> Vec<BackendConfig> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::Runner { config, .. } => Some(config.clone()),
                _ => None,
            })
            .collect()
    }

    /// Returns the key files observed by `run_instance`, in call order.
    #[must_use]
    pub fn key_files(&self) -> Vec<KeyFileObservation> {
        self.state.borrow().key_files.clone()
    }

    fn record(&self, call: BackendCall) {
        self.state.borrow_mut().calls.push(call);
    }

    fn check(&self, operation: FakeOperation) -> Result<(), FakeBackendError> {
        self.state.borrow().check(operation)
    }
}

/// Instance monitor built by [`FakeBackend`].
#[derive(Debug)]
pub struct FakeMonitor {
    backend: FakeBackend,
    section: Option<String>,
}

impl FakeMonitor {
    fn section_vms(&self) -> Vec<Attributes> {
        let state = self.backend.state.borrow();
        self.section
            .as_ref()
            .and_then(|section| state.vms.get(section))
            .cloned()
            .unwrap_or_default()
    }
}

impl InstanceMonitor for FakeMonitor {
    type Error = FakeBackendError;

    fn list_vms(&self) -> Result<Vec<Attributes>, Self::Error> {
        self.backend.record(BackendCall::ListVms {
            section: self.section.clone(),
        });
        Ok(self.section_vms())
    }

    fn vm_detail(&self, ids: &[String]) -> Result<Vec<Attributes>, Self::Error> {
        self.backend
            .record(BackendCall::VmDetail { ids: ids.to_vec() });
        Ok(self
            .section_vms()
            .into_iter()
            .filter(|attributes| {
                attributes
                    .get(ATTR_ID)
                    .is_some_and(|id| ids.contains(id))
            })
            .collect())
    }
}

/// Runner built by [`FakeBackend`].
#[derive(Debug)]
pub struct FakeRunner {
    backend: FakeBackend,
    config: BackendConfig,
}

impl Runner for FakeRunner {
    type Error = FakeBackendError;

    fn run_instance(&self) -> Result<Vec<String>, Self::Error> {
        self.backend.record(BackendCall::RunInstance);
        if let Some(path) = self.config.get(USER_PUBLIC_KEY_FILE) {
            let observation = KeyFileObservation {
                path: path.to_owned(),
                contents: std::fs::read_to_string(path).ok(),
            };
            self.backend.state.borrow_mut().key_files.push(observation);
        }
        self.backend.check(FakeOperation::RunInstance)?;
        Ok(self
            .backend
            .state
            .borrow_mut()
            .launches
            .pop_front()
            .unwrap_or_default())
    }

    fn network_detail(&self, id: &str) -> Result<NetworkDetail, Self::Error> {
        self.backend
            .record(BackendCall::NetworkDetail { id: id.to_owned() });
        self.backend.check(FakeOperation::NetworkDetail)?;
        self.backend
            .state
            .borrow()
            .addresses
            .get(id)
            .map(|address| NetworkDetail {
                network: Some(String::from("public")),
                address: address.clone(),
            })
            .ok_or(FakeBackendError {
                operation: FakeOperation::NetworkDetail,
            })
    }

    fn kill_instances(&self, ids: &[String]) -> Result<(), Self::Error> {
        self.backend
            .record(BackendCall::KillInstances { ids: ids.to_vec() });
        self.backend.check(FakeOperation::KillInstances)
    }
}

/// Persistent disk client built by [`FakeBackend`].
#[derive(Debug)]
pub struct FakeDisk {
    backend: FakeBackend,
}

impl PersistentDisk for FakeDisk {
    type Error = FakeBackendError;

    fn describe_volumes(
        &self,
        filters: &BTreeMap<String, Vec<String>>,
    ) -> Result<Vec<Attributes>, Self::Error> {
        self.backend.record(BackendCall::DescribeVolumes {
            filters: filters.clone(),
        });
        Ok(self.backend.state.borrow().volumes.clone())
    }

    fn create_volume(
        &self,
        size: u64,
        tag: &str,
        visibility: Visibility,
    ) -> Result<String, Self::Error> {
        self.backend.record(BackendCall::CreateVolume {
            size,
            tag: tag.to_owned(),
            visibility,
        });
        let mut state = self.backend.state.borrow_mut();
        let fallback = format!("volume-{}", state.volumes.len() + 1);
        let id = state.created_volume_ids.pop_front().unwrap_or(fallback);
        state.volumes.push(volume_attributes(&VolumeInfo {
            uuid: id.clone(),
            tag: tag.to_owned(),
            size,
        }));
        Ok(id)
    }

    fn delete_volume(&self, volume_id: &str) -> Result<(), Self::Error> {
        self.backend.record(BackendCall::DeleteVolume {
            volume_id: volume_id.to_owned(),
        });
        self.backend
            .state
            .borrow_mut()
            .volumes
            .retain(|volume| {
                volume.get(ATTR_VOLUME_UUID).map(String::as_str) != Some(volume_id)
            });
        Ok(())
    }

    fn hot_attach(&self, host: &str, node_id: &str, volume_id: &str) -> Result<(), Self::Error> {
        self.backend.record(BackendCall::HotAttach {
            host: host.to_owned(),
            node_id: node_id.to_owned(),
            volume_id: volume_id.to_owned(),
        });
        self.backend.check(FakeOperation::HotAttach)
    }

    fn hot_detach(&self, node_id: &str, volume_id: &str) -> Result<(), Self::Error> {
        self.backend.record(BackendCall::HotDetach {
            node_id: node_id.to_owned(),
            volume_id: volume_id.to_owned(),
        });
        self.backend.check(FakeOperation::HotDetach)
    }
}

impl Backend for FakeBackend {
    type Error = FakeBackendError;
    type Monitor = FakeMonitor;
    type Runner = FakeRunner;
    type Disk = FakeDisk;

    fn monitor(&self, config: &BackendConfig) -> Result<Self::Monitor, Self::Error> {
        let section = config.section().map(str::to_owned);
        self.record(BackendCall::Monitor {
            section: section.clone(),
        });
        self.check(FakeOperation::Monitor)?;
        Ok(FakeMonitor {
            backend: self.clone(),
            section,
        })
    }

    fn runner(&self, image_id: &str, config: &BackendConfig) -> Result<Self::Runner, Self::Error> {
        self.record(BackendCall::Runner {
            image_id: image_id.to_owned(),
            config: config.clone(),
        });
        self.check(FakeOperation::Runner)?;
        Ok(FakeRunner {
            backend: self.clone(),
            config: config.clone(),
        })
    }

    fn persistent_disk(&self, config: &BackendConfig) -> Result<Self::Disk, Self::Error> {
        self.record(BackendCall::PersistentDisk {
            section: config.section().map(str::to_owned),
        });
        self.check(FakeOperation::PersistentDisk)?;
        Ok(FakeDisk {
            backend: self.clone(),
        })
    }
}

/// Renders an instance description the way the monitor reports it.
#[must_use]
pub fn vm_attributes(info: &VmInfo) -> Attributes {
    let numbers = [
        (ATTR_CPU, info.cpu.map(u64::from)),
        (ATTR_MEMORY, info.memory),
        (ATTR_DISK_SIZE, info.disk_size),
    ];
    let texts = [
        (ATTR_NAME, info.name.as_ref()),
        (ATTR_STATE_SUMMARY, info.state_summary.as_ref()),
        (ATTR_NIC_IP, info.nic_ip.as_ref()),
        (ATTR_DISK_SOURCE, info.disk_source.as_ref()),
        (ATTR_HOST, info.host.as_ref()),
    ];
    std::iter::once((ATTR_ID.to_owned(), info.id.clone()))
        .chain(
            numbers
                .into_iter()
                .filter_map(|(key, value)| value.map(|number| (key.to_owned(), number.to_string()))),
        )
        .chain(
            texts
                .into_iter()
                .filter_map(|(key, value)| value.map(|text| (key.to_owned(), text.clone()))),
        )
        .collect()
}

/// Renders a volume description the way the persistent disk client reports
/// it.
#[must_use]
pub fn volume_attributes(info: &VolumeInfo) -> Attributes {
    [
        (ATTR_VOLUME_UUID, info.uuid.clone()),
        (ATTR_VOLUME_TAG, info.tag.clone()),
        (ATTR_VOLUME_SIZE, info.size.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_owned(), value))
    .collect()
}

/// Catalog fetcher serving a fixed document and recording requested URLs.
#[derive(Clone, Debug)]
pub struct StaticCatalogFetcher {
    response: Result<String, MarketplaceError>,
    requests: Rc<RefCell<Vec<String>>>,
}

impl StaticCatalogFetcher {
    /// Serves `document` for every URL.
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            response: Ok(document.into()),
            requests: Rc::default(),
        }
    }

    /// Fails every fetch with a transport error.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            response: Err(MarketplaceError::Fetch {
                url: String::new(),
                message: String::from("simulated outage"),
            }),
            requests: Rc::default(),
        }
    }

    /// Returns the URLs requested so far.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl CatalogFetcher for StaticCatalogFetcher {
    fn fetch(&self, url: &str) -> Result<String, MarketplaceError> {
        self.requests.borrow_mut().push(url.to_owned());
        self.response.clone().map_err(|err| match err {
            MarketplaceError::Fetch { message, .. } => MarketplaceError::Fetch {
                url: url.to_owned(),
                message,
            },
            other => other,
        })
    }
}

/// Builds a Marketplace catalog document from `(identifier, title,
/// description)` entries. `None` leaves the element out.
#[must_use]
pub fn marketplace_document(entries: &[(Option<&str>, Option<&str>, Option<&str>)]) -> String {
    let body: String = entries
        .iter()
        .map(|(identifier, title, description)| {
            let element = |name: &str, value: Option<&str>| {
                value
                    .map(|text| format!("<dcterms:{name}>{text}</dcterms:{name}>"))
                    .unwrap_or_default()
            };
            format!(
                "<rdf:RDF><rdf:Description>{}{}{}</rdf:Description></rdf:RDF>",
                element("identifier", *identifier),
                element("title", *title),
                element("description", *description),
            )
        })
        .collect();
    format!(
        "<metadata xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\" \
         xmlns:dcterms=\"http://purl.org/dc/terms/\">{body}</metadata>"
    )
}
