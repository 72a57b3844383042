//! StratusLab implementation of the generic [`NodeDriver`] contract.
//!
//! Every operation resolves a location to its [`BackendConfig`], delegates to
//! a backend component built for that configuration, and maps the result onto
//! the generic value objects. Locations and sizes are computed once at
//! construction; images, nodes, and volumes are queried on every call.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::backend::{
    Backend, BackendConfig, InstanceMonitor, PersistentDisk, REQUIRED_RUN_OPTIONS,
    Runner as _, USER_PUBLIC_KEY_FILE, VERBOSE_LEVEL, VM_CPU, VM_NAME, VM_RAM, VM_SWAP,
    Visibility, VmInfo, VolumeInfo,
};
use crate::catalog::{Catalogs, Location, LocationCatalog, Size, SizeCatalog};
use crate::compute::{NodeDriver, NodeRequest};
use crate::config::DriverOptions;
use crate::error::DriverError;
use crate::marketplace::{CatalogFetcher, HttpCatalogFetcher, Image, Marketplace};
use crate::node::{Node, NodeAuthSshKey};
use crate::state::NodeState;
use crate::user_config::UserConfig;
use crate::volume::StorageVolume;

/// Provider name reported by the driver.
pub const DRIVER_NAME: &str = "StratusLab Node Provider";
/// Provider home page.
pub const DRIVER_WEBSITE: &str = "http://stratuslab.eu/";
/// Provider identifier.
pub const PROVIDER_TYPE: &str = "stratuslab";
/// Authentication methods accepted when creating nodes.
pub const CREATE_NODE_FEATURES: &[&str] = &["ssh_key"];

/// Origin reported in errors for configuration read from a stream.
pub const STREAM_ORIGIN: &str = "<stream>";

const KEY_FILE_PREFIX: &str = "ssh_";
const KEY_FILE_SUFFIX: &str = "_pub.key";

/// Resource driver backed by StratusLab client components.
#[derive(Debug)]
pub struct StratusLabDriver<B, F = HttpCatalogFetcher> {
    backend: B,
    marketplace: Marketplace<F>,
    user_config: UserConfig,
    locations: LocationCatalog,
    sizes: SizeCatalog,
}

impl<B: Backend> StratusLabDriver<B> {
    /// Loads the user configuration named by `options` and builds a driver
    /// that reads the Marketplace over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when the configuration file cannot be
    /// read or does not define a usable default location.
    pub fn new(backend: B, options: &DriverOptions) -> Result<Self, DriverError<B::Error>> {
        let path = options.user_config_path();
        debug!(%path, "loading user configuration");
        let user_config = UserConfig::load(&path)?;
        Self::from_user_config(
            backend,
            HttpCatalogFetcher::default(),
            user_config,
            options.default_location_override(),
        )
    }

    /// Reads the user configuration from `reader` and builds a driver that
    /// reads the Marketplace over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when the stream cannot be read, its
    /// content is invalid, or it does not define a usable default location.
    pub fn from_reader<R: Read>(
        backend: B,
        reader: R,
        default_override: Option<&str>,
    ) -> Result<Self, DriverError<B::Error>> {
        debug!("loading user configuration from stream");
        let user_config = UserConfig::from_reader(STREAM_ORIGIN, reader)?;
        Self::from_user_config(
            backend,
            HttpCatalogFetcher::default(),
            user_config,
            default_override,
        )
    }
}

impl<B: Backend, F: CatalogFetcher> StratusLabDriver<B, F> {
    /// Builds a driver from parsed configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] when no default location can be
    /// resolved.
    pub fn from_user_config(
        backend: B,
        fetcher: F,
        user_config: UserConfig,
        default_override: Option<&str>,
    ) -> Result<Self, DriverError<B::Error>> {
        let Catalogs { locations, sizes } = Catalogs::from_user_config(
            &user_config,
            backend.default_instance_types(),
            default_override,
        )?;
        debug!(
            default_location = %locations.default_location().id,
            locations = locations.len(),
            sizes = sizes.len(),
            "driver catalogs ready"
        );
        Ok(Self {
            backend,
            marketplace: Marketplace::new(fetcher),
            user_config,
            locations,
            sizes,
        })
    }

    /// Returns the backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the parsed user configuration.
    #[must_use]
    pub const fn user_config(&self) -> &UserConfig {
        &self.user_config
    }

    /// Returns the default location.
    #[must_use]
    pub const fn default_location(&self) -> &Location {
        self.locations.default_location()
    }

    /// Returns the location catalog.
    #[must_use]
    pub const fn locations(&self) -> &LocationCatalog {
        &self.locations
    }

    /// Returns the size catalog.
    #[must_use]
    pub const fn sizes(&self) -> &SizeCatalog {
        &self.sizes
    }

    /// Queries the current state of a node.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NodeNotFound`] when the backend no longer knows
    /// the node, or [`DriverError::Backend`] when the query fails.
    pub fn node_state(&self, node: &Node) -> Result<NodeState, DriverError<B::Error>> {
        node.state(&self.backend, &self.user_config)
    }

    /// Queries the physical host of a node.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NodeNotFound`] when the backend no longer knows
    /// the node, or [`DriverError::Backend`] when the query fails.
    pub fn node_host(&self, node: &Node) -> Result<Option<String>, DriverError<B::Error>> {
        node.host(&self.backend, &self.user_config)
    }

    /// Lists Marketplace images for a location, surfacing fetch and parse
    /// failures.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Marketplace`] when the catalog cannot be
    /// downloaded or parsed.
    pub fn try_list_images(
        &self,
        location: Option<&Location>,
    ) -> Result<Vec<Image>, DriverError<B::Error>> {
        let config = self.config_for(location);
        Ok(self.marketplace.images(&config)?)
    }

    fn resolve<'a>(&'a self, location: Option<&'a Location>) -> &'a Location {
        location.unwrap_or_else(|| self.locations.default_location())
    }

    fn config_for(&self, location: Option<&Location>) -> BackendConfig {
        self.user_config
            .backend_config(Some(&self.resolve(location).id))
    }

    fn vm_to_node(&self, info: VmInfo, location: &Location) -> Result<Node, DriverError<B::Error>> {
        let size = Size::with_resources(format!("{}_size", info.id), info.resources());
        let image = info
            .marketplace_id()
            .map_or_else(|| Image::new("", ""), |id| Image::new(id, id));
        let state = NodeState::from_summary(info.state_summary.as_deref());
        let public_ips = info.nic_ip.into_iter().collect();

        Ok(Node::builder(info.id, info.name.unwrap_or_default())
            .state(state)
            .public_ips(public_ips)
            .size(size)
            .image(image)
            .location(location.clone())
            .build()?)
    }

    fn insert_required_run_option_defaults(&self, config: &mut BackendConfig) {
        let mut defaults = self.backend.default_run_options();
        defaults.insert(String::from(VERBOSE_LEVEL), String::from("-1"));
        for option in REQUIRED_RUN_OPTIONS {
            if !config.is_set(option) {
                let value = defaults.get(option).cloned().unwrap_or_default();
                config.set(option, value);
            }
        }
    }

    /// Builds a runner for one instance. The returned key file, when present,
    /// must stay alive until the instance has been launched.
    fn create_runner(
        &self,
        name: &str,
        size: &Size,
        image: &Image,
        location: &Location,
        auth: Option<&NodeAuthSshKey>,
    ) -> Result<(B::Runner, Option<NamedTempFile>), DriverError<B::Error>> {
        let mut config = self.user_config.backend_config(Some(&location.id));
        self.insert_required_run_option_defaults(&mut config);

        config.set(VM_NAME, name);
        let key_file = auth.map(stage_public_key::<B::Error>).transpose()?;
        if let Some(file) = &key_file {
            config.set(USER_PUBLIC_KEY_FILE, file.path().to_string_lossy());
        }
        config.set(VM_CPU, size.cpu);
        config.set(VM_RAM, size.ram);
        config.set(VM_SWAP, size.disk);

        debug!(%name, image = %image.id, location = %location.id, "creating runner");
        let runner = self
            .backend
            .runner(&image.id, &config)
            .map_err(DriverError::Backend)?;
        Ok((runner, key_file))
    }

    fn persistent_disk(
        &self,
        location: Option<&Location>,
    ) -> Result<B::Disk, DriverError<B::Error>> {
        let config = self.config_for(location);
        self.backend
            .persistent_disk(&config)
            .map_err(DriverError::Backend)
    }
}

fn stage_public_key<E>(auth: &NodeAuthSshKey) -> Result<NamedTempFile, DriverError<E>>
where
    E: std::error::Error + 'static,
{
    let staging_error = |err: std::io::Error| DriverError::KeyStaging {
        message: err.to_string(),
    };
    let mut file = tempfile::Builder::new()
        .prefix(KEY_FILE_PREFIX)
        .suffix(KEY_FILE_SUFFIX)
        .tempfile()
        .map_err(staging_error)?;
    file.write_all(auth.pubkey().as_bytes())
        .and_then(|()| file.flush())
        .map_err(staging_error)?;
    Ok(file)
}

impl<B: Backend, F: CatalogFetcher> NodeDriver for StratusLabDriver<B, F> {
    type Error = DriverError<B::Error>;

    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn website(&self) -> &'static str {
        DRIVER_WEBSITE
    }

    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn create_node_features(&self) -> &'static [&'static str] {
        CREATE_NODE_FEATURES
    }

    fn list_nodes(&self) -> Result<Vec<Node>, Self::Error> {
        let mut nodes = Vec::new();
        for location in self.locations.iter() {
            nodes.extend(self.list_nodes_in_location(location)?);
        }
        Ok(nodes)
    }

    fn list_nodes_in_location(&self, location: &Location) -> Result<Vec<Node>, Self::Error> {
        let config = self.user_config.backend_config(Some(&location.id));
        let monitor = self
            .backend
            .monitor(&config)
            .map_err(DriverError::Backend)?;
        debug!(location = %location.id, "listing instances");
        monitor
            .list_vms()
            .map_err(DriverError::Backend)?
            .iter()
            .map(|attributes| {
                self.vm_to_node(VmInfo::from_attributes(attributes)?, location)
            })
            .collect()
    }

    fn create_node(&self, request: NodeRequest<'_>) -> Result<Node, Self::Error> {
        let location = self.resolve(request.location);
        let (runner, key_file) = self.create_runner(
            request.name,
            request.size,
            request.image,
            location,
            request.auth,
        )?;

        let ids = runner.run_instance().map_err(DriverError::Backend);
        drop(key_file);
        let node_id = ids?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NoInstanceIds {
                name: request.name.to_owned(),
            })?;
        debug!(%node_id, name = %request.name, "instance started");

        let mut node = Node::builder(node_id, request.name)
            .state(NodeState::Pending)
            .size(request.size.clone())
            .image(request.image.clone())
            .location(location.clone())
            .build()?;

        let detail = runner
            .network_detail(&node.id)
            .inspect_err(|err| {
                warn!(node_id = %node.id, error = %err, "instance address not available");
            })
            .ok();
        node.public_ips = detail.map_or_else(Vec::new, |found| vec![found.address]);
        Ok(node)
    }

    fn destroy_node(&self, node: &mut Node) -> Result<bool, Self::Error> {
        let (runner, _) =
            self.create_runner(&node.name, &node.size, &node.image, &node.location, None)?;
        debug!(node_id = %node.id, "killing instance");
        runner
            .kill_instances(std::slice::from_ref(&node.id))
            .map_err(DriverError::Backend)?;
        node.set_last_known_state(NodeState::Terminated);
        Ok(true)
    }

    fn list_images(&self, location: Option<&Location>) -> Result<Vec<Image>, Self::Error> {
        Ok(self.try_list_images(location).unwrap_or_else(|err| {
            warn!(error = %err, "marketplace catalog unavailable");
            Vec::new()
        }))
    }

    fn list_sizes(&self, _location: Option<&Location>) -> Result<Vec<Size>, Self::Error> {
        Ok(self.sizes.iter().cloned().collect())
    }

    fn list_locations(&self) -> Result<Vec<Location>, Self::Error> {
        Ok(self.locations.iter().cloned().collect())
    }

    fn list_volumes(&self, location: Option<&Location>) -> Result<Vec<StorageVolume>, Self::Error> {
        let resolved = self.resolve(location);
        let disk = self.persistent_disk(Some(resolved))?;
        let volumes = disk
            .describe_volumes(&BTreeMap::new())
            .map_err(DriverError::Backend)?;
        volumes
            .iter()
            .map(|attributes| -> Result<StorageVolume, Self::Error> {
                let info = VolumeInfo::from_attributes(attributes)?;
                Ok(StorageVolume::new(
                    info.uuid,
                    info.tag,
                    info.size,
                    resolved.clone(),
                ))
            })
            .collect()
    }

    fn create_volume(
        &self,
        size: u64,
        name: &str,
        location: Option<&Location>,
        _snapshot: Option<&str>,
    ) -> Result<StorageVolume, Self::Error> {
        let resolved = self.resolve(location);
        let disk = self.persistent_disk(Some(resolved))?;
        let uuid = disk
            .create_volume(size, name, Visibility::Private)
            .map_err(DriverError::Backend)?;
        debug!(volume_id = %uuid, location = %resolved.id, "volume created");
        Ok(StorageVolume::new(uuid, name, size, resolved.clone()))
    }

    fn destroy_volume(&self, volume: &StorageVolume) -> Result<bool, Self::Error> {
        let disk = self.persistent_disk(Some(&volume.location))?;
        disk.delete_volume(&volume.id)
            .map_err(DriverError::Backend)?;
        Ok(true)
    }

    fn attach_volume(
        &self,
        node: &Node,
        volume: &mut StorageVolume,
        _device: Option<&str>,
    ) -> Result<bool, Self::Error> {
        let disk = self.persistent_disk(Some(&volume.location))?;
        let host = self
            .node_host(node)?
            .ok_or_else(|| DriverError::MissingHost {
                node_id: node.id.clone(),
            })?;
        debug!(node_id = %node.id, volume_id = %volume.id, %host, "hot-attaching volume");
        disk.hot_attach(&host, &node.id, &volume.id)
            .map_err(DriverError::Backend)?;
        volume.mark_attached(node);
        Ok(true)
    }

    fn detach_volume(&self, volume: &mut StorageVolume) -> Result<bool, Self::Error> {
        let node_id = volume
            .attached_node()
            .map(|node| node.id.clone())
            .ok_or_else(|| DriverError::NotAttached {
                volume_id: volume.id.clone(),
            })?;
        let disk = self.persistent_disk(Some(&volume.location))?;
        debug!(%node_id, volume_id = %volume.id, "hot-detaching volume");
        disk.hot_detach(&node_id, &volume.id)
            .map_err(DriverError::Backend)?;
        volume.mark_detached();
        Ok(true)
    }
}
