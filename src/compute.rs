//! Generic multi-cloud compute contract.
//!
//! [`NodeDriver`] is the provider-neutral surface callers program against:
//! nodes, images, sizes, locations, and storage volumes. Optional location
//! arguments fall back to the driver's default location.

use crate::catalog::{Location, Size};
use crate::marketplace::Image;
use crate::node::{Node, NodeAuthSshKey};
use crate::volume::StorageVolume;

/// Parameters for [`NodeDriver::create_node`].
#[derive(Clone, Copy, Debug)]
pub struct NodeRequest<'a> {
    /// Name given to the node.
    pub name: &'a str,
    /// Resource profile.
    pub size: &'a Size,
    /// Boot image.
    pub image: &'a Image,
    /// Target location; `None` selects the default.
    pub location: Option<&'a Location>,
    /// Key installed for remote access.
    pub auth: Option<&'a NodeAuthSshKey>,
}

impl<'a> NodeRequest<'a> {
    /// Creates a request for the default location without authentication.
    #[must_use]
    pub const fn new(name: &'a str, size: &'a Size, image: &'a Image) -> Self {
        Self {
            name,
            size,
            image,
            location: None,
            auth: None,
        }
    }

    /// Targets a specific location.
    #[must_use]
    pub const fn location(mut self, location: &'a Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Installs an SSH public key on the node.
    #[must_use]
    pub const fn auth(mut self, key: &'a NodeAuthSshKey) -> Self {
        self.auth = Some(key);
        self
    }
}

/// Resource driver for one cloud provider.
pub trait NodeDriver {
    /// Error type returned by driver operations.
    type Error: std::error::Error + 'static;

    /// Human-readable provider name.
    fn name(&self) -> &'static str;

    /// Provider home page.
    fn website(&self) -> &'static str;

    /// Short provider identifier.
    fn provider_type(&self) -> &'static str;

    /// Authentication methods accepted by [`NodeDriver::create_node`].
    fn create_node_features(&self) -> &'static [&'static str];

    /// Lists nodes across all locations.
    ///
    /// # Errors
    ///
    /// Returns the driver error when a location cannot be queried.
    fn list_nodes(&self) -> Result<Vec<Node>, Self::Error>;

    /// Lists nodes at one location.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the location cannot be queried.
    fn list_nodes_in_location(&self, location: &Location) -> Result<Vec<Node>, Self::Error>;

    /// Starts a node.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the node cannot be started.
    fn create_node(&self, request: NodeRequest<'_>) -> Result<Node, Self::Error>;

    /// Terminates a node.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the node cannot be terminated.
    fn destroy_node(&self, node: &mut Node) -> Result<bool, Self::Error>;

    /// Lists boot images available at a location.
    ///
    /// # Errors
    ///
    /// Returns the driver error when images cannot be listed.
    fn list_images(&self, location: Option<&Location>) -> Result<Vec<Image>, Self::Error>;

    /// Lists resource profiles available at a location.
    ///
    /// # Errors
    ///
    /// Returns the driver error when sizes cannot be listed.
    fn list_sizes(&self, location: Option<&Location>) -> Result<Vec<Size>, Self::Error>;

    /// Lists locations.
    ///
    /// # Errors
    ///
    /// Returns the driver error when locations cannot be listed.
    fn list_locations(&self) -> Result<Vec<Location>, Self::Error>;

    /// Lists storage volumes at a location.
    ///
    /// # Errors
    ///
    /// Returns the driver error when volumes cannot be listed.
    fn list_volumes(&self, location: Option<&Location>) -> Result<Vec<StorageVolume>, Self::Error>;

    /// Creates a storage volume of `size` GiB.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the volume cannot be created.
    fn create_volume(
        &self,
        size: u64,
        name: &str,
        location: Option<&Location>,
        snapshot: Option<&str>,
    ) -> Result<StorageVolume, Self::Error>;

    /// Deletes a storage volume.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the volume cannot be deleted.
    fn destroy_volume(&self, volume: &StorageVolume) -> Result<bool, Self::Error>;

    /// Attaches a volume to a node.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the volume cannot be attached.
    fn attach_volume(
        &self,
        node: &Node,
        volume: &mut StorageVolume,
        device: Option<&str>,
    ) -> Result<bool, Self::Error>;

    /// Detaches a volume from its node.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the volume is not attached or cannot be
    /// detached.
    fn detach_volume(&self, volume: &mut StorageVolume) -> Result<bool, Self::Error>;
}
