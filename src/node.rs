//! Node value object with read-through state and host accessors.

use tracing::debug;

use crate::backend::{Backend, InstanceMonitor, VmInfo};
use crate::catalog::{Location, Size};
use crate::config::ConfigError;
use crate::error::DriverError;
use crate::marketplace::Image;
use crate::state::NodeState;
use crate::user_config::UserConfig;

/// SSH public key installed on a new node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeAuthSshKey {
    pubkey: String,
}

impl NodeAuthSshKey {
    /// Wraps a public key in OpenSSH format.
    #[must_use]
    pub fn new(pubkey: impl Into<String>) -> Self {
        Self {
            pubkey: pubkey.into(),
        }
    }

    /// Returns the public key.
    #[must_use]
    pub fn pubkey(&self) -> &str {
        &self.pubkey
    }
}

/// A running or terminated instance.
///
/// [`Node::state`] and [`Node::host`] query the backend on every call.
/// [`Node::last_known_state`] is a local value recorded when the node was
/// listed, created, or destroyed; it never changes what the backend reports.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Node {
    /// Backend instance identifier.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Public addresses.
    pub public_ips: Vec<String>,
    /// Private addresses.
    pub private_ips: Vec<String>,
    /// Resource profile.
    pub size: Size,
    /// Boot image.
    pub image: Image,
    /// Location the instance runs in.
    pub location: Location,
    last_known_state: NodeState,
}

impl Node {
    /// Starts a builder for a node.
    #[must_use]
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> NodeBuilder {
        NodeBuilder::new(id, name)
    }

    /// Returns the state recorded locally, without contacting the backend.
    #[must_use]
    pub const fn last_known_state(&self) -> NodeState {
        self.last_known_state
    }

    /// Records a locally known state.
    pub const fn set_last_known_state(&mut self, state: NodeState) {
        self.last_known_state = state;
    }

    /// Queries the backend for the node's current state.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NodeNotFound`] when the monitor reports no
    /// instance with this id, [`DriverError::Record`] when its attributes are
    /// malformed, or [`DriverError::Backend`] when the query fails.
    pub fn state<B: Backend>(
        &self,
        backend: &B,
        config: &UserConfig,
    ) -> Result<NodeState, DriverError<B::Error>> {
        let info = self.vm_info(backend, config)?;
        Ok(NodeState::from_summary(info.state_summary.as_deref()))
    }

    /// Queries the backend for the physical host running the node. Returns
    /// `None` when the backend does not report one.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NodeNotFound`] when the monitor reports no
    /// instance with this id, [`DriverError::Record`] when its attributes are
    /// malformed, or [`DriverError::Backend`] when the query fails.
    pub fn host<B: Backend>(
        &self,
        backend: &B,
        config: &UserConfig,
    ) -> Result<Option<String>, DriverError<B::Error>> {
        Ok(self.vm_info(backend, config)?.host)
    }

    fn vm_info<B: Backend>(
        &self,
        backend: &B,
        config: &UserConfig,
    ) -> Result<VmInfo, DriverError<B::Error>> {
        let backend_config = config.backend_config(Some(&self.location.id));
        let monitor = backend
            .monitor(&backend_config)
            .map_err(DriverError::Backend)?;
        debug!(node_id = %self.id, location = %self.location.id, "querying instance detail");
        let attributes = monitor
            .vm_detail(std::slice::from_ref(&self.id))
            .map_err(DriverError::Backend)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::NodeNotFound {
                node_id: self.id.clone(),
            })?;
        Ok(VmInfo::from_attributes(&attributes)?)
    }
}

/// Builder for [`Node`]; a location is mandatory.
#[derive(Clone, Debug)]
pub struct NodeBuilder {
    id: String,
    name: String,
    state: NodeState,
    public_ips: Vec<String>,
    private_ips: Vec<String>,
    size: Option<Size>,
    image: Option<Image>,
    location: Option<Location>,
}

impl NodeBuilder {
    /// Creates a builder for a node in the `Unknown` state.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: NodeState::Unknown,
            public_ips: Vec::new(),
            private_ips: Vec::new(),
            size: None,
            image: None,
            location: None,
        }
    }

    /// Sets the initially known state.
    #[must_use]
    pub const fn state(mut self, state: NodeState) -> Self {
        self.state = state;
        self
    }

    /// Sets the public addresses.
    #[must_use]
    pub fn public_ips(mut self, ips: Vec<String>) -> Self {
        self.public_ips = ips;
        self
    }

    /// Sets the private addresses.
    #[must_use]
    pub fn private_ips(mut self, ips: Vec<String>) -> Self {
        self.private_ips = ips;
        self
    }

    /// Sets the resource profile.
    #[must_use]
    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets the boot image.
    #[must_use]
    pub fn image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }

    /// Sets the location.
    #[must_use]
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Builds the node. A missing size becomes an empty one-CPU profile named
    /// `<id>_size`; a missing image becomes an empty reference.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingNodeLocation`] when no location was set.
    pub fn build(self) -> Result<Node, ConfigError> {
        let location = self.location.ok_or(ConfigError::MissingNodeLocation)?;
        let size = self
            .size
            .unwrap_or_else(|| Size::new(format!("{}_size", self.id), 0, 0));
        Ok(Node {
            id: self.id,
            name: self.name,
            public_ips: self.public_ips,
            private_ips: self.private_ips,
            size,
            image: self.image.unwrap_or_else(|| Image::new("", "")),
            location,
            last_known_state: self.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Location {
        Location::new("siteA", "Site A", "fr")
    }

    #[test]
    fn build_requires_location() {
        let err = Node::builder("1", "worker")
            .build()
            .expect_err("location is mandatory");
        assert_eq!(err, ConfigError::MissingNodeLocation);
    }

    #[test]
    fn build_fills_missing_size_and_image() {
        let node = Node::builder("7", "worker")
            .location(site())
            .build()
            .expect("node builds");
        assert_eq!(node.size.name, "7_size");
        assert_eq!(node.size.cpu, 1);
        assert_eq!(node.image, Image::new("", ""));
        assert_eq!(node.last_known_state(), NodeState::Unknown);
    }

    #[test]
    fn last_known_state_is_local() {
        let mut node = Node::builder("7", "worker")
            .state(NodeState::Pending)
            .location(site())
            .build()
            .expect("node builds");
        node.set_last_known_state(NodeState::Terminated);
        assert_eq!(node.last_known_state(), NodeState::Terminated);
    }
}
