//! Persistent storage volumes and their attachment state.

use crate::catalog::Location;
use crate::node::Node;

/// Identity of the node a volume is attached to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttachedNode {
    /// Node identifier.
    pub id: String,
    /// Node name.
    pub name: String,
}

/// Attachment state of a volume.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Attachment {
    /// Not attached to any node.
    #[default]
    Detached,
    /// Hot-attached to a node.
    Attached(AttachedNode),
}

/// A persistent disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StorageVolume {
    /// Volume identifier (the persistent disk UUID).
    pub id: String,
    /// Volume tag.
    pub name: String,
    /// Size in GiB.
    pub size: u64,
    /// Location the volume lives in.
    pub location: Location,
    attachment: Attachment,
}

impl StorageVolume {
    /// Creates a detached volume.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        location: Location,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            location,
            attachment: Attachment::Detached,
        }
    }

    /// Returns the attachment state.
    #[must_use]
    pub const fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Returns the node this volume is attached to, if any.
    #[must_use]
    pub const fn attached_node(&self) -> Option<&AttachedNode> {
        match &self.attachment {
            Attachment::Attached(node) => Some(node),
            Attachment::Detached => None,
        }
    }

    /// Returns `true` when the volume is attached to a node.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self.attachment, Attachment::Attached(_))
    }

    pub(crate) fn mark_attached(&mut self, node: &Node) {
        self.attachment = Attachment::Attached(AttachedNode {
            id: node.id.clone(),
            name: node.name.clone(),
        });
    }

    pub(crate) fn mark_detached(&mut self) {
        self.attachment = Attachment::Detached;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_volumes_are_detached() {
        let volume = StorageVolume::new("vol-1", "data", 10, Location::new("a", "A", "fr"));
        assert_eq!(volume.attachment(), &Attachment::Detached);
        assert!(volume.attached_node().is_none());
    }

    #[test]
    fn attachment_tracks_node_identity() {
        let location = Location::new("a", "A", "fr");
        let node = Node::builder("12", "worker")
            .location(location.clone())
            .build()
            .expect("node builds");
        let mut volume = StorageVolume::new("vol-1", "data", 10, location);

        volume.mark_attached(&node);
        assert!(volume.is_attached());
        assert_eq!(
            volume.attached_node().map(|attached| attached.id.as_str()),
            Some("12")
        );

        volume.mark_detached();
        assert!(!volume.is_attached());
    }
}
