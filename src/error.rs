//! Errors surfaced by driver operations.

use thiserror::Error;

use crate::backend::RecordError;
use crate::config::ConfigError;
use crate::marketplace::MarketplaceError;

/// Errors raised by [`crate::StratusLabDriver`] and node accessors.
#[derive(Debug, Error)]
pub enum DriverError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Configuration is missing or inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The instance monitor does not know the node.
    #[error("cannot recover state information for {node_id}")]
    NodeNotFound {
        /// Node identifier.
        node_id: String,
    },
    /// Hot attachment needs the node's physical host.
    #[error("node {node_id} does not contain host information")]
    MissingHost {
        /// Node identifier.
        node_id: String,
    },
    /// Detaching needs a recorded attachment.
    #[error("volume {volume_id} is not attached to a node")]
    NotAttached {
        /// Volume identifier.
        volume_id: String,
    },
    /// The runner started nothing.
    #[error("runner returned no instance identifiers for {name}")]
    NoInstanceIds {
        /// Requested node name.
        name: String,
    },
    /// A backend record is malformed.
    #[error(transparent)]
    Record(#[from] RecordError),
    /// The Marketplace catalog is unavailable.
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    /// The SSH public key could not be written to a temporary file.
    #[error("failed to stage SSH public key: {message}")]
    KeyStaging {
        /// I/O error message.
        message: String,
    },
    /// A backend component failed.
    #[error("backend error: {0}")]
    Backend(#[source] BackendError),
}
