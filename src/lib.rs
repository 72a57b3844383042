//! StratusLab compute driver for a generic multi-cloud resource contract.
//!
//! The crate maps the configuration-section oriented StratusLab client
//! (instance monitor, runner, persistent disk client, Marketplace catalog)
//! onto provider-neutral nodes, images, sizes, locations, and storage
//! volumes. The StratusLab client components are consumed through the
//! traits in [`backend`]; [`StratusLabDriver`] implements [`NodeDriver`] on
//! top of them.

pub mod backend;
pub mod catalog;
pub mod compute;
pub mod config;
pub mod driver;
pub mod error;
pub mod marketplace;
pub mod node;
pub mod state;
pub mod test_support;
pub mod user_config;
pub mod volume;

pub use backend::{
    Attributes, Backend, BackendConfig, InstanceMonitor, NetworkDetail, PersistentDisk,
    RecordError, Runner, Visibility, VmInfo, VolumeInfo,
};
pub use catalog::{Catalogs, Location, LocationCatalog, Resources, Size, SizeCatalog};
pub use compute::{NodeDriver, NodeRequest};
pub use config::{ConfigError, DEFAULT_USER_CONFIG, DriverOptions};
pub use driver::StratusLabDriver;
pub use error::DriverError;
pub use marketplace::{
    CatalogFetcher, DEFAULT_MARKETPLACE_URL, HttpCatalogFetcher, Image, Marketplace,
    MarketplaceError,
};
pub use node::{Node, NodeAuthSshKey, NodeBuilder};
pub use state::NodeState;
pub use user_config::UserConfig;
pub use volume::{AttachedNode, Attachment, StorageVolume};
