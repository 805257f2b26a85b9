//! keyward-sync: local container, export blobs and remote reconciliation

pub mod container;
pub mod endpoint;
pub mod file;
pub mod packer;
pub mod reconcile;
pub mod store;
pub mod transport;

pub use container::{ExportBlob, LocalContainer, RemoteCollection, SettingsDocument};
pub use endpoint::SyncEndpoint;
pub use file::ContainerFile;
pub use reconcile::{decide, merge, Decision, MergeReport};
pub use store::{ConfigurationStore, SyncOutcome};
pub use transport::{FileTransport, MemoryTransport, SyncTransport};
