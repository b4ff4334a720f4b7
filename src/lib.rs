//! Azure object-store and volume-snapshotter plugins for a Kubernetes
//! backup host.
//!
//! The object store keeps backup artefacts in Azure Blob Storage and the
//! volume snapshotter snapshots and restores managed disks. Both resolve
//! their credentials from the process environment, optionally overlaid by
//! a per-location credentials file, and both are registered in the
//! [`server`] registry under [`server::PLUGIN_NAME`].

pub mod arm;
pub mod auth;
pub mod blob;
pub mod cloud;
pub mod config;
pub mod credentials;
pub mod files;
pub mod http;
pub mod object_store;
pub mod plugin;
pub mod server;
pub mod snapshotter;
pub mod test_support;

pub use config::{ConfigError, PluginSettings};
pub use credentials::{CredentialError, Credentials};
pub use object_store::{AzureObjectStore, ObjectStoreError};
pub use plugin::{
    InvalidConfigKeys, ObjectBody, ObjectReader, ObjectStore, PluginConfig, PluginFuture,
    VolumeInfo, VolumeSnapshotter, validate_config_keys,
};
pub use server::{PLUGIN_NAME, PluginKind, PluginServer, ServerError, default_server};
pub use snapshotter::{AzureVolumeSnapshotter, SnapshotLocation, SnapshotterError};
