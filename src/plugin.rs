//! Plugin contract shared by the object-store and volume-snapshotter adapters.
//!
//! The backup host drives both plugins through these traits. Every call
//! returns a boxed future so implementations remain object safe and can be
//! registered behind `Box<dyn ...>` in the [`crate::server`] registry.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Boxed future returned by plugin operations.
pub type PluginFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Flat location configuration handed to `init` by the host.
pub type PluginConfig = BTreeMap<String, String>;

/// Streaming request body consumed by [`ObjectStore::put_object`].
pub type ObjectBody = BoxStream<'static, std::io::Result<Bytes>>;

/// Streaming response body produced by [`ObjectStore::get_object`].
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Storage adapter persisting backup artefacts.
pub trait ObjectStore: Send + Sync {
    /// Error type surfaced by the store.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepares the store from location configuration.
    fn init<'a>(&'a mut self, config: &'a PluginConfig) -> PluginFuture<'a, (), Self::Error>;

    /// Uploads `body` to `key` within `bucket`.
    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: ObjectBody,
    ) -> PluginFuture<'a, (), Self::Error>;

    /// Reports whether `key` exists in `bucket`.
    fn object_exists<'a>(&'a self, bucket: &'a str, key: &'a str)
    -> PluginFuture<'a, bool, Self::Error>;

    /// Streams the contents of `key`.
    fn get_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> PluginFuture<'a, ObjectReader, Self::Error>;

    /// Lists the prefixes found under `prefix` when keys are split on
    /// `delimiter`.
    fn list_common_prefixes<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        delimiter: &'a str,
    ) -> PluginFuture<'a, Vec<String>, Self::Error>;

    /// Lists every key beginning with `prefix`.
    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> PluginFuture<'a, Vec<String>, Self::Error>;

    /// Removes `key` from `bucket`.
    fn delete_object<'a>(&'a self, bucket: &'a str, key: &'a str)
    -> PluginFuture<'a, (), Self::Error>;

    /// Produces a URL granting read access to `key` for `ttl`.
    fn create_signed_url<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        ttl: Duration,
    ) -> PluginFuture<'a, String, Self::Error>;
}

/// Volume type and provisioned IOPS reported for a disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VolumeInfo {
    /// Storage SKU of the volume (for example `Premium_LRS`).
    pub volume_type: String,
    /// Provisioned IOPS, when the provider reports them.
    pub iops: Option<i64>,
}

/// Snapshot adapter for persistent volumes.
pub trait VolumeSnapshotter: Send + Sync {
    /// Error type surfaced by the snapshotter.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepares the snapshotter from location configuration.
    fn init<'a>(&'a mut self, config: &'a PluginConfig) -> PluginFuture<'a, (), Self::Error>;

    /// Restores a new volume from `snapshot_id`, returning the volume ID.
    fn create_volume_from_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        volume_type: &'a str,
        volume_az: &'a str,
        iops: Option<i64>,
    ) -> PluginFuture<'a, String, Self::Error>;

    /// Returns the type and IOPS of `volume_id`.
    fn get_volume_info<'a>(
        &'a self,
        volume_id: &'a str,
        volume_az: &'a str,
    ) -> PluginFuture<'a, VolumeInfo, Self::Error>;

    /// Snapshots `volume_id`, returning the snapshot ID.
    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        volume_az: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> PluginFuture<'a, String, Self::Error>;

    /// Deletes `snapshot_id`; deleting a missing snapshot succeeds.
    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> PluginFuture<'a, (), Self::Error>;

    /// Extracts the volume ID from a persistent volume document. Returns an
    /// empty string when the volume is not managed by this plugin.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is malformed.
    fn get_volume_id(&self, pv: &Value) -> Result<String, Self::Error>;

    /// Returns a copy of `pv` referencing `volume_id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the document does not describe a supported
    /// volume source.
    fn set_volume_id(&self, pv: &Value, volume_id: &str) -> Result<Value, Self::Error>;
}

/// Raised when a location configuration carries unsupported keys.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("config has invalid keys {invalid:?}; valid keys are {valid:?}")]
pub struct InvalidConfigKeys {
    /// Keys that were supplied but are not recognised, sorted.
    pub invalid: Vec<String>,
    /// Keys accepted by the plugin, sorted.
    pub valid: Vec<String>,
}

/// Checks that every key in `config` appears in `valid_keys`.
///
/// # Errors
///
/// Returns [`InvalidConfigKeys`] listing every unrecognised key.
pub fn validate_config_keys(
    config: &PluginConfig,
    valid_keys: &[&str],
) -> Result<(), InvalidConfigKeys> {
    let valid: BTreeSet<&str> = valid_keys.iter().copied().collect();
    let invalid: Vec<String> = config
        .keys()
        .filter(|key| !valid.contains(key.as_str()))
        .cloned()
        .collect();

    if invalid.is_empty() {
        return Ok(());
    }

    Err(InvalidConfigKeys {
        invalid,
        valid: valid.into_iter().map(str::to_owned).collect(),
    })
}
