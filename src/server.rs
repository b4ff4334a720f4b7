//! Registry binding plugin names to their initializers.
//!
//! The backup host looks plugins up by kind and name. [`default_server`]
//! registers the Azure object store and volume snapshotter under
//! [`PLUGIN_NAME`].

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::object_store::{AzureObjectStore, ObjectStoreError};
use crate::plugin::{ObjectStore, VolumeSnapshotter};
use crate::snapshotter::{AzureVolumeSnapshotter, SnapshotterError};

/// Name under which both Azure plugins are registered.
pub const PLUGIN_NAME: &str = "velero.io/azure";

/// Object store as handed out by the registry.
pub type DynObjectStore = Box<dyn ObjectStore<Error = ObjectStoreError>>;

/// Volume snapshotter as handed out by the registry.
pub type DynVolumeSnapshotter = Box<dyn VolumeSnapshotter<Error = SnapshotterError>>;

/// Builds a fresh, uninitialised object store.
pub type ObjectStoreInitializer = fn() -> DynObjectStore;

/// Builds a fresh, uninitialised volume snapshotter.
pub type VolumeSnapshotterInitializer = fn() -> DynVolumeSnapshotter;

/// Plugin kinds understood by the registry.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum PluginKind {
    /// Backup storage.
    ObjectStore,
    /// Volume snapshots.
    VolumeSnapshotter,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectStore => f.write_str("ObjectStore"),
            Self::VolumeSnapshotter => f.write_str("VolumeSnapshotter"),
        }
    }
}

/// Errors raised by registry lookups.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ServerError {
    /// Nothing is registered under the requested kind and name.
    #[error("no {kind} plugin registered as {name:?}")]
    UnknownPlugin {
        /// Requested kind.
        kind: PluginKind,
        /// Requested name.
        name: String,
    },
}

/// Plugin registry.
#[derive(Clone, Debug, Default)]
pub struct PluginServer {
    object_stores: BTreeMap<String, ObjectStoreInitializer>,
    volume_snapshotters: BTreeMap<String, VolumeSnapshotterInitializer>,
}

impl PluginServer {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            object_stores: BTreeMap::new(),
            volume_snapshotters: BTreeMap::new(),
        }
    }

    /// Registers an object store under `name`, replacing any earlier entry.
    #[must_use]
    pub fn register_object_store(
        mut self,
        name: impl Into<String>,
        initializer: ObjectStoreInitializer,
    ) -> Self {
        self.object_stores.insert(name.into(), initializer);
        self
    }

    /// Registers a volume snapshotter under `name`, replacing any earlier
    /// entry.
    #[must_use]
    pub fn register_volume_snapshotter(
        mut self,
        name: impl Into<String>,
        initializer: VolumeSnapshotterInitializer,
    ) -> Self {
        self.volume_snapshotters.insert(name.into(), initializer);
        self
    }

    /// Builds the object store registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownPlugin`] when nothing is registered.
    pub fn object_store(&self, name: &str) -> Result<DynObjectStore, ServerError> {
        self.object_stores
            .get(name)
            .map(|initializer| initializer())
            .ok_or_else(|| unknown(PluginKind::ObjectStore, name))
    }

    /// Builds the volume snapshotter registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownPlugin`] when nothing is registered.
    pub fn volume_snapshotter(&self, name: &str) -> Result<DynVolumeSnapshotter, ServerError> {
        self.volume_snapshotters
            .get(name)
            .map(|initializer| initializer())
            .ok_or_else(|| unknown(PluginKind::VolumeSnapshotter, name))
    }

    /// Every registration, ordered by kind and then name.
    #[must_use]
    pub fn plugins(&self) -> Vec<(PluginKind, String)> {
        self.object_stores
            .keys()
            .map(|name| (PluginKind::ObjectStore, name.clone()))
            .chain(
                self.volume_snapshotters
                    .keys()
                    .map(|name| (PluginKind::VolumeSnapshotter, name.clone())),
            )
            .collect()
    }
}

fn unknown(kind: PluginKind, name: &str) -> ServerError {
    ServerError::UnknownPlugin {
        kind,
        name: name.to_owned(),
    }
}

fn new_object_store() -> DynObjectStore {
    Box::new(AzureObjectStore::new())
}

fn new_volume_snapshotter() -> DynVolumeSnapshotter {
    Box::new(AzureVolumeSnapshotter::new())
}

/// Registry holding the Azure plugins.
#[must_use]
pub fn default_server() -> PluginServer {
    PluginServer::new()
        .register_object_store(PLUGIN_NAME, new_object_store)
        .register_volume_snapshotter(PLUGIN_NAME, new_volume_snapshotter)
}
