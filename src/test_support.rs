//! Test support utilities shared across unit and integration tests.
//!
//! Provides in-memory blob and compute services so plugin behaviour can be
//! exercised without Azure, plus an environment guard for tests that read
//! process variables.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::io::Cursor;
use std::sync::{Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};

use crate::arm::ArmError;
use crate::arm::compute::{
    ComputeFuture, ComputeService, Disk, Snapshot, disk_id, snapshot_id,
};
use crate::blob::{BlobError, BlobFuture, BlobListing, BlobService};
use crate::plugin::{ObjectReader, PluginConfig};

/// Builds a location configuration from literal pairs.
#[must_use]
pub fn plugin_config(pairs: &[(&str, &str)]) -> PluginConfig {
    pairs
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Block staged through [`MemoryBlobService`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StagedBlock {
    /// Container name.
    pub container: String,
    /// Blob name.
    pub blob: String,
    /// Block ID.
    pub id: String,
    /// Block size in bytes.
    pub len: usize,
}

#[derive(Debug, Default)]
struct BlobState {
    blobs: BTreeMap<(String, String), Vec<u8>>,
    pending: BTreeMap<(String, String, String), Bytes>,
    staged: Vec<StagedBlock>,
    commits: Vec<Vec<String>>,
}

/// In-memory [`BlobService`] that records staged blocks and commits.
#[derive(Debug, Default)]
pub struct MemoryBlobService {
    state: StdMutex<BlobState>,
}

fn blob_not_found(operation: &'static str) -> BlobError {
    BlobError::Status {
        operation,
        status: 404,
        code: "BlobNotFound".to_owned(),
        message: "The specified blob does not exist.".to_owned(),
    }
}

impl MemoryBlobService {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` directly as a committed blob.
    pub fn insert(&self, container: &str, blob: &str, data: impl Into<Vec<u8>>) {
        lock(&self.state)
            .blobs
            .insert((container.to_owned(), blob.to_owned()), data.into());
    }

    /// Contents of a committed blob.
    #[must_use]
    pub fn contents(&self, container: &str, blob: &str) -> Option<Vec<u8>> {
        lock(&self.state)
            .blobs
            .get(&(container.to_owned(), blob.to_owned()))
            .cloned()
    }

    /// Every block staged so far, in call order.
    #[must_use]
    pub fn staged(&self) -> Vec<StagedBlock> {
        lock(&self.state).staged.clone()
    }

    /// Every committed block list, in call order.
    #[must_use]
    pub fn commits(&self) -> Vec<Vec<String>> {
        lock(&self.state).commits.clone()
    }
}

impl BlobService for MemoryBlobService {
    fn stage_block<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_id: &'a str,
        data: Bytes,
    ) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            state.staged.push(StagedBlock {
                container: container.to_owned(),
                blob: blob.to_owned(),
                id: block_id.to_owned(),
                len: data.len(),
            });
            state.pending.insert(
                (container.to_owned(), blob.to_owned(), block_id.to_owned()),
                data,
            );
            Ok(())
        })
    }

    fn commit_block_list<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_ids: &'a [String],
    ) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let mut state = lock(&self.state);
            let mut contents = Vec::new();
            for id in block_ids {
                let key = (container.to_owned(), blob.to_owned(), id.clone());
                let block = state.pending.get(&key).ok_or_else(|| BlobError::Status {
                    operation: "commit block list",
                    status: 400,
                    code: "InvalidBlockList".to_owned(),
                    message: format!("block {id} was not staged"),
                })?;
                contents.extend_from_slice(block);
            }
            state
                .pending
                .retain(|(pending_container, pending_blob, _), _| {
                    pending_container != container || pending_blob != blob
                });
            state.commits.push(block_ids.to_vec());
            state
                .blobs
                .insert((container.to_owned(), blob.to_owned()), contents);
            Ok(())
        })
    }

    fn exists<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, bool> {
        Box::pin(async move { Ok(self.contents(container, blob).is_some()) })
    }

    fn download<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, ObjectReader> {
        Box::pin(async move {
            let data = self
                .contents(container, blob)
                .ok_or_else(|| blob_not_found("download"))?;
            let reader: ObjectReader = Box::pin(Cursor::new(data));
            Ok(reader)
        })
    }

    fn delete<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            lock(&self.state)
                .blobs
                .remove(&(container.to_owned(), blob.to_owned()))
                .map(|_| ())
                .ok_or_else(|| blob_not_found("delete"))
        })
    }

    fn list<'a>(
        &'a self,
        container: &'a str,
        prefix: &'a str,
        delimiter: Option<&'a str>,
    ) -> BlobFuture<'a, BlobListing> {
        Box::pin(async move {
            let state = lock(&self.state);
            let mut listing = BlobListing::default();
            let mut prefixes = BTreeSet::new();
            for (owner, name) in state.blobs.keys() {
                if owner != container {
                    continue;
                }
                let Some(rest) = name.strip_prefix(prefix) else {
                    continue;
                };
                let collapsed = delimiter
                    .filter(|delim| !delim.is_empty())
                    .and_then(|delim| {
                        rest.split_once(delim)
                            .map(|(head, _)| format!("{prefix}{head}{delim}"))
                    });
                match collapsed {
                    Some(common) => {
                        if prefixes.insert(common.clone()) {
                            listing.prefixes.push(common);
                        }
                    }
                    None => listing.names.push(name.clone()),
                }
            }
            Ok(listing)
        })
    }

    fn signed_url<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        ttl: Duration,
    ) -> BlobFuture<'a, String> {
        Box::pin(async move {
            Ok(format!(
                "https://memory.blob.invalid/{container}/{blob}?se={}",
                ttl.as_secs()
            ))
        })
    }
}

/// Long-running compute call observed by [`MemoryComputeService`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ComputeCall {
    /// A disk was created under this resource ID.
    CreateDisk {
        /// Resource ID.
        id: String,
        /// Timeout passed by the caller.
        timeout: Duration,
    },
    /// A snapshot was created under this resource ID.
    CreateSnapshot {
        /// Resource ID.
        id: String,
        /// Timeout passed by the caller.
        timeout: Duration,
    },
    /// A snapshot was deleted.
    DeleteSnapshot {
        /// Resource ID.
        id: String,
        /// Timeout passed by the caller.
        timeout: Duration,
    },
}

#[derive(Debug, Default)]
struct ComputeState {
    disks: BTreeMap<String, Disk>,
    snapshots: BTreeMap<String, Snapshot>,
    calls: Vec<ComputeCall>,
    failure: Option<ArmError>,
    lookup_failure: Option<ArmError>,
}

/// In-memory [`ComputeService`] keyed by resource ID.
#[derive(Debug, Default)]
pub struct MemoryComputeService {
    state: StdMutex<ComputeState>,
}

fn resource_not_found(id: &str) -> ArmError {
    ArmError::Status {
        url: id.to_owned(),
        status: 404,
        code: "ResourceNotFound".to_owned(),
        message: format!("resource {id} was not found"),
    }
}

impl MemoryComputeService {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a disk; the ID and name are filled in from the coordinates.
    pub fn insert_disk(&self, subscription: &str, resource_group: &str, name: &str, disk: Disk) {
        let id = disk_id(subscription, resource_group, name);
        lock(&self.state).disks.insert(
            id.clone(),
            Disk {
                id: Some(id),
                name: Some(name.to_owned()),
                ..disk
            },
        );
    }

    /// Adds a snapshot; the ID and name are filled in from the coordinates.
    pub fn insert_snapshot(
        &self,
        subscription: &str,
        resource_group: &str,
        name: &str,
        snapshot: Snapshot,
    ) {
        let id = snapshot_id(subscription, resource_group, name);
        lock(&self.state).snapshots.insert(
            id.clone(),
            Snapshot {
                id: Some(id),
                name: Some(name.to_owned()),
                ..snapshot
            },
        );
    }

    /// Makes the next long-running call fail with `error`.
    pub fn fail_next(&self, error: ArmError) {
        lock(&self.state).failure = Some(error);
    }

    /// Makes the next snapshot lookup fail with `error`.
    pub fn fail_next_lookup(&self, error: ArmError) {
        lock(&self.state).lookup_failure = Some(error);
    }

    /// Disk stored under `id`.
    #[must_use]
    pub fn disk(&self, id: &str) -> Option<Disk> {
        lock(&self.state).disks.get(id).cloned()
    }

    /// Snapshot stored under `id`.
    #[must_use]
    pub fn snapshot(&self, id: &str) -> Option<Snapshot> {
        lock(&self.state).snapshots.get(id).cloned()
    }

    /// IDs of every stored snapshot.
    #[must_use]
    pub fn snapshot_ids(&self) -> Vec<String> {
        lock(&self.state).snapshots.keys().cloned().collect()
    }

    /// Long-running calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ComputeCall> {
        lock(&self.state).calls.clone()
    }

    fn record(&self, call: ComputeCall) -> Result<StdMutexGuard<'_, ComputeState>, ArmError> {
        let mut state = lock(&self.state);
        state.calls.push(call);
        if let Some(error) = state.failure.take() {
            return Err(error);
        }
        Ok(state)
    }
}

impl ComputeService for MemoryComputeService {
    fn get_disk<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Disk> {
        Box::pin(async move {
            let id = disk_id(subscription, resource_group, name);
            self.disk(&id).ok_or_else(|| resource_not_found(&id))
        })
    }

    fn create_disk<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        disk: &'a Disk,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()> {
        Box::pin(async move {
            let id = disk_id(subscription, resource_group, name);
            let mut state = self.record(ComputeCall::CreateDisk {
                id: id.clone(),
                timeout,
            })?;
            state.disks.insert(
                id.clone(),
                Disk {
                    id: Some(id),
                    name: Some(name.to_owned()),
                    ..disk.clone()
                },
            );
            Ok(())
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Snapshot> {
        Box::pin(async move {
            let id = snapshot_id(subscription, resource_group, name);
            if let Some(error) = lock(&self.state).lookup_failure.take() {
                return Err(error);
            }
            self.snapshot(&id).ok_or_else(|| resource_not_found(&id))
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        snapshot: &'a Snapshot,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()> {
        Box::pin(async move {
            let id = snapshot_id(subscription, resource_group, name);
            let mut state = self.record(ComputeCall::CreateSnapshot {
                id: id.clone(),
                timeout,
            })?;
            state.snapshots.insert(
                id.clone(),
                Snapshot {
                    id: Some(id),
                    name: Some(name.to_owned()),
                    ..snapshot.clone()
                },
            );
            Ok(())
        })
    }

    fn delete_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()> {
        Box::pin(async move {
            let id = snapshot_id(subscription, resource_group, name);
            let mut state = self.record(ComputeCall::DeleteSnapshot {
                id: id.clone(),
                timeout,
            })?;
            state.snapshots.remove(&id);
            Ok(())
        })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    ///
    /// Every key in `set` and `remove` is restored when the guard drops.
    pub async fn apply(set: &[(&str, &str)], remove: &[&str]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                set.iter()
                    .map(|(key, _)| *key)
                    .chain(remove.iter().copied())
                    .all(|key| seen.insert(key))
            },
            "duplicate environment variable keys passed to EnvGuard::apply"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(set.len() + remove.len());
        for (key, value) in set {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
        }
        for key in remove {
            previous.push(((*key).to_owned(), env::var_os(key)));
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
