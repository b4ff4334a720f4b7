//! Managed disks and snapshots in `Microsoft.Compute`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ArmClient, ArmError};

/// Compute API version used for disks and snapshots.
pub const COMPUTE_API_VERSION: &str = "2023-04-02";

/// Boxed future returned by [`ComputeService`] calls.
pub type ComputeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ArmError>> + Send + 'a>>;

/// Resource ID of a managed disk.
#[must_use]
pub fn disk_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Compute/disks/{name}"
    )
}

/// Resource ID of a snapshot.
#[must_use]
pub fn snapshot_id(subscription: &str, resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Compute/snapshots/{name}"
    )
}

/// Storage SKU of a disk or snapshot.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Sku {
    /// SKU name, for example `Premium_LRS`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// How a disk or snapshot is populated.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationData {
    /// `Copy` for snapshots and restores.
    pub create_option: String,
    /// Source disk or snapshot resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_resource_id: Option<String>,
}

/// Properties shared by the disk and snapshot payloads this crate uses.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProperties {
    /// Creation source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_data: Option<CreationData>,
    /// Incremental snapshot flag; left unset to let the service decide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,
    /// Provisioned size in GiB.
    #[serde(rename = "diskSizeGB", default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<i64>,
    /// Provisioned IOPS for Ultra and Premium v2 disks.
    #[serde(
        rename = "diskIOPSReadWrite",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_iops_read_write: Option<i64>,
    /// Provisioning state reported by the service.
    #[serde(default, skip_serializing)]
    pub provisioning_state: Option<String>,
}

/// A managed disk or snapshot resource.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ComputeResource {
    /// Resource ID, set by the service.
    #[serde(default, skip_serializing)]
    pub id: Option<String>,
    /// Resource name, set by the service.
    #[serde(default, skip_serializing)]
    pub name: Option<String>,
    /// Azure region.
    #[serde(default)]
    pub location: String,
    /// Resource tags; `None` sends no tags at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,
    /// Storage SKU.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    /// Availability zones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<Vec<String>>,
    /// Resource properties.
    #[serde(default)]
    pub properties: ResourceProperties,
}

/// Managed disk.
pub type Disk = ComputeResource;
/// Disk snapshot.
pub type Snapshot = ComputeResource;

/// Compute operations used by the volume snapshotter.
pub trait ComputeService: Send + Sync + fmt::Debug {
    /// Fetches a managed disk.
    fn get_disk<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Disk>;

    /// Creates a managed disk and waits for provisioning.
    fn create_disk<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        disk: &'a Disk,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()>;

    /// Fetches a snapshot.
    fn get_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Snapshot>;

    /// Creates a snapshot and waits for provisioning.
    fn create_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        snapshot: &'a Snapshot,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()>;

    /// Deletes a snapshot and waits for the deletion.
    fn delete_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
        timeout: Duration,
    ) -> ComputeFuture<'a, ()>;
}

/// [`ComputeService`] backed by Resource Manager.
#[derive(Clone, Debug)]
pub struct ComputeClient {
    arm: ArmClient,
}

impl ComputeClient {
    /// Wraps an authenticated Resource Manager client.
    #[must_use]
    pub const fn new(arm: ArmClient) -> Self {
        Self { arm }
    }
}

impl ComputeService for ComputeClient {
    fn get_disk<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Disk> {
        Box::pin(async move {
            self.arm
                .get(&disk_id(subscription, resource_group, name), COMPUTE_API_VERSION)
                .await
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
            self.arm
                .put_and_wait(
                    &disk_id(subscription, resource_group, name),
                    COMPUTE_API_VERSION,
                    disk,
                    timeout,
                )
                .await
        })
    }

    fn get_snapshot<'a>(
        &'a self,
        subscription: &'a str,
        resource_group: &'a str,
        name: &'a str,
    ) -> ComputeFuture<'a, Snapshot> {
        Box::pin(async move {
            self.arm
                .get(
                    &snapshot_id(subscription, resource_group, name),
                    COMPUTE_API_VERSION,
                )
                .await
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
            self.arm
                .put_and_wait(
                    &snapshot_id(subscription, resource_group, name),
                    COMPUTE_API_VERSION,
                    snapshot,
                    timeout,
                )
                .await
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
            self.arm
                .delete_and_wait(
                    &snapshot_id(subscription, resource_group, name),
                    COMPUTE_API_VERSION,
                    timeout,
                )
                .await
        })
    }
}
