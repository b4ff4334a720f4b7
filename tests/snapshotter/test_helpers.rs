//! Shared fixtures for snapshotter BDD scenarios.

use std::sync::Arc;
use std::time::Duration;

use rstest::fixture;
use velero_plugin_azure::arm::compute::ComputeService;
use velero_plugin_azure::test_support::MemoryComputeService;
use velero_plugin_azure::{AzureVolumeSnapshotter, SnapshotLocation, SnapshotterError};

use crate::test_constants::{DISK_RESOURCE_GROUP, DISK_SUBSCRIPTION, SNAPSHOT_RESOURCE_GROUP};

#[derive(Clone, Debug)]
pub struct SnapshotContext {
    pub compute: Arc<MemoryComputeService>,
    pub snapshotter: AzureVolumeSnapshotter,
    pub outcome: Option<Result<String, SnapshotterError>>,
}

pub fn location() -> SnapshotLocation {
    SnapshotLocation {
        disk_subscription: DISK_SUBSCRIPTION.to_owned(),
        disk_resource_group: DISK_RESOURCE_GROUP.to_owned(),
        snapshot_subscription: DISK_SUBSCRIPTION.to_owned(),
        snapshot_resource_group: SNAPSHOT_RESOURCE_GROUP.to_owned(),
        api_timeout: Duration::from_secs(120),
        incremental: None,
        tags: std::collections::BTreeMap::new(),
    }
}

#[fixture]
pub fn snapshot_context() -> SnapshotContext {
    let compute = Arc::new(MemoryComputeService::new());
    let service: Arc<dyn ComputeService> = compute.clone();
    SnapshotContext {
        compute,
        snapshotter: AzureVolumeSnapshotter::with_compute(service, location()),
        outcome: None,
    }
}
