//! BDD scenarios for the volume snapshotter.

use rstest_bdd_macros::scenario;

use super::test_helpers::{SnapshotContext, snapshot_context};

#[scenario(
    path = "tests/features/snapshotter.feature",
    name = "Snapshot a disk into the snapshot resource group"
)]
fn scenario_snapshot_disk(snapshot_context: SnapshotContext) {
    drop(snapshot_context);
}

#[scenario(
    path = "tests/features/snapshotter.feature",
    name = "Restore a disk into the requested zone"
)]
fn scenario_restore_zonal(snapshot_context: SnapshotContext) {
    drop(snapshot_context);
}

#[scenario(
    path = "tests/features/snapshotter.feature",
    name = "Restore a zone-redundant disk without a zone"
)]
fn scenario_restore_zone_redundant(snapshot_context: SnapshotContext) {
    drop(snapshot_context);
}

#[scenario(
    path = "tests/features/snapshotter.feature",
    name = "Deleting a missing snapshot succeeds"
)]
fn scenario_delete_missing(snapshot_context: SnapshotContext) {
    drop(snapshot_context);
}

#[scenario(
    path = "tests/features/snapshotter.feature",
    name = "Surface snapshot timeouts"
)]
fn scenario_snapshot_timeout(snapshot_context: SnapshotContext) {
    drop(snapshot_context);
}
