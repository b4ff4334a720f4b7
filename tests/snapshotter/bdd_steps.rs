//! BDD step definitions for the volume snapshotter.

use std::collections::BTreeMap;

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;
use velero_plugin_azure::VolumeSnapshotter;
use velero_plugin_azure::arm::ArmError;
use velero_plugin_azure::arm::compute::{Disk, Sku, disk_id, snapshot_id};
use velero_plugin_azure::snapshotter::parse_snapshot_id;

use super::test_helpers::SnapshotContext;
use crate::test_constants::{DISK_RESOURCE_GROUP, DISK_SUBSCRIPTION, SNAPSHOT_RESOURCE_GROUP};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("failed to start runtime: {0}")]
    Runtime(String),
}

fn disk(volume_type: &str) -> Disk {
    Disk {
        location: "westeurope".to_owned(),
        sku: Some(Sku {
            name: Some(volume_type.to_owned()),
        }),
        ..Disk::default()
    }
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))
}

fn succeeded(snapshot_context: &SnapshotContext) -> Result<&str, StepError> {
    match &snapshot_context.outcome {
        Some(Ok(value)) => Ok(value.as_str()),
        Some(Err(err)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {err}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[given("a managed disk \"{name}\" of type \"{volume_type}\"")]
fn managed_disk(
    snapshot_context: SnapshotContext,
    name: String,
    volume_type: String,
) -> SnapshotContext {
    snapshot_context.compute.insert_disk(
        DISK_SUBSCRIPTION,
        DISK_RESOURCE_GROUP,
        &name,
        disk(&volume_type),
    );
    snapshot_context
}

#[given("a snapshot \"{name}\"")]
fn existing_snapshot(snapshot_context: SnapshotContext, name: String) -> SnapshotContext {
    snapshot_context.compute.insert_snapshot(
        DISK_SUBSCRIPTION,
        SNAPSHOT_RESOURCE_GROUP,
        &name,
        disk("Premium_LRS"),
    );
    snapshot_context
}

#[given("the next operation times out")]
fn next_operation_times_out(snapshot_context: SnapshotContext) -> SnapshotContext {
    snapshot_context.compute.fail_next(ArmError::Timeout {
        url: String::from("snapshot"),
        seconds: 120,
    });
    snapshot_context
}

#[when("I snapshot volume \"{volume_id}\" for backup \"{backup}\"")]
fn snapshot_volume(
    mut snapshot_context: SnapshotContext,
    volume_id: String,
    backup: String,
) -> Result<SnapshotContext, StepError> {
    let tags: BTreeMap<String, String> = [(String::from("velero.io/backup"), backup)]
        .into_iter()
        .collect();
    let snapshotter = snapshot_context.snapshotter.clone();
    let outcome = runtime()?.block_on(async move {
        snapshotter
            .create_snapshot(&volume_id, "westeurope-1", &tags)
            .await
    });
    snapshot_context.outcome = Some(outcome);
    Ok(snapshot_context)
}

#[when("I restore snapshot \"{name}\" as \"{volume_type}\" in zone \"{volume_az}\"")]
fn restore_snapshot(
    mut snapshot_context: SnapshotContext,
    name: String,
    volume_type: String,
    volume_az: String,
) -> Result<SnapshotContext, StepError> {
    let source = snapshot_id(DISK_SUBSCRIPTION, SNAPSHOT_RESOURCE_GROUP, &name);
    let snapshotter = snapshot_context.snapshotter.clone();
    let outcome = runtime()?.block_on(async move {
        snapshotter
            .create_volume_from_snapshot(&source, &volume_type, &volume_az, None)
            .await
    });
    snapshot_context.outcome = Some(outcome);
    Ok(snapshot_context)
}

#[when("I delete snapshot \"{name}\"")]
fn delete_snapshot(
    mut snapshot_context: SnapshotContext,
    name: String,
) -> Result<SnapshotContext, StepError> {
    let target = snapshot_id(DISK_SUBSCRIPTION, SNAPSHOT_RESOURCE_GROUP, &name);
    let snapshotter = snapshot_context.snapshotter.clone();
    let outcome = runtime()?.block_on(async move {
        snapshotter
            .delete_snapshot(&target)
            .await
            .map(|()| target.clone())
    });
    snapshot_context.outcome = Some(outcome);
    Ok(snapshot_context)
}

#[then("the operation succeeds")]
fn operation_succeeds(snapshot_context: &SnapshotContext) -> Result<(), StepError> {
    succeeded(snapshot_context).map(|_| ())
}

#[then("the operation fails with \"{snippet}\"")]
fn operation_fails(snapshot_context: &SnapshotContext, snippet: String) -> Result<(), StepError> {
    let Some(Err(err)) = &snapshot_context.outcome else {
        return Err(StepError::Assertion(String::from("expected failure outcome")));
    };
    let message = err.to_string();
    if message.contains(&snippet) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected error containing {snippet:?}, got {message:?}"
        )))
    }
}

#[then("the snapshot is stored in the snapshot resource group")]
fn snapshot_in_snapshot_group(snapshot_context: &SnapshotContext) -> Result<(), StepError> {
    let id = succeeded(snapshot_context)?;
    let parsed = parse_snapshot_id(id).map_err(|err| StepError::Assertion(err.to_string()))?;
    if parsed.resource_group != SNAPSHOT_RESOURCE_GROUP {
        return Err(StepError::Assertion(format!(
            "snapshot landed in {}",
            parsed.resource_group
        )));
    }
    if snapshot_context.compute.snapshot(id).is_none() {
        return Err(StepError::Assertion(format!("snapshot {id} was not stored")));
    }
    Ok(())
}

#[then("the snapshot is tagged \"{key}\" with \"{value}\"")]
fn snapshot_tagged(
    snapshot_context: &SnapshotContext,
    key: String,
    value: String,
) -> Result<(), StepError> {
    let id = succeeded(snapshot_context)?;
    let tags = snapshot_context
        .compute
        .snapshot(id)
        .and_then(|snapshot| snapshot.tags)
        .unwrap_or_default();
    if tags.get(&key) == Some(&value) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected tag {key}={value}, got {tags:?}"
        )))
    }
}

fn restored_disk(snapshot_context: &SnapshotContext) -> Result<Disk, StepError> {
    let volume_id = succeeded(snapshot_context)?;
    snapshot_context
        .compute
        .disk(&disk_id(DISK_SUBSCRIPTION, DISK_RESOURCE_GROUP, volume_id))
        .ok_or_else(|| StepError::Assertion(format!("disk {volume_id} was not created")))
}

#[then("the restored disk is in zone \"{zone}\"")]
fn restored_in_zone(snapshot_context: &SnapshotContext, zone: String) -> Result<(), StepError> {
    let restored = restored_disk(snapshot_context)?;
    if restored.zones == Some(vec![zone.clone()]) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected zone {zone}, got {:?}",
            restored.zones
        )))
    }
}

#[then("the restored disk has no zone")]
fn restored_without_zone(snapshot_context: &SnapshotContext) -> Result<(), StepError> {
    let restored = restored_disk(snapshot_context)?;
    if restored.zones.is_none() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no zone, got {:?}",
            restored.zones
        )))
    }
}

#[then("no long-running operation was started")]
fn no_operations(snapshot_context: &SnapshotContext) -> Result<(), StepError> {
    let calls = snapshot_context.compute.calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!("unexpected calls: {calls:?}")))
    }
}
