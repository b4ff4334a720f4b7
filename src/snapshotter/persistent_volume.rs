//! Reads and rewrites the disk reference held by a persistent volume.

use serde_json::Value;
use tracing::info;

use super::SnapshotterError;
use crate::arm::compute::disk_id;

/// CSI driver name of the Azure Disk driver.
pub const CSI_DRIVER: &str = "disk.csi.azure.com";

const DISK_MARKER: &str = "/Microsoft.Compute/disks/";

fn ensure_object(pv: &Value) -> Result<(), SnapshotterError> {
    if pv.is_object() {
        return Ok(());
    }
    Err(SnapshotterError::InvalidPersistentVolume(
        "expected a JSON object".to_owned(),
    ))
}

fn driver(csi: &Value) -> &str {
    csi.get("driver").and_then(Value::as_str).unwrap_or_default()
}

/// Disk name referenced by `pv`.
///
/// CSI volumes yield the last segment of `volumeHandle`; in-tree volumes
/// yield `azureDisk.diskName`. Volumes of other drivers yield an empty
/// string.
///
/// # Errors
///
/// Returns [`SnapshotterError::InvalidPersistentVolume`] when `pv` is not
/// an object and [`SnapshotterError::MissingDiskName`] when an in-tree
/// volume has no disk name.
pub fn volume_id(pv: &Value) -> Result<String, SnapshotterError> {
    ensure_object(pv)?;

    if let Some(csi) = pv.pointer("/spec/csi").filter(|csi| !csi.is_null()) {
        let name = driver(csi);
        if name == CSI_DRIVER {
            let handle = csi
                .get("volumeHandle")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Ok(disk_name_from_handle(handle).to_owned());
        }
        info!(driver = name, "unable to handle CSI driver");
    }

    let Some(disk) = pv.pointer("/spec/azureDisk").filter(|disk| !disk.is_null()) else {
        return Ok(String::new());
    };
    disk.get("diskName")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .ok_or(SnapshotterError::MissingDiskName)
}

/// Text after the managed-disk marker of a CSI volume handle. The marker is
/// matched case-sensitively; handles without it yield an empty name.
fn disk_name_from_handle(handle: &str) -> &str {
    handle
        .find(DISK_MARKER)
        .and_then(|start| handle.get(start + DISK_MARKER.len()..))
        .unwrap_or_default()
}

/// Returns a copy of `pv` pointing at `volume_id` in the given subscription
/// and resource group.
///
/// # Errors
///
/// Returns [`SnapshotterError::UnsupportedCsiDriver`] for foreign CSI
/// volumes and [`SnapshotterError::MissingVolumeSource`] when neither
/// source is present.
pub fn with_volume_id(
    pv: &Value,
    volume_id: &str,
    subscription: &str,
    resource_group: &str,
) -> Result<Value, SnapshotterError> {
    ensure_object(pv)?;
    let mut updated = pv.clone();
    let uri = disk_id(subscription, resource_group, volume_id);

    if let Some(csi) = updated
        .pointer_mut("/spec/csi")
        .and_then(Value::as_object_mut)
    {
        let name = csi
            .get("driver")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name != CSI_DRIVER {
            return Err(SnapshotterError::UnsupportedCsiDriver {
                driver: name.to_owned(),
            });
        }
        csi.insert("volumeHandle".to_owned(), Value::String(uri));
        return Ok(updated);
    }

    if let Some(disk) = updated
        .pointer_mut("/spec/azureDisk")
        .and_then(Value::as_object_mut)
    {
        disk.insert("diskName".to_owned(), Value::String(volume_id.to_owned()));
        disk.insert("diskURI".to_owned(), Value::String(uri));
        return Ok(updated);
    }

    Err(SnapshotterError::MissingVolumeSource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    const DISK_URI: &str =
        "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Compute/disks/restore-1";

    #[rstest]
    #[case(
        "/subscriptions/s/resourceGroups/r/providers/Microsoft.Compute/disks/pvc-1",
        "pvc-1"
    )]
    #[case("pvc-1", "")]
    #[case(
        "/subscriptions/s/resourceGroups/r/providers/microsoft.compute/disks/pvc-1",
        ""
    )]
    #[case("/Microsoft.Compute/disks/", "")]
    fn csi_disk_volumes_yield_the_text_after_the_disk_marker(
        #[case] handle: &str,
        #[case] expected: &str,
    ) {
        let pv = json!({"spec": {"csi": {"driver": CSI_DRIVER, "volumeHandle": handle}}});
        assert_eq!(volume_id(&pv), Ok(expected.to_owned()));
    }

    #[rstest]
    fn foreign_csi_volumes_fall_through_to_in_tree() {
        let pv = json!({"spec": {"csi": {"driver": "file.csi.azure.com", "volumeHandle": "share"}}});
        assert_eq!(volume_id(&pv), Ok(String::new()));
    }

    #[rstest]
    fn in_tree_volumes_yield_the_disk_name() {
        let pv = json!({"spec": {"azureDisk": {"diskName": "pv-1", "diskURI": "ignored"}}});
        assert_eq!(volume_id(&pv), Ok("pv-1".to_owned()));
    }

    #[rstest]
    fn in_tree_volume_without_name_is_an_error() {
        let pv = json!({"spec": {"azureDisk": {"diskURI": "ignored"}}});
        let err = volume_id(&pv).expect_err("missing name should fail");
        assert_eq!(err.to_string(), "spec.azureDisk.diskName not found");
    }

    #[rstest]
    #[case(json!({"spec": {}}))]
    #[case(json!({"spec": {"hostPath": {"path": "/tmp"}}}))]
    fn other_volumes_yield_nothing(#[case] pv: Value) {
        assert_eq!(volume_id(&pv), Ok(String::new()));
    }

    #[rstest]
    fn non_object_documents_are_rejected() {
        let err = volume_id(&json!("pv")).expect_err("strings are not volumes");
        assert!(matches!(err, SnapshotterError::InvalidPersistentVolume(_)));
    }

    #[rstest]
    fn csi_handles_are_rewritten() {
        let pv = json!({"metadata": {"name": "pv"}, "spec": {"csi": {
            "driver": CSI_DRIVER, "volumeHandle": "old", "fsType": "ext4"
        }}});
        let updated = with_volume_id(&pv, "restore-1", "sub", "rg")
            .unwrap_or_else(|err| panic!("csi volume should update: {err}"));
        assert_eq!(
            updated,
            json!({"metadata": {"name": "pv"}, "spec": {"csi": {
                "driver": CSI_DRIVER, "volumeHandle": DISK_URI, "fsType": "ext4"
            }}})
        );
        assert_eq!(pv.pointer("/spec/csi/volumeHandle"), Some(&json!("old")));
    }

    #[rstest]
    fn in_tree_disks_are_rewritten() {
        let pv = json!({"spec": {"azureDisk": {"diskName": "old", "diskURI": "old-uri", "kind": "Managed"}}});
        let updated = with_volume_id(&pv, "restore-1", "sub", "rg")
            .unwrap_or_else(|err| panic!("in-tree volume should update: {err}"));
        assert_eq!(
            updated,
            json!({"spec": {"azureDisk": {"diskName": "restore-1", "diskURI": DISK_URI, "kind": "Managed"}}})
        );
    }

    #[rstest]
    fn foreign_csi_drivers_are_rejected() {
        let pv = json!({"spec": {"csi": {"driver": "file.csi.azure.com"}}});
        let err = with_volume_id(&pv, "restore-1", "sub", "rg").expect_err("foreign driver");
        assert_eq!(err.to_string(), "unable to handle CSI driver: file.csi.azure.com");
    }

    #[rstest]
    fn volumes_without_a_source_are_rejected() {
        let err = with_volume_id(&json!({"spec": {}}), "restore-1", "sub", "rg")
            .expect_err("no source");
        assert_eq!(err, SnapshotterError::MissingVolumeSource);
    }
}
