//! Snapshot names, identifiers, tags, and restore zones.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use super::SnapshotterError;
use crate::arm::compute::snapshot_id;

/// Longest snapshot name the compute API accepts.
pub const MAX_SNAPSHOT_NAME_LEN: usize = 80;

static SNAPSHOT_ID: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^/subscriptions/(.*)/resourceGroups/(.*)/providers/Microsoft.Compute/snapshots/(.*)$",
    )
    .ok()
});

/// Parts of a fully-qualified snapshot ID.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotIdentifier {
    /// Subscription holding the snapshot.
    pub subscription: String,
    /// Resource group holding the snapshot.
    pub resource_group: String,
    /// Snapshot name.
    pub name: String,
}

impl SnapshotIdentifier {
    /// Fully-qualified resource ID.
    #[must_use]
    pub fn resource_id(&self) -> String {
        snapshot_id(&self.subscription, &self.resource_group, &self.name)
    }
}

/// Splits `/subscriptions/<sub>/resourceGroups/<rg>/providers/Microsoft.Compute/snapshots/<name>`.
///
/// # Errors
///
/// Returns [`SnapshotterError::InvalidSnapshotId`] when `id` has another
/// shape.
pub fn parse_snapshot_id(id: &str) -> Result<SnapshotIdentifier, SnapshotterError> {
    let invalid = || SnapshotterError::InvalidSnapshotId { id: id.to_owned() };
    let captures = SNAPSHOT_ID
        .as_ref()
        .and_then(|pattern| pattern.captures(id))
        .ok_or_else(invalid)?;
    let part = |index: usize| {
        captures
            .get(index)
            .map(|found| found.as_str().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(invalid)
    };
    Ok(SnapshotIdentifier {
        subscription: part(1)?,
        resource_group: part(2)?,
        name: part(3)?,
    })
}

/// Builds `<volume_id>-<suffix>`, trimming the volume ID so the name fits
/// in [`MAX_SNAPSHOT_NAME_LEN`] characters.
#[must_use]
pub fn snapshot_name(volume_id: &str, suffix: &str) -> String {
    let budget = MAX_SNAPSHOT_NAME_LEN.saturating_sub(suffix.chars().count() + 1);
    let prefix: String = volume_id.chars().take(budget).collect();
    format!("{prefix}-{suffix}")
}

/// Merges disk tags, host-assigned tags, and location tags, later sources
/// winning. Host tag keys have `/` replaced by `-`. Returns `None` when
/// there is nothing to tag.
#[must_use]
pub fn snapshot_tags(
    disk_tags: Option<&BTreeMap<String, String>>,
    host_tags: &BTreeMap<String, String>,
    location_tags: &BTreeMap<String, String>,
) -> Option<BTreeMap<String, String>> {
    if disk_tags.is_none() && host_tags.is_empty() && location_tags.is_empty() {
        return None;
    }

    let mut merged = disk_tags.cloned().unwrap_or_default();
    merged.extend(
        host_tags
            .iter()
            .map(|(key, value)| (key.replace('/', "-"), value.clone())),
    );
    merged.extend(
        location_tags
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    Some(merged)
}

/// Zone for a restored disk: the last `-` segment of `volume_az`, unless
/// the SKU is zone-redundant or the value has no `-`.
#[must_use]
pub fn restore_zone(volume_type: &str, volume_az: &str) -> Option<String> {
    if matches!(volume_type, "Premium_ZRS" | "StandardSSD_ZRS") {
        return None;
    }
    volume_az
        .rsplit_once('-')
        .map(|(_, zone)| zone.to_owned())
        .filter(|zone| !zone.is_empty())
}
