//! Volume-snapshotter plugin backed by Azure managed disks.
//!
//! Disks are read from the subscription and resource group named by the
//! credentials. Snapshots may be written to a different subscription or
//! resource group named by the location.

mod error;
mod naming;
mod persistent_volume;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::arm::ArmClient;
use crate::arm::compute::{
    ComputeClient, ComputeService, CreationData, Disk, ResourceProperties, Sku, Snapshot, disk_id,
    snapshot_id,
};
use crate::auth::token_credential;
use crate::cloud;
use crate::config::{
    ACTIVE_DIRECTORY_AUTHORITY_URI_KEY, API_TIMEOUT_KEY, CREDENTIALS_FILE_KEY, INCREMENTAL_KEY,
    PluginSettings, RESOURCE_GROUP_KEY, SUBSCRIPTION_ID_KEY, TAGS_KEY, api_timeout, lookup,
    optional_bool, tags,
};
use crate::credentials::{self, CredentialError, Credentials, RESOURCE_GROUP, SUBSCRIPTION_ID};
use crate::http::default_client;
use crate::plugin::{PluginConfig, PluginFuture, VolumeInfo, VolumeSnapshotter, validate_config_keys};

pub use error::SnapshotterError;
pub use naming::{
    MAX_SNAPSHOT_NAME_LEN, SnapshotIdentifier, parse_snapshot_id, restore_zone, snapshot_name,
    snapshot_tags,
};
pub use persistent_volume::CSI_DRIVER;

/// Location keys accepted by [`AzureVolumeSnapshotter::init`].
pub const VALID_KEYS: &[&str] = &[
    RESOURCE_GROUP_KEY,
    API_TIMEOUT_KEY,
    SUBSCRIPTION_ID_KEY,
    INCREMENTAL_KEY,
    TAGS_KEY,
    CREDENTIALS_FILE_KEY,
    ACTIVE_DIRECTORY_AUTHORITY_URI_KEY,
];

const CREATE_OPTION_COPY: &str = "Copy";

/// Where disks are read and snapshots are written, plus per-location
/// options.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SnapshotLocation {
    /// Subscription holding the disks.
    pub disk_subscription: String,
    /// Resource group holding the disks.
    pub disk_resource_group: String,
    /// Subscription receiving snapshots.
    pub snapshot_subscription: String,
    /// Resource group receiving snapshots.
    pub snapshot_resource_group: String,
    /// Bound on each long-running operation.
    pub api_timeout: Duration,
    /// Incremental snapshot flag; `None` leaves the choice to the service.
    pub incremental: Option<bool>,
    /// Tags added to every snapshot.
    pub tags: BTreeMap<String, String>,
}

impl SnapshotLocation {
    /// Reads the location from its configuration and the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotterError::Credentials`] when the disk subscription
    /// or resource group is missing, [`SnapshotterError::MissingResourceGroup`]
    /// when `subscriptionId` is set alone, and [`SnapshotterError::Config`]
    /// for malformed option values.
    pub fn from_config(
        config: &PluginConfig,
        creds: &Credentials,
    ) -> Result<Self, SnapshotterError> {
        let [disk_subscription, disk_resource_group] =
            <[String; 2]>::try_from(creds.require(&[SUBSCRIPTION_ID, RESOURCE_GROUP])?).map_err(
                |_| CredentialError::MissingValues {
                    keys: vec![SUBSCRIPTION_ID.to_owned(), RESOURCE_GROUP.to_owned()],
                },
            )?;

        let configured_subscription = lookup(config, SUBSCRIPTION_ID_KEY);
        let configured_group = lookup(config, RESOURCE_GROUP_KEY);
        if configured_subscription.is_some() && configured_group.is_none() {
            return Err(SnapshotterError::MissingResourceGroup);
        }
        let snapshot_subscription = configured_subscription
            .unwrap_or(&disk_subscription)
            .to_owned();
        let snapshot_resource_group = configured_group
            .unwrap_or(&disk_resource_group)
            .to_owned();

        Ok(Self {
            disk_subscription,
            disk_resource_group,
            snapshot_subscription,
            snapshot_resource_group,
            api_timeout: api_timeout(config)?,
            incremental: optional_bool(config, INCREMENTAL_KEY)?,
            tags: tags(config)?,
        })
    }
}

#[derive(Clone, Debug)]
struct Ready {
    compute: Arc<dyn ComputeService>,
    location: SnapshotLocation,
}

/// Azure managed-disk implementation of [`VolumeSnapshotter`].
#[derive(Clone, Debug, Default)]
pub struct AzureVolumeSnapshotter {
    ready: Option<Ready>,
}

impl AzureVolumeSnapshotter {
    /// Creates an uninitialised snapshotter; call [`VolumeSnapshotter::init`]
    /// before use.
    #[must_use]
    pub const fn new() -> Self {
        Self { ready: None }
    }

    /// Creates a snapshotter that is ready to use with `compute`.
    #[must_use]
    pub fn with_compute(compute: Arc<dyn ComputeService>, location: SnapshotLocation) -> Self {
        Self {
            ready: Some(Ready { compute, location }),
        }
    }

    /// Location resolved by `init`.
    #[must_use]
    pub fn location(&self) -> Option<&SnapshotLocation> {
        self.ready.as_ref().map(|ready| &ready.location)
    }

    fn ready(&self) -> Result<&Ready, SnapshotterError> {
        self.ready.as_ref().ok_or(SnapshotterError::NotInitialised)
    }
}

impl VolumeSnapshotter for AzureVolumeSnapshotter {
    type Error = SnapshotterError;

    fn init<'a>(&'a mut self, config: &'a PluginConfig) -> PluginFuture<'a, (), Self::Error> {
        Box::pin(async move {
            validate_config_keys(config, VALID_KEYS)?;
            let settings = PluginSettings::load_without_cli_args()?;
            let creds = credentials::for_location(config, &settings)?;
            let location = SnapshotLocation::from_config(config, &creds)?;

            let http = default_client();
            let cloud = cloud::resolve(config, &creds, &http).await?;
            let credential = token_credential(&creds, &cloud, &http)?;
            let arm = ArmClient::new(
                &cloud.resource_manager_endpoint,
                cloud.resource_manager_scope(),
                credential,
                http,
            );
            debug!(
                cloud = %cloud.name,
                disk_resource_group = %location.disk_resource_group,
                snapshot_subscription = %location.snapshot_subscription,
                snapshot_resource_group = %location.snapshot_resource_group,
                "volume snapshotter initialised"
            );
            self.ready = Some(Ready {
                compute: Arc::new(ComputeClient::new(arm)),
                location,
            });
            Ok(())
        })
    }

    fn create_volume_from_snapshot<'a>(
        &'a self,
        snapshot_id: &'a str,
        volume_type: &'a str,
        volume_az: &'a str,
        _iops: Option<i64>,
    ) -> PluginFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let Ready { compute, location } = self.ready()?;
            let source = parse_snapshot_id(snapshot_id)?;
            let snapshot = compute
                .get_snapshot(&source.subscription, &source.resource_group, &source.name)
                .await?;

            let name = format!("restore-{}", Uuid::new_v4());
            let disk = Disk {
                location: snapshot.location,
                tags: snapshot.tags,
                sku: Some(Sku {
                    name: Some(volume_type.to_owned()),
                }),
                zones: restore_zone(volume_type, volume_az).map(|zone| vec![zone]),
                properties: ResourceProperties {
                    creation_data: Some(CreationData {
                        create_option: CREATE_OPTION_COPY.to_owned(),
                        source_resource_id: Some(source.resource_id()),
                    }),
                    ..ResourceProperties::default()
                },
                ..Disk::default()
            };

            info!(volume_id = %name, snapshot_id, volume_type, "restoring disk from snapshot");
            compute
                .create_disk(
                    &location.disk_subscription,
                    &location.disk_resource_group,
                    &name,
                    &disk,
                    location.api_timeout,
                )
                .await?;
            Ok(name)
        })
    }

    fn get_volume_info<'a>(
        &'a self,
        volume_id: &'a str,
        _volume_az: &'a str,
    ) -> PluginFuture<'a, VolumeInfo, Self::Error> {
        Box::pin(async move {
            let Ready { compute, location } = self.ready()?;
            let disk = compute
                .get_disk(
                    &location.disk_subscription,
                    &location.disk_resource_group,
                    volume_id,
                )
                .await?;
            let volume_type = disk
                .sku
                .and_then(|sku| sku.name)
                .ok_or_else(|| SnapshotterError::MissingSku {
                    volume_id: volume_id.to_owned(),
                })?;
            Ok(VolumeInfo {
                volume_type,
                iops: None,
            })
        })
    }

    fn create_snapshot<'a>(
        &'a self,
        volume_id: &'a str,
        _volume_az: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> PluginFuture<'a, String, Self::Error> {
        Box::pin(async move {
            let Ready { compute, location } = self.ready()?;
            let disk = compute
                .get_disk(
                    &location.disk_subscription,
                    &location.disk_resource_group,
                    volume_id,
                )
                .await?;

            let name = snapshot_name(volume_id, &Uuid::new_v4().to_string());
            let source = disk.id.clone().unwrap_or_else(|| {
                disk_id(
                    &location.disk_subscription,
                    &location.disk_resource_group,
                    volume_id,
                )
            });
            let snapshot = Snapshot {
                location: disk.location.clone(),
                tags: snapshot_tags(disk.tags.as_ref(), tags, &location.tags),
                properties: ResourceProperties {
                    creation_data: Some(CreationData {
                        create_option: CREATE_OPTION_COPY.to_owned(),
                        source_resource_id: Some(source),
                    }),
                    incremental: location.incremental,
                    ..ResourceProperties::default()
                },
                ..Snapshot::default()
            };

            info!(volume_id, snapshot = %name, "creating snapshot");
            compute
                .create_snapshot(
                    &location.snapshot_subscription,
                    &location.snapshot_resource_group,
                    &name,
                    &snapshot,
                    location.api_timeout,
                )
                .await?;
            Ok(snapshot_id(
                &location.snapshot_subscription,
                &location.snapshot_resource_group,
                &name,
            ))
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> PluginFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let Ready { compute, location } = self.ready()?;
            let target = parse_snapshot_id(snapshot_id)?;

            // Only a definite 404 skips the delete; other lookup failures
            // leave the outcome to the delete itself.
            match compute
                .get_snapshot(&target.subscription, &target.resource_group, &target.name)
                .await
            {
                Err(err) if err.is_not_found() => {
                    debug!(snapshot_id, "snapshot not found; nothing to delete");
                    return Ok(());
                }
                Err(err) => debug!(snapshot_id, error = %err, "snapshot lookup failed"),
                Ok(_) => {}
            }

            info!(snapshot_id, "deleting snapshot");
            compute
                .delete_snapshot(
                    &target.subscription,
                    &target.resource_group,
                    &target.name,
                    location.api_timeout,
                )
                .await?;
            Ok(())
        })
    }

    fn get_volume_id(&self, pv: &Value) -> Result<String, Self::Error> {
        persistent_volume::volume_id(pv)
    }

    fn set_volume_id(&self, pv: &Value, volume_id: &str) -> Result<Value, Self::Error> {
        let Ready { location, .. } = self.ready()?;
        persistent_volume::with_volume_id(
            pv,
            volume_id,
            &location.disk_subscription,
            &location.disk_resource_group,
        )
    }
}
