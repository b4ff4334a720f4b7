//! Error type for the volume-snapshotter plugin.

use thiserror::Error;

use crate::arm::ArmError;
use crate::auth::AuthError;
use crate::cloud::CloudError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::plugin::InvalidConfigKeys;

/// Errors raised by [`super::AzureVolumeSnapshotter`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SnapshotterError {
    /// An operation ran before a successful `init`.
    #[error("volume snapshotter is not initialised")]
    NotInitialised,
    /// The location carries unsupported keys.
    #[error(transparent)]
    InvalidConfig(#[from] InvalidConfigKeys),
    /// A location value is missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Credentials could not be loaded.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    /// The cloud could not be resolved.
    #[error(transparent)]
    Cloud(#[from] CloudError),
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A Resource Manager call failed.
    #[error(transparent)]
    Arm(#[from] ArmError),
    /// `subscriptionId` was set without `resourceGroup`.
    #[error(
        "resourceGroup not specified, but is a requirement when backing up to a different subscription"
    )]
    MissingResourceGroup,
    /// A snapshot ID does not name a compute snapshot.
    #[error("snapshot URI could not be parsed")]
    InvalidSnapshotId {
        /// Identifier as supplied.
        id: String,
    },
    /// The disk carries no SKU.
    #[error("disk has a nil SKU")]
    MissingSku {
        /// Disk name.
        volume_id: String,
    },
    /// The persistent volume is not a JSON object.
    #[error("invalid persistent volume: {0}")]
    InvalidPersistentVolume(String),
    /// The persistent volume uses a CSI driver other than Azure Disk.
    #[error("unable to handle CSI driver: {driver}")]
    UnsupportedCsiDriver {
        /// Driver named by the volume.
        driver: String,
    },
    /// An `azureDisk` volume has no disk name.
    #[error("spec.azureDisk.diskName not found")]
    MissingDiskName,
    /// The persistent volume has neither a CSI nor an `azureDisk` source.
    #[error("spec.csi and spec.azureDisk not found")]
    MissingVolumeSource,
}
