//! Error type for the object-store plugin.

use thiserror::Error;

use crate::arm::ArmError;
use crate::auth::AuthError;
use crate::blob::BlobError;
use crate::cloud::CloudError;
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::http::HttpError;
use crate::plugin::InvalidConfigKeys;

/// Errors raised by [`super::AzureObjectStore`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ObjectStoreError {
    /// An operation ran before a successful `init`.
    #[error("object store is not initialised")]
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
    /// The HTTP client could not be built.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Authentication failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A Resource Manager call failed.
    #[error(transparent)]
    Arm(#[from] ArmError),
    /// A blob service call failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// `listKeys` returned no keys.
    #[error("no storage keys found")]
    NoStorageKeys,
    /// `listKeys` returned no key with full permissions.
    #[error("no storage key with full permissions found")]
    NoFullAccessKey,
    /// The upload body failed mid-stream.
    #[error("unable to read data for {key}: {message}")]
    Read {
        /// Object key being uploaded.
        key: String,
        /// I/O error.
        message: String,
    },
    /// The upload needs more blocks than a blob can hold.
    #[error("{key} needs more than {limit} blocks; increase blockSizeInBytes")]
    TooManyBlocks {
        /// Object key being uploaded.
        key: String,
        /// Maximum number of committed blocks.
        limit: usize,
    },
}
