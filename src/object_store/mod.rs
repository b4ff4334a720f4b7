//! Object-store plugin backed by Azure Blob Storage.
//!
//! Buckets map to containers and keys to blob names. Uploads are streamed
//! in fixed-size blocks and committed once the body is exhausted.

mod connect;
mod error;
mod upload;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::blob::BlobService;
use crate::config::{
    ACTIVE_DIRECTORY_AUTHORITY_URI_KEY, API_VERSION_KEY, BLOCK_SIZE_KEY, BUCKET_KEY,
    CA_CERT_ENCODED_KEY, CA_CERT_KEY, CREDENTIALS_FILE_KEY, DEFAULT_BLOCK_SIZE, PREFIX_KEY,
    PluginSettings, RESOURCE_GROUP_KEY, STORAGE_ACCOUNT_KEY, STORAGE_ACCOUNT_KEY_ENV_VAR_KEY,
    STORAGE_ACCOUNT_URI_KEY, SUBSCRIPTION_ID_KEY, USE_AAD_KEY, block_size,
};
use crate::plugin::{
    ObjectBody, ObjectReader, ObjectStore, PluginConfig, PluginFuture, validate_config_keys,
};

pub use error::ObjectStoreError;
pub use upload::{MAX_BLOCKS, block_id};

/// Location keys accepted by [`AzureObjectStore::init`].
pub const VALID_KEYS: &[&str] = &[
    RESOURCE_GROUP_KEY,
    STORAGE_ACCOUNT_KEY,
    SUBSCRIPTION_ID_KEY,
    BLOCK_SIZE_KEY,
    STORAGE_ACCOUNT_KEY_ENV_VAR_KEY,
    STORAGE_ACCOUNT_URI_KEY,
    USE_AAD_KEY,
    ACTIVE_DIRECTORY_AUTHORITY_URI_KEY,
    CREDENTIALS_FILE_KEY,
    CA_CERT_ENCODED_KEY,
    API_VERSION_KEY,
    BUCKET_KEY,
    PREFIX_KEY,
    CA_CERT_KEY,
];

/// Azure Blob Storage implementation of [`ObjectStore`].
#[derive(Clone, Debug)]
pub struct AzureObjectStore {
    service: Option<Arc<dyn BlobService>>,
    block_size: u64,
}

impl Default for AzureObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureObjectStore {
    /// Creates an uninitialised store; call [`ObjectStore::init`] before use.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            service: None,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Creates a store that is ready to use with `service`.
    #[must_use]
    pub fn with_service(service: Arc<dyn BlobService>, block_size: u64) -> Self {
        Self {
            service: Some(service),
            block_size,
        }
    }

    /// Block size used for uploads.
    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Service the store talks to, once initialised.
    #[must_use]
    pub fn service(&self) -> Option<&dyn BlobService> {
        self.service.as_deref()
    }

    fn ready(&self) -> Result<&dyn BlobService, ObjectStoreError> {
        self.service().ok_or(ObjectStoreError::NotInitialised)
    }
}

impl ObjectStore for AzureObjectStore {
    type Error = ObjectStoreError;

    fn init<'a>(&'a mut self, config: &'a PluginConfig) -> PluginFuture<'a, (), Self::Error> {
        Box::pin(async move {
            validate_config_keys(config, VALID_KEYS)?;
            let settings = PluginSettings::load_without_cli_args()?;
            let client = connect::connect(config, &settings).await?;
            self.block_size = block_size(config);
            debug!(
                endpoint = client.endpoint(),
                block_size = self.block_size,
                "object store initialised"
            );
            self.service = Some(Arc::new(client));
            Ok(())
        })
    }

    fn put_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        body: ObjectBody,
    ) -> PluginFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let service = self.ready()?;
            upload::upload(service, bucket, key, body, self.block_size).await
        })
    }

    fn object_exists<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> PluginFuture<'a, bool, Self::Error> {
        Box::pin(async move { Ok(self.ready()?.exists(bucket, key).await?) })
    }

    fn get_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> PluginFuture<'a, ObjectReader, Self::Error> {
        Box::pin(async move { Ok(self.ready()?.download(bucket, key).await?) })
    }

    fn list_common_prefixes<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
        delimiter: &'a str,
    ) -> PluginFuture<'a, Vec<String>, Self::Error> {
        Box::pin(async move {
            let listing = self
                .ready()?
                .list(bucket, prefix, Some(delimiter))
                .await?;
            Ok(listing.prefixes)
        })
    }

    fn list_objects<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> PluginFuture<'a, Vec<String>, Self::Error> {
        Box::pin(async move {
            let listing = self.ready()?.list(bucket, prefix, None).await?;
            Ok(listing.names)
        })
    }

    fn delete_object<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
    ) -> PluginFuture<'a, (), Self::Error> {
        Box::pin(async move { Ok(self.ready()?.delete(bucket, key).await?) })
    }

    fn create_signed_url<'a>(
        &'a self,
        bucket: &'a str,
        key: &'a str,
        ttl: Duration,
    ) -> PluginFuture<'a, String, Self::Error> {
        Box::pin(async move { Ok(self.ready()?.signed_url(bucket, key, ttl).await?) })
    }
}

#[cfg(test)]
mod tests;
