//! Blob service adapter over `azure_storage_blobs`.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use azure_core::{HttpClient, TransportOptions, Url};
use azure_storage::prelude::*;
use azure_storage::shared_access_signature::service_sas::BlobSharedAccessSignature;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::*;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, future, stream};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{BlobError, BlobFuture, BlobListing, BlobService, check_blob_name};
use crate::auth::{Secret, TokenCredential};
use crate::plugin::ObjectReader;

const CLOCK_SKEW: TimeDuration = TimeDuration::minutes(5);

/// How requests to the account are authorised.
#[derive(Clone, Debug)]
pub enum BlobAuth {
    /// Account key signing.
    SharedKey(Secret),
    /// Azure AD bearer tokens for the storage scope.
    Bearer(Arc<dyn TokenCredential>),
}

impl BlobAuth {
    /// Account key authorisation, checking the key is base64.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::InvalidKey`] when `key` does not decode.
    pub fn shared_key(key: &str) -> Result<Self, BlobError> {
        let trimmed = key.trim();
        BASE64_STANDARD
            .decode(trimmed)
            .map_err(|err| BlobError::InvalidKey(err.to_string()))?;
        Ok(Self::SharedKey(Secret::new(trimmed.to_owned())))
    }
}

/// [`BlobService`] bound to one storage account endpoint.
#[derive(Clone)]
pub struct AzureBlobService {
    service: BlobServiceClient,
    endpoint: String,
    account: String,
    auth: BlobAuth,
}

impl fmt::Debug for AzureBlobService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobService")
            .field("endpoint", &self.endpoint)
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl AzureBlobService {
    /// Creates a service for `account` served at `endpoint`, sending
    /// requests through `http`.
    ///
    /// # Errors
    ///
    /// Returns [`BlobError::InvalidEndpoint`] when `endpoint` is not an
    /// absolute URL.
    pub fn new(
        endpoint: &str,
        account: impl Into<String>,
        auth: BlobAuth,
        http: reqwest::Client,
    ) -> Result<Self, BlobError> {
        let trimmed = endpoint.trim_end_matches('/');
        Url::parse(trimmed).map_err(|err| BlobError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;
        let account = account.into();
        let credentials = match &auth {
            BlobAuth::SharedKey(key) => StorageCredentials::access_key(account.clone(), key.clone()),
            BlobAuth::Bearer(credential) => {
                StorageCredentials::token_credential(Arc::clone(credential))
            }
        };
        let location = CloudLocation::Custom {
            account: account.clone(),
            uri: trimmed.to_owned(),
        };
        let transport: Arc<dyn HttpClient> = Arc::new(http);
        let service = ClientBuilder::with_location(location, credentials)
            .transport(TransportOptions::new(transport))
            .blob_service_client();
        Ok(Self {
            service,
            endpoint: trimmed.to_owned(),
            account,
            auth,
        })
    }

    /// Account endpoint the service targets.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn blob(&self, container: &str, blob: &str) -> Result<BlobClient, BlobError> {
        check_blob_name(blob)?;
        Ok(self.service.container_client(container).blob_client(blob))
    }

    async fn read_only_signature(
        &self,
        client: &BlobClient,
        now: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> azure_core::Result<BlobSharedAccessSignature> {
        let permissions = BlobSasPermissions {
            read: true,
            ..BlobSasPermissions::default()
        };
        match &self.auth {
            BlobAuth::SharedKey(_) => client.shared_access_signature(permissions, expiry).await,
            BlobAuth::Bearer(_) => {
                let response = self
                    .service
                    .get_user_deligation_key(now - CLOCK_SKEW, expiry)
                    .await?;
                client
                    .user_delegation_shared_access_signature(
                        permissions,
                        &response.user_deligation_key,
                    )
                    .await
            }
        }
    }
}

impl BlobService for AzureBlobService {
    fn stage_block<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_id: &'a str,
        data: Bytes,
    ) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            debug!(container, blob, block_id, len = data.len(), "staging block");
            client
                .put_block(BlockId::from(block_id.to_owned()), data)
                .await
                .map_err(|err| BlobError::from_azure("put block", &err))?;
            Ok(())
        })
    }

    fn commit_block_list<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_ids: &'a [String],
    ) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            debug!(container, blob, blocks = block_ids.len(), "committing block list");
            let list = BlockList {
                blocks: block_ids
                    .iter()
                    .map(|id| BlobBlockType::Latest(BlockId::from(id.clone())))
                    .collect(),
            };
            client
                .put_block_list(list)
                .await
                .map_err(|err| BlobError::from_azure("put block list", &err))?;
            Ok(())
        })
    }

    fn exists<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, bool> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            match client.get_properties().await {
                Ok(_) => Ok(true),
                Err(err) => {
                    let mapped = BlobError::from_azure("get blob properties", &err);
                    if !mapped.is_not_found() {
                        return Err(mapped);
                    }
                    debug!(container, blob, "blob does not exist");
                    Ok(false)
                }
            }
        })
    }

    fn download<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
    ) -> BlobFuture<'a, ObjectReader> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            let mut chunks = client.get().into_stream();
            // The first range is awaited here so a missing blob fails the call
            // rather than the first read.
            let first = match chunks.next().await {
                Some(chunk) => chunk.map_err(|err| BlobError::from_azure("get blob", &err))?,
                None => {
                    let reader: ObjectReader = Box::pin(tokio::io::empty());
                    return Ok(reader);
                }
            };
            let bodies = stream::once(future::ready(Ok(first)))
                .chain(chunks)
                .map_ok(|chunk| chunk.data)
                .try_flatten()
                .map_err(io::Error::other);
            let reader: ObjectReader = Box::pin(StreamReader::new(bodies));
            Ok(reader)
        })
    }

    fn delete<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, ()> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            client
                .delete()
                .await
                .map_err(|err| BlobError::from_azure("delete blob", &err))?;
            Ok(())
        })
    }

    fn list<'a>(
        &'a self,
        container: &'a str,
        prefix: &'a str,
        delimiter: Option<&'a str>,
    ) -> BlobFuture<'a, BlobListing> {
        Box::pin(async move {
            let mut request = self.service.container_client(container).list_blobs();
            if !prefix.is_empty() {
                request = request.prefix(prefix.to_owned());
            }
            if let Some(value) = delimiter {
                request = request.delimiter(value.to_owned());
            }

            let mut listing = BlobListing::default();
            let mut pages = request.into_stream();
            while let Some(page) = pages.next().await {
                let response = page.map_err(|err| BlobError::from_azure("list blobs", &err))?;
                listing
                    .names
                    .extend(response.blobs.blobs().map(|item| item.name.clone()));
                listing
                    .prefixes
                    .extend(response.blobs.prefixes().map(|item| item.name.clone()));
            }
            Ok(listing)
        })
    }

    fn signed_url<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        ttl: Duration,
    ) -> BlobFuture<'a, String> {
        Box::pin(async move {
            let client = self.blob(container, blob)?;
            let now = OffsetDateTime::now_utc();
            let lifetime = TimeDuration::try_from(ttl).unwrap_or(TimeDuration::MAX);
            let expiry = now.saturating_add(lifetime);
            let signature = self
                .read_only_signature(&client, now, expiry)
                .await
                .map_err(|err| BlobError::from_azure("sign blob url", &err))?;
            let url = client
                .generate_signed_blob_url(&signature)
                .map_err(|err| BlobError::from_azure("sign blob url", &err))?;
            Ok(url.to_string())
        })
    }
}
