//! Blob service access used by the object store.
//!
//! [`BlobService`] is the seam between the object-store plugin and the
//! storage SDK. [`AzureBlobService`] talks to a real account; tests swap in
//! in-memory doubles.

mod client;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use azure_core::error::ErrorKind;
use bytes::Bytes;
use thiserror::Error;

use crate::auth::AuthError;
use crate::plugin::ObjectReader;

pub use client::{AzureBlobService, BlobAuth};

/// Boxed future returned by blob operations.
pub type BlobFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BlobError>> + Send + 'a>>;

/// Errors raised by blob service calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BlobError {
    /// The request could not be sent or its body could not be read.
    #[error("{operation} request failed: {message}")]
    Request {
        /// Operation being performed.
        operation: &'static str,
        /// Transport error.
        message: String,
    },
    /// The service answered with an error status.
    #[error("{operation} failed with status {status} ({code}): {message}")]
    Status {
        /// Operation being performed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
        /// Storage error code, or `unknown`.
        code: String,
        /// Storage error message or raw body.
        message: String,
    },
    /// The service answered with a body that could not be interpreted.
    #[error("{operation} returned an invalid response: {message}")]
    InvalidResponse {
        /// Operation being performed.
        operation: &'static str,
        /// Parse failure.
        message: String,
    },
    /// The account endpoint is not a valid URL.
    #[error("invalid blob endpoint {endpoint:?}: {message}")]
    InvalidEndpoint {
        /// Endpoint as configured.
        endpoint: String,
        /// Parse failure.
        message: String,
    },
    /// The storage account key is not base64.
    #[error("storage account key is not valid base64: {0}")]
    InvalidKey(String),
    /// The blob name has `.` or `..` segments a URL would collapse.
    #[error("blob name {name:?} contains a relative path segment")]
    InvalidBlobName {
        /// Name as requested.
        name: String,
    },
    /// Authorising the request failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl BlobError {
    /// Maps an SDK failure raised while performing `operation`.
    #[must_use]
    pub fn from_azure(operation: &'static str, err: &azure_core::Error) -> Self {
        match err.kind() {
            ErrorKind::HttpResponse { status, error_code } => Self::Status {
                operation,
                status: u16::from(*status),
                code: error_code.clone().unwrap_or_else(|| "unknown".to_owned()),
                message: err.to_string(),
            },
            ErrorKind::Credential => Self::Auth(AuthError::from_azure(err)),
            ErrorKind::DataConversion => Self::InvalidResponse {
                operation,
                message: err.to_string(),
            },
            _ => Self::Request {
                operation,
                message: err.to_string(),
            },
        }
    }

    /// Whether the error is a `404 Not Found` answer.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// Rejects names whose `.` or `..` segments would be collapsed when the
/// name is joined onto the container URL.
///
/// # Errors
///
/// Returns [`BlobError::InvalidBlobName`] naming the offending blob.
pub fn check_blob_name(name: &str) -> Result<(), BlobError> {
    if name
        .split('/')
        .any(|segment| segment == "." || segment == "..")
    {
        return Err(BlobError::InvalidBlobName {
            name: name.to_owned(),
        });
    }
    Ok(())
}

/// Blob names and virtual directories returned by a listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BlobListing {
    /// Names of the blobs, in service order.
    pub names: Vec<String>,
    /// Prefixes collapsed by the delimiter, in service order.
    pub prefixes: Vec<String>,
}

/// Blob service operations needed by the object store.
pub trait BlobService: Send + Sync + fmt::Debug {
    /// Stages `data` as block `block_id` of `blob`.
    fn stage_block<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_id: &'a str,
        data: Bytes,
    ) -> BlobFuture<'a, ()>;

    /// Commits `block_ids` in order, replacing the blob contents.
    fn commit_block_list<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        block_ids: &'a [String],
    ) -> BlobFuture<'a, ()>;

    /// Reports whether `blob` exists.
    fn exists<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, bool>;

    /// Streams the contents of `blob`.
    fn download<'a>(&'a self, container: &'a str, blob: &'a str)
    -> BlobFuture<'a, ObjectReader>;

    /// Deletes `blob`.
    fn delete<'a>(&'a self, container: &'a str, blob: &'a str) -> BlobFuture<'a, ()>;

    /// Lists every blob under `prefix`, collapsing names on `delimiter` when
    /// one is given. All result pages are fetched.
    fn list<'a>(
        &'a self,
        container: &'a str,
        prefix: &'a str,
        delimiter: Option<&'a str>,
    ) -> BlobFuture<'a, BlobListing>;

    /// Returns a read-only URL for `blob` valid for `ttl`.
    fn signed_url<'a>(
        &'a self,
        container: &'a str,
        blob: &'a str,
        ttl: Duration,
    ) -> BlobFuture<'a, String>;
}
