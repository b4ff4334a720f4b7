//! Azure AD token credentials.
//!
//! [`token_credential`] picks a credential from the credential map in this
//! order: client secret, client certificate, workload identity (federated
//! token file), then managed identity. Client secrets and federated tokens
//! are exchanged by `azure_identity`; certificates and the metadata service
//! are handled here because the credential file is PEM and the metadata
//! endpoint can be overridden. Every credential is wrapped in a
//! [`CachedCredential`] that reuses tokens per scope until shortly before
//! they expire.

mod certificate;
mod managed_identity;
mod token;
mod workload_identity;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::{HttpClient, StatusCode, Url};
use azure_identity::ClientSecretCredential;
use camino::Utf8PathBuf;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::debug;

use crate::cloud::CloudConfiguration;
use crate::credentials::{
    CLIENT_CERTIFICATE_PATH, CLIENT_ID, CLIENT_SECRET, CredentialError, Credentials,
    FEDERATED_TOKEN_FILE, TENANT_ID,
};

pub use azure_core::auth::{AccessToken, Secret, TokenCredential};
pub use certificate::ClientCertificateCredential;
pub use managed_identity::ManagedIdentityCredential;
pub use workload_identity::FederatedTokenCredential;

const REFRESH_MARGIN: TimeDuration = TimeDuration::minutes(5);

/// Errors raised while acquiring tokens.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AuthError {
    /// Required credential entries are missing.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    /// The authority host is not a valid URL.
    #[error("invalid authority host {url:?}: {message}")]
    InvalidAuthority {
        /// Authority host as configured.
        url: String,
        /// Parse failure.
        message: String,
    },
    /// The token endpoint could not be reached.
    #[error("token request to {endpoint} failed: {message}")]
    Request {
        /// Token endpoint URL.
        endpoint: String,
        /// Transport error.
        message: String,
    },
    /// The token endpoint rejected the request.
    #[error("token request to {endpoint} failed with status {status}: {message}")]
    Rejected {
        /// Token endpoint URL.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Error description returned by the service.
        message: String,
    },
    /// The token response could not be interpreted.
    #[error("invalid token response from {endpoint}: {message}")]
    InvalidResponse {
        /// Token endpoint URL.
        endpoint: String,
        /// Parse failure.
        message: String,
    },
    /// A credential failed to produce a token.
    #[error("unable to acquire a token: {message}")]
    Token {
        /// HTTP status of the failed exchange, when one was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },
    /// The client certificate could not be used.
    #[error("client certificate {path}: {message}")]
    Certificate {
        /// Certificate path.
        path: Utf8PathBuf,
        /// Failure description.
        message: String,
    },
    /// The federated token file could not be read.
    #[error("unable to read federated token file {path}: {message}")]
    TokenFile {
        /// Token file path.
        path: Utf8PathBuf,
        /// Failure description.
        message: String,
    },
    /// Signing a client assertion failed.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl AuthError {
    /// Maps a failed token request made through the SDK.
    #[must_use]
    pub fn from_azure(err: &azure_core::Error) -> Self {
        let status = match err.kind() {
            ErrorKind::HttpResponse { status, .. } => Some(u16::from(*status)),
            _ => None,
        };
        Self::Token {
            status,
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for azure_core::Error {
    fn from(err: AuthError) -> Self {
        let kind = match &err {
            AuthError::Rejected { status, .. } => StatusCode::try_from(*status)
                .map_or(ErrorKind::Credential, |code| ErrorKind::HttpResponse {
                    status: code,
                    error_code: None,
                }),
            _ => ErrorKind::Credential,
        };
        Self::new(kind, err)
    }
}

/// Returns the bearer token `credential` issues for `scope`.
///
/// # Errors
///
/// Returns [`AuthError::Token`] when the credential fails.
pub async fn bearer_token(
    credential: &dyn TokenCredential,
    scope: &str,
) -> Result<String, AuthError> {
    let token = credential
        .get_token(&[scope])
        .await
        .map_err(|err| AuthError::from_azure(&err))?;
    Ok(token.token.secret().to_owned())
}

/// Whether `token` is within the refresh margin of `now`.
#[must_use]
pub fn needs_refresh(token: &AccessToken, now: OffsetDateTime) -> bool {
    token.expires_on - now <= REFRESH_MARGIN
}

/// Kind of credential chosen by [`token_credential`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialKind {
    /// Service principal with a client secret.
    ClientSecret,
    /// Service principal with a PEM client certificate.
    ClientCertificate,
    /// Federated service-account token.
    WorkloadIdentity,
    /// Instance metadata service.
    ManagedIdentity,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ClientSecret => "client secret",
            Self::ClientCertificate => "client certificate",
            Self::WorkloadIdentity => "workload identity",
            Self::ManagedIdentity => "managed identity",
        })
    }
}

/// Per-scope token cache in front of another credential.
#[derive(Debug)]
pub struct CachedCredential {
    kind: CredentialKind,
    inner: Arc<dyn TokenCredential>,
    tokens: Mutex<BTreeMap<String, AccessToken>>,
}

impl CachedCredential {
    /// Wraps `inner`, recording which `kind` of credential it is.
    #[must_use]
    pub fn new(kind: CredentialKind, inner: Arc<dyn TokenCredential>) -> Self {
        Self {
            kind,
            inner,
            tokens: Mutex::new(BTreeMap::new()),
        }
    }

    /// Kind of the wrapped credential.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        self.kind
    }
}

#[async_trait]
impl TokenCredential for CachedCredential {
    async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
        let key = scopes.join(" ");
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens
            .get(&key)
            .filter(|token| !needs_refresh(token, OffsetDateTime::now_utc()))
        {
            return Ok(cached.clone());
        }

        let fresh = self.inner.get_token(scopes).await?;
        debug!(kind = %self.kind, scope = %key, expires_on = %fresh.expires_on, "acquired access token");
        tokens.insert(key, fresh.clone());
        Ok(fresh)
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        self.tokens.lock().await.clear();
        self.inner.clear_cache().await
    }
}

/// Parses `authority_host` for the SDK credentials.
///
/// # Errors
///
/// Returns [`AuthError::InvalidAuthority`] when it is not an absolute URL.
pub fn authority_url(authority_host: &str) -> Result<Url, AuthError> {
    Url::parse(authority_host).map_err(|err| AuthError::InvalidAuthority {
        url: authority_host.to_owned(),
        message: err.to_string(),
    })
}

/// Selects the Azure AD credential described by `creds`.
///
/// # Errors
///
/// Returns [`AuthError::Credentials`] when the selected credential lacks a
/// tenant or client ID, [`AuthError::InvalidAuthority`] when the cloud's
/// authority host is not a URL, and [`AuthError::Certificate`] when the
/// client certificate cannot be loaded.
pub fn token_credential(
    creds: &Credentials,
    cloud: &CloudConfiguration,
    http: &reqwest::Client,
) -> Result<Arc<CachedCredential>, AuthError> {
    let (kind, inner) = select(creds, cloud, http)?;
    debug!(kind = %kind, "selected token credential");
    Ok(Arc::new(CachedCredential::new(kind, inner)))
}

fn select(
    creds: &Credentials,
    cloud: &CloudConfiguration,
    http: &reqwest::Client,
) -> Result<(CredentialKind, Arc<dyn TokenCredential>), AuthError> {
    if let Some(secret) = creds.get(CLIENT_SECRET) {
        let [tenant_id, client_id] = required_pair(creds)?;
        debug!(client_id = %client_id, "using client secret credential");
        let transport: Arc<dyn HttpClient> = Arc::new(http.clone());
        let credential = ClientSecretCredential::new(
            transport,
            authority_url(&cloud.authority_host)?,
            tenant_id,
            client_id,
            secret.to_owned(),
        );
        return Ok((CredentialKind::ClientSecret, Arc::new(credential)));
    }

    if let Some(path) = creds.get(CLIENT_CERTIFICATE_PATH) {
        let [tenant_id, client_id] = required_pair(creds)?;
        debug!(client_id = %client_id, path, "using client certificate credential");
        let credential = ClientCertificateCredential::from_credentials(
            &cloud.authority_host,
            tenant_id,
            client_id,
            creds,
            http.clone(),
        )?;
        return Ok((CredentialKind::ClientCertificate, Arc::new(credential)));
    }

    if let Some(path) = creds.get(FEDERATED_TOKEN_FILE) {
        let [tenant_id, client_id] = required_pair(creds)?;
        debug!(client_id = %client_id, path, "using workload identity credential");
        let credential = FederatedTokenCredential::new(
            authority_url(&cloud.authority_host)?,
            tenant_id,
            client_id,
            path,
            http.clone(),
        );
        return Ok((CredentialKind::WorkloadIdentity, Arc::new(credential)));
    }

    debug!("using managed identity credential");
    Ok((
        CredentialKind::ManagedIdentity,
        Arc::new(ManagedIdentityCredential::from_credentials(
            creds,
            http.clone(),
        )),
    ))
}

fn required_pair(creds: &Credentials) -> Result<[String; 2], AuthError> {
    let values = creds.require(&[TENANT_ID, CLIENT_ID])?;
    <[String; 2]>::try_from(values).map_err(|_| {
        AuthError::Credentials(CredentialError::MissingValues {
            keys: vec![TENANT_ID.to_owned(), CLIENT_ID.to_owned()],
        })
    })
}

#[cfg(test)]
mod tests;
