//! Managed identity through the instance metadata service.

use std::fmt;

use async_trait::async_trait;

use super::token::{read_token, resource};
use super::{AccessToken, AuthError, TokenCredential};
use crate::credentials::{CLIENT_ID, Credentials, POD_IDENTITY_AUTHORITY_HOST};

const IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_API_VERSION: &str = "2018-02-01";

/// Requests tokens from the instance metadata service.
pub struct ManagedIdentityCredential {
    endpoint: String,
    client_id: Option<String>,
    http: reqwest::Client,
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ManagedIdentityCredential {
    /// Creates a credential for the system identity, or the user-assigned
    /// identity `client_id` when given.
    #[must_use]
    pub fn new(
        metadata_endpoint: &str,
        client_id: Option<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: format!(
                "{}/metadata/identity/oauth2/token",
                metadata_endpoint.trim_end_matches('/')
            ),
            client_id,
            http,
        }
    }

    /// Reads the optional client ID and metadata endpoint override from
    /// `creds`.
    #[must_use]
    pub fn from_credentials(creds: &Credentials, http: reqwest::Client) -> Self {
        Self::new(
            creds
                .get(POD_IDENTITY_AUTHORITY_HOST)
                .unwrap_or(IMDS_ENDPOINT),
            creds.get(CLIENT_ID).map(str::to_owned),
            http,
        )
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken, AuthError> {
        let mut query = vec![("api-version", IMDS_API_VERSION), ("resource", resource(scope))];
        if let Some(client_id) = self.client_id.as_deref() {
            query.push(("client_id", client_id));
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .header("Metadata", "true")
            .send()
            .await
            .map_err(|err| AuthError::Request {
                endpoint: self.endpoint.clone(),
                message: err.to_string(),
            })?;
        read_token(&self.endpoint, response).await
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
        // The metadata service issues tokens for one resource at a time.
        let scope = scopes.first().copied().unwrap_or_default();
        Ok(self.fetch(scope).await?)
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        Ok(())
    }
}
