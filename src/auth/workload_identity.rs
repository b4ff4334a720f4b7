//! Workload identity: a projected service-account token exchanged for Azure
//! AD tokens.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use azure_core::{HttpClient, Url};
use azure_identity::WorkloadIdentityCredential;
use camino::Utf8PathBuf;

use super::{AccessToken, AuthError, Secret, TokenCredential};
use crate::files;

/// Exchanges the federated token in a file for Azure AD tokens.
pub struct FederatedTokenCredential {
    authority_host: Url,
    tenant_id: String,
    client_id: String,
    token_file: Utf8PathBuf,
    http: Arc<dyn HttpClient>,
}

impl fmt::Debug for FederatedTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedTokenCredential")
            .field("authority_host", &self.authority_host.as_str())
            .field("client_id", &self.client_id)
            .field("token_file", &self.token_file)
            .finish_non_exhaustive()
    }
}

impl FederatedTokenCredential {
    /// Creates a credential reading its assertion from `token_file`.
    #[must_use]
    pub fn new(
        authority_host: Url,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<Utf8PathBuf>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            authority_host,
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            http: Arc::new(http),
        }
    }

    /// Reads the current assertion from the token file.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenFile`] when the file is unreadable or empty.
    pub fn assertion(&self) -> Result<String, AuthError> {
        let contents =
            files::read_to_string(&self.token_file).map_err(|err| AuthError::TokenFile {
                path: self.token_file.clone(),
                message: err.to_string(),
            })?;
        let token = contents.trim();
        if token.is_empty() {
            return Err(AuthError::TokenFile {
                path: self.token_file.clone(),
                message: "file is empty".to_owned(),
            });
        }
        Ok(token.to_owned())
    }
}

#[async_trait]
impl TokenCredential for FederatedTokenCredential {
    // The kubelet rotates the projected token, so it is read on every exchange.
    async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
        let exchange = WorkloadIdentityCredential::new(
            Arc::clone(&self.http),
            self.authority_host.clone(),
            self.tenant_id.clone(),
            self.client_id.clone(),
            Secret::new(self.assertion()?),
        );
        exchange.get_token(scopes).await
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        Ok(())
    }
}
