//! Service principal authentication with a client certificate.
//!
//! The certificate file is PEM and holds the RSA private key plus the
//! certificate chain, leaf first. Assertions are PS256 JWTs carrying the
//! SHA-256 thumbprint of the leaf.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64_STANDARD, URL_SAFE_NO_PAD};
use camino::Utf8PathBuf;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use pem::Pem;
use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{Duration as TimeDuration, OffsetDateTime};
use uuid::Uuid;

use super::token::{CLIENT_ASSERTION_TYPE, request_client_credentials, token_endpoint, v2_scope};
use super::{AccessToken, AuthError, TokenCredential};
use crate::config::parse_bool;
use crate::credentials::{
    CLIENT_CERTIFICATE_PASSWORD, CLIENT_CERTIFICATE_PATH, CLIENT_SEND_CERTIFICATE_CHAIN,
    Credentials,
};
use crate::files;

const ASSERTION_LIFETIME: TimeDuration = TimeDuration::minutes(10);
const NOT_PEM: &str = "certificate file must be PEM encoded; PKCS#12 is not supported";

#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

/// Signs client assertions with a certificate key.
pub struct ClientCertificateCredential {
    endpoint: String,
    client_id: String,
    key: EncodingKey,
    thumbprint: String,
    chain: Option<Vec<String>>,
    http: reqwest::Client,
}

impl fmt::Debug for ClientCertificateCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCertificateCredential")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("thumbprint", &self.thumbprint)
            .finish_non_exhaustive()
    }
}

impl ClientCertificateCredential {
    /// Loads the certificate named by `AZURE_CLIENT_CERTIFICATE_PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Certificate`] when the file is unreadable, is not
    /// PEM, is password protected, or lacks a key or certificate.
    pub fn from_credentials(
        authority_host: &str,
        tenant_id: impl AsRef<str>,
        client_id: impl Into<String>,
        creds: &Credentials,
        http: reqwest::Client,
    ) -> Result<Self, AuthError> {
        let path = Utf8PathBuf::from(creds.get(CLIENT_CERTIFICATE_PATH).unwrap_or_default());
        let certificate_error = |message: &str| AuthError::Certificate {
            path: path.clone(),
            message: message.to_owned(),
        };

        if creds.get(CLIENT_CERTIFICATE_PASSWORD).is_some() {
            return Err(certificate_error(
                "password-protected certificates are not supported; supply an unencrypted PEM file",
            ));
        }

        let contents = files::read(&path).map_err(|err| certificate_error(&err.to_string()))?;
        let send_chain = creds
            .get(CLIENT_SEND_CERTIFICATE_CHAIN)
            .and_then(parse_bool)
            .unwrap_or(false);
        Self::from_pem(
            authority_host,
            tenant_id,
            client_id,
            &contents,
            send_chain,
            http,
        )
        .map_err(|message| certificate_error(&message))
    }

    /// Builds a credential from PEM content.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the PEM lacks a usable RSA
    /// key or certificate.
    pub fn from_pem(
        authority_host: &str,
        tenant_id: impl AsRef<str>,
        client_id: impl Into<String>,
        contents: &[u8],
        send_chain: bool,
        http: reqwest::Client,
    ) -> Result<Self, String> {
        let blocks = pem::parse_many(contents).map_err(|err| format!("{NOT_PEM}: {err}"))?;
        if blocks.is_empty() {
            return Err(NOT_PEM.to_owned());
        }
        if blocks.iter().any(is_encrypted) {
            return Err("encrypted private keys are not supported".to_owned());
        }

        let key_block = blocks
            .iter()
            .find(|block| block.tag() == "PRIVATE KEY" || block.tag() == "RSA PRIVATE KEY")
            .ok_or_else(|| "no private key found".to_owned())?;
        let key = EncodingKey::from_rsa_pem(pem::encode(key_block).as_bytes())
            .map_err(|err| format!("unsupported private key: {err}"))?;

        let certificates: Vec<&Pem> = blocks
            .iter()
            .filter(|block| block.tag() == "CERTIFICATE")
            .collect();
        let leaf = certificates
            .first()
            .ok_or_else(|| "no certificate found".to_owned())?;

        let chain = send_chain.then(|| {
            certificates
                .iter()
                .map(|block| BASE64_STANDARD.encode(block.contents()))
                .collect()
        });

        Ok(Self {
            endpoint: token_endpoint(authority_host, tenant_id.as_ref()),
            client_id: client_id.into(),
            key,
            thumbprint: URL_SAFE_NO_PAD.encode(Sha256::digest(leaf.contents())),
            chain,
            http,
        })
    }

    /// Base64url SHA-256 thumbprint of the leaf certificate.
    #[must_use]
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    /// Signs a fresh client assertion for the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Signing`] when the key cannot sign.
    pub fn assertion(&self) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let claims = AssertionClaims {
            aud: &self.endpoint,
            iss: &self.client_id,
            sub: &self.client_id,
            jti: Uuid::new_v4().to_string(),
            nbf: now.unix_timestamp(),
            iat: now.unix_timestamp(),
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
        };
        let mut header = Header::new(Algorithm::PS256);
        header.x5t_s256 = Some(self.thumbprint.clone());
        header.x5c.clone_from(&self.chain);

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|err| AuthError::Signing(err.to_string()))
    }
}

// Legacy OpenSSL keys mark encryption with a `Proc-Type` header.
fn is_encrypted(block: &Pem) -> bool {
    block.tag() == "ENCRYPTED PRIVATE KEY"
        || block
            .headers()
            .get("Proc-Type")
            .is_some_and(|value| value.contains("ENCRYPTED"))
}

#[async_trait]
impl TokenCredential for ClientCertificateCredential {
    async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
        let scope: Vec<String> = scopes.iter().map(|scope| v2_scope(scope)).collect();
        let assertion = self.assertion()?;
        let token = request_client_credentials(
            &self.http,
            &self.endpoint,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_assertion_type", CLIENT_ASSERTION_TYPE),
                ("client_assertion", assertion.as_str()),
                ("scope", scope.join(" ").as_str()),
            ],
        )
        .await?;
        Ok(token)
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        Ok(())
    }
}
