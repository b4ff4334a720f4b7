//! HTTP client construction shared by the REST adapters.

use std::sync::LazyLock;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use thiserror::Error;

use crate::config::{CA_CERT_ENCODED_KEY, CA_CERT_KEY, lookup};
use crate::plugin::PluginConfig;

const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    builder()
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(HTTP_CONNECT_TIMEOUT)
        .pool_idle_timeout(HTTP_POOL_IDLE_TIMEOUT)
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
}

/// Errors raised while preparing an HTTP client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum HttpError {
    /// The configured CA bundle could not be decoded or parsed.
    #[error("invalid caCert: {0}")]
    InvalidCertificate(String),
    /// The TLS backend rejected the client configuration.
    #[error("unable to build HTTP client: {0}")]
    Build(String),
}

/// Returns the process-wide client used when no custom trust roots apply.
#[must_use]
pub fn default_client() -> reqwest::Client {
    HTTP_CLIENT.clone()
}

/// Reads the PEM bundle from `caCert`, base64-decoding it when
/// `caCertEncoded` is set.
///
/// # Errors
///
/// Returns [`HttpError::InvalidCertificate`] when the encoded form is not
/// valid base64.
pub fn ca_certificate(config: &PluginConfig) -> Result<Option<Vec<u8>>, HttpError> {
    let Some(raw) = lookup(config, CA_CERT_KEY) else {
        return Ok(None);
    };
    if lookup(config, CA_CERT_ENCODED_KEY).is_some() {
        return BASE64_STANDARD
            .decode(raw.trim())
            .map(Some)
            .map_err(|err| HttpError::InvalidCertificate(err.to_string()));
    }
    Ok(Some(raw.as_bytes().to_vec()))
}

/// Builds a client trusting the system roots plus every certificate in
/// `pem`, or returns the shared client when `pem` is `None`.
///
/// # Errors
///
/// Returns [`HttpError`] when the bundle holds no usable certificate or the
/// client cannot be built.
pub fn client_with_roots(pem: Option<&[u8]>) -> Result<reqwest::Client, HttpError> {
    let Some(bundle) = pem else {
        return Ok(default_client());
    };

    let blocks =
        pem::parse_many(bundle).map_err(|err| HttpError::InvalidCertificate(err.to_string()))?;
    let mut client = builder();
    let mut added = 0_usize;
    for block in blocks.iter().filter(|block| block.tag() == "CERTIFICATE") {
        let certificate = reqwest::Certificate::from_der(block.contents())
            .map_err(|err| HttpError::InvalidCertificate(err.to_string()))?;
        client = client.add_root_certificate(certificate);
        added += 1;
    }
    if added == 0 {
        return Err(HttpError::InvalidCertificate(
            "no PEM certificate found".to_owned(),
        ));
    }

    client
        .build()
        .map_err(|err| HttpError::Build(err.to_string()))
}
