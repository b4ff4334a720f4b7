//! Azure cloud resolution: public, sovereign, and custom (Azure Stack)
//! endpoints.

use camino::Utf8PathBuf;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{ACTIVE_DIRECTORY_AUTHORITY_URI_KEY, lookup};
use crate::credentials::{AUTHORITY_HOST, CLOUD_NAME, Credentials, ENVIRONMENT_FILEPATH, METADATA_HOST};
use crate::files;
use crate::plugin::PluginConfig;

const METADATA_API_VERSION: &str = "2019-05-01";

/// Endpoints of one Azure cloud.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudConfiguration {
    /// Cloud name as configured.
    pub name: String,
    /// Azure AD authority host, always ending in `/`.
    pub authority_host: String,
    /// Resource manager endpoint without a trailing slash.
    pub resource_manager_endpoint: String,
    /// Audience for resource manager tokens.
    pub resource_manager_audience: String,
    /// Storage DNS suffix, for example `core.windows.net`.
    pub storage_suffix: String,
}

impl CloudConfiguration {
    fn known(
        name: &str,
        authority_host: &str,
        resource_manager_endpoint: &str,
        resource_manager_audience: &str,
        storage_suffix: &str,
    ) -> Self {
        Self {
            name: name.to_owned(),
            authority_host: authority_host.to_owned(),
            resource_manager_endpoint: resource_manager_endpoint.to_owned(),
            resource_manager_audience: resource_manager_audience.to_owned(),
            storage_suffix: storage_suffix.to_owned(),
        }
    }

    /// Azure public cloud.
    #[must_use]
    pub fn public() -> Self {
        Self::known(
            "AzurePublicCloud",
            "https://login.microsoftonline.com/",
            "https://management.azure.com",
            "https://management.core.windows.net/",
            "core.windows.net",
        )
    }

    /// Azure operated by 21Vianet in China.
    #[must_use]
    pub fn china() -> Self {
        Self::known(
            "AzureChinaCloud",
            "https://login.chinacloudapi.cn/",
            "https://management.chinacloudapi.cn",
            "https://management.core.chinacloudapi.cn",
            "core.chinacloudapi.cn",
        )
    }

    /// Azure US Government.
    #[must_use]
    pub fn government() -> Self {
        Self::known(
            "AzureUSGovernmentCloud",
            "https://login.microsoftonline.us/",
            "https://management.usgovcloudapi.net",
            "https://management.core.usgovcloudapi.net",
            "core.usgovcloudapi.net",
        )
    }

    /// Default blob endpoint of `account` in this cloud.
    #[must_use]
    pub fn blob_endpoint(&self, account: &str) -> String {
        format!("https://{account}.blob.{}", self.storage_suffix)
    }

    /// Token scope for resource manager calls.
    #[must_use]
    pub fn resource_manager_scope(&self) -> String {
        let audience = if self.resource_manager_audience.is_empty() {
            &self.resource_manager_endpoint
        } else {
            &self.resource_manager_audience
        };
        format!("{}/.default", audience.trim_end_matches('/'))
    }

    /// Replaces the authority host, normalising the trailing slash.
    #[must_use]
    pub fn with_authority_host(mut self, host: &str) -> Self {
        self.authority_host = normalise_authority(host);
        self
    }
}

fn normalise_authority(host: &str) -> String {
    format!("{}/", host.trim_end_matches('/'))
}

/// Errors raised while resolving cloud endpoints.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// The cloud name matched no known or custom cloud.
    #[error("unknown cloud: {name}")]
    UnknownCloud {
        /// Configured cloud name.
        name: String,
    },
    /// The metadata host could not be queried.
    #[error("unable to fetch cloud metadata from {url}: {message}")]
    Metadata {
        /// Metadata URL.
        url: String,
        /// Failure description.
        message: String,
    },
    /// The environment file could not be read or parsed.
    #[error("unable to load cloud environment file {path}: {message}")]
    EnvironmentFile {
        /// Environment file path.
        path: Utf8PathBuf,
        /// Failure description.
        message: String,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MetadataDocument {
    Many(Vec<MetadataEntry>),
    One(MetadataEntry),
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    authentication: Option<MetadataAuthentication>,
    #[serde(default)]
    suffixes: Option<MetadataSuffixes>,
    #[serde(default)]
    resource_manager: Option<String>,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataAuthentication {
    #[serde(default)]
    login_endpoint: Option<String>,
    #[serde(default)]
    audiences: Vec<String>,
}

#[derive(Clone, Deserialize)]
struct MetadataSuffixes {
    #[serde(default)]
    storage: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentFile {
    #[serde(default)]
    resource_manager_endpoint: Option<String>,
    #[serde(default)]
    active_directory_endpoint: Option<String>,
    #[serde(default)]
    storage_endpoint_suffix: Option<String>,
    #[serde(default)]
    token_audience: Option<String>,
}

/// Maps a well-known cloud name to its endpoints, ignoring case.
#[must_use]
pub fn well_known(name: &str) -> Option<CloudConfiguration> {
    match name.to_ascii_uppercase().as_str() {
        "" | "AZURECLOUD" | "AZUREPUBLICCLOUD" => Some(CloudConfiguration::public()),
        "AZURECHINACLOUD" => Some(CloudConfiguration::china()),
        "AZUREUSGOVERNMENT" | "AZUREUSGOVERNMENTCLOUD" => Some(CloudConfiguration::government()),
        _ => None,
    }
}

/// Resolves the cloud for a location.
///
/// The cloud name comes from `AZURE_CLOUD_NAME`. Custom clouds are
/// described by the metadata host and then the environment file. The
/// location's `activeDirectoryAuthorityURI` overrides the authority host,
/// falling back to `AZURE_AUTHORITY_HOST`.
///
/// # Errors
///
/// Returns [`CloudError`] when a custom cloud cannot be described.
pub async fn resolve(
    config: &PluginConfig,
    creds: &Credentials,
    http: &reqwest::Client,
) -> Result<CloudConfiguration, CloudError> {
    let name = creds.get(CLOUD_NAME).unwrap_or_default();
    let cloud = match well_known(name) {
        Some(cloud) => cloud,
        None => resolve_custom(name, creds, http).await?,
    };

    let authority = lookup(config, ACTIVE_DIRECTORY_AUTHORITY_URI_KEY)
        .or_else(|| creds.get(AUTHORITY_HOST));
    Ok(match authority {
        Some(host) => cloud.with_authority_host(host),
        None => cloud,
    })
}

async fn resolve_custom(
    name: &str,
    creds: &Credentials,
    http: &reqwest::Client,
) -> Result<CloudConfiguration, CloudError> {
    let mut cloud = CloudConfiguration {
        name: name.to_owned(),
        authority_host: String::new(),
        resource_manager_endpoint: String::new(),
        resource_manager_audience: String::new(),
        storage_suffix: String::new(),
    };

    if let Some(host) = creds.get(METADATA_HOST) {
        let entry = fetch_metadata(host, name, http).await?;
        apply_metadata(&mut cloud, &entry);
        if cloud.resource_manager_endpoint.is_empty() {
            cloud.resource_manager_endpoint = with_scheme(host).trim_end_matches('/').to_owned();
        }
    }

    if let Some(path) = creds.get(ENVIRONMENT_FILEPATH) {
        apply_environment_file(&mut cloud, Utf8PathBuf::from(path))?;
    }

    if cloud.storage_suffix.is_empty() {
        return Err(CloudError::UnknownCloud {
            name: name.to_owned(),
        });
    }
    debug!(cloud = name, suffix = %cloud.storage_suffix, "resolved custom cloud");
    Ok(cloud)
}

fn with_scheme(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    }
}

async fn fetch_metadata(
    host: &str,
    name: &str,
    http: &reqwest::Client,
) -> Result<MetadataEntry, CloudError> {
    let url = format!(
        "{}/metadata/endpoints?api-version={METADATA_API_VERSION}",
        with_scheme(host).trim_end_matches('/')
    );
    let metadata_error = |message: String| CloudError::Metadata {
        url: url.clone(),
        message,
    };

    let response = http
        .get(&url)
        .send()
        .await
        .map_err(|err| metadata_error(err.to_string()))?;
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| metadata_error(err.to_string()))?;
    if !status.is_success() {
        return Err(metadata_error(format!(
            "status {status}: {}",
            String::from_utf8_lossy(&body)
        )));
    }

    let document: MetadataDocument =
        serde_json::from_slice(&body).map_err(|err| metadata_error(err.to_string()))?;
    let entries = match document {
        MetadataDocument::Many(entries) => entries,
        MetadataDocument::One(entry) => vec![entry],
    };

    if let Some(entry) = entries
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
    {
        return Ok(entry.clone());
    }
    match entries.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(metadata_error(format!("cloud {name} not listed"))),
    }
}

fn apply_metadata(cloud: &mut CloudConfiguration, entry: &MetadataEntry) {
    if let Some(auth) = &entry.authentication {
        if let Some(login) = auth.login_endpoint.as_deref().filter(|v| !v.is_empty()) {
            cloud.authority_host = normalise_authority(login);
        }
        if let Some(audience) = auth.audiences.first() {
            cloud.resource_manager_audience.clone_from(audience);
        }
    }
    if let Some(storage) = entry
        .suffixes
        .as_ref()
        .and_then(|suffixes| suffixes.storage.as_deref())
        .filter(|v| !v.is_empty())
    {
        cloud.storage_suffix = storage.to_owned();
    }
    if let Some(endpoint) = entry.resource_manager.as_deref().filter(|v| !v.is_empty()) {
        cloud.resource_manager_endpoint = endpoint.trim_end_matches('/').to_owned();
    }
}

fn apply_environment_file(cloud: &mut CloudConfiguration, path: Utf8PathBuf) -> Result<(), CloudError> {
    let contents = files::read_to_string(&path).map_err(|err| CloudError::EnvironmentFile {
        path: path.clone(),
        message: err.to_string(),
    })?;
    let environment: EnvironmentFile =
        serde_json::from_str(&contents).map_err(|err| CloudError::EnvironmentFile {
            path,
            message: err.to_string(),
        })?;

    let present = |value: Option<String>| value.filter(|v| !v.is_empty());
    if let Some(endpoint) = present(environment.resource_manager_endpoint) {
        cloud.resource_manager_endpoint = endpoint.trim_end_matches('/').to_owned();
    }
    if let Some(authority) = present(environment.active_directory_endpoint) {
        cloud.authority_host = normalise_authority(&authority);
    }
    if let Some(suffix) = present(environment.storage_endpoint_suffix) {
        cloud.storage_suffix = suffix;
    }
    if let Some(audience) = present(environment.token_audience) {
        cloud.resource_manager_audience = audience;
    }
    Ok(())
}
