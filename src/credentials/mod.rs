//! Credential maps assembled from the process environment and dotenv files.
//!
//! Azure credentials are handed to the plugins as `KEY=VALUE` pairs. The
//! process environment provides the baseline and an optional credentials
//! file overrides it. Lookups treat empty values as absent.

use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::{CREDENTIALS_FILE_KEY, PluginSettings, lookup};
use crate::files;
use crate::plugin::PluginConfig;

/// Directory (tenant) identifier.
pub const TENANT_ID: &str = "AZURE_TENANT_ID";
/// Application (client) identifier.
pub const CLIENT_ID: &str = "AZURE_CLIENT_ID";
/// Service principal secret.
pub const CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
/// Path to a PEM file holding the service principal certificate and key.
pub const CLIENT_CERTIFICATE_PATH: &str = "AZURE_CLIENT_CERTIFICATE_PATH";
/// Password protecting the certificate key.
pub const CLIENT_CERTIFICATE_PASSWORD: &str = "AZURE_CLIENT_CERTIFICATE_PASSWORD";
/// Whether to send the certificate chain with assertions.
pub const CLIENT_SEND_CERTIFICATE_CHAIN: &str = "AZURE_CLIENT_SEND_CERTIFICATE_CHAIN";
/// Path to a projected service-account token for workload identity.
pub const FEDERATED_TOKEN_FILE: &str = "AZURE_FEDERATED_TOKEN_FILE";
/// Authority host override injected by the workload identity webhook.
pub const AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";
/// Subscription holding the cluster's disks.
pub const SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
/// Resource group holding the cluster's disks.
pub const RESOURCE_GROUP: &str = "AZURE_RESOURCE_GROUP";
/// Cloud name (for example `AzurePublicCloud`).
pub const CLOUD_NAME: &str = "AZURE_CLOUD_NAME";
/// Conventional entry holding a storage account access key.
pub const STORAGE_ACCOUNT_ACCESS_KEY: &str = "AZURE_STORAGE_ACCOUNT_ACCESS_KEY";
/// Resource manager host serving custom-cloud metadata.
pub const METADATA_HOST: &str = "AZURE_METADATA_HOST";
/// JSON file describing a custom cloud environment.
pub const ENVIRONMENT_FILEPATH: &str = "AZURE_ENVIRONMENT_FILEPATH";
/// Override for the instance metadata endpoint used by managed identity.
pub const POD_IDENTITY_AUTHORITY_HOST: &str = "AZURE_POD_IDENTITY_AUTHORITY_HOST";

/// Errors raised while assembling or querying credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CredentialError {
    /// The credentials file could not be read.
    #[error("unable to read credentials file {path}: {message}")]
    Read {
        /// Path of the credentials file.
        path: Utf8PathBuf,
        /// Error reported by the filesystem.
        message: String,
    },
    /// A line of the credentials file is malformed.
    #[error("invalid credentials file {source_name} at line {line}: {message}")]
    Parse {
        /// Name of the parsed source.
        source_name: String,
        /// One-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },
    /// Required entries are missing or empty.
    #[error("the following keys do not have values: {}", keys.join(", "))]
    MissingValues {
        /// Missing keys in request order.
        keys: Vec<String>,
    },
    /// The entry named by `storageAccountKeyEnvVar` is empty.
    #[error("no storage account access key with key {name} found in credential")]
    MissingStorageKey {
        /// Credential entry that was consulted.
        name: String,
    },
}

/// Flat credential map.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct Credentials {
    values: BTreeMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> FromIterator<(K, V)> for Credentials
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl Credentials {
    /// Captures the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::vars().collect()
    }

    /// Returns the non-empty value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Replaces or adds entries from `overrides`.
    #[must_use]
    pub fn overlay(mut self, overrides: BTreeMap<String, String>) -> Self {
        self.values.extend(overrides);
        self
    }

    /// Returns the values for every key, or an error listing each missing
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingValues`] when any key is absent or
    /// empty.
    pub fn require(&self, keys: &[&str]) -> Result<Vec<String>, CredentialError> {
        let mut values = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.get(key) {
                Some(value) => values.push(value.to_owned()),
                None => missing.push((*key).to_owned()),
            }
        }

        if missing.is_empty() {
            Ok(values)
        } else {
            Err(CredentialError::MissingValues { keys: missing })
        }
    }

    /// Overlays the dotenv file at `path`, if any, onto `self`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Read`] or [`CredentialError::Parse`] when the
    /// file cannot be loaded.
    pub fn with_file(self, path: Option<&Utf8Path>) -> Result<Self, CredentialError> {
        let Some(file) = path else {
            return Ok(self);
        };

        let contents = files::read_to_string(file).map_err(|err| CredentialError::Read {
            path: file.to_path_buf(),
            message: err.to_string(),
        })?;
        let overrides = parse_dotenv(file.as_str(), &contents)?;
        debug!(path = %file, entries = overrides.len(), "loaded credentials file");
        Ok(self.overlay(overrides))
    }
}

/// Chooses the credentials file for a location: `credentialsFile` first,
/// then the process default.
#[must_use]
pub fn credentials_file(config: &PluginConfig, settings: &PluginSettings) -> Option<Utf8PathBuf> {
    lookup(config, CREDENTIALS_FILE_KEY)
        .or_else(|| {
            settings
                .credentials_file
                .as_deref()
                .filter(|path| !path.is_empty())
        })
        .map(Utf8PathBuf::from)
}

/// Builds the credential map for a location: the process environment
/// overlaid by the location's credentials file.
///
/// # Errors
///
/// Returns [`CredentialError`] when the credentials file cannot be loaded.
pub fn for_location(
    config: &PluginConfig,
    settings: &PluginSettings,
) -> Result<Credentials, CredentialError> {
    let path = credentials_file(config, settings);
    Credentials::from_env().with_file(path.as_deref())
}

/// Parses dotenv content into a map with the `dotenv` parser.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is
/// tolerated, quoted values are unquoted, and `$NAME` references are
/// expanded from earlier entries and the environment.
///
/// # Errors
///
/// Returns [`CredentialError::Parse`] naming the first malformed line.
pub fn parse_dotenv(
    source_name: &str,
    contents: &str,
) -> Result<BTreeMap<String, String>, CredentialError> {
    let mut values = BTreeMap::new();
    for entry in dotenv::from_read_iter(contents.as_bytes()) {
        let (key, value) = entry.map_err(|err| parse_error(source_name, contents, &err))?;
        values.insert(key, value);
    }
    Ok(values)
}

fn parse_error(source_name: &str, contents: &str, err: &dotenv::Error) -> CredentialError {
    let line = match err {
        dotenv::Error::LineParse(text, _) => contents
            .lines()
            .position(|candidate| candidate == text)
            .map_or(0, |index| index + 1),
        _ => 0,
    };
    CredentialError::Parse {
        source_name: source_name.to_owned(),
        line,
        message: err.to_string(),
    }
}
