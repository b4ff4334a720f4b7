//! Configuration loading via `ortho-config` and typed parsers for location
//! configuration values.
//!
//! Process-wide settings (the default credentials file and the log level)
//! come from the environment through [`PluginSettings`]. Per-location values
//! arrive from the backup host as a flat string map and are interpreted by
//! the helpers in this module.

use std::collections::BTreeMap;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::plugin::PluginConfig;

/// Location key naming the resource group of the storage account or snapshots.
pub const RESOURCE_GROUP_KEY: &str = "resourceGroup";
/// Location key naming the storage account.
pub const STORAGE_ACCOUNT_KEY: &str = "storageAccount";
/// Location key overriding the subscription.
pub const SUBSCRIPTION_ID_KEY: &str = "subscriptionId";
/// Location key setting the upload block size.
pub const BLOCK_SIZE_KEY: &str = "blockSizeInBytes";
/// Location key naming the credential entry holding the storage account key.
pub const STORAGE_ACCOUNT_KEY_ENV_VAR_KEY: &str = "storageAccountKeyEnvVar";
/// Location key overriding the blob service endpoint.
pub const STORAGE_ACCOUNT_URI_KEY: &str = "storageAccountURI";
/// Location key selecting Azure AD authentication for blob access.
pub const USE_AAD_KEY: &str = "useAAD";
/// Location key overriding the Azure AD authority host.
pub const ACTIVE_DIRECTORY_AUTHORITY_URI_KEY: &str = "activeDirectoryAuthorityURI";
/// Location key naming a dotenv credentials file.
pub const CREDENTIALS_FILE_KEY: &str = "credentialsFile";
/// Location key carrying an extra trusted root certificate.
pub const CA_CERT_KEY: &str = "caCert";
/// Location key marking `caCert` as base64 encoded.
pub const CA_CERT_ENCODED_KEY: &str = "caCertEncoded";
/// Location key overriding the blob service API version.
pub const API_VERSION_KEY: &str = "apiVersion";
/// Location key holding the bucket name, supplied by the host.
pub const BUCKET_KEY: &str = "bucket";
/// Location key holding the key prefix, supplied by the host.
pub const PREFIX_KEY: &str = "prefix";
/// Location key bounding long-running compute operations.
pub const API_TIMEOUT_KEY: &str = "apiTimeout";
/// Location key requesting incremental snapshots.
pub const INCREMENTAL_KEY: &str = "incremental";
/// Location key adding tags to snapshots.
pub const TAGS_KEY: &str = "tags";

/// Default upload block size, also the largest block the blob service
/// accepts (100 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 100 * 1024 * 1024;
/// Default bound on long-running compute operations.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(120);

/// Process-level settings derived from environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "AZURE")]
pub struct PluginSettings {
    /// Dotenv file holding Azure credentials. A location's `credentialsFile`
    /// takes precedence.
    pub credentials_file: Option<String>,
    /// Log filter directive for the harness binary. Defaults to `info`.
    #[ortho_config(default = "info".to_owned())]
    pub log_level: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            credentials_file: None,
            log_level: "info".to_owned(),
        }
    }
}

impl PluginSettings {
    /// Loads settings without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("velero-plugin-azure")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

/// Errors raised while loading settings or interpreting location values.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// A location value could not be interpreted.
    #[error("unable to parse value {value:?} for config key {key:?} ({expected})")]
    InvalidValue {
        /// Location key holding the value.
        key: String,
        /// Raw value supplied by the host.
        value: String,
        /// Description of the accepted format.
        expected: String,
    },
    /// A required location value is absent.
    #[error("missing configuration field: {0}")]
    MissingField(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

impl ConfigError {
    fn invalid(key: &str, value: &str, expected: &str) -> Self {
        Self::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
            expected: expected.to_owned(),
        }
    }
}

/// Returns the non-empty value stored under `key`.
#[must_use]
pub fn lookup<'a>(config: &'a PluginConfig, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

/// Reads the upload block size from `blockSizeInBytes`.
///
/// Missing values yield [`DEFAULT_BLOCK_SIZE`]. Unparsable values and values
/// outside `1..=DEFAULT_BLOCK_SIZE` fall back to it with a warning.
#[must_use]
pub fn block_size(config: &PluginConfig) -> u64 {
    let Some(raw) = lookup(config, BLOCK_SIZE_KEY) else {
        return DEFAULT_BLOCK_SIZE;
    };

    match raw.trim().parse::<i64>() {
        Ok(value) => match u64::try_from(value) {
            Ok(requested) if (1..=DEFAULT_BLOCK_SIZE).contains(&requested) => requested,
            _ => {
                warn!(
                    value,
                    max = DEFAULT_BLOCK_SIZE,
                    "block size is outside the allowed range; using the default"
                );
                DEFAULT_BLOCK_SIZE
            }
        },
        Err(err) => {
            warn!(
                value = raw,
                error = %err,
                default = DEFAULT_BLOCK_SIZE,
                "unable to parse block size; using the default"
            );
            DEFAULT_BLOCK_SIZE
        }
    }
}

/// Parses a boolean using the spellings accepted by Go's `strconv.ParseBool`.
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Reads an optional boolean location value.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] when the value is not a boolean.
pub fn optional_bool(config: &PluginConfig, key: &str) -> Result<Option<bool>, ConfigError> {
    lookup(config, key).map_or(Ok(None), |raw| {
        parse_bool(raw)
            .map(Some)
            .ok_or_else(|| ConfigError::invalid(key, raw, "expected a boolean value"))
    })
}

/// Parses a duration string such as `90s`, `2m`, `1h30m` or `1.5h`.
///
/// Negative durations are rejected.
#[must_use]
pub fn parse_duration(value: &str) -> Option<Duration> {
    let text = value.strip_prefix('+').unwrap_or(value);
    if text == "0" {
        return Some(Duration::ZERO);
    }
    if text.is_empty() {
        return None;
    }

    let mut chars = text.chars().peekable();
    let mut total: u128 = 0;
    while chars.peek().is_some() {
        let whole = take_digits(&mut chars);
        let fraction = if chars.next_if_eq(&'.').is_some() {
            take_digits(&mut chars)
        } else {
            String::new()
        };
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let mut unit = String::new();
        while let Some(ch) = chars.next_if(|ch| !ch.is_ascii_digit() && *ch != '.') {
            unit.push(ch);
        }
        let scale = unit_nanos(&unit)?;
        total = total.checked_add(component_nanos(&whole, &fraction, scale)?)?;
    }

    u64::try_from(total).ok().map(Duration::from_nanos)
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(ch) = chars.next_if(char::is_ascii_digit) {
        digits.push(ch);
    }
    digits
}

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60_000_000_000),
        "h" => Some(3_600_000_000_000),
        _ => None,
    }
}

fn component_nanos(whole: &str, fraction: &str, scale: u128) -> Option<u128> {
    let whole_value: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };
    let whole_nanos = whole_value.checked_mul(scale)?;
    if fraction.is_empty() {
        return Some(whole_nanos);
    }

    let digits = fraction.get(..fraction.len().min(18))?;
    let numerator: u128 = digits.parse().ok()?;
    let denominator = 10_u128.checked_pow(u32::try_from(digits.len()).ok()?)?;
    let fraction_nanos = numerator.checked_mul(scale)?.checked_div(denominator)?;
    whole_nanos.checked_add(fraction_nanos)
}

/// Reads `apiTimeout`, defaulting to [`DEFAULT_API_TIMEOUT`].
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] when the value is not a duration.
pub fn api_timeout(config: &PluginConfig) -> Result<Duration, ConfigError> {
    lookup(config, API_TIMEOUT_KEY).map_or(Ok(DEFAULT_API_TIMEOUT), |raw| {
        parse_duration(raw)
            .ok_or_else(|| ConfigError::invalid(API_TIMEOUT_KEY, raw, "expected a duration string"))
    })
}

/// Parses a `key1=value1,key2=value2` tag list.
///
/// Whitespace around keys and values is trimmed and empty entries are
/// skipped. Keys must be unique ignoring case.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] for entries without exactly one
/// `=` (empty entries included), empty keys, or duplicate keys.
pub fn parse_tags(value: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let invalid =
        || ConfigError::invalid(TAGS_KEY, value, "the valid format is \"key1=value1,key2=value2\"");

    let mut tags = BTreeMap::new();
    for entry in value.split(',') {
        let Some((raw_key, raw_value)) = entry.split_once('=') else {
            return Err(invalid());
        };
        if raw_value.contains('=') {
            return Err(invalid());
        }
        let key = raw_key.trim();
        if key.is_empty() {
            return Err(invalid());
        }
        if tags
            .keys()
            .any(|existing: &String| existing.eq_ignore_ascii_case(key))
        {
            return Err(invalid());
        }
        tags.insert(key.to_owned(), raw_value.trim().to_owned());
    }
    Ok(tags)
}

/// Reads the optional `tags` location value.
///
/// # Errors
///
/// Propagates [`parse_tags`] failures.
pub fn tags(config: &PluginConfig) -> Result<BTreeMap<String, String>, ConfigError> {
    lookup(config, TAGS_KEY).map_or_else(|| Ok(BTreeMap::new()), parse_tags)
}
