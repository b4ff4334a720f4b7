//! Resolves how the object store reaches its storage account.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::ObjectStoreError;
use crate::arm::ArmClient;
use crate::arm::storage::{self, StorageAccountKey};
use crate::auth::{TokenCredential, token_credential};
use crate::blob::{AzureBlobService, BlobAuth};
use crate::cloud::{self, CloudConfiguration};
use crate::config::{
    API_VERSION_KEY, ConfigError, PluginSettings, RESOURCE_GROUP_KEY, STORAGE_ACCOUNT_KEY,
    STORAGE_ACCOUNT_KEY_ENV_VAR_KEY, STORAGE_ACCOUNT_URI_KEY, SUBSCRIPTION_ID_KEY, USE_AAD_KEY,
    lookup, optional_bool,
};
use crate::credentials::{self, CredentialError, Credentials, RESOURCE_GROUP, SUBSCRIPTION_ID};
use crate::http::{ca_certificate, client_with_roots};
use crate::plugin::PluginConfig;

/// Subscription and resource group holding the storage account.
struct AccountScope<'a> {
    subscription: &'a str,
    resource_group: &'a str,
}

fn account_scope<'a>(config: &'a PluginConfig, creds: &'a Credentials) -> Option<AccountScope<'a>> {
    let subscription = lookup(config, SUBSCRIPTION_ID_KEY).or_else(|| creds.get(SUBSCRIPTION_ID))?;
    let resource_group = lookup(config, RESOURCE_GROUP_KEY).or_else(|| creds.get(RESOURCE_GROUP))?;
    Some(AccountScope {
        subscription,
        resource_group,
    })
}

fn arm_client(
    cloud: &CloudConfiguration,
    credential: Arc<dyn TokenCredential>,
    http: &reqwest::Client,
) -> ArmClient {
    ArmClient::new(
        &cloud.resource_manager_endpoint,
        cloud.resource_manager_scope(),
        credential,
        http.clone(),
    )
}

/// Picks the first key with full permissions.
pub(super) fn full_access_key(keys: Vec<StorageAccountKey>) -> Result<String, ObjectStoreError> {
    if keys.is_empty() {
        return Err(ObjectStoreError::NoStorageKeys);
    }
    keys.into_iter()
        .find(|key| key.permissions.eq_ignore_ascii_case("full"))
        .map(|key| key.value)
        .ok_or(ObjectStoreError::NoFullAccessKey)
}

/// Builds the blob client described by a location.
pub(super) async fn connect(
    config: &PluginConfig,
    settings: &PluginSettings,
) -> Result<AzureBlobService, ObjectStoreError> {
    let creds = credentials::for_location(config, settings)?;
    let account = lookup(config, STORAGE_ACCOUNT_KEY)
        .ok_or_else(|| ConfigError::MissingField(STORAGE_ACCOUNT_KEY.to_owned()))?;
    let http = client_with_roots(ca_certificate(config)?.as_deref())?;
    let cloud = cloud::resolve(config, &creds, &http).await?;

    let (auth, arm) = storage_auth(config, &creds, &cloud, &http, account).await?;
    let endpoint = blob_endpoint(config, &creds, &cloud, arm.as_ref(), account).await;
    debug!(account, endpoint = %endpoint, "resolved blob endpoint");

    if let Some(version) = lookup(config, API_VERSION_KEY) {
        warn!(
            account,
            version, "apiVersion is ignored; blob requests use the storage SDK's service version"
        );
    }

    Ok(AzureBlobService::new(&endpoint, account, auth, http)?)
}

/// Chooses between the configured account key, Azure AD, and a key fetched
/// with `listKeys`. The Resource Manager client is returned when one was
/// built so endpoint discovery can reuse it.
async fn storage_auth(
    config: &PluginConfig,
    creds: &Credentials,
    cloud: &CloudConfiguration,
    http: &reqwest::Client,
    account: &str,
) -> Result<(BlobAuth, Option<ArmClient>), ObjectStoreError> {
    if let Some(key_name) = lookup(config, STORAGE_ACCOUNT_KEY_ENV_VAR_KEY) {
        let key = creds
            .get(key_name)
            .ok_or_else(|| CredentialError::MissingStorageKey {
                name: key_name.to_owned(),
            })?;
        debug!(account, key_name, "using storage account key from credentials");
        return Ok((BlobAuth::shared_key(key)?, None));
    }

    let credential: Arc<dyn TokenCredential> = token_credential(creds, cloud, http)?;
    let arm = arm_client(cloud, Arc::clone(&credential), http);
    if optional_bool(config, USE_AAD_KEY)?.unwrap_or(false) {
        debug!(account, "using Azure AD authentication for blob access");
        return Ok((BlobAuth::Bearer(credential), Some(arm)));
    }

    let scope = account_scope(config, creds).ok_or_else(|| CredentialError::MissingValues {
        keys: vec![SUBSCRIPTION_ID.to_owned(), RESOURCE_GROUP.to_owned()],
    })?;
    let keys = storage::list_keys(&arm, scope.subscription, scope.resource_group, account).await?;
    let key = full_access_key(keys)?;
    debug!(account, "using storage account key from listKeys");
    Ok((BlobAuth::shared_key(&key)?, Some(arm)))
}

/// `storageAccountURI` when set, else the endpoint Resource Manager reports
/// for the account, else the cloud's default endpoint.
async fn blob_endpoint(
    config: &PluginConfig,
    creds: &Credentials,
    cloud: &CloudConfiguration,
    arm: Option<&ArmClient>,
    account: &str,
) -> String {
    if let Some(uri) = lookup(config, STORAGE_ACCOUNT_URI_KEY) {
        return uri.to_owned();
    }
    let fallback = cloud.blob_endpoint(account);
    let (Some(client), Some(scope)) = (arm, account_scope(config, creds)) else {
        return fallback;
    };
    match storage::blob_endpoint(client, scope.subscription, scope.resource_group, account).await {
        Ok(Some(endpoint)) => endpoint,
        Ok(None) => fallback,
        Err(err) => {
            info!(
                account,
                error = %err,
                fallback = %fallback,
                "unable to read storage account endpoint; using the default"
            );
            fallback
        }
    }
}
