//! Storage account lookups in `Microsoft.Storage`.

use serde::Deserialize;

use super::{ArmClient, ArmError};

/// Storage API version used for account lookups.
pub const STORAGE_API_VERSION: &str = "2023-01-01";

fn account_path(subscription: &str, resource_group: &str, account: &str) -> String {
    format!(
        "/subscriptions/{subscription}/resourceGroups/{resource_group}/providers/Microsoft.Storage/storageAccounts/{account}"
    )
}

/// One access key of a storage account.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountKey {
    /// Key name, for example `key1`.
    #[serde(default)]
    pub key_name: String,
    /// Base64 key material.
    #[serde(default)]
    pub value: String,
    /// `Full` or `Read`.
    #[serde(default)]
    pub permissions: String,
}

#[derive(Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<StorageAccountKey>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountProperties {
    #[serde(default)]
    primary_endpoints: Option<Endpoints>,
}

#[derive(Deserialize)]
struct Endpoints {
    #[serde(default)]
    blob: Option<String>,
}

#[derive(Deserialize)]
struct Account {
    #[serde(default)]
    properties: Option<AccountProperties>,
}

/// Lists the access keys of `account`.
///
/// # Errors
///
/// Returns [`ArmError`] when the `listKeys` action fails.
pub async fn list_keys(
    arm: &ArmClient,
    subscription: &str,
    resource_group: &str,
    account: &str,
) -> Result<Vec<StorageAccountKey>, ArmError> {
    let path = format!(
        "{}/listKeys",
        account_path(subscription, resource_group, account)
    );
    let list: KeyList = arm.post(&path, STORAGE_API_VERSION).await?;
    Ok(list.keys)
}

/// Returns the primary blob endpoint of `account`, if the service reports
/// one.
///
/// # Errors
///
/// Returns [`ArmError`] when the account cannot be read.
pub async fn blob_endpoint(
    arm: &ArmClient,
    subscription: &str,
    resource_group: &str,
    account: &str,
) -> Result<Option<String>, ArmError> {
    let properties: Account = arm
        .get(
            &account_path(subscription, resource_group, account),
            STORAGE_API_VERSION,
        )
        .await?;
    Ok(properties
        .properties
        .and_then(|props| props.primary_endpoints)
        .and_then(|endpoints| endpoints.blob)
        .filter(|blob| !blob.is_empty()))
}
