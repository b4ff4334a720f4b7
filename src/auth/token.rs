//! Token endpoint requests and response parsing for the credentials that
//! talk to Azure AD and the metadata service directly.

use serde::Deserialize;
use time::{Duration as TimeDuration, OffsetDateTime};

use super::{AccessToken, AuthError, Secret};

pub(super) const CLIENT_ASSERTION_TYPE: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

const DEFAULT_SCOPE_SUFFIX: &str = "/.default";

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i64),
    Text(String),
}

impl NumberOrString {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<NumberOrString>,
    #[serde(default)]
    expires_on: Option<NumberOrString>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Builds the v2 token endpoint for `tenant_id`.
pub(super) fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{tenant_id}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/')
    )
}

/// Scope in the v2 `resource/.default` form.
pub(super) fn v2_scope(scope: &str) -> String {
    if scope.ends_with(DEFAULT_SCOPE_SUFFIX) {
        return scope.to_owned();
    }
    format!("{}{DEFAULT_SCOPE_SUFFIX}", scope.trim_end_matches('/'))
}

/// Resource URI the metadata service expects for `scope`.
pub(super) fn resource(scope: &str) -> &str {
    scope.strip_suffix(DEFAULT_SCOPE_SUFFIX).unwrap_or(scope)
}

/// POSTs a `client_credentials` form to `endpoint`.
pub(super) async fn request_client_credentials(
    http: &reqwest::Client,
    endpoint: &str,
    form: &[(&str, &str)],
) -> Result<AccessToken, AuthError> {
    let mut fields = vec![("grant_type", "client_credentials")];
    fields.extend_from_slice(form);
    let response = http
        .post(endpoint)
        .form(&fields)
        .send()
        .await
        .map_err(|err| AuthError::Request {
            endpoint: endpoint.to_owned(),
            message: err.to_string(),
        })?;
    read_token(endpoint, response).await
}

/// Interprets a token endpoint response.
pub(super) async fn read_token(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<AccessToken, AuthError> {
    let status = response.status();
    let body = response.bytes().await.map_err(|err| AuthError::Request {
        endpoint: endpoint.to_owned(),
        message: err.to_string(),
    })?;

    if !status.is_success() {
        return Err(AuthError::Rejected {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
            message: error_message(&body),
        });
    }

    parse_token(endpoint, &body, OffsetDateTime::now_utc())
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<TokenErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.error_description.or(parsed.error))
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

/// Parses a token body, computing the expiry relative to `now`.
pub(super) fn parse_token(
    endpoint: &str,
    body: &[u8],
    now: OffsetDateTime,
) -> Result<AccessToken, AuthError> {
    let invalid = |message: String| AuthError::InvalidResponse {
        endpoint: endpoint.to_owned(),
        message,
    };
    let parsed: TokenResponse =
        serde_json::from_slice(body).map_err(|err| invalid(err.to_string()))?;

    let expires_in = parsed.expires_in.as_ref().and_then(NumberOrString::as_i64);
    let expires_on = parsed.expires_on.as_ref().and_then(NumberOrString::as_i64);
    let expires_at = match (expires_in, expires_on) {
        (Some(seconds), _) => now
            .checked_add(TimeDuration::seconds(seconds))
            .ok_or_else(|| invalid(format!("expires_in out of range: {seconds}")))?,
        (None, Some(epoch)) => OffsetDateTime::from_unix_timestamp(epoch)
            .map_err(|_| invalid(format!("expires_on out of range: {epoch}")))?,
        (None, None) => return Err(invalid("token response carries no expiry".to_owned())),
    };

    Ok(AccessToken::new(Secret::new(parsed.access_token), expires_at))
}
