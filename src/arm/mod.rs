//! Azure Resource Manager access: authenticated JSON calls and polling of
//! long-running operations.

pub mod compute;
pub mod storage;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, LOCATION};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{sleep, timeout as within};
use tracing::debug;

use crate::auth::{AuthError, TokenCredential, bearer_token};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Errors raised by Resource Manager calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ArmError {
    /// The request could not be sent or its body could not be read.
    #[error("request to {url} failed: {message}")]
    Request {
        /// Target URL.
        url: String,
        /// Transport error.
        message: String,
    },
    /// Resource Manager answered with an error status.
    #[error("request to {url} failed with status {status} ({code}): {message}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Error code from the body, or `unknown`.
        code: String,
        /// Error message from the body, or the raw body.
        message: String,
    },
    /// The response body could not be interpreted.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// Target URL.
        url: String,
        /// Parse failure.
        message: String,
    },
    /// A long-running operation finished unsuccessfully.
    #[error("operation on {url} ended with status {status}: {message}")]
    OperationFailed {
        /// Resource URL.
        url: String,
        /// Terminal status reported by the service.
        status: String,
        /// Error message reported by the service.
        message: String,
    },
    /// A call and its long-running operation did not finish in time.
    #[error("timed out after {seconds}s waiting for operation on {url}")]
    Timeout {
        /// Resource URL.
        url: String,
        /// Timeout that elapsed.
        seconds: u64,
    },
    /// Acquiring a token failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ArmError {
    /// Whether the error is a `404 Not Found` answer.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Authenticated Resource Manager client.
#[derive(Clone)]
pub struct ArmClient {
    endpoint: String,
    scope: String,
    credential: Arc<dyn TokenCredential>,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl fmt::Debug for ArmClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmClient")
            .field("endpoint", &self.endpoint)
            .field("scope", &self.scope)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl ArmClient {
    /// Creates a client for `endpoint` requesting tokens for `scope`.
    #[must_use]
    pub fn new(
        endpoint: &str,
        scope: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            scope: scope.into(),
            credential,
            http,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Overrides the delay between long-running operation polls.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str, api_version: &str) -> String {
        format!("{}{path}?api-version={api_version}", self.endpoint)
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ArmError> {
        let token = bearer_token(self.credential.as_ref(), &self.scope).await?;
        let payload = body.map(Value::to_string).unwrap_or_default();
        let request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        let response = request.send().await.map_err(|err| ArmError::Request {
            url: url.to_owned(),
            message: err.to_string(),
        })?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(status_error(url, response).await)
    }

    /// GETs `path` and decodes the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] when the call fails or the body does not decode.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<T, ArmError> {
        let url = self.url(path, api_version);
        let response = self.send(Method::GET, &url, None).await?;
        decode(&url, response).await
    }

    /// POSTs an empty body to the action at `path` and decodes the result.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] when the call fails or the body does not decode.
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        api_version: &str,
    ) -> Result<T, ArmError> {
        let url = self.url(path, api_version);
        let response = self.send(Method::POST, &url, None).await?;
        decode(&url, response).await
    }

    /// PUTs `resource` to `path` and waits up to `timeout` for provisioning.
    /// The timeout covers the PUT itself as well as polling.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] when the call fails, the operation fails, or the
    /// timeout elapses.
    pub async fn put_and_wait<T: Serialize + Sync>(
        &self,
        path: &str,
        api_version: &str,
        resource: &T,
        timeout: Duration,
    ) -> Result<(), ArmError> {
        let url = self.url(path, api_version);
        let body = serde_json::to_value(resource).map_err(|err| ArmError::InvalidResponse {
            url: url.clone(),
            message: err.to_string(),
        })?;
        let operation = async {
            let response = self.send(Method::PUT, &url, Some(&body)).await?;
            self.wait_for_completion(&url, response, true).await
        };
        within(timeout, operation)
            .await
            .map_err(|_| timeout_error(&url, timeout))?
    }

    /// DELETEs `path` and waits up to `timeout` for the deletion.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] when the call fails, the operation fails, or the
    /// timeout elapses.
    pub async fn delete_and_wait(
        &self,
        path: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<(), ArmError> {
        let url = self.url(path, api_version);
        let operation = async {
            let response = self.send(Method::DELETE, &url, None).await?;
            self.wait_for_completion(&url, response, false).await
        };
        within(timeout, operation)
            .await
            .map_err(|_| timeout_error(&url, timeout))?
    }

    async fn wait_for_completion(
        &self,
        url: &str,
        response: reqwest::Response,
        track_provisioning: bool,
    ) -> Result<(), ArmError> {
        let status = response.status();
        let headers = response.headers().clone();

        if let Some(operation) = header(&headers, ASYNC_OPERATION_HEADER) {
            debug!(url, operation = %operation, "polling async operation");
            return self.poll_async_operation(url, &operation).await;
        }
        if let Some(location) = header(&headers, LOCATION.as_str())
            .filter(|_| status == StatusCode::ACCEPTED)
        {
            debug!(url, location = %location, "polling operation location");
            return self.poll_location(&location).await;
        }
        if !track_provisioning {
            return Ok(());
        }

        let raw = read_body(url, response).await?;
        if raw.is_empty() {
            return Ok(());
        }
        let body: Value = parse_json(url, &raw)?;
        match provisioning_state(&body) {
            Some(state) if !is_terminal(&state) => self.poll_provisioning(url).await,
            Some(state) => terminal_result(url, &state, &body),
            None => Ok(()),
        }
    }

    async fn poll_async_operation(&self, url: &str, operation: &str) -> Result<(), ArmError> {
        loop {
            let response = self.send(Method::GET, operation, None).await?;
            let body: Value = decode(operation, response).await?;
            let status = body
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            if is_terminal(&status) {
                return terminal_result(url, &status, &body);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn poll_location(&self, location: &str) -> Result<(), ArmError> {
        loop {
            let response = self.send(Method::GET, location, None).await?;
            if response.status() != StatusCode::ACCEPTED {
                return Ok(());
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn poll_provisioning(&self, url: &str) -> Result<(), ArmError> {
        loop {
            sleep(self.poll_interval).await;
            let response = self.send(Method::GET, url, None).await?;
            let body: Value = decode(url, response).await?;
            if let Some(state) = provisioning_state(&body).filter(|state| is_terminal(state)) {
                return terminal_result(url, &state, &body);
            }
        }
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn provisioning_state(body: &Value) -> Option<String> {
    body.pointer("/properties/provisioningState")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

fn is_terminal(state: &str) -> bool {
    ["Succeeded", "Failed", "Canceled"]
        .iter()
        .any(|terminal| terminal.eq_ignore_ascii_case(state))
}

fn terminal_result(url: &str, state: &str, body: &Value) -> Result<(), ArmError> {
    if state.eq_ignore_ascii_case("Succeeded") {
        return Ok(());
    }
    let message = body
        .pointer("/error/message")
        .and_then(Value::as_str)
        .unwrap_or("no error details returned")
        .to_owned();
    Err(ArmError::OperationFailed {
        url: url.to_owned(),
        status: state.to_owned(),
        message,
    })
}

fn timeout_error(url: &str, timeout: Duration) -> ArmError {
    ArmError::Timeout {
        url: url.to_owned(),
        seconds: timeout.as_secs(),
    }
}

async fn read_body(url: &str, response: reqwest::Response) -> Result<bytes::Bytes, ArmError> {
    response.bytes().await.map_err(|err| ArmError::Request {
        url: url.to_owned(),
        message: err.to_string(),
    })
}

fn parse_json<T: DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, ArmError> {
    serde_json::from_slice(body).map_err(|err| ArmError::InvalidResponse {
        url: url.to_owned(),
        message: err.to_string(),
    })
}

async fn decode<T: DeserializeOwned>(url: &str, response: reqwest::Response) -> Result<T, ArmError> {
    let body = read_body(url, response).await?;
    parse_json(url, &body)
}

async fn status_error(url: &str, response: reqwest::Response) -> ArmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<ErrorEnvelope>(&body)
        .ok()
        .and_then(|envelope| envelope.error);
    let (code, message) = parsed.map_or((None, None), |error| (error.code, error.message));
    ArmError::Status {
        url: url.to_owned(),
        status,
        code: code.unwrap_or_else(|| "unknown".to_owned()),
        message: message.unwrap_or(body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("Succeeded", true)]
    #[case("failed", true)]
    #[case("Canceled", true)]
    #[case("Creating", false)]
    #[case("InProgress", false)]
    fn terminal_states(#[case] state: &str, #[case] terminal: bool) {
        assert_eq!(is_terminal(state), terminal);
    }

    #[rstest]
    fn failed_operations_carry_the_service_message() {
        let body = json!({"status": "Failed", "error": {"code": "Conflict", "message": "disk busy"}});
        let err = terminal_result("https://arm/disk", "Failed", &body)
            .expect_err("failed state should error");
        assert_eq!(
            err,
            ArmError::OperationFailed {
                url: "https://arm/disk".to_owned(),
                status: "Failed".to_owned(),
                message: "disk busy".to_owned(),
            }
        );
    }

    #[rstest]
    fn provisioning_state_is_read_from_properties() {
        let body = json!({"properties": {"provisioningState": "Updating"}});
        assert_eq!(provisioning_state(&body).as_deref(), Some("Updating"));
        assert_eq!(provisioning_state(&json!({})), None);
    }

    #[rstest]
    fn not_found_is_detected_from_status() {
        let err = ArmError::Status {
            url: String::new(),
            status: 404,
            code: "ResourceNotFound".to_owned(),
            message: String::new(),
        };
        assert!(err.is_not_found());
    }
}
