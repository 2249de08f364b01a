//! JSON RPC transport shared by the backend and ledger clients.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::EndpointConfig;
use crate::domain::{RemoteError, RemoteResult};

/// Operator identity presented to remote services.
///
/// Injected into each client at construction; never read from globals.
#[derive(Clone, Default)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }

    fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(anonymous)"),
        }
    }
}

/// Result envelope used by the backend: `{"ok": T}` or `{"err": "message"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallResult<T> {
    Ok(T),
    Err(String),
}

impl<T> CallResult<T> {
    pub fn into_remote(self) -> RemoteResult<T> {
        match self {
            CallResult::Ok(value) => Ok(value),
            CallResult::Err(message) => Err(RemoteError::Rejected(message)),
        }
    }
}

/// Positional arguments of a call without parameters.
pub const NO_ARGS: [u8; 0] = [];

#[derive(Debug, Clone)]
pub struct RpcTransport {
    client: reqwest::Client,
    base_url: String,
    credential: Credential,
}

impl RpcTransport {
    pub fn new(endpoint: &EndpointConfig, credential: Credential) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs))
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            credential,
        })
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/rpc/{}", self.base_url, method)
    }

    /// Posts `args` as a JSON array to `{base}/rpc/{method}` and decodes the reply.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> RemoteResult<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        debug!(method, url = %self.base_url, "rpc call");

        let mut request = self.client.post(self.method_url(method)).json(args);
        if let Some(token) = self.credential.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(method, status, &body));
        }

        response
            .json::<R>()
            .await
            .map_err(|err| RemoteError::Decode(format!("{method}: {err}")))
    }
}

/// Maps a non-success status to a remote error.
///
/// Gateway failures, timeouts and throttling say nothing about whether the
/// call took effect, so they count as transport errors.
fn status_error(method: &str, status: StatusCode, body: &str) -> RemoteError {
    let message = format!("{method} returned {status}: {body}");
    if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        RemoteError::Transport(message)
    } else {
        RemoteError::Rejected(message)
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}
