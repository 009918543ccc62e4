//! HTTP implementation of the remote API.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{BatchOutcome, RemoteApi};
use driftsync_protocol::{BatchSyncRequest, BatchSyncResponse, NotePatch, RemoteNote};
use reqwest::StatusCode;
use std::time::Duration;

/// JSON-over-HTTP remote for the notes API.
///
/// Applies a per-request timeout independent of engine cancellation;
/// an in-flight request is never aborted by `stop_sync`, only bounded
/// by this timeout.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpRemote {
    /// Creates a remote against the given base URL.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SyncError::Protocol(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: trim_trailing_slash(base_url.into()),
            auth_token: None,
        })
    }

    /// Creates a remote using the engine configuration's request timeout.
    pub fn from_config(base_url: impl Into<String>, config: &SyncConfig) -> SyncResult<Self> {
        Self::new(base_url, config.request_timeout)
    }

    /// Attaches a bearer token to every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> SyncResult<reqwest::Response> {
        self.request(builder).send().await.map_err(map_reqwest_error)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> SyncResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::Protocol(format!("response decode failed: {e}")))
    }
}

impl RemoteApi for HttpRemote {
    async fn create_note(&self, data: &NotePatch) -> SyncResult<RemoteNote> {
        let response = self
            .send(self.client.post(self.url("/entities")).json(data))
            .await?;
        check_status(response.status())?;
        Self::decode(response).await
    }

    async fn update_note(&self, id: &str, data: &NotePatch) -> SyncResult<RemoteNote> {
        let response = self
            .send(self.client.put(self.url(&format!("/entities/{id}"))).json(data))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(format!("note {id}")));
        }
        check_status(response.status())?;
        Self::decode(response).await
    }

    async fn delete_note(&self, id: &str) -> SyncResult<()> {
        let response = self
            .send(self.client.delete(self.url(&format!("/entities/{id}"))))
            .await?;
        // Deleting an already-gone note is success.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(response.status())
    }

    async fn fetch_note(&self, id: &str) -> SyncResult<Option<RemoteNote>> {
        let response = self
            .send(self.client.get(self.url(&format!("/entities/{id}"))))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(response.status())?;
        Ok(Some(Self::decode(response).await?))
    }

    async fn batch_sync(&self, request: &BatchSyncRequest) -> SyncResult<BatchOutcome> {
        let response = self
            .send(
                self.client
                    .post(self.url("/entities/batch-sync"))
                    .json(request),
            )
            .await?;

        // The server answers a deadline overrun with 408 plus whatever
        // results it managed to complete.
        let partial_timeout = response.status() == StatusCode::REQUEST_TIMEOUT;
        if !partial_timeout {
            check_status(response.status())?;
        }
        let body: BatchSyncResponse = Self::decode(response).await?;
        Ok(BatchOutcome {
            response: body,
            partial_timeout,
        })
    }
}

fn trim_trailing_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn map_reqwest_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else {
        // Connection-level failures are worth another attempt.
        SyncError::transport_retryable(e.to_string())
    }
}

/// Classifies a non-2xx status: 5xx is retryable, other 4xx is not.
fn check_status(status: StatusCode) -> SyncResult<()> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() {
        Err(SyncError::transport_retryable(format!(
            "server responded {status}"
        )))
    } else {
        Err(SyncError::transport_fatal(format!(
            "server responded {status}"
        )))
    }
}
