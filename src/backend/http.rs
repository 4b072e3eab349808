use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;

use super::{ChatClient, ChatReply, ChatRequest, ChatResponse, LogPersister};
use crate::core::error::BackendError;
use crate::core::session::SessionLog;

/// Talks to the Flask-style chat server over HTTP.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    timeout: Option<Duration>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, BackendError> {
        // Trailing slash so that `join` appends instead of replacing the last segment
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .map_err(|e| BackendError::Http(format!("invalid base URL {base_url:?}: {e}")))?;

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn chat_url(&self) -> Result<Url, BackendError> {
        self.base_url
            .join("api/chat")
            .map_err(|e| BackendError::Http(e.to_string()))
    }

    /// `{base}/api/save_log/{session_id}` with the id encoded as a single segment.
    pub fn save_log_url(&self, session_id: &str) -> Result<Url, BackendError> {
        if session_id.is_empty() {
            return Err(BackendError::InvalidSessionId(session_id.into()));
        }
        let mut url = self
            .base_url
            .join("api/save_log")
            .map_err(|e| BackendError::Http(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| BackendError::Http("base URL cannot carry a path".into()))?
            .push(session_id);
        Ok(url)
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.map(|t| t.as_secs()).unwrap_or_default())
        } else {
            BackendError::Http(e.to_string())
        }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp.text().await.unwrap_or_default();
        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ChatClient for HttpBackend {
    async fn send(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply, BackendError> {
        let url = self.chat_url()?;
        tracing::debug!(%url, has_session = session_id.is_some(), "sending chat message");

        let resp = self
            .client
            .post(url)
            .json(&ChatRequest {
                message,
                session_id,
            })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let resp = Self::check_status(resp).await?;
        let body = resp.text().await.map_err(|e| self.map_send_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        Ok(parsed.into())
    }
}

#[async_trait]
impl LogPersister for HttpBackend {
    async fn persist(&self, session_id: &str, log: &SessionLog) -> Result<(), BackendError> {
        let url = self.save_log_url(session_id)?;
        tracing::debug!(%url, messages = log.message_count, "saving session log");

        let resp = self
            .client
            .post(url)
            .json(log)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        Self::check_status(resp).await?;
        Ok(())
    }
}
