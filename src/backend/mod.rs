mod file;
mod http;

#[cfg(test)]
mod tests;

pub use file::FileLogPersister;
pub use http::HttpBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::config::{AppConfig, LogSink};
use crate::core::error::BackendError;
use crate::core::session::SessionLog;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    /// Serialized as `null` until the backend has issued an id.
    pub session_id: Option<&'a str>,
}

/// Response of `POST /api/chat`. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub reply: String,
    pub session_id: Option<String>,
}

impl From<ChatResponse> for ChatReply {
    fn from(resp: ChatResponse) -> Self {
        Self {
            reply: resp.response,
            session_id: resp.session_id.filter(|id| !id.is_empty()),
        }
    }
}

/// Stateless request/response adapter to the chat backend. No retries.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(
        &self,
        message: &str,
        session_id: Option<&str>,
    ) -> Result<ChatReply, BackendError>;
}

/// One-shot submission of a finished session's log.
#[async_trait]
pub trait LogPersister: Send + Sync {
    async fn persist(&self, session_id: &str, log: &SessionLog) -> Result<(), BackendError>;
}

/// Builds the chat client and the log persister selected by `config.log_sink`.
pub fn create_backend(
    config: &AppConfig,
) -> Result<(Arc<dyn ChatClient>, Arc<dyn LogPersister>), BackendError> {
    let http = Arc::new(HttpBackend::new(config.api_base(), config.request_timeout())?);

    let persister: Arc<dyn LogPersister> = match config.log_sink {
        LogSink::Remote => http.clone(),
        LogSink::File => Arc::new(FileLogPersister::new(config.log_path())),
    };
    let chat: Arc<dyn ChatClient> = http;

    Ok((chat, persister))
}
