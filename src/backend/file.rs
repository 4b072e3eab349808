use async_trait::async_trait;
use std::path::PathBuf;

use super::LogPersister;
use crate::core::error::BackendError;
use crate::core::session::SessionLog;

/// Writes each finished session to `{dir}/{session_id}.json`.
pub struct FileLogPersister {
    dir: PathBuf,
}

impl FileLogPersister {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target file for `session_id`; ids that could escape the directory are rejected.
    pub fn path_for(&self, session_id: &str) -> Result<PathBuf, BackendError> {
        let invalid = session_id.is_empty()
            || session_id == "."
            || session_id == ".."
            || session_id.contains(['/', '\\', '\0']);
        if invalid {
            return Err(BackendError::InvalidSessionId(session_id.into()));
        }
        Ok(self.dir.join(format!("{session_id}.json")))
    }
}

#[async_trait]
impl LogPersister for FileLogPersister {
    async fn persist(&self, session_id: &str, log: &SessionLog) -> Result<(), BackendError> {
        let path = self.path_for(session_id)?;
        let body = serde_json::to_string_pretty(log)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| BackendError::Io(e.to_string()))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| BackendError::Io(format!("{}: {e}", path.display())))?;

        tracing::debug!(path = %path.display(), "session log written");
        Ok(())
    }
}
