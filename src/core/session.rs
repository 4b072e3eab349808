use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::message::ChatTurn;

/// The live conversation: an id, a start time and an append-only transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    id: String,
    start_time: DateTime<Utc>,
    messages: Vec<ChatTurn>,
}

impl Session {
    /// Fresh session with a locally generated, timestamp-derived id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: now.timestamp_millis().to_string(),
            start_time: now,
            messages: Vec::new(),
        }
    }

    /// Replacement for `previous` after it ended.
    ///
    /// If the previous id is itself a local (numeric) id, the new one is
    /// strictly greater, so rotations within one millisecond stay distinct.
    pub fn succeeding(previous: &Session) -> Self {
        let now = Utc::now();
        let mut millis = now.timestamp_millis();
        if let Ok(prev) = previous.id.parse::<i64>() {
            if millis <= prev {
                millis = prev + 1;
            }
        }
        Self {
            id: millis.to_string(),
            start_time: now,
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn messages(&self) -> &[ChatTurn] {
        &self.messages
    }

    pub fn push(&mut self, turn: ChatTurn) {
        self.messages.push(turn);
    }

    /// Wipes the transcript but keeps id and start time.
    pub fn clear_transcript(&mut self) {
        self.messages.clear();
    }

    /// Replaces the local placeholder id with a server-issued one.
    /// Empty ids are ignored.
    pub fn adopt_id(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !id.is_empty() {
            self.id = id;
        }
    }

    pub fn snapshot(&self) -> SessionLog {
        SessionLog {
            session_id: self.id.clone(),
            start_time: self.start_time,
            end_time: Utc::now(),
            messages: self.messages.clone(),
            message_count: self.messages.len(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Persisted snapshot of a finished session, in the log endpoint's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLog {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub messages: Vec<ChatTurn>,
    pub message_count: usize,
}
