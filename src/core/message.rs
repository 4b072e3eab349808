use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
    System,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Bot => "bot",
            Sender::System => "system",
        }
    }
}

/// One message in the conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(text, Sender::System)
    }
}
