use crate::core::message::ChatTurn;

/// Notifications for the front end, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    TurnAppended(ChatTurn),
    Cleared,
    SessionIdAdopted(String),
    SessionRotated { previous: String, next: String },
    LogPersisted { session_id: String },
    LogFailed { session_id: String, error: String },
}
