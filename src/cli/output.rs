use std::io::{self, Write};
use tokio::sync::mpsc;

use crate::conversation::ConversationEvent;
use crate::core::message::{ChatTurn, Sender};

/// Renders every event queued so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<ConversationEvent>, quiet: bool) {
    while let Ok(event) = rx.try_recv() {
        render_event(&event, quiet);
    }
    io::stdout().flush().ok();
}

pub fn render_event(event: &ConversationEvent, quiet: bool) {
    match event {
        // Typed input is already on screen
        ConversationEvent::TurnAppended(ChatTurn {
            sender: Sender::User,
            ..
        }) => {}
        ConversationEvent::TurnAppended(turn) => render_turn(turn),
        ConversationEvent::Cleared => {
            eprintln!("\x1b[90mConversation cleared.\x1b[0m");
        }
        ConversationEvent::SessionIdAdopted(id) => {
            if !quiet {
                eprintln!("\x1b[90m[session {}]\x1b[0m", short_id(id));
            }
        }
        ConversationEvent::SessionRotated { previous, next } => {
            if !quiet {
                eprintln!(
                    "\x1b[90m[session {} ended, new session {}]\x1b[0m",
                    short_id(previous),
                    short_id(next)
                );
            }
        }
        ConversationEvent::LogPersisted { session_id } => {
            if !quiet {
                eprintln!("\x1b[90m[log saved: {}]\x1b[0m", short_id(session_id));
            }
        }
        ConversationEvent::LogFailed { error, .. } => {
            tracing::debug!(%error, "log save failed");
        }
    }
}

pub fn render_turn(turn: &ChatTurn) {
    match turn.sender {
        Sender::Bot => println!("\x1b[36;1mbot>\x1b[0m {}", turn.text),
        Sender::System => eprintln!("\x1b[33m[system]\x1b[0m {}", turn.text),
        Sender::User => println!("\x1b[32;1myou>\x1b[0m {}", turn.text),
    }
}

/// Last six characters, enough to tell sessions apart on screen.
pub fn short_id(id: &str) -> &str {
    let start = id
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &id[start..]
}
