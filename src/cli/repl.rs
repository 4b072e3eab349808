use anyhow::Result;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use super::output;
use crate::conversation::{Conversation, ConversationEvent, IgnoreReason, SubmitOutcome};

type Events = mpsc::UnboundedReceiver<ConversationEvent>;

pub async fn run(conversation: Conversation, mut events: Events, base_url: &str) -> Result<()> {
    println!("\x1b[1mvoxchat\x1b[0m v{}", env!("CARGO_PKG_VERSION"));
    println!("Backend: \x1b[36m{base_url}\x1b[0m");
    println!(
        "Voice: speech {} / listening {}",
        on_off(conversation.voice().can_speak()),
        on_off(conversation.voice().can_listen()),
    );
    println!("Type \x1b[33m/help\x1b[0m for commands. Say \x1b[33mbye\x1b[0m to end the session.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("\x1b[32;1myou>\x1b[0m ");
        io::stderr().flush().ok();

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                None
            }
        };
        let Some(line) = line else {
            // EOF (Ctrl-D) or Ctrl-C
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.starts_with('/') {
            match handle_command(input, &conversation, &mut events).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    eprintln!("\x1b[31mCommand error: {e}\x1b[0m");
                    continue;
                }
            }
        }

        submit(&conversation, input, &mut events).await;
    }

    conversation.stop_speaking();
    if let Some(log) = conversation.end_session().await {
        tracing::debug!(session_id = %log.session_id, "flushed session on exit");
    }
    output::drain(&mut events, false);
    Ok(())
}

async fn submit(conversation: &Conversation, input: &str, events: &mut Events) {
    tokio::select! {
        outcome = conversation.submit(input) => {
            if outcome == SubmitOutcome::Ignored(IgnoreReason::InFlight) {
                eprintln!("\x1b[90mStill waiting for the previous reply.\x1b[0m");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\n\x1b[90m[cancelled]\x1b[0m");
        }
    }
    output::drain(events, false);
}

async fn handle_command(
    input: &str,
    conversation: &Conversation,
    events: &mut Events,
) -> Result<bool> {
    match input {
        "/help" | "/h" => {
            println!("\x1b[1mCommands:\x1b[0m");
            println!("  /help       Show this help");
            println!("  /clear      Clear the conversation (same session)");
            println!("  /listen     Speak one message instead of typing");
            println!("  /stop       Stop speaking");
            println!("  /session    Show session details");
            println!("  /quit       Save the session log and exit");
            Ok(true)
        }
        "/quit" | "/exit" | "/q" => Ok(false),
        "/clear" => {
            conversation.clear();
            output::drain(events, false);
            Ok(true)
        }
        "/stop" => {
            conversation.stop_speaking();
            Ok(true)
        }
        "/session" => {
            let session = conversation.session();
            println!("Session:  {}", session.id());
            println!(
                "Server:   {}",
                conversation
                    .remote_session_id()
                    .unwrap_or_else(|| "(not assigned yet)".into())
            );
            println!("Started:  {}", session.start_time().to_rfc3339());
            println!("Turns:    {}", session.messages().len());
            Ok(true)
        }
        "/listen" => {
            if !conversation.voice().can_listen() {
                anyhow::bail!("speech input unavailable; set voice.stt_command or VOXCHAT_STT");
            }
            eprintln!("\x1b[90mListening... (Ctrl-C to stop)\x1b[0m");
            let heard = tokio::select! {
                heard = conversation.listen() => heard,
                _ = tokio::signal::ctrl_c() => {
                    conversation.stop_listening();
                    None
                }
            };
            output::drain(events, false);
            if let Some(text) = heard {
                println!("\x1b[32;1myou>\x1b[0m {text}");
                submit(conversation, &text, events).await;
            }
            Ok(true)
        }
        _ => {
            eprintln!("Unknown command: {input}. Type /help for available commands.");
            Ok(true)
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
