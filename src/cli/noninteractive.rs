use anyhow::Result;
use tokio::sync::mpsc;

use super::{output, OutputFormat};
use crate::conversation::{Conversation, ConversationEvent, SubmitOutcome};

pub async fn run(
    conversation: Conversation,
    mut events: mpsc::UnboundedReceiver<ConversationEvent>,
    messages: Vec<String>,
    output_format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let mut logs = Vec::new();

    for message in &messages {
        let outcome = conversation.submit(message).await;
        if let SubmitOutcome::SessionEnded { log, .. } = outcome {
            logs.push(log);
        }
        if matches!(output_format, OutputFormat::Text) {
            output::drain(&mut events, quiet);
        }
    }

    conversation.stop_speaking();
    if let Some(log) = conversation.end_session().await {
        logs.push(log);
    }

    match output_format {
        OutputFormat::Text => output::drain(&mut events, quiet),
        OutputFormat::Json => {
            let output = serde_json::json!({
                "messages": conversation.messages(),
                "sessions": logs,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
