mod noninteractive;
mod output;
mod repl;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::backend::create_backend;
use crate::conversation::Conversation;
use crate::core::config::{load_config, AppConfig, LogSink};
use crate::voice::VoiceIo;

#[derive(Parser, Debug)]
#[command(name = "voxchat", version, about = "Voice chat client for the terminal")]
pub struct Cli {
    /// Send these messages in order and exit (repeatable)
    #[arg(short, long = "message")]
    pub messages: Vec<String>,

    /// Chat backend base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Working directory (config lookup and relative log dir)
    #[arg(short = 'c', long = "cwd")]
    pub working_dir: Option<PathBuf>,

    /// Directory for session log files (implies --file-log)
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Write session logs to the log directory instead of the server
    #[arg(long)]
    pub file_log: bool,

    /// Disable speech input and output
    #[arg(long)]
    pub no_voice: bool,

    /// Output format for non-interactive mode
    #[arg(short = 'f', long, default_value = "text")]
    pub output_format: OutputFormat,

    /// Suppress session notices
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Command-line flags win over every config layer.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
            config.log_sink = LogSink::File;
        }
        if self.file_log {
            config.log_sink = LogSink::File;
        }
        if self.no_voice {
            config.voice.enabled = false;
        }
        if self.debug {
            config.debug = true;
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.working_dir.clone()).map_err(|e| anyhow::anyhow!("{e}"))?;
    cli.apply_to(&mut config);

    let filter = if config.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let (chat, logs) = create_backend(&config).map_err(|e| anyhow::anyhow!("{e}"))?;
    let voice = VoiceIo::detect(&config.voice);

    let (tx, rx) = mpsc::unbounded_channel();
    let conversation = Conversation::new(chat, logs, voice)
        .with_farewell_delay(config.farewell_delay())
        .with_events(tx);

    if cli.messages.is_empty() {
        repl::run(conversation, rx, config.api_base()).await
    } else {
        noninteractive::run(conversation, rx, cli.messages, cli.output_format, cli.quiet).await
    }
}
