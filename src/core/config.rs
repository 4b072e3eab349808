use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;

/// Default chat backend (the reference Flask server listens here)
const DEFAULT_BASE_URL: &str = "http://localhost:5000";

/// Where session logs go when a session ends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    /// POST to `{base_url}/api/save_log/{id}`
    #[default]
    Remote,
    /// Write `{log_dir}/{id}.json`
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Base URL of the chat backend
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout; 0 disables it
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause before the farewell reply
    #[serde(default = "default_farewell_delay")]
    pub farewell_delay_ms: u64,

    #[serde(default)]
    pub log_sink: LogSink,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub debug: bool,
}

fn default_working_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.into()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_farewell_delay() -> u64 {
    1000
}

fn default_log_dir() -> String {
    "logs".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            farewell_delay_ms: default_farewell_delay(),
            log_sink: LogSink::default(),
            log_dir: default_log_dir(),
            voice: VoiceConfig::default(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Text-to-speech program, e.g. `espeak-ng`
    #[serde(default)]
    pub tts_command: Option<String>,
    #[serde(default)]
    pub tts_args: Vec<String>,

    /// Speech-to-text program; records one utterance and prints the transcript
    #[serde(default)]
    pub stt_command: Option<String>,
    #[serde(default)]
    pub stt_args: Vec<String>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_rate")]
    pub rate: f32,
    #[serde(default = "default_unit")]
    pub pitch: f32,
    #[serde(default = "default_unit")]
    pub volume: f32,
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en-US".into()
}

fn default_rate() -> f32 {
    0.9
}

fn default_unit() -> f32 {
    1.0
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tts_command: None,
            tts_args: vec![],
            stt_command: None,
            stt_args: vec![],
            language: default_language(),
            rate: default_rate(),
            pitch: default_unit(),
            volume: default_unit(),
        }
    }
}

pub fn load_config(working_dir: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    let wd = working_dir.unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let mut config = AppConfig {
        working_dir: wd.clone(),
        ..AppConfig::default()
    };

    if let Some(config_dir) = dirs::config_dir() {
        let global_path = config_dir.join("voxchat").join("config.json");
        if global_path.exists() {
            merge_config(&mut config, read_config_file(&global_path)?);
        }
    }

    let local_path = wd.join("voxchat.json");
    if local_path.exists() {
        merge_config(&mut config, read_config_file(&local_path)?);
    }

    apply_env(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::File(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))
}

pub(crate) fn merge_config(base: &mut AppConfig, overlay: AppConfig) {
    if overlay.base_url != default_base_url() {
        base.base_url = overlay.base_url;
    }
    if overlay.request_timeout_secs != default_request_timeout() {
        base.request_timeout_secs = overlay.request_timeout_secs;
    }
    if overlay.farewell_delay_ms != default_farewell_delay() {
        base.farewell_delay_ms = overlay.farewell_delay_ms;
    }
    if overlay.log_sink != LogSink::default() {
        base.log_sink = overlay.log_sink;
    }
    if overlay.log_dir != default_log_dir() {
        base.log_dir = overlay.log_dir;
    }
    if !overlay.voice.enabled {
        base.voice.enabled = false;
    }
    if overlay.voice.tts_command.is_some() {
        base.voice.tts_command = overlay.voice.tts_command;
    }
    if !overlay.voice.tts_args.is_empty() {
        base.voice.tts_args = overlay.voice.tts_args;
    }
    if overlay.voice.stt_command.is_some() {
        base.voice.stt_command = overlay.voice.stt_command;
    }
    if !overlay.voice.stt_args.is_empty() {
        base.voice.stt_args = overlay.voice.stt_args;
    }
    if overlay.voice.language != default_language() {
        base.voice.language = overlay.voice.language;
    }
    if overlay.voice.rate != default_rate() {
        base.voice.rate = overlay.voice.rate;
    }
    if overlay.voice.pitch != default_unit() {
        base.voice.pitch = overlay.voice.pitch;
    }
    if overlay.voice.volume != default_unit() {
        base.voice.volume = overlay.voice.volume;
    }
    if overlay.debug {
        base.debug = true;
    }
}

pub(crate) fn apply_env(config: &mut AppConfig, var: impl Fn(&str) -> Option<String>) {
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = non_empty("VOXCHAT_BASE_URL") {
        config.base_url = url;
    }
    if let Some(dir) = non_empty("VOXCHAT_LOG_DIR") {
        config.log_dir = dir;
    }
    if let Some(tts) = non_empty("VOXCHAT_TTS") {
        config.voice.tts_command = Some(tts);
    }
    if let Some(stt) = non_empty("VOXCHAT_STT") {
        config.voice.stt_command = Some(stt);
    }
}

impl AppConfig {
    /// Base URL without a trailing slash
    pub fn api_base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn log_path(&self) -> PathBuf {
        let dir = Path::new(&self.log_dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            self.working_dir.join(dir)
        }
    }

    pub fn request_timeout(&self) -> Option<std::time::Duration> {
        (self.request_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.request_timeout_secs))
    }

    pub fn farewell_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.farewell_delay_ms)
    }
}

