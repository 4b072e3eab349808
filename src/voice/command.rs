use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{SpeechRecognizer, SpeechSynthesizer};
use crate::core::error::VoiceError;

/// espeak's default speaking rate in words per minute
const ESPEAK_BASE_WPM: f32 = 175.0;

/// Environment variable carrying the recognition language to the STT program
pub const LANGUAGE_ENV: &str = "VOXCHAT_LANGUAGE";

/// Resolves `name` to an executable path, searching `PATH` for bare names.
pub fn find_program(name: &str) -> Option<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|p| p.is_file())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            rate: 0.9,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

struct Utterance {
    cancel: CancellationToken,
    done: Arc<AtomicBool>,
}

/// Speaks through an external TTS program, one process per utterance.
pub struct CommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
    params: SynthesisParams,
    current: Mutex<Option<Utterance>>,
}

impl CommandSynthesizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, params: SynthesisParams) -> Self {
        Self {
            program: program.into(),
            args,
            params,
            current: Mutex::new(None),
        }
    }

    fn is_espeak(&self) -> bool {
        self.program
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s.starts_with("espeak"))
    }

    pub fn command_args(&self, text: &str) -> Vec<String> {
        let mut args = self.args.clone();
        if self.is_espeak() {
            let rate = (ESPEAK_BASE_WPM * self.params.rate).round().max(80.0);
            let pitch = (50.0 * self.params.pitch).round().clamp(0.0, 99.0);
            let volume = (100.0 * self.params.volume).round().clamp(0.0, 200.0);
            args.extend([
                "-s".to_string(),
                format!("{rate}"),
                "-p".to_string(),
                format!("{pitch}"),
                "-a".to_string(),
                format!("{volume}"),
            ]);
        }
        args.push(text.to_string());
        args
    }

    fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<Utterance>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn speak(&self, text: &str) -> Result<(), VoiceError> {
        self.stop();

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| VoiceError::Synthesis(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(self.command_args(text))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Synthesis(format!("{}: {e}", self.program.display())))?;

        let cancel = CancellationToken::new();
        let done = Arc::new(AtomicBool::new(false));
        *self.lock_current() = Some(Utterance {
            cancel: cancel.clone(),
            done: Arc::clone(&done),
        });

        runtime.spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    if let Ok(status) = status {
                        if !status.success() {
                            tracing::debug!(%status, "speech program exited with failure");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                }
            }
            done.store(true, Ordering::Release);
        });

        Ok(())
    }

    fn stop(&self) {
        if let Some(utterance) = self.lock_current().take() {
            utterance.cancel.cancel();
        }
    }

    fn is_speaking(&self) -> bool {
        self.lock_current()
            .as_ref()
            .is_some_and(|u| !u.done.load(Ordering::Acquire))
    }
}

/// Records one utterance through an external STT program that prints the
/// transcript on stdout.
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl SpeechRecognizer for CommandRecognizer {
    async fn recognize(
        &self,
        language: &str,
        cancel: CancellationToken,
    ) -> Result<String, VoiceError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .env(LANGUAGE_ENV, language)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VoiceError::Recognition(format!("{}: {e}", self.program.display())))?;

        // Dropping the pending wait kills the child
        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| VoiceError::Recognition(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(VoiceError::Aborted),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(VoiceError::Recognition(format!(
                "exit code {code}: {}",
                stderr.trim()
            )));
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(VoiceError::NoSpeech)
    }
}
