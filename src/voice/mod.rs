//! Speech input and output behind feature-detected capabilities.
//!
//! Both directions are resolved once at startup into [`Capability`]; callers
//! match on it instead of probing the environment again.

mod command;


pub use command::{
    find_program, CommandRecognizer, CommandSynthesizer, SynthesisParams, LANGUAGE_ENV,
};

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::core::config::VoiceConfig;
use crate::core::error::VoiceError;

/// A platform capability that may or may not be present.
pub enum Capability<T: ?Sized> {
    Available(Arc<T>),
    Unavailable,
}

impl<T: ?Sized> Capability<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Capability::Available(_))
    }
}

impl<T: ?Sized> Clone for Capability<T> {
    fn clone(&self) -> Self {
        match self {
            Capability::Available(handle) => Capability::Available(Arc::clone(handle)),
            Capability::Unavailable => Capability::Unavailable,
        }
    }
}

/// Text-to-speech. At most one utterance is audible; `speak` preempts.
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), VoiceError>;
    fn stop(&self);
    fn is_speaking(&self) -> bool;
}

/// Single-utterance speech-to-text yielding the best transcript.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(
        &self,
        language: &str,
        cancel: CancellationToken,
    ) -> Result<String, VoiceError>;
}

pub struct VoiceIo {
    synthesis: Capability<dyn SpeechSynthesizer>,
    recognition: Capability<dyn SpeechRecognizer>,
    language: String,
    listening: Mutex<Option<CancellationToken>>,
}

impl VoiceIo {
    pub fn new(
        synthesis: Capability<dyn SpeechSynthesizer>,
        recognition: Capability<dyn SpeechRecognizer>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            synthesis,
            recognition,
            language: language.into(),
            listening: Mutex::new(None),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Capability::Unavailable, Capability::Unavailable, "en-US")
    }

    /// Resolves both capabilities from config. Programs that are not on
    /// `PATH` are reported once and treated as unavailable.
    pub fn detect(config: &VoiceConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let synthesis: Capability<dyn SpeechSynthesizer> =
            match config.tts_command.as_deref().and_then(find_program) {
                Some(program) => Capability::Available(Arc::new(CommandSynthesizer::new(
                    program,
                    config.tts_args.clone(),
                    SynthesisParams {
                        rate: config.rate,
                        pitch: config.pitch,
                        volume: config.volume,
                    },
                ))),
                None => {
                    if let Some(cmd) = &config.tts_command {
                        tracing::warn!(command = %cmd, "speech synthesis program not found");
                    }
                    Capability::Unavailable
                }
            };

        let recognition: Capability<dyn SpeechRecognizer> =
            match config.stt_command.as_deref().and_then(find_program) {
                Some(program) => Capability::Available(Arc::new(CommandRecognizer::new(
                    program,
                    config.stt_args.clone(),
                ))),
                None => {
                    if let Some(cmd) = &config.stt_command {
                        tracing::warn!(command = %cmd, "speech recognition program not found");
                    }
                    Capability::Unavailable
                }
            };

        tracing::debug!(
            synthesis = synthesis.is_available(),
            recognition = recognition.is_available(),
            "voice capabilities resolved"
        );

        Self::new(synthesis, recognition, config.language.clone())
    }

    pub fn can_speak(&self) -> bool {
        self.synthesis.is_available()
    }

    pub fn can_listen(&self) -> bool {
        self.recognition.is_available()
    }

    pub fn speak(&self, text: &str) {
        if let Capability::Available(tts) = &self.synthesis {
            if let Err(e) = tts.speak(text) {
                tracing::warn!(error = %e, "speech synthesis failed");
            }
        }
    }

    pub fn stop_speaking(&self) {
        if let Capability::Available(tts) = &self.synthesis {
            if tts.is_speaking() {
                tts.stop();
            }
        }
    }

    pub fn is_speaking(&self) -> bool {
        match &self.synthesis {
            Capability::Available(tts) => tts.is_speaking(),
            Capability::Unavailable => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.lock_listening().is_some()
    }

    /// Runs one recognition. The listening flag is cleared on every exit path.
    pub async fn listen(&self) -> Result<String, VoiceError> {
        let Capability::Available(stt) = &self.recognition else {
            return Err(VoiceError::Unavailable);
        };

        let cancel = {
            let mut slot = self.lock_listening();
            if slot.is_some() {
                return Err(VoiceError::AlreadyListening);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };
        let _end = ListenGuard(self);

        stt.recognize(&self.language, cancel).await
    }

    /// Aborts an active recognition; the flag clears once it has ended.
    pub fn stop_listening(&self) {
        if let Some(token) = self.lock_listening().as_ref() {
            token.cancel();
        }
    }

    fn lock_listening(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.listening
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct ListenGuard<'a>(&'a VoiceIo);

impl Drop for ListenGuard<'_> {
    fn drop(&mut self) {
        self.0.lock_listening().take();
    }
}
