//! Conversation controller: owns the live session and mediates between user
//! input, the chat backend, the log persister and voice output.

mod event;
mod goodbye;


pub use event::ConversationEvent;
pub use goodbye::is_goodbye;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::backend::{ChatClient, LogPersister};
use crate::core::error::VoiceError;
use crate::core::message::ChatTurn;
use crate::core::session::{Session, SessionLog};
use crate::voice::VoiceIo;

pub const FAREWELL: &str = "Goodbye!";
pub const APOLOGY: &str = "Sorry, there was an error connecting to the chatbot.";
pub const LOG_SAVE_FAILED: &str = "Failed to save chat log to server.";

const DEFAULT_FAREWELL_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Blank,
    InFlight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing was appended
    Ignored(IgnoreReason),
    /// The backend answered and the reply was appended
    Replied,
    /// The backend failed and the apology was appended instead
    Degraded,
    /// The transcript was cleared or rotated while the request was pending
    Discarded,
    /// A goodbye ended the session; `log` is what was submitted
    SessionEnded { log: SessionLog, persisted: bool },
}

struct State {
    session: Session,
    /// Id issued by the backend; sent with every request once known
    remote_session_id: Option<String>,
    /// What the user sees; survives session rotation, unlike the transcript
    visible: Vec<ChatTurn>,
    pending_input: String,
    /// Bumped on clear and rotation so late replies can be recognised
    generation: u64,
}

pub struct Conversation {
    chat: Arc<dyn ChatClient>,
    logs: Arc<dyn LogPersister>,
    voice: VoiceIo,
    farewell_delay: Duration,
    state: Mutex<State>,
    in_flight: AtomicBool,
    events: Option<mpsc::UnboundedSender<ConversationEvent>>,
}

impl Conversation {
    pub fn new(chat: Arc<dyn ChatClient>, logs: Arc<dyn LogPersister>, voice: VoiceIo) -> Self {
        Self {
            chat,
            logs,
            voice,
            farewell_delay: DEFAULT_FAREWELL_DELAY,
            state: Mutex::new(State {
                session: Session::new(),
                remote_session_id: None,
                visible: Vec::new(),
                pending_input: String::new(),
                generation: 0,
            }),
            in_flight: AtomicBool::new(false),
            events: None,
        }
    }

    pub fn with_farewell_delay(mut self, delay: Duration) -> Self {
        self.farewell_delay = delay;
        self
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<ConversationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Handles one line of user input.
    ///
    /// Blank input and input arriving while another submit is in flight are
    /// ignored. Backend failures never escape: they become an apology turn.
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        if text.trim().is_empty() {
            return SubmitOutcome::Ignored(IgnoreReason::Blank);
        }
        let Some(_flight) = InFlight::acquire(&self.in_flight) else {
            tracing::debug!("submit ignored: request already in flight");
            return SubmitOutcome::Ignored(IgnoreReason::InFlight);
        };

        self.voice.stop_speaking();
        let generation = {
            let mut state = self.lock();
            state.pending_input.clear();
            self.append(&mut state, ChatTurn::user(text));
            state.generation
        };

        if is_goodbye(text) {
            self.finish_with_farewell().await
        } else {
            self.exchange(text, generation).await
        }
    }

    async fn exchange(&self, text: &str, generation: u64) -> SubmitOutcome {
        let remote_id = self.lock().remote_session_id.clone();
        let result = self.chat.send(text, remote_id.as_deref()).await;

        let (spoken, outcome) = {
            let mut state = self.lock();
            if state.generation != generation {
                tracing::debug!("discarding reply for a cleared or rotated transcript");
                return SubmitOutcome::Discarded;
            }

            match result {
                Ok(reply) => {
                    self.append(&mut state, ChatTurn::bot(reply.reply.clone()));
                    if state.remote_session_id.is_none() {
                        if let Some(id) = reply.session_id {
                            tracing::info!(session_id = %id, "adopted server session id");
                            state.session.adopt_id(id.clone());
                            state.remote_session_id = Some(id.clone());
                            self.emit(ConversationEvent::SessionIdAdopted(id));
                        }
                    }
                    (reply.reply, SubmitOutcome::Replied)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "chat request failed");
                    self.append(&mut state, ChatTurn::bot(APOLOGY));
                    (APOLOGY.to_string(), SubmitOutcome::Degraded)
                }
            }
        };

        self.voice.speak(&spoken);
        outcome
    }

    async fn finish_with_farewell(&self) -> SubmitOutcome {
        tokio::time::sleep(self.farewell_delay).await;

        {
            let mut state = self.lock();
            self.append(&mut state, ChatTurn::bot(FAREWELL));
        }
        self.voice.speak(FAREWELL);

        let (log, persisted) = self.flush_and_rotate().await;
        SubmitOutcome::SessionEnded { log, persisted }
    }

    /// Submits a snapshot of the session, then replaces it. A failed save is
    /// reported but never blocks the rotation.
    async fn flush_and_rotate(&self) -> (SessionLog, bool) {
        let log = self.lock().session.snapshot();

        let persisted = match self.logs.persist(&log.session_id, &log).await {
            Ok(()) => {
                tracing::info!(session_id = %log.session_id, messages = log.message_count, "session log saved");
                self.emit(ConversationEvent::LogPersisted {
                    session_id: log.session_id.clone(),
                });
                true
            }
            Err(e) => {
                tracing::warn!(session_id = %log.session_id, error = %e, "failed to save session log");
                self.emit(ConversationEvent::LogFailed {
                    session_id: log.session_id.clone(),
                    error: e.to_string(),
                });
                let mut state = self.lock();
                self.append(&mut state, ChatTurn::system(LOG_SAVE_FAILED));
                false
            }
        };

        {
            let mut state = self.lock();
            let next = Session::succeeding(&state.session);
            let previous = std::mem::replace(&mut state.session, next);
            state.remote_session_id = None;
            state.generation += 1;
            tracing::info!(previous = %previous.id(), next = %state.session.id(), "session rotated");
            self.emit(ConversationEvent::SessionRotated {
                previous: previous.id().to_string(),
                next: state.session.id().to_string(),
            });
        }

        (log, persisted)
    }

    /// Wipes the visible list and the transcript. The session keeps its id
    /// and start time.
    pub fn clear(&self) {
        self.voice.stop_speaking();
        let mut state = self.lock();
        state.visible.clear();
        state.session.clear_transcript();
        state.generation += 1;
        self.emit(ConversationEvent::Cleared);
    }

    /// Saves and rotates a non-empty session without a farewell, e.g. on exit.
    /// Returns `None` when there was nothing to save or a submit is pending.
    pub async fn end_session(&self) -> Option<SessionLog> {
        let _flight = InFlight::acquire(&self.in_flight)?;
        let empty = self.lock().session.messages().is_empty();
        if empty {
            return None;
        }
        self.voice.stop_speaking();
        let (log, _) = self.flush_and_rotate().await;
        Some(log)
    }

    /// Records one utterance into the pending input. A stopped recognition
    /// returns `None` without a system turn.
    pub async fn listen(&self) -> Option<String> {
        match self.voice.listen().await {
            Ok(text) => {
                self.lock().pending_input = text.clone();
                Some(text)
            }
            Err(
                e @ (VoiceError::Unavailable
                | VoiceError::AlreadyListening
                | VoiceError::Aborted),
            ) => {
                tracing::debug!(error = %e, "listen ended without a transcript");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition failed");
                let mut state = self.lock();
                self.append(
                    &mut state,
                    ChatTurn::system(format!("Speech recognition error: {e}")),
                );
                None
            }
        }
    }

    pub fn stop_listening(&self) {
        self.voice.stop_listening();
    }

    pub fn stop_speaking(&self) {
        self.voice.stop_speaking();
    }

    pub fn voice(&self) -> &VoiceIo {
        &self.voice
    }

    pub fn session(&self) -> Session {
        self.lock().session.clone()
    }

    pub fn session_id(&self) -> String {
        self.lock().session.id().to_string()
    }

    pub fn remote_session_id(&self) -> Option<String> {
        self.lock().remote_session_id.clone()
    }

    pub fn messages(&self) -> Vec<ChatTurn> {
        self.lock().visible.clone()
    }

    pub fn pending_input(&self) -> String {
        self.lock().pending_input.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn append(&self, state: &mut State, turn: ChatTurn) {
        state.visible.push(turn.clone());
        state.session.push(turn.clone());
        self.emit(ConversationEvent::TurnAppended(turn));
    }

    fn emit(&self, event: ConversationEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Holds the in-flight flag; released on drop, including cancellation.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
