//! Conversational state around the remote assistant.
//!
//! The visible conversation and the remote session handle live behind one
//! synchronous lock that is never held across an await. A generation counter taken
//! at send time lets [`AssistantSession::reset`] orphan an in-flight reply:
//! when it finally arrives it is dropped instead of touching the new
//! conversation.

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::engine::{AssistantTransport, TransportError};
use crate::parse::{ParsedReply, StreamAccumulator};
use crate::prompt::{outbound_message, response_schema, system_prompt};
use crate::{AssistantReply, ConversationTurn, Suggestion};

/// Shown in place of suggestions when the request or stream fails.
pub const FAILURE_NOTICE: &str = "Unable to generate options. Please try again.";

/// A completed request/reply pair as the remote side saw it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub message: String,
    pub reply: String,
}

/// Remote conversational context: the fixed behavioral contract plus the
/// exchanges sent so far.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    created_at: DateTime<Utc>,
    system: String,
    history: Vec<Exchange>,
}

impl SessionHandle {
    pub fn new() -> Self {
        let system = format!(
            "{}\n\nResponse JSON schema:\n{}",
            system_prompt(),
            response_schema()
        );
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            system,
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn system_instruction(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[Exchange] {
        &self.history
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// What became of one [`AssistantSession::send`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Blank input; nothing happened.
    Ignored,
    /// Another request is still pending; nothing happened.
    Busy,
    Suggestions(Vec<Suggestion>),
    /// The reply was not a suggestion list and is shown as raw text.
    Fallback(String),
    /// The transport failed; the turn shows [`FAILURE_NOTICE`].
    Failed(TransportError),
    /// The session was reset while the reply was streaming; it was dropped.
    Stale,
}

#[derive(Default)]
struct SessionState {
    handle: Option<SessionHandle>,
    turns: Vec<ConversationTurn>,
    generation: u64,
    /// Index of the unresolved assistant placeholder.
    pending: Option<usize>,
}

impl SessionState {
    fn resolve(&mut self, slot: usize, reply: AssistantReply) {
        self.pending = None;
        if let Some(ConversationTurn::Assistant { reply: placeholder }) = self.turns.get_mut(slot) {
            *placeholder = reply;
        }
    }
}

fn lock_state(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Placeholder of an in-flight `send`. If the future is dropped before the
/// reply is committed, the turn is resolved with [`FAILURE_NOTICE`] so the
/// session does not stay busy.
struct PendingTurn<'a> {
    state: &'a Mutex<SessionState>,
    generation: u64,
    slot: usize,
    armed: bool,
}

impl PendingTurn<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingTurn<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock_state(self.state);
        if state.generation != self.generation || state.pending != Some(self.slot) {
            return;
        }
        warn!(slot = self.slot, "assistant request abandoned before the reply completed");
        state.resolve(
            self.slot,
            AssistantReply::Text {
                text: FAILURE_NOTICE.to_string(),
            },
        );
    }
}

pub struct AssistantSession {
    transport: Arc<dyn AssistantTransport>,
    state: Mutex<SessionState>,
}

impl AssistantSession {
    /// Uninitialized session; the handle is created on first use.
    pub fn new(transport: Arc<dyn AssistantTransport>) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        lock_state(&self.state)
    }

    /// Create the session handle now if there is none yet.
    pub async fn initialize(&self) {
        ensure_handle(&mut self.lock());
    }

    pub async fn is_initialized(&self) -> bool {
        self.lock().handle.is_some()
    }

    pub async fn is_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub async fn handle_id(&self) -> Option<String> {
        self.lock().handle.as_ref().map(|h| h.id.clone())
    }

    /// Snapshot of the visible conversation.
    pub async fn turns(&self) -> Vec<ConversationTurn> {
        self.lock().turns.clone()
    }

    /// Ask the assistant for variations of `current_prompt`.
    ///
    /// The user turn and an empty assistant placeholder are appended before
    /// any network activity. The placeholder is resolved exactly once: when
    /// the stream ends, or with the failure notice if this future is dropped
    /// first.
    pub async fn send(&self, user_text: &str, current_prompt: &str) -> SendOutcome {
        if user_text.trim().is_empty() {
            return SendOutcome::Ignored;
        }

        let (pending, handle) = {
            let mut state = self.lock();
            if state.pending.is_some() {
                debug!("send ignored, a request is already pending");
                return SendOutcome::Busy;
            }
            let handle = ensure_handle(&mut state).clone();
            state.turns.push(ConversationTurn::User {
                text: user_text.to_string(),
            });
            state.turns.push(ConversationTurn::Assistant {
                reply: AssistantReply::Pending,
            });
            let slot = state.turns.len() - 1;
            state.pending = Some(slot);
            let pending = PendingTurn {
                state: &self.state,
                generation: state.generation,
                slot,
                armed: true,
            };
            (pending, handle)
        };

        let message = outbound_message(current_prompt, user_text);
        info!(session = %handle.id, prior = handle.history.len(), "sending assistant request");
        let result = self.stream_reply(&handle, &message).await;

        let (generation, slot) = (pending.generation, pending.slot);
        pending.disarm();

        let mut state = self.lock();
        if state.generation != generation {
            info!(session = %handle.id, "dropping reply for a session that was reset");
            return SendOutcome::Stale;
        }

        let (reply, outcome) = match result {
            Ok((raw, parsed)) => {
                if let Some(h) = state.handle.as_mut() {
                    h.history.push(Exchange {
                        message,
                        reply: raw,
                    });
                }
                match parsed {
                    ParsedReply::Suggestions(suggestions) => {
                        info!(count = suggestions.len(), "assistant returned suggestions");
                        (
                            AssistantReply::Suggestions {
                                suggestions: suggestions.clone(),
                            },
                            SendOutcome::Suggestions(suggestions),
                        )
                    }
                    ParsedReply::Fallback(text) => (
                        AssistantReply::Text { text: text.clone() },
                        SendOutcome::Fallback(text),
                    ),
                }
            }
            Err(e) => {
                error!(error = %e, "assistant request failed");
                (
                    AssistantReply::Text {
                        text: FAILURE_NOTICE.to_string(),
                    },
                    SendOutcome::Failed(e),
                )
            }
        };

        state.resolve(slot, reply);
        outcome
    }

    /// Discard the conversation and the handle, then start a fresh handle
    /// so the session is ready again immediately.
    pub async fn reset(&self) {
        let mut state = self.lock();
        state.turns.clear();
        state.pending = None;
        state.generation += 1;
        let handle = SessionHandle::new();
        info!(session = %handle.id, "assistant session reset");
        state.handle = Some(handle);
    }

    async fn stream_reply(
        &self,
        handle: &SessionHandle,
        message: &str,
    ) -> Result<(String, ParsedReply), TransportError> {
        let mut stream = self.transport.open_stream(handle, message).await?;
        let mut acc = StreamAccumulator::new();
        while let Some(chunk) = stream.next().await {
            acc.append(&chunk?);
        }
        debug!(chunks = acc.chunk_count(), "assistant stream complete");
        let raw = acc.text().to_string();
        Ok((raw, acc.finalize()))
    }
}

fn ensure_handle(state: &mut SessionState) -> &SessionHandle {
    state.handle.get_or_insert_with(|| {
        let handle = SessionHandle::new();
        info!(session = %handle.id, "assistant session initialized");
        handle
    })
}
