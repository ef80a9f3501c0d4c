//! Conversation session — message log plus one user→assistant exchange at a time.
//!
//! DESIGN
//! ======
//! `ConversationSession` is a cheap cloneable handle over shared state so a
//! submission can run on its own task while the front-end keeps reading the
//! log. The state mutex is never held across the completion await.
//!
//! `submit` has a single suspension point: the completion call. Everything
//! before it (append user turn, clear draft, set in-flight, append the
//! pending placeholder) happens atomically under the lock, and so does
//! everything after it (drop the placeholder, append the reply, clear
//! in-flight). The continuation first checks that the session has not been
//! disposed; a disposed session discards the response untouched.
//!
//! ERROR HANDLING
//! ==============
//! No error escapes `submit`. Transport failures and non-2xx statuses become
//! [`FALLBACK_REPLY`], a 2xx body without content becomes
//! [`MISSING_CONTENT_REPLY`]. Both are logged and appended as ordinary
//! assistant turns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::llm::{Completion, CompletionReply};
use crate::state::chat::{ChatLog, Message};
use crate::state::ui::{Theme, UiState};

pub const FALLBACK_REPLY: &str = "Sorry, I'm having trouble connecting right now. Please try again later.";
pub const MISSING_CONTENT_REPLY: &str = "Sorry, I encountered an error processing your request.";

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Draft was empty or whitespace only.
    EmptyInput,
    /// Another submission is still waiting for its reply.
    RequestInFlight,
    /// The session was disposed before the call.
    Disposed,
}

/// What a call to [`ConversationSession::submit`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Nothing changed.
    Rejected(RejectReason),
    /// The service's reply was appended.
    Replied,
    /// The service answered 2xx without content; the apology was appended.
    SoftFailure,
    /// The request failed; the fallback message was appended.
    Fallback,
    /// The session was disposed while waiting; the response was dropped.
    Discarded,
}

// =============================================================================
// SESSION
// =============================================================================

struct SessionState {
    log: ChatLog,
    request_in_flight: bool,
    draft: String,
    ui: UiState,
    disposed: bool,
}

struct Inner {
    state: Mutex<SessionState>,
    completion: Arc<dyn Completion>,
}

/// Handle to one chat screen's conversation. Clones share the same session.
#[derive(Clone)]
pub struct ConversationSession {
    inner: Arc<Inner>,
}

impl ConversationSession {
    /// Start a session whose log holds only the seed greeting.
    #[must_use]
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        let state = SessionState {
            log: ChatLog::new(),
            request_in_flight: false,
            draft: String::new(),
            ui: UiState::default(),
            disposed: false,
        };
        Self { inner: Arc::new(Inner { state: Mutex::new(state), completion }) }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the message log in display order.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock().log.messages().to_vec()
    }

    #[must_use]
    pub fn is_request_in_flight(&self) -> bool {
        self.lock().request_in_flight
    }

    #[must_use]
    pub fn draft(&self) -> String {
        self.lock().draft.clone()
    }

    pub fn set_draft(&self, text: impl Into<String>) {
        self.lock().draft = text.into();
    }

    #[must_use]
    pub fn ui(&self) -> UiState {
        self.lock().ui
    }

    pub fn toggle_theme(&self) -> Theme {
        self.lock().ui.toggle_theme()
    }

    pub fn toggle_menu(&self) -> bool {
        self.lock().ui.toggle_menu()
    }

    pub fn close_menu(&self) {
        self.lock().ui.close_menu();
    }

    /// Tear the session down. A reply that arrives afterwards is discarded.
    pub fn dispose(&self) {
        let mut state = self.lock();
        if !state.disposed {
            state.disposed = true;
            debug!(in_flight = state.request_in_flight, "conversation session disposed");
        }
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Submit whatever is currently in the draft.
    pub async fn submit_draft(&self) -> SubmitOutcome {
        let draft = self.draft();
        self.submit(&draft).await
    }

    /// Send one user turn and append the assistant's answer.
    ///
    /// Empty or whitespace-only input, and any call made while another
    /// submission is in flight, are no-ops. Otherwise the log grows by
    /// exactly one user and one assistant message, whatever the network does.
    pub async fn submit(&self, draft: &str) -> SubmitOutcome {
        let history = {
            let mut state = self.lock();
            if state.disposed {
                return SubmitOutcome::Rejected(RejectReason::Disposed);
            }
            if draft.trim().is_empty() {
                return SubmitOutcome::Rejected(RejectReason::EmptyInput);
            }
            if state.request_in_flight {
                debug!("submit ignored: request already in flight");
                return SubmitOutcome::Rejected(RejectReason::RequestInFlight);
            }

            state.log.push_user(draft.to_string());
            state.draft.clear();
            state.request_in_flight = true;
            state.log.push_placeholder();
            state.log.history()
        };

        let mut guard = InFlight { session: self, armed: true };
        debug!(turns = history.len(), "requesting completion");

        let (text, outcome) = match self.inner.completion.complete(&history).await {
            Ok(CompletionReply::Content(content)) => (content, SubmitOutcome::Replied),
            Ok(CompletionReply::MissingContent) => {
                warn!("completion response had no content");
                (MISSING_CONTENT_REPLY.to_string(), SubmitOutcome::SoftFailure)
            }
            Err(e) => {
                warn!(error = %e, retryable = e.retryable(), "completion request failed");
                (FALLBACK_REPLY.to_string(), SubmitOutcome::Fallback)
            }
        };

        guard.armed = false;
        let mut state = self.lock();
        if state.disposed {
            info!("session disposed while awaiting reply; response discarded");
            return SubmitOutcome::Discarded;
        }
        state.log.remove_placeholder();
        state.log.push_assistant(text);
        state.request_in_flight = false;
        outcome
    }
}

/// Clears the in-flight flag and placeholder if a submission future is
/// dropped before its reply is applied.
struct InFlight<'a> {
    session: &'a ConversationSession,
    armed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.session.lock();
        state.log.remove_placeholder();
        state.request_in_flight = false;
        debug!("submission dropped before completion; in-flight state cleared");
    }
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
