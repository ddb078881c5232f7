//! Conversation controller: the session/message state machine.
//!
//! One controller owns one conversation. All mutations go through the named
//! operations ([`ConversationController::bootstrap`],
//! [`ConversationController::send`], [`ConversationController::clear`]);
//! views read [`ChatSnapshot`]s and react to [`ChatEvent`]s.
//!
//! The controller is a cheap handle: clones share the same state. The state
//! lock is never held across an await, and every mutation that follows a
//! network round-trip is gated on the liveness flag flipped by
//! [`ConversationController::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, warn};

use crate::api::ChatApi;
use crate::error::ApiError;
use crate::models::{Message, Role};
use crate::reply::ChatReply;
use crate::scroll::ScrollBehavior;
use crate::store::ConversationStore;

/// Session bootstrap lifecycle
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BootState {
    #[default]
    Init,
    /// Session creation or history load in progress
    Creating,
    Ready,
    /// Terminal; no chat is possible
    BootFailed(String),
}

/// Notifications for the view
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    /// Booting, sending, error or session changed
    StateChanged,
    /// The message sequence changed
    MessagesChanged,
    FocusInput,
    ScrollToBottom(ScrollBehavior),
}

#[derive(Debug, Default)]
struct ChatState {
    boot: BootState,
    session_id: Option<String>,
    store: ConversationStore,
    sending: bool,
    error: Option<String>,
}

/// Read-only copy of the controller state for rendering
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSnapshot {
    pub boot: BootState,
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub sending: bool,
    pub error: Option<String>,
}

impl ChatSnapshot {
    pub fn booting(&self) -> bool {
        matches!(self.boot, BootState::Init | BootState::Creating)
    }

    pub fn boot_failed(&self) -> bool {
        matches!(self.boot, BootState::BootFailed(_))
    }

    /// Input is usable once a session exists
    pub fn input_enabled(&self) -> bool {
        self.session_id.is_some()
    }

    pub fn can_reset(&self) -> bool {
        self.session_id.is_some() && !self.sending
    }

    /// Content of the most recent assistant message, the copy target
    pub fn latest_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    /// Shortened session id for the header: first 8 characters and `…`
    pub fn session_label(&self) -> String {
        match &self.session_id {
            Some(id) => format!("{}…", id.chars().take(8).collect::<String>()),
            None => "—".to_string(),
        }
    }
}

/// Controller for one conversation view
#[derive(Clone)]
pub struct ConversationController {
    api: ChatApi,
    state: Arc<Mutex<ChatState>>,
    alive: Arc<AtomicBool>,
    events: UnboundedSender<ChatEvent>,
}

impl ConversationController {
    /// Create a controller and the receiving end of its event channel
    pub fn new(api: ChatApi) -> (Self, UnboundedReceiver<ChatEvent>) {
        let (tx, rx) = unbounded_channel();
        let controller = Self {
            api,
            state: Arc::new(Mutex::new(ChatState::default())),
            alive: Arc::new(AtomicBool::new(true)),
            events: tx,
        };
        (controller, rx)
    }

    pub fn api(&self) -> &ChatApi {
        &self.api
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        let state = self.state.lock();
        ChatSnapshot {
            boot: state.boot.clone(),
            session_id: state.session_id.clone(),
            messages: state.store.messages().to_vec(),
            sending: state.sending,
            error: state.error.clone(),
        }
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().session_id.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Tear the conversation down. Results of requests still in flight are
    /// discarded once they arrive.
    pub fn shutdown(&self) {
        let _state = self.state.lock();
        self.alive.store(false, Ordering::Release);
        debug!("Conversation controller shut down");
    }

    /// Apply `f` unless the controller has been shut down
    fn update<R>(&self, f: impl FnOnce(&mut ChatState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if !self.alive.load(Ordering::Acquire) {
            return None;
        }
        Some(f(&mut state))
    }

    fn emit(&self, event: ChatEvent) {
        // Receiver gone means nobody renders anymore
        let _ = self.events.send(event);
    }

    /// Create the session and load its history.
    ///
    /// Runs once; later calls are no-ops. Session creation failure ends in
    /// [`BootState::BootFailed`] without a history request. History failures
    /// of any kind leave a usable session with an empty conversation.
    pub async fn bootstrap(&self) {
        let started = self.update(|s| {
            if s.boot != BootState::Init {
                return false;
            }
            s.boot = BootState::Creating;
            true
        });
        if started != Some(true) {
            return;
        }
        self.emit(ChatEvent::StateChanged);

        info!(base_url = %self.api.base_url(), "Creating session");
        let session_id = match self.api.create_session().await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %e, "Session creation failed");
                let message = boot_failure_message(&e);
                let applied = self.update(|s| {
                    s.boot = BootState::BootFailed(message.clone());
                    s.error = Some(message);
                });
                if applied.is_some() {
                    self.emit(ChatEvent::StateChanged);
                }
                return;
            }
        };

        if self
            .update(|s| s.session_id = Some(session_id.clone()))
            .is_none()
        {
            debug!("Discarding session created after shutdown");
            return;
        }
        self.emit(ChatEvent::StateChanged);

        let response = self.api.history(&session_id).await;
        let history = if response.ok {
            Message::history_from_body(response.json())
        } else {
            warn!(status = response.status, "History load failed, starting empty");
            Vec::new()
        };

        let count = history.len();
        let applied = self.update(|s| {
            s.store.replace(history);
            s.boot = BootState::Ready;
        });
        if applied.is_none() {
            debug!("Discarding history loaded after shutdown");
            return;
        }

        info!(session_id = %session_id, messages = count, "Session ready");
        self.emit(ChatEvent::MessagesChanged);
        self.emit(ChatEvent::StateChanged);
        self.emit(ChatEvent::FocusInput);
        self.emit(ChatEvent::ScrollToBottom(ScrollBehavior::Instant));
    }

    /// Synchronous half of a send.
    ///
    /// Checks the preconditions (non-blank message, session present, no send
    /// in flight), appends the user message, enters the sending state and
    /// clears the error. Returns `None` without touching anything when a
    /// precondition fails. On `Some`, the caller clears its input field and
    /// completes the returned [`PendingSend`].
    pub fn begin_send(&self, message: &str) -> Option<PendingSend> {
        let message = message.trim();
        if message.is_empty() {
            return None;
        }

        let session_id = self
            .update(|s| {
                let session_id = s.session_id.clone()?;
                if s.sending {
                    return None;
                }
                s.store.append(Message::user(message, Utc::now()));
                s.sending = true;
                s.error = None;
                Some(session_id)
            })
            .flatten()?;

        self.emit(ChatEvent::MessagesChanged);
        self.emit(ChatEvent::StateChanged);
        debug!(session_id = %session_id, chars = message.len(), "Sending message");

        Some(PendingSend {
            controller: self.clone(),
            session_id,
            message: message.to_string(),
        })
    }

    /// Send `message` and wait for the reply.
    ///
    /// Returns `false` when a precondition failed and nothing happened.
    /// Otherwise exactly one user and one assistant message were appended
    /// (unless the controller was shut down meanwhile).
    pub async fn send(&self, message: &str) -> bool {
        match self.begin_send(message) {
            Some(pending) => {
                pending.complete().await;
                true
            }
            None => false,
        }
    }

    /// Ask the backend to forget the conversation and empty the local
    /// sequence regardless of the outcome. No-op without a session.
    pub async fn clear(&self) -> bool {
        let Some(session_id) = self.session_id() else {
            return false;
        };

        let response = self.api.clear(&session_id).await;
        if !response.ok {
            warn!(status = response.status, "Backend clear failed, resetting locally");
        }

        if self.update(|s| s.store.clear()).is_none() {
            return false;
        }
        self.emit(ChatEvent::MessagesChanged);
        self.emit(ChatEvent::FocusInput);
        true
    }

    /// Best-effort `DELETE /session/{id}` when leaving. Does not mutate state.
    pub async fn end_session(&self) -> bool {
        let Some(session_id) = self.session_id() else {
            return false;
        };
        let response = self.api.delete_session(&session_id).await;
        if response.ok {
            debug!(session_id = %session_id, "Session deleted");
        } else {
            warn!(session_id = %session_id, status = response.status, "Session delete failed");
        }
        response.ok
    }
}

/// A send whose user message is already appended; the chat request is
/// issued by [`PendingSend::complete`].
#[must_use = "the sending state stays set until the send is completed"]
pub struct PendingSend {
    controller: ConversationController,
    session_id: String,
    message: String,
}

impl PendingSend {
    /// Trimmed message being sent
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Issue the chat request and append the assistant reply
    pub async fn complete(self) {
        let controller = self.controller;
        let response = controller.api.chat(&self.session_id, &self.message).await;

        let reply = ChatReply::from_response(&response);
        if matches!(reply, ChatReply::Failure { .. }) {
            warn!(status = response.status, "Chat request failed");
        }
        let (assistant, banner) = reply.into_message(Utc::now());

        let applied = controller.update(|s| {
            s.store.append(assistant);
            if banner.is_some() {
                s.error = banner;
            }
            s.sending = false;
        });
        if applied.is_none() {
            debug!("Discarding chat reply received after shutdown");
            return;
        }

        controller.emit(ChatEvent::MessagesChanged);
        controller.emit(ChatEvent::StateChanged);
        controller.emit(ChatEvent::FocusInput);
    }
}

fn boot_failure_message(error: &ApiError) -> String {
    match error.status() {
        Some(status) => format!("Failed to create session ({})", status),
        None => "Failed to create session (network error)".to_string(),
    }
}
