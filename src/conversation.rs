//! Client-side conversation state.
//!
//! [`Conversation`] is a reducer: every change goes through [`Conversation::apply`]
//! with a [`ChatEvent`], and each accepted change is published as a
//! [`ConversationUpdate`] to subscribers. Rendering lives entirely with the
//! subscriber.

use crate::constants::RELAY_FAILURE_MESSAGE;
use crate::language::Language;
use crate::types::{Message, Role, VaidyaError};
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    RateLimited,
    QuotaExhausted,
    RelayFailure,
    Transport,
    Cancelled,
}

/// User-visible notification attached to a failed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(NoticeKind::Cancelled, "Response cancelled")
    }
}

impl From<&VaidyaError> for Notice {
    fn from(error: &VaidyaError) -> Self {
        match error {
            VaidyaError::RateLimited(m) => Notice::new(NoticeKind::RateLimited, m.clone()),
            VaidyaError::QuotaExhausted(m) => Notice::new(NoticeKind::QuotaExhausted, m.clone()),
            VaidyaError::Relay(_, m) => Notice::new(NoticeKind::RelayFailure, m.clone()),
            VaidyaError::Network(e) => Notice::new(NoticeKind::Transport, e.to_string()),
            VaidyaError::Io(e) => Notice::new(NoticeKind::Transport, e.to_string()),
            _ => Notice::new(NoticeKind::RelayFailure, RELAY_FAILURE_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Settled(Outcome),
}

impl Phase {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Phase::Sending | Phase::Streaming)
    }
}

/// What an interrupted response leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancellationPolicy {
    /// Remove the pending message only if nothing arrived yet.
    #[default]
    KeepPartial,
    /// Always remove the pending message.
    DiscardPartial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// User input; ignored when blank or while a response is in flight.
    Submit(String),
    /// First response byte arrived.
    ResponseStarted,
    Delta(String),
    Finished,
    Failed(Notice),
    Cancelled,
    /// Complete local reply, skipping the streaming phase.
    FallbackReply(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationUpdate {
    /// The whole message list was replaced (language switch, history load).
    Reset {
        language: Language,
        messages: Vec<Message>,
    },
    MessageAppended(Message),
    /// The pending assistant message grew by `delta`.
    PendingGrew { delta: String },
    PendingRemoved,
    PhaseChanged(Phase),
}

pub struct Conversation {
    language: Language,
    messages: Vec<Message>,
    phase: Phase,
    pending: bool,
    policy: CancellationPolicy,
    tx: broadcast::Sender<ConversationUpdate>,
}

impl Conversation {
    /// Fresh conversation opened by the language's greeting.
    pub fn new(language: Language, policy: CancellationPolicy) -> Self {
        let (tx, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            language,
            messages: vec![Message::assistant(language.greeting())],
            phase: Phase::Idle,
            pending: false,
            policy,
            tx,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationUpdate> {
        self.tx.subscribe()
    }

    /// Content of the in-flight assistant message, if one exists.
    pub fn pending_content(&self) -> Option<&str> {
        if self.pending {
            self.messages.last().map(|m| m.content.as_str())
        } else {
            None
        }
    }

    /// Switches language and replaces the message list. Empty history means a
    /// fresh greeting. Refused while a response is in flight.
    pub fn reset(&mut self, language: Language, history: Vec<Message>) -> bool {
        if self.phase.is_in_flight() {
            tracing::debug!("[CHAT] Ignoring reset while a response is in flight");
            return false;
        }
        self.language = language;
        self.messages = if history.is_empty() {
            vec![Message::assistant(language.greeting())]
        } else {
            history
        };
        self.pending = false;
        self.phase = Phase::Idle;
        self.publish(ConversationUpdate::Reset {
            language,
            messages: self.messages.clone(),
        });
        true
    }

    /// Applies one event. Returns `false` when the event is not valid in the
    /// current phase; the state is then left untouched.
    pub fn apply(&mut self, event: ChatEvent) -> bool {
        let accepted = match event {
            ChatEvent::Submit(text) => self.submit(text),
            ChatEvent::ResponseStarted => self.start_response(),
            ChatEvent::Delta(delta) => self.fold(delta),
            ChatEvent::Finished => self.settle_success(),
            ChatEvent::Failed(notice) => self.settle_failure(notice, false),
            ChatEvent::Cancelled => self.settle_failure(Notice::cancelled(), true),
            ChatEvent::FallbackReply(text) => self.fallback(text),
        };
        if !accepted {
            tracing::debug!("[CHAT] Event rejected in phase {:?}", self.phase);
        }
        accepted
    }

    fn submit(&mut self, text: String) -> bool {
        let text = text.trim();
        if text.is_empty() || self.phase.is_in_flight() {
            return false;
        }
        let message = Message::user(text);
        self.messages.push(message.clone());
        self.publish(ConversationUpdate::MessageAppended(message));
        self.set_phase(Phase::Sending);
        true
    }

    fn start_response(&mut self) -> bool {
        if self.phase != Phase::Sending {
            return false;
        }
        let message = Message::assistant("");
        self.messages.push(message.clone());
        self.pending = true;
        self.publish(ConversationUpdate::MessageAppended(message));
        self.set_phase(Phase::Streaming);
        true
    }

    fn fold(&mut self, delta: String) -> bool {
        if self.phase != Phase::Streaming || !self.pending {
            return false;
        }
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => {
                last.content.push_str(&delta);
                self.publish(ConversationUpdate::PendingGrew { delta });
                true
            }
            _ => false,
        }
    }

    fn settle_success(&mut self) -> bool {
        if !self.phase.is_in_flight() {
            return false;
        }
        self.pending = false;
        self.set_phase(Phase::Settled(Outcome::Success));
        true
    }

    fn settle_failure(&mut self, notice: Notice, cancelled: bool) -> bool {
        if !self.phase.is_in_flight() {
            return false;
        }
        if self.pending {
            let empty = self.pending_content().map_or(true, str::is_empty);
            let discard = cancelled && self.policy == CancellationPolicy::DiscardPartial;
            if empty || discard {
                self.messages.pop();
                self.publish(ConversationUpdate::PendingRemoved);
            }
            self.pending = false;
        }
        self.set_phase(Phase::Settled(Outcome::Failed(notice)));
        true
    }

    fn fallback(&mut self, text: String) -> bool {
        if self.phase != Phase::Sending {
            return false;
        }
        let message = Message::assistant(text);
        self.messages.push(message.clone());
        self.publish(ConversationUpdate::MessageAppended(message));
        self.set_phase(Phase::Settled(Outcome::Success));
        true
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase.clone();
        self.publish(ConversationUpdate::PhaseChanged(phase));
    }

    fn publish(&self, update: ConversationUpdate) {
        // no subscribers is fine
        let _ = self.tx.send(update);
    }
}
