use crate::config::ClientMode;
use crate::constants::{FALLBACK_REPLY_DELAY, RELAY_FAILURE_MESSAGE};
use crate::conversation::{
    CancellationPolicy, ChatEvent, Conversation, ConversationUpdate, Notice, Outcome, Phase,
};
use crate::event::{EventReader, StreamEvent};
use crate::fallback::fallback_reply;
use crate::history::{self, DbPool};
use crate::language::Language;
use crate::types::*;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::io;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// HTTP side of the chat client: one POST per turn.
#[derive(Clone)]
pub struct RelayClient {
    http: reqwest::Client,
    endpoint: String,
    key: String,
}

impl RelayClient {
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            key: key.into(),
        }
    }

    /// Sends the conversation and returns the response once its status is
    /// known to be a success. The body is left unread.
    pub async fn open_stream(&self, messages: &[Message], language: Language) -> Result<reqwest::Response> {
        let request = ChatRequest::new(messages.to_vec(), language);
        tracing::debug!(
            "[💻 -> 📱] Sending {} messages ({}) to {}",
            messages.len(),
            language,
            self.endpoint
        );

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(ErrorBody { error: Some(e) }) if !e.is_empty() => e,
            _ => RELAY_FAILURE_MESSAGE.to_string(),
        };
        tracing::warn!("[📱 -> 💻] Relay returned {}: {}", status, message);

        let error = match status {
            StatusCode::TOO_MANY_REQUESTS => VaidyaError::RateLimited(message),
            StatusCode::PAYMENT_REQUIRED => VaidyaError::QuotaExhausted(message),
            _ => VaidyaError::Relay(status, message),
        };
        Err(error.into())
    }
}

enum Backend {
    Live(RelayClient),
    Fallback { reason: String },
}

struct HistoryStore {
    pool: DbPool,
    user_id: String,
}

/// Drives a [`Conversation`] from the relay, or from the fallback responder
/// when the relay is not configured, and keeps the persisted history in step.
pub struct ChatSession {
    backend: Backend,
    conversation: Conversation,
    store: Option<HistoryStore>,
    fallback_delay: Duration,
}

impl ChatSession {
    pub fn new(mode: ClientMode, http: reqwest::Client, language: Language, policy: CancellationPolicy) -> Self {
        let backend = match mode {
            ClientMode::Live { endpoint, key } => Backend::Live(RelayClient::new(http, endpoint, key)),
            ClientMode::Fallback { reason } => {
                tracing::warn!("[CHAT] Relay not configured, using fallback replies: {}", reason);
                Backend::Fallback { reason }
            }
        };
        Self {
            backend,
            conversation: Conversation::new(language, policy),
            store: None,
            fallback_delay: FALLBACK_REPLY_DELAY,
        }
    }

    pub fn with_fallback_delay(mut self, delay: Duration) -> Self {
        self.fallback_delay = delay;
        self
    }

    /// Persists turns for `user_id` from now on and loads what is already
    /// stored for the current language.
    pub async fn attach_history(&mut self, pool: DbPool, user_id: impl Into<String>) -> bool {
        self.store = Some(HistoryStore {
            pool,
            user_id: user_id.into(),
        });
        let language = self.conversation.language();
        self.set_language(language).await
    }

    pub fn is_live(&self) -> bool {
        matches!(self.backend, Backend::Live(_))
    }

    pub fn fallback_reason(&self) -> Option<&str> {
        match &self.backend {
            Backend::Fallback { reason } => Some(reason),
            Backend::Live(_) => None,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationUpdate> {
        self.conversation.subscribe()
    }

    /// Runs one turn to completion. `None` when the input was rejected (blank,
    /// or a response already in flight); otherwise the settled outcome.
    ///
    /// Only a relayed turn that streamed a non-empty reply is stored, user
    /// message and reply together, so stored history always alternates.
    pub async fn send(&mut self, input: &str, cancel: &CancellationToken) -> Option<Outcome> {
        if !self.conversation.apply(ChatEvent::Submit(input.to_string())) {
            return None;
        }
        let user_message = self.conversation.messages().last().cloned();

        let streamed = match &self.backend {
            Backend::Live(client) => {
                stream_reply(client, &mut self.conversation, cancel).await;
                true
            }
            Backend::Fallback { .. } => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.conversation.apply(ChatEvent::Cancelled);
                    }
                    _ = tokio::time::sleep(self.fallback_delay) => {
                        let reply = fallback_reply(self.conversation.language());
                        self.conversation.apply(ChatEvent::FallbackReply(reply));
                    }
                }
                false
            }
        };

        let outcome = match self.conversation.phase() {
            Phase::Settled(outcome) => outcome.clone(),
            other => {
                tracing::error!("[CHAT] Turn ended unsettled in phase {:?}", other);
                return None;
            }
        };

        if streamed && outcome == Outcome::Success {
            let reply = self.conversation.messages().last().cloned();
            if let (Some(question), Some(reply)) = (user_message, reply) {
                if reply.role == Role::Assistant && !reply.content.is_empty() {
                    self.persist(&question).await;
                    self.persist(&reply).await;
                }
            }
        }
        Some(outcome)
    }

    /// Switches language, loading its stored history or a fresh greeting.
    /// Refused while a response is in flight.
    pub async fn set_language(&mut self, language: Language) -> bool {
        if self.conversation.phase().is_in_flight() {
            return false;
        }
        let history = match &self.store {
            Some(store) => match history::load_history(&store.pool, &store.user_id, language).await {
                Ok(messages) => messages,
                Err(e) => {
                    tracing::error!("[CHAT] Failed to load history: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.conversation.reset(language, history)
    }

    /// Deletes the stored history for the current language and starts over.
    pub async fn clear_history(&mut self) -> Result<()> {
        if self.conversation.phase().is_in_flight() {
            return Err(VaidyaError::InvalidRequest(
                "cannot clear history while a response is in flight".to_string(),
            )
            .into());
        }
        let language = self.conversation.language();
        if let Some(store) = &self.store {
            let removed = history::clear_history(&store.pool, &store.user_id, language).await?;
            tracing::info!("[CHAT] Cleared {} stored messages ({})", removed, language);
        }
        self.conversation.reset(language, Vec::new());
        Ok(())
    }

    async fn persist(&self, message: &Message) {
        let store = match &self.store {
            Some(s) => s,
            None => return,
        };
        if let Err(e) = history::append_message(
            &store.pool,
            &store.user_id,
            self.conversation.language(),
            message,
        )
        .await
        {
            tracing::error!("[CHAT] Failed to save message: {}", e);
        }
    }
}

async fn stream_reply(client: &RelayClient, conversation: &mut Conversation, cancel: &CancellationToken) {
    let messages = conversation.messages().to_vec();
    let language = conversation.language();

    let opened = tokio::select! {
        _ = cancel.cancelled() => {
            conversation.apply(ChatEvent::Cancelled);
            return;
        }
        opened = client.open_stream(&messages, language) => opened,
    };
    let response = match opened {
        Ok(r) => r,
        Err(e) => {
            conversation.apply(ChatEvent::Failed(Notice::from(&e.inner)));
            return;
        }
    };

    conversation.apply(ChatEvent::ResponseStarted);
    let body = Box::pin(
        response
            .bytes_stream()
            .map(|chunk| chunk.map_err(io::Error::other)),
    );
    let mut reader = EventReader::new(body);

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("[CHAT] Response cancelled");
                conversation.apply(ChatEvent::Cancelled);
                return;
            }
            next = reader.next_event() => next,
        };
        match next {
            Some(Ok(StreamEvent::Delta(text))) => {
                conversation.apply(ChatEvent::Delta(text));
            }
            Some(Ok(StreamEvent::Done)) | None => {
                conversation.apply(ChatEvent::Finished);
                return;
            }
            Some(Err(e)) => {
                tracing::error!("[CHAT] Stream read failed: {}", e);
                conversation.apply(ChatEvent::Failed(Notice::from(&VaidyaError::Io(e))));
                return;
            }
        }
    }
}
