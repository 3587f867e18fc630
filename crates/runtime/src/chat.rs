use crate::ProviderHandle;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use twin_common::{Message, Result};
use twin_config::Persona;
use twin_store::{new_session_id, validate_session_id, SessionLocks, SessionStore};

/// Result of one chat turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub response: String,
    pub session_id: String,
}

/// Runs a chat turn: history in, provider call, history out
pub struct ChatOrchestrator {
    provider: ProviderHandle,
    store: Arc<dyn SessionStore>,
    persona: Persona,
    model: String,
    locks: SessionLocks,
}

impl ChatOrchestrator {
    pub fn new(
        provider: ProviderHandle,
        store: Arc<dyn SessionStore>,
        persona: Persona,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            persona,
            model: model.into(),
            locks: SessionLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Persona first, then stored history, then the new user turn
    pub fn build_messages(&self, history: &[Message], user_message: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.persona.as_str()));
        messages.extend_from_slice(history);
        messages.push(Message::user(user_message));
        messages
    }

    /// Handle one chat turn. Nothing is persisted unless the provider answers.
    pub async fn handle_chat(
        &self,
        session_id: Option<String>,
        user_message: String,
    ) -> Result<ChatOutcome> {
        let session_id = match session_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                validate_session_id(&id)?;
                id
            }
            None => {
                let id = new_session_id();
                debug!("Starting new session {}", id);
                id
            }
        };

        // Held across load, provider call and save
        let _guard = self.locks.acquire(&session_id).await;

        let mut conversation = self.store.load(&session_id).await.map_err(|e| {
            error!(session_id = %session_id, error_type = e.error_type(), "Failed to load session: {}", e);
            e
        })?;

        let messages = self.build_messages(&conversation, &user_message);
        let started = Instant::now();
        let response = self
            .provider
            .complete(&self.model, &messages)
            .await
            .map_err(|e| {
                error!(
                    session_id = %session_id,
                    provider = self.provider.name(),
                    error_type = e.error_type(),
                    "Completion failed: {}",
                    e
                );
                e
            })?;
        debug!(
            "Provider {} answered in {}ms",
            self.provider.name(),
            started.elapsed().as_millis()
        );

        conversation.push(Message::user(user_message));
        conversation.push(Message::assistant(response.clone()));

        self.store.save(&session_id, &conversation).await.map_err(|e| {
            error!(session_id = %session_id, error_type = e.error_type(), "Failed to save session: {}", e);
            e
        })?;

        info!(
            session_id = %session_id,
            turns = conversation.len(),
            "Chat turn completed"
        );

        Ok(ChatOutcome {
            response,
            session_id,
        })
    }
}
