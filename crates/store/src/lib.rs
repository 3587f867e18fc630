mod file_store;
mod locks;


pub use file_store::FileSessionStore;
pub use locks::SessionLocks;

use async_trait::async_trait;
use twin_common::{Error, Message, Result, SessionSummary};

const MAX_SESSION_ID_LEN: usize = 128;

/// Trait for persistent conversation storage
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored conversation; empty if the session does not exist
    async fn load(&self, session_id: &str) -> Result<Vec<Message>>;

    /// Replace the stored conversation as one unit
    async fn save(&self, session_id: &str, conversation: &[Message]) -> Result<()>;

    /// Summarize every stored session, in storage listing order
    async fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// Generate a fresh session identifier
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Session ids become file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
        return Err(Error::InvalidSessionId(format!(
            "length must be between 1 and {} characters",
            MAX_SESSION_ID_LEN
        )));
    }

    if let Some(bad) = session_id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::InvalidSessionId(format!(
            "unexpected character {:?}",
            bad
        )));
    }

    Ok(())
}
