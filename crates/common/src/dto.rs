use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// Constants for validation
const MAX_MESSAGE_CHARS: usize = 100_000;

/// Message role enum for strict validation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Body of `POST /chat`
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(Error::BadRequest("Message cannot be empty".into()));
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(Error::BadRequest(format!(
                "Message too long (max {} chars)",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(())
    }
}

/// Reply of `POST /chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
}

/// One row of the session listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub last_message: Option<String>,
}

impl SessionSummary {
    /// Summarize a stored conversation
    pub fn from_conversation(session_id: impl Into<String>, conversation: &[Message]) -> Self {
        Self {
            session_id: session_id.into(),
            message_count: conversation.len(),
            last_message: conversation.last().map(|m| m.content.clone()),
        }
    }
}

/// Reply of `GET /sessions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Reply of `GET /`
#[derive(Debug, Clone, Serialize)]
pub struct RootResponse {
    pub message: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Health status enum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
}
