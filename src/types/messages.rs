//! Conversation turn types
//!
//! A `Turn` is one entry of the conversation buffer: who said it, what was
//! said, and an optional structured payload (file metadata, tool results).
//! Turns are immutable once built.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Synthetic placeholder for compressed history
    Summary,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Summary => "summary",
        }
    }

    /// Role name understood by chat-completion APIs
    pub fn wire_role(&self) -> &'static str {
        match self {
            Role::System | Role::Summary => "system",
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

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<serde_json::Value>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            payload: None,
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

    /// Summary turns are only minted by the context compressor
    pub(crate) fn summary(content: impl Into<String>) -> Self {
        Self::new(Role::Summary, content)
    }

    /// Attach a structured payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn is_summary(&self) -> bool {
        self.role == Role::Summary
    }

    /// Render as a transcript line, e.g. `USER: hello`
    pub fn render(&self) -> String {
        let mut line = format!("{}: {}", self.role.as_str().to_uppercase(), self.content);
        if let Some(payload) = &self.payload {
            line.push_str(&format!("\n  [payload] {}", payload));
        }
        line
    }
}
