//! Session document types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Label used when replaying history into a prompt
    pub fn speaker(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "AI",
        }
    }
}

/// One entry in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            edited_at: None,
        }
    }
}

/// Durable conversation, stored as one JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<Message>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn metadata(&self) -> SessionMetadata {
        SessionMetadata {
            session_id: self.session_id.clone(),
            message_count: self.history.len(),
            created: self.created_at,
            updated: self.updated_at,
        }
    }

    /// Render the trailing `max_messages` as `You: …` / `AI: …` turns
    pub fn recent_context(&self, max_messages: usize) -> String {
        let start = self.history.len().saturating_sub(max_messages);
        self.history[start..]
            .iter()
            .map(|m| format!("{}: {}\n\n", m.role.speaker(), m.content))
            .collect()
    }

    /// Markdown transcript with a header and one block per message
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        out.push_str("# Session Export\n\n");
        out.push_str(&format!("**Session ID:** {}\n", self.session_id));
        out.push_str(&format!("**Created:** {}\n", self.created_at.to_rfc3339()));
        out.push_str(&format!("**Updated:** {}\n", self.updated_at.to_rfc3339()));
        out.push_str(&format!("**Messages:** {}\n\n", self.history.len()));
        out.push_str("---\n\n");

        let mut turn = 0;
        for message in &self.history {
            match message.role {
                Role::User => {
                    turn += 1;
                    out.push_str(&format!("## Turn {} - Player\n\n", turn));
                }
                Role::Assistant => out.push_str("## AI Response\n\n"),
            }
            out.push_str(&message.content);
            out.push_str("\n\n");
            if let Some(edited) = message.edited_at {
                out.push_str(&format!("*Edited {}*\n\n", edited.to_rfc3339()));
            }
            out.push_str("---\n\n");
        }

        out
    }
}

/// Summary returned by metadata lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub message_count: usize,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Result of an undo request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UndoOutcome {
    /// The last two messages were removed
    Undone { remaining: usize },
    /// Fewer than two messages; history untouched
    NotEnoughMessages { remaining: usize },
}

impl UndoOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, UndoOutcome::Undone { .. })
    }

    pub fn remaining(&self) -> usize {
        match self {
            UndoOutcome::Undone { remaining } | UndoOutcome::NotEnoughMessages { remaining } => {
                *remaining
            }
        }
    }
}
