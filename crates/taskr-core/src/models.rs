//! Domain models for tasks, conversations, and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single to-do item, always owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A chat conversation. Created lazily on the first message of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A message within a conversation. Append-only; never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    /// Serialized record of tool calls and their results, assistant turns only.
    pub tool_calls: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Message roles. One enum shared by storage and transcript formatting;
/// external vocabularies are produced only at the model-client boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl From<&str> for MessageRole {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "assistant" | "chatbot" | "agent" | "ai" | "bot" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// Compact task view surfaced in disambiguation prompts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskCandidate {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

impl From<&Task> for TaskCandidate {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            completed: task.completed,
        }
    }
}

/// Status filter for listing tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Completed,
    Incomplete,
    #[default]
    #[serde(other)]
    All,
}

impl StatusFilter {
    /// Parse the loose status vocabulary the model and the HTTP layer use.
    /// Anything unrecognized means no filter.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "completed" | "done" => StatusFilter::Completed,
            "incomplete" | "pending" | "active" => StatusFilter::Incomplete,
            _ => StatusFilter::All,
        }
    }
}

impl std::fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Completed => write!(f, "completed"),
            StatusFilter::Incomplete => write!(f, "incomplete"),
        }
    }
}

/// Sort key for the HTTP task listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Title,
}

#[cfg(test)]
#[path = "models_tests.rs"]
mod tests;
