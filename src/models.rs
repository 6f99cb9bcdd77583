//! Core data models used throughout docdesk.
//!
//! These are the records that flow between the ingestion pipeline, the
//! stores and the assistant. Optional fields are `Option`s; closed sets
//! (document status, assignment status, priority) are enums that map to the
//! lowercase strings stored in the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::truncate_chars;

/// Free-form JSON object attached to chunks and extraction results.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentStatus {
    Todo,
    InProgress,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Todo => "todo",
            AssignmentStatus::InProgress => "in-progress",
            AssignmentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "todo" | "pending" => Some(AssignmentStatus::Todo),
            "in-progress" | "in_progress" => Some(AssignmentStatus::InProgress),
            "completed" | "done" => Some(AssignmentStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: AssignmentStatus,
    pub priority: Priority,
    /// Percent complete, 0–100.
    pub progress: u8,
    pub due_date: Option<String>,
    pub assignee_id: String,
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when creating an assignment. New assignments start as
/// `todo` with zero progress.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub assignee_id: String,
    pub project_id: Option<String>,
}

/// Partial update for an [`Assignment`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssignmentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<AssignmentStatus>,
    pub priority: Option<Priority>,
    pub progress: Option<u8>,
    pub due_date: Option<String>,
}

/// Per-user assignment counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AssignmentStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub average_progress: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }
}

/// An uploaded document and its processing state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub file_type: String,
    pub file_size: u64,
    pub owner_id: String,
    /// Extracted plain text; absent when extraction produced nothing.
    pub content: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Fields supplied when recording an upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub title: String,
    pub file_type: String,
    pub file_size: u64,
    pub owner_id: String,
    pub content: Option<String>,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
}

/// Status transition written back by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusUpdate {
    Completed { chunk_count: u32 },
    Failed { error: String },
}

/// A bounded text segment of a document paired with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: u32,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// How a [`ChunkMatch`] was found.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchOrigin {
    /// Ranked by vector similarity; the score is a real cosine similarity.
    Vector,
    /// Substring match; the score is the fixed keyword score, not a measurement.
    Keyword,
}

/// A ranked retrieval hit. Transient, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMatch {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub metadata: Metadata,
    pub document_title: String,
    pub file_type: String,
    pub similarity: f64,
    pub origin: MatchOrigin,
}

/// A source reference attached to a chat answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub document_title: String,
    pub content_preview: String,
    pub file_type: String,
}

/// One persisted chat turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatExchange {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Summary of one chat session, built from its exchanges.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatSession {
    pub session_id: String,
    pub message_count: usize,
    pub first_message: String,
    pub preview: String,
    pub last_message_at: DateTime<Utc>,
}

/// Characters of the opening message kept in [`ChatSession::preview`].
const SESSION_PREVIEW_CHARS: usize = 100;

impl ChatSession {
    pub fn new(
        session_id: String,
        message_count: usize,
        first_message: String,
        last_message_at: DateTime<Utc>,
    ) -> Self {
        let preview = if first_message.chars().count() > SESSION_PREVIEW_CHARS {
            format!("{}...", truncate_chars(&first_message, SESSION_PREVIEW_CHARS))
        } else {
            first_message.clone()
        };
        Self {
            session_id,
            message_count,
            first_message,
            preview,
            last_message_at,
        }
    }
}
