//! Storage abstraction for docdesk.
//!
//! Two traits split persistence by concern:
//!
//! - [`RecordStore`]: users, projects, assignments, documents and chat
//!   exchanges.
//! - [`ChunkStore`]: document chunks with their embeddings, plus the two
//!   retrieval primitives (vector similarity and keyword substring).
//!
//! Both backends implement both traits:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`sqlite::SqliteStore`] | production, via `sqlx` |
//! | [`memory::InMemoryStore`] | tests |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Failure contract
//!
//! Every method returns a [`Result`] except
//! [`ChunkStore::similarity_search`], which logs failures and returns an
//! empty list so retrieval can move on to the keyword fallback.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    Assignment, AssignmentStats, AssignmentStatus, AssignmentUpdate, ChatExchange, ChatSession,
    Chunk, ChunkMatch, Document, DocumentStatus, NewAssignment, NewDocument, Project, StatusUpdate,
    User,
};

/// Similarity reported for keyword matches. Not a measurement.
pub const DEFAULT_KEYWORD_SCORE: f64 = 0.8;

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Cheap round trip used at startup.
    async fn ping(&self) -> Result<()>;

    // ── Users ──

    /// Fails with `Conflict` if the email is already registered.
    async fn create_user(&self, email: &str, name: &str) -> Result<User>;
    async fn get_user(&self, id: &str) -> Result<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // ── Projects ──

    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> Result<Project>;
    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>>;

    // ── Assignments ──

    async fn create_assignment(&self, new: &NewAssignment) -> Result<Assignment>;
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>>;
    /// Assignments for a user, newest first.
    async fn list_assignments(&self, assignee_id: &str) -> Result<Vec<Assignment>>;
    /// Fails with `NotFound` if the assignment does not exist.
    async fn update_assignment(&self, id: &str, update: &AssignmentUpdate) -> Result<Assignment>;
    async fn delete_assignment(&self, id: &str) -> Result<bool>;

    async fn assignment_stats(&self, assignee_id: &str) -> Result<AssignmentStats> {
        let assignments = self.list_assignments(assignee_id).await?;
        let mut stats = AssignmentStats {
            total: assignments.len(),
            ..AssignmentStats::default()
        };
        let mut progress_sum = 0u64;
        for a in &assignments {
            match a.status {
                AssignmentStatus::Todo => stats.todo += 1,
                AssignmentStatus::InProgress => stats.in_progress += 1,
                AssignmentStatus::Completed => stats.completed += 1,
            }
            progress_sum += a.progress as u64;
        }
        if stats.total > 0 {
            stats.average_progress = progress_sum as f64 / stats.total as f64;
        }
        Ok(stats)
    }

    // ── Documents ──

    async fn create_document(&self, new: &NewDocument) -> Result<Document>;
    async fn get_document(&self, id: &str) -> Result<Option<Document>>;
    /// Documents owned by a user, newest first.
    async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>>;
    /// Documents in a given status, oldest first.
    async fn list_documents_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>>;
    /// Atomically move a document from `pending` to `processing`.
    ///
    /// Returns `false` if the document is missing or not pending, so only
    /// one caller ever processes it.
    async fn claim_for_processing(&self, id: &str) -> Result<bool>;
    /// Fails with `NotFound` if the document does not exist.
    async fn update_document_status(&self, id: &str, update: &StatusUpdate) -> Result<()>;
    /// Delete a document and its chunks. Returns `false` if it did not exist.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    // ── Chat ──

    async fn save_exchange(&self, exchange: &ChatExchange) -> Result<()>;
    /// A user's exchanges, newest first, optionally restricted to one session.
    async fn chat_history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatExchange>>;
    /// A user's sessions grouped from all their exchanges, most recently
    /// active first.
    async fn chat_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>>;
    /// Remove every exchange of a session. Returns how many were removed.
    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<u64>;
}

#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist one chunk, stamping `created_at`.
    ///
    /// Fails with `Conflict` on a duplicate `(document_id, chunk_index)` or
    /// a missing parent document.
    async fn put_chunk(&self, chunk: &Chunk) -> Result<Chunk>;

    /// All chunks of a document, ordered by index ascending.
    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Remove all chunks of a document. Returns how many were removed.
    async fn delete_chunks(&self, document_id: &str) -> Result<u64>;

    /// Chunks whose cosine similarity to `vector` is at least `threshold`,
    /// best first, at most `limit`. Empty on any failure.
    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Vec<ChunkMatch>;

    /// Case-insensitive substring match over chunk content.
    async fn text_search(&self, term: &str, limit: usize) -> Result<Vec<ChunkMatch>>;
}
