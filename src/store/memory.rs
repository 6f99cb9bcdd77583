//! In-memory [`RecordStore`] and [`ChunkStore`] for tests.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine similarity over all stored chunks.
//! Foreign-key rules of the SQLite schema are mirrored: chunks need an
//! existing parent document, and deleting a document removes its chunks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::error;
use uuid::Uuid;

use crate::embedding::cosine_similarity;
use crate::error::{Error, Result};
use crate::models::{
    Assignment, AssignmentStatus, AssignmentUpdate, ChatExchange, ChatSession, Chunk, ChunkMatch,
    Document, DocumentStatus, MatchOrigin, NewAssignment, NewDocument, Project, StatusUpdate, User,
};

use super::{ChunkStore, RecordStore, DEFAULT_KEYWORD_SCORE};

#[derive(Default)]
struct Records {
    users: HashMap<String, User>,
    projects: Vec<Project>,
    assignments: Vec<Assignment>,
    documents: Vec<Document>,
    exchanges: Vec<ChatExchange>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<Records>,
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, Records>> {
        self.records
            .read()
            .map_err(|_| Error::Store("record lock poisoned".into()))
    }

    fn records_mut(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        self.records
            .write()
            .map_err(|_| Error::Store("record lock poisoned".into()))
    }

    fn chunks(&self) -> Result<RwLockReadGuard<'_, Vec<Chunk>>> {
        self.chunks
            .read()
            .map_err(|_| Error::Store("chunk lock poisoned".into()))
    }

    fn chunks_mut(&self) -> Result<RwLockWriteGuard<'_, Vec<Chunk>>> {
        self.chunks
            .write()
            .map_err(|_| Error::Store("chunk lock poisoned".into()))
    }

    fn to_match(chunk: &Chunk, doc: &Document, similarity: f64, origin: MatchOrigin) -> ChunkMatch {
        ChunkMatch {
            id: chunk.id.clone(),
            document_id: chunk.document_id.clone(),
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
            document_title: doc.title.clone(),
            file_type: doc.file_type.clone(),
            similarity,
            origin,
        }
    }

    fn ranked_by_similarity(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<ChunkMatch>> {
        let records = self.records()?;
        let chunks = self.chunks()?;
        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .filter_map(|c| {
                let doc = records.documents.iter().find(|d| d.id == c.document_id)?;
                let sim = cosine_similarity(vector, &c.embedding) as f64;
                (sim >= threshold).then(|| Self::to_match(c, doc, sim, MatchOrigin::Vector))
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.records().map(|_| ())
    }

    async fn create_user(&self, email: &str, name: &str) -> Result<User> {
        let mut records = self.records_mut()?;
        if records.users.values().any(|u| u.email == email) {
            return Err(Error::Conflict(format!("email already registered: {}", email)));
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        records.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.records()?.users.get(id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .records()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> Result<Project> {
        let mut records = self.records_mut()?;
        if !records.users.contains_key(owner_id) {
            return Err(Error::NotFound(format!("user {}", owner_id)));
        }
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
        };
        records.projects.push(project.clone());
        Ok(project)
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        let records = self.records()?;
        let mut projects: Vec<Project> = records
            .projects
            .iter()
            .rev()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn create_assignment(&self, new: &NewAssignment) -> Result<Assignment> {
        let mut records = self.records_mut()?;
        if !records.users.contains_key(&new.assignee_id) {
            return Err(Error::NotFound(format!("user {}", new.assignee_id)));
        }
        let now = Utc::now();
        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            title: new.title.clone(),
            description: new.description.clone(),
            status: AssignmentStatus::Todo,
            priority: new.priority,
            progress: 0,
            due_date: new.due_date.clone(),
            assignee_id: new.assignee_id.clone(),
            project_id: new.project_id.clone(),
            created_at: now,
            updated_at: now,
        };
        records.assignments.push(assignment.clone());
        Ok(assignment)
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        Ok(self
            .records()?
            .assignments
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn list_assignments(&self, assignee_id: &str) -> Result<Vec<Assignment>> {
        let records = self.records()?;
        let mut out: Vec<Assignment> = records
            .assignments
            .iter()
            .rev()
            .filter(|a| a.assignee_id == assignee_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn update_assignment(&self, id: &str, update: &AssignmentUpdate) -> Result<Assignment> {
        let mut records = self.records_mut()?;
        let a = records
            .assignments
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::NotFound(format!("assignment {}", id)))?;
        if let Some(title) = &update.title {
            a.title = title.clone();
        }
        if let Some(description) = &update.description {
            a.description = Some(description.clone());
        }
        if let Some(status) = update.status {
            a.status = status;
        }
        if let Some(priority) = update.priority {
            a.priority = priority;
        }
        if let Some(progress) = update.progress {
            a.progress = progress.min(100);
        }
        if let Some(due) = &update.due_date {
            a.due_date = Some(due.clone());
        }
        a.updated_at = Utc::now();
        Ok(a.clone())
    }

    async fn delete_assignment(&self, id: &str) -> Result<bool> {
        let mut records = self.records_mut()?;
        let before = records.assignments.len();
        records.assignments.retain(|a| a.id != id);
        Ok(records.assignments.len() != before)
    }

    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
        let mut records = self.records_mut()?;
        if !records.users.contains_key(&new.owner_id) {
            return Err(Error::NotFound(format!("user {}", new.owner_id)));
        }
        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            title: new.title.clone(),
            file_type: new.file_type.clone(),
            file_size: new.file_size,
            owner_id: new.owner_id.clone(),
            content: new.content.clone(),
            status: new.status,
            error_message: new.error_message.clone(),
            chunk_count: 0,
            created_at: now,
            updated_at: now,
            processed_at: None,
        };
        records.documents.push(doc.clone());
        Ok(doc)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        Ok(self
            .records()?
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned())
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>> {
        let records = self.records()?;
        let mut out: Vec<Document> = records
            .documents
            .iter()
            .rev()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn list_documents_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        Ok(self
            .records()?
            .documents
            .iter()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    async fn claim_for_processing(&self, id: &str) -> Result<bool> {
        let mut records = self.records_mut()?;
        match records.documents.iter_mut().find(|d| d.id == id) {
            Some(doc) if doc.status == DocumentStatus::Pending => {
                doc.status = DocumentStatus::Processing;
                doc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_document_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        let mut records = self.records_mut()?;
        let doc = records
            .documents
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::NotFound(format!("document {}", id)))?;
        let now = Utc::now();
        match update {
            StatusUpdate::Completed { chunk_count } => {
                doc.status = DocumentStatus::Completed;
                doc.chunk_count = *chunk_count;
                doc.error_message = None;
                doc.processed_at = Some(now);
            }
            StatusUpdate::Failed { error } => {
                doc.status = DocumentStatus::Failed;
                doc.error_message = Some(error.clone());
            }
        }
        doc.updated_at = now;
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let removed = {
            let mut records = self.records_mut()?;
            let before = records.documents.len();
            records.documents.retain(|d| d.id != id);
            records.documents.len() != before
        };
        if removed {
            self.chunks_mut()?.retain(|c| c.document_id != id);
        }
        Ok(removed)
    }

    async fn save_exchange(&self, exchange: &ChatExchange) -> Result<()> {
        let mut records = self.records_mut()?;
        if !records.users.contains_key(&exchange.user_id) {
            return Err(Error::NotFound(format!("user {}", exchange.user_id)));
        }
        records.exchanges.push(exchange.clone());
        Ok(())
    }

    async fn chat_history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatExchange>> {
        let records = self.records()?;
        let mut out: Vec<ChatExchange> = records
            .exchanges
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .filter(|e| session_id.map_or(true, |s| e.session_id == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit);
        Ok(out)
    }

    async fn chat_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let records = self.records()?;
        // Insertion order is chronological, so the first exchange seen opens
        // the session.
        let mut sessions: HashMap<&str, ChatSession> = HashMap::new();
        for ex in records.exchanges.iter().filter(|e| e.user_id == user_id) {
            let entry = sessions.entry(ex.session_id.as_str()).or_insert_with(|| {
                ChatSession::new(ex.session_id.clone(), 0, ex.message.clone(), ex.created_at)
            });
            entry.message_count += 1;
            if ex.created_at > entry.last_message_at {
                entry.last_message_at = ex.created_at;
            }
        }

        let mut list: Vec<ChatSession> = sessions.into_values().collect();
        list.sort_by(|a, b| {
            b.last_message_at
                .cmp(&a.last_message_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(list)
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<u64> {
        let mut records = self.records_mut()?;
        let before = records.exchanges.len();
        records
            .exchanges
            .retain(|e| !(e.user_id == user_id && e.session_id == session_id));
        Ok((before - records.exchanges.len()) as u64)
    }
}

#[async_trait]
impl ChunkStore for InMemoryStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<Chunk> {
        if !self
            .records()?
            .documents
            .iter()
            .any(|d| d.id == chunk.document_id)
        {
            return Err(Error::Conflict(format!(
                "chunk references missing document {}",
                chunk.document_id
            )));
        }
        let mut chunks = self.chunks_mut()?;
        if chunks
            .iter()
            .any(|c| c.document_id == chunk.document_id && c.chunk_index == chunk.chunk_index)
        {
            return Err(Error::Conflict(format!(
                "chunk {} already exists for document {}",
                chunk.chunk_index, chunk.document_id
            )));
        }
        let mut stored = chunk.clone();
        stored.created_at = Utc::now();
        chunks.push(stored.clone());
        Ok(stored)
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let mut out: Vec<Chunk> = self
            .chunks()?
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let mut chunks = self.chunks_mut()?;
        let before = chunks.len();
        chunks.retain(|c| c.document_id != document_id);
        Ok((before - chunks.len()) as u64)
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Vec<ChunkMatch> {
        match self.ranked_by_similarity(vector, limit, threshold) {
            Ok(matches) => matches,
            Err(e) => {
                error!(error = %e, "Similarity search failed");
                Vec::new()
            }
        }
    }

    async fn text_search(&self, term: &str, limit: usize) -> Result<Vec<ChunkMatch>> {
        let needle = term.to_lowercase();
        if needle.trim().is_empty() {
            return Ok(Vec::new());
        }
        let records = self.records()?;
        let chunks = self.chunks()?;

        let mut hits: Vec<(&Chunk, &Document)> = chunks
            .iter()
            .filter(|c| c.content.to_lowercase().contains(&needle))
            .filter_map(|c| {
                records
                    .documents
                    .iter()
                    .find(|d| d.id == c.document_id)
                    .map(|d| (c, d))
            })
            .collect();
        hits.sort_by(|(ca, da), (cb, db)| {
            db.created_at
                .cmp(&da.created_at)
                .then(ca.chunk_index.cmp(&cb.chunk_index))
        });

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(c, d)| Self::to_match(c, d, DEFAULT_KEYWORD_SCORE, MatchOrigin::Keyword))
            .collect())
    }
}
