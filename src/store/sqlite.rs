//! SQLite-backed [`RecordStore`] and [`ChunkStore`].
//!
//! Timestamps are stored as Unix milliseconds, embeddings as little-endian
//! f32 BLOBs, and chunk metadata / chat sources as JSON text. Foreign keys
//! are enforced by the pool (see [`crate::db::connect`]), so deleting a
//! document cascades to its chunks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{error, warn};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{
    Assignment, AssignmentStatus, AssignmentUpdate, ChatExchange, ChatSession, Chunk, ChunkMatch,
    Document, DocumentStatus, MatchOrigin, Metadata, NewAssignment, NewDocument, Priority, Project,
    StatusUpdate, User,
};

use super::{ChunkStore, RecordStore, DEFAULT_KEYWORD_SCORE};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn vector_candidates(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Result<Vec<ChunkMatch>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.content, c.metadata_json, c.embedding,
                   d.title AS document_title, d.file_type
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.dims = ?
            "#,
        )
        .bind(vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut matches = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            let similarity = cosine_similarity(vector, &blob_to_vec(&blob)) as f64;
            if similarity >= threshold {
                matches.push(match_from_row(row, similarity, MatchOrigin::Vector)?);
            }
        }

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }
}

// ============ Row mapping ============

fn ts(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn parse_metadata(json: &str) -> Metadata {
    serde_json::from_str(json).unwrap_or_default()
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        created_at: ts(row.try_get("created_at")?),
    })
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        owner_id: row.try_get("owner_id")?,
        created_at: ts(row.try_get("created_at")?),
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<Assignment> {
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let progress: i64 = row.try_get("progress")?;
    Ok(Assignment {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: AssignmentStatus::parse(&status)
            .ok_or_else(|| Error::Store(format!("unknown assignment status: {}", status)))?,
        priority: Priority::parse(&priority)
            .ok_or_else(|| Error::Store(format!("unknown priority: {}", priority)))?,
        progress: progress.clamp(0, 100) as u8,
        due_date: row.try_get("due_date")?,
        assignee_id: row.try_get("assignee_id")?,
        project_id: row.try_get("project_id")?,
        created_at: ts(row.try_get("created_at")?),
        updated_at: ts(row.try_get("updated_at")?),
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document> {
    let status: String = row.try_get("status")?;
    let file_size: i64 = row.try_get("file_size")?;
    let chunk_count: i64 = row.try_get("chunk_count")?;
    let processed_at: Option<i64> = row.try_get("processed_at")?;
    Ok(Document {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        file_type: row.try_get("file_type")?,
        file_size: file_size.max(0) as u64,
        owner_id: row.try_get("owner_id")?,
        content: row.try_get("content")?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| Error::Store(format!("unknown document status: {}", status)))?,
        error_message: row.try_get("error_message")?,
        chunk_count: chunk_count.max(0) as u32,
        created_at: ts(row.try_get("created_at")?),
        updated_at: ts(row.try_get("updated_at")?),
        processed_at: processed_at.map(ts),
    })
}

fn chunk_from_row(row: &SqliteRow) -> Result<Chunk> {
    let index: i64 = row.try_get("chunk_index")?;
    let blob: Vec<u8> = row.try_get("embedding")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(Chunk {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        chunk_index: index.max(0) as u32,
        content: row.try_get("content")?,
        embedding: blob_to_vec(&blob),
        metadata: parse_metadata(&metadata_json),
        created_at: ts(row.try_get("created_at")?),
    })
}

fn match_from_row(row: &SqliteRow, similarity: f64, origin: MatchOrigin) -> Result<ChunkMatch> {
    let metadata_json: String = row.try_get("metadata_json")?;
    Ok(ChunkMatch {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        content: row.try_get("content")?,
        metadata: parse_metadata(&metadata_json),
        document_title: row.try_get("document_title")?,
        file_type: row.try_get("file_type")?,
        similarity,
        origin,
    })
}

fn exchange_from_row(row: &SqliteRow) -> Result<ChatExchange> {
    let sources_json: String = row.try_get("sources_json")?;
    Ok(ChatExchange {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        response: row.try_get("response")?,
        sources: serde_json::from_str(&sources_json).unwrap_or_default(),
        session_id: row.try_get("session_id")?,
        created_at: ts(row.try_get("created_at")?),
    })
}

const DOCUMENT_COLUMNS: &str = "id, title, file_type, file_size, owner_id, content, status, \
     error_message, chunk_count, created_at, updated_at, processed_at";

const ASSIGNMENT_COLUMNS: &str = "id, title, description, status, priority, progress, due_date, \
     assignee_id, project_id, created_at, updated_at";

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_user(&self, email: &str, name: &str) -> Result<User> {
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query("INSERT INTO users (id, email, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.email)
            .bind(&user.name)
            .bind(user.created_at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::Conflict(format!("email already registered: {}", email))
                } else {
                    e.into()
                }
            })?;
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_project(
        &self,
        name: &str,
        description: Option<&str>,
        owner_id: &str,
    ) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO projects (id, name, description, owner_id, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.owner_id)
        .bind(project.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("user {}", owner_id))
            } else {
                e.into()
            }
        })?;
        Ok(project)
    }

    async fn list_projects(&self, owner_id: &str) -> Result<Vec<Project>> {
        let rows = sqlx::query(
            "SELECT id, name, description, owner_id, created_at FROM projects \
             WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(project_from_row).collect()
    }

    async fn create_assignment(&self, new: &NewAssignment) -> Result<Assignment> {
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
        sqlx::query(&format!(
            "INSERT INTO assignments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ASSIGNMENT_COLUMNS
        ))
        .bind(&assignment.id)
        .bind(&assignment.title)
        .bind(&assignment.description)
        .bind(assignment.status.as_str())
        .bind(assignment.priority.as_str())
        .bind(assignment.progress as i64)
        .bind(&assignment.due_date)
        .bind(&assignment.assignee_id)
        .bind(&assignment.project_id)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("user {}", new.assignee_id))
            } else {
                e.into()
            }
        })?;
        Ok(assignment)
    }

    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE id = ?",
            ASSIGNMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn list_assignments(&self, assignee_id: &str) -> Result<Vec<Assignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM assignments WHERE assignee_id = ? ORDER BY created_at DESC, rowid DESC",
            ASSIGNMENT_COLUMNS
        ))
        .bind(assignee_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(assignment_from_row).collect()
    }

    async fn update_assignment(&self, id: &str, update: &AssignmentUpdate) -> Result<Assignment> {
        let result = sqlx::query(
            r#"
            UPDATE assignments SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                status = COALESCE(?, status),
                priority = COALESCE(?, priority),
                progress = COALESCE(?, progress),
                due_date = COALESCE(?, due_date),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&update.title)
        .bind(&update.description)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.priority.map(|p| p.as_str()))
        .bind(update.progress.map(|p| p.min(100) as i64))
        .bind(&update.due_date)
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("assignment {}", id)));
        }
        self.get_assignment(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("assignment {}", id)))
    }

    async fn delete_assignment(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_document(&self, new: &NewDocument) -> Result<Document> {
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
        sqlx::query(&format!(
            "INSERT INTO documents ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            DOCUMENT_COLUMNS
        ))
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.file_type)
        .bind(doc.file_size as i64)
        .bind(&doc.owner_id)
        .bind(&doc.content)
        .bind(doc.status.as_str())
        .bind(&doc.error_message)
        .bind(0i64)
        .bind(now.timestamp_millis())
        .bind(now.timestamp_millis())
        .bind(None::<i64>)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("user {}", new.owner_id))
            } else {
                e.into()
            }
        })?;
        Ok(doc)
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
            DOCUMENT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn list_documents_by_status(&self, status: DocumentStatus) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents WHERE status = ? ORDER BY created_at ASC, rowid ASC",
            DOCUMENT_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn claim_for_processing(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = 'processing', updated_at = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_document_status(&self, id: &str, update: &StatusUpdate) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let query = match update {
            StatusUpdate::Completed { chunk_count } => sqlx::query(
                "UPDATE documents SET status = 'completed', chunk_count = ?, error_message = NULL, \
                 processed_at = ?, updated_at = ? WHERE id = ?",
            )
            .bind(*chunk_count as i64)
            .bind(now)
            .bind(now)
            .bind(id),
            StatusUpdate::Failed { error } => sqlx::query(
                "UPDATE documents SET status = 'failed', error_message = ?, updated_at = ? WHERE id = ?",
            )
            .bind(error)
            .bind(now)
            .bind(id),
        };
        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("document {}", id)));
        }
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_exchange(&self, exchange: &ChatExchange) -> Result<()> {
        let sources_json = serde_json::to_string(&exchange.sources)?;
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, user_id, message, response, sources_json, session_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&exchange.id)
        .bind(&exchange.user_id)
        .bind(&exchange.message)
        .bind(&exchange.response)
        .bind(&sources_json)
        .bind(&exchange.session_id)
        .bind(exchange.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::NotFound(format!("user {}", exchange.user_id))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn chat_history(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ChatExchange>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, message, response, sources_json, session_id, created_at
            FROM chat_messages
            WHERE user_id = ? AND (? IS NULL OR session_id = ?)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(session_id)
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(exchange_from_row).collect()
    }

    async fn chat_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            r#"
            SELECT m.session_id,
                   COUNT(*) AS message_count,
                   MAX(m.created_at) AS last_message_at,
                   (SELECT f.message FROM chat_messages f
                    WHERE f.user_id = m.user_id AND f.session_id = m.session_id
                    ORDER BY f.created_at ASC, f.rowid ASC
                    LIMIT 1) AS first_message
            FROM chat_messages m
            WHERE m.user_id = ?
            GROUP BY m.session_id
            ORDER BY last_message_at DESC, m.session_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ChatSession> {
                let count: i64 = row.try_get("message_count")?;
                Ok(ChatSession::new(
                    row.try_get("session_id")?,
                    count.max(0) as usize,
                    row.try_get("first_message")?,
                    ts(row.try_get("last_message_at")?),
                ))
            })
            .collect()
    }

    async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE user_id = ? AND session_id = ?")
            .bind(user_id)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn put_chunk(&self, chunk: &Chunk) -> Result<Chunk> {
        let mut stored = chunk.clone();
        stored.created_at = Utc::now();
        let metadata_json = serde_json::to_string(&stored.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, content, content_lower, embedding,
                                dims, metadata_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&stored.id)
        .bind(&stored.document_id)
        .bind(stored.chunk_index as i64)
        .bind(&stored.content)
        .bind(stored.content.to_lowercase())
        .bind(vec_to_blob(&stored.embedding))
        .bind(stored.embedding.len() as i64)
        .bind(&metadata_json)
        .bind(stored.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) || is_foreign_key_violation(&e) {
                warn!(
                    document_id = %chunk.document_id,
                    index = chunk.chunk_index,
                    error = %e,
                    "Chunk insert rejected"
                );
                Error::Conflict(format!(
                    "cannot store chunk {} of document {}",
                    chunk.chunk_index, chunk.document_id
                ))
            } else {
                e.into()
            }
        })?;

        Ok(stored)
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, chunk_index, content, embedding, metadata_json, created_at
            FROM chunks WHERE document_id = ? ORDER BY chunk_index ASC
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }

    async fn delete_chunks(&self, document_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f64,
    ) -> Vec<ChunkMatch> {
        match self.vector_candidates(vector, limit, threshold).await {
            Ok(matches) => matches,
            Err(e) => {
                error!(error = %e, "Similarity search failed");
                Vec::new()
            }
        }
    }

    async fn text_search(&self, term: &str, limit: usize) -> Result<Vec<ChunkMatch>> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        // content_lower is folded in Rust at insert time; SQLite's lower()
        // only folds ASCII.
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.content, c.metadata_json,
                   d.title AS document_title, d.file_type
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE instr(c.content_lower, ?) > 0
            ORDER BY d.created_at DESC, c.chunk_index ASC
            LIMIT ?
            "#,
        )
        .bind(term.to_lowercase())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| match_from_row(row, DEFAULT_KEYWORD_SCORE, MatchOrigin::Keyword))
            .collect()
    }
}
