//! Ingestion pipeline orchestration.
//!
//! Coordinates the upload flow: extraction → document record → status
//! claim → chunking → embedding → chunk storage → status write-back.
//!
//! Concurrent processing of one document is prevented by
//! [`RecordStore::claim_for_processing`]; whoever loses the claim skips the
//! document. Processing always starts by clearing the document's existing
//! chunks, and the first failed chunk write aborts the run and removes
//! what was written, so stored indices stay `0..N-1`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunk::build_chunks;
use crate::config::ChunkingConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{Error, Result};
use crate::extract::{extract_text, ExtractionMetadata};
use crate::models::{Document, DocumentStatus, Metadata, NewDocument, StatusUpdate};
use crate::store::{ChunkStore, RecordStore};

/// Result of chunking and embedding one document's text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOutcome {
    pub success: bool,
    /// Windows produced by the chunker, blank ones included.
    pub total_chunks: usize,
    /// Chunks actually stored.
    pub processed_chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document: Document,
    pub extraction: ExtractionMetadata,
    /// Absent when nothing was extracted or the claim was lost.
    pub processing: Option<ProcessOutcome>,
}

/// Counters reported by [`Ingestor::process_pending`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PendingReport {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct Ingestor {
    records: Arc<dyn RecordStore>,
    chunks: Arc<dyn ChunkStore>,
    embedder: EmbeddingClient,
    chunking: ChunkingConfig,
}

impl Ingestor {
    pub fn new(
        records: Arc<dyn RecordStore>,
        chunks: Arc<dyn ChunkStore>,
        embedder: EmbeddingClient,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            records,
            chunks,
            embedder,
            chunking,
        }
    }

    /// Chunk, embed and store `content` for an existing document.
    ///
    /// Does not touch the document's status; see [`upload`](Self::upload)
    /// and [`process_pending`](Self::process_pending) for that.
    pub async fn process_document(
        &self,
        content: &str,
        document_id: &str,
        metadata: &Metadata,
    ) -> ProcessOutcome {
        if let Err(e) = self.chunks.delete_chunks(document_id).await {
            error!(document_id, error = %e, "Failed to clear existing chunks");
            return ProcessOutcome {
                success: false,
                total_chunks: 0,
                processed_chunks: 0,
                error: Some(e.summary()),
            };
        }

        let (total, chunks) = build_chunks(document_id, content, &self.chunking, metadata);
        info!(document_id, total, kept = chunks.len(), "Created chunks");

        let mut processed = 0usize;
        for mut chunk in chunks {
            chunk.embedding = self.embedder.embed(&chunk.content).await;
            match self.chunks.put_chunk(&chunk).await {
                Ok(_) => {
                    processed += 1;
                    debug!(document_id, index = chunk.chunk_index, "Saved chunk");
                }
                Err(e) => {
                    error!(
                        document_id,
                        index = chunk.chunk_index,
                        error = %e,
                        "Chunk write failed, aborting"
                    );
                    if let Err(cleanup) = self.chunks.delete_chunks(document_id).await {
                        error!(document_id, error = %cleanup, "Failed to remove partial chunks");
                    }
                    return ProcessOutcome {
                        success: false,
                        total_chunks: total,
                        processed_chunks: 0,
                        error: Some(e.summary()),
                    };
                }
            }
        }

        info!(document_id, processed, "Processed document");
        ProcessOutcome {
            success: true,
            total_chunks: total,
            processed_chunks: processed,
            error: None,
        }
    }

    /// Extract, record and process an uploaded file.
    ///
    /// Extraction problems are not errors: the document is recorded as
    /// `failed` with the extraction error. Only store failures while
    /// creating the record are returned.
    pub async fn upload(
        &self,
        owner_id: &str,
        filename: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<UploadOutcome> {
        let extraction = extract_text(bytes, content_type, filename);
        let has_text = !extraction.text.trim().is_empty();

        let file_type = if extraction.metadata.content_type.is_empty() {
            content_type.to_string()
        } else {
            extraction.metadata.content_type.clone()
        };

        let new = NewDocument {
            title: filename.to_string(),
            file_type: file_type.clone(),
            file_size: bytes.len() as u64,
            owner_id: owner_id.to_string(),
            content: has_text.then(|| extraction.text.clone()),
            status: if has_text {
                DocumentStatus::Pending
            } else {
                DocumentStatus::Failed
            },
            error_message: if has_text {
                None
            } else {
                Some(
                    extraction
                        .metadata
                        .error
                        .clone()
                        .unwrap_or_else(|| "No text could be extracted".to_string()),
                )
            },
        };
        let document = self.records.create_document(&new).await?;
        info!(document_id = %document.id, filename, has_text, "Recorded upload");

        let processing = if has_text {
            let mut metadata = Metadata::new();
            metadata.insert("filename".into(), filename.into());
            metadata.insert("file_type".into(), file_type.into());
            metadata.insert("uploaded_by".into(), owner_id.into());
            metadata.insert(
                "extraction_metadata".into(),
                serde_json::to_value(&extraction.metadata)?,
            );
            self.run_claimed(&document.id, &extraction.text, &metadata)
                .await?
        } else {
            None
        };

        let document = self
            .records
            .get_document(&document.id)
            .await?
            .unwrap_or(document);

        Ok(UploadOutcome {
            document,
            extraction: extraction.metadata,
            processing,
        })
    }

    /// Process every `pending` document that has stored text.
    pub async fn process_pending(&self) -> Result<PendingReport> {
        let pending = self
            .records
            .list_documents_by_status(DocumentStatus::Pending)
            .await?;
        info!(count = pending.len(), "Processing pending documents");

        let mut report = PendingReport::default();
        for doc in pending {
            let content = match doc.content.as_deref() {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    warn!(document_id = %doc.id, "Pending document has no content");
                    self.records
                        .update_document_status(
                            &doc.id,
                            &StatusUpdate::Failed {
                                error: "No content to process".to_string(),
                            },
                        )
                        .await?;
                    report.failed += 1;
                    continue;
                }
            };

            let mut metadata = Metadata::new();
            metadata.insert("filename".into(), doc.title.clone().into());
            metadata.insert("file_type".into(), doc.file_type.clone().into());
            metadata.insert("uploaded_by".into(), doc.owner_id.clone().into());

            match self.run_claimed(&doc.id, content, &metadata).await? {
                Some(outcome) if outcome.success => report.processed += 1,
                Some(_) => report.failed += 1,
                None => report.skipped += 1,
            }
        }
        Ok(report)
    }

    /// Delete a document owned by `owner_id`, chunks included.
    pub async fn delete_document(&self, owner_id: &str, document_id: &str) -> Result<()> {
        match self.records.get_document(document_id).await? {
            Some(doc) if doc.owner_id == owner_id => {
                self.records.delete_document(document_id).await?;
                info!(document_id, "Deleted document");
                Ok(())
            }
            _ => Err(Error::NotFound(format!("document {}", document_id))),
        }
    }

    /// Claim, process, and write back the final status.
    /// `None` when another worker holds the claim.
    async fn run_claimed(
        &self,
        document_id: &str,
        content: &str,
        metadata: &Metadata,
    ) -> Result<Option<ProcessOutcome>> {
        if !self.records.claim_for_processing(document_id).await? {
            warn!(document_id, "Document already claimed, skipping");
            return Ok(None);
        }

        let mut outcome = self.process_document(content, document_id, metadata).await;
        let update = if outcome.success {
            StatusUpdate::Completed {
                chunk_count: outcome.processed_chunks as u32,
            }
        } else {
            StatusUpdate::Failed {
                error: outcome
                    .error
                    .clone()
                    .unwrap_or_else(|| "Processing failed".to_string()),
            }
        };
        if let Err(e) = self.records.update_document_status(document_id, &update).await {
            error!(document_id, error = %e, "Failed to record processing result");
            self.release_failed(document_id, &outcome, &e).await;
            outcome.success = false;
            outcome.processed_chunks = 0;
            outcome.error = Some(e.summary());
        }
        Ok(Some(outcome))
    }

    /// Best-effort move out of `processing` after the status write-back
    /// failed. Only `completed` documents keep chunks, so any stored by this
    /// run are removed before the document is marked `failed`.
    async fn release_failed(&self, document_id: &str, outcome: &ProcessOutcome, cause: &Error) {
        if outcome.success {
            if let Err(e) = self.chunks.delete_chunks(document_id).await {
                error!(document_id, error = %e, "Failed to remove chunks of unrecorded run");
            }
        }
        let update = StatusUpdate::Failed {
            error: cause.summary(),
        };
        if let Err(e) = self.records.update_document_status(document_id, &update).await {
            error!(document_id, error = %e, "Document left in processing state");
        }
    }
}
