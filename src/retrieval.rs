//! Query-time retrieval with vector → keyword → per-word fallback.
//!
//! ```text
//! query ──► embed ──► similarity_search(threshold) ──► hits? ──► return
//!   │  (no provider)                                     │ none
//!   └──────────────────────────────────────────────┐     ▼
//!                                          text_search(full query) ──► hits? ──► return
//!                                                                        │ none, >1 word
//!                                                                        ▼
//!                                  text_search(word) for each word longer than 2 chars,
//!                                  deduplicated by chunk id, until `limit` is reached
//! ```
//!
//! Keyword hits carry the configured keyword score (0.8 by default) and
//! [`MatchOrigin::Keyword`]; that score is a constant, not a relevance
//! measurement. Retrieval never returns an error: store failures on the
//! keyword path are logged and yield an empty list.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{truncate_chars, Result};
use crate::models::{ChunkMatch, MatchOrigin};
use crate::store::ChunkStore;

/// Words this short are skipped by the per-word fallback.
const MIN_FALLBACK_WORD_CHARS: usize = 3;

#[derive(Clone)]
pub struct Retriever {
    chunks: Arc<dyn ChunkStore>,
    embedder: EmbeddingClient,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        embedder: EmbeddingClient,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            chunks,
            embedder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Up to `limit` chunks relevant to `query`, best first.
    pub async fn search_similar_chunks(&self, query: &str, limit: usize) -> Vec<ChunkMatch> {
        let short_query = truncate_chars(query, 50);
        if limit == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        if self.embedder.is_available() {
            let vector = self.embedder.embed(query).await;
            let hits = self
                .chunks
                .similarity_search(&vector, limit, self.config.similarity_threshold)
                .await;
            if !hits.is_empty() {
                info!(query = %short_query, count = hits.len(), "Found chunks via vector search");
                return hits;
            }
        }

        info!(query = %short_query, "Using text search fallback");
        match self.keyword_fallback(query, limit).await {
            Ok(hits) => {
                info!(query = %short_query, count = hits.len(), "Found chunks via text search");
                hits
            }
            Err(e) => {
                warn!(query = %short_query, error = %e, "Text search failed");
                Vec::new()
            }
        }
    }

    async fn keyword_fallback(&self, query: &str, limit: usize) -> Result<Vec<ChunkMatch>> {
        let mut hits = self.chunks.text_search(query, limit).await?;

        let words: Vec<&str> = query.split_whitespace().collect();
        if hits.is_empty() && words.len() > 1 {
            let mut seen: HashSet<String> = HashSet::new();
            'words: for word in words {
                if word.chars().count() < MIN_FALLBACK_WORD_CHARS {
                    continue;
                }
                for hit in self.chunks.text_search(word, limit).await? {
                    if seen.insert(hit.id.clone()) {
                        hits.push(hit);
                        if hits.len() >= limit {
                            break 'words;
                        }
                    }
                }
            }
        }

        for hit in &mut hits {
            hit.similarity = self.config.keyword_score;
            hit.origin = MatchOrigin::Keyword;
        }
        Ok(hits)
    }
}
