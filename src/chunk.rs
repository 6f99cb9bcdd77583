//! Fixed-size overlapping character chunker.
//!
//! Windows are counted in Unicode scalar values, never bytes, so a window
//! boundary can't split a code point. Each window is `chunk_size` characters
//! long and starts `chunk_size - chunk_overlap` characters after the previous
//! one; the last window is cut at the end of the text.
//!
//! [`build_chunks`] drops whitespace-only windows and numbers the survivors
//! `0..N-1`, so stored chunk indices are always contiguous regardless of
//! how many windows were discarded.

use chrono::Utc;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::models::{Chunk, Metadata};

/// Split `text` into overlapping windows of `size` characters.
///
/// `overlap` must be smaller than `size`; configuration loading enforces
/// this. An empty text yields no windows.
pub fn split_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(chars.len());
        windows.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    windows
}

/// Split a document's text into storable chunks.
///
/// Returns the number of windows produced before filtering, and the
/// non-blank chunks with contiguous indices. Each chunk's metadata is
/// `metadata` plus `chunk_index`. Embeddings are left empty for the caller
/// to fill.
pub fn build_chunks(
    document_id: &str,
    text: &str,
    config: &ChunkingConfig,
    metadata: &Metadata,
) -> (usize, Vec<Chunk>) {
    let windows = split_text(text, config.chunk_size, config.chunk_overlap);
    let total = windows.len();

    let chunks = windows
        .into_iter()
        .filter(|w| !w.trim().is_empty())
        .enumerate()
        .map(|(index, content)| {
            let mut meta = metadata.clone();
            meta.insert("chunk_index".to_string(), serde_json::json!(index));
            Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: document_id.to_string(),
                chunk_index: index as u32,
                content,
                embedding: Vec::new(),
                metadata: meta,
                created_at: Utc::now(),
            }
        })
        .collect();

    (total, chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        }
    }

    #[test]
    fn test_empty_text_has_no_windows() {
        assert!(split_text("", 800, 150).is_empty());
    }

    #[test]
    fn test_short_text_single_window() {
        let windows = split_text("Hello, world!", 800, 150);
        assert_eq!(windows, vec!["Hello, world!"]);
    }

    #[test]
    fn test_two_thousand_chars_three_windows_with_overlap() {
        let text: String = (0..2000)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let windows = split_text(&text, 800, 150);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].chars().count(), 800);

        let tail: String = windows[0].chars().skip(650).collect();
        let head: String = windows[1].chars().take(150).collect();
        assert_eq!(tail, head);

        assert!(text.ends_with(windows[2].as_str()));
    }

    #[test]
    fn test_windows_count_chars_not_bytes() {
        let text = "é".repeat(10);
        let windows = split_text(&text, 4, 1);
        assert!(windows.iter().all(|w| w.chars().count() <= 4));
        assert_eq!(windows[0], "éééé");
    }

    #[test]
    fn test_blank_windows_dropped_and_indices_contiguous() {
        let text = format!("{}{}{}", "a".repeat(10), " ".repeat(30), "b".repeat(10));
        let (total, chunks) = build_chunks("doc1", &text, &config(10, 0), &Metadata::new());
        assert_eq!(total, 5);
        assert_eq!(chunks.len(), 2);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as u32);
            assert_eq!(c.metadata["chunk_index"], serde_json::json!(i));
        }
    }

    #[test]
    fn test_metadata_is_merged() {
        let mut meta = Metadata::new();
        meta.insert("filename".into(), serde_json::json!("notes.txt"));
        let (_, chunks) = build_chunks("doc1", "some text", &config(800, 150), &meta);
        assert_eq!(chunks[0].metadata["filename"], "notes.txt");
        assert_eq!(chunks[0].document_id, "doc1");
    }
}
