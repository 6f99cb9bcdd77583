//! Error types shared by the store, provider and pipeline layers.
//!
//! Most of the retrieval and assistant surface never returns these to its
//! caller: they are logged and replaced by the next fallback. They do flow
//! out of the record store, the provider clients and startup.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// One-line description safe to show to an end user.
    ///
    /// Raw driver or provider text is reduced to its category and cut at
    /// 120 characters.
    pub fn summary(&self) -> String {
        let text = match self {
            Error::NotFound(what) => format!("not found: {}", what),
            Error::Conflict(what) => format!("conflict: {}", what),
            Error::Sql(_) | Error::Store(_) => "storage unavailable".to_string(),
            Error::Http(_) | Error::Provider(_) => "AI provider unavailable".to_string(),
            other => other.to_string(),
        };
        truncate_chars(&text, 120)
    }
}

/// Truncate to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
