//! # docdesk
//!
//! Document ingestion, retrieval and a grounded assistant for a small
//! document and assignment workspace.
//!
//! Uploaded files are turned into plain text, split into overlapping
//! chunks, embedded and stored in SQLite. Questions are answered from the
//! best-matching chunks together with the user's assignments and
//! documents; every external dependency (embedding API, chat API) has a
//! degraded mode so the system keeps answering without it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌──────────┐
//! │ extract  │──▶│  chunk  │──▶│ embedding  │──▶│  store   │
//! │ PDF/DOCX │   │ windows │   │  (OpenAI)  │   │  SQLite  │
//! └──────────┘   └─────────┘   └────────────┘   └────┬─────┘
//!                                                    │
//!                                 ┌──────────────────┤
//!                                 ▼                  ▼
//!                          ┌────────────┐     ┌────────────┐
//!                          │ retrieval  │────▶│ assistant  │
//!                          │ vec → kw   │     │ chat/plan  │
//!                          └────────────┘     └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`app`] | Component wiring |
//! | [`assistant`] | Chat answers, insights, sessions |
//! | [`chunk`] | Overlapping text windows |
//! | [`completion`] | Chat completion provider |
//! | [`config`] | TOML configuration |
//! | [`db`] | SQLite connection |
//! | [`embedding`] | Embedding provider and vector helpers |
//! | [`error`] | Crate error type |
//! | [`extract`] | Text extraction per file type |
//! | [`http`] | Shared HTTP retry policy |
//! | [`ingest`] | Upload and processing pipeline |
//! | [`migrate`] | Schema migrations |
//! | [`models`] | Core data types |
//! | [`retrieval`] | Vector search with keyword fallback |
//! | [`store`] | Storage traits and backends |

pub mod app;
pub mod assistant;
pub mod chunk;
pub mod completion;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod http;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod store;
