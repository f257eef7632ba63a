//! # autot core
//!
//! Shared logic for autot: data models, code detection and chunking, the
//! vector store with its persisted schema, three-context retrieval, prompt
//! assembly, response parsing, and artifact normalization.
//!
//! This crate contains no tokio, networking, or filesystem walking. The
//! embedding and generation calls are reached through the [`Embedder`] and
//! [`Generator`] traits, implemented by the application crate (and by
//! deterministic doubles in tests).
//!
//! ```text
//! seed docs ──▶ Chunker ──▶ VectorStore (source / target)
//!                                 │
//! input file ──▶ retrieve ◀───────┤◀── VectorStore (project) ◀── ingest
//!                   │                                             ▲
//!                   ▼                                             │
//!               assemble ──▶ Generator ──▶ parse ─────────────────┘
//! ```

pub mod chunk;
pub mod detect;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod models;
pub mod normalize;
pub mod parse;
pub mod prompt;
pub mod retrieve;
pub mod store;

pub use embedding::Embedder;
pub use error::{Error, Result, StoreIoError};
pub use generate::Generator;
