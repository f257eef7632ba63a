//! Core data models shared by the chunker, the vector store, and the
//! retriever.

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a chunk of text is: source code, prose paired with code, or
/// free-standing prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Code,
    Context,
    Prose,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Code => f.pad("code"),
            Role::Context => f.pad("context"),
            Role::Prose => f.pad("prose"),
        }
    }
}

/// Which of the three knowledge bases a store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Documentation of the language being translated from.
    Source,
    /// Documentation of the language being translated to.
    Target,
    /// Artifacts produced earlier in this project.
    Project,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Source => f.pad("source"),
            StoreKind::Target => f.pad("target"),
            StoreKind::Project => f.pad("project"),
        }
    }
}

/// A chunk waiting to be embedded and inserted into a store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewChunk {
    pub text: String,
    pub role: Role,
    pub origin_path: String,
    /// Paired prose for code chunks.
    pub context: Option<String>,
}

impl NewChunk {
    pub fn new(text: impl Into<String>, role: Role, origin_path: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            role,
            origin_path: origin_path.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// A chunk stored with its embedding. Immutable once inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// UUID v4.
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub role: Role,
    pub origin_path: String,
    /// Unix seconds.
    pub created_at: i64,
    pub context: Option<String>,
}

impl ChunkRecord {
    /// Create a record with a fresh UUID and the current timestamp.
    pub fn new(chunk: NewChunk, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: chunk.text,
            embedding,
            role: chunk.role,
            origin_path: chunk.origin_path,
            created_at: chrono::Utc::now().timestamp(),
            context: chunk.context,
        }
    }
}
