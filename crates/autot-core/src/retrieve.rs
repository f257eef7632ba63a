//! Three-context retrieval.
//!
//! One embedding of the query text is issued against the Source, Target,
//! and Project stores with a per-store K. The three result lists stay
//! separate; nothing is merged or re-ranked across stores.

use crate::chunk::snap_to_char_boundary;
use crate::embedding::{embed_one, Embedder};
use crate::error::Result;
use crate::models::ChunkRecord;
use crate::store::VectorStore;

/// Top-K per store. Values `<= 0` disable that section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalK {
    pub source: i64,
    pub target: i64,
    pub project: i64,
}

impl Default for RetrievalK {
    fn default() -> Self {
        Self {
            source: 5,
            target: 5,
            project: 3,
        }
    }
}

/// A retrieved record with its cosine similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub record: ChunkRecord,
    pub similarity: f32,
}

/// Per-job retrieval result, each list in descending similarity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBundle {
    pub source: Vec<RetrievedChunk>,
    pub target: Vec<RetrievedChunk>,
    pub project: Vec<RetrievedChunk>,
}

impl ContextBundle {
    pub fn len(&self) -> usize {
        self.source.len() + self.target.len() + self.project.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cut `text` to at most `max_chars` bytes, preferring a line break.
///
/// The excerpt is what gets embedded as the query, so it stays within the
/// embedding model's input window. `max_chars == 0` keeps the whole text.
pub fn representative_excerpt(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 || text.len() <= max_chars {
        return text;
    }
    let end = snap_to_char_boundary(text, max_chars);
    match text[..end].rfind('\n') {
        Some(nl) if nl > end / 2 => &text[..nl],
        _ => &text[..end],
    }
}

/// Embed `query_text` once and query each store with its own K.
///
/// Read-only over all three stores. An embedding failure fails the whole
/// retrieval.
pub async fn retrieve(
    embedder: &dyn Embedder,
    query_text: &str,
    source: &VectorStore,
    target: &VectorStore,
    project: &VectorStore,
    k: RetrievalK,
) -> Result<ContextBundle> {
    let vector = embed_one(embedder, query_text).await?;

    let bundle = ContextBundle {
        source: collect(source, &vector, k.source)?,
        target: collect(target, &vector, k.target)?,
        project: collect(project, &vector, k.project)?,
    };

    tracing::debug!(
        source = bundle.source.len(),
        target = bundle.target.len(),
        project = bundle.project.len(),
        "retrieved context"
    );
    Ok(bundle)
}

fn collect(store: &VectorStore, vector: &[f32], k: i64) -> Result<Vec<RetrievedChunk>> {
    Ok(store
        .query(vector, k)?
        .into_iter()
        .map(|s| RetrievedChunk {
            record: s.record.clone(),
            similarity: s.similarity,
        })
        .collect())
}
