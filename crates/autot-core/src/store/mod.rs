//! In-memory vector store with cosine top-K search.
//!
//! A [`VectorStore`] holds the [`ChunkRecord`]s of one knowledge base
//! (Source, Target, or Project) in insertion order. Search is brute-force
//! cosine similarity over every record, which is exact and deterministic.
//!
//! # Invariants
//!
//! - Every embedding has the store's dimensionality and finite components.
//! - No two records share a `(text, origin_path)` pair; [`VectorStore::add`]
//!   is a no-op for a pair already present.
//!
//! Persistence goes through [`schema::PersistedStore`]; the app crate owns
//! the file I/O.

pub mod schema;

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::embedding::{check_vector, cosine_similarity, Embedder};
use crate::error::Result;
use crate::models::{ChunkRecord, NewChunk, StoreKind};

/// A record paired with its similarity to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<'a> {
    pub record: &'a ChunkRecord,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct VectorStore {
    kind: StoreKind,
    model: String,
    dims: usize,
    records: Vec<ChunkRecord>,
    keys: HashSet<String>,
}

impl VectorStore {
    /// An empty store for embeddings of `dims` dimensions from `model`.
    pub fn new(kind: StoreKind, model: impl Into<String>, dims: usize) -> Self {
        Self {
            kind,
            model: model.into(),
            dims,
            records: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Embed `chunks` in batches and return a populated store.
    ///
    /// Exact `(text, origin)` duplicates are dropped before embedding, so
    /// each distinct pair is embedded once.
    pub async fn build(
        kind: StoreKind,
        embedder: &dyn Embedder,
        chunks: Vec<NewChunk>,
        batch_size: usize,
    ) -> Result<Self> {
        let mut store = Self::new(kind, embedder.model_name(), embedder.dims());

        let mut seen = HashSet::new();
        let unique: Vec<NewChunk> = chunks
            .into_iter()
            .filter(|c| seen.insert(content_key(&c.text, &c.origin_path)))
            .collect();

        for batch in unique.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(crate::Error::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                store.add(ChunkRecord::new(chunk.clone(), vector))?;
            }
            tracing::debug!(store = %kind, embedded = store.len(), total = unique.len(), "embedded batch");
        }

        Ok(store)
    }

    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    pub fn contains(&self, text: &str, origin_path: &str) -> bool {
        self.keys.contains(&content_key(text, origin_path))
    }

    /// Append `record`. Returns `false` without inserting when its
    /// `(text, origin)` pair is already stored.
    ///
    /// Rejects embeddings of the wrong dimensionality or with non-finite
    /// components as [`Error::Embedding`](crate::Error::Embedding).
    pub fn add(&mut self, record: ChunkRecord) -> Result<bool> {
        check_vector(&record.embedding, self.dims)?;
        let key = content_key(&record.text, &record.origin_path);
        if !self.keys.insert(key) {
            return Ok(false);
        }
        self.records.push(record);
        Ok(true)
    }

    /// Drop every record past the first `len`, undoing recent [`add`]s.
    ///
    /// [`add`]: VectorStore::add
    pub fn truncate(&mut self, len: usize) {
        for record in self.records.drain(len.min(self.records.len())..) {
            self.keys
                .remove(&content_key(&record.text, &record.origin_path));
        }
    }

    /// Return up to `k` records by descending cosine similarity to `vector`.
    ///
    /// Records with zero norm are skipped (similarity undefined). Equal
    /// similarities keep insertion order. `k <= 0` yields nothing; `k`
    /// beyond the store size yields every scorable record.
    pub fn query(&self, vector: &[f32], k: i64) -> Result<Vec<Scored<'_>>> {
        check_vector(vector, self.dims)?;
        if k <= 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| cosine_similarity(vector, &r.embedding).map(|s| (i, s)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(usize::try_from(k).unwrap_or(usize::MAX));

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| Scored {
                record: &self.records[i],
                similarity,
            })
            .collect())
    }
}

/// Dedup key: SHA-256 over text and origin, separated by a NUL byte.
fn content_key(text: &str, origin_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(origin_path.as_bytes());
    format!("{:x}", hasher.finalize())
}
