//! Versioned on-disk representation of a [`VectorStore`].
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "kind": "source",
//!   "model": "nomic-embed-text",
//!   "dims": 768,
//!   "count": 2,
//!   "embeddings": [[...], [...]],
//!   "records": [{"id": "...", "text": "...", "role": "code", ...}, ...]
//! }
//! ```
//!
//! Embeddings and record metadata are parallel arrays. Everything the
//! header declares is checked on load; a file that disagrees with itself or
//! with the caller's expectations is rejected with a [`StoreIoError`] rather
//! than partially read.

use serde::{Deserialize, Serialize};

use crate::error::StoreIoError;
use crate::models::{ChunkRecord, Role, StoreKind};

use super::VectorStore;

/// Current format version written by [`PersistedStore::from_store`].
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStore {
    pub format_version: u32,
    pub kind: StoreKind,
    pub model: String,
    pub dims: usize,
    pub count: usize,
    pub embeddings: Vec<Vec<f32>>,
    pub records: Vec<RecordMeta>,
}

/// Metadata half of a persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMeta {
    pub id: String,
    pub text: String,
    pub role: Role,
    pub origin_path: String,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// What the loader requires of a persisted store.
#[derive(Debug, Clone, Copy)]
pub struct Expected<'a> {
    pub kind: StoreKind,
    pub model: &'a str,
    pub dims: usize,
}

impl PersistedStore {
    pub fn from_store(store: &VectorStore) -> Self {
        let records = store.records();
        Self {
            format_version: FORMAT_VERSION,
            kind: store.kind(),
            model: store.model().to_string(),
            dims: store.dims(),
            count: records.len(),
            embeddings: records.iter().map(|r| r.embedding.clone()).collect(),
            records: records
                .iter()
                .map(|r| RecordMeta {
                    id: r.id.clone(),
                    text: r.text.clone(),
                    role: r.role,
                    origin_path: r.origin_path.clone(),
                    created_at: r.created_at,
                    context: r.context.clone(),
                })
                .collect(),
        }
    }

    /// Validate the header and contents and rebuild the store.
    pub fn into_store(self, expected: Expected<'_>) -> Result<VectorStore, StoreIoError> {
        if self.format_version != FORMAT_VERSION {
            return Err(StoreIoError::UnsupportedVersion {
                found: self.format_version,
                expected: FORMAT_VERSION,
            });
        }
        if self.kind != expected.kind {
            return Err(StoreIoError::KindMismatch {
                expected: expected.kind,
                found: self.kind,
            });
        }
        if self.model != expected.model {
            return Err(StoreIoError::ModelMismatch {
                expected: expected.model.to_string(),
                found: self.model,
            });
        }
        if self.dims != expected.dims {
            return Err(StoreIoError::DimensionMismatch {
                index: 0,
                expected: expected.dims,
                found: self.dims,
            });
        }
        if self.embeddings.len() != self.count || self.records.len() != self.count {
            return Err(StoreIoError::CountMismatch {
                declared: self.count,
                embeddings: self.embeddings.len(),
                records: self.records.len(),
            });
        }

        let mut store = VectorStore::new(self.kind, self.model, self.dims);
        for (index, (embedding, meta)) in self
            .embeddings
            .into_iter()
            .zip(self.records)
            .enumerate()
        {
            if embedding.len() != store.dims() {
                return Err(StoreIoError::DimensionMismatch {
                    index,
                    expected: store.dims(),
                    found: embedding.len(),
                });
            }
            let record = ChunkRecord {
                id: meta.id,
                text: meta.text,
                embedding,
                role: meta.role,
                origin_path: meta.origin_path,
                created_at: meta.created_at,
                context: meta.context,
            };
            match store.add(record) {
                Ok(true) => {}
                Ok(false) => return Err(StoreIoError::DuplicateRecord { index }),
                Err(e) => return Err(StoreIoError::Corrupt(format!("record {}: {}", index, e))),
            }
        }
        Ok(store)
    }

    pub fn to_json(&self) -> Result<String, StoreIoError> {
        serde_json::to_string(self).map_err(|e| StoreIoError::Corrupt(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, StoreIoError> {
        serde_json::from_str(json).map_err(|e| StoreIoError::Corrupt(e.to_string()))
    }
}
