//! Project memory: the Project store plus the processing ledger.
//!
//! Each successfully parsed translation is normalized, embedded, added to
//! the Project store, saved, and only then recorded in the ledger. A store
//! save that fails rolls the in-memory add back, so a failed job leaves the
//! store and ledger exactly as they were.

use std::path::PathBuf;

use autot_core::detect::Syntax;
use autot_core::embedding::embed_one;
use autot_core::models::{ChunkRecord, NewChunk, Role};
use autot_core::normalize::NormalizePolicy;
use autot_core::store::VectorStore;
use autot_core::Embedder;

use crate::ledger::Ledger;
use crate::stores::save_store;

/// Result of ingesting one translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    /// `false` when an identical record was already stored, e.g. after an
    /// interruption between the store save and the ledger append.
    pub inserted: bool,
}

pub struct ProjectMemory {
    store: VectorStore,
    store_path: Option<PathBuf>,
    ledger: Ledger,
    policy: NormalizePolicy,
    syntax: Syntax,
}

impl ProjectMemory {
    /// `store_path` of `None` keeps the store in memory only.
    pub fn new(
        store: VectorStore,
        store_path: Option<PathBuf>,
        ledger: Ledger,
        policy: NormalizePolicy,
        syntax: Syntax,
    ) -> Self {
        Self {
            store,
            store_path,
            ledger,
            policy,
            syntax,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn is_processed(&self, key: &str) -> bool {
        self.ledger.contains(key)
    }

    /// Text stored for `artifact` under the configured policy. Falls back
    /// to the raw artifact when normalization leaves nothing.
    pub fn normalized(&self, artifact: &str) -> String {
        let normalized = self.policy.apply(artifact, &self.syntax);
        if normalized.trim().is_empty() {
            artifact.trim().to_string()
        } else {
            normalized
        }
    }

    /// Record the translation of `source_key` and commit it to the ledger.
    pub async fn ingest(
        &mut self,
        artifact: &str,
        source_key: &str,
        embedder: &dyn Embedder,
    ) -> autot_core::Result<IngestOutcome> {
        let text = self.normalized(artifact);
        let embedding = embed_one(embedder, &text).await?;

        let len = self.store.len();
        let record = ChunkRecord::new(NewChunk::new(text, Role::Code, source_key), embedding);
        let inserted = self.store.add(record)?;

        if inserted {
            if let Some(path) = &self.store_path {
                if let Err(e) = save_store(&self.store, path) {
                    self.store.truncate(len);
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.ledger.append(source_key) {
            if inserted {
                self.rollback(len);
            }
            return Err(e);
        }

        tracing::debug!(key = source_key, inserted, records = self.store.len(), "ingested translation");
        Ok(IngestOutcome { inserted })
    }

    fn rollback(&mut self, len: usize) {
        self.store.truncate(len);
        if let Some(path) = &self.store_path {
            if let Err(e) = save_store(&self.store, path) {
                tracing::warn!(path = %path.display(), error = %e, "could not restore project store after ledger failure");
            }
        }
    }

    /// Flush the ledger and hand back the store.
    pub fn close(self) -> anyhow::Result<VectorStore> {
        let ProjectMemory { store, ledger, .. } = self;
        ledger.close()?;
        Ok(store)
    }
}
