//! Translation driver.
//!
//! Runs one [`TranslationJob`] per input file, strictly in order:
//!
//! ```text
//! Pending → Retrieving → Prompting → Generating → Parsing → Ingesting → Done
//!                                                        ↘ Failed (from any working stage)
//! ```
//!
//! A failure is reported with the input path, the stage it happened in, and
//! the error kind. It leaves no output files, no Project store record, and
//! no ledger entry, and the batch moves on to the next file. Inputs already
//! in the ledger are skipped, so re-running an interrupted batch resumes
//! where it stopped.
//!
//! Within one run, an input byte-identical to one already translated reuses
//! that parsed response: the job passes through Prompting, Generating and
//! Parsing without a model call, then writes outputs and is ingested like
//! any other.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use autot_core::parse::{parse, ParsedResponse, ResponseLabels};
use autot_core::prompt::{assemble, render_instructions};
use autot_core::retrieve::{representative_excerpt, retrieve, ContextBundle, RetrievalK};
use autot_core::store::VectorStore;
use autot_core::{Embedder, Error, Generator};

use crate::config::{Config, OutputConfig};
use crate::memory::ProjectMemory;
use crate::output::write_outputs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Retrieving,
    Prompting,
    Generating,
    Parsing,
    Ingesting,
    Done,
    Failed,
}

impl Stage {
    /// Whether a job in `self` may move to `next`. Stages are never skipped
    /// and terminal stages never change.
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        match (self, next) {
            (Pending, Retrieving)
            | (Retrieving, Prompting)
            | (Prompting, Generating)
            | (Generating, Parsing)
            | (Parsing, Ingesting)
            | (Ingesting, Done) => true,
            (Retrieving | Prompting | Generating | Parsing | Ingesting, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Retrieving => "retrieving",
            Stage::Prompting => "prompting",
            Stage::Generating => "generating",
            Stage::Parsing => "parsing",
            Stage::Ingesting => "ingesting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-file working state, discarded when the job ends.
#[derive(Debug)]
pub struct TranslationJob {
    pub input_path: PathBuf,
    /// Ledger key and Project record origin.
    pub key: String,
    stage: Stage,
    pub bundle: Option<ContextBundle>,
    pub prompt: Option<String>,
    pub raw_response: Option<String>,
    pub parsed: Option<ParsedResponse>,
}

impl TranslationJob {
    pub fn new(input_path: &Path) -> Self {
        Self {
            input_path: input_path.to_path_buf(),
            key: input_key(input_path),
            stage: Stage::Pending,
            bundle: None,
            prompt: None,
            raw_response: None,
            parsed: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, next: Stage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal job transition {} -> {}",
            self.stage,
            next
        );
        tracing::trace!(key = %self.key, from = %self.stage, to = %next, "job stage");
        self.stage = next;
    }
}

/// The ledger key of an input path.
pub fn input_key(path: &Path) -> String {
    path.display().to_string()
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done { inserted: bool },
    /// Already in the ledger.
    Skipped,
    Failed {
        stage: Stage,
        kind: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Done { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, JobOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, JobOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}

/// Settings for a run, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct TranslateSettings {
    pub k: RetrievalK,
    pub instructions: String,
    pub labels: ResponseLabels,
    pub budget_chars: usize,
    pub excerpt_chars: usize,
    pub output: OutputConfig,
}

impl TranslateSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        let labels = config.response.labels();
        let template = config.prompt.load_template()?;
        Ok(Self {
            k: config.stores.retrieval_k(),
            instructions: render_instructions(&template, &labels),
            labels,
            budget_chars: config.prompt.budget_chars(),
            excerpt_chars: config.prompt.excerpt_chars(),
            output: config.output.clone(),
        })
    }
}

/// Translates inputs against fixed Source and Target stores.
pub struct Translator<'a> {
    embedder: &'a dyn Embedder,
    generator: &'a dyn Generator,
    source: &'a VectorStore,
    target: &'a VectorStore,
    settings: TranslateSettings,
    /// Parsed responses by SHA-256 of the raw input, for this run only.
    cache: HashMap<[u8; 32], ParsedResponse>,
}

impl<'a> Translator<'a> {
    pub fn new(
        embedder: &'a dyn Embedder,
        generator: &'a dyn Generator,
        source: &'a VectorStore,
        target: &'a VectorStore,
        settings: TranslateSettings,
    ) -> Self {
        Self {
            embedder,
            generator,
            source,
            target,
            settings,
            cache: HashMap::new(),
        }
    }

    /// Translate every input not yet in the ledger, in the given order.
    pub async fn run_batch(&mut self, memory: &mut ProjectMemory, inputs: &[PathBuf]) -> BatchReport {
        let mut report = BatchReport::default();
        let total = inputs.len();

        for (i, input) in inputs.iter().enumerate() {
            let key = input_key(input);
            if memory.is_processed(&key) {
                tracing::debug!(path = %key, "already processed, skipping");
                report.files.push(FileReport {
                    path: input.clone(),
                    outcome: JobOutcome::Skipped,
                });
                continue;
            }

            tracing::info!(path = %key, n = i + 1, total, "translating");
            let outcome = self.run_job(memory, input).await;
            report.files.push(FileReport {
                path: input.clone(),
                outcome,
            });
        }

        tracing::info!(
            done = report.done(),
            skipped = report.skipped(),
            failed = report.failed(),
            "batch finished"
        );
        report
    }

    /// Run one job to `Done` or `Failed`.
    pub async fn run_job(&mut self, memory: &mut ProjectMemory, input: &Path) -> JobOutcome {
        let mut job = TranslationJob::new(input);
        match self.drive(&mut job, memory).await {
            Ok(inserted) => {
                job.advance(Stage::Done);
                tracing::info!(path = %job.key, inserted, "translated");
                JobOutcome::Done { inserted }
            }
            Err(e) => {
                let stage = job.stage();
                job.advance(Stage::Failed);
                tracing::warn!(path = %job.key, %stage, kind = e.kind(), error = %e, "translation failed");
                JobOutcome::Failed {
                    stage,
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn drive(
        &mut self,
        job: &mut TranslationJob,
        memory: &mut ProjectMemory,
    ) -> autot_core::Result<bool> {
        job.advance(Stage::Retrieving);
        let raw_input = std::fs::read_to_string(&job.input_path).map_err(|source| Error::Input {
            path: job.input_path.clone(),
            source,
        })?;
        let digest: [u8; 32] = Sha256::digest(raw_input.as_bytes()).into();

        let parsed = match self.cache.get(&digest) {
            Some(parsed) => {
                tracing::info!(path = %job.key, "identical input translated earlier in this run, reusing");
                job.advance(Stage::Prompting);
                job.advance(Stage::Generating);
                job.advance(Stage::Parsing);
                parsed.clone()
            }
            None => {
                let parsed = self.translate(job, memory, &raw_input).await?;
                self.cache.insert(digest, parsed.clone());
                parsed
            }
        };

        job.advance(Stage::Ingesting);
        let written = write_outputs(&job.input_path, &parsed, &self.settings.output)?;
        let ingested = memory.ingest(&parsed.artifact, &job.key, self.embedder).await;
        job.parsed = Some(parsed);
        match ingested {
            Ok(outcome) => Ok(outcome.inserted),
            Err(e) => {
                written.remove();
                Err(e)
            }
        }
    }

    /// Retrieve, prompt, generate and parse, leaving the job in Parsing.
    async fn translate(
        &self,
        job: &mut TranslationJob,
        memory: &ProjectMemory,
        raw_input: &str,
    ) -> autot_core::Result<ParsedResponse> {
        let query = representative_excerpt(raw_input, self.settings.excerpt_chars);
        let bundle = retrieve(
            self.embedder,
            query,
            self.source,
            self.target,
            memory.store(),
            self.settings.k,
        )
        .await?;

        job.advance(Stage::Prompting);
        let prompt = assemble(
            &self.settings.instructions,
            &bundle,
            raw_input,
            self.settings.budget_chars,
        );
        job.bundle = Some(bundle);

        job.advance(Stage::Generating);
        let raw = self.generator.generate(&prompt).await?;
        job.prompt = Some(prompt);

        job.advance(Stage::Parsing);
        let parsed = parse(&raw, &self.settings.labels)?;
        job.raw_response = Some(raw);
        Ok(parsed)
    }
}
