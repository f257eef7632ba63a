//! TOML configuration.
//!
//! Every section is optional; a missing section takes the defaults shown
//! in `autot.example.toml`. [`load_config`] validates the parsed values
//! before anything touches the stores.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use autot_core::chunk::{Chunker, ChunkerConfig, CHARS_PER_TOKEN};
use autot_core::detect::{DetectorKind, Syntax};
use autot_core::normalize::NormalizePolicy;
use autot_core::parse::ResponseLabels;
use autot_core::retrieve::RetrievalK;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub response: ResponseConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ============ Chunking ============

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap")]
    pub overlap_tokens: usize,
    #[serde(default = "default_code_threshold")]
    pub code_threshold: f32,
    #[serde(default)]
    pub detector: DetectorKind,
    #[serde(default = "default_fallback_window_lines")]
    pub fallback_window_lines: usize,
    #[serde(default = "default_max_form_lines")]
    pub max_form_lines: usize,
    /// Prose chunks with this many words or fewer are not indexed.
    #[serde(default = "default_min_prose_words")]
    pub min_prose_words: usize,
    #[serde(default)]
    pub syntax: SyntaxConfig,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap(),
            code_threshold: default_code_threshold(),
            detector: DetectorKind::default(),
            fallback_window_lines: default_fallback_window_lines(),
            max_form_lines: default_max_form_lines(),
            min_prose_words: default_min_prose_words(),
            syntax: SyntaxConfig::default(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}
fn default_overlap() -> usize {
    80
}
fn default_code_threshold() -> f32 {
    0.45
}
fn default_fallback_window_lines() -> usize {
    8
}
fn default_max_form_lines() -> usize {
    400
}
fn default_min_prose_words() -> usize {
    5
}

impl ChunkingConfig {
    pub fn chunker(&self) -> Chunker {
        let syntax = self.syntax.to_syntax();
        let detector = self.detector.build(&syntax);
        let config = ChunkerConfig {
            code_threshold: self.code_threshold,
            fallback_window_lines: self.fallback_window_lines,
            max_form_lines: self.max_form_lines,
            ..ChunkerConfig::from_tokens(self.max_tokens, self.overlap_tokens)
        };
        Chunker::new(config, syntax, detector)
    }
}

/// Source-language lexical settings. Unset fields fall back to Lisp.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyntaxConfig {
    #[serde(default)]
    pub open: Option<char>,
    #[serde(default)]
    pub close: Option<char>,
    /// Empty string disables comment handling.
    #[serde(default)]
    pub line_comment: Option<String>,
    #[serde(default)]
    pub string_quote: Option<char>,
    /// Empty string disables character literal handling.
    #[serde(default)]
    pub char_prefix: Option<String>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
}

impl SyntaxConfig {
    pub fn to_syntax(&self) -> Syntax {
        let base = Syntax::lisp();
        Syntax {
            open: self.open.unwrap_or(base.open),
            close: self.close.unwrap_or(base.close),
            line_comment: match &self.line_comment {
                Some(c) if c.is_empty() => None,
                Some(c) => Some(c.clone()),
                None => base.line_comment,
            },
            string_quote: self.string_quote.or(base.string_quote),
            char_prefix: match &self.char_prefix {
                Some(p) if p.is_empty() => None,
                Some(p) => Some(p.clone()),
                None => base.char_prefix,
            },
            keywords: self.keywords.clone().unwrap_or(base.keywords),
        }
    }
}

// ============ Embedding ============

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

// ============ Generation ============

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    /// Stream raw model output to stdout as it arrives.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: default_ollama_url(),
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            timeout_secs: default_generation_timeout_secs(),
            max_retries: default_generation_retries(),
            verbose: false,
        }
    }
}

fn default_generation_provider() -> String {
    "ollama".to_string()
}
fn default_generation_model() -> String {
    "deepseek-r1:70b".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_num_ctx() -> u32 {
    4096
}
fn default_generation_timeout_secs() -> u64 {
    600
}
fn default_generation_retries() -> u32 {
    2
}

// ============ Stores and ledger ============

#[derive(Debug, Deserialize, Clone)]
pub struct StoresConfig {
    #[serde(default = "default_source_store")]
    pub source: SeedStoreConfig,
    #[serde(default = "default_target_store")]
    pub target: SeedStoreConfig,
    #[serde(default)]
    pub project: ProjectStoreConfig,
    /// Rebuild Source/Target from seed docs when the store file is unusable.
    #[serde(default = "default_true")]
    pub rebuild_on_error: bool,
}

impl StoresConfig {
    /// Give a seed store table that names no `path` its default file.
    fn fill_default_paths(&mut self) {
        if self.source.path.as_os_str().is_empty() {
            self.source.path = default_source_store().path;
        }
        if self.target.path.as_os_str().is_empty() {
            self.target.path = default_target_store().path;
        }
    }
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            source: default_source_store(),
            target: default_target_store(),
            project: ProjectStoreConfig::default(),
            rebuild_on_error: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedStoreConfig {
    /// Files or directories of txt/html/pdf documentation.
    #[serde(default)]
    pub docs: Vec<PathBuf>,
    /// Empty means the kind's default file (`src_db.json`, `trg_db.json`).
    #[serde(default)]
    pub path: PathBuf,
    #[serde(default = "default_seed_k")]
    pub k: i64,
}

fn default_source_store() -> SeedStoreConfig {
    SeedStoreConfig {
        docs: Vec::new(),
        path: PathBuf::from("src_db.json"),
        k: default_seed_k(),
    }
}
fn default_target_store() -> SeedStoreConfig {
    SeedStoreConfig {
        docs: Vec::new(),
        path: PathBuf::from("trg_db.json"),
        k: default_seed_k(),
    }
}
fn default_seed_k() -> i64 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectStoreConfig {
    #[serde(default = "default_project_path")]
    pub path: PathBuf,
    #[serde(default = "default_project_k")]
    pub k: i64,
}

impl Default for ProjectStoreConfig {
    fn default() -> Self {
        Self {
            path: default_project_path(),
            k: default_project_k(),
        }
    }
}

fn default_project_path() -> PathBuf {
    PathBuf::from("done_db.json")
}
fn default_project_k() -> i64 {
    3
}
fn default_true() -> bool {
    true
}

impl StoresConfig {
    pub fn retrieval_k(&self) -> RetrievalK {
        RetrievalK {
            source: self.source.k,
            target: self.target.k,
            project: self.project.k,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from("processed_files.txt")
}

// ============ Prompt, response, memory ============

#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// Prompt budget, in tokens.
    #[serde(default = "default_prompt_tokens")]
    pub max_tokens: usize,
    /// Size of the input excerpt embedded as the retrieval query.
    #[serde(default = "default_query_excerpt_tokens")]
    pub query_excerpt_tokens: usize,
    /// Instruction template file replacing the built-in one.
    #[serde(default)]
    pub template: Option<PathBuf>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_prompt_tokens(),
            query_excerpt_tokens: default_query_excerpt_tokens(),
            template: None,
        }
    }
}

fn default_prompt_tokens() -> usize {
    3072
}
fn default_query_excerpt_tokens() -> usize {
    512
}

impl PromptConfig {
    pub fn budget_chars(&self) -> usize {
        self.max_tokens * CHARS_PER_TOKEN
    }

    pub fn excerpt_chars(&self) -> usize {
        self.query_excerpt_tokens * CHARS_PER_TOKEN
    }

    /// Read the instruction template, or return the built-in one.
    pub fn load_template(&self) -> Result<String> {
        match &self.template {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt template: {}", path.display())),
            None => Ok(autot_core::prompt::DEFAULT_TEMPLATE.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResponseConfig {
    #[serde(default = "default_artifact_label")]
    pub artifact_label: String,
    #[serde(default = "default_rationale_label")]
    pub rationale_label: String,
    #[serde(default = "default_reasoning_label")]
    pub reasoning_label: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        let labels = ResponseLabels::default();
        Self {
            artifact_label: labels.artifact,
            rationale_label: labels.rationale,
            reasoning_label: labels.reasoning,
        }
    }
}

fn default_artifact_label() -> String {
    ResponseLabels::default().artifact
}
fn default_rationale_label() -> String {
    ResponseLabels::default().rationale
}
fn default_reasoning_label() -> String {
    ResponseLabels::default().reasoning
}

impl ResponseConfig {
    pub fn labels(&self) -> ResponseLabels {
        ResponseLabels {
            artifact: self.artifact_label.clone(),
            rationale: self.rationale_label.clone(),
            reasoning: self.reasoning_label.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemoryConfig {
    #[serde(default)]
    pub normalize: NormalizePolicy,
}

// ============ Input and output ============

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_input_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Where to write the discovered input list, if anywhere.
    #[serde(default)]
    pub pathlist: Option<PathBuf>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_input_dir(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            pathlist: None,
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.lisp*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_artifact_ext")]
    pub artifact_ext: String,
    #[serde(default = "default_rationale_ext")]
    pub rationale_ext: String,
    #[serde(default = "default_reasoning_ext")]
    pub reasoning_ext: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            artifact_ext: default_artifact_ext(),
            rationale_ext: default_rationale_ext(),
            reasoning_ext: default_reasoning_ext(),
        }
    }
}

impl OutputConfig {
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        [&self.artifact_ext, &self.rationale_ext, &self.reasoning_ext]
            .into_iter()
            .map(String::as_str)
    }
}

fn default_artifact_ext() -> String {
    "autot".to_string()
}
fn default_rationale_ext() -> String {
    "comment".to_string()
}
fn default_reasoning_ext() -> String {
    "think".to_string()
}

// ============ Loading ============

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.stores.fill_default_paths();
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.max_tokens {
        anyhow::bail!("chunking.overlap_tokens must be < chunking.max_tokens");
    }
    if !(0.0..=1.0).contains(&config.chunking.code_threshold) {
        anyhow::bail!("chunking.code_threshold must be in [0.0, 1.0]");
    }
    if config.chunking.fallback_window_lines == 0 {
        anyhow::bail!("chunking.fallback_window_lines must be > 0");
    }
    let syntax = config.chunking.syntax.to_syntax();
    if syntax.open == syntax.close {
        anyhow::bail!("chunking.syntax.open and chunking.syntax.close must differ");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.provider != "local" {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    if config.generation.provider != "ollama" {
        anyhow::bail!(
            "Unknown generation provider: '{}'. Must be ollama.",
            config.generation.provider
        );
    }

    // Validate stores
    for (name, k) in [
        ("stores.source.k", config.stores.source.k),
        ("stores.target.k", config.stores.target.k),
        ("stores.project.k", config.stores.project.k),
    ] {
        if k < 0 {
            anyhow::bail!("{} must be >= 0", name);
        }
    }

    // Validate prompt
    if config.prompt.max_tokens == 0 {
        anyhow::bail!("prompt.max_tokens must be > 0");
    }

    // Validate response and output
    let labels = config.response.labels();
    for (name, label) in [
        ("response.artifact_label", &labels.artifact),
        ("response.rationale_label", &labels.rationale),
        ("response.reasoning_label", &labels.reasoning),
    ] {
        if label.trim().is_empty() || label.contains(char::is_whitespace) {
            anyhow::bail!("{} must be a single non-empty word", name);
        }
    }
    let exts = [
        &config.output.artifact_ext,
        &config.output.rationale_ext,
        &config.output.reasoning_ext,
    ];
    if exts.iter().any(|e| e.is_empty() || e.starts_with('.')) {
        anyhow::bail!("output extensions must be non-empty and given without a leading '.'");
    }
    if exts[0] == exts[1] || exts[0] == exts[2] || exts[1] == exts[2] {
        anyhow::bail!("output extensions must be distinct");
    }

    Ok(())
}
