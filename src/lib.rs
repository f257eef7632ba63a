//! # autot
//!
//! Retrieval-augmented translation of Lisp source files.
//!
//! Each input file is translated with context drawn from three vector
//! stores: documentation of the source dialect, documentation of the target
//! dialect, and the translations this project has already produced. Every
//! successful translation is fed back into the project store so later files
//! stay consistent with earlier ones.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────┐   ┌──────────────┐
//! │ Seed docs  │──▶│  Chunk +  │──▶│ Source/Target│──┐
//! │ txt/html/  │   │   Embed   │   │    stores    │  │
//! │    pdf     │   └───────────┘   └──────────────┘  │ retrieve
//! └────────────┘                                     ▼
//!  ┌──────────┐   ┌──────────┐   ┌───────────┐   ┌──────────┐
//!  │ *.lisp   │──▶│  Prompt  │──▶│ Generator │──▶│  Parse   │
//!  └──────────┘   └──────────┘   └───────────┘   └────┬─────┘
//!                       ▲                             │ outputs + ingest
//!                       │       ┌──────────────┐      ▼
//!                       └───────│Project store │◀── ledger
//!                               └──────────────┘
//! ```
//!
//! The pure pieces (chunking, stores, retrieval, prompt assembly, response
//! parsing) live in `autot-core`. This crate adds configuration, the
//! concrete embedding and generation backends, files on disk, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`discover`] | Seed document and input discovery |
//! | [`extract`] | Text extraction from txt, HTML, and PDF |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Ollama generation adapter |
//! | [`stores`] | Store files and store preparation |
//! | [`ledger`] | Processed-file ledger |
//! | [`memory`] | Project store plus ledger |
//! | [`output`] | Sibling output files |
//! | [`pipeline`] | Translation jobs and batches |

pub mod config;
pub mod discover;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ledger;
pub mod memory;
pub mod output;
pub mod pipeline;
pub mod search;
pub mod status;
pub mod stores;
pub mod translate;
