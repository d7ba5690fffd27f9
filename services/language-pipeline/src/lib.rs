//! Language Pipeline
//!
//! Stages of the document pipeline that feeds the language analysis search
//! cluster. Uploaded batches of newline-delimited JSON documents are validated,
//! hydrated with ids and provenance, indexed, handed to the external analysis
//! jobs and finally enriched with the jobs' results.
//!
//! ## Stages
//!
//! - **Validation**: structure, size and per-document checks; rejected batches
//!   are moved to the quarantine bucket
//! - **Indexation**: assigns an id and source to every document, bulk-indexes
//!   them and republishes the hydrated batch
//! - **Analysis planning**: describes the grammar and metrics jobs for a
//!   hydrated batch, including where their results are written
//! - **Merge**: inserts error findings and merges metrics into the indexed
//!   documents
//!
//! ## Architecture
//!
//! ```text
//! Data sources bucket       Indexed bucket           Results bucket
//! ┌──────────────┐         ┌──────────────┐         ┌──────────────────┐
//! │ acme/        │         │ acme/        │         │ acme/errors/     │
//! │   batch.jsonl│         │   batch.jsonl│         │ acme/metrics/    │
//! └──────────────┘         └──────────────┘         └──────────────────┘
//!        │                   ▲        │                ▲         │
//!        ▼                   │        ▼                │         ▼
//! ┌──────────────┐    ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Validator    │───▶│ Hydrator     │  │ Analysis     │  │ Merger       │
//! └──────────────┘    └──────────────┘  │ jobs         │  └──────────────┘
//!        │                   │          └──────────────┘         │
//!        ▼                   ▼                                   ▼
//! ┌──────────────┐    ┌─────────────────────────────────────────────────┐
//! │ Quarantine   │    │ Search cluster: documents, language-errors      │
//! │ bucket       │    └─────────────────────────────────────────────────┘
//! └──────────────┘
//! ```

pub mod analysis;
pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod hydrator;
pub mod keys;
pub mod merger;
pub mod mock;
pub mod pipeline;
pub mod search;
pub mod storage;
pub mod validator;

pub use analysis::{AnalysisJobRequest, AnalysisMode, Foreignisms, JobPlanner, ModelCatalog};
pub use config::Config;
pub use document::{AnalysisResult, ErrorFinding, MetricsRecord, Record};
pub use error::{PipelineError, Result};
pub use event::ObjectWriteEvent;
pub use hydrator::{Hydrator, IndexationReport};
pub use keys::{derive_result_key, original_key, ResultStage};
pub use merger::{MergeTargets, Merger};
pub use mock::{MemoryObjectStore, MemorySearchIndex};
pub use pipeline::{analysis_plan, Pipeline, Stage, StageResponse};
pub use search::{BulkAction, BulkSummary, OpenSearchIndex, SearchIndex};
pub use storage::{ObjectStore, S3ObjectStore};
pub use validator::{BatchRules, ValidationReport, Validator};
