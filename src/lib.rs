//! # repo-readme
//!
//! Generates a project README from repository sources with a language model.
//!
//! ## Features
//!
//! - Path-based exclusion of build output, lockfiles, tests and assets
//! - Per-file line truncation
//! - Greedy token-bounded batching with exact BPE counts
//! - Concurrent, order-preserving batch summarization
//! - Typed failures instead of silent placeholders
//!
//! ## Quick Start
//!
//! ```no_run
//! use repo_readme::{Config, LlmConfig, OpenAiClient, Pipeline, Scanner};
//! use std::sync::Arc;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .max_tokens_per_batch(6_000)
//!     .concurrency(4)
//!     .build()?;
//!
//! let oracle = Arc::new(OpenAiClient::new(LlmConfig::new("api-key"))?);
//! let files = Scanner::new("./my-project").scan()?;
//!
//! let output = Pipeline::new(config, oracle)?
//!     .generate("acme/my-project", files)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a map-reduce pipeline:
//! 1. **Filter**: Drops paths unlikely to help a human-facing summary
//! 2. **Truncator**: Keeps the head of each file
//! 3. **Batcher**: Packs fragments into batches under a token ceiling
//! 4. **Summarizer**: Asks the model to describe each batch
//! 5. **Composer**: Asks the model for the README from all summaries

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod batcher;
mod composer;
mod config;
mod error;
mod file;
mod filter;
mod github;
mod llm;
mod pipeline;
mod prompt;
mod scanner;
mod summarizer;
mod template_validator;
mod token;
mod truncate;
mod writer;

pub use batcher::{Batch, Batcher, Fragment, OversizePolicy, format_fragment};
pub use composer::{Composer, FALLBACK_DOCUMENT, GeneratedDocument};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result, Stage};
pub use file::FileEntry;
pub use filter::{FilterRules, PathFilter};
pub use github::{RepoName, clone_repo};
pub use llm::{DEFAULT_BASE_URL, DEFAULT_MODEL, LlmConfig, OpenAiClient, Oracle};
pub use pipeline::{Pipeline, PipelineOutput, PipelineStats};
pub use prompt::{BATCH_SYSTEM_PROMPT, PromptEngine, README_SYSTEM_PROMPT, SUMMARY_DELIMITER};
pub use scanner::Scanner;
pub use summarizer::{BatchSummarizer, BatchSummary};
pub use token::{TokenEstimator, TokenizerKind};
pub use truncate::{truncate, truncate_content};
pub use writer::Writer;

use std::sync::Arc;

/// Runs the complete generation pipeline with the given configuration.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - A model request fails or returns nothing where content is required
/// - The configured deadline expires
///
/// # Examples
///
/// ```no_run
/// use repo_readme::{Config, FileEntry, LlmConfig, OpenAiClient, generate};
/// use std::sync::Arc;
///
/// # async fn demo() -> anyhow::Result<()> {
/// let oracle = Arc::new(OpenAiClient::new(LlmConfig::new("api-key"))?);
/// let files = vec![FileEntry::new("main.py", "print('hi')")];
///
/// let output = generate(Config::default(), oracle, "acme/hello", files).await?;
/// # Ok(())
/// # }
/// ```
pub async fn generate(
    config: Config,
    oracle: Arc<dyn Oracle>,
    repo_name: &str,
    files: Vec<FileEntry>,
) -> Result<PipelineOutput> {
    Pipeline::new(config, oracle)?
        .generate(repo_name, files)
        .await
}
