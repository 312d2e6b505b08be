use crate::{
    batcher::{Batch, Batcher},
    composer::{Composer, GeneratedDocument},
    config::Config,
    error::{Error, Result},
    file::FileEntry,
    filter::PathFilter,
    llm::Oracle,
    prompt::PromptEngine,
    summarizer::{BatchSummarizer, BatchSummary},
    truncate::truncate,
};
use serde::Serialize;
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineStats {
    /// Files handed to the pipeline
    pub input_files: usize,

    /// Files removed by the exclusion rules
    pub excluded_files: usize,

    /// Files dropped by the file count cap
    pub capped_files: usize,

    /// Files cut to the line limit
    pub truncated_files: usize,

    /// Source files that reached the batcher
    pub batched_files: usize,

    /// Fragments across all batches, more than `batched_files` when files were split
    pub batched_fragments: usize,

    /// Total number of batches created
    pub total_batches: usize,

    /// Total tokens across all batches
    pub total_tokens: usize,

    /// Average tokens per batch
    pub avg_tokens_per_batch: usize,

    /// Largest batch size in tokens
    pub max_batch_tokens: usize,

    /// Smallest batch size in tokens
    pub min_batch_tokens: usize,

    /// Batches over the ceiling because of a single oversized file
    pub oversized_batches: usize,

    /// Batches whose summary came back empty
    pub empty_summaries: usize,

    /// Whether the model was skipped
    pub dry_run: bool,

    /// Time spent filtering, truncating and batching
    pub prepare_duration: Duration,

    /// Time spent summarizing batches
    pub summarize_duration: Duration,

    /// Time spent composing the README
    pub compose_duration: Duration,

    /// Total execution time
    pub duration: Duration,
}

impl PipelineStats {
    fn record_batches(&mut self, batches: &[Batch], max_tokens: usize) {
        self.total_batches = batches.len();
        self.batched_fragments = batches.iter().map(Batch::len).sum();
        self.total_tokens = batches.iter().map(|b| b.total_tokens).sum();
        self.avg_tokens_per_batch = if batches.is_empty() {
            0
        } else {
            self.total_tokens / batches.len()
        };
        self.max_batch_tokens = batches.iter().map(|b| b.total_tokens).max().unwrap_or(0);
        self.min_batch_tokens = batches.iter().map(|b| b.total_tokens).min().unwrap_or(0);
        self.oversized_batches = batches.iter().filter(|b| b.is_oversized(max_tokens)).count();
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║             README Generation Summary                 ║");
        println!("╠═══════════════════════════════════════════════════════╣");
        println!(
            "║ Input Files:          {:>8}                        ║",
            self.input_files
        );
        println!(
            "║   - Excluded:         {:>8}                        ║",
            self.excluded_files
        );
        println!(
            "║   - Over file cap:    {:>8}                        ║",
            self.capped_files
        );
        println!(
            "║   - Truncated:        {:>8}                        ║",
            self.truncated_files
        );
        println!(
            "║   - Batched:          {:>8}                        ║",
            self.batched_files
        );
        if self.batched_fragments != self.batched_files {
            println!(
                "║   - Fragments:        {:>8}                        ║",
                self.batched_fragments
            );
        }
        println!("║                                                       ║");
        println!(
            "║ Batches Created:      {:>8}                        ║",
            self.total_batches
        );
        println!(
            "║ Total Tokens:         {:>8}                        ║",
            self.total_tokens
        );
        println!(
            "║ Avg Tokens/Batch:     {:>8}                        ║",
            self.avg_tokens_per_batch
        );
        println!(
            "║ Min Batch Size:       {:>8} tokens                 ║",
            self.min_batch_tokens
        );
        println!(
            "║ Max Batch Size:       {:>8} tokens                 ║",
            self.max_batch_tokens
        );
        println!(
            "║ Oversized Batches:    {:>8}                        ║",
            self.oversized_batches
        );
        println!(
            "║ Empty Summaries:      {:>8}                        ║",
            self.empty_summaries
        );
        println!("║                                                       ║");
        println!("║ Timing Breakdown:                                     ║");
        println!(
            "║   - Batching:         {:>8.2}s                     ║",
            self.prepare_duration.as_secs_f64()
        );
        println!(
            "║   - Summarizing:      {:>8.2}s                     ║",
            self.summarize_duration.as_secs_f64()
        );
        println!(
            "║   - Composing:        {:>8.2}s                     ║",
            self.compose_duration.as_secs_f64()
        );
        println!(
            "║   - Total:            {:>8.2}s                     ║",
            self.duration.as_secs_f64()
        );
        if self.dry_run {
            println!("║                                                       ║");
            println!("║ ⚠ No model calls were made (dry run mode)             ║");
        }
        println!("╚═══════════════════════════════════════════════════════╝\n");
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The README, `None` in dry run mode
    pub document: Option<GeneratedDocument>,

    /// Batch summaries in batch order
    pub summaries: Vec<BatchSummary>,

    /// Batches sent to the model
    pub batches: Vec<Batch>,

    /// Run statistics
    pub stats: PipelineStats,
}

impl PipelineOutput {
    /// Returns true if the README was composed without some batch summaries.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.document.as_ref().is_some_and(GeneratedDocument::is_degraded)
    }
}

/// Map-reduce README generator.
///
/// Files flow through filter, truncation and batching, then each batch is
/// summarized and the summaries are composed into one document.
pub struct Pipeline {
    config: Config,
    oracle: Arc<dyn Oracle>,
    filter: PathFilter,
    batcher: Batcher,
    prompts: Arc<PromptEngine>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration validation fails
    /// - The tokenizer or prompt templates cannot be loaded
    pub fn new(config: Config, oracle: Arc<dyn Oracle>) -> Result<Self> {
        config.validate()?;

        let filter = PathFilter::new(&config.filter_rules)?;
        let batcher = Batcher::new(
            config.max_tokens_per_batch,
            config.oversize_policy,
            config.tokenizer.create()?,
        );
        let prompts = Arc::new(PromptEngine::new(config.readme_template.as_deref())?);

        Ok(Self {
            config,
            oracle,
            filter,
            batcher,
            prompts,
        })
    }

    /// Returns the configuration of this pipeline.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Filters, caps, truncates and batches the input without calling the
    /// model.
    #[must_use]
    pub fn prepare(&self, files: Vec<FileEntry>) -> (Vec<Batch>, PipelineStats) {
        let start = Instant::now();
        let mut stats = PipelineStats {
            input_files: files.len(),
            dry_run: self.config.dry_run,
            ..PipelineStats::default()
        };

        let mut kept = self.filter.apply(files);
        stats.excluded_files = stats.input_files - kept.len();

        if let Some(limit) = self.config.max_files.filter(|&limit| kept.len() > limit) {
            stats.capped_files = kept.len() - limit;
            warn!(
                "Keeping the first {} of {} files (file cap)",
                limit,
                kept.len()
            );
            kept.truncate(limit);
        }

        let max_lines = self.config.max_lines_per_file;
        let kept: Vec<FileEntry> = kept
            .into_iter()
            .map(|entry| {
                let before = entry.content.len();
                let entry = truncate(entry, max_lines);
                if entry.content.len() < before {
                    stats.truncated_files += 1;
                }
                entry
            })
            .collect();

        stats.batched_files = kept.len();
        let batches = self.batcher.batch(&kept);
        stats.record_batches(&batches, self.config.max_tokens_per_batch);
        stats.prepare_duration = start.elapsed();

        (batches, stats)
    }

    /// Generates the README for `repo_name` from the given files.
    ///
    /// # Process
    ///
    /// 1. **Prepare**: filter, cap, truncate and batch the files
    /// 2. **Summarize**: one model call per batch, order preserved
    /// 3. **Compose**: one model call over all summaries
    ///
    /// An empty file list, or one where every file is excluded, skips step 2
    /// and still composes from the repository name alone. In dry run mode
    /// only step 1 runs.
    ///
    /// # Errors
    ///
    /// Returns an error if a model call fails, an empty summary is not
    /// tolerated, the final answer is empty, or the deadline expires.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repo_readme::{Config, FileEntry, LlmConfig, OpenAiClient, Pipeline};
    /// use std::sync::Arc;
    ///
    /// # async fn demo() -> anyhow::Result<()> {
    /// let oracle = Arc::new(OpenAiClient::new(LlmConfig::new("api-key"))?);
    /// let pipeline = Pipeline::new(Config::default(), oracle)?;
    ///
    /// let files = vec![FileEntry::new("src/main.rs", "fn main() {}")];
    /// let output = pipeline.generate("acme/demo", files).await?;
    /// if let Some(document) = output.document {
    ///     println!("{}", document.text);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, files), fields(repo = %repo_name, files = files.len()))]
    pub async fn generate(&self, repo_name: &str, files: Vec<FileEntry>) -> Result<PipelineOutput> {
        let start_time = Instant::now();

        info!("Stage 1/3: Batching files...");
        let (batches, mut stats) = self.prepare(files);
        info!(
            "✓ {} of {} files in {} batches ({} tokens) in {:.2}s",
            stats.batched_files,
            stats.input_files,
            stats.total_batches,
            stats.total_tokens,
            stats.prepare_duration.as_secs_f64()
        );

        if stats.oversized_batches > 0 {
            warn!(
                "{} batch(es) exceed the {} token ceiling on their own",
                stats.oversized_batches, self.config.max_tokens_per_batch
            );
        }

        if self.config.dry_run {
            warn!("Dry run mode enabled - skipping model calls");
            stats.duration = start_time.elapsed();
            return Ok(PipelineOutput {
                document: None,
                summaries: Vec::new(),
                batches,
                stats,
            });
        }

        let (summaries, document) = self
            .with_deadline(self.map_reduce(repo_name, &batches, &mut stats))
            .await?;

        stats.empty_summaries = document.empty_batches.len();
        stats.duration = start_time.elapsed();

        info!(
            "✓ README generated in {:.2}s{}",
            stats.duration.as_secs_f64(),
            if document.is_degraded() {
                " (degraded)"
            } else {
                ""
            }
        );

        Ok(PipelineOutput {
            document: Some(document),
            summaries,
            batches,
            stats,
        })
    }

    async fn map_reduce(
        &self,
        repo_name: &str,
        batches: &[Batch],
        stats: &mut PipelineStats,
    ) -> Result<(Vec<BatchSummary>, GeneratedDocument)> {
        info!("Stage 2/3: Summarizing batches...");
        let summarize_start = Instant::now();
        let summarizer = BatchSummarizer::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.prompts),
            repo_name,
            self.config.concurrency,
            self.config.allow_partial,
        );
        let summaries = summarizer.summarize_all(batches).await?;
        stats.summarize_duration = summarize_start.elapsed();

        info!(
            "✓ Summarized {} batches in {:.2}s",
            summaries.len(),
            stats.summarize_duration.as_secs_f64()
        );

        info!("Stage 3/3: Composing README...");
        let compose_start = Instant::now();
        let composer = Composer::new(
            Arc::clone(&self.oracle),
            Arc::clone(&self.prompts),
            repo_name,
        );
        let document = composer.compose(&summaries).await?;
        stats.compose_duration = compose_start.elapsed();

        Ok((summaries, document))
    }

    /// Applies the configured deadline, dropping in-flight requests on expiry.
    async fn with_deadline<T>(&self, future: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.timeout {
            Some(after) => tokio::time::timeout(after, future)
                .await
                .map_err(|_| Error::Timeout { after })?,
            None => future.await,
        }
    }
}
