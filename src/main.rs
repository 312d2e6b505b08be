use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use repo_readme::{
    Config, DEFAULT_BASE_URL, DEFAULT_MODEL, Error, FALLBACK_DOCUMENT, FilterRules, LlmConfig,
    OpenAiClient, Oracle, OversizePolicy, Pipeline, PipelineOutput, RepoName, Scanner, Stage,
    TokenizerKind, Writer, clone_repo,
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    name = "repo-readme",
    version,
    author,
    about = "Generate a README for a repository with an LLM",
    long_about = "Generate a README for a repository with an LLM.\n\n\
    Source files are filtered, truncated and packed into token-bounded batches. \
    Each batch is summarized by the model, then the summaries are composed into \
    one README.\n\n\
    USAGE EXAMPLES:\n  \
      # Describe the current directory\n  \
      repo-readme\n\n  \
      # Clone a GitHub repository and describe it\n  \
      repo-readme --repo https://github.com/acme/widgets --out ./widgets.md\n\n  \
      # Inspect the batches without calling the model\n  \
      repo-readme --dir ./my-project --dry-run -v"
)]
struct Cli {
    /// Local directory to describe
    #[arg(short, long, default_value = ".", value_name = "PATH", conflicts_with = "repo")]
    dir: PathBuf,

    /// GitHub repository URL to clone and describe
    #[arg(short, long, value_name = "URL")]
    repo: Option<String>,

    /// Repository name used in the prompts (defaults to owner/repo or the directory name)
    #[arg(short, long, value_name = "NAME")]
    name: Option<String>,

    /// Output file for the generated README
    #[arg(short, long, default_value = "out/README.md", value_name = "FILE")]
    out: PathBuf,

    /// Max tokens per batch
    #[arg(long, default_value_t = 6_000)]
    max_tokens: usize,

    /// Lines kept from the top of each file
    #[arg(long, default_value_t = 300)]
    max_lines: usize,

    /// Keep at most this many files after filtering
    #[arg(long, value_name = "N")]
    max_files: Option<usize>,

    /// Tokenizer used to measure batches
    #[arg(long, value_enum, default_value = "cl100k")]
    tokenizer: CliTokenizer,

    /// Split files that exceed the batch ceiling into line groups
    #[arg(long)]
    split_oversized: bool,

    /// Batch summaries requested concurrently (1 = sequential)
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Fail when the model returns an empty batch summary
    #[arg(long)]
    strict: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Path to custom Tera template for the README prompt
    ///
    /// The template must embed {{ summaries }}; {{ repo_name }} and
    /// {{ summary_count }} are also available.
    ///
    /// Example: repo-readme --template ./readme-prompt.tera
    #[arg(long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Additional exclusion glob (can be used multiple times)
    ///
    /// Example: repo-readme --exclude '**/vendor' --exclude '**/*.min.js'
    #[arg(long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Model name
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[arg(long, default_value = DEFAULT_BASE_URL, value_name = "URL")]
    base_url: String,

    /// API key for the endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Also write summary.json next to the README
    #[arg(long)]
    summary: bool,

    /// Do not keep a backup of an existing output file
    #[arg(long)]
    no_backup: bool,

    /// Dry run (batch only, no model calls, no files written)
    #[arg(long)]
    dry_run: bool,

    /// Write a placeholder README when the model returns nothing for the final document
    #[arg(long)]
    fallback_on_empty: bool,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliTokenizer {
    Simple,
    Enhanced,
    Cl100k,
    O200k,
}

impl From<CliTokenizer> for TokenizerKind {
    fn from(t: CliTokenizer) -> Self {
        match t {
            CliTokenizer::Simple => Self::Simple,
            CliTokenizer::Enhanced => Self::Enhanced,
            CliTokenizer::Cl100k => Self::Cl100k,
            CliTokenizer::O200k => Self::O200k,
        }
    }
}

/// Stands in for the model in dry run mode, where no request is ever sent.
struct OfflineOracle;

#[async_trait]
impl Oracle for OfflineOracle {
    async fn complete(&self, stage: Stage, _system: &str, _prompt: &str) -> repo_readme::Result<Option<String>> {
        Err(Error::transport(stage, "model calls are disabled in dry run mode"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let config = build_config(&cli).context("Failed to build configuration")?;

    // The checkout is removed when `_checkout` goes out of scope.
    let (root, repo_name, _checkout) = match cli.repo.as_deref() {
        Some(url) => {
            let name = RepoName::parse(url)?;
            let checkout = clone_repo(url)
                .await
                .with_context(|| format!("Failed to clone {url}"))?;
            (checkout.path().to_path_buf(), name.to_string(), Some(checkout))
        }
        None => {
            let root = cli
                .dir
                .canonicalize()
                .with_context(|| format!("Cannot access {}", cli.dir.display()))?;
            let name = root
                .file_name()
                .map_or_else(|| "repository".to_string(), |n| n.to_string_lossy().to_string());
            (root, name, None)
        }
    };
    let repo_name = cli.name.clone().unwrap_or(repo_name);

    info!("Reading {} from {}", repo_name, root.display());
    let files = Scanner::new(&root)
        .scan()
        .context("Failed to read repository files")?;

    let oracle: Arc<dyn Oracle> = if cli.dry_run {
        Arc::new(OfflineOracle)
    } else {
        let llm = LlmConfig::new(cli.api_key.clone().unwrap_or_default())
            .base_url(&cli.base_url)
            .model(&cli.model);
        Arc::new(OpenAiClient::new(llm).context("Failed to create LLM client")?)
    };

    let pipeline = Pipeline::new(config, oracle).context("Failed to create pipeline")?;
    let writer = Writer::new(&cli.out, !cli.no_backup);

    match pipeline.generate(&repo_name, files).await {
        Ok(output) => finish(&cli, &writer, &repo_name, &output),
        Err(e)
            if cli.fallback_on_empty
                && e.is_empty_response()
                && e.stage() == Some(Stage::Compose) =>
        {
            warn!("{e}; writing placeholder README");
            writer
                .write_document(FALLBACK_DOCUMENT)
                .context("Failed to write README")
        }
        Err(e) => Err(e).context("README generation failed"),
    }
}

fn build_config(cli: &Cli) -> repo_readme::Result<Config> {
    let mut builder = Config::builder()
        .max_tokens_per_batch(cli.max_tokens)
        .max_lines_per_file(cli.max_lines)
        .tokenizer(cli.tokenizer.into())
        .concurrency(cli.concurrency)
        .allow_partial(!cli.strict)
        .dry_run(cli.dry_run)
        .filter_rules(FilterRules::default().exclude(cli.exclude.iter().cloned()));

    if cli.split_oversized {
        builder = builder.oversize_policy(OversizePolicy::SplitLines);
    }

    if let Some(max_files) = cli.max_files {
        builder = builder.max_files(max_files);
    }

    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    if let Some(ref template_path) = cli.template {
        builder = builder.readme_template(template_path);
    }

    builder.build()
}

fn finish(cli: &Cli, writer: &Writer, repo_name: &str, output: &PipelineOutput) -> anyhow::Result<()> {
    match &output.document {
        Some(document) => {
            if document.is_degraded() {
                warn!(
                    "README was composed without {} batch summaries",
                    document.empty_batches.len()
                );
            }
            writer
                .write_document(&document.text)
                .context("Failed to write README")?;
        }
        None => {
            for batch in &output.batches {
                println!(
                    "batch {:>3}: {:>6} tokens  {}",
                    batch.index + 1,
                    batch.total_tokens,
                    batch.paths().collect::<Vec<_>>().join(", ")
                );
            }
        }
    }

    if cli.summary && !cli.dry_run {
        writer
            .write_summary(repo_name, output)
            .context("Failed to write summary")?;
    }

    output.stats.print_summary();
    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("repo_readme=info"),
        1 => EnvFilter::new("repo_readme=debug"),
        _ => EnvFilter::new("repo_readme=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
