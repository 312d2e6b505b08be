use crate::batcher::OversizePolicy;
use crate::error::{Error, Result};
use crate::filter::{FilterRules, PathFilter};
use crate::token::TokenizerKind;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_MAX_TOKENS_PER_BATCH: usize = 6_000;
const DEFAULT_MAX_LINES_PER_FILE: usize = 300;
const DEFAULT_CONCURRENCY: usize = 4;

/// Configuration for one README generation run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Token ceiling per batch
    pub max_tokens_per_batch: usize,

    /// Lines kept from the head of each file
    pub max_lines_per_file: usize,

    /// Path exclusion rules
    pub filter_rules: FilterRules,

    /// Tokenizer implementation used for batching
    pub tokenizer: TokenizerKind,

    /// Handling of files that exceed the ceiling on their own
    pub oversize_policy: OversizePolicy,

    /// Maximum number of files kept after filtering
    pub max_files: Option<usize>,

    /// Maximum number of batch summaries in flight
    pub concurrency: usize,

    /// Tolerate empty batch summaries instead of failing
    pub allow_partial: bool,

    /// Deadline for the whole run
    pub timeout: Option<Duration>,

    /// Path to a Tera template replacing the built-in README prompt
    pub readme_template: Option<PathBuf>,

    /// Dry run mode (batch only, no model calls)
    pub dry_run: bool,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use repo_readme::Config;
    ///
    /// let config = Config::builder()
    ///     .max_tokens_per_batch(8_000)
    ///     .concurrency(2)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Token, line or concurrency limits are zero
    /// - A filter pattern is not a valid glob
    /// - The README template is missing or invalid
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens_per_batch == 0 {
            return Err(Error::config("max_tokens_per_batch must be greater than 0"));
        }

        if self.max_lines_per_file == 0 {
            return Err(Error::config("max_lines_per_file must be greater than 0"));
        }

        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be greater than 0"));
        }

        if self.max_files == Some(0) {
            return Err(Error::config("max_files must be greater than 0 when set"));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::config("timeout must be greater than 0 when set"));
        }

        PathFilter::new(&self.filter_rules)?;

        if let Some(ref template_path) = self.readme_template {
            if !template_path.exists() {
                return Err(Error::config(format!(
                    "Template file does not exist: {}",
                    template_path.display()
                )));
            }

            if !template_path.is_file() {
                return Err(Error::config(format!(
                    "Template path is not a file: {}",
                    template_path.display()
                )));
            }

            crate::template_validator::TemplateValidator::validate_template(template_path)?;
        }

        if !self.tokenizer.is_exact() {
            tracing::debug!(
                "{:?} tokenizer only approximates the model's count; the batch ceiling is a soft limit",
                self.tokenizer
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tokens_per_batch: DEFAULT_MAX_TOKENS_PER_BATCH,
            max_lines_per_file: DEFAULT_MAX_LINES_PER_FILE,
            filter_rules: FilterRules::default(),
            tokenizer: TokenizerKind::Cl100k,
            oversize_policy: OversizePolicy::Singleton,
            max_files: None,
            concurrency: DEFAULT_CONCURRENCY,
            allow_partial: true,
            timeout: None,
            readme_template: None,
            dry_run: false,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    max_tokens_per_batch: Option<usize>,
    max_lines_per_file: Option<usize>,
    filter_rules: Option<FilterRules>,
    tokenizer: Option<TokenizerKind>,
    oversize_policy: Option<OversizePolicy>,
    max_files: Option<usize>,
    concurrency: Option<usize>,
    allow_partial: Option<bool>,
    timeout: Option<Duration>,
    readme_template: Option<PathBuf>,
    dry_run: bool,
}

impl ConfigBuilder {
    /// Sets the token ceiling per batch.
    #[must_use]
    pub fn max_tokens_per_batch(mut self, tokens: usize) -> Self {
        self.max_tokens_per_batch = Some(tokens);
        self
    }

    /// Sets how many lines of each file are kept.
    #[must_use]
    pub fn max_lines_per_file(mut self, lines: usize) -> Self {
        self.max_lines_per_file = Some(lines);
        self
    }

    /// Sets the path exclusion rules.
    #[must_use]
    pub fn filter_rules(mut self, rules: FilterRules) -> Self {
        self.filter_rules = Some(rules);
        self
    }

    /// Sets the tokenizer implementation.
    #[must_use]
    pub fn tokenizer(mut self, kind: TokenizerKind) -> Self {
        self.tokenizer = Some(kind);
        self
    }

    /// Sets the policy for files that exceed the ceiling on their own.
    #[must_use]
    pub fn oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize_policy = Some(policy);
        self
    }

    /// Keeps at most `count` files after filtering.
    #[must_use]
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }

    /// Sets the number of batch summaries requested concurrently.
    ///
    /// `1` summarizes batches one after another.
    #[must_use]
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    /// Chooses whether an empty batch summary degrades the result or fails
    /// the run.
    #[must_use]
    pub fn allow_partial(mut self, enabled: bool) -> Self {
        self.allow_partial = Some(enabled);
        self
    }

    /// Sets a deadline for the whole run.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the path to a template replacing the built-in README prompt.
    ///
    /// The template must contain valid Tera syntax and embed `{{ summaries }}`.
    /// `repo_name` and `summary_count` are also available.
    #[must_use]
    pub fn readme_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.readme_template = Some(path.into());
        self
    }

    /// Enables dry run mode (no model calls).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();
        let config = Config {
            max_tokens_per_batch: self
                .max_tokens_per_batch
                .unwrap_or(defaults.max_tokens_per_batch),
            max_lines_per_file: self
                .max_lines_per_file
                .unwrap_or(defaults.max_lines_per_file),
            filter_rules: self.filter_rules.unwrap_or(defaults.filter_rules),
            tokenizer: self.tokenizer.unwrap_or(defaults.tokenizer),
            oversize_policy: self.oversize_policy.unwrap_or(defaults.oversize_policy),
            max_files: self.max_files,
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
            allow_partial: self.allow_partial.unwrap_or(defaults.allow_partial),
            timeout: self.timeout,
            readme_template: self.readme_template,
            dry_run: self.dry_run,
        };

        config.validate()?;
        Ok(config)
    }
}
