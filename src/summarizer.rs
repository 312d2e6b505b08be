//! Map step: one model call per batch.
//!
//! Batches are independent, so requests may run concurrently. Results are
//! always returned in batch order regardless of completion order.

use crate::{
    batcher::Batch,
    error::{Error, Result, Stage},
    llm::Oracle,
    prompt::{BATCH_SYSTEM_PROMPT, PromptEngine},
};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Model output for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Index of the summarized batch (0-based)
    pub index: usize,

    /// Summary text, `None` when the model returned nothing
    pub text: Option<String>,
}

impl BatchSummary {
    /// Returns true if the model returned no content for this batch.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(|t| t.trim().is_empty())
    }
}

/// Summarizes batches through an [`Oracle`].
pub struct BatchSummarizer {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptEngine>,
    repo_name: String,
    concurrency: usize,
    allow_partial: bool,
}

impl BatchSummarizer {
    /// Creates a summarizer for one repository.
    ///
    /// `concurrency` is clamped to at least 1. With `allow_partial` unset an
    /// empty model answer fails the run instead of being recorded.
    #[must_use]
    pub fn new(
        oracle: Arc<dyn Oracle>,
        prompts: Arc<PromptEngine>,
        repo_name: impl Into<String>,
        concurrency: usize,
        allow_partial: bool,
    ) -> Self {
        Self {
            oracle,
            prompts,
            repo_name: repo_name.into(),
            concurrency: concurrency.max(1),
            allow_partial,
        }
    }

    /// Summarizes a single batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be rendered, the request fails,
    /// or the answer is empty and partial results are not allowed.
    pub async fn summarize(&self, batch: &Batch, batch_count: usize) -> Result<BatchSummary> {
        let stage = Stage::Batch(batch.index);
        let prompt = self
            .prompts
            .render_batch(&self.repo_name, batch, batch_count)?;

        debug!(
            "Summarizing {} of {} ({} files, {} tokens)",
            stage,
            batch_count,
            batch.len(),
            batch.total_tokens
        );

        let text = self
            .oracle
            .complete(stage, BATCH_SYSTEM_PROMPT, &prompt)
            .await?
            .filter(|t| !t.trim().is_empty());

        if text.is_none() {
            if !self.allow_partial {
                return Err(Error::empty_response(stage));
            }
            warn!("Model returned no summary for {}, skipping it", stage);
        }

        Ok(BatchSummary {
            index: batch.index,
            text,
        })
    }

    /// Summarizes all batches, at most `concurrency` at a time.
    ///
    /// The first failure aborts the remaining requests.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by [`Self::summarize`].
    pub async fn summarize_all(&self, batches: &[Batch]) -> Result<Vec<BatchSummary>> {
        let batch_count = batches.len();

        info!(
            "Summarizing {} batches (concurrency {})",
            batch_count, self.concurrency
        );

        stream::iter(batches)
            .map(|batch| self.summarize(batch, batch_count))
            .buffered(self.concurrency)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        batcher::{Batcher, OversizePolicy},
        file::FileEntry,
        token::TokenizerKind,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers from a fixed table keyed by stage; slower for earlier batches.
    struct TableOracle {
        empty: Vec<usize>,
        failing: Vec<usize>,
        blank: Vec<usize>,
        calls: Mutex<Vec<Stage>>,
    }

    impl TableOracle {
        fn new() -> Self {
            Self {
                empty: Vec::new(),
                failing: Vec::new(),
                blank: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Oracle for TableOracle {
        async fn complete(&self, stage: Stage, _system: &str, prompt: &str) -> Result<Option<String>> {
            self.calls.lock().unwrap().push(stage);
            let Stage::Batch(index) = stage else {
                return Ok(Some("readme".to_string()));
            };

            tokio::time::sleep(Duration::from_millis(10 * (5 - index.min(5)) as u64)).await;

            if self.failing.contains(&index) {
                return Err(Error::transport(stage, "connection reset"));
            }
            if self.empty.contains(&index) {
                return Ok(None);
            }
            if self.blank.contains(&index) {
                return Ok(Some(" \n ".to_string()));
            }
            let first_file = prompt
                .lines()
                .find_map(|line| line.strip_prefix("### "))
                .unwrap_or("?");
            Ok(Some(format!("summary of {first_file}")))
        }
    }

    fn batches(count: usize) -> Vec<Batch> {
        let batcher = Batcher::new(
            1,
            OversizePolicy::Singleton,
            TokenizerKind::Simple.create().unwrap(),
        );
        let entries: Vec<_> = (0..count)
            .map(|i| FileEntry::new(format!("f{i}.rs"), "fn f() {}\n"))
            .collect();
        batcher.batch(&entries)
    }

    fn summarizer(oracle: Arc<TableOracle>, concurrency: usize, allow_partial: bool) -> BatchSummarizer {
        BatchSummarizer::new(
            oracle,
            Arc::new(PromptEngine::new(None).unwrap()),
            "acme/widgets",
            concurrency,
            allow_partial,
        )
    }

    #[tokio::test]
    async fn test_summaries_keep_batch_order() {
        let oracle = Arc::new(TableOracle::new());
        let summaries = summarizer(oracle, 4, true)
            .summarize_all(&batches(4))
            .await
            .unwrap();

        let texts: Vec<_> = summaries.iter().map(|s| s.text.clone().unwrap()).collect();
        assert_eq!(
            texts,
            vec![
                "summary of f0.rs",
                "summary of f1.rs",
                "summary of f2.rs",
                "summary of f3.rs"
            ]
        );
        assert!(summaries.iter().enumerate().all(|(i, s)| s.index == i));
    }

    #[tokio::test]
    async fn test_sequential_issues_one_call_per_batch() {
        let oracle = Arc::new(TableOracle::new());
        summarizer(oracle.clone(), 1, true)
            .summarize_all(&batches(3))
            .await
            .unwrap();

        assert_eq!(
            *oracle.calls.lock().unwrap(),
            vec![Stage::Batch(0), Stage::Batch(1), Stage::Batch(2)]
        );
    }

    #[tokio::test]
    async fn test_empty_answer_is_recorded_when_partial_allowed() {
        let mut oracle = TableOracle::new();
        oracle.empty = vec![1];
        let summaries = summarizer(Arc::new(oracle), 2, true)
            .summarize_all(&batches(3))
            .await
            .unwrap();

        assert_eq!(summaries.len(), 3);
        assert!(summaries[1].is_empty());
        assert!(!summaries[0].is_empty());
        assert!(!summaries[2].is_empty());
    }

    #[tokio::test]
    async fn test_empty_answer_fails_in_strict_mode() {
        let mut oracle = TableOracle::new();
        oracle.empty = vec![1];
        let err = summarizer(Arc::new(oracle), 2, false)
            .summarize_all(&batches(3))
            .await
            .unwrap_err();

        assert!(err.is_empty_response());
        assert_eq!(err.stage(), Some(Stage::Batch(1)));
    }

    #[tokio::test]
    async fn test_transport_failure_aborts() {
        let mut oracle = TableOracle::new();
        oracle.failing = vec![0];
        let err = summarizer(Arc::new(oracle), 1, true)
            .summarize_all(&batches(3))
            .await
            .unwrap_err();

        assert!(err.is_oracle());
        assert_eq!(err.stage(), Some(Stage::Batch(0)));
    }

    #[tokio::test]
    async fn test_no_batches_no_calls() {
        let oracle = Arc::new(TableOracle::new());
        let summaries = summarizer(oracle.clone(), 4, true)
            .summarize_all(&[])
            .await
            .unwrap();

        assert!(summaries.is_empty());
        assert!(oracle.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_answer_counts_as_empty() {
        let mut oracle = TableOracle::new();
        oracle.blank = vec![0];
        let summaries = summarizer(Arc::new(oracle), 2, true)
            .summarize_all(&batches(2))
            .await
            .unwrap();

        assert_eq!(summaries[0].text, None);
        assert!(summaries[0].is_empty());

        let mut oracle = TableOracle::new();
        oracle.blank = vec![1];
        let err = summarizer(Arc::new(oracle), 2, false)
            .summarize_all(&batches(2))
            .await
            .unwrap_err();

        assert!(err.is_empty_response());
        assert_eq!(err.stage(), Some(Stage::Batch(1)));
    }
}
