//! Reduce step: turns the ordered batch summaries into the final README.

use crate::{
    error::{Error, Result, Stage},
    llm::Oracle,
    prompt::{PromptEngine, README_SYSTEM_PROMPT},
    summarizer::BatchSummary,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Placeholder document for callers that prefer a file over a failure.
pub const FALLBACK_DOCUMENT: &str = "README generation failed.";

/// The generated README and how it was obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDocument {
    /// README text as returned by the model
    pub text: String,

    /// Indices of batches whose summaries were empty and left out
    pub empty_batches: Vec<usize>,
}

impl GeneratedDocument {
    /// Returns true if some batch summaries were missing.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.empty_batches.is_empty()
    }
}

/// Issues the final model call.
pub struct Composer {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptEngine>,
    repo_name: String,
}

impl Composer {
    /// Creates a composer for one repository.
    #[must_use]
    pub fn new(
        oracle: Arc<dyn Oracle>,
        prompts: Arc<PromptEngine>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            prompts,
            repo_name: repo_name.into(),
        }
    }

    /// Composes the README from summaries in batch order.
    ///
    /// Empty summaries are left out of the prompt and reported through
    /// [`GeneratedDocument::empty_batches`]. With no summaries at all the
    /// model still gets one request and works from the repository name.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the model returns nothing.
    pub async fn compose(&self, summaries: &[BatchSummary]) -> Result<GeneratedDocument> {
        let empty_batches: Vec<usize> = summaries
            .iter()
            .filter(|s| s.is_empty())
            .map(|s| s.index)
            .collect();

        if !empty_batches.is_empty() {
            warn!(
                "Composing without {} of {} batch summaries",
                empty_batches.len(),
                summaries.len()
            );
        }

        let texts: Vec<&str> = summaries
            .iter()
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.text.as_deref())
            .collect();
        let prompt = self.prompts.render_readme(&self.repo_name, &texts)?;

        info!("Composing README from {} summaries", texts.len());
        debug!("README prompt is {} bytes", prompt.len());

        let text = self
            .oracle
            .complete(Stage::Compose, README_SYSTEM_PROMPT, &prompt)
            .await?
            .filter(|t| !t.trim().is_empty())
            .ok_or(Error::empty_response(Stage::Compose))?;

        Ok(GeneratedDocument {
            text,
            empty_batches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the compose prompt and returns a fixed answer.
    struct RecordingOracle {
        answer: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingOracle {
        fn answering(answer: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                answer: answer.map(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Oracle for RecordingOracle {
        async fn complete(&self, stage: Stage, system: &str, prompt: &str) -> Result<Option<String>> {
            assert_eq!(stage, Stage::Compose);
            assert_eq!(system, README_SYSTEM_PROMPT);
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.answer.clone())
        }
    }

    fn composer(oracle: Arc<RecordingOracle>) -> Composer {
        Composer::new(
            oracle,
            Arc::new(PromptEngine::new(None).unwrap()),
            "acme/widgets",
        )
    }

    fn summary(index: usize, text: Option<&str>) -> BatchSummary {
        BatchSummary {
            index,
            text: text.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_compose_returns_model_text() {
        let oracle = RecordingOracle::answering(Some("# Widgets\n"));
        let document = composer(oracle.clone())
            .compose(&[summary(0, Some("S1")), summary(1, Some("S2"))])
            .await
            .unwrap();

        assert_eq!(document.text, "# Widgets\n");
        assert!(!document.is_degraded());

        let prompts = oracle.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("S1\n\n---\n\nS2"));
    }

    #[tokio::test]
    async fn test_empty_summaries_are_skipped_and_reported() {
        let oracle = RecordingOracle::answering(Some("doc"));
        let document = composer(oracle.clone())
            .compose(&[
                summary(0, Some("S1")),
                summary(1, None),
                summary(2, Some("S3")),
            ])
            .await
            .unwrap();

        assert!(document.is_degraded());
        assert_eq!(document.empty_batches, vec![1]);
        assert!(oracle.prompts.lock().unwrap()[0].contains("S1\n\n---\n\nS3"));
    }

    #[tokio::test]
    async fn test_compose_with_no_summaries_still_calls_model() {
        let oracle = RecordingOracle::answering(Some("doc"));
        let document = composer(oracle.clone()).compose(&[]).await.unwrap();

        assert_eq!(document.text, "doc");
        assert_eq!(oracle.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_compose_answer_is_error() {
        let oracle = RecordingOracle::answering(None);
        let err = composer(oracle)
            .compose(&[summary(0, Some("S1"))])
            .await
            .unwrap_err();

        assert!(err.is_empty_response());
        assert_eq!(err.stage(), Some(Stage::Compose));
    }

    #[tokio::test]
    async fn test_blank_compose_answer_is_error() {
        let oracle = RecordingOracle::answering(Some(" \n\t"));
        let err = composer(oracle)
            .compose(&[summary(0, Some("S1"))])
            .await
            .unwrap_err();

        assert!(err.is_empty_response());
        assert_eq!(err.stage(), Some(Stage::Compose));
    }

    #[tokio::test]
    async fn test_blank_summaries_are_treated_as_empty() {
        let oracle = RecordingOracle::answering(Some("doc"));
        let document = composer(oracle.clone())
            .compose(&[summary(0, Some("S1")), summary(1, Some("  \n"))])
            .await
            .unwrap();

        assert_eq!(document.empty_batches, vec![1]);
        assert!(!oracle.prompts.lock().unwrap()[0].contains("---"));
    }
}
