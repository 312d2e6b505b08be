use crate::{
    batcher::Batch,
    error::{Error, Result},
    template_validator::TemplateValidator,
};
use serde::Serialize;
use std::path::Path;
use tera::{Context, Tera};

/// System prompt sent with every batch request.
pub const BATCH_SYSTEM_PROMPT: &str = "You are a senior software engineer. You read source code \
and explain what it does in plain language for people who have never seen the project.";

/// System prompt sent with the final README request.
pub const README_SYSTEM_PROMPT: &str = "You are an expert open-source maintainer and technical \
writer. You write high-quality, beginner-friendly, and visually appealing README files for \
GitHub projects. You never include license sections or deep internal documentation like API \
routes or socket protocols. Feel free to use emojis in section headers or bullet points to make \
the README more engaging.";

/// Separator placed between batch summaries in the README prompt.
pub const SUMMARY_DELIMITER: &str = "\n\n---\n\n";

const BATCH_TEMPLATE: &str = "batch";
const README_TEMPLATE: &str = "readme";

#[derive(Serialize)]
struct BatchContext<'a> {
    repo_name: &'a str,
    batch_number: usize,
    batch_count: usize,
    files: String,
}

#[derive(Serialize)]
struct ReadmeContext<'a> {
    repo_name: &'a str,
    summary_count: usize,
    summaries: String,
}

/// Renders the batch and README prompts.
pub struct PromptEngine {
    tera: Tera,
}

impl PromptEngine {
    /// Creates the engine with the built-in templates.
    ///
    /// When `readme_template` is given, the file is validated and replaces the
    /// built-in README prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if a template fails to compile or the override does
    /// not pass validation.
    pub fn new(readme_template: Option<&Path>) -> Result<Self> {
        let mut tera = Tera::default();
        // Prompts are plain text, never HTML.
        tera.autoescape_on(vec![]);

        tera.add_raw_template(BATCH_TEMPLATE, include_str!("../templates/batch.tera"))
            .map_err(|e| Error::template(BATCH_TEMPLATE, e))?;

        let readme = match readme_template {
            Some(path) => {
                tracing::debug!("Using README template {}", path.display());
                TemplateValidator::validate_template(path)?
            }
            None => include_str!("../templates/readme.tera").to_string(),
        };

        tera.add_raw_template(README_TEMPLATE, &readme)
            .map_err(|e| Error::template(README_TEMPLATE, e))?;

        Ok(Self { tera })
    }

    /// Renders the prompt asking for a summary of one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_batch(&self, repo_name: &str, batch: &Batch, batch_count: usize) -> Result<String> {
        let context = BatchContext {
            repo_name,
            batch_number: batch.index + 1,
            batch_count,
            files: batch.render(),
        };

        self.render(BATCH_TEMPLATE, &context)
    }

    /// Renders the prompt asking for the README, with the summaries in order.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub fn render_readme(&self, repo_name: &str, summaries: &[&str]) -> Result<String> {
        let context = ReadmeContext {
            repo_name,
            summary_count: summaries.len(),
            summaries: summaries.join(SUMMARY_DELIMITER),
        };

        self.render(README_TEMPLATE, &context)
    }

    fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String> {
        let context = Context::from_serialize(context).map_err(|e| Error::template(name, e))?;
        self.tera
            .render(name, &context)
            .map_err(|e| Error::template(name, e))
    }
}
