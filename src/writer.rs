use crate::{
    error::{Error, Result},
    pipeline::{PipelineOutput, PipelineStats},
};
use serde::Serialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info};

/// Run report written next to the README.
#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    repo_name: &'a str,
    output_file: String,
    degraded: bool,
    empty_batches: Vec<usize>,
    batches: Vec<BatchReport<'a>>,
    stats: &'a PipelineStats,
    generated_at: String,
}

/// Summary of a single batch.
#[derive(Debug, Serialize)]
struct BatchReport<'a> {
    /// Batch number (1-based for user display)
    number: usize,
    files: Vec<&'a str>,
    tokens: usize,
    summarized: bool,
}

/// Persists the generated README.
pub struct Writer {
    output_file: PathBuf,
    backup_existing: bool,
}

impl Writer {
    /// Creates a writer targeting `output_file`.
    #[must_use]
    pub fn new(output_file: impl Into<PathBuf>, backup_existing: bool) -> Self {
        Self {
            output_file: output_file.into(),
            backup_existing,
        }
    }

    /// Returns the path the README is written to.
    #[must_use]
    pub fn output_file(&self) -> &Path {
        &self.output_file
    }

    /// Writes the document, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the write fails.
    pub fn write_document(&self, text: &str) -> Result<()> {
        if let Some(parent) = self.output_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        self.write_file_atomic(&self.output_file, text)?;

        info!(
            "Wrote README ({} bytes) to {}",
            text.len(),
            self.output_file.display()
        );
        Ok(())
    }

    /// Writes the document atomically with optional backup.
    ///
    /// # Process
    ///
    /// 1. Creates backup if file exists and backup is enabled
    /// 2. Writes content to temporary file
    /// 3. Syncs temporary file to disk
    /// 4. Atomically renames temporary file to target path
    fn write_file_atomic(&self, path: &Path, content: &str) -> Result<()> {
        if path.exists() && self.backup_existing {
            Self::backup_file(path)?;
        }

        let temp_path = path.with_extension("tmp");
        let mut temp_file = fs::File::create(&temp_path).map_err(|e| Error::io(&temp_path, e))?;

        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| Error::io(&temp_path, e))?;

        temp_file.sync_all().map_err(|e| Error::io(&temp_path, e))?;

        drop(temp_file);

        fs::rename(&temp_path, path).map_err(|e| Error::io(path, e))?;

        Ok(())
    }

    /// Creates a timestamped backup of an existing file.
    fn backup_file(path: &Path) -> Result<()> {
        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_nanos();

        let filename = path
            .file_name()
            .ok_or_else(|| Error::config("Invalid file path"))?
            .to_string_lossy();

        let backup_path = path.with_file_name(format!("{filename}.backup.{timestamp}"));

        fs::copy(path, &backup_path).map_err(|e| Error::io(&backup_path, e))?;

        debug!("Created backup: {}", backup_path.display());
        Ok(())
    }

    /// Path of the JSON run report, `summary.json` beside the README.
    #[must_use]
    pub fn summary_path(&self) -> PathBuf {
        self.output_file.with_file_name("summary.json")
    }

    /// Writes a JSON report describing the batches and the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the summary file cannot be written.
    pub fn write_summary(&self, repo_name: &str, output: &PipelineOutput) -> Result<PathBuf> {
        let empty_batches = output
            .document
            .as_ref()
            .map(|d| d.empty_batches.clone())
            .unwrap_or_default();

        let summary = RunSummary {
            repo_name,
            output_file: self.output_file.display().to_string(),
            degraded: !empty_batches.is_empty(),
            batches: output
                .batches
                .iter()
                .map(|b| BatchReport {
                    number: b.index + 1,
                    files: b.paths().collect(),
                    tokens: b.total_tokens,
                    summarized: output
                        .summaries
                        .get(b.index)
                        .is_some_and(|s| !s.is_empty()),
                })
                .collect(),
            empty_batches,
            stats: &output.stats,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };

        let summary_path = self.summary_path();
        if let Some(parent) = summary_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let file = fs::File::create(&summary_path).map_err(|e| Error::io(&summary_path, e))?;
        serde_json::to_writer_pretty(file, &summary).map_err(Error::from)?;

        info!("Wrote summary to {}", summary_path.display());
        Ok(summary_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        batcher::{Batcher, OversizePolicy},
        composer::GeneratedDocument,
        file::FileEntry,
        summarizer::BatchSummary,
        token::TokenizerKind,
    };
    use assert_fs::prelude::*;

    fn sample_output() -> PipelineOutput {
        let batcher = Batcher::new(
            1,
            OversizePolicy::Singleton,
            TokenizerKind::Simple.create().unwrap(),
        );
        let batches = batcher.batch(&[
            FileEntry::new("src/a.rs", "fn a() {}"),
            FileEntry::new("src/b.rs", "fn b() {}"),
        ]);

        PipelineOutput {
            document: Some(GeneratedDocument {
                text: "# Demo".to_string(),
                empty_batches: vec![1],
            }),
            summaries: vec![
                BatchSummary {
                    index: 0,
                    text: Some("a".to_string()),
                },
                BatchSummary {
                    index: 1,
                    text: None,
                },
            ],
            batches,
            stats: PipelineStats::default(),
        }
    }

    #[test]
    fn test_writer_creates_parent_directories() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("docs/nested/README.md");

        Writer::new(output.path(), true)
            .write_document("# Hello\n")
            .unwrap();

        output.assert("# Hello\n");
    }

    #[test]
    fn test_writer_creates_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("README.md");
        output.write_str("old content").unwrap();

        Writer::new(output.path(), true)
            .write_document("new content")
            .unwrap();

        output.assert("new content");
        let backups: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("README.md.backup."))
            .collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(temp.path().join(&backups[0])).unwrap(),
            "old content"
        );
    }

    #[test]
    fn test_writer_without_backup() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = temp.child("README.md");
        output.write_str("old").unwrap();

        Writer::new(output.path(), false)
            .write_document("new")
            .unwrap();

        let count = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(count, 1);
        assert!(!temp.child("README.tmp").exists());
    }

    #[test]
    fn test_writer_creates_summary() {
        let temp = assert_fs::TempDir::new().unwrap();
        let writer = Writer::new(temp.child("README.md").path(), true);

        let path = writer.write_summary("acme/demo", &sample_output()).unwrap();
        assert_eq!(path, temp.path().join("summary.json"));

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["repo_name"], "acme/demo");
        assert_eq!(json["degraded"], true);
        assert_eq!(json["empty_batches"][0], 1);
        assert_eq!(json["batches"][0]["number"], 1);
        assert_eq!(json["batches"][0]["files"][0], "src/a.rs");
        assert_eq!(json["batches"][0]["summarized"], true);
        assert_eq!(json["batches"][1]["summarized"], false);
    }
}
