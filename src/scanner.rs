use crate::{
    error::{Error, Result},
    file::{FileEntry, has_binary_extension, is_likely_binary},
};
use ignore::{DirEntry, WalkBuilder, WalkState};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};
use tracing::{debug, trace, warn};

/// Statistics collected during scanning.
#[derive(Debug, Default, Clone)]
struct ScanStats {
    total_files: usize,
    text_files: usize,
    binary_files: usize,
    errors: usize,
}

/// Reads a local checkout into [`FileEntry`] values.
///
/// `.gitignore` rules apply even outside a git work tree. Hidden entries and
/// binary files are skipped.
pub struct Scanner {
    root_dir: PathBuf,
    threads: usize,
}

impl Scanner {
    /// Creates a scanner rooted at `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            threads: num_cpus::get(),
        }
    }

    /// Returns the directory being scanned.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Scans the root directory and returns all text files sorted by path.
    ///
    /// Files that cannot be read are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a directory or no text files are
    /// found.
    pub fn scan(&self) -> Result<Vec<FileEntry>> {
        if !self.root_dir.is_dir() {
            return Err(Error::config(format!(
                "Root path is not a directory: {}",
                self.root_dir.display()
            )));
        }

        let files = Arc::new(Mutex::new(Vec::<FileEntry>::new()));
        let stats = Arc::new(Mutex::new(ScanStats::default()));

        debug!("Starting parallel scan of {}", self.root_dir.display());

        let walker = WalkBuilder::new(&self.root_dir)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .hidden(true)
            .follow_links(false)
            .skip_stdout(true)
            .threads(self.threads)
            .build_parallel();

        walker.run(|| {
            let files = Arc::clone(&files);
            let stats = Arc::clone(&stats);
            let root = self.root_dir.clone();

            Box::new(move |result| {
                match result {
                    Ok(entry) if entry.file_type().is_some_and(|ft| ft.is_file()) => {
                        let outcome = Self::process_entry(&entry, &root);
                        let mut stats = stats.lock().unwrap_or_else(PoisonError::into_inner);
                        stats.total_files += 1;

                        match outcome {
                            Ok(Some(file)) => {
                                stats.text_files += 1;
                                files
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .push(file);
                            }
                            Ok(None) => stats.binary_files += 1,
                            Err(e) => {
                                warn!("Skipping {}: {}", entry.path().display(), e);
                                stats.errors += 1;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Walk error: {}", e);
                        stats
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .errors += 1;
                    }
                    _ => {}
                }
                WalkState::Continue
            })
        });

        let mut files = std::mem::take(&mut *files.lock().unwrap_or_else(PoisonError::into_inner));
        let stats = stats.lock().unwrap_or_else(PoisonError::into_inner).clone();

        debug!(
            "Scan complete: {} total, {} text, {} binary, {} errors",
            stats.total_files, stats.text_files, stats.binary_files, stats.errors
        );

        if files.is_empty() {
            return Err(Error::no_files(&self.root_dir));
        }

        // Sort for deterministic ordering
        files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(files)
    }

    /// Reads one file, returning `None` for binaries.
    fn process_entry(entry: &DirEntry, root: &Path) -> Result<Option<FileEntry>> {
        let path = entry.path();

        trace!("Processing file: {}", path.display());

        let relative_path = pathdiff::diff_paths(path, root)
            .unwrap_or_else(|| path.to_path_buf())
            .to_string_lossy()
            .replace('\\', "/");

        if has_binary_extension(path) {
            trace!("Skipping binary file (by extension): {}", relative_path);
            return Ok(None);
        }

        if is_likely_binary(path)? {
            trace!("Skipping binary file (by content): {}", relative_path);
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                Error::invalid_utf8(path)
            } else {
                Error::io(path, e)
            }
        })?;

        Ok(Some(FileEntry::new(relative_path, content)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    #[test]
    fn test_scanner_finds_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("file1.rs").write_str("fn main() {}").unwrap();
        temp.child("file2.rs").write_str("pub fn test() {}").unwrap();

        let files = Scanner::new(temp.path()).scan().unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0], FileEntry::new("file1.rs", "fn main() {}"));
        assert_eq!(files[1].path, "file2.rs");
    }

    #[test]
    fn test_scanner_skips_binary() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("text.rs").write_str("fn main() {}").unwrap();
        temp.child("binary.exe").write_binary(&[0u8; 100]).unwrap();
        temp.child("blob.dat").write_binary(&[0u8, 1, 2, 0, 255]).unwrap();

        let files = Scanner::new(temp.path()).scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "text.rs");
    }

    #[test]
    fn test_scanner_respects_gitignore() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".gitignore").write_str("ignored.rs\n").unwrap();
        temp.child("included.rs").write_str("fn main() {}").unwrap();
        temp.child("ignored.rs").write_str("fn test() {}").unwrap();

        let files = Scanner::new(temp.path()).scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "included.rs");
    }

    #[test]
    fn test_scanner_skips_hidden() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child(".env").write_str("SECRET=1").unwrap();
        temp.child(".github/workflows/ci.yml").write_str("on: push").unwrap();
        temp.child("main.py").write_str("print(1)").unwrap();

        let files = Scanner::new(temp.path()).scan().unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "main.py");
    }

    #[test]
    fn test_scanner_empty_directory() {
        let temp = assert_fs::TempDir::new().unwrap();

        let result = Scanner::new(temp.path()).scan();

        assert!(matches!(result, Err(Error::NoFiles { .. })));
    }

    #[test]
    fn test_scanner_missing_root() {
        let result = Scanner::new("/nonexistent/path/that/should/not/exist").scan();
        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_scanner_nested_directories_sorted() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/main.rs").write_str("fn main() {}").unwrap();
        temp.child("src/lib.rs").write_str("pub fn test() {}").unwrap();
        temp.child("app/page.tsx").write_str("export default 1").unwrap();

        let paths: Vec<_> = Scanner::new(temp.path())
            .scan()
            .unwrap()
            .into_iter()
            .map(|f| f.path)
            .collect();

        assert_eq!(paths, vec!["app/page.tsx", "src/lib.rs", "src/main.rs"]);
    }
}
