//! Path-based exclusion of files that add little to a human-facing summary.
//!
//! Dotfiles, dependency trees, build output, lockfiles, API route internals,
//! tests and binary assets are dropped before batching.

use crate::error::{Error, Result};
use crate::file::FileEntry;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::trace;

const DEFAULT_EXCLUDES: &[&str] = &[
    // dotfiles and dot-directories (.git, .github, .env, ...)
    "**/.*",
    // dependencies and build output
    "**/node_modules",
    "**/dist",
    "**/build",
    "**/target",
    // internal API routes
    "**/api",
    // lockfiles and manifests
    "**/*.lock",
    "**/*.json",
    // config scripts
    "**/*.config.js",
    // tests
    "**/*.test.ts",
    "**/*.spec.ts",
    "**/*.test.js",
    "**/*.spec.js",
    // binary and media assets
    "**/*.{png,jpg,jpeg,gif,svg,ico,pdf,zip,tar,gz}",
];

/// Glob patterns describing which paths to exclude.
///
/// A path is excluded when it, or any of its parent directories, matches one
/// of the patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRules {
    exclude: Vec<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            exclude: DEFAULT_EXCLUDES.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl FilterRules {
    /// Creates a rule set that excludes nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            exclude: Vec::new(),
        }
    }

    /// Adds exclusion patterns to the rule set.
    #[must_use]
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Returns the exclusion patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.exclude
    }
}

/// Compiled form of [`FilterRules`].
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude: GlobSet,
}

impl PathFilter {
    /// Compiles the rule set.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern is not a valid glob.
    pub fn new(rules: &FilterRules) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in &rules.exclude {
            let glob = Glob::new(pattern)
                .map_err(|e| Error::config(format!("Invalid glob pattern '{pattern}': {e}")))?;
            builder.add(glob);
        }

        let exclude = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build glob set: {e}")))?;

        Ok(Self { exclude })
    }

    /// Returns true if the path survives the filter.
    #[must_use]
    pub fn is_included(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/");
        let path = Path::new(normalized.trim_start_matches("./"));

        !path
            .ancestors()
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .any(|ancestor| self.exclude.is_match(ancestor))
    }

    /// Keeps the entries whose path survives the filter, in input order.
    #[must_use]
    pub fn apply(&self, entries: Vec<FileEntry>) -> Vec<FileEntry> {
        entries
            .into_iter()
            .filter(|entry| {
                let keep = self.is_included(&entry.path);
                if !keep {
                    trace!("Excluding {}", entry.path);
                }
                keep
            })
            .collect()
    }
}
