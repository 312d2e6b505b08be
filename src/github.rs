use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

static GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"github\.com/([^/]+)/([^/]+?)(?:\.git|/)?$").expect("static pattern compiles")
});

/// `owner/repo` identifier of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoName {
    /// Account or organization
    pub owner: String,
    /// Repository name without a `.git` suffix
    pub repo: String,
}

impl RepoName {
    /// Extracts the repository name from a GitHub URL.
    ///
    /// Accepts `https://github.com/owner/repo`, with an optional `.git` suffix
    /// or trailing slash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRepoUrl`] if the URL does not point at a
    /// GitHub repository.
    pub fn parse(url: &str) -> Result<Self> {
        let captures = GITHUB_URL
            .captures(url.trim())
            .ok_or_else(|| Error::invalid_repo_url(url))?;

        Ok(Self {
            owner: captures[1].to_string(),
            repo: captures[2].to_string(),
        })
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Shallow-clones a repository into a fresh temporary directory.
///
/// The directory is removed when the returned [`TempDir`] is dropped.
///
/// # Errors
///
/// Returns an error if the temporary directory cannot be created, `git`
/// cannot be started, or the clone fails.
pub async fn clone_repo(url: &str) -> Result<TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("repo-")
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;

    info!("Cloning {} into {}", url, dir.path().display());

    let output = Command::new("git")
        .arg("clone")
        .arg("--depth=1")
        .arg("--quiet")
        .arg(url)
        .arg(dir.path())
        .output()
        .await
        .map_err(|e| Error::clone_failed(url, format!("Failed to spawn git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::clone_failed(url, stderr.trim()));
    }

    debug!("Clone of {} finished", url);

    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_url() {
        let name = RepoName::parse("https://github.com/vercel/next.js").unwrap();
        assert_eq!(name.owner, "vercel");
        assert_eq!(name.repo, "next.js");
        assert_eq!(name.to_string(), "vercel/next.js");
    }

    #[test]
    fn test_parse_strips_git_suffix_and_slash() {
        assert_eq!(
            RepoName::parse("https://github.com/acme/widgets.git")
                .unwrap()
                .to_string(),
            "acme/widgets"
        );
        assert_eq!(
            RepoName::parse("https://github.com/acme/widgets/")
                .unwrap()
                .to_string(),
            "acme/widgets"
        );
    }

    #[test]
    fn test_parse_rejects_other_urls() {
        for url in [
            "https://gitlab.com/acme/widgets",
            "https://github.com/acme",
            "https://github.com/acme/widgets/tree/main",
            "not a url",
        ] {
            let err = RepoName::parse(url).unwrap_err();
            assert!(matches!(err, Error::InvalidRepoUrl { .. }), "{url}");
        }
    }

    #[tokio::test]
    async fn test_clone_failure_is_reported() {
        let result = clone_repo("/definitely/not/a/repository").await;
        assert!(matches!(result, Err(Error::Clone { .. })));
    }
}
