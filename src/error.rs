use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage that talked to the model when a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Summarizing the batch with the given 0-based index
    Batch(usize),
    /// Composing the final document
    Compose,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Batch(index) => write!(f, "batch {}", index + 1),
            Self::Compose => f.write_str("final compose"),
        }
    }
}

/// Comprehensive error types for the repo-readme library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Prompt template rendering error.
    #[error("Failed to render template '{template}': {message}")]
    Template {
        /// Template name
        template: String,
        /// Error message
        message: String,
    },

    /// A user supplied template failed validation.
    #[error("Invalid template '{path}': {reason}")]
    TemplateValidation {
        /// Template path
        path: String,
        /// Why it was rejected
        reason: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// No processable files found in directory.
    #[error("No processable files found in '{path}'. Check .gitignore rules or file permissions.")]
    NoFiles {
        /// Directory that was scanned
        path: PathBuf,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// System time error.
    #[error("System time error: {message}")]
    SystemTime {
        /// Error message
        message: String,
    },

    /// The URL is not a GitHub repository URL.
    #[error("Invalid GitHub URL '{url}': expected https://github.com/<owner>/<repo>")]
    InvalidRepoUrl {
        /// The rejected URL
        url: String,
    },

    /// `git clone` failed.
    #[error("Failed to clone '{url}': {message}")]
    Clone {
        /// Repository URL
        url: String,
        /// Error message or git stderr
        message: String,
    },

    /// The model endpoint could not be reached or its answer could not be decoded.
    #[error("LLM request failed during {stage}: {message}")]
    Transport {
        /// Stage that issued the request
        stage: Stage,
        /// Error message
        message: String,
    },

    /// The model endpoint answered with a non-success status.
    #[error("LLM endpoint returned {status} during {stage}: {body}")]
    Status {
        /// Stage that issued the request
        stage: Stage,
        /// HTTP status code
        status: u16,
        /// Response body, as far as it could be read
        body: String,
    },

    /// The model answered without any usable content.
    #[error("LLM returned no content during {stage}")]
    EmptyResponse {
        /// Stage that issued the request
        stage: Stage,
    },

    /// The run exceeded its deadline.
    #[error("Generation timed out after {:.1}s", .after.as_secs_f64())]
    Timeout {
        /// Configured deadline
        after: Duration,
    },
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a template error.
    #[must_use]
    pub fn template(template: impl Into<String>, source: tera::Error) -> Self {
        Self::Template {
            template: template.into(),
            message: source.to_string(),
        }
    }

    /// Creates a template validation error.
    #[must_use]
    pub fn template_validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TemplateValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Creates a no files error.
    #[must_use]
    pub fn no_files(path: impl Into<PathBuf>) -> Self {
        Self::NoFiles { path: path.into() }
    }

    /// Creates an invalid repository URL error.
    #[must_use]
    pub fn invalid_repo_url(url: impl Into<String>) -> Self {
        Self::InvalidRepoUrl { url: url.into() }
    }

    /// Creates a clone error.
    #[must_use]
    pub fn clone_failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Clone {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error for the given stage.
    #[must_use]
    pub fn transport(stage: Stage, message: impl Into<String>) -> Self {
        Self::Transport {
            stage,
            message: message.into(),
        }
    }

    /// Creates an empty response error for the given stage.
    #[must_use]
    pub const fn empty_response(stage: Stage) -> Self {
        Self::EmptyResponse { stage }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if the model answered without content.
    #[must_use]
    pub const fn is_empty_response(&self) -> bool {
        matches!(self, Self::EmptyResponse { .. })
    }

    /// Returns true if the failure came from talking to the model endpoint.
    #[must_use]
    pub const fn is_oracle(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Status { .. } | Self::EmptyResponse { .. }
        )
    }

    /// Returns the stage of an oracle failure, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Transport { stage, .. }
            | Self::Status { stage, .. }
            | Self::EmptyResponse { stage } => Some(*stage),
            _ => None,
        }
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(e: std::time::SystemTimeError) -> Self {
        Self::SystemTime {
            message: e.to_string(),
        }
    }
}

impl From<tera::Error> for Error {
    fn from(e: tera::Error) -> Self {
        Self::Template {
            template: "unknown".to_string(),
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
