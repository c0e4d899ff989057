use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, VerbumError>;

/// Failure classes surfaced to the user. Every one is recoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    DataFetch,
    NavigationResolution,
    QuestionSubmission,
    Document,
    Configuration,
}

#[derive(Debug, Error)]
pub enum VerbumError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("server answered {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed payload: {message}")]
    Malformed { message: String },

    #[error("no child named '{name}' at the current level")]
    UnknownChild { name: String },

    #[error("'{name}' is not a folder")]
    NotAFolder { name: String },

    #[error("depth {depth} is outside the current path (length {len})")]
    DepthOutOfRange { depth: usize, len: usize },

    #[error("path segment '{segment}' at depth {depth} no longer resolves")]
    Unresolvable { segment: String, depth: usize },

    #[error("unsupported document type: {path}")]
    UnsupportedDocument { path: String },

    #[error("document viewer exited with {status}")]
    ViewerFailed { status: String },

    #[error("document path escapes the library root: {path}")]
    PathEscape { path: String },

    #[error("required path does not exist: {path}")]
    MissingPath { path: PathBuf },

    #[error("{message}")]
    Question { message: String },

    #[error("question answering is not configured")]
    AnswererUnavailable,

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl VerbumError {
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::Io(_)
            | Self::Json(_)
            | Self::Http(_)
            | Self::Watch(_)
            | Self::Status { .. }
            | Self::Malformed { .. }
            | Self::MissingPath { .. } => FailureClass::DataFetch,
            Self::UnknownChild { .. }
            | Self::NotAFolder { .. }
            | Self::DepthOutOfRange { .. }
            | Self::Unresolvable { .. } => FailureClass::NavigationResolution,
            Self::Question { .. } | Self::AnswererUnavailable => FailureClass::QuestionSubmission,
            Self::UnsupportedDocument { .. }
            | Self::ViewerFailed { .. }
            | Self::PathEscape { .. } => FailureClass::Document,
            Self::InvalidArgument { .. } => FailureClass::Configuration,
        }
    }
}
