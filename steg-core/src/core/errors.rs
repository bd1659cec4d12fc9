//! Error types for the steganalysis pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StegError {
    #[error("File operation failed: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Unsupported file type for {} (extension: {extension:?})", path.display())]
    UnsupportedType { path: PathBuf, extension: String },

    #[error("External tool '{tool}' failed: {message}")]
    ExternalToolError {
        tool: String,
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("External tool '{tool}' timed out after {timeout:?}")]
    TimeoutError { tool: String, timeout: Duration },

    #[error("Unexpected data format: {message}")]
    DataFormatError {
        message: String,
        context: Option<ErrorContext>,
    },

    #[error("Classifiers not found: {}", missing.join(", "))]
    MissingArtifacts { missing: Vec<String> },

    #[error("Invalid model artifact {}: {message}", path.display())]
    InvalidArtifact { path: PathBuf, message: String },

    #[error("Malformed training data in {}: {message}", path.display())]
    MalformedTrainingData { path: PathBuf, message: String },

    #[error("Feature schema mismatch: {message}")]
    SchemaMismatch { message: String },

    #[error("Training failed: {0}")]
    TrainingError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Broad grouping used for display and statistics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    FileAccess,
    FileFormat,
    ExternalTool,
    Model,
    TrainingData,
    Configuration,
    System,
}

/// Additional context attached to an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub operation: String,
    pub file_path: Option<String>,
    pub media_kind: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub diagnostics: HashMap<String, String>,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            file_path: None,
            media_kind: None,
            timestamp: Utc::now(),
            diagnostics: HashMap::new(),
        }
    }

    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().display().to_string());
        self
    }

    pub fn with_media_kind(mut self, kind: impl Into<String>) -> Self {
        self.media_kind = Some(kind.into());
        self
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.diagnostics.insert(key.into(), value.into());
        self
    }
}

/// Error rendered for an operator rather than a developer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserFriendlyError {
    pub message: String,
    pub category: ErrorCategory,
    pub suggestions: Vec<String>,
    pub recoverable: bool,
}

impl StegError {
    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        StegError::ExternalToolError {
            tool: tool.into(),
            message: message.into(),
            context: None,
        }
    }

    pub fn data_format(message: impl Into<String>) -> Self {
        StegError::DataFormatError {
            message: message.into(),
            context: None,
        }
    }

    /// Attach context to variants that carry one; other variants are returned unchanged
    pub fn with_context(self, ctx: ErrorContext) -> Self {
        match self {
            StegError::ExternalToolError { tool, message, .. } => StegError::ExternalToolError {
                tool,
                message,
                context: Some(ctx),
            },
            StegError::DataFormatError { message, .. } => StegError::DataFormatError {
                message,
                context: Some(ctx),
            },
            other => other,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            StegError::ExternalToolError { context, .. } => context.as_ref(),
            StegError::DataFormatError { context, .. } => context.as_ref(),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            StegError::FileError(_) | StegError::FileNotFound { .. } => ErrorCategory::FileAccess,
            StegError::UnsupportedType { .. } | StegError::DataFormatError { .. } => {
                ErrorCategory::FileFormat
            }
            StegError::ExternalToolError { .. } | StegError::TimeoutError { .. } => {
                ErrorCategory::ExternalTool
            }
            StegError::MissingArtifacts { .. }
            | StegError::InvalidArtifact { .. }
            | StegError::SchemaMismatch { .. } => ErrorCategory::Model,
            StegError::MalformedTrainingData { .. }
            | StegError::CsvError(_)
            | StegError::TrainingError(_) => ErrorCategory::TrainingData,
            StegError::InvalidInput(_) | StegError::ConfigError(_) => ErrorCategory::Configuration,
            StegError::SerializationError(_) => ErrorCategory::System,
        }
    }

    /// Sample-level failures are recorded and skipped; everything else aborts the run.
    pub fn is_sample_level(&self) -> bool {
        matches!(
            self,
            StegError::FileNotFound { .. }
                | StegError::UnsupportedType { .. }
                | StegError::ExternalToolError { .. }
                | StegError::TimeoutError { .. }
                | StegError::DataFormatError { .. }
                | StegError::SchemaMismatch { .. }
        )
    }

    pub fn to_user_friendly(&self) -> UserFriendlyError {
        let (message, suggestions) = match self {
            StegError::FileNotFound { path } => (
                format!("Could not find {}", path.display()),
                vec!["Check the path for typos".to_string()],
            ),
            StegError::UnsupportedType { path, .. } => (
                format!("{} is neither an image nor a video", path.display()),
                vec!["Only raster images and videos are analysed".to_string()],
            ),
            StegError::ExternalToolError { tool, .. } => (
                format!("Feature extraction with '{}' failed", tool),
                vec![
                    format!("Make sure '{}' is installed and runs on its own", tool),
                    "Re-run with --verbose to see the tool output".to_string(),
                ],
            ),
            StegError::TimeoutError { tool, timeout } => (
                format!("'{}' did not finish within {:?}", tool, timeout),
                vec!["Raise the tool timeout in the configuration file".to_string()],
            ),
            StegError::MissingArtifacts { .. } => (
                "Classifiers not found!".to_string(),
                vec!["Run `steganalyse train <dir>` to build the classifiers first".to_string()],
            ),
            StegError::InvalidArtifact { .. } | StegError::SchemaMismatch { .. } => (
                self.to_string(),
                vec!["Retrain the classifiers with the current feature extractors".to_string()],
            ),
            StegError::MalformedTrainingData { .. } | StegError::CsvError(_) => (
                self.to_string(),
                vec!["Regenerate the feature CSV with `steganalyse train`".to_string()],
            ),
            other => (other.to_string(), Vec::new()),
        };

        UserFriendlyError {
            message,
            category: self.category(),
            suggestions,
            recoverable: self.is_sample_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_level_classification() {
        assert!(StegError::FileNotFound { path: "a.png".into() }.is_sample_level());
        assert!(StegError::external_tool("wine", "exit 1").is_sample_level());
        assert!(!StegError::MissingArtifacts { missing: vec!["img-svm.json".into()] }.is_sample_level());
        assert!(!StegError::MalformedTrainingData {
            path: "img-features.csv".into(),
            message: "no class column".into()
        }
        .is_sample_level());
    }

    #[test]
    fn test_missing_artifacts_message() {
        let err = StegError::MissingArtifacts { missing: vec!["vid-lr.json".into()] };
        let friendly = err.to_user_friendly();
        assert_eq!(friendly.message, "Classifiers not found!");
        assert_eq!(friendly.category, ErrorCategory::Model);
        assert!(!friendly.recoverable);
    }

    #[test]
    fn test_context_attaches_to_tool_errors() {
        let ctx = ErrorContext::new("farid_extraction").with_file_path("cat.png");
        let err = StegError::external_tool("python2.7", "bad output").with_context(ctx);
        assert_eq!(err.context().and_then(|c| c.file_path.as_deref()), Some("cat.png"));
    }
}
