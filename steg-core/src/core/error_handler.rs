//! Sample failure tracking and error formatting

use crate::core::errors::{ErrorCategory, ErrorContext, StegError, UserFriendlyError};
use crate::core::models::SampleFailure;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct ErrorHandlerConfig {
    /// Maximum number of sample failures kept for the final report
    pub max_recorded_failures: usize,
    /// Whether to log error context at debug level
    pub log_context: bool,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            max_recorded_failures: 1000,
            log_context: true,
        }
    }
}

/// Collects per-sample failures so a batch can finish and report them at the end
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    failures: Vec<SampleFailure>,
    by_category: HashMap<ErrorCategory, u64>,
    total: u64,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self {
            config,
            failures: Vec::new(),
            by_category: HashMap::new(),
            total: 0,
        }
    }

    /// Record a sample-level failure and log it
    pub fn record_sample_failure(&mut self, path: &Path, stage: &str, err: &StegError) {
        self.total += 1;
        *self.by_category.entry(err.category()).or_insert(0) += 1;

        match err.category() {
            ErrorCategory::ExternalTool | ErrorCategory::FileFormat => {
                warn!(
                    file = %path.display(),
                    stage = stage,
                    category = ?err.category(),
                    "Skipping sample: {}", err
                );
            }
            _ => {
                error!(
                    file = %path.display(),
                    stage = stage,
                    category = ?err.category(),
                    "Skipping sample: {}", err
                );
            }
        }

        if self.config.log_context {
            if let Some(ctx) = err.context() {
                debug!(
                    operation = %ctx.operation,
                    file_path = ?ctx.file_path,
                    diagnostics = ?ctx.diagnostics,
                    "Error context details"
                );
            }
        }

        if self.failures.len() < self.config.max_recorded_failures {
            self.failures.push(SampleFailure::new(path, stage, err.to_string()));
        }
    }

    /// Record a sample that was rejected without an error value (e.g. unsupported type)
    pub fn record_rejection(&mut self, path: &Path, stage: &str, reason: impl Into<String>) {
        self.total += 1;
        let reason = reason.into();
        debug!(file = %path.display(), stage = stage, "Rejected sample: {}", reason);
        if self.failures.len() < self.config.max_recorded_failures {
            self.failures.push(SampleFailure::new(path, stage, reason));
        }
    }

    pub fn failures(&self) -> &[SampleFailure] {
        &self.failures
    }

    pub fn into_failures(self) -> Vec<SampleFailure> {
        self.failures
    }

    pub fn statistics(&self) -> HashMap<String, u64> {
        let mut stats = HashMap::new();
        stats.insert("total_errors".to_string(), self.total);
        for (category, count) in &self.by_category {
            stats.insert(format!("category_{:?}", category).to_lowercase(), *count);
        }
        stats
    }

    /// Format an error for terminal display
    pub fn format_error_for_display(&self, err: &StegError, verbose: bool) -> String {
        format_user_friendly(&err.to_user_friendly(), err.context(), verbose)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(ErrorHandlerConfig::default())
    }
}

pub fn format_user_friendly(
    user_friendly: &UserFriendlyError,
    context: Option<&ErrorContext>,
    verbose: bool,
) -> String {
    let mut output = format!("{}\n", user_friendly.message);

    if verbose {
        if let Some(ctx) = context {
            output.push_str("\nContext:\n");
            output.push_str(&format!("   Operation: {}\n", ctx.operation));
            if let Some(path) = &ctx.file_path {
                output.push_str(&format!("   File Path: {}\n", path));
            }
            if let Some(kind) = &ctx.media_kind {
                output.push_str(&format!("   Media: {}\n", kind));
            }
            output.push_str(&format!("   Timestamp: {}\n", ctx.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
            let mut keys: Vec<_> = ctx.diagnostics.keys().collect();
            keys.sort();
            for key in keys {
                output.push_str(&format!("     {}: {}\n", key, ctx.diagnostics[key]));
            }
        }
    }

    if !user_friendly.suggestions.is_empty() {
        output.push_str("\nSuggestions:\n");
        for (i, suggestion) in user_friendly.suggestions.iter().enumerate() {
            output.push_str(&format!("   {}. {}\n", i + 1, suggestion));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_records_failures_and_statistics() {
        let mut handler = ErrorHandler::default();
        let path = PathBuf::from("broken.mp4");
        handler.record_sample_failure(&path, "feature_extraction", &StegError::data_format("no frames"));
        handler.record_rejection(Path::new("notes.txt"), "sniffing", "unsupported type");

        assert_eq!(handler.failures().len(), 2);
        assert_eq!(handler.failures()[0].stage, "feature_extraction");
        let stats = handler.statistics();
        assert_eq!(stats.get("total_errors"), Some(&2));
        assert_eq!(stats.get("category_fileformat"), Some(&1));
    }

    #[test]
    fn test_failure_cap() {
        let mut handler = ErrorHandler::new(ErrorHandlerConfig {
            max_recorded_failures: 1,
            log_context: false,
        });
        for name in ["a.png", "b.png"] {
            handler.record_rejection(Path::new(name), "sniffing", "unsupported");
        }
        assert_eq!(handler.failures().len(), 1);
        assert_eq!(handler.statistics().get("total_errors"), Some(&2));
    }

    #[test]
    fn test_verbose_format_includes_context() {
        let handler = ErrorHandler::default();
        let err = StegError::external_tool("wine", "exit status 3")
            .with_context(ErrorContext::new("npelo_extraction").with_file_path("clip.mp4"));
        let text = handler.format_error_for_display(&err, true);
        assert!(text.contains("Operation: npelo_extraction"));
        assert!(text.contains("clip.mp4"));
        assert!(text.contains("Suggestions"));
    }
}
