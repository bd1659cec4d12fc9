//! Output formatting utilities for CLI interface

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::time::Duration;
use steg_core::core::error_handler::format_user_friendly;
use steg_core::core::models::SampleFailure;
use steg_core::{ClassificationTable, ErrorCategory, ErrorContext, ProgressEvent, TrainingOutcome, UserFriendlyError};

/// Output formatter for different display formats
pub struct OutputFormatter {
    format: OutputFormat,
    use_colors: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        let use_colors = atty::is(atty::Stream::Stdout);
        Self { format, use_colors }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Create a spinner for long operations
    pub fn create_progress_bar(&self, message: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.green} {msg}")
        {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn format_banner(&self, title: &str) -> String {
        match self.format {
            OutputFormat::Text => {
                if self.use_colors {
                    format!("\n{}\n\n", format!("=== {} ===", title).bright_cyan().bold())
                } else {
                    format!("\n=== {} ===\n\n", title)
                }
            }
            OutputFormat::Json => String::new(),
        }
    }

    pub fn format_info(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Text => {
                if self.use_colors {
                    format!("{} {}\n", "[*]".bright_blue(), message)
                } else {
                    format!("[*] {}\n", message)
                }
            }
            OutputFormat::Json => String::new(),
        }
    }

    /// Results table in a psql-style box, row numbers in the first column
    pub fn format_classification_table(&self, table: &ClassificationTable) -> String {
        match self.format {
            OutputFormat::Text => {
                let records: Vec<(usize, [String; 3])> = table.records().collect();
                let mut grid: Vec<Vec<String>> = Vec::with_capacity(records.len() + 1);
                grid.push(
                    std::iter::once(String::new())
                        .chain(steg_core::inference::report::RESULT_HEADERS.iter().map(|h| h.to_string()))
                        .collect(),
                );
                for (number, cells) in records {
                    grid.push(std::iter::once(number.to_string()).chain(cells).collect());
                }

                let rendered = render_psql(&grid);
                if self.use_colors {
                    rendered
                        .lines()
                        .map(|line| {
                            if line.contains("| stego ") {
                                line.replace("| stego ", &format!("| {} ", "stego".bright_red().bold()))
                            } else {
                                line.to_string()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                        + "\n"
                } else {
                    rendered
                }
            }
            OutputFormat::Json => {
                let rows: Vec<Value> = table
                    .rows()
                    .iter()
                    .map(|row| {
                        serde_json::json!({
                            "file_name": row.file_name,
                            "svm": row.svm.to_string(),
                            "lr": row.lr.to_string(),
                        })
                    })
                    .collect();
                self.format_json(&Value::Array(rows))
            }
        }
    }

    pub fn format_failures(&self, failures: &[SampleFailure]) -> String {
        if failures.is_empty() {
            return String::new();
        }
        match self.format {
            OutputFormat::Text => {
                let mut output = String::new();
                let title = format!("{} file(s) skipped", failures.len());
                if self.use_colors {
                    output.push_str(&format!("\n{}\n", title.bright_yellow().bold()));
                } else {
                    output.push_str(&format!("\n{}\n", title));
                }
                for failure in failures {
                    output.push_str(&format!(
                        "  - {} [{}]: {}\n",
                        failure.path.display(),
                        failure.stage,
                        failure.reason
                    ));
                }
                output
            }
            OutputFormat::Json => String::new(),
        }
    }

    /// Accuracy and artifact location for every trained classifier
    pub fn format_training_summary(&self, outcomes: &[TrainingOutcome]) -> String {
        match self.format {
            OutputFormat::Text => {
                let mut grid = vec![vec![
                    "Media".to_string(),
                    "Classifier".to_string(),
                    "Train rows".to_string(),
                    "Test rows".to_string(),
                    "Accuracy".to_string(),
                    "Saved as".to_string(),
                ]];
                for outcome in outcomes {
                    grid.push(vec![
                        outcome.media.to_string(),
                        outcome.classifier.to_string(),
                        outcome.train_rows.to_string(),
                        outcome.test_rows.to_string(),
                        format!("{:.4}", outcome.holdout_accuracy),
                        outcome.artifact_path.display().to_string(),
                    ]);
                }
                render_psql(&grid)
            }
            OutputFormat::Json => {
                let entries: Vec<Value> = outcomes
                    .iter()
                    .map(|outcome| {
                        serde_json::json!({
                            "media": outcome.media.to_string(),
                            "classifier": outcome.classifier.short_name(),
                            "train_rows": outcome.train_rows,
                            "test_rows": outcome.test_rows,
                            "accuracy": outcome.holdout_accuracy,
                            "artifact": outcome.artifact_path.display().to_string(),
                        })
                    })
                    .collect();
                self.format_json(&Value::Array(entries))
            }
        }
    }

    /// Format success message
    pub fn format_success(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Text => {
                if self.use_colors {
                    format!("{}\n", message.bright_green())
                } else {
                    format!("{}\n", message)
                }
            }
            OutputFormat::Json => String::new(),
        }
    }

    /// Format warning message
    pub fn format_warning(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Text => {
                if self.use_colors {
                    format!("{}\n", message.bright_yellow())
                } else {
                    format!("{}\n", message)
                }
            }
            OutputFormat::Json => String::new(),
        }
    }

    pub fn format_json(&self, data: &Value) -> String {
        serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
    }

    /// Format a user-friendly error with context
    pub fn format_user_friendly_error(
        &self,
        error: &UserFriendlyError,
        context: Option<&ErrorContext>,
        verbose: bool,
    ) -> String {
        match self.format {
            OutputFormat::Text => {
                let plain = format_user_friendly(error, context, verbose);
                if !self.use_colors {
                    return plain;
                }
                let message = match error.category {
                    ErrorCategory::ExternalTool | ErrorCategory::FileFormat => error.message.bright_yellow().bold(),
                    _ => error.message.bright_red().bold(),
                };
                plain
                    .replacen(&error.message, &message.to_string(), 1)
                    .replacen("\nSuggestions:\n", &format!("\n{}\n", "Suggestions:".bright_cyan()), 1)
            }
            OutputFormat::Json => {
                let json_error = serde_json::json!({
                    "error": {
                        "message": error.message,
                        "category": format!("{:?}", error.category),
                        "recoverable": error.recoverable,
                        "suggestions": error.suggestions,
                        "context": context.map(|ctx| serde_json::json!({
                            "operation": ctx.operation,
                            "file_path": ctx.file_path,
                            "media_kind": ctx.media_kind,
                            "timestamp": ctx.timestamp,
                            "diagnostics": ctx.diagnostics
                        }))
                    }
                });
                self.format_json(&json_error)
            }
        }
    }
}

/// `File i of n: name (kind)`
pub fn progress_message(event: &ProgressEvent) -> String {
    format!("File {} of {}: {} ({})", event.index, event.total, event.file_name, event.kind)
}

/// Render rows (first row = headers) as a psql-style box
fn render_psql(grid: &[Vec<String>]) -> String {
    let columns = grid.iter().map(Vec::len).max().unwrap_or(0);
    let widths: Vec<usize> = (0..columns)
        .map(|c| {
            grid.iter()
                .filter_map(|row| row.get(c))
                .map(|cell| cell.chars().count())
                .max()
                .unwrap_or(0)
        })
        .collect();

    let rule = |left: char, mid: char, right: char| {
        let mut line = String::new();
        line.push(left);
        for (i, width) in widths.iter().enumerate() {
            if i > 0 {
                line.push(mid);
            }
            line.push_str(&"-".repeat(width + 2));
        }
        line.push(right);
        line.push('\n');
        line
    };
    let row_line = |row: &Vec<String>, header: bool| {
        let mut line = String::from("|");
        for (i, width) in widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            let numeric = !header && !cell.is_empty() && cell.chars().all(|c| c.is_ascii_digit());
            if numeric {
                line.push_str(&format!(" {:>width$} |", cell, width = width));
            } else {
                line.push_str(&format!(" {:<width$} |", cell, width = width));
            }
        }
        line.push('\n');
        line
    };

    let mut output = rule('+', '+', '+');
    if let Some((header, body)) = grid.split_first() {
        output.push_str(&row_line(header, true));
        output.push_str(&rule('|', '+', '|'));
        for row in body {
            output.push_str(&row_line(row, false));
        }
    }
    output.push_str(&rule('+', '+', '+'));
    output
}
