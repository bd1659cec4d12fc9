//! Phase tracking and detailed logging for pipeline runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepLoggerConfig {
    pub show_timing: bool,
    pub show_diagnostics: bool,
    /// Log step boundaries at info level instead of debug
    pub narrate_steps: bool,
}

impl Default for StepLoggerConfig {
    fn default() -> Self {
        Self {
            show_timing: true,
            show_diagnostics: true,
            narrate_steps: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub name: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub status: StepStatus,
    pub diagnostics: BTreeMap<String, String>,
    pub depth: usize,
}

/// Records the phases of a run (sniffing, extraction, training, ...)
pub struct StepLogger {
    config: StepLoggerConfig,
    steps: Vec<ProcessingStep>,
    stack: Vec<usize>,
}

impl StepLogger {
    pub fn new(config: StepLoggerConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            stack: Vec::new(),
        }
    }

    pub fn start_step(&mut self, name: impl Into<String>, description: impl Into<String>) -> usize {
        let step = ProcessingStep {
            name: name.into(),
            description: description.into(),
            started_at: Utc::now(),
            duration: None,
            status: StepStatus::InProgress,
            diagnostics: BTreeMap::new(),
            depth: self.stack.len(),
        };

        let indent = "  ".repeat(step.depth);
        if self.config.narrate_steps {
            info!("{}Starting: {}", indent, step.description);
        } else {
            debug!("{}Starting: {}", indent, step.description);
        }

        self.steps.push(step);
        let index = self.steps.len() - 1;
        self.stack.push(index);
        index
    }

    pub fn complete_step(&mut self, success: bool, message: Option<String>) {
        let status = if success {
            StepStatus::Completed
        } else {
            StepStatus::Failed(message.unwrap_or_else(|| "Unknown error".to_string()))
        };
        self.finish(status);
    }

    pub fn skip_step(&mut self, reason: impl Into<String>) {
        self.finish(StepStatus::Skipped(reason.into()));
    }

    pub fn add_diagnostic(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let Some(&index) = self.stack.last() else {
            return;
        };
        let key = key.into();
        let value = value.into();
        if self.config.show_diagnostics {
            debug!("{}{}: {}", "  ".repeat(self.stack.len()), key, value);
        }
        self.steps[index].diagnostics.insert(key, value);
    }

    fn finish(&mut self, status: StepStatus) {
        let Some(index) = self.stack.pop() else {
            return;
        };
        let show_timing = self.config.show_timing;
        let narrate = self.config.narrate_steps;
        let step = &mut self.steps[index];
        let elapsed = Utc::now()
            .signed_duration_since(step.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        step.duration = Some(elapsed);
        step.status = status;

        let indent = "  ".repeat(step.depth);
        let timing = if show_timing {
            format!(" ({}ms)", elapsed.as_millis())
        } else {
            String::new()
        };

        match &step.status {
            StepStatus::Completed if narrate => info!("{}Completed: {}{}", indent, step.description, timing),
            StepStatus::Completed => debug!("{}Completed: {}{}", indent, step.description, timing),
            StepStatus::Failed(err) => warn!("{}Failed: {} - {}{}", indent, step.description, err, timing),
            StepStatus::Skipped(reason) => info!("{}Skipped: {} - {}", indent, step.description, reason),
            StepStatus::InProgress => {}
        }
    }

    pub fn steps(&self) -> &[ProcessingStep] {
        &self.steps
    }

    pub fn summary(&self) -> ProcessingSummary {
        let count = |pred: fn(&StepStatus) -> bool| self.steps.iter().filter(|s| pred(&s.status)).count();
        ProcessingSummary {
            total_steps: self.steps.len(),
            completed_steps: count(|s| matches!(s, StepStatus::Completed)),
            failed_steps: count(|s| matches!(s, StepStatus::Failed(_))),
            skipped_steps: count(|s| matches!(s, StepStatus::Skipped(_))),
            total_duration: self
                .steps
                .iter()
                .filter(|s| s.depth == 0)
                .filter_map(|s| s.duration)
                .sum(),
        }
    }

    pub fn format_summary(&self) -> String {
        let summary = self.summary();
        let mut output = String::new();

        output.push_str("Processing Summary\n");
        output.push_str("==================\n");
        output.push_str(&format!("Total Steps: {}\n", summary.total_steps));
        output.push_str(&format!("Completed: {}\n", summary.completed_steps));
        output.push_str(&format!("Failed: {}\n", summary.failed_steps));
        output.push_str(&format!("Skipped: {}\n", summary.skipped_steps));
        if self.config.show_timing {
            output.push_str(&format!("Total Duration: {}ms\n", summary.total_duration.as_millis()));
        }
        output.push('\n');

        for step in &self.steps {
            let indent = "  ".repeat(step.depth);
            let marker = match &step.status {
                StepStatus::Completed => "[ok]",
                StepStatus::Failed(_) => "[failed]",
                StepStatus::Skipped(_) => "[skipped]",
                StepStatus::InProgress => "[running]",
            };
            let timing = match (self.config.show_timing, step.duration) {
                (true, Some(d)) => format!(" ({}ms)", d.as_millis()),
                _ => String::new(),
            };
            output.push_str(&format!("{}{} {}{}\n", indent, marker, step.description, timing));

            match &step.status {
                StepStatus::Failed(reason) => output.push_str(&format!("{}   Error: {}\n", indent, reason)),
                StepStatus::Skipped(reason) => output.push_str(&format!("{}   Reason: {}\n", indent, reason)),
                _ => {}
            }

            if self.config.show_diagnostics {
                for (key, value) in &step.diagnostics {
                    output.push_str(&format!("{}   {}: {}\n", indent, key, value));
                }
            }
        }

        output
    }
}

impl Default for StepLogger {
    fn default() -> Self {
        Self::new(StepLoggerConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingSummary {
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub total_duration: Duration,
}
