//! Bounded execution of the external feature tools

use crate::core::errors::StegError;
use crate::Result;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout;
use tracing::{debug, error, warn};

const SANITIZED_ENV_VARS: [&str; 6] = [
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "PYTHONPATH",
    "PERL5LIB",
];
const SANITIZED_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Configuration for process isolation
#[derive(Debug, Clone)]
pub struct IsolationConfig {
    /// Maximum execution time for external processes
    pub timeout: Duration,
    /// Environment variables to set
    pub env_vars: HashMap<String, String>,
    /// Strip loader/interpreter search variables and pin PATH to the system directories
    pub sanitize_env: bool,
    /// Maximum output size in bytes
    pub max_output_size: usize,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            env_vars: HashMap::new(),
            sanitize_env: false,
            max_output_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// Result of isolated process execution
#[derive(Debug, Clone)]
pub struct IsolationResult {
    /// Exit code of the process
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub execution_time: Duration,
    /// Whether the process was killed because it exceeded the timeout
    pub timed_out: bool,
}

impl IsolationResult {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Convert timeouts and non-zero exits into errors, returning stdout bytes on success
    pub fn into_stdout(self, tool: &str, limit: Duration) -> Result<Vec<u8>> {
        if self.timed_out {
            return Err(StegError::TimeoutError {
                tool: tool.to_string(),
                timeout: limit,
            });
        }
        if self.exit_code != Some(0) {
            let stderr = self.stderr.trim();
            let detail = if stderr.is_empty() {
                String::new()
            } else {
                format!(": {}", stderr.lines().last().unwrap_or(stderr))
            };
            return Err(StegError::external_tool(
                tool,
                format!("exited with status {:?}{}", self.exit_code, detail),
            ));
        }
        Ok(self.stdout)
    }
}

/// Process isolation manager
pub struct ProcessIsolation {
    config: IsolationConfig,
}

impl ProcessIsolation {
    pub fn new() -> Self {
        Self {
            config: IsolationConfig::default(),
        }
    }

    pub fn with_config(config: IsolationConfig) -> Self {
        Self { config }
    }

    /// Execute a command and wait at most `config.timeout` for it
    pub async fn execute_isolated<I, S>(&self, program: &str, args: I) -> Result<IsolationResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let start_time = Instant::now();
        let args_vec: Vec<_> = args.into_iter().collect();
        debug!(
            "Executing isolated command: {} with args: {:?}",
            program,
            args_vec
                .iter()
                .map(|s| s.as_ref().to_string_lossy().to_string())
                .collect::<Vec<_>>()
        );

        self.validate_program_path(program)?;

        let mut cmd = TokioCommand::new(program);
        cmd.args(&args_vec);
        self.configure_process_isolation(&mut cmd);

        let child = cmd.spawn().map_err(|e| {
            error!("Failed to spawn {}: {}", program, e);
            StegError::external_tool(program, format!("failed to start: {}", e))
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let execution_result = timeout(self.config.timeout, child.wait_with_output()).await;
        let execution_time = start_time.elapsed();

        match execution_result {
            Ok(Ok(output)) => {
                let mut stdout = output.stdout;
                if stdout.len() > self.config.max_output_size {
                    warn!("Stdout of {} truncated due to size limit", program);
                    stdout.truncate(self.config.max_output_size);
                }
                let stderr_bytes = if output.stderr.len() > self.config.max_output_size {
                    warn!("Stderr of {} truncated due to size limit", program);
                    &output.stderr[..self.config.max_output_size]
                } else {
                    &output.stderr
                };

                Ok(IsolationResult {
                    exit_code: output.status.code(),
                    stdout,
                    stderr: String::from_utf8_lossy(stderr_bytes).to_string(),
                    execution_time,
                    timed_out: false,
                })
            }
            Ok(Err(e)) => {
                error!("Process execution failed: {}", e);
                Err(StegError::external_tool(program, format!("execution failed: {}", e)))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", program, self.config.timeout);
                Ok(IsolationResult {
                    exit_code: None,
                    stdout: Vec::new(),
                    stderr: "Process timed out".to_string(),
                    execution_time,
                    timed_out: true,
                })
            }
        }
    }

    fn configure_process_isolation(&self, cmd: &mut TokioCommand) {
        // Parent environment is inherited unless sanitize_env is set
        if self.config.sanitize_env {
            for var in SANITIZED_ENV_VARS {
                cmd.env_remove(var);
            }
            cmd.env("PATH", SANITIZED_PATH);
        }

        // Explicit variables win over the sanitized defaults.
        for (key, value) in &self.config.env_vars {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
    }

    /// Reject program names that look like shell fragments or path traversal
    fn validate_program_path(&self, program: &str) -> Result<()> {
        if program.trim().is_empty() {
            return Err(StegError::InvalidInput("Program name is empty".to_string()));
        }

        if program.contains(';') || program.contains('|') || program.contains('&') {
            return Err(StegError::InvalidInput(format!(
                "Program path contains dangerous characters: {}",
                program
            )));
        }

        if program.contains("..") || program.contains("./") || program.contains(".\\") {
            return Err(StegError::InvalidInput(format!(
                "Program path contains path traversal sequences: {}",
                program
            )));
        }

        if program.contains(' ') && !(program.starts_with('"') && program.ends_with('"')) {
            return Err(StegError::InvalidInput(format!(
                "Program path with spaces must be quoted: {}",
                program
            )));
        }

        Ok(())
    }
}

impl Default for ProcessIsolation {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating process isolation configurations
pub struct IsolationConfigBuilder {
    config: IsolationConfig,
}

impl IsolationConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IsolationConfig::default(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn env_var<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.config.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn sanitize_env(mut self, sanitize: bool) -> Self {
        self.config.sanitize_env = sanitize;
        self
    }

    pub fn max_output_size(mut self, max_size: usize) -> Self {
        self.config.max_output_size = max_size;
        self
    }

    pub fn build(self) -> IsolationConfig {
        self.config
    }
}

impl Default for IsolationConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = IsolationConfigBuilder::new()
            .timeout(Duration::from_secs(10))
            .env_var("WINEDEBUG", "-all")
            .max_output_size(1024)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.max_output_size, 1024);
        assert_eq!(config.env_vars.get("WINEDEBUG"), Some(&"-all".to_string()));
    }

    #[test]
    fn test_validate_program_path() {
        let isolation = ProcessIsolation::new();

        assert!(isolation.validate_program_path("wine").is_ok());
        assert!(isolation.validate_program_path("/usr/bin/python2.7").is_ok());
        assert!(isolation.validate_program_path("\"program with spaces\"").is_ok());

        assert!(isolation.validate_program_path("").is_err());
        assert!(isolation.validate_program_path("file; rm -rf /").is_err());
        assert!(isolation.validate_program_path("wine | cat").is_err());
        assert!(isolation.validate_program_path("../../../bin/ls").is_err());
        assert!(isolation.validate_program_path("program with spaces").is_err());
    }

    #[test]
    fn test_into_stdout_maps_failures() {
        let timed_out = IsolationResult {
            exit_code: None,
            stdout: Vec::new(),
            stderr: String::new(),
            execution_time: Duration::from_secs(1),
            timed_out: true,
        };
        assert!(matches!(
            timed_out.into_stdout("wine", Duration::from_secs(1)),
            Err(StegError::TimeoutError { .. })
        ));

        let failed = IsolationResult {
            exit_code: Some(2),
            stdout: b"partial".to_vec(),
            stderr: "Traceback\nIOError: cannot open".to_string(),
            execution_time: Duration::from_millis(5),
            timed_out: false,
        };
        match failed.into_stdout("python2.7", Duration::from_secs(1)) {
            Err(StegError::ExternalToolError { message, .. }) => {
                assert!(message.contains("IOError: cannot open"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_simple_command_execution() {
        let isolation = ProcessIsolation::new();
        let result = isolation.execute_isolated("echo", ["hello"]).await.unwrap();

        assert!(result.succeeded());
        assert_eq!(result.stdout_text().trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_handling() {
        let config = IsolationConfigBuilder::new()
            .timeout(Duration::from_millis(100))
            .build();
        let isolation = ProcessIsolation::with_config(config);

        let result = isolation.execute_isolated("sleep", ["5"]).await.unwrap();
        assert!(result.timed_out);
        assert!(!result.succeeded());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_inherits_search_variables() {
        let parent_path = std::env::var("PATH").unwrap_or_default();
        let config = IsolationConfigBuilder::new()
            .env_var("PYTHONPATH", "/opt/pysteg")
            .build();
        let isolation = ProcessIsolation::with_config(config);

        let result = isolation
            .execute_isolated("sh", ["-c", "echo \"$PATH|$PYTHONPATH\""])
            .await
            .unwrap();
        assert_eq!(result.stdout_text().trim(), format!("{}|/opt/pysteg", parent_path));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_sanitized_env_pins_path() {
        let config = IsolationConfigBuilder::new().sanitize_env(true).build();
        let isolation = ProcessIsolation::with_config(config);

        let result = isolation
            .execute_isolated("/bin/sh", ["-c", "echo \"$PATH|${PYTHONPATH:-unset}\""])
            .await
            .unwrap();
        assert_eq!(result.stdout_text().trim(), format!("{}|unset", SANITIZED_PATH));
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_error() {
        let isolation = ProcessIsolation::new();
        let result = isolation.execute_isolated("definitely-not-a-real-tool-xyz", ["x"]).await;
        assert!(matches!(result, Err(StegError::ExternalToolError { .. })));
    }
}
