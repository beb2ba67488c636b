use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::context::ContextError;
use crate::timing::fmt_duration;
use crate::tools::FailureClass;

/// A deadline that ran out, with enough context to act on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutError {
    pub operation: String,
    pub context: String,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub config_var: String,
    pub suggested_timeout: Duration,
}

impl TimeoutError {
    pub fn new(operation: &str, context: &str, timeout: Duration, elapsed: Duration, config_var: &str) -> Self {
        let mut suggested_timeout = timeout * 3 / 2;
        if elapsed * 2 > suggested_timeout {
            suggested_timeout = elapsed * 2;
        }
        Self {
            operation: operation.to_string(),
            context: context.to_string(),
            timeout,
            elapsed,
            config_var: config_var.to_string(),
            suggested_timeout,
        }
    }

    pub fn tool_install(tool: &str, timeout: Duration, elapsed: Duration) -> Self {
        Self::new(
            "Tool installation",
            tool,
            timeout,
            elapsed,
            "COMMITGATE_TOOL_INSTALL_TIMEOUT",
        )
    }

    pub fn check(check: &str, timeout: Duration, elapsed: Duration, config_var: &str) -> Self {
        Self::new("Check execution", check, timeout, elapsed, config_var)
    }

    pub fn suggestion(&self) -> String {
        format!(
            "Increase {} to at least {}",
            self.config_var,
            fmt_duration(self.suggested_timeout)
        )
    }
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.context.is_empty() {
            write!(f, "{} timed out after {}", self.operation, fmt_duration(self.timeout))?;
        } else {
            write!(
                f,
                "{} ({}) timed out after {}",
                self.operation,
                self.context,
                fmt_duration(self.timeout)
            )?;
        }
        if !self.config_var.is_empty() {
            write!(
                f,
                ". Consider increasing {} (suggested: {})",
                self.config_var,
                fmt_duration(self.suggested_timeout)
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for TimeoutError {}

/// Conditions that stop a run before any check executes.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no checks to run: every check is disabled, skipped, filtered out, or matches no files")]
    NoChecksToRun,
    #[error("run canceled before any check started: {0}")]
    Canceled(ContextError),
    #[error("invalid run options: {0}")]
    InvalidOptions(String),
}

/// Failures while guaranteeing a tool binary is present.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Timeout(TimeoutError),
    #[error("{}", install_failed_message(.tool, .attempts, .class, .message, .output))]
    InstallFailed {
        tool: String,
        attempts: usize,
        class: FailureClass,
        message: String,
        output: String,
    },
    #[error(
        "tool installation failed for {tool} on both methods: {primary}; fallback: {fallback}\nScript output: {primary_output}\nFallback output: {fallback_output}"
    )]
    FallbackFailed {
        tool: String,
        primary: String,
        primary_output: String,
        fallback: String,
        fallback_output: String,
    },
    #[error("tool installed but not found in PATH: {0}")]
    NotInPath(String),
    #[error("installation of {tool} canceled: {reason}")]
    Canceled { tool: String, reason: ContextError },
    #[error("tool installation failed:\n{}", install_all_message(.0))]
    InstallAll(Vec<(String, ToolError)>),
}

impl ToolError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout(_))
    }

    /// Names of tools whose installation failed, for aggregate errors.
    pub fn failed_tools(&self) -> Vec<&str> {
        match self {
            ToolError::InstallAll(failures) => failures.iter().map(|(name, _)| name.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

fn install_failed_message(tool: &str, attempts: &usize, class: &FailureClass, message: &str, output: &str) -> String {
    let mut text = match class {
        FailureClass::NetworkTransient => format!(
            "tool installation failed for {tool} after {attempts} attempt(s) (network error): {message}"
        ),
        _ => format!("tool installation failed for {tool}: {message}"),
    };
    if !output.trim().is_empty() {
        text.push_str("\nOutput: ");
        text.push_str(output.trim_end());
    }
    text
}

fn install_all_message(failures: &[(String, ToolError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("{name}: {err}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Outcome of a single check that did not pass.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{tool} not found")]
    ToolNotFound { tool: String, suggestion: String },
    #[error("command '{command}' failed")]
    ToolExecution {
        command: String,
        output: String,
        suggestion: String,
    },
    #[error("{summary}")]
    IssuesFound { summary: String, files: Vec<String> },
    #[error("tool provisioning failed: {0}")]
    Provisioning(#[source] ToolError),
    #[error(transparent)]
    Timeout(TimeoutError),
    #[error("check canceled: {0}")]
    Canceled(ContextError),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl CheckError {
    /// Whether graceful degradation may turn this failure into a warning.
    pub fn can_skip(&self) -> bool {
        matches!(self, CheckError::ToolNotFound { .. })
    }

    pub fn suggestion(&self) -> Option<String> {
        match self {
            CheckError::ToolNotFound { suggestion, .. } | CheckError::ToolExecution { suggestion, .. } => {
                Some(suggestion.clone()).filter(|s| !s.is_empty())
            }
            CheckError::IssuesFound { files, .. } if !files.is_empty() => {
                Some(format!("Review and stage: {}", files.join(", ")))
            }
            CheckError::Timeout(err) | CheckError::Provisioning(ToolError::Timeout(err)) => Some(err.suggestion()),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            CheckError::ToolExecution { output, .. } => Some(output.as_str()).filter(|o| !o.is_empty()),
            _ => None,
        }
    }

    pub fn command(&self) -> Option<&str> {
        match self {
            CheckError::ToolExecution { command, .. } => Some(command.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to find {}", .0.display())]
    EnvFileNotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("configuration validation failed:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read plugin manifest {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid plugin manifest {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("plugin name is required")]
    NameEmpty,
    #[error("plugin executable is required")]
    ExecutableEmpty,
    #[error("invalid timeout format: {0}")]
    InvalidTimeout(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_suggests_one_and_a_half_times_the_limit() {
        let err = TimeoutError::tool_install("gofumpt", Duration::from_secs(60), Duration::from_secs(10));
        assert_eq!(err.suggested_timeout, Duration::from_secs(90));
        let text = err.to_string();
        assert!(text.contains("Tool installation (gofumpt) timed out after 60s"));
        assert!(text.contains("COMMITGATE_TOOL_INSTALL_TIMEOUT"));
        assert!(text.contains("suggested: 90s"));
    }

    #[test]
    fn timeout_suggests_double_the_elapsed_when_larger() {
        let err = TimeoutError::check("lint", Duration::from_secs(10), Duration::from_secs(12), "COMMITGATE_LINT_TIMEOUT");
        assert_eq!(err.suggested_timeout, Duration::from_secs(24));
    }

    #[test]
    fn network_install_failure_names_attempts_and_output() {
        let err = ToolError::InstallFailed {
            tool: "gofumpt".to_string(),
            attempts: 3,
            class: FailureClass::NetworkTransient,
            message: "exit status 1".to_string(),
            output: "dial tcp: connection refused\n".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("after 3 attempt(s) (network error)"));
        assert!(text.contains("Output: dial tcp: connection refused"));
    }

    #[test]
    fn aggregate_install_error_names_every_tool() {
        let err = ToolError::InstallAll(vec![
            ("gofumpt".to_string(), ToolError::NotInPath("gofumpt".to_string())),
            ("gitleaks".to_string(), ToolError::UnknownTool("gitleaks".to_string())),
        ]);
        let text = err.to_string();
        assert!(text.contains("gofumpt: tool installed but not found in PATH"));
        assert!(text.contains("gitleaks: unknown tool"));
        assert_eq!(err.failed_tools(), vec!["gofumpt", "gitleaks"]);
    }

    #[test]
    fn only_missing_tools_can_be_skipped() {
        let missing = CheckError::ToolNotFound {
            tool: "gitleaks".to_string(),
            suggestion: "install it".to_string(),
        };
        let failed = CheckError::IssuesFound {
            summary: "whitespace issues found".to_string(),
            files: vec![],
        };
        assert!(missing.can_skip());
        assert!(!failed.can_skip());
        assert_eq!(missing.suggestion().as_deref(), Some("install it"));
    }
}
