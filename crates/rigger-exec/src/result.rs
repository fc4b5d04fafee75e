//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Raw output of a command as reported by a transport
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl ExecOutput {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout.trim_end_matches('\n'), self.stderr)
        }
    }
}

/// Result of a successful command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Command line as submitted by the caller
    pub command: String,
    /// Combined stdout/stderr with trailing whitespace trimmed, `None` if empty
    pub output: Option<String>,
    /// Exit code
    pub exit_code: i32,
}

impl CommandResult {
    pub(crate) fn from_exec(command: &str, exec: &ExecOutput) -> Self {
        let combined = exec.combined_output();
        let trimmed = combined.trim_end();
        Self {
            command: command.to_string(),
            output: (!trimmed.is_empty()).then(|| trimmed.to_string()),
            exit_code: exec.status,
        }
    }

    /// Output text, empty if the command printed nothing
    #[must_use]
    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }
}

/// Operating system distribution of a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    /// Distribution name (`NAME` in os-release)
    pub name: String,
    /// Version (`VERSION_ID`)
    pub version: String,
    /// Release codename (`VERSION_CODENAME`)
    pub id: String,
}
