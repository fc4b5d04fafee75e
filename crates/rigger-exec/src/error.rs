//! Error types for rigger-exec

use std::io;

use thiserror::Error;

/// Errors raised by a `CommandRunner` and its transports
///
/// Callers match on the variant: a command that ran and failed
/// (`Execution`) is a different failure class from one that never ran
/// (`Transport`).
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// Invalid runner parameters or missing target capabilities
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The command ran and exited with a non-zero status
    #[error("command `{command}` failed with exit code {code}: {error}")]
    Execution {
        /// Command line (or transfer operation) that failed
        command: String,
        /// Captured output, used as the error text
        error: String,
        /// Exit code (-1 for transfers)
        code: i32,
    },

    /// The command could not be run at all
    #[error("failed to execute `{command}`: {cause}")]
    Transport {
        /// Command line that was attempted
        command: String,
        /// Underlying connection, authentication or protocol failure
        cause: String,
    },

    /// A file could not be read or written
    #[error("I/O error on {path}: {message}")]
    Io {
        /// Offending path
        path: String,
        /// Kind of the underlying I/O error
        kind: io::ErrorKind,
        /// Underlying error message
        message: String,
    },

    /// Introspection markers were not found in the command output
    #[error("no delimited result in output of `{command}`: {output}")]
    MalformedOutput {
        /// Command line that produced the output
        command: String,
        /// Raw output
        output: String,
    },
}

impl CommandError {
    /// Build an `Io` error from a `std::io::Error`
    pub fn io(path: impl Into<String>, err: &io::Error) -> Self {
        CommandError::Io {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Build a `Transport` error
    pub fn transport(command: impl Into<String>, cause: impl ToString) -> Self {
        CommandError::Transport {
            command: command.into(),
            cause: cause.to_string(),
        }
    }

    /// Build the execution-style failure reported for a file transfer
    ///
    /// `op` is `put` or `get`; the message names both endpoints.
    pub fn transfer(op: &str, src: &str, dst: &str, cause: impl std::fmt::Display) -> Self {
        let verb = if op == "put" { "uploading" } else { "downloading" };
        CommandError::Execution {
            command: op.to_string(),
            error: format!("Failed {verb} {src} to {dst}: {cause}"),
            code: -1,
        }
    }

    /// Check if error is retryable
    ///
    /// Only transport failures are; an execution failure will fail the same
    /// way again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommandError::Transport { .. })
    }

    /// Exit code of a failed execution
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Execution { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether this is a missing-file failure
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CommandError::Io {
                kind: io::ErrorKind::NotFound,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(CommandError::transport("echo", "connection reset").is_retryable());
        assert!(
            !CommandError::Execution {
                command: "false".to_string(),
                error: String::new(),
                code: 1,
            }
            .is_retryable()
        );
        assert!(!CommandError::Configuration("Missing host".to_string()).is_retryable());
    }

    #[test]
    fn test_execution_message_carries_output() {
        let err = CommandError::Execution {
            command: "make install".to_string(),
            error: "No rule to make target".to_string(),
            code: 2,
        };

        let msg = err.to_string();
        assert!(msg.contains("make install"));
        assert!(msg.contains("No rule to make target"));
        assert_eq!(err.exit_code(), Some(2));
    }

    #[test]
    fn test_io_not_found() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err = CommandError::io("/tmp/missing", &io_err);

        assert!(err.is_not_found());
        assert!(err.to_string().contains("/tmp/missing"));
    }
}
