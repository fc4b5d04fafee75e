//! Local command execution using `tokio::process`

use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, instrument};

use crate::error::CommandError;
use crate::result::ExecOutput;
use crate::shell::quote;
use crate::transport::Transport;

/// Local transport
///
/// Runs commands through `sh -c` and transfers files with plain copies.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

impl LocalTransport {
    /// Create a new local transport
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn spawn(&self, cmd: &str) -> Result<ExecOutput, CommandError> {
        let start = Instant::now();

        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| CommandError::transport(cmd, e))?;

        let duration = start.elapsed();
        let status = output.status.code().unwrap_or(-1);

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "local command completed"
        );

        Ok(ExecOutput {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration,
        })
    }
}

async fn ensure_source(path: &Path) -> Result<(), CommandError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(CommandError::Io {
            path: path.display().to_string(),
            kind: io::ErrorKind::InvalidInput,
            message: "not a regular file".to_string(),
        }),
        Err(e) => Err(CommandError::io(path.display().to_string(), &e)),
    }
}

#[async_trait]
impl Transport for LocalTransport {
    #[instrument(skip(self), level = "debug")]
    async fn execute(
        &self,
        cmd: &str,
        timeout_duration: Option<Duration>,
    ) -> Result<ExecOutput, CommandError> {
        debug!(command = %cmd, "executing local command");

        let Some(limit) = timeout_duration else {
            return self.spawn(cmd).await;
        };

        match timeout(limit, self.spawn(cmd)).await {
            Ok(result) => result,
            Err(_) => {
                error!(command = %cmd, timeout = ?limit, "command timed out");
                Err(CommandError::transport(
                    cmd,
                    format!("timed out after {limit:?}"),
                ))
            }
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn upload(&self, src: &Path, dst: &str, sudo: bool) -> Result<(), CommandError> {
        ensure_source(src).await?;
        let src_display = src.display().to_string();

        if sudo {
            let cmd = format!("sudo cp {} {}", quote(&src_display), quote(dst));
            let output = self.spawn(&cmd).await?;
            if !output.success() {
                return Err(CommandError::transfer(
                    "put",
                    &src_display,
                    dst,
                    output.combined_output().trim_end(),
                ));
            }
            return Ok(());
        }

        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| CommandError::transfer("put", &src_display, dst, e))?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn download(&self, src: &str, dst: &Path) -> Result<(), CommandError> {
        ensure_source(Path::new(src)).await?;

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CommandError::io(parent.display().to_string(), &e))?;
        }

        tokio::fs::copy(src, dst)
            .await
            .map_err(|e| CommandError::transfer("get", src, &dst.display().to_string(), e))?;
        Ok(())
    }

    async fn path_exists(&self, path: &str) -> Result<bool, CommandError> {
        // permission errors count as "not visible", like `test -e`
        match tokio::fs::try_exists(path).await {
            Ok(exists) => Ok(exists),
            Err(e) => {
                debug!(path, error = %e, "cannot check path, treating as missing");
                Ok(false)
            }
        }
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_success() {
        let transport = LocalTransport::new();
        let result = transport.execute("echo hello", None).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_failure() {
        let transport = LocalTransport::new();
        let result = transport.execute("exit 42", None).await.unwrap();

        assert!(!result.success());
        assert_eq!(result.status, 42);
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let transport = LocalTransport::new();
        let result = transport
            .execute("sleep 5", Some(Duration::from_millis(100)))
            .await;

        assert!(matches!(result, Err(CommandError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_run_with_stderr() {
        let transport = LocalTransport::new();
        let result = transport.execute("echo error >&2", None).await.unwrap();

        assert!(result.success());
        assert_eq!(result.stderr.trim(), "error");
    }

    #[tokio::test]
    async fn test_upload_missing_source() {
        let transport = LocalTransport::new();
        let result = transport
            .upload(Path::new("/nonexistent/rigger-src"), "/tmp/unused", false)
            .await;

        assert!(matches!(result, Err(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_path_exists() {
        let transport = LocalTransport::new();
        let tmp = std::env::temp_dir();

        assert!(transport.path_exists(&tmp.display().to_string()).await.unwrap());
        assert!(!transport.path_exists("/nonexistent/rigger").await.unwrap());
    }

    #[tokio::test]
    async fn test_path_under_file_is_missing() {
        let transport = LocalTransport::new();
        let file = tempfile::NamedTempFile::new().unwrap();
        let child = file.path().join("child").display().to_string();

        assert!(!transport.path_exists(&child).await.unwrap());
    }
}
