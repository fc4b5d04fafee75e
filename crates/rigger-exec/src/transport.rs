//! Transport strategy used by `CommandRunner`

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::result::ExecOutput;

/// Capabilities a runner needs from a target
///
/// `execute` reports a non-zero exit as a normal `ExecOutput`; it only fails
/// when the command could not be run. Transfers report a missing source as
/// `CommandError::Io`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a shell command line
    async fn execute(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput, CommandError>;

    /// Copy a local file to `dst` on the target
    async fn upload(&self, src: &Path, dst: &str, sudo: bool) -> Result<(), CommandError>;

    /// Copy `src` on the target to a local file
    async fn download(&self, src: &str, dst: &Path) -> Result<(), CommandError>;

    /// Whether `path` exists on the target
    async fn path_exists(&self, path: &str) -> Result<bool, CommandError>;

    /// Transport name for logs
    fn kind(&self) -> &'static str;
}
