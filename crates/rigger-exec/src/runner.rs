//! `CommandRunner`: one interface for local and remote targets

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use crate::config::{ConnectionConfig, RunOptions, Target};
use crate::error::CommandError;
use crate::local::LocalTransport;
use crate::registry;
use crate::result::{CommandResult, Distribution};
use crate::sentinel::{CLOSE_MARKER, OPEN_MARKER, extract_delimited, python_program};
use crate::shell::{self, quote};
use crate::ssh::SshTransport;
use crate::transport::Transport;

/// Reads `/etc/os-release` into `dist` on the target
const DISTRIBUTION_SETUP: &str = "\
import json
dist = {}
try:
    with open('/etc/os-release') as f:
        for line in f:
            if '=' in line:
                k, v = line.rstrip('\\n').split('=', 1)
                dist[k] = v.strip('\"').strip(\"'\")
except OSError:
    pass";

const DISTRIBUTION_EXPR: &str = "json.dumps({'name': dist.get('NAME', ''), \
'version': dist.get('VERSION_ID', ''), 'id': dist.get('VERSION_CODENAME', '')})";

/// Download tools, in order of preference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadTool {
    Wget,
    Curl,
}

impl DownloadTool {
    /// Tools tried by `CommandRunner::download`, first match wins
    pub const PREFERENCE: [DownloadTool; 2] = [DownloadTool::Wget, DownloadTool::Curl];

    /// Executable name
    #[must_use]
    pub fn binary(self) -> &'static str {
        match self {
            DownloadTool::Wget => "wget",
            DownloadTool::Curl => "curl",
        }
    }

    /// Command line downloading `url` to `output_path`
    #[must_use]
    pub fn command(self, url: &str, output_path: &str) -> String {
        match self {
            DownloadTool::Wget => format!("wget -T 30 {} -O {}", quote(url), quote(output_path)),
            DownloadTool::Curl => format!(
                "curl -fsSL --connect-timeout 30 {} -o {}",
                quote(url),
                quote(output_path)
            ),
        }
    }
}

/// Runs commands and transfers files against a single target
///
/// The runner holds a transport chosen at construction (local or SSH); every
/// operation has the same inputs, outputs and error kinds in both modes.
/// Operations on one runner complete one at a time. Cloning is cheap and
/// shares the transport.
#[derive(Clone)]
pub struct CommandRunner {
    target: Target,
    transport: Arc<dyn Transport>,
    options: RunOptions,
}

impl fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRunner")
            .field("target", &self.target)
            .field("transport", &self.transport.kind())
            .field("options", &self.options)
            .finish()
    }
}

impl CommandRunner {
    /// Validate `config` and build a runner without contacting the target
    ///
    /// # Errors
    /// Returns `CommandError::Configuration` if the configuration is invalid
    /// or the private key cannot be resolved.
    pub fn new(config: &ConnectionConfig) -> Result<Self, CommandError> {
        let target = config.validate()?;
        let transport: Arc<dyn Transport> = match &target {
            Target::Local => Arc::new(LocalTransport::new()),
            Target::Remote(remote) => Arc::new(SshTransport::new(remote.clone())?),
        };

        Ok(Self {
            target,
            transport,
            options: config.options.clone(),
        })
    }

    /// Build a runner and, if `validate_connection` is set, probe the target
    ///
    /// # Errors
    /// Returns `CommandError::Configuration` for an invalid configuration and
    /// the probe's error if the target is unreachable.
    pub async fn connect(
        config: &ConnectionConfig,
        validate_connection: bool,
    ) -> Result<Self, CommandError> {
        let runner = Self::new(config)?;
        if validate_connection {
            debug!(target_host = %runner.target.label(), "validating connection");
            runner.ping().await?;
            debug!(target_host = %runner.target.label(), "connected successfully");
        }
        Ok(runner)
    }

    /// Build a runner over an arbitrary transport
    pub fn with_transport(target: Target, transport: Arc<dyn Transport>, options: RunOptions) -> Self {
        Self {
            target,
            transport,
            options,
        }
    }

    /// The validated target
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Effective default options
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runner view with `overrides` merged over this runner's options
    #[must_use]
    pub fn with(&self, overrides: &RunOptions) -> Self {
        Self {
            target: self.target.clone(),
            transport: Arc::clone(&self.transport),
            options: self.options.merged(overrides),
        }
    }

    /// Execute a command
    ///
    /// # Errors
    /// `Execution` with the combined output if the command exits non-zero,
    /// `Transport` if it could not be run, `Configuration` if an environment
    /// variable name is not a shell identifier.
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn run(&self, command: &str) -> Result<CommandResult, CommandError> {
        let rendered = shell::render(
            command,
            &self.options.env,
            self.options.working_dir.as_deref(),
        )?;

        let exec = self
            .transport
            .execute(&rendered, self.options.timeout_duration())
            .await
            .map_err(|e| match e {
                CommandError::Transport { cause, .. } => CommandError::transport(command, cause),
                other => other,
            })?;

        let result = CommandResult::from_exec(command, &exec);

        if !exec.success() {
            error!(
                command = %command,
                status = exec.status,
                output = %result.output(),
                "command failed"
            );
            return Err(CommandError::Execution {
                command: command.to_string(),
                error: result.output.unwrap_or_default(),
                code: exec.status,
            });
        }

        if self.options.is_quiet() {
            debug!(command = %command, output = %result.output(), "command succeeded");
        } else {
            info!(command = %command, output = %result.output(), "command succeeded");
        }

        Ok(result)
    }

    /// Execute a command with extra environment variables
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`].
    pub async fn run_with_env(
        &self,
        command: &str,
        env: &BTreeMap<String, String>,
    ) -> Result<CommandResult, CommandError> {
        self.with(&RunOptions::new().envs(env.clone()))
            .run(command)
            .await
    }

    /// Execute a command under sudo
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`].
    pub async fn sudo(&self, command: &str) -> Result<CommandResult, CommandError> {
        self.run(&format!("sudo {command}")).await
    }

    /// Upload a local script, make it executable and run it
    ///
    /// `args` are appended as-is, separated by spaces.
    ///
    /// # Errors
    /// The upload's error if the transfer fails, otherwise as [`CommandRunner::run`].
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn run_script(&self, script: &Path, args: &[&str]) -> Result<CommandResult, CommandError> {
        let remote_path = self.put_file(script, None, false).await?;
        self.run(&format!("chmod +x {}", quote(&remote_path))).await?;

        let mut command = quote(&remote_path);
        if !args.is_empty() {
            command.push(' ');
            command.push_str(&args.join(" "));
        }
        self.run(&command).await
    }

    /// Whether `path` exists on the target
    ///
    /// # Errors
    /// Only if the check itself could not be run.
    pub async fn exists(&self, path: &str) -> Result<bool, CommandError> {
        self.transport.path_exists(path).await
    }

    /// Copy a local file to the target
    ///
    /// Without `dst` the file lands in a fresh temp directory on the target
    /// under its original name. Returns the destination path.
    ///
    /// # Errors
    /// `Io` if `src` is missing, `Execution` naming both paths if the
    /// transfer fails.
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn put_file(&self, src: &Path, dst: Option<&str>, sudo: bool) -> Result<String, CommandError> {
        let dst = match dst {
            Some(dst) => dst.to_string(),
            None => {
                let basename = basename(&src.display().to_string())?;
                let tempdir = self.mkdtemp().await?;
                format!("{}/{basename}", tempdir.trim_end_matches('/'))
            }
        };

        self.transport.upload(src, &dst, sudo).await?;
        debug!(src = %src.display(), dst = %dst, "put file");
        Ok(dst)
    }

    /// Copy a file from the target to the local machine
    ///
    /// Without `dst` the file lands in a fresh local temp directory under its
    /// original name. Returns the destination path.
    ///
    /// # Errors
    /// `Io` if `src` does not exist on the target, `Execution` naming both
    /// paths if the transfer fails.
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn get_file(&self, src: &str, dst: Option<&Path>) -> Result<PathBuf, CommandError> {
        let dst = match dst {
            Some(dst) => dst.to_path_buf(),
            None => {
                let basename = basename(src)?;
                let tempdir = tempfile::Builder::new()
                    .prefix("rigger-get-")
                    .tempdir()
                    .map_err(|e| CommandError::io(std::env::temp_dir().display().to_string(), &e))?
                    .keep();
                tempdir.join(basename)
            }
        };

        self.transport.download(src, &dst).await?;
        debug!(src = %src, dst = %dst.display(), "got file");
        Ok(dst)
    }

    /// Extract a gzipped tarball into `destination`, creating it if needed
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`].
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn extract(
        &self,
        archive: &str,
        destination: &str,
        strip: u32,
    ) -> Result<CommandResult, CommandError> {
        if !self.exists(destination).await? {
            self.run(&format!("mkdir -p {}", quote(destination))).await?;
        }
        self.run(&format!(
            "tar xzvf {} --strip-components={strip} -C {}",
            quote(archive),
            quote(destination)
        ))
        .await
    }

    /// Check that commands can be run on the target
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`].
    pub async fn ping(&self) -> Result<CommandResult, CommandError> {
        self.run("echo").await
    }

    /// Create a temporary path on the target
    ///
    /// With `create` false only a name is reserved (`mktemp -u`).
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`]; `MalformedOutput` if `mktemp` printed
    /// nothing.
    pub async fn mktemp(&self, create: bool, directory: bool) -> Result<String, CommandError> {
        let mut command = String::from("mktemp");
        if !create {
            command.push_str(" -u");
        }
        if directory {
            command.push_str(" -d");
        }

        let result = self.run(&command).await?;
        match result.output {
            Some(path) => Ok(path.trim().to_string()),
            None => Err(CommandError::MalformedOutput {
                command,
                output: String::new(),
            }),
        }
    }

    /// Create a temporary directory on the target
    ///
    /// # Errors
    /// Same as [`CommandRunner::mktemp`].
    pub async fn mkdtemp(&self) -> Result<String, CommandError> {
        self.mktemp(true, true).await
    }

    /// Download `url` on the target
    ///
    /// Uses the first available tool of [`DownloadTool::PREFERENCE`].
    /// Without `output_path` a fresh temp file is used. Returns the output path.
    ///
    /// # Errors
    /// `Configuration` if no download tool is installed, otherwise as
    /// [`CommandRunner::run`].
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn download(&self, url: &str, output_path: Option<&str>) -> Result<String, CommandError> {
        let output_path = match output_path {
            Some(path) => path.to_string(),
            None => self.mktemp(true, false).await?,
        };

        let tool = self.locate_download_tool().await?.ok_or_else(|| {
            CommandError::Configuration(format!(
                "Cannot find neither wget nor curl to download {url}"
            ))
        })?;

        info!(url = %url, output = %output_path, tool = tool.binary(), "downloading");
        self.run(&tool.command(url, &output_path)).await?;
        Ok(output_path)
    }

    /// First download tool present on the target
    async fn locate_download_tool(&self) -> Result<Option<DownloadTool>, CommandError> {
        for tool in DownloadTool::PREFERENCE {
            info!(tool = tool.binary(), "locating download tool on the target");
            match self.run(&format!("command -v {}", tool.binary())).await {
                Ok(_) => return Ok(Some(tool)),
                Err(CommandError::Execution { .. }) => {
                    debug!(tool = tool.binary(), "download tool not found");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Evaluate a Python expression on the target and return its text
    ///
    /// `setup` runs first (imports, helper assignments). The result is read
    /// from between the introspection markers, so banners printed by the
    /// shell do not leak into it.
    ///
    /// # Errors
    /// Same as [`CommandRunner::run`]; `MalformedOutput` if the markers are
    /// missing from the output.
    #[instrument(skip(self), fields(host = %self.target.label()))]
    pub async fn python(&self, setup: &str, expr: &str) -> Result<String, CommandError> {
        let program = python_program(setup, expr);
        let command = format!(
            "{} -c {}",
            quote(self.options.python_or_default()),
            quote(&program)
        );

        let result = self.run(&command).await?;
        extract_delimited(result.output(), OPEN_MARKER, CLOSE_MARKER)
            .map(str::to_string)
            .ok_or_else(|| CommandError::MalformedOutput {
                command,
                output: result.output().to_string(),
            })
    }

    /// Distribution of the target's operating system
    ///
    /// # Errors
    /// Same as [`CommandRunner::python`]; `MalformedOutput` if the payload
    /// is not the expected JSON object.
    pub async fn machine_distribution(&self) -> Result<Distribution, CommandError> {
        let raw = self.python(DISTRIBUTION_SETUP, DISTRIBUTION_EXPR).await?;
        serde_json::from_str(&raw).map_err(|e| CommandError::MalformedOutput {
            command: "machine_distribution".to_string(),
            output: format!("{raw} ({e})"),
        })
    }

    /// Close every pooled SSH connection in the process
    ///
    /// This is [`registry::close_all`]: it also disconnects sessions used by
    /// other runners. Idempotent and infallible.
    pub async fn close(&self) {
        registry::close_all().await;
    }
}

fn basename(path: &str) -> Result<String, CommandError> {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| CommandError::Io {
            path: path.to_string(),
            kind: std::io::ErrorKind::InvalidInput,
            message: "path has no file name".to_string(),
        })
}
