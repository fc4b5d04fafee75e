//! Agent lifecycle: install, create and drive the worker daemon on a target

use std::sync::Arc;

use chrono::Utc;
use rigger_exec::shell::quote;
use rigger_exec::{
    CommandError, CommandResult, CommandRunner, to_env_vars, to_environment_file,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{AgentConfig, InstallSource};
use crate::env::execution_env;
use crate::error::CoreError;
use crate::state::Operation;
use crate::store::{AgentRecord, RUNTIME_PROPERTY, RuntimeStore};

/// Drives the agent CLI on one target
///
/// Every step is a command issued through the runner; the agent CLI itself
/// is opaque here.
pub struct Lifecycle {
    runner: CommandRunner,
    store: Arc<dyn RuntimeStore>,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("runner", &self.runner)
            .finish_non_exhaustive()
    }
}

/// Agent CLI command line for `args`
fn agent_command(config: &AgentConfig, args: &str) -> String {
    format!("{} {args}", quote(&config.agent_bin()))
}

/// `daemon <op> --name=<name>`
fn daemon_command(config: &AgentConfig, operation: Operation) -> String {
    agent_command(
        config,
        &format!("daemon {operation} --name={}", quote(&config.name)),
    )
}

impl Lifecycle {
    #[must_use]
    pub fn new(runner: CommandRunner, store: Arc<dyn RuntimeStore>) -> Self {
        Self { runner, store }
    }

    #[must_use]
    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Install the agent and create its daemon
    ///
    /// Uploads the agent's environment file, installs from source or package,
    /// runs `daemon create` with the execution environment and records the
    /// resolved configuration under [`RUNTIME_PROPERTY`].
    ///
    /// # Errors
    /// `CoreError::Config` if required fields are missing (checked before
    /// any command runs), otherwise the first failing command's error.
    #[instrument(skip(self, config), fields(agent = %config.name))]
    pub async fn create(&self, config: &AgentConfig) -> Result<AgentRecord, CoreError> {
        let source = config.install_source()?;

        let env_path = self.upload_env_file(config).await?;
        let env = execution_env(config, &env_path);
        debug!(env = ?env, "agent will be created with this environment");

        match source {
            InstallSource::Source { url, requirements } => {
                self.install_from_source(config, url, requirements).await?;
            }
            InstallSource::Package { url } => {
                self.install_from_package(config, url).await?;
            }
        }

        info!("creating agent");
        self.runner
            .run_with_env(&agent_command(config, "daemon create"), &to_env_vars(&env))
            .await?;

        let record = AgentRecord {
            config: config.resolved(),
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&record)
            .map_err(|e| CoreError::Store(format!("failed to encode agent record: {e}")))?;
        self.store.set(RUNTIME_PROPERTY, value).await?;

        info!("agent created");
        Ok(record)
    }

    /// `daemon configure`
    ///
    /// # Errors
    /// The command's error.
    #[instrument(skip(self, config), fields(agent = %config.name))]
    pub async fn configure(&self, config: &AgentConfig) -> Result<CommandResult, CoreError> {
        config.validate()?;
        info!("configuring agent");
        Ok(self
            .runner
            .run(&daemon_command(config, Operation::Configure))
            .await?)
    }

    /// `daemon start`, under sudo
    ///
    /// # Errors
    /// The command's error.
    pub async fn start(&self, config: &AgentConfig) -> Result<CommandResult, CoreError> {
        self.daemon_sudo(config, Operation::Start).await
    }

    /// `daemon stop`, under sudo
    ///
    /// # Errors
    /// The command's error.
    pub async fn stop(&self, config: &AgentConfig) -> Result<CommandResult, CoreError> {
        self.daemon_sudo(config, Operation::Stop).await
    }

    /// `daemon delete`, under sudo
    ///
    /// The recorded runtime properties are kept.
    ///
    /// # Errors
    /// The command's error.
    pub async fn delete(&self, config: &AgentConfig) -> Result<CommandResult, CoreError> {
        self.daemon_sudo(config, Operation::Delete).await
    }

    /// `daemon restart`, under sudo
    ///
    /// # Errors
    /// The command's error.
    pub async fn restart(&self, config: &AgentConfig) -> Result<CommandResult, CoreError> {
        self.daemon_sudo(config, Operation::Restart).await
    }

    /// Run any lifecycle operation
    ///
    /// `create` reports no command output.
    ///
    /// # Errors
    /// Same as the individual operation.
    pub async fn perform(
        &self,
        config: &AgentConfig,
        operation: Operation,
    ) -> Result<Option<CommandResult>, CoreError> {
        match operation {
            Operation::Create => self.create(config).await.map(|_| None),
            Operation::Configure => self.configure(config).await.map(Some),
            Operation::Start => self.start(config).await.map(Some),
            Operation::Stop => self.stop(config).await.map(Some),
            Operation::Delete => self.delete(config).await.map(Some),
            Operation::Restart => self.restart(config).await.map(Some),
        }
    }

    /// Record written by the last successful `create`
    ///
    /// # Errors
    /// `CoreError::Store` if the store fails or the record is unreadable.
    pub async fn stored_record(&self) -> Result<Option<AgentRecord>, CoreError> {
        self.store
            .get(RUNTIME_PROPERTY)
            .await?
            .map(|value| {
                serde_json::from_value(value)
                    .map_err(|e| CoreError::Store(format!("invalid agent record: {e}")))
            })
            .transpose()
    }

    /// Configuration recorded by the last successful `create`
    ///
    /// # Errors
    /// Same as [`Lifecycle::stored_record`].
    pub async fn stored_config(&self) -> Result<Option<AgentConfig>, CoreError> {
        Ok(self.stored_record().await?.map(|record| record.config))
    }

    #[instrument(skip(self, config), fields(agent = %config.name, operation = %operation))]
    async fn daemon_sudo(
        &self,
        config: &AgentConfig,
        operation: Operation,
    ) -> Result<CommandResult, CoreError> {
        config.validate()?;
        info!("{} agent", progressive(operation));
        Ok(self.runner.sudo(&daemon_command(config, operation)).await?)
    }

    /// Write the agent's extra environment to a file on the target
    async fn upload_env_file(&self, config: &AgentConfig) -> Result<String, CoreError> {
        let local = to_environment_file(&config.env).map_err(|e| {
            CommandError::io(std::env::temp_dir().display().to_string(), &e)
        })?;

        let uploaded = self.runner.put_file(&local, None, false).await;

        if let Err(e) = tokio::fs::remove_file(&local).await {
            warn!(path = %local.display(), error = %e, "failed to remove local environment file");
        }

        let remote = uploaded?;
        debug!(path = %remote, "uploaded agent environment file");
        Ok(remote)
    }

    async fn install_from_source(
        &self,
        config: &AgentConfig,
        source_url: &str,
        requirements: Option<&str>,
    ) -> Result<(), CoreError> {
        let env_dir = config.env_dir();

        info!("installing virtualenv");
        self.runner.sudo("pip install virtualenv").await?;

        info!(path = %env_dir, "creating virtualenv");
        self.runner
            .run(&format!("virtualenv {}", quote(&env_dir)))
            .await?;

        let pip = quote(&format!("{env_dir}/bin/pip"));
        if let Some(requirements) = requirements {
            info!(requirements, "installing requirements file");
            self.runner
                .run(&format!("{pip} install -r {}", quote(requirements)))
                .await?;
        }

        info!(source = source_url, "installing agent from source");
        self.runner
            .run(&format!("{pip} install {}", quote(source_url)))
            .await?;
        Ok(())
    }

    async fn install_from_package(&self, config: &AgentConfig, package_url: &str) -> Result<(), CoreError> {
        info!(url = package_url, "downloading agent package");
        let package_path = self.runner.download(package_url, None).await?;

        info!("extracting agent package");
        self.runner
            .extract(&package_path, config.agent_dir(), 1)
            .await?;

        info!("auto-correcting agent virtualenv");
        self.runner
            .run(&agent_command(
                config,
                &format!("daemon configure --name={} --relocated-env", quote(&config.name)),
            ))
            .await?;
        Ok(())
    }
}

fn progressive(operation: Operation) -> &'static str {
    match operation {
        Operation::Create => "creating",
        Operation::Configure => "configuring",
        Operation::Start => "starting",
        Operation::Stop => "stopping",
        Operation::Delete => "deleting",
        Operation::Restart => "restarting",
    }
}
