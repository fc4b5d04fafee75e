//! Lifecycle factory building runners and state stores from configuration

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use rigger_core::{AgentConfig, CoreError, JsonFileStore, Lifecycle, LifecycleFactory};
use rigger_exec::{CommandRunner, ConnectionConfig};

use crate::config::{AgentEntry, Config};

/// Default implementation of `LifecycleFactory`
///
/// Each agent gets a runner for its configured connection and a JSON state
/// file under the state directory.
pub struct DefaultLifecycleFactory {
    connections: HashMap<String, ConnectionConfig>,
    state_dir: PathBuf,
}

impl DefaultLifecycleFactory {
    /// Create a factory for the agents in `config`
    pub fn new(config: &Config) -> Self {
        Self {
            connections: config
                .agent
                .iter()
                .map(|entry| (entry.agent.name.clone(), entry.connection.clone()))
                .collect(),
            state_dir: config.settings.state_dir.clone(),
        }
    }

    /// Build a runner for a configured agent without contacting it
    pub fn runner(entry: &AgentEntry) -> Result<CommandRunner, CoreError> {
        Ok(CommandRunner::new(&entry.connection)?)
    }
}

#[async_trait]
impl LifecycleFactory for DefaultLifecycleFactory {
    async fn create_lifecycle(&self, config: &AgentConfig) -> Result<Lifecycle, CoreError> {
        let connection = self
            .connections
            .get(&config.name)
            .ok_or_else(|| CoreError::AgentNotFound(config.name.clone()))?;

        let runner = CommandRunner::new(connection)?;
        let store = Arc::new(JsonFileStore::for_agent(&self.state_dir, &config.name));

        tracing::debug!(
            agent = %config.name,
            target_host = %runner.target().label(),
            state_file = %store.path().display(),
            "created lifecycle"
        );

        Ok(Lifecycle::new(runner, store))
    }
}

#[cfg(test)]
mod tests {
    use rigger_exec::{CommandError, Target};

    use super::*;

    fn config() -> Config {
        toml::from_str(
            r#"
[settings]
state_dir = "/tmp/rigger-state"

[[agent]]
name = "local-worker"
[agent.connection]
local = true

[[agent]]
name = "broken"
[agent.connection]
host = "10.0.0.5"
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_local_lifecycle_creation() {
        let factory = DefaultLifecycleFactory::new(&config());

        let lifecycle = factory
            .create_lifecycle(&AgentConfig::new("local-worker"))
            .await
            .unwrap();
        assert_eq!(lifecycle.runner().target(), &Target::Local);
    }

    #[tokio::test]
    async fn test_invalid_connection_is_reported() {
        let factory = DefaultLifecycleFactory::new(&config());

        let err = factory
            .create_lifecycle(&AgentConfig::new("broken"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Command(CommandError::Configuration(ref msg)) if msg.contains("user")
        ));
    }

    #[tokio::test]
    async fn test_unknown_agent() {
        let factory = DefaultLifecycleFactory::new(&config());

        assert!(matches!(
            factory.create_lifecycle(&AgentConfig::new("missing")).await,
            Err(CoreError::AgentNotFound(_))
        ));
    }
}
