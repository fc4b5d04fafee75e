//! Configuration loading and types

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use eyre::{WrapErr, bail};
use rigger_core::AgentConfig;
use rigger_exec::ConnectionConfig;
use serde::Deserialize;

/// Top-level configuration for rigger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub settings: Settings,
    /// Managed agents
    #[serde(default)]
    pub agent: Vec<AgentEntry>,
}

/// General settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Directory holding one runtime-properties file per agent
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            log_level: default_log_level(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".rigger")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One agent and how to reach its target
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    #[serde(flatten)]
    pub agent: AgentConfig,
    /// Target connection; defaults to nothing, which fails validation
    #[serde(default)]
    pub connection: ConnectionConfig,
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed, or agent names repeat
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .wrap_err_with(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit` or the first default path that exists
    ///
    /// Returns the path that was loaded, or `None` when no file was found
    /// and defaults are used.
    ///
    /// # Errors
    /// Returns error if the chosen file cannot be loaded
    pub fn discover(explicit: Option<&Path>) -> eyre::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, Some(path.to_path_buf())));
        }

        for path in default_paths() {
            if path.exists() {
                return Ok((Self::load(&path)?, Some(path)));
            }
        }

        Ok((Config::default(), None))
    }

    /// Check agent names are set and unique
    ///
    /// # Errors
    /// Returns error naming the first offending agent
    pub fn validate(&self) -> eyre::Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.agent {
            entry.agent.validate()?;
            if !seen.insert(entry.agent.name.as_str()) {
                bail!("duplicate agent name: {}", entry.agent.name);
            }
        }
        Ok(())
    }

    /// Look up an agent by name
    ///
    /// # Errors
    /// Returns error if no agent has that name
    pub fn agent(&self, name: &str) -> eyre::Result<&AgentEntry> {
        self.agent
            .iter()
            .find(|entry| entry.agent.name == name)
            .ok_or_else(|| eyre::eyre!("no agent named {name} in configuration"))
    }

    /// Agents named in `names`, or all of them when `names` is empty
    ///
    /// # Errors
    /// Returns error for the first unknown name
    pub fn select(&self, names: &[String]) -> eyre::Result<Vec<&AgentEntry>> {
        if names.is_empty() {
            return Ok(self.agent.iter().collect());
        }
        names.iter().map(|name| self.agent(name)).collect()
    }
}

fn default_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("rigger.toml"),
        PathBuf::from("/etc/rigger/rigger.toml"),
    ];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("rigger/rigger.toml"));
    }
    paths
}

#[cfg(test)]
mod tests {
    use rigger_exec::KeySource;

    use super::*;

    const SAMPLE: &str = r#"
[settings]
state_dir = "/var/lib/rigger"
log_level = "debug"

[[agent]]
name = "worker-1"
manager_ip = "10.0.0.1"
package_url = "http://10.0.0.1/agent.tar.gz"
max_workers = 4

[agent.connection]
host = "10.0.0.5"
user = "ubuntu"
key = { path = "/home/me/.ssh/id_ed25519" }

[agent.env]
EXTRA = "1"

[[agent]]
name = "local-worker"
manager_ip = "127.0.0.1"
source_url = "agent-src"

[agent.connection]
local = true
"#;

    #[test]
    fn test_parse_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.settings.state_dir, PathBuf::from("/var/lib/rigger"));
        assert_eq!(config.settings.log_level, "debug");
        assert_eq!(config.agent.len(), 2);

        let worker = config.agent("worker-1").unwrap();
        assert_eq!(worker.agent.max_workers, Some(4));
        assert_eq!(worker.agent.env["EXTRA"], "1");
        assert_eq!(worker.connection.host.as_deref(), Some("10.0.0.5"));
        assert_eq!(worker.connection.port, 22);
        assert_eq!(
            worker.connection.key,
            Some(KeySource::Path("/home/me/.ssh/id_ed25519".into()))
        );

        assert!(config.agent("local-worker").unwrap().connection.local);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config.settings.state_dir, PathBuf::from(".rigger"));
        assert_eq!(config.settings.log_level, "info");
        assert!(config.agent.is_empty());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config: Config = toml::from_str(
            r#"
[[agent]]
name = "a"
[[agent]]
name = "a"
"#,
        )
        .unwrap();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_select() {
        let config: Config = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.select(&[]).unwrap().len(), 2);
        let selected = config.select(&["local-worker".to_string()]).unwrap();
        assert_eq!(selected[0].agent.name, "local-worker");
        assert!(config.select(&["missing".to_string()]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rigger.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let (config, loaded) = Config::discover(Some(&path)).unwrap();
        assert_eq!(loaded, Some(path));
        assert_eq!(config.agent.len(), 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load(Path::new("/nonexistent/rigger.toml")).is_err());
    }
}
