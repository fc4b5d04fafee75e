//! Agent configuration

use rigger_exec::EnvironmentMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Name of the agent CLI inside its virtualenv
const AGENT_BINARY: &str = "worker-agent";

/// Configuration for a single worker agent
///
/// Optional fields left unset are not passed to the agent, which falls back
/// to its own defaults on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name, also the daemon name
    pub name: String,
    /// Queue the agent consumes (defaults to the name)
    pub queue: Option<String>,
    /// Manager address, required to create the agent
    pub manager_ip: Option<String>,
    pub manager_port: Option<u16>,
    pub broker_ip: Option<String>,
    pub broker_port: Option<u16>,
    pub broker_url: Option<String>,
    /// User the daemon runs as
    pub user: Option<String>,
    pub group: Option<String>,
    pub max_workers: Option<u32>,
    pub min_workers: Option<u32>,
    /// Process management system on the target (e.g. `init.d`)
    pub process_management: Option<String>,
    /// Installation directory, relative to the login directory unless
    /// absolute (defaults to the name)
    pub agent_dir: Option<String>,
    /// Agent CLI path (defaults to `<agent_dir>/env/bin/worker-agent`)
    pub agent_bin: Option<String>,
    /// Install with pip from this source instead of a package
    pub source_url: Option<String>,
    /// Prebuilt package tarball
    pub package_url: Option<String>,
    /// Requirements file installed before a source install
    pub requirements: Option<String>,
    /// Extra variables written to the agent's environment file
    #[serde(default)]
    pub env: EnvironmentMap,
}

/// Where the agent is installed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallSource<'a> {
    /// pip install into a fresh virtualenv
    Source {
        url: &'a str,
        requirements: Option<&'a str>,
    },
    /// Download and extract a prebuilt package
    Package { url: &'a str },
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl AgentConfig {
    /// Config with only a name set
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: None,
            manager_ip: None,
            manager_port: None,
            broker_ip: None,
            broker_port: None,
            broker_url: None,
            user: None,
            group: None,
            max_workers: None,
            min_workers: None,
            process_management: None,
            agent_dir: None,
            agent_bin: None,
            source_url: None,
            package_url: None,
            requirements: None,
            env: EnvironmentMap::new(),
        }
    }

    #[must_use]
    pub fn queue(&self) -> &str {
        non_empty(self.queue.as_ref()).unwrap_or(&self.name)
    }

    #[must_use]
    pub fn agent_dir(&self) -> &str {
        non_empty(self.agent_dir.as_ref()).unwrap_or(&self.name)
    }

    /// Virtualenv holding the agent
    #[must_use]
    pub fn env_dir(&self) -> String {
        format!("{}/env", self.agent_dir().trim_end_matches('/'))
    }

    #[must_use]
    pub fn agent_bin(&self) -> String {
        match non_empty(self.agent_bin.as_ref()) {
            Some(bin) => bin.to_string(),
            None => format!("{}/bin/{AGENT_BINARY}", self.env_dir()),
        }
    }

    /// Check fields every operation needs
    ///
    /// # Errors
    /// `CoreError::Config` if the name is empty
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Config("agent name is required".to_string()));
        }
        Ok(())
    }

    /// Check fields `create` needs and pick the install source
    ///
    /// A source URL takes precedence over a package URL.
    ///
    /// # Errors
    /// `CoreError::Config` if the name or manager address is missing, or if
    /// neither a source nor a package URL is set
    pub fn install_source(&self) -> Result<InstallSource<'_>, CoreError> {
        self.validate()?;

        if non_empty(self.manager_ip.as_ref()).is_none() {
            return Err(CoreError::Config(format!(
                "agent {}: manager_ip is required",
                self.name
            )));
        }

        if let Some(url) = non_empty(self.source_url.as_ref()) {
            return Ok(InstallSource::Source {
                url,
                requirements: non_empty(self.requirements.as_ref()),
            });
        }

        non_empty(self.package_url.as_ref())
            .map(|url| InstallSource::Package { url })
            .ok_or_else(|| {
                CoreError::Config(format!(
                    "agent {}: package_url is required when source_url is not set",
                    self.name
                ))
            })
    }

    /// Copy with every defaulted field filled in
    #[must_use]
    pub fn resolved(&self) -> Self {
        Self {
            queue: Some(self.queue().to_string()),
            agent_dir: Some(self.agent_dir().to_string()),
            agent_bin: Some(self.agent_bin()),
            ..self.clone()
        }
    }
}
