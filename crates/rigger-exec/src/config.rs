//! Connection configuration and per-call run options

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CommandError;
use crate::keys::KeySource;

/// Default SSH port
pub const DEFAULT_REMOTE_EXECUTION_PORT: u16 = 22;

/// Default interpreter used for remote introspection
pub const DEFAULT_PYTHON: &str = "python3";

fn default_port() -> u16 {
    DEFAULT_REMOTE_EXECUTION_PORT
}

/// Connection parameters for a runner, as supplied by the caller
///
/// Validated once into a [`Target`] when the runner is built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Host address (required unless local)
    pub host: Option<String>,
    /// SSH user (required unless local)
    pub user: Option<String>,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Password authentication
    pub password: Option<String>,
    /// Private key authentication
    pub key: Option<KeySource>,
    /// Run everything on the local machine instead of over SSH
    #[serde(default)]
    pub local: bool,
    /// Default options applied to every call
    #[serde(default)]
    pub options: RunOptions,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: None,
            user: None,
            port: DEFAULT_REMOTE_EXECUTION_PORT,
            password: None,
            key: None,
            local: false,
            options: RunOptions::default(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key", &self.key)
            .field("local", &self.local)
            .field("options", &self.options)
            .finish()
    }
}

impl ConnectionConfig {
    /// Remote target without credentials
    pub fn remote(host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            user: Some(user.into()),
            ..Self::default()
        }
    }

    /// Local target
    #[must_use]
    pub fn local() -> Self {
        Self {
            local: true,
            ..Self::default()
        }
    }

    /// Set password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set key source
    #[must_use]
    pub fn with_key(mut self, key: KeySource) -> Self {
        self.key = Some(key);
        self
    }

    /// Set custom port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set default run options
    #[must_use]
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the configuration
    ///
    /// Checks run in a fixed order and stop at the first violation: host,
    /// user, key and password together, neither key nor password.
    ///
    /// # Errors
    /// Returns `CommandError::Configuration` naming the failed constraint.
    pub fn validate(&self) -> Result<Target, CommandError> {
        if self.local {
            return Ok(Target::Local);
        }

        let host = non_empty(self.host.as_deref())
            .ok_or_else(|| CommandError::Configuration("Missing host".to_string()))?;
        let user = non_empty(self.user.as_deref())
            .ok_or_else(|| CommandError::Configuration("Missing user".to_string()))?;

        let credentials = match (&self.password, &self.key) {
            (Some(_), Some(_)) => {
                return Err(CommandError::Configuration(
                    "Cannot specify both key and password".to_string(),
                ));
            }
            (Some(password), None) => Credentials::Password(password.clone()),
            (None, Some(key)) => Credentials::Key(key.clone()),
            (None, None) => {
                return Err(CommandError::Configuration(
                    "Must specify either key or password".to_string(),
                ));
            }
        };

        Ok(Target::Remote(RemoteTarget {
            host: host.to_string(),
            user: user.to_string(),
            port: self.port,
            credentials,
        }))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A validated target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The local machine
    Local,
    /// A host reached over SSH
    Remote(RemoteTarget),
}

impl Target {
    /// Short label for logs
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Target::Local => "local".to_string(),
            Target::Remote(remote) => remote.endpoint(),
        }
    }
}

/// Validated remote connection details
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub credentials: Credentials,
}

impl RemoteTarget {
    /// `user@host:port`
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteTarget")
            .field("endpoint", &self.endpoint())
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Authentication method for a remote target
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    Key(KeySource),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(***)"),
            Credentials::Key(key) => f.debug_tuple("Key").field(key).finish(),
        }
    }
}

/// Options for a single call, merged over the runner's defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Environment injected for the duration of the command
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Log command output at debug level only
    pub quiet: Option<bool>,
    /// Upper bound for a single command, in seconds
    pub timeout_secs: Option<u64>,
    /// Directory the command runs in
    pub working_dir: Option<String>,
    /// Interpreter for remote introspection
    pub python: Option<String>,
}

impl RunOptions {
    /// Empty options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one environment variable
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Add several environment variables
    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set quiet flag
    #[must_use]
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = Some(quiet);
        self
    }

    /// Set command timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Set working directory
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set introspection interpreter
    #[must_use]
    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = Some(python.into());
        self
    }

    /// Merge `overrides` over `self`; values set in `overrides` win
    #[must_use]
    pub fn merged(&self, overrides: &RunOptions) -> RunOptions {
        let mut env = self.env.clone();
        env.extend(overrides.env.clone());
        RunOptions {
            env,
            quiet: overrides.quiet.or(self.quiet),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            working_dir: overrides
                .working_dir
                .clone()
                .or_else(|| self.working_dir.clone()),
            python: overrides.python.clone().or_else(|| self.python.clone()),
        }
    }

    /// Effective command timeout
    #[must_use]
    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Effective introspection interpreter
    #[must_use]
    pub fn python_or_default(&self) -> &str {
        self.python.as_deref().unwrap_or(DEFAULT_PYTHON)
    }

    /// Effective quiet flag (quiet unless told otherwise)
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.quiet.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_error(config: &ConnectionConfig) -> String {
        match config.validate() {
            Err(CommandError::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_default_port() {
        let config = ConnectionConfig::remote("host", "user").with_password("password");
        assert_eq!(config.port, 22);

        let parsed: ConnectionConfig =
            serde_json::from_str(r#"{"host": "host", "user": "user", "password": "pw"}"#).unwrap();
        assert_eq!(parsed.port, 22);

        assert_eq!(ConnectionConfig::default().port, 22);
        let built = ConnectionConfig {
            host: Some("host".to_string()),
            user: Some("user".to_string()),
            password: Some("password".to_string()),
            ..ConnectionConfig::default()
        };
        match built.validate().unwrap() {
            Target::Remote(remote) => assert_eq!(remote.port, 22),
            Target::Local => panic!("expected a remote target"),
        }
    }

    #[test]
    fn test_missing_host() {
        let config = ConnectionConfig {
            user: Some("user".to_string()),
            password: Some("password".to_string()),
            ..ConnectionConfig::default()
        };
        assert!(config_error(&config).contains("host"));
    }

    #[test]
    fn test_missing_user() {
        let config = ConnectionConfig {
            host: Some("host".to_string()),
            password: Some("password".to_string()),
            ..ConnectionConfig::default()
        };
        assert!(config_error(&config).contains("user"));
    }

    #[test]
    fn test_key_and_password() {
        let config = ConnectionConfig::remote("host", "user")
            .with_password("password")
            .with_key(KeySource::Path("key".into()));
        assert_eq!(config_error(&config), "Cannot specify both key and password");
    }

    #[test]
    fn test_no_key_no_password() {
        let config = ConnectionConfig::remote("host", "user");
        assert_eq!(config_error(&config), "Must specify either key or password");
    }

    #[test]
    fn test_validation_order_reports_host_first() {
        // every constraint is violated; host is checked first
        let config = ConnectionConfig {
            password: Some("pw".to_string()),
            key: Some(KeySource::Path("key".into())),
            ..ConnectionConfig::default()
        };
        assert_eq!(config_error(&config), "Missing host");
    }

    #[test]
    fn test_local_skips_validation() {
        assert_eq!(ConnectionConfig::local().validate().unwrap(), Target::Local);
    }

    #[test]
    fn test_remote_target() {
        let target = ConnectionConfig::remote("10.0.0.5", "ubuntu")
            .with_port(2222)
            .with_password("pw")
            .validate()
            .unwrap();

        assert_eq!(target.label(), "ubuntu@10.0.0.5:2222");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig::remote("host", "user").with_password("hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_merge_override_wins() {
        let defaults = RunOptions::new()
            .env("A", "1")
            .env("B", "2")
            .quiet(true)
            .working_dir("/opt");
        let overrides = RunOptions::new().env("B", "3").quiet(false);

        let merged = defaults.merged(&overrides);
        assert_eq!(merged.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(merged.env.get("B").map(String::as_str), Some("3"));
        assert_eq!(merged.quiet, Some(false));
        assert_eq!(merged.working_dir.as_deref(), Some("/opt"));
        assert_eq!(merged.python_or_default(), DEFAULT_PYTHON);
    }
}
