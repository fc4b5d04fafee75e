//! rigger-exec: Command execution for provisioning targets
//!
//! Provides `CommandRunner`, which executes commands, transfers files and
//! evaluates introspection snippets either locally or over SSH, plus the
//! environment-file codec shared with the lifecycle layer.

pub mod config;
pub mod env;
pub mod error;
pub mod keys;
pub mod local;
pub mod registry;
pub mod result;
pub mod runner;
pub mod sentinel;
pub mod shell;
pub mod ssh;
pub mod transport;

pub use config::{
    ConnectionConfig, Credentials, DEFAULT_REMOTE_EXECUTION_PORT, RemoteTarget, RunOptions, Target,
};
pub use env::{EnvironmentMap, purge_none_values, stringify_values, to_env_vars, to_environment_file};
pub use error::CommandError;
pub use keys::KeySource;
pub use local::LocalTransport;
pub use result::{CommandResult, Distribution, ExecOutput};
pub use runner::{CommandRunner, DownloadTool};
pub use ssh::SshTransport;
pub use transport::Transport;
