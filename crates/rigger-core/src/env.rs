//! Variables passed to `daemon create`

use rigger_exec::{EnvironmentMap, purge_none_values, stringify_values};
use serde_json::Value;

use crate::config::AgentConfig;

pub const MANAGER_IP: &str = "WORKER_MANAGER_IP";
pub const DAEMON_QUEUE: &str = "WORKER_DAEMON_QUEUE";
pub const DAEMON_NAME: &str = "WORKER_DAEMON_NAME";
pub const DAEMON_USER: &str = "WORKER_DAEMON_USER";
pub const BROKER_IP: &str = "WORKER_BROKER_IP";
pub const BROKER_PORT: &str = "WORKER_BROKER_PORT";
pub const BROKER_URL: &str = "WORKER_BROKER_URL";
pub const DAEMON_GROUP: &str = "WORKER_DAEMON_GROUP";
pub const MANAGER_PORT: &str = "WORKER_MANAGER_PORT";
pub const DAEMON_MAX_WORKERS: &str = "WORKER_DAEMON_MAX_WORKERS";
pub const DAEMON_MIN_WORKERS: &str = "WORKER_DAEMON_MIN_WORKERS";
pub const DAEMON_PROCESS_MANAGEMENT: &str = "WORKER_DAEMON_PROCESS_MANAGEMENT";
/// Path of the uploaded environment file on the target
pub const DAEMON_EXTRA_ENV: &str = "WORKER_DAEMON_EXTRA_ENV";

/// Execution environment for creating the agent described by `config`
///
/// Unset optional fields are dropped so the agent applies its own defaults;
/// every remaining value is a string.
#[must_use]
pub fn execution_env(config: &AgentConfig, extra_env_path: &str) -> EnvironmentMap {
    let mut env = EnvironmentMap::new();

    env.insert(MANAGER_IP.into(), Value::from(config.manager_ip.clone()));
    env.insert(DAEMON_QUEUE.into(), Value::from(config.queue()));
    env.insert(DAEMON_NAME.into(), Value::from(config.name.clone()));

    env.insert(DAEMON_USER.into(), Value::from(config.user.clone()));
    env.insert(BROKER_IP.into(), Value::from(config.broker_ip.clone()));
    env.insert(BROKER_PORT.into(), Value::from(config.broker_port));
    env.insert(BROKER_URL.into(), Value::from(config.broker_url.clone()));
    env.insert(DAEMON_GROUP.into(), Value::from(config.group.clone()));
    env.insert(MANAGER_PORT.into(), Value::from(config.manager_port));
    env.insert(DAEMON_MAX_WORKERS.into(), Value::from(config.max_workers));
    env.insert(DAEMON_MIN_WORKERS.into(), Value::from(config.min_workers));
    env.insert(
        DAEMON_PROCESS_MANAGEMENT.into(),
        Value::from(config.process_management.clone()),
    );

    env.insert(DAEMON_EXTRA_ENV.into(), Value::from(extra_env_path));

    stringify_values(&purge_none_values(&env))
}
