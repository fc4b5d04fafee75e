//! Subcommand implementations

use std::path::Path;
use std::sync::Arc;

use eyre::{Result, bail, eyre};
use kameo::actor::Spawn;
use kameo::error::SendError;
use rigger_core::{
    CoreError, FleetActor, FleetActorArgs, FleetOperation, FleetReport, Operation, RegisterAgent,
};
use rigger_exec::{CommandRunner, purge_none_values, stringify_values, to_environment_file};
use serde_json::Value;
use tracing::{error, info};

use crate::config::Config;
use crate::factory::DefaultLifecycleFactory;

fn handler_error<M>(err: SendError<M, CoreError>) -> eyre::Report {
    match err {
        SendError::HandlerError(e) => e.into(),
        other => eyre!("actor communication error: {other}"),
    }
}

fn runner(config: &Config, agent: &str) -> Result<CommandRunner> {
    Ok(DefaultLifecycleFactory::runner(config.agent(agent)?)?)
}

/// Run a lifecycle operation on the selected agents concurrently
pub async fn lifecycle(config: &Config, operation: Operation, agents: Vec<String>) -> Result<()> {
    let selected = config.select(&agents)?;
    if selected.is_empty() {
        bail!("no agents configured");
    }

    let fleet = FleetActor::spawn(FleetActorArgs {
        lifecycle_factory: Arc::new(DefaultLifecycleFactory::new(config)),
    });

    let mut registered = Vec::with_capacity(selected.len());
    let mut failed = 0;
    for entry in &selected {
        let name = entry.agent.name.clone();
        match fleet
            .ask(RegisterAgent {
                config: entry.agent.clone(),
            })
            .await
        {
            Ok(()) => registered.push(name),
            Err(e) => {
                let e = handler_error(e);
                error!(agent = %name, error = %e, "failed to register agent");
                println!("{name}: {operation} failed: {e}");
                failed += 1;
            }
        }
    }

    if !registered.is_empty() {
        let report = fleet
            .ask(FleetOperation {
                operation,
                agents: registered,
            })
            .await
            .map_err(|e| eyre!("fleet operation failed: {e}"))?;
        print_report(&report);
        failed += report.failed();
    }

    fleet.stop_gracefully().await.ok();

    if failed > 0 {
        bail!("{failed} of {} agents failed to {operation}", selected.len());
    }
    info!(operation = %operation, agents = selected.len(), "all agents done");
    Ok(())
}

fn print_report(report: &FleetReport) {
    for agent in &report.reports {
        match &agent.result {
            Ok(outcome) => {
                println!("{}: {} ok, now {}", agent.agent, report.operation, outcome.state);
                if let Some(output) = &outcome.output {
                    for line in output.lines() {
                        println!("  {line}");
                    }
                }
            }
            Err(e) => println!("{}: {} failed: {e}", agent.agent, report.operation),
        }
    }
}

/// Run a command on an agent's target and print its output
pub async fn run(config: &Config, agent: &str, command: &str, sudo: bool) -> Result<()> {
    let runner = runner(config, agent)?;
    let result = if sudo {
        runner.sudo(command).await?
    } else {
        runner.run(command).await?
    };

    if let Some(output) = result.output {
        println!("{output}");
    }
    Ok(())
}

pub async fn ping(config: &Config, agent: &str) -> Result<()> {
    runner(config, agent)?.ping().await?;
    println!("{agent}: ok");
    Ok(())
}

pub async fn distro(config: &Config, agent: &str) -> Result<()> {
    let distribution = runner(config, agent)?.machine_distribution().await?;
    println!("{}", serde_json::to_string_pretty(&distribution)?);
    Ok(())
}

pub async fn put(
    config: &Config,
    agent: &str,
    src: &Path,
    dst: Option<&str>,
    sudo: bool,
) -> Result<()> {
    let remote = runner(config, agent)?.put_file(src, dst, sudo).await?;
    println!("{remote}");
    Ok(())
}

pub async fn get(config: &Config, agent: &str, src: &str, dst: Option<&Path>) -> Result<()> {
    let local = runner(config, agent)?.get_file(src, dst).await?;
    println!("{}", local.display());
    Ok(())
}

/// Write `json` as an environment file and print the file's path
pub fn env_file(json: &str) -> Result<()> {
    let Value::Object(map) = serde_json::from_str(json)? else {
        bail!("environment must be a JSON object");
    };

    let path = to_environment_file(&stringify_values(&purge_none_values(&map)))?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> Config {
        let dir = std::env::temp_dir().join(format!("rigger-cli-test-{}", std::process::id()));
        toml::from_str(&format!(
            r#"
[settings]
state_dir = "{}"

[[agent]]
name = "local-worker"
[agent.connection]
local = true
"#,
            dir.display()
        ))
        .unwrap()
    }

    #[test]
    fn test_env_file() {
        env_file(r#"{"B": 2, "A": "x", "N": null}"#).unwrap();
        assert!(env_file("[1, 2]").is_err());
        assert!(env_file("not json").is_err());
    }

    #[tokio::test]
    async fn test_run_and_ping_locally() {
        let config = local_config();

        ping(&config, "local-worker").await.unwrap();
        run(&config, "local-worker", "echo hello", false).await.unwrap();
        assert!(run(&config, "local-worker", "exit 3", false).await.is_err());
        assert!(ping(&config, "missing").await.is_err());
    }

    #[tokio::test]
    async fn test_lifecycle_reports_failures() {
        let config = local_config();

        // the agent CLI does not exist locally, so configure fails
        let err = lifecycle(&config, Operation::Configure, vec![])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 of 1 agents failed to configure"));

        assert!(lifecycle(&config, Operation::Start, vec!["missing".to_string()])
            .await
            .is_err());
    }
}
