//! `FleetActor`: Fleet-wide orchestration
//!
//! Manages registry of `AgentActors` and fans lifecycle operations out to
//! them concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use kameo::actor::{ActorRef, Spawn, WeakActorRef};
use kameo::error::{ActorStopReason, SendError};
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{error, info, warn};

use crate::actor::agent::{AgentActor, AgentActorArgs};
use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::lifecycle::Lifecycle;
use crate::message::{
    AgentOperation, AgentReport, AgentStatus, FleetOperation, FleetReport, GetAgentStatus,
    GetStatus, ListAgents, OperationOutcome, Perform, RegisterAgent, UnregisterAgent,
};

/// Factory trait for creating the `Lifecycle` of an agent
///
/// Allows injection of different runners and stores per agent.
#[async_trait::async_trait]
pub trait LifecycleFactory: Send + Sync {
    /// Build the lifecycle for the given agent config
    async fn create_lifecycle(&self, config: &AgentConfig) -> Result<Lifecycle, CoreError>;
}

/// Arguments for spawning a `FleetActor`
pub struct FleetActorArgs {
    /// Factory for creating agent lifecycles
    pub lifecycle_factory: Arc<dyn LifecycleFactory>,
}

/// Fleet orchestrator managing all agent actors
pub struct FleetActor {
    /// Registry of agent actors by name
    agents: BTreeMap<String, ActorRef<AgentActor>>,
    /// Factory for creating agent lifecycles
    lifecycle_factory: Arc<dyn LifecycleFactory>,
}

/// Unwrap a handler error, or describe the delivery failure
fn flatten_send_error<M>(err: SendError<M, CoreError>) -> CoreError {
    match err {
        SendError::HandlerError(e) => e,
        other => CoreError::ActorError(other.to_string()),
    }
}

impl FleetActor {
    /// Get number of managed agents
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    fn agent(&self, name: &str) -> Result<&ActorRef<AgentActor>, CoreError> {
        self.agents
            .get(name)
            .ok_or_else(|| CoreError::AgentNotFound(name.to_string()))
    }

    /// Spawn an `AgentActor` for the given config
    async fn spawn_agent_actor(
        &self,
        config: AgentConfig,
    ) -> Result<ActorRef<AgentActor>, CoreError> {
        config.validate()?;
        let lifecycle = self.lifecycle_factory.create_lifecycle(&config).await?;

        let name = config.name.clone();
        let actor_ref = AgentActor::spawn(AgentActorArgs { config, lifecycle });

        info!(agent = %name, "spawned AgentActor");

        Ok(actor_ref)
    }
}

impl Actor for FleetActor {
    type Args = FleetActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(id = %actor_ref.id(), "FleetActor starting");

        Ok(Self {
            agents: BTreeMap::new(),
            lifecycle_factory: args.lifecycle_factory,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(reason = ?reason, "FleetActor stopping");

        for (name, actor_ref) in &self.agents {
            info!(agent = %name, "stopping AgentActor");
            actor_ref.stop_gracefully().await.ok();
        }

        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<RegisterAgent> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: RegisterAgent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let name = msg.config.name.clone();

        if self.agents.contains_key(&name) {
            return Err(CoreError::AgentAlreadyExists(name));
        }

        let actor_ref = self.spawn_agent_actor(msg.config).await?;
        self.agents.insert(name, actor_ref);

        Ok(())
    }
}

impl Message<UnregisterAgent> for FleetActor {
    type Reply = Result<(), CoreError>;

    async fn handle(
        &mut self,
        msg: UnregisterAgent,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let name = &msg.name;

        if let Some(actor_ref) = self.agents.remove(name) {
            actor_ref.stop_gracefully().await.ok();
            info!(agent = %name, "unregistered agent");
            Ok(())
        } else {
            Err(CoreError::AgentNotFound(name.clone()))
        }
    }
}

impl Message<GetAgentStatus> for FleetActor {
    type Reply = Result<AgentStatus, CoreError>;

    async fn handle(
        &mut self,
        msg: GetAgentStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.agent(&msg.name)?
            .ask(GetStatus)
            .await
            .map_err(|e| CoreError::ActorError(e.to_string()))
    }
}

impl Message<ListAgents> for FleetActor {
    type Reply = Vec<AgentStatus>;

    async fn handle(
        &mut self,
        _msg: ListAgents,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let mut statuses = Vec::with_capacity(self.agents.len());

        for (name, actor_ref) in &self.agents {
            match actor_ref.ask(GetStatus).await {
                Ok(status) => statuses.push(status),
                Err(e) => {
                    warn!(agent = %name, error = %e, "failed to get agent status");
                }
            }
        }

        statuses
    }
}

impl Message<AgentOperation> for FleetActor {
    type Reply = Result<OperationOutcome, CoreError>;

    async fn handle(
        &mut self,
        msg: AgentOperation,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        self.agent(&msg.name)?
            .ask(Perform {
                operation: msg.operation,
            })
            .await
            .map_err(flatten_send_error)
    }
}

impl Message<FleetOperation> for FleetActor {
    type Reply = FleetReport;

    async fn handle(
        &mut self,
        msg: FleetOperation,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let operation = msg.operation;

        let selected: Vec<(String, Option<ActorRef<AgentActor>>)> = if msg.agents.is_empty() {
            self.agents
                .iter()
                .map(|(name, actor)| (name.clone(), Some(actor.clone())))
                .collect()
        } else {
            let mut names = msg.agents;
            names.sort();
            names.dedup();
            names
                .into_iter()
                .map(|name| {
                    let actor = self.agents.get(&name).cloned();
                    (name, actor)
                })
                .collect()
        };

        info!(
            operation = %operation,
            total_agents = selected.len(),
            "starting fleet operation"
        );

        let reports = join_all(selected.into_iter().map(|(agent, actor)| async move {
            let result = match actor {
                Some(actor) => actor
                    .ask(Perform { operation })
                    .await
                    .map_err(flatten_send_error),
                None => Err(CoreError::AgentNotFound(agent.clone())),
            };

            match &result {
                Ok(outcome) => info!(agent = %agent, state = %outcome.state, "operation completed"),
                Err(e) => error!(agent = %agent, error = %e, "operation failed"),
            }

            AgentReport { agent, result }
        }))
        .await;

        let report = FleetReport { operation, reports };

        info!(
            operation = %operation,
            completed = report.completed(),
            failed = report.failed(),
            "fleet operation finished"
        );

        report
    }
}
