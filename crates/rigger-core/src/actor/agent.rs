//! `AgentActor`: Per-agent lifecycle
//!
//! Owns one `Lifecycle` and guards it with the agent state machine.

use chrono::{DateTime, Utc};
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::lifecycle::Lifecycle;
use crate::message::{
    AgentStatus, Configure, Create, Delete, GetStatus, OperationOutcome, Perform, Restart, Start,
    Stop,
};
use crate::state::{AgentState, FailedStateContext, Operation};

/// Arguments for spawning an `AgentActor`
pub struct AgentActorArgs {
    /// Agent configuration
    pub config: AgentConfig,
    /// Lifecycle bound to the agent's target
    pub lifecycle: Lifecycle,
}

/// Per-agent actor running lifecycle operations one at a time
pub struct AgentActor {
    /// Agent configuration
    config: AgentConfig,
    /// Lifecycle bound to the agent's target
    lifecycle: Lifecycle,
    /// Current state
    state: AgentState,
    /// Context for `Failed` state
    failed_context: Option<FailedStateContext>,
    /// Last operation attempted
    last_operation: Option<Operation>,
    /// Last state change
    last_changed: Option<DateTime<Utc>>,
}

impl AgentActor {
    /// Get the agent name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> AgentState {
        self.state
    }

    fn transition_to(&mut self, new_state: AgentState) {
        let old_state = self.state;
        self.state = new_state;
        self.last_changed = Some(Utc::now());

        info!(
            agent = %self.config.name,
            from = %old_state,
            to = %new_state,
            "state transition"
        );
    }

    /// Transition to `Failed` state, preserving error context
    fn fail_with_error(&mut self, operation: Operation, error: &CoreError) {
        let previous = self.state;
        self.failed_context = Some(FailedStateContext::new(
            previous,
            operation,
            error.to_string(),
        ));
        self.state = AgentState::Failed;
        self.last_changed = Some(Utc::now());

        error!(
            agent = %self.config.name,
            previous_state = %previous,
            operation = %operation,
            error = %error,
            "agent entered failed state"
        );
    }

    async fn perform(&mut self, operation: Operation) -> Result<OperationOutcome, CoreError> {
        if !self.state.allows(operation) {
            warn!(
                agent = %self.config.name,
                state = %self.state,
                operation = %operation,
                "operation rejected"
            );
            return Err(CoreError::InvalidTransition {
                from: self.state,
                operation,
            });
        }

        self.last_operation = Some(operation);

        match self.lifecycle.perform(&self.config, operation).await {
            Ok(result) => {
                self.failed_context = None;
                self.transition_to(operation.resulting_state());

                Ok(OperationOutcome {
                    agent: self.config.name.clone(),
                    operation,
                    state: self.state,
                    output: result.and_then(|r| r.output),
                })
            }
            Err(e) => {
                self.fail_with_error(operation, &e);
                Err(e)
            }
        }
    }
}

impl Actor for AgentActor {
    type Args = AgentActorArgs;
    type Error = CoreError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(agent = %args.config.name, id = %actor_ref.id(), "AgentActor starting");

        args.config.validate()?;

        Ok(Self {
            config: args.config,
            lifecycle: args.lifecycle,
            state: AgentState::Unknown,
            failed_context: None,
            last_operation: None,
            last_changed: None,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(
            agent = %self.config.name,
            reason = ?reason,
            "AgentActor stopping"
        );
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

macro_rules! lifecycle_messages {
    ($($msg:ident => $operation:expr),* $(,)?) => {
        $(
            impl Message<$msg> for AgentActor {
                type Reply = Result<OperationOutcome, CoreError>;

                async fn handle(
                    &mut self,
                    _msg: $msg,
                    _ctx: &mut Context<Self, Self::Reply>,
                ) -> Self::Reply {
                    self.perform($operation).await
                }
            }
        )*
    };
}

lifecycle_messages! {
    Create => Operation::Create,
    Configure => Operation::Configure,
    Start => Operation::Start,
    Stop => Operation::Stop,
    Delete => Operation::Delete,
    Restart => Operation::Restart,
}

impl Message<Perform> for AgentActor {
    type Reply = Result<OperationOutcome, CoreError>;

    async fn handle(&mut self, msg: Perform, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        self.perform(msg.operation).await
    }
}

impl Message<GetStatus> for AgentActor {
    type Reply = AgentStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        AgentStatus {
            name: self.config.name.clone(),
            state: self.state,
            last_operation: self.last_operation,
            last_changed: self.last_changed,
            error: self.failed_context.as_ref().map(|c| c.error.clone()),
        }
    }
}
