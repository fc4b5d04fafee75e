//! Agent lifecycle state machine

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States for an `AgentActor` state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Nothing known about the target yet
    Unknown,
    Created,
    Configured,
    Running,
    Stopped,
    Deleted,
    Failed,
}

/// Lifecycle operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Configure,
    Start,
    Stop,
    Delete,
    Restart,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Create,
        Operation::Configure,
        Operation::Start,
        Operation::Stop,
        Operation::Delete,
        Operation::Restart,
    ];

    /// State the agent is in after the operation succeeds
    #[must_use]
    pub fn resulting_state(self) -> AgentState {
        match self {
            Operation::Create => AgentState::Created,
            Operation::Configure => AgentState::Configured,
            Operation::Start | Operation::Restart => AgentState::Running,
            Operation::Stop => AgentState::Stopped,
            Operation::Delete => AgentState::Deleted,
        }
    }

    /// Name as used on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Configure => "configure",
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Delete => "delete",
            Operation::Restart => "restart",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AgentState {
    /// Check if `operation` may run from this state
    ///
    /// `Unknown` and `Failed` allow everything: the target may be in any
    /// state after a restart of this process or a partial failure.
    #[must_use]
    pub fn allows(self, operation: Operation) -> bool {
        use AgentState::{Configured, Created, Deleted, Failed, Running, Stopped, Unknown};
        use Operation::{Configure, Create, Delete, Restart, Start, Stop};

        match (self, operation) {
            (Unknown | Failed, _) | (Deleted, Create) => true,
            (Deleted, _) | (_, Create) => false,
            (Created | Configured | Stopped, Configure) => true,
            (Configured | Stopped, Start) => true,
            (Running, Stop) => true,
            (Configured | Running | Stopped, Restart) => true,
            (_, Delete) => true,
            _ => false,
        }
    }

    /// Check if state is terminal for the agent's installation
    #[must_use]
    pub fn is_deleted(self) -> bool {
        self == AgentState::Deleted
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Unknown => "unknown",
            AgentState::Created => "created",
            AgentState::Configured => "configured",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Deleted => "deleted",
            AgentState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Failed state details
#[derive(Debug, Clone)]
pub struct FailedStateContext {
    pub previous_state: AgentState,
    pub operation: Operation,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl FailedStateContext {
    #[must_use]
    pub fn new(previous_state: AgentState, operation: Operation, error: String) -> Self {
        Self {
            previous_state,
            operation,
            error,
            failed_at: Utc::now(),
        }
    }
}
