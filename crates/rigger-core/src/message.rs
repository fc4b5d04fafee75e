//! Message types for actor communication
//!
//! Message handlers are implemented in their respective actor modules.

use chrono::{DateTime, Utc};
use kameo_macros::Reply;

use crate::config::AgentConfig;
use crate::error::CoreError;
use crate::state::{AgentState, Operation};

// ============================================================================
// AgentActor Messages
// ============================================================================

/// Install the agent and create its daemon
#[derive(Debug)]
pub struct Create;

/// Configure the daemon
#[derive(Debug)]
pub struct Configure;

/// Start the daemon
#[derive(Debug)]
pub struct Start;

/// Stop the daemon
#[derive(Debug)]
pub struct Stop;

/// Delete the daemon
#[derive(Debug)]
pub struct Delete;

/// Restart the daemon
#[derive(Debug)]
pub struct Restart;

/// Run the given lifecycle operation
#[derive(Debug, Clone, Copy)]
pub struct Perform {
    pub operation: Operation,
}

/// Get full agent status
#[derive(Debug)]
pub struct GetStatus;

/// Result of a lifecycle operation
#[derive(Debug, Clone, Reply)]
pub struct OperationOutcome {
    /// Agent name
    pub agent: String,
    /// Operation that ran
    pub operation: Operation,
    /// State after the operation
    pub state: AgentState,
    /// Command output, if the operation printed anything
    pub output: Option<String>,
}

/// Agent status response
#[derive(Debug, Clone, Reply)]
pub struct AgentStatus {
    /// Agent name
    pub name: String,
    /// Current state
    pub state: AgentState,
    /// Last operation attempted
    pub last_operation: Option<Operation>,
    /// When the state last changed
    pub last_changed: Option<DateTime<Utc>>,
    /// Error message if in failed state
    pub error: Option<String>,
}

// ============================================================================
// FleetActor Messages
// ============================================================================

/// Register an agent with the fleet
#[derive(Debug)]
pub struct RegisterAgent {
    /// Agent configuration
    pub config: AgentConfig,
}

/// Remove an agent from the fleet
#[derive(Debug)]
pub struct UnregisterAgent {
    /// Agent to remove
    pub name: String,
}

/// Get status of a specific agent
#[derive(Debug)]
pub struct GetAgentStatus {
    /// Agent to query
    pub name: String,
}

/// List all registered agents
#[derive(Debug)]
pub struct ListAgents;

/// Run an operation on one agent
#[derive(Debug)]
pub struct AgentOperation {
    /// Target agent
    pub name: String,
    pub operation: Operation,
}

/// Run an operation on many agents concurrently
#[derive(Debug)]
pub struct FleetOperation {
    pub operation: Operation,
    /// Agents to include; empty means every registered agent
    pub agents: Vec<String>,
}

/// Outcome for one agent of a fleet operation
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub agent: String,
    pub result: Result<OperationOutcome, CoreError>,
}

/// Fleet operation result
#[derive(Debug, Clone, Reply)]
pub struct FleetReport {
    pub operation: Operation,
    /// One report per selected agent, in name order
    pub reports: Vec<AgentReport>,
}

impl FleetReport {
    /// Number of agents that completed the operation
    #[must_use]
    pub fn completed(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_ok()).count()
    }

    /// Number of agents that failed
    #[must_use]
    pub fn failed(&self) -> usize {
        self.reports.len() - self.completed()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}
