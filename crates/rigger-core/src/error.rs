//! Core error types for rigger-core

use rigger_exec::CommandError;
use thiserror::Error;

use crate::state::{AgentState, Operation};

/// Errors that can occur in lifecycle and actor operations
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Agent not found in the fleet
    #[error("agent not found: {0}")]
    AgentNotFound(String),

    /// Agent already registered in the fleet
    #[error("agent already exists: {0}")]
    AgentAlreadyExists(String),

    /// Operation not allowed in the agent's current state
    #[error("cannot {operation} agent in state {from}")]
    InvalidTransition {
        /// Current state
        from: AgentState,
        /// Rejected operation
        operation: Operation,
    },

    /// A command on the target failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Runtime properties could not be read or written
    #[error("runtime store error: {0}")]
    Store(String),

    /// Actor communication error
    #[error("actor communication error: {0}")]
    ActorError(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Whether retrying the same operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Command(e) if e.is_retryable())
    }
}
