//! rigger-core: Agent lifecycle and orchestration logic
//!
//! Implements the `Lifecycle` orchestrator over a `CommandRunner`, the
//! runtime-properties store, and the `FleetActor` and `AgentActor` using the
//! kameo framework.

pub mod actor;
pub mod config;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod message;
pub mod state;
pub mod store;

pub use actor::agent::{AgentActor, AgentActorArgs};
pub use actor::fleet::{FleetActor, FleetActorArgs, LifecycleFactory};
pub use config::{AgentConfig, InstallSource};
pub use error::CoreError;
pub use lifecycle::Lifecycle;
pub use message::{
    AgentOperation, AgentReport, AgentStatus, Configure, Create, Delete, FleetOperation,
    FleetReport, GetAgentStatus, GetStatus, ListAgents, OperationOutcome, Perform, RegisterAgent,
    Restart, Start, Stop, UnregisterAgent,
};
pub use state::{AgentState, FailedStateContext, Operation};
pub use store::{AgentRecord, JsonFileStore, MemoryStore, RUNTIME_PROPERTY, RuntimeStore};
