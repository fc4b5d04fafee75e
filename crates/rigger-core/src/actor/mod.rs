//! Actor implementations

pub mod agent;
pub mod fleet;

pub use agent::{AgentActor, AgentActorArgs};
pub use fleet::{FleetActor, FleetActorArgs, LifecycleFactory};
