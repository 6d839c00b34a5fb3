//! Supervisor Layer for agent lifecycles
//!
//! This module drives each agent:
//! - Lifecycle state machine and backoff schedule
//! - Tick loop with fault counting and self-termination
//! - Inbound handler routing chat and pipeline messages

pub mod agent_supervisor;
pub mod inbox;
pub mod lifecycle;

pub use agent_supervisor::{AgentSupervisor, SupervisorStats};
pub use inbox::Inbox;
pub use lifecycle::{backoff_units, LifecycleState};
