pub mod adapters;
pub mod agents;
pub mod api;
pub mod bus;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod indicators;
pub mod services;
pub mod supervisor;

pub use agents::{Agent, Stage, StagedAgent, TickOutcome};
pub use bus::{Channel, Message, MessageBus, Payload, Subscriber};
pub use config::AppConfig;
pub use coordinator::{Collaborators, TradingSystem};
pub use error::{HedgeflowError, Result};
pub use supervisor::{AgentSupervisor, LifecycleState, SupervisorStats};
