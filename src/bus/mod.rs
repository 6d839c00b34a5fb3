//! 消息總線
//!
//! Five fixed channels, typed payloads and a single-consumer delivery loop
//! with privacy-scoped fan-out.

pub mod channel;
pub mod message;
pub mod message_bus;
pub mod subscriber;

pub use channel::{Channel, SYSTEM_SENDER, USER_SENDER};
pub use message::{
    AgentReply, AgentStatusReport, ChatRequest, Diagnostic, Message, Payload, Severity,
    SystemStatus,
};
pub use message_bus::{BusStats, MessageBus};
pub use subscriber::{subscriber_fn, FnSubscriber, Subscriber};
