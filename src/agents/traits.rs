//! Agent trait - tick-driven agent interface
//!
//! The supervisor owns the loop and calls `process()` once per tick; the bus
//! calls `handle_message()` for every delivered message. Neither method
//! reaches into another agent's state.

use async_trait::async_trait;

use crate::bus::{Channel, Message};
use crate::error::Result;

use super::state::TickOutcome;

#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Human-readable name
    fn name(&self) -> &str;

    /// Channel this agent subscribes to and publishes as
    fn channel(&self) -> Channel;

    /// One-line description of the agent's job, used in chat prompts
    fn role(&self) -> &str {
        "pipeline agent"
    }

    /// One unit of periodic work. `Err` counts as a tick failure.
    async fn process(&self) -> Result<TickOutcome>;

    /// Merge an inbound message into local state
    async fn handle_message(&self, message: &Message) -> Result<()>;

    /// Short description of local state
    async fn state_summary(&self) -> String {
        String::new()
    }
}
