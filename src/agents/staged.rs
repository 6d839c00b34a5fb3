//! Staleness-gated pipeline stage
//!
//! A `Stage` declares its inputs, dependencies, minimum interval and a
//! compute step. `StagedAgent` wraps it with local state and the gate:
//!
//! 1. any dependency missing → no-op
//! 2. interval not elapsed and no trigger dirty → no-op
//! 3. otherwise compute on a snapshot, publish, record the computation
//!
//! The state lock is never held across `compute`.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use super::state::{Artifact, LocalState, Outcome, StateKey, StateSnapshot, TickOutcome};
use super::traits::Agent;
use crate::bus::{Channel, Message, MessageBus, Payload};
use crate::error::Result;

/// Publishing handle given to a stage during `compute`
#[derive(Clone)]
pub struct StageContext {
    bus: Arc<MessageBus>,
    channel: Channel,
}

impl StageContext {
    pub fn new(bus: Arc<MessageBus>, channel: Channel) -> Self {
        Self { bus, channel }
    }

    /// Private progress note, seen by the UI and this agent only
    pub fn think(&self, text: impl Into<String>) {
        self.bus
            .publish(self.channel.as_str(), Payload::AgentThought(text.into()), true);
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

/// One step of the pipeline
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn channel(&self) -> Channel;

    fn role(&self) -> &str;

    /// Keys absorbed from inbound messages
    fn inputs(&self) -> &[StateKey];

    /// Inputs whose arrival bypasses the interval. Other inputs are stored
    /// without forcing a recompute.
    fn triggers(&self) -> &[StateKey] {
        self.inputs()
    }

    /// Keys that must be present before `compute` runs
    fn dependencies(&self) -> &[StateKey];

    fn min_interval(&self) -> Duration;

    /// Extract an artifact worth keeping from an inbound payload
    fn absorb(&self, payload: &Payload) -> Option<Artifact> {
        Artifact::from_payload(payload).filter(|a| self.inputs().contains(&a.key()))
    }

    async fn compute(&self, snapshot: &StateSnapshot, ctx: &StageContext) -> Outcome;
}

pub struct StagedAgent<S: Stage> {
    stage: S,
    state: Mutex<LocalState>,
    ctx: StageContext,
}

impl<S: Stage> StagedAgent<S> {
    pub fn new(stage: S, bus: Arc<MessageBus>) -> Self {
        let ctx = StageContext::new(bus, stage.channel());
        Self {
            stage,
            state: Mutex::new(LocalState::new()),
            ctx,
        }
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Read access to local state, for inspection
    pub async fn with_state<R>(&self, f: impl FnOnce(&LocalState) -> R) -> R {
        f(&*self.state.lock().await)
    }

    /// Decide whether this tick should compute, and snapshot if so
    async fn gate(&self) -> std::result::Result<StateSnapshot, TickOutcome> {
        let state = self.state.lock().await;

        let missing = state.missing(self.stage.dependencies());
        if !missing.is_empty() {
            return Err(TickOutcome::NotReady(missing));
        }

        let due = state.interval_elapsed(Instant::now(), self.stage.min_interval());
        if !due && !state.any_dirty(self.stage.triggers()) {
            return Err(TickOutcome::UpToDate);
        }

        Ok(state.snapshot())
    }
}

#[async_trait]
impl<S: Stage> Agent for StagedAgent<S> {
    fn name(&self) -> &str {
        self.stage.name()
    }

    fn channel(&self) -> Channel {
        self.stage.channel()
    }

    fn role(&self) -> &str {
        self.stage.role()
    }

    async fn process(&self) -> Result<TickOutcome> {
        let snapshot = match self.gate().await {
            Ok(snapshot) => snapshot,
            Err(skip) => return Ok(skip),
        };

        match self.stage.compute(&snapshot, &self.ctx).await {
            Outcome::Ready(payload) => {
                let kind = payload.kind();
                self.ctx
                    .bus
                    .publish(self.stage.channel().as_str(), payload, false);
                self.state.lock().await.mark_computed(
                    Instant::now(),
                    snapshot.revision(),
                    self.stage.triggers(),
                );
                info!(agent = self.stage.name(), "Published {}", kind);
                Ok(TickOutcome::Published(kind))
            }
            Outcome::NotReady(missing) => Ok(TickOutcome::NotReady(missing)),
            Outcome::Failed(e) => Err(e),
        }
    }

    async fn handle_message(&self, message: &Message) -> Result<()> {
        if let Some(artifact) = self.stage.absorb(&message.payload) {
            debug!(
                agent = self.stage.name(),
                "Absorbed {} from {}",
                artifact.key(),
                message.sender
            );
            let mut state = self.state.lock().await;
            if self.stage.triggers().contains(&artifact.key()) {
                state.absorb(artifact);
            } else {
                state.store(artifact);
            }
        }
        Ok(())
    }

    async fn state_summary(&self) -> String {
        self.state.lock().await.summary()
    }
}
