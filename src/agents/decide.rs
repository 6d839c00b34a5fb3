use async_trait::async_trait;
use std::time::Duration;

use super::staged::{Stage, StageContext};
use super::state::{Outcome, StateKey, StateSnapshot};
use crate::bus::{Channel, Payload};
use crate::domain::TradingDecision;

const KEYS: &[StateKey] = &[StateKey::TechnicalAnalysis, StateKey::RiskAssessment];

/// Turns signals plus risk into buy / sell / hold
pub struct DecideStage {
    interval: Duration,
}

impl DecideStage {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Stage for DecideStage {
    fn name(&self) -> &str {
        "Decide"
    }

    fn channel(&self) -> Channel {
        Channel::Decide
    }

    fn role(&self) -> &str {
        "makes the final buy, sell or hold decision"
    }

    fn inputs(&self) -> &[StateKey] {
        KEYS
    }

    /// Fresh signals wait for the risk assessment derived from them
    fn triggers(&self) -> &[StateKey] {
        &[StateKey::RiskAssessment]
    }

    fn dependencies(&self) -> &[StateKey] {
        KEYS
    }

    fn min_interval(&self) -> Duration {
        self.interval
    }

    async fn compute(&self, snapshot: &StateSnapshot, ctx: &StageContext) -> Outcome {
        let (Some(analysis), Some(risk)) =
            (snapshot.technical_analysis(), snapshot.risk_assessment())
        else {
            return Outcome::NotReady(KEYS.to_vec());
        };

        ctx.think("Making trading decision...");
        let decision = TradingDecision::decide(analysis, risk);
        ctx.think(format!("Decision: {} ({})", decision.action, decision.reason));
        Outcome::Ready(Payload::TradingDecision(decision))
    }
}
