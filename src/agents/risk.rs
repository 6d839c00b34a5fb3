use async_trait::async_trait;
use std::time::Duration;

use super::staged::{Stage, StageContext};
use super::state::{Outcome, StateKey, StateSnapshot};
use crate::bus::{Channel, Payload};
use crate::domain::RiskAssessment;

const KEYS: &[StateKey] = &[StateKey::TechnicalAnalysis];

/// Scores risk from the signal tally
pub struct RiskStage {
    interval: Duration,
}

impl RiskStage {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn name(&self) -> &str {
        "Risk"
    }

    fn channel(&self) -> Channel {
        Channel::Risk
    }

    fn role(&self) -> &str {
        "sizes positions and sets the stop loss from the technical signals"
    }

    fn inputs(&self) -> &[StateKey] {
        KEYS
    }

    fn dependencies(&self) -> &[StateKey] {
        KEYS
    }

    fn min_interval(&self) -> Duration {
        self.interval
    }

    async fn compute(&self, snapshot: &StateSnapshot, ctx: &StageContext) -> Outcome {
        let Some(analysis) = snapshot.technical_analysis() else {
            return Outcome::NotReady(KEYS.to_vec());
        };

        ctx.think("Assessing portfolio risk...");
        Outcome::Ready(Payload::RiskAssessment(RiskAssessment::from_signals(
            &analysis.signals,
        )))
    }
}
