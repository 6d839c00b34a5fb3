//! Analyze stage: indicator signals from the latest price series

use async_trait::async_trait;
use std::time::Duration;

use super::staged::{Stage, StageContext};
use super::state::{Outcome, StateKey, StateSnapshot};
use crate::bus::{Channel, Payload};
use crate::domain::TechnicalAnalysis;
use crate::indicators::IndicatorSnapshot;

const KEYS: &[StateKey] = &[StateKey::Prices];

pub struct AnalyzeStage {
    interval: Duration,
}

impl AnalyzeStage {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl Stage for AnalyzeStage {
    fn name(&self) -> &str {
        "Analyze"
    }

    fn channel(&self) -> Channel {
        Channel::Analyze
    }

    fn role(&self) -> &str {
        "computes MACD, RSI and Bollinger band signals from price history"
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
        let Some(market) = snapshot.prices() else {
            return Outcome::NotReady(KEYS.to_vec());
        };

        ctx.think("Analyzing technical indicators...");
        match IndicatorSnapshot::compute(&market.prices) {
            Ok(indicators) => {
                let analysis = TechnicalAnalysis::from_indicators(indicators)
                    .with_ticker(market.ticker.clone());
                Outcome::Ready(Payload::TechnicalAnalysis(analysis))
            }
            Err(e) => Outcome::Failed(e),
        }
    }
}
