//! Ingest stage: fetches daily prices on its own timer
//!
//! Users switch the ticker with a `user_message` carrying `{"ticker": ..}`;
//! the new ticker is dirty, so the next tick refetches immediately.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::staged::{Stage, StageContext};
use super::state::{Artifact, Outcome, StateKey, StateSnapshot};
use crate::adapters::MarketDataProvider;
use crate::bus::{Channel, Payload};
use crate::config::PipelineConfig;
use crate::domain::MarketSnapshot;

pub struct IngestStage {
    provider: Arc<dyn MarketDataProvider>,
    pipeline: PipelineConfig,
}

impl IngestStage {
    pub fn new(provider: Arc<dyn MarketDataProvider>, pipeline: PipelineConfig) -> Self {
        Self { provider, pipeline }
    }

    fn ticker_from(content: &serde_json::Value) -> Option<String> {
        let ticker = content.get("ticker")?.as_str()?.trim();
        if ticker.is_empty() {
            None
        } else {
            Some(ticker.to_ascii_uppercase())
        }
    }
}

#[async_trait]
impl Stage for IngestStage {
    fn name(&self) -> &str {
        "Ingest"
    }

    fn channel(&self) -> Channel {
        Channel::Ingest
    }

    fn role(&self) -> &str {
        "fetches daily market prices for the tracked ticker"
    }

    fn inputs(&self) -> &[StateKey] {
        &[StateKey::Ticker]
    }

    fn dependencies(&self) -> &[StateKey] {
        &[]
    }

    fn min_interval(&self) -> Duration {
        Duration::from_secs(self.pipeline.ingest_interval_secs)
    }

    fn absorb(&self, payload: &Payload) -> Option<Artifact> {
        match payload {
            Payload::UserMessage(content) => Self::ticker_from(content).map(Artifact::Ticker),
            _ => None,
        }
    }

    async fn compute(&self, snapshot: &StateSnapshot, ctx: &StageContext) -> Outcome {
        let ticker = snapshot.ticker().unwrap_or(&self.pipeline.ticker).to_string();
        let (start, end) = self.pipeline.date_window(Utc::now().date_naive());

        ctx.think(format!("Fetching market data for {ticker}..."));
        match self.provider.get_prices(&ticker, start, end).await {
            Ok(prices) => {
                ctx.think(format!(
                    "Received {} daily bars for {} ({} to {})",
                    prices.len(),
                    ticker,
                    start,
                    end
                ));
                Outcome::Ready(Payload::MarketData(MarketSnapshot::new(ticker, prices)))
            }
            Err(e) => {
                warn!(agent = "Ingest", "Price fetch for {} failed: {}", ticker, e);
                ctx.think(format!("Error fetching market data: {e}"));
                Outcome::Failed(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::market_data::MockMarketDataProvider;
    use crate::adapters::SyntheticMarketData;
    use crate::agents::{Agent, StagedAgent, TickOutcome};
    use crate::bus::{Message, MessageBus};
    use crate::error::HedgeflowError;
    use chrono::NaiveDate;
    use serde_json::json;

    fn series(ticker: &str) -> crate::domain::PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        SyntheticMarketData::new(1).generate(ticker, start, end)
    }

    #[test]
    fn test_ticker_extraction() {
        assert_eq!(
            IngestStage::ticker_from(&json!({ "ticker": " msft " })),
            Some("MSFT".to_string())
        );
        assert_eq!(IngestStage::ticker_from(&json!({ "ticker": "" })), None);
        assert_eq!(IngestStage::ticker_from(&json!("MSFT")), None);
        assert_eq!(IngestStage::ticker_from(&json!({ "symbol": "MSFT" })), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_change_forces_refetch() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_get_prices()
            .withf(|ticker, _, _| ticker == "AAPL")
            .times(1)
            .returning(|ticker, _, _| Ok(series(ticker)));
        provider
            .expect_get_prices()
            .withf(|ticker, _, _| ticker == "MSFT")
            .times(1)
            .returning(|ticker, _, _| Ok(series(ticker)));

        let bus = Arc::new(MessageBus::default());
        let agent = StagedAgent::new(
            IngestStage::new(Arc::new(provider), PipelineConfig::default()),
            Arc::clone(&bus),
        );

        assert!(agent.process().await.unwrap().is_published());
        assert_eq!(agent.process().await.unwrap(), TickOutcome::UpToDate);

        let switch = Message::new(
            "user",
            Payload::UserMessage(json!({ "ticker": "msft" })),
            false,
        );
        agent.handle_message(&switch).await.unwrap();
        assert!(agent.process().await.unwrap().is_published());
        assert_eq!(agent.process().await.unwrap(), TickOutcome::UpToDate);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_tick_error() {
        let mut provider = MockMarketDataProvider::new();
        provider
            .expect_get_prices()
            .returning(|ticker, _, _| Err(HedgeflowError::DataUnavailable(ticker.to_string())));

        let agent = StagedAgent::new(
            IngestStage::new(Arc::new(provider), PipelineConfig::default()),
            Arc::new(MessageBus::default()),
        );

        let err = agent.process().await.unwrap_err();
        assert!(matches!(err, HedgeflowError::DataUnavailable(t) if t == "AAPL"));
    }
}
