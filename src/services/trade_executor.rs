//! Trade executor service
//!
//! Listens on the `decide` channel and turns buy/sell decisions into orders:
//! - Skips hold decisions and everything while execution is disabled
//! - Submits the configured quantity through the gateway
//! - Publishes a private `trade_execution` report for the UI

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::adapters::ExecutionGateway;
use crate::bus::{Channel, Message, MessageBus, Payload, Subscriber, SYSTEM_SENDER};
use crate::config::ExecutionConfig;
use crate::domain::{ExecutionReport, TradingDecision};
use crate::error::Result;

/// Execution statistics
#[derive(Debug, Clone, Default)]
pub struct ExecutorStats {
    pub decisions_seen: u64,
    pub orders_submitted: u64,
    pub orders_failed: u64,
}

pub struct TradeExecutor {
    gateway: Arc<dyn ExecutionGateway>,
    bus: Arc<MessageBus>,
    config: ExecutionConfig,
    default_ticker: String,
    stats: RwLock<ExecutorStats>,
}

impl TradeExecutor {
    pub fn new(
        gateway: Arc<dyn ExecutionGateway>,
        bus: Arc<MessageBus>,
        config: ExecutionConfig,
        default_ticker: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            bus,
            config,
            default_ticker: default_ticker.into(),
            stats: RwLock::new(ExecutorStats::default()),
        }
    }

    /// Register on the `decide` channel
    pub async fn attach(self: &Arc<Self>) {
        self.bus
            .subscribe_channel(Channel::Decide, Arc::clone(self) as Arc<dyn Subscriber>)
            .await;
    }

    pub async fn stats(&self) -> ExecutorStats {
        self.stats.read().await.clone()
    }

    /// Execute one decision. Returns the report when an order was attempted.
    pub async fn on_decision(&self, decision: &TradingDecision) -> Option<ExecutionReport> {
        self.stats.write().await.decisions_seen += 1;

        if !self.config.enabled {
            debug!("Execution disabled, ignoring {} decision", decision.action);
            return None;
        }
        if !decision.action.is_order() {
            return None;
        }

        let ticker = decision.ticker.as_deref().unwrap_or(&self.default_ticker);
        let report = self
            .gateway
            .execute_trade(ticker, decision.action, self.config.quantity)
            .await;

        {
            let mut stats = self.stats.write().await;
            if report.is_submitted() {
                stats.orders_submitted += 1;
                info!("Submitted {} {} x{}", decision.action, ticker, self.config.quantity);
            } else {
                stats.orders_failed += 1;
                warn!("Order {} {} failed: {:?}", decision.action, ticker, report);
            }
        }

        self.bus.publish(
            SYSTEM_SENDER,
            Payload::TradeExecution(report.clone()),
            true,
        );
        Some(report)
    }
}

#[async_trait]
impl Subscriber for TradeExecutor {
    fn name(&self) -> &str {
        "trade-executor"
    }

    async fn deliver(&self, message: Arc<Message>) -> Result<()> {
        if let Payload::TradingDecision(decision) = &message.payload {
            self.on_decision(decision).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::execution::MockExecutionGateway;
    use crate::domain::{ExecutionMode, RiskAssessment, TradeAction};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn decision(action: TradeAction) -> TradingDecision {
        let risk = RiskAssessment::from_signals(&[]);
        TradingDecision {
            action,
            reason: "test".into(),
            max_position_size: risk.max_position_size,
            stop_loss: dec!(0.02),
            ticker: Some("NVDA".into()),
            decided_at: Utc::now(),
        }
    }

    fn enabled() -> ExecutionConfig {
        ExecutionConfig {
            enabled: true,
            paper: true,
            quantity: 2,
        }
    }

    #[tokio::test]
    async fn test_buy_is_submitted_with_configured_quantity() {
        let mut gateway = MockExecutionGateway::new();
        gateway
            .expect_execute_trade()
            .withf(|ticker, action, qty| {
                ticker == "NVDA" && *action == TradeAction::Buy && *qty == 2
            })
            .times(1)
            .returning(|ticker, action, quantity| ExecutionReport::Submitted {
                order_id: "abc".into(),
                ticker: ticker.to_string(),
                side: action,
                quantity,
                mode: ExecutionMode::Paper,
            });

        let executor = TradeExecutor::new(
            Arc::new(gateway),
            Arc::new(MessageBus::default()),
            enabled(),
            "AAPL",
        );
        let report = executor.on_decision(&decision(TradeAction::Buy)).await.unwrap();

        assert!(report.is_submitted());
        let stats = executor.stats().await;
        assert_eq!(stats.orders_submitted, 1);
        assert_eq!(stats.decisions_seen, 1);
    }

    #[tokio::test]
    async fn test_hold_and_disabled_are_skipped() {
        let mut gateway = MockExecutionGateway::new();
        gateway.expect_execute_trade().times(0);
        let gateway = Arc::new(gateway);
        let bus = Arc::new(MessageBus::default());

        let executor = TradeExecutor::new(gateway.clone(), Arc::clone(&bus), enabled(), "AAPL");
        assert!(executor.on_decision(&decision(TradeAction::Hold)).await.is_none());

        let disabled = TradeExecutor::new(gateway, bus, ExecutionConfig::default(), "AAPL");
        assert!(disabled.on_decision(&decision(TradeAction::Sell)).await.is_none());
    }
}
