//! Trade execution gateways

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ExecutionMode, ExecutionReport, TradeAction};

/// Order submission. Failures come back as `ExecutionReport::Error`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    async fn execute_trade(&self, ticker: &str, action: TradeAction, quantity: u64)
        -> ExecutionReport;
}

/// Rejection shared by every gateway for non-order actions
pub(crate) fn reject_non_order(
    ticker: &str,
    action: TradeAction,
    quantity: u64,
    mode: ExecutionMode,
) -> Option<ExecutionReport> {
    let reason = if !action.is_order() {
        format!("{action} is not an order")
    } else if quantity == 0 {
        "quantity must be positive".to_string()
    } else {
        return None;
    };
    Some(ExecutionReport::Error {
        error: reason,
        ticker: ticker.to_string(),
        mode,
    })
}

/// In-memory paper account
#[derive(Default)]
pub struct PaperGateway {
    orders: RwLock<Vec<ExecutionReport>>,
}

impl PaperGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn orders(&self) -> Vec<ExecutionReport> {
        self.orders.read().await.clone()
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Paper
    }

    async fn execute_trade(
        &self,
        ticker: &str,
        action: TradeAction,
        quantity: u64,
    ) -> ExecutionReport {
        if let Some(rejected) = reject_non_order(ticker, action, quantity, self.mode()) {
            return rejected;
        }

        let report = ExecutionReport::Submitted {
            order_id: Uuid::new_v4().to_string(),
            ticker: ticker.to_string(),
            side: action,
            quantity,
            mode: self.mode(),
        };
        info!("[PAPER] {} {} x{}", action, ticker, quantity);
        self.orders.write().await.push(report.clone());
        report
    }
}
