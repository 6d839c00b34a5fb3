pub mod trade_executor;

pub use trade_executor::{ExecutorStats, TradeExecutor};
