//! Pipeline artifacts: the content bodies exchanged between stages

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::{PriceSeries, RiskLevel, Signal, SignalTally, TradeAction};
use crate::indicators::IndicatorSnapshot;

/// Fixed stop-loss applied to every assessment (2%)
pub const STOP_LOSS: Decimal = dec!(0.02);

/// `market_data` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    #[serde(default)]
    pub ticker: Option<String>,
    pub prices: PriceSeries,
    #[serde(default = "Utc::now")]
    pub fetched_at: DateTime<Utc>,
}

impl MarketSnapshot {
    pub fn new(ticker: impl Into<String>, prices: PriceSeries) -> Self {
        Self {
            ticker: Some(ticker.into()),
            prices,
            fetched_at: Utc::now(),
        }
    }
}

/// `technical_analysis` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAnalysis {
    pub signals: Vec<Signal>,
    pub indicators: IndicatorSnapshot,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default = "Utc::now")]
    pub computed_at: DateTime<Utc>,
}

impl TechnicalAnalysis {
    pub fn from_indicators(indicators: IndicatorSnapshot) -> Self {
        Self {
            signals: indicators.signals(),
            indicators,
            ticker: None,
            computed_at: Utc::now(),
        }
    }

    pub fn with_ticker(mut self, ticker: Option<String>) -> Self {
        self.ticker = ticker;
        self
    }

    pub fn tally(&self) -> SignalTally {
        SignalTally::count(&self.signals)
    }
}

/// `risk_assessment` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    /// Fraction of the portfolio allowed in one position
    pub max_position_size: Decimal,
    pub stop_loss: Decimal,
    #[serde(default = "Utc::now")]
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// More bearish: high risk, 5%. More bullish: low risk, 15%. Tie: medium, 10%.
    pub fn from_signals(signals: &[Signal]) -> Self {
        let tally = SignalTally::count(signals);
        let (risk_level, max_position_size) = if tally.bearish_majority() {
            (RiskLevel::High, dec!(0.05))
        } else if tally.bullish_majority() {
            (RiskLevel::Low, dec!(0.15))
        } else {
            (RiskLevel::Medium, dec!(0.10))
        };

        Self {
            risk_level,
            max_position_size,
            stop_loss: STOP_LOSS,
            assessed_at: Utc::now(),
        }
    }
}

/// `trading_decision` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingDecision {
    pub action: TradeAction,
    pub reason: String,
    pub max_position_size: Decimal,
    pub stop_loss: Decimal,
    #[serde(default)]
    pub ticker: Option<String>,
    #[serde(default = "Utc::now")]
    pub decided_at: DateTime<Utc>,
}

impl TradingDecision {
    /// Buy on a bullish majority unless risk is high; sell on a bearish
    /// majority or high risk; hold otherwise.
    pub fn decide(analysis: &TechnicalAnalysis, risk: &RiskAssessment) -> Self {
        let tally = analysis.tally();
        let (action, reason) = if tally.bullish_majority() && risk.risk_level != RiskLevel::High {
            (TradeAction::Buy, "Bullish signals with acceptable risk")
        } else if tally.bearish_majority() || risk.risk_level == RiskLevel::High {
            (TradeAction::Sell, "Bearish signals or high risk")
        } else {
            (TradeAction::Hold, "Mixed signals or neutral risk")
        };

        Self {
            action,
            reason: reason.to_string(),
            max_position_size: risk.max_position_size,
            stop_loss: risk.stop_loss,
            ticker: analysis.ticker.clone(),
            decided_at: Utc::now(),
        }
    }
}

/// Account the gateway trades against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Paper,
    Live,
}

impl ExecutionMode {
    pub fn from_paper_flag(paper: bool) -> Self {
        if paper {
            ExecutionMode::Paper
        } else {
            ExecutionMode::Live
        }
    }
}

/// Outcome of a trade request; `trade_execution` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ExecutionReport {
    Submitted {
        order_id: String,
        ticker: String,
        side: TradeAction,
        quantity: u64,
        mode: ExecutionMode,
    },
    Error {
        error: String,
        ticker: String,
        mode: ExecutionMode,
    },
}

impl ExecutionReport {
    pub fn is_submitted(&self) -> bool {
        matches!(self, ExecutionReport::Submitted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::BollingerBands;

    fn analysis(signals: Vec<Signal>) -> TechnicalAnalysis {
        TechnicalAnalysis {
            signals,
            indicators: IndicatorSnapshot {
                close: 100.0,
                macd: 0.0,
                macd_signal: 0.0,
                rsi: 50.0,
                bollinger: BollingerBands {
                    upper: 101.0,
                    middle: 100.0,
                    lower: 99.0,
                },
                bollinger_position: 0.0,
                obv: 0.0,
            },
            ticker: Some("AAPL".into()),
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn test_risk_scoring() {
        use Signal::*;
        let high = RiskAssessment::from_signals(&[Bearish, Bearish, Bullish]);
        assert_eq!(high.risk_level, RiskLevel::High);
        assert_eq!(high.max_position_size, dec!(0.05));

        let low = RiskAssessment::from_signals(&[Bullish, Neutral, Neutral]);
        assert_eq!(low.risk_level, RiskLevel::Low);
        assert_eq!(low.max_position_size, dec!(0.15));

        let medium = RiskAssessment::from_signals(&[Bullish, Bearish, Neutral]);
        assert_eq!(medium.risk_level, RiskLevel::Medium);
        assert_eq!(medium.max_position_size, dec!(0.10));
        assert_eq!(medium.stop_loss, dec!(0.02));
    }

    #[test]
    fn test_buy_on_bullish_majority_with_low_risk() {
        use Signal::*;
        let ta = analysis(vec![Bullish, Bullish, Neutral]);
        let risk = RiskAssessment::from_signals(&ta.signals);
        assert_eq!(risk.risk_level, RiskLevel::Low);

        let decision = TradingDecision::decide(&ta, &risk);
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.max_position_size, dec!(0.15));
        assert_eq!(decision.stop_loss, dec!(0.02));
    }

    #[test]
    fn test_high_risk_overrides_bullish_signals() {
        use Signal::*;
        let ta = analysis(vec![Bullish, Bullish, Neutral]);
        let risk = RiskAssessment::from_signals(&[Bearish, Bearish, Neutral]);
        assert_eq!(TradingDecision::decide(&ta, &risk).action, TradeAction::Sell);
    }

    #[test]
    fn test_hold_on_tie_with_medium_risk() {
        use Signal::*;
        let ta = analysis(vec![Bullish, Bearish, Neutral]);
        let risk = RiskAssessment::from_signals(&ta.signals);
        assert_eq!(TradingDecision::decide(&ta, &risk).action, TradeAction::Hold);
    }

    #[test]
    fn test_execution_report_wire_shape() {
        let report = ExecutionReport::Error {
            error: "insufficient buying power".into(),
            ticker: "AAPL".into(),
            mode: ExecutionMode::Paper,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["mode"], "paper");
        assert!(!report.is_submitted());
    }

    #[test]
    fn test_market_snapshot_minimal_body() {
        let snapshot: MarketSnapshot = serde_json::from_value(serde_json::json!({
            "prices": []
        }))
        .unwrap();
        assert!(snapshot.ticker.is_none());
        assert!(snapshot.prices.is_empty());
    }
}
