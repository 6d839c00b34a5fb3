use serde::{Deserialize, Serialize};

/// Directional reading of a single indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Bullish => write!(f, "bullish"),
            Signal::Bearish => write!(f, "bearish"),
            Signal::Neutral => write!(f, "neutral"),
        }
    }
}

/// Bullish/bearish tally over a signal list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalTally {
    pub bullish: usize,
    pub bearish: usize,
    pub neutral: usize,
}

impl SignalTally {
    pub fn count(signals: &[Signal]) -> Self {
        signals.iter().fold(Self::default(), |mut tally, signal| {
            match signal {
                Signal::Bullish => tally.bullish += 1,
                Signal::Bearish => tally.bearish += 1,
                Signal::Neutral => tally.neutral += 1,
            }
            tally
        })
    }

    pub fn bullish_majority(&self) -> bool {
        self.bullish > self.bearish
    }

    pub fn bearish_majority(&self) -> bool {
        self.bearish > self.bullish
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    /// Whether the action results in an order
    pub fn is_order(&self) -> bool {
        !matches!(self, TradeAction::Hold)
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
            TradeAction::Hold => write!(f, "hold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally() {
        let tally = SignalTally::count(&[Signal::Bullish, Signal::Bullish, Signal::Neutral]);
        assert_eq!(tally.bullish, 2);
        assert_eq!(tally.bearish, 0);
        assert!(tally.bullish_majority());
        assert!(!tally.bearish_majority());
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&Signal::Bearish).unwrap(), "\"bearish\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"medium\"");
        assert_eq!(
            serde_json::from_str::<TradeAction>("\"hold\"").unwrap(),
            TradeAction::Hold
        );
    }
}
