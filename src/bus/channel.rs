//! Fixed channel registry

use serde::{Deserialize, Serialize};

/// A subscribable channel. The registry is closed: these five are the only
/// mailboxes on the bus. `user` and `system` appear as sender values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ingest,
    Analyze,
    Risk,
    Decide,
    Ui,
}

/// Sender id used for messages originating from remote users
pub const USER_SENDER: &str = "user";
/// Sender id used for system-level notices
pub const SYSTEM_SENDER: &str = "system";

const ROLE_SUFFIXES: &[&str] = &["_agent", "-agent", " agent"];

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Ingest,
        Channel::Analyze,
        Channel::Risk,
        Channel::Decide,
        Channel::Ui,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ingest => "ingest",
            Channel::Analyze => "analyze",
            Channel::Risk => "risk",
            Channel::Decide => "decide",
            Channel::Ui => "ui",
        }
    }

    /// Case-fold, strip a role suffix, resolve aliases, then look the name
    /// up in the registry.
    pub fn normalize(name: &str) -> Option<Channel> {
        let mut folded = name.trim().to_ascii_lowercase();
        for suffix in ROLE_SUFFIXES {
            if let Some(stripped) = folded.strip_suffix(suffix) {
                folded = stripped.to_string();
                break;
            }
        }

        match folded.as_str() {
            "ingest" | "market_data" | "market" => Some(Channel::Ingest),
            "analyze" | "quantitative" | "quant" | "technical" => Some(Channel::Analyze),
            "risk" | "risk_management" => Some(Channel::Risk),
            "decide" | "portfolio_management" | "portfolio" => Some(Channel::Decide),
            "ui" => Some(Channel::Ui),
            _ => None,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = crate::error::HedgeflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::normalize(s)
            .ok_or_else(|| crate::error::HedgeflowError::UnknownChannel(s.to_string()))
    }
}
