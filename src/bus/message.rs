//! Message envelope and typed payloads
//!
//! On the wire a message is `{sender, type, content, timestamp, private}`.
//! `type` and `content` come from the adjacently tagged `Payload`, so the
//! schema of `content` is fixed per tag and checked when a message is built.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    ExecutionReport, MarketSnapshot, RiskAssessment, TechnicalAnalysis, TradingDecision,
};
use crate::error::{HedgeflowError, Result};

/// Diagnostic severity, escalating with consecutive failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// 1 → info, 2 → warning, 3+ → critical
    pub fn for_consecutive_errors(count: u32) -> Self {
        match count {
            0 | 1 => Severity::Info,
            2 => Severity::Warning,
            _ => Severity::Critical,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusReport {
    pub agent: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub agent: String,
    pub severity: Severity,
    pub consecutive_errors: u32,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    /// Target agent or channel name; every agent answers when absent
    #[serde(default)]
    pub agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub agent: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub running: bool,
}

/// Typed message body, one variant per `type` tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Payload {
    MarketData(MarketSnapshot),
    TechnicalAnalysis(TechnicalAnalysis),
    RiskAssessment(RiskAssessment),
    TradingDecision(TradingDecision),
    AgentStatus(AgentStatusReport),
    AgentThought(String),
    Diagnostic(Diagnostic),
    /// Free-form input from a remote user
    UserMessage(Value),
    Chat(ChatRequest),
    AgentMessage(AgentReply),
    TradeExecution(ExecutionReport),
    SystemStatus(SystemStatus),
}

impl Payload {
    /// Build a payload from an untyped `(type, content)` pair, validating the
    /// content against the schema for that tag.
    pub fn from_parts(kind: &str, content: Value) -> Result<Self> {
        serde_json::from_value(serde_json::json!({ "type": kind, "content": content }))
            .map_err(|e| HedgeflowError::InvalidMessage(format!("{kind}: {e}")))
    }

    /// Wire tag of this payload
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::MarketData(_) => "market_data",
            Payload::TechnicalAnalysis(_) => "technical_analysis",
            Payload::RiskAssessment(_) => "risk_assessment",
            Payload::TradingDecision(_) => "trading_decision",
            Payload::AgentStatus(_) => "agent_status",
            Payload::AgentThought(_) => "agent_thought",
            Payload::Diagnostic(_) => "diagnostic",
            Payload::UserMessage(_) => "user_message",
            Payload::Chat(_) => "chat",
            Payload::AgentMessage(_) => "agent_message",
            Payload::TradeExecution(_) => "trade_execution",
            Payload::SystemStatus(_) => "system_status",
        }
    }
}

/// Immutable bus envelope. Shared between recipients as `Arc<Message>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    #[serde(flatten)]
    pub payload: Payload,
    pub timestamp: DateTime<Utc>,
    pub private: bool,
}

impl Message {
    pub fn new(sender: impl Into<String>, payload: Payload, private: bool) -> Self {
        Self::at(sender, payload, private, Utc::now())
    }

    pub fn at(
        sender: impl Into<String>,
        payload: Payload,
        private: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sender: sender.into(),
            payload,
            timestamp,
            private,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
