//! Agent local state with per-key dirty markers
//!
//! Every absorbed artifact bumps a revision counter and records that revision
//! as the key's dirty marker. A computation clears only the markers it
//! actually consumed (revision <= snapshot revision), so an update that lands
//! while a compute is in flight still forces the next recompute.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::bus::Payload;
use crate::domain::{MarketSnapshot, RiskAssessment, TechnicalAnalysis};
use crate::error::HedgeflowError;

/// Local state key. One per artifact kind an agent can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Prices,
    TechnicalAnalysis,
    RiskAssessment,
    Ticker,
}

impl StateKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Prices => "prices",
            StateKey::TechnicalAnalysis => "technical_analysis",
            StateKey::RiskAssessment => "risk_assessment",
            StateKey::Ticker => "ticker",
        }
    }
}

impl std::fmt::Display for StateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last-known value stored under a `StateKey`
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Prices(MarketSnapshot),
    TechnicalAnalysis(TechnicalAnalysis),
    RiskAssessment(RiskAssessment),
    Ticker(String),
}

impl Artifact {
    pub fn key(&self) -> StateKey {
        match self {
            Artifact::Prices(_) => StateKey::Prices,
            Artifact::TechnicalAnalysis(_) => StateKey::TechnicalAnalysis,
            Artifact::RiskAssessment(_) => StateKey::RiskAssessment,
            Artifact::Ticker(_) => StateKey::Ticker,
        }
    }

    /// Map a pipeline payload to the artifact it carries
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        match payload {
            Payload::MarketData(snapshot) => Some(Artifact::Prices(snapshot.clone())),
            Payload::TechnicalAnalysis(ta) => Some(Artifact::TechnicalAnalysis(ta.clone())),
            Payload::RiskAssessment(risk) => Some(Artifact::RiskAssessment(risk.clone())),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Artifact::Prices(s) => format!(
                "{} bars for {}, last close {:.2}",
                s.prices.len(),
                s.ticker.as_deref().unwrap_or("?"),
                s.prices.last_close().unwrap_or(0.0)
            ),
            Artifact::TechnicalAnalysis(ta) => {
                let signals: Vec<String> = ta.signals.iter().map(|s| s.to_string()).collect();
                format!("signals [{}], rsi {:.1}", signals.join(", "), ta.indicators.rsi)
            }
            Artifact::RiskAssessment(r) => format!(
                "{} risk, max position {}, stop loss {}",
                r.risk_level, r.max_position_size, r.stop_loss
            ),
            Artifact::Ticker(t) => t.clone(),
        }
    }
}

/// Immutable copy of local state taken for one computation
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    entries: HashMap<StateKey, Artifact>,
    revision: u64,
}

impl StateSnapshot {
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, key: StateKey) -> Option<&Artifact> {
        self.entries.get(&key)
    }

    pub fn prices(&self) -> Option<&MarketSnapshot> {
        match self.entries.get(&StateKey::Prices) {
            Some(Artifact::Prices(s)) => Some(s),
            _ => None,
        }
    }

    pub fn technical_analysis(&self) -> Option<&TechnicalAnalysis> {
        match self.entries.get(&StateKey::TechnicalAnalysis) {
            Some(Artifact::TechnicalAnalysis(ta)) => Some(ta),
            _ => None,
        }
    }

    pub fn risk_assessment(&self) -> Option<&RiskAssessment> {
        match self.entries.get(&StateKey::RiskAssessment) {
            Some(Artifact::RiskAssessment(r)) => Some(r),
            _ => None,
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        match self.entries.get(&StateKey::Ticker) {
            Some(Artifact::Ticker(t)) => Some(t),
            _ => None,
        }
    }
}

/// Agent-owned state bucket. Only the owning agent's tasks touch it.
#[derive(Debug, Default)]
pub struct LocalState {
    entries: HashMap<StateKey, Artifact>,
    dirty: HashMap<StateKey, u64>,
    revision: u64,
    last_computed: Option<Instant>,
}

impl LocalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an artifact and mark its key dirty
    pub fn absorb(&mut self, artifact: Artifact) {
        self.revision += 1;
        let key = artifact.key();
        self.entries.insert(key, artifact);
        self.dirty.insert(key, self.revision);
    }

    /// Store an artifact without touching dirty markers
    pub fn store(&mut self, artifact: Artifact) {
        self.entries.insert(artifact.key(), artifact);
    }

    pub fn get(&self, key: StateKey) -> Option<&Artifact> {
        self.entries.get(&key)
    }

    pub fn contains(&self, key: StateKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared keys with no value yet
    pub fn missing(&self, keys: &[StateKey]) -> Vec<StateKey> {
        keys.iter().copied().filter(|k| !self.contains(*k)).collect()
    }

    pub fn is_dirty(&self, key: StateKey) -> bool {
        self.dirty.contains_key(&key)
    }

    pub fn any_dirty(&self, keys: &[StateKey]) -> bool {
        keys.iter().any(|k| self.is_dirty(*k))
    }

    /// True when no computation happened yet or `interval` has elapsed
    pub fn interval_elapsed(&self, now: Instant, interval: Duration) -> bool {
        match self.last_computed {
            None => true,
            Some(at) => now.saturating_duration_since(at) >= interval,
        }
    }

    pub fn last_computed(&self) -> Option<Instant> {
        self.last_computed
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            entries: self.entries.clone(),
            revision: self.revision,
        }
    }

    /// Record a finished computation over a snapshot taken at `revision`
    pub fn mark_computed(&mut self, now: Instant, revision: u64, consumed: &[StateKey]) {
        self.last_computed = Some(now);
        for key in consumed {
            if self.dirty.get(key).is_some_and(|rev| *rev <= revision) {
                self.dirty.remove(key);
            }
        }
    }

    /// One line per stored key, for chat prompts
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "no data yet".to_string();
        }
        let mut keys: Vec<&StateKey> = self.entries.keys().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|k| self.entries.get(k).map(|a| format!("{}: {}", k, a.describe())))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of one compute step
#[derive(Debug)]
pub enum Outcome {
    /// Artifact to publish
    Ready(Payload),
    /// Required inputs are absent; not a failure
    NotReady(Vec<StateKey>),
    Failed(HedgeflowError),
}

/// What a tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Published an artifact of the given type
    Published(&'static str),
    /// A declared dependency has no value yet
    NotReady(Vec<StateKey>),
    /// Interval not elapsed and nothing dirty
    UpToDate,
}

impl TickOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, TickOutcome::Published(_))
    }
}
