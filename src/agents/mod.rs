//! Pipeline agents - staleness-gated stages
//!
//! Each agent implements `Agent`; the four pipeline roles are `Stage`s
//! wrapped in `StagedAgent`. Agents talk only through the bus.

pub mod analyze;
pub mod decide;
pub mod ingest;
pub mod risk;
pub mod staged;
pub mod state;
pub mod traits;

pub use analyze::AnalyzeStage;
pub use decide::DecideStage;
pub use ingest::IngestStage;
pub use risk::RiskStage;
pub use staged::{Stage, StageContext, StagedAgent};
pub use state::{Artifact, LocalState, Outcome, StateKey, StateSnapshot, TickOutcome};
pub use traits::Agent;

pub type IngestAgent = StagedAgent<IngestStage>;
pub type AnalyzeAgent = StagedAgent<AnalyzeStage>;
pub type RiskAgent = StagedAgent<RiskStage>;
pub type DecideAgent = StagedAgent<DecideStage>;
