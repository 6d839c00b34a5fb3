//! Trading system coordinator
//!
//! Owns the supervisors of the four pipeline agents and the trade executor,
//! all sharing one injected message bus.

pub mod system;

pub use system::{analyze_once, AnalysisReport, Collaborators, TradingSystem};
