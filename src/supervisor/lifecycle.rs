//! Agent lifecycle states and backoff schedule

use serde::{Deserialize, Serialize};

/// Agent lifecycle state
///
/// `Idle → Running ⇄ Degraded → Stopped`, plus `Running → Stopped` on an
/// explicit stop. `Stopped` is left only through `start()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Constructed, never started
    Idle,
    /// Ticking normally
    Running,
    /// Ticking, but the last tick failed
    Degraded,
    /// No further ticks until restarted
    Stopped,
}

impl LifecycleState {
    /// Tick loop should keep going
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Running | LifecycleState::Degraded)
    }

    pub fn can_start(&self) -> bool {
        matches!(self, LifecycleState::Idle | LifecycleState::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        *self == LifecycleState::Stopped
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Idle => write!(f, "Idle"),
            LifecycleState::Running => write!(f, "Running"),
            LifecycleState::Degraded => write!(f, "Degraded"),
            LifecycleState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Scheduling units to wait after the n-th consecutive failure:
/// `min(2^n, cap)`
pub fn backoff_units(consecutive_errors: u32, cap: u32) -> u32 {
    2u32.checked_pow(consecutive_errors)
        .map_or(cap, |units| units.min(cap))
}
