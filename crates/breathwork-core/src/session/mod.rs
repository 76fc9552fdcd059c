//! Breath-work session: phases, counters and collected results.
//!
//! ## Phases
//!
//! ```text
//! Config -> Breathing -> Retention -> Inhaling -> Recovery -> Exhaling
//!              ^                                                 |
//!              +------------------ next round -------------------+
//!                                                                |
//!                                                      Results <-+
//! ```
//!
//! [`SessionMachine`] owns the live [`Session`] and is the only thing that
//! mutates it.

mod machine;
mod preview;
pub mod progress;
pub mod results;
mod settings;

pub use machine::{SessionEvent, SessionMachine, SessionTimer, NEXT_ROUND_DELAY_MS, SETTLE_DELAY_MS};
pub use preview::PreviewStep;
pub use settings::{
    Rounds, SessionSettings, SettingsSource, MAX_BREATHS, MAX_FINITE_ROUNDS, MAX_VOLUME,
    MIN_BREATHS,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Idle; nothing started.
    #[default]
    Config,
    Breathing,
    Retention,
    Inhaling,
    Recovery,
    Exhaling,
    /// Finished with at least one recorded retention.
    Results,
}

impl Phase {
    /// True for every phase between start and results.
    pub fn is_active(self) -> bool {
        !matches!(self, Phase::Config | Phase::Results)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Config => "config",
            Phase::Breathing => "breathing",
            Phase::Retention => "retention",
            Phase::Inhaling => "inhaling",
            Phase::Recovery => "recovery",
            Phase::Exhaling => "exhaling",
            Phase::Results => "results",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prompt shown under the counter during the recovery sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subtitle {
    TimeToInhale,
    TimeToExhale,
}

/// One completed breath-hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: u32,
    pub retention_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub current_round: u32,
    pub breath_index: u32,
    pub phase: Phase,
    pub is_running: bool,
    pub results: Vec<RoundResult>,
    /// Epoch milliseconds; only set while in `Retention`.
    pub retention_started_at: Option<u64>,
    /// Whole seconds left in the current recovery countdown.
    pub countdown: Option<u32>,
    pub subtitle: Option<Subtitle>,
    /// A round just completed and the next one has not begun breathing yet.
    pub awaiting_next_round: bool,
    /// Epoch milliseconds when `start` was accepted.
    pub started_at: Option<u64>,
}

impl Session {
    /// The idle session shown on the config screen.
    pub fn idle() -> Self {
        Self {
            id: Uuid::new_v4(),
            current_round: 1,
            breath_index: 0,
            phase: Phase::Config,
            is_running: false,
            results: Vec::new(),
            retention_started_at: None,
            countdown: None,
            subtitle: None,
            awaiting_next_round: false,
            started_at: None,
        }
    }

    /// A fresh running session at round 1, about to breathe.
    pub fn started(now_ms: u64) -> Self {
        Self {
            phase: Phase::Breathing,
            is_running: true,
            started_at: Some(now_ms),
            ..Self::idle()
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::idle()
    }
}
