use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{Phase, Rounds, RoundResult, Subtitle};

/// Everything a renderer needs to redraw after a state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub phase: Phase,
    pub round: u32,
    pub total_rounds: Rounds,
    pub breath_index: u32,
    pub breaths: u32,
    pub countdown: Option<u32>,
    pub subtitle: Option<Subtitle>,
    /// 0.0 ..= 1.0 across the whole session.
    pub progress: f64,
    pub is_running: bool,
    pub results: Vec<RoundResult>,
    pub at_ms: u64,
}

/// Every state change in the session produces an Event.
/// Renderers receive them in order; none of them feed back into the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Phase, counter, countdown or round changed.
    PhaseChanged(SessionSnapshot),
    /// A paced breath began; the bubble grows for `inhale_ms`.
    InhaleStarted {
        breath: u32,
        inhale_ms: u64,
        at_ms: u64,
    },
    /// The bubble shrinks for `exhale_ms`.
    ExhaleStarted {
        breath: u32,
        exhale_ms: u64,
        at_ms: u64,
    },
    /// Display refresh during the breath-hold.
    RetentionElapsed {
        elapsed_secs: u64,
        at_ms: u64,
    },
    /// A breath-hold was measured and stored.
    RetentionRecorded {
        result: RoundResult,
        at_ms: u64,
    },
    SessionCompleted {
        session_id: Uuid,
        results: Vec<RoundResult>,
        average_secs: Option<u64>,
        at_ms: u64,
    },
    /// Idle preview animation on the config screen.
    PreviewInhale {
        count: u32,
        inhale_ms: u64,
        at_ms: u64,
    },
    PreviewExhale {
        count: u32,
        exhale_ms: u64,
        at_ms: u64,
    },
    PreviewStopped {
        at_ms: u64,
    },
}

impl Event {
    pub fn at_ms(&self) -> u64 {
        match self {
            Event::PhaseChanged(snapshot) => snapshot.at_ms,
            Event::InhaleStarted { at_ms, .. }
            | Event::ExhaleStarted { at_ms, .. }
            | Event::RetentionElapsed { at_ms, .. }
            | Event::RetentionRecorded { at_ms, .. }
            | Event::SessionCompleted { at_ms, .. }
            | Event::PreviewInhale { at_ms, .. }
            | Event::PreviewExhale { at_ms, .. }
            | Event::PreviewStopped { at_ms } => *at_ms,
        }
    }
}
