//! Narrow interfaces to the collaborators the session machine does not own.
//!
//! Cue emitters play tones and vibrations; renderers draw. Both report
//! failures as [`PortError`], which the machine logs and otherwise ignores.

use serde::{Deserialize, Serialize};

use crate::error::PortError;
use crate::events::Event;

/// A sensory cue emitted at a defined moment of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cue {
    /// Start of every paced breath, and entry into inhaling/exhaling.
    Breath,
    /// Start of the breath-hold.
    RetentionStart,
}

/// Sine tone parameters for a cue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duration_ms: u64,
}

impl Cue {
    pub fn tone(self) -> Tone {
        match self {
            Cue::Breath => Tone {
                frequency_hz: 220,
                duration_ms: 200,
            },
            Cue::RetentionStart => Tone {
                frequency_hz: 150,
                duration_ms: 800,
            },
        }
    }

    /// Alternating on/off durations in milliseconds, starting with "on".
    pub fn vibration(self) -> &'static [u64] {
        match self {
            Cue::Breath => &[30],
            Cue::RetentionStart => &[200, 100, 200, 100, 400],
        }
    }
}

pub trait CueEmitter {
    /// Fire-and-forget. `volume` is the tone gain, always above zero.
    fn emit(&mut self, cue: Cue, volume: f64) -> Result<(), PortError>;
}

pub trait Renderer {
    fn render(&mut self, event: &Event) -> Result<(), PortError>;
}

/// Emits nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentCues;

impl CueEmitter for SilentCues {
    fn emit(&mut self, _cue: Cue, _volume: f64) -> Result<(), PortError> {
        Ok(())
    }
}

/// Draws nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&mut self, _event: &Event) -> Result<(), PortError> {
        Ok(())
    }
}
