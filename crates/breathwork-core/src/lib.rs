//! # Breathwork Core Library
//!
//! Core logic for a guided breath-work session timer: paced breathing,
//! a user-timed breath hold, and a short recovery sequence, repeated for a
//! number of rounds. The CLI and any GUI are thin layers over this crate.
//!
//! ## Architecture
//!
//! - **Session machine**: an explicit state machine driven through a single
//!   [`SessionMachine::transition`] entry point
//! - **Timing engine**: a scoped [`Scheduler`] that the host drains with
//!   [`SessionMachine::run_due`]; closing a phase cancels everything it owns
//! - **Ports**: cue playback and rendering are reached through the
//!   [`CueEmitter`] and [`Renderer`] traits
//! - **Storage**: TOML configuration and SQLite result history
//!
//! ## Example
//!
//! ```
//! use breathwork_core::{
//!     ManualClock, NoopRenderer, Phase, SessionMachine, SessionSettings, SilentCues,
//! };
//!
//! let clock = ManualClock::new(0);
//! let mut machine = SessionMachine::new(
//!     clock.clone(),
//!     SessionSettings::default(),
//!     SilentCues,
//!     NoopRenderer,
//! );
//! machine.start();
//! assert_eq!(machine.phase(), Phase::Breathing);
//!
//! clock.advance_ms(500);
//! machine.run_due();
//! assert_eq!(machine.session().breath_index, 1);
//! ```

pub mod error;
pub mod events;
pub mod ports;
pub mod session;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod timer;

pub use error::{ConfigError, CoreError, DatabaseError, PortError};
pub use events::{Event, SessionSnapshot};
pub use ports::{Cue, CueEmitter, NoopRenderer, Renderer, SilentCues, Tone};
pub use session::{
    Phase, RoundResult, Rounds, Session, SessionEvent, SessionMachine, SessionSettings,
    SettingsSource, Subtitle,
};
pub use storage::{Config, Database, HistoryStats, SessionRecord};
pub use timer::{Clock, ManualClock, Scheduler, ScopeId, Speed, SpeedProfile, SystemClock, TimerId};
