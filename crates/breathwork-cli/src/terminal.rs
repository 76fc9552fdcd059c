//! Terminal implementations of the session ports.

use std::io::Write;

use breathwork_core::session::results::format_time;
use breathwork_core::{Cue, CueEmitter, Event, Phase, PortError, Renderer, SessionSnapshot, Subtitle};

/// Rings the terminal bell once per "on" pulse of the cue's vibration
/// pattern.
///
/// A terminal bell has no pitch or gain, so the tone and volume are only
/// logged.
#[derive(Debug, Default)]
pub struct TerminalBell;

fn bells(cue: Cue) -> String {
    cue.vibration().iter().step_by(2).map(|_| '\x07').collect()
}

impl CueEmitter for TerminalBell {
    fn emit(&mut self, cue: Cue, volume: f64) -> Result<(), PortError> {
        let tone = cue.tone();
        tracing::trace!(?cue, hz = tone.frequency_hz, ms = tone.duration_ms, volume, "cue");
        let mut out = std::io::stderr();
        out.write_all(bells(cue).as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| PortError::Cue(e.to_string()))
    }
}

/// Prints one line per meaningful change.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    last: Option<(Phase, u32, u32, Option<u32>)>,
    last_elapsed: Option<u64>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, event: &Event) -> Option<String> {
        match event {
            Event::PhaseChanged(s) => Some(describe(s)),
            Event::RetentionRecorded { result, .. } => Some(format!(
                "  round {} hold: {}",
                result.round,
                format_time(result.retention_secs)
            )),
            Event::RetentionElapsed { elapsed_secs, .. } => {
                Some(format!("  holding {}", format_time(*elapsed_secs)))
            }
            Event::PreviewInhale { count, .. } => Some(format!("  {count} inhale")),
            Event::PreviewExhale { count, .. } => Some(format!("  {count} exhale")),
            Event::PreviewStopped { .. } => Some("preview stopped".to_string()),
            Event::InhaleStarted { .. }
            | Event::ExhaleStarted { .. }
            | Event::SessionCompleted { .. } => None,
        }
    }

    /// Skips snapshots that look identical on screen and repeated seconds.
    fn is_repeat(&mut self, event: &Event) -> bool {
        match event {
            Event::PhaseChanged(s) => {
                let key = (s.phase, s.round, s.breath_index, s.countdown);
                let repeat = self.last == Some(key);
                self.last = Some(key);
                self.last_elapsed = None;
                repeat
            }
            Event::RetentionElapsed { elapsed_secs, .. } => {
                let repeat = self.last_elapsed == Some(*elapsed_secs);
                self.last_elapsed = Some(*elapsed_secs);
                repeat
            }
            _ => false,
        }
    }
}

impl Renderer for TerminalRenderer {
    fn render(&mut self, event: &Event) -> Result<(), PortError> {
        if self.is_repeat(event) {
            return Ok(());
        }
        let Some(line) = self.line(event) else {
            return Ok(());
        };
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}").map_err(|e| PortError::Render(e.to_string()))
    }
}

fn describe(s: &SessionSnapshot) -> String {
    let percent = (s.progress * 100.0).round() as u32;
    let header = format!("[round {}/{} {:>3}%]", s.round, s.total_rounds, percent);
    let subtitle = match s.subtitle {
        Some(Subtitle::TimeToInhale) => " - time to inhale",
        Some(Subtitle::TimeToExhale) => " - time to exhale",
        None => "",
    };
    match s.phase {
        Phase::Config => "ready".to_string(),
        Phase::Breathing if s.breath_index == 0 => {
            format!("{header} get ready to breathe (s = skip to hold, f = finish)")
        }
        Phase::Breathing => format!("{header} breath {}/{}", s.breath_index, s.breaths),
        Phase::Retention => format!("{header} hold your breath (Enter when you need to breathe)"),
        Phase::Inhaling | Phase::Recovery | Phase::Exhaling => format!(
            "{header} {} {}{subtitle}",
            s.phase,
            s.countdown.unwrap_or(0)
        ),
        Phase::Results => format!("{header} session complete"),
    }
}
