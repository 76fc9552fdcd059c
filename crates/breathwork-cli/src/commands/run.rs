//! Interactive session driven by the wall clock and stdin.

use std::time::Duration;

use breathwork_core::session::results::{average_retention_secs, best_retention_secs, format_time};
use breathwork_core::{
    Clock, Config, Database, Phase, RoundResult, Rounds, SessionMachine, SessionRecord,
    SessionSettings, Speed, SystemClock,
};
use chrono::{DateTime, Utc};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::terminal::{TerminalBell, TerminalRenderer};

const LAST_SETTINGS_KEY: &str = "last_run_settings";
/// Upper bound on a single wait when nothing is scheduled.
const IDLE_POLL_MS: u64 = 1000;

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Breathing pace: slow, standard or fast
    #[arg(long)]
    pub speed: Option<Speed>,
    /// Number of rounds, or "unbounded"
    #[arg(long)]
    pub rounds: Option<Rounds>,
    /// Breaths per round (5-60)
    #[arg(long)]
    pub breaths: Option<u32>,
    /// Cue volume (0.0-0.5, 0 mutes all cues)
    #[arg(long)]
    pub volume: Option<f64>,
    /// Reuse the settings of the last run
    #[arg(long, conflicts_with_all = ["speed", "rounds", "breaths", "volume"])]
    pub repeat: bool,
    /// Do not record the session in the history
    #[arg(long)]
    pub no_save: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of `base`.
    fn apply(&self, base: SessionSettings) -> Result<SessionSettings, Box<dyn std::error::Error>> {
        let settings = SessionSettings {
            speed: self.speed.unwrap_or(base.speed),
            rounds: self.rounds.unwrap_or(base.rounds),
            breaths: self.breaths.unwrap_or(base.breaths),
            volume: self.volume.unwrap_or(base.volume),
        };
        settings.validate()?;
        Ok(settings)
    }

    fn has_overrides(&self) -> bool {
        self.speed.is_some() || self.rounds.is_some() || self.breaths.is_some() || self.volume.is_some()
    }
}

/// What the user typed, mapped onto the phase it was typed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Proceed,
    Skip,
    Finish,
    Unknown,
}

fn parse_input(line: &str) -> Input {
    match line.trim().to_ascii_lowercase().as_str() {
        "" => Input::Proceed,
        "s" | "skip" => Input::Skip,
        "f" | "q" | "finish" | "quit" => Input::Finish,
        _ => Input::Unknown,
    }
}

/// Apply a line of input after catching up on overdue timers, so the input
/// lands in the phase the user is looking at.
fn on_line<C: Clock>(machine: &mut SessionMachine<C>, line: &str) {
    machine.run_due();
    handle_input(machine, parse_input(line));
}

fn handle_input<C: Clock>(machine: &mut SessionMachine<C>, input: Input) {
    let accepted = match (machine.phase(), input) {
        (Phase::Retention, Input::Proceed) => machine.end_retention(),
        (Phase::Breathing, Input::Skip) => machine.skip_to_retention(),
        (Phase::Inhaling | Phase::Recovery | Phase::Exhaling, Input::Skip) => {
            machine.skip_recovery()
        }
        (_, Input::Finish) => machine.finish(),
        _ => false,
    };
    if !accepted {
        tracing::debug!(phase = %machine.phase(), ?input, "input ignored");
    }
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = if args.no_save && !args.repeat {
        None
    } else {
        Some(Database::open()?)
    };

    let settings = match (&db, args.repeat) {
        (Some(db), true) => match db.kv_get(LAST_SETTINGS_KEY)? {
            Some(json) => serde_json::from_str::<SessionSettings>(&json)?.sanitized(),
            None => config.session,
        },
        _ => args.apply(config.session)?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let outcome = runtime.block_on(drive(settings));
    // A pending stdin read never finishes on its own.
    runtime.shutdown_background();
    let outcome = outcome?;

    if args.has_overrides() || args.repeat {
        if let Some(db) = &db {
            db.kv_set(LAST_SETTINGS_KEY, &serde_json::to_string(&settings)?)?;
        }
    }

    if outcome.results.is_empty() {
        println!("session ended before any breath-hold");
        return Ok(());
    }

    print_results(&outcome.results);

    if let (Some(mut db), false) = (db, args.no_save) {
        let record = SessionRecord::new(
            outcome.session_id,
            &settings,
            outcome.started_at,
            Utc::now(),
            outcome.results,
        );
        db.record_session(&record)?;
    }
    Ok(())
}

struct Outcome {
    session_id: String,
    started_at: DateTime<Utc>,
    results: Vec<RoundResult>,
}

async fn drive(settings: SessionSettings) -> Result<Outcome, Box<dyn std::error::Error>> {
    let mut machine =
        SessionMachine::new(SystemClock, settings, TerminalBell, TerminalRenderer::new());
    machine.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    while machine.session().is_running {
        let wait_ms = machine
            .next_deadline()
            .map(|due| due.saturating_sub(machine.now_ms()))
            .unwrap_or(IDLE_POLL_MS);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(wait_ms)) => {
                machine.run_due();
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => on_line(&mut machine, &line),
                    None => {
                        stdin_open = false;
                        machine.finish();
                    }
                }
            }
        }
    }

    let session = machine.session();
    let started_at = session
        .started_at
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms as i64))
        .unwrap_or_else(Utc::now);
    Ok(Outcome {
        session_id: session.id.to_string(),
        started_at,
        results: machine.results().to_vec(),
    })
}

fn print_results(results: &[RoundResult]) {
    println!();
    println!("{:<8} {:>8}", "round", "hold");
    for r in results {
        println!("{:<8} {:>8}", r.round, format_time(r.retention_secs));
    }
    if let Some(avg) = average_retention_secs(results) {
        println!("{:<8} {:>8}", "average", format_time(avg));
    }
    if let Some(best) = best_retention_secs(results) {
        println!("{:<8} {:>8}", "best", format_time(best));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breathwork_core::{ManualClock, NoopRenderer, SilentCues};

    #[test]
    fn input_parsing() {
        assert_eq!(parse_input(""), Input::Proceed);
        assert_eq!(parse_input("  \n"), Input::Proceed);
        assert_eq!(parse_input("S"), Input::Skip);
        assert_eq!(parse_input("quit"), Input::Finish);
        assert_eq!(parse_input("x"), Input::Unknown);
    }

    #[test]
    fn enter_after_an_overdue_skip_delay_ends_the_hold() {
        let clock = ManualClock::new(0);
        let settings = SessionSettings {
            speed: Speed::Fast,
            breaths: 5,
            volume: 0.0,
            ..SessionSettings::default()
        };
        let mut m = SessionMachine::new(clock.clone(), settings, SilentCues, NoopRenderer);
        m.start();
        clock.advance_ms(500);
        m.run_due();

        on_line(&mut m, "s");
        assert_eq!(m.phase(), Phase::Breathing);
        // The skip delay expires before the next timer wakeup.
        clock.advance_ms(600);
        on_line(&mut m, "");
        assert_eq!(m.results().len(), 1);
        assert_eq!(m.phase(), Phase::Inhaling);
    }

    #[test]
    fn overrides_replace_saved_values() {
        let args = RunArgs {
            speed: Some(Speed::Fast),
            rounds: Some(Rounds::Unbounded),
            ..RunArgs::default()
        };
        let settings = args.apply(SessionSettings::default()).unwrap();
        assert_eq!(settings.speed, Speed::Fast);
        assert_eq!(settings.rounds, Rounds::Unbounded);
        assert_eq!(settings.breaths, 30);
        assert!(args.has_overrides());
    }

    #[test]
    fn out_of_range_overrides_are_rejected() {
        let args = RunArgs {
            breaths: Some(3),
            ..RunArgs::default()
        };
        assert!(args.apply(SessionSettings::default()).is_err());

        let args = RunArgs {
            volume: Some(0.9),
            ..RunArgs::default()
        };
        assert!(args.apply(SessionSettings::default()).is_err());
    }
}
