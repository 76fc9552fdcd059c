//! Summaries over collected results and settings.

use super::settings::{Rounds, SessionSettings};
use super::RoundResult;

/// Assumed breath-hold length used when estimating a session's duration.
pub const ESTIMATED_RETENTION_SECS: u64 = 90;

/// Floor of the mean retention, or `None` when nothing was recorded.
pub fn average_retention_secs(results: &[RoundResult]) -> Option<u64> {
    if results.is_empty() {
        return None;
    }
    let total: u64 = results.iter().map(|r| r.retention_secs).sum();
    Some(total / results.len() as u64)
}

pub fn best_retention_secs(results: &[RoundResult]) -> Option<u64> {
    results.iter().map(|r| r.retention_secs).max()
}

/// `mm:ss`, with minutes growing past two digits if needed.
pub fn format_time(secs: u64) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Rough session length: paced breathing plus a typical hold per round.
///
/// Does not include the recovery sequence. `None` for unbounded sessions.
pub fn estimated_duration_secs(settings: &SessionSettings) -> Option<f64> {
    let rounds = match settings.rounds {
        Rounds::Finite(n) => n as f64,
        Rounds::Unbounded => return None,
    };
    let breath_secs = settings.speed.profile().cycle_ms() as f64 / 1000.0;
    Some(rounds * (settings.breaths as f64 * breath_secs + ESTIMATED_RETENTION_SECS as f64))
}

/// `~{m}m {s}s`, or `∞` for unbounded sessions.
pub fn format_estimate(settings: &SessionSettings) -> String {
    match estimated_duration_secs(settings) {
        Some(total) => {
            let minutes = (total / 60.0).floor() as u64;
            let seconds = (total % 60.0).round() as u64;
            format!("~{minutes}m {seconds}s")
        }
        None => "∞".to_string(),
    }
}
