//! Whole-session progress for the progress bar.
//!
//! Each round counts `breaths + 2` units: one per breath, one for the
//! retention, and one spread across the recovery sequence in quarter steps.

use super::settings::{Rounds, SessionSettings};
use super::{Phase, Session};

/// Completed units inside the current round.
pub fn phase_offset(session: &Session, breaths: u32) -> f64 {
    let breaths = breaths as f64;
    if session.awaiting_next_round {
        // The round counter already moved on; nothing of the new round is done.
        return 0.0;
    }
    match session.phase {
        Phase::Breathing => session.breath_index as f64,
        Phase::Retention => breaths + 1.0,
        Phase::Inhaling => breaths + 1.25,
        Phase::Recovery => breaths + 1.5,
        Phase::Exhaling => breaths + 1.75,
        Phase::Config | Phase::Results => breaths + 2.0,
    }
}

/// Fraction of the session done, in `0.0..=1.0`.
///
/// Unbounded sessions have no end, so they always report `1.0`.
pub fn progress(session: &Session, settings: &SessionSettings) -> f64 {
    let rounds = match settings.rounds {
        Rounds::Unbounded => return 1.0,
        Rounds::Finite(n) => n.max(1) as f64,
    };
    if session.phase == Phase::Config {
        return 0.0;
    }
    let units_per_round = (settings.breaths + 2) as f64;
    let completed = (session.current_round.saturating_sub(1)) as f64 * units_per_round
        + phase_offset(session, settings.breaths);
    (completed / (rounds * units_per_round)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::Speed;
    use proptest::prelude::*;

    fn settings(rounds: Rounds, breaths: u32) -> SessionSettings {
        SessionSettings {
            speed: Speed::Standard,
            rounds,
            breaths,
            volume: 0.0,
        }
    }

    fn at(phase: Phase, round: u32, breath: u32) -> Session {
        Session {
            phase,
            current_round: round,
            breath_index: breath,
            ..Session::started(0)
        }
    }

    #[test]
    fn quarter_steps_through_recovery() {
        let cfg = settings(Rounds::Finite(1), 2);
        assert_eq!(progress(&at(Phase::Breathing, 1, 1), &cfg), 0.25);
        assert_eq!(progress(&at(Phase::Retention, 1, 2), &cfg), 0.75);
        assert_eq!(progress(&at(Phase::Inhaling, 1, 2), &cfg), 3.25 / 4.0);
        assert_eq!(progress(&at(Phase::Recovery, 1, 2), &cfg), 3.5 / 4.0);
        assert_eq!(progress(&at(Phase::Exhaling, 1, 2), &cfg), 3.75 / 4.0);
        assert_eq!(progress(&at(Phase::Results, 1, 2), &cfg), 1.0);
    }

    #[test]
    fn unbounded_is_always_complete() {
        let cfg = settings(Rounds::Unbounded, 30);
        assert_eq!(progress(&at(Phase::Breathing, 1, 0), &cfg), 1.0);
        assert_eq!(progress(&at(Phase::Retention, 7, 30), &cfg), 1.0);
    }

    #[test]
    fn config_reports_zero() {
        let cfg = settings(Rounds::Finite(3), 30);
        assert_eq!(progress(&Session::idle(), &cfg), 0.0);
    }

    #[test]
    fn pause_between_rounds_matches_next_round_start() {
        let cfg = settings(Rounds::Finite(2), 3);
        let mut pausing = at(Phase::Exhaling, 2, 3);
        pausing.awaiting_next_round = true;
        let next = at(Phase::Breathing, 2, 0);
        assert_eq!(progress(&pausing, &cfg), progress(&next, &cfg));
        assert_eq!(progress(&pausing, &cfg), 0.5);
    }

    proptest! {
        #[test]
        fn non_decreasing_within_round(rounds in 1u32..=10, breaths in 5u32..=60, round_seed in 0u32..10) {
            let round = round_seed % rounds + 1;
            let cfg = settings(Rounds::Finite(rounds), breaths);
            let mut sequence: Vec<Session> = (0..=breaths).map(|b| at(Phase::Breathing, round, b)).collect();
            for phase in [Phase::Retention, Phase::Inhaling, Phase::Recovery, Phase::Exhaling, Phase::Results] {
                sequence.push(at(phase, round, breaths));
            }
            let values: Vec<f64> = sequence.iter().map(|s| progress(s, &cfg)).collect();
            for pair in values.windows(2) {
                prop_assert!(pair[0] <= pair[1], "{values:?}");
            }
            for v in values {
                prop_assert!((0.0..=1.0).contains(&v));
            }
        }
    }
}
