//! Invariants that must hold for any sequence of user actions and timer
//! expirations.

use breathwork_core::session::NEXT_ROUND_DELAY_MS;
use breathwork_core::testing::EventLog;
use breathwork_core::{
    Clock, Event, ManualClock, Phase, Rounds, ScopeId, SessionMachine, SessionSettings,
    SilentCues, Speed,
};
use proptest::prelude::*;

fn machine(settings: SessionSettings) -> (SessionMachine<ManualClock>, ManualClock, EventLog) {
    let clock = ManualClock::new(0);
    let log = EventLog::new();
    let m = SessionMachine::new(clock.clone(), settings, SilentCues, log.clone());
    (m, clock, log)
}

fn step(m: &mut SessionMachine<ManualClock>, clock: &ManualClock) {
    if let Some(deadline) = m.next_deadline() {
        clock.set_ms(deadline.max(clock.now_ms()));
    }
    m.run_due();
}

fn run_until(
    m: &mut SessionMachine<ManualClock>,
    clock: &ManualClock,
    done: impl Fn(&SessionMachine<ManualClock>) -> bool,
) {
    for _ in 0..10_000 {
        if done(m) {
            return;
        }
        step(m, clock);
    }
    panic!("condition never reached; stuck in {}", m.phase());
}

fn run_until_phase(m: &mut SessionMachine<ManualClock>, clock: &ManualClock, phase: Phase) {
    run_until(m, clock, |m| m.phase() == phase);
}

fn speed_strategy() -> impl Strategy<Value = Speed> {
    prop_oneof![Just(Speed::Slow), Just(Speed::Standard), Just(Speed::Fast)]
}

#[derive(Debug, Clone)]
enum Action {
    Wait(u64),
    NextDeadline,
    Start,
    Skip,
    EndRetention,
    SkipRecovery,
    Finish,
    Reset,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        4 => (1u64..5_000).prop_map(Action::Wait),
        6 => Just(Action::NextDeadline),
        1 => Just(Action::Start),
        2 => Just(Action::Skip),
        2 => Just(Action::EndRetention),
        2 => Just(Action::SkipRecovery),
        1 => Just(Action::Finish),
        1 => Just(Action::Reset),
    ]
}

fn apply(m: &mut SessionMachine<ManualClock>, clock: &ManualClock, action: &Action) {
    match action {
        Action::Wait(ms) => {
            clock.advance_ms(*ms);
            m.run_due();
        }
        Action::NextDeadline => step(m, clock),
        Action::Start => {
            m.start();
        }
        Action::Skip => {
            m.skip_to_retention();
        }
        Action::EndRetention => {
            m.end_retention();
        }
        Action::SkipRecovery => {
            m.skip_recovery();
        }
        Action::Finish => {
            m.finish();
        }
        Action::Reset => {
            m.reset_to_config();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn leaving_a_phase_leaves_no_timers_behind(
        actions in prop::collection::vec(action_strategy(), 1..200),
    ) {
        let settings = SessionSettings {
            rounds: Rounds::Finite(3),
            breaths: 5,
            ..SessionSettings::default()
        };
        let (mut m, clock, _) = machine(settings);
        let mut previous: Option<ScopeId> = None;

        for action in &actions {
            apply(&mut m, &clock, action);
            let current = m.phase_scope();
            if let Some(old) = previous {
                if current != Some(old) {
                    prop_assert_eq!(m.timers().pending_in(old), 0);
                    prop_assert!(!m.timers().is_open(old));
                }
            }
            if !m.session().is_running {
                prop_assert!(current.is_none());
                prop_assert_eq!(m.owned_timers(), 0);
            }
            previous = current;
        }
    }

    #[test]
    fn breaths_count_up_by_one_and_retention_starts_once(
        breaths in 1u32..=60,
        speed in speed_strategy(),
    ) {
        let settings = SessionSettings {
            speed,
            rounds: Rounds::Finite(1),
            breaths,
            volume: 0.0,
        };
        let (mut m, clock, log) = machine(settings);
        m.start();
        run_until_phase(&mut m, &clock, Phase::Retention);
        // Keep sampling for a while; nothing may re-enter retention.
        clock.advance_ms(5_000);
        m.run_due();

        let inhales: Vec<u32> = log
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::InhaleStarted { breath, .. } => Some(*breath),
                _ => None,
            })
            .collect();
        prop_assert_eq!(inhales, (1..=breaths).collect::<Vec<_>>());

        let mut phases: Vec<Phase> = log
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::PhaseChanged(s) => Some(s.phase),
                _ => None,
            })
            .collect();
        phases.dedup();
        prop_assert_eq!(phases.iter().filter(|p| **p == Phase::Retention).count(), 1);
        prop_assert_eq!(m.session().breath_index, breaths);
    }

    #[test]
    fn results_are_appended_in_round_order(
        holds in prop::collection::vec(0u64..300, 1..6),
    ) {
        let settings = SessionSettings {
            speed: Speed::Fast,
            rounds: Rounds::Finite(holds.len() as u32),
            breaths: 5,
            volume: 0.0,
        };
        let (mut m, clock, _) = machine(settings);
        m.start();

        for (i, secs) in holds.iter().enumerate() {
            run_until_phase(&mut m, &clock, Phase::Retention);
            let round = m.session().current_round;
            clock.advance_ms(secs * 1000 + 999);
            m.run_due();
            m.end_retention();

            prop_assert_eq!(m.results().len(), i + 1);
            let last = m.results()[i];
            prop_assert_eq!(last.round, round);
            prop_assert_eq!(last.retention_secs, *secs);
            m.skip_recovery();
        }

        prop_assert_eq!(m.phase(), Phase::Results);
        let rounds: Vec<u32> = m.results().iter().map(|r| r.round).collect();
        prop_assert!(rounds.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn finite_sessions_end_exactly_at_the_last_round(total in 1u32..=10) {
        let settings = SessionSettings {
            speed: Speed::Fast,
            rounds: Rounds::Finite(total),
            breaths: 5,
            volume: 0.0,
        };
        let (mut m, clock, _) = machine(settings);
        m.start();

        for round in 1..=total {
            run_until_phase(&mut m, &clock, Phase::Retention);
            m.end_retention();
            prop_assert_eq!(m.session().current_round, round);
            m.skip_recovery();
            if round < total {
                prop_assert_ne!(m.phase(), Phase::Results);
                prop_assert!(m.session().awaiting_next_round);
                clock.advance_ms(NEXT_ROUND_DELAY_MS);
                m.run_due();
                prop_assert_eq!(m.phase(), Phase::Breathing);
            } else {
                prop_assert_eq!(m.phase(), Phase::Results);
            }
        }
        prop_assert_eq!(m.results().len() as u32, total);
    }

    #[test]
    fn progress_never_moves_backwards(
        rounds in 1u32..=4,
        breaths in 1u32..=12,
        hold in 0u64..60,
    ) {
        let settings = SessionSettings {
            speed: Speed::Fast,
            rounds: Rounds::Finite(rounds),
            breaths,
            volume: 0.0,
        };
        let (mut m, clock, log) = machine(settings);
        m.start();

        for _ in 0..rounds {
            run_until_phase(&mut m, &clock, Phase::Retention);
            clock.advance_ms(hold * 1000);
            m.run_due();
            m.end_retention();
            run_until(&mut m, &clock, |m| {
                matches!(m.phase(), Phase::Breathing | Phase::Results)
            });
        }
        prop_assert_eq!(m.phase(), Phase::Results);

        let progress: Vec<f64> = log
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::PhaseChanged(s) => Some(s.progress),
                _ => None,
            })
            .collect();
        prop_assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        prop_assert_eq!(progress.last().copied(), Some(1.0));
    }
}

#[test]
fn unbounded_rounds_never_finalize() {
    let settings = SessionSettings {
        speed: Speed::Fast,
        rounds: Rounds::Unbounded,
        breaths: 5,
        volume: 0.0,
    };
    let (mut m, clock, _) = machine(settings);
    m.start();

    for round in 1..=1_000u32 {
        assert_eq!(m.session().current_round, round);
        run_until_phase(&mut m, &clock, Phase::Retention);
        m.end_retention();
        assert!(m.skip_recovery());
        assert_ne!(m.phase(), Phase::Results);
        assert_eq!(m.progress(), 1.0);
        clock.advance_ms(NEXT_ROUND_DELAY_MS);
        m.run_due();
        assert_eq!(m.phase(), Phase::Breathing);
    }
    assert_eq!(m.results().len(), 1_000);
    assert!(m.session().is_running);
}
