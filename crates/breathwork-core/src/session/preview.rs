//! Idle breathing preview shown while the session is in `Config`.
//!
//! The loop owns its own timer scope, separate from the session's phase
//! scope. Each step carries the generation it was scheduled under and is
//! dropped unless that generation is still the active one, so a step left
//! over from a stopped loop never schedules another cycle.

use super::machine::SessionTimer;
use crate::events::Event;
use crate::timer::{Clock, Scheduler, ScopeId, SpeedProfile};

/// Delay before the first preview breath.
pub const PREVIEW_START_DELAY_MS: u64 = 500;
/// Delay before a restarted preview begins again.
pub const PREVIEW_RESTART_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStep {
    Breathe { generation: u64 },
    Exhale { generation: u64 },
    Restart { generation: u64 },
}

#[derive(Debug, Default)]
pub(crate) struct PreviewLoop {
    active: bool,
    generation: u64,
    count: u32,
    first_cycle: bool,
    scope: Option<ScopeId>,
}

impl PreviewLoop {
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Start from breath 1. A loop that is already running is left alone.
    pub(crate) fn start<C: Clock>(&mut self, timers: &mut Scheduler<SessionTimer, C>) {
        if self.active {
            return;
        }
        self.stop(timers);
        self.generation += 1;
        self.count = 1;
        self.first_cycle = true;
        self.active = true;
        let scope = self.open_scope(timers);
        timers.schedule_once(
            scope,
            PREVIEW_START_DELAY_MS,
            SessionTimer::Preview(PreviewStep::Breathe {
                generation: self.generation,
            }),
        );
    }

    /// Returns whether a running loop was stopped.
    pub(crate) fn stop<C: Clock>(&mut self, timers: &mut Scheduler<SessionTimer, C>) -> bool {
        let was_active = self.active;
        self.active = false;
        if let Some(scope) = self.scope.take() {
            timers.close_scope(scope);
        }
        was_active
    }

    /// Stop now and start over shortly, e.g. after the pace changed.
    pub(crate) fn restart<C: Clock>(&mut self, timers: &mut Scheduler<SessionTimer, C>) {
        self.stop(timers);
        self.generation += 1;
        let scope = self.open_scope(timers);
        timers.schedule_once(
            scope,
            PREVIEW_RESTART_DELAY_MS,
            SessionTimer::Preview(PreviewStep::Restart {
                generation: self.generation,
            }),
        );
    }

    /// Handle one preview timer. `in_config` is false once the session has
    /// left the config phase, which stops the loop.
    pub(crate) fn step<C: Clock>(
        &mut self,
        step: PreviewStep,
        in_config: bool,
        profile: SpeedProfile,
        timers: &mut Scheduler<SessionTimer, C>,
    ) -> Option<Event> {
        let at_ms = timers.now_ms();
        match step {
            PreviewStep::Restart { generation } => {
                if generation != self.generation || self.active || !in_config {
                    return None;
                }
                self.start(timers);
                None
            }
            PreviewStep::Breathe { generation } | PreviewStep::Exhale { generation } => {
                if generation != self.generation {
                    return None;
                }
                if !self.active || !in_config {
                    return self.stop(timers).then_some(Event::PreviewStopped { at_ms });
                }
                let scope = self.scope?;
                match step {
                    PreviewStep::Breathe { .. } => {
                        if !self.first_cycle {
                            self.count += 1;
                        }
                        self.first_cycle = false;
                        timers.schedule_once(
                            scope,
                            profile.inhale_ms,
                            SessionTimer::Preview(PreviewStep::Exhale { generation }),
                        );
                        Some(Event::PreviewInhale {
                            count: self.count,
                            inhale_ms: profile.inhale_ms,
                            at_ms,
                        })
                    }
                    _ => {
                        timers.schedule_once(
                            scope,
                            profile.exhale_ms,
                            SessionTimer::Preview(PreviewStep::Breathe { generation }),
                        );
                        Some(Event::PreviewExhale {
                            count: self.count,
                            exhale_ms: profile.exhale_ms,
                            at_ms,
                        })
                    }
                }
            }
        }
    }

    fn open_scope<C: Clock>(&mut self, timers: &mut Scheduler<SessionTimer, C>) -> ScopeId {
        let scope = timers.open_scope();
        self.scope = Some(scope);
        scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{ManualClock, Speed};

    fn drive(
        preview: &mut PreviewLoop,
        timers: &mut Scheduler<SessionTimer, ManualClock>,
        in_config: bool,
    ) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(fired) = timers.pop_due() {
            if let SessionTimer::Preview(step) = fired.event {
                out.extend(preview.step(step, in_config, Speed::Standard.profile(), timers));
            }
        }
        timers.settle();
        out
    }

    #[test]
    fn counts_breaths_after_the_first() {
        let clock = ManualClock::new(0);
        let mut timers = Scheduler::new(clock.clone());
        let mut preview = PreviewLoop::default();
        preview.start(&mut timers);

        // 500 ms kickoff + two standard cycles of 3 s.
        clock.set_ms(500 + 3_000 + 3_000);
        let events = drive(&mut preview, &mut timers, true);
        let counts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                Event::PreviewInhale { count, .. } => Some(*count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
        assert_eq!(preview.count(), 3);
    }

    #[test]
    fn stop_leaves_no_timers() {
        let clock = ManualClock::new(0);
        let mut timers = Scheduler::new(clock.clone());
        let mut preview = PreviewLoop::default();
        preview.start(&mut timers);
        clock.set_ms(600);
        drive(&mut preview, &mut timers, true);
        assert!(preview.stop(&mut timers));
        assert_eq!(timers.pending(), 0);
        assert!(!preview.is_active());
    }

    #[test]
    fn stale_step_does_not_reschedule() {
        let clock = ManualClock::new(0);
        let mut timers = Scheduler::new(clock.clone());
        let mut preview = PreviewLoop::default();
        preview.start(&mut timers);
        let stale = PreviewStep::Breathe { generation: 1 };
        preview.restart(&mut timers);
        clock.set_ms(100);
        drive(&mut preview, &mut timers, true);
        assert!(preview.is_active());

        let pending = timers.pending();
        let event = preview.step(stale, true, Speed::Fast.profile(), &mut timers);
        assert_eq!(event, None);
        assert!(preview.is_active());
        assert_eq!(timers.pending(), pending);
    }

    #[test]
    fn leaving_config_stops_loop() {
        let clock = ManualClock::new(0);
        let mut timers = Scheduler::new(clock.clone());
        let mut preview = PreviewLoop::default();
        preview.start(&mut timers);
        clock.set_ms(500);
        let events = drive(&mut preview, &mut timers, false);
        assert!(matches!(events.as_slice(), [Event::PreviewStopped { .. }]));
        assert_eq!(timers.pending(), 0);
    }
}
