//! Session state machine.
//!
//! The machine is a plain struct with its clock, settings source, cue
//! emitter and renderer injected. User actions and timer expirations both
//! arrive as [`SessionEvent`]s through [`SessionMachine::transition`], which
//! matches on `(phase, event)` and silently ignores anything that does not
//! apply to the current phase.
//!
//! ## Timer ownership
//!
//! Every phase opens a fresh timer scope on entry. All delays and ticks of
//! that phase are scheduled into it, and entering the next phase (or
//! stopping) closes it, which cancels whatever is still pending. Whenever
//! `is_running` is false no phase scope exists.
//!
//! ## Driving
//!
//! Nothing runs on its own. The host calls [`SessionMachine::run_due`]
//! whenever [`SessionMachine::next_deadline`] has passed, and forwards user
//! input through the action methods. The idle preview loop is started by the
//! host the first time and by the machine on every later return to `Config`.

use tracing::{debug, info, warn};

use super::preview::{PreviewLoop, PreviewStep};
use super::progress::progress;
use super::results::average_retention_secs;
use super::settings::{Rounds, SessionSettings, SettingsSource};
use super::{Phase, RoundResult, Session, Subtitle};
use crate::events::{Event, SessionSnapshot};
use crate::ports::{Cue, CueEmitter, Renderer};
use crate::timer::{Clock, Scheduler, ScopeId, TimerId};

/// Pause between showing the exercise view and the first breath.
pub const SETTLE_DELAY_MS: u64 = 500;
/// Pause between a manual skip and the start of the breath-hold.
pub const SKIP_TO_RETENTION_DELAY_MS: u64 = 500;
/// Pause between finishing a round and breathing again.
pub const NEXT_ROUND_DELAY_MS: u64 = 1000;
/// Display refresh interval during the breath-hold.
pub const RETENTION_SAMPLE_MS: u64 = 100;
pub const COUNTDOWN_TICK_MS: u64 = 1000;

pub const INHALE_SECS: u32 = 3;
pub const RECOVERY_HOLD_SECS: u32 = 15;
pub const EXHALE_SECS: u32 = 3;

/// Timer payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionTimer {
    Settle,
    InhaleDone,
    ExhaleDone,
    RetentionDelay,
    RetentionSample,
    CountdownTick,
    NextRound,
    Preview(PreviewStep),
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    SkipToRetention,
    /// The user needs to breathe; ends the breath-hold.
    EndRetention,
    SkipRecovery,
    Finish,
    Reset,
    Timer(SessionTimer),
}

pub struct SessionMachine<C: Clock> {
    timers: Scheduler<SessionTimer, C>,
    settings: Box<dyn SettingsSource>,
    cues: Box<dyn CueEmitter>,
    renderer: Box<dyn Renderer>,
    session: Session,
    scope: Option<ScopeId>,
    countdown_timer: Option<TimerId>,
    retention_delay: Option<TimerId>,
    preview: PreviewLoop,
}

impl<C: Clock> SessionMachine<C> {
    /// A machine in the `Config` phase with no timers armed.
    ///
    /// The idle preview loop is not running yet; hosts that show it call
    /// [`start_preview`](Self::start_preview). Returning to `Config` through
    /// reset or an early finish restarts it on its own.
    pub fn new(
        clock: C,
        settings: impl SettingsSource + 'static,
        cues: impl CueEmitter + 'static,
        renderer: impl Renderer + 'static,
    ) -> Self {
        Self {
            timers: Scheduler::new(clock),
            settings: Box::new(settings),
            cues: Box::new(cues),
            renderer: Box::new(renderer),
            session: Session::idle(),
            scope: None,
            countdown_timer: None,
            retention_delay: None,
            preview: PreviewLoop::default(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.session.phase
    }

    pub fn results(&self) -> &[RoundResult] {
        &self.session.results
    }

    pub fn settings(&self) -> SessionSettings {
        self.settings.current()
    }

    pub fn progress(&self) -> f64 {
        progress(&self.session, &self.settings.current())
    }

    pub fn now_ms(&self) -> u64 {
        self.timers.now_ms()
    }

    /// Scope holding the current phase's timers, if any.
    pub fn phase_scope(&self) -> Option<ScopeId> {
        self.scope
    }

    /// Pending timers owned by the current phase.
    pub fn owned_timers(&self) -> usize {
        self.scope.map(|s| self.timers.pending_in(s)).unwrap_or(0)
    }

    pub fn timers(&self) -> &Scheduler<SessionTimer, C> {
        &self.timers
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    pub fn preview_active(&self) -> bool {
        self.preview.is_active()
    }

    pub fn preview_count(&self) -> u32 {
        self.preview.count()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let settings = self.settings.current();
        SessionSnapshot {
            session_id: self.session.id,
            phase: self.session.phase,
            round: self.session.current_round,
            total_rounds: settings.rounds,
            breath_index: self.session.breath_index,
            breaths: settings.breaths,
            countdown: self.session.countdown,
            subtitle: self.session.subtitle,
            progress: progress(&self.session, &settings),
            is_running: self.session.is_running,
            results: self.session.results.clone(),
            at_ms: self.timers.now_ms(),
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    pub fn start(&mut self) -> bool {
        self.transition(SessionEvent::Start)
    }

    pub fn skip_to_retention(&mut self) -> bool {
        self.transition(SessionEvent::SkipToRetention)
    }

    pub fn end_retention(&mut self) -> bool {
        self.transition(SessionEvent::EndRetention)
    }

    pub fn skip_recovery(&mut self) -> bool {
        self.transition(SessionEvent::SkipRecovery)
    }

    pub fn finish(&mut self) -> bool {
        self.transition(SessionEvent::Finish)
    }

    pub fn reset_to_config(&mut self) -> bool {
        self.transition(SessionEvent::Reset)
    }

    pub fn start_preview(&mut self) -> bool {
        if self.session.phase != Phase::Config {
            return false;
        }
        self.preview.start(&mut self.timers);
        true
    }

    pub fn stop_preview(&mut self) {
        if self.preview.stop(&mut self.timers) {
            let at_ms = self.timers.now_ms();
            self.emit(Event::PreviewStopped { at_ms });
        }
    }

    /// Restart the preview shortly, picking up a changed pace.
    pub fn restart_preview(&mut self) -> bool {
        if self.session.phase != Phase::Config {
            return false;
        }
        self.preview.restart(&mut self.timers);
        true
    }

    /// Dispatch every timer due at the clock's current reading, in order.
    /// Returns how many fired.
    pub fn run_due(&mut self) -> usize {
        let mut fired = 0;
        while let Some(timer) = self.timers.pop_due() {
            fired += 1;
            self.transition(SessionEvent::Timer(timer.event));
        }
        self.timers.settle();
        fired
    }

    /// Apply one event. Returns false when it does not apply to the current
    /// phase, in which case nothing changed.
    pub fn transition(&mut self, event: SessionEvent) -> bool {
        use SessionEvent as Ev;
        use SessionTimer as T;

        let phase = self.session.phase;
        let running = self.session.is_running;
        let between_rounds = self.session.awaiting_next_round;

        match (phase, event) {
            (Phase::Config | Phase::Results, Ev::Start) => self.begin_session(),
            (Phase::Breathing, Ev::SkipToRetention)
                if running && self.retention_delay.is_none() =>
            {
                self.skip_breathing()
            }
            (Phase::Retention, Ev::EndRetention) => self.end_breath_hold(),
            (Phase::Inhaling | Phase::Recovery | Phase::Exhaling, Ev::SkipRecovery)
                if running && !between_rounds =>
            {
                self.skip_recovery_sequence()
            }
            (p, Ev::Finish) if p.is_active() => self.finish_session(),
            (_, Ev::Reset) => self.reset_session(),

            (Phase::Breathing, Ev::Timer(T::Settle | T::ExhaleDone)) => self.advance_breath(),
            (Phase::Breathing, Ev::Timer(T::InhaleDone)) => self.begin_exhale(),
            (Phase::Breathing, Ev::Timer(T::RetentionDelay)) if running => {
                self.retention_delay = None;
                self.start_retention()
            }
            (Phase::Retention, Ev::Timer(T::RetentionSample)) => self.sample_retention(),
            (Phase::Inhaling | Phase::Recovery | Phase::Exhaling, Ev::Timer(T::CountdownTick)) => {
                self.countdown_tick()
            }
            (_, Ev::Timer(T::NextRound)) if running && between_rounds => {
                self.begin_breathing_phase()
            }
            (_, Ev::Timer(T::Preview(step))) => {
                let profile = self.settings.current().speed.profile();
                let in_config = phase == Phase::Config;
                if let Some(event) = self.preview.step(step, in_config, profile, &mut self.timers) {
                    self.emit(event);
                }
            }

            (phase, event) => {
                debug!(%phase, ?event, "ignoring event not valid in this phase");
                return false;
            }
        }
        true
    }

    // ── Phases ───────────────────────────────────────────────────────

    fn begin_session(&mut self) {
        self.preview.stop(&mut self.timers);
        self.close_phase_scope();
        self.session = Session::started(self.timers.now_ms());
        let settings = self.settings.current();
        info!(
            session_id = %self.session.id,
            speed = %settings.speed,
            rounds = %settings.rounds,
            breaths = settings.breaths,
            "session started"
        );
        self.begin_breathing_phase();
    }

    fn begin_breathing_phase(&mut self) {
        self.enter_scope();
        let s = &mut self.session;
        s.phase = Phase::Breathing;
        s.breath_index = 0;
        s.awaiting_next_round = false;
        s.countdown = None;
        s.subtitle = None;
        self.publish();
        self.schedule_once(SETTLE_DELAY_MS, SessionTimer::Settle);
    }

    fn advance_breath(&mut self) {
        let settings = self.settings.current();
        if !self.session.is_running || self.session.breath_index >= settings.breaths {
            if self.session.is_running {
                self.start_retention();
            }
            return;
        }

        self.session.breath_index += 1;
        self.publish();
        self.emit_cue(Cue::Breath);

        let inhale_ms = settings.speed.profile().inhale_ms;
        self.emit(Event::InhaleStarted {
            breath: self.session.breath_index,
            inhale_ms,
            at_ms: self.timers.now_ms(),
        });
        self.schedule_once(inhale_ms, SessionTimer::InhaleDone);
    }

    fn begin_exhale(&mut self) {
        let exhale_ms = self.settings.current().speed.profile().exhale_ms;
        self.emit(Event::ExhaleStarted {
            breath: self.session.breath_index,
            exhale_ms,
            at_ms: self.timers.now_ms(),
        });
        self.schedule_once(exhale_ms, SessionTimer::ExhaleDone);
    }

    fn skip_breathing(&mut self) {
        self.enter_scope();
        self.session.breath_index = self.settings.current().breaths;
        self.publish();
        self.emit_cue(Cue::RetentionStart);
        let id = self.schedule_once(SKIP_TO_RETENTION_DELAY_MS, SessionTimer::RetentionDelay);
        self.retention_delay = Some(id);
    }

    fn start_retention(&mut self) {
        self.enter_scope();
        let now = self.timers.now_ms();
        let s = &mut self.session;
        s.phase = Phase::Retention;
        s.retention_started_at = Some(now);
        s.countdown = None;
        s.subtitle = None;
        self.publish();
        self.emit_cue(Cue::RetentionStart);
        self.schedule_repeating(RETENTION_SAMPLE_MS, SessionTimer::RetentionSample);
    }

    fn sample_retention(&mut self) {
        let now = self.timers.now_ms();
        let started = self.session.retention_started_at.unwrap_or(now);
        self.emit(Event::RetentionElapsed {
            elapsed_secs: now.saturating_sub(started) / 1000,
            at_ms: now,
        });
    }

    fn end_breath_hold(&mut self) {
        self.close_phase_scope();
        let now = self.timers.now_ms();
        let started = self.session.retention_started_at.take().unwrap_or(now);
        let result = RoundResult {
            round: self.session.current_round,
            retention_secs: now.saturating_sub(started) / 1000,
        };
        self.session.results.push(result);
        debug!(round = result.round, secs = result.retention_secs, "retention recorded");
        self.emit(Event::RetentionRecorded { result, at_ms: now });
        self.begin_inhaling();
    }

    fn begin_inhaling(&mut self) {
        self.enter_scope();
        self.session.phase = Phase::Inhaling;
        self.session.subtitle = Some(Subtitle::TimeToInhale);
        self.start_countdown(INHALE_SECS);
        self.emit_cue(Cue::Breath);
    }

    fn begin_recovery_hold(&mut self) {
        self.enter_scope();
        self.session.phase = Phase::Recovery;
        self.session.subtitle = None;
        self.start_countdown(RECOVERY_HOLD_SECS);
    }

    fn begin_exhaling(&mut self) {
        self.enter_scope();
        self.session.phase = Phase::Exhaling;
        self.session.subtitle = Some(Subtitle::TimeToExhale);
        self.start_countdown(EXHALE_SECS);
        self.emit_cue(Cue::Breath);
    }

    /// Show `seconds` and tick down once per second to zero inclusive.
    fn start_countdown(&mut self, seconds: u32) {
        self.session.countdown = Some(seconds);
        self.publish();
        let id = self.schedule_repeating(COUNTDOWN_TICK_MS, SessionTimer::CountdownTick);
        self.countdown_timer = Some(id);
    }

    fn countdown_tick(&mut self) {
        let remaining = self.session.countdown.unwrap_or(0).saturating_sub(1);
        self.session.countdown = Some(remaining);
        self.publish();
        if remaining > 0 {
            return;
        }
        if let Some(id) = self.countdown_timer.take() {
            self.timers.cancel(id);
        }
        match self.session.phase {
            Phase::Inhaling => self.begin_recovery_hold(),
            Phase::Recovery => self.begin_exhaling(),
            Phase::Exhaling => {
                self.session.subtitle = None;
                self.complete_round();
            }
            _ => {}
        }
    }

    fn skip_recovery_sequence(&mut self) {
        self.close_phase_scope();
        self.session.subtitle = None;
        self.session.countdown = None;
        self.complete_round();
    }

    fn complete_round(&mut self) {
        let finished = match self.settings.current().rounds {
            Rounds::Unbounded => false,
            Rounds::Finite(total) => self.session.current_round >= total,
        };
        if finished {
            self.show_results();
            return;
        }

        self.enter_scope();
        let s = &mut self.session;
        s.current_round += 1;
        s.awaiting_next_round = true;
        s.countdown = None;
        s.subtitle = None;
        self.publish();
        self.schedule_once(NEXT_ROUND_DELAY_MS, SessionTimer::NextRound);
    }

    fn show_results(&mut self) {
        self.close_phase_scope();
        let s = &mut self.session;
        s.is_running = false;
        s.phase = Phase::Results;
        s.awaiting_next_round = false;
        s.countdown = None;
        s.subtitle = None;
        s.retention_started_at = None;
        info!(
            session_id = %self.session.id,
            rounds = self.session.results.len(),
            "session completed"
        );
        self.publish();
        self.emit(Event::SessionCompleted {
            session_id: self.session.id,
            results: self.session.results.clone(),
            average_secs: average_retention_secs(&self.session.results),
            at_ms: self.timers.now_ms(),
        });
    }

    fn finish_session(&mut self) {
        self.session.is_running = false;
        self.close_phase_scope();
        if self.session.results.is_empty() {
            info!(session_id = %self.session.id, "session abandoned before any retention");
            self.reset_session();
        } else {
            self.show_results();
        }
    }

    fn reset_session(&mut self) {
        self.close_phase_scope();
        self.session = Session::idle();
        self.publish();
        self.preview.start(&mut self.timers);
    }

    // ── Timers ───────────────────────────────────────────────────────

    /// Close the current phase scope and open a new one.
    fn enter_scope(&mut self) -> ScopeId {
        self.close_phase_scope();
        let scope = self.timers.open_scope();
        self.scope = Some(scope);
        scope
    }

    fn close_phase_scope(&mut self) {
        if let Some(scope) = self.scope.take() {
            let cancelled = self.timers.close_scope(scope);
            if cancelled > 0 {
                debug!(?scope, cancelled, "cancelled phase timers");
            }
        }
        self.countdown_timer = None;
        self.retention_delay = None;
    }

    fn schedule_once(&mut self, delay_ms: u64, timer: SessionTimer) -> TimerId {
        let scope = self.current_scope();
        self.timers.schedule_once(scope, delay_ms, timer)
    }

    fn schedule_repeating(&mut self, interval_ms: u64, timer: SessionTimer) -> TimerId {
        let scope = self.current_scope();
        self.timers.schedule_repeating(scope, interval_ms, timer)
    }

    fn current_scope(&mut self) -> ScopeId {
        match self.scope {
            Some(scope) => scope,
            None => self.enter_scope(),
        }
    }

    // ── Ports ────────────────────────────────────────────────────────

    fn publish(&mut self) {
        let snapshot = self.snapshot();
        self.emit(Event::PhaseChanged(snapshot));
    }

    fn emit(&mut self, event: Event) {
        if let Err(err) = self.renderer.render(&event) {
            warn!(%err, "renderer failed; session continues");
        }
    }

    fn emit_cue(&mut self, cue: Cue) {
        let settings = self.settings.current();
        if settings.cues_muted() {
            return;
        }
        if let Err(err) = self.cues.emit(cue, settings.volume) {
            warn!(%err, ?cue, "cue failed; session continues");
        }
    }
}

impl<C: Clock> std::fmt::Debug for SessionMachine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("session", &self.session)
            .field("scope", &self.scope)
            .field("pending_timers", &self.timers.pending())
            .finish()
    }
}
