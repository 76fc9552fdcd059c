//! Scoped one-shot and repeating timers.
//!
//! The scheduler does not run callbacks itself. Each timer carries an event
//! value; the owner drains due timers with [`Scheduler::pop_due`] and handles
//! the events one at a time, so a handler always runs to completion before
//! the next timer is looked at.
//!
//! ## Scopes
//!
//! Every timer belongs to a [`ScopeId`]. Closing a scope cancels everything
//! registered in it, and anything scheduled into a scope after it was
//! closed is dropped on the spot. A phase that opens a scope on entry and
//! closes it on exit therefore cannot leak a timer into the next phase.
//!
//! ## Time base
//!
//! While an event is being dispatched, [`Scheduler::now_ms`] reports the
//! timer's due instant rather than the wall clock, so timers chained from a
//! handler are measured from when the parent was due and do not accumulate
//! dispatch latency.

use std::collections::{BTreeMap, HashSet};

use super::clock::Clock;

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Owner tag for a group of timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

#[derive(Debug, Clone)]
struct Entry<E> {
    scope: ScopeId,
    due_ms: u64,
    /// Tie-breaker so timers due at the same instant fire in schedule order.
    seq: u64,
    interval_ms: Option<u64>,
    event: E,
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct Fired<E> {
    pub id: TimerId,
    pub scope: ScopeId,
    pub due_ms: u64,
    pub event: E,
}

#[derive(Debug)]
pub struct Scheduler<E, C> {
    clock: C,
    entries: BTreeMap<TimerId, Entry<E>>,
    open_scopes: HashSet<ScopeId>,
    next_id: u64,
    next_scope: u64,
    next_seq: u64,
    dispatch_at: Option<u64>,
}

impl<E: Clone, C: Clock> Scheduler<E, C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            entries: BTreeMap::new(),
            open_scopes: HashSet::new(),
            next_id: 1,
            next_scope: 1,
            next_seq: 0,
            dispatch_at: None,
        }
    }

    /// Current instant: the due time of the timer being dispatched, or the
    /// clock reading outside of dispatch.
    pub fn now_ms(&self) -> u64 {
        self.dispatch_at.unwrap_or_else(|| self.clock.now_ms())
    }

    // ── Scopes ───────────────────────────────────────────────────────

    pub fn open_scope(&mut self) -> ScopeId {
        let scope = ScopeId(self.next_scope);
        self.next_scope += 1;
        self.open_scopes.insert(scope);
        scope
    }

    pub fn is_open(&self, scope: ScopeId) -> bool {
        self.open_scopes.contains(&scope)
    }

    /// Close `scope` and cancel every timer it owns. Returns how many
    /// pending timers were cancelled. Closing twice is a no-op.
    pub fn close_scope(&mut self, scope: ScopeId) -> usize {
        self.open_scopes.remove(&scope);
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.scope != scope);
        before - self.entries.len()
    }

    // ── Scheduling ───────────────────────────────────────────────────

    pub fn schedule_once(&mut self, scope: ScopeId, delay_ms: u64, event: E) -> TimerId {
        self.insert(scope, delay_ms, None, event)
    }

    /// Schedule `event` every `interval_ms` (minimum 1 ms) until cancelled.
    pub fn schedule_repeating(&mut self, scope: ScopeId, interval_ms: u64, event: E) -> TimerId {
        let interval_ms = interval_ms.max(1);
        self.insert(scope, interval_ms, Some(interval_ms), event)
    }

    fn insert(&mut self, scope: ScopeId, delay_ms: u64, interval_ms: Option<u64>, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        if !self.is_open(scope) {
            tracing::debug!(?scope, ?id, "dropping timer scheduled into a closed scope");
            return id;
        }
        let due_ms = self.now_ms().saturating_add(delay_ms);
        let seq = self.bump_seq();
        self.entries.insert(
            id,
            Entry {
                scope,
                due_ms,
                seq,
                interval_ms,
                event,
            },
        );
        id
    }

    /// Cancel a timer. Unknown, fired and already-cancelled handles are
    /// ignored. Returns whether anything was pending.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    pub fn pending_in(&self, scope: ScopeId) -> usize {
        self.entries.values().filter(|e| e.scope == scope).count()
    }

    /// Earliest due instant among pending timers.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.values().map(|e| e.due_ms).min()
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Take the earliest timer that is due at the current clock reading.
    ///
    /// One-shot timers are removed; repeating timers are re-armed one
    /// interval after their previous due time. The scheduler's notion of
    /// now moves to the fired timer's due instant until [`Self::settle`].
    pub fn pop_due(&mut self) -> Option<Fired<E>> {
        let limit = self.clock.now_ms();
        let id = self
            .entries
            .iter()
            .filter(|(_, e)| e.due_ms <= limit)
            .min_by_key(|(_, e)| (e.due_ms, e.seq))
            .map(|(id, _)| *id)?;

        let seq = self.bump_seq();
        let fired = match self.entries.get_mut(&id) {
            Some(entry) => {
                let fired = Fired {
                    id,
                    scope: entry.scope,
                    due_ms: entry.due_ms,
                    event: entry.event.clone(),
                };
                match entry.interval_ms {
                    Some(interval) => {
                        entry.due_ms = entry.due_ms.saturating_add(interval);
                        entry.seq = seq;
                    }
                    None => {
                        self.entries.remove(&id);
                    }
                }
                fired
            }
            None => return None,
        };

        self.dispatch_at = Some(fired.due_ms);
        Some(fired)
    }

    /// Leave dispatch mode; `now_ms` reads the clock again.
    pub fn settle(&mut self) {
        self.dispatch_at = None;
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualClock;

    fn scheduler() -> (Scheduler<&'static str, ManualClock>, ManualClock) {
        let clock = ManualClock::new(0);
        (Scheduler::new(clock.clone()), clock)
    }

    fn drain(s: &mut Scheduler<&'static str, ManualClock>) -> Vec<&'static str> {
        let mut out = Vec::new();
        while let Some(fired) = s.pop_due() {
            out.push(fired.event);
        }
        s.settle();
        out
    }

    #[test]
    fn once_fires_when_due() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        s.schedule_once(scope, 500, "a");
        clock.set_ms(499);
        assert!(drain(&mut s).is_empty());
        clock.set_ms(500);
        assert_eq!(drain(&mut s), vec!["a"]);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn same_deadline_fires_in_schedule_order() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        s.schedule_once(scope, 100, "first");
        s.schedule_once(scope, 100, "second");
        s.schedule_once(scope, 50, "earliest");
        clock.set_ms(100);
        assert_eq!(drain(&mut s), vec!["earliest", "first", "second"]);
    }

    #[test]
    fn repeating_catches_up_tick_by_tick() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        let id = s.schedule_repeating(scope, 1000, "tick");
        clock.set_ms(3_500);
        assert_eq!(drain(&mut s), vec!["tick", "tick", "tick"]);
        assert!(s.is_pending(id));
        assert_eq!(s.next_deadline(), Some(4_000));
    }

    #[test]
    fn cancel_is_idempotent() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        let id = s.schedule_once(scope, 10, "x");
        assert!(s.cancel(id));
        assert!(!s.cancel(id));
        clock.set_ms(10);
        assert!(drain(&mut s).is_empty());

        let fired = s.schedule_once(scope, 0, "y");
        assert_eq!(drain(&mut s), vec!["y"]);
        assert!(!s.cancel(fired));
    }

    #[test]
    fn close_scope_cancels_only_its_timers() {
        let (mut s, clock) = scheduler();
        let phase = s.open_scope();
        let preview = s.open_scope();
        s.schedule_once(phase, 10, "phase-a");
        s.schedule_repeating(phase, 5, "phase-b");
        s.schedule_once(preview, 10, "preview");
        assert_eq!(s.close_scope(phase), 2);
        assert_eq!(s.pending_in(phase), 0);
        assert_eq!(s.close_scope(phase), 0);
        clock.set_ms(10);
        assert_eq!(drain(&mut s), vec!["preview"]);
    }

    #[test]
    fn scheduling_into_closed_scope_is_dropped() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        s.close_scope(scope);
        let id = s.schedule_once(scope, 0, "late");
        assert!(!s.is_pending(id));
        clock.set_ms(1);
        assert!(drain(&mut s).is_empty());
    }

    #[test]
    fn chained_timers_are_measured_from_parent_due_time() {
        let (mut s, clock) = scheduler();
        let scope = s.open_scope();
        s.schedule_once(scope, 2_000, "inhale");
        clock.set_ms(10_000);

        let fired = s.pop_due().unwrap();
        assert_eq!(fired.event, "inhale");
        assert_eq!(s.now_ms(), 2_000);
        s.schedule_once(scope, 1_000, "exhale");
        let fired = s.pop_due().unwrap();
        assert_eq!(fired.due_ms, 3_000);
        s.settle();
        assert_eq!(s.now_ms(), 10_000);
    }
}
