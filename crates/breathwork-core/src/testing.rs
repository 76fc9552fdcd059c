//! Recording port implementations for tests.
//!
//! Compiled for this crate's own tests and, through the `test-util`
//! feature, for integration tests and downstream hosts.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::PortError;
use crate::events::Event;
use crate::ports::{Cue, CueEmitter, Renderer};

/// Keeps every rendered event in a shared log.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Rc<RefCell<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

impl Renderer for EventLog {
    fn render(&mut self, event: &Event) -> Result<(), PortError> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

/// Keeps every emitted cue with its volume in a shared log.
#[derive(Debug, Default, Clone)]
pub struct CueLog {
    cues: Rc<RefCell<Vec<(Cue, f64)>>>,
}

impl CueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<Cue> {
        self.cues.borrow().iter().map(|(cue, _)| *cue).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.cues.borrow().iter().map(|(_, volume)| *volume).collect()
    }

    pub fn count(&self, cue: Cue) -> usize {
        self.cues.borrow().iter().filter(|(c, _)| *c == cue).count()
    }
}

impl CueEmitter for CueLog {
    fn emit(&mut self, cue: Cue, volume: f64) -> Result<(), PortError> {
        self.cues.borrow_mut().push((cue, volume));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_share_state_across_clones() {
        let log = CueLog::new();
        let mut emitter = log.clone();
        emitter.emit(Cue::Breath, 0.3).unwrap();
        assert_eq!(log.cues(), vec![Cue::Breath]);
        assert_eq!(log.volumes(), vec![0.3]);

        let events = EventLog::new();
        let mut renderer = events.clone();
        renderer
            .render(&Event::PreviewStopped { at_ms: 1 })
            .unwrap();
        assert_eq!(events.len(), 1);
    }
}
