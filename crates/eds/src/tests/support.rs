//! Shared test machines.

use std::sync::{Arc, Mutex};

use crate::event::Event;
use crate::hsm::{Action, Hsm};
use crate::signal::Signal;

/// Flat machine recording every user signal it receives.
#[derive(Clone, Default)]
pub struct Collector {
    pub events: Arc<Mutex<Vec<Signal>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
}

impl Hsm for Collector {
    type State = CollectorState;

    const STATES: &'static [CollectorState] = &[CollectorState::Idle];
    const INITIAL: CollectorState = CollectorState::Idle;

    fn parent(_state: CollectorState) -> Option<CollectorState> {
        None
    }

    fn handle(&mut self, _state: CollectorState, event: &Event) -> Action<CollectorState> {
        let signal = event.signal();
        if signal.is_pseudo() {
            return Action::Ignored;
        }
        self.events.lock().unwrap().push(signal);
        Action::Handled
    }
}

impl Collector {
    pub fn seen(&self) -> Vec<Signal> {
        self.events.lock().unwrap().clone()
    }
}
