//! Hierarchical state machine engine.
//!
//! A machine is described by a state enum, a parent lookup and one handler
//! entry point ([`Hsm`]). Handlers only *request* transitions by returning
//! [`Action::Transition`]; [`StateMachine`] performs the exit/entry walk:
//!
//! 1. Build the `current → top` and `target → top` paths and find their least
//!    common ancestor (LCA). When the target is the current state or one of
//!    its ancestors, the LCA is the target's parent, so the target is exited
//!    and re-entered exactly once.
//! 2. EXIT from the current state up to, not including, the LCA.
//! 3. ENTRY from below the LCA down to the target.
//! 4. INIT on the target, repeating the walk while INIT keeps requesting
//!    transitions.

use core::fmt::Debug;

use log::{debug, trace, warn};

use crate::error::{EdsError, EdsResult};
use crate::event::Event;
use crate::signal::Signal;
use crate::trace::{self as tr, TraceHook, TraceRecord};

/// Deepest supported nesting, counting the state itself.
pub const MAX_STATE_DEPTH: usize = 8;

/// Handler verdict for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<S> {
    /// Not handled here; the event bubbles to the parent state.
    Ignored,
    Handled,
    Transition(S),
}

/// State table and workspace of one machine.
pub trait Hsm: Send + 'static {
    type State: Copy + Eq + Debug + Send + 'static;

    /// Every state of the machine, used for validation.
    const STATES: &'static [Self::State];
    const INITIAL: Self::State;

    /// Enclosing state, `None` for states directly below the implicit top.
    fn parent(state: Self::State) -> Option<Self::State>;

    fn handle(&mut self, state: Self::State, event: &Event) -> Action<Self::State>;
}

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<S> {
    /// Consumed by the given state.
    Handled(S),
    /// Reached the top without being handled.
    Ignored,
    /// A transition ran; `target` is the leaf state after INIT chaining.
    Transitioned { source: S, target: S },
}

type Path<S> = heapless::Vec<S, MAX_STATE_DEPTH>;

pub struct StateMachine<H: Hsm> {
    name: &'static str,
    workspace: H,
    current: Option<H::State>,
    trace: Option<TraceHook>,
}

impl<H: Hsm> StateMachine<H> {
    pub fn new(name: &'static str, workspace: H) -> Self {
        Self {
            name,
            workspace,
            current: None,
            trace: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn set_trace(&mut self, hook: Option<TraceHook>) {
        self.trace = hook;
    }

    /// Current leaf state, `None` before [`init`](Self::init).
    pub fn current(&self) -> Option<H::State> {
        self.current
    }

    /// True when `state` is the current state or one of its ancestors.
    pub fn is_in(&self, state: H::State) -> bool {
        let mut cursor = self.current;
        while let Some(s) = cursor {
            if s == state {
                return true;
            }
            cursor = H::parent(s);
        }
        false
    }

    pub fn workspace(&self) -> &H {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut H {
        &mut self.workspace
    }

    /// Checks the state table: the initial state and every parent are listed
    /// in [`Hsm::STATES`], and every parent chain reaches the top within
    /// [`MAX_STATE_DEPTH`] levels without looping.
    pub fn validate(&self) -> EdsResult<()> {
        if !H::STATES.contains(&H::INITIAL) {
            return Err(self.invalid(format!("initial state {:?} is not in the table", H::INITIAL)));
        }
        for &state in H::STATES {
            let mut cursor = Some(state);
            let mut depth = 0;
            while let Some(s) = cursor {
                depth += 1;
                if depth > MAX_STATE_DEPTH {
                    return Err(self.invalid(format!(
                        "parent chain of {state:?} loops or exceeds {MAX_STATE_DEPTH} levels"
                    )));
                }
                if !H::STATES.contains(&s) {
                    return Err(self.invalid(format!("{s:?} (ancestor of {state:?}) is not in the table")));
                }
                cursor = H::parent(s);
            }
        }
        Ok(())
    }

    /// Enters the initial state, outermost ancestor first, and runs its
    /// INIT chain.
    pub fn init(&mut self) -> EdsResult<()> {
        self.validate()?;
        let path = self.path(H::INITIAL)?;
        for &state in path.iter().rev() {
            self.enter(state);
        }
        self.current = Some(H::INITIAL);
        let settled = self.settle(H::INITIAL)?;
        debug!("{}: started in {:?}", self.name, settled);
        Ok(())
    }

    /// Dispatches one event to completion.
    pub fn dispatch(&mut self, event: &Event) -> EdsResult<Outcome<H::State>> {
        let signal = event.signal();
        if signal.is_pseudo() {
            return Err(EdsError::ReservedSignal(signal));
        }
        let current = self.current.ok_or(EdsError::NotStarted)?;

        let mut cursor = Some(current);
        while let Some(state) = cursor {
            match self.workspace.handle(state, event) {
                Action::Ignored => cursor = H::parent(state),
                Action::Handled => {
                    trace!("{}: {} handled in {:?}", self.name, signal, state);
                    return Ok(Outcome::Handled(state));
                }
                Action::Transition(target) => {
                    debug!("{}: {} {:?} -> {:?}", self.name, signal, current, target);
                    let name = self.name;
                    tr::emit(&self.trace, || TraceRecord::Transition {
                        machine: name,
                        signal,
                        source: format!("{current:?}"),
                        target: format!("{target:?}"),
                    });
                    self.walk(current, target)?;
                    let leaf = self.settle(target)?;
                    return Ok(Outcome::Transitioned {
                        source: current,
                        target: leaf,
                    });
                }
            }
        }

        trace!("{}: {} ignored in {:?}", self.name, signal, current);
        let name = self.name;
        tr::emit(&self.trace, || TraceRecord::Ignored {
            machine: name,
            signal,
            state: format!("{current:?}"),
        });
        Ok(Outcome::Ignored)
    }

    /// Runs INIT on `state` until it stops requesting transitions and
    /// returns the settled leaf.
    fn settle(&mut self, mut state: H::State) -> EdsResult<H::State> {
        let init = Event::new(Signal::INIT);
        for _ in 0..=H::STATES.len() {
            match self.workspace.handle(state, &init) {
                Action::Transition(target) => {
                    let name = self.name;
                    tr::emit(&self.trace, || TraceRecord::StateInit {
                        machine: name,
                        source: format!("{state:?}"),
                        target: format!("{target:?}"),
                    });
                    self.walk(state, target)?;
                    state = target;
                }
                Action::Handled | Action::Ignored => {
                    self.current = Some(state);
                    return Ok(state);
                }
            }
        }
        Err(self.invalid(format!("INIT chain through {state:?} does not settle")))
    }

    fn walk(&mut self, source: H::State, target: H::State) -> EdsResult<()> {
        let source_path = self.path(source)?;
        let target_path = self.path(target)?;

        let lca = if source_path.contains(&target) {
            H::parent(target)
        } else {
            source_path
                .iter()
                .copied()
                .find(|state| target_path.contains(state))
        };

        for &state in source_path.iter() {
            if Some(state) == lca {
                break;
            }
            self.exit(state);
        }

        self.current = Some(target);

        let depth = target_path
            .iter()
            .position(|&state| Some(state) == lca)
            .unwrap_or(target_path.len());
        for &state in target_path[..depth].iter().rev() {
            self.enter(state);
        }
        Ok(())
    }

    /// `state` and its ancestors, innermost first.
    fn path(&self, state: H::State) -> EdsResult<Path<H::State>> {
        let mut path = Path::new();
        let mut cursor = Some(state);
        while let Some(s) = cursor {
            path.push(s)
                .map_err(|_| self.invalid(format!("{state:?} nests deeper than {MAX_STATE_DEPTH} levels")))?;
            cursor = H::parent(s);
        }
        Ok(path)
    }

    fn enter(&mut self, state: H::State) {
        trace!("{}: ENTRY {:?}", self.name, state);
        let name = self.name;
        tr::emit(&self.trace, || TraceRecord::StateEntry {
            machine: name,
            state: format!("{state:?}"),
        });
        self.run_pseudo(state, Signal::ENTRY);
    }

    fn exit(&mut self, state: H::State) {
        trace!("{}: EXIT {:?}", self.name, state);
        let name = self.name;
        tr::emit(&self.trace, || TraceRecord::StateExit {
            machine: name,
            state: format!("{state:?}"),
        });
        self.run_pseudo(state, Signal::EXIT);
    }

    fn run_pseudo(&mut self, state: H::State, signal: Signal) {
        if let Action::Transition(target) = self.workspace.handle(state, &Event::new(signal)) {
            warn!(
                "{}: transition to {:?} requested from {} of {:?} ignored",
                self.name, target, signal, state
            );
        }
    }

    fn invalid(&self, reason: String) -> EdsError {
        EdsError::InvalidTransition {
            machine: self.name,
            reason,
        }
    }
}
