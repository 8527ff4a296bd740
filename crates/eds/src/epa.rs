//! Event processing agents.
//!
//! An EPA couples a bounded [`Mailbox`] with a [`StateMachine`]. It is
//! created once at start-up, registered with the kernel and lives for the
//! rest of the process. EPAs are addressed by their priority, which is
//! unique within a kernel.

use core::fmt;

use log::error;

use crate::error::{EdsError, EdsResult};
use crate::event::Event;
use crate::hsm::{Hsm, StateMachine};
use crate::mailbox::{Mailbox, MailboxStats};
use crate::sync::{Arc, Mutex};
use crate::trace::TraceHook;

/// Address of an EPA: its scheduling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EpaId(pub u8);

impl EpaId {
    pub const fn new(priority: u8) -> Self {
        Self(priority)
    }

    pub const fn priority(self) -> u8 {
        self.0
    }
}

impl fmt::Display for EpaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPA#{}", self.0)
    }
}

/// Static description of an EPA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpaDefine {
    pub name: &'static str,
    pub priority: u8,
}

impl EpaDefine {
    pub const fn new(name: &'static str, priority: u8) -> Self {
        Self { name, priority }
    }

    pub const fn id(&self) -> EpaId {
        EpaId(self.priority)
    }
}

/// Object-safe interface the kernel schedules through.
pub trait ActiveRunnable: Send + Sync {
    fn id(&self) -> EpaId;
    fn name(&self) -> &'static str;

    fn priority(&self) -> u8 {
        self.id().priority()
    }

    fn validate(&self) -> EdsResult<()>;
    fn start(&self, trace: Option<TraceHook>) -> EdsResult<()>;

    /// Dispatches the oldest event; `Ok(false)` when the mailbox was empty.
    fn dispatch_one(&self) -> EdsResult<bool>;

    fn post(&self, event: Event) -> EdsResult<()>;
    fn post_ahead(&self, event: Event) -> EdsResult<()>;
    fn has_events(&self) -> bool;
    fn is_full(&self) -> bool;
    fn mailbox_stats(&self) -> MailboxStats;
}

pub type EpaRef = Arc<dyn ActiveRunnable>;

/// EPA running machine `H` with a mailbox of `Q` events.
pub struct Epa<H: Hsm, const Q: usize> {
    define: EpaDefine,
    mailbox: Mailbox<Q>,
    machine: Mutex<StateMachine<H>>,
}

impl<H: Hsm, const Q: usize> Epa<H, Q> {
    pub fn new(define: EpaDefine, workspace: H) -> Arc<Self> {
        Arc::new(Self {
            define,
            mailbox: Mailbox::new(),
            machine: Mutex::new(StateMachine::new(define.name, workspace)),
        })
    }

    pub fn define(&self) -> EpaDefine {
        self.define
    }

    pub fn current_state(&self) -> Option<H::State> {
        self.machine.lock().current()
    }

    pub fn is_in(&self, state: H::State) -> bool {
        self.machine.lock().is_in(state)
    }

    /// Runs `f` against the workspace outside of any dispatch.
    pub fn with_workspace<R>(&self, f: impl FnOnce(&H) -> R) -> R {
        f(self.machine.lock().workspace())
    }

    pub fn with_workspace_mut<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(self.machine.lock().workspace_mut())
    }
}

impl<H: Hsm, const Q: usize> ActiveRunnable for Epa<H, Q> {
    fn id(&self) -> EpaId {
        self.define.id()
    }

    fn name(&self) -> &'static str {
        self.define.name
    }

    fn validate(&self) -> EdsResult<()> {
        self.machine.lock().validate()
    }

    fn start(&self, trace: Option<TraceHook>) -> EdsResult<()> {
        let mut machine = self.machine.lock();
        machine.set_trace(trace);
        machine.init()
    }

    fn dispatch_one(&self) -> EdsResult<bool> {
        let Some(event) = self.mailbox.pop() else {
            return Ok(false);
        };
        let mut machine = self.machine.lock();
        if let Err(err) = machine.dispatch(&event) {
            error!("{}: dispatch of {} failed: {err}", self.define.name, event.signal());
            return Err(err);
        }
        Ok(true)
    }

    fn post(&self, event: Event) -> EdsResult<()> {
        self.mailbox
            .post(event)
            .map_err(|_| EdsError::QueueFull(self.id()))
    }

    fn post_ahead(&self, event: Event) -> EdsResult<()> {
        self.mailbox
            .post_ahead(event)
            .map_err(|_| EdsError::QueueFull(self.id()))
    }

    fn has_events(&self) -> bool {
        !self.mailbox.is_empty()
    }

    fn is_full(&self) -> bool {
        self.mailbox.is_full()
    }

    fn mailbox_stats(&self) -> MailboxStats {
        self.mailbox.stats()
    }
}
