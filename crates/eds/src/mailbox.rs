//! Bounded EPA mailbox.
//!
//! Every operation runs inside a critical section, so the same mailbox can
//! be filled from task context, timer callbacks and GPIO interrupts while the
//! dispatcher drains it. Overflow rejects the new event and hands it back to
//! the caller; queued events are never displaced.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::event::Event;

/// Snapshot of mailbox occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MailboxStats {
    pub capacity: usize,
    pub len: usize,
    /// Highest `len` observed since creation.
    pub peak: usize,
}

struct Inner<const N: usize> {
    queue: Deque<Event, N>,
    peak: usize,
}

/// Bounded FIFO of events with room for `N` entries.
pub struct Mailbox<const N: usize> {
    inner: Mutex<RefCell<Inner<N>>>,
}

impl<const N: usize> Mailbox<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                queue: Deque::new(),
                peak: 0,
            })),
        }
    }

    /// Appends `event`; returns it back when the mailbox is full.
    pub fn post(&self, event: Event) -> Result<(), Event> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.queue.push_back(event)?;
            let len = inner.queue.len();
            if len > inner.peak {
                inner.peak = len;
            }
            Ok(())
        })
    }

    /// Inserts `event` at the front so it is dispatched next.
    pub fn post_ahead(&self, event: Event) -> Result<(), Event> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.queue.push_front(event)?;
            let len = inner.queue.len();
            if len > inner.peak {
                inner.peak = len;
            }
            Ok(())
        })
    }

    pub fn pop(&self) -> Option<Event> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).queue.pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).queue.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.inner.borrow_ref(cs).queue.is_full())
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn stats(&self) -> MailboxStats {
        critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            MailboxStats {
                capacity: N,
                len: inner.queue.len(),
                peak: inner.peak,
            }
        })
    }
}

impl<const N: usize> Default for Mailbox<N> {
    fn default() -> Self {
        Self::new()
    }
}
