//! Event primitives.
//!
//! An [`Event`] is either a bare signal (pseudo-events, timer expiries and
//! other payload-free notifications) or a pool-allocated [`DynamicEvent`]
//! carrying a typed payload. Dynamic events are shared by reference count and
//! hand their pool block back when the last reference is dropped.

use core::any::Any;
use core::fmt;

use crate::pool::PoolBlock;
use crate::signal::Signal;
use crate::sync::Arc;

/// Pool-allocated event with an immutable signal and payload.
pub struct DynamicEvent {
    signal: Signal,
    payload: Box<dyn Any + Send + Sync>,
    block: PoolBlock,
}

impl DynamicEvent {
    pub(crate) fn new(signal: Signal, payload: Box<dyn Any + Send + Sync>, block: PoolBlock) -> Self {
        Self {
            signal,
            payload,
            block,
        }
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Block size of the pool the event was drawn from.
    pub fn block_size(&self) -> usize {
        self.block.block_size()
    }
}

impl fmt::Debug for DynamicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicEvent")
            .field("signal", &self.signal)
            .field("block_size", &self.block.block_size())
            .finish_non_exhaustive()
    }
}

/// Event delivered to an EPA.
#[derive(Clone)]
pub enum Event {
    Static(Signal),
    Dynamic(Arc<DynamicEvent>),
}

impl Event {
    pub const fn new(signal: Signal) -> Self {
        Self::Static(signal)
    }

    pub fn signal(&self) -> Signal {
        match self {
            Self::Static(signal) => *signal,
            Self::Dynamic(event) => event.signal(),
        }
    }

    /// Typed payload of a dynamic event.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        match self {
            Self::Static(_) => None,
            Self::Dynamic(event) => event.payload::<T>(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Live references to a dynamic event, `None` for static ones.
    pub fn ref_count(&self) -> Option<usize> {
        match self {
            Self::Static(_) => None,
            Self::Dynamic(event) => Some(Arc::strong_count(event)),
        }
    }
}

impl From<Signal> for Event {
    fn from(signal: Signal) -> Self {
        Self::Static(signal)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(signal) => write!(f, "Event({signal})"),
            Self::Dynamic(event) => {
                write!(f, "Event({}, rc={})", event.signal(), Arc::strong_count(event))
            }
        }
    }
}
