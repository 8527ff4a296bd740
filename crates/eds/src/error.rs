//! Framework error type.

use thiserror::Error;

use crate::epa::EpaId;
use crate::signal::Signal;

/// Errors reported by the framework.
///
/// Interrupt-context entry points return these as plain status values; they
/// never log or panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdsError {
    #[error("event pool exhausted")]
    OutOfMemory,
    #[error("no event pool holds a {0}-byte payload")]
    InvalidSize(usize),
    #[error("mailbox of {0} is full")]
    QueueFull(EpaId),
    #[error("{0} is not registered")]
    NotFound(EpaId),
    #[error("priority {0} is outside 1..=63")]
    InvalidPriority(u8),
    #[error("priority {0} is used by more than one EPA")]
    DuplicatePriority(u8),
    #[error("{count} EPAs exceed the configured maximum of {max}")]
    TooManyEpas { count: usize, max: u8 },
    #[error("invalid transition in {machine}: {reason}")]
    InvalidTransition {
        machine: &'static str,
        reason: String,
    },
    #[error("signal ranges {first} and {second} overlap")]
    SignalRangeOverlap {
        first: &'static str,
        second: &'static str,
    },
    #[error("signal range {0} must be non-empty and public")]
    InvalidSignalRange(&'static str),
    #[error("{0} is reserved for the state machine engine")]
    ReservedSignal(Signal),
    #[error("kernel has not been started")]
    NotStarted,
    #[error("kernel has already been started")]
    AlreadyStarted,
    #[error("dispatch already in progress")]
    Reentrant,
}

pub type EdsResult<T> = Result<T, EdsError>;
