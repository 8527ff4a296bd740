//! Synchronisation primitives shared by the framework.
//!
//! Task-level state is guarded by `parking_lot` locks, which never poison.
//! Mailboxes use `critical_section` directly so that interrupt-context
//! enqueues stay short and lock-order free.

pub use parking_lot::{Condvar, Mutex, MutexGuard};
pub use std::sync::{Arc, Weak};
