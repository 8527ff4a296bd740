//! # eds
//!
//! Event-driven framework for the vacuum tester: event processing agents
//! (EPAs) that own a bounded mailbox and a hierarchical state machine, a
//! cooperative run-to-completion scheduler and tick-driven virtual timers.
//!
//! ## Module Overview
//! - [`signal`]  – Signal identifiers, pseudo-signals and public ranges.
//! - [`event`]   – Static and pool-allocated events.
//! - [`pool`]    – Event pools with usage statistics.
//! - [`mailbox`] – Bounded, interrupt-safe EPA mailboxes.
//! - [`hsm`]     – Hierarchical state machine engine.
//! - [`epa`]     – Event processing agents.
//! - [`kernel`]  – Priority scheduler and send services.
//! - [`timer`]   – Virtual timers and the tick-driven timer wheel.
//! - [`trace`]   – Structured trace records and hooks.
//!
//! The kernel owns every EPA. Handles are passed explicitly as
//! `Arc<Kernel>` and [`EpaId`]; there is no global framework state.

pub mod epa;
pub mod error;
pub mod event;
pub mod hsm;
pub mod kernel;
pub mod mailbox;
pub mod pool;
pub mod signal;
pub mod timer;
pub mod trace;

mod sync;

pub use epa::{ActiveRunnable, Epa, EpaDefine, EpaId, EpaRef};
pub use error::{EdsError, EdsResult};
pub use event::{DynamicEvent, Event};
pub use hsm::{Action, Hsm, Outcome, StateMachine, MAX_STATE_DEPTH};
pub use kernel::{IsrContext, Kernel, KernelBuilder, KernelConfig, KernelConfigBuilder};
pub use mailbox::{Mailbox, MailboxStats};
pub use pool::{EventPool, EventPools, PoolConfig, PoolStats};
pub use signal::{Signal, SignalRange};
pub use timer::{ms_to_ticks, TickReport, TimerAction, TimerCallback, TimerWheel, VTimer};
pub use trace::{TraceHook, TraceRecord};

#[cfg(test)]
mod tests;
