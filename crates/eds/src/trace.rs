//! Structured trace records.
//!
//! A [`TraceHook`] installed on the kernel receives one [`TraceRecord`] per
//! engine step: state entry/exit/init, transitions, ignored events, timer
//! activity and scheduler decisions. Records are only built when a hook is
//! installed.

use core::fmt;

use crate::epa::EpaId;
use crate::signal::Signal;
use crate::sync::Arc;

/// Callback receiving trace records.
pub type TraceHook = Arc<dyn Fn(&TraceRecord) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    StateEntry {
        machine: &'static str,
        state: String,
    },
    StateExit {
        machine: &'static str,
        state: String,
    },
    StateInit {
        machine: &'static str,
        source: String,
        target: String,
    },
    Transition {
        machine: &'static str,
        signal: Signal,
        source: String,
        target: String,
    },
    Ignored {
        machine: &'static str,
        signal: Signal,
        state: String,
    },
    TimerArm {
        timer: &'static str,
        ticks: u32,
        period: u32,
    },
    TimerDisarm {
        timer: &'static str,
        remaining: u32,
    },
    TimerPost {
        timer: &'static str,
        signal: Signal,
        target: EpaId,
    },
    SchedNext {
        prio: u8,
        prev: u8,
    },
    SchedIdle {
        prev: u8,
    },
    QueueFull {
        target: EpaId,
        signal: Signal,
    },
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateEntry { machine, state } => write!(f, "{machine}: ENTRY {state}"),
            Self::StateExit { machine, state } => write!(f, "{machine}: EXIT {state}"),
            Self::StateInit {
                machine,
                source,
                target,
            } => write!(f, "{machine}: INIT {source} -> {target}"),
            Self::Transition {
                machine,
                signal,
                source,
                target,
            } => write!(f, "{machine}: {signal} {source} -> {target}"),
            Self::Ignored {
                machine,
                signal,
                state,
            } => write!(f, "{machine}: {signal} ignored in {state}"),
            Self::TimerArm {
                timer,
                ticks,
                period,
            } => write!(f, "timer {timer}: armed {ticks} ticks, period {period}"),
            Self::TimerDisarm { timer, remaining } => {
                write!(f, "timer {timer}: disarmed with {remaining} ticks left")
            }
            Self::TimerPost {
                timer,
                signal,
                target,
            } => write!(f, "timer {timer}: {signal} -> {target}"),
            Self::SchedNext { prio, prev } => write!(f, "sched: next {prio} (prev {prev})"),
            Self::SchedIdle { prev } => write!(f, "sched: idle (prev {prev})"),
            Self::QueueFull { target, signal } => write!(f, "queue full: {signal} -> {target}"),
        }
    }
}

pub(crate) fn emit<F>(hook: &Option<TraceHook>, build: F)
where
    F: FnOnce() -> TraceRecord,
{
    if let Some(hook) = hook {
        hook(&build());
    }
}

/// Trace hook that forwards every record to the `log` facade at trace level.
pub fn log_hook() -> TraceHook {
    Arc::new(|record: &TraceRecord| log::trace!(target: "eds::trace", "{record}"))
}
