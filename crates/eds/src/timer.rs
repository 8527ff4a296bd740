//! Virtual timers.
//!
//! A [`VTimer`] counts down in ticks of the [`TimerWheel`] it is registered
//! with. On expiry it either posts a signal to an EPA or runs a callback in
//! interrupt context. Each arm or cancel bumps the timer's generation; an
//! expiry collected under an older generation is dropped, so a re-armed or
//! cancelled timer never delivers its previous action. Timers expiring on
//! the same tick fire in the order they were armed.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::epa::EpaId;
use crate::error::{EdsError, EdsResult};
use crate::event::Event;
use crate::kernel::{IsrContext, Kernel};
use crate::signal::Signal;
use crate::sync::{Arc, Mutex};
use crate::trace::{self as tr, TraceHook, TraceRecord};

/// Arming order shared by all timers, used to break ties within one tick.
static ARM_SEQ: AtomicU64 = AtomicU64::new(0);

/// Interrupt-context expiry callback.
pub type TimerCallback = Arc<dyn Fn(&IsrContext<'_>) + Send + Sync>;

/// What an expiring timer does.
#[derive(Clone)]
pub enum TimerAction {
    /// Post `signal` to `target`, at the front of its mailbox when `ahead`.
    Post {
        target: EpaId,
        signal: Signal,
        ahead: bool,
    },
    Callback(TimerCallback),
}

impl TimerAction {
    pub fn post(target: EpaId, signal: Signal) -> Self {
        Self::Post {
            target,
            signal,
            ahead: false,
        }
    }

    pub fn post_ahead(target: EpaId, signal: Signal) -> Self {
        Self::Post {
            target,
            signal,
            ahead: true,
        }
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&IsrContext<'_>) + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }
}

impl fmt::Debug for TimerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post {
                target,
                signal,
                ahead,
            } => f
                .debug_struct("Post")
                .field("target", target)
                .field("signal", signal)
                .field("ahead", ahead)
                .finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

struct TimerInner {
    armed: bool,
    remaining: u32,
    period: u32,
    generation: u64,
    seq: u64,
    action: Option<TimerAction>,
}

struct Expiry {
    seq: u64,
    generation: u64,
    action: TimerAction,
}

enum Fire {
    Done(EdsResult<()>),
    Stale,
}

pub struct VTimer {
    name: &'static str,
    inner: Mutex<TimerInner>,
    trace: Mutex<Option<TraceHook>>,
}

impl VTimer {
    /// Creates a disarmed timer.
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            inner: Mutex::new(TimerInner {
                armed: false,
                remaining: 0,
                period: 0,
                generation: 0,
                seq: 0,
                action: None,
            }),
            trace: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Arms a one-shot expiry `ticks` from now, replacing any pending one.
    /// Zero ticks is treated as one.
    pub fn start(&self, ticks: u32, action: TimerAction) {
        self.arm(ticks, 0, action);
    }

    /// Arms a first expiry after `ticks`, then every `period` ticks.
    pub fn start_periodic(&self, ticks: u32, period: u32, action: TimerAction) {
        self.arm(ticks, period, action);
    }

    /// Disarms the timer. Returns false when it was not armed.
    pub fn cancel(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        if !inner.armed {
            return false;
        }
        let remaining = inner.remaining;
        inner.armed = false;
        inner.remaining = 0;
        inner.action = None;
        drop(inner);

        let timer = self.name;
        tr::emit(&self.trace.lock(), || TraceRecord::TimerDisarm { timer, remaining });
        true
    }

    pub fn is_armed(&self) -> bool {
        self.inner.lock().armed
    }

    /// Ticks left until the next expiry, `None` while disarmed.
    pub fn remaining(&self) -> Option<u32> {
        let inner = self.inner.lock();
        inner.armed.then_some(inner.remaining)
    }

    pub(crate) fn set_trace(&self, hook: Option<TraceHook>) {
        *self.trace.lock() = hook;
    }

    fn arm(&self, ticks: u32, period: u32, action: TimerAction) {
        let ticks = ticks.max(1);
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.seq = ARM_SEQ.fetch_add(1, Ordering::Relaxed);
        inner.armed = true;
        inner.remaining = ticks;
        inner.period = period;
        inner.action = Some(action);
        drop(inner);

        let timer = self.name;
        tr::emit(&self.trace.lock(), || TraceRecord::TimerArm {
            timer,
            ticks,
            period,
        });
    }

    fn poll(&self) -> Option<Expiry> {
        let mut inner = self.inner.lock();
        if !inner.armed {
            return None;
        }
        inner.remaining = inner.remaining.saturating_sub(1);
        if inner.remaining > 0 {
            return None;
        }

        let action = if inner.period > 0 {
            inner.remaining = inner.period;
            inner.action.clone()
        } else {
            inner.armed = false;
            inner.action.take()
        }?;
        Some(Expiry {
            seq: inner.seq,
            generation: inner.generation,
            action,
        })
    }

    fn fire(&self, isr: &IsrContext<'_>, expiry: Expiry) -> Fire {
        let inner = self.inner.lock();
        if inner.generation != expiry.generation {
            return Fire::Stale;
        }
        match expiry.action {
            TimerAction::Post {
                target,
                signal,
                ahead,
            } => {
                // Sent under the timer lock so a concurrent cancel either
                // wins before the send or finds the event already queued.
                let event = Event::new(signal);
                let result = if ahead {
                    isr.send_ahead_i(target, event)
                } else {
                    isr.send_i(target, event)
                };
                drop(inner);
                if result.is_ok() {
                    let timer = self.name;
                    tr::emit(&self.trace.lock(), || TraceRecord::TimerPost {
                        timer,
                        signal,
                        target,
                    });
                }
                Fire::Done(result)
            }
            TimerAction::Callback(callback) => {
                drop(inner);
                callback(isr);
                Fire::Done(Ok(()))
            }
        }
    }
}

impl fmt::Debug for VTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VTimer")
            .field("name", &self.name)
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Outcome of one [`TimerWheel::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    pub fired: usize,
    /// Expiries dropped because the timer was re-armed or cancelled first.
    pub stale: usize,
    /// Expiries whose post was rejected, by timer name.
    pub failed: Vec<(&'static str, EdsError)>,
}

impl TickReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Converts milliseconds to ticks at `tick_hz`, rounding up, at least one.
pub fn ms_to_ticks(ms: u32, tick_hz: u32) -> u32 {
    let ticks = (u64::from(ms) * u64::from(tick_hz)).div_ceil(1000);
    ticks.clamp(1, u64::from(u32::MAX)) as u32
}

/// Tick-driven set of timers.
pub struct TimerWheel {
    kernel: Arc<Kernel>,
    timers: Mutex<Vec<Arc<VTimer>>>,
}

impl TimerWheel {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            timers: Mutex::new(Vec::new()),
        }
    }

    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn register(&self, timer: Arc<VTimer>) {
        timer.set_trace(self.kernel.trace_hook());
        self.timers.lock().push(timer);
    }

    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        ms_to_ticks(ms, self.kernel.config().tick_hz)
    }

    /// Advances every armed timer by one tick and fires the expired ones.
    ///
    /// Runs in interrupt context: it never waits for a dispatch and
    /// reports rejected posts instead of logging them.
    pub fn tick(&self) -> TickReport {
        let timers = self.timers.lock().clone();
        let mut due: Vec<(Arc<VTimer>, Expiry)> = timers
            .into_iter()
            .filter_map(|timer| timer.poll().map(|expiry| (timer, expiry)))
            .collect();
        due.sort_by_key(|(_, expiry)| expiry.seq);

        let isr = self.kernel.isr();
        let mut report = TickReport::default();
        for (timer, expiry) in due {
            match timer.fire(&isr, expiry) {
                Fire::Done(Ok(())) => report.fired += 1,
                Fire::Done(Err(err)) => report.failed.push((timer.name(), err)),
                Fire::Stale => report.stale += 1,
            }
        }
        report
    }
}
