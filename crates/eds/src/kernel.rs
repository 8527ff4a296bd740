//! Cooperative run-to-completion scheduler and send services.
//!
//! The kernel owns every registered EPA in a slot table indexed by priority
//! and keeps a ready bitmap with one bit per non-empty mailbox. Each
//! scheduling step picks the highest ready priority, dispatches exactly one
//! event to completion and repeats; lower priorities run only when every
//! higher mailbox is empty.

use core::any::Any;
use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::epa::{EpaId, EpaRef};
use crate::error::{EdsError, EdsResult};
use crate::event::Event;
use crate::mailbox::MailboxStats;
use crate::pool::{EventPools, PoolConfig, PoolStats};
use crate::signal::{Signal, SignalRange};
use crate::sync::{Condvar, Mutex};
use crate::trace::{self as tr, TraceHook, TraceRecord};

/// Highest usable priority. Priority 0 is reserved for the idle loop.
pub const MAX_PRIORITY: u8 = 63;

/// Kernel sizing and runtime options.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub name: &'static str,
    pub max_active: u8,
    /// Rate of the tick source driving the timer wheel.
    pub tick_hz: u32,
    /// Longest sleep of [`Kernel::run`] when no EPA is ready.
    pub idle_timeout: Duration,
    pub idle_callback: Option<fn()>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            name: "EDS",
            max_active: 16,
            tick_hz: 100,
            idle_timeout: Duration::from_millis(10),
            idle_callback: None,
        }
    }
}

impl KernelConfig {
    /// Creates a new kernel configuration builder.
    pub fn builder() -> KernelConfigBuilder {
        KernelConfigBuilder::default()
    }
}

/// Builder for ergonomic kernel configuration construction.
#[derive(Debug, Clone, Default)]
pub struct KernelConfigBuilder {
    config: KernelConfig,
}

impl KernelConfigBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.config.name = name;
        self
    }

    /// Sets the maximum number of EPAs the kernel accepts.
    pub fn max_active(mut self, max: u8) -> Self {
        self.config.max_active = max;
        self
    }

    pub fn tick_hz(mut self, hz: u32) -> Self {
        self.config.tick_hz = hz;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Sets the function called each time the scheduler runs out of work.
    pub fn idle_callback(mut self, callback: fn()) -> Self {
        self.config.idle_callback = Some(callback);
        self
    }

    pub fn build(self) -> KernelConfig {
        self.config
    }
}

pub struct KernelBuilder {
    config: KernelConfig,
    objects: Vec<EpaRef>,
    pools: Vec<PoolConfig>,
    ranges: Vec<SignalRange>,
    trace: Option<TraceHook>,
}

impl KernelBuilder {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            objects: Vec::new(),
            pools: Vec::new(),
            ranges: Vec::new(),
            trace: None,
        }
    }

    pub fn register(mut self, object: EpaRef) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pools.push(pool);
        self
    }

    /// Reserves a block of public signals for one module.
    pub fn reserve(mut self, range: SignalRange) -> Self {
        self.ranges.push(range);
        self
    }

    pub fn with_trace_hook(mut self, hook: TraceHook) -> Self {
        self.trace = Some(hook);
        self
    }

    /// Validates priorities, signal ranges and every state table.
    pub fn build(mut self) -> EdsResult<Kernel> {
        if self.objects.len() > usize::from(self.config.max_active) {
            return Err(EdsError::TooManyEpas {
                count: self.objects.len(),
                max: self.config.max_active,
            });
        }

        let mut slots: Vec<Option<EpaRef>> = vec![None; usize::from(MAX_PRIORITY) + 1];
        self.objects.sort_by_key(|epa| epa.priority());
        for epa in &self.objects {
            let prio = epa.priority();
            if prio == 0 || prio > MAX_PRIORITY {
                return Err(EdsError::InvalidPriority(prio));
            }
            let slot = &mut slots[usize::from(prio)];
            if slot.is_some() {
                return Err(EdsError::DuplicatePriority(prio));
            }
            epa.validate()?;
            *slot = Some(EpaRef::clone(epa));
        }

        for (idx, range) in self.ranges.iter().enumerate() {
            if !range.is_well_formed() {
                return Err(EdsError::InvalidSignalRange(range.name));
            }
            if let Some(other) = self.ranges[..idx].iter().find(|r| r.overlaps(range)) {
                return Err(EdsError::SignalRangeOverlap {
                    first: other.name,
                    second: range.name,
                });
            }
        }

        Ok(Kernel {
            config: self.config,
            slots,
            order: self.objects,
            ready: ReadySet::default(),
            pools: EventPools::new(self.pools),
            ranges: self.ranges,
            trace: self.trace,
            started: AtomicBool::new(false),
            dispatching: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
            prev_prio: AtomicU8::new(0),
            signal_lock: Mutex::new(()),
            idle_waiters: AtomicUsize::new(0),
            ready_cv: Condvar::new(),
            space_cv: Condvar::new(),
        })
    }
}

/// One bit per priority with a non-empty mailbox.
#[derive(Default)]
struct ReadySet {
    bits: AtomicU64,
}

impl ReadySet {
    fn insert(&self, prio: u8) {
        self.bits.fetch_or(1u64 << prio, Ordering::SeqCst);
    }

    fn remove(&self, prio: u8) {
        self.bits.fetch_and(!(1u64 << prio), Ordering::AcqRel);
    }

    fn max(&self) -> Option<u8> {
        let bits = self.bits.load(Ordering::Acquire);
        if bits == 0 {
            None
        } else {
            Some(63 - bits.leading_zeros() as u8)
        }
    }

    fn any(&self) -> bool {
        self.bits.load(Ordering::SeqCst) != 0
    }
}

pub struct Kernel {
    config: KernelConfig,
    slots: Vec<Option<EpaRef>>,
    order: Vec<EpaRef>,
    ready: ReadySet,
    pools: EventPools,
    ranges: Vec<SignalRange>,
    trace: Option<TraceHook>,
    started: AtomicBool,
    dispatching: AtomicBool,
    dispatcher: Mutex<Option<ThreadId>>,
    prev_prio: AtomicU8,
    signal_lock: Mutex<()>,
    /// Schedulers parked in `wait_for_work`.
    idle_waiters: AtomicUsize,
    ready_cv: Condvar,
    space_cv: Condvar,
}

impl Kernel {
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> KernelBuilder {
        KernelBuilder::new(config)
    }

    /// Runs the initial transition of every EPA, lowest priority first.
    ///
    /// When an initial transition fails the kernel is left stopped, so
    /// nothing is dispatched to a machine stranded mid-initialisation.
    pub fn start(&self) -> EdsResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(EdsError::AlreadyStarted);
        }
        for epa in &self.order {
            if let Err(err) = epa.start(self.trace.clone()) {
                self.started.store(false, Ordering::Release);
                error!(
                    "{}: initial transition of {} failed: {err}",
                    self.config.name,
                    epa.name()
                );
                return Err(err);
            }
        }
        info!(
            "{}: started {} EPAs, {} signal ranges",
            self.config.name,
            self.order.len(),
            self.ranges.len()
        );
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Queues `event` at the back of the target mailbox (task context).
    pub fn send(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.deliver(target, event, false).map_err(|(err, signal)| {
            warn!("{}: {signal} to {target} rejected: {err}", self.config.name);
            if let EdsError::QueueFull(_) = err {
                tr::emit(&self.trace, || TraceRecord::QueueFull { target, signal });
            }
            err
        })
    }

    /// Queues `event` at the front of the target mailbox (task context).
    pub fn send_ahead(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.deliver(target, event, true).map_err(|(err, signal)| {
            warn!("{}: {signal} ahead to {target} rejected: {err}", self.config.name);
            err
        })
    }

    /// Interrupt-safe variant of [`send`](Self::send). It never logs and
    /// never waits for a dispatch. The scheduler's wake lock is taken only
    /// while a scheduler is parked idle, and no holder of that lock waits on
    /// anything else.
    pub fn send_i(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.deliver(target, event, false).map_err(|(err, _)| err)
    }

    /// Interrupt-safe variant of [`send_ahead`](Self::send_ahead).
    pub fn send_ahead_i(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.deliver(target, event, true).map_err(|(err, _)| err)
    }

    /// Waits up to `timeout` for room in the target mailbox.
    ///
    /// Called from the scheduler thread it behaves like [`send`](Self::send)
    /// and fails fast with `QueueFull`, since waiting there would wait on
    /// itself.
    pub fn send_blocking(&self, target: EpaId, event: Event, timeout: Duration) -> EdsResult<()> {
        if self.on_scheduler_thread() {
            return self.send(target, event);
        }
        let epa = self.lookup(target)?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.deliver(target, event.clone(), false) {
                Ok(()) => return Ok(()),
                Err((EdsError::QueueFull(_), _)) => {}
                Err((err, _)) => return Err(err),
            }
            let mut guard = self.signal_lock.lock();
            if epa.is_full() && self.space_cv.wait_until(&mut guard, deadline).timed_out() {
                drop(guard);
                return self.send(target, event);
            }
        }
    }

    /// Allocates a payload-carrying event from the best-fitting pool.
    pub fn create_event<T>(&self, signal: Signal, payload: T) -> EdsResult<Event>
    where
        T: Any + Send + Sync,
    {
        self.pools.alloc(signal, payload).map_err(|err| {
            warn!("{}: event {signal} not allocated: {err}", self.config.name);
            err
        })
    }

    /// Interrupt-safe variant of [`create_event`](Self::create_event).
    pub fn create_event_i<T>(&self, signal: Signal, payload: T) -> EdsResult<Event>
    where
        T: Any + Send + Sync,
    {
        self.pools.alloc(signal, payload)
    }

    /// Handle restricted to the interrupt-safe services.
    pub fn isr(&self) -> IsrContext<'_> {
        IsrContext { kernel: self }
    }

    /// Dispatches one event of the highest-priority ready EPA.
    ///
    /// Returns `Ok(false)` when every mailbox is empty. Calling it from inside
    /// a dispatch fails with `Reentrant`.
    pub fn dispatch_once(&self) -> EdsResult<bool> {
        if !self.is_started() {
            return Err(EdsError::NotStarted);
        }
        if self.dispatching.swap(true, Ordering::AcqRel) {
            return Err(EdsError::Reentrant);
        }
        let result = self.dispatch_ready();
        self.dispatching.store(false, Ordering::Release);
        result
    }

    /// Dispatches until every mailbox is empty, then runs the idle callback.
    /// Returns the number of dispatched events.
    pub fn run_until_idle(&self) -> EdsResult<usize> {
        let mut dispatched = 0;
        while self.dispatch_once()? {
            dispatched += 1;
        }
        if let Some(idle_cb) = self.config.idle_callback {
            idle_cb();
        }
        Ok(dispatched)
    }

    /// Scheduler loop: dispatches while work is pending and sleeps until the
    /// next send or `idle_timeout` otherwise. Returns once `stop` is set.
    ///
    /// A failed dispatch is logged by the EPA and the loop carries on.
    pub fn run(&self, stop: &AtomicBool) -> EdsResult<()> {
        debug!("{}: scheduler loop running", self.config.name);
        while !stop.load(Ordering::Acquire) {
            match self.dispatch_once() {
                Ok(true) => {}
                Ok(false) => {
                    if let Some(idle_cb) = self.config.idle_callback {
                        idle_cb();
                    }
                    self.wait_for_work(self.config.idle_timeout);
                }
                Err(err @ (EdsError::NotStarted | EdsError::Reentrant)) => return Err(err),
                Err(_) => {}
            }
        }
        debug!("{}: scheduler loop stopped", self.config.name);
        Ok(())
    }

    /// Wakes a scheduler sleeping in [`run`](Self::run).
    pub fn wake(&self) {
        let _guard = self.signal_lock.lock();
        self.ready_cv.notify_all();
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn trace_hook(&self) -> Option<TraceHook> {
        self.trace.clone()
    }

    pub fn signal_ranges(&self) -> &[SignalRange] {
        &self.ranges
    }

    pub fn pool_stats(&self) -> Vec<PoolStats> {
        self.pools.stats()
    }

    pub fn mailbox_stats(&self, target: EpaId) -> EdsResult<MailboxStats> {
        Ok(self.lookup(target)?.mailbox_stats())
    }

    pub fn epa(&self, target: EpaId) -> EdsResult<&EpaRef> {
        self.lookup(target)
    }
}

impl Kernel {
    fn lookup(&self, target: EpaId) -> EdsResult<&EpaRef> {
        self.slots
            .get(usize::from(target.priority()))
            .and_then(Option::as_ref)
            .ok_or(EdsError::NotFound(target))
    }

    fn deliver(
        &self,
        target: EpaId,
        event: Event,
        ahead: bool,
    ) -> Result<(), (EdsError, Signal)> {
        let signal = event.signal();
        if signal.is_pseudo() {
            return Err((EdsError::ReservedSignal(signal), signal));
        }
        let epa = self.lookup(target).map_err(|err| (err, signal))?;
        let posted = if ahead {
            epa.post_ahead(event)
        } else {
            epa.post(event)
        };
        posted.map_err(|err| (err, signal))?;
        self.ready.insert(target.priority());
        // The ready bit is published before the waiter count is read, and a
        // parking scheduler counts itself before checking the bits, so one
        // of the two always sees the other.
        if self.idle_waiters.load(Ordering::SeqCst) > 0 {
            self.wake();
        }
        Ok(())
    }

    fn dispatch_ready(&self) -> EdsResult<bool> {
        *self.dispatcher.lock() = Some(thread::current().id());
        loop {
            let Some(prio) = self.ready.max() else {
                self.note_idle();
                return Ok(false);
            };
            let Some(epa) = self.slots[usize::from(prio)].clone() else {
                self.ready.remove(prio);
                continue;
            };
            self.note_next(prio);

            let result = epa.dispatch_one();
            self.ready.remove(prio);
            if epa.has_events() {
                self.ready.insert(prio);
            }
            {
                let _guard = self.signal_lock.lock();
                self.space_cv.notify_all();
            }
            match result {
                Ok(false) => continue,
                other => return other,
            }
        }
    }

    fn wait_for_work(&self, timeout: Duration) {
        let mut guard = self.signal_lock.lock();
        self.idle_waiters.fetch_add(1, Ordering::SeqCst);
        if !self.ready.any() {
            let _ = self.ready_cv.wait_for(&mut guard, timeout);
        }
        self.idle_waiters.fetch_sub(1, Ordering::SeqCst);
    }

    fn on_scheduler_thread(&self) -> bool {
        *self.dispatcher.lock() == Some(thread::current().id())
    }

    fn note_next(&self, prio: u8) {
        let prev = self.prev_prio.swap(prio, Ordering::AcqRel);
        if prev != prio {
            tr::emit(&self.trace, || TraceRecord::SchedNext { prio, prev });
        }
    }

    fn note_idle(&self) {
        let prev = self.prev_prio.swap(0, Ordering::AcqRel);
        if prev != 0 {
            tr::emit(&self.trace, || TraceRecord::SchedIdle { prev });
        }
    }
}

/// Interrupt-context view of the kernel.
///
/// Timer callbacks and GPIO edge handlers receive this instead of the kernel
/// so that only the non-logging services that never wait for a dispatch are
/// reachable.
#[derive(Clone, Copy)]
pub struct IsrContext<'k> {
    kernel: &'k Kernel,
}

impl<'k> IsrContext<'k> {
    pub fn send_i(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.kernel.send_i(target, event)
    }

    pub fn send_ahead_i(&self, target: EpaId, event: Event) -> EdsResult<()> {
        self.kernel.send_ahead_i(target, event)
    }

    pub fn create_event_i<T>(&self, signal: Signal, payload: T) -> EdsResult<Event>
    where
        T: Any + Send + Sync,
    {
        self.kernel.create_event_i(signal, payload)
    }
}
