//! Porator detector.
//!
//! Debounces the pad switch input. An edge disables edge detection and arms a
//! settle timer; when the timer expires the level is sampled, the consumer EPA
//! receives [`PDETECT_PRESS`] for a high level or [`PDETECT_RELEASE`] for a
//! low one, and edge detection is enabled again.
//!
//! Both handlers run in interrupt context: they only use the `_i` services and
//! never log. Lost notifications and failed pin interrupt calls are counted
//! instead. A failed re-enable is retried after another settle period.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use eds::{EpaId, IsrContext, TimerAction, VTimer};
use vt_hal::{Edge, GpioPinInterrupt, HalResult, Level, PinMode};

use crate::signals::{PDETECT_PRESS, PDETECT_RELEASE};

pub struct PoratorDetector {
    pin: Arc<dyn GpioPinInterrupt>,
    timer: Arc<VTimer>,
    consumer: EpaId,
    settle_ticks: u32,
    dropped: AtomicU32,
    pin_faults: AtomicU32,
}

impl PoratorDetector {
    pub fn new(pin: Arc<dyn GpioPinInterrupt>, consumer: EpaId, settle_ticks: u32) -> Arc<Self> {
        Arc::new(Self {
            pin,
            timer: VTimer::new("pdetector.settle"),
            consumer,
            settle_ticks: settle_ticks.max(1),
            dropped: AtomicU32::new(0),
            pin_faults: AtomicU32::new(0),
        })
    }

    /// Settle timer, to be registered on the timer wheel.
    pub fn timer(&self) -> Arc<VTimer> {
        Arc::clone(&self.timer)
    }

    /// Notifications lost to a full mailbox or an exhausted pool.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Failed attempts to disable or re-enable edge detection.
    pub fn pin_faults(&self) -> u32 {
        self.pin_faults.load(Ordering::Relaxed)
    }

    /// Configures the input with a pull-down and enables edge detection.
    pub fn install(self: &Arc<Self>) -> HalResult<()> {
        self.pin.set_mode(PinMode::InputPullDown)?;
        let detector = Arc::downgrade(self);
        self.pin.set_edge_callback(Arc::new(move || {
            if let Some(detector) = detector.upgrade() {
                detector.on_edge();
            }
        }))?;
        self.pin.enable_interrupt(Edge::Both)
    }

    fn on_edge(self: &Arc<Self>) {
        if self.pin.disable_interrupt().is_err() {
            self.pin_faults.fetch_add(1, Ordering::Relaxed);
        }
        self.after_settle(Self::on_settled);
    }

    fn on_settled(self: &Arc<Self>, isr: &IsrContext<'_>) {
        let signal = match self.pin.read() {
            Ok(Level::High) => Some(PDETECT_PRESS),
            Ok(Level::Low) => Some(PDETECT_RELEASE),
            Err(_) => None,
        };
        let delivered = signal
            .map(|signal| {
                isr.create_event_i(signal, ())
                    .and_then(|event| isr.send_i(self.consumer, event))
                    .is_ok()
            })
            .unwrap_or(false);
        if !delivered {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.resume(isr);
    }

    fn resume(self: &Arc<Self>, _isr: &IsrContext<'_>) {
        if self.pin.enable_interrupt(Edge::Both).is_err() {
            self.pin_faults.fetch_add(1, Ordering::Relaxed);
            self.after_settle(Self::resume);
        }
    }

    /// Runs `step` once the settle time has passed, replacing any pending step.
    fn after_settle(self: &Arc<Self>, step: fn(&Arc<Self>, &IsrContext<'_>)) {
        let detector: Weak<Self> = Arc::downgrade(self);
        self.timer.start(
            self.settle_ticks,
            TimerAction::callback(move |isr| {
                if let Some(detector) = detector.upgrade() {
                    step(&detector, isr);
                }
            }),
        );
    }
}
