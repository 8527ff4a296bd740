//! Signal map of the instrument.
//!
//! Each module publishing events owns one [`SignalRange`] above
//! [`Signal::USER`]; the ranges are reserved on the kernel so overlaps are
//! caught at build time. GUI timer signals are local to the GUI EPA.

use eds::{Signal, SignalRange};

/// Porator detector notifications.
pub const PDETECT_EVENTS: SignalRange = SignalRange::new("pdetector", 1000, 2);
/// The porator was placed on the pad (input high after settling).
pub const PDETECT_PRESS: Signal = PDETECT_EVENTS.signal(0);
/// The porator was removed (input low after settling).
pub const PDETECT_RELEASE: Signal = PDETECT_EVENTS.signal(1);

/// Touch controller requests.
pub const TOUCH_EVENTS: SignalRange = SignalRange::new("touch", 2000, 5);
pub const TOUCH_ENABLE: Signal = TOUCH_EVENTS.signal(0);
pub const TOUCH_DISABLE: Signal = TOUCH_EVENTS.signal(1);
pub const TOUCH_STATUS: Signal = TOUCH_EVENTS.signal(2);
pub const TOUCH_INITIALIZE: Signal = TOUCH_EVENTS.signal(3);
pub const TOUCH_CALIBRATE: Signal = TOUCH_EVENTS.signal(4);

/// Every public range, in reservation order.
pub const PUBLIC_RANGES: [SignalRange; 2] = [PDETECT_EVENTS, TOUCH_EVENTS];

pub(crate) const WAKEUP_TIMEOUT: Signal = Signal::local(0);
pub(crate) const WELCOME_WAIT: Signal = Signal::local(1);
pub(crate) const MAIN_REFRESH: Signal = Signal::local(2);
pub(crate) const PRE_TEST_WAIT: Signal = Signal::local(3);
pub(crate) const FIRST_TH_TIMEOUT: Signal = Signal::local(4);
pub(crate) const FIRST_TH_REFRESH: Signal = Signal::local(5);
pub(crate) const SECOND_TH_TIMEOUT: Signal = Signal::local(6);
pub(crate) const SECOND_TH_REFRESH: Signal = Signal::local(7);
pub(crate) const TEST_OVERVIEW_REFRESH: Signal = Signal::local(8);
pub(crate) const REFRESH: Signal = Signal::local(9);
