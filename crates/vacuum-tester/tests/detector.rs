//! Porator detector debouncing against a recording EPA.

use std::sync::{Arc, Mutex};

use eds::{
    Action, Epa, EpaDefine, EpaId, Event, Hsm, Kernel, PoolConfig, Signal, TimerWheel,
};
use vacuum_tester::signals::{PDETECT_EVENTS, PDETECT_PRESS, PDETECT_RELEASE};
use vacuum_tester::sim::SimPin;
use vacuum_tester::PoratorDetector;
use vt_hal::{GpioPinInterrupt, Level, PinMode};

const CONSUMER: EpaId = EpaId(3);
/// 50 ms at 100 Hz.
const SETTLE_TICKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listening {
    Idle,
}

#[derive(Clone, Default)]
struct Recorder {
    seen: Arc<Mutex<Vec<Signal>>>,
}

impl Recorder {
    fn seen(&self) -> Vec<Signal> {
        self.seen.lock().unwrap().clone()
    }
}

impl Hsm for Recorder {
    type State = Listening;

    const STATES: &'static [Listening] = &[Listening::Idle];
    const INITIAL: Listening = Listening::Idle;

    fn parent(_state: Listening) -> Option<Listening> {
        None
    }

    fn handle(&mut self, _state: Listening, event: &Event) -> Action<Listening> {
        if PDETECT_EVENTS.contains(event.signal()) {
            self.seen.lock().unwrap().push(event.signal());
            return Action::Handled;
        }
        Action::Ignored
    }
}

struct Rig {
    wheel: TimerWheel,
    pin: Arc<SimPin>,
    detector: Arc<PoratorDetector>,
    recorder: Recorder,
}

impl Rig {
    fn new(with_pool: bool) -> Self {
        let recorder = Recorder::default();
        let epa = Epa::<_, 4>::new(EpaDefine::new("consumer", CONSUMER.0), recorder.clone());
        let mut builder = Kernel::builder().register(epa).reserve(PDETECT_EVENTS);
        if with_pool {
            builder = builder.with_pool(PoolConfig::new(16, 4));
        }
        let kernel = Arc::new(builder.build().unwrap());
        kernel.start().unwrap();

        let wheel = TimerWheel::new(kernel);
        let pin = Arc::new(SimPin::new(9));
        let detector = PoratorDetector::new(pin.clone(), CONSUMER, SETTLE_TICKS);
        wheel.register(detector.timer());
        detector.install().unwrap();

        Self {
            wheel,
            pin,
            detector,
            recorder,
        }
    }

    fn ticks(&self, n: u32) {
        for _ in 0..n {
            self.wheel.tick();
        }
        self.wheel.kernel().run_until_idle().unwrap();
    }
}

#[test]
fn install_configures_pull_down_input() {
    let rig = Rig::new(true);
    assert_eq!(rig.pin.mode(), PinMode::InputPullDown);
    assert!(rig.pin.is_interrupt_enabled());
}

#[test]
fn high_level_after_settle_posts_press() {
    let rig = Rig::new(true);

    rig.pin.drive(Level::High);
    assert!(!rig.pin.is_interrupt_enabled());

    rig.ticks(SETTLE_TICKS - 1);
    assert!(rig.recorder.seen().is_empty());
    assert!(!rig.pin.is_interrupt_enabled());

    rig.ticks(1);
    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS]);
    assert!(rig.pin.is_interrupt_enabled());

    rig.pin.drive(Level::Low);
    rig.ticks(SETTLE_TICKS);
    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS, PDETECT_RELEASE]);
    assert_eq!(rig.detector.dropped(), 0);
}

#[test]
fn bounces_during_settle_are_ignored() {
    let rig = Rig::new(true);

    rig.pin.drive(Level::High);
    rig.ticks(1);
    rig.pin.drive(Level::Low);
    rig.pin.drive(Level::High);
    rig.ticks(SETTLE_TICKS);

    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS]);
}

#[test]
fn lost_notification_is_counted_and_detection_resumes() {
    let rig = Rig::new(false);

    rig.pin.drive(Level::High);
    rig.ticks(SETTLE_TICKS);

    assert!(rig.recorder.seen().is_empty());
    assert_eq!(rig.detector.dropped(), 1);
    assert!(rig.pin.is_interrupt_enabled());
}

#[test]
fn failed_re_enable_is_counted_and_retried() {
    let rig = Rig::new(true);
    rig.pin.fail_next_enables(1);

    rig.pin.drive(Level::High);
    rig.ticks(SETTLE_TICKS);
    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS]);
    assert_eq!(rig.detector.pin_faults(), 1);
    assert!(!rig.pin.is_interrupt_enabled());

    rig.ticks(SETTLE_TICKS);
    assert!(rig.pin.is_interrupt_enabled());
    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS]);

    rig.pin.drive(Level::Low);
    rig.ticks(SETTLE_TICKS);
    assert_eq!(rig.recorder.seen(), [PDETECT_PRESS, PDETECT_RELEASE]);
    assert_eq!(rig.detector.pin_faults(), 1);
}
