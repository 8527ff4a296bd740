use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::hsm::PingPong;
use super::support::{Collector, CollectorState};
use crate::epa::{Epa, EpaDefine, EpaId};
use crate::error::EdsError;
use crate::event::Event;
use crate::hsm::{Action, Hsm};
use crate::kernel::{Kernel, KernelConfig};
use crate::pool::PoolConfig;
use crate::signal::{Signal, SignalRange};
use crate::trace::{TraceHook, TraceRecord};

fn collector_epa(name: &'static str, prio: u8) -> (Arc<Epa<Collector, 4>>, Collector) {
    let collector = Collector::default();
    let probe = collector.clone();
    (Epa::new(EpaDefine::new(name, prio), collector), probe)
}

#[test]
fn kernel_delivers_events_in_fifo_order() {
    let (epa, probe) = collector_epa("fifo", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    kernel.start().unwrap();

    for raw in [1000, 1001, 1002] {
        kernel.send(EpaId(1), Event::new(Signal(raw))).unwrap();
    }
    assert_eq!(kernel.run_until_idle().unwrap(), 3);

    assert_eq!(probe.seen(), [Signal(1000), Signal(1001), Signal(1002)]);
}

#[test]
fn ahead_send_is_processed_before_queued_events() {
    let (epa, probe) = collector_epa("ahead", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    kernel.start().unwrap();

    kernel.send(EpaId(1), Event::new(Signal(1000))).unwrap();
    kernel.send(EpaId(1), Event::new(Signal(1001))).unwrap();
    kernel.send_ahead(EpaId(1), Event::new(Signal(1002))).unwrap();
    kernel.run_until_idle().unwrap();

    assert_eq!(probe.seen(), [Signal(1002), Signal(1000), Signal(1001)]);
}

#[test]
fn higher_priority_mailbox_drains_first() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let low = Collector {
        events: order.clone(),
    };
    let high = Collector {
        events: order.clone(),
    };
    let kernel = Kernel::builder()
        .register(Epa::<_, 4>::new(EpaDefine::new("low", 2), low))
        .register(Epa::<_, 4>::new(EpaDefine::new("high", 9), high))
        .build()
        .unwrap();
    kernel.start().unwrap();

    kernel.send(EpaId(2), Event::new(Signal(2000))).unwrap();
    kernel.send(EpaId(2), Event::new(Signal(2001))).unwrap();
    kernel.send(EpaId(9), Event::new(Signal(9000))).unwrap();
    kernel.send(EpaId(9), Event::new(Signal(9001))).unwrap();

    // One step runs one event of the highest ready EPA.
    assert!(kernel.dispatch_once().unwrap());
    assert_eq!(*order.lock().unwrap(), [Signal(9000)]);

    kernel.run_until_idle().unwrap();
    assert_eq!(
        *order.lock().unwrap(),
        [Signal(9000), Signal(9001), Signal(2000), Signal(2001)]
    );
    assert!(!kernel.dispatch_once().unwrap());
}

#[test]
fn full_mailbox_rejects_with_queue_full() {
    let (epa, probe) = collector_epa("full", 3);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    kernel.start().unwrap();

    for raw in 0..4 {
        kernel.send(EpaId(3), Event::new(Signal(1000 + raw))).unwrap();
    }
    assert_eq!(
        kernel.send(EpaId(3), Event::new(Signal(1004))),
        Err(EdsError::QueueFull(EpaId(3)))
    );
    assert_eq!(
        kernel.send_i(EpaId(3), Event::new(Signal(1005))),
        Err(EdsError::QueueFull(EpaId(3)))
    );

    let stats = kernel.mailbox_stats(EpaId(3)).unwrap();
    assert_eq!((stats.len, stats.peak, stats.capacity), (4, 4, 4));

    kernel.run_until_idle().unwrap();
    assert_eq!(probe.seen().len(), 4);
}

#[test]
fn send_to_unknown_epa_is_not_found() {
    let (epa, _) = collector_epa("lonely", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    assert_eq!(
        kernel.send(EpaId(7), Event::new(Signal(1000))),
        Err(EdsError::NotFound(EpaId(7)))
    );
}

#[test]
fn pseudo_signals_cannot_be_sent() {
    let (epa, _) = collector_epa("pseudo", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    assert_eq!(
        kernel.send(EpaId(1), Event::new(Signal::INIT)),
        Err(EdsError::ReservedSignal(Signal::INIT))
    );
}

#[test]
fn duplicate_and_reserved_priorities_are_rejected() {
    let (a, _) = collector_epa("a", 5);
    let (b, _) = collector_epa("b", 5);
    assert!(matches!(
        Kernel::builder().register(a).register(b).build(),
        Err(EdsError::DuplicatePriority(5))
    ));

    let (idle, _) = collector_epa("idle", 0);
    assert!(matches!(
        Kernel::builder().register(idle).build(),
        Err(EdsError::InvalidPriority(0))
    ));

    let (huge, _) = collector_epa("huge", 64);
    assert!(matches!(
        Kernel::builder().register(huge).build(),
        Err(EdsError::InvalidPriority(64))
    ));
}

#[test]
fn overlapping_signal_ranges_are_rejected() {
    let result = Kernel::builder()
        .reserve(SignalRange::new("pdetect", 1000, 2))
        .reserve(SignalRange::new("touch", 2000, 1))
        .reserve(SignalRange::new("clash", 1001, 1))
        .build();
    assert!(matches!(
        result,
        Err(EdsError::SignalRangeOverlap {
            first: "pdetect",
            second: "clash",
        })
    ));

    let result = Kernel::builder()
        .reserve(SignalRange::new("private", 10, 4))
        .build();
    assert!(matches!(result, Err(EdsError::InvalidSignalRange("private"))));
}

#[test]
fn dispatch_requires_start_and_start_runs_once() {
    let (epa, _) = collector_epa("start", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();

    assert_eq!(kernel.dispatch_once(), Err(EdsError::NotStarted));
    kernel.start().unwrap();
    assert_eq!(kernel.start(), Err(EdsError::AlreadyStarted));
}

#[test]
fn failed_initial_transition_leaves_kernel_stopped() {
    let (epa, _) = collector_epa("healthy", 2);
    let kernel = Kernel::builder()
        .register(Epa::<_, 4>::new(EpaDefine::new("pingpong", 1), PingPong))
        .register(epa)
        .build()
        .unwrap();

    assert!(matches!(
        kernel.start(),
        Err(EdsError::InvalidTransition { machine: "pingpong", .. })
    ));
    assert!(!kernel.is_started());
    assert_eq!(kernel.dispatch_once(), Err(EdsError::NotStarted));
    kernel.send(EpaId(2), Event::new(Signal(1000))).unwrap();
    assert_eq!(kernel.run_until_idle(), Err(EdsError::NotStarted));
}

#[test]
fn dynamic_events_return_to_pool_after_dispatch() {
    let (epa, probe) = collector_epa("pool", 1);
    let kernel = Kernel::builder()
        .register(epa)
        .with_pool(PoolConfig::new(8, 1))
        .build()
        .unwrap();
    kernel.start().unwrap();

    let event = kernel.create_event(Signal(1000), 42u32).unwrap();
    assert_eq!(event.payload::<u32>(), Some(&42));
    assert_eq!(
        kernel.create_event(Signal(1001), 1u32).unwrap_err(),
        EdsError::OutOfMemory
    );

    kernel.send(EpaId(1), event).unwrap();
    assert_eq!(kernel.pool_stats()[0].used, 1);
    kernel.run_until_idle().unwrap();

    assert_eq!(probe.seen(), [Signal(1000)]);
    assert_eq!(kernel.pool_stats()[0].used, 0);
    assert!(kernel.create_event(Signal(1002), 2u32).is_ok());
}

#[test]
fn shared_dynamic_event_is_counted_per_mailbox() {
    let (a, _) = collector_epa("a", 1);
    let (b, _) = collector_epa("b", 2);
    let kernel = Kernel::builder()
        .register(a)
        .register(b)
        .with_pool(PoolConfig::new(8, 2))
        .build()
        .unwrap();
    kernel.start().unwrap();

    let event = kernel.create_event(Signal(1000), 7u8).unwrap();
    kernel.send(EpaId(1), event.clone()).unwrap();
    kernel.send(EpaId(2), event.clone()).unwrap();
    assert_eq!(event.ref_count(), Some(3));

    kernel.run_until_idle().unwrap();
    assert_eq!(event.ref_count(), Some(1));
    assert_eq!(kernel.pool_stats()[0].used, 1);
    drop(event);
    assert_eq!(kernel.pool_stats()[0].used, 0);
}

/// Machine that calls back into the scheduler from its handler.
struct Reentrant {
    kernel: Arc<Mutex<Option<Arc<Kernel>>>>,
    result: Arc<Mutex<Option<Result<bool, EdsError>>>>,
}

impl Hsm for Reentrant {
    type State = CollectorState;

    const STATES: &'static [CollectorState] = &[CollectorState::Idle];
    const INITIAL: CollectorState = CollectorState::Idle;

    fn parent(_state: CollectorState) -> Option<CollectorState> {
        None
    }

    fn handle(&mut self, _state: CollectorState, event: &Event) -> Action<CollectorState> {
        if event.signal().is_pseudo() {
            return Action::Ignored;
        }
        let kernel = self.kernel.lock().unwrap().clone();
        if let Some(kernel) = kernel {
            *self.result.lock().unwrap() = Some(kernel.dispatch_once());
        }
        Action::Handled
    }
}

#[test]
fn nested_dispatch_is_rejected() {
    let slot = Arc::new(Mutex::new(None));
    let result = Arc::new(Mutex::new(None));
    let epa = Epa::<_, 2>::new(
        EpaDefine::new("reentrant", 1),
        Reentrant {
            kernel: slot.clone(),
            result: result.clone(),
        },
    );
    let kernel = Arc::new(Kernel::builder().register(epa).build().unwrap());
    *slot.lock().unwrap() = Some(kernel.clone());
    kernel.start().unwrap();

    kernel.send(EpaId(1), Event::new(Signal(1000))).unwrap();
    kernel.run_until_idle().unwrap();

    assert_eq!(*result.lock().unwrap(), Some(Err(EdsError::Reentrant)));
    slot.lock().unwrap().take();
}

#[test]
fn scheduler_trace_reports_next_and_idle() {
    let records = Arc::new(Mutex::new(Vec::new()));
    let sink = records.clone();
    let hook: TraceHook = Arc::new(move |record: &TraceRecord| {
        if matches!(record, TraceRecord::SchedNext { .. } | TraceRecord::SchedIdle { .. }) {
            sink.lock().unwrap().push(record.clone());
        }
    });
    let (epa, _) = collector_epa("traced", 4);
    let kernel = Kernel::builder()
        .register(epa)
        .with_trace_hook(hook)
        .build()
        .unwrap();
    kernel.start().unwrap();

    kernel.send(EpaId(4), Event::new(Signal(1000))).unwrap();
    kernel.send(EpaId(4), Event::new(Signal(1001))).unwrap();
    kernel.run_until_idle().unwrap();

    assert_eq!(
        *records.lock().unwrap(),
        [
            TraceRecord::SchedNext { prio: 4, prev: 0 },
            TraceRecord::SchedIdle { prev: 4 },
        ]
    );
}

#[test]
fn run_loop_wakes_on_interrupt_send() {
    let (epa, probe) = collector_epa("loop", 1);
    let kernel = Arc::new(Kernel::builder().register(epa).build().unwrap());
    kernel.start().unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let runner = {
        let kernel = kernel.clone();
        let stop = stop.clone();
        thread::spawn(move || kernel.run(&stop))
    };

    kernel.isr().send_i(EpaId(1), Event::new(Signal(1000))).unwrap();
    for _ in 0..200 {
        if !probe.seen().is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    stop.store(true, Ordering::Release);
    kernel.wake();
    runner.join().unwrap().unwrap();

    assert_eq!(probe.seen(), [Signal(1000)]);
}

#[test]
fn interrupt_send_wakes_a_parked_scheduler() {
    let (epa, probe) = collector_epa("parked", 1);
    let config = KernelConfig::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();
    let kernel = Arc::new(Kernel::with_config(config).register(epa).build().unwrap());
    kernel.start().unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let runner = {
        let kernel = kernel.clone();
        let stop = stop.clone();
        thread::spawn(move || kernel.run(&stop))
    };
    thread::sleep(Duration::from_millis(50));

    let sent = Instant::now();
    kernel.isr().send_i(EpaId(1), Event::new(Signal(1000))).unwrap();
    while probe.seen().is_empty() && sent.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(1));
    }
    let latency = sent.elapsed();
    stop.store(true, Ordering::Release);
    kernel.wake();
    runner.join().unwrap().unwrap();

    assert_eq!(probe.seen(), [Signal(1000)]);
    assert!(latency < Duration::from_secs(5), "woke after {latency:?}");
}

#[test]
fn blocking_send_waits_for_room() {
    let (epa, probe) = collector_epa("blocking", 1);
    let kernel = Arc::new(Kernel::builder().register(epa).build().unwrap());
    kernel.start().unwrap();
    for raw in 0..4 {
        kernel.send(EpaId(1), Event::new(Signal(1000 + raw))).unwrap();
    }

    let sender = {
        let kernel = kernel.clone();
        thread::spawn(move || {
            kernel.send_blocking(EpaId(1), Event::new(Signal(1004)), Duration::from_secs(5))
        })
    };
    thread::sleep(Duration::from_millis(20));
    kernel.dispatch_once().unwrap();
    sender.join().unwrap().unwrap();
    kernel.run_until_idle().unwrap();

    assert_eq!(probe.seen().len(), 5);
    assert_eq!(probe.seen()[4], Signal(1004));
}

#[test]
fn blocking_send_times_out_when_mailbox_stays_full() {
    let (epa, _) = collector_epa("stuck", 1);
    let kernel = Kernel::builder().register(epa).build().unwrap();
    for raw in 0..4 {
        kernel.send(EpaId(1), Event::new(Signal(1000 + raw))).unwrap();
    }
    assert_eq!(
        kernel.send_blocking(EpaId(1), Event::new(Signal(1004)), Duration::from_millis(20)),
        Err(EdsError::QueueFull(EpaId(1)))
    );
}
