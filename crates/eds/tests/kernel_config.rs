//! Tests for KernelConfig builder and kernel construction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use eds::{Action, Epa, EpaDefine, EdsError, Event, Hsm, Kernel, KernelConfig};
use once_cell::sync::Lazy;

static IDLE_CALLS: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

fn count_idle() {
    IDLE_CALLS.fetch_add(1, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Only {
    Here,
}

struct Sink;

impl Hsm for Sink {
    type State = Only;

    const STATES: &'static [Only] = &[Only::Here];
    const INITIAL: Only = Only::Here;

    fn parent(_state: Only) -> Option<Only> {
        None
    }

    fn handle(&mut self, _state: Only, _event: &Event) -> Action<Only> {
        Action::Handled
    }
}

#[test]
fn kernel_config_builder() {
    let config = KernelConfig::builder()
        .name("TestKernel")
        .max_active(32)
        .tick_hz(1000)
        .idle_timeout(Duration::from_millis(50))
        .build();

    assert_eq!(config.name, "TestKernel");
    assert_eq!(config.max_active, 32);
    assert_eq!(config.tick_hz, 1000);
    assert_eq!(config.idle_timeout, Duration::from_millis(50));
    assert!(config.idle_callback.is_none());
}

#[test]
fn kernel_config_default() {
    let config = KernelConfig::default();

    assert_eq!(config.name, "EDS");
    assert_eq!(config.max_active, 16);
    assert_eq!(config.tick_hz, 100);
}

#[test]
fn kernel_with_custom_config() {
    let config = KernelConfig::builder()
        .name("CustomKernel")
        .max_active(63)
        .build();

    let kernel = Kernel::with_config(config).build().unwrap();

    assert_eq!(kernel.config().name, "CustomKernel");
    assert_eq!(kernel.config().max_active, 63);
}

#[test]
fn kernel_rejects_more_epas_than_configured() {
    let config = KernelConfig::builder().max_active(1).build();
    let result = Kernel::with_config(config)
        .register(Epa::<_, 1>::new(EpaDefine::new("a", 1), Sink))
        .register(Epa::<_, 1>::new(EpaDefine::new("b", 2), Sink))
        .build();

    assert!(matches!(
        result,
        Err(EdsError::TooManyEpas { count: 2, max: 1 })
    ));
}

#[test]
fn kernel_idle_callback() {
    let config = KernelConfig::builder().idle_callback(count_idle).build();
    let kernel = Kernel::with_config(config)
        .register(Epa::<_, 1>::new(EpaDefine::new("sink", 1), Sink))
        .build()
        .unwrap();
    kernel.start().unwrap();

    let before = IDLE_CALLS.load(Ordering::SeqCst);
    kernel.run_until_idle().unwrap();
    kernel.run_until_idle().unwrap();

    assert_eq!(IDLE_CALLS.load(Ordering::SeqCst), before + 2);
}
