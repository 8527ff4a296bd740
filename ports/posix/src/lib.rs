//! POSIX host port for the eds framework.
//!
//! Provides the pieces a bare-metal target gets from its board support: a
//! periodic tick source driving the [`TimerWheel`], an idle-aware scheduler
//! loop and a clean shutdown on Ctrl-C.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use eds::{EdsError, Kernel, KernelBuilder, TickReport, TimerWheel, VTimer};
use log::{info, warn};
use thiserror::Error;

pub mod ticker;

pub use ticker::{tick_period, Ticker, DEFAULT_TICKS_PER_SEC, MAX_TICKS_PER_SEC};

#[derive(Debug, Error)]
pub enum PortError {
    #[error("tick rate {0} Hz is outside 1..={MAX_TICKS_PER_SEC}")]
    InvalidTickRate(u32),
    #[error("failed to spawn ticker thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
    #[error(transparent)]
    Kernel(#[from] EdsError),
}

/// Kernel, timer wheel and tick source hosted on one process.
pub struct PosixRuntime {
    kernel: Arc<Kernel>,
    wheel: Arc<TimerWheel>,
    stop: Arc<AtomicBool>,
    failed_posts: Arc<AtomicU64>,
}

impl PosixRuntime {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        let wheel = Arc::new(TimerWheel::new(Arc::clone(&kernel)));
        Self {
            kernel,
            wheel,
            stop: Arc::new(AtomicBool::new(false)),
            failed_posts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Builds and starts the kernel.
    pub fn with_builder(builder: KernelBuilder) -> Result<Self, PortError> {
        let kernel = Arc::new(builder.build()?);
        kernel.start()?;
        Ok(Self::new(kernel))
    }

    pub fn kernel(&self) -> Arc<Kernel> {
        Arc::clone(&self.kernel)
    }

    pub fn wheel(&self) -> Arc<TimerWheel> {
        Arc::clone(&self.wheel)
    }

    pub fn register_timer(&self, timer: Arc<VTimer>) {
        self.wheel.register(timer);
    }

    /// Advances the timer wheel by one tick from the calling thread.
    pub fn tick(&self) -> TickReport {
        self.wheel.tick()
    }

    pub fn run_until_idle(&self) -> Result<usize, PortError> {
        Ok(self.kernel.run_until_idle()?)
    }

    /// Timer posts rejected by full or missing mailboxes since start.
    pub fn failed_posts(&self) -> u64 {
        self.failed_posts.load(Ordering::Relaxed)
    }

    /// Flag that ends [`run`](Self::run) when set. A stop requested while
    /// nothing runs ends the next run; each run clears the flag when it
    /// returns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.kernel.wake();
    }

    /// Stops the runtime on SIGINT. Only one handler may exist per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), PortError> {
        let stop = Arc::clone(&self.stop);
        let kernel = Arc::clone(&self.kernel);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Release);
            kernel.wake();
        })?;
        Ok(())
    }

    /// Ticks the timer wheel at the kernel's tick rate and runs the scheduler
    /// on the calling thread until stopped.
    pub fn run(&self) -> Result<(), PortError> {
        let result = self.run_until_stopped();
        self.stop.store(false, Ordering::Release);
        result
    }

    /// Runs for at most `duration`, then stops.
    pub fn run_for(&self, duration: Duration) -> Result<(), PortError> {
        let deadline = Deadline::arm(
            duration,
            Arc::clone(&self.stop),
            Arc::clone(&self.kernel),
        )?;
        let result = self.run_until_stopped();
        deadline.cancel();
        self.stop.store(false, Ordering::Release);
        result
    }

    fn run_until_stopped(&self) -> Result<(), PortError> {
        let rate = self.kernel.config().tick_hz;
        let wheel = Arc::clone(&self.wheel);
        let failed = Arc::clone(&self.failed_posts);
        let mut ticker = Ticker::start(rate, move || {
            let report = wheel.tick();
            if !report.is_ok() {
                failed.fetch_add(report.failed.len() as u64, Ordering::Relaxed);
            }
        })?;
        info!("{}: running at {} Hz", self.kernel.config().name, rate);

        let result = self.kernel.run(&self.stop);
        ticker.stop();

        let failed = self.failed_posts();
        if failed > 0 {
            warn!("{}: {} timer posts were rejected", self.kernel.config().name, failed);
        }
        Ok(result?)
    }
}

/// Thread setting the stop flag once a run has lasted long enough.
struct Deadline {
    cancelled: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Deadline {
    fn arm(
        after: Duration,
        stop: Arc<AtomicBool>,
        kernel: Arc<Kernel>,
    ) -> Result<Self, PortError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);
        let due = Instant::now() + after;
        let handle = thread::Builder::new()
            .name("eds-deadline".into())
            .spawn(move || loop {
                if flag.load(Ordering::Acquire) {
                    return;
                }
                let now = Instant::now();
                if now >= due {
                    stop.store(true, Ordering::Release);
                    kernel.wake();
                    return;
                }
                thread::park_timeout(due - now);
            })
            .map_err(PortError::Spawn)?;
        Ok(Self { cancelled, handle })
    }

    /// Disarms the deadline and waits for its thread, so it can no longer
    /// touch the stop flag.
    fn cancel(self) {
        self.cancelled.store(true, Ordering::Release);
        self.handle.thread().unpark();
        if self.handle.join().is_err() {
            warn!("deadline thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use eds::{Action, Epa, EpaDefine, EpaId, Event, Hsm, Signal, TimerAction};

    const TICK_SIG: Signal = Signal(30);

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Only {
        Idle,
    }

    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<Signal>>>,
    }

    impl Hsm for Recorder {
        type State = Only;

        const STATES: &'static [Only] = &[Only::Idle];
        const INITIAL: Only = Only::Idle;

        fn parent(_state: Only) -> Option<Only> {
            None
        }

        fn handle(&mut self, _state: Only, event: &Event) -> Action<Only> {
            if !event.signal().is_pseudo() {
                self.log.lock().unwrap().push(event.signal());
            }
            Action::Handled
        }
    }

    fn runtime() -> (PosixRuntime, Recorder) {
        let recorder = Recorder::default();
        let probe = recorder.clone();
        let epa = Epa::<_, 8>::new(EpaDefine::new("recorder", 5), recorder);
        let runtime = PosixRuntime::with_builder(Kernel::builder().register(epa)).unwrap();
        (runtime, probe)
    }

    #[test]
    fn runtime_ticks_timer() {
        let (runtime, probe) = runtime();
        let timer = VTimer::new("tick");
        runtime.register_timer(Arc::clone(&timer));
        timer.start(1, TimerAction::post(EpaId(5), TICK_SIG));

        assert_eq!(runtime.tick().fired, 1);
        runtime.run_until_idle().unwrap();

        assert_eq!(*probe.log.lock().unwrap(), [TICK_SIG]);
    }

    #[test]
    fn run_for_drives_periodic_timer_in_real_time() {
        let (runtime, probe) = runtime();
        let timer = VTimer::new("periodic");
        runtime.register_timer(Arc::clone(&timer));
        timer.start_periodic(1, 1, TimerAction::post(EpaId(5), TICK_SIG));

        runtime.run_for(Duration::from_millis(150)).unwrap();

        assert!(!probe.log.lock().unwrap().is_empty());
        assert_eq!(runtime.failed_posts(), 0);
    }

    #[test]
    fn runtime_can_run_again_after_run_for() {
        let (runtime, probe) = runtime();
        let timer = VTimer::new("periodic");
        runtime.register_timer(Arc::clone(&timer));
        timer.start_periodic(1, 1, TimerAction::post(EpaId(5), TICK_SIG));

        runtime.run_for(Duration::from_millis(20)).unwrap();
        assert!(!runtime.stop_handle().load(Ordering::Acquire));
        probe.log.lock().unwrap().clear();

        let stop = runtime.stop_handle();
        let kernel = runtime.kernel();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(200));
            stop.store(true, Ordering::Release);
            kernel.wake();
        });
        let started = Instant::now();
        runtime.run().unwrap();
        stopper.join().unwrap();

        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(!probe.log.lock().unwrap().is_empty());
    }

    #[test]
    fn stop_requested_before_run_ends_it_once() {
        let (runtime, _) = runtime();

        runtime.request_stop();
        runtime.run().unwrap();

        assert!(!runtime.stop_handle().load(Ordering::Acquire));
        runtime.run_for(Duration::from_millis(30)).unwrap();
    }
}
