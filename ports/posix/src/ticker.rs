//! Clock tick service for POSIX hosts.
//!
//! A dedicated thread stands in for the periodic tick interrupt. It sleeps to
//! absolute deadlines on the monotonic clock, so the tick rate does not drift
//! with callback run time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::PortError;

/// Default tick rate in Hz
pub const DEFAULT_TICKS_PER_SEC: u32 = 100;

/// Highest supported tick rate in Hz
pub const MAX_TICKS_PER_SEC: u32 = 10_000;

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Tick period at `rate_hz`.
pub fn tick_period(rate_hz: u32) -> Duration {
    Duration::from_nanos(NSEC_PER_SEC / u64::from(rate_hz.max(1)))
}

/// Running ticker thread. Stops and joins on drop.
pub struct Ticker {
    rate_hz: u32,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawns a thread calling `on_tick` `rate_hz` times per second.
    pub fn start<F>(rate_hz: u32, mut on_tick: F) -> Result<Self, PortError>
    where
        F: FnMut() + Send + 'static,
    {
        if rate_hz == 0 || rate_hz > MAX_TICKS_PER_SEC {
            return Err(PortError::InvalidTickRate(rate_hz));
        }
        let period = tick_period(rate_hz);
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("eds-ticker".into())
            .spawn(move || {
                let mut next_tick = Instant::now();
                while flag.load(Ordering::Relaxed) {
                    next_tick += period;
                    let now = Instant::now();
                    if next_tick > now {
                        thread::sleep(next_tick - now);
                    }
                    if flag.load(Ordering::Relaxed) {
                        on_tick();
                    }
                }
            })
            .map_err(PortError::Spawn)?;

        Ok(Self {
            rate_hz,
            running,
            handle: Some(handle),
        })
    }

    pub fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stops the thread and waits for the tick in progress to finish.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
