//! # vacuum-tester
//!
//! Control application of the vacuum tester: the GUI EPA running the test
//! sequence, the porator detector and the wiring of both onto an `eds`
//! kernel hosted by the POSIX port.
//!
//! Peripherals are passed in as [`Hardware`]; [`sim`] provides host
//! simulations of all of them.

use std::sync::Arc;
use std::time::Duration;

use eds::{Epa, EpaDefine, Kernel, KernelConfig, PoolConfig, TickReport};
use eds_port_posix::PosixRuntime;
use log::info;
use vt_hal::{Audio, Battery, Clock, Display, DutSensor, GpioPinInterrupt, Motor};

pub mod config;
pub mod detector;
pub mod error;
pub mod gui;
pub mod screens;
pub mod signals;
pub mod sim;

pub use config::{TesterConfig, TesterConfigBuilder, ThresholdConfig};
pub use detector::PoratorDetector;
pub use error::{InstrumentError, InstrumentResult};
pub use gui::{Gui, GuiState, ThresholdStatus, Verdict, GUI_QUEUE};

/// Dynamic events are payload-free notifications; one small pool suffices.
const EVENT_POOL: PoolConfig = PoolConfig::new(16, 8);

/// Peripherals of one instrument.
#[derive(Clone)]
pub struct Hardware {
    pub display: Arc<dyn Display>,
    pub sensor: Arc<dyn DutSensor>,
    pub motor: Arc<dyn Motor>,
    pub audio: Arc<dyn Audio>,
    pub clock: Arc<dyn Clock>,
    pub battery: Arc<dyn Battery>,
    pub detector_pin: Arc<dyn GpioPinInterrupt>,
}

/// Kernel, GUI and detector of one instrument.
pub struct Instrument {
    runtime: PosixRuntime,
    gui: Arc<Epa<Gui, GUI_QUEUE>>,
    detector: Arc<PoratorDetector>,
    config: TesterConfig,
}

impl Instrument {
    /// Builds the kernel and registers every timer. Nothing runs until
    /// [`start`](Self::start).
    pub fn build(hw: Hardware, config: TesterConfig) -> InstrumentResult<Self> {
        let define = EpaDefine::new("GUI", config.gui_priority);
        let workspace = Gui::new(hw.clone(), config.clone(), define.id());
        let gui_timers = workspace.timers();
        let gui = Epa::<_, GUI_QUEUE>::new(define, workspace);

        let kernel_config = KernelConfig::builder()
            .name("vacuum-tester")
            .max_active(4)
            .tick_hz(config.tick_hz)
            .build();
        let builder = signals::PUBLIC_RANGES.into_iter().fold(
            Kernel::with_config(kernel_config)
                .register(gui.clone())
                .with_pool(EVENT_POOL),
            |builder, range| builder.reserve(range),
        );
        let runtime = PosixRuntime::new(Arc::new(builder.build()?));

        let settle = eds::ms_to_ticks(config.debounce_ms, config.tick_hz);
        let detector = PoratorDetector::new(hw.detector_pin, define.id(), settle);

        for timer in gui_timers {
            runtime.register_timer(timer);
        }
        runtime.register_timer(detector.timer());

        Ok(Self {
            runtime,
            gui,
            detector,
            config,
        })
    }

    /// Starts the GUI and enables the porator detector.
    pub fn start(&self) -> InstrumentResult<()> {
        self.runtime.kernel().start()?;
        self.detector.install()?;
        info!(
            "instrument started: thresholds {} / {} raw at {} Hz",
            self.config.first.raw_vacuum, self.config.second.raw_vacuum, self.config.tick_hz
        );
        Ok(())
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn runtime(&self) -> &PosixRuntime {
        &self.runtime
    }

    pub fn kernel(&self) -> Arc<Kernel> {
        self.runtime.kernel()
    }

    pub fn detector(&self) -> &Arc<PoratorDetector> {
        &self.detector
    }

    pub fn gui_state(&self) -> Option<GuiState> {
        self.gui.current_state()
    }

    pub fn is_in(&self, state: GuiState) -> bool {
        self.gui.is_in(state)
    }

    pub fn with_gui<R>(&self, f: impl FnOnce(&Gui) -> R) -> R {
        self.gui.with_workspace(f)
    }

    /// Advances time by one tick and dispatches everything it caused.
    pub fn step(&self) -> InstrumentResult<TickReport> {
        let report = self.runtime.tick();
        self.runtime.run_until_idle()?;
        Ok(report)
    }

    /// Steps until `done` holds, for at most `max_ticks` ticks. Returns
    /// whether `done` was reached.
    pub fn step_until(
        &self,
        max_ticks: u32,
        mut done: impl FnMut(&Self) -> bool,
    ) -> InstrumentResult<bool> {
        self.runtime.run_until_idle()?;
        for _ in 0..max_ticks {
            if done(self) {
                return Ok(true);
            }
            self.step()?;
        }
        Ok(done(self))
    }

    /// Runs in real time until stopped.
    pub fn run(&self) -> InstrumentResult<()> {
        Ok(self.runtime.run()?)
    }

    pub fn run_for(&self, duration: Duration) -> InstrumentResult<()> {
        Ok(self.runtime.run_for(duration)?)
    }

    pub fn request_stop(&self) {
        self.runtime.request_stop();
    }
}
