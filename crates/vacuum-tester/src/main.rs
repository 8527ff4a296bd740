//! Vacuum tester on a simulated bench.
//!
//! Boots the GUI, places a porator on the pad, starts a test and reports the
//! verdict. The pressure curve reaches both thresholds, so the run ends with
//! a success. Set `RUST_LOG=debug` to follow the state machine and `VT_*`
//! variables to change timings and thresholds.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, warn};
use vacuum_tester::sim::SimBench;
use vacuum_tester::{GuiState, Instrument, InstrumentResult, TesterConfig};
use vt_hal::Level;

const IDLE_READING: u32 = 1000;
const STEP_WAIT: Duration = Duration::from_secs(30);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run() {
        error!("vacuum tester failed: {err}");
        std::process::exit(1);
    }
}

fn run() -> InstrumentResult<()> {
    let config = TesterConfig::from_env()?;
    let bench = SimBench::new(IDLE_READING);
    // Idle reading for the baseline, then a pump-down curve.
    bench
        .sensor
        .script([IDLE_READING].into_iter().chain((0..60).map(|step| IDLE_READING - step * 10)));

    let instrument = Arc::new(Instrument::build(bench.hardware(), config)?);
    instrument.start()?;
    instrument.runtime().install_ctrlc_handler()?;

    let operator = {
        let instrument = Arc::clone(&instrument);
        let bench = bench.clone();
        thread::spawn(move || operate(&instrument, &bench))
    };

    instrument.run()?;
    if operator.join().is_err() {
        warn!("operator thread panicked");
    }

    let (first, second, verdict) =
        instrument.with_gui(|gui| (gui.first_threshold(), gui.second_threshold(), gui.verdict()));
    info!(
        "verdict {:?}: first {} ({} raw), second {} ({} raw)",
        verdict,
        first.label(),
        first.raw_max,
        second.label(),
        second.raw_max
    );
    Ok(())
}

/// Plays the operator: waits for the main screen, places a porator, presses
/// TEST and acknowledges the result.
fn operate(instrument: &Instrument, bench: &SimBench) {
    let script = || -> Result<(), &'static str> {
        wait_for(instrument, GuiState::Main)?;
        info!("operator: placing porator");
        bench.sensor.set_detected(true);
        bench.detector_pin.drive(Level::High);
        thread::sleep(Duration::from_millis(200));

        info!("operator: pressing TEST");
        bench.display.touch(b'T');
        wait_for(instrument, GuiState::TestOverview)?;
        thread::sleep(Duration::from_secs(1));

        bench.display.touch(b'B');
        wait_for(instrument, GuiState::Main)
    };
    if let Err(err) = script() {
        warn!("operator: {err}");
    }
    instrument.request_stop();
}

fn wait_for(instrument: &Instrument, state: GuiState) -> Result<(), &'static str> {
    let deadline = Instant::now() + STEP_WAIT;
    let stop = instrument.runtime().stop_handle();
    while !instrument.is_in(state) {
        if stop.load(Ordering::Acquire) {
            return Err("stopped");
        }
        if Instant::now() > deadline {
            return Err("instrument did not reach the expected screen");
        }
        thread::sleep(Duration::from_millis(20));
    }
    Ok(())
}
