//! Host simulation of the instrument peripherals.
//!
//! Every simulator implements its `vt-hal` trait and exposes knobs and
//! counters so tests and the demo binary can script a test run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use parking_lot::Mutex;
use vt_hal::{
    Audio, Battery, Clock, Display, DrawCmd, DutSensor, Edge, EdgeCallback, GpioPin,
    GpioPinInterrupt, HalError, HalResult, Level, Motor, PinMode, Rgb, FT800_CHIP_ID, NO_TAG,
};

#[derive(Default)]
struct Frames {
    building: Vec<DrawCmd>,
    building_clear: Option<Rgb>,
    shown: Vec<DrawCmd>,
    shown_clear: Option<Rgb>,
    swapped: u32,
}

/// Display that keeps the last shown frame.
///
/// Chip identifiers are scripted; once the script runs out the display
/// answers with [`FT800_CHIP_ID`]. Touches are one-shot: a tag set with
/// [`touch`](Self::touch) is reported by exactly one read.
pub struct SimDisplay {
    frames: Mutex<Frames>,
    chip_ids: Mutex<VecDeque<u8>>,
    touch: AtomicU8,
    init_early: AtomicU32,
    fade_in: AtomicU32,
}

impl Default for SimDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDisplay {
    pub fn new() -> Self {
        Self {
            frames: Mutex::new(Frames::default()),
            chip_ids: Mutex::new(VecDeque::new()),
            touch: AtomicU8::new(NO_TAG),
            init_early: AtomicU32::new(0),
            fade_in: AtomicU32::new(0),
        }
    }

    /// Display whose controller never wakes up.
    pub fn unresponsive() -> Self {
        let display = Self::new();
        display.script_chip_ids(std::iter::repeat(0).take(1024));
        display
    }

    pub fn script_chip_ids(&self, ids: impl IntoIterator<Item = u8>) {
        self.chip_ids.lock().extend(ids);
    }

    /// Presses the widget tagged `tag` until the next tag read.
    pub fn touch(&self, tag: u8) {
        self.touch.store(tag, Ordering::SeqCst);
    }

    pub fn init_early_calls(&self) -> u32 {
        self.init_early.load(Ordering::SeqCst)
    }

    pub fn fade_in_calls(&self) -> u32 {
        self.fade_in.load(Ordering::SeqCst)
    }

    pub fn frames_shown(&self) -> u32 {
        self.frames.lock().swapped
    }

    pub fn last_frame(&self) -> Vec<DrawCmd> {
        self.frames.lock().shown.clone()
    }

    pub fn last_clear(&self) -> Option<Rgb> {
        self.frames.lock().shown_clear
    }

    pub fn frame_has_text(&self, needle: &str) -> bool {
        self.frames.lock().shown.iter().any(|cmd| match cmd {
            DrawCmd::Text { text, .. } => text == needle,
            DrawCmd::Button { label, .. } => label == needle,
            _ => false,
        })
    }
}

impl Display for SimDisplay {
    fn init_early(&self) -> HalResult<()> {
        self.init_early.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn chip_id(&self) -> HalResult<u8> {
        Ok(self.chip_ids.lock().pop_front().unwrap_or(FT800_CHIP_ID))
    }

    fn init_late(&self) -> HalResult<()> {
        Ok(())
    }

    fn fade_in(&self) -> HalResult<()> {
        self.fade_in.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn begin_frame(&self, clear: Rgb) -> HalResult<()> {
        let mut frames = self.frames.lock();
        frames.building.clear();
        frames.building_clear = Some(clear);
        Ok(())
    }

    fn draw(&self, cmd: DrawCmd) -> HalResult<()> {
        let mut frames = self.frames.lock();
        if frames.building_clear.is_none() {
            return Err(HalError::NotInitialized);
        }
        frames.building.push(cmd);
        Ok(())
    }

    fn swap_frame(&self) -> HalResult<()> {
        let mut frames = self.frames.lock();
        let clear = frames.building_clear.take().ok_or(HalError::NotInitialized)?;
        frames.shown = std::mem::take(&mut frames.building);
        frames.shown_clear = Some(clear);
        frames.swapped += 1;
        Ok(())
    }

    fn wait_idle(&self) -> HalResult<()> {
        Ok(())
    }

    fn read_touch_tag(&self) -> HalResult<u8> {
        Ok(self.touch.swap(NO_TAG, Ordering::SeqCst))
    }
}

/// Test pad with a scripted pressure curve.
///
/// Each [`dut_raw_value`](DutSensor::dut_raw_value) consumes one scripted
/// reading; the last one repeats once the script is exhausted.
pub struct SimDutSensor {
    detected: AtomicBool,
    readings: Mutex<VecDeque<u32>>,
    last: AtomicU32,
    reads: AtomicU32,
}

impl SimDutSensor {
    pub fn new(idle_reading: u32) -> Self {
        Self {
            detected: AtomicBool::new(false),
            readings: Mutex::new(VecDeque::new()),
            last: AtomicU32::new(idle_reading),
            reads: AtomicU32::new(0),
        }
    }

    pub fn set_detected(&self, detected: bool) {
        self.detected.store(detected, Ordering::SeqCst);
    }

    pub fn script(&self, readings: impl IntoIterator<Item = u32>) {
        self.readings.lock().extend(readings);
    }

    pub fn reads(&self) -> u32 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl DutSensor for SimDutSensor {
    fn is_dut_detected(&self) -> bool {
        self.detected.load(Ordering::SeqCst)
    }

    fn dut_raw_value(&self) -> HalResult<u32> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(value) = self.readings.lock().pop_front() {
            self.last.store(value, Ordering::SeqCst);
        }
        Ok(self.last.load(Ordering::SeqCst))
    }
}

#[derive(Default)]
pub struct SimMotor {
    enabled: AtomicBool,
    enables: AtomicU32,
}

impl SimMotor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of off-to-on switches.
    pub fn enable_count(&self) -> u32 {
        self.enables.load(Ordering::SeqCst)
    }
}

impl Motor for SimMotor {
    fn enable(&self) -> HalResult<()> {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            self.enables.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn disable(&self) -> HalResult<()> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

/// Buzzer recording every melody started.
#[derive(Default)]
pub struct SimAudio {
    played: Mutex<Vec<Vec<u8>>>,
}

impl SimAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().clone()
    }
}

impl Audio for SimAudio {
    fn play_melody(&self, notes: &[u8]) -> HalResult<()> {
        if notes.is_empty() {
            return Err(HalError::InvalidParameter);
        }
        self.played.lock().push(notes.to_vec());
        Ok(())
    }
}

/// Wall clock backed by the host clock, or frozen at a fixed instant.
#[derive(Default)]
pub struct SimClock {
    fixed: Option<NaiveDateTime>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fixed(at: NaiveDateTime) -> Self {
        Self { fixed: Some(at) }
    }

    fn now(&self) -> NaiveDateTime {
        self.fixed.unwrap_or_else(|| Local::now().naive_local())
    }
}

impl Clock for SimClock {
    fn format_date(&self) -> String {
        self.now().format("%d.%m.%Y").to_string()
    }

    fn format_time(&self) -> String {
        self.now().format("%H:%M").to_string()
    }
}

pub struct SimBattery {
    percent: AtomicU8,
}

impl SimBattery {
    pub fn new(percent: u8) -> Self {
        Self {
            percent: AtomicU8::new(percent.min(100)),
        }
    }

    pub fn set_percent(&self, percent: u8) {
        self.percent.store(percent.min(100), Ordering::SeqCst);
    }
}

impl Battery for SimBattery {
    fn format_status(&self) -> String {
        format!("{}%", self.percent.load(Ordering::SeqCst))
    }
}

struct PinState {
    mode: PinMode,
    level: Level,
    edge: Option<Edge>,
    callback: Option<EdgeCallback>,
    failing_enables: u32,
}

/// GPIO line driven from the host.
///
/// [`drive`](Self::drive) changes the level and, when edge detection is
/// enabled for that edge, runs the installed callback on the calling thread.
pub struct SimPin {
    number: u32,
    state: Mutex<PinState>,
}

impl SimPin {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            state: Mutex::new(PinState {
                mode: PinMode::Input,
                level: Level::Low,
                edge: None,
                callback: None,
                failing_enables: 0,
            }),
        }
    }

    pub fn mode(&self) -> PinMode {
        self.state.lock().mode
    }

    /// Makes the next `count` calls to `enable_interrupt` fail.
    pub fn fail_next_enables(&self, count: u32) {
        self.state.lock().failing_enables = count;
    }

    pub fn drive(&self, level: Level) {
        let callback = {
            let mut state = self.state.lock();
            let previous = state.level;
            state.level = level;
            let fires = match (state.edge, previous, level) {
                (Some(Edge::Rising | Edge::Both), Level::Low, Level::High) => true,
                (Some(Edge::Falling | Edge::Both), Level::High, Level::Low) => true,
                _ => false,
            };
            if fires {
                state.callback.clone()
            } else {
                None
            }
        };
        if let Some(callback) = callback {
            callback();
        }
    }
}

impl GpioPin for SimPin {
    fn set_mode(&self, mode: PinMode) -> HalResult<()> {
        self.state.lock().mode = mode;
        Ok(())
    }

    fn read(&self) -> HalResult<Level> {
        Ok(self.state.lock().level)
    }

    fn write(&self, level: Level) -> HalResult<()> {
        let mut state = self.state.lock();
        match state.mode {
            PinMode::Output | PinMode::OutputOpenDrain => {
                state.level = level;
                Ok(())
            }
            _ => Err(HalError::InvalidParameter),
        }
    }

    fn pin_number(&self) -> u32 {
        self.number
    }
}

impl GpioPinInterrupt for SimPin {
    fn set_edge_callback(&self, callback: EdgeCallback) -> HalResult<()> {
        self.state.lock().callback = Some(callback);
        Ok(())
    }

    fn enable_interrupt(&self, edge: Edge) -> HalResult<()> {
        let mut state = self.state.lock();
        if state.callback.is_none() {
            return Err(HalError::NotInitialized);
        }
        if state.failing_enables > 0 {
            state.failing_enables -= 1;
            return Err(HalError::Bus("gpio"));
        }
        state.edge = Some(edge);
        Ok(())
    }

    fn disable_interrupt(&self) -> HalResult<()> {
        self.state.lock().edge = None;
        Ok(())
    }

    fn is_interrupt_enabled(&self) -> bool {
        self.state.lock().edge.is_some()
    }
}

/// A complete simulated instrument with shared handles to every simulator.
#[derive(Clone)]
pub struct SimBench {
    pub display: Arc<SimDisplay>,
    pub sensor: Arc<SimDutSensor>,
    pub motor: Arc<SimMotor>,
    pub audio: Arc<SimAudio>,
    pub clock: Arc<SimClock>,
    pub battery: Arc<SimBattery>,
    pub detector_pin: Arc<SimPin>,
}

impl SimBench {
    pub fn new(idle_reading: u32) -> Self {
        Self {
            display: Arc::new(SimDisplay::new()),
            sensor: Arc::new(SimDutSensor::new(idle_reading)),
            motor: Arc::new(SimMotor::new()),
            audio: Arc::new(SimAudio::new()),
            clock: Arc::new(SimClock::new()),
            battery: Arc::new(SimBattery::new(100)),
            detector_pin: Arc::new(SimPin::new(9)),
        }
    }

    pub fn hardware(&self) -> crate::Hardware {
        crate::Hardware {
            display: self.display.clone(),
            sensor: self.sensor.clone(),
            motor: self.motor.clone(),
            audio: self.audio.clone(),
            clock: self.clock.clone(),
            battery: self.battery.clone(),
            detector_pin: self.detector_pin.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_display_chip_script() {
        let display = SimDisplay::new();
        display.script_chip_ids([0, 0x12]);
        assert_eq!(display.chip_id().unwrap(), 0);
        assert_eq!(display.chip_id().unwrap(), 0x12);
        assert_eq!(display.chip_id().unwrap(), FT800_CHIP_ID);
    }

    #[test]
    fn test_display_touch_is_one_shot() {
        let display = SimDisplay::new();
        display.touch(b'T');
        assert_eq!(display.read_touch_tag().unwrap(), b'T');
        assert_eq!(display.read_touch_tag().unwrap(), NO_TAG);
    }

    #[test]
    fn test_draw_outside_frame_fails() {
        let display = SimDisplay::new();
        assert_eq!(display.draw(DrawCmd::Calibrate), Err(HalError::NotInitialized));
    }

    #[test]
    fn test_sensor_repeats_last_reading() {
        let sensor = SimDutSensor::new(1000);
        sensor.script([900, 800]);
        let values: Vec<u32> = (0..4).map(|_| sensor.dut_raw_value().unwrap()).collect();
        assert_eq!(values, [900, 800, 800, 800]);
        assert_eq!(sensor.reads(), 4);
    }

    #[test]
    fn test_motor_counts_switch_ons() {
        let motor = SimMotor::new();
        motor.enable().unwrap();
        motor.enable().unwrap();
        motor.disable().unwrap();
        motor.enable().unwrap();
        assert_eq!(motor.enable_count(), 2);
        assert!(motor.is_enabled());
    }

    #[test]
    fn test_fixed_clock_format() {
        let at = chrono::NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(14, 5, 0)
            .unwrap();
        let clock = SimClock::fixed(at);
        assert_eq!(clock.format_date(), "16.10.2026");
        assert_eq!(clock.format_time(), "14:05");
    }

    #[test]
    fn test_pin_edges() {
        let pin = SimPin::new(9);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        pin.set_edge_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        pin.drive(Level::High);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        pin.enable_interrupt(Edge::Rising).unwrap();
        pin.drive(Level::Low);
        pin.drive(Level::High);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        pin.disable_interrupt().unwrap();
        pin.drive(Level::Low);
        pin.drive(Level::High);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
