//! GUI event processing agent.
//!
//! Owns the touch display and runs the test sequence:
//!
//! ```text
//! Init -> WakeUpLcd -> Welcome -> Main <-> Settings | Export
//!                                  |
//!                                  v
//!                               PreTest -> TestRun { TestFirstTh -> TestSecondTh }
//!                                              |
//!                                              v
//!                                         TestOverview -> Main
//! ```
//!
//! Every state arms its timers on ENTRY or INIT and cancels them on EXIT.
//! Timer expiries are posted ahead of queued events to this EPA.

use std::sync::Arc;

use eds::{ms_to_ticks, Action, EpaId, Event, Hsm, Signal, TimerAction, VTimer};
use log::{debug, info, warn};
use vt_hal::{HalResult, FT800_CHIP_ID, NO_TAG};

use crate::config::{TesterConfig, ThresholdConfig};
use crate::screens::{self, MainScreen, ScreenMask, TestScreen, TestTitle};
use crate::signals::*;
use crate::Hardware;

/// Mailbox capacity of the GUI EPA.
pub const GUI_QUEUE: usize = 10;

pub const START_MELODY: &[u8] = &[20, 100, 20];
pub const FAIL_MELODY: &[u8] = &[150, 150, 175, 175, 200];
pub const CONFUSED_MELODY: &[u8] = &[20, 100, 20, 100, 40, 100, 40, 100, 60];
pub const SUCCESS_MELODY: &[u8] = &[20, 100, 20, 100, 20];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiState {
    Init,
    WakeUpLcd,
    Welcome,
    Main,
    PreTest,
    /// Superstate of both stages; the pump runs while it is active.
    TestRun,
    TestFirstTh,
    TestSecondTh,
    TestOverview,
    Settings,
    Export,
}

/// Bookkeeping of one test stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThresholdStatus {
    pub valid: bool,
    pub cancelled: bool,
    pub executed: bool,
    /// Strongest vacuum seen, in raw units below the idle reading.
    pub raw_max: u32,
}

impl ThresholdStatus {
    pub fn label(&self) -> &'static str {
        if self.valid {
            "PASSED"
        } else if self.cancelled {
            "CANCELLED"
        } else if !self.executed {
            "SKIPPED"
        } else {
            "FAILED"
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Verdict {
    Success,
    Cancelled,
    Failed,
}

impl Verdict {
    pub fn of(first: &ThresholdStatus, second: &ThresholdStatus) -> Self {
        if first.valid && second.valid {
            Self::Success
        } else if first.cancelled || second.cancelled {
            Self::Cancelled
        } else {
            Self::Failed
        }
    }

    pub fn title(self) -> TestTitle {
        match self {
            Self::Success => TestTitle::Success,
            Self::Cancelled => TestTitle::Cancelled,
            Self::Failed => TestTitle::Failed,
        }
    }

    pub fn melody(self) -> &'static [u8] {
        match self {
            Self::Success => SUCCESS_MELODY,
            Self::Cancelled => CONFUSED_MELODY,
            Self::Failed => FAIL_MELODY,
        }
    }
}

/// Display wake-up attempts per controller power-up. At least one
/// attempt waits on the retry timer, so an unanswering controller never
/// cycles through `Init` within a single transition.
fn wake_budget(cfg: &TesterConfig) -> u32 {
    cfg.wake_retries.max(1)
}

/// Vacuum of `raw` relative to the idle reading; `None` above idle.
fn vacuum(idle: u32, raw: u32) -> Option<u32> {
    idle.checked_sub(raw)
}

/// Where a stage goes after one sample.
enum StageStep {
    Running,
    Passed,
    Cancelled,
}

pub struct Gui {
    hw: Hardware,
    cfg: TesterConfig,
    id: EpaId,
    timeout: Arc<VTimer>,
    refresh: Arc<VTimer>,
    retry: u32,
    raw_idle_vacuum: u32,
    first: ThresholdStatus,
    second: ThresholdStatus,
}

impl Gui {
    pub fn new(hw: Hardware, cfg: TesterConfig, id: EpaId) -> Self {
        Self {
            hw,
            retry: wake_budget(&cfg),
            cfg,
            id,
            timeout: VTimer::new("gui.timeout"),
            refresh: VTimer::new("gui.refresh"),
            raw_idle_vacuum: 0,
            first: ThresholdStatus::default(),
            second: ThresholdStatus::default(),
        }
    }

    /// Timers to register on the timer wheel.
    pub fn timers(&self) -> [Arc<VTimer>; 2] {
        [Arc::clone(&self.timeout), Arc::clone(&self.refresh)]
    }

    pub fn first_threshold(&self) -> ThresholdStatus {
        self.first
    }

    pub fn second_threshold(&self) -> ThresholdStatus {
        self.second
    }

    pub fn raw_idle_vacuum(&self) -> u32 {
        self.raw_idle_vacuum
    }

    pub fn retries_left(&self) -> u32 {
        self.retry
    }

    pub fn verdict(&self) -> Verdict {
        Verdict::of(&self.first, &self.second)
    }

    fn arm(&self, timer: &VTimer, ms: u32, signal: Signal) {
        timer.start(
            ms_to_ticks(ms, self.cfg.tick_hz),
            TimerAction::post_ahead(self.id, signal),
        );
    }

    fn arm_timeout(&self, ms: u32, signal: Signal) {
        self.arm(&self.timeout, ms, signal);
    }

    fn arm_refresh(&self, ms: u32, signal: Signal) {
        self.arm(&self.refresh, ms, signal);
    }

    fn check(&self, what: &str, result: HalResult<()>) {
        if let Err(err) = result {
            warn!("GUI: {what} failed: {err}");
        }
    }

    fn touch_tag(&self) -> u8 {
        self.hw.display.read_touch_tag().unwrap_or(NO_TAG)
    }

    fn play(&self, melody: &[u8]) {
        self.check("melody", self.hw.audio.play_melody(melody));
    }

    fn show_main(&self) {
        let status = MainScreen {
            dut_detected: self.hw.sensor.is_dut_detected(),
            battery: self.hw.battery.format_status(),
            date: self.hw.clock.format_date(),
            time: self.hw.clock.format_time(),
        };
        self.check("main screen", screens::main_menu(&*self.hw.display, &status));
    }

    fn show_test(&self, screen: &TestScreen) {
        self.check("test screen", screens::test_status(&*self.hw.display, screen));
    }

    fn reset_statuses(&mut self) {
        self.first = ThresholdStatus::default();
        self.second = ThresholdStatus::default();
    }

    /// Reads one sample and updates the stage's bookkeeping.
    fn sample(&mut self, second_stage: bool) -> StageStep {
        let raw = match self.hw.sensor.dut_raw_value() {
            Ok(raw) => raw,
            Err(err) => {
                warn!("GUI: pressure sample failed: {err}");
                return StageStep::Running;
            }
        };

        let screen = if second_stage {
            let mut screen = TestScreen::new(
                TestTitle::SecondInProgress,
                ScreenMask::FIRST_INFO
                    | ScreenMask::FIRST_STATUS
                    | ScreenMask::SECOND_INFO
                    | ScreenMask::SECOND_PROGRESS,
            );
            screen.first_value = self.first.raw_max;
            screen.first_status = self.first.label();
            screen.second_value = raw;
            screen
        } else {
            let mut screen = TestScreen::new(
                TestTitle::FirstInProgress,
                ScreenMask::FIRST_INFO | ScreenMask::FIRST_PROGRESS,
            );
            screen.first_value = raw;
            screen
        };
        self.show_test(&screen);

        let limit: ThresholdConfig = if second_stage { self.cfg.second } else { self.cfg.first };
        let idle = self.raw_idle_vacuum;
        let detected = self.hw.sensor.is_dut_detected();
        let status = if second_stage { &mut self.second } else { &mut self.first };

        if !detected {
            status.cancelled = true;
            return StageStep::Cancelled;
        }
        if let Some(vacuum) = vacuum(idle, raw) {
            status.raw_max = status.raw_max.max(vacuum);
            if vacuum >= limit.raw_vacuum {
                status.valid = true;
                return StageStep::Passed;
            }
        }
        StageStep::Running
    }

    fn init(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::INIT => {
                self.retry = wake_budget(&self.cfg);
                self.check("display power-up", self.hw.display.init_early());
                Action::Transition(GuiState::WakeUpLcd)
            }
            _ => Action::Ignored,
        }
    }

    fn wake_up_lcd(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::INIT => {
                if matches!(self.hw.display.chip_id(), Ok(FT800_CHIP_ID)) {
                    self.check("display setup", self.hw.display.init_late());
                    Action::Transition(GuiState::Welcome)
                } else if self.retry > 0 {
                    self.retry -= 1;
                    self.arm_timeout(self.cfg.wake_retry_ms, WAKEUP_TIMEOUT);
                    Action::Handled
                } else {
                    warn!("GUI: display controller not answering, restarting it");
                    Action::Transition(GuiState::Init)
                }
            }
            WAKEUP_TIMEOUT => Action::Transition(GuiState::WakeUpLcd),
            Signal::EXIT => {
                self.timeout.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn welcome(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.check(
                    "welcome screen",
                    screens::welcome(&*self.hw.display, &*self.hw.clock),
                );
                self.check("backlight", self.hw.display.fade_in());
                self.arm_timeout(self.cfg.welcome_ms, WELCOME_WAIT);
                Action::Handled
            }
            WELCOME_WAIT => {
                self.check("calibration", screens::calibrate(&*self.hw.display));
                Action::Transition(GuiState::Main)
            }
            Signal::EXIT => {
                self.timeout.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn main_menu(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::INIT => {
                self.show_main();
                self.arm_refresh(self.cfg.main_refresh_ms, MAIN_REFRESH);
                Action::Handled
            }
            MAIN_REFRESH => match self.touch_tag() {
                screens::TAG_TEST => Action::Transition(GuiState::PreTest),
                screens::TAG_SETTINGS => Action::Transition(GuiState::Settings),
                screens::TAG_EXPORT => Action::Transition(GuiState::Export),
                _ => Action::Transition(GuiState::Main),
            },
            PDETECT_PRESS | PDETECT_RELEASE => Action::Transition(GuiState::Main),
            Signal::EXIT => {
                self.refresh.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn pre_test(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.arm_timeout(self.cfg.pre_test_ms, PRE_TEST_WAIT);
                let mut screen = TestScreen::new(TestTitle::Preparing, ScreenMask::FIRST_STATUS);
                screen.first_status = "preparing tests";
                self.show_test(&screen);
                self.play(START_MELODY);
                Action::Handled
            }
            PRE_TEST_WAIT => {
                if !self.hw.sensor.is_dut_detected() {
                    return Action::Transition(GuiState::Main);
                }
                match self.hw.sensor.dut_raw_value() {
                    Ok(raw) => {
                        self.reset_statuses();
                        self.raw_idle_vacuum = raw;
                        debug!("GUI: idle reading {raw}");
                        Action::Transition(GuiState::TestFirstTh)
                    }
                    Err(err) => {
                        warn!("GUI: idle reading failed: {err}");
                        Action::Transition(GuiState::Main)
                    }
                }
            }
            Signal::EXIT => {
                self.timeout.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn test_run(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.check("motor on", self.hw.motor.enable());
                Action::Handled
            }
            Signal::INIT => Action::Transition(GuiState::TestFirstTh),
            Signal::EXIT => {
                self.check("motor off", self.hw.motor.disable());
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn test_first_th(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.first.executed = true;
                self.arm_timeout(self.cfg.first.timeout_ms, FIRST_TH_TIMEOUT);
                self.arm_refresh(self.cfg.test_refresh_ms, FIRST_TH_REFRESH);
                Action::Handled
            }
            FIRST_TH_REFRESH => {
                self.arm_refresh(self.cfg.test_refresh_ms, FIRST_TH_REFRESH);
                match self.sample(false) {
                    StageStep::Running => Action::Handled,
                    StageStep::Passed => {
                        self.second.raw_max = self.first.raw_max;
                        Action::Transition(GuiState::TestSecondTh)
                    }
                    StageStep::Cancelled => Action::Transition(GuiState::TestOverview),
                }
            }
            FIRST_TH_TIMEOUT => Action::Transition(GuiState::TestOverview),
            Signal::EXIT => {
                self.refresh.cancel();
                self.timeout.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn test_second_th(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.second.executed = true;
                self.arm_timeout(self.cfg.second.timeout_ms, SECOND_TH_TIMEOUT);
                self.arm_refresh(self.cfg.test_refresh_ms, SECOND_TH_REFRESH);
                Action::Handled
            }
            SECOND_TH_REFRESH => {
                self.arm_refresh(self.cfg.test_refresh_ms, SECOND_TH_REFRESH);
                match self.sample(true) {
                    StageStep::Running => Action::Handled,
                    StageStep::Passed | StageStep::Cancelled => {
                        Action::Transition(GuiState::TestOverview)
                    }
                }
            }
            SECOND_TH_TIMEOUT => Action::Transition(GuiState::TestOverview),
            Signal::EXIT => {
                self.refresh.cancel();
                self.timeout.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn test_overview(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.arm_refresh(self.cfg.main_refresh_ms, TEST_OVERVIEW_REFRESH);
                let verdict = self.verdict();
                info!(
                    "GUI: test finished: {:?} (first {}, second {})",
                    verdict,
                    self.first.label(),
                    self.second.label()
                );
                self.play(verdict.melody());

                let mut screen = TestScreen::new(verdict.title(), ScreenMask::all());
                screen.first_value = self.first.raw_max;
                screen.first_status = self.first.label();
                screen.second_value = self.second.raw_max;
                screen.second_status = self.second.label();
                screen.button = "Continue";
                self.show_test(&screen);
                Action::Handled
            }
            TEST_OVERVIEW_REFRESH => self.await_back(TEST_OVERVIEW_REFRESH),
            Signal::EXIT => {
                self.refresh.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    /// Returns to the main screen on a `B` touch, otherwise keeps polling.
    fn await_back(&mut self, signal: Signal) -> Action<GuiState> {
        if self.touch_tag() == screens::TAG_BACK {
            Action::Transition(GuiState::Main)
        } else {
            self.arm_refresh(self.cfg.main_refresh_ms, signal);
            Action::Handled
        }
    }

    fn settings(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.check(
                    "settings screen",
                    screens::settings(&*self.hw.display, &*self.hw.clock),
                );
                self.arm_refresh(self.cfg.main_refresh_ms, REFRESH);
                Action::Handled
            }
            REFRESH => self.await_back(REFRESH),
            Signal::EXIT => {
                self.refresh.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }

    fn export(&mut self, signal: Signal) -> Action<GuiState> {
        match signal {
            Signal::ENTRY => {
                self.check("export screen", screens::export(&*self.hw.display));
                self.arm_refresh(self.cfg.main_refresh_ms, REFRESH);
                Action::Handled
            }
            REFRESH => self.await_back(REFRESH),
            Signal::EXIT => {
                self.refresh.cancel();
                Action::Handled
            }
            _ => Action::Ignored,
        }
    }
}

impl Hsm for Gui {
    type State = GuiState;

    const STATES: &'static [GuiState] = &[
        GuiState::Init,
        GuiState::WakeUpLcd,
        GuiState::Welcome,
        GuiState::Main,
        GuiState::PreTest,
        GuiState::TestRun,
        GuiState::TestFirstTh,
        GuiState::TestSecondTh,
        GuiState::TestOverview,
        GuiState::Settings,
        GuiState::Export,
    ];
    const INITIAL: GuiState = GuiState::Init;

    fn parent(state: GuiState) -> Option<GuiState> {
        match state {
            GuiState::TestFirstTh | GuiState::TestSecondTh => Some(GuiState::TestRun),
            _ => None,
        }
    }

    fn handle(&mut self, state: GuiState, event: &Event) -> Action<GuiState> {
        let signal = event.signal();
        match state {
            GuiState::Init => self.init(signal),
            GuiState::WakeUpLcd => self.wake_up_lcd(signal),
            GuiState::Welcome => self.welcome(signal),
            GuiState::Main => self.main_menu(signal),
            GuiState::PreTest => self.pre_test(signal),
            GuiState::TestRun => self.test_run(signal),
            GuiState::TestFirstTh => self.test_first_th(signal),
            GuiState::TestSecondTh => self.test_second_th(signal),
            GuiState::TestOverview => self.test_overview(signal),
            GuiState::Settings => self.settings(signal),
            GuiState::Export => self.export(signal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(valid: bool, cancelled: bool, executed: bool) -> ThresholdStatus {
        ThresholdStatus {
            valid,
            cancelled,
            executed,
            raw_max: 0,
        }
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(status(true, false, true).label(), "PASSED");
        assert_eq!(status(false, true, true).label(), "CANCELLED");
        assert_eq!(status(false, false, false).label(), "SKIPPED");
        assert_eq!(status(false, false, true).label(), "FAILED");
    }

    #[test]
    fn test_verdicts() {
        let passed = status(true, false, true);
        let cancelled = status(false, true, true);
        let failed = status(false, false, true);
        let skipped = status(false, false, false);

        assert_eq!(Verdict::of(&passed, &passed), Verdict::Success);
        assert_eq!(Verdict::of(&passed, &cancelled), Verdict::Cancelled);
        assert_eq!(Verdict::of(&cancelled, &skipped), Verdict::Cancelled);
        assert_eq!(Verdict::of(&failed, &skipped), Verdict::Failed);
        assert_eq!(Verdict::Cancelled.melody(), CONFUSED_MELODY);
        assert_eq!(Verdict::Success.title(), TestTitle::Success);
    }

    #[test]
    fn test_vacuum_below_idle_only() {
        assert_eq!(vacuum(1000, 790), Some(210));
        assert_eq!(vacuum(1000, 1000), Some(0));
        assert_eq!(vacuum(1000, 1010), None);
    }
}
