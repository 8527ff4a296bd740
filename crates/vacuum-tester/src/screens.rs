//! Screen layouts of the 320x240 touch panel.
//!
//! Every function renders one complete frame: clear, draw, swap and wait for
//! the coprocessor to drain its command queue.

use bitflags::bitflags;
use vt_hal::{Align, Clock, Display, DrawCmd, HalResult, Rgb};

pub const DISP_WIDTH: i16 = 320;
pub const DISP_HEIGHT: i16 = 240;

/// Regular and bold built-in fonts.
pub const FONT_N1: u8 = 27;
pub const FONT_B1: u8 = 30;
const FONT_SMALL: u8 = 26;

pub const GREETING: &str = "Vacuum tester";
pub const WEBSITE: &str = "www.nitto.com";
pub const HARDWARE_VERSION: &str = "1.0";
pub const SOFTWARE_VERSION: &str = env!("CARGO_PKG_VERSION");
const VACUUM_UNIT: &str = "raw";

pub const TAG_TEST: u8 = b'T';
pub const TAG_TEST_DISABLED: u8 = b't';
pub const TAG_SETTINGS: u8 = b'S';
pub const TAG_EXPORT: u8 = b'E';
pub const TAG_BACK: u8 = b'B';

/// Full scale of the stage progress bars.
pub const PROGRESS_RANGE: u32 = 1024;

const TITLE: (i16, i16) = (DISP_WIDTH / 2, 30);
const COLUMN_LEFT: i16 = 13;
const COLUMN_UNIT: i16 = 170;
const COLUMN_VALUE: i16 = 240;
const COLUMN_HALF: i16 = DISP_WIDTH / 2;
const ROW_1: i16 = 70;
const ROW_1_5: i16 = 95;
const ROW_2: i16 = 125;
const ROW_2_5: i16 = 150;

bitflags! {
    /// Widgets shown on the test screen.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScreenMask: u32 {
        const FIRST_INFO = 1 << 0;
        const SECOND_INFO = 1 << 1;
        const FIRST_PROGRESS = 1 << 2;
        const SECOND_PROGRESS = 1 << 3;
        const FIRST_STATUS = 1 << 4;
        const SECOND_STATUS = 1 << 5;
        const BUTTON = 1 << 6;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TestTitle {
    Preparing,
    FirstInProgress,
    SecondInProgress,
    Failed,
    Cancelled,
    Success,
}

impl TestTitle {
    pub fn text(self) -> &'static str {
        match self {
            Self::Preparing | Self::FirstInProgress | Self::SecondInProgress => "Test in progress",
            Self::Failed => "Test failed",
            Self::Cancelled => "Test cancelled",
            Self::Success => "Test success",
        }
    }

    pub fn background(self) -> Rgb {
        match self {
            Self::Preparing | Self::FirstInProgress | Self::SecondInProgress => Rgb::LIGHT_GREY,
            Self::Failed => Rgb(224, 16, 16),
            Self::Cancelled => Rgb(224, 224, 16),
            Self::Success => Rgb(16, 224, 16),
        }
    }
}

/// Contents of the test screen; widgets not in `mask` are not drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestScreen {
    pub title: TestTitle,
    pub mask: ScreenMask,
    pub first_value: u32,
    pub first_progress: u32,
    pub first_status: &'static str,
    pub second_value: u32,
    pub second_progress: u32,
    pub second_status: &'static str,
    pub button: &'static str,
}

impl TestScreen {
    pub fn new(title: TestTitle, mask: ScreenMask) -> Self {
        Self {
            title,
            mask,
            first_value: 0,
            first_progress: PROGRESS_RANGE,
            first_status: "",
            second_value: 0,
            second_progress: PROGRESS_RANGE,
            second_status: "",
            button: "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainScreen {
    pub dut_detected: bool,
    pub battery: String,
    pub date: String,
    pub time: String,
}

fn text(x: i16, y: i16, font: u8, align: Align, text: impl Into<String>) -> DrawCmd {
    DrawCmd::Text {
        x,
        y,
        font,
        align,
        text: text.into(),
    }
}

fn button(x: i16, y: i16, w: u16, h: u16, font: u8, tag: u8, label: &str) -> DrawCmd {
    DrawCmd::Button {
        x,
        y,
        w,
        h,
        font,
        tag,
        label: label.to_string(),
    }
}

fn render(display: &dyn Display, clear: Rgb, cmds: Vec<DrawCmd>) -> HalResult<()> {
    display.begin_frame(clear)?;
    for cmd in cmds {
        display.draw(cmd)?;
    }
    display.swap_frame()?;
    display.wait_idle()
}

fn identity(clock: &dyn Clock) -> Vec<DrawCmd> {
    let center = DISP_WIDTH / 2;
    vec![
        text(center, 80, FONT_B1, Align::Center, GREETING),
        text(center, 120, FONT_N1, Align::Center, format!("Hardware version: {HARDWARE_VERSION}")),
        text(center, 140, FONT_N1, Align::Center, format!("Software version: {SOFTWARE_VERSION}")),
        text(center, 160, FONT_N1, Align::Center, clock.format_date()),
        text(center, 180, FONT_N1, Align::Center, clock.format_time()),
        text(center, 220, FONT_N1, Align::Center, WEBSITE),
    ]
}

pub fn welcome(display: &dyn Display, clock: &dyn Clock) -> HalResult<()> {
    let mut cmds = vec![DrawCmd::Color(Rgb::BLACK)];
    cmds.extend(identity(clock));
    render(display, Rgb::LIGHT_GREY, cmds)
}

pub fn calibrate(display: &dyn Display) -> HalResult<()> {
    let cmds = vec![
        DrawCmd::Color(Rgb::BLACK),
        text(DISP_WIDTH / 2, 80, FONT_B1, Align::Center, "Touch Calibration"),
        text(DISP_WIDTH / 2, DISP_HEIGHT / 2, FONT_SMALL, Align::Center, "Please tap on the dot"),
        DrawCmd::Calibrate,
    ];
    render(display, Rgb::LIGHT_GREY, cmds)
}

pub fn main_menu(display: &dyn Display, status: &MainScreen) -> HalResult<()> {
    let mut cmds = vec![
        DrawCmd::Color(Rgb::WHITE),
        button(20, 20, 120, 40, FONT_N1, TAG_SETTINGS, "Settings"),
        button(180, 20, 120, 40, FONT_N1, TAG_EXPORT, "Export"),
    ];
    // The TEST button is greyed out and reports a different tag until a
    // porator sits on the pad.
    let hint = if status.dut_detected {
        cmds.push(DrawCmd::Color(Rgb::WHITE));
        cmds.push(button(80, 80, 160, 80, FONT_B1, TAG_TEST, "TEST"));
        cmds.push(DrawCmd::Color(Rgb::BLACK));
        "Porator is detected"
    } else {
        cmds.push(DrawCmd::Color(Rgb::GREY));
        cmds.push(button(80, 80, 160, 80, FONT_B1, TAG_TEST_DISABLED, "TEST"));
        cmds.push(DrawCmd::Color(Rgb::RED));
        "Put the porator on the test pad."
    };
    cmds.extend([
        text(160, 185, FONT_N1, Align::Center, hint),
        DrawCmd::Color(Rgb::BLACK),
        text(140, 225, FONT_N1, Align::CenterY, status.date.clone()),
        text(260, 225, FONT_N1, Align::CenterY, status.time.clone()),
        text(10, 225, FONT_N1, Align::CenterY, "BAT:"),
        text(50, 225, FONT_N1, Align::CenterY, status.battery.clone()),
        DrawCmd::Line {
            x0: 10,
            y0: 210,
            x1: 310,
            y1: 210,
            width: 1,
        },
    ]);
    render(display, Rgb::LIGHT_GREY, cmds)
}

pub fn test_status(display: &dyn Display, status: &TestScreen) -> HalResult<()> {
    let mask = status.mask;
    let bar_width = (DISP_WIDTH - COLUMN_LEFT * 2) as u16;
    let mut cmds = vec![
        DrawCmd::Color(Rgb::BLACK),
        text(TITLE.0, TITLE.1, FONT_B1, Align::Center, status.title.text()),
    ];

    if mask.contains(ScreenMask::FIRST_INFO) {
        cmds.extend(value_row(ROW_1, "First threshold", status.first_value));
    }
    if mask.contains(ScreenMask::FIRST_STATUS) {
        cmds.push(text(COLUMN_HALF, ROW_1_5, FONT_N1, Align::Center, status.first_status));
    } else if mask.contains(ScreenMask::FIRST_PROGRESS) {
        cmds.push(progress(ROW_1_5, bar_width, status.first_value, status.first_progress));
    }

    if mask.contains(ScreenMask::SECOND_INFO) {
        cmds.extend(value_row(ROW_2, "Second threshold", status.second_value));
    }
    if mask.contains(ScreenMask::SECOND_STATUS) {
        cmds.push(text(COLUMN_HALF, ROW_2_5, FONT_N1, Align::Center, status.second_status));
    } else if mask.contains(ScreenMask::SECOND_PROGRESS) {
        cmds.push(progress(ROW_2_5, bar_width, status.second_value, status.second_progress));
    }

    if mask.contains(ScreenMask::BUTTON) {
        cmds.push(DrawCmd::Color(Rgb::WHITE));
        cmds.push(button(100, 180, 120, 40, FONT_N1, TAG_BACK, status.button));
    }
    render(display, status.title.background(), cmds)
}

fn value_row(y: i16, label: &str, value: u32) -> [DrawCmd; 3] {
    [
        text(COLUMN_LEFT, y, FONT_N1, Align::CenterY, label),
        text(COLUMN_UNIT, y, FONT_N1, Align::CenterY, format!("[{VACUUM_UNIT}]:")),
        DrawCmd::Number {
            x: COLUMN_VALUE,
            y,
            font: FONT_N1,
            align: Align::CenterY,
            value: i32::try_from(value).unwrap_or(i32::MAX),
        },
    ]
}

fn progress(y: i16, w: u16, value: u32, range: u32) -> DrawCmd {
    DrawCmd::Progress {
        x: COLUMN_LEFT,
        y: y - 5,
        w,
        h: 10,
        value,
        range,
    }
}

pub fn settings(display: &dyn Display, clock: &dyn Clock) -> HalResult<()> {
    let mut cmds = vec![DrawCmd::Color(Rgb::BLACK)];
    cmds.extend(identity(clock));
    cmds.push(DrawCmd::Color(Rgb::WHITE));
    cmds.push(button(200, 190, 100, 36, FONT_N1, TAG_BACK, "Back"));
    render(display, Rgb::WHITE, cmds)
}

pub fn export(display: &dyn Display) -> HalResult<()> {
    let cmds = vec![
        DrawCmd::Color(Rgb::BLACK),
        text(TITLE.0, TITLE.1, FONT_B1, Align::Center, "Export"),
        text(DISP_WIDTH / 2, DISP_HEIGHT / 2, FONT_N1, Align::Center, "No test records to export"),
        DrawCmd::Color(Rgb::WHITE),
        button(200, 190, 100, 36, FONT_N1, TAG_BACK, "Back"),
    ];
    render(display, Rgb::WHITE, cmds)
}
