//! Touch display controller abstraction
//!
//! Models an FT800-class graphics coprocessor: a chip that is woken in two
//! phases, draws frames from a command list and reports the tag of the
//! touched widget.

use crate::error::HalResult;

/// Chip identifier reported by a correctly woken FT800.
pub const FT800_CHIP_ID: u8 = 0x7C;

/// Tag value reported when nothing tagged is touched.
pub const NO_TAG: u8 = 0;

/// 24-bit colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const LIGHT_GREY: Rgb = Rgb(224, 224, 224);
    pub const GREY: Rgb = Rgb(92, 92, 92);
    pub const RED: Rgb = Rgb(255, 0, 0);
}

/// Text anchoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Align {
    /// Anchor at the top-left corner
    TopLeft,
    /// Anchor at the centre
    Center,
    /// Anchor at the left edge, vertically centred
    CenterY,
}

/// One display-list command
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrawCmd {
    /// Colour for subsequent primitives
    Color(Rgb),
    Text {
        x: i16,
        y: i16,
        font: u8,
        align: Align,
        text: String,
    },
    /// Button reporting `tag` while touched
    Button {
        x: i16,
        y: i16,
        w: u16,
        h: u16,
        font: u8,
        tag: u8,
        label: String,
    },
    Number {
        x: i16,
        y: i16,
        font: u8,
        align: Align,
        value: i32,
    },
    Progress {
        x: i16,
        y: i16,
        w: u16,
        h: u16,
        value: u32,
        range: u32,
    },
    Line {
        x0: i16,
        y0: i16,
        x1: i16,
        y1: i16,
        width: u16,
    },
    /// Start the coprocessor touch calibration routine
    Calibrate,
}

/// Touch display (object-safe)
pub trait Display: Send + Sync {
    /// Power-cycle and clock the controller up
    fn init_early(&self) -> HalResult<()>;

    /// Read the chip identifier register
    fn chip_id(&self) -> HalResult<u8>;

    /// Program panel timings and touch sensitivity
    fn init_late(&self) -> HalResult<()>;

    /// Ramp the backlight up
    fn fade_in(&self) -> HalResult<()>;

    /// Start a new frame cleared to `clear`
    fn begin_frame(&self, clear: Rgb) -> HalResult<()>;

    /// Append a command to the current frame
    fn draw(&self, cmd: DrawCmd) -> HalResult<()>;

    /// Show the current frame
    fn swap_frame(&self) -> HalResult<()>;

    /// Wait until the coprocessor has consumed all commands
    fn wait_idle(&self) -> HalResult<()>;

    /// Tag of the touched widget, [`NO_TAG`] when none
    fn read_touch_tag(&self) -> HalResult<u8>;
}
