//! GPIO (General Purpose Input/Output) abstraction

use std::sync::Arc;

use crate::error::HalResult;

/// GPIO pin modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PinMode {
    /// Input (floating)
    Input,
    /// Input with pull-up resistor
    InputPullUp,
    /// Input with pull-down resistor
    InputPullDown,
    /// Output (push-pull)
    Output,
    /// Output (open-drain)
    OutputOpenDrain,
}

/// GPIO pin levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Level {
    /// Low level (0V)
    Low,
    /// High level (VCC)
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Self::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }
}

/// Interrupt trigger edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Edge {
    /// Rising edge
    Rising,
    /// Falling edge
    Falling,
    /// Both edges
    Both,
}

/// Handler invoked in interrupt context when an enabled edge is seen.
pub type EdgeCallback = Arc<dyn Fn() + Send + Sync>;

/// GPIO pin trait (object-safe)
pub trait GpioPin: Send + Sync {
    /// Configure direction and pull
    fn set_mode(&self, mode: PinMode) -> HalResult<()>;

    /// Read current level
    fn read(&self) -> HalResult<Level>;

    /// Write level (for output pins)
    fn write(&self, level: Level) -> HalResult<()>;

    /// Toggle output
    fn toggle(&self) -> HalResult<()> {
        let new_level = match self.read()? {
            Level::Low => Level::High,
            Level::High => Level::Low,
        };
        self.write(new_level)
    }

    /// Get pin number
    fn pin_number(&self) -> u32;
}

/// GPIO pin with change-notification support
pub trait GpioPinInterrupt: GpioPin {
    /// Install the handler run on every enabled edge
    fn set_edge_callback(&self, callback: EdgeCallback) -> HalResult<()>;

    /// Enable edge detection
    fn enable_interrupt(&self, edge: Edge) -> HalResult<()>;

    /// Disable edge detection
    fn disable_interrupt(&self) -> HalResult<()>;

    /// Check whether edge detection is enabled
    fn is_interrupt_enabled(&self) -> bool;
}
