//! Hardware Abstraction Layer (HAL) for the vacuum tester
//!
//! Object-safe capability traits for every peripheral the control core talks
//! to. Implementations take `&self` and are shared as `Arc<dyn Trait>` between
//! the GUI EPA and interrupt-context callbacks.

pub mod audio;
pub mod battery;
pub mod clock;
pub mod display;
pub mod error;
pub mod gpio;
pub mod motor;
pub mod sensor;

// Re-export commonly used types
pub use audio::Audio;
pub use battery::Battery;
pub use clock::Clock;
pub use display::{Align, Display, DrawCmd, Rgb, FT800_CHIP_ID, NO_TAG};
pub use error::{HalError, HalResult};
pub use gpio::{Edge, EdgeCallback, GpioPin, GpioPinInterrupt, Level, PinMode};
pub use motor::Motor;
pub use sensor::DutSensor;
