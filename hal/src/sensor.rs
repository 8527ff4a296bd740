//! Device-under-test (porator) sensing

use crate::error::HalResult;

/// Presence detector and pressure sensor of the test pad
pub trait DutSensor: Send + Sync {
    /// True when a porator sits on the test pad
    fn is_dut_detected(&self) -> bool;

    /// Raw pressure reading; lower values mean stronger vacuum
    fn dut_raw_value(&self) -> HalResult<u32>;
}
