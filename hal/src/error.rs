//! Peripheral error type shared by every capability trait.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// Argument outside what the peripheral accepts (empty melody, bad tag)
    InvalidParameter,
    /// Command issued before the peripheral was brought up
    NotInitialized,
    /// Peripheral did not answer within its bus timeout
    NoResponse,
    /// Bus transfer to the peripheral failed
    Bus(&'static str),
    /// Capability not present on this board
    NotSupported,
}

impl fmt::Display for HalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParameter => f.write_str("invalid parameter"),
            Self::NotInitialized => f.write_str("peripheral not initialised"),
            Self::NoResponse => f.write_str("peripheral not responding"),
            Self::Bus(bus) => write!(f, "{bus} transfer failed"),
            Self::NotSupported => f.write_str("capability not supported"),
        }
    }
}

impl std::error::Error for HalError {}

pub type HalResult<T> = Result<T, HalError>;
