//! Vacuum pump motor

use crate::error::HalResult;

pub trait Motor: Send + Sync {
    fn enable(&self) -> HalResult<()>;
    fn disable(&self) -> HalResult<()>;
    fn is_enabled(&self) -> bool;
}
