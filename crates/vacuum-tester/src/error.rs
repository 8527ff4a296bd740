use eds::EdsError;
use eds_port_posix::PortError;
use thiserror::Error;
use vt_hal::HalError;

#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error(transparent)]
    Kernel(#[from] EdsError),
    #[error("peripheral failure: {0}")]
    Hal(#[from] HalError),
    #[error("host runtime: {0}")]
    Port(#[from] PortError),
    #[error("invalid value {value:?} for {var}")]
    Config { var: &'static str, value: String },
}

pub type InstrumentResult<T> = Result<T, InstrumentError>;
