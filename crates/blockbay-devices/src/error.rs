//! Errors raised by the builtin peripherals.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DeviceError {
    #[error("Unknown pin: {0}")]
    UnknownPin(String),

    #[error("Pin {pin} does not support {capability}")]
    Unsupported { pin: String, capability: &'static str },

    #[error("Invalid {name}: {value}")]
    InvalidArgument { name: &'static str, value: String },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
}

impl From<DeviceError> for blockbay_core::Error {
    fn from(err: DeviceError) -> Self {
        blockbay_core::Error::ExecutionFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
