//! Error types for the FT4222H adapter

use boardio_core::Error as CoreError;
use thiserror::Error;

/// Result type for FT4222 operations
pub type Result<T> = std::result::Result<T, Ft4222Error>;

/// Errors that can occur when talking to an FT4222H
#[derive(Debug, Error)]
pub enum Ft4222Error {
    /// Device not found
    #[error("FT4222H device not found (VID:0403 PID:601c)")]
    DeviceNotFound,

    /// Failed to open device
    #[error("Failed to open FT4222H: {0}")]
    OpenFailed(String),

    /// Failed to claim interface
    #[error("Failed to claim interface: {0}")]
    ClaimFailed(String),

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Invalid response from device
    #[error("Invalid response from FT4222H: {0}")]
    InvalidResponse(String),

    /// The chip is strapped into a mode without a GPIO interface
    #[error("FT4222H in mode {0} has no GPIO interface")]
    NoGpioMode(u8),

    /// Port number out of range
    #[error("GPIO port {0} does not exist")]
    InvalidPort(u32),
}

impl From<nusb::Error> for Ft4222Error {
    fn from(e: nusb::Error) -> Self {
        Ft4222Error::TransferFailed(e.to_string())
    }
}

impl From<Ft4222Error> for CoreError {
    fn from(e: Ft4222Error) -> Self {
        let mapped = match e {
            Ft4222Error::DeviceNotFound | Ft4222Error::InvalidPort(_) => {
                CoreError::InvalidResource
            }
            Ft4222Error::ClaimFailed(_) => CoreError::ResourceBusy,
            Ft4222Error::NoGpioMode(_) => CoreError::UnsupportedMode,
            _ => CoreError::IoFailure,
        };
        log::debug!("ft4222: {} (reported as {:?})", e, mapped);
        mapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_to_core_errors() {
        assert_eq!(
            CoreError::from(Ft4222Error::InvalidPort(7)),
            CoreError::InvalidResource
        );
        assert_eq!(
            CoreError::from(Ft4222Error::ClaimFailed("busy".into())),
            CoreError::ResourceBusy
        );
        assert_eq!(
            CoreError::from(Ft4222Error::TransferFailed("stall".into())),
            CoreError::IoFailure
        );
        assert_eq!(
            CoreError::from(Ft4222Error::NoGpioMode(0)),
            CoreError::UnsupportedMode
        );
    }
}
