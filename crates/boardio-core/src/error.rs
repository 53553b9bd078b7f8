//! Error types for boardio-core
//!
//! Every fallible operation in the core returns [`Error`]. The type is
//! `Copy` so it can be cached (platform detection stores its outcome) and
//! handed across threads without allocation. Backends keep their detailed
//! OS/USB errors to themselves and log them before converting.
//!
//! [`ResultCode`] is the stable numeric form of the same taxonomy, for
//! callers that cannot consume Rust enums.

use thiserror::Error;

/// Core error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    // Resolution errors
    /// Logical index is out of range for the platform and any sub-platform
    #[error("invalid resource: index out of range")]
    InvalidResource,
    /// A sub-platform index was requested but no sub-platform is attached
    #[error("no sub-platform attached")]
    NoSubplatform,
    /// Writing a mux control line failed while opening a resource
    #[error("pin mux configuration failed")]
    MuxConfigurationFailed,

    // Capability errors
    /// The line cannot be driven in the requested direction
    #[error("direction not supported by this pin")]
    UnsupportedDirection,
    /// The pin or bus cannot provide the requested mode
    #[error("mode not supported")]
    UnsupportedMode,
    /// Value outside of the range the resource accepts
    #[error("value out of range")]
    OutOfRange,
    /// Operation attempted before the required setup
    #[error("resource not configured for this operation")]
    NotConfigured,
    /// The line has no edge interrupt capability
    #[error("interrupts not supported on this pin")]
    InterruptUnsupported,
    /// Malformed argument
    #[error("invalid parameter")]
    InvalidParameter,

    // Runtime errors
    /// The physical resource is already owned by another live handle
    #[error("resource busy")]
    ResourceBusy,
    /// The underlying kernel or USB transaction failed
    #[error("I/O failure")]
    IoFailure,
    /// No board table matched the running system
    #[error("platform not detected")]
    PlatformNotDetected,
}

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;

/// Numeric result codes
///
/// The values are part of the external interface and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    /// Operation completed
    Success = 0,
    /// See [`Error::InvalidResource`]
    InvalidResource = 1,
    /// See [`Error::NoSubplatform`]
    NoSubplatform = 2,
    /// See [`Error::MuxConfigurationFailed`]
    MuxConfigurationFailed = 3,
    /// See [`Error::UnsupportedDirection`]
    UnsupportedDirection = 4,
    /// See [`Error::UnsupportedMode`]
    UnsupportedMode = 5,
    /// See [`Error::OutOfRange`]
    OutOfRange = 6,
    /// See [`Error::NotConfigured`]
    NotConfigured = 7,
    /// See [`Error::InterruptUnsupported`]
    InterruptUnsupported = 8,
    /// See [`Error::ResourceBusy`]
    ResourceBusy = 9,
    /// See [`Error::IoFailure`]
    IoFailure = 10,
    /// See [`Error::InvalidParameter`]
    InvalidParameter = 11,
    /// See [`Error::PlatformNotDetected`]
    PlatformNotDetected = 12,
}

impl ResultCode {
    /// Collapse a result into its code, discarding any success value
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(e) => (*e).into(),
        }
    }

    /// Whether this code signals success
    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }

    /// Raw integer value
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<Error> for ResultCode {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidResource => ResultCode::InvalidResource,
            Error::NoSubplatform => ResultCode::NoSubplatform,
            Error::MuxConfigurationFailed => ResultCode::MuxConfigurationFailed,
            Error::UnsupportedDirection => ResultCode::UnsupportedDirection,
            Error::UnsupportedMode => ResultCode::UnsupportedMode,
            Error::OutOfRange => ResultCode::OutOfRange,
            Error::NotConfigured => ResultCode::NotConfigured,
            Error::InterruptUnsupported => ResultCode::InterruptUnsupported,
            Error::InvalidParameter => ResultCode::InvalidParameter,
            Error::ResourceBusy => ResultCode::ResourceBusy,
            Error::IoFailure => ResultCode::IoFailure,
            Error::PlatformNotDetected => ResultCode::PlatformNotDetected,
        }
    }
}

impl From<ResultCode> for i32 {
    fn from(code: ResultCode) -> Self {
        code as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_zero() {
        let ok: Result<u8> = Ok(3);
        assert_eq!(ResultCode::from_result(&ok).code(), 0);
        assert!(ResultCode::from_result(&ok).is_success());
    }

    #[test]
    fn errors_map_to_distinct_codes() {
        let all = [
            Error::InvalidResource,
            Error::NoSubplatform,
            Error::MuxConfigurationFailed,
            Error::UnsupportedDirection,
            Error::UnsupportedMode,
            Error::OutOfRange,
            Error::NotConfigured,
            Error::InterruptUnsupported,
            Error::InvalidParameter,
            Error::ResourceBusy,
            Error::IoFailure,
            Error::PlatformNotDetected,
        ];
        let mut codes: Vec<i32> = all.iter().map(|e| ResultCode::from(*e).code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn failed_result_keeps_kind() {
        let r: Result<()> = Err(Error::ResourceBusy);
        assert_eq!(ResultCode::from_result(&r), ResultCode::ResourceBusy);
        assert_eq!(i32::from(ResultCode::ResourceBusy), 9);
    }
}
