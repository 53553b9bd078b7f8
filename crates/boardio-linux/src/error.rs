//! Error types for the Linux backend

use std::path::PathBuf;

use boardio_core::Error as CoreError;
use thiserror::Error;

/// Linux backend specific errors
#[derive(Debug, Error)]
pub enum LinuxError {
    /// Failed to open a device node or sysfs attribute
    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing a sysfs attribute failed
    #[error("Failed to access {path}: {source}")]
    Attribute {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A sysfs attribute held something unexpected
    #[error("Unexpected contents in {path}: {contents:?}")]
    Parse { path: PathBuf, contents: String },

    /// GPIO line request or reconfiguration failed
    #[error("GPIO {chip}:{line}: {source}")]
    Gpio {
        chip: u32,
        line: u32,
        #[source]
        source: gpiocdev::Error,
    },

    /// An ioctl on a bus device failed
    #[error("{request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Serial port error
    #[error("Serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// Memory mapping failed
    #[error("Failed to map {size:#x} bytes at {address:#x} of {path}: {source}")]
    MemoryMap {
        path: String,
        address: u64,
        size: usize,
        #[source]
        source: std::io::Error,
    },
}

impl LinuxError {
    /// Build an ioctl error from a nix errno
    pub(crate) fn ioctl(request: &'static str, errno: nix::errno::Errno) -> Self {
        LinuxError::Ioctl {
            request,
            source: std::io::Error::from_raw_os_error(errno as i32),
        }
    }

    fn os_error(&self) -> Option<i32> {
        match self {
            LinuxError::OpenFailed { source, .. }
            | LinuxError::Attribute { source, .. }
            | LinuxError::Ioctl { source, .. }
            | LinuxError::MemoryMap { source, .. } => source.raw_os_error(),
            LinuxError::Serial { source, .. } => match source.kind() {
                serialport::ErrorKind::Io(kind) if kind == std::io::ErrorKind::PermissionDenied => {
                    Some(libc::EACCES)
                }
                serialport::ErrorKind::NoDevice => Some(libc::ENODEV),
                serialport::ErrorKind::InvalidInput => Some(libc::EINVAL),
                _ => None,
            },
            // gpiocdev only reports the errno through its message
            LinuxError::Gpio { source, .. } => {
                let text = source.to_string();
                [libc::EBUSY, libc::EINVAL, libc::ENOENT]
                    .into_iter()
                    .find(|errno| text.contains(&format!("os error {}", errno)))
            }
            LinuxError::Parse { .. } => None,
        }
    }
}

impl From<LinuxError> for CoreError {
    fn from(e: LinuxError) -> Self {
        let mapped = match e.os_error() {
            Some(libc::EBUSY) => CoreError::ResourceBusy,
            Some(libc::EINVAL) | Some(libc::EOPNOTSUPP) => CoreError::UnsupportedMode,
            Some(libc::ENOENT) | Some(libc::ENODEV) => CoreError::InvalidResource,
            _ => CoreError::IoFailure,
        };
        log::debug!("linux: {} (reported as {:?})", e, mapped);
        mapped
    }
}

/// Result type for Linux backend operations
pub type Result<T> = std::result::Result<T, LinuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn io(errno: i32) -> std::io::Error {
        std::io::Error::from_raw_os_error(errno)
    }

    #[test]
    fn errno_maps_to_core_error() {
        let busy = LinuxError::OpenFailed {
            path: "/dev/spidev0.0".into(),
            source: io(libc::EBUSY),
        };
        assert_eq!(CoreError::from(busy), CoreError::ResourceBusy);

        let inval = LinuxError::Ioctl {
            request: "SPI_IOC_WR_BITS_PER_WORD",
            source: io(libc::EINVAL),
        };
        assert_eq!(CoreError::from(inval), CoreError::UnsupportedMode);

        let missing = LinuxError::OpenFailed {
            path: "/dev/i2c-9".into(),
            source: io(libc::ENOENT),
        };
        assert_eq!(CoreError::from(missing), CoreError::InvalidResource);

        let other = LinuxError::Attribute {
            path: "/sys/class/pwm/pwmchip0/export".into(),
            source: io(libc::EIO),
        };
        assert_eq!(CoreError::from(other), CoreError::IoFailure);
    }

    #[test]
    fn parse_errors_are_io_failures() {
        let e = LinuxError::Parse {
            path: "/sys/bus/iio/devices/iio:device0/in_voltage0_raw".into(),
            contents: "nan".into(),
        };
        assert_eq!(CoreError::from(e), CoreError::IoFailure);
    }
}
