//! Analog inputs through IIO (`/sys/bus/iio/devices`)

use std::path::{Path, PathBuf};

use boardio_core::backend::AioChannel;
use boardio_core::board::AioRef;
use boardio_core::Result as CoreResult;

use crate::error::{LinuxError, Result};
use crate::sysfs::read_number;

const IIO_DEVICES: &str = "/sys/bus/iio/devices";

/// One `in_voltageN_raw` channel
pub struct LinuxAio {
    path: PathBuf,
}

impl LinuxAio {
    /// Open channel `aio.channel` of IIO device `aio.device`
    pub fn open(aio: AioRef) -> Result<Self> {
        Self::open_in(Path::new(IIO_DEVICES), aio)
    }

    fn open_in(root: &Path, aio: AioRef) -> Result<Self> {
        let path = root
            .join(format!("iio:device{}", aio.device))
            .join(format!("in_voltage{}_raw", aio.channel));
        if !path.exists() {
            return Err(LinuxError::OpenFailed {
                path,
                source: std::io::Error::from_raw_os_error(libc::ENOENT),
            });
        }
        log::debug!("aio: opened {}", path.display());
        Ok(Self { path })
    }
}

impl AioChannel for LinuxAio {
    fn read_raw(&mut self) -> CoreResult<u32> {
        let value = read_number(&self.path)?;
        log::trace!("aio: {} = {}", self.path.display(), value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardio_core::Error as CoreError;

    #[test]
    fn reads_raw_samples() {
        let root = std::env::temp_dir().join(format!("boardio-iio-{}", std::process::id()));
        let dev = root.join("iio:device0");
        std::fs::create_dir_all(&dev).unwrap();
        std::fs::write(dev.join("in_voltage2_raw"), "3071\n").unwrap();

        let mut aio = LinuxAio::open_in(&root, AioRef { device: 0, channel: 2 }).unwrap();
        assert_eq!(aio.read_raw().unwrap(), 3071);

        let missing = LinuxAio::open_in(&root, AioRef { device: 0, channel: 5 });
        assert_eq!(
            CoreError::from(missing.err().unwrap()),
            CoreError::InvalidResource
        );
    }
}
