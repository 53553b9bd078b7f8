//! SPI through spidev (`/dev/spidevB.C`)

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use boardio_core::backend::SpiDevice;
use boardio_core::bus::SpiMode;
use boardio_core::Result as CoreResult;

use crate::error::{LinuxError, Result};

const SPI_CPHA: u8 = 0x01;
const SPI_CPOL: u8 = 0x02;

/// spidev ioctls
mod ioctl {
    use nix::ioctl_write_ptr;

    const SPI_IOC_MAGIC: u8 = b'k';

    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_LSB_FIRST: u8 = 2;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_lsb_first,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_LSB_FIRST,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of `struct spi_ioc_transfer`
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// SPI_IOC_MESSAGE(n) = _IOW('k', 0, char[n * sizeof(struct spi_ioc_transfer)])
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// Kernel `struct spi_ioc_transfer`
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    _pad: u8,
}

/// Mode byte for SPI_IOC_WR_MODE
fn mode_bits(mode: SpiMode) -> u8 {
    let mut bits = 0;
    if mode.cpha() {
        bits |= SPI_CPHA;
    }
    if mode.cpol() {
        bits |= SPI_CPOL;
    }
    bits
}

/// Device node of a spidev chip select
pub(crate) fn device_path(bus: u32, cs: u32) -> String {
    format!("/dev/spidev{}.{}", bus, cs)
}

/// An open spidev device
pub struct LinuxSpi {
    path: String,
    file: File,
}

impl LinuxSpi {
    /// Open the spidev node for `bus` and chip select `cs`
    pub fn open(bus: u32, cs: u32) -> Result<Self> {
        let path = device_path(bus, cs);
        log::debug!("spi: opening {}", path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| LinuxError::OpenFailed {
                path: path.clone().into(),
                source,
            })?;
        Ok(Self { path, file })
    }

    fn message(&mut self, transfer: &SpiIocTransfer) -> Result<()> {
        let ret = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                ioctl::spi_ioc_message(1),
                transfer as *const SpiIocTransfer,
            )
        };
        if ret < 0 {
            return Err(LinuxError::Ioctl {
                request: "SPI_IOC_MESSAGE",
                source: std::io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl SpiDevice for LinuxSpi {
    fn set_mode(&mut self, mode: SpiMode) -> CoreResult<()> {
        let bits = mode_bits(mode);
        unsafe { ioctl::spi_ioc_wr_mode(self.file.as_raw_fd(), &bits) }
            .map_err(|e| LinuxError::ioctl("SPI_IOC_WR_MODE", e))?;
        log::debug!("spi: {} mode {:?}", self.path, mode);
        Ok(())
    }

    fn set_lsb_first(&mut self, lsb_first: bool) -> CoreResult<()> {
        let value = u8::from(lsb_first);
        unsafe { ioctl::spi_ioc_wr_lsb_first(self.file.as_raw_fd(), &value) }
            .map_err(|e| LinuxError::ioctl("SPI_IOC_WR_LSB_FIRST", e))?;
        Ok(())
    }

    fn set_bits_per_word(&mut self, bits: u8) -> CoreResult<()> {
        unsafe { ioctl::spi_ioc_wr_bits_per_word(self.file.as_raw_fd(), &bits) }
            .map_err(|e| LinuxError::ioctl("SPI_IOC_WR_BITS_PER_WORD", e))?;
        Ok(())
    }

    fn set_speed_hz(&mut self, hz: u32) -> CoreResult<()> {
        unsafe { ioctl::spi_ioc_wr_max_speed_hz(self.file.as_raw_fd(), &hz) }
            .map_err(|e| LinuxError::ioctl("SPI_IOC_WR_MAX_SPEED_HZ", e))?;
        log::debug!("spi: {} speed {} Hz", self.path, hz);
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8], speed_hz: u32, bits: u8) -> CoreResult<()> {
        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: tx.len() as u32,
            speed_hz,
            bits_per_word: bits,
            ..Default::default()
        };
        log::trace!("spi: {} transfer {} bytes", self.path, tx.len());
        self.message(&transfer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_struct_matches_kernel_layout() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
    }

    #[test]
    fn message_ioctl_number() {
        // _IOW('k', 0, char[32])
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
        assert_eq!(ioctl::spi_ioc_message(2), 0x4040_6b00);
    }

    #[test]
    fn mode_byte() {
        assert_eq!(mode_bits(SpiMode::Mode0), 0);
        assert_eq!(mode_bits(SpiMode::Mode1), SPI_CPHA);
        assert_eq!(mode_bits(SpiMode::Mode2), SPI_CPOL);
        assert_eq!(mode_bits(SpiMode::Mode3), SPI_CPOL | SPI_CPHA);
    }

    #[test]
    fn spidev_paths() {
        assert_eq!(device_path(1, 0), "/dev/spidev1.0");
    }
}
