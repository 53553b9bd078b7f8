//! I2C through i2c-dev (`/dev/i2c-N`)
//!
//! Every transaction goes out as one I2C_RDWR ioctl, so a write followed by
//! a read is sent with a repeated start and no other master can slip in
//! between.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;

use boardio_core::backend::I2cDevice;
use boardio_core::Result as CoreResult;

use crate::error::{LinuxError, Result};

const I2C_M_RD: u16 = 0x0001;

mod ioctl {
    use nix::ioctl_write_ptr_bad;

    const I2C_RDWR: u16 = 0x0707;

    ioctl_write_ptr_bad!(i2c_rdwr, I2C_RDWR, super::I2cRdwrData);
}

/// Kernel `struct i2c_msg`
#[repr(C)]
struct I2cMsg {
    addr: u16,
    flags: u16,
    len: u16,
    buf: *mut u8,
}

/// Kernel `struct i2c_rdwr_ioctl_data`
#[repr(C)]
pub struct I2cRdwrData {
    msgs: *mut I2cMsg,
    nmsgs: u32,
}

impl I2cMsg {
    fn write(addr: u16, data: &[u8]) -> Self {
        Self {
            addr,
            flags: 0,
            len: data.len() as u16,
            // The kernel only reads from write buffers
            buf: data.as_ptr() as *mut u8,
        }
    }

    fn read(addr: u16, buf: &mut [u8]) -> Self {
        Self {
            addr,
            flags: I2C_M_RD,
            len: buf.len() as u16,
            buf: buf.as_mut_ptr(),
        }
    }
}

/// Device node of an I2C adapter
pub(crate) fn device_path(bus: u32) -> String {
    format!("/dev/i2c-{}", bus)
}

/// An open i2c-dev adapter
pub struct LinuxI2c {
    bus: u32,
    file: File,
}

impl LinuxI2c {
    /// Open adapter `bus`
    pub fn open(bus: u32) -> Result<Self> {
        let path = device_path(bus);
        log::debug!("i2c: opening {}", path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| LinuxError::OpenFailed {
                path: path.into(),
                source,
            })?;
        Ok(Self { bus, file })
    }

    fn rdwr(&mut self, msgs: &mut [I2cMsg]) -> Result<()> {
        let data = I2cRdwrData {
            msgs: msgs.as_mut_ptr(),
            nmsgs: msgs.len() as u32,
        };
        unsafe { ioctl::i2c_rdwr(self.file.as_raw_fd(), &data) }
            .map_err(|e| LinuxError::ioctl("I2C_RDWR", e))?;
        Ok(())
    }
}

impl I2cDevice for LinuxI2c {
    fn write(&mut self, address: u16, data: &[u8]) -> CoreResult<()> {
        log::trace!("i2c: bus {} write {:#04x} {:02x?}", self.bus, address, data);
        self.rdwr(&mut [I2cMsg::write(address, data)])?;
        Ok(())
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> CoreResult<usize> {
        self.rdwr(&mut [I2cMsg::read(address, buf)])?;
        log::trace!("i2c: bus {} read {:#04x} {:02x?}", self.bus, address, buf);
        Ok(buf.len())
    }

    fn write_read(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> CoreResult<()> {
        self.rdwr(&mut [I2cMsg::write(address, write), I2cMsg::read(address, read)])?;
        log::trace!(
            "i2c: bus {} {:#04x} {:02x?} -> {:02x?}",
            self.bus,
            address,
            write,
            read
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_paths() {
        assert_eq!(device_path(0), "/dev/i2c-0");
        assert_eq!(device_path(7), "/dev/i2c-7");
    }

    #[test]
    fn read_messages_carry_the_read_flag() {
        let mut buf = [0u8; 4];
        let msg = I2cMsg::read(0x50, &mut buf);
        assert_eq!(msg.flags, I2C_M_RD);
        assert_eq!(msg.len, 4);
        let msg = I2cMsg::write(0x50, &[0x10]);
        assert_eq!(msg.flags, 0);
        assert_eq!(msg.len, 1);
    }

    #[test]
    #[ignore] // Requires /dev/i2c-1 with an EEPROM at 0x50
    fn read_eeprom() {
        let mut i2c = LinuxI2c::open(1).unwrap();
        let mut buf = [0u8; 8];
        i2c.write_read(0x50, &[0x00], &mut buf).unwrap();
    }
}
