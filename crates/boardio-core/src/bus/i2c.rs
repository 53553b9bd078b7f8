//! I2C controller

use std::sync::PoisonError;

use crate::backend::I2cDevice;
use crate::board::Capability;
use crate::error::{Error, Result};
use crate::registry::{BusKey, BusLock, PlatformContext, ResourceClaim};

/// Highest 7-bit device address
pub const MAX_ADDRESS: u16 = 0x7F;

/// Bus clock selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum I2cSpeed {
    /// 100 kHz
    #[default]
    Standard,
    /// 400 kHz
    Fast,
    /// 3.4 MHz
    High,
}

impl I2cSpeed {
    /// Clock frequency in Hz
    pub fn hz(self) -> u32 {
        match self {
            I2cSpeed::Standard => 100_000,
            I2cSpeed::Fast => 400_000,
            I2cSpeed::High => 3_400_000,
        }
    }
}

/// An open I2C bus
///
/// The target address belongs to the handle: two handles on the same bus
/// can talk to different devices, and their transactions never interleave.
pub struct I2c {
    bus: u32,
    device: Box<dyn I2cDevice>,
    address: Option<u16>,
    speed: I2cSpeed,
    lock: BusLock,
    _pins: Option<ResourceClaim>,
}

impl I2c {
    /// Open the board's I2C bus number `index`
    ///
    /// Indices past the board's buses open the buses of an attached
    /// sub-platform.
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let platform = ctx.resolve_platform()?;
        let Some(def) = platform.i2c.get(index) else {
            return Self::open_subplatform(ctx, index);
        };
        let key = BusKey::I2c(def.bus);
        let pins: Vec<usize> = def.sda.into_iter().chain(def.scl).collect();
        let claim = super::route_pins(ctx, &key, &pins, Capability::I2c)?;
        let device = ctx.backend().open_i2c(def.bus)?;
        log::debug!("i2c: opened bus {}", def.bus);
        Ok(Self::new(def.bus, device, ctx.bus_lock(key), Some(claim)))
    }

    /// Open a kernel I2C bus directly, bypassing the board table
    pub fn open_raw(ctx: &PlatformContext, bus: u32) -> Result<Self> {
        let device = ctx.backend().open_i2c(bus)?;
        log::debug!("i2c: opened bus {} (raw)", bus);
        Ok(Self::new(bus, device, ctx.bus_lock(BusKey::I2c(bus)), None))
    }

    fn open_subplatform(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let (adapter, bus) = ctx.subplatform_i2c(index)?;
        let device = adapter.open_i2c(bus)?;
        log::debug!("i2c: index {} opened as {} bus {}", index, adapter.name(), bus);
        let key = BusKey::SubplatformI2c(adapter.name().to_string(), bus);
        Ok(Self::new(bus, device, ctx.bus_lock(key), None))
    }

    fn new(bus: u32, device: Box<dyn I2cDevice>, lock: BusLock, pins: Option<ResourceClaim>) -> Self {
        Self {
            bus,
            device,
            address: None,
            speed: I2cSpeed::default(),
            lock,
            _pins: pins,
        }
    }

    /// Bus number (adapter-local for sub-platform buses)
    pub fn bus(&self) -> u32 {
        self.bus
    }

    /// Select the target device for subsequent transfers
    pub fn set_address(&mut self, address: u16) -> Result<()> {
        if address > MAX_ADDRESS {
            return Err(Error::OutOfRange);
        }
        self.address = Some(address);
        Ok(())
    }

    /// Current target device
    pub fn address(&self) -> Option<u16> {
        self.address
    }

    /// Record the requested bus speed
    ///
    /// Kernel I2C adapters fix their clock in the device tree, so this only
    /// records the request.
    pub fn frequency(&mut self, speed: I2cSpeed) -> Result<()> {
        log::debug!("i2c: bus {} speed {} Hz requested", self.bus, speed.hz());
        self.speed = speed;
        Ok(())
    }

    /// Requested bus speed
    pub fn speed(&self) -> I2cSpeed {
        self.speed
    }

    fn target(&self) -> Result<u16> {
        self.address.ok_or(Error::NotConfigured)
    }

    /// Write bytes to the target
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        let address = self.target()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        log::trace!("i2c: {}@{:#04x} write {:02x?}", self.bus, address, data);
        self.device.write(address, data)
    }

    /// Read bytes from the target, returning the count read
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let address = self.target()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let n = self.device.read(address, buf)?;
        log::trace!("i2c: {}@{:#04x} read {:02x?}", self.bus, address, &buf[..n]);
        Ok(n)
    }

    /// Read one byte
    pub fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf)? {
            1 => Ok(buf[0]),
            _ => Err(Error::IoFailure),
        }
    }

    /// Write one byte
    pub fn write_byte(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    fn write_read(&mut self, write: &[u8], read: &mut [u8]) -> Result<()> {
        let address = self.target()?;
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.device.write_read(address, write, read)?;
        log::trace!(
            "i2c: {}@{:#04x} {:02x?} -> {:02x?}",
            self.bus,
            address,
            write,
            read
        );
        Ok(())
    }

    /// Read an 8-bit register
    pub fn read_register(&mut self, register: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.write_read(&[register], &mut buf)?;
        Ok(buf[0])
    }

    /// Write an 8-bit register
    pub fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.write(&[register, value])
    }

    /// Read a 16-bit register (little-endian, as SMBus words are)
    pub fn read_word_register(&mut self, register: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.write_read(&[register], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    /// Write a 16-bit register (little-endian)
    pub fn write_word_register(&mut self, register: u8, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.write(&[register, lo, hi])
    }

    /// Read consecutive registers starting at `register`
    pub fn read_bytes_register(&mut self, register: u8, buf: &mut [u8]) -> Result<usize> {
        self.write_read(&[register], buf)?;
        Ok(buf.len())
    }
}

impl core::fmt::Debug for I2c {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("I2c")
            .field("bus", &self.bus)
            .field("address", &self.address)
            .field("speed", &self.speed)
            .finish()
    }
}
