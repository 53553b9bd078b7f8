//! Backend traits
//!
//! The core never touches device nodes itself. Everything kernel-facing goes
//! through a [`Backend`], which hands out per-resource objects (line handles,
//! bus devices, register blocks). `boardio-linux` implements these against
//! the real kernel interfaces; [`crate::mock`] implements them in memory.

use std::time::Duration;

use crate::board::{AioRef, GpioLine, MmapChip, PlatformMarkers, PwmRef};
use crate::bus::spi::SpiMode;
use crate::bus::uart::{FlowControl, UartMode};
use crate::error::{Error, Result};
use crate::gpio::{Direction, Edge, EdgeEvent, Mode, OutputDrive};

/// Source of kernel resources for one platform
pub trait Backend: Send + Sync {
    /// Short backend name for logging
    fn name(&self) -> &str;

    /// Read the identifying markers of the running system
    fn markers(&self) -> PlatformMarkers;

    /// Request a GPIO line, leaving its configuration as-is
    fn request_line(&self, line: GpioLine, consumer: &str) -> Result<Box<dyn LineHandle>>;

    /// Drive a mux control line to a level
    ///
    /// This is the lowest-level GPIO primitive. The backend keeps the line
    /// driven after the call returns.
    fn write_mux(&self, line: GpioLine, level: bool) -> Result<()>;

    /// Map the register page of a GPIO controller
    fn map_registers(&self, chip: &MmapChip) -> Result<Box<dyn RegisterBlock>> {
        let _ = chip;
        Err(Error::UnsupportedMode)
    }

    /// Open an I2C bus
    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cDevice>> {
        let _ = bus;
        Err(Error::UnsupportedMode)
    }

    /// Open an SPI device (bus and chip select)
    fn open_spi(&self, bus: u32, cs: u32) -> Result<Box<dyn SpiDevice>> {
        let _ = (bus, cs);
        Err(Error::UnsupportedMode)
    }

    /// Open a serial port by device path
    fn open_uart(&self, device: &str) -> Result<Box<dyn UartPort>> {
        let _ = device;
        Err(Error::UnsupportedMode)
    }

    /// Open a PWM channel
    fn open_pwm(&self, pwm: PwmRef) -> Result<Box<dyn PwmChannel>> {
        let _ = pwm;
        Err(Error::UnsupportedMode)
    }

    /// Open an analog input channel
    fn open_aio(&self, aio: AioRef) -> Result<Box<dyn AioChannel>> {
        let _ = aio;
        Err(Error::UnsupportedMode)
    }
}

/// An open GPIO line
pub trait LineHandle: Send {
    /// Configure the line direction
    fn set_direction(&mut self, direction: Direction) -> Result<()>;

    /// Read the line level
    fn read(&self) -> Result<bool>;

    /// Drive the line level (output lines only)
    fn write(&mut self, value: bool) -> Result<()>;

    /// Select the pull resistor or high impedance state
    fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let _ = mode;
        Err(Error::UnsupportedMode)
    }

    /// Invert the logical level of the line
    ///
    /// Reads, writes, initial output levels and reported edges are all
    /// logical once this is set.
    fn set_active_low(&mut self, active_low: bool) -> Result<()> {
        let _ = active_low;
        Err(Error::UnsupportedMode)
    }

    /// Select how an output drives the line
    fn set_drive(&mut self, drive: OutputDrive) -> Result<()> {
        let _ = drive;
        Err(Error::UnsupportedMode)
    }

    /// Switch the line to input with edge detection and return a source of
    /// edge events for it
    ///
    /// The returned source must stay usable while the handle keeps
    /// servicing reads. Edge detection survives a later switch to input;
    /// switching to output turns it off.
    fn watch_edges(&mut self, edge: Edge) -> Result<Box<dyn EdgeSource>>;

    /// Turn edge detection off again
    fn unwatch_edges(&mut self) -> Result<()>;

    /// Give the line back
    ///
    /// With `keep` set the kernel request stays alive for the rest of the
    /// process so the line keeps its direction and level. The next request
    /// for the same line is handed the kept one.
    fn release(self: Box<Self>, keep: bool);
}

/// Blocking source of edge events for one line
pub trait EdgeSource: Send {
    /// Wait up to `timeout` for the next event
    ///
    /// Returns `Ok(None)` when the timeout expires without an event.
    fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>>;
}

/// A mapped register page
///
/// Accesses are single 32-bit volatile loads and stores.
pub trait RegisterBlock: Send + Sync {
    /// Read the 32-bit register at `offset`
    fn read32(&self, offset: usize) -> u32;

    /// Write the 32-bit register at `offset`
    fn write32(&self, offset: usize, value: u32);
}

/// An open I2C bus
pub trait I2cDevice: Send {
    /// Write bytes to a device
    fn write(&mut self, address: u16, data: &[u8]) -> Result<()>;

    /// Read bytes from a device, returning the count read
    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<usize>;

    /// Write then read as one addressed sequence (repeated start)
    fn write_read(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<()>;
}

/// An open SPI device
pub trait SpiDevice: Send {
    /// Set the clock polarity and phase
    fn set_mode(&mut self, mode: SpiMode) -> Result<()>;

    /// Select bit order
    fn set_lsb_first(&mut self, lsb_first: bool) -> Result<()>;

    /// Set the word width; fails with `UnsupportedMode` if the controller
    /// refuses it
    fn set_bits_per_word(&mut self, bits: u8) -> Result<()>;

    /// Set the maximum clock
    fn set_speed_hz(&mut self, hz: u32) -> Result<()>;

    /// Full-duplex transfer; `tx` and `rx` have equal length
    fn transfer(&mut self, tx: &[u8], rx: &mut [u8], speed_hz: u32, bits: u8) -> Result<()>;
}

/// An open serial port
pub trait UartPort: Send {
    /// Set the baud rate
    fn set_baud_rate(&mut self, baud: u32) -> Result<()>;

    /// Set the character framing
    fn set_mode(&mut self, mode: UartMode) -> Result<()>;

    /// Set flow control
    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()>;

    /// Set the read/write timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Write bytes, returning the count written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read bytes, returning the count read (0 on timeout)
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Number of bytes waiting to be read
    fn bytes_available(&self) -> Result<usize>;

    /// Wait until queued output has been sent
    fn flush(&mut self) -> Result<()>;
}

/// An open PWM channel
pub trait PwmChannel: Send {
    /// Set the period
    fn set_period_ns(&mut self, ns: u64) -> Result<()>;

    /// Current period
    fn period_ns(&self) -> Result<u64>;

    /// Set the active time per period
    fn set_duty_ns(&mut self, ns: u64) -> Result<()>;

    /// Current active time per period
    fn duty_ns(&self) -> Result<u64>;

    /// Enable or disable output
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    /// Whether output is enabled
    fn is_enabled(&self) -> Result<bool>;
}

/// An open analog input channel
pub trait AioChannel: Send {
    /// Read one raw sample at the converter's native resolution
    fn read_raw(&mut self) -> Result<u32>;
}
