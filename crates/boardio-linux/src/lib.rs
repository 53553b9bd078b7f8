//! boardio-linux - Linux kernel backend
//!
//! Implements [`boardio_core::backend::Backend`] on top of the kernel's
//! user-space interfaces:
//!
//! | Resource | Interface |
//! |----------|-----------|
//! | GPIO lines, edges, mux lines | `/dev/gpiochipN` (GPIO character device) |
//! | SPI | `/dev/spidevB.C` |
//! | I2C | `/dev/i2c-N` |
//! | UART | TTY device named by the board table |
//! | PWM | `/sys/class/pwm/pwmchipN` |
//! | Analog input | `/sys/bus/iio/devices/iio:deviceN` |
//! | Register fast path | device named by the board table (`/dev/gpiomem`, `/dev/mem`) |
//!
//! Platform markers come from DMI, the device tree and the kernel command
//! line.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use boardio_core::board::BoardDatabase;
//! use boardio_core::{PlatformConfig, PlatformContext};
//! use boardio_linux::LinuxBackend;
//!
//! let ctx = PlatformContext::new(
//!     Arc::new(LinuxBackend::new()),
//!     BoardDatabase::with_builtin()?,
//!     PlatformConfig::new(),
//!     Vec::new(),
//! );
//! println!("{}", ctx.platform_name()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # System Requirements
//!
//! - GPIO character device support (`CONFIG_GPIO_CDEV`)
//! - Read/write access to the device nodes (usually the `gpio`, `spi`,
//!   `i2c` and `dialout` groups)

mod aio;
mod error;
mod gpio;
mod i2c;
mod markers;
mod mmap;
mod pwm;
mod spi;
mod sysfs;
mod uart;

pub use aio::LinuxAio;
pub use error::{LinuxError, Result};
pub use gpio::LinuxLine;
pub use i2c::LinuxI2c;
pub use mmap::LinuxRegisters;
pub use pwm::LinuxPwm;
pub use spi::LinuxSpi;
pub use uart::LinuxUart;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use boardio_core::backend::{
    AioChannel, Backend, I2cDevice, LineHandle, PwmChannel, RegisterBlock, SpiDevice, UartPort,
};
use boardio_core::board::{AioRef, GpioLine, MmapChip, PlatformMarkers, PwmRef};
use boardio_core::bus::uart::DEFAULT_BAUD_RATE;
use boardio_core::gpio::CONSUMER;
use boardio_core::Result as CoreResult;
use gpiocdev::line::Value;
use gpiocdev::request::Request;

/// Backend over the Linux kernel interfaces
#[derive(Default)]
pub struct LinuxBackend {
    retained: gpio::RetainedLines,
    /// Mux control lines, held for the rest of the process once driven
    mux: Mutex<HashMap<GpioLine, Request>>,
}

impl LinuxBackend {
    /// Create a backend
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for LinuxBackend {
    fn name(&self) -> &str {
        "linux"
    }

    fn markers(&self) -> PlatformMarkers {
        markers::read(&markers::MarkerSources::default())
    }

    fn request_line(&self, line: GpioLine, consumer: &str) -> CoreResult<Box<dyn LineHandle>> {
        let handle = LinuxLine::open(line, consumer, &self.retained)?;
        log::debug!("gpio: requested {}", line);
        Ok(Box::new(handle))
    }

    fn write_mux(&self, line: GpioLine, level: bool) -> CoreResult<()> {
        let mut mux = self.mux.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(request) = mux.get(&line) {
            let value = if level { Value::Active } else { Value::Inactive };
            request
                .set_value(line.line, value)
                .map_err(|source| LinuxError::Gpio {
                    chip: line.chip,
                    line: line.line,
                    source,
                })?;
        } else {
            let request = gpio::request_output(line, CONSUMER, level)?;
            mux.insert(line, request);
        }
        log::trace!("mux: {} <- {}", line, u8::from(level));
        Ok(())
    }

    fn map_registers(&self, chip: &MmapChip) -> CoreResult<Box<dyn RegisterBlock>> {
        Ok(Box::new(LinuxRegisters::map(chip)?))
    }

    fn open_i2c(&self, bus: u32) -> CoreResult<Box<dyn I2cDevice>> {
        Ok(Box::new(LinuxI2c::open(bus)?))
    }

    fn open_spi(&self, bus: u32, cs: u32) -> CoreResult<Box<dyn SpiDevice>> {
        Ok(Box::new(LinuxSpi::open(bus, cs)?))
    }

    fn open_uart(&self, device: &str) -> CoreResult<Box<dyn UartPort>> {
        Ok(Box::new(LinuxUart::open(device, DEFAULT_BAUD_RATE)?))
    }

    fn open_pwm(&self, pwm: PwmRef) -> CoreResult<Box<dyn PwmChannel>> {
        Ok(Box::new(LinuxPwm::open(pwm)?))
    }

    fn open_aio(&self, aio: AioRef) -> CoreResult<Box<dyn AioChannel>> {
        Ok(Box::new(LinuxAio::open(aio)?))
    }
}
