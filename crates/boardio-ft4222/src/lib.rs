//! boardio-ft4222 - FT4222H USB bridge as a sub-platform
//!
//! The FTDI FT4222H is a USB 2.0 to SPI/I2C bridge. Strapped into mode 3
//! it also exposes four GPIO ports on a separate USB interface. This crate
//! drives those ports with raw vendor requests (no LibFT4222) and plugs
//! them into boardio as a [`SubplatformAdapter`], so they appear as the
//! logical pins after the board's own.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use boardio_ft4222::Ft4222Gpio;
//! # fn attach(ctx: &boardio_core::PlatformContext) -> Result<(), Box<dyn std::error::Error>> {
//! ctx.attach_subplatform(Arc::new(Ft4222Gpio::open()?))?;
//! # Ok(())
//! # }
//! ```
//!
//! Or let detection find it by passing [`Ft4222Probe`] to the context.
//!
//! # Status
//!
//! FTDI does not document the GPIO vendor requests. The reset, info and
//! suspend/wake-up requests follow what the chip answers to, but the GPIO
//! direction, write and read codes in [`protocol`] are unverified and may
//! not drive the ports on real hardware. For that reason `boardio-hal` and
//! the `boardio` binary only build this crate with the non-default
//! `ft4222` feature.
//!
//! [`SubplatformAdapter`]: boardio_core::subplatform::SubplatformAdapter

mod device;
mod error;
pub mod protocol;
mod probe;

pub use device::Ft4222Gpio;
pub use error::{Ft4222Error, Result};
pub use probe::Ft4222Probe;
