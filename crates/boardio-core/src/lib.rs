//! boardio-core - Pin resolution and IO controllers for single-board computers
//!
//! This crate maps logical pin and bus numbers to the kernel resources of
//! the board it runs on, and hands out owned capability handles for them:
//! GPIO lines (with a memory-mapped fast path and edge interrupts), I2C,
//! SPI, UART, PWM and analog inputs. Secondary IO adapters attached at run
//! time extend the logical pin space past the board's own pins.
//!
//! Everything kernel-facing sits behind the [`backend::Backend`] trait. The
//! `boardio-linux` crate implements it for Linux; the [`mock`] module
//! implements it in memory.
//!
//! # Features
//!
//! - `mock` - In-memory backend and simulated sub-platform adapter
//!
//! # Example
//!
//! ```ignore
//! use boardio_core::{gpio::{Direction, Gpio}, PlatformContext};
//!
//! fn blink(ctx: &PlatformContext) -> boardio_core::Result<()> {
//!     println!("Running on {}", ctx.platform_name()?);
//!     let mut led = Gpio::open(ctx, 13)?;
//!     led.set_direction(Direction::Out)?;
//!     for _ in 0..10 {
//!         led.write(true)?;
//!         std::thread::sleep(std::time::Duration::from_millis(200));
//!         led.write(false)?;
//!         std::thread::sleep(std::time::Duration::from_millis(200));
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod backend;
pub mod board;
pub mod bus;
pub mod error;
pub mod gpio;
pub mod interrupt;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod mux;
pub mod registry;
pub mod subplatform;

pub use board::{Capability, PlatformType};
pub use bus::{Aio, I2c, Pwm, Spi, Uart};
pub use error::{Error, Result, ResultCode};
pub use gpio::{Direction, Edge, Gpio, GpioGroup};
pub use registry::{PlatformConfig, PlatformContext};
