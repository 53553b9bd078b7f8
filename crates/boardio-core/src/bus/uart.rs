//! UART controller

use std::sync::PoisonError;
use std::time::{Duration, Instant};

use crate::backend::UartPort;
use crate::board::Capability;
use crate::error::{Error, Result};
use crate::registry::{BusKey, BusLock, PlatformContext, Resource, ResourceClaim};

/// Baud rate programmed when a port is opened
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

// Stand-in for "no timeout"; poll(2) takes an i32 millisecond count.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Parity bit handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
    /// Parity bit always 1
    Mark,
    /// Parity bit always 0
    Space,
}

/// Character framing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UartMode {
    /// Data bits per character (5 to 8)
    pub data_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
}

impl Default for UartMode {
    fn default() -> Self {
        Self {
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
        }
    }
}

impl UartMode {
    /// Check the framing for values no UART accepts
    pub fn validate(&self) -> Result<()> {
        if !(5..=8).contains(&self.data_bits) || !(1..=2).contains(&self.stop_bits) {
            return Err(Error::InvalidParameter);
        }
        Ok(())
    }
}

/// Flow control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FlowControl {
    /// None
    #[default]
    None,
    /// RTS/CTS
    Hardware,
    /// XON/XOFF
    Software,
}

impl FlowControl {
    /// Build from the two classic flags; asking for both is unsupported
    pub fn from_flags(rtscts: bool, xonxoff: bool) -> Result<Self> {
        match (rtscts, xonxoff) {
            (false, false) => Ok(FlowControl::None),
            (true, false) => Ok(FlowControl::Hardware),
            (false, true) => Ok(FlowControl::Software),
            (true, true) => Err(Error::UnsupportedMode),
        }
    }
}

/// An open serial port
pub struct Uart {
    path: String,
    port: Box<dyn UartPort>,
    baud: u32,
    mode: UartMode,
    flow: FlowControl,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    lock: BusLock,
    _claim: ResourceClaim,
    _pins: Option<ResourceClaim>,
}

impl Uart {
    /// Open the board's UART number `index`
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let platform = ctx.resolve_platform()?;
        let def = platform.uart.get(index).ok_or(Error::InvalidResource)?;
        let pins: Vec<usize> = def.rx.into_iter().chain(def.tx).collect();
        let claim = ctx.claim(vec![Resource::Uart(def.device.clone())])?;
        let key = BusKey::Uart(def.device.clone());
        let routed = super::route_pins(ctx, &key, &pins, Capability::Uart)?;
        Self::open_port(ctx, &def.device, claim, Some(routed))
    }

    /// Open a TTY by path, bypassing the board table
    pub fn open_device(ctx: &PlatformContext, path: &str) -> Result<Self> {
        let claim = ctx.claim(vec![Resource::Uart(path.to_string())])?;
        Self::open_port(ctx, path, claim, None)
    }

    fn open_port(
        ctx: &PlatformContext,
        path: &str,
        claim: ResourceClaim,
        pins: Option<ResourceClaim>,
    ) -> Result<Self> {
        let mut port = ctx.backend().open_uart(path)?;
        let mode = UartMode::default();
        port.set_baud_rate(DEFAULT_BAUD_RATE)?;
        port.set_mode(mode)?;
        port.set_flow_control(FlowControl::None)?;
        log::debug!("uart: opened {}", path);
        Ok(Self {
            path: path.to_string(),
            port,
            baud: DEFAULT_BAUD_RATE,
            mode,
            flow: FlowControl::None,
            read_timeout: None,
            write_timeout: None,
            lock: ctx.bus_lock(BusKey::Uart(path.to_string())),
            _claim: claim,
            _pins: pins,
        })
    }

    /// TTY device path
    pub fn device_path(&self) -> &str {
        &self.path
    }

    /// Set the baud rate
    pub fn set_baud_rate(&mut self, baud: u32) -> Result<()> {
        if baud == 0 {
            return Err(Error::InvalidParameter);
        }
        self.port.set_baud_rate(baud)?;
        self.baud = baud;
        Ok(())
    }

    /// Current baud rate
    pub fn baud_rate(&self) -> u32 {
        self.baud
    }

    /// Set the character framing
    pub fn set_mode(&mut self, data_bits: u8, parity: Parity, stop_bits: u8) -> Result<()> {
        let mode = UartMode {
            data_bits,
            parity,
            stop_bits,
        };
        mode.validate()?;
        self.port.set_mode(mode)?;
        self.mode = mode;
        Ok(())
    }

    /// Current framing
    pub fn mode(&self) -> UartMode {
        self.mode
    }

    /// Select flow control from the RTS/CTS and XON/XOFF flags
    pub fn set_flow_control(&mut self, rtscts: bool, xonxoff: bool) -> Result<()> {
        let flow = FlowControl::from_flags(rtscts, xonxoff)?;
        self.port.set_flow_control(flow)?;
        self.flow = flow;
        Ok(())
    }

    /// Current flow control
    pub fn flow_control(&self) -> FlowControl {
        self.flow
    }

    /// Bound blocking reads and writes; `None` blocks until done
    pub fn set_timeout(&mut self, read: Option<Duration>, write: Option<Duration>) {
        self.read_timeout = read;
        self.write_timeout = write;
    }

    // Ports carry a single timeout, so the direction's value is applied
    // right before each transfer.
    fn apply_timeout(port: &mut dyn UartPort, timeout: Option<Duration>) -> Result<()> {
        port.set_timeout(timeout.unwrap_or(BLOCKING_TIMEOUT))
    }

    /// Write bytes, returning the count written
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Self::apply_timeout(self.port.as_mut(), self.write_timeout)?;
        let n = self.port.write(data)?;
        log::trace!("uart: {} wrote {} bytes", self.path, n);
        Ok(n)
    }

    /// Write a string
    pub fn write_str(&mut self, text: &str) -> Result<usize> {
        self.write(text.as_bytes())
    }

    /// Read bytes, returning the count read (0 when the timeout expires)
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Self::apply_timeout(self.port.as_mut(), self.read_timeout)?;
        let n = self.port.read(buf)?;
        log::trace!("uart: {} read {} bytes", self.path, n);
        Ok(n)
    }

    /// Wait up to `timeout` for received data
    pub fn data_available(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.port.bytes_available()? > 0 {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(2)));
        }
    }

    /// Wait until queued output has been sent
    pub fn flush(&mut self) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.port.flush()
    }
}

impl core::fmt::Debug for Uart {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Uart")
            .field("path", &self.path)
            .field("baud", &self.baud)
            .field("mode", &self.mode)
            .field("flow", &self.flow)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::Gpio;
    use crate::mock::MockBackend;

    #[test]
    fn loopback() {
        let ctx = MockBackend::new().context();
        let mut uart = Uart::open(&ctx, 0).unwrap();
        assert_eq!(uart.device_path(), "/dev/ttyMOCK0");
        assert!(!uart.data_available(Duration::from_millis(5)).unwrap());

        assert_eq!(uart.write_str("hello").unwrap(), 5);
        uart.flush().unwrap();
        assert!(uart.data_available(Duration::ZERO).unwrap());
        let mut buf = [0u8; 16];
        let n = uart.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
    }

    #[test]
    fn framing_validation() {
        let ctx = MockBackend::new().context();
        let mut uart = Uart::open(&ctx, 0).unwrap();
        uart.set_mode(7, Parity::Even, 2).unwrap();
        assert_eq!(uart.mode().data_bits, 7);
        assert_eq!(
            uart.set_mode(9, Parity::None, 1).unwrap_err(),
            Error::InvalidParameter
        );
        assert_eq!(
            uart.set_mode(8, Parity::None, 3).unwrap_err(),
            Error::InvalidParameter
        );
        assert_eq!(uart.mode().parity, Parity::Even);
    }

    #[test]
    fn flow_control_flags() {
        let ctx = MockBackend::new().context();
        let mut uart = Uart::open(&ctx, 0).unwrap();
        uart.set_flow_control(true, false).unwrap();
        assert_eq!(uart.flow_control(), FlowControl::Hardware);
        assert_eq!(
            uart.set_flow_control(true, true).unwrap_err(),
            Error::UnsupportedMode
        );
        assert_eq!(uart.set_baud_rate(0).unwrap_err(), Error::InvalidParameter);
        uart.set_baud_rate(9600).unwrap();
        assert_eq!(uart.baud_rate(), 9600);
    }

    #[test]
    fn port_is_exclusive() {
        let ctx = MockBackend::new().context();
        let first = Uart::open(&ctx, 0).unwrap();
        assert_eq!(
            Uart::open_device(&ctx, "/dev/ttyMOCK0").unwrap_err(),
            Error::ResourceBusy
        );
        drop(first);
        Uart::open_device(&ctx, "/dev/ttyMOCK0").unwrap();
    }

    #[test]
    fn open_port_holds_rx_and_tx() {
        let ctx = MockBackend::new().context();
        let uart = Uart::open(&ctx, 0).unwrap();
        assert_eq!(Gpio::open(&ctx, 0).unwrap_err(), Error::ResourceBusy);
        assert_eq!(Gpio::open(&ctx, 1).unwrap_err(), Error::ResourceBusy);
        drop(uart);
        Gpio::open(&ctx, 0).unwrap();
    }

    #[test]
    fn pin_held_as_gpio_blocks_port() {
        let ctx = MockBackend::new().context();
        let _tx = Gpio::open(&ctx, 1).unwrap();
        assert_eq!(Uart::open(&ctx, 0).unwrap_err(), Error::ResourceBusy);
        // The failed open gave the port back.
        Uart::open_device(&ctx, "/dev/ttyMOCK0").unwrap();
    }

    #[test]
    fn timed_out_read_returns_zero() {
        let ctx = MockBackend::new().context();
        let mut uart = Uart::open_device(&ctx, "/dev/ttyMOCK1").unwrap();
        uart.set_timeout(Some(Duration::from_millis(5)), None);
        let mut buf = [0u8; 4];
        assert_eq!(uart.read(&mut buf).unwrap(), 0);
    }
}
