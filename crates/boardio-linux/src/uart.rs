//! Serial ports through the `serialport` crate

use std::io::{Read, Write};
use std::time::Duration;

use boardio_core::backend::UartPort;
use boardio_core::bus::{FlowControl, Parity, UartMode};
use boardio_core::{Error as CoreError, Result as CoreResult};

use crate::error::{LinuxError, Result};

const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// An open TTY
pub struct LinuxUart {
    path: String,
    port: Box<dyn serialport::SerialPort>,
}

impl LinuxUart {
    /// Open the TTY at `path` at the given baud rate
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        log::debug!("uart: opening {} at {} baud", path, baud);
        let port = serialport::new(path, baud)
            .timeout(OPEN_TIMEOUT)
            .open()
            .map_err(|source| LinuxError::Serial {
                path: path.to_string(),
                source,
            })?;
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    fn serial(&self, source: serialport::Error) -> LinuxError {
        LinuxError::Serial {
            path: self.path.clone(),
            source,
        }
    }

    fn io(&self, source: std::io::Error) -> LinuxError {
        LinuxError::Serial {
            path: self.path.clone(),
            source: source.into(),
        }
    }
}

fn data_bits(bits: u8) -> CoreResult<serialport::DataBits> {
    Ok(match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        8 => serialport::DataBits::Eight,
        _ => return Err(CoreError::InvalidParameter),
    })
}

fn stop_bits(bits: u8) -> CoreResult<serialport::StopBits> {
    Ok(match bits {
        1 => serialport::StopBits::One,
        2 => serialport::StopBits::Two,
        _ => return Err(CoreError::InvalidParameter),
    })
}

fn parity(parity: Parity) -> CoreResult<serialport::Parity> {
    Ok(match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
        // termios has no portable way to ask for these
        Parity::Mark | Parity::Space => return Err(CoreError::UnsupportedMode),
    })
}

impl UartPort for LinuxUart {
    fn set_baud_rate(&mut self, baud: u32) -> CoreResult<()> {
        self.port
            .set_baud_rate(baud)
            .map_err(|e| self.serial(e))?;
        log::debug!("uart: {} baud {}", self.path, baud);
        Ok(())
    }

    fn set_mode(&mut self, mode: UartMode) -> CoreResult<()> {
        let data = data_bits(mode.data_bits)?;
        let parity = parity(mode.parity)?;
        let stop = stop_bits(mode.stop_bits)?;
        self.port.set_data_bits(data).map_err(|e| self.serial(e))?;
        self.port.set_parity(parity).map_err(|e| self.serial(e))?;
        self.port.set_stop_bits(stop).map_err(|e| self.serial(e))?;
        Ok(())
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> CoreResult<()> {
        let flow = match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        };
        self.port
            .set_flow_control(flow)
            .map_err(|e| self.serial(e))?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> CoreResult<()> {
        self.port.set_timeout(timeout).map_err(|e| self.serial(e))?;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> CoreResult<usize> {
        let n = self.port.write(data).map_err(|e| self.io(e))?;
        log::trace!("uart: {} wrote {} bytes", self.path, n);
        Ok(n)
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<usize> {
        match self.port.read(buf) {
            Ok(n) => {
                log::trace!("uart: {} read {} bytes", self.path, n);
                Ok(n)
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(self.io(e).into()),
        }
    }

    fn bytes_available(&self) -> CoreResult<usize> {
        let n = self.port.bytes_to_read().map_err(|e| self.serial(e))?;
        Ok(n as usize)
    }

    fn flush(&mut self) -> CoreResult<()> {
        self.port.flush().map_err(|e| self.io(e))?;
        Ok(())
    }
}
