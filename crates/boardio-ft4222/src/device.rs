//! FT4222H GPIO adapter
//!
//! Opens the GPIO interface of an FT4222H and exposes its four ports as
//! sub-platform lines. Port state lives in one shared [`PortState`]; every
//! direction or level change rewrites the whole port register, so the state
//! lock is held across the USB request.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use boardio_core::backend::{EdgeSource, LineHandle};
use boardio_core::gpio::{Direction, Edge};
use boardio_core::subplatform::SubplatformAdapter;
use boardio_core::{Error as CoreError, PlatformType, Result as CoreResult};
use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient};
use nusb::{DeviceInfo, Interface, MaybeFuture};

use crate::error::{Ft4222Error, Result};
use crate::protocol::*;

const TIMEOUT: Duration = Duration::from_millis(CONTROL_TIMEOUT_MS);

struct Shared {
    interface: Interface,
    control_index: u16,
    state: Mutex<AdapterState>,
}

#[derive(Default)]
struct AdapterState {
    ports: PortState,
    requested: [bool; GPIO_PORTS as usize],
    retained: [bool; GPIO_PORTS as usize],
}

impl AdapterState {
    /// Hand out a port, taking back one a previous handle kept
    fn request(&mut self, port: usize) -> CoreResult<()> {
        if self.requested[port] && !self.retained[port] {
            return Err(CoreError::ResourceBusy);
        }
        if self.retained[port] {
            log::debug!("ft4222: port {} taken back with its state", port);
        }
        self.requested[port] = true;
        self.retained[port] = false;
        Ok(())
    }

    fn release(&mut self, port: usize, keep: bool) {
        self.retained[port] = keep;
        self.requested[port] = keep;
    }
}

/// An FT4222H with its GPIO interface claimed
pub struct Ft4222Gpio {
    name: String,
    shared: Arc<Shared>,
}

impl Ft4222Gpio {
    /// Open the first FT4222H on the bus
    pub fn open() -> Result<Self> {
        Self::open_nth(0)
    }

    /// Open the nth FT4222H (0-indexed)
    pub fn open_nth(index: usize) -> Result<Self> {
        let devices: Vec<DeviceInfo> = find_devices()?;
        let info = devices.get(index).ok_or(Ft4222Error::DeviceNotFound)?;
        Self::open_device(info)
    }

    fn open_device(info: &DeviceInfo) -> Result<Self> {
        log::info!(
            "ft4222: opening device at bus {} address {}",
            info.busnum(),
            info.device_address()
        );
        let device = info
            .open()
            .wait()
            .map_err(|e| Ft4222Error::OpenFailed(e.to_string()))?;
        let config = device
            .active_configuration()
            .map_err(|e| Ft4222Error::OpenFailed(format!("Failed to get config: {}", e)))?;
        let num_interfaces = config.num_interfaces();

        // The chip mode is reported through interface 0
        let first = device
            .claim_interface(0)
            .wait()
            .map_err(|e| Ft4222Error::ClaimFailed(e.to_string()))?;
        let mode = read_mode(&first)?;
        drop(first);

        let gpio_iface =
            gpio_interface(mode, num_interfaces).ok_or(Ft4222Error::NoGpioMode(mode))?;
        let interface = device
            .claim_interface(gpio_iface)
            .wait()
            .map_err(|e| Ft4222Error::ClaimFailed(e.to_string()))?;
        log::debug!(
            "ft4222: mode {}, GPIO on interface {} of {}",
            mode,
            gpio_iface,
            num_interfaces
        );

        let gpio = Self {
            name: "ft4222".to_string(),
            shared: Arc::new(Shared {
                interface,
                control_index: gpio_iface as u16,
                state: Mutex::new(AdapterState::default()),
            }),
        };
        gpio.init()?;
        Ok(gpio)
    }

    /// Release ports 2 and 3 from their alternate roles and make every
    /// port an input
    fn init(&self) -> Result<()> {
        self.shared.control_out(FT4222_RESET_REQUEST, FT4222_RESET_SIO)?;
        self.shared.config_request(FT4222_SET_SUSPEND_OUT, 0)?;
        self.shared.config_request(FT4222_SET_WAKEUP_INTERRUPT, 0)?;
        self.shared.config_request(FT4222_GPIO_SET_DIR, 0)?;
        log::info!("ft4222: {} GPIO ports ready", GPIO_PORTS);
        Ok(())
    }
}

fn find_devices() -> Result<Vec<DeviceInfo>> {
    Ok(nusb::list_devices()
        .wait()
        .map_err(|e| Ft4222Error::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == FTDI_VID && d.product_id() == FT4222H_PID)
        .collect())
}

/// Whether any FT4222H is attached
pub(crate) fn device_present() -> Result<bool> {
    Ok(!find_devices()?.is_empty())
}

fn read_mode(interface: &Interface) -> Result<u8> {
    let data = interface
        .control_in(
            ControlIn {
                control_type: ControlType::Vendor,
                recipient: Recipient::Device,
                request: FT4222_INFO_REQUEST,
                value: FT4222_GET_CONFIG,
                index: 0,
                length: 13,
            },
            TIMEOUT,
        )
        .wait()
        .map_err(|e| Ft4222Error::TransferFailed(format!("Failed to get config: {}", e)))?;
    data.first()
        .copied()
        .ok_or_else(|| Ft4222Error::InvalidResponse("Empty response for config".into()))
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn control_out(&self, request: u8, value: u16) -> Result<()> {
        self.interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: self.control_index,
                    data: &[],
                },
                TIMEOUT,
            )
            .wait()
            .map_err(|e| Ft4222Error::TransferFailed(format!("Control transfer failed: {}", e)))?;
        Ok(())
    }

    fn config_request(&self, cmd: u8, data: u8) -> Result<()> {
        self.control_out(FT4222_CONFIG_REQUEST, config_value(cmd, data))
    }

    fn write_ports(&self, ports: PortState) -> Result<()> {
        self.config_request(FT4222_GPIO_SET_DIR, ports.outputs)?;
        self.config_request(FT4222_GPIO_WRITE, ports.levels)?;
        log::trace!(
            "ft4222: dir {:04b} out {:04b}",
            ports.outputs,
            ports.levels
        );
        Ok(())
    }

    fn read_ports(&self) -> Result<u8> {
        let data = self
            .interface
            .control_in(
                ControlIn {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: FT4222_INFO_REQUEST,
                    value: FT4222_GET_GPIO,
                    index: self.control_index,
                    length: 1,
                },
                TIMEOUT,
            )
            .wait()
            .map_err(|e| Ft4222Error::TransferFailed(format!("GPIO read failed: {}", e)))?;
        data.first()
            .copied()
            .ok_or_else(|| Ft4222Error::InvalidResponse("Empty GPIO read".into()))
    }
}

impl SubplatformAdapter for Ft4222Gpio {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform_type(&self) -> PlatformType {
        PlatformType::Ft4222
    }

    fn line_count(&self) -> u32 {
        GPIO_PORTS
    }

    fn request_line(&self, line: u32, _consumer: &str) -> CoreResult<Box<dyn LineHandle>> {
        if line >= GPIO_PORTS {
            return Err(Ft4222Error::InvalidPort(line).into());
        }
        self.shared.lock().request(line as usize)?;
        log::debug!("ft4222: port {} requested", line);
        Ok(Box::new(Ft4222Line {
            shared: self.shared.clone(),
            port: line,
        }))
    }
}

/// One FT4222H GPIO port
struct Ft4222Line {
    shared: Arc<Shared>,
    port: u32,
}

impl LineHandle for Ft4222Line {
    fn set_direction(&mut self, direction: Direction) -> CoreResult<()> {
        let mut state = self.shared.lock();
        let mut ports = state.ports;
        ports.set_output(self.port, direction.is_output());
        if let Some(level) = direction.initial_level() {
            ports.set_level(self.port, level);
        }
        self.shared.write_ports(ports)?;
        state.ports = ports;
        Ok(())
    }

    fn read(&self) -> CoreResult<bool> {
        let state = self.shared.lock();
        if state.ports.is_output(self.port) {
            return Ok(PortState::level_in(state.ports.levels, self.port));
        }
        let response = self.shared.read_ports()?;
        Ok(PortState::level_in(response, self.port))
    }

    fn write(&mut self, value: bool) -> CoreResult<()> {
        let mut state = self.shared.lock();
        if !state.ports.is_output(self.port) {
            return Err(CoreError::IoFailure);
        }
        let mut ports = state.ports;
        ports.set_level(self.port, value);
        self.shared.write_ports(ports)?;
        state.ports = ports;
        Ok(())
    }

    fn watch_edges(&mut self, _edge: Edge) -> CoreResult<Box<dyn EdgeSource>> {
        Err(CoreError::InterruptUnsupported)
    }

    fn unwatch_edges(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn release(self: Box<Self>, keep: bool) {
        self.shared.lock().release(self.port as usize, keep);
        log::debug!(
            "ft4222: port {} {}",
            self.port,
            if keep { "kept" } else { "released" }
        );
    }
}
