//! Sub-platform probe for the FT4222H

use std::sync::Arc;

use boardio_core::subplatform::{SubplatformAdapter, SubplatformProbe};
use boardio_core::Result as CoreResult;

use crate::device::{device_present, Ft4222Gpio};
use crate::error::Ft4222Error;

/// Looks for an FT4222H on USB and opens its GPIO interface
#[derive(Debug, Default)]
pub struct Ft4222Probe {
    index: usize,
}

impl Ft4222Probe {
    /// Probe for the first FT4222H
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe for the nth FT4222H
    pub fn nth(index: usize) -> Self {
        Self { index }
    }
}

impl SubplatformProbe for Ft4222Probe {
    fn name(&self) -> &str {
        "ft4222"
    }

    fn probe(&self) -> CoreResult<Option<Arc<dyn SubplatformAdapter>>> {
        if !device_present()? {
            return Ok(None);
        }
        match Ft4222Gpio::open_nth(self.index) {
            Ok(gpio) => Ok(Some(Arc::new(gpio))),
            Err(Ft4222Error::DeviceNotFound) => Ok(None),
            Err(Ft4222Error::NoGpioMode(mode)) => {
                log::info!("ft4222: device present but strapped to mode {}", mode);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}
