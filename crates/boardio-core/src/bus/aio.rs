//! Analog input controller

use std::sync::PoisonError;

use crate::backend::AioChannel;
use crate::board::{AioRef, Capability};
use crate::error::{Error, Result};
use crate::registry::{BusKey, BusLock, PlatformContext, Resource, ResourceClaim};

/// An open analog input
///
/// Samples are returned at a chosen resolution: the converter's native
/// samples are shifted up or down to `bits` wide.
pub struct Aio {
    pin: usize,
    aio: AioRef,
    channel: Box<dyn AioChannel>,
    raw_bits: u8,
    bits: u8,
    lock: BusLock,
    _claim: ResourceClaim,
}

impl Aio {
    /// Open the analog input of pin `index`
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let platform = ctx.resolve_platform()?;
        let pin = ctx.resolve_pin(index)?;
        if !pin.descriptor.supports(Capability::Aio) {
            return Err(Error::UnsupportedMode);
        }
        let aio = pin.descriptor.aio.ok_or(Error::UnsupportedMode)?;

        let mut resources = vec![Resource::Aio(aio)];
        resources.extend(pin.descriptor.gpio.map(Resource::Line));
        let claim = ctx.claim(resources)?;

        ctx.apply_mux(&pin, Capability::Aio)?;
        let channel = ctx.backend().open_aio(aio)?;
        log::debug!(
            "aio: opened pin {} ({}) on iio:device{} channel {}",
            index,
            pin.descriptor.name,
            aio.device,
            aio.channel
        );

        Ok(Self {
            pin: index,
            aio,
            channel,
            raw_bits: platform.adc.raw_bits,
            bits: platform.adc.supported_bits,
            lock: ctx.bus_lock(BusKey::Aio(aio.device)),
            _claim: claim,
        })
    }

    /// Logical pin index
    pub fn pin(&self) -> usize {
        self.pin
    }

    /// Choose the resolution of returned samples
    pub fn set_bits(&mut self, bits: u8) -> Result<()> {
        if !(1..=32).contains(&bits) {
            return Err(Error::InvalidParameter);
        }
        self.bits = bits;
        Ok(())
    }

    /// Resolution of returned samples
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Native converter resolution
    pub fn raw_bits(&self) -> u8 {
        self.raw_bits
    }

    /// Read one sample at the chosen resolution
    pub fn read(&mut self) -> Result<u32> {
        let raw = {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.channel.read_raw()?
        };
        let raw = raw as u64 & mask(self.raw_bits);
        let value = if self.bits >= self.raw_bits {
            raw << (self.bits - self.raw_bits)
        } else {
            raw >> (self.raw_bits - self.bits)
        };
        log::trace!("aio: pin {} raw {} -> {}", self.pin, raw, value);
        Ok(value as u32)
    }

    /// Read one sample scaled to 0.0..=1.0
    pub fn read_normalized(&mut self) -> Result<f32> {
        let value = self.read()?;
        Ok((value as f64 / mask(self.bits) as f64) as f32)
    }
}

impl core::fmt::Debug for Aio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Aio")
            .field("pin", &self.pin)
            .field("device", &self.aio.device)
            .field("channel", &self.aio.channel)
            .field("bits", &self.bits)
            .finish()
    }
}

fn mask(bits: u8) -> u64 {
    (1u64 << bits) - 1
}
