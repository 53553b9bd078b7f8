//! SPI controller

use std::sync::PoisonError;

use crate::backend::SpiDevice;
use crate::board::Capability;
use crate::error::{Error, Result};
use crate::registry::{BusKey, BusLock, PlatformContext, ResourceClaim};

/// Clock programmed when a device is opened
pub const DEFAULT_FREQUENCY: u32 = 4_000_000;

/// Clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0
    #[default]
    Mode0,
    /// CPOL 0, CPHA 1
    Mode1,
    /// CPOL 1, CPHA 0
    Mode2,
    /// CPOL 1, CPHA 1
    Mode3,
}

impl SpiMode {
    /// Clock idles high
    pub fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Data sampled on the trailing edge
    pub fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            _ => Err(Error::InvalidParameter),
        }
    }
}

/// An open SPI device (one bus and chip select)
pub struct Spi {
    bus: u32,
    cs: u32,
    device: Box<dyn SpiDevice>,
    mode: SpiMode,
    frequency: u32,
    bits: u8,
    lsb_first: bool,
    lock: BusLock,
    _pins: Option<ResourceClaim>,
}

impl Spi {
    /// Open the board's SPI entry `index`
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let platform = ctx.resolve_platform()?;
        let def = platform.spi.get(index).ok_or(Error::InvalidResource)?;
        let claim = super::route_pins(ctx, &BusKey::Spi(def.bus), &def.pins, Capability::Spi)?;
        Self::open_device(ctx, def.bus, def.cs, Some(claim))
    }

    /// Open a kernel SPI device directly, bypassing the board table
    pub fn open_raw(ctx: &PlatformContext, bus: u32, cs: u32) -> Result<Self> {
        Self::open_device(ctx, bus, cs, None)
    }

    fn open_device(
        ctx: &PlatformContext,
        bus: u32,
        cs: u32,
        pins: Option<ResourceClaim>,
    ) -> Result<Self> {
        let mut device = ctx.backend().open_spi(bus, cs)?;
        device.set_mode(SpiMode::Mode0)?;
        device.set_bits_per_word(8)?;
        device.set_speed_hz(DEFAULT_FREQUENCY)?;
        log::debug!("spi: opened {}.{}", bus, cs);
        Ok(Self {
            bus,
            cs,
            device,
            mode: SpiMode::Mode0,
            frequency: DEFAULT_FREQUENCY,
            bits: 8,
            lsb_first: false,
            lock: ctx.bus_lock(BusKey::Spi(bus)),
            _pins: pins,
        })
    }

    /// Kernel bus number
    pub fn bus(&self) -> u32 {
        self.bus
    }

    /// Chip select
    pub fn chip_select(&self) -> u32 {
        self.cs
    }

    /// Set the clock mode
    pub fn set_mode(&mut self, mode: SpiMode) -> Result<()> {
        self.device.set_mode(mode)?;
        self.mode = mode;
        Ok(())
    }

    /// Current clock mode
    pub fn mode(&self) -> SpiMode {
        self.mode
    }

    /// Set the maximum clock frequency
    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz == 0 {
            return Err(Error::InvalidParameter);
        }
        self.device.set_speed_hz(hz)?;
        self.frequency = hz;
        Ok(())
    }

    /// Current clock frequency
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Set the word width
    ///
    /// Fails with `UnsupportedMode` when the controller cannot do it.
    pub fn set_bits_per_word(&mut self, bits: u8) -> Result<()> {
        if bits == 0 || bits > 32 {
            return Err(Error::InvalidParameter);
        }
        self.device.set_bits_per_word(bits)?;
        self.bits = bits;
        Ok(())
    }

    /// Current word width
    pub fn bits_per_word(&self) -> u8 {
        self.bits
    }

    /// Select bit order
    pub fn set_lsb_first(&mut self, lsb_first: bool) -> Result<()> {
        self.device.set_lsb_first(lsb_first)?;
        self.lsb_first = lsb_first;
        Ok(())
    }

    /// Whether bits go out least significant first
    pub fn lsb_first(&self) -> bool {
        self.lsb_first
    }

    /// Full-duplex transfer into a caller buffer of the same length
    pub fn transfer_into(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<()> {
        if tx.len() != rx.len() {
            return Err(Error::InvalidParameter);
        }
        if tx.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.device.transfer(tx, rx, self.frequency, self.bits)?;
        log::trace!("spi: {}.{} {:02x?} -> {:02x?}", self.bus, self.cs, tx, rx);
        Ok(())
    }

    /// Full-duplex transfer returning the received bytes
    pub fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
        let mut rx = vec![0u8; tx.len()];
        self.transfer_into(tx, &mut rx)?;
        Ok(rx)
    }

    /// Exchange a single byte
    pub fn write_byte(&mut self, value: u8) -> Result<u8> {
        let mut rx = [0u8; 1];
        self.transfer_into(&[value], &mut rx)?;
        Ok(rx[0])
    }
}

impl core::fmt::Debug for Spi {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Spi")
            .field("bus", &self.bus)
            .field("cs", &self.cs)
            .field("mode", &self.mode)
            .field("frequency", &self.frequency)
            .field("bits", &self.bits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn loopback_transfer() {
        let ctx = MockBackend::new().context();
        let mut spi = Spi::open(&ctx, 0).unwrap();
        assert_eq!(spi.transfer(&[1, 2, 3]).unwrap(), vec![1, 2, 3]);
        assert_eq!(spi.write_byte(0x5A).unwrap(), 0x5A);
    }

    #[test]
    fn length_mismatch() {
        let ctx = MockBackend::new().context();
        let mut spi = Spi::open(&ctx, 0).unwrap();
        let mut rx = [0u8; 2];
        assert_eq!(
            spi.transfer_into(&[1, 2, 3], &mut rx).unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn unsupported_word_width() {
        let ctx = MockBackend::new().context();
        let mut spi = Spi::open(&ctx, 0).unwrap();
        assert_eq!(spi.set_bits_per_word(12).unwrap_err(), Error::UnsupportedMode);
        assert_eq!(spi.bits_per_word(), 8);
        spi.set_bits_per_word(16).unwrap();
        assert_eq!(spi.bits_per_word(), 16);
    }

    #[test]
    fn configuration_is_tracked() {
        let ctx = MockBackend::new().context();
        let mut spi = Spi::open(&ctx, 1).unwrap();
        assert_eq!(spi.chip_select(), 1);
        spi.set_mode(SpiMode::try_from(3).unwrap()).unwrap();
        spi.set_frequency(1_000_000).unwrap();
        spi.set_lsb_first(true).unwrap();
        assert_eq!(spi.mode(), SpiMode::Mode3);
        assert_eq!(spi.frequency(), 1_000_000);
        assert!(spi.lsb_first());
        assert_eq!(spi.set_frequency(0).unwrap_err(), Error::InvalidParameter);
    }

    #[test]
    fn mode_conversion() {
        assert_eq!(SpiMode::try_from(4).unwrap_err(), Error::InvalidParameter);
        assert!(SpiMode::Mode2.cpol());
        assert!(!SpiMode::Mode2.cpha());
        assert!(SpiMode::Mode1.cpha());
    }

    #[test]
    fn unknown_entry() {
        let ctx = MockBackend::new().context();
        assert_eq!(Spi::open(&ctx, 9).unwrap_err(), Error::InvalidResource);
    }
}
