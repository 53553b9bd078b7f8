//! SPI commands

use boardio_core::bus::SpiMode;
use boardio_core::{PlatformContext, Spi};

use super::{hex_bytes, CmdResult};

/// Clock `data` out on a board SPI bus and print what came back
pub fn cmd_transfer(
    ctx: &PlatformContext,
    bus: usize,
    data: &[u8],
    mode: u8,
    frequency: Option<u32>,
) -> CmdResult {
    let mut spi = Spi::open(ctx, bus)?;
    spi.set_mode(SpiMode::try_from(mode)?)?;
    if let Some(hz) = frequency {
        spi.set_frequency(hz)?;
    }
    log::debug!(
        "spi: bus {} cs {} mode {:?} at {} Hz",
        spi.bus(),
        spi.chip_select(),
        spi.mode(),
        spi.frequency()
    );

    let rx = spi.transfer(data)?;
    println!("{}", hex_bytes(&rx));
    Ok(())
}
