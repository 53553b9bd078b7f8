//! Analog input commands

use boardio_core::{Aio, PlatformContext};

use super::CmdResult;

/// Read one sample, raw and normalised
pub fn cmd_read(ctx: &PlatformContext, pin: usize, bits: Option<u8>) -> CmdResult {
    let mut aio = Aio::open(ctx, pin)?;
    if let Some(bits) = bits {
        aio.set_bits(bits)?;
    }
    let value = aio.read()?;
    let normalized = aio.read_normalized()?;
    println!(
        "Pin {}: {} ({} bits), {:.4}",
        pin,
        value,
        aio.bits(),
        normalized
    );
    Ok(())
}
