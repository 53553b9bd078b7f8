//! I2C commands

use boardio_core::{I2c, PlatformContext};

use super::CmdResult;

/// First and last address probed by `detect`, skipping reserved ones
const SCAN_FIRST: u8 = 0x03;
const SCAN_LAST: u8 = 0x77;

/// Probe every address with a one-byte read and print an i2cdetect-style grid
pub fn cmd_detect(ctx: &PlatformContext, bus: usize) -> CmdResult {
    let mut i2c = I2c::open(ctx, bus)?;
    log::info!("i2c: scanning bus {}", i2c.bus());

    println!("     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f");
    for row in (0u8..0x80).step_by(16) {
        print!("{:02x}:", row);
        for address in row..row + 16 {
            if !(SCAN_FIRST..=SCAN_LAST).contains(&address) {
                print!("   ");
                continue;
            }
            i2c.set_address(address as u16)?;
            if i2c.read_byte().is_ok() {
                print!(" {:02x}", address);
            } else {
                print!(" --");
            }
        }
        println!();
    }
    Ok(())
}

/// Read one register
pub fn cmd_get(ctx: &PlatformContext, bus: usize, address: u8, register: u8) -> CmdResult {
    let mut i2c = I2c::open(ctx, bus)?;
    i2c.set_address(address as u16)?;
    let value = i2c.read_register(register)?;
    println!("0x{:02x}", value);
    Ok(())
}

/// Write one register
pub fn cmd_set(
    ctx: &PlatformContext,
    bus: usize,
    address: u8,
    register: u8,
    value: u8,
) -> CmdResult {
    let mut i2c = I2c::open(ctx, bus)?;
    i2c.set_address(address as u16)?;
    i2c.write_register(register, value)?;
    log::info!(
        "i2c: wrote 0x{:02x} to register 0x{:02x} of 0x{:02x}",
        value,
        register,
        address
    );
    Ok(())
}
