//! Platform summary

use boardio_core::PlatformContext;

use super::CmdResult;

/// Print version, board and sub-platform details
pub fn show_info(ctx: &PlatformContext) -> CmdResult {
    let board = ctx.resolve_platform()?;

    // Looking up the first index past the board runs sub-platform detection
    let _ = ctx.resolve_pin(board.pin_count());

    println!("boardio version: {}", ctx.version());
    println!("Platform:        {}", ctx.platform_name()?);
    println!("Board table:     {}", board.name);
    println!(
        "Platform type:   {:?} ({})",
        board.platform_type,
        board.platform_type.code()
    );
    println!("Pins:            {}", ctx.pin_count()?);
    println!("GPIO pins:       {}", ctx.gpio_count()?);
    println!("I2C buses:       {}", ctx.i2c_bus_count()?);
    if let Ok(bus) = ctx.default_i2c_bus() {
        println!("Default I2C bus: {}", bus);
    }
    println!("SPI buses:       {}", board.spi.len());
    println!("UARTs:           {}", board.uart.len());
    println!(
        "ADC:             {} bits raw, {} bits supported",
        ctx.adc_raw_bits()?,
        ctx.adc_supported_bits()?
    );
    match ctx.subplatform_name() {
        Some(name) => println!("Sub-platform:    {}", name),
        None => println!("Sub-platform:    none"),
    }
    Ok(())
}
