//! UART commands

use boardio_core::{PlatformContext, Uart};

use super::CmdResult;

/// Send `text` on a board UART (by index) or a TTY (by path)
pub fn cmd_send(ctx: &PlatformContext, port: &str, text: &str, baud: u32) -> CmdResult {
    let mut uart = match port.parse::<usize>() {
        Ok(index) => Uart::open(ctx, index)?,
        Err(_) => Uart::open_device(ctx, port)?,
    };
    uart.set_baud_rate(baud)?;
    let written = uart.write_str(text)?;
    uart.flush()?;
    log::info!(
        "uart: sent {} bytes on {} at {} baud",
        written,
        uart.device_path(),
        baud
    );
    Ok(())
}
