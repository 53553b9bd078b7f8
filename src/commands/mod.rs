//! CLI command implementations
//!
//! Each submodule takes the platform context built in `main` and drives
//! one controller type. Commands that hold an output (`gpio set`,
//! `pwm set`) open their handles without ownership where the controller
//! allows it, so the line keeps its state after the command exits.

pub mod aio;
pub mod gpio;
pub mod i2c;
mod info;
mod list;
pub mod pwm;
pub mod spi;
pub mod uart;

pub use info::show_info;
pub use list::list_boards;

/// Result type for command implementations
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Format bytes as space-separated hex
pub(crate) fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(hex_bytes(&[0x9f, 0x00, 0xef]), "9f 00 ef");
        assert_eq!(hex_bytes(&[]), "");
    }
}
