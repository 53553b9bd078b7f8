//! CLI argument parsing

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a hex or decimal byte
fn parse_hex_u8(s: &str) -> Result<u8, String> {
    let value = parse_hex_u32(s)?;
    u8::try_from(value).map_err(|_| format!("Value out of range for a byte: {}", s))
}

/// Parse a GPIO level: 0 or 1 only
fn parse_level(s: &str) -> Result<bool, String> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(format!("GPIO value must be 0 or 1, got '{}'", s)),
    }
}

#[derive(Parser)]
#[command(name = "boardio")]
#[command(author, version, about = "Board GPIO, I2C, SPI, UART, PWM and analog access", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Board table to use instead of detecting the board (default: $BOARDIO_PLATFORM)
    #[arg(long, global = true)]
    pub board: Option<String>,

    /// Extra board table file or directory (.ron), may be repeated
    #[arg(long, global = true)]
    pub board_db: Vec<PathBuf>,

    /// Run on the in-memory mock board
    #[arg(long, global = true)]
    pub mock: bool,

    /// Do not probe for sub-platform adapters
    #[arg(long, global = true)]
    pub no_subplatform: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the detected platform
    Info,

    /// List known board tables
    ListBoards,

    /// GPIO access
    #[command(subcommand)]
    Gpio(GpioCommands),

    /// I2C access
    #[command(subcommand)]
    I2c(I2cCommands),

    /// SPI access
    #[command(subcommand)]
    Spi(SpiCommands),

    /// UART access
    #[command(subcommand)]
    Uart(UartCommands),

    /// PWM output
    #[command(subcommand)]
    Pwm(PwmCommands),

    /// Analog input
    #[command(subcommand)]
    Aio(AioCommands),
}

/// Edge selection for `gpio monitor`
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EdgeArg {
    /// Both edges
    Both,
    /// Rising edges
    Rising,
    /// Falling edges
    Falling,
}

#[derive(Subcommand)]
pub enum GpioCommands {
    /// List pins and their capabilities
    List,

    /// Read a pin
    Get {
        /// Logical pin index
        pin: usize,

        /// Use the memory-mapped fast path
        #[arg(long)]
        raw: bool,
    },

    /// Drive a pin
    Set {
        /// Logical pin index
        pin: usize,

        /// Level (0 or 1)
        #[arg(value_parser = parse_level, action = clap::ArgAction::Set)]
        value: bool,

        /// Use the memory-mapped fast path
        #[arg(long)]
        raw: bool,
    },

    /// Drive a pin to the opposite of the level it reads
    Toggle {
        /// Logical pin index
        pin: usize,
    },

    /// Print edges on a pin until interrupted
    Monitor {
        /// Logical pin index
        pin: usize,

        /// Edges to report
        #[arg(long, value_enum, default_value = "both")]
        edge: EdgeArg,

        /// Stop after this many events
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum I2cCommands {
    /// Scan a bus for responding addresses
    Detect {
        /// Board I2C bus index
        bus: usize,
    },

    /// Read a register
    Get {
        /// Board I2C bus index
        bus: usize,

        /// Device address (hex, e.g. 0x50)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,

        /// Register (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        register: u8,
    },

    /// Write a register
    Set {
        /// Board I2C bus index
        bus: usize,

        /// Device address (hex, e.g. 0x50)
        #[arg(value_parser = parse_hex_u8)]
        address: u8,

        /// Register (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        register: u8,

        /// Value (hex or decimal)
        #[arg(value_parser = parse_hex_u8)]
        value: u8,
    },
}

#[derive(Subcommand)]
pub enum SpiCommands {
    /// Full-duplex transfer, printing the bytes clocked in
    Transfer {
        /// Board SPI bus index
        bus: usize,

        /// Bytes to send (hex or decimal)
        #[arg(value_parser = parse_hex_u8, required = true)]
        data: Vec<u8>,

        /// SPI mode (0-3)
        #[arg(long, default_value = "0")]
        mode: u8,

        /// Clock frequency in Hz
        #[arg(long, value_parser = parse_hex_u32)]
        frequency: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum UartCommands {
    /// Send text
    Send {
        /// Board UART index or a TTY path
        port: String,

        /// Text to send
        text: String,

        /// Baud rate
        #[arg(long, default_value = "115200")]
        baud: u32,
    },
}

#[derive(Subcommand)]
pub enum PwmCommands {
    /// Output a PWM signal for a while
    Set {
        /// Logical pin index
        pin: usize,

        /// Period in microseconds
        #[arg(long)]
        period_us: Option<u32>,

        /// Duty cycle (0.0 to 1.0)
        #[arg(long)]
        duty: f32,

        /// How long to keep the output running, in milliseconds
        #[arg(long, default_value = "1000")]
        hold_ms: u64,
    },
}

#[derive(Subcommand)]
pub enum AioCommands {
    /// Read an analog pin
    Read {
        /// Logical pin index
        pin: usize,

        /// Result width in bits
        #[arg(long)]
        bits: Option<u8>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn number_parsing() {
        assert_eq!(parse_hex_u32("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u32("42").unwrap(), 42);
        assert!(parse_hex_u32("0xZZ").is_err());
        assert_eq!(parse_hex_u8("0xFF").unwrap(), 0xFF);
        assert!(parse_hex_u8("256").is_err());
    }

    #[test]
    fn gpio_values_are_zero_or_one() {
        assert!(!parse_level("0").unwrap());
        assert!(parse_level("1").unwrap());
        assert!(parse_level("2").is_err());
        assert!(parse_level("high").is_err());
    }

    #[test]
    fn gpio_set_rejects_other_values() {
        assert!(Cli::try_parse_from(["boardio", "gpio", "set", "3", "1"]).is_ok());
        assert!(Cli::try_parse_from(["boardio", "gpio", "set", "3", "5"]).is_err());
    }
}
