//! boardio - Command-line access to board I/O
//!
//! Detects the board it runs on (or takes one from `--board` /
//! `BOARDIO_PLATFORM`), then addresses pins by their logical index the way
//! the board's header is labelled.
//!
//! # Architecture
//!
//! All hardware access goes through a `PlatformContext` from `boardio-hal`:
//! - **Linux backend** - GPIO character devices, i2c-dev, spidev, TTYs and
//!   the PWM and IIO sysfs classes
//! - **Mock backend** (`--mock`) - An in-memory board for trying commands
//!   without hardware
//!
//! Sub-platforms such as an FT4222H on USB (built with the `ft4222`
//! feature) are probed on first use of a pin index past the board's own,
//! unless `--no-subplatform` is given.

mod cli;
mod commands;

use clap::Parser;
use cli::{
    AioCommands, Cli, Commands, GpioCommands, I2cCommands, PwmCommands, SpiCommands, UartCommands,
};

use boardio_core::PlatformConfig;
use boardio_hal::BackendKind;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let mut config = PlatformConfig::new().with_subplatform_detection(!cli.no_subplatform);
    if let Some(board) = &cli.board {
        config = config.with_board(board.as_str());
    }
    for path in &cli.board_db {
        config = config.with_board_db(path);
    }

    if let Commands::ListBoards = cli.command {
        let db = boardio_hal::load_database(&config)?;
        commands::list_boards(&db);
        return Ok(());
    }

    let kind = if cli.mock {
        BackendKind::Mock
    } else {
        BackendKind::default()
    };
    let ctx = match boardio_hal::open_platform(kind, config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Failed to open platform: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Info => commands::show_info(&ctx),
        Commands::ListBoards => Ok(()),
        Commands::Gpio(cmd) => match cmd {
            GpioCommands::List => commands::gpio::cmd_list(&ctx),
            GpioCommands::Get { pin, raw } => commands::gpio::cmd_get(&ctx, pin, raw),
            GpioCommands::Set { pin, value, raw } => {
                commands::gpio::cmd_set(&ctx, pin, value, raw)
            }
            GpioCommands::Toggle { pin } => commands::gpio::cmd_toggle(&ctx, pin),
            GpioCommands::Monitor { pin, edge, count } => {
                commands::gpio::cmd_monitor(&ctx, pin, edge, count)
            }
        },
        Commands::I2c(cmd) => match cmd {
            I2cCommands::Detect { bus } => commands::i2c::cmd_detect(&ctx, bus),
            I2cCommands::Get {
                bus,
                address,
                register,
            } => commands::i2c::cmd_get(&ctx, bus, address, register),
            I2cCommands::Set {
                bus,
                address,
                register,
                value,
            } => commands::i2c::cmd_set(&ctx, bus, address, register, value),
        },
        Commands::Spi(SpiCommands::Transfer {
            bus,
            data,
            mode,
            frequency,
        }) => commands::spi::cmd_transfer(&ctx, bus, &data, mode, frequency),
        Commands::Uart(UartCommands::Send { port, text, baud }) => {
            commands::uart::cmd_send(&ctx, &port, &text, baud)
        }
        Commands::Pwm(PwmCommands::Set {
            pin,
            period_us,
            duty,
            hold_ms,
        }) => commands::pwm::cmd_set(&ctx, pin, period_us, duty, hold_ms),
        Commands::Aio(AioCommands::Read { pin, bits }) => commands::aio::cmd_read(&ctx, pin, bits),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
