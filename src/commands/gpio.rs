//! GPIO commands

use std::sync::mpsc;

use boardio_core::gpio::{Direction, Edge, EdgeKind, Gpio};
use boardio_core::PlatformContext;

use super::CmdResult;
use crate::cli::EdgeArg;

/// List every logical pin with its capabilities
pub fn cmd_list(ctx: &PlatformContext) -> CmdResult {
    let board = ctx.resolve_platform()?;
    // Trigger sub-platform detection so its pins are listed too
    let _ = ctx.resolve_pin(board.pin_count());

    println!("{:>4}  {:<10} Capabilities", "Pin", "Name");
    for index in 0..ctx.pin_count()? {
        let pin = ctx.resolve_pin(index)?;
        let caps: Vec<&str> = pin
            .descriptor
            .capabilities
            .capabilities()
            .map(|c| c.name())
            .collect();
        let origin = if pin.is_subplatform() { " (sub-platform)" } else { "" };
        println!(
            "{:>4}  {:<10} {}{}",
            index,
            pin.descriptor.name,
            caps.join(" "),
            origin
        );
    }
    Ok(())
}

/// Read a pin as input
pub fn cmd_get(ctx: &PlatformContext, pin: usize, raw: bool) -> CmdResult {
    let mut gpio = Gpio::open_with_owner(ctx, pin, false)?;
    gpio.set_direction(Direction::In)?;
    if raw {
        gpio.enable_mmap(true)?;
    }
    println!("Pin {} ({}) = {}", pin, gpio.name(), u8::from(gpio.read()?));
    Ok(())
}

/// Drive a pin and leave it driven
pub fn cmd_set(ctx: &PlatformContext, pin: usize, value: bool, raw: bool) -> CmdResult {
    let mut gpio = Gpio::open_with_owner(ctx, pin, false)?;
    if raw {
        gpio.set_direction(Direction::Out)?;
        gpio.enable_mmap(true)?;
        gpio.write(value)?;
    } else {
        let direction = if value {
            Direction::OutHigh
        } else {
            Direction::OutLow
        };
        gpio.set_direction(direction)?;
    }
    println!("Pin {} ({}) set to {}", pin, gpio.name(), u8::from(value));
    Ok(())
}

/// Sample the pin, then drive the other level
pub fn cmd_toggle(ctx: &PlatformContext, pin: usize) -> CmdResult {
    let mut gpio = Gpio::open_with_owner(ctx, pin, false)?;
    gpio.set_direction(Direction::In)?;
    let level = gpio.read()?;
    let direction = if level {
        Direction::OutLow
    } else {
        Direction::OutHigh
    };
    gpio.set_direction(direction)?;
    println!(
        "Pin {} ({}) toggled {} -> {}",
        pin,
        gpio.name(),
        u8::from(level),
        u8::from(!level)
    );
    Ok(())
}

/// Print edges until `count` events were seen, or forever
pub fn cmd_monitor(
    ctx: &PlatformContext,
    pin: usize,
    edge: EdgeArg,
    count: Option<u64>,
) -> CmdResult {
    let edge = match edge {
        EdgeArg::Both => Edge::Both,
        EdgeArg::Rising => Edge::Rising,
        EdgeArg::Falling => Edge::Falling,
    };

    let mut gpio = Gpio::open(ctx, pin)?;
    let (tx, rx) = mpsc::channel();
    gpio.register_interrupt(edge, move |event, control| {
        if tx.send(*event).is_err() {
            control.unregister();
        }
    })?;

    println!("Monitoring pin {} ({}), Ctrl-C to stop", pin, gpio.name());
    let mut seen = 0u64;
    while count.map_or(true, |limit| seen < limit) {
        let event = rx.recv()?;
        let kind = match event.kind {
            EdgeKind::Rising => "rising",
            EdgeKind::Falling => "falling",
        };
        println!(
            "{:>6}  {}.{:09}  {}",
            event.seqno,
            event.timestamp_ns / 1_000_000_000,
            event.timestamp_ns % 1_000_000_000,
            kind
        );
        seen += 1;
    }
    gpio.unregister_interrupt()?;
    Ok(())
}
