//! PWM commands

use std::thread;
use std::time::Duration;

use boardio_core::{PlatformContext, Pwm};

use super::CmdResult;

/// Run a PWM output for `hold_ms`, then stop it
pub fn cmd_set(
    ctx: &PlatformContext,
    pin: usize,
    period_us: Option<u32>,
    duty: f32,
    hold_ms: u64,
) -> CmdResult {
    let mut pwm = Pwm::open(ctx, pin)?;
    if let Some(us) = period_us {
        pwm.set_period_us(us)?;
    }
    pwm.set_duty_cycle(duty)?;
    pwm.enable(true)?;
    println!(
        "Pin {}: period {} us, duty {:.1}% for {} ms",
        pin,
        pwm.period_us()?,
        pwm.duty_cycle()? * 100.0,
        hold_ms
    );
    thread::sleep(Duration::from_millis(hold_ms));
    pwm.enable(false)?;
    Ok(())
}
