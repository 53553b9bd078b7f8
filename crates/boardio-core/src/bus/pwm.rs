//! PWM controller
//!
//! Periods are bounded by the board's PWM limits. The kernel rejects a duty
//! time longer than the period, so period changes write the two values in
//! whichever order keeps that true, scaling the duty time to keep the duty
//! cycle.

use std::sync::PoisonError;

use crate::backend::PwmChannel;
use crate::board::{Capability, PwmLimits, PwmRef};
use crate::error::{Error, Result};
use crate::registry::{BusKey, BusLock, PlatformContext, Resource, ResourceClaim};

/// An open PWM output
pub struct Pwm {
    pin: usize,
    pwm: PwmRef,
    channel: Box<dyn PwmChannel>,
    limits: PwmLimits,
    lock: BusLock,
    _claim: ResourceClaim,
}

impl Pwm {
    /// Open the PWM output of pin `index`
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        let platform = ctx.resolve_platform()?;
        let pin = ctx.resolve_pin(index)?;
        if !pin.descriptor.supports(Capability::Pwm) {
            return Err(Error::UnsupportedMode);
        }
        let pwm = pin.descriptor.pwm.ok_or(Error::UnsupportedMode)?;

        let mut resources = vec![Resource::Pwm(pwm)];
        resources.extend(pin.descriptor.gpio.map(Resource::Line));
        let claim = ctx.claim(resources)?;

        ctx.apply_mux(&pin, Capability::Pwm)?;
        let mut channel = ctx.backend().open_pwm(pwm)?;

        let limits = platform.pwm;
        if channel.period_ns()? == 0 {
            channel.set_period_ns(us_to_ns(limits.default_us))?;
        }
        log::debug!(
            "pwm: opened pin {} ({}) on pwmchip{}/pwm{}",
            index,
            pin.descriptor.name,
            pwm.chip,
            pwm.channel
        );

        Ok(Self {
            pin: index,
            pwm,
            channel,
            limits,
            lock: ctx.bus_lock(BusKey::Pwm(pwm.chip)),
            _claim: claim,
        })
    }

    /// Logical pin index
    pub fn pin(&self) -> usize {
        self.pin
    }

    /// Shortest period the board allows, in microseconds
    pub fn min_period(&self) -> u32 {
        self.limits.min_us
    }

    /// Longest period the board allows, in microseconds
    pub fn max_period(&self) -> u32 {
        self.limits.max_us
    }

    /// Set the period in microseconds, keeping the duty cycle
    pub fn set_period_us(&mut self, us: u32) -> Result<()> {
        if us < self.limits.min_us || us > self.limits.max_us {
            return Err(Error::OutOfRange);
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let old_period = self.channel.period_ns()?;
        let old_duty = self.channel.duty_ns()?;
        let period = us_to_ns(us);
        let duty = if old_period == 0 {
            0
        } else {
            (old_duty as u128 * period as u128 / old_period as u128) as u64
        };

        if period < old_period {
            self.channel.set_duty_ns(duty)?;
            self.channel.set_period_ns(period)?;
        } else {
            self.channel.set_period_ns(period)?;
            self.channel.set_duty_ns(duty)?;
        }
        log::trace!("pwm: pin {} period {} us", self.pin, us);
        Ok(())
    }

    /// Set the period in milliseconds
    pub fn set_period_ms(&mut self, ms: u32) -> Result<()> {
        self.set_period_us(ms.checked_mul(1000).ok_or(Error::OutOfRange)?)
    }

    /// Current period in microseconds
    pub fn period_us(&self) -> Result<u32> {
        Ok(ns_to_us(self.channel.period_ns()?))
    }

    /// Set the active time per period in microseconds
    pub fn set_pulse_width_us(&mut self, us: u32) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let duty = us_to_ns(us);
        if duty > self.channel.period_ns()? {
            return Err(Error::OutOfRange);
        }
        self.channel.set_duty_ns(duty)
    }

    /// Current active time per period in microseconds
    pub fn pulse_width_us(&self) -> Result<u32> {
        Ok(ns_to_us(self.channel.duty_ns()?))
    }

    /// Set the duty cycle as a fraction of the period (0.0 to 1.0)
    pub fn set_duty_cycle(&mut self, ratio: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::OutOfRange);
        }
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let period = self.channel.period_ns()?;
        let duty = (period as f64 * ratio as f64).round() as u64;
        self.channel.set_duty_ns(duty.min(period))?;
        log::trace!("pwm: pin {} duty {:.3}", self.pin, ratio);
        Ok(())
    }

    /// Current duty cycle
    pub fn duty_cycle(&self) -> Result<f32> {
        let period = self.channel.period_ns()?;
        if period == 0 {
            return Ok(0.0);
        }
        Ok((self.channel.duty_ns()? as f64 / period as f64) as f32)
    }

    /// Enable or disable the output
    pub fn enable(&mut self, enabled: bool) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.channel.set_enabled(enabled)?;
        log::debug!(
            "pwm: pin {} {}",
            self.pin,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    /// Whether the output is enabled
    pub fn is_enabled(&self) -> Result<bool> {
        self.channel.is_enabled()
    }
}

impl Drop for Pwm {
    fn drop(&mut self) {
        if let Err(e) = self.channel.set_enabled(false) {
            log::warn!("pwm: disabling pin {} on close failed: {}", self.pin, e);
        }
    }
}

impl core::fmt::Debug for Pwm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pwm")
            .field("pin", &self.pin)
            .field("chip", &self.pwm.chip)
            .field("channel", &self.pwm.channel)
            .finish()
    }
}

fn us_to_ns(us: u32) -> u64 {
    us as u64 * 1000
}

fn ns_to_us(ns: u64) -> u32 {
    (ns / 1000).min(u32::MAX as u64) as u32
}
