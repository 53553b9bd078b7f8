//! Pin multiplexing
//!
//! Many boards route one header pin to several SoC functions through
//! external switches driven by GPIO lines. Before a pin can act as a given
//! capability, those control lines must be driven to the levels listed in
//! the board table. The writes go straight to the backend's lowest-level
//! GPIO primitive, never through a [`crate::gpio::Gpio`] handle.

use std::sync::{Mutex, PoisonError};

use crate::board::{Capability, PinDescriptor};
use crate::error::{Error, Result};
use crate::registry::{PlatformContext, Resource};

/// Applies board mux tables
///
/// Mux writes from concurrent opens are serialised so two opens sharing a
/// control line cannot interleave their sequences.
#[derive(Debug, Default)]
pub struct PinMultiplexer {
    lock: Mutex<()>,
}

impl PinMultiplexer {
    /// Create a multiplexer
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive every control line `pin` needs for `cap`
    ///
    /// Any failure aborts the open with `MuxConfigurationFailed`. Writes
    /// already made are left in place; they are idempotent, so a retried
    /// open simply repeats them.
    pub fn apply(&self, ctx: &PlatformContext, pin: &PinDescriptor, cap: Capability) -> Result<()> {
        if !pin.supports(cap) {
            return Err(Error::UnsupportedMode);
        }

        let actions = pin.mux_actions(cap);
        if actions.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        for action in actions {
            if ctx.is_claimed(&Resource::Line(action.line)) {
                log::warn!(
                    "mux: {} needed by {} ({}) is held by an open handle",
                    action.line,
                    pin.name,
                    cap
                );
                return Err(Error::MuxConfigurationFailed);
            }
            log::trace!(
                "mux: {} {} -> {}",
                pin.name,
                action.line,
                u8::from(action.level)
            );
            ctx.backend()
                .write_mux(action.line, action.level)
                .map_err(|e| {
                    log::error!(
                        "mux: setting {} for {} ({}) failed: {}",
                        action.line,
                        pin.name,
                        cap,
                        e
                    );
                    Error::MuxConfigurationFailed
                })?;
        }

        log::debug!("mux: {} configured for {}", pin.name, cap);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GpioLine;
    use crate::mock::MockBackend;

    #[test]
    fn writes_mux_levels_in_order() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let pin = ctx.resolve_pin(3).unwrap();

        ctx.apply_mux(&pin, Capability::Pwm).unwrap();
        assert_eq!(backend.mux_writes(), vec![(GpioLine::new(1, 1), true)]);

        ctx.apply_mux(&pin, Capability::Gpio).unwrap();
        assert_eq!(backend.mux_level(GpioLine::new(1, 1)), Some(false));
    }

    #[test]
    fn no_actions_no_writes() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let pin = ctx.resolve_pin(4).unwrap();
        ctx.apply_mux(&pin, Capability::Gpio).unwrap();
        assert!(backend.mux_writes().is_empty());
    }

    #[test]
    fn unsupported_capability() {
        let ctx = MockBackend::new().context();
        let pin = ctx.resolve_pin(4).unwrap();
        assert_eq!(
            ctx.apply_mux(&pin, Capability::Pwm).unwrap_err(),
            Error::UnsupportedMode
        );
    }

    #[test]
    fn failing_write_is_reported() {
        let backend = MockBackend::new();
        backend.fail_mux_line(GpioLine::new(1, 3));
        let ctx = backend.context();
        let pin = ctx.resolve_pin(12).unwrap();
        assert_eq!(
            ctx.apply_mux(&pin, Capability::I2c).unwrap_err(),
            Error::MuxConfigurationFailed
        );
    }
}
