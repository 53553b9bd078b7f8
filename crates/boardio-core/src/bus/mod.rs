//! Bus and channel controllers
//!
//! Every controller follows the same open sequence as [`crate::gpio::Gpio`]:
//! look the bus up in the board table, route its pins through the mux, then
//! open the backend resource. Transactions on one physical bus are
//! serialised through a lock shared by all handles on that bus.

pub mod aio;
pub mod i2c;
pub mod pwm;
pub mod spi;
pub mod uart;

pub use aio::Aio;
pub use i2c::{I2c, I2cSpeed};
pub use pwm::Pwm;
pub use spi::{Spi, SpiMode};
pub use uart::{FlowControl, Parity, Uart, UartMode};

use crate::board::Capability;
use crate::error::Result;
use crate::registry::{BusKey, PlatformContext, ResourceClaim};

/// Claim the board pins carrying `bus` and switch them to `cap`
///
/// The GPIO lines behind the pins stay claimed for the bus until the last
/// handle on it drops the returned claim, so they cannot be opened as GPIO
/// meanwhile. Lines held by any other handle make the open fail with
/// `ResourceBusy` before the mux is touched.
pub(crate) fn route_pins(
    ctx: &PlatformContext,
    bus: &BusKey,
    pins: &[usize],
    cap: Capability,
) -> Result<ResourceClaim> {
    let resolved = pins
        .iter()
        .map(|&index| ctx.resolve_pin(index))
        .collect::<Result<Vec<_>>>()?;
    let lines = resolved.iter().filter_map(|p| p.line_resource()).collect();
    let claim = ctx.claim_for_bus(bus, lines)?;
    for pin in &resolved {
        ctx.apply_mux(pin, cap)?;
    }
    Ok(claim)
}
