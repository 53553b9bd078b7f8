//! Pin capability and direction flags

use bitflags::bitflags;

/// A single function a pin can be opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
pub enum Capability {
    /// Digital input/output
    Gpio,
    /// I2C data or clock
    I2c,
    /// SPI signal
    Spi,
    /// UART receive or transmit
    Uart,
    /// PWM output
    Pwm,
    /// Analog input
    Aio,
}

impl Capability {
    /// All capabilities in display order
    pub const ALL: [Capability; 6] = [
        Capability::Gpio,
        Capability::I2c,
        Capability::Spi,
        Capability::Uart,
        Capability::Pwm,
        Capability::Aio,
    ];

    /// Short lowercase name
    pub fn name(self) -> &'static str {
        match self {
            Capability::Gpio => "gpio",
            Capability::I2c => "i2c",
            Capability::Spi => "spi",
            Capability::Uart => "uart",
            Capability::Pwm => "pwm",
            Capability::Aio => "aio",
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Set of capabilities a pin legally supports
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u8 {
        /// Digital input/output
        const GPIO = 1 << 0;
        /// I2C data or clock
        const I2C  = 1 << 1;
        /// SPI signal
        const SPI  = 1 << 2;
        /// UART receive or transmit
        const UART = 1 << 3;
        /// PWM output
        const PWM  = 1 << 4;
        /// Analog input
        const AIO  = 1 << 5;
    }
}

impl Capabilities {
    /// Check membership of a single capability
    pub fn supports(self, cap: Capability) -> bool {
        self.contains(cap.into())
    }

    /// Iterate the contained capabilities in display order
    pub fn capabilities(self) -> impl Iterator<Item = Capability> {
        Capability::ALL
            .into_iter()
            .filter(move |c| self.supports(*c))
    }
}

impl From<Capability> for Capabilities {
    fn from(cap: Capability) -> Self {
        match cap {
            Capability::Gpio => Capabilities::GPIO,
            Capability::I2c => Capabilities::I2C,
            Capability::Spi => Capabilities::SPI,
            Capability::Uart => Capabilities::UART,
            Capability::Pwm => Capabilities::PWM,
            Capability::Aio => Capabilities::AIO,
        }
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::empty(), |acc, c| acc | c.into())
    }
}

bitflags! {
    /// Directions a GPIO line can be driven in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Directions: u8 {
        /// Line can be read as an input
        const INPUT  = 1 << 0;
        /// Line can be driven as an output
        const OUTPUT = 1 << 1;
    }
}

impl Default for Directions {
    fn default() -> Self {
        Directions::INPUT | Directions::OUTPUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_and_iterate() {
        let caps: Capabilities = [Capability::Pwm, Capability::Gpio].into_iter().collect();
        assert!(caps.supports(Capability::Gpio));
        assert!(caps.supports(Capability::Pwm));
        assert!(!caps.supports(Capability::Aio));
        let listed: Vec<_> = caps.capabilities().collect();
        assert_eq!(listed, vec![Capability::Gpio, Capability::Pwm]);
    }
}
