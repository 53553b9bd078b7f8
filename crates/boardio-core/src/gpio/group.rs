//! Several pins driven and sampled as one

use super::{Direction, Gpio};
use crate::error::{Error, Result};
use crate::registry::PlatformContext;

/// A set of GPIO handles addressed together
///
/// Values are passed in the order the pins were given to [`GpioGroup::open`].
/// Each pin is still its own line, so a group write is not atomic across
/// pins.
#[derive(Debug)]
pub struct GpioGroup {
    pins: Vec<Gpio>,
}

impl GpioGroup {
    /// Open every pin in `indices`
    ///
    /// Fails if any pin cannot be opened; pins opened before the failure
    /// are closed again.
    pub fn open(ctx: &PlatformContext, indices: &[usize]) -> Result<Self> {
        if indices.is_empty() {
            return Err(Error::InvalidParameter);
        }
        let pins = indices
            .iter()
            .map(|&index| Gpio::open(ctx, index))
            .collect::<Result<Vec<_>>>()?;
        log::debug!("gpio: opened group of {} pins {:?}", pins.len(), indices);
        Ok(Self { pins })
    }

    /// Number of pins
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Always false; a group holds at least one pin
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Logical indices, in group order
    pub fn pins(&self) -> Vec<usize> {
        self.pins.iter().map(Gpio::pin).collect()
    }

    /// Set every pin to `direction`
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        for gpio in &mut self.pins {
            gpio.set_direction(direction)?;
        }
        Ok(())
    }

    /// Sample every pin
    pub fn read(&self) -> Result<Vec<bool>> {
        self.pins.iter().map(Gpio::read).collect()
    }

    /// Drive every pin; `values` needs one level per pin
    pub fn write(&mut self, values: &[bool]) -> Result<()> {
        if values.len() != self.pins.len() {
            return Err(Error::InvalidParameter);
        }
        for (gpio, &value) in self.pins.iter_mut().zip(values) {
            gpio.write(value)?;
        }
        Ok(())
    }

    /// The individual handles
    pub fn handles(&mut self) -> &mut [Gpio] {
        &mut self.pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GpioLine;
    use crate::mock::MockBackend;

    #[test]
    fn write_and_read_in_order() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut group = GpioGroup::open(&ctx, &[4, 5, 6]).unwrap();
        assert_eq!(group.pins(), vec![4, 5, 6]);
        group.set_direction(Direction::Out).unwrap();
        group.write(&[true, false, true]).unwrap();

        assert_eq!(backend.line_level(GpioLine::new(0, 4)), Some(true));
        assert_eq!(backend.line_level(GpioLine::new(0, 5)), Some(false));
        assert_eq!(backend.line_level(GpioLine::new(0, 6)), Some(true));
        assert_eq!(group.read().unwrap(), vec![true, false, true]);
    }

    #[test]
    fn inputs_sampled_together() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut group = GpioGroup::open(&ctx, &[7, 8]).unwrap();
        group.set_direction(Direction::In).unwrap();
        backend.drive_input(GpioLine::new(0, 8), true);
        assert_eq!(group.read().unwrap(), vec![false, true]);
    }

    #[test]
    fn value_count_must_match() {
        let ctx = MockBackend::new().context();
        let mut group = GpioGroup::open(&ctx, &[4, 5]).unwrap();
        group.set_direction(Direction::OutLow).unwrap();
        assert_eq!(group.write(&[true]).unwrap_err(), Error::InvalidParameter);
        assert_eq!(
            GpioGroup::open(&ctx, &[]).unwrap_err(),
            Error::InvalidParameter
        );
    }

    #[test]
    fn failed_open_releases_earlier_pins() {
        let ctx = MockBackend::new().context();
        let _held = Gpio::open(&ctx, 6).unwrap();
        assert_eq!(
            GpioGroup::open(&ctx, &[4, 5, 6]).unwrap_err(),
            Error::ResourceBusy
        );
        GpioGroup::open(&ctx, &[4, 5]).unwrap();
    }
}
