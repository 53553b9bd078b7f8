//! Memory-mapped GPIO register access
//!
//! An [`MmapRegion`] wraps the mapped register page of one GPIO controller.
//! All fast-path handles on that controller share one region through an
//! `Arc`; the mapping goes away with the last handle.

use std::sync::{Mutex, PoisonError};

use crate::backend::RegisterBlock;
use crate::board::{MmapChip, RegisterLayout};

/// Shared mapping of one GPIO controller's registers
pub struct MmapRegion {
    chip: u32,
    device: String,
    layout: RegisterLayout,
    block: Box<dyn RegisterBlock>,
    // Serialises read-modify-write sequences on the data register
    rmw: Mutex<()>,
}

impl MmapRegion {
    pub(crate) fn new(chip: &MmapChip, block: Box<dyn RegisterBlock>) -> Self {
        Self {
            chip: chip.chip,
            device: chip.device.clone(),
            layout: chip.layout,
            block,
            rmw: Mutex::new(()),
        }
    }

    /// Chip id
    pub fn chip(&self) -> u32 {
        self.chip
    }

    /// Mapped device node
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Drive one output bit
    pub fn write_bit(&self, bit: u8, value: bool) {
        let mask = 1u32 << bit;
        match self.layout {
            RegisterLayout::SetClear { set, clear, .. } => {
                // Write-one-to-act registers touch only the masked bit.
                self.block.write32(if value { set } else { clear }, mask);
            }
            RegisterLayout::Data { data, .. } => {
                let _guard = self.rmw.lock().unwrap_or_else(PoisonError::into_inner);
                let current = self.block.read32(data);
                let next = if value { current | mask } else { current & !mask };
                self.block.write32(data, next);
            }
        }
    }

    /// Sample one bit of the level register
    pub fn read_bit(&self, bit: u8) -> bool {
        let offset = match self.layout {
            RegisterLayout::SetClear { level, .. } => level,
            RegisterLayout::Data { input, .. } => input,
        };
        self.block.read32(offset) & (1u32 << bit) != 0
    }
}

impl core::fmt::Debug for MmapRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MmapRegion")
            .field("chip", &self.chip)
            .field("device", &self.device)
            .field("layout", &self.layout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRegisterBlock;

    fn chip(layout: RegisterLayout) -> MmapChip {
        MmapChip {
            chip: 0,
            device: "test".into(),
            offset: 0,
            size: 0x100,
            layout,
        }
    }

    #[test]
    fn set_clear_layout() {
        let layout = RegisterLayout::SetClear {
            level: 0x0,
            set: 0x4,
            clear: 0x8,
        };
        let block = MockRegisterBlock::new(0x100, layout);
        let region = MmapRegion::new(&chip(layout), Box::new(block.clone()));

        region.write_bit(3, true);
        region.write_bit(5, true);
        assert!(region.read_bit(3));
        assert!(region.read_bit(5));
        region.write_bit(3, false);
        assert!(!region.read_bit(3));
        assert_eq!(block.peek(0x0), 1 << 5);
    }

    #[test]
    fn data_layout_preserves_other_bits() {
        let layout = RegisterLayout::Data { data: 0x0, input: 0x0 };
        let block = MockRegisterBlock::new(0x100, layout);
        block.poke(0x0, 0xF0);
        let region = MmapRegion::new(&chip(layout), Box::new(block.clone()));

        region.write_bit(0, true);
        region.write_bit(4, false);
        assert_eq!(block.peek(0x0), 0xE1);
        assert!(region.read_bit(0));
        assert!(!region.read_bit(4));
    }
}
