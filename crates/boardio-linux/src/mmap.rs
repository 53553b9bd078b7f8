//! Mapping GPIO controller registers into the process
//!
//! The register page comes from the device named in the board table:
//! `/dev/gpiomem` style nodes that expose only the GPIO block, or
//! `/dev/mem` with a physical offset.
//!
//! # Safety
//!
//! Accesses are single aligned 32-bit volatile loads and stores within the
//! mapped length; anything else is refused. Mapping `/dev/mem` needs root.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;

use boardio_core::backend::RegisterBlock;
use boardio_core::board::MmapChip;

use crate::error::{LinuxError, Result};

/// A mapped register page
pub struct LinuxRegisters {
    /// Start of the requested region (after the page offset)
    ptr: *mut u8,
    /// Length the caller asked for
    len: usize,
    /// Start and length of the whole mapping, for munmap
    base: *mut libc::c_void,
    map_size: usize,
}

// The mapping is process-wide memory; accesses are volatile and word-sized.
unsafe impl Send for LinuxRegisters {}
unsafe impl Sync for LinuxRegisters {}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

impl LinuxRegisters {
    /// Map `chip.size` bytes at `chip.offset` of `chip.device`
    pub fn map(chip: &MmapChip) -> Result<Self> {
        let error = |source| LinuxError::MemoryMap {
            path: chip.device.clone(),
            address: chip.offset,
            size: chip.size,
            source,
        };

        // O_SYNC for uncached access
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&chip.device)
            .map_err(error)?;

        let page_mask = page_size() - 1;
        let offset = (chip.offset as usize) & page_mask;
        let aligned = chip.offset & !(page_mask as u64);
        let map_size = (chip.size + offset + page_mask) & !page_mask;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                aligned as libc::off_t,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(error(std::io::Error::last_os_error()));
        }

        log::debug!(
            "mmap: chip {} mapped {:#x} bytes of {} at {:#x}",
            chip.chip,
            chip.size,
            chip.device,
            chip.offset
        );
        Ok(Self {
            ptr: unsafe { (base as *mut u8).add(offset) },
            len: chip.size,
            base,
            map_size,
        })
    }

    fn in_bounds(&self, offset: usize) -> bool {
        offset % 4 == 0 && offset + 4 <= self.len
    }
}

impl RegisterBlock for LinuxRegisters {
    fn read32(&self, offset: usize) -> u32 {
        if !self.in_bounds(offset) {
            log::error!("mmap: read at {:#x} outside {:#x}", offset, self.len);
            return 0;
        }
        unsafe { core::ptr::read_volatile(self.ptr.add(offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        if !self.in_bounds(offset) {
            log::error!("mmap: write at {:#x} outside {:#x}", offset, self.len);
            return;
        }
        unsafe { core::ptr::write_volatile(self.ptr.add(offset) as *mut u32, value) }
    }
}

impl Drop for LinuxRegisters {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base, self.map_size);
        }
    }
}
