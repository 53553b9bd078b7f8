//! Board and pin descriptor types
//!
//! Descriptors are plain data. They are built once when the board table is
//! loaded and shared read-only (behind `Arc`) afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::capabilities::{Capabilities, Capability, Directions};

/// Known board families
///
/// The numeric values are stable and exposed to bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
#[repr(u32)]
pub enum PlatformType {
    /// Intel Galileo Gen 1
    GalileoGen1 = 0,
    /// Intel Galileo Gen 2
    GalileoGen2 = 1,
    /// Intel Edison on the Arduino breakout
    EdisonFabC = 2,
    /// Intel MinnowBoard MAX
    MinnowboardMax = 4,
    /// Raspberry Pi family
    RaspberryPi = 5,
    /// BeagleBone family
    Beaglebone = 6,
    /// UP board
    Up = 12,
    /// UP squared
    Up2 = 16,
    /// FTDI FT4222H USB bridge
    Ft4222 = 256,
    /// In-process simulated board
    Mock = 96,
    /// Board with no pins of its own that only hosts a sub-platform
    Null = 98,
    /// Unrecognised board
    Unknown = 99,
}

impl PlatformType {
    /// Numeric code
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// A kernel GPIO line: chip number and offset within the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize)]
pub struct GpioLine {
    /// GPIO chip number (`/dev/gpiochipN`)
    pub chip: u32,
    /// Line offset within the chip
    pub line: u32,
}

impl GpioLine {
    /// Create a line reference
    pub const fn new(chip: u32, line: u32) -> Self {
        Self { chip, line }
    }
}

impl core::fmt::Display for GpioLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "gpiochip{}:{}", self.chip, self.line)
    }
}

/// One mux control write: drive `line` to `level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct MuxAction {
    /// Control line to drive
    pub line: GpioLine,
    /// Level it must be driven to
    pub level: bool,
}

/// PWM channel behind a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub struct PwmRef {
    /// PWM chip number (`/sys/class/pwm/pwmchipN`)
    pub chip: u32,
    /// Channel within the chip
    pub channel: u32,
}

/// Analog channel behind a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub struct AioRef {
    /// IIO device number (`iio:deviceN`)
    pub device: u32,
    /// Voltage channel
    pub channel: u32,
}

/// Position of a pin inside a memory-mapped GPIO register page
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct MmapPin {
    /// Chip id of the owning [`MmapChip`]
    pub chip: u32,
    /// Bit position within the 32-bit registers
    pub bit: u8,
}

/// Register arrangement of a memory-mapped GPIO controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub enum RegisterLayout {
    /// Write-one-to-act set and clear registers, plus a level register
    SetClear {
        /// Offset of the level (input) register
        level: usize,
        /// Offset of the output set register
        set: usize,
        /// Offset of the output clear register
        clear: usize,
    },
    /// A data register that must be updated read-modify-write, and a
    /// register reflecting the pad levels
    Data {
        /// Offset of the output data register
        data: usize,
        /// Offset of the input level register (may equal `data`)
        input: usize,
    },
}

impl RegisterLayout {
    /// Offsets of every 32-bit register the layout touches
    pub fn registers(&self) -> Vec<usize> {
        match *self {
            RegisterLayout::SetClear { level, set, clear } => vec![level, set, clear],
            RegisterLayout::Data { data, input } => vec![data, input],
        }
    }
}

/// A GPIO controller whose registers can be mapped into the process
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct MmapChip {
    /// Chip id referenced by [`MmapPin::chip`]
    pub chip: u32,
    /// Device node to map (`/dev/gpiomem`, `/dev/uio0`, `/dev/mem`)
    pub device: String,
    /// Physical or device offset of the register page
    pub offset: u64,
    /// Size of the mapping in bytes
    pub size: usize,
    /// Register arrangement
    pub layout: RegisterLayout,
}

/// Static description of one logical pin
#[derive(Debug, Clone, PartialEq)]
pub struct PinDescriptor {
    /// Logical index
    pub index: usize,
    /// Board label
    pub name: String,
    /// Capabilities the pin legally supports
    pub capabilities: Capabilities,
    /// Kernel GPIO line, when the pin has one
    pub gpio: Option<GpioLine>,
    /// Directions the GPIO line supports
    pub directions: Directions,
    /// Whether the GPIO line can deliver edge interrupts
    pub interrupt: bool,
    /// Mux writes required before the pin can act as a given capability
    pub mux: BTreeMap<Capability, Vec<MuxAction>>,
    /// PWM channel
    pub pwm: Option<PwmRef>,
    /// Analog channel
    pub aio: Option<AioRef>,
    /// Memory-mapped fast path position
    pub mmap: Option<MmapPin>,
}

impl PinDescriptor {
    /// Check whether the pin supports a capability
    pub fn supports(&self, cap: Capability) -> bool {
        self.capabilities.supports(cap)
    }

    /// Mux actions for a capability (empty if none are needed)
    pub fn mux_actions(&self, cap: Capability) -> &[MuxAction] {
        self.mux.get(&cap).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// I2C bus as wired on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cBusDef {
    /// Kernel bus number (`/dev/i2c-N`)
    pub bus: u32,
    /// Logical pin carrying SDA, if it is a board pin
    pub sda: Option<usize>,
    /// Logical pin carrying SCL, if it is a board pin
    pub scl: Option<usize>,
}

/// SPI bus and chip select as wired on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiBusDef {
    /// Kernel bus number (`/dev/spidevB.C`)
    pub bus: u32,
    /// Chip select
    pub cs: u32,
    /// Logical pins carrying the bus signals
    pub pins: Vec<usize>,
}

/// UART as wired on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartDef {
    /// TTY device path
    pub device: String,
    /// Logical pin carrying RX
    pub rx: Option<usize>,
    /// Logical pin carrying TX
    pub tx: Option<usize>,
}

/// Analog converter resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdcDescriptor {
    /// Bits the hardware converter produces
    pub raw_bits: u8,
    /// Bits reported to callers by default
    pub supported_bits: u8,
}

/// PWM period bounds, in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PwmLimits {
    /// Shortest period
    pub min_us: u32,
    /// Longest period
    pub max_us: u32,
    /// Period programmed when a channel is opened
    pub default_us: u32,
}

/// Identifying marker used to recognise a board
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub enum Marker {
    /// Exact DMI board name
    BoardName(String),
    /// Substring of the device-tree model string
    DeviceTreeModel(String),
    /// Substring of the kernel command line
    CmdLine(String),
}

/// Marker values read from the running system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformMarkers {
    /// DMI board name
    pub board_name: Option<String>,
    /// Device-tree model string
    pub device_tree_model: Option<String>,
    /// Kernel command line
    pub cmdline: Option<String>,
}

impl PlatformMarkers {
    /// Whether a table marker matches these values
    pub fn matches(&self, marker: &Marker) -> bool {
        match marker {
            Marker::BoardName(name) => self
                .board_name
                .as_deref()
                .is_some_and(|v| v.trim() == name),
            Marker::DeviceTreeModel(model) => self
                .device_tree_model
                .as_deref()
                .is_some_and(|v| v.contains(model.as_str())),
            Marker::CmdLine(needle) => self
                .cmdline
                .as_deref()
                .is_some_and(|v| v.contains(needle.as_str())),
        }
    }
}

/// Complete description of a board
#[derive(Debug, Clone)]
pub struct PlatformDescriptor {
    /// Short table name (`galileo-gen2`, `mock`, ...)
    pub name: String,
    /// Vendor
    pub vendor: String,
    /// Model
    pub model: String,
    /// Revision, when the table distinguishes one
    pub revision: Option<String>,
    /// Board family
    pub platform_type: PlatformType,
    /// Markers that identify the board
    pub markers: Vec<Marker>,
    /// Pins, indexed by logical index
    pub pins: Vec<Arc<PinDescriptor>>,
    /// I2C buses
    pub i2c: Vec<I2cBusDef>,
    /// Index into `i2c` used when none is given
    pub default_i2c: usize,
    /// SPI buses
    pub spi: Vec<SpiBusDef>,
    /// UARTs
    pub uart: Vec<UartDef>,
    /// Analog converter resolution
    pub adc: AdcDescriptor,
    /// PWM period bounds
    pub pwm: PwmLimits,
    /// Memory-mappable GPIO controllers
    pub mmap: Vec<MmapChip>,
    /// Sub-platform adapters this board accepts
    pub subplatforms: Vec<String>,
}

impl PlatformDescriptor {
    /// Number of base pins
    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }

    /// Number of pins with GPIO capability
    pub fn gpio_count(&self) -> usize {
        self.pins
            .iter()
            .filter(|p| p.supports(Capability::Gpio))
            .count()
    }

    /// Find a mappable controller by chip id
    pub fn mmap_chip(&self, chip: u32) -> Option<&MmapChip> {
        self.mmap.iter().find(|m| m.chip == chip)
    }

    /// Display name: vendor and model
    pub fn display_name(&self) -> String {
        match &self.revision {
            Some(rev) => format!("{} {} ({})", self.vendor, self.model, rev),
            None => format!("{} {}", self.vendor, self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn board_name_marker_is_exact() {
        let markers = PlatformMarkers {
            board_name: Some("GalileoGen2\n".into()),
            ..Default::default()
        };
        assert!(markers.matches(&Marker::BoardName("GalileoGen2".into())));
        assert!(!markers.matches(&Marker::BoardName("Galileo".into())));
        assert!(!markers.matches(&Marker::CmdLine("Galileo".into())));
    }

    #[test]
    fn model_marker_is_substring() {
        let markers = PlatformMarkers {
            device_tree_model: Some("Raspberry Pi 4 Model B Rev 1.4".into()),
            ..Default::default()
        };
        assert!(markers.matches(&Marker::DeviceTreeModel("Raspberry Pi".into())));
    }
}
