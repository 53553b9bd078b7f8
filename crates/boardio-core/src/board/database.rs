//! Board database for built-in and runtime-loaded board tables
//!
//! Each RON file describes one board. Built-in tables are compiled into the
//! crate; additional files can be loaded at run time and replace built-in
//! entries with the same name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use ron::extensions::Extensions;

use super::capabilities::{Capabilities, Capability, Directions};
use super::types::*;

/// Built-in board tables
const BUILTIN_BOARDS: &[(&str, &str)] = &[
    ("mock.ron", include_str!("../../boards/mock.ron")),
    ("galileo-gen2.ron", include_str!("../../boards/galileo-gen2.ron")),
    ("raspberry-pi.ron", include_str!("../../boards/raspberry-pi.ron")),
    ("null.ron", include_str!("../../boards/null.ron")),
];

/// Error type for board database operations
#[derive(Debug, thiserror::Error)]
pub enum BoardDbError {
    /// I/O error reading files
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// RON parsing error
    #[error("parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
    /// Table is syntactically valid but inconsistent
    #[error("board '{board}': {message}")]
    Validation {
        /// Board the error was found in
        board: String,
        /// What is wrong
        message: String,
    },
}

// ============================================================================
// RON deserialization types (intermediate format)
// ============================================================================

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct AdcDef {
    raw_bits: u8,
    supported_bits: u8,
}

impl Default for AdcDef {
    fn default() -> Self {
        Self {
            raw_bits: 10,
            supported_bits: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct PwmDef {
    min_us: u32,
    max_us: u32,
    default_us: u32,
}

impl Default for PwmDef {
    fn default() -> Self {
        Self {
            min_us: 1,
            max_us: 1_000_000,
            default_us: 5000,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct I2cDef {
    bus: u32,
    #[serde(default)]
    sda: Option<usize>,
    #[serde(default)]
    scl: Option<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct SpiDef {
    bus: u32,
    cs: u32,
    #[serde(default)]
    pins: Vec<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct UartDefRon {
    device: String,
    #[serde(default)]
    rx: Option<usize>,
    #[serde(default)]
    tx: Option<usize>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PinDef {
    name: String,
    caps: Vec<Capability>,
    #[serde(default)]
    gpio: Option<GpioLine>,
    #[serde(default)]
    input_only: bool,
    #[serde(default)]
    output_only: bool,
    #[serde(default)]
    interrupt: bool,
    #[serde(default)]
    mux: BTreeMap<Capability, Vec<MuxAction>>,
    #[serde(default)]
    pwm: Option<PwmRef>,
    #[serde(default)]
    aio: Option<AioRef>,
    #[serde(default)]
    mmap: Option<MmapPin>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct BoardDef {
    name: String,
    vendor: String,
    model: String,
    #[serde(default)]
    revision: Option<String>,
    platform_type: PlatformType,
    #[serde(default)]
    markers: Vec<Marker>,
    #[serde(default)]
    adc: AdcDef,
    #[serde(default)]
    pwm: PwmDef,
    #[serde(default)]
    mmap: Vec<MmapChip>,
    #[serde(default)]
    i2c: Vec<I2cDef>,
    #[serde(default)]
    default_i2c: usize,
    #[serde(default)]
    spi: Vec<SpiDef>,
    #[serde(default)]
    uart: Vec<UartDefRon>,
    #[serde(default)]
    subplatforms: Vec<String>,
    pins: Vec<PinDef>,
}

impl BoardDef {
    fn invalid(&self, message: impl Into<String>) -> BoardDbError {
        BoardDbError::Validation {
            board: self.name.clone(),
            message: message.into(),
        }
    }

    fn check_pin_ref(&self, what: &str, pin: Option<usize>) -> Result<(), BoardDbError> {
        match pin {
            Some(p) if p >= self.pins.len() => {
                Err(self.invalid(format!("{} refers to pin {} which does not exist", what, p)))
            }
            _ => Ok(()),
        }
    }

    fn validate(&self) -> Result<(), BoardDbError> {
        for (i, pin) in self.pins.iter().enumerate() {
            if pin.caps.is_empty() {
                return Err(self.invalid(format!("pin {} ({}) has no capabilities", i, pin.name)));
            }
            if pin.caps.contains(&Capability::Gpio) && pin.gpio.is_none() {
                return Err(self.invalid(format!("pin {} is GPIO capable but has no line", i)));
            }
            if pin.caps.contains(&Capability::Pwm) && pin.pwm.is_none() {
                return Err(self.invalid(format!("pin {} is PWM capable but has no channel", i)));
            }
            if pin.caps.contains(&Capability::Aio) && pin.aio.is_none() {
                return Err(self.invalid(format!("pin {} is AIO capable but has no channel", i)));
            }
            if pin.input_only && pin.output_only {
                return Err(self.invalid(format!("pin {} is both input-only and output-only", i)));
            }
            if let Some(m) = pin.mmap {
                if !self.mmap.iter().any(|c| c.chip == m.chip) {
                    return Err(self.invalid(format!("pin {} maps to unknown mmap chip {}", i, m.chip)));
                }
                if m.bit >= 32 {
                    return Err(self.invalid(format!("pin {} mmap bit {} out of range", i, m.bit)));
                }
            }
            for cap in pin.mux.keys() {
                if !pin.caps.contains(cap) {
                    return Err(self.invalid(format!("pin {} has mux entries for unsupported {}", i, cap)));
                }
            }
        }

        for (i, chip) in self.mmap.iter().enumerate() {
            if self.mmap[..i].iter().any(|c| c.chip == chip.chip) {
                return Err(self.invalid(format!("mmap chip {} defined twice", chip.chip)));
            }
            for register in chip.layout.registers() {
                if register % 4 != 0 || register + 4 > chip.size {
                    return Err(self.invalid(format!(
                        "mmap chip {} register {:#x} outside its {:#x} byte page",
                        chip.chip, register, chip.size
                    )));
                }
            }
        }

        for bus in &self.i2c {
            self.check_pin_ref("i2c sda", bus.sda)?;
            self.check_pin_ref("i2c scl", bus.scl)?;
        }
        if !self.i2c.is_empty() && self.default_i2c >= self.i2c.len() {
            return Err(self.invalid("default_i2c out of range"));
        }
        for bus in &self.spi {
            for pin in &bus.pins {
                self.check_pin_ref("spi", Some(*pin))?;
            }
        }
        for uart in &self.uart {
            self.check_pin_ref("uart rx", uart.rx)?;
            self.check_pin_ref("uart tx", uart.tx)?;
        }

        if self.adc.raw_bits == 0 || self.adc.raw_bits > 32 {
            return Err(self.invalid("adc raw_bits must be 1..=32"));
        }
        if self.adc.supported_bits == 0 || self.adc.supported_bits > 32 {
            return Err(self.invalid("adc supported_bits must be 1..=32"));
        }
        if self.pwm.min_us > self.pwm.max_us
            || self.pwm.default_us < self.pwm.min_us
            || self.pwm.default_us > self.pwm.max_us
        {
            return Err(self.invalid("pwm limits are inconsistent"));
        }

        Ok(())
    }

    fn into_descriptor(self) -> PlatformDescriptor {
        let pins = self
            .pins
            .into_iter()
            .enumerate()
            .map(|(index, def)| {
                let directions = if def.input_only {
                    Directions::INPUT
                } else if def.output_only {
                    Directions::OUTPUT
                } else {
                    Directions::default()
                };
                Arc::new(PinDescriptor {
                    index,
                    name: def.name,
                    capabilities: def.caps.into_iter().collect::<Capabilities>(),
                    gpio: def.gpio,
                    directions,
                    interrupt: def.interrupt,
                    mux: def.mux,
                    pwm: def.pwm,
                    aio: def.aio,
                    mmap: def.mmap,
                })
            })
            .collect();

        PlatformDescriptor {
            name: self.name,
            vendor: self.vendor,
            model: self.model,
            revision: self.revision,
            platform_type: self.platform_type,
            markers: self.markers,
            pins,
            i2c: self
                .i2c
                .into_iter()
                .map(|b| I2cBusDef {
                    bus: b.bus,
                    sda: b.sda,
                    scl: b.scl,
                })
                .collect(),
            default_i2c: self.default_i2c,
            spi: self
                .spi
                .into_iter()
                .map(|b| SpiBusDef {
                    bus: b.bus,
                    cs: b.cs,
                    pins: b.pins,
                })
                .collect(),
            uart: self
                .uart
                .into_iter()
                .map(|u| UartDef {
                    device: u.device,
                    rx: u.rx,
                    tx: u.tx,
                })
                .collect(),
            adc: AdcDescriptor {
                raw_bits: self.adc.raw_bits,
                supported_bits: self.adc.supported_bits,
            },
            pwm: PwmLimits {
                min_us: self.pwm.min_us,
                max_us: self.pwm.max_us,
                default_us: self.pwm.default_us,
            },
            mmap: self.mmap,
            subplatforms: self.subplatforms,
        }
    }
}

// ============================================================================
// Board database
// ============================================================================

/// Runtime board database
///
/// Holds board descriptors in load order. Detection walks them in that order.
#[derive(Debug, Clone, Default)]
pub struct BoardDatabase {
    boards: Vec<Arc<PlatformDescriptor>>,
}

impl BoardDatabase {
    /// Create an empty board database
    pub fn new() -> Self {
        Self { boards: Vec::new() }
    }

    /// Create a database holding the built-in board tables
    pub fn with_builtin() -> Result<Self, BoardDbError> {
        let mut db = Self::new();
        for (file, content) in BUILTIN_BOARDS {
            db.load_ron(content).map_err(|e| {
                log::error!("board: built-in table {} is broken: {}", file, e);
                e
            })?;
        }
        Ok(db)
    }

    /// Load one board definition from a RON string
    ///
    /// Returns the number of boards loaded (always 1 on success).
    pub fn load_ron(&mut self, content: &str) -> Result<usize, BoardDbError> {
        let def: BoardDef = ron::Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .from_str(content)?;
        def.validate()?;

        let board = Arc::new(def.into_descriptor());
        log::debug!(
            "board: loaded '{}' ({} pins)",
            board.name,
            board.pin_count()
        );

        match self.boards.iter().position(|b| b.name == board.name) {
            Some(pos) => {
                log::debug!("board: '{}' replaces an earlier definition", board.name);
                self.boards[pos] = board;
            }
            None => self.boards.push(board),
        }
        Ok(1)
    }

    /// Load a board definition from a single RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, BoardDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load all RON files from a directory
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize, BoardDbError> {
        let mut total = 0;

        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "ron"))
            .collect();
        paths.sort();

        for path in paths {
            total += self.load_file(&path)?;
        }

        Ok(total)
    }

    /// Load a file or every RON file in a directory
    pub fn load_path(&mut self, path: &Path) -> Result<usize, BoardDbError> {
        if path.is_dir() {
            self.load_dir(path)
        } else {
            self.load_file(path)
        }
    }

    /// Find a board by table name (case-insensitive)
    pub fn find_by_name(&self, name: &str) -> Option<Arc<PlatformDescriptor>> {
        self.boards
            .iter()
            .find(|b| b.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Find the first board whose markers match the running system
    pub fn detect(&self, markers: &PlatformMarkers) -> Option<Arc<PlatformDescriptor>> {
        self.boards
            .iter()
            .find(|b| b.markers.iter().any(|m| markers.matches(m)))
            .cloned()
    }

    /// Get the number of boards in the database
    pub fn len(&self) -> usize {
        self.boards.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Iterate over all boards
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PlatformDescriptor>> {
        self.boards.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_ron() {
        let ron = r#"
        (
            name: "tiny",
            vendor: "Acme",
            model: "Tiny",
            platform_type: Unknown,
            markers: [BoardName("TINY-1")],
            pins: [
                (name: "P0", caps: [Gpio], gpio: (chip: 0, line: 4), interrupt: true),
                (
                    name: "P1",
                    caps: [Gpio, Pwm],
                    gpio: (chip: 0, line: 5),
                    pwm: (chip: 1, channel: 0),
                    mux: { Pwm: [(line: (chip: 2, line: 0), level: true)] },
                ),
            ],
        )
        "#;

        let mut db = BoardDatabase::new();
        let count = db.load_ron(ron).unwrap();
        assert_eq!(count, 1);
        assert_eq!(db.len(), 1);

        let board = db.find_by_name("TINY").unwrap();
        assert_eq!(board.vendor, "Acme");
        assert_eq!(board.pin_count(), 2);
        assert_eq!(board.gpio_count(), 2);
        assert_eq!(board.adc.raw_bits, 10);
        assert_eq!(board.pwm.default_us, 5000);

        let p1 = &board.pins[1];
        assert_eq!(p1.index, 1);
        assert!(p1.supports(Capability::Pwm));
        assert_eq!(p1.pwm, Some(PwmRef { chip: 1, channel: 0 }));
        assert_eq!(p1.mux_actions(Capability::Pwm).len(), 1);
        assert!(p1.mux_actions(Capability::Gpio).is_empty());
        assert!(!p1.interrupt);
    }

    #[test]
    fn builtin_tables_load() {
        let db = BoardDatabase::with_builtin().unwrap();
        let mock = db.find_by_name("mock").unwrap();
        assert_eq!(mock.platform_type, PlatformType::Mock);
        assert_eq!(mock.pin_count(), 14);
        assert_eq!(mock.gpio_count(), 14);

        let galileo = db.find_by_name("galileo-gen2").unwrap();
        assert_eq!(galileo.pin_count(), 20);
        assert_eq!(galileo.pwm.max_us, 41666);

        let null = db.find_by_name("null").unwrap();
        assert_eq!(null.pin_count(), 0);
    }

    #[test]
    fn every_builtin_pin_has_capabilities() {
        let db = BoardDatabase::with_builtin().unwrap();
        for board in db.iter() {
            for pin in &board.pins {
                assert!(!pin.capabilities.is_empty(), "{} {}", board.name, pin.name);
            }
        }
    }

    #[test]
    fn detect_by_marker() {
        let db = BoardDatabase::with_builtin().unwrap();
        let markers = PlatformMarkers {
            board_name: Some("SIMATIC IOT2000".into()),
            ..Default::default()
        };
        assert_eq!(db.detect(&markers).unwrap().name, "galileo-gen2");

        let markers = PlatformMarkers {
            device_tree_model: Some("Raspberry Pi 3 Model B Plus Rev 1.3".into()),
            ..Default::default()
        };
        assert_eq!(db.detect(&markers).unwrap().name, "raspberry-pi");

        assert!(db.detect(&PlatformMarkers::default()).is_none());
    }

    #[test]
    fn later_definition_replaces_earlier() {
        let mut db = BoardDatabase::with_builtin().unwrap();
        let before = db.len();
        db.load_ron(
            r#"(name: "mock", vendor: "Other", model: "Replacement", platform_type: Mock,
                pins: [(name: "X", caps: [Gpio], gpio: (chip: 0, line: 0))])"#,
        )
        .unwrap();
        assert_eq!(db.len(), before);
        assert_eq!(db.find_by_name("mock").unwrap().vendor, "Other");
    }

    #[test]
    fn rejects_pin_without_capabilities() {
        let mut db = BoardDatabase::new();
        let err = db
            .load_ron(r#"(name: "bad", vendor: "x", model: "x", platform_type: Unknown, pins: [(name: "P0", caps: [])])"#)
            .unwrap_err();
        assert!(matches!(err, BoardDbError::Validation { .. }));
    }

    #[test]
    fn rejects_dangling_bus_pin() {
        let mut db = BoardDatabase::new();
        let err = db
            .load_ron(
                r#"(name: "bad", vendor: "x", model: "x", platform_type: Unknown,
                    i2c: [(bus: 0, sda: 7)],
                    pins: [(name: "P0", caps: [Gpio], gpio: (chip: 0, line: 0))])"#,
            )
            .unwrap_err();
        assert!(matches!(err, BoardDbError::Validation { .. }));
    }

    #[test]
    fn rejects_mmap_register_outside_page() {
        let board = |layout: &str| {
            format!(
                r#"(name: "bad", vendor: "x", model: "x", platform_type: Unknown,
                    mmap: [(chip: 0, device: "/dev/gpiomem", offset: 0, size: 0x10, layout: {})],
                    pins: [(name: "P0", caps: [Gpio], gpio: (chip: 0, line: 0), mmap: (chip: 0, bit: 0))])"#,
                layout
            )
        };

        let mut db = BoardDatabase::new();
        db.load_ron(&board("SetClear(level: 0x0, set: 0x4, clear: 0xc)"))
            .unwrap();
        for layout in [
            "SetClear(level: 0x0, set: 0x4, clear: 0x10)",
            "Data(data: 0x2, input: 0x0)",
            "Data(data: 0x0, input: 0x100)",
        ] {
            let err = BoardDatabase::new().load_ron(&board(layout)).unwrap_err();
            assert!(matches!(err, BoardDbError::Validation { .. }), "{}", layout);
        }
    }

    #[test]
    fn rejects_duplicate_mmap_chip() {
        let mut db = BoardDatabase::new();
        let err = db
            .load_ron(
                r#"(name: "bad", vendor: "x", model: "x", platform_type: Unknown,
                    mmap: [
                        (chip: 0, device: "a", offset: 0, size: 0x10, layout: Data(data: 0, input: 4)),
                        (chip: 0, device: "b", offset: 0, size: 0x10, layout: Data(data: 0, input: 4)),
                    ],
                    pins: [(name: "P0", caps: [Gpio], gpio: (chip: 0, line: 0))])"#,
            )
            .unwrap_err();
        assert!(matches!(err, BoardDbError::Validation { .. }));
    }

    #[test]
    fn rejects_malformed_ron() {
        let mut db = BoardDatabase::new();
        assert!(matches!(
            db.load_ron("(name: "),
            Err(BoardDbError::Parse(_))
        ));
    }
}
