//! Simulated sub-platform adapter and probe

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::devices::MockI2c;
use super::{lock, I2cTarget, I2cTargets};
use crate::backend::{EdgeSource, I2cDevice, LineHandle};
use crate::board::PlatformType;
use crate::error::{Error, Result};
use crate::gpio::{Direction, Edge};
use crate::subplatform::{SubplatformAdapter, SubplatformProbe};

#[derive(Debug, Default, Clone, Copy)]
struct AdapterLine {
    requested: bool,
    retained: bool,
    output: bool,
    level: bool,
}

/// An adapter with a fixed number of GPIO lines and no interrupts,
/// shaped like a USB GPIO expander, optionally with I2C buses
#[derive(Debug)]
pub struct MockSubplatform {
    name: String,
    lines: Arc<Mutex<Vec<AdapterLine>>>,
    i2c_buses: u32,
    i2c: I2cTargets,
}

impl MockSubplatform {
    /// Create an adapter called `name` with `lines` lines
    pub fn new(name: &str, lines: u32) -> Self {
        Self {
            name: name.to_string(),
            lines: Arc::new(Mutex::new(vec![AdapterLine::default(); lines as usize])),
            i2c_buses: 0,
            i2c: I2cTargets::default(),
        }
    }

    /// Offer `count` I2C buses
    pub fn with_i2c_buses(mut self, count: u32) -> Self {
        self.i2c_buses = count;
        self
    }

    /// Put a register device on one of the adapter's I2C buses
    pub fn add_i2c_device(&self, bus: u32, address: u16) {
        lock(&self.i2c).insert((bus, address), I2cTarget::new());
    }

    /// Register of a device on an adapter I2C bus
    pub fn i2c_register(&self, bus: u32, address: u16, register: u8) -> Option<u8> {
        lock(&self.i2c)
            .get(&(bus, address))
            .map(|t| t.registers[register as usize])
    }

    /// Whether adapter line `line` is requested by a live handle
    pub fn line_requested(&self, line: u32) -> bool {
        lock(&self.lines)
            .get(line as usize)
            .is_some_and(|l| l.requested && !l.retained)
    }

    /// Level of adapter line `line`
    pub fn level(&self, line: u32) -> Option<bool> {
        lock(&self.lines).get(line as usize).map(|l| l.level)
    }

    /// Drive an adapter line from the outside
    pub fn drive_input(&self, line: u32, level: bool) {
        if let Some(l) = lock(&self.lines).get_mut(line as usize) {
            l.level = level;
        }
    }
}

impl SubplatformAdapter for MockSubplatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform_type(&self) -> PlatformType {
        PlatformType::Ft4222
    }

    fn line_count(&self) -> u32 {
        lock(&self.lines).len() as u32
    }

    fn request_line(&self, line: u32, _consumer: &str) -> Result<Box<dyn LineHandle>> {
        let mut lines = lock(&self.lines);
        let entry = lines.get_mut(line as usize).ok_or(Error::InvalidResource)?;
        if entry.requested && !entry.retained {
            return Err(Error::ResourceBusy);
        }
        entry.requested = true;
        entry.retained = false;
        Ok(Box::new(MockAdapterLine {
            lines: self.lines.clone(),
            index: line as usize,
        }))
    }

    fn i2c_bus_count(&self) -> u32 {
        self.i2c_buses
    }

    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cDevice>> {
        if bus >= self.i2c_buses {
            return Err(Error::InvalidResource);
        }
        Ok(Box::new(MockI2c::new(self.i2c.clone(), bus)))
    }
}

struct MockAdapterLine {
    lines: Arc<Mutex<Vec<AdapterLine>>>,
    index: usize,
}

impl MockAdapterLine {
    fn with_line<R>(&self, f: impl FnOnce(&mut AdapterLine) -> R) -> Result<R> {
        let mut lines = lock(&self.lines);
        lines.get_mut(self.index).map(f).ok_or(Error::IoFailure)
    }
}

impl LineHandle for MockAdapterLine {
    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        self.with_line(|l| {
            l.output = direction.is_output();
            if let Some(level) = direction.initial_level() {
                l.level = level;
            }
        })
    }

    fn read(&self) -> Result<bool> {
        self.with_line(|l| l.level)
    }

    fn write(&mut self, value: bool) -> Result<()> {
        self.with_line(|l| {
            if !l.output {
                return Err(Error::IoFailure);
            }
            l.level = value;
            Ok(())
        })?
    }

    fn watch_edges(&mut self, _edge: Edge) -> Result<Box<dyn EdgeSource>> {
        Err(Error::InterruptUnsupported)
    }

    fn unwatch_edges(&mut self) -> Result<()> {
        Ok(())
    }

    fn release(self: Box<Self>, keep: bool) {
        let _ = self.with_line(|l| {
            if keep {
                l.retained = true;
            } else {
                l.requested = false;
                l.retained = false;
            }
        });
    }
}

/// Probe that finds a fixed adapter, or nothing
pub struct MockProbe {
    name: String,
    adapter: Option<Arc<dyn SubplatformAdapter>>,
    calls: Arc<AtomicUsize>,
}

impl MockProbe {
    /// A probe that never finds anything
    pub fn absent(name: &str) -> Self {
        Self {
            name: name.to_string(),
            adapter: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A probe that always finds `adapter`
    pub fn present(name: &str, adapter: Arc<dyn SubplatformAdapter>) -> Self {
        Self {
            name: name.to_string(),
            adapter: Some(adapter),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of `probe` calls
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl SubplatformProbe for MockProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self) -> Result<Option<Arc<dyn SubplatformAdapter>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.adapter.clone())
    }
}
