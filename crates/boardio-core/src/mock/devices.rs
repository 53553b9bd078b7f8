//! Per-resource objects handed out by the mock backend

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{lock, I2cTargets, MockState};
use crate::backend::{
    AioChannel, EdgeSource, I2cDevice, LineHandle, PwmChannel, RegisterBlock, SpiDevice, UartPort,
};
use crate::board::{AioRef, GpioLine, PwmRef, RegisterLayout};
use crate::bus::spi::SpiMode;
use crate::bus::uart::{FlowControl, UartMode};
use crate::error::{Error, Result};
use crate::gpio::{Direction, Edge, EdgeEvent, Mode, OutputDrive};

// ----------------------------------------------------------------------
// GPIO
// ----------------------------------------------------------------------

pub(crate) struct MockLine {
    state: Arc<MockState>,
    line: GpioLine,
}

impl MockLine {
    pub(crate) fn new(state: Arc<MockState>, line: GpioLine) -> Self {
        Self { state, line }
    }
}

// Levels are stored electrically; `active_low` inverts at the handle.
impl LineHandle for MockLine {
    fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(self.line).or_default();
        entry.direction = Some(direction);
        if direction.is_output() {
            entry.watcher = None;
        }
        if let Some(level) = direction.initial_level() {
            entry.level = level != entry.active_low;
        }
        Ok(())
    }

    fn read(&self) -> Result<bool> {
        Ok(lock(&self.state.lines)
            .get(&self.line)
            .is_some_and(|l| l.level != l.active_low))
    }

    fn write(&mut self, value: bool) -> Result<()> {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(self.line).or_default();
        if !entry.direction.is_some_and(Direction::is_output) {
            return Err(Error::IoFailure);
        }
        entry.level = value != entry.active_low;
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) -> Result<()> {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(self.line).or_default();
        entry.mode = mode;
        if mode == Mode::Hiz {
            entry.direction = Some(Direction::In);
        }
        Ok(())
    }

    fn set_active_low(&mut self, active_low: bool) -> Result<()> {
        lock(&self.state.lines).entry(self.line).or_default().active_low = active_low;
        Ok(())
    }

    fn set_drive(&mut self, drive: OutputDrive) -> Result<()> {
        lock(&self.state.lines).entry(self.line).or_default().drive = drive;
        Ok(())
    }

    fn watch_edges(&mut self, _edge: Edge) -> Result<Box<dyn EdgeSource>> {
        let (tx, rx) = mpsc::channel();
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(self.line).or_default();
        entry.direction = Some(Direction::In);
        entry.watcher = Some(tx);
        Ok(Box::new(MockEdgeSource { rx }))
    }

    fn unwatch_edges(&mut self) -> Result<()> {
        if let Some(entry) = lock(&self.state.lines).get_mut(&self.line) {
            entry.watcher = None;
        }
        Ok(())
    }

    fn release(self: Box<Self>, keep: bool) {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(self.line).or_default();
        entry.watcher = None;
        if keep {
            entry.retained = true;
        } else {
            entry.requested = false;
            entry.retained = false;
        }
    }
}

// Reports every edge; filtering by trigger happens in the dispatcher.
struct MockEdgeSource {
    rx: mpsc::Receiver<EdgeEvent>,
}

impl EdgeSource for MockEdgeSource {
    fn wait(&mut self, timeout: Duration) -> Result<Option<EdgeEvent>> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::RecvTimeoutError::Timeout) => Ok(None),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // Edge detection was turned off; behave like an idle line.
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}

// ----------------------------------------------------------------------
// Register pages
// ----------------------------------------------------------------------

/// Simulated GPIO register page
///
/// Clones share storage. With a set/clear layout, writes to the set and
/// clear registers update the level register the way the hardware does.
#[derive(Debug, Clone)]
pub struct MockRegisterBlock {
    words: Arc<Mutex<Vec<u32>>>,
    layout: RegisterLayout,
}

impl MockRegisterBlock {
    /// Create a zeroed page of `size` bytes
    pub fn new(size: usize, layout: RegisterLayout) -> Self {
        Self {
            words: Arc::new(Mutex::new(vec![0; size.div_ceil(4).max(1)])),
            layout,
        }
    }

    /// Read a register without side effects
    pub fn peek(&self, offset: usize) -> u32 {
        lock(&self.words).get(offset / 4).copied().unwrap_or(0)
    }

    /// Store a register without side effects
    pub fn poke(&self, offset: usize, value: u32) {
        if let Some(word) = lock(&self.words).get_mut(offset / 4) {
            *word = value;
        }
    }
}

impl RegisterBlock for MockRegisterBlock {
    fn read32(&self, offset: usize) -> u32 {
        self.peek(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut words = lock(&self.words);
        match self.layout {
            RegisterLayout::SetClear { level, set, clear } if offset == set || offset == clear => {
                if let Some(word) = words.get_mut(level / 4) {
                    if offset == set {
                        *word |= value;
                    } else {
                        *word &= !value;
                    }
                }
            }
            _ => {
                if let Some(word) = words.get_mut(offset / 4) {
                    *word = value;
                }
            }
        }
    }
}

// Counts live mappings so tests can observe unmapping.
pub(crate) struct MappedBlock {
    state: Arc<MockState>,
    block: MockRegisterBlock,
}

impl MappedBlock {
    pub(crate) fn new(state: Arc<MockState>, block: MockRegisterBlock) -> Self {
        state.mapped.fetch_add(1, Ordering::SeqCst);
        Self { state, block }
    }
}

impl RegisterBlock for MappedBlock {
    fn read32(&self, offset: usize) -> u32 {
        self.block.read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.block.write32(offset, value)
    }
}

impl Drop for MappedBlock {
    fn drop(&mut self) {
        self.state.mapped.fetch_sub(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------
// I2C
// ----------------------------------------------------------------------

pub(crate) struct MockI2c {
    targets: I2cTargets,
    bus: u32,
}

impl MockI2c {
    pub(crate) fn new(targets: I2cTargets, bus: u32) -> Self {
        Self { targets, bus }
    }
}

impl I2cDevice for MockI2c {
    fn write(&mut self, address: u16, data: &[u8]) -> Result<()> {
        let mut targets = lock(&self.targets);
        let target = targets
            .get_mut(&(self.bus, address))
            .ok_or(Error::IoFailure)?;
        if let Some((&pointer, values)) = data.split_first() {
            target.pointer = pointer;
            for &value in values {
                target.registers[target.pointer as usize] = value;
                target.pointer = target.pointer.wrapping_add(1);
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u16, buf: &mut [u8]) -> Result<usize> {
        let mut targets = lock(&self.targets);
        let target = targets
            .get_mut(&(self.bus, address))
            .ok_or(Error::IoFailure)?;
        for byte in buf.iter_mut() {
            *byte = target.registers[target.pointer as usize];
            target.pointer = target.pointer.wrapping_add(1);
        }
        Ok(buf.len())
    }

    fn write_read(&mut self, address: u16, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.write(address, write)?;
        self.read(address, read)?;
        Ok(())
    }
}

// ----------------------------------------------------------------------
// SPI
// ----------------------------------------------------------------------

pub(crate) struct MockSpi {
    state: Arc<MockState>,
    bus: u32,
    _cs: u32,
}

impl MockSpi {
    pub(crate) fn new(state: Arc<MockState>, bus: u32, cs: u32) -> Self {
        Self {
            state,
            bus,
            _cs: cs,
        }
    }
}

impl SpiDevice for MockSpi {
    fn set_mode(&mut self, _mode: SpiMode) -> Result<()> {
        Ok(())
    }

    fn set_lsb_first(&mut self, _lsb_first: bool) -> Result<()> {
        Ok(())
    }

    fn set_bits_per_word(&mut self, bits: u8) -> Result<()> {
        match bits {
            8 | 16 => Ok(()),
            _ => Err(Error::UnsupportedMode),
        }
    }

    fn set_speed_hz(&mut self, _hz: u32) -> Result<()> {
        Ok(())
    }

    fn transfer(&mut self, tx: &[u8], rx: &mut [u8], _speed_hz: u32, _bits: u8) -> Result<()> {
        let delay = *lock(&self.state.spi_byte_delay);
        for &byte in tx {
            lock(&self.state.spi)
                .entry(self.bus)
                .or_default()
                .push_back(byte);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
        let mut fifos = lock(&self.state.spi);
        let fifo = fifos.entry(self.bus).or_default();
        for byte in rx.iter_mut() {
            *byte = fifo.pop_front().ok_or(Error::IoFailure)?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// UART
// ----------------------------------------------------------------------

pub(crate) struct MockUart {
    state: Arc<MockState>,
    path: String,
}

impl MockUart {
    pub(crate) fn new(state: Arc<MockState>, path: &str) -> Self {
        Self {
            state,
            path: path.to_string(),
        }
    }

    fn with_buffer<R>(&self, f: impl FnOnce(&mut VecDeque<u8>) -> R) -> R {
        let mut buffers = lock(&self.state.uart);
        f(buffers.entry(self.path.clone()).or_default())
    }
}

impl UartPort for MockUart {
    fn set_baud_rate(&mut self, _baud: u32) -> Result<()> {
        Ok(())
    }

    fn set_mode(&mut self, _mode: UartMode) -> Result<()> {
        Ok(())
    }

    fn set_flow_control(&mut self, _flow: FlowControl) -> Result<()> {
        Ok(())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.with_buffer(|buf| buf.extend(data.iter().copied()));
        Ok(data.len())
    }

    // Returns what is buffered without waiting.
    fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        Ok(self.with_buffer(|buf| {
            let n = out.len().min(buf.len());
            for (dst, src) in out.iter_mut().zip(buf.drain(..n)) {
                *dst = src;
            }
            n
        }))
    }

    fn bytes_available(&self) -> Result<usize> {
        Ok(self.with_buffer(|buf| buf.len()))
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// ----------------------------------------------------------------------
// PWM
// ----------------------------------------------------------------------

pub(crate) struct MockPwm {
    state: Arc<MockState>,
    pwm: PwmRef,
}

impl MockPwm {
    pub(crate) fn new(state: Arc<MockState>, pwm: PwmRef) -> Self {
        Self { state, pwm }
    }

    fn with_channel<R>(&self, f: impl FnOnce(&mut super::PwmState) -> R) -> R {
        let mut channels = lock(&self.state.pwm);
        f(channels.entry(self.pwm).or_default())
    }
}

// Mirrors the sysfs rules: the duty time never exceeds the period.
impl PwmChannel for MockPwm {
    fn set_period_ns(&mut self, ns: u64) -> Result<()> {
        self.with_channel(|c| {
            if ns < c.duty_ns {
                return Err(Error::InvalidParameter);
            }
            c.period_ns = ns;
            Ok(())
        })
    }

    fn period_ns(&self) -> Result<u64> {
        Ok(self.with_channel(|c| c.period_ns))
    }

    fn set_duty_ns(&mut self, ns: u64) -> Result<()> {
        self.with_channel(|c| {
            if ns > c.period_ns {
                return Err(Error::InvalidParameter);
            }
            c.duty_ns = ns;
            Ok(())
        })
    }

    fn duty_ns(&self) -> Result<u64> {
        Ok(self.with_channel(|c| c.duty_ns))
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.with_channel(|c| c.enabled = enabled);
        Ok(())
    }

    fn is_enabled(&self) -> Result<bool> {
        Ok(self.with_channel(|c| c.enabled))
    }
}

// ----------------------------------------------------------------------
// AIO
// ----------------------------------------------------------------------

pub(crate) struct MockAio {
    state: Arc<MockState>,
    aio: AioRef,
}

impl MockAio {
    pub(crate) fn new(state: Arc<MockState>, aio: AioRef) -> Self {
        Self { state, aio }
    }
}

impl AioChannel for MockAio {
    fn read_raw(&mut self) -> Result<u32> {
        Ok(lock(&self.state.aio).get(&self.aio).copied().unwrap_or(0))
    }
}
