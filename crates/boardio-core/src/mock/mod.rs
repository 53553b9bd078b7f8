//! In-memory backend
//!
//! [`MockBackend`] stands in for the kernel: GPIO lines with injectable
//! input levels and edge events, register pages, loopback SPI and UART,
//! simple I2C register devices, PWM channels and ADC channels. It pairs
//! with the built-in `mock` board table and is used by the test suite and
//! by the CLI's `--mock` flag.
//!
//! Clones share state, so a test keeps one clone to inspect and drive what
//! the context (holding another clone) does.

mod devices;
mod subplatform;

pub use devices::MockRegisterBlock;
pub use subplatform::{MockProbe, MockSubplatform};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::backend::{
    AioChannel, Backend, I2cDevice, LineHandle, PwmChannel, RegisterBlock, SpiDevice, UartPort,
};
use crate::board::{AioRef, BoardDatabase, GpioLine, MmapChip, PlatformMarkers, PwmRef};
use crate::error::{Error, Result};
use crate::gpio::{Direction, EdgeEvent, EdgeKind, Mode, OutputDrive};
use crate::registry::{PlatformConfig, PlatformContext};
use crate::subplatform::SubplatformProbe;

use devices::{MappedBlock, MockAio, MockI2c, MockLine, MockPwm, MockSpi, MockUart};

/// Name of the board table the mock backend is meant for
pub const MOCK_BOARD: &str = "mock";

#[derive(Debug, Default)]
pub(crate) struct LineState {
    pub(crate) requested: bool,
    pub(crate) retained: bool,
    pub(crate) direction: Option<Direction>,
    pub(crate) level: bool,
    pub(crate) mode: Mode,
    pub(crate) active_low: bool,
    pub(crate) drive: OutputDrive,
    pub(crate) seqno: u64,
    pub(crate) watcher: Option<mpsc::Sender<EdgeEvent>>,
}

#[derive(Debug)]
pub(crate) struct I2cTarget {
    pub(crate) registers: [u8; 256],
    pub(crate) pointer: u8,
}

impl I2cTarget {
    pub(crate) fn new() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
        }
    }
}

/// Register devices by bus and address
pub(crate) type I2cTargets = Arc<Mutex<HashMap<(u32, u16), I2cTarget>>>;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PwmState {
    pub(crate) period_ns: u64,
    pub(crate) duty_ns: u64,
    pub(crate) enabled: bool,
}

pub(crate) struct MockState {
    epoch: Instant,
    markers: Mutex<PlatformMarkers>,
    marker_reads: AtomicUsize,
    pub(crate) lines: Mutex<HashMap<GpioLine, LineState>>,
    mux_writes: Mutex<Vec<(GpioLine, bool)>>,
    mux_failures: Mutex<HashSet<GpioLine>>,
    registers: Mutex<HashMap<u32, MockRegisterBlock>>,
    pub(crate) mapped: AtomicUsize,
    pub(crate) i2c: I2cTargets,
    pub(crate) spi: Mutex<HashMap<u32, VecDeque<u8>>>,
    pub(crate) spi_byte_delay: Mutex<Duration>,
    pub(crate) uart: Mutex<HashMap<String, VecDeque<u8>>>,
    pub(crate) pwm: Mutex<HashMap<PwmRef, PwmState>>,
    pub(crate) aio: Mutex<HashMap<AioRef, u32>>,
}

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    pub(crate) fn timestamp_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Simulated kernel
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a backend with every line low and no devices
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                epoch: Instant::now(),
                markers: Mutex::new(PlatformMarkers::default()),
                marker_reads: AtomicUsize::new(0),
                lines: Mutex::new(HashMap::new()),
                mux_writes: Mutex::new(Vec::new()),
                mux_failures: Mutex::new(HashSet::new()),
                registers: Mutex::new(HashMap::new()),
                mapped: AtomicUsize::new(0),
                i2c: I2cTargets::default(),
                spi: Mutex::new(HashMap::new()),
                spi_byte_delay: Mutex::new(Duration::ZERO),
                uart: Mutex::new(HashMap::new()),
                pwm: Mutex::new(HashMap::new()),
                aio: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Configuration forcing the mock board with a short interrupt poll
    pub fn config() -> PlatformConfig {
        PlatformConfig::new()
            .with_board(MOCK_BOARD)
            .with_interrupt_poll(Duration::from_millis(10))
    }

    /// Context on the mock board, without sub-platform probes
    pub fn context(&self) -> PlatformContext {
        self.context_with_probes(Vec::new())
    }

    /// Context on the mock board with the given sub-platform probes
    pub fn context_with_probes(&self, probes: Vec<Box<dyn SubplatformProbe>>) -> PlatformContext {
        self.context_with(Self::config(), probes)
    }

    /// Context with an explicit configuration
    pub fn context_with(
        &self,
        config: PlatformConfig,
        probes: Vec<Box<dyn SubplatformProbe>>,
    ) -> PlatformContext {
        let database = BoardDatabase::with_builtin().unwrap_or_else(|e| {
            log::error!("mock: built-in board tables failed to load: {}", e);
            BoardDatabase::new()
        });
        PlatformContext::new(Arc::new(self.clone()), database, config, probes)
    }

    // ------------------------------------------------------------------
    // Platform markers
    // ------------------------------------------------------------------

    /// Set the markers reported to platform detection
    pub fn set_markers(&self, markers: PlatformMarkers) {
        *lock(&self.state.markers) = markers;
    }

    /// How many times the markers were read
    pub fn marker_reads(&self) -> usize {
        self.state.marker_reads.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // GPIO lines
    // ------------------------------------------------------------------

    /// Drive an input from the outside, producing an edge event when the
    /// level changes
    ///
    /// `level` is the electrical level; on an active-low line a high level
    /// reads as 0 and going high is reported as a falling edge.
    pub fn drive_input(&self, line: GpioLine, level: bool) {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(line).or_default();
        if entry.level == level {
            return;
        }
        entry.level = level;
        entry.seqno += 1;
        let event = EdgeEvent {
            kind: if level != entry.active_low {
                EdgeKind::Rising
            } else {
                EdgeKind::Falling
            },
            timestamp_ns: self.state.timestamp_ns(),
            seqno: entry.seqno,
        };
        let closed = entry
            .watcher
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_err());
        if closed {
            entry.watcher = None;
        }
    }

    /// Current level of a line
    pub fn line_level(&self, line: GpioLine) -> Option<bool> {
        lock(&self.state.lines).get(&line).map(|l| l.level)
    }

    /// Configured direction of a line
    pub fn line_direction(&self, line: GpioLine) -> Option<Direction> {
        lock(&self.state.lines).get(&line).and_then(|l| l.direction)
    }

    /// Pull mode of a line
    pub fn line_mode(&self, line: GpioLine) -> Option<Mode> {
        lock(&self.state.lines).get(&line).map(|l| l.mode)
    }

    /// Whether a line is configured active-low
    pub fn line_active_low(&self, line: GpioLine) -> bool {
        lock(&self.state.lines)
            .get(&line)
            .is_some_and(|l| l.active_low)
    }

    /// Output driver of a line
    pub fn line_drive(&self, line: GpioLine) -> Option<OutputDrive> {
        lock(&self.state.lines).get(&line).map(|l| l.drive)
    }

    /// Whether edges on a line are currently being watched
    pub fn line_watched(&self, line: GpioLine) -> bool {
        lock(&self.state.lines)
            .get(&line)
            .is_some_and(|l| l.watcher.is_some())
    }

    /// Whether a line is currently requested
    pub fn line_requested(&self, line: GpioLine) -> bool {
        lock(&self.state.lines)
            .get(&line)
            .is_some_and(|l| l.requested)
    }

    /// Whether a released line was kept requested
    pub fn line_retained(&self, line: GpioLine) -> bool {
        lock(&self.state.lines)
            .get(&line)
            .is_some_and(|l| l.retained)
    }

    // ------------------------------------------------------------------
    // Mux
    // ------------------------------------------------------------------

    /// Every mux write, in order
    pub fn mux_writes(&self) -> Vec<(GpioLine, bool)> {
        lock(&self.state.mux_writes).clone()
    }

    /// Last level written to a mux line
    pub fn mux_level(&self, line: GpioLine) -> Option<bool> {
        lock(&self.state.mux_writes)
            .iter()
            .rev()
            .find(|(l, _)| *l == line)
            .map(|(_, level)| *level)
    }

    /// Make writes to a mux line fail
    pub fn fail_mux_line(&self, line: GpioLine) {
        lock(&self.state.mux_failures).insert(line);
    }

    /// Let all mux writes succeed again
    pub fn clear_mux_failures(&self) {
        lock(&self.state.mux_failures).clear();
    }

    // ------------------------------------------------------------------
    // Register pages
    // ------------------------------------------------------------------

    /// Number of live register mappings
    pub fn mapped_regions(&self) -> usize {
        self.state.mapped.load(Ordering::SeqCst)
    }

    /// Read a register of a chip's page (0 if never mapped)
    pub fn register(&self, chip: u32, offset: usize) -> u32 {
        lock(&self.state.registers)
            .get(&chip)
            .map(|block| block.peek(offset))
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Buses and channels
    // ------------------------------------------------------------------

    /// Put a register device on an I2C bus
    pub fn add_i2c_device(&self, bus: u32, address: u16) {
        lock(&self.state.i2c).insert((bus, address), I2cTarget::new());
    }

    /// Register of an I2C device
    pub fn i2c_register(&self, bus: u32, address: u16, register: u8) -> Option<u8> {
        lock(&self.state.i2c)
            .get(&(bus, address))
            .map(|t| t.registers[register as usize])
    }

    /// Delay between bytes of an SPI transfer
    ///
    /// Transfers shift their bytes through a per-bus FIFO one at a time, so
    /// with a delay, unsynchronised concurrent transfers visibly mix.
    pub fn set_spi_byte_delay(&self, delay: Duration) {
        *lock(&self.state.spi_byte_delay) = delay;
    }

    /// Bytes written to a UART and not read back yet
    pub fn uart_pending(&self, path: &str) -> usize {
        lock(&self.state.uart).get(path).map_or(0, VecDeque::len)
    }

    /// Whether a PWM channel is enabled
    pub fn pwm_enabled(&self, pwm: PwmRef) -> Option<bool> {
        lock(&self.state.pwm).get(&pwm).map(|p| p.enabled)
    }

    /// Period and duty time of a PWM channel, in ns
    pub fn pwm_timing(&self, pwm: PwmRef) -> Option<(u64, u64)> {
        lock(&self.state.pwm)
            .get(&pwm)
            .map(|p| (p.period_ns, p.duty_ns))
    }

    /// Set the raw sample an ADC channel returns
    pub fn set_aio_value(&self, aio: AioRef, value: u32) {
        lock(&self.state.aio).insert(aio, value);
    }
}

impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn markers(&self) -> PlatformMarkers {
        self.state.marker_reads.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.markers).clone()
    }

    fn request_line(&self, line: GpioLine, consumer: &str) -> Result<Box<dyn LineHandle>> {
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(line).or_default();
        if entry.requested && !entry.retained {
            log::debug!("mock: {} already requested", line);
            return Err(Error::ResourceBusy);
        }
        entry.requested = true;
        entry.retained = false;
        log::trace!("mock: {} requested by {}", line, consumer);
        Ok(Box::new(MockLine::new(self.state.clone(), line)))
    }

    fn write_mux(&self, line: GpioLine, level: bool) -> Result<()> {
        if lock(&self.state.mux_failures).contains(&line) {
            return Err(Error::IoFailure);
        }
        lock(&self.state.mux_writes).push((line, level));
        let mut lines = lock(&self.state.lines);
        let entry = lines.entry(line).or_default();
        entry.direction = Some(Direction::Out);
        entry.level = level;
        Ok(())
    }

    fn map_registers(&self, chip: &MmapChip) -> Result<Box<dyn RegisterBlock>> {
        let block = lock(&self.state.registers)
            .entry(chip.chip)
            .or_insert_with(|| MockRegisterBlock::new(chip.size, chip.layout))
            .clone();
        Ok(Box::new(MappedBlock::new(self.state.clone(), block)))
    }

    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cDevice>> {
        Ok(Box::new(MockI2c::new(self.state.i2c.clone(), bus)))
    }

    fn open_spi(&self, bus: u32, cs: u32) -> Result<Box<dyn SpiDevice>> {
        Ok(Box::new(MockSpi::new(self.state.clone(), bus, cs)))
    }

    fn open_uart(&self, device: &str) -> Result<Box<dyn UartPort>> {
        Ok(Box::new(MockUart::new(self.state.clone(), device)))
    }

    fn open_pwm(&self, pwm: PwmRef) -> Result<Box<dyn PwmChannel>> {
        lock(&self.state.pwm).entry(pwm).or_default();
        Ok(Box::new(MockPwm::new(self.state.clone(), pwm)))
    }

    fn open_aio(&self, aio: AioRef) -> Result<Box<dyn AioChannel>> {
        Ok(Box::new(MockAio::new(self.state.clone(), aio)))
    }
}

impl core::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockBackend")
            .field("mapped", &self.mapped_regions())
            .finish()
    }
}
