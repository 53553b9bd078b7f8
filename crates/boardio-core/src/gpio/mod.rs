//! GPIO controller
//!
//! A [`Gpio`] handle owns one physical line. Its life cycle is
//!
//! ```text
//! Unconfigured --set_direction--> Input | Output --register_interrupt--> armed
//! ```
//!
//! Reads need a configured input or an output that has been written; writes
//! need an output. The optional memory-mapped fast path replaces the kernel
//! round trip for `read`/`write` but leaves direction and interrupt handling
//! on the kernel interface.
//!
//! # Example
//!
//! ```ignore
//! use boardio_core::gpio::{Direction, Edge, Gpio};
//!
//! let mut led = Gpio::open(&ctx, 3)?;
//! led.set_direction(Direction::Out)?;
//! led.write(true)?;
//!
//! let mut button = Gpio::open(&ctx, 4)?;
//! button.register_interrupt(Edge::Falling, |event, _| {
//!     println!("pressed at {} ns", event.timestamp_ns);
//! })?;
//! ```

mod group;
mod mmap;

pub use group::GpioGroup;
pub use mmap::MmapRegion;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::LineHandle;
use crate::board::{Capabilities, Capability, Directions, GpioLine, PinDescriptor};
use crate::error::{Error, Result};
use crate::interrupt::{InterruptControl, InterruptDispatcher, InterruptRegistration};
use crate::registry::{PinOrigin, PlatformContext, ResolvedPin, Resource, ResourceClaim};

/// Consumer label used for kernel line requests
pub const CONSUMER: &str = "boardio";

/// Line direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input
    In,
    /// Output, level unspecified
    Out,
    /// Output, initially high
    OutHigh,
    /// Output, initially low
    OutLow,
}

impl Direction {
    /// Whether this is one of the output directions
    pub fn is_output(self) -> bool {
        !matches!(self, Direction::In)
    }

    /// Initial level for the output variants that specify one
    pub fn initial_level(self) -> Option<bool> {
        match self {
            Direction::OutHigh => Some(true),
            Direction::OutLow => Some(false),
            _ => None,
        }
    }
}

/// Pull resistor selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Driven high and low, no pull resistor
    #[default]
    Strong,
    /// Resistive high
    PullUp,
    /// Resistive low
    PullDown,
    /// High impedance input
    Hiz,
}

/// Logical polarity of an input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputMode {
    /// High reads as 1
    #[default]
    ActiveHigh,
    /// Low reads as 1
    ActiveLow,
}

/// Output driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputDrive {
    /// Drives both levels
    #[default]
    PushPull,
    /// Only pulls low; high is left to a pull-up
    OpenDrain,
}

/// Edge trigger selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// No edges (disarms an interrupt)
    None,
    /// Both edges
    Both,
    /// Low to high
    Rising,
    /// High to low
    Falling,
}

impl Edge {
    /// Whether an event of `kind` should be delivered for this trigger
    pub fn matches(self, kind: EdgeKind) -> bool {
        matches!(
            (self, kind),
            (Edge::Both, _) | (Edge::Rising, EdgeKind::Rising) | (Edge::Falling, EdgeKind::Falling)
        )
    }
}

/// Direction of an observed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Low to high
    Rising,
    /// High to low
    Falling,
}

/// One edge reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Edge direction
    pub kind: EdgeKind,
    /// Kernel timestamp in nanoseconds
    pub timestamp_ns: u64,
    /// Per-line sequence number
    pub seqno: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GpioState {
    Unconfigured,
    Input,
    Output { last: Option<bool> },
}

struct FastPath {
    region: Arc<MmapRegion>,
    bit: u8,
}

/// An open GPIO line
pub struct Gpio {
    ctx: PlatformContext,
    pin: ResolvedPin,
    line: Option<Box<dyn LineHandle>>,
    state: GpioState,
    owner: bool,
    fast: Option<FastPath>,
    active_low: bool,
    interrupt: Option<InterruptRegistration>,
    _claim: Option<ResourceClaim>,
}

impl Gpio {
    /// Open a pin as GPIO, owning the line
    pub fn open(ctx: &PlatformContext, index: usize) -> Result<Self> {
        Self::open_with_owner(ctx, index, true)
    }

    /// Open a pin as GPIO
    ///
    /// With `owner` false the handle does not claim the line exclusively and
    /// closing it leaves the kernel line requested, so its direction and
    /// level persist after the handle is gone.
    pub fn open_with_owner(ctx: &PlatformContext, index: usize, owner: bool) -> Result<Self> {
        let pin = ctx.resolve_pin(index)?;
        if !pin.descriptor.supports(Capability::Gpio) {
            log::debug!("gpio: pin {} ({}) has no GPIO function", index, pin.descriptor.name);
            return Err(Error::UnsupportedMode);
        }

        let resource = pin.line_resource().ok_or(Error::UnsupportedMode)?;
        // Non-owners hold the claim only while opening, so a bus cannot take
        // the pin over between the check and the line request.
        let claim = ctx.claim(vec![resource.clone()])?;

        ctx.apply_mux(&pin, Capability::Gpio)?;

        let line = match &pin.origin {
            PinOrigin::Base => {
                let gpio = pin.descriptor.gpio.ok_or(Error::UnsupportedMode)?;
                ctx.backend().request_line(gpio, CONSUMER)?
            }
            PinOrigin::Subplatform { adapter, line } => adapter.request_line(*line, CONSUMER)?,
        };

        log::debug!(
            "gpio: opened pin {} ({}) on {}{}",
            index,
            pin.descriptor.name,
            resource,
            if owner { "" } else { " (non-owner)" }
        );
        let claim = owner.then_some(claim);

        Ok(Self {
            ctx: ctx.clone(),
            pin,
            line: Some(line),
            state: GpioState::Unconfigured,
            owner,
            fast: None,
            active_low: false,
            interrupt: None,
            _claim: claim,
        })
    }

    /// Open a pin by its board label
    ///
    /// Sub-platform pins are found by their `<adapter>-<line>` names once
    /// the adapter is attached.
    pub fn open_by_name(ctx: &PlatformContext, name: &str) -> Result<Self> {
        let index = ctx.find_pin(name)?;
        Self::open(ctx, index)
    }

    /// Open a kernel line directly, bypassing the board table
    ///
    /// No mux is applied and the fast path is unavailable. The handle
    /// reports the line offset as its pin index.
    pub fn open_raw(ctx: &PlatformContext, line: GpioLine) -> Result<Self> {
        let descriptor = PinDescriptor {
            index: line.line as usize,
            name: line.to_string(),
            capabilities: Capabilities::GPIO,
            gpio: Some(line),
            directions: Directions::default(),
            interrupt: true,
            mux: BTreeMap::new(),
            pwm: None,
            aio: None,
            mmap: None,
        };
        let pin = ResolvedPin {
            descriptor: Arc::new(descriptor),
            origin: PinOrigin::Base,
        };
        let claim = ctx.claim(vec![Resource::Line(line)])?;
        let handle = ctx.backend().request_line(line, CONSUMER)?;
        log::debug!("gpio: opened {} (raw)", line);

        Ok(Self {
            ctx: ctx.clone(),
            pin,
            line: Some(handle),
            state: GpioState::Unconfigured,
            owner: true,
            fast: None,
            active_low: false,
            interrupt: None,
            _claim: Some(claim),
        })
    }

    /// Logical pin index (the line offset for raw lines)
    pub fn pin(&self) -> usize {
        self.pin.index()
    }

    /// Pin name
    pub fn name(&self) -> &str {
        &self.pin.descriptor.name
    }

    /// Kernel line, for base board pins
    pub fn line(&self) -> Option<GpioLine> {
        match self.pin.origin {
            PinOrigin::Base => self.pin.descriptor.gpio,
            PinOrigin::Subplatform { .. } => None,
        }
    }

    /// Whether closing this handle releases the kernel line
    pub fn is_owner(&self) -> bool {
        self.owner
    }

    fn line_mut(&mut self) -> Result<&mut Box<dyn LineHandle>> {
        self.line.as_mut().ok_or(Error::NotConfigured)
    }

    /// Set the line direction
    pub fn set_direction(&mut self, direction: Direction) -> Result<()> {
        let needed = if direction.is_output() {
            Directions::OUTPUT
        } else {
            Directions::INPUT
        };
        if !self.pin.descriptor.directions.contains(needed) {
            return Err(Error::UnsupportedDirection);
        }

        if direction.is_output() && self.interrupt.is_some() {
            log::debug!("gpio: pin {} switched to output, disarming interrupt", self.pin());
            self.unregister_interrupt()?;
        }

        self.line_mut()?.set_direction(direction)?;

        if let (Some(fast), Some(level)) = (&self.fast, direction.initial_level()) {
            fast.region.write_bit(fast.bit, level != self.active_low);
        }

        self.state = if direction.is_output() {
            GpioState::Output {
                last: direction.initial_level(),
            }
        } else {
            GpioState::Input
        };
        log::trace!("gpio: pin {} direction {:?}", self.pin(), direction);
        Ok(())
    }

    /// Current direction, if one has been set
    pub fn read_direction(&self) -> Option<Direction> {
        match self.state {
            GpioState::Unconfigured => None,
            GpioState::Input => Some(Direction::In),
            GpioState::Output { .. } => Some(Direction::Out),
        }
    }

    /// Read the line level
    ///
    /// Valid for inputs, and for outputs after a value has been written.
    pub fn read(&self) -> Result<bool> {
        match self.state {
            GpioState::Unconfigured | GpioState::Output { last: None } => {
                return Err(Error::NotConfigured)
            }
            _ => {}
        }

        if let Some(fast) = &self.fast {
            return Ok(fast.region.read_bit(fast.bit) != self.active_low);
        }
        self.line.as_ref().ok_or(Error::NotConfigured)?.read()
    }

    /// Drive the line level (outputs only)
    pub fn write(&mut self, value: bool) -> Result<()> {
        if !matches!(self.state, GpioState::Output { .. }) {
            return Err(Error::NotConfigured);
        }

        match &self.fast {
            Some(fast) => fast.region.write_bit(fast.bit, value != self.active_low),
            None => self.line_mut()?.write(value)?,
        }
        self.state = GpioState::Output { last: Some(value) };
        Ok(())
    }

    /// Select the pull resistor, or make the line a high impedance input
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        if mode == Mode::Hiz && !self.pin.descriptor.directions.contains(Directions::INPUT) {
            return Err(Error::UnsupportedDirection);
        }
        self.line_mut()?.set_mode(mode)?;
        if mode == Mode::Hiz {
            self.state = GpioState::Input;
        }
        log::trace!("gpio: pin {} mode {:?}", self.pin(), mode);
        Ok(())
    }

    /// Select the logical polarity
    ///
    /// Active-low inverts reads, writes and the initial level of
    /// `OutHigh`/`OutLow`, on the fast path as well.
    pub fn set_input_mode(&mut self, mode: InputMode) -> Result<()> {
        let active_low = mode == InputMode::ActiveLow;
        self.line_mut()?.set_active_low(active_low)?;
        self.active_low = active_low;
        log::trace!("gpio: pin {} {:?}", self.pin(), mode);
        Ok(())
    }

    /// Select push-pull or open-drain output
    pub fn set_output_drive(&mut self, drive: OutputDrive) -> Result<()> {
        self.line_mut()?.set_drive(drive)?;
        log::trace!("gpio: pin {} drive {:?}", self.pin(), drive);
        Ok(())
    }

    /// Switch reads and writes to the memory-mapped registers
    ///
    /// Fails with `UnsupportedMode` when the pin's controller cannot be
    /// mapped; the handle then keeps using the kernel interface.
    pub fn enable_mmap(&mut self, enable: bool) -> Result<()> {
        if !enable {
            if self.fast.take().is_some() {
                log::debug!("gpio: pin {} back on the kernel interface", self.pin());
            }
            return Ok(());
        }
        if self.fast.is_some() {
            return Ok(());
        }

        let mmap = match (&self.pin.origin, self.pin.descriptor.mmap) {
            (PinOrigin::Base, Some(mmap)) => mmap,
            _ => {
                log::debug!("gpio: pin {} has no mmap fast path", self.pin());
                return Err(Error::UnsupportedMode);
            }
        };

        let region = self.ctx.mmap_region(mmap.chip).map_err(|e| {
            log::warn!(
                "gpio: mapping chip {} for pin {} failed: {}",
                mmap.chip,
                self.pin(),
                e
            );
            e
        })?;
        log::debug!(
            "gpio: pin {} using {} bit {}",
            self.pin(),
            region.device(),
            mmap.bit
        );
        self.fast = Some(FastPath {
            region,
            bit: mmap.bit,
        });
        Ok(())
    }

    /// Whether the fast path is active
    pub fn mmap_enabled(&self) -> bool {
        self.fast.is_some()
    }

    /// Arm edge-triggered delivery to `callback`
    ///
    /// The line becomes an input. The callback runs on a dedicated thread,
    /// once per matching edge, in the order the kernel reported them.
    /// Registering again replaces the previous registration; `Edge::None`
    /// disarms.
    ///
    /// To stop delivery from inside the callback, call
    /// [`InterruptControl::unregister`] on the control it receives. Do not
    /// reach the handle itself from the callback (through an
    /// `Arc<Mutex<Gpio>>`, say): closing or unregistering the handle waits
    /// for the callback to return, so a thread holding that lock while doing
    /// so deadlocks against a callback waiting for the same lock.
    pub fn register_interrupt<F>(&mut self, edge: Edge, callback: F) -> Result<()>
    where
        F: FnMut(&EdgeEvent, &InterruptControl) + Send + 'static,
    {
        if !self.pin.descriptor.interrupt {
            return Err(Error::InterruptUnsupported);
        }
        if edge == Edge::None {
            return self.unregister_interrupt();
        }
        if !self.pin.descriptor.directions.contains(Directions::INPUT) {
            return Err(Error::UnsupportedDirection);
        }

        self.unregister_interrupt()?;

        let label = format!("gpio{}", self.pin());
        let dispatcher = InterruptDispatcher::new(self.ctx.interrupt_poll());
        let source = self.line_mut()?.watch_edges(edge)?;
        self.state = GpioState::Input;

        match dispatcher.arm(&label, edge, source, Box::new(callback)) {
            Ok(registration) => {
                log::debug!("gpio: pin {} armed for {:?} edges", self.pin(), edge);
                self.interrupt = Some(registration);
                Ok(())
            }
            Err(e) => {
                if let Err(unwatch) = self.line_mut()?.unwatch_edges() {
                    log::warn!("gpio: pin {} edge cleanup failed: {}", self.pin(), unwatch);
                }
                Err(e)
            }
        }
    }

    /// Stop edge delivery; a no-op when nothing is armed
    ///
    /// Waits for a callback that is running to return. From inside the
    /// callback use [`InterruptControl::unregister`] instead.
    pub fn unregister_interrupt(&mut self) -> Result<()> {
        let Some(registration) = self.interrupt.take() else {
            return Ok(());
        };
        registration.stop();
        self.line_mut()?.unwatch_edges()?;
        log::debug!("gpio: pin {} interrupt disarmed", self.pin());
        Ok(())
    }

    /// Whether an interrupt is armed and still delivering
    pub fn interrupt_armed(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(InterruptRegistration::is_active)
    }

    /// Close the handle
    ///
    /// Equivalent to dropping it.
    pub fn close(self) {}

    fn shutdown(&mut self) {
        if let Some(registration) = self.interrupt.take() {
            registration.stop();
        }
        self.fast = None;
        if let Some(line) = self.line.take() {
            line.release(!self.owner);
        }
        log::debug!("gpio: closed pin {}", self.pin());
    }
}

impl Drop for Gpio {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for Gpio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Gpio")
            .field("pin", &self.pin())
            .field("name", &self.name())
            .field("state", &self.state)
            .field("owner", &self.owner)
            .field("mmap", &self.fast.is_some())
            .field("interrupt", &self.interrupt.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockSubplatform};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn read_before_configuration_fails() {
        let ctx = MockBackend::new().context();
        let gpio = Gpio::open(&ctx, 0).unwrap();
        assert_eq!(gpio.read().unwrap_err(), Error::NotConfigured);
        assert_eq!(gpio.read_direction(), None);
    }

    #[test]
    fn write_to_input_fails() {
        let ctx = MockBackend::new().context();
        let mut gpio = Gpio::open(&ctx, 0).unwrap();
        gpio.set_direction(Direction::In).unwrap();
        assert_eq!(gpio.write(true).unwrap_err(), Error::NotConfigured);
    }

    #[test]
    fn output_reads_back_last_write() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut gpio = Gpio::open(&ctx, 1).unwrap();
        gpio.set_direction(Direction::Out).unwrap();
        assert_eq!(gpio.read().unwrap_err(), Error::NotConfigured);

        gpio.write(true).unwrap();
        assert!(gpio.read().unwrap());
        assert_eq!(backend.line_level(GpioLine::new(0, 1)), Some(true));

        gpio.write(false).unwrap();
        assert!(!gpio.read().unwrap());
    }

    #[test]
    fn out_high_sets_initial_level() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut gpio = Gpio::open(&ctx, 4).unwrap();
        gpio.set_direction(Direction::OutHigh).unwrap();
        assert!(gpio.read().unwrap());
        assert_eq!(gpio.read_direction(), Some(Direction::Out));
    }

    #[test]
    fn input_follows_external_level() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut gpio = Gpio::open(&ctx, 5).unwrap();
        gpio.set_direction(Direction::In).unwrap();
        assert!(!gpio.read().unwrap());
        backend.drive_input(GpioLine::new(0, 5), true);
        assert!(gpio.read().unwrap());
    }

    #[test]
    fn input_only_pin_rejects_output() {
        let ctx = MockBackend::new().context();
        let mut gpio = Gpio::open(&ctx, 9).unwrap();
        assert_eq!(
            gpio.set_direction(Direction::Out).unwrap_err(),
            Error::UnsupportedDirection
        );
        gpio.set_direction(Direction::In).unwrap();
    }

    #[test]
    fn second_owner_is_busy() {
        let ctx = MockBackend::new().context();
        let first = Gpio::open(&ctx, 2).unwrap();
        assert_eq!(Gpio::open(&ctx, 2).unwrap_err(), Error::ResourceBusy);
        drop(first);
        Gpio::open(&ctx, 2).unwrap();
    }

    #[test]
    fn non_owner_keeps_line_requested() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 6);

        let mut gpio = Gpio::open_with_owner(&ctx, 6, false).unwrap();
        assert!(!gpio.is_owner());
        gpio.set_direction(Direction::OutHigh).unwrap();
        drop(gpio);

        assert!(backend.line_retained(line));
        assert_eq!(backend.line_level(line), Some(true));

        // An owning open afterwards still works and sees the kept state.
        let mut again = Gpio::open(&ctx, 6).unwrap();
        again.set_direction(Direction::In).unwrap();
        assert!(again.read().unwrap());
    }

    #[test]
    fn owner_close_releases_line() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let gpio = Gpio::open(&ctx, 7).unwrap();
        assert!(backend.line_requested(GpioLine::new(0, 7)));
        gpio.close();
        assert!(!backend.line_requested(GpioLine::new(0, 7)));
        assert!(!backend.line_retained(GpioLine::new(0, 7)));
    }

    #[test]
    fn mux_applied_on_open() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let _gpio = Gpio::open(&ctx, 2).unwrap();
        assert_eq!(backend.mux_level(GpioLine::new(1, 0)), Some(false));
    }

    #[test]
    fn failing_mux_aborts_open_without_claim() {
        let backend = MockBackend::new();
        backend.fail_mux_line(GpioLine::new(1, 0));
        let ctx = backend.context();
        assert_eq!(
            Gpio::open(&ctx, 2).unwrap_err(),
            Error::MuxConfigurationFailed
        );
        assert!(!backend.line_requested(GpioLine::new(0, 2)));

        backend.clear_mux_failures();
        Gpio::open(&ctx, 2).unwrap();
    }

    #[test]
    fn index_beyond_board() {
        let ctx = MockBackend::new().context();
        assert_eq!(Gpio::open(&ctx, 30).unwrap_err(), Error::NoSubplatform);
    }

    #[test]
    fn mmap_fast_path() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut gpio = Gpio::open(&ctx, 1).unwrap();
        gpio.set_direction(Direction::Out).unwrap();
        gpio.enable_mmap(true).unwrap();
        assert!(gpio.mmap_enabled());

        gpio.write(true).unwrap();
        assert!(gpio.read().unwrap());
        assert_eq!(backend.register(0, 0x0) & (1 << 1), 1 << 1);

        gpio.enable_mmap(false).unwrap();
        assert!(!gpio.mmap_enabled());
        assert_eq!(backend.mapped_regions(), 0);
    }

    #[test]
    fn mmap_unsupported_falls_back() {
        let ctx = MockBackend::new().context();
        let mut gpio = Gpio::open(&ctx, 8).unwrap();
        gpio.set_direction(Direction::Out).unwrap();
        assert_eq!(gpio.enable_mmap(true).unwrap_err(), Error::UnsupportedMode);
        assert!(!gpio.mmap_enabled());
        gpio.write(true).unwrap();
        assert!(gpio.read().unwrap());
    }

    #[test]
    fn interrupt_on_pin_without_capability() {
        let ctx = MockBackend::new().context();
        let mut gpio = Gpio::open(&ctx, 8).unwrap();
        assert_eq!(
            gpio.register_interrupt(Edge::Both, |_, _| {}).unwrap_err(),
            Error::InterruptUnsupported
        );
    }

    #[test]
    fn interrupt_delivers_matching_edges() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 0);
        let mut gpio = Gpio::open(&ctx, 0).unwrap();

        let (tx, rx) = mpsc::channel();
        gpio.register_interrupt(Edge::Rising, move |event, _| {
            tx.send(*event).unwrap();
        })
        .unwrap();
        assert!(gpio.interrupt_armed());
        assert_eq!(gpio.read_direction(), Some(Direction::In));

        backend.drive_input(line, true);
        backend.drive_input(line, false);
        backend.drive_input(line, true);

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.kind, EdgeKind::Rising);
        assert_eq!(second.kind, EdgeKind::Rising);
        assert!(second.seqno > first.seqno);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        gpio.unregister_interrupt().unwrap();
        assert!(!gpio.interrupt_armed());
        backend.drive_input(line, false);
        backend.drive_input(line, true);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn unregister_unarmed_is_noop() {
        let ctx = MockBackend::new().context();
        let mut gpio = Gpio::open(&ctx, 0).unwrap();
        gpio.unregister_interrupt().unwrap();
        gpio.unregister_interrupt().unwrap();
    }

    #[test]
    fn reregistering_replaces_callback() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 3);
        let mut gpio = Gpio::open(&ctx, 3).unwrap();

        let (tx_a, rx_a) = mpsc::channel();
        gpio.register_interrupt(Edge::Both, move |e, _| tx_a.send(*e).unwrap())
            .unwrap();
        let (tx_b, rx_b) = mpsc::channel();
        gpio.register_interrupt(Edge::Both, move |e, _| tx_b.send(*e).unwrap())
            .unwrap();

        backend.drive_input(line, true);
        assert!(rx_b.recv_timeout(Duration::from_secs(2)).is_ok());
        assert!(rx_a.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn close_while_armed_stops_delivery() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 4);
        let mut gpio = Gpio::open(&ctx, 4).unwrap();

        let (tx, rx) = mpsc::channel();
        gpio.register_interrupt(Edge::Both, move |e, _| {
            let _ = tx.send(*e);
        })
        .unwrap();
        drop(gpio);

        backend.drive_input(line, true);
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        assert!(!backend.line_requested(line));
    }

    #[test]
    fn edge_none_disarms() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let mut gpio = Gpio::open(&ctx, 1).unwrap();
        gpio.register_interrupt(Edge::Both, |_, _| {}).unwrap();
        gpio.register_interrupt(Edge::None, |_, _| {}).unwrap();
        assert!(!gpio.interrupt_armed());
    }

    #[test]
    fn subplatform_line() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let adapter = Arc::new(MockSubplatform::new("mock", 2));
        ctx.attach_subplatform(adapter.clone()).unwrap();

        let mut gpio = Gpio::open(&ctx, 15).unwrap();
        assert_eq!(gpio.name(), "mock-1");
        assert_eq!(gpio.line(), None);
        gpio.set_direction(Direction::Out).unwrap();
        gpio.write(true).unwrap();
        assert_eq!(adapter.level(1), Some(true));
        assert_eq!(gpio.enable_mmap(true).unwrap_err(), Error::UnsupportedMode);
        assert_eq!(Gpio::open(&ctx, 15).unwrap_err(), Error::ResourceBusy);
    }

    #[test]
    fn switching_to_input_keeps_interrupt() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 5);
        let mut gpio = Gpio::open(&ctx, 5).unwrap();

        let (tx, rx) = mpsc::channel();
        gpio.register_interrupt(Edge::Both, move |e, _| {
            let _ = tx.send(*e);
        })
        .unwrap();
        gpio.set_direction(Direction::In).unwrap();
        assert!(gpio.interrupt_armed());
        assert!(backend.line_watched(line));

        backend.drive_input(line, true);
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

        gpio.set_direction(Direction::OutLow).unwrap();
        assert!(!gpio.interrupt_armed());
        assert!(!backend.line_watched(line));
    }

    #[test]
    fn kept_subplatform_line_can_be_reopened() {
        let ctx = MockBackend::new().context();
        let adapter = Arc::new(MockSubplatform::new("mock", 2));
        ctx.attach_subplatform(adapter.clone()).unwrap();

        let mut gpio = Gpio::open_with_owner(&ctx, 14, false).unwrap();
        gpio.set_direction(Direction::OutHigh).unwrap();
        drop(gpio);
        assert!(!adapter.line_requested(0));

        let mut again = Gpio::open(&ctx, 14).unwrap();
        assert_eq!(adapter.level(0), Some(true));
        again.set_direction(Direction::In).unwrap();
        assert!(again.read().unwrap());
        assert_eq!(Gpio::open(&ctx, 14).unwrap_err(), Error::ResourceBusy);
    }

    #[test]
    fn pull_and_drive_reach_the_line() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 5);
        let mut gpio = Gpio::open(&ctx, 5).unwrap();

        gpio.set_mode(Mode::PullUp).unwrap();
        assert_eq!(backend.line_mode(line), Some(Mode::PullUp));
        gpio.set_output_drive(OutputDrive::OpenDrain).unwrap();
        assert_eq!(backend.line_drive(line), Some(OutputDrive::OpenDrain));

        gpio.set_direction(Direction::OutLow).unwrap();
        gpio.set_mode(Mode::Hiz).unwrap();
        assert_eq!(gpio.read_direction(), Some(Direction::In));
        assert_eq!(backend.line_direction(line), Some(Direction::In));
    }

    #[test]
    fn adapter_lines_have_no_pull_modes() {
        let ctx = MockBackend::new().context();
        let adapter = Arc::new(MockSubplatform::new("mock", 1));
        ctx.attach_subplatform(adapter).unwrap();
        let mut gpio = Gpio::open(&ctx, 14).unwrap();
        assert_eq!(gpio.set_mode(Mode::PullUp).unwrap_err(), Error::UnsupportedMode);
    }

    #[test]
    fn active_low_inverts_levels() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(0, 1);
        let mut gpio = Gpio::open(&ctx, 1).unwrap();
        gpio.set_input_mode(InputMode::ActiveLow).unwrap();
        assert!(backend.line_active_low(line));

        gpio.set_direction(Direction::OutHigh).unwrap();
        assert_eq!(backend.line_level(line), Some(false));
        assert!(gpio.read().unwrap());
        gpio.write(false).unwrap();
        assert_eq!(backend.line_level(line), Some(true));

        gpio.enable_mmap(true).unwrap();
        gpio.write(false).unwrap();
        assert_eq!(backend.register(0, 0x0) & (1 << 1), 1 << 1);
        assert!(!gpio.read().unwrap());
        gpio.write(true).unwrap();
        assert_eq!(backend.register(0, 0x0) & (1 << 1), 0);
        assert!(gpio.read().unwrap());
    }

    #[test]
    fn open_by_board_label() {
        let ctx = MockBackend::new().context();
        let gpio = Gpio::open_by_name(&ctx, "IO3").unwrap();
        assert_eq!(gpio.pin(), 3);
        assert_eq!(
            Gpio::open_by_name(&ctx, "IO99").unwrap_err(),
            Error::InvalidResource
        );
    }

    #[test]
    fn raw_line_skips_board_table() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let line = GpioLine::new(2, 7);
        let mut gpio = Gpio::open_raw(&ctx, line).unwrap();
        assert_eq!(gpio.pin(), 7);
        assert_eq!(gpio.name(), "gpiochip2:7");
        assert_eq!(gpio.line(), Some(line));
        gpio.set_direction(Direction::OutHigh).unwrap();
        assert_eq!(backend.line_level(line), Some(true));
        assert_eq!(gpio.enable_mmap(true).unwrap_err(), Error::UnsupportedMode);
        assert!(backend.mux_writes().is_empty());

        assert_eq!(Gpio::open_raw(&ctx, line).unwrap_err(), Error::ResourceBusy);
    }

    #[test]
    fn raw_line_respects_bus_claims() {
        let ctx = MockBackend::new().context();
        let _i2c = crate::bus::I2c::open(&ctx, 0).unwrap();
        assert_eq!(
            Gpio::open_raw(&ctx, GpioLine::new(0, 12)).unwrap_err(),
            Error::ResourceBusy
        );
    }
}
