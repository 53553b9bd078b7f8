//! Platform context: board detection, pin resolution and shared state
//!
//! A [`PlatformContext`] is the handle every controller's `open` takes. It
//! owns the backend, the board database and the state that must be shared
//! between handles: the detected board, the sub-platform mapping, the table
//! of claimed physical resources, mapped register pages and per-bus locks.
//!
//! Cloning a context is cheap; all clones share the same state.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use crate::backend::Backend;
use crate::board::{
    AioRef, BoardDatabase, Capability, GpioLine, PinDescriptor, PlatformDescriptor, PlatformType,
    PwmRef,
};
use crate::error::{Error, Result};
use crate::gpio::MmapRegion;
use crate::mux::PinMultiplexer;
use crate::subplatform::{SubplatformAdapter, SubplatformManager, SubplatformOffset, SubplatformProbe};

/// Default bound on how long an interrupt waiter may block before it
/// notices it was unregistered
pub const DEFAULT_INTERRUPT_POLL: Duration = Duration::from_millis(100);

/// Configuration for a [`PlatformContext`]
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Board table to use instead of marker detection
    pub board: Option<String>,
    /// Extra board table files or directories, loaded after the built-in ones
    pub board_db: Vec<PathBuf>,
    /// Whether to probe for sub-platform adapters
    pub subplatform_detection: bool,
    /// Interrupt waiter poll interval
    pub interrupt_poll: Duration,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            board: None,
            board_db: Vec::new(),
            subplatform_detection: true,
            interrupt_poll: DEFAULT_INTERRUPT_POLL,
        }
    }
}

impl PlatformConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a board table by name
    pub fn with_board(mut self, name: impl Into<String>) -> Self {
        self.board = Some(name.into());
        self
    }

    /// Add a board table file or directory
    pub fn with_board_db(mut self, path: impl Into<PathBuf>) -> Self {
        self.board_db.push(path.into());
        self
    }

    /// Enable or disable sub-platform probing
    pub fn with_subplatform_detection(mut self, enabled: bool) -> Self {
        self.subplatform_detection = enabled;
        self
    }

    /// Set the interrupt waiter poll interval
    pub fn with_interrupt_poll(mut self, interval: Duration) -> Self {
        self.interrupt_poll = interval;
        self
    }
}

/// Where a resolved pin physically lives
#[derive(Clone)]
pub enum PinOrigin {
    /// A pin of the base board
    Base,
    /// A line of an attached adapter
    Subplatform {
        /// The adapter
        adapter: Arc<dyn SubplatformAdapter>,
        /// Adapter-local line
        line: u32,
    },
}

impl core::fmt::Debug for PinOrigin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PinOrigin::Base => f.write_str("Base"),
            PinOrigin::Subplatform { adapter, line } => f
                .debug_struct("Subplatform")
                .field("adapter", &adapter.name())
                .field("line", line)
                .finish(),
        }
    }
}

/// Result of resolving a logical index
#[derive(Debug, Clone)]
pub struct ResolvedPin {
    /// Pin description
    pub descriptor: Arc<PinDescriptor>,
    /// Physical location
    pub origin: PinOrigin,
}

impl ResolvedPin {
    /// Logical index
    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    /// Whether the pin belongs to a sub-platform
    pub fn is_subplatform(&self) -> bool {
        matches!(self.origin, PinOrigin::Subplatform { .. })
    }

    /// The line behind the pin, if it has one
    pub(crate) fn line_resource(&self) -> Option<Resource> {
        match &self.origin {
            PinOrigin::Base => self.descriptor.gpio.map(Resource::Line),
            PinOrigin::Subplatform { adapter, line } => {
                Some(Resource::SubplatformLine(adapter.name().to_string(), *line))
            }
        }
    }
}

/// A physical resource handed out to live handles
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Resource {
    Line(GpioLine),
    SubplatformLine(String, u32),
    Pwm(PwmRef),
    Aio(AioRef),
    Uart(String),
}

impl core::fmt::Display for Resource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Resource::Line(line) => write!(f, "{}", line),
            Resource::SubplatformLine(adapter, line) => write!(f, "{}:{}", adapter, line),
            Resource::Pwm(p) => write!(f, "pwmchip{}/pwm{}", p.chip, p.channel),
            Resource::Aio(a) => write!(f, "iio:device{}/in_voltage{}", a.device, a.channel),
            Resource::Uart(path) => f.write_str(path),
        }
    }
}

/// Who currently holds a resource
#[derive(Debug)]
enum Holder {
    /// One handle, nobody else
    Exclusive,
    /// Any number of handles on the same bus
    Shared { bus: BusKey, count: usize },
}

type ClaimTable = Arc<Mutex<HashMap<Resource, Holder>>>;

/// Ownership of a set of resources, released on drop
pub(crate) struct ResourceClaim {
    table: ClaimTable,
    resources: Vec<Resource>,
}

impl Drop for ResourceClaim {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        for r in &self.resources {
            match table.get_mut(r) {
                Some(Holder::Shared { count, .. }) if *count > 1 => *count -= 1,
                Some(_) => {
                    table.remove(r);
                }
                None => {}
            }
        }
    }
}

/// A shared bus or channel group that serialises transactions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum BusKey {
    I2c(u32),
    SubplatformI2c(String, u32),
    Spi(u32),
    Uart(String),
    Pwm(u32),
    Aio(u32),
}

impl core::fmt::Display for BusKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BusKey::I2c(bus) => write!(f, "i2c-{}", bus),
            BusKey::SubplatformI2c(adapter, bus) => write!(f, "{}-i2c{}", adapter, bus),
            BusKey::Spi(bus) => write!(f, "spi{}", bus),
            BusKey::Uart(path) => f.write_str(path),
            BusKey::Pwm(chip) => write!(f, "pwmchip{}", chip),
            BusKey::Aio(device) => write!(f, "iio:device{}", device),
        }
    }
}

pub(crate) type BusLock = Arc<Mutex<()>>;

struct PlatformInner {
    backend: Arc<dyn Backend>,
    database: BoardDatabase,
    config: PlatformConfig,
    platform: OnceLock<Result<Arc<PlatformDescriptor>>>,
    subplatforms: SubplatformManager,
    multiplexer: PinMultiplexer,
    claims: ClaimTable,
    regions: Mutex<HashMap<u32, Weak<MmapRegion>>>,
    buses: Mutex<HashMap<BusKey, BusLock>>,
}

/// Shared platform state threaded into every controller
#[derive(Clone)]
pub struct PlatformContext {
    inner: Arc<PlatformInner>,
}

impl PlatformContext {
    /// Create a context
    ///
    /// Nothing is detected yet; the board is resolved on first use.
    pub fn new(
        backend: Arc<dyn Backend>,
        database: BoardDatabase,
        config: PlatformConfig,
        probes: Vec<Box<dyn SubplatformProbe>>,
    ) -> Self {
        log::debug!(
            "platform: context on backend '{}' with {} board tables, {} probes",
            backend.name(),
            database.len(),
            probes.len()
        );
        let subplatforms = SubplatformManager::new(probes, config.subplatform_detection);
        Self {
            inner: Arc::new(PlatformInner {
                backend,
                database,
                config,
                platform: OnceLock::new(),
                subplatforms,
                multiplexer: PinMultiplexer::new(),
                claims: Arc::new(Mutex::new(HashMap::new())),
                regions: Mutex::new(HashMap::new()),
                buses: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve (once) and return the board descriptor
    pub fn resolve_platform(&self) -> Result<Arc<PlatformDescriptor>> {
        self.inner
            .platform
            .get_or_init(|| self.detect_platform())
            .clone()
    }

    fn detect_platform(&self) -> Result<Arc<PlatformDescriptor>> {
        if let Some(name) = &self.inner.config.board {
            return match self.inner.database.find_by_name(name) {
                Some(board) => {
                    log::info!("platform: using {} (forced)", board.display_name());
                    Ok(board)
                }
                None => {
                    log::error!("platform: no board table named '{}'", name);
                    Err(Error::PlatformNotDetected)
                }
            };
        }

        let markers = self.inner.backend.markers();
        log::debug!("platform: markers {:?}", markers);
        match self.inner.database.detect(&markers) {
            Some(board) => {
                log::info!("platform: detected {}", board.display_name());
                Ok(board)
            }
            None => {
                log::error!(
                    "platform: no board table matches this system (board name {:?}, model {:?})",
                    markers.board_name,
                    markers.device_tree_model
                );
                Err(Error::PlatformNotDetected)
            }
        }
    }

    /// Map a logical index to its pin
    ///
    /// Indices past the base board are served by the sub-platform, which is
    /// detected on the first such lookup. Without one the lookup fails with
    /// `NoSubplatform`; with one, indices past its range fail with
    /// `InvalidResource`.
    pub fn resolve_pin(&self, index: usize) -> Result<ResolvedPin> {
        let platform = self.resolve_platform()?;

        if let Some(offset) = self.inner.subplatforms.current() {
            if offset.contains(index) {
                return Self::subplatform_pin(&offset, index);
            }
        }

        if let Some(descriptor) = platform.pins.get(index) {
            return Ok(ResolvedPin {
                descriptor: descriptor.clone(),
                origin: PinOrigin::Base,
            });
        }

        match self.subplatform_offset(&platform) {
            Some(offset) if offset.contains(index) => Self::subplatform_pin(&offset, index),
            Some(_) => Err(Error::InvalidResource),
            None => Err(Error::NoSubplatform),
        }
    }

    fn subplatform_pin(offset: &SubplatformOffset, index: usize) -> Result<ResolvedPin> {
        match (offset.pin(index), offset.line_for(index)) {
            (Some(descriptor), Some(line)) => Ok(ResolvedPin {
                descriptor,
                origin: PinOrigin::Subplatform {
                    adapter: offset.adapter().clone(),
                    line,
                },
            }),
            _ => Err(Error::InvalidResource),
        }
    }

    fn subplatform_offset(&self, platform: &PlatformDescriptor) -> Option<Arc<SubplatformOffset>> {
        self.inner
            .subplatforms
            .detect(platform.pin_count(), &platform.subplatforms)
    }

    // ------------------------------------------------------------------
    // Platform queries
    // ------------------------------------------------------------------

    /// Board display name
    pub fn platform_name(&self) -> Result<String> {
        Ok(self.resolve_platform()?.display_name())
    }

    /// Board family
    pub fn platform_type(&self) -> Result<PlatformType> {
        Ok(self.resolve_platform()?.platform_type)
    }

    /// Library version
    pub fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Whether a sub-platform is attached (runs detection if it has not run)
    pub fn has_subplatform(&self) -> bool {
        match self.resolve_platform() {
            Ok(platform) => self.subplatform_offset(&platform).is_some(),
            Err(_) => false,
        }
    }

    /// Name of the attached sub-platform adapter
    pub fn subplatform_name(&self) -> Option<String> {
        self.inner
            .subplatforms
            .current()
            .map(|o| o.adapter().name().to_string())
    }

    /// Total logical pins: base board plus sub-platform
    pub fn pin_count(&self) -> Result<usize> {
        let platform = self.resolve_platform()?;
        let extra = self
            .subplatform_offset(&platform)
            .map(|o| o.len())
            .unwrap_or(0);
        Ok(platform.pin_count() + extra)
    }

    /// Number of GPIO capable base pins
    pub fn gpio_count(&self) -> Result<usize> {
        Ok(self.resolve_platform()?.gpio_count())
    }

    /// Logical index of the pin labelled `name`
    ///
    /// Base pins are searched first, then the attached sub-platform's.
    pub fn find_pin(&self, name: &str) -> Result<usize> {
        let platform = self.resolve_platform()?;
        if let Some(pin) = platform.pins.iter().find(|p| p.name == name) {
            return Ok(pin.index);
        }
        self.inner
            .subplatforms
            .current()
            .and_then(|offset| {
                (offset.base()..offset.base() + offset.len())
                    .find(|&i| offset.pin(i).is_some_and(|p| p.name == name))
            })
            .ok_or_else(|| {
                log::debug!("platform: no pin named '{}'", name);
                Error::InvalidResource
            })
    }

    /// Name of a pin
    pub fn pin_name(&self, index: usize) -> Result<String> {
        Ok(self.resolve_pin(index)?.descriptor.name.clone())
    }

    /// Whether a pin supports a capability (false for unknown pins)
    pub fn pin_supports(&self, index: usize, cap: Capability) -> bool {
        self.resolve_pin(index)
            .map(|p| p.descriptor.supports(cap))
            .unwrap_or(false)
    }

    /// Number of I2C buses on the board
    pub fn i2c_bus_count(&self) -> Result<usize> {
        Ok(self.resolve_platform()?.i2c.len())
    }

    /// Adapter bus behind an I2C index past the board's own buses
    ///
    /// Fails with `InvalidResource` when no adapter offers that bus.
    pub(crate) fn subplatform_i2c(&self, index: usize) -> Result<(Arc<dyn SubplatformAdapter>, u32)> {
        let platform = self.resolve_platform()?;
        let local = index
            .checked_sub(platform.i2c.len())
            .ok_or(Error::InvalidResource)?;
        let offset = self
            .subplatform_offset(&platform)
            .ok_or(Error::InvalidResource)?;
        let adapter = offset.adapter().clone();
        if local >= adapter.i2c_bus_count() as usize {
            log::debug!(
                "i2c: index {} is past the buses of {}",
                index,
                adapter.name()
            );
            return Err(Error::InvalidResource);
        }
        Ok((adapter, local as u32))
    }

    /// Index of the default I2C bus
    pub fn default_i2c_bus(&self) -> Result<usize> {
        let platform = self.resolve_platform()?;
        if platform.i2c.is_empty() {
            return Err(Error::InvalidResource);
        }
        Ok(platform.default_i2c)
    }

    /// Native ADC resolution
    pub fn adc_raw_bits(&self) -> Result<u8> {
        Ok(self.resolve_platform()?.adc.raw_bits)
    }

    /// ADC resolution reported by default
    pub fn adc_supported_bits(&self) -> Result<u8> {
        Ok(self.resolve_platform()?.adc.supported_bits)
    }

    /// Board database this context was built with
    pub fn database(&self) -> &BoardDatabase {
        &self.inner.database
    }

    // ------------------------------------------------------------------
    // Sub-platform management
    // ------------------------------------------------------------------

    /// Attach an adapter explicitly after the base board's pins
    pub fn attach_subplatform(&self, adapter: Arc<dyn SubplatformAdapter>) -> Result<()> {
        let platform = self.resolve_platform()?;
        self.inner
            .subplatforms
            .attach(platform.pin_count(), adapter);
        Ok(())
    }

    /// Detach the current adapter, returning it
    pub fn detach_subplatform(&self) -> Option<Arc<dyn SubplatformAdapter>> {
        self.inner.subplatforms.detach()
    }

    // ------------------------------------------------------------------
    // Shared state used by the controllers
    // ------------------------------------------------------------------

    pub(crate) fn backend(&self) -> &dyn Backend {
        self.inner.backend.as_ref()
    }

    pub(crate) fn interrupt_poll(&self) -> Duration {
        self.inner.config.interrupt_poll
    }

    /// Claim a set of resources atomically; fails with `ResourceBusy` if
    /// any of them is already held
    pub(crate) fn claim(&self, resources: Vec<Resource>) -> Result<ResourceClaim> {
        let mut table = self
            .inner
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(busy) = resources.iter().find(|r| table.contains_key(r)) {
            log::debug!("claim: {} already in use", busy);
            return Err(Error::ResourceBusy);
        }
        for r in &resources {
            table.insert(r.clone(), Holder::Exclusive);
        }
        Ok(ResourceClaim {
            table: self.inner.claims.clone(),
            resources,
        })
    }

    /// Claim resources on behalf of a bus
    ///
    /// Handles on the same bus share the claim; anything else holding one
    /// of the resources makes this fail with `ResourceBusy`. The resources
    /// are released when the last handle on the bus drops its claim.
    pub(crate) fn claim_for_bus(&self, bus: &BusKey, resources: Vec<Resource>) -> Result<ResourceClaim> {
        let mut table = self
            .inner
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let busy = resources.iter().find(|r| match table.get(r) {
            None => false,
            Some(Holder::Shared { bus: holder, .. }) => holder != bus,
            Some(Holder::Exclusive) => true,
        });
        if let Some(busy) = busy {
            log::debug!("claim: {} already in use, not routing it to {}", busy, bus);
            return Err(Error::ResourceBusy);
        }
        for r in &resources {
            match table.get_mut(r) {
                Some(Holder::Shared { count, .. }) => *count += 1,
                _ => {
                    table.insert(
                        r.clone(),
                        Holder::Shared {
                            bus: bus.clone(),
                            count: 1,
                        },
                    );
                }
            }
        }
        Ok(ResourceClaim {
            table: self.inner.claims.clone(),
            resources,
        })
    }

    pub(crate) fn is_claimed(&self, resource: &Resource) -> bool {
        self.inner
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(resource)
    }

    /// Apply the mux configuration a pin needs for `cap`
    pub(crate) fn apply_mux(&self, pin: &ResolvedPin, cap: Capability) -> Result<()> {
        if pin.is_subplatform() {
            return Ok(());
        }
        self.inner.multiplexer.apply(self, &pin.descriptor, cap)
    }

    /// Lock serialising transactions on one bus
    pub(crate) fn bus_lock(&self, key: BusKey) -> BusLock {
        self.inner
            .buses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone()
    }

    /// Shared mapping of a GPIO controller's registers
    ///
    /// The mapping lives as long as some handle holds the returned `Arc`.
    pub(crate) fn mmap_region(&self, chip: u32) -> Result<Arc<MmapRegion>> {
        let platform = self.resolve_platform()?;
        let mut regions = self
            .inner
            .regions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(region) = regions.get(&chip).and_then(Weak::upgrade) {
            return Ok(region);
        }

        let chip_def = platform.mmap_chip(chip).ok_or(Error::UnsupportedMode)?;
        let block = self.inner.backend.map_registers(chip_def)?;
        let region = Arc::new(MmapRegion::new(chip_def, block));
        log::debug!("mmap: mapped chip {} from {}", chip, chip_def.device);
        regions.insert(chip, Arc::downgrade(&region));
        Ok(region)
    }
}

impl core::fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlatformContext")
            .field("backend", &self.inner.backend.name())
            .field("board", &self.inner.config.board)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PlatformMarkers;
    use crate::mock::{MockBackend, MockProbe, MockSubplatform};

    fn mock_ctx() -> PlatformContext {
        MockBackend::new().context()
    }

    #[test]
    fn forced_board_resolves() {
        let ctx = mock_ctx();
        assert_eq!(ctx.platform_type().unwrap(), PlatformType::Mock);
        assert_eq!(ctx.platform_name().unwrap(), "boardio Mock Platform");
        assert_eq!(ctx.gpio_count().unwrap(), 14);
        assert_eq!(ctx.adc_raw_bits().unwrap(), 12);
        assert_eq!(ctx.adc_supported_bits().unwrap(), 10);
        assert!(!ctx.version().is_empty());
    }

    #[test]
    fn detection_by_markers() {
        let backend = MockBackend::new();
        backend.set_markers(PlatformMarkers {
            board_name: Some("GalileoGen2".into()),
            ..Default::default()
        });
        let ctx = PlatformContext::new(
            Arc::new(backend),
            BoardDatabase::with_builtin().unwrap(),
            PlatformConfig::new(),
            Vec::new(),
        );
        assert_eq!(ctx.platform_type().unwrap(), PlatformType::GalileoGen2);
    }

    #[test]
    fn detection_failure_is_fatal_and_cached() {
        let backend = MockBackend::new();
        let ctx = PlatformContext::new(
            Arc::new(backend.clone()),
            BoardDatabase::with_builtin().unwrap(),
            PlatformConfig::new(),
            Vec::new(),
        );
        assert_eq!(ctx.resolve_platform().unwrap_err(), Error::PlatformNotDetected);
        assert_eq!(ctx.resolve_pin(0).unwrap_err(), Error::PlatformNotDetected);

        // Markers are read once; later changes do not matter.
        backend.set_markers(PlatformMarkers {
            board_name: Some("GalileoGen2".into()),
            ..Default::default()
        });
        assert_eq!(ctx.resolve_platform().unwrap_err(), Error::PlatformNotDetected);
        assert_eq!(backend.marker_reads(), 1);
    }

    #[test]
    fn unknown_forced_board() {
        let ctx = PlatformContext::new(
            Arc::new(MockBackend::new()),
            BoardDatabase::with_builtin().unwrap(),
            PlatformConfig::new().with_board("no-such-board"),
            Vec::new(),
        );
        assert_eq!(ctx.resolve_platform().unwrap_err(), Error::PlatformNotDetected);
    }

    #[test]
    fn base_pins_resolve_with_capabilities() {
        let ctx = mock_ctx();
        let count = ctx.resolve_platform().unwrap().pin_count();
        for index in 0..count {
            let pin = ctx.resolve_pin(index).unwrap();
            assert_eq!(pin.index(), index);
            assert!(!pin.descriptor.capabilities.is_empty());
            assert!(!pin.is_subplatform());
        }
    }

    #[test]
    fn beyond_base_without_subplatform() {
        let ctx = mock_ctx();
        assert_eq!(ctx.resolve_pin(14).unwrap_err(), Error::NoSubplatform);
        assert_eq!(ctx.resolve_pin(20).unwrap_err(), Error::NoSubplatform);
        assert!(!ctx.has_subplatform());
        assert_eq!(ctx.pin_count().unwrap(), 14);
    }

    #[test]
    fn probed_subplatform_extends_pin_space() {
        let backend = MockBackend::new();
        let probe = MockProbe::present("mock", Arc::new(MockSubplatform::new("mock", 4)));
        let ctx = backend.context_with_probes(vec![Box::new(probe)]);

        let pin = ctx.resolve_pin(15).unwrap();
        assert!(pin.is_subplatform());
        assert_eq!(pin.descriptor.name, "mock-1");
        assert_eq!(ctx.resolve_pin(18).unwrap_err(), Error::InvalidResource);
        assert!(ctx.has_subplatform());
        assert_eq!(ctx.pin_count().unwrap(), 18);
        assert_eq!(ctx.subplatform_name().as_deref(), Some("mock"));
    }

    #[test]
    fn pin_queries() {
        let ctx = mock_ctx();
        assert_eq!(ctx.pin_name(10).unwrap(), "A0");
        assert!(ctx.pin_supports(3, Capability::Pwm));
        assert!(!ctx.pin_supports(4, Capability::Pwm));
        assert!(!ctx.pin_supports(99, Capability::Gpio));
        assert_eq!(ctx.i2c_bus_count().unwrap(), 2);
        assert_eq!(ctx.default_i2c_bus().unwrap(), 0);
    }

    #[test]
    fn pins_found_by_name() {
        let ctx = mock_ctx();
        assert_eq!(ctx.find_pin("A0").unwrap(), 10);
        assert_eq!(ctx.find_pin("SDA").unwrap(), 12);
        assert_eq!(ctx.find_pin("nope").unwrap_err(), Error::InvalidResource);

        ctx.attach_subplatform(Arc::new(MockSubplatform::new("mock", 2)))
            .unwrap();
        assert_eq!(ctx.find_pin("mock-1").unwrap(), 15);
    }

    #[test]
    fn claims_are_exclusive_until_dropped() {
        let ctx = mock_ctx();
        let line = Resource::Line(GpioLine::new(0, 1));
        let claim = ctx.claim(vec![line.clone()]).unwrap();
        assert!(ctx.is_claimed(&line));
        assert!(matches!(
            ctx.claim(vec![Resource::Line(GpioLine::new(0, 2)), line.clone()]),
            Err(Error::ResourceBusy)
        ));
        // The failed claim must not have taken line 2.
        assert!(!ctx.is_claimed(&Resource::Line(GpioLine::new(0, 2))));
        drop(claim);
        assert!(!ctx.is_claimed(&line));
    }

    #[test]
    fn bus_claims_are_shared_within_a_bus() {
        let ctx = mock_ctx();
        let sda = Resource::Line(GpioLine::new(0, 12));
        let first = ctx.claim_for_bus(&BusKey::I2c(0), vec![sda.clone()]).unwrap();
        let second = ctx.claim_for_bus(&BusKey::I2c(0), vec![sda.clone()]).unwrap();

        assert!(matches!(
            ctx.claim_for_bus(&BusKey::I2c(1), vec![sda.clone()]),
            Err(Error::ResourceBusy)
        ));
        assert!(matches!(ctx.claim(vec![sda.clone()]), Err(Error::ResourceBusy)));

        drop(first);
        assert!(ctx.is_claimed(&sda));
        drop(second);
        assert!(!ctx.is_claimed(&sda));

        let exclusive = ctx.claim(vec![sda.clone()]).unwrap();
        assert!(matches!(
            ctx.claim_for_bus(&BusKey::I2c(0), vec![sda]),
            Err(Error::ResourceBusy)
        ));
        drop(exclusive);
    }

    #[test]
    fn bus_locks_are_shared_per_bus() {
        let ctx = mock_ctx();
        let a = ctx.bus_lock(BusKey::Spi(0));
        let b = ctx.bus_lock(BusKey::Spi(0));
        let c = ctx.bus_lock(BusKey::Spi(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn mmap_regions_are_shared_and_released() {
        let backend = MockBackend::new();
        let ctx = backend.context();
        let a = ctx.mmap_region(0).unwrap();
        let b = ctx.mmap_region(0).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(backend.mapped_regions(), 1);
        drop(a);
        drop(b);
        assert_eq!(backend.mapped_regions(), 0);
        assert_eq!(ctx.mmap_region(9).unwrap_err(), Error::UnsupportedMode);
    }
}
