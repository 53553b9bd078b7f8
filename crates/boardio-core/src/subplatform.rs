//! Sub-platform detection and logical index offsetting
//!
//! A sub-platform is an IO adapter attached to the host at run time (an
//! FT4222H USB bridge, for instance). Its lines are appended to the logical
//! pin space: with a base board of `n` pins, logical index `n + k` maps to
//! adapter line `k`.
//!
//! An adapter may also offer I2C buses. They are numbered after the base
//! board's buses the same way: with `m` board buses, I2C index `m + k`
//! opens adapter bus `k`.
//!
//! Detection runs at most once per [`SubplatformManager`], the first time an
//! index beyond the base range is resolved. Both outcomes are cached, so a
//! missing adapter costs one probe pass and no more.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{I2cDevice, LineHandle};
use crate::board::{Capabilities, Directions, PinDescriptor, PlatformType};
use crate::error::{Error, Result};

/// An attached IO adapter exposing GPIO lines and, optionally, I2C buses
pub trait SubplatformAdapter: Send + Sync {
    /// Adapter name, used in pin names and logs
    fn name(&self) -> &str;

    /// Platform family reported for the adapter
    fn platform_type(&self) -> PlatformType {
        PlatformType::Ft4222
    }

    /// Number of GPIO lines the adapter exposes
    fn line_count(&self) -> u32;

    /// Whether an adapter line can deliver edge events
    fn line_supports_interrupt(&self, line: u32) -> bool {
        let _ = line;
        false
    }

    /// Request an adapter line
    ///
    /// A line released with `keep` set is handed back to the next request
    /// with its direction and level intact.
    fn request_line(&self, line: u32, consumer: &str) -> Result<Box<dyn LineHandle>>;

    /// Number of I2C buses the adapter offers
    fn i2c_bus_count(&self) -> u32 {
        0
    }

    /// Open adapter I2C bus `bus`
    fn open_i2c(&self, bus: u32) -> Result<Box<dyn I2cDevice>> {
        let _ = bus;
        Err(Error::InvalidResource)
    }
}

/// Looks for one kind of adapter
pub trait SubplatformProbe: Send + Sync {
    /// Adapter kind this probe finds (matched against board tables)
    fn name(&self) -> &str;

    /// Look for an adapter, opening it when found
    fn probe(&self) -> Result<Option<Arc<dyn SubplatformAdapter>>>;
}

/// Mapping of a logical index range onto an attached adapter
pub struct SubplatformOffset {
    base: usize,
    adapter: Arc<dyn SubplatformAdapter>,
    pins: Vec<Arc<PinDescriptor>>,
}

impl SubplatformOffset {
    /// Place `adapter` at logical index `base`
    pub fn new(base: usize, adapter: Arc<dyn SubplatformAdapter>) -> Self {
        let pins = (0..adapter.line_count())
            .map(|k| {
                Arc::new(PinDescriptor {
                    index: base + k as usize,
                    name: format!("{}-{}", adapter.name(), k),
                    capabilities: Capabilities::GPIO,
                    gpio: None,
                    directions: Directions::default(),
                    interrupt: adapter.line_supports_interrupt(k),
                    mux: BTreeMap::new(),
                    pwm: None,
                    aio: None,
                    mmap: None,
                })
            })
            .collect();
        Self {
            base,
            adapter,
            pins,
        }
    }

    /// First logical index served by the adapter
    pub fn base(&self) -> usize {
        self.base
    }

    /// Number of logical indices served
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Whether the adapter exposes no lines
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Whether a logical index falls into this range
    pub fn contains(&self, index: usize) -> bool {
        index >= self.base && index < self.base + self.pins.len()
    }

    /// Descriptor for a logical index in this range
    pub fn pin(&self, index: usize) -> Option<Arc<PinDescriptor>> {
        index
            .checked_sub(self.base)
            .and_then(|k| self.pins.get(k))
            .cloned()
    }

    /// Adapter-local line for a logical index in this range
    pub fn line_for(&self, index: usize) -> Option<u32> {
        if self.contains(index) {
            Some((index - self.base) as u32)
        } else {
            None
        }
    }

    /// The adapter
    pub fn adapter(&self) -> &Arc<dyn SubplatformAdapter> {
        &self.adapter
    }
}

impl core::fmt::Debug for SubplatformOffset {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SubplatformOffset")
            .field("adapter", &self.adapter.name())
            .field("base", &self.base)
            .field("len", &self.pins.len())
            .finish()
    }
}

enum Detection {
    Pending,
    Done(Option<Arc<SubplatformOffset>>),
}

/// Detects adapters and owns the current sub-platform mapping
pub struct SubplatformManager {
    probes: Vec<Box<dyn SubplatformProbe>>,
    enabled: bool,
    state: Mutex<Detection>,
}

impl SubplatformManager {
    /// Create a manager with the given probes
    ///
    /// With `enabled` false, detection never runs; adapters can still be
    /// attached explicitly.
    pub fn new(probes: Vec<Box<dyn SubplatformProbe>>, enabled: bool) -> Self {
        Self {
            probes,
            enabled,
            state: Mutex::new(Detection::Pending),
        }
    }

    /// Current mapping without triggering detection
    pub fn current(&self) -> Option<Arc<SubplatformOffset>> {
        match &*self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            Detection::Done(offset) => offset.clone(),
            Detection::Pending => None,
        }
    }

    /// Whether detection has run (or been superseded by an explicit attach)
    pub fn attempted(&self) -> bool {
        matches!(
            &*self.state.lock().unwrap_or_else(PoisonError::into_inner),
            Detection::Done(_)
        )
    }

    /// Run detection once and return the cached outcome
    ///
    /// `accepted` limits which probes run; an empty list accepts all.
    pub fn detect(&self, base: usize, accepted: &[String]) -> Option<Arc<SubplatformOffset>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Detection::Done(offset) = &*state {
            return offset.clone();
        }

        let found = if self.enabled {
            self.run_probes(base, accepted)
        } else {
            log::debug!("subplatform: detection disabled");
            None
        };
        *state = Detection::Done(found.clone());
        found
    }

    fn run_probes(&self, base: usize, accepted: &[String]) -> Option<Arc<SubplatformOffset>> {
        for probe in &self.probes {
            if !accepted.is_empty() && !accepted.iter().any(|a| a == probe.name()) {
                log::trace!("subplatform: board does not accept '{}'", probe.name());
                continue;
            }
            match probe.probe() {
                Ok(Some(adapter)) => {
                    let offset = SubplatformOffset::new(base, adapter);
                    log::info!(
                        "subplatform: found {} with {} lines at index {}",
                        offset.adapter().name(),
                        offset.len(),
                        base
                    );
                    return Some(Arc::new(offset));
                }
                Ok(None) => log::debug!("subplatform: no {} present", probe.name()),
                Err(e) => log::warn!("subplatform: probing {} failed: {}", probe.name(), e),
            }
        }
        log::debug!("subplatform: none detected");
        None
    }

    /// Attach an adapter explicitly, replacing any current mapping
    pub fn attach(&self, base: usize, adapter: Arc<dyn SubplatformAdapter>) -> Arc<SubplatformOffset> {
        let offset = Arc::new(SubplatformOffset::new(base, adapter));
        log::info!(
            "subplatform: attached {} with {} lines at index {}",
            offset.adapter().name(),
            offset.len(),
            base
        );
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) =
            Detection::Done(Some(offset.clone()));
        offset
    }

    /// Remove the current adapter, returning it
    ///
    /// Open handles on its lines keep their own adapter reference.
    pub fn detach(&self) -> Option<Arc<dyn SubplatformAdapter>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = match std::mem::replace(&mut *state, Detection::Done(None)) {
            Detection::Done(Some(offset)) => Some(offset.adapter().clone()),
            _ => None,
        };
        if let Some(adapter) = &previous {
            log::info!("subplatform: detached {}", adapter.name());
        }
        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProbe, MockSubplatform};

    #[test]
    fn offset_maps_indices() {
        let adapter = Arc::new(MockSubplatform::new("ftdi", 4));
        let offset = SubplatformOffset::new(14, adapter);
        assert!(!offset.contains(13));
        assert!(offset.contains(14));
        assert!(offset.contains(17));
        assert!(!offset.contains(18));
        assert_eq!(offset.line_for(16), Some(2));
        assert_eq!(offset.pin(15).unwrap().name, "ftdi-1");
        assert_eq!(offset.pin(15).unwrap().index, 15);
    }

    #[test]
    fn detection_runs_once_when_absent() {
        let probe = MockProbe::absent("mock");
        let counter = probe.counter();
        let manager = SubplatformManager::new(vec![Box::new(probe)], true);

        assert!(manager.detect(14, &[]).is_none());
        assert!(manager.detect(14, &[]).is_none());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(manager.attempted());
    }

    #[test]
    fn detection_caches_positive_result() {
        let probe = MockProbe::present("mock", Arc::new(MockSubplatform::new("mock", 2)));
        let counter = probe.counter();
        let manager = SubplatformManager::new(vec![Box::new(probe)], true);

        let first = manager.detect(8, &[]).unwrap();
        let second = manager.detect(8, &[]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn board_filter_skips_probes() {
        let probe = MockProbe::present("mock", Arc::new(MockSubplatform::new("mock", 2)));
        let counter = probe.counter();
        let manager = SubplatformManager::new(vec![Box::new(probe)], true);

        assert!(manager.detect(8, &["ft4222".to_string()]).is_none());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn disabled_manager_never_probes() {
        let probe = MockProbe::present("mock", Arc::new(MockSubplatform::new("mock", 2)));
        let counter = probe.counter();
        let manager = SubplatformManager::new(vec![Box::new(probe)], false);

        assert!(manager.detect(8, &[]).is_none());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn attach_and_detach() {
        let manager = SubplatformManager::new(Vec::new(), true);
        assert!(manager.current().is_none());

        manager.attach(4, Arc::new(MockSubplatform::new("mock", 3)));
        assert_eq!(manager.current().unwrap().len(), 3);

        let adapter = manager.detach().unwrap();
        assert_eq!(adapter.name(), "mock");
        assert!(manager.current().is_none());
        assert!(manager.detach().is_none());
    }
}
