//! GPIO lines through the character device (`/dev/gpiochipN`)
//!
//! Each [`LinuxLine`] owns one single-line [`Request`]. The request is kept
//! in an `Arc` so an edge waiter can block on it while the handle keeps
//! servicing reads. Requests released with `keep` are parked in the
//! backend's retained table; a later request for the same line reuses them
//! instead of asking the kernel again, which would fail with `EBUSY`.
//!
//! The kernel takes a complete line configuration on every reconfigure, so
//! each line tracks what it was set to and rebuilds the whole [`Config`]
//! from that. Edge detection in particular survives a switch to input.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use boardio_core::backend::{EdgeSource, LineHandle};
use boardio_core::board::GpioLine;
use boardio_core::gpio::{Direction, Edge, EdgeEvent, EdgeKind, Mode, OutputDrive};
use boardio_core::Result as CoreResult;
use gpiocdev::line::{Bias, Drive, EdgeDetection, Value};
use gpiocdev::request::{Config, Request};

use crate::error::{LinuxError, Result};

/// Requests kept alive after their handle went away
pub(crate) type RetainedLines = Arc<Mutex<HashMap<GpioLine, Arc<Request>>>>;

/// Device node of a GPIO chip
pub(crate) fn chip_path(chip: u32) -> String {
    format!("/dev/gpiochip{}", chip)
}

fn value(level: bool) -> Value {
    if level {
        Value::Active
    } else {
        Value::Inactive
    }
}

fn edge_detection(edge: Edge) -> Option<EdgeDetection> {
    match edge {
        Edge::None => None,
        Edge::Both => Some(EdgeDetection::BothEdges),
        Edge::Rising => Some(EdgeDetection::RisingEdge),
        Edge::Falling => Some(EdgeDetection::FallingEdge),
    }
}

fn bias(mode: Mode) -> Bias {
    match mode {
        Mode::PullUp => Bias::PullUp,
        Mode::PullDown => Bias::PullDown,
        Mode::Strong | Mode::Hiz => Bias::Disabled,
    }
}

fn drive(drive: OutputDrive) -> Drive {
    match drive {
        OutputDrive::PushPull => Drive::PushPull,
        OutputDrive::OpenDrain => Drive::OpenDrain,
    }
}

/// Direction part of a line's configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineDirection {
    /// Whatever the kernel had when the line was requested
    AsIs,
    Input,
    Output(bool),
}

/// Everything a reconfigure has to restate
#[derive(Debug, Clone, Copy)]
struct LineSettings {
    direction: LineDirection,
    edge: Option<EdgeDetection>,
    bias: Option<Bias>,
    drive: Option<Drive>,
    active_low: bool,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            direction: LineDirection::AsIs,
            edge: None,
            bias: None,
            drive: None,
            active_low: false,
        }
    }
}

impl LineSettings {
    fn apply(&self, offset: u32, cfg: &mut Config) {
        cfg.with_line(offset);
        match self.direction {
            LineDirection::AsIs => {
                cfg.as_is();
            }
            LineDirection::Input => {
                cfg.as_input().with_edge_detection(self.edge);
            }
            LineDirection::Output(level) => {
                cfg.as_output(value(level));
                if let Some(drive) = self.drive {
                    cfg.with_drive(drive);
                }
            }
        }
        cfg.with_bias(self.bias);
        if self.active_low {
            cfg.as_active_low();
        } else {
            cfg.as_active_high();
        }
    }
}

/// Request a single line, leaving its direction as the kernel has it
pub(crate) fn request(line: GpioLine, consumer: &str) -> Result<Request> {
    let mut cfg = Config::default();
    cfg.with_line(line.line).as_is();
    Request::from_config(cfg)
        .on_chip(chip_path(line.chip))
        .with_consumer(consumer)
        .request()
        .map_err(|source| LinuxError::Gpio {
            chip: line.chip,
            line: line.line,
            source,
        })
}

/// Request a single line as an output driven to `level`
pub(crate) fn request_output(line: GpioLine, consumer: &str, level: bool) -> Result<Request> {
    let mut cfg = Config::default();
    cfg.with_line(line.line).as_output(value(level));
    Request::from_config(cfg)
        .on_chip(chip_path(line.chip))
        .with_consumer(consumer)
        .request()
        .map_err(|source| LinuxError::Gpio {
            chip: line.chip,
            line: line.line,
            source,
        })
}

/// An open GPIO line
pub struct LinuxLine {
    line: GpioLine,
    request: Arc<Request>,
    settings: LineSettings,
    retained: RetainedLines,
}

impl LinuxLine {
    pub(crate) fn open(line: GpioLine, consumer: &str, retained: &RetainedLines) -> Result<Self> {
        let parked = retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&line);
        let request = match parked {
            Some(request) => {
                log::debug!("gpio: reusing retained request for {}", line);
                request
            }
            None => Arc::new(request(line, consumer)?),
        };
        Ok(Self {
            line,
            request,
            settings: LineSettings::default(),
            retained: retained.clone(),
        })
    }

    /// Apply `settings`, keeping them only if the kernel accepted them
    fn reconfigure(&mut self, settings: LineSettings) -> Result<()> {
        let mut cfg = Config::default();
        settings.apply(self.line.line, &mut cfg);
        self.request
            .reconfigure(&cfg)
            .map_err(|source| self.error(source))?;
        self.settings = settings;
        Ok(())
    }

    fn current_level(&self) -> bool {
        self.request
            .value(self.line.line)
            .map(|v| v == Value::Active)
            .unwrap_or(false)
    }

    fn error(&self, source: gpiocdev::Error) -> LinuxError {
        LinuxError::Gpio {
            chip: self.line.chip,
            line: self.line.line,
            source,
        }
    }
}

impl LineHandle for LinuxLine {
    fn set_direction(&mut self, direction: Direction) -> CoreResult<()> {
        let mut settings = self.settings;
        settings.direction = match direction {
            Direction::In => LineDirection::Input,
            Direction::Out => LineDirection::Output(self.current_level()),
            Direction::OutHigh => LineDirection::Output(true),
            Direction::OutLow => LineDirection::Output(false),
        };
        if direction.is_output() {
            settings.edge = None;
        }
        self.reconfigure(settings)?;
        log::debug!("gpio: {} set to {:?}", self.line, direction);
        Ok(())
    }

    fn read(&self) -> CoreResult<bool> {
        let v = self
            .request
            .value(self.line.line)
            .map_err(|source| self.error(source))?;
        Ok(v == Value::Active)
    }

    fn write(&mut self, level: bool) -> CoreResult<()> {
        self.request
            .set_value(self.line.line, value(level))
            .map_err(|source| self.error(source))?;
        self.settings.direction = LineDirection::Output(level);
        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) -> CoreResult<()> {
        let mut settings = self.settings;
        settings.bias = Some(bias(mode));
        if mode == Mode::Hiz {
            settings.direction = LineDirection::Input;
        }
        self.reconfigure(settings)?;
        log::debug!("gpio: {} mode {:?}", self.line, mode);
        Ok(())
    }

    fn set_active_low(&mut self, active_low: bool) -> CoreResult<()> {
        let mut settings = self.settings;
        settings.active_low = active_low;
        // Output levels are logical, so restate the physical level we drive.
        if let LineDirection::Output(level) = settings.direction {
            if active_low != self.settings.active_low {
                settings.direction = LineDirection::Output(!level);
            }
        }
        self.reconfigure(settings)?;
        log::debug!("gpio: {} active-low {}", self.line, active_low);
        Ok(())
    }

    fn set_drive(&mut self, output: OutputDrive) -> CoreResult<()> {
        let mut settings = self.settings;
        settings.drive = Some(drive(output));
        self.reconfigure(settings)?;
        log::debug!("gpio: {} drive {:?}", self.line, output);
        Ok(())
    }

    fn watch_edges(&mut self, edge: Edge) -> CoreResult<Box<dyn EdgeSource>> {
        let mut settings = self.settings;
        settings.direction = LineDirection::Input;
        settings.edge = edge_detection(edge);
        self.reconfigure(settings)?;
        log::debug!("gpio: {} watching {:?} edges", self.line, edge);
        Ok(Box::new(LinuxEdgeSource {
            line: self.line,
            request: self.request.clone(),
        }))
    }

    fn unwatch_edges(&mut self) -> CoreResult<()> {
        let mut settings = self.settings;
        settings.edge = None;
        self.reconfigure(settings)?;
        Ok(())
    }

    fn release(self: Box<Self>, keep: bool) {
        if keep {
            log::debug!("gpio: keeping request for {}", self.line);
            self.retained
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(self.line, self.request);
        } else {
            log::debug!("gpio: releasing {}", self.line);
        }
    }
}

/// Edge events from a line request
struct LinuxEdgeSource {
    line: GpioLine,
    request: Arc<Request>,
}

impl EdgeSource for LinuxEdgeSource {
    fn wait(&mut self, timeout: Duration) -> CoreResult<Option<EdgeEvent>> {
        let error = |source| LinuxError::Gpio {
            chip: self.line.chip,
            line: self.line.line,
            source,
        };
        if !self.request.wait_edge_event(timeout).map_err(error)? {
            return Ok(None);
        }
        let event = self.request.read_edge_event().map_err(error)?;
        let kind = match event.kind {
            gpiocdev::line::EdgeKind::Rising => EdgeKind::Rising,
            gpiocdev::line::EdgeKind::Falling => EdgeKind::Falling,
        };
        Ok(Some(EdgeEvent {
            kind,
            timestamp_ns: event.timestamp_ns,
            seqno: u64::from(event.line_seqno),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_paths() {
        assert_eq!(chip_path(0), "/dev/gpiochip0");
        assert_eq!(chip_path(12), "/dev/gpiochip12");
    }

    #[test]
    fn edge_detection_mapping() {
        assert_eq!(edge_detection(Edge::None), None);
        assert_eq!(edge_detection(Edge::Both), Some(EdgeDetection::BothEdges));
        assert_eq!(edge_detection(Edge::Rising), Some(EdgeDetection::RisingEdge));
        assert_eq!(
            edge_detection(Edge::Falling),
            Some(EdgeDetection::FallingEdge)
        );
    }

    #[test]
    fn input_keeps_edge_detection() {
        let settings = LineSettings {
            direction: LineDirection::Input,
            edge: Some(EdgeDetection::RisingEdge),
            ..Default::default()
        };
        let mut cfg = Config::default();
        settings.apply(3, &mut cfg);
        let line = cfg.line_config(3).unwrap();
        assert_eq!(line.edge_detection, Some(EdgeDetection::RisingEdge));
        assert_eq!(line.direction, Some(gpiocdev::line::Direction::Input));
    }

    #[test]
    fn output_settings_carry_bias_drive_and_polarity() {
        let settings = LineSettings {
            direction: LineDirection::Output(true),
            edge: None,
            bias: Some(bias(Mode::PullUp)),
            drive: Some(drive(OutputDrive::OpenDrain)),
            active_low: true,
        };
        let mut cfg = Config::default();
        settings.apply(5, &mut cfg);
        let line = cfg.line_config(5).unwrap();
        assert_eq!(line.bias, Some(Bias::PullUp));
        assert_eq!(line.drive, Some(Drive::OpenDrain));
        assert!(line.active_low);
        assert_eq!(line.value, Some(Value::Active));
    }

    #[test]
    fn mode_mapping() {
        assert_eq!(bias(Mode::Strong), Bias::Disabled);
        assert_eq!(bias(Mode::Hiz), Bias::Disabled);
        assert_eq!(bias(Mode::PullDown), Bias::PullDown);
    }

    #[test]
    #[ignore] // Requires /dev/gpiochip0 with a free line 0
    fn request_and_toggle_line() {
        let retained = RetainedLines::default();
        let mut line = LinuxLine::open(GpioLine::new(0, 0), "boardio-test", &retained).unwrap();
        line.set_direction(Direction::OutLow).unwrap();
        assert!(!line.read().unwrap());
        line.write(true).unwrap();
        assert!(line.read().unwrap());
        Box::new(line).release(false);
    }
}
