//! boardio-hal - Backend selection and the process-wide platform context
//!
//! Ties the pieces together: picks a backend, loads the built-in board
//! tables plus any extra ones named in the configuration, registers the
//! sub-platform probes that were compiled in, and resolves the board.
//!
//! Most programs want exactly one context per process. [`platform`] returns
//! it, initialising it on first use with the defaults; [`init`] does the
//! same with an explicit backend and configuration and must run before the
//! first [`platform`] call to have any effect.
//!
//! # Features
//!
//! - `linux` - Linux kernel backend (`boardio-linux`)
//! - `ft4222` - FT4222H sub-platform probe (`boardio-ft4222`). Off by
//!   default: its GPIO requests have not been checked against hardware.
//! - `mock` - In-memory backend for tests and demos
//!
//! # Environment
//!
//! `BOARDIO_PLATFORM` names the board table to use when the configuration
//! does not force one.

use std::sync::Arc;

use boardio_core::backend::Backend;
use boardio_core::board::{BoardDatabase, BoardDbError};
use boardio_core::subplatform::SubplatformProbe;
use boardio_core::{PlatformConfig, PlatformContext};
use once_cell::sync::OnceCell;
use thiserror::Error;

/// Environment variable forcing the board table
pub const PLATFORM_ENV: &str = "BOARDIO_PLATFORM";

/// Errors from setting up a platform
#[derive(Debug, Error)]
pub enum HalError {
    /// A board table failed to load
    #[error("Board tables: {0}")]
    BoardDb(#[from] BoardDbError),

    /// The requested backend was not compiled in
    #[error("Backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),

    /// Board detection or another core operation failed
    #[error("{0}")]
    Core(#[from] boardio_core::Error),

    /// The global context was already initialised
    #[error("Platform already initialised")]
    AlreadyInitialized,
}

/// Result type for HAL setup
pub type Result<T> = std::result::Result<T, HalError>;

/// Which backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// The Linux kernel interfaces
    Linux,
    /// The in-memory mock board
    Mock,
}

impl BackendKind {
    /// Name used in logs and on the command line
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Linux => "linux",
            BackendKind::Mock => "mock",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(feature = "linux") {
            BackendKind::Linux
        } else {
            BackendKind::Mock
        }
    }
}

/// Apply a `BOARDIO_PLATFORM` value unless the configuration forces a board
fn apply_board_override(mut config: PlatformConfig, env: Option<String>) -> PlatformConfig {
    if config.board.is_none() {
        if let Some(name) = env.filter(|n| !n.trim().is_empty()) {
            log::debug!("hal: board '{}' from {}", name.trim(), PLATFORM_ENV);
            config.board = Some(name.trim().to_string());
        }
    }
    config
}

/// Built-in board tables plus the extra ones listed in `config`
pub fn load_database(config: &PlatformConfig) -> Result<BoardDatabase> {
    let mut db = BoardDatabase::with_builtin()?;
    for path in &config.board_db {
        let count = db.load_path(path)?;
        log::info!("hal: loaded {} board table(s) from {}", count, path.display());
    }
    Ok(db)
}

/// Sub-platform probes compiled into this build
pub fn default_probes() -> Vec<Box<dyn SubplatformProbe>> {
    #[allow(unused_mut)]
    let mut probes: Vec<Box<dyn SubplatformProbe>> = Vec::new();
    #[cfg(feature = "ft4222")]
    probes.push(Box::new(boardio_ft4222::Ft4222Probe::new()));
    probes
}

fn backend(kind: BackendKind, config: &mut PlatformConfig) -> Result<Arc<dyn Backend>> {
    match kind {
        #[cfg(feature = "linux")]
        BackendKind::Linux => Ok(Arc::new(boardio_linux::LinuxBackend::new())),
        #[cfg(feature = "mock")]
        BackendKind::Mock => {
            if config.board.is_none() {
                config.board = Some(boardio_core::mock::MOCK_BOARD.to_string());
            }
            Ok(Arc::new(boardio_core::mock::MockBackend::new()))
        }
        #[allow(unreachable_patterns)]
        other => {
            let _ = config;
            Err(HalError::BackendUnavailable(other.name()))
        }
    }
}

/// Build a platform context and resolve its board
///
/// Unlike [`PlatformContext::new`], this fails straight away when no board
/// can be detected.
pub fn open_platform(kind: BackendKind, config: PlatformConfig) -> Result<PlatformContext> {
    let mut config = apply_board_override(config, std::env::var(PLATFORM_ENV).ok());
    let backend = backend(kind, &mut config)?;
    let database = load_database(&config)?;
    let probes = if config.subplatform_detection {
        default_probes()
    } else {
        Vec::new()
    };

    let ctx = PlatformContext::new(backend, database, config, probes);
    let board = ctx.resolve_platform()?;
    log::info!(
        "hal: {} on {} backend, boardio {}",
        board.display_name(),
        kind.name(),
        ctx.version()
    );
    Ok(ctx)
}

static PLATFORM: OnceCell<PlatformContext> = OnceCell::new();

/// Initialise the process-wide context
///
/// Fails with [`HalError::AlreadyInitialized`] if a context exists.
pub fn init(kind: BackendKind, config: PlatformConfig) -> Result<&'static PlatformContext> {
    let ctx = open_platform(kind, config)?;
    PLATFORM
        .set(ctx)
        .map_err(|_| HalError::AlreadyInitialized)?;
    PLATFORM.get().ok_or(HalError::AlreadyInitialized)
}

/// The process-wide context, initialised with defaults on first use
pub fn platform() -> Result<&'static PlatformContext> {
    PLATFORM.get_or_try_init(|| open_platform(BackendKind::default(), PlatformConfig::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_only_applies_without_forced_board() {
        let config = apply_board_override(PlatformConfig::new(), Some("raspberry-pi".into()));
        assert_eq!(config.board.as_deref(), Some("raspberry-pi"));

        let forced = PlatformConfig::new().with_board("galileo-gen2");
        let config = apply_board_override(forced, Some("raspberry-pi".into()));
        assert_eq!(config.board.as_deref(), Some("galileo-gen2"));

        let config = apply_board_override(PlatformConfig::new(), Some("  ".into()));
        assert_eq!(config.board, None);
    }

    #[test]
    fn builtin_tables_load() {
        let db = load_database(&PlatformConfig::new()).unwrap();
        assert!(db.find_by_name("mock").is_some());
        assert!(db.find_by_name("raspberry-pi").is_some());
    }

    #[test]
    fn missing_extra_table_is_an_error() {
        let config = PlatformConfig::new().with_board_db("/nonexistent/boards.ron");
        assert!(matches!(
            load_database(&config),
            Err(HalError::BoardDb(_))
        ));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn mock_backend_resolves_mock_board() {
        let config = PlatformConfig::new()
            .with_board("mock")
            .with_subplatform_detection(false);
        let ctx = open_platform(BackendKind::Mock, config).unwrap();
        assert_eq!(ctx.platform_name().unwrap(), "boardio Mock Platform");
        assert_eq!(ctx.pin_count().unwrap(), 14);
    }

    #[cfg(feature = "mock")]
    #[test]
    fn unknown_forced_board_fails_early() {
        let config = PlatformConfig::new()
            .with_board("no-such-board")
            .with_subplatform_detection(false);
        assert!(matches!(
            open_platform(BackendKind::Mock, config),
            Err(HalError::Core(boardio_core::Error::PlatformNotDetected))
        ));
    }
}
