//! Board tables and pin descriptors
//!
//! This module provides the static description of supported boards (pins,
//! capabilities, mux requirements, bus wiring) and the database that loads
//! them from RON tables.

mod capabilities;
mod database;
mod types;

pub use capabilities::{Capabilities, Capability, Directions};
pub use database::{BoardDatabase, BoardDbError};
pub use types::*;
