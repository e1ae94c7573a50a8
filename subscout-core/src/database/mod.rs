//! Scan persistence.

pub mod ports;
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use ports::{ScanRepository, allowed_predecessors, apply_status_change};
pub use postgres::PostgresScanRepository;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::InMemoryScanRepository;
