//! Scan lifecycle: running one scan, tracking the ones in flight, and
//! cleaning up after an unclean shutdown.

pub mod control;
pub mod orchestrator;
pub mod reconcile;

pub use control::{ScanControlError, ScanControlPlane};
pub use orchestrator::{
    CRITICAL_ERROR_PREFIX, NO_TOOLS_MESSAGE, SYSTEM_ACTOR, ScanOrchestrator,
    TOOLS_FAILED_PREFIX,
};
pub use reconcile::{INTERRUPTED_MESSAGE, reconcile_stale_scans};
