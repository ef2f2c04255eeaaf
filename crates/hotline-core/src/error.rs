//! Error types for the hotline domain core.
//!
//! Strongly typed rather than stringly typed so callers can match on the
//! failure and decide whether to surface, retry, or drop.

use thiserror::Error;

use crate::reconnect::SupervisorPhase;

/// Errors from the reconnection supervisor state machine.
///
/// Transport events (opened, closed, activity) are tolerated in any phase;
/// only operations whose premise depends on the current phase can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
    /// Operation attempted in a phase that does not permit it
    #[error("invalid phase: cannot {operation} while {phase:?}")]
    InvalidPhase {
        /// Current phase when the error occurred
        phase: SupervisorPhase,
        /// Operation that was attempted
        operation: &'static str,
    },
}
