//! Adapter error taxonomy.
//!
//! Nothing in this crate raises an error past the command boundary: every
//! failure is folded into the two-token reply protocol. These types exist
//! so the interior of the session can distinguish failure classes — an
//! invalid-state rejection must not touch the controller, a controller
//! call failure must force the `Error` state, and an `OpenDevice` timeout
//! must stay distinguishable from a hardware fault even though both
//! surface as the same failure token.

use crate::state::EquipmentState;
use thiserror::Error;

/// Convenience alias for results using the adapter error type.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Failure class of a single controller operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerErrorKind {
    /// Handle acquisition failed.
    Connect,
    /// A command primitive (run/stop/resume/load) failed.
    Command,
    /// A telemetry or report read failed.
    Read,
}

impl std::fmt::Display for ControllerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ControllerErrorKind::Connect => "connect",
            ControllerErrorKind::Command => "command",
            ControllerErrorKind::Read => "read",
        };
        write!(f, "{}", label)
    }
}

/// A failed controller call, tagged with the operation that failed.
#[derive(Error, Debug)]
#[error("controller {kind} failure in '{op}': {source}")]
pub struct ControllerError {
    /// Operation name, e.g. `"run_test"`.
    pub op: &'static str,
    /// Failure class.
    pub kind: ControllerErrorKind,
    /// Underlying driver error.
    #[source]
    pub source: anyhow::Error,
}

impl ControllerError {
    /// Tag a driver failure with the operation it came from.
    pub fn new(op: &'static str, kind: ControllerErrorKind, source: anyhow::Error) -> Self {
        Self { op, kind, source }
    }
}

/// Primary error type for the adapter.
#[derive(Error, Debug)]
pub enum AdapterError {
    /// Command invoked when the corrected state does not satisfy its
    /// precondition. No state change, no controller call attempted.
    #[error("command '{command}' invalid in state {state}")]
    InvalidState {
        /// Command name as seen by the host.
        command: &'static str,
        /// Corrected state at the time of the call.
        state: EquipmentState,
    },

    /// Supplied device identifier does not match the bound device.
    #[error("device '{requested}' does not match bound device '{bound}'")]
    DeviceMismatch {
        /// Identifier supplied by the host.
        requested: String,
        /// Identifier currently bound.
        bound: String,
    },

    /// Start requested with no test ever prepared.
    #[error("no test prepared; StartTest requires a prior PrepareTest")]
    TestNotPrepared,

    /// A controller call failed. Forces the `Error` state except for pure
    /// reads.
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// The controller accepted a command but post-action telemetry does
    /// not confirm the expected effect. Forces the `Error` state.
    #[error("controller did not confirm '{expected}' after {command}")]
    NotConfirmed {
        /// Command that was issued.
        command: &'static str,
        /// Telemetry condition that was expected afterwards.
        expected: &'static str,
    },

    /// The hardware box never left its not-ready condition within the
    /// `OpenDevice` deadline. Ordinary failure, not fatal.
    #[error("device open timed out after {waited_ms} ms waiting for the box")]
    OpenTimeout {
        /// Total time waited before giving up.
        waited_ms: u64,
    },

    /// The controller declined the requested test profile.
    #[error("controller rejected profile '{profile}': {reason}")]
    ProfileRejected {
        /// Profile name as requested.
        profile: String,
        /// Controller-reported reason.
        reason: String,
    },

    /// A report field could not be interpreted (bad pulse counts, bad
    /// level-time format).
    #[error("malformed report field '{field}': {detail}")]
    MalformedReportField {
        /// Report field format string that was read.
        field: &'static str,
        /// What was wrong with the value.
        detail: String,
    },

    /// Command requires a controller handle but none is held.
    #[error("no controller handle; OpenApp has not succeeded")]
    NoController,
}

impl AdapterError {
    /// True when the session must commit the `Error` state for this
    /// failure. Precondition and binding rejections leave state alone;
    /// timeouts during `OpenDevice` are ordinary failures.
    pub fn forces_error_state(&self) -> bool {
        matches!(
            self,
            AdapterError::Controller(_)
                | AdapterError::NotConfirmed { .. }
                | AdapterError::TestNotPrepared
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn controller_error_display_names_the_operation() {
        let err = ControllerError::new(
            "run_test",
            ControllerErrorKind::Command,
            anyhow!("box went away"),
        );
        let msg = err.to_string();
        assert!(msg.contains("run_test"));
        assert!(msg.contains("command"));
    }

    #[test]
    fn error_state_policy() {
        let invalid = AdapterError::InvalidState {
            command: "StartTest",
            state: EquipmentState::DeviceClosed,
        };
        assert!(!invalid.forces_error_state());

        let timeout = AdapterError::OpenTimeout { waited_ms: 10_000 };
        assert!(!timeout.forces_error_state());

        let confirm = AdapterError::NotConfirmed {
            command: "StartTest",
            expected: "running",
        };
        assert!(confirm.forces_error_state());
    }
}
