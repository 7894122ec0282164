//! Equipment lifecycle states reported over the GUS protocol.
//!
//! The nine states form a closed set; `GetStatus` returns the state name
//! verbatim, so the string rendering here is part of the wire contract.
//! `Error` and `Finished` are recoverable (via `StopTest`/`CloseTest`);
//! there is no terminal state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of the adapted equipment.
///
/// Exactly one state is current at any instant. The initial state of a
/// fresh session is [`EquipmentState::DeviceClosed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EquipmentState {
    /// No device connection; the driver may or may not be loaded.
    DeviceClosed,
    /// Device bound, no test loaded.
    DeviceOpen,
    /// A test profile is loaded and can be started.
    Ready,
    /// The controller accepted a run and is still in its pre-test phase.
    PreTestRunning,
    /// The test is executing.
    Running,
    /// The test is held (host pause or controller schedule pause).
    Pause,
    /// The test ran to completion without an abort.
    Finished,
    /// The controller aborted, a call failed, or a confirmation failed.
    Error,
    /// The controller rejected the requested test profile.
    ProjLoadFailed,
}

impl EquipmentState {
    /// Protocol name of the state, returned verbatim by `GetStatus`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeviceClosed => "DeviceClosed",
            Self::DeviceOpen => "DeviceOpen",
            Self::Ready => "Ready",
            Self::PreTestRunning => "PreTestRunning",
            Self::Running => "Running",
            Self::Pause => "Pause",
            Self::Finished => "Finished",
            Self::Error => "Error",
            Self::ProjLoadFailed => "ProjLoadFailed",
        }
    }

    /// True while the adapter believes the controller is executing a run
    /// that it must track by polling (pre-test or main phase).
    pub fn is_active_run(&self) -> bool {
        matches!(self, Self::PreTestRunning | Self::Running)
    }

    /// True for states in which a device binding may be present.
    pub fn allows_device_binding(&self) -> bool {
        !matches!(self, Self::DeviceClosed)
    }

    /// True for states in which a test binding may be present.
    pub fn allows_test_binding(&self) -> bool {
        matches!(
            self,
            Self::Ready
                | Self::PreTestRunning
                | Self::Running
                | Self::Pause
                | Self::Finished
                | Self::Error
        )
    }
}

impl fmt::Display for EquipmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_verbatim() {
        assert_eq!(EquipmentState::DeviceClosed.name(), "DeviceClosed");
        assert_eq!(EquipmentState::PreTestRunning.name(), "PreTestRunning");
        assert_eq!(EquipmentState::ProjLoadFailed.name(), "ProjLoadFailed");
        assert_eq!(EquipmentState::Pause.to_string(), "Pause");
    }

    #[test]
    fn active_run_states() {
        assert!(EquipmentState::PreTestRunning.is_active_run());
        assert!(EquipmentState::Running.is_active_run());
        assert!(!EquipmentState::Pause.is_active_run());
        assert!(!EquipmentState::Finished.is_active_run());
    }

    #[test]
    fn binding_state_classes() {
        assert!(!EquipmentState::DeviceClosed.allows_device_binding());
        assert!(EquipmentState::Error.allows_device_binding());
        assert!(!EquipmentState::DeviceOpen.allows_test_binding());
        assert!(EquipmentState::Ready.allows_test_binding());
    }
}
