//! Controller capability trait and telemetry types.
//!
//! The physical vibration controller is consumed through the
//! [`VibrationController`] trait: run/stop/resume primitives plus a handful
//! of polled condition flags. The adapter never sees the vendor binding
//! directly; a [`ControllerConnector`] acquires one handle on `OpenApp` and
//! the session drops it on `CloseApp`.
//!
//! Every capability trait here:
//! - Is async (uses `#[async_trait]`)
//! - Is thread-safe (requires `Send + Sync`)
//! - Uses `anyhow::Result` for errors; all failures are caught at the
//!   session boundary and converted to the token protocol

use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Status code meaning the hardware box has not finished initializing.
/// `OpenDevice` polls until the controller leaves this condition.
pub const STATUS_WAITING_FOR_BOX: i32 = 0x103A;

/// Low status byte meaning the schedule is holding for the operator.
pub const STATUS_WAIT_FOR_OPERATOR: i32 = 0x31;

/// One poll of the controller status register: numeric code plus the
/// operator-facing text for the same condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerStatus {
    /// Vendor status code. Only the low byte carries the schedule condition.
    pub code: i32,
    /// Human-readable status text, also used as the `GetError` fault text.
    pub text: String,
}

impl ControllerStatus {
    /// True while the hardware box is still initializing.
    pub fn waiting_for_box(&self) -> bool {
        self.code == STATUS_WAITING_FOR_BOX
    }

    /// True when the schedule is holding for the operator.
    pub fn wait_for_operator(&self) -> bool {
        (self.code & 0xFF) == STATUS_WAIT_FOR_OPERATOR
    }
}

/// Category of the loaded test profile. Reports branch on `Shock`
/// (pulse counters) versus everything else (elapsed-in-tolerance time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    /// System check; also the idle profile after `CloseTest`.
    SysCheck,
    /// Swept or fixed sine.
    Sine,
    /// Random vibration.
    Random,
    /// Sine-on-random.
    SineOnRandom,
    /// Classical shock pulses.
    Shock,
    /// Transient capture/replay.
    Transient,
    /// Field-data replay.
    Replay,
    /// Arbitrary waveform.
    Waveform,
    /// Calibration.
    Calibration,
}

impl TestKind {
    /// Vendor numeric identifier for the test kind.
    pub fn code(&self) -> i32 {
        match self {
            Self::SysCheck => 0,
            Self::Sine => 1,
            Self::Random => 2,
            Self::SineOnRandom => 3,
            Self::Shock => 4,
            Self::Transient => 5,
            Self::Replay => 6,
            Self::Waveform => 7,
            Self::Calibration => 8,
        }
    }

    /// Map a vendor numeric identifier back to a kind, if known.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::SysCheck,
            1 => Self::Sine,
            2 => Self::Random,
            3 => Self::SineOnRandom,
            4 => Self::Shock,
            5 => Self::Transient,
            6 => Self::Replay,
            7 => Self::Waveform,
            8 => Self::Calibration,
            _ => return None,
        })
    }
}

/// One read-only poll of controller telemetry, used for exactly one
/// reconciliation. Never cached across commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    /// Test output is active (pre-test or main phase).
    pub running: bool,
    /// The last run ended in an abort rather than normal completion.
    pub aborted: bool,
    /// The run is still in its pre-test phase.
    pub starting: bool,
    /// A stopped run can be resumed where it left off.
    pub can_resume: bool,
    /// The schedule is holding at the current level.
    pub hold_level: bool,
    /// Raw status register value.
    pub status_code: i32,
    /// Status text matching `status_code`.
    pub status_text: String,
}

impl ControllerSnapshot {
    /// Snapshot of an idle, healthy controller. Handy for tests.
    pub fn idle() -> Self {
        Self {
            running: false,
            aborted: false,
            starting: false,
            can_resume: false,
            hold_level: false,
            status_code: 0,
            status_text: String::new(),
        }
    }
}

/// Outcome of asking the controller to load a test profile.
///
/// `Rejected` means the call itself succeeded but the controller flagged
/// the profile as unusable; the session maps this to `ProjLoadFailed`
/// rather than `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileLoad {
    /// Profile loaded and selected.
    Loaded,
    /// Controller declined the profile.
    Rejected(String),
}

/// Capability trait for the physical vibration controller.
///
/// All calls may fail; the session catches every failure and converts it
/// into the `Error` state plus a failure token. Implementations must not
/// block the async runtime.
#[async_trait]
pub trait VibrationController: Send + Sync {
    /// Load and select a test profile by name.
    async fn open_test(&self, name: &str) -> Result<ProfileLoad>;

    /// Start the named test. The controller enters its pre-test phase;
    /// callers confirm via [`Self::running`].
    async fn run_test(&self, name: &str) -> Result<()>;

    /// Resume a stopped-but-resumable test.
    async fn resume_test(&self) -> Result<()>;

    /// Stop the active test. A plain stop normally leaves the run
    /// resumable.
    async fn stop_test(&self) -> Result<()>;

    /// Release a level hold and keep the schedule running.
    async fn advance_run(&self) -> Result<()>;

    /// Advance the schedule to its next level.
    async fn advance_level(&self) -> Result<()>;

    /// Close the currently selected test at the controller.
    async fn close_test(&self) -> Result<()>;

    /// Select a test category without loading a profile (used to park the
    /// controller on the sys-check profile after `CloseTest`).
    async fn select_test_kind(&self, kind: TestKind) -> Result<()>;

    /// Test output active?
    async fn running(&self) -> Result<bool>;

    /// Last run aborted?
    async fn aborted(&self) -> Result<bool>;

    /// Run still in pre-test phase?
    async fn starting(&self) -> Result<bool>;

    /// Stopped run resumable?
    async fn can_resume(&self) -> Result<bool>;

    /// Schedule holding at the current level?
    async fn hold_level(&self) -> Result<bool>;

    /// Read the status register.
    async fn status(&self) -> Result<ControllerStatus>;

    /// Read a formatted report field (e.g. `"Control%.2f"`, `"Ch1%f %s"`).
    async fn report_field(&self, fmt: &str) -> Result<String>;

    /// Category of the loaded test.
    async fn test_kind(&self) -> Result<TestKind>;

    /// Controller software version string.
    async fn software_version(&self) -> Result<String>;

    /// Hardware serial number as reported by the box.
    async fn hardware_serial_number(&self) -> Result<u32>;

    /// Number of hardware input channels.
    async fn hardware_input_channels(&self) -> Result<u32>;

    /// Assemble one telemetry snapshot from the individual flag reads.
    ///
    /// The default reads each flag in turn; implementations backed by a
    /// single status word may override with one read.
    async fn snapshot(&self) -> Result<ControllerSnapshot> {
        let status = self.status().await?;
        Ok(ControllerSnapshot {
            running: self.running().await?,
            aborted: self.aborted().await?,
            starting: self.starting().await?,
            can_resume: self.can_resume().await?,
            hold_level: self.hold_level().await?,
            status_code: status.code,
            status_text: status.text,
        })
    }
}

/// Factory for controller handles.
///
/// `OpenApp` acquires exactly one handle through the connector; `CloseApp`
/// (or dropping the session) releases it. The connector is registered once
/// at composition time and lives for the session's lifetime.
pub trait ControllerConnector: Send + Sync {
    /// Human-readable name for logs and error messages.
    fn name(&self) -> &'static str;

    /// Acquire a controller handle asynchronously.
    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn VibrationController>>>;
}

/// Format a hardware serial number the way it is printed on the box label.
pub fn format_serial(serial: u32) -> String {
    format!("{serial:08X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_for_operator_masks_low_byte() {
        let status = ControllerStatus {
            code: 0x0231,
            text: "Wait for operator".into(),
        };
        assert!(status.wait_for_operator());
        assert!(!status.waiting_for_box());

        let status = ControllerStatus {
            code: STATUS_WAITING_FOR_BOX,
            text: "Waiting for box".into(),
        };
        assert!(status.waiting_for_box());
        assert!(!status.wait_for_operator());
    }

    #[test]
    fn test_kind_round_trip() {
        for code in 0..=8 {
            let kind = TestKind::from_code(code).expect("known code");
            assert_eq!(kind.code(), code);
        }
        assert_eq!(TestKind::from_code(42), None);
    }

    #[test]
    fn serial_formatting_matches_box_label() {
        assert_eq!(format_serial(0x9500_CAFE), "9500CAFE");
        assert_eq!(format_serial(0x1A2B), "00001A2B");
    }
}
