//! Lifecycle state machine.
//!
//! [`GusSession`] is the single owner of the equipment state, the device
//! and test bindings, and the one controller handle. Every command runs
//! the same pipeline: reconcile the stored state against a fresh
//! telemetry snapshot, validate the command's precondition on the
//! corrected state, perform the controller operation, commit the new
//! state, and answer with a two-valued token. No command panics or lets
//! an error escape; the host polls `GetStatus`/`GetError` to diagnose.
//!
//! Commands take `&mut self`, so one session serializes its own command
//! stream. A deployment accepting concurrent hosts must put the session
//! behind an exclusive lock or actor; the design assumes one session per
//! physical device.

use crate::config::AdapterSettings;
use crate::controller::{
    format_serial, ControllerConnector, ProfileLoad, TestKind, VibrationController,
};
use crate::error::{AdapterError, ControllerError, ControllerErrorKind};
use crate::reconcile::reconcile;
use crate::profiles;
use crate::report;
use crate::state::EquipmentState;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// Success token of the command protocol.
pub const ACK: &str = "ACK";

/// Failure token of the command protocol.
pub const ERR: &str = "ERR";

/// Two-valued command reply. Rendered with [`fmt::Display`] for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Command succeeded.
    Ack,
    /// Command succeeded; the token carries the controller software
    /// version (`OpenApp` only).
    AckVersion(String),
    /// Command failed.
    Fail,
}

impl Reply {
    /// True for either success variant.
    pub fn is_ack(&self) -> bool {
        !matches!(self, Reply::Fail)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack => f.write_str(ACK),
            Reply::AckVersion(version) => write!(f, "{ACK}:{version}"),
            Reply::Fail => f.write_str(ERR),
        }
    }
}

/// Adapter session: exclusive owner of the controller handle and the
/// lifecycle state.
pub struct GusSession {
    connector: Box<dyn ControllerConnector>,
    settings: AdapterSettings,
    controller: Option<Arc<dyn VibrationController>>,
    state: EquipmentState,
    device: String,
    test: String,
}

impl GusSession {
    /// Create a session with default settings. The connector is only
    /// exercised when the host issues `OpenApp`.
    pub fn new(connector: Box<dyn ControllerConnector>) -> Self {
        Self::with_settings(connector, AdapterSettings::default())
    }

    /// Create a session with explicit settings.
    pub fn with_settings(connector: Box<dyn ControllerConnector>, settings: AdapterSettings) -> Self {
        Self {
            connector,
            settings,
            controller: None,
            state: EquipmentState::DeviceClosed,
            device: String::new(),
            test: String::new(),
        }
    }

    /// Currently committed state. Commands reconcile before validating,
    /// so prefer [`Self::get_status`] for a host-visible answer.
    pub fn state(&self) -> EquipmentState {
        self.state
    }

    /// Currently bound device identifier (empty = none).
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Currently prepared test name (empty = none).
    pub fn test_name(&self) -> &str {
        &self.test
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Correct the stored state against a fresh snapshot. A failed poll
    /// forces `Error`: a state we cannot verify must not be reported as
    /// healthy.
    async fn refresh_state(&mut self) {
        let Some(controller) = self.controller.clone() else {
            return;
        };
        let bound = !self.device.is_empty();
        if !bound && !self.state.is_active_run() {
            return;
        }
        match controller.snapshot().await {
            Ok(snapshot) => {
                let corrected = reconcile(self.state, bound, &snapshot);
                if corrected != self.state {
                    info!(from = %self.state, to = %corrected, "state corrected from telemetry");
                    self.state = corrected;
                }
            }
            Err(error) => {
                warn!(%error, "telemetry poll failed; forcing Error state");
                self.state = EquipmentState::Error;
            }
        }
    }

    // =========================================================================
    // Failure plumbing
    // =========================================================================

    /// Standard failure path: commit `Error` when the failure class
    /// demands it, log, answer `ERR`.
    fn fail(&mut self, err: AdapterError) -> Reply {
        if err.forces_error_state() {
            self.state = EquipmentState::Error;
        }
        warn!(error = %err, state = %self.state, "command failed");
        Reply::Fail
    }

    /// Failure that never moves the state machine (pre-open reads,
    /// `CloseTest` unload faults).
    fn fail_unchanged(&self, err: &AdapterError) -> Reply {
        warn!(error = %err, state = %self.state, "command failed; state unchanged");
        Reply::Fail
    }

    fn reject(&self, command: &'static str) -> Reply {
        self.fail_unchanged(&AdapterError::InvalidState {
            command,
            state: self.state,
        })
    }

    fn call_failed(op: &'static str, source: anyhow::Error) -> AdapterError {
        ControllerError::new(op, ControllerErrorKind::Command, source).into()
    }

    fn read_failed(op: &'static str, source: anyhow::Error) -> AdapterError {
        ControllerError::new(op, ControllerErrorKind::Read, source).into()
    }

    // =========================================================================
    // Lifecycle commands
    // =========================================================================

    /// Acquire the controller handle and report the software version.
    #[instrument(skip(self))]
    pub async fn open_app(&mut self) -> Reply {
        if self.controller.is_none() {
            match self.connector.connect().await {
                Ok(handle) => {
                    info!(connector = self.connector.name(), "controller handle acquired");
                    self.controller = Some(handle);
                }
                Err(source) => {
                    let err = ControllerError::new(
                        "connect",
                        ControllerErrorKind::Connect,
                        source,
                    );
                    return self.fail_unchanged(&err.into());
                }
            }
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };
        match controller.software_version().await {
            Ok(version) => {
                self.state = EquipmentState::DeviceClosed;
                self.device.clear();
                self.test.clear();
                Reply::AckVersion(version)
            }
            Err(source) => {
                // A handle that cannot answer a version query is not worth
                // keeping.
                self.release_controller();
                self.fail_unchanged(&Self::read_failed("software_version", source))
            }
        }
    }

    /// Bind the (single) hardware device, waiting out its boot phase.
    ///
    /// This is the only blocking wait in the adapter: a bounded poll loop
    /// with an explicit deadline and interval. Timeout surfaces as the
    /// ordinary failure token but is logged as its own failure class.
    #[instrument(skip(self))]
    pub async fn open_device(&mut self, device: &str) -> Reply {
        self.refresh_state().await;
        if self.state != EquipmentState::DeviceClosed {
            return self.reject("OpenDevice");
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };

        let started = Instant::now();
        let deadline = started + self.settings.open_timeout();
        loop {
            match controller.status().await {
                Ok(status) if !status.waiting_for_box() => {
                    let discovered = match controller.hardware_serial_number().await {
                        Ok(serial) => format_serial(serial),
                        Err(source) => {
                            return self
                                .fail_unchanged(&Self::read_failed("hardware_serial_number", source));
                        }
                    };
                    if !device.is_empty() && device != discovered {
                        return self.fail_unchanged(&AdapterError::DeviceMismatch {
                            requested: device.to_string(),
                            bound: discovered,
                        });
                    }
                    let bound = if device.is_empty() {
                        discovered
                    } else {
                        device.to_string()
                    };
                    info!(device = %bound, "device bound");
                    self.device = bound;
                    self.state = EquipmentState::DeviceOpen;
                    return Reply::Ack;
                }
                Ok(_) => debug!("box not ready; polling again"),
                Err(source) => {
                    return self.fail_unchanged(&Self::read_failed("status", source));
                }
            }
            if Instant::now() >= deadline {
                return self.fail_unchanged(&AdapterError::OpenTimeout {
                    waited_ms: started.elapsed().as_millis() as u64,
                });
            }
            sleep(self.settings.poll_interval()).await;
        }
    }

    /// Release the device binding. The running process of the equipment
    /// is not influenced.
    #[instrument(skip(self))]
    pub async fn close_device(&mut self, device: &str) -> Reply {
        self.refresh_state().await;
        if self.state != EquipmentState::DeviceOpen {
            return self.reject("CloseDevice");
        }
        if !device.is_empty() && device != self.device {
            return self.fail_unchanged(&AdapterError::DeviceMismatch {
                requested: device.to_string(),
                bound: self.device.clone(),
            });
        }
        self.device.clear();
        self.state = EquipmentState::DeviceClosed;
        Reply::Ack
    }

    /// Load a test profile. A controller that declines the profile moves
    /// the session to `ProjLoadFailed`; a failed call moves it to
    /// `Error`.
    #[instrument(skip(self))]
    pub async fn prepare_test(&mut self, name: &str) -> Reply {
        self.refresh_state().await;
        if !matches!(
            self.state,
            EquipmentState::DeviceOpen | EquipmentState::ProjLoadFailed
        ) {
            return self.reject("PrepareTest");
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };
        self.test.clear();
        match controller.open_test(name).await {
            Ok(ProfileLoad::Loaded) => {
                info!(test = name, "test prepared");
                self.test = name.to_string();
                self.state = EquipmentState::Ready;
                Reply::Ack
            }
            Ok(ProfileLoad::Rejected(reason)) => {
                self.state = EquipmentState::ProjLoadFailed;
                self.fail_unchanged(&AdapterError::ProfileRejected {
                    profile: name.to_string(),
                    reason,
                })
            }
            Err(source) => self.fail(Self::call_failed("open_test", source)),
        }
    }

    /// Start the prepared test. Success is only committed once telemetry
    /// confirms the controller is actually running.
    #[instrument(skip(self))]
    pub async fn start_test(&mut self) -> Reply {
        self.refresh_state().await;
        if self.state != EquipmentState::Ready {
            return self.reject("StartTest");
        }
        if self.test.is_empty() {
            // Ready without a prepared test happens when the operator (or
            // a previous session) left a test loaded; we cannot name a
            // profile to run, so this is out of sequence.
            return self.fail(AdapterError::TestNotPrepared);
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };
        if let Err(source) = controller.run_test(&self.test).await {
            return self.fail(Self::call_failed("run_test", source));
        }
        match controller.running().await {
            Ok(true) => {
                info!(test = %self.test, "test started");
                self.state = EquipmentState::PreTestRunning;
                Reply::Ack
            }
            Ok(false) | Err(_) => self.fail(AdapterError::NotConfirmed {
                command: "StartTest",
                expected: "running",
            }),
        }
    }

    /// Hold the running test without resetting schedule or elapsed time.
    /// The stop must leave the run resumable, otherwise the pause is a
    /// fault.
    #[instrument(skip(self))]
    pub async fn pause_test(&mut self) -> Reply {
        self.refresh_state().await;
        if self.state != EquipmentState::Running {
            return self.reject("PauseTest");
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };
        if let Err(source) = controller.stop_test().await {
            return self.fail(Self::call_failed("stop_test", source));
        }
        match controller.can_resume().await {
            Ok(true) => {
                self.state = EquipmentState::Pause;
                Reply::Ack
            }
            Ok(false) | Err(_) => self.fail(AdapterError::NotConfirmed {
                command: "PauseTest",
                expected: "can_resume",
            }),
        }
    }

    /// Resume a paused test. Three mechanisms, tried by current
    /// telemetry: resume a stopped run, release a level hold, or advance
    /// past a schedule hold to the next level. Whichever is attempted,
    /// success requires the controller to confirm it is running again.
    #[instrument(skip(self))]
    pub async fn continue_test(&mut self) -> Reply {
        self.refresh_state().await;
        if self.state != EquipmentState::Pause {
            return self.reject("ContinueTest");
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };

        let running = match controller.running().await {
            Ok(running) => running,
            Err(source) => return self.fail(Self::call_failed("running", source)),
        };
        let resume = if !running {
            controller.resume_test().await.map_err(|e| ("resume_test", e))
        } else {
            match controller.hold_level().await {
                Ok(true) => controller.advance_run().await.map_err(|e| ("advance_run", e)),
                Ok(false) => controller
                    .advance_level()
                    .await
                    .map_err(|e| ("advance_level", e)),
                Err(source) => Err(("hold_level", source)),
            }
        };
        if let Err((op, source)) = resume {
            return self.fail(Self::call_failed(op, source));
        }
        match controller.running().await {
            Ok(true) => {
                self.state = EquipmentState::Running;
                Reply::Ack
            }
            Ok(false) | Err(_) => self.fail(AdapterError::NotConfirmed {
                command: "ContinueTest",
                expected: "running",
            }),
        }
    }

    /// Terminate the run and return to `Ready`, as after `PrepareTest`.
    #[instrument(skip(self))]
    pub async fn stop_test(&mut self) -> Reply {
        self.refresh_state().await;
        match self.state {
            EquipmentState::Pause | EquipmentState::Running | EquipmentState::PreTestRunning => {
                let Some(controller) = self.controller.clone() else {
                    return self.fail_unchanged(&AdapterError::NoController);
                };
                // Stop only if the output is actually live; a host pause
                // already stopped it.
                let running = match controller.running().await {
                    Ok(running) => running,
                    Err(source) => return self.fail(Self::call_failed("running", source)),
                };
                if running {
                    if let Err(source) = controller.stop_test().await {
                        return self.fail(Self::call_failed("stop_test", source));
                    }
                }
                info!("test stopped");
                self.state = EquipmentState::Ready;
                Reply::Ack
            }
            EquipmentState::Error | EquipmentState::Finished => {
                self.state = EquipmentState::Ready;
                Reply::Ack
            }
            _ => self.reject("StopTest"),
        }
    }

    /// Unload the prepared test and return to `DeviceOpen`. The
    /// controller is parked on the sys-check profile afterwards.
    #[instrument(skip(self))]
    pub async fn close_test(&mut self) -> Reply {
        self.refresh_state().await;
        if !matches!(
            self.state,
            EquipmentState::Ready | EquipmentState::Finished | EquipmentState::Error
        ) {
            return self.reject("CloseTest");
        }
        let Some(controller) = self.controller.clone() else {
            return self.fail_unchanged(&AdapterError::NoController);
        };
        if !self.test.is_empty() {
            // Re-select the bound test so the close hits the right one.
            match controller.open_test(&self.test).await {
                Ok(ProfileLoad::Loaded) => {}
                Ok(ProfileLoad::Rejected(reason)) => {
                    return self.fail_unchanged(&AdapterError::ProfileRejected {
                        profile: self.test.clone(),
                        reason,
                    });
                }
                Err(source) => {
                    return self.fail_unchanged(&Self::call_failed("open_test", source));
                }
            }
            if let Err(source) = controller.close_test().await {
                return self.fail_unchanged(&Self::call_failed("close_test", source));
            }
        }
        if let Err(source) = controller.select_test_kind(TestKind::SysCheck).await {
            return self.fail_unchanged(&Self::call_failed("select_test_kind", source));
        }
        info!(test = %self.test, "test closed");
        self.test.clear();
        self.state = EquipmentState::DeviceOpen;
        Reply::Ack
    }

    /// Release the controller handle and reset every binding. Legal in
    /// any state and idempotent.
    #[instrument(skip(self))]
    pub async fn close_app(&mut self) -> Reply {
        self.release_controller();
        Reply::Ack
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Reconcile, then report the corrected state name verbatim.
    #[instrument(skip(self))]
    pub async fn get_status(&mut self) -> &'static str {
        self.refresh_state().await;
        self.state.name()
    }

    /// Fault text of an aborted run, or the success token when nothing is
    /// aborted. Pure read: never moves the state machine.
    #[instrument(skip(self))]
    pub async fn get_error(&self) -> String {
        let Some(controller) = &self.controller else {
            return ERR.to_string();
        };
        match controller.aborted().await {
            Ok(true) => match controller.status().await {
                Ok(status) => status.text,
                Err(error) => {
                    warn!(%error, "status read failed during GetError");
                    ERR.to_string()
                }
            },
            Ok(false) => ACK.to_string(),
            Err(error) => {
                warn!(%error, "aborted read failed during GetError");
                ERR.to_string()
            }
        }
    }

    /// Minimal status document (device identity, control/demand values,
    /// stop code, elapsed time or pulse counts, per-channel readings).
    #[instrument(skip(self))]
    pub async fn get_info(&self) -> String {
        let Some(controller) = &self.controller else {
            return ERR.to_string();
        };
        match report::status_document(controller.as_ref(), &self.settings.identity).await {
            Ok(document) => document,
            Err(error) => {
                warn!(%error, "status document failed");
                ERR.to_string()
            }
        }
    }

    /// Capability/schema document enumerating the status attributes with
    /// type and read-only metadata.
    #[instrument(skip(self))]
    pub async fn get_device_info(&self) -> String {
        let Some(controller) = &self.controller else {
            return ERR.to_string();
        };
        match report::schema_document(controller.as_ref()).await {
            Ok(document) => document,
            Err(error) => {
                warn!(%error, "schema document failed");
                ERR.to_string()
            }
        }
    }

    /// List on-disk test profiles matching a type keyword or wildcard
    /// pattern. Always a valid `TestProfiles` document.
    #[instrument(skip(self))]
    pub fn get_test_profiles(&self, filter: &str) -> String {
        profiles::list_profiles(&self.settings.profiles_dir, filter)
    }

    /// Device scan is optional in the protocol; this adapter binds one
    /// device and answers with an empty document.
    pub fn scan_devices(&self) -> String {
        String::new()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Drop the handle and clear every binding. Safe to call repeatedly.
    fn release_controller(&mut self) {
        if self.controller.take().is_some() {
            info!("controller handle released");
        }
        self.device.clear();
        self.test.clear();
        self.state = EquipmentState::DeviceClosed;
    }
}

impl Drop for GusSession {
    fn drop(&mut self) {
        self.release_controller();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_tokens_render_verbatim() {
        assert_eq!(Reply::Ack.to_string(), "ACK");
        assert_eq!(Reply::AckVersion("10.1.3".into()).to_string(), "ACK:10.1.3");
        assert_eq!(Reply::Fail.to_string(), "ERR");
        assert!(Reply::Ack.is_ack());
        assert!(Reply::AckVersion("1".into()).is_ack());
        assert!(!Reply::Fail.is_ack());
    }
}
