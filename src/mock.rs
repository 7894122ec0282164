//! Mock controller for tests and bench-free development.
//!
//! [`MockController`] implements the full [`VibrationController`] surface
//! against in-memory state. Tests script it directly: flip the run flags
//! to simulate an operator at the console, inject a per-operation failure
//! to simulate a dropped vendor link, or mark a profile as rejected to
//! exercise the load-failure path.

use crate::controller::{
    ControllerConnector, ControllerStatus, ProfileLoad, TestKind, VibrationController,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory stand-in for the physical controller.
pub struct MockController {
    running: AtomicBool,
    aborted: AtomicBool,
    starting: AtomicBool,
    can_resume: AtomicBool,
    hold_level: AtomicBool,
    status_code: AtomicI32,
    status_text: RwLock<String>,

    /// `run_test` enters a pre-test phase when set; cleared via
    /// [`Self::finish_pretest`].
    start_in_pretest: AtomicBool,
    /// `stop_test` leaves the run resumable when set.
    resumable_on_stop: AtomicBool,

    loaded_test: RwLock<Option<String>>,
    test_kind: RwLock<TestKind>,
    report_fields: RwLock<HashMap<String, String>>,
    rejected_profiles: RwLock<HashSet<String>>,
    failing_ops: RwLock<HashSet<&'static str>>,

    serial: u32,
    version: String,
    channels: u32,
}

impl MockController {
    /// Controller with sensible idle defaults and two input channels.
    pub fn new() -> Self {
        let channels = 2;
        let mut fields = HashMap::new();
        fields.insert("Control%.2f".to_string(), "1.00".to_string());
        fields.insert("Demand%.2f".to_string(), "1.00".to_string());
        fields.insert("Control%f %s".to_string(), "1.00 G".to_string());
        fields.insert("Demand%f %s".to_string(), "1.00 G".to_string());
        fields.insert("Stopcode".to_string(), "Running".to_string());
        fields.insert("LevelTime".to_string(), "0:00:00".to_string());
        fields.insert("Pulses".to_string(), "0 of 0".to_string());
        for channel in 1..=channels {
            fields.insert(format!("Ch{channel}%.2f"), "0.00".to_string());
            fields.insert(format!("Ch{channel}%f %s"), "0.00 G".to_string());
        }
        Self {
            running: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            starting: AtomicBool::new(false),
            can_resume: AtomicBool::new(false),
            hold_level: AtomicBool::new(false),
            status_code: AtomicI32::new(0),
            status_text: RwLock::new("Stopped".to_string()),
            start_in_pretest: AtomicBool::new(false),
            resumable_on_stop: AtomicBool::new(true),
            loaded_test: RwLock::new(None),
            test_kind: RwLock::new(TestKind::SysCheck),
            report_fields: RwLock::new(fields),
            rejected_profiles: RwLock::new(HashSet::new()),
            failing_ops: RwLock::new(HashSet::new()),
            serial: 0x9500_0042,
            version: "11.0.22".to_string(),
            channels,
        }
    }

    async fn check(&self, op: &'static str) -> Result<()> {
        if self.failing_ops.read().await.contains(op) {
            return Err(anyhow!("injected failure in '{op}'"));
        }
        Ok(())
    }

    // ====== Test scripting ======

    /// Make one controller operation fail until cleared.
    pub async fn fail_on(&self, op: &'static str) {
        self.failing_ops.write().await.insert(op);
    }

    /// Clear all injected failures.
    pub async fn clear_failures(&self) {
        self.failing_ops.write().await.clear();
    }

    /// Mark a profile so `open_test` reports it as rejected.
    pub async fn reject_profile(&self, name: &str) {
        self.rejected_profiles.write().await.insert(name.to_string());
    }

    /// Script the console operator: flip the raw run flags directly.
    pub fn set_flags(&self, running: bool, aborted: bool, starting: bool) {
        self.running.store(running, Ordering::SeqCst);
        self.aborted.store(aborted, Ordering::SeqCst);
        self.starting.store(starting, Ordering::SeqCst);
    }

    /// Script a schedule hold at the current level.
    pub fn set_hold_level(&self, held: bool) {
        self.hold_level.store(held, Ordering::SeqCst);
    }

    /// Script whether a stopped run reads as resumable.
    pub fn set_can_resume(&self, resumable: bool) {
        self.can_resume.store(resumable, Ordering::SeqCst);
    }

    /// Set the status register and its operator text.
    pub async fn set_status(&self, code: i32, text: &str) {
        self.status_code.store(code, Ordering::SeqCst);
        *self.status_text.write().await = text.to_string();
    }

    /// Set the value answered for one report field format.
    pub async fn set_report_field(&self, fmt: &str, value: &str) {
        self.report_fields
            .write()
            .await
            .insert(fmt.to_string(), value.to_string());
    }

    /// Set the category reported for the loaded test.
    pub async fn set_test_kind(&self, kind: TestKind) {
        *self.test_kind.write().await = kind;
    }

    /// Make the next `run_test` stay in its pre-test phase.
    pub fn set_start_in_pretest(&self, pretest: bool) {
        self.start_in_pretest.store(pretest, Ordering::SeqCst);
    }

    /// Whether `stop_test` leaves the run resumable.
    pub fn set_resumable_on_stop(&self, resumable: bool) {
        self.resumable_on_stop.store(resumable, Ordering::SeqCst);
    }

    /// End the pre-test phase of an active run.
    pub fn finish_pretest(&self) {
        self.starting.store(false, Ordering::SeqCst);
    }

    /// Simulate the run completing on its own.
    pub fn finish_run(&self, aborted: bool) {
        self.running.store(false, Ordering::SeqCst);
        self.starting.store(false, Ordering::SeqCst);
        self.aborted.store(aborted, Ordering::SeqCst);
    }

    /// Name of the profile currently loaded, if any.
    pub async fn loaded_test(&self) -> Option<String> {
        self.loaded_test.read().await.clone()
    }
}

impl Default for MockController {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VibrationController for MockController {
    async fn open_test(&self, name: &str) -> Result<ProfileLoad> {
        self.check("open_test").await?;
        if self.rejected_profiles.read().await.contains(name) {
            return Ok(ProfileLoad::Rejected(format!(
                "profile '{name}' failed validation"
            )));
        }
        *self.loaded_test.write().await = Some(name.to_string());
        Ok(ProfileLoad::Loaded)
    }

    async fn run_test(&self, _name: &str) -> Result<()> {
        self.check("run_test").await?;
        self.running.store(true, Ordering::SeqCst);
        self.aborted.store(false, Ordering::SeqCst);
        self.starting
            .store(self.start_in_pretest.load(Ordering::SeqCst), Ordering::SeqCst);
        self.can_resume.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn resume_test(&self) -> Result<()> {
        self.check("resume_test").await?;
        self.running.store(true, Ordering::SeqCst);
        self.can_resume.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_test(&self) -> Result<()> {
        self.check("stop_test").await?;
        self.running.store(false, Ordering::SeqCst);
        self.starting.store(false, Ordering::SeqCst);
        self.can_resume
            .store(self.resumable_on_stop.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }

    async fn advance_run(&self) -> Result<()> {
        self.check("advance_run").await?;
        self.hold_level.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn advance_level(&self) -> Result<()> {
        self.check("advance_level").await?;
        self.hold_level.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close_test(&self) -> Result<()> {
        self.check("close_test").await?;
        *self.loaded_test.write().await = None;
        Ok(())
    }

    async fn select_test_kind(&self, kind: TestKind) -> Result<()> {
        self.check("select_test_kind").await?;
        *self.test_kind.write().await = kind;
        Ok(())
    }

    async fn running(&self) -> Result<bool> {
        self.check("running").await?;
        Ok(self.running.load(Ordering::SeqCst))
    }

    async fn aborted(&self) -> Result<bool> {
        self.check("aborted").await?;
        Ok(self.aborted.load(Ordering::SeqCst))
    }

    async fn starting(&self) -> Result<bool> {
        Ok(self.starting.load(Ordering::SeqCst))
    }

    async fn can_resume(&self) -> Result<bool> {
        self.check("can_resume").await?;
        Ok(self.can_resume.load(Ordering::SeqCst))
    }

    async fn hold_level(&self) -> Result<bool> {
        Ok(self.hold_level.load(Ordering::SeqCst))
    }

    async fn status(&self) -> Result<ControllerStatus> {
        self.check("status").await?;
        Ok(ControllerStatus {
            code: self.status_code.load(Ordering::SeqCst),
            text: self.status_text.read().await.clone(),
        })
    }

    async fn report_field(&self, fmt: &str) -> Result<String> {
        self.check("report_field").await?;
        self.report_fields
            .read()
            .await
            .get(fmt)
            .cloned()
            .ok_or_else(|| anyhow!("unknown report field '{fmt}'"))
    }

    async fn test_kind(&self) -> Result<TestKind> {
        Ok(*self.test_kind.read().await)
    }

    async fn software_version(&self) -> Result<String> {
        self.check("software_version").await?;
        Ok(self.version.clone())
    }

    async fn hardware_serial_number(&self) -> Result<u32> {
        self.check("hardware_serial_number").await?;
        Ok(self.serial)
    }

    async fn hardware_input_channels(&self) -> Result<u32> {
        Ok(self.channels)
    }
}

/// Connector handing out one shared [`MockController`].
pub struct MockConnector {
    controller: Arc<MockController>,
}

impl MockConnector {
    /// Connector yielding the given controller on every connect.
    pub fn new(controller: Arc<MockController>) -> Self {
        Self { controller }
    }
}

impl ControllerConnector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn VibrationController>>> {
        let controller: Arc<dyn VibrationController> = self.controller.clone();
        async move { Ok(controller) }.boxed()
    }
}

/// Connector that always fails, for exercising the `OpenApp` failure path.
pub struct UnreachableConnector;

impl ControllerConnector for UnreachableConnector {
    fn name(&self) -> &'static str {
        "unreachable"
    }

    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn VibrationController>>> {
        async { Err(anyhow!("controller unreachable")) }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_and_stop_track_flags() {
        let ctrl = MockController::new();
        ctrl.run_test("t").await.unwrap();
        assert!(ctrl.running().await.unwrap());
        ctrl.stop_test().await.unwrap();
        assert!(!ctrl.running().await.unwrap());
        assert!(ctrl.can_resume().await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_surface_and_clear() {
        let ctrl = MockController::new();
        ctrl.fail_on("run_test").await;
        assert!(ctrl.run_test("t").await.is_err());
        ctrl.clear_failures().await;
        assert!(ctrl.run_test("t").await.is_ok());
    }

    #[tokio::test]
    async fn rejected_profile_reports_rejection() {
        let ctrl = MockController::new();
        ctrl.reject_profile("bad").await;
        match ctrl.open_test("bad").await.unwrap() {
            ProfileLoad::Rejected(reason) => assert!(reason.contains("bad")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(ctrl.loaded_test().await, None);
    }
}
