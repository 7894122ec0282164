//! Command/status adapter for a vibration-test controller.
//!
//! The adapter exposes a physical shaker controller to a test-automation
//! host through a small command protocol: lifecycle commands answered
//! with ACK/ERR tokens, plus status queries answered with state names or
//! XML documents. The host's view of the equipment is a nine-state
//! machine; because the controller can also be driven from its own
//! console and can fault on its own, every command first reconciles the
//! stored state against live telemetry before acting.
//!
//! Module map:
//! - [`state`]: the nine-state equipment lifecycle and its wire names
//! - [`controller`]: the [`VibrationController`] capability trait, the
//!   connector factory, and telemetry snapshot types
//! - [`reconcile`]: pure state correction against one telemetry snapshot
//! - [`session`]: [`GusSession`], the command handlers and token protocol
//! - [`report`]: status and schema XML documents
//! - [`profiles`]: on-disk test profile discovery
//! - [`config`]: TOML + environment settings
//! - [`error`]: failure taxonomy and the error-state policy
//! - [`telemetry`]: tracing setup
//! - [`mock`]: scriptable in-memory controller for tests

pub mod config;
pub mod controller;
pub mod error;
pub mod mock;
pub mod profiles;
pub mod reconcile;
pub mod report;
pub mod session;
pub mod state;
pub mod telemetry;

pub use config::{AdapterSettings, DeviceIdentity, OpenDeviceSettings};
pub use controller::{
    format_serial, ControllerConnector, ControllerSnapshot, ControllerStatus, ProfileLoad,
    TestKind, VibrationController, STATUS_WAITING_FOR_BOX, STATUS_WAIT_FOR_OPERATOR,
};
pub use error::{AdapterError, AdapterResult, ControllerError, ControllerErrorKind};
pub use mock::{MockConnector, MockController, UnreachableConnector};
pub use reconcile::{reconcile, schedule_pause};
pub use session::{GusSession, Reply, ACK, ERR};
pub use state::EquipmentState;
