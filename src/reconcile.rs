//! Status reconciliation.
//!
//! The controller can be driven by a console operator and can fault on
//! its own, so the locally stored state is only an intent. Before any
//! command is validated, the stored state is corrected against a fresh
//! telemetry snapshot. The correction is a pure function of
//! `(state, snapshot)` and is idempotent: reconciling twice against an
//! unchanged snapshot yields the same state.

use crate::controller::{ControllerSnapshot, STATUS_WAIT_FOR_OPERATOR};
use crate::state::EquipmentState;

/// True when the controller signals a schedule pause: the low status byte
/// reads "wait for operator", or the schedule is holding at a level.
pub fn schedule_pause(snapshot: &ControllerSnapshot) -> bool {
    (snapshot.status_code & 0xFF) == STATUS_WAIT_FOR_OPERATOR || snapshot.hold_level
}

/// Correct `state` against one fresh controller snapshot.
///
/// `device_bound` gates out-of-band run detection: a controller that is
/// running while no device is bound belongs to some other application and
/// is not adopted.
pub fn reconcile(
    state: EquipmentState,
    device_bound: bool,
    snapshot: &ControllerSnapshot,
) -> EquipmentState {
    use EquipmentState::*;

    // Pre-test runs resolve first; a promotion to Running falls through to
    // the running-state checks below.
    let state = if state == PreTestRunning {
        if !snapshot.running {
            return if snapshot.aborted { Error } else { Finished };
        } else if !snapshot.starting {
            Running
        } else {
            PreTestRunning
        }
    } else {
        state
    };

    if state == Running {
        if schedule_pause(snapshot) {
            Pause
        } else if !snapshot.running {
            if snapshot.aborted {
                Error
            } else {
                Finished
            }
        } else {
            Running
        }
    } else if device_bound && snapshot.running {
        // Out-of-band start: the console operator (or a remote) started a
        // run the host never asked for. Adopt it instead of reporting a
        // stale idle state.
        if schedule_pause(snapshot) {
            Pause
        } else if snapshot.starting {
            PreTestRunning
        } else {
            Running
        }
    } else {
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use EquipmentState::*;

    fn snap() -> ControllerSnapshot {
        ControllerSnapshot::idle()
    }

    #[test]
    fn pretest_resolves_to_finished_or_error() {
        let stopped_clean = ControllerSnapshot {
            running: false,
            ..snap()
        };
        assert_eq!(reconcile(PreTestRunning, true, &stopped_clean), Finished);

        let stopped_aborted = ControllerSnapshot {
            running: false,
            aborted: true,
            ..snap()
        };
        assert_eq!(reconcile(PreTestRunning, true, &stopped_aborted), Error);
    }

    #[test]
    fn pretest_advances_to_running_when_start_phase_ends() {
        let started = ControllerSnapshot {
            running: true,
            starting: false,
            ..snap()
        };
        assert_eq!(reconcile(PreTestRunning, true, &started), Running);

        let still_starting = ControllerSnapshot {
            running: true,
            starting: true,
            ..snap()
        };
        assert_eq!(
            reconcile(PreTestRunning, true, &still_starting),
            PreTestRunning
        );
    }

    #[test]
    fn running_with_hold_level_becomes_pause() {
        let held = ControllerSnapshot {
            running: true,
            starting: false,
            hold_level: true,
            ..snap()
        };
        assert_eq!(reconcile(Running, true, &held), Pause);
    }

    #[test]
    fn running_with_operator_wait_becomes_pause() {
        let waiting = ControllerSnapshot {
            running: true,
            status_code: 0x0A31,
            ..snap()
        };
        assert_eq!(reconcile(Running, true, &waiting), Pause);
    }

    #[test]
    fn running_that_stopped_resolves_by_abort_flag() {
        let finished = ControllerSnapshot {
            running: false,
            ..snap()
        };
        assert_eq!(reconcile(Running, true, &finished), Finished);

        let faulted = ControllerSnapshot {
            running: false,
            aborted: true,
            ..snap()
        };
        assert_eq!(reconcile(Running, true, &faulted), Error);
    }

    #[test]
    fn operator_start_is_adopted() {
        let operator_run = ControllerSnapshot {
            running: true,
            starting: false,
            ..snap()
        };
        assert_eq!(reconcile(DeviceOpen, true, &operator_run), Running);
        assert_eq!(reconcile(Ready, true, &operator_run), Running);
        assert_eq!(reconcile(Finished, true, &operator_run), Running);

        let operator_prestart = ControllerSnapshot {
            running: true,
            starting: true,
            ..snap()
        };
        assert_eq!(reconcile(DeviceOpen, true, &operator_prestart), PreTestRunning);

        let operator_held = ControllerSnapshot {
            running: true,
            hold_level: true,
            ..snap()
        };
        assert_eq!(reconcile(DeviceOpen, true, &operator_held), Pause);
    }

    #[test]
    fn unbound_controller_is_not_adopted() {
        let operator_run = ControllerSnapshot {
            running: true,
            ..snap()
        };
        assert_eq!(reconcile(DeviceClosed, false, &operator_run), DeviceClosed);
    }

    #[test]
    fn pause_with_stopped_controller_stays_paused() {
        // A host-issued pause stops the output; that must not be mistaken
        // for a finished run.
        let stopped = ControllerSnapshot {
            running: false,
            can_resume: true,
            ..snap()
        };
        assert_eq!(reconcile(Pause, true, &stopped), Pause);
    }

    #[test]
    fn idempotent_for_unchanged_snapshot() {
        let cases = [
            (PreTestRunning, ControllerSnapshot { running: true, starting: true, ..snap() }),
            (Running, ControllerSnapshot { running: true, ..snap() }),
            (Running, ControllerSnapshot { running: true, hold_level: true, ..snap() }),
            (Ready, ControllerSnapshot { running: true, starting: false, ..snap() }),
            (Error, ControllerSnapshot { running: false, aborted: true, ..snap() }),
            (Finished, snap()),
        ];
        for (state, snapshot) in cases {
            let once = reconcile(state, true, &snapshot);
            let twice = reconcile(once, true, &snapshot);
            assert_eq!(once, twice, "not idempotent from {state:?}");
        }
    }
}
