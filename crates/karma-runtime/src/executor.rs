//! Action executor.
//!
//! [`ActionContext`] saves an arm controller's configuration, applies the
//! settings an action needs and puts the saved configuration back when it
//! goes out of scope, however the action ends. [`Executor`] drives a
//! waypoint list through that controller.
//!
//! Waits are advisory: a leg that does not report completion within its
//! timeout is logged and the sequence moves on. A raised interrupt skips
//! every remaining leg.

use karma_hal::{CartesianController, Clock, ContextId, DofMask, TaskTweak};
use karma_planner::{ActionProfile, Waypoint};
use karma_types::KarmaError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::session::InterruptFlag;

/// Completion polling period, seconds.
pub const MOTION_POLL: f64 = 0.1;

/// Secondary task keeping the elbow up during neutral-frame actions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElbowTask {
    /// Meters.
    #[serde(default = "ElbowTask::default_height")]
    pub height: f64,
    #[serde(default = "ElbowTask::default_weight")]
    pub weight: f64,
}

impl ElbowTask {
    fn default_height() -> f64 {
        0.4
    }

    fn default_weight() -> f64 {
        30.0
    }
}

impl Default for ElbowTask {
    fn default() -> Self {
        Self {
            height: Self::default_height(),
            weight: Self::default_weight(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ActionContext
// ────────────────────────────────────────────────────────────────────────────

/// Saved controller configuration, restored and released exactly once on
/// drop.
pub struct ActionContext<'a> {
    ctrl: &'a dyn CartesianController,
    saved: ContextId,
}

impl<'a> ActionContext<'a> {
    /// Save `ctrl`'s configuration without changing it.
    ///
    /// # Errors
    ///
    /// Fails if the controller cannot store its context; nothing needs
    /// restoring in that case.
    pub fn store(ctrl: &'a dyn CartesianController) -> Result<Self, KarmaError> {
        let saved = ctrl.store_context()?;
        debug!(arm = ctrl.id(), context = saved.0, "context stored");
        Ok(Self { ctrl, saved })
    }

    /// Save the configuration, then apply `profile`: straightness, the elbow
    /// task when the profile asks for it and one is configured, and every
    /// joint except torso roll.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures. The saved context is restored
    /// before returning.
    pub fn for_action(
        ctrl: &'a dyn CartesianController,
        profile: &ActionProfile,
        elbow: Option<ElbowTask>,
    ) -> Result<Self, KarmaError> {
        let context = Self::store(ctrl)?;
        ctrl.tweak(&TaskTweak::Straightness(profile.straightness))?;
        if let (true, Some(elbow)) = (profile.bias_elbow, elbow) {
            ctrl.tweak(&TaskTweak::ElbowHeight {
                height: elbow.height,
                weight: elbow.weight,
            })?;
        }
        context.restrict_dof(&[DofMask::TORSO_ROLL])?;
        Ok(context)
    }

    /// Save the configuration and keep the torso still: every joint except
    /// torso pitch and roll.
    ///
    /// # Errors
    ///
    /// Propagates collaborator failures. The saved context is restored
    /// before returning.
    pub fn for_exploration(ctrl: &'a dyn CartesianController) -> Result<Self, KarmaError> {
        let context = Self::store(ctrl)?;
        context.restrict_dof(&[DofMask::TORSO_PITCH, DofMask::TORSO_ROLL])?;
        Ok(context)
    }

    fn restrict_dof(&self, disabled: &[usize]) -> Result<(), KarmaError> {
        let current = self.ctrl.dof()?;
        let applied = self.ctrl.set_dof(&current.enabling_all_except(disabled))?;
        debug!(arm = self.ctrl.id(), dof = ?applied.0, "dof applied");
        Ok(())
    }

    pub fn controller(&self) -> &'a dyn CartesianController {
        self.ctrl
    }
}

impl Drop for ActionContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.ctrl.restore_context(self.saved) {
            warn!(arm = self.ctrl.id(), error = %e, "context restore failed");
        }
        if let Err(e) = self.ctrl.delete_context(self.saved) {
            warn!(arm = self.ctrl.id(), error = %e, "context delete failed");
        }
        debug!(arm = self.ctrl.id(), context = self.saved.0, "context released");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Executor
// ────────────────────────────────────────────────────────────────────────────

/// How a waypoint sequence ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Legs that were commanded.
    pub executed: usize,
    /// Legs that did not report completion before their timeout.
    pub timed_out: usize,
    pub interrupted: bool,
}

/// Drives waypoints through one controller.
pub struct Executor<'a> {
    clock: &'a dyn Clock,
    interrupt: &'a InterruptFlag,
}

impl<'a> Executor<'a> {
    pub fn new(clock: &'a dyn Clock, interrupt: &'a InterruptFlag) -> Self {
        Self { clock, interrupt }
    }

    /// Command each leg in order and wait for it, stopping early only on
    /// interrupt. A failed leg is logged and skipped.
    pub fn run(&self, context: &ActionContext<'_>, waypoints: &[Waypoint]) -> RunReport {
        let ctrl = context.controller();
        let mut report = RunReport {
            executed: 0,
            timed_out: 0,
            interrupted: false,
        };

        for (leg, wp) in waypoints.iter().enumerate() {
            if self.interrupt.is_raised() {
                info!(arm = ctrl.id(), skipped = waypoints.len() - leg, "action interrupted");
                report.interrupted = true;
                break;
            }

            debug!(arm = ctrl.id(), leg, pose = ?wp.pose, duration = wp.duration, "go to pose");
            if let Err(e) = ctrl.go_to_pose(&wp.pose, wp.duration) {
                warn!(arm = ctrl.id(), leg, error = %e, "pose request failed; continuing");
                continue;
            }
            report.executed += 1;

            if !self.wait_motion_done(ctrl, wp.timeout) {
                report.timed_out += 1;
            }
        }
        report
    }

    /// Poll for completion every [`MOTION_POLL`] seconds, for at most
    /// `timeout` seconds. Returns `false` when the motion was not seen to
    /// finish.
    pub fn wait_motion_done(&self, ctrl: &dyn CartesianController, timeout: f64) -> bool {
        let start = self.clock.now();
        loop {
            match ctrl.check_motion_done() {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(arm = ctrl.id(), error = %e, "motion status unavailable; continuing");
                    return false;
                }
            }
            if self.interrupt.is_raised() {
                return false;
            }
            if self.clock.now() - start >= timeout {
                warn!(arm = ctrl.id(), timeout, "motion not done before timeout; continuing");
                return false;
            }
            self.clock.sleep(MOTION_POLL);
        }
    }
}
