//! Tool-tip discovery.
//!
//! The hand visits each [exploration point][crate::exploration] in turn.
//! At every point the tool is shaken while the gaze chases the tracked tip
//! until the tip sits steadily in the upper part of the image, then the
//! external solver accumulates a batch of samples. After the last point the
//! solver is asked for the tip position in the hand frame.
//!
//! ```text
//! Idle ─▶ Exploring(i) ─▶ Converging ─▶ Sampling ─┬─▶ Exploring(i + 1)
//!                                                  └─▶ Solving ─▶ Idle
//! ```
//!
//! An interrupt short-circuits to `Idle` from any state; cleanup (solver
//! accumulation off, shaking stopped, arm and gaze contexts restored) still
//! runs.

use karma_geometry::Vec3;
use karma_hal::{
    CartesianController, Clock, ContextId, Devices, GazeController, HandController, PixelSource,
    ToolSolver,
};
use karma_planner::Waypoint;
use karma_types::{Arm, Eye, KarmaError, Pixel};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::executor::{ActionContext, Executor};
use crate::exploration::{self, ExplorationPoint};
use crate::session::{ActiveHand, InterruptFlag, ShakingHand};

/// Trajectory time of each exploration move, seconds.
pub const EXPLORATION_MOVE_TIME: f64 = 1.0;

/// Advisory completion timeout of each exploration move, seconds.
pub const EXPLORATION_TIMEOUT: f64 = 5.0;

/// Added to the tracked pixel's row before fixating it.
pub const GAZE_ROW_BIAS: f64 = 50.0;

/// Row the biased tip must settle on.
pub const TARGET_ROW: f64 = 120.0;

/// Accepted distance from [`TARGET_ROW`], pixels.
pub const ROW_TOLERANCE: f64 = 30.0;

/// Length of a convergence window, seconds.
pub const WINDOW: f64 = 3.0;

/// Observations a window needs before it can declare convergence.
pub const MIN_OBSERVATIONS: usize = 20;

/// Convergence loop period, seconds.
pub const GAZE_POLL: f64 = 0.02;

/// Sampling loop period, seconds.
pub const SAMPLE_POLL: f64 = 0.1;

pub const NECK_TRAJ_TIME: f64 = 2.5;
pub const EYES_TRAJ_TIME: f64 = 1.5;

// ────────────────────────────────────────────────────────────────────────────
// Convergence window
// ────────────────────────────────────────────────────────────────────────────

/// Running row average over one convergence window.
#[derive(Debug, Clone, PartialEq)]
pub struct GazeWindow {
    start: f64,
    row_sum: f64,
    count: usize,
}

impl GazeWindow {
    pub fn new(start: f64) -> Self {
        Self {
            start,
            row_sum: 0.0,
            count: 0,
        }
    }

    /// Add a (biased) observation.
    pub fn observe(&mut self, px: Pixel) {
        self.row_sum += px.v;
        self.count += 1;
    }

    /// At `now`, close the window if it has lasted [`WINDOW`] seconds and
    /// say whether it converged. A closed window restarts empty at `now`.
    pub fn close_if_elapsed(&mut self, now: f64) -> Option<bool> {
        if now - self.start < WINDOW {
            return None;
        }
        let converged = self.count > MIN_OBSERVATIONS
            && (self.row_sum / self.count as f64 - TARGET_ROW).abs() < ROW_TOLERANCE;
        debug!(observations = self.count, converged, "gaze window closed");
        *self = Self::new(now);
        Some(converged)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Guards
// ────────────────────────────────────────────────────────────────────────────

/// Saved gaze configuration, restored and released on drop.
struct GazeContext<'a> {
    gaze: &'a dyn GazeController,
    saved: ContextId,
}

impl<'a> GazeContext<'a> {
    fn store(gaze: &'a dyn GazeController) -> Result<Self, KarmaError> {
        let saved = gaze.store_context()?;
        Ok(Self { gaze, saved })
    }
}

impl Drop for GazeContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.gaze.restore_context(self.saved) {
            warn!(error = %e, "gaze context restore failed");
        }
        if let Err(e) = self.gaze.delete_context(self.saved) {
            warn!(error = %e, "gaze context delete failed");
        }
    }
}

/// Marks a hand as shaking; on drop stops the joint, then unmarks it.
struct Shaking<'a> {
    active: &'a ActiveHand,
    hand: &'a dyn HandController,
    joint: usize,
}

impl<'a> Shaking<'a> {
    fn start(
        active: &'a ActiveHand,
        hand: &'a dyn HandController,
        shaking: ShakingHand,
    ) -> Result<Self, KarmaError> {
        hand.set_velocity_mode(shaking.joint)?;
        active.set(shaking);
        Ok(Self {
            active,
            hand,
            joint: shaking.joint,
        })
    }
}

impl Drop for Shaking<'_> {
    fn drop(&mut self) {
        let stopped = self.active.release_with(|| self.hand.stop_joint(self.joint));
        if let Err(e) = stopped {
            warn!(hand = self.hand.id(), error = %e, "hand stop failed");
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Discovery
// ────────────────────────────────────────────────────────────────────────────

/// Runs tool-tip discovery on one arm.
pub struct Discovery<'a> {
    devices: &'a Devices,
    clock: &'a dyn Clock,
    interrupt: &'a InterruptFlag,
    active_hand: &'a ActiveHand,
}

impl<'a> Discovery<'a> {
    pub fn new(
        devices: &'a Devices,
        clock: &'a dyn Clock,
        interrupt: &'a InterruptFlag,
        active_hand: &'a ActiveHand,
    ) -> Self {
        Self {
            devices,
            clock,
            interrupt,
            active_hand,
        }
    }

    /// Explore every point with `arm`, watching through `eye`, and return
    /// the solved tip. `Ok(None)` means the run was interrupted.
    ///
    /// # Errors
    ///
    /// Gaze, hand and solver failures abort the run after cleanup. Motion
    /// failures are logged and the run continues.
    pub fn run(
        &self,
        arm: Arm,
        eye: Eye,
        solver: &mut dyn ToolSolver,
        pixels: &mut dyn PixelSource,
    ) -> Result<Option<Vec3>, KarmaError> {
        let span = info_span!("find", session = %Uuid::new_v4(), %arm, %eye);
        let _entered = span.enter();

        let ctrl: &dyn CartesianController = self.devices.arm(arm).as_ref();
        let arm_context = ActionContext::for_exploration(ctrl)?;
        let gaze_context = GazeContext::store(self.devices.gaze.as_ref())?;

        solver.clear()?;
        solver.select(arm, eye)?;

        for (index, point) in exploration::points(arm).iter().enumerate() {
            if self.interrupt.is_raised() {
                info!(point = index + 1, "discovery interrupted");
                return Ok(None);
            }
            info!(point = index + 1, batch = point.batch, "exploring");
            self.visit(&arm_context, arm, eye, point, solver, pixels)?;
        }
        if self.interrupt.is_raised() {
            info!("discovery interrupted before solving");
            return Ok(None);
        }

        let tip = solver.solve()?;
        info!(x = tip.x, y = tip.y, z = tip.z, "tool tip found");

        drop(gaze_context);
        drop(arm_context);
        Ok(Some(tip))
    }

    fn visit(
        &self,
        arm_context: &ActionContext<'_>,
        arm: Arm,
        eye: Eye,
        point: &ExplorationPoint,
        solver: &mut dyn ToolSolver,
        pixels: &mut dyn PixelSource,
    ) -> Result<(), KarmaError> {
        let gaze = self.devices.gaze.as_ref();
        gaze.restore_context(ContextId::STARTUP)?;

        if !self.interrupt.is_raised() {
            gaze.set_tracking_mode(true)?;
            gaze.look_at_fixation_point(point.fixation_point())?;
            let leg = Waypoint::new(point.pose, EXPLORATION_MOVE_TIME, EXPLORATION_TIMEOUT);
            Executor::new(self.clock, self.interrupt).run(arm_context, &[leg]);
        }

        gaze.set_saccades(false)?;
        gaze.set_neck_traj_time(NECK_TRAJ_TIME)?;
        gaze.set_eyes_traj_time(EYES_TRAJ_TIME)?;

        let _shaking = Shaking::start(
            self.active_hand,
            self.devices.hand(arm).as_ref(),
            ShakingHand {
                arm,
                joint: point.shake_joint,
            },
        )?;

        if self.converge(eye, pixels) {
            debug!("gaze converged on the tool tip");
        }
        self.sample(point.batch, eye, solver, pixels)
    }

    /// Follow the tip until a window converges. Returns `false` when
    /// interrupted first.
    fn converge(&self, eye: Eye, pixels: &mut dyn PixelSource) -> bool {
        let mut window = GazeWindow::new(self.clock.now());
        while !self.interrupt.is_raised() {
            let now = self.clock.now();
            if let Some(px) = self.follow(eye, pixels) {
                window.observe(px);
            }
            if window.close_if_elapsed(now) == Some(true) {
                return true;
            }
            self.clock.sleep(GAZE_POLL);
        }
        false
    }

    /// Accumulate `batch` more solver samples, still following the tip.
    fn sample(
        &self,
        batch: usize,
        eye: Eye,
        solver: &mut dyn ToolSolver,
        pixels: &mut dyn PixelSource,
    ) -> Result<(), KarmaError> {
        solver.enable()?;
        let gathered = self.gather(batch, eye, solver, pixels);
        let disabled = solver.disable();
        gathered?;
        disabled
    }

    fn gather(
        &self,
        batch: usize,
        eye: Eye,
        solver: &mut dyn ToolSolver,
        pixels: &mut dyn PixelSource,
    ) -> Result<(), KarmaError> {
        let target = solver.sample_count()? + batch;
        while !self.interrupt.is_raised() {
            let count = solver.sample_count()?;
            if count >= target {
                debug!(count, "batch gathered");
                break;
            }
            self.follow(eye, pixels);
            self.clock.sleep(SAMPLE_POLL);
        }
        Ok(())
    }

    /// Fixate the latest tip observation, if any. Returns the biased pixel.
    fn follow(&self, eye: Eye, pixels: &mut dyn PixelSource) -> Option<Pixel> {
        let raw = pixels.poll()?;
        let px = Pixel::new(raw.u, raw.v + GAZE_ROW_BIAS);
        if let Err(e) = self.devices.gaze.look_at_mono_pixel(eye, px) {
            warn!(error = %e, "pixel fixation failed");
        }
        Some(px)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SimRig, sim_devices};
    use karma_hal::SimClock;
    use karma_hal::sim::{GazeCall, ScriptedPixels, SimArm, SimSolver, SolverCall};

    fn tip() -> Vec3 {
        Vec3::new(0.12, -0.03, 0.2)
    }

    #[test]
    fn window_converges_on_a_steady_tip() {
        let mut window = GazeWindow::new(0.0);
        for _ in 0..30 {
            window.observe(Pixel::new(160.0, 125.0));
        }
        assert_eq!(window.close_if_elapsed(2.9), None);
        assert_eq!(window.close_if_elapsed(3.0), Some(true));
        // Restarted empty.
        assert_eq!(window.close_if_elapsed(6.0), Some(false));
    }

    #[test]
    fn window_needs_enough_observations_near_the_target() {
        let mut sparse = GazeWindow::new(0.0);
        for _ in 0..20 {
            sparse.observe(Pixel::new(160.0, 120.0));
        }
        assert_eq!(sparse.close_if_elapsed(3.0), Some(false));

        let mut off = GazeWindow::new(0.0);
        for _ in 0..50 {
            off.observe(Pixel::new(160.0, 160.0));
        }
        assert_eq!(off.close_if_elapsed(3.0), Some(false));
    }

    fn run(
        sim: &SimRig,
        arm: Arm,
        interrupt: &InterruptFlag,
        solver: &mut SimSolver,
        pixels: &mut ScriptedPixels,
    ) -> (Result<Option<Vec3>, KarmaError>, SimClock, ActiveHand) {
        let clock = SimClock::new();
        let active = ActiveHand::new();
        let devices = sim.devices();
        let result = Discovery::new(&devices, &clock, interrupt, &active).run(
            arm,
            Eye::Left,
            solver,
            pixels,
        );
        (result, clock, active)
    }

    #[test]
    fn full_run_samples_six_points_and_solves() {
        let sim = sim_devices();
        let mut solver = SimSolver::new(tip());
        let log = solver.log();
        let mut pixels = ScriptedPixels::constant(Pixel::new(160.0, 70.0));

        let (result, _clock, active) = run(&sim, Arm::Right, &InterruptFlag::new(), &mut solver, &mut pixels);

        assert_eq!(result.unwrap(), Some(tip()));
        assert_eq!(sim.right_arm.goals().len(), 6);
        assert!(sim.left_arm.goals().is_empty());
        assert_eq!(sim.right_hand.velocity_mode_joints(), vec![4, 4, 4, 4, 4, 6]);
        assert_eq!(sim.right_hand.stopped_joints(), vec![4, 4, 4, 4, 4, 6]);
        assert_eq!(active.get(), None);

        let calls = log.calls();
        assert_eq!(calls[0], SolverCall::Clear);
        assert_eq!(calls[1], SolverCall::Select(Arm::Right, Eye::Left));
        assert_eq!(calls.iter().filter(|c| **c == SolverCall::Enable).count(), 6);
        assert_eq!(calls.iter().filter(|c| **c == SolverCall::Disable).count(), 6);
        assert_eq!(calls.last(), Some(&SolverCall::Solve));

        // Arm and gaze contexts are both put back.
        assert_eq!(sim.right_arm.restored_contexts(), sim.right_arm.stored_contexts());
        let gaze = sim.gaze.calls();
        let stored = gaze.iter().find_map(|c| match c {
            GazeCall::Store(id) => Some(*id),
            _ => None,
        });
        let stored = stored.unwrap();
        assert!(gaze.contains(&GazeCall::Restore(stored)));
        assert_eq!(gaze.last(), Some(&GazeCall::Delete(stored)));
    }

    #[test]
    fn fixates_biased_pixels_and_the_offset_point() {
        let sim = sim_devices();
        let mut solver = SimSolver::new(tip());
        let mut pixels = ScriptedPixels::constant(Pixel::new(160.0, 70.0));

        let (result, _, _) = run(&sim, Arm::Left, &InterruptFlag::new(), &mut solver, &mut pixels);
        assert!(result.unwrap().is_some());

        assert!(sim.gaze.fixated_pixels().iter().all(|px| *px == Pixel::new(160.0, 120.0)));
        let first_fixation = sim.gaze.calls().into_iter().find_map(|c| match c {
            GazeCall::FixatePoint(p) => Some(p),
            _ => None,
        });
        assert_eq!(first_fixation, Some(Vec3::new(-0.35, 0.0, 0.1)));
        assert!(sim.gaze.calls().contains(&GazeCall::Restore(ContextId::STARTUP)));
        assert!(sim.gaze.calls().contains(&GazeCall::NeckTrajTime(NECK_TRAJ_TIME)));
    }

    #[test]
    fn converges_within_the_first_window() {
        let sim = sim_devices();
        let mut pixels = ScriptedPixels::constant(Pixel::new(160.0, 70.0));
        let clock = SimClock::new();
        let active = ActiveHand::new();
        let interrupt = InterruptFlag::new();
        let devices = sim.devices();
        let discovery = Discovery::new(&devices, &clock, &interrupt, &active);

        assert!(discovery.converge(Eye::Right, &mut pixels));
        assert!(clock.now() < WINDOW + 2.0 * GAZE_POLL);
        assert_eq!(sim.gaze.fixated_pixels().len(), 151);
    }

    #[test]
    fn never_completing_moves_still_progress() {
        let sim = SimRig::with_arms(SimArm::new("left_arm"), SimArm::new("right_arm").never_completes());
        let mut solver = SimSolver::new(tip());
        let mut pixels = ScriptedPixels::constant(Pixel::new(160.0, 70.0));

        let (result, clock, _) = run(&sim, Arm::Right, &InterruptFlag::new(), &mut solver, &mut pixels);

        assert_eq!(result.unwrap(), Some(tip()));
        assert_eq!(sim.right_arm.goals().len(), 6);
        assert!(clock.now() >= 6.0 * EXPLORATION_TIMEOUT);
    }

    #[test]
    fn interrupt_skips_remaining_points_and_the_solve() {
        let interrupt = InterruptFlag::new();
        let raise = interrupt.clone();
        let sim = SimRig::with_arms(
            SimArm::new("left_arm").on_goal(move |n| {
                if n == 2 {
                    raise.raise();
                }
            }),
            SimArm::new("right_arm"),
        );
        let mut solver = SimSolver::new(tip());
        let log = solver.log();
        let mut pixels = ScriptedPixels::constant(Pixel::new(160.0, 70.0));

        let (result, _, active) = run(&sim, Arm::Left, &interrupt, &mut solver, &mut pixels);

        assert_eq!(result.unwrap(), None);
        assert_eq!(sim.left_arm.goals().len(), 2);
        assert!(!log.calls().contains(&SolverCall::Solve));
        assert_eq!(sim.left_hand.stopped_joints(), vec![4, 4]);
        assert_eq!(active.get(), None);
        assert_eq!(sim.left_arm.restored_contexts().len(), 1);
        assert_eq!(sim.left_arm.deleted_contexts().len(), 1);
        assert!(sim.gaze.calls().iter().any(|c| matches!(c, GazeCall::Delete(_))));
    }
}
