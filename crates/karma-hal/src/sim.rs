//! In-process simulation drivers for running the motor module without a
//! robot.
//!
//! Every stub records the calls it receives so tests can assert on the exact
//! sequence of controller requests, and every stub always succeeds unless
//! told otherwise. [`SimBackend`] hands them out through the regular
//! [`DeviceBackend`] path, so the binary can also run fully simulated.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use karma_geometry::{AxisAngle, Pose, Vec3};
//! use karma_hal::CartesianController;
//! use karma_hal::sim::SimArm;
//!
//! let arm = Arc::new(SimArm::new("right_arm"));
//! let target = Pose::new(Vec3::new(-0.3, 0.1, 0.0), AxisAngle::identity());
//! let solution = arm.ask_for_pose(&target, None).unwrap();
//! assert_eq!(solution.pose, target);
//! assert_eq!(arm.feasibility_calls(), 1);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use karma_geometry::{Pose, Vec3};
use karma_types::{Arm, Eye, KarmaError, Pixel};

use crate::cartesian::{CartesianController, ContextId, DofMask, PoseSolution, TaskTweak};
use crate::devices::{DeviceBackend, DeviceHandle, DeviceKind, DeviceSpec};
use crate::gaze::GazeController;
use crate::hand::HandController;
use crate::solver::ToolSolver;
use crate::vision::PixelSource;

/// Joints in a simulated arm chain: 3 torso + 7 arm.
pub const SIM_CHAIN_LEN: usize = 10;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Cartesian arm
// ────────────────────────────────────────────────────────────────────────────

type ReachFn = Box<dyn Fn(&Pose) -> Pose + Send + Sync>;
type GoalHook = Box<dyn Fn(usize) + Send + Sync>;

struct ArmState {
    next_context: u32,
    stored: Vec<ContextId>,
    restored: Vec<ContextId>,
    deleted: Vec<ContextId>,
    dof: DofMask,
    dof_requests: Vec<DofMask>,
    tweaks: Vec<TaskTweak>,
    feasibility: Vec<(Pose, Option<Vec<f64>>)>,
    goals: Vec<(Pose, f64)>,
    done_polls: usize,
    stops: usize,
}

/// A simulated Cartesian controller.
///
/// By default it reaches every pose exactly and every motion completes at
/// the first poll.
pub struct SimArm {
    id: String,
    completes: bool,
    reach: ReachFn,
    goal_hook: Option<GoalHook>,
    state: Mutex<ArmState>,
}

impl SimArm {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            completes: true,
            reach: Box::new(|p| *p),
            goal_hook: None,
            state: Mutex::new(ArmState {
                next_context: 1,
                stored: Vec::new(),
                restored: Vec::new(),
                deleted: Vec::new(),
                dof: DofMask::all(SIM_CHAIN_LEN),
                dof_requests: Vec::new(),
                tweaks: Vec::new(),
                feasibility: Vec::new(),
                goals: Vec::new(),
                done_polls: 0,
                stops: 0,
            }),
        }
    }

    /// Motions never report completion; waits must rely on their timeout.
    pub fn never_completes(mut self) -> Self {
        self.completes = false;
        self
    }

    /// Replace the reachability model used by feasibility queries.
    pub fn with_reach(mut self, reach: impl Fn(&Pose) -> Pose + Send + Sync + 'static) -> Self {
        self.reach = Box::new(reach);
        self
    }

    /// Run `hook` after each `go_to_pose` with the number of goals so far.
    pub fn on_goal(mut self, hook: impl Fn(usize) + Send + Sync + 'static) -> Self {
        self.goal_hook = Some(Box::new(hook));
        self
    }

    pub fn goals(&self) -> Vec<(Pose, f64)> {
        lock(&self.state).goals.clone()
    }

    pub fn feasibility_calls(&self) -> usize {
        lock(&self.state).feasibility.len()
    }

    /// Seeds passed to each feasibility query, in order.
    pub fn feasibility_seeds(&self) -> Vec<Option<Vec<f64>>> {
        lock(&self.state)
            .feasibility
            .iter()
            .map(|(_, seed)| seed.clone())
            .collect()
    }

    pub fn stored_contexts(&self) -> Vec<ContextId> {
        lock(&self.state).stored.clone()
    }

    pub fn restored_contexts(&self) -> Vec<ContextId> {
        lock(&self.state).restored.clone()
    }

    pub fn deleted_contexts(&self) -> Vec<ContextId> {
        lock(&self.state).deleted.clone()
    }

    pub fn dof_requests(&self) -> Vec<DofMask> {
        lock(&self.state).dof_requests.clone()
    }

    pub fn tweaks(&self) -> Vec<TaskTweak> {
        lock(&self.state).tweaks.clone()
    }

    pub fn done_polls(&self) -> usize {
        lock(&self.state).done_polls
    }

    pub fn stops(&self) -> usize {
        lock(&self.state).stops
    }

    fn joints_for(pose: &Pose) -> Vec<f64> {
        let p = pose.position;
        let o = pose.orientation.to_array();
        vec![p.x, p.y, p.z, o[0], o[1], o[2], o[3]]
    }
}

impl CartesianController for SimArm {
    fn id(&self) -> &str {
        &self.id
    }

    fn store_context(&self) -> Result<ContextId, KarmaError> {
        let mut s = lock(&self.state);
        let id = ContextId(s.next_context);
        s.next_context += 1;
        s.stored.push(id);
        Ok(id)
    }

    fn restore_context(&self, id: ContextId) -> Result<(), KarmaError> {
        lock(&self.state).restored.push(id);
        Ok(())
    }

    fn delete_context(&self, id: ContextId) -> Result<(), KarmaError> {
        lock(&self.state).deleted.push(id);
        Ok(())
    }

    fn dof(&self) -> Result<DofMask, KarmaError> {
        Ok(lock(&self.state).dof.clone())
    }

    fn set_dof(&self, dof: &DofMask) -> Result<DofMask, KarmaError> {
        let mut s = lock(&self.state);
        s.dof_requests.push(dof.clone());
        s.dof = dof.clone();
        Ok(s.dof.clone())
    }

    fn tweak(&self, tweak: &TaskTweak) -> Result<(), KarmaError> {
        lock(&self.state).tweaks.push(*tweak);
        Ok(())
    }

    fn ask_for_pose(
        &self,
        target: &Pose,
        seed: Option<&[f64]>,
    ) -> Result<PoseSolution, KarmaError> {
        lock(&self.state)
            .feasibility
            .push((*target, seed.map(<[f64]>::to_vec)));
        let pose = (self.reach)(target);
        Ok(PoseSolution {
            joints: Self::joints_for(&pose),
            pose,
        })
    }

    fn go_to_pose(&self, target: &Pose, duration: f64) -> Result<(), KarmaError> {
        let count = {
            let mut s = lock(&self.state);
            s.goals.push((*target, duration));
            s.goals.len()
        };
        if let Some(hook) = &self.goal_hook {
            hook(count);
        }
        Ok(())
    }

    fn check_motion_done(&self) -> Result<bool, KarmaError> {
        lock(&self.state).done_polls += 1;
        Ok(self.completes)
    }

    fn stop(&self) -> Result<(), KarmaError> {
        lock(&self.state).stops += 1;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Gaze
// ────────────────────────────────────────────────────────────────────────────

/// A call received by [`SimGaze`].
#[derive(Debug, Clone, PartialEq)]
pub enum GazeCall {
    Store(ContextId),
    Restore(ContextId),
    Delete(ContextId),
    Tracking(bool),
    FixatePoint(Vec3),
    FixatePixel(Eye, Pixel),
    Saccades(bool),
    NeckTrajTime(f64),
    EyesTrajTime(f64),
    Stop,
}

/// A simulated gaze controller that records every call.
#[derive(Default)]
pub struct SimGaze {
    calls: Mutex<Vec<GazeCall>>,
}

impl SimGaze {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<GazeCall> {
        lock(&self.calls).clone()
    }

    /// Pixels fixated so far, in order.
    pub fn fixated_pixels(&self) -> Vec<Pixel> {
        lock(&self.calls)
            .iter()
            .filter_map(|c| match c {
                GazeCall::FixatePixel(_, px) => Some(*px),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: GazeCall) {
        lock(&self.calls).push(call);
    }
}

impl GazeController for SimGaze {
    fn store_context(&self) -> Result<ContextId, KarmaError> {
        let mut calls = lock(&self.calls);
        let n = calls
            .iter()
            .filter(|c| matches!(c, GazeCall::Store(_)))
            .count() as u32;
        let id = ContextId(n + 1);
        calls.push(GazeCall::Store(id));
        Ok(id)
    }

    fn restore_context(&self, id: ContextId) -> Result<(), KarmaError> {
        self.record(GazeCall::Restore(id));
        Ok(())
    }

    fn delete_context(&self, id: ContextId) -> Result<(), KarmaError> {
        self.record(GazeCall::Delete(id));
        Ok(())
    }

    fn set_tracking_mode(&self, enabled: bool) -> Result<(), KarmaError> {
        self.record(GazeCall::Tracking(enabled));
        Ok(())
    }

    fn look_at_fixation_point(&self, point: Vec3) -> Result<(), KarmaError> {
        self.record(GazeCall::FixatePoint(point));
        Ok(())
    }

    fn look_at_mono_pixel(&self, eye: Eye, pixel: Pixel) -> Result<(), KarmaError> {
        self.record(GazeCall::FixatePixel(eye, pixel));
        Ok(())
    }

    fn set_saccades(&self, enabled: bool) -> Result<(), KarmaError> {
        self.record(GazeCall::Saccades(enabled));
        Ok(())
    }

    fn set_neck_traj_time(&self, secs: f64) -> Result<(), KarmaError> {
        self.record(GazeCall::NeckTrajTime(secs));
        Ok(())
    }

    fn set_eyes_traj_time(&self, secs: f64) -> Result<(), KarmaError> {
        self.record(GazeCall::EyesTrajTime(secs));
        Ok(())
    }

    fn stop(&self) -> Result<(), KarmaError> {
        self.record(GazeCall::Stop);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hand
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct HandState {
    positions: HashMap<usize, f64>,
    velocity_mode: Vec<usize>,
    velocities: Vec<(usize, f64)>,
    stopped: Vec<usize>,
}

/// A simulated control board. Encoders report whatever the test set.
pub struct SimHand {
    id: String,
    state: Mutex<HandState>,
}

impl SimHand {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(HandState::default()),
        }
    }

    pub fn set_joint_position(&self, joint: usize, degrees: f64) {
        lock(&self.state).positions.insert(joint, degrees);
    }

    /// Velocity commands so far as `(joint, deg/s)`.
    pub fn velocities(&self) -> Vec<(usize, f64)> {
        lock(&self.state).velocities.clone()
    }

    pub fn velocity_mode_joints(&self) -> Vec<usize> {
        lock(&self.state).velocity_mode.clone()
    }

    pub fn stopped_joints(&self) -> Vec<usize> {
        lock(&self.state).stopped.clone()
    }
}

impl HandController for SimHand {
    fn id(&self) -> &str {
        &self.id
    }

    fn joint_position(&self, joint: usize) -> Result<f64, KarmaError> {
        Ok(lock(&self.state).positions.get(&joint).copied().unwrap_or(0.0))
    }

    fn set_velocity_mode(&self, joint: usize) -> Result<(), KarmaError> {
        lock(&self.state).velocity_mode.push(joint);
        Ok(())
    }

    fn velocity_move(&self, joint: usize, velocity: f64) -> Result<(), KarmaError> {
        lock(&self.state).velocities.push((joint, velocity));
        Ok(())
    }

    fn stop_joint(&self, joint: usize) -> Result<(), KarmaError> {
        lock(&self.state).stopped.push(joint);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Vision
// ────────────────────────────────────────────────────────────────────────────

/// A pixel feed that replays a script, one entry per poll.
pub struct ScriptedPixels {
    script: VecDeque<Option<Pixel>>,
    after: Option<Pixel>,
}

impl ScriptedPixels {
    /// Replay `script`, then report no observations.
    pub fn new(script: impl IntoIterator<Item = Option<Pixel>>) -> Self {
        Self {
            script: script.into_iter().collect(),
            after: None,
        }
    }

    /// Observe the same pixel at every poll.
    pub fn constant(pixel: Pixel) -> Self {
        Self::new([]).then_repeat(pixel)
    }

    /// Once the script is exhausted, keep reporting `pixel`.
    pub fn then_repeat(mut self, pixel: Pixel) -> Self {
        self.after = Some(pixel);
        self
    }
}

impl PixelSource for ScriptedPixels {
    fn poll(&mut self) -> Option<Pixel> {
        match self.script.pop_front() {
            Some(entry) => entry,
            None => self.after,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tool solver
// ────────────────────────────────────────────────────────────────────────────

/// A request received by [`SimSolver`].
#[derive(Debug, Clone, PartialEq)]
pub enum SolverCall {
    Clear,
    Select(Arm, Eye),
    Enable,
    Disable,
    Solve,
}

/// Shared view on what a [`SimSolver`] received.
#[derive(Clone, Default)]
pub struct SolverLog {
    inner: Arc<Mutex<(Vec<SolverCall>, usize)>>,
}

impl SolverLog {
    pub fn calls(&self) -> Vec<SolverCall> {
        lock(&self.inner).0.clone()
    }

    /// Number of `sample_count` queries.
    pub fn count_queries(&self) -> usize {
        lock(&self.inner).1
    }

    fn record(&self, call: SolverCall) {
        lock(&self.inner).0.push(call);
    }
}

/// A simulated tool solver that gains `per_query` samples on every count
/// query while accumulation is enabled.
pub struct SimSolver {
    enabled: bool,
    samples: usize,
    per_query: usize,
    solution: Vec3,
    log: SolverLog,
}

impl SimSolver {
    pub fn new(solution: Vec3) -> Self {
        Self {
            enabled: false,
            samples: 0,
            per_query: 5,
            solution,
            log: SolverLog::default(),
        }
    }

    pub fn with_samples_per_query(mut self, per_query: usize) -> Self {
        self.per_query = per_query;
        self
    }

    pub fn log(&self) -> SolverLog {
        self.log.clone()
    }
}

impl ToolSolver for SimSolver {
    fn clear(&mut self) -> Result<(), KarmaError> {
        self.samples = 0;
        self.log.record(SolverCall::Clear);
        Ok(())
    }

    fn select(&mut self, arm: Arm, eye: Eye) -> Result<(), KarmaError> {
        self.log.record(SolverCall::Select(arm, eye));
        Ok(())
    }

    fn enable(&mut self) -> Result<(), KarmaError> {
        self.enabled = true;
        self.log.record(SolverCall::Enable);
        Ok(())
    }

    fn disable(&mut self) -> Result<(), KarmaError> {
        self.enabled = false;
        self.log.record(SolverCall::Disable);
        Ok(())
    }

    fn sample_count(&mut self) -> Result<usize, KarmaError> {
        if self.enabled {
            self.samples += self.per_query;
        }
        lock(&self.log.inner).1 += 1;
        Ok(self.samples)
    }

    fn solve(&mut self) -> Result<Vec3, KarmaError> {
        self.log.record(SolverCall::Solve);
        Ok(self.solution)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Device backend
// ────────────────────────────────────────────────────────────────────────────

/// A [`DeviceBackend`] that opens simulated drivers.
#[derive(Default)]
pub struct SimBackend {
    fail_on: Option<String>,
    opened: Mutex<Vec<String>>,
    closed: Mutex<Vec<String>>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make opening the device with this remote endpoint fail.
    pub fn failing_on(mut self, remote: impl Into<String>) -> Self {
        self.fail_on = Some(remote.into());
        self
    }

    pub fn opened(&self) -> Vec<String> {
        lock(&self.opened).clone()
    }

    pub fn closed(&self) -> Vec<String> {
        lock(&self.closed).clone()
    }
}

impl DeviceBackend for SimBackend {
    fn open(&self, spec: &DeviceSpec) -> Result<DeviceHandle, KarmaError> {
        if self.fail_on.as_deref() == Some(spec.remote.as_str()) {
            return Err(KarmaError::DeviceOpen {
                device: spec.remote.clone(),
                details: "simulated open failure".to_string(),
            });
        }
        lock(&self.opened).push(spec.remote.clone());
        Ok(match spec.kind {
            DeviceKind::Gaze => DeviceHandle::Gaze(Arc::new(SimGaze::new())),
            DeviceKind::CartesianArm(arm) => {
                DeviceHandle::CartesianArm(Arc::new(SimArm::new(format!("{arm}_arm"))))
            }
            DeviceKind::Hand(arm) => DeviceHandle::Hand(Arc::new(SimHand::new(format!("{arm}_hand")))),
        })
    }

    fn close(&self, spec: &DeviceSpec) {
        lock(&self.closed).push(spec.remote.clone());
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use karma_geometry::AxisAngle;

    fn pose(x: f64) -> Pose {
        Pose::new(Vec3::new(x, 0.0, 0.0), AxisAngle::identity())
    }

    #[test]
    fn sim_arm_records_contexts_and_goals() {
        let arm = SimArm::new("left_arm");
        let ctx = arm.store_context().unwrap();
        arm.go_to_pose(&pose(-0.3), 1.0).unwrap();
        arm.restore_context(ctx).unwrap();
        arm.delete_context(ctx).unwrap();

        assert_eq!(arm.goals(), vec![(pose(-0.3), 1.0)]);
        assert_eq!(arm.restored_contexts(), vec![ctx]);
        assert_eq!(arm.deleted_contexts(), vec![ctx]);
        assert!(arm.check_motion_done().unwrap());
    }

    #[test]
    fn sim_arm_never_completes_when_told() {
        let arm = SimArm::new("left_arm").never_completes();
        assert!(!arm.check_motion_done().unwrap());
        assert_eq!(arm.done_polls(), 1);
    }

    #[test]
    fn sim_arm_reach_model_and_seed_recording() {
        let arm = SimArm::new("right_arm").with_reach(|p| p.offset(Vec3::new(0.0, 0.0, 0.01)));
        let first = arm.ask_for_pose(&pose(-0.3), None).unwrap();
        assert!((first.pose.position.z - 0.01).abs() < 1e-12);
        arm.ask_for_pose(&pose(-0.2), Some(&first.joints)).unwrap();
        assert_eq!(arm.feasibility_seeds(), vec![None, Some(first.joints)]);
    }

    #[test]
    fn scripted_pixels_replay_then_repeat() {
        let mut src = ScriptedPixels::new([None, Some(Pixel::new(1.0, 2.0))])
            .then_repeat(Pixel::new(3.0, 4.0));
        assert_eq!(src.poll(), None);
        assert_eq!(src.poll(), Some(Pixel::new(1.0, 2.0)));
        assert_eq!(src.poll(), Some(Pixel::new(3.0, 4.0)));
        assert_eq!(src.poll(), Some(Pixel::new(3.0, 4.0)));
    }

    #[test]
    fn sim_solver_accumulates_only_when_enabled() {
        let mut solver = SimSolver::new(Vec3::new(0.1, 0.0, 0.2)).with_samples_per_query(3);
        let log = solver.log();
        assert_eq!(solver.sample_count().unwrap(), 0);
        solver.enable().unwrap();
        assert_eq!(solver.sample_count().unwrap(), 3);
        solver.disable().unwrap();
        assert_eq!(solver.sample_count().unwrap(), 3);
        assert_eq!(log.calls(), vec![SolverCall::Enable, SolverCall::Disable]);
        assert_eq!(log.count_queries(), 3);
    }

    #[test]
    fn sim_gaze_hands_out_fresh_contexts() {
        let gaze = SimGaze::new();
        let a = gaze.store_context().unwrap();
        let b = gaze.store_context().unwrap();
        assert_ne!(a, b);
        assert_ne!(a, ContextId::STARTUP);
    }
}
