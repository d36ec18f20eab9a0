//! Cartesian (operational-space) arm controller contract.
//!
//! The controller owns inverse kinematics and joint-space trajectories. The
//! motor module only ever hands it target poses, durations and solver
//! settings, and asks it what it could achieve.

use karma_geometry::Pose;
use karma_types::KarmaError;

/// Handle to a saved controller or gaze configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(pub u32);

impl ContextId {
    /// The configuration the controller was started with.
    pub const STARTUP: ContextId = ContextId(0);
}

/// Per-joint enable mask over the kinematic chain (torso first, then arm).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofMask(pub Vec<bool>);

impl DofMask {
    /// Torso pitch position in the chain.
    pub const TORSO_PITCH: usize = 0;
    /// Torso roll position in the chain.
    pub const TORSO_ROLL: usize = 1;

    /// All `len` joints enabled.
    pub fn all(len: usize) -> Self {
        Self(vec![true; len])
    }

    /// Same length as `self`, every joint enabled except `disabled`.
    pub fn enabling_all_except(&self, disabled: &[usize]) -> Self {
        Self(
            (0..self.0.len())
                .map(|i| !disabled.contains(&i))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_enabled(&self, joint: usize) -> bool {
        self.0.get(joint).copied().unwrap_or(false)
    }
}

/// Solver-side adjustments applied for the duration of one action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskTweak {
    /// Weight of the straight-line path objective.
    Straightness(f64),
    /// Secondary task keeping the elbow at `height` meters with `weight`.
    ElbowHeight { height: f64, weight: f64 },
}

/// Outcome of a feasibility query.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSolution {
    /// The pose the controller would actually reach.
    pub pose: Pose,
    /// Joint configuration reaching it; seeds the next query.
    pub joints: Vec<f64>,
}

/// One arm's Cartesian controller.
///
/// Methods take `&self` so that a stop request arriving on another thread
/// can reach a controller that an action is currently driving.
pub trait CartesianController: Send + Sync {
    /// Stable identifier, e.g. `"left_arm"`.
    fn id(&self) -> &str;

    /// Save the current solver configuration (DOF mask, tweaks).
    fn store_context(&self) -> Result<ContextId, KarmaError>;

    fn restore_context(&self, id: ContextId) -> Result<(), KarmaError>;

    /// Release a saved configuration.
    fn delete_context(&self, id: ContextId) -> Result<(), KarmaError>;

    fn dof(&self) -> Result<DofMask, KarmaError>;

    /// Request a new mask; returns the mask actually applied.
    fn set_dof(&self, dof: &DofMask) -> Result<DofMask, KarmaError>;

    fn tweak(&self, tweak: &TaskTweak) -> Result<(), KarmaError>;

    /// Ask what pose is achievable for `target` without moving.
    ///
    /// `seed` warm-starts the solver from a previous joint configuration.
    fn ask_for_pose(&self, target: &Pose, seed: Option<&[f64]>)
    -> Result<PoseSolution, KarmaError>;

    /// Start moving to `target` over `duration` seconds.
    fn go_to_pose(&self, target: &Pose, duration: f64) -> Result<(), KarmaError>;

    /// `true` once the last commanded motion has finished.
    fn check_motion_done(&self) -> Result<bool, KarmaError>;

    /// Halt any motion in progress.
    fn stop(&self) -> Result<(), KarmaError>;
}
