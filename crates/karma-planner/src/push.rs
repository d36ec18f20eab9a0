//! Push planning.
//!
//! # Neutral frame
//!
//! A local frame `H0` sits on the centroid with x pointing right, y forward
//! and z up. On the circle of the requested radius around it, at the folded
//! approach angle, two hand frames are possible: one with the hand z-axis
//! pointing at the centroid ([`Candidate::Inward`]) and one pointing away
//! from it ([`Candidate::Outward`]). Each also has a widened twin pushed
//! [`BACK_OF_HAND_MARGIN`] further out, used when pushing with the back of
//! the hand.
//!
//! Near ±90° the two candidates are numerically indistinguishable, so the
//! choice is made by arm alone and the controller is never consulted.
//! Elsewhere both are put to the controller as feasibility queries and the
//! one it can reach more faithfully wins.
//!
//! # Hand pose
//!
//! [`plan_hand_push`] skips candidate selection: it places the hand at four
//! cylindrical points around the centroid with an orientation taken from the
//! hand-pose table.

use karma_geometry::{Pose, Transform, Vec3};
use karma_hal::CartesianController;
use karma_types::{Arm, KarmaError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::angle::{fold_degrees, within};
use crate::plan::{ActionProfile, ActionTask, PlannedAction, Waypoint};
use crate::style::PoseStyle;
use crate::tool::ToolFrame;

/// Height of the approach point above the contact point, meters.
pub const PUSH_LIFT: f64 = 0.1;

/// Extra radial clearance when pushing with the back of the hand, meters.
pub const BACK_OF_HAND_MARGIN: f64 = 0.05;

/// Half-width of the orientation-singularity windows around ±90°, degrees.
pub const SINGULARITY_WINDOW: f64 = 45.0;

const LIFT: Vec3 = Vec3::new(0.0, 0.0, PUSH_LIFT);

/// Centroid-local frame: x → root y, y → root −x, z → root z.
fn centroid_frame(centroid: Vec3) -> Transform {
    Transform::from_parts([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], centroid)
}

// ────────────────────────────────────────────────────────────────────────────
// Timing
// ────────────────────────────────────────────────────────────────────────────

/// Trajectory time of the pushing leg.
///
/// Scales linearly with `radius` over `[0.04, 0.18]` m, between 0.40 and
/// 0.60 s when `theta` (folded) is within 10° of 0° or 180°, and between
/// 0.50 and 0.80 s otherwise. Both bounds grow by 1.3 when the arm is pinned
/// by a tool.
pub fn push_duration(theta: f64, radius: f64, pinned: bool) -> f64 {
    const R_MIN: f64 = 0.04;
    const R_MAX: f64 = 0.18;

    let along_axis = within(theta, 0.0, 10.0) || 180.0 - theta.abs() < 10.0;
    let (mut t_min, mut t_max) = if along_axis { (0.40, 0.60) } else { (0.50, 0.80) };
    if pinned {
        t_min *= 1.3;
        t_max *= 1.3;
    }

    let t = t_min + (t_max - t_min) / (R_MAX - R_MIN) * (radius - R_MIN);
    t.clamp(t_min, t_max)
}

// ────────────────────────────────────────────────────────────────────────────
// Neutral-frame push
// ────────────────────────────────────────────────────────────────────────────

/// The two tangential hand frames on the push circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Candidate {
    /// Hand z-axis towards the centroid.
    Inward,
    /// Hand z-axis away from the centroid.
    Outward,
}

/// Why a candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SelectionReason {
    /// Inside a singularity window; decided by arm.
    Singularity,
    /// Frobenius errors between requested and achievable frames.
    Feasibility { inward_error: f64, outward_error: f64 },
}

/// Outcome of candidate selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PushSelection {
    pub candidate: Candidate,
    /// The widened twin replaces the candidate.
    pub widened: bool,
    pub reason: SelectionReason,
}

/// Geometry of a neutral-frame push, ready for candidate selection.
#[derive(Debug, Clone, PartialEq)]
pub struct PushPlan {
    task: ActionTask,
    theta: f64,
    arm: Arm,
    tool_tip: Vec3,
    inward: Transform,
    outward: Transform,
    inward_wide: Transform,
    outward_wide: Transform,
}

impl PushPlan {
    /// Build both candidates (and their widened twins) in the root frame,
    /// with the tool applied, and pick the arm.
    pub fn new(task: &ActionTask, tool: &ToolFrame) -> Self {
        let theta = fold_degrees(task.theta);
        let (s, c) = theta.to_radians().sin_cos();
        let r = task.radius;

        let contact = Vec3::new(r * c, r * s, 0.0);
        let widen = Vec3::new(BACK_OF_HAND_MARGIN * c, BACK_OF_HAND_MARGIN * s, 0.0);

        let inward_local = Transform::from_parts([[-s, 0.0, -c], [c, 0.0, -s], [0.0, -1.0, 0.0]], contact);
        let outward_local = Transform::from_parts([[s, 0.0, c], [-c, 0.0, s], [0.0, -1.0, 0.0]], contact);

        let h0 = centroid_frame(task.centroid);
        let inv_tool = tool.inverse();
        let to_root = |local: Transform| h0.compose(&local).compose(&inv_tool);

        let inward = to_root(inward_local);
        let outward = to_root(outward_local);
        let inward_wide = to_root(inward_local.with_translation(contact + widen));
        let outward_wide = to_root(outward_local.with_translation(contact + widen));

        let arm = PoseStyle::Neutral.arm(task.arm, inward.translation(), task.centroid);

        debug!(
            theta,
            ?arm,
            inward = ?Pose::from_transform(&inward),
            outward = ?Pose::from_transform(&outward),
            "push candidates"
        );

        Self {
            task: *task,
            theta,
            arm,
            tool_tip: tool.tip(),
            inward,
            outward,
            inward_wide,
            outward_wide,
        }
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// Approach angle folded into `(-180, 180]`.
    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// Root-frame hand target of a candidate.
    pub fn candidate(&self, which: Candidate, widened: bool) -> &Transform {
        match (which, widened) {
            (Candidate::Inward, false) => &self.inward,
            (Candidate::Outward, false) => &self.outward,
            (Candidate::Inward, true) => &self.inward_wide,
            (Candidate::Outward, true) => &self.outward_wide,
        }
    }

    /// The arm-determined choice inside a singularity window, if any.
    pub fn singular_choice(&self) -> Option<Candidate> {
        let near_plus = within(self.theta, 90.0, SINGULARITY_WINDOW);
        let near_minus = within(self.theta, -90.0, SINGULARITY_WINDOW);
        match (near_plus, near_minus, self.arm) {
            (true, _, Arm::Right) | (_, true, Arm::Left) => Some(Candidate::Inward),
            (true, _, Arm::Left) | (_, true, Arm::Right) => Some(Candidate::Outward),
            _ => None,
        }
    }

    /// Choose the candidate to execute, querying `ctrl` only outside the
    /// singularity windows.
    ///
    /// # Errors
    ///
    /// Propagates a failed feasibility query.
    pub fn select(&self, ctrl: &dyn CartesianController) -> Result<PushSelection, KarmaError> {
        let (candidate, reason) = match self.singular_choice() {
            Some(candidate) => (candidate, SelectionReason::Singularity),
            None => {
                let inward_error = self.reach_error(ctrl, &self.inward)?;
                let outward_error = self.reach_error(ctrl, &self.outward)?;
                let candidate = if inward_error < outward_error {
                    Candidate::Inward
                } else {
                    Candidate::Outward
                };
                (
                    candidate,
                    SelectionReason::Feasibility {
                        inward_error,
                        outward_error,
                    },
                )
            }
        };

        // Back of the hand towards the object: keep it off the object.
        let widened = self.theta < 0.0
            && matches!(
                (self.arm, candidate),
                (Arm::Right, Candidate::Outward) | (Arm::Left, Candidate::Inward)
            );

        let selection = PushSelection {
            candidate,
            widened,
            reason,
        };
        info!(arm = %self.arm, ?candidate, widened, ?reason, "push candidate selected");
        Ok(selection)
    }

    fn reach_error(&self, ctrl: &dyn CartesianController, target: &Transform) -> Result<f64, KarmaError> {
        let solution = ctrl.ask_for_pose(&Pose::from_transform(target), None)?;
        let error = target.distance(&solution.pose.to_transform());
        debug!(achieved = ?solution.pose, error, "push feasibility");
        Ok(error)
    }

    /// The four push legs for `selection`: above the contact point, onto
    /// it, through the centroid, and back.
    pub fn waypoints(&self, selection: &PushSelection) -> Vec<Waypoint> {
        let start = Pose::from_transform(self.candidate(selection.candidate, selection.widened));

        // Hand pose that puts the tool tip on the centroid.
        let through = Transform::from_axis_angle(&start.orientation)
            .with_translation(self.task.centroid)
            .transform_point(-self.tool_tip);

        let push_time = push_duration(self.theta, self.task.radius, self.task.arm.is_pinned());

        vec![
            Waypoint::new(start.offset(LIFT), 1.0, 4.0),
            Waypoint::new(start, 1.0, 4.0),
            Waypoint::new(Pose::new(through, start.orientation), push_time, 3.0),
            Waypoint::new(start, 1.0, 2.0),
        ]
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hand-pose push
// ────────────────────────────────────────────────────────────────────────────

/// Plan a hand-pose push.
///
/// The hand visits, around the centroid at the folded angle θ: a point above
/// the contact side, the contact side, the opposite side (θ + 180°), and a
/// point above the opposite side. `push_time` is the duration of the pushing
/// leg. The hand pose is the one carried by `task.style`.
///
/// # Errors
///
/// Returns [`KarmaError::Protocol`] when the task has the neutral style.
pub fn plan_hand_push(task: &ActionTask, tool: &ToolFrame, push_time: f64) -> Result<PlannedAction, KarmaError> {
    let style = task.style;
    let PoseStyle::Hand(pose) = style else {
        return Err(KarmaError::Protocol("hand-pose push needs a hand pose".into()));
    };
    let theta = fold_degrees(task.theta);
    let arm = style.arm(task.arm, task.centroid, task.centroid);

    let hand = Transform::identity().with_rotation(style.twist(arm).rotation());
    let inv_tool = tool.inverse();

    let around = |angle_deg: f64, lift: f64| {
        let (s, c) = angle_deg.to_radians().sin_cos();
        let offset = Vec3::new(task.radius * c, task.radius * s, lift);
        let t = Transform::from_translation(task.centroid + offset)
            .compose(&hand)
            .compose(&inv_tool);
        Pose::from_transform(&t)
    };

    let waypoints = vec![
        Waypoint::new(around(theta, PUSH_LIFT), 1.0, 4.0),
        Waypoint::new(around(theta, 0.0), 1.0, 4.0),
        Waypoint::new(around(theta + 180.0, 0.0), push_time, 3.0),
        Waypoint::new(around(theta + 180.0, PUSH_LIFT), 1.0, 2.0),
    ];

    info!(%arm, ?pose, theta, "hand-pose push planned");
    Ok(PlannedAction {
        arm,
        profile: ActionProfile::push(style),
        waypoints,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
