//! Draw planning and simulated quality scoring.
//!
//! A draw places the hand on the object at the approach point and drags it
//! towards the robot by the requested distance. Geometry is built on the
//! sagittal plane (the centroid's lateral offset zeroed) and moved back to
//! the true lateral position afterwards.
//!
//! `vdra`/`vdrp` never move the arm: they ask the controller how well both
//! frames can be reached and return a quality score, lower is better.

use karma_geometry::{AxisAngle, Pose, Transform, Vec3};
use karma_hal::CartesianController;
use karma_types::{Arm, KarmaError};
use tracing::{debug, info};

use crate::plan::{ActionProfile, ActionTask, Waypoint};
use crate::style::PoseStyle;
use crate::tool::ToolFrame;

/// Achieved positions closer than this to the root origin are unsafe, m.
pub const NEARNESS_LIMIT: f64 = 0.15;

/// Quality penalty for an unsafe achieved position.
pub const NEARNESS_PENALTY: f64 = 10.0;

/// Height of the approach point above the first frame, m.
pub const DRAW_LIFT: f64 = 0.05;

/// Draw leg duration of the neutral-frame draw, s.
pub const DRAW_TIME: f64 = 3.5;

/// Score a simulated draw.
///
/// Sums position and axis-angle errors of both frames and adds
/// [`NEARNESS_PENALTY`] when the achieved draw target (and, if
/// `check_approach`, the achieved approach) lies within [`NEARNESS_LIMIT`]
/// of the root origin.
pub fn draw_quality(requested: [&Pose; 2], achieved: [&Pose; 2], check_approach: bool) -> f64 {
    let error: f64 = requested
        .iter()
        .zip(achieved.iter())
        .map(|(want, got)| {
            (want.position - got.position).norm() + want.orientation.distance(&got.orientation)
        })
        .sum();

    let near = |p: &Pose| p.position.norm() < NEARNESS_LIMIT;
    let penalty = if near(achieved[1]) || (check_approach && near(achieved[0])) {
        NEARNESS_PENALTY
    } else {
        0.0
    };
    error + penalty
}

/// The two frames of a draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawPlan {
    style: PoseStyle,
    arm: Arm,
    approach: Pose,
    target: Pose,
}

impl DrawPlan {
    /// Plan a draw of `dist` meters for `task`, with the tool applied.
    pub fn new(task: &ActionTask, dist: f64, tool: &ToolFrame) -> Self {
        let style = task.style;
        let c = task.centroid;
        let sagittal = Vec3::new(c.x, 0.0, c.z);

        let (s, co) = (task.theta + style.draw_angle_shift()).to_radians().sin_cos();
        let h0 = Transform::from_parts([[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]], sagittal);
        let h1 = h0.compose(&Transform::from_translation(Vec3::new(task.radius * co, task.radius * s, 0.0)));
        let h2 = h1.compose(&Transform::from_translation(Vec3::new(0.0, -dist, 0.0)));

        let arm = style.arm(task.arm, h1.translation(), c);
        let hand = style.twist(arm).rotation();
        let mut frames = [h1.with_rotation(hand), h2.with_rotation(hand)];

        if c.y != 0.0 {
            let yaw = Transform::from_axis_angle(&AxisAngle::new(
                Vec3::new(0.0, 0.0, -1.0),
                style.lateral_yaw(c),
            ));
            for h in frames.iter_mut() {
                let back = yaw.with_translation(h.translation() + Vec3::new(0.0, c.y, 0.0));
                *h = back.compose(&h.with_translation(Vec3::zero()));
            }
        }

        let inv_tool = tool.inverse();
        let [approach, target] = frames.map(|h| Pose::from_transform(&h.compose(&inv_tool)));

        debug!(%arm, ?approach, ?target, "draw frames");
        Self {
            style,
            arm,
            approach,
            target,
        }
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// Hand target where drawing starts.
    pub fn approach(&self) -> &Pose {
        &self.approach
    }

    /// Hand target where drawing ends.
    pub fn target(&self) -> &Pose {
        &self.target
    }

    pub fn profile(&self) -> ActionProfile {
        ActionProfile::draw(self.style)
    }

    /// Ask `ctrl` how well both frames can be reached; the second query is
    /// seeded with the joints that reach the first.
    ///
    /// # Errors
    ///
    /// Propagates a failed feasibility query.
    pub fn simulate(&self, ctrl: &dyn CartesianController) -> Result<f64, KarmaError> {
        let first = ctrl.ask_for_pose(&self.approach, None)?;
        let second = ctrl.ask_for_pose(&self.target, Some(&first.joints))?;

        let quality = draw_quality(
            [&self.approach, &self.target],
            [&first.pose, &second.pose],
            self.style.checks_approach_nearness(),
        );
        info!(arm = %self.arm, quality, "draw simulated");
        Ok(quality)
    }

    /// Lower onto the approach point, then draw. `mov_time` is the draw leg
    /// duration of hand-pose draws.
    pub fn waypoints(&self, mov_time: f64) -> Vec<Waypoint> {
        let draw_time = match self.style {
            PoseStyle::Neutral => DRAW_TIME,
            PoseStyle::Hand(_) => mov_time,
        };
        vec![
            Waypoint::new(self.approach.offset(Vec3::new(0.0, 0.0, DRAW_LIFT)), 2.0, 5.0),
            Waypoint::new(self.approach, 1.5, 5.0),
            Waypoint::new(self.target, draw_time, 5.0),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::HAND_AXES;
    use karma_hal::sim::SimArm;
    use karma_types::{ArmPreference, HandPose};

    fn close_vec(a: Vec3, b: Vec3) -> bool {
        (a - b).norm() < 1e-9
    }

    fn rotation_of(pose: &Pose) -> Transform {
        Transform::from_axis_angle(&pose.orientation)
    }

    // ── quality ─────────────────────────────────────────────────────────────

    #[test]
    fn perfect_reach_scores_zero() {
        let task = ActionTask::new(Vec3::new(-0.35, 0.0, 0.0), 0.0, 0.1);
        let plan = DrawPlan::new(&task, 0.1, &ToolFrame::default());
        let arm = SimArm::new("right_arm");
        assert_eq!(plan.simulate(&arm).unwrap(), 0.0);
    }

    #[test]
    fn second_query_is_seeded_with_first_solution() {
        let task = ActionTask::new(Vec3::new(-0.35, 0.05, 0.0), 30.0, 0.1);
        let plan = DrawPlan::new(&task, 0.1, &ToolFrame::default());
        let arm = SimArm::new("right_arm");
        plan.simulate(&arm).unwrap();

        let seeds = arm.feasibility_seeds();
        assert_eq!(seeds.len(), 2);
        assert_eq!(seeds[0], None);
        let first = arm.ask_for_pose(plan.approach(), None).unwrap();
        assert_eq!(seeds[1], Some(first.joints));
    }

    #[test]
    fn quality_sums_position_and_orientation_errors() {
        let want = Pose::new(Vec3::new(-0.3, 0.0, 0.0), AxisAngle::identity());
        let got = Pose::new(Vec3::new(-0.3, 0.03, 0.04), AxisAngle::new(Vec3::new(0.0, 0.0, 1.0), 0.1));
        let q = draw_quality([&want, &want], [&want, &got], true);
        assert!((q - 0.15).abs() < 1e-12);
    }

    #[test]
    fn nearness_penalty_depends_on_style() {
        let near = Pose::new(Vec3::new(-0.1, 0.0, 0.0), AxisAngle::identity());
        let far = Pose::new(Vec3::new(-0.3, 0.0, 0.0), AxisAngle::identity());
        assert_eq!(draw_quality([&near, &far], [&near, &far], true), NEARNESS_PENALTY);
        assert_eq!(draw_quality([&near, &far], [&near, &far], false), 0.0);
        assert_eq!(draw_quality([&far, &near], [&far, &near], false), NEARNESS_PENALTY);
    }

    // ── geometry ────────────────────────────────────────────────────────────

    #[test]
    fn sagittal_draw_pulls_towards_the_robot() {
        let c = Vec3::new(-0.35, 0.0, -0.05);
        let task = ActionTask::new(c, 0.0, 0.1);
        let plan = DrawPlan::new(&task, 0.1, &ToolFrame::default());

        assert_eq!(plan.arm(), Arm::Right);
        assert!(close_vec(plan.approach().position, c + Vec3::new(0.0, 0.1, 0.0)));
        assert!(close_vec(plan.target().position, c + Vec3::new(0.1, 0.1, 0.0)));

        let axes = Transform::identity().with_rotation(HAND_AXES);
        assert!(rotation_of(plan.approach()).distance(&axes) < 1e-9);
        assert!(rotation_of(plan.target()).distance(&axes) < 1e-9);
    }

    #[test]
    fn arm_follows_approach_side_for_neutral_draw() {
        let task = ActionTask::new(Vec3::new(-0.35, 0.0, 0.0), 180.0, 0.1);
        assert_eq!(DrawPlan::new(&task, 0.1, &ToolFrame::default()).arm(), Arm::Left);
        let pinned = task.with_arm(ArmPreference::Pinned(Arm::Right));
        assert_eq!(DrawPlan::new(&pinned, 0.1, &ToolFrame::default()).arm(), Arm::Right);
    }

    #[test]
    fn lateral_offset_is_restored() {
        let sagittal = ActionTask::new(Vec3::new(-0.35, 0.0, 0.0), 20.0, 0.08);
        let shifted = ActionTask::new(Vec3::new(-0.35, 0.12, 0.0), 20.0, 0.08);
        let a = DrawPlan::new(&sagittal, 0.1, &ToolFrame::default());
        let b = DrawPlan::new(&shifted, 0.1, &ToolFrame::default());

        let lateral = Vec3::new(0.0, 0.12, 0.0);
        assert!(close_vec(b.approach().position, a.approach().position + lateral));
        assert!(close_vec(b.target().position, a.target().position + lateral));

        let yaw = Transform::from_axis_angle(&AxisAngle::new(
            Vec3::new(0.0, 0.0, -1.0),
            0.12f64.atan2(0.35),
        ));
        let want = yaw.compose(&rotation_of(a.approach()));
        assert!(rotation_of(b.approach()).distance(&want) < 1e-9);
    }

    #[test]
    fn hand_draw_keeps_orientation_under_lateral_offset() {
        let style = PoseStyle::Hand(HandPose::Pronated);
        let task = ActionTask::new(Vec3::new(-0.35, -0.1, 0.0), 90.0, 0.1).with_style(style);
        let plan = DrawPlan::new(&task, 0.1, &ToolFrame::default());

        assert_eq!(plan.arm(), Arm::Left);
        let want = Transform::identity().with_rotation(style.twist(Arm::Left).rotation());
        assert!(rotation_of(plan.approach()).distance(&want) < 1e-9);
        assert!(close_vec(plan.approach().position, task.centroid + Vec3::new(0.0, 0.1, 0.0)));
    }

    #[test]
    fn tool_tip_lands_on_the_planned_frames() {
        let c = Vec3::new(-0.35, 0.0, 0.0);
        let tool = ToolFrame::translated(ArmPreference::Pinned(Arm::Right), Vec3::new(0.1, 0.0, 0.05));
        let task = ActionTask::new(c, 0.0, 0.1).with_arm(tool.arm());
        let plan = DrawPlan::new(&task, 0.1, &tool);
        let tip = plan.approach().to_transform().transform_point(tool.tip());
        assert!((tip - (c + Vec3::new(0.0, 0.1, 0.0))).norm() < 1e-9);
    }

    // ── execution ───────────────────────────────────────────────────────────

    #[test]
    fn draw_legs_and_timing() {
        let task = ActionTask::new(Vec3::new(-0.35, 0.0, 0.0), 0.0, 0.1);
        let wps = DrawPlan::new(&task, 0.1, &ToolFrame::default()).waypoints(2.0);
        let durations: Vec<f64> = wps.iter().map(|w| w.duration).collect();
        assert_eq!(durations, vec![2.0, 1.5, DRAW_TIME]);
        assert!(wps.iter().all(|w| w.timeout == 5.0));
        assert!(close_vec(wps[0].pose.position, wps[1].pose.position + Vec3::new(0.0, 0.0, DRAW_LIFT)));

        let hand = task.with_style(PoseStyle::Hand(HandPose::Neutral));
        let wps = DrawPlan::new(&hand, 0.1, &ToolFrame::default()).waypoints(2.0);
        assert_eq!(wps[2].duration, 2.0);
    }

    #[test]
    fn profiles_follow_style() {
        let task = ActionTask::new(Vec3::new(-0.35, 0.0, 0.0), 0.0, 0.1);
        let neutral = DrawPlan::new(&task, 0.1, &ToolFrame::default()).profile();
        assert_eq!(neutral.straightness, ActionProfile::DRAW_STRAIGHTNESS);
        assert!(neutral.bias_elbow);
        let hand = task.with_style(PoseStyle::Hand(HandPose::Neutral));
        assert!(!DrawPlan::new(&hand, 0.1, &ToolFrame::default()).profile().bias_elbow);
    }
}
