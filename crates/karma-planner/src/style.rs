//! [`PoseStyle`] – what separates the neutral-frame actions from their
//! hand-pose variants.
//!
//! Both push and draw come in two flavours. The neutral-frame flavour plans
//! in a frame aligned with the robot and lets geometry decide the hand
//! orientation; the hand-pose flavour takes an explicit [`HandPose`] and
//! looks the hand orientation up in a fixed table. Everything that differs
//! between the two is answered here so the planners keep a single code path.

use karma_geometry::Vec3;
use karma_types::{Arm, ArmPreference, HandPose};
use serde::{Deserialize, Serialize};

/// Palm-down hand axes in the root frame: x → −x, y → −z, z → −y.
pub const HAND_AXES: [[f64; 3]; 3] = [[-1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, -1.0, 0.0]];

/// Hand orientation correction, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HandTwist {
    /// Rotation about the hand x-axis.
    pub roll: f64,
    /// Rotation about the hand z-axis.
    pub yaw: f64,
}

impl HandTwist {
    pub const NONE: HandTwist = HandTwist { roll: 0.0, yaw: 0.0 };

    /// `HAND_AXES · Rx(roll) · Rz(yaw)` as a row-major rotation block.
    pub fn rotation(self) -> [[f64; 3]; 3] {
        let (sf, cf) = self.roll.to_radians().sin_cos();
        let (sp, cp) = self.yaw.to_radians().sin_cos();
        let rx = [[1.0, 0.0, 0.0], [0.0, cf, sf], [0.0, -sf, cf]];
        let rz = [[cp, sp, 0.0], [-sp, cp, 0.0], [0.0, 0.0, 1.0]];
        matmul(&matmul(&HAND_AXES, &rx), &rz)
    }
}

fn matmul(a: &[[f64; 3]; 3], b: &[[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Planning flavour of a push or draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseStyle {
    /// `push` / `draw` / `vdra`.
    Neutral,
    /// `pusp` / `drap` / `vdrp`.
    Hand(HandPose),
}

impl PoseStyle {
    /// Pick the executing arm.
    ///
    /// The neutral flavour looks at the lateral side of the first planned
    /// position, the hand-pose flavour at the centroid's.
    pub fn arm(self, pref: ArmPreference, first_position: Vec3, centroid: Vec3) -> Arm {
        match self {
            PoseStyle::Neutral => pref.resolve(first_position.y),
            PoseStyle::Hand(_) => pref.resolve(centroid.y),
        }
    }

    /// Orientation correction applied to draw frames and hand-pose pushes.
    pub fn twist(self, arm: Arm) -> HandTwist {
        match self {
            PoseStyle::Neutral => HandTwist::NONE,
            PoseStyle::Hand(HandPose::Neutral) => HandTwist { roll: 0.0, yaw: -50.0 },
            PoseStyle::Hand(HandPose::Pronated) => HandTwist {
                roll: match arm {
                    Arm::Right => 120.0,
                    Arm::Left => -120.0,
                },
                yaw: -30.0,
            },
        }
    }

    /// Offset added to the requested draw angle before placing the
    /// approach point, degrees.
    pub fn draw_angle_shift(self) -> f64 {
        match self {
            PoseStyle::Neutral => 0.0,
            PoseStyle::Hand(_) => -90.0,
        }
    }

    /// Yaw about −z used when moving sagittal draw frames back to the
    /// centroid's lateral position.
    pub fn lateral_yaw(self, centroid: Vec3) -> f64 {
        match self {
            PoseStyle::Neutral => centroid.y.atan2(centroid.x.abs()),
            PoseStyle::Hand(_) => 0.0,
        }
    }

    /// Whether the configured elbow-height task is applied.
    pub fn biases_elbow(self) -> bool {
        matches!(self, PoseStyle::Neutral)
    }

    /// Whether draw simulation penalises a near approach point, on top of
    /// a near draw target.
    pub fn checks_approach_nearness(self) -> bool {
        matches!(self, PoseStyle::Neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_orthonormal(r: &[[f64; 3]; 3]) -> bool {
        (0..3).all(|i| {
            (0..3).all(|j| {
                let dot: f64 = (0..3).map(|k| r[k][i] * r[k][j]).sum();
                let want = if i == j { 1.0 } else { 0.0 };
                (dot - want).abs() < 1e-12
            })
        })
    }

    #[test]
    fn no_twist_is_the_palm_down_frame() {
        assert_eq!(HandTwist::NONE.rotation(), HAND_AXES);
    }

    #[test]
    fn every_table_entry_is_a_rotation() {
        for style in [
            PoseStyle::Neutral,
            PoseStyle::Hand(HandPose::Neutral),
            PoseStyle::Hand(HandPose::Pronated),
        ] {
            for arm in [Arm::Left, Arm::Right] {
                assert!(is_orthonormal(&style.twist(arm).rotation()));
            }
        }
    }

    #[test]
    fn pronation_mirrors_roll_between_arms() {
        let style = PoseStyle::Hand(HandPose::Pronated);
        assert_eq!(style.twist(Arm::Right).roll, 120.0);
        assert_eq!(style.twist(Arm::Left).roll, -120.0);
        assert_eq!(style.twist(Arm::Left).yaw, -30.0);
        let neutral = PoseStyle::Hand(HandPose::Neutral);
        assert_eq!(neutral.twist(Arm::Left), neutral.twist(Arm::Right));
    }

    #[test]
    fn arm_choice_follows_style() {
        let first = Vec3::new(-0.3, -0.05, 0.0);
        let centroid = Vec3::new(-0.3, 0.05, 0.0);
        assert_eq!(PoseStyle::Neutral.arm(ArmPreference::Auto, first, centroid), Arm::Left);
        assert_eq!(
            PoseStyle::Hand(HandPose::Neutral).arm(ArmPreference::Auto, first, centroid),
            Arm::Right
        );
        assert_eq!(
            PoseStyle::Neutral.arm(ArmPreference::Pinned(Arm::Right), first, centroid),
            Arm::Right
        );
    }

    #[test]
    fn lateral_yaw_uses_absolute_depth() {
        let yaw = PoseStyle::Neutral.lateral_yaw(Vec3::new(-0.3, 0.3, 0.0));
        assert!((yaw - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert_eq!(PoseStyle::Hand(HandPose::Pronated).lateral_yaw(Vec3::new(-0.3, 0.3, 0.0)), 0.0);
    }
}
