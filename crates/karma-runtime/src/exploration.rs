//! The six exploration points used to discover a held tool's tip.
//!
//! Each point is a calibration constant: where the hand goes, where the
//! gaze is pointed while it gets there, how many solver samples to gather
//! and which joint to shake. The table is written for the right arm; the
//! left arm mirrors it across the sagittal plane (lateral coordinates and
//! rotation angles change sign).

use karma_geometry::{AxisAngle, Pose, Transform, Vec3};
use karma_planner::style::HAND_AXES;
use karma_types::Arm;

/// Samples gathered at each of the first five points.
pub const BATCH: usize = 25;

/// Samples gathered at the last point.
pub const FINAL_BATCH: usize = 50;

const MINUS_X: Vec3 = Vec3::new(-1.0, 0.0, 0.0);
const PLUS_Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// One row of the right-arm table.
struct Row {
    position: Vec3,
    gaze_offset: Vec3,
    /// Rotations (axis, degrees) applied left to right before the hand axes.
    tilt: &'static [(Vec3, f64)],
    batch: usize,
    shake_joint: usize,
}

const RIGHT_ARM: [Row; 6] = [
    Row {
        position: Vec3::new(-0.35, 0.0, 0.0),
        gaze_offset: Vec3::new(0.0, 0.0, 0.1),
        tilt: &[(MINUS_X, 0.0)],
        batch: BATCH,
        shake_joint: 4,
    },
    Row {
        position: Vec3::new(-0.35, 0.15, 0.0),
        gaze_offset: Vec3::new(0.0, -0.1, 0.1),
        tilt: &[(MINUS_X, -30.0)],
        batch: BATCH,
        shake_joint: 4,
    },
    Row {
        position: Vec3::new(-0.35, 0.15, 0.15),
        gaze_offset: Vec3::new(0.0, -0.2, 0.1),
        tilt: &[(MINUS_X, -20.0)],
        batch: BATCH,
        shake_joint: 4,
    },
    Row {
        position: Vec3::new(-0.3, 0.05, -0.05),
        gaze_offset: Vec3::new(0.0, -0.2, 0.1),
        tilt: &[(MINUS_X, -10.0)],
        batch: BATCH,
        shake_joint: 4,
    },
    Row {
        position: Vec3::new(-0.35, 0.05, 0.1),
        gaze_offset: Vec3::new(0.0, -0.1, 0.1),
        tilt: &[(MINUS_X, -45.0)],
        batch: BATCH,
        shake_joint: 4,
    },
    Row {
        position: Vec3::new(-0.35, 0.1, 0.0),
        gaze_offset: Vec3::new(0.0, 0.05, 0.1),
        tilt: &[(MINUS_X, 45.0), (PLUS_Z, 45.0)],
        batch: FINAL_BATCH,
        shake_joint: 6,
    },
];

/// Number of exploration points.
pub const POINT_COUNT: usize = RIGHT_ARM.len();

/// A resolved exploration point for one arm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplorationPoint {
    /// Hand target.
    pub pose: Pose,
    /// Added to the hand position to get the gaze fixation point.
    pub gaze_offset: Vec3,
    /// Solver samples to gather here.
    pub batch: usize,
    /// Hand joint shaken while gathering.
    pub shake_joint: usize,
}

impl ExplorationPoint {
    pub fn fixation_point(&self) -> Vec3 {
        self.pose.position + self.gaze_offset
    }
}

fn mirror_y(v: Vec3, arm: Arm) -> Vec3 {
    match arm {
        Arm::Right => v,
        Arm::Left => Vec3::new(v.x, -v.y, v.z),
    }
}

fn resolve(row: &Row, arm: Arm) -> ExplorationPoint {
    let sign = match arm {
        Arm::Right => 1.0,
        Arm::Left => -1.0,
    };
    let orientation = row
        .tilt
        .iter()
        .map(|&(axis, deg)| Transform::from_axis_angle(&AxisAngle::from_degrees(axis, sign * deg)))
        .fold(Transform::identity(), |acc, r| acc.compose(&r))
        .compose(&Transform::from_parts(HAND_AXES, Vec3::zero()));

    let position = mirror_y(row.position, arm);
    ExplorationPoint {
        pose: Pose::from_transform(&orientation.with_translation(position)),
        gaze_offset: mirror_y(row.gaze_offset, arm),
        batch: row.batch,
        shake_joint: row.shake_joint,
    }
}

/// The exploration points for `arm`, in visiting order.
pub fn points(arm: Arm) -> Vec<ExplorationPoint> {
    RIGHT_ARM.iter().map(|row| resolve(row, arm)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_points_with_a_larger_final_batch() {
        let right = points(Arm::Right);
        assert_eq!(right.len(), POINT_COUNT);
        let batches: Vec<usize> = right.iter().map(|p| p.batch).collect();
        assert_eq!(batches, vec![25, 25, 25, 25, 25, 50]);
        let joints: Vec<usize> = right.iter().map(|p| p.shake_joint).collect();
        assert_eq!(joints, vec![4, 4, 4, 4, 4, 6]);
    }

    #[test]
    fn left_arm_mirrors_lateral_coordinates() {
        for (l, r) in points(Arm::Left).iter().zip(points(Arm::Right).iter()) {
            assert!((l.pose.position.x - r.pose.position.x).abs() < 1e-12);
            assert!((l.pose.position.y + r.pose.position.y).abs() < 1e-12);
            assert!((l.pose.position.z - r.pose.position.z).abs() < 1e-12);
            assert!((l.gaze_offset.y + r.gaze_offset.y).abs() < 1e-12);
            assert_eq!(l.batch, r.batch);
        }
    }

    #[test]
    fn left_arm_negates_the_tilt() {
        let left = points(Arm::Left);
        let right = points(Arm::Right);
        // No tilt at the first point: both arms share the orientation.
        assert!(left[0].pose.orientation.distance(&right[0].pose.orientation) < 1e-9);
        for i in 1..POINT_COUNT {
            assert!(left[i].pose.orientation.distance(&right[i].pose.orientation) > 1e-3);
        }
    }

    #[test]
    fn first_point_is_straight_ahead_with_hand_axes() {
        let first = points(Arm::Right)[0];
        assert_eq!(first.pose.position, Vec3::new(-0.35, 0.0, 0.0));
        let rot = Transform::from_axis_angle(&first.pose.orientation).rotation();
        for i in 0..3 {
            for j in 0..3 {
                assert!((rot[i][j] - HAND_AXES[i][j]).abs() < 1e-9);
            }
        }
        assert_eq!(first.fixation_point(), Vec3::new(-0.35, 0.0, 0.1));
    }
}
