//! End-effector target pose: position plus axis-angle orientation.

use serde::{Deserialize, Serialize};

use crate::transform::{AxisAngle, Transform, Vec3};

/// A 6-DoF pose as exchanged with a Cartesian controller.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Position in meters, robot root frame.
    pub position: Vec3,
    pub orientation: AxisAngle,
}

impl Pose {
    pub fn new(position: Vec3, orientation: AxisAngle) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Read position and orientation off a homogeneous transform.
    pub fn from_transform(t: &Transform) -> Self {
        Self::new(t.translation(), t.to_axis_angle())
    }

    /// Rebuild the homogeneous transform.
    pub fn to_transform(&self) -> Transform {
        Transform::from_axis_angle(&self.orientation).with_translation(self.position)
    }

    /// Same orientation, position shifted by `offset`.
    pub fn offset(&self, offset: Vec3) -> Self {
        Self::new(self.position + offset, self.orientation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_roundtrip_preserves_pose() {
        let t = Transform::from_axis_angle(&AxisAngle::new(Vec3::new(0.0, 1.0, 0.0), 0.8))
            .with_translation(Vec3::new(-0.3, 0.1, 0.05));
        let pose = Pose::from_transform(&t);
        assert!(pose.to_transform().distance(&t) < 1e-12);
    }

    #[test]
    fn offset_moves_position_only() {
        let pose = Pose::new(Vec3::new(-0.3, 0.0, 0.0), AxisAngle::identity());
        let above = pose.offset(Vec3::new(0.0, 0.0, 0.1));
        assert!((above.position.z - 0.1).abs() < 1e-12);
        assert_eq!(above.orientation, pose.orientation);
    }
}
