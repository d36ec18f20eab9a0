//! [`ToolFrame`] – the tool held by the robot, if any.
//!
//! Planned targets describe where the tool tip must go. Composing them with
//! the inverse of the tool frame turns them into hand targets, which is what
//! the Cartesian controllers understand. With no tool attached the frame is
//! the identity and planning is unaffected.

use karma_geometry::{AxisAngle, Transform, Vec3};
use karma_types::ArmPreference;
use serde::{Deserialize, Serialize};

/// Tool-tip pose in the hand frame, plus the arm the tool is held by.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolFrame {
    arm: ArmPreference,
    frame: Transform,
}

impl Default for ToolFrame {
    fn default() -> Self {
        Self {
            arm: ArmPreference::Auto,
            frame: Transform::identity(),
        }
    }
}

impl ToolFrame {
    /// Tool tip at `tip`, with the tool frame's x-axis turned about −z to
    /// point from the palm towards the tip.
    pub fn oriented(arm: ArmPreference, tip: Vec3) -> Self {
        let yaw = (-tip.y).atan2(tip.x);
        let rotation = Transform::from_axis_angle(&AxisAngle::new(Vec3::new(0.0, 0.0, -1.0), yaw));
        Self {
            arm,
            frame: rotation.with_translation(tip),
        }
    }

    /// Tool tip at `tip`, axes parallel to the hand frame.
    pub fn translated(arm: ArmPreference, tip: Vec3) -> Self {
        Self {
            arm,
            frame: Transform::from_translation(tip),
        }
    }

    /// Which arm planning must use; `Auto` when no tool is held.
    pub fn arm(&self) -> ArmPreference {
        self.arm
    }

    pub fn frame(&self) -> &Transform {
        &self.frame
    }

    /// Tool-tip offset in the hand frame.
    pub fn tip(&self) -> Vec3 {
        self.frame.translation()
    }

    /// Maps a tool-tip target onto the matching hand target when
    /// right-multiplied.
    pub fn inverse(&self) -> Transform {
        self.frame.invert_rigid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use karma_types::Arm;

    #[test]
    fn attach_then_get_roundtrips_arm_and_tip() {
        let tool = ToolFrame::oriented(ArmPreference::Pinned(Arm::Left), Vec3::new(0.02, 0.0, 0.05));
        assert_eq!(tool.arm(), ArmPreference::Pinned(Arm::Left));
        let tip = tool.tip();
        assert!((tip.x - 0.02).abs() < 1e-12);
        assert!(tip.y.abs() < 1e-12);
        assert!((tip.z - 0.05).abs() < 1e-12);
    }

    #[test]
    fn default_tool_is_identity_and_selectable() {
        let tool = ToolFrame::default();
        assert_eq!(tool.arm(), ArmPreference::Auto);
        assert_eq!(tool.tip(), Vec3::zero());
        assert!(tool.inverse().distance(&Transform::identity()) < 1e-12);
    }

    #[test]
    fn oriented_tool_points_x_axis_at_the_tip() {
        let tip = Vec3::new(0.1, -0.1, 0.0);
        let tool = ToolFrame::oriented(ArmPreference::Pinned(Arm::Right), tip);
        let x_axis = tool.frame().column(0);
        let dir = tip.scale(1.0 / tip.norm());
        assert!((x_axis - dir).norm() < 1e-9);
    }

    #[test]
    fn translated_tool_keeps_hand_axes() {
        let tool = ToolFrame::translated(ArmPreference::Pinned(Arm::Left), Vec3::new(0.1, 0.2, 0.0));
        assert_eq!(tool.frame().rotation(), Transform::identity().rotation());
    }

    #[test]
    fn inverse_undoes_the_tool() {
        let tool = ToolFrame::oriented(ArmPreference::Auto, Vec3::new(0.15, 0.05, -0.02));
        let back = tool.frame().compose(&tool.inverse());
        assert!(back.distance(&Transform::identity()) < 1e-12);
    }
}
