//! Planner inputs and outputs.

use karma_geometry::{Pose, Vec3};
use karma_types::{Arm, ArmPreference};
use serde::{Deserialize, Serialize};

use crate::style::PoseStyle;

/// One push or draw request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionTask {
    /// Object centroid in the root frame, meters.
    pub centroid: Vec3,
    /// Approach angle around the centroid, degrees.
    pub theta: f64,
    /// Distance from the centroid to the contact point, meters.
    pub radius: f64,
    pub style: PoseStyle,
    pub arm: ArmPreference,
}

impl ActionTask {
    pub fn new(centroid: Vec3, theta: f64, radius: f64) -> Self {
        Self {
            centroid,
            theta,
            radius,
            style: PoseStyle::Neutral,
            arm: ArmPreference::Auto,
        }
    }

    pub fn with_style(mut self, style: PoseStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_arm(mut self, arm: ArmPreference) -> Self {
        self.arm = arm;
        self
    }
}

/// One motion leg.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub pose: Pose,
    /// Trajectory time handed to the controller, seconds.
    pub duration: f64,
    /// How long to wait for completion before moving on anyway, seconds.
    pub timeout: f64,
}

impl Waypoint {
    pub fn new(pose: Pose, duration: f64, timeout: f64) -> Self {
        Self {
            pose,
            duration,
            timeout,
        }
    }
}

/// Solver settings applied for the whole action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionProfile {
    /// Straight-line path weight.
    pub straightness: f64,
    /// Whether to apply the configured elbow-height task.
    pub bias_elbow: bool,
}

impl ActionProfile {
    pub const PUSH_STRAIGHTNESS: f64 = 10.0;
    pub const DRAW_STRAIGHTNESS: f64 = 30.0;

    pub fn push(style: PoseStyle) -> Self {
        Self {
            straightness: Self::PUSH_STRAIGHTNESS,
            bias_elbow: style.biases_elbow(),
        }
    }

    pub fn draw(style: PoseStyle) -> Self {
        Self {
            straightness: Self::DRAW_STRAIGHTNESS,
            bias_elbow: style.biases_elbow(),
        }
    }
}

/// A fully planned action: who moves, how, and through which legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub arm: Arm,
    pub profile: ActionProfile,
    pub waypoints: Vec<Waypoint>,
}
