use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the robot's two arms (and the hand mounted on it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    pub fn as_str(self) -> &'static str {
        match self {
            Arm::Left => "left",
            Arm::Right => "right",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arm {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Arm::Left),
            "right" => Ok(Arm::Right),
            other => Err(KarmaError::Protocol(format!("unknown arm '{other}'"))),
        }
    }
}

/// Which arm an action should use.
///
/// `Auto` lets the planner pick the arm on the same lateral side as the
/// target. Pinning an arm happens when a tool is attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArmPreference {
    #[default]
    Auto,
    Pinned(Arm),
}

impl ArmPreference {
    /// Resolve the preference, falling back to the lateral-side rule:
    /// right when `lateral >= 0`, left otherwise.
    pub fn resolve(self, lateral: f64) -> Arm {
        match self {
            ArmPreference::Pinned(arm) => arm,
            ArmPreference::Auto if lateral >= 0.0 => Arm::Right,
            ArmPreference::Auto => Arm::Left,
        }
    }

    pub fn is_pinned(self) -> bool {
        matches!(self, ArmPreference::Pinned(_))
    }
}

impl fmt::Display for ArmPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmPreference::Auto => f.write_str("selectable"),
            ArmPreference::Pinned(arm) => arm.fmt(f),
        }
    }
}

impl FromStr for ArmPreference {
    type Err = KarmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "selectable" => Ok(ArmPreference::Auto),
            other => other.parse().map(ArmPreference::Pinned),
        }
    }
}

/// Camera used to observe the tool tip during exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Anything other than `"left"` selects the right camera.
    pub fn from_name(name: &str) -> Self {
        if name == "left" { Eye::Left } else { Eye::Right }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hand orientation used by the hand-pose push and draw variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandPose {
    /// Rotation-neutral hand, palm or back towards the object.
    Neutral,
    /// Pronated hand, top or bottom edge towards the object.
    Pronated,
}

impl HandPose {
    /// Wire encoding: `0` is neutral, any other value is pronation.
    pub fn from_flag(flag: i64) -> Self {
        if flag == 0 { HandPose::Neutral } else { HandPose::Pronated }
    }
}

/// A tool-tip observation in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pixel {
    pub u: f64,
    pub v: f64,
}

impl Pixel {
    pub fn new(u: f64, v: f64) -> Self {
        Self { u, v }
    }
}

/// Error type shared by every karma crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KarmaError {
    #[error("Failed to open device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Controller fault on {component}: {details}")]
    Controller { component: String, details: String },

    #[error("Tool solver error: {0}")]
    Solver(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl KarmaError {
    pub fn controller(component: impl Into<String>, details: impl Into<String>) -> Self {
        KarmaError::Controller {
            component: component.into(),
            details: details.into(),
        }
    }
}

impl From<std::io::Error> for KarmaError {
    fn from(e: std::io::Error) -> Self {
        KarmaError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_preference_resolves_by_lateral_side() {
        assert_eq!(ArmPreference::Auto.resolve(0.0), Arm::Right);
        assert_eq!(ArmPreference::Auto.resolve(0.12), Arm::Right);
        assert_eq!(ArmPreference::Auto.resolve(-0.01), Arm::Left);
        assert_eq!(ArmPreference::Pinned(Arm::Left).resolve(0.3), Arm::Left);
    }

    #[test]
    fn arm_preference_parses_wire_names() {
        assert_eq!("selectable".parse::<ArmPreference>().unwrap(), ArmPreference::Auto);
        assert_eq!(
            "left".parse::<ArmPreference>().unwrap(),
            ArmPreference::Pinned(Arm::Left)
        );
        assert!("torso".parse::<ArmPreference>().is_err());
        assert_eq!(ArmPreference::Auto.to_string(), "selectable");
        assert_eq!(ArmPreference::Pinned(Arm::Right).to_string(), "right");
    }

    #[test]
    fn eye_defaults_to_right_camera() {
        assert_eq!(Eye::from_name("left"), Eye::Left);
        assert_eq!(Eye::from_name("right"), Eye::Right);
        assert_eq!(Eye::from_name("cyclopean"), Eye::Right);
    }

    #[test]
    fn hand_pose_flag_decoding() {
        assert_eq!(HandPose::from_flag(0), HandPose::Neutral);
        assert_eq!(HandPose::from_flag(1), HandPose::Pronated);
        assert_eq!(HandPose::from_flag(7), HandPose::Pronated);
    }

    #[test]
    fn arm_preference_serialization_roundtrip() {
        let pref = ArmPreference::Pinned(Arm::Left);
        let json = serde_json::to_string(&pref).unwrap();
        let back: ArmPreference = serde_json::from_str(&json).unwrap();
        assert_eq!(pref, back);
    }

    #[test]
    fn karma_error_display() {
        let err = KarmaError::DeviceOpen {
            device: "gaze".to_string(),
            details: "no server".to_string(),
        };
        assert!(err.to_string().contains("gaze"));

        let err2 = KarmaError::controller("left_arm", "context lost");
        assert!(err2.to_string().contains("left_arm"));
    }
}
