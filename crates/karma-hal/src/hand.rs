//! Hand joint contract: encoders plus velocity control.
//!
//! Only used to oscillate a single wrist/hand joint so that a held tool
//! keeps moving in the camera image.

use karma_types::KarmaError;

/// Joint-level access to one arm's control board.
pub trait HandController: Send + Sync {
    /// Stable identifier, e.g. `"left_hand"`.
    fn id(&self) -> &str;

    /// Encoder reading of `joint`, degrees.
    fn joint_position(&self, joint: usize) -> Result<f64, KarmaError>;

    /// Switch `joint` to velocity control.
    fn set_velocity_mode(&self, joint: usize) -> Result<(), KarmaError>;

    /// Command `joint` at `velocity` degrees per second.
    fn velocity_move(&self, joint: usize, velocity: f64) -> Result<(), KarmaError>;

    fn stop_joint(&self, joint: usize) -> Result<(), KarmaError>;
}
