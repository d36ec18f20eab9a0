//! Gaze (head and eyes) controller contract.

use karma_geometry::Vec3;
use karma_types::{Eye, KarmaError, Pixel};

use crate::cartesian::ContextId;

/// The robot's gaze controller.
pub trait GazeController: Send + Sync {
    fn store_context(&self) -> Result<ContextId, KarmaError>;

    fn restore_context(&self, id: ContextId) -> Result<(), KarmaError>;

    fn delete_context(&self, id: ContextId) -> Result<(), KarmaError>;

    /// In tracking mode the controller keeps fixating after reaching a
    /// target instead of settling.
    fn set_tracking_mode(&self, enabled: bool) -> Result<(), KarmaError>;

    /// Fixate a 3-D point in the root frame.
    fn look_at_fixation_point(&self, point: Vec3) -> Result<(), KarmaError>;

    /// Fixate the point seen at `pixel` in the given camera.
    fn look_at_mono_pixel(&self, eye: Eye, pixel: Pixel) -> Result<(), KarmaError>;

    fn set_saccades(&self, enabled: bool) -> Result<(), KarmaError>;

    fn set_neck_traj_time(&self, secs: f64) -> Result<(), KarmaError>;

    fn set_eyes_traj_time(&self, secs: f64) -> Result<(), KarmaError>;

    fn stop(&self) -> Result<(), KarmaError>;
}
