//! Contract of the external tool-dimension solver.
//!
//! The solver correlates the observed tool-tip pixels with the hand's
//! kinematics while accumulation is enabled, and estimates the tip position
//! in the hand frame on request.

use karma_geometry::Vec3;
use karma_types::{Arm, Eye, KarmaError};

pub trait ToolSolver: Send {
    /// Drop every accumulated sample.
    fn clear(&mut self) -> Result<(), KarmaError>;

    /// Choose the arm kinematics and camera the samples refer to.
    fn select(&mut self, arm: Arm, eye: Eye) -> Result<(), KarmaError>;

    /// Start accumulating samples.
    fn enable(&mut self) -> Result<(), KarmaError>;

    /// Stop accumulating samples.
    fn disable(&mut self) -> Result<(), KarmaError>;

    /// Number of samples accumulated so far.
    fn sample_count(&mut self) -> Result<usize, KarmaError>;

    /// Estimate the tool tip in the hand frame.
    fn solve(&mut self) -> Result<Vec3, KarmaError>;
}
