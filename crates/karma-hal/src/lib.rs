//! `karma-hal` – Hardware Abstraction Layer.
//!
//! Narrow contracts for every collaborator the motor module drives. Planning
//! and exploration code only ever talks to these traits, so the simulated
//! drivers in [`sim`] and real middleware clients are interchangeable.
//!
//! # Modules
//!
//! - [`cartesian`] – [`CartesianController`][cartesian::CartesianController]:
//!   inverse-kinematics pose requests, feasibility queries, context save and
//!   restore, DOF masking and task tweaks for one arm.
//! - [`gaze`] – [`GazeController`][gaze::GazeController]: head/eye fixation.
//! - [`hand`] – [`HandController`][hand::HandController]: joint encoders and
//!   velocity control used to shake a held tool.
//! - [`vision`] – [`PixelSource`][vision::PixelSource]: non-blocking tool-tip
//!   pixel feed.
//! - [`solver`] – [`ToolSolver`][solver::ToolSolver]: the external tool
//!   dimension estimator.
//! - [`clock`] – [`Clock`][clock::Clock]: wall or simulated time for every
//!   bounded wait.
//! - [`devices`] – [`Devices`][devices::Devices]: opens the full device set in
//!   order and unwinds on failure.
//! - [`sim`] – recording stub drivers for headless tests.

pub mod cartesian;
pub mod clock;
pub mod devices;
pub mod gaze;
pub mod hand;
pub mod sim;
pub mod solver;
pub mod vision;

pub use cartesian::{CartesianController, ContextId, DofMask, PoseSolution, TaskTweak};
pub use clock::{Clock, SimClock, SystemClock};
pub use devices::{DeviceBackend, DeviceHandle, DeviceKind, DeviceSpec, Devices};
pub use gaze::GazeController;
pub use hand::HandController;
pub use solver::ToolSolver;
pub use vision::PixelSource;
