//! `karma-planner` – Action Planner.
//!
//! Turns a push or draw request into an executing arm, the solver settings
//! for the action and an ordered list of timed hand targets. Nothing here
//! moves the robot; the only collaborator call is the feasibility query used
//! to pick between push candidates and to score simulated draws.
//!
//! # Modules
//!
//! - [`angle`] – approach-angle folding into `(-180, 180]`.
//! - [`tool`] – [`ToolFrame`][tool::ToolFrame]: attached tool and its
//!   inverse, applied to every planned target.
//! - [`style`] – [`PoseStyle`][style::PoseStyle]: neutral-frame versus
//!   hand-pose planning, including the hand orientation table.
//! - [`plan`] – [`ActionTask`][plan::ActionTask] input,
//!   [`Waypoint`][plan::Waypoint] and [`ActionProfile`][plan::ActionProfile]
//!   output.
//! - [`push`] – candidate construction, singularity-aware selection and the
//!   push legs; hand-pose pushes.
//! - [`draw`] – draw frames, simulated quality and the draw legs.

pub mod angle;
pub mod draw;
pub mod plan;
pub mod push;
pub mod style;
pub mod tool;

pub use angle::fold_degrees;
pub use draw::{DrawPlan, draw_quality};
pub use plan::{ActionProfile, ActionTask, PlannedAction, Waypoint};
pub use push::{Candidate, PushPlan, PushSelection, SelectionReason, plan_hand_push, push_duration};
pub use style::{HandTwist, PoseStyle};
pub use tool::ToolFrame;
