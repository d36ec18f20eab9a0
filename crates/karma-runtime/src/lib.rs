//! `karma-runtime` – The Motor Module
//!
//! Executes planned actions and tool discovery against the opened devices,
//! and owns the state that lives across commands.
//!
//! # Modules
//!
//! - [`motor`] – [`MotorModule`][motor::MotorModule]: handles every parsed
//!   command (push, draw, their hand-pose variants, tool attach/get/remove,
//!   find, quit) and clears the interrupt flag after replying.
//! - [`executor`] – [`ActionContext`][executor::ActionContext], the RAII
//!   controller-context guard, and [`Executor`][executor::Executor], which
//!   runs waypoints with advisory timeouts and interrupt checks.
//! - [`session`] – interrupt flag, active-hand indicator and the
//!   [`StopSwitch`][session::StopSwitch] behind the stop port.
//! - [`oscillator`] – background hand shaking during discovery.
//! - [`exploration`] – the per-arm exploration point table.
//! - [`discovery`] – [`Discovery`][discovery::Discovery]: the six-point
//!   converge-then-sample routine and the final solve.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod discovery;
pub mod executor;
pub mod exploration;
pub mod motor;
pub mod oscillator;
pub mod session;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use discovery::{Discovery, GazeWindow};
pub use executor::{ActionContext, ElbowTask, Executor, RunReport};
pub use exploration::{ExplorationPoint, points};
pub use motor::{DiscoveryLink, MotorConfig, MotorModule};
pub use oscillator::{Oscillator, OscillatorHandle, SHAKE_PERIOD};
pub use session::{ActiveHand, InterruptFlag, ShakingHand, StopSwitch};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
