//! `karma-middleware` – Ports and Wire Formats
//!
//! Moves text between the motor module and the outside world without
//! knowing how an action is planned or executed.
//!
//! # Modules
//!
//! - [`protocol`] – request parsing and reply encoding for the RPC port.
//! - [`rpc`] – Tokio listeners for the RPC and stop ports, dispatching to a
//!   [`CommandHandler`] and a [`StopSignal`].
//! - [`vision`] – tool-tip pixel stream: TCP listener plus a latest-value
//!   channel exposed as a [`karma_hal::PixelSource`].
//! - [`finder`] – blocking client for the external tool-dimension solver.

pub mod finder;
pub mod protocol;
pub mod rpc;
pub mod vision;

pub use finder::FinderClient;
pub use protocol::{Command, Reply, Target, ToolKind, ToolOp};
pub use rpc::{CommandHandler, RpcServer, StopServer, StopSignal};
pub use vision::{PixelFeed, VisionServer, WatchPixels, parse_pixel, pixel_channel};
