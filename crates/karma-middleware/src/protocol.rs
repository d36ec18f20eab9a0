//! Text command protocol of the motor module's RPC port.
//!
//! One request per line, whitespace-separated, one reply line back:
//!
//! | Request | Reply |
//! |---|---|
//! | `push cx cy cz theta radius` | `ack` |
//! | `pusp pose cx cy cz theta radius` | `ack` |
//! | `draw cx cy cz theta radius dist` | `ack` |
//! | `vdra cx cy cz theta radius dist` | `ack quality` |
//! | `drap pose cx cy cz theta radius dist` | `ack` |
//! | `vdrp pose cx cy cz theta radius dist` | `ack quality` |
//! | `tool attach arm x y z` / `toop attach arm x y z` | `ack` |
//! | `tool get` / `toop get` | `ack arm x y z` |
//! | `tool remove` / `toop remove` | `ack` |
//! | `find arm eye` | `ack x y z` or `nack` |
//! | `quit` | `bye` |
//!
//! Unknown verbs and payloads with too few (or non-numeric) arguments parse
//! to `None` and are answered with an empty line. Extra trailing arguments
//! are ignored.

use std::fmt;

use karma_geometry::Vec3;
use karma_types::{Arm, ArmPreference, Eye, HandPose};
use serde::{Deserialize, Serialize};

/// Geometry shared by every push and draw request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub centroid: Vec3,
    /// Degrees.
    pub theta: f64,
    /// Meters.
    pub radius: f64,
}

/// How `tool`/`toop` build the tool frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    /// `tool`: x-axis turned towards the tip.
    Oriented,
    /// `toop`: hand axes, translated to the tip.
    Translated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ToolOp {
    Attach { arm: ArmPreference, tip: Vec3 },
    Get,
    Remove,
}

/// A parsed RPC request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Push(Target),
    HandPush {
        pose: HandPose,
        target: Target,
    },
    Draw {
        simulate: bool,
        target: Target,
        dist: f64,
    },
    HandDraw {
        simulate: bool,
        pose: HandPose,
        target: Target,
        dist: f64,
    },
    Tool {
        kind: ToolKind,
        op: ToolOp,
    },
    /// `arm` is `None` when the request named neither `left` nor `right`.
    Find {
        arm: Option<Arm>,
        eye: Eye,
    },
    Quit,
}

fn numbers<const N: usize>(args: &[&str]) -> Option<[f64; N]> {
    if args.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, arg) in out.iter_mut().zip(args) {
        *slot = arg.parse().ok()?;
    }
    Some(out)
}

fn target(v: &[f64]) -> Target {
    Target {
        centroid: Vec3::new(v[0], v[1], v[2]),
        theta: v[3],
        radius: v[4],
    }
}

fn hand_pose(flag: f64) -> HandPose {
    HandPose::from_flag(flag.trunc() as i64)
}

impl Command {
    /// Parse one request line.
    pub fn parse(line: &str) -> Option<Command> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (verb, args) = tokens.split_first()?;

        match *verb {
            "push" => numbers::<5>(args).map(|v| Command::Push(target(&v))),
            "pusp" => numbers::<6>(args).map(|v| Command::HandPush {
                pose: hand_pose(v[0]),
                target: target(&v[1..]),
            }),
            "draw" | "vdra" => numbers::<6>(args).map(|v| Command::Draw {
                simulate: *verb == "vdra",
                target: target(&v),
                dist: v[5],
            }),
            "drap" | "vdrp" => numbers::<7>(args).map(|v| Command::HandDraw {
                simulate: *verb == "vdrp",
                pose: hand_pose(v[0]),
                target: target(&v[1..]),
                dist: v[6],
            }),
            "tool" | "toop" => {
                let kind = if *verb == "tool" {
                    ToolKind::Oriented
                } else {
                    ToolKind::Translated
                };
                let (sub, rest) = args.split_first()?;
                let op = match *sub {
                    "attach" => {
                        let (arm, coords) = rest.split_first()?;
                        let arm = arm.parse::<ArmPreference>().ok()?;
                        let [x, y, z] = numbers::<3>(coords)?;
                        ToolOp::Attach {
                            arm,
                            tip: Vec3::new(x, y, z),
                        }
                    }
                    "get" => ToolOp::Get,
                    "remove" => ToolOp::Remove,
                    _ => return None,
                };
                Some(Command::Tool { kind, op })
            }
            "find" => match args {
                [arm, eye, ..] => Some(Command::Find {
                    arm: arm.parse().ok(),
                    eye: Eye::from_name(eye),
                }),
                _ => None,
            },
            "quit" => Some(Command::Quit),
            _ => None,
        }
    }
}

/// A reply line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Ack,
    /// Simulated draw quality.
    AckQuality(f64),
    /// Current tool.
    AckTool { arm: ArmPreference, tip: Vec3 },
    /// Tool dimensions found by exploration.
    AckPoint(Vec3),
    Nack,
    Bye,
    /// Unrecognised or malformed request.
    Empty,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ack => f.write_str("ack"),
            Reply::AckQuality(q) => write!(f, "ack {q}"),
            Reply::AckTool { arm, tip } => write!(f, "ack {arm} {} {} {}", tip.x, tip.y, tip.z),
            Reply::AckPoint(p) => write!(f, "ack {} {} {}", p.x, p.y, p.z),
            Reply::Nack => f.write_str("nack"),
            Reply::Bye => f.write_str("bye"),
            Reply::Empty => Ok(()),
        }
    }
}
