//! Line-oriented client for the external tool-dimension solver.
//!
//! Calls block; discovery runs on a blocking thread and every call is one
//! request/reply exchange.
//!
//! | Request | Reply |
//! |---|---|
//! | `clear`, `enable`, `disable` | `ack` |
//! | `select arm eye` | `ack` |
//! | `num` | `ack N` |
//! | `find` | `ack x y z` |

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use karma_geometry::Vec3;
use karma_hal::ToolSolver;
use karma_types::{Arm, Eye, KarmaError};
use tracing::debug;

/// Connected solver client.
pub struct FinderClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl FinderClient {
    /// Connect to the solver, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`KarmaError::DeviceOpen`] if the solver is unreachable.
    pub fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, KarmaError> {
        let open_err = |e: std::io::Error| KarmaError::DeviceOpen {
            device: format!("finder@{addr}"),
            details: e.to_string(),
        };
        let writer = TcpStream::connect_timeout(&addr, timeout).map_err(open_err)?;
        let reader = BufReader::new(writer.try_clone().map_err(open_err)?);
        Ok(Self { reader, writer })
    }

    fn request(&mut self, line: &str) -> Result<Vec<String>, KarmaError> {
        debug!(request = line, "finder");
        self.writer.write_all(format!("{line}\n").as_bytes())?;
        self.writer.flush()?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(KarmaError::Solver("finder closed the connection".into()));
        }
        let mut tokens = reply.split_whitespace().map(str::to_owned);
        match tokens.next().as_deref() {
            Some("ack") => Ok(tokens.collect()),
            _ => Err(KarmaError::Solver(format!(
                "'{line}' refused: {}",
                reply.trim()
            ))),
        }
    }

    fn command(&mut self, line: &str) -> Result<(), KarmaError> {
        self.request(line).map(|_| ())
    }
}

fn number(tokens: &[String], i: usize) -> Result<f64, KarmaError> {
    tokens
        .get(i)
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| KarmaError::Solver(format!("malformed finder reply {tokens:?}")))
}

impl ToolSolver for FinderClient {
    fn clear(&mut self) -> Result<(), KarmaError> {
        self.command("clear")
    }

    fn select(&mut self, arm: Arm, eye: Eye) -> Result<(), KarmaError> {
        self.command(&format!("select {arm} {eye}"))
    }

    fn enable(&mut self) -> Result<(), KarmaError> {
        self.command("enable")
    }

    fn disable(&mut self) -> Result<(), KarmaError> {
        self.command("disable")
    }

    fn sample_count(&mut self) -> Result<usize, KarmaError> {
        let reply = self.request("num")?;
        Ok(number(&reply, 0)?.max(0.0) as usize)
    }

    fn solve(&mut self) -> Result<Vec3, KarmaError> {
        let reply = self.request("find")?;
        Ok(Vec3::new(
            number(&reply, 0)?,
            number(&reply, 1)?,
            number(&reply, 2)?,
        ))
    }
}
