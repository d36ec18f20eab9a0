//! `karma-cli` – the `karma-motor` binary
//!
//! Starts the motor module:
//!
//! 1. Installs tracing (see [`karma_runtime::telemetry`]) and loads
//!    `~/.karma/config.toml` with `KARMA_*` overrides.
//! 2. Opens the gaze, arm and hand devices. A failed open is fatal; devices
//!    opened so far are closed again.
//! 3. Connects the tool-dimension solver, or a simulated one when no
//!    `finder_addr` is configured.
//! 4. Serves the RPC, stop and vision ports and shakes the active hand in
//!    the background until a client sends `quit` or Ctrl-C is pressed.

mod config;

use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use colored::Colorize;
use karma_geometry::Vec3;
use karma_hal::sim::{SimBackend, SimSolver};
use karma_hal::{Devices, SystemClock, ToolSolver};
use karma_middleware::{
    FinderClient, PixelFeed, RpcServer, StopServer, StopSignal, VisionServer, pixel_channel,
};
use karma_runtime::{DiscoveryLink, MotorModule, SHAKE_PERIOD, StopSwitch, init_tracing};
use karma_types::KarmaError;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use config::KarmaConfig;

const FINDER_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let _tracing = init_tracing("karma-motor");
    print_banner();

    let cfg = match config::load() {
        Ok(cfg) => {
            println!(
                "  Config: {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = KarmaConfig::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    };
    info!(name = %cfg.name, robot = %cfg.robot, "starting motor module");

    // ── Devices ───────────────────────────────────────────────────────────
    let backend = SimBackend::new();
    let notice = simulated_devices_notice(&cfg.robot);
    warn!(robot = %cfg.robot, "{notice}");
    println!("  {} {}", "⚠".yellow().bold(), notice.yellow());
    let devices = match Devices::open(&backend, &cfg.name, &cfg.robot) {
        Ok(devices) => devices,
        Err(e) => {
            error!(error = %e, "device open failed");
            println!("{} {}", "✗".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let solver = match connect_solver(&cfg) {
        Ok(solver) => solver,
        Err(e) => {
            error!(error = %e, "tool solver unavailable");
            println!("{} {}", "✗".red().bold(), e);
            devices.close(&backend);
            return ExitCode::FAILURE;
        }
    };

    // ── Motor module ──────────────────────────────────────────────────────
    let (feed, pixels) = pixel_channel();
    let module = Arc::new(MotorModule::new(
        devices.clone(),
        Arc::new(SystemClock::new()),
        cfg.motor(),
        DiscoveryLink {
            solver,
            pixels: Box::new(pixels),
        },
    ));
    let stop = Arc::new(module.stop_switch());

    let oscillator = match module.oscillator().spawn(SHAKE_PERIOD) {
        Ok(handle) => handle,
        Err(e) => {
            error!(error = %e, "failed to start hand oscillator");
            devices.close(&backend);
            return ExitCode::FAILURE;
        }
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    {
        let stop = Arc::clone(&stop);
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("{}", "⚠  Ctrl-C received – stopping all motion …".yellow().bold());
            stop.raise();
            shutdown.notify_one();
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    // ── Ports ─────────────────────────────────────────────────────────────
    let served = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(KarmaError::from)
        .and_then(|rt| rt.block_on(serve(&cfg, module, stop, feed, shutdown)));

    drop(oscillator);
    devices.close(&backend);

    match served {
        Ok(()) => {
            println!("{}", "  ✓ Motor module closed.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "motor module failed");
            println!("{} {}", "✗".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Startup notice for the in-process device drivers.
fn simulated_devices_notice(robot: &str) -> String {
    format!("devices are SIMULATED: no commands reach the {robot} hardware")
}

fn connect_solver(cfg: &KarmaConfig) -> Result<Box<dyn ToolSolver>, KarmaError> {
    let Some(addr) = cfg.finder_addr.as_deref() else {
        info!("no finder address configured; using the simulated tool solver");
        return Ok(Box::new(SimSolver::new(Vec3::zero())));
    };
    let resolved = addr
        .to_socket_addrs()
        .map_err(|e| KarmaError::Config(format!("invalid finder address {addr}: {e}")))?
        .next()
        .ok_or_else(|| KarmaError::Config(format!("finder address {addr} did not resolve")))?;
    let client = FinderClient::connect(resolved, FINDER_CONNECT_TIMEOUT)?;
    info!(%resolved, "tool solver connected");
    Ok(Box::new(client))
}

fn port(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))
}

async fn serve(
    cfg: &KarmaConfig,
    module: Arc<MotorModule>,
    stop: Arc<StopSwitch>,
    feed: PixelFeed,
    shutdown: Arc<Notify>,
) -> Result<(), KarmaError> {
    let rpc = RpcServer::bind(port(cfg.rpc_port), module).await?;
    let stop_port = StopServer::bind(port(cfg.stop_port), stop).await?;
    let vision = VisionServer::bind(port(cfg.vision_port), feed).await?;

    println!(
        "  {} rpc {}  stop {}  vision {}",
        "listening".green(),
        rpc.local_addr()?.to_string().bold(),
        stop_port.local_addr()?.to_string().bold(),
        vision.local_addr()?.to_string().bold(),
    );

    let quit = rpc.quit_signal();
    let tasks = [
        tokio::spawn(rpc.run()),
        tokio::spawn(stop_port.run()),
        tokio::spawn(vision.run()),
    ];

    tokio::select! {
        _ = quit.notified() => info!("quit requested over rpc"),
        _ = shutdown.notified() => info!("shutdown requested"),
    }
    for task in tasks {
        task.abort();
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   __ __ ___    ___   __  ___ ___ "#.bold().cyan());
    println!("{}", r#"  / //_// _ |  / _ \ /  |/  // _ |"#.bold().cyan());
    println!("{}", r#" / ,<  / __ | / , _// /|_/ // __ |"#.bold().cyan());
    println!("{}", r#"/_/|_|/_/ |_|/_/|_|/_/  /_//_/ |_|"#.bold().cyan());
    println!();
    println!("  {}", "Motor module: push, draw and tool-tip discovery".dimmed());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulated_devices_notice_names_the_robot() {
        let notice = simulated_devices_notice("icubSim");
        assert!(notice.contains("SIMULATED"));
        assert!(notice.contains("icubSim"));
    }
}
