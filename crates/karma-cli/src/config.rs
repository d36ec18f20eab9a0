//! Module configuration – reads `~/.karma/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use karma_runtime::{ElbowTask, MotorConfig};
use karma_types::KarmaError;
use serde::{Deserialize, Serialize};

/// Persisted configuration of the motor module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KarmaConfig {
    /// Stem of every local port name.
    #[serde(default = "default_name")]
    pub name: String,

    /// Robot whose arm and hand drivers are opened.
    #[serde(default = "default_robot")]
    pub robot: String,

    /// Duration of the moving leg of hand-pose pushes and draws, seconds.
    #[serde(default = "default_mov_time")]
    pub mov_time: f64,

    /// Elbow-height task for neutral-frame actions. An empty `[elbow]`
    /// table enables it with the default height and weight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elbow: Option<ElbowTask>,

    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    #[serde(default = "default_stop_port")]
    pub stop_port: u16,

    #[serde(default = "default_vision_port")]
    pub vision_port: u16,

    /// `host:port` of the tool-dimension solver. Without it an in-process
    /// simulated solver is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finder_addr: Option<String>,
}

fn default_name() -> String {
    "karmaMotor".to_string()
}
fn default_robot() -> String {
    "icub".to_string()
}
fn default_mov_time() -> f64 {
    1.0
}
fn default_rpc_port() -> u16 {
    7070
}
fn default_stop_port() -> u16 {
    7071
}
fn default_vision_port() -> u16 {
    7072
}

impl Default for KarmaConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            robot: default_robot(),
            mov_time: default_mov_time(),
            elbow: None,
            rpc_port: default_rpc_port(),
            stop_port: default_stop_port(),
            vision_port: default_vision_port(),
            finder_addr: None,
        }
    }
}

impl KarmaConfig {
    pub fn motor(&self) -> MotorConfig {
        MotorConfig {
            mov_time: self.mov_time,
            elbow: self.elbow,
        }
    }
}

/// Return the config path: `KARMA_CONFIG` if set, else `~/.karma/config.toml`.
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    resolve_path(std::env::var("KARMA_CONFIG").ok().as_deref(), &home)
}

pub(crate) fn resolve_path(explicit: Option<&str>, home: &str) -> PathBuf {
    match explicit {
        Some(path) if !path.is_empty() => PathBuf::from(path),
        _ => PathBuf::from(home).join(".karma").join("config.toml"),
    }
}

/// Load the config, falling back to defaults when the file does not exist.
/// Environment overrides are applied in both cases.
pub fn load() -> Result<KarmaConfig, KarmaError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<KarmaConfig>, KarmaError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| KarmaError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| KarmaError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `KARMA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KARMA_NAME` | `name` |
/// | `KARMA_ROBOT` | `robot` |
/// | `KARMA_MOV_TIME` | `mov_time` |
/// | `KARMA_RPC_PORT` | `rpc_port` |
/// | `KARMA_STOP_PORT` | `stop_port` |
/// | `KARMA_VISION_PORT` | `vision_port` |
/// | `KARMA_FINDER_ADDR` | `finder_addr` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut KarmaConfig) {
    if let Ok(v) = std::env::var("KARMA_NAME") {
        cfg.name = v;
    }
    if let Ok(v) = std::env::var("KARMA_ROBOT") {
        cfg.robot = v;
    }
    if let Ok(v) = std::env::var("KARMA_MOV_TIME")
        && let Ok(secs) = v.parse::<f64>()
        && secs > 0.0
    {
        cfg.mov_time = secs;
    }
    for (var, port) in [
        ("KARMA_RPC_PORT", &mut cfg.rpc_port),
        ("KARMA_STOP_PORT", &mut cfg.stop_port),
        ("KARMA_VISION_PORT", &mut cfg.vision_port),
    ] {
        if let Ok(v) = std::env::var(var)
            && let Ok(p) = v.parse::<u16>()
        {
            *port = p;
        }
    }
    if let Ok(v) = std::env::var("KARMA_FINDER_ADDR") {
        cfg.finder_addr = Some(v);
    }
}
