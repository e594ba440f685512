//! Command-line interface for launch_graph

use argh::FromArgs;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::runtime::SupervisorConfig;

/// Resolve a launch description and supervise its processes
#[derive(FromArgs, Debug)]
pub struct LaunchArgs {
    /// path to the launch file
    #[argh(positional)]
    pub launch_file: String,

    /// override launch arguments (format: key:=value or key=value)
    #[argh(option, short = 'a', from_str_fn(parse_arg_override))]
    pub arg: Vec<(String, String)>,

    /// package share directory, bypassing AMENT_PREFIX_PATH (format: name=path)
    #[argh(option, from_str_fn(parse_package))]
    pub package: Vec<(String, PathBuf)>,

    /// show launch plan without executing
    #[argh(switch)]
    pub dry_run: bool,

    /// print the dry-run plan as JSON
    #[argh(switch)]
    pub json: bool,

    /// validate launch file and exit
    #[argh(switch)]
    pub validate: bool,

    /// list declared arguments and exit
    #[argh(switch)]
    pub show_args: bool,

    /// time between SIGTERM and SIGKILL on shutdown, in milliseconds
    #[argh(option, default = "5000")]
    pub grace_period_ms: u64,

    /// base respawn delay in milliseconds
    #[argh(option, default = "1000")]
    pub respawn_delay_ms: u64,

    /// stop respawning an action after this many restarts
    #[argh(option)]
    pub max_respawns: Option<u32>,

    /// log level (error, warn, info, debug, trace)
    #[argh(option, short = 'l', default = "String::from(\"info\")")]
    pub log_level: String,
}

/// Parse argument override in format "key:=value" or "key=value"
fn parse_arg_override(s: &str) -> Result<(String, String), String> {
    let split = s.split_once(":=").or_else(|| s.split_once('='));
    match split {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!(
            "Invalid argument format '{}'. Expected 'key:=value'",
            s
        )),
    }
}

/// Parse package override in format "name=path"
fn parse_package(s: &str) -> Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!(
            "Invalid package format '{}'. Expected 'name=path'",
            s
        )),
    }
}

impl LaunchArgs {
    /// Convert argument overrides to a HashMap; the last value wins
    pub fn arg_overrides(&self) -> HashMap<String, String> {
        self.arg.iter().cloned().collect()
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_millis(self.grace_period_ms),
            respawn_delay: Duration::from_millis(self.respawn_delay_ms),
            max_respawns: self.max_respawns,
            ..Default::default()
        }
    }
}
