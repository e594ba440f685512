//! Launch Graph
//!
//! Declarative launch-graph resolution and process supervision.
//!
//! # Overview
//!
//! A launch description declares arguments and guarded process actions.
//! The launcher:
//! - Registers arguments and applies caller overrides
//! - Resolves `$(...)` substitutions against arguments, the environment
//!   and installed package share directories
//! - Drops actions whose `if`/`unless` condition evaluates false
//! - Spawns the remaining actions and respawns crashed ones
//! - Gracefully shuts everything down on cancellation
//!
//! # Example Launch File
//!
//! ```yaml
//! version: "1.0"
//!
//! args:
//!   use_rviz:
//!     default: "True"
//!   params_file:
//!     default: "$(find-pkg-share fast_livo)/config/mid360.yaml"
//!
//! nodes:
//!   laserMapping:
//!     package: fast_livo
//!     executable: fastlivo_mapping
//!     parameters:
//!       - "$(arg params_file)"
//!     output: screen
//!     respawn: true
//!
//!   rviz2:
//!     package: rviz2
//!     executable: rviz2
//!     if: "$(arg use_rviz)"
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;

pub use cli::LaunchArgs;
pub use config::{
    Action, ArgumentDeclaration, ArgumentRegistry, Condition, Expression, LaunchFile, OutputMode,
    PackageIndex, PackageLocator, ProcessAction, Resolver,
};
pub use error::{ConfigurationError, RuntimeProcessError};
pub use runtime::{
    ActionOutcome, LaunchGraph, LaunchPlan, PreparedLaunch, ProcessLauncher, ProcessState,
    RunReport, Supervisor, SupervisorConfig, SupervisorHandle, TokioLauncher,
};
