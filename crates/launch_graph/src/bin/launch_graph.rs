//! Launch Graph CLI
//!
//! Usage:
//!   launch_graph launch/mapping_mid360.launch.yaml
//!   launch_graph launch/mapping_mid360.launch.yaml -a use_rviz:=False
//!   launch_graph launch/mapping_mid360.launch.yaml --dry-run --json

use launch_graph::{
    LaunchArgs, LaunchFile, LaunchGraph, PackageIndex, PreparedLaunch, Supervisor, TokioLauncher,
};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: LaunchArgs = argh::from_env();

    // Initialize logging
    let log_level = match args.log_level.to_lowercase().as_str() {
        "error" => "error",
        "warn" => "warn",
        "info" => "info",
        "debug" => "debug",
        "trace" => "trace",
        _ => "info",
    };
    let env = env_logger::Env::default().default_filter_or(log_level);
    env_logger::init_from_env(env);

    // Load launch file
    log::info!("Loading launch file: {}", args.launch_file);
    let launch_file = match LaunchFile::from_file(&args.launch_file) {
        Ok(lf) => lf,
        Err(e) => {
            log::error!("Failed to load launch file: {}", e);
            std::process::exit(1);
        }
    };
    let version = launch_file.version.clone();
    let launch_env = launch_file.env.clone();

    let graph = match LaunchGraph::from_launch_file(launch_file) {
        Ok(graph) => graph,
        Err(e) => {
            log::error!("Invalid launch graph: {}", e);
            std::process::exit(1);
        }
    };

    // Validate only mode
    if args.validate {
        println!("Launch file '{}' is valid", args.launch_file);
        println!("  Version: {}", version);
        println!("  Args: {}", graph.declarations().len());
        println!("  Nodes: {}", graph.actions().count());
        return;
    }

    if args.show_args {
        println!("Arguments (pass arguments as '<name>:=<value>'):");
        for decl in graph.declarations() {
            println!();
            println!("    '{}':", decl.name);
            if !decl.description.is_empty() {
                println!("        {}", decl.description);
            }
            println!("        (default: '{}')", decl.default);
        }
        return;
    }

    let mut index = PackageIndex::from_env();
    for (name, path) in &args.package {
        index = index.with_package(name.clone(), path.clone());
    }

    // Resolve everything before the first spawn
    let prepared = match PreparedLaunch::prepare(
        &graph,
        &args.arg_overrides(),
        Arc::new(index),
        launch_env,
    ) {
        Ok(prepared) => prepared,
        Err(e) => {
            log::error!("Failed to resolve launch graph: {}", e);
            std::process::exit(1);
        }
    };

    // Dry run mode
    if args.dry_run {
        let plan = prepared.plan();
        if args.json {
            match serde_json::to_string_pretty(&plan) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    log::error!("Failed to serialize launch plan: {}", e);
                    std::process::exit(1);
                }
            }
        } else {
            println!("{}", plan);
        }
        return;
    }

    let supervisor = Supervisor::new(
        prepared,
        Arc::new(TokioLauncher),
        args.supervisor_config(),
    );

    // Set up Ctrl+C handler
    {
        let handle = supervisor.handle();
        if let Err(e) = ctrlc::set_handler(move || {
            if handle.cancel() {
                log::info!("Received Ctrl+C, initiating shutdown...");
            }
        }) {
            log::error!("Error setting Ctrl+C handler: {}", e);
            std::process::exit(1);
        }
    }

    let report = supervisor.run().await;

    if let Some(failure) = &report.first_failure {
        log::error!("{}", failure);
    }
    log::info!("Launcher exiting");
    std::process::exit(report.exit_code());
}
