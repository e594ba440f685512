//! Eager resolution of a launch graph into concrete commands

use crate::config::{
    Action, Expression, OutputMode, PackageLocator, ParameterSource, ProcessAction, Resolver,
};
use crate::error::{ConfigurationError, RuntimeProcessError};
use crate::runtime::graph::{ActionId, LaunchGraph};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Everything the OS needs to start one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    /// Action label, used for logging
    pub name: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the launcher's own environment
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
}

impl LaunchCommand {
    /// Shell-like rendering for logs and plans
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Parameter entry after substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolvedParameter {
    File(String),
    Inline(Vec<(String, String)>),
}

/// An enabled action with every substitution resolved
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    pub id: ActionId,
    pub label: String,
    pub package: Option<String>,
    pub executable: String,
    pub node_name: Option<String>,
    pub namespace: Option<String>,
    pub arguments: Vec<String>,
    pub parameters: Vec<ResolvedParameter>,
    pub remappings: Vec<(String, String)>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub output: OutputMode,
    pub respawn: bool,
    pub respawn_delay: Option<Duration>,
    /// Parameter expressions, re-resolved before every spawn
    parameter_sources: Vec<ParameterSource>,
}

impl ResolvedAction {
    fn resolve(
        id: ActionId,
        action: &ProcessAction,
        resolver: &mut Resolver,
        launch_env: &HashMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let package = action
            .package
            .as_ref()
            .map(|p| resolver.resolve(p))
            .transpose()?;
        let node_name = match &action.name {
            Some(name) => Some(resolver.resolve(name)?),
            None if package.is_some() => Some(action.label.clone()),
            None => None,
        };

        let mut env = launch_env.clone();
        for (key, value) in &action.env {
            env.insert(key.clone(), resolver.resolve(value)?);
        }

        let mut remappings = Vec::with_capacity(action.remappings.len());
        for remap in &action.remappings {
            remappings.push((resolver.resolve(&remap.from)?, resolver.resolve(&remap.to)?));
        }

        Ok(Self {
            id,
            label: action.label.clone(),
            package,
            executable: resolver.resolve(&action.executable)?,
            node_name,
            namespace: action
                .namespace
                .as_ref()
                .map(|ns| resolver.resolve(ns))
                .transpose()?,
            arguments: action
                .arguments
                .iter()
                .map(|a| resolver.resolve(a))
                .collect::<Result<_, _>>()?,
            parameters: resolve_parameters(&action.parameters, resolver)?,
            remappings,
            env,
            working_dir: action
                .working_dir
                .as_ref()
                .map(|d| resolver.resolve(d).map(PathBuf::from))
                .transpose()?,
            output: action.output,
            respawn: action.respawn.is_enabled(resolver)?,
            respawn_delay: action.respawn_delay,
            parameter_sources: action.parameters.clone(),
        })
    }

    /// Build the concrete command for a spawn.
    ///
    /// Parameter expressions are resolved again and every parameter file
    /// must exist; the package executable must be present on disk.
    pub fn command(&self, resolver: &mut Resolver) -> Result<LaunchCommand, RuntimeProcessError> {
        let spawn_error = |reason: String| RuntimeProcessError::ProcessSpawn {
            action: self.label.clone(),
            reason,
        };

        let program = match &self.package {
            Some(package) => {
                let path = resolver
                    .locator()
                    .find_executable(package, &self.executable)
                    .map_err(|e| spawn_error(e.to_string()))?;
                if !path.is_file() {
                    return Err(spawn_error(format!(
                        "executable '{}' not found in package '{}' ({})",
                        self.executable,
                        package,
                        path.display()
                    )));
                }
                path
            }
            None => PathBuf::from(&self.executable),
        };

        let parameters = resolve_parameters(&self.parameter_sources, resolver)
            .map_err(|e| spawn_error(e.to_string()))?;

        let mut ros_args: Vec<String> = Vec::new();
        if let Some(name) = &self.node_name {
            ros_args.extend(["-r".to_string(), format!("__node:={}", name)]);
        }
        if let Some(ns) = &self.namespace {
            ros_args.extend(["-r".to_string(), format!("__ns:={}", ns)]);
        }
        for parameter in parameters {
            match parameter {
                ResolvedParameter::File(path) => {
                    let path = absolute_path(Path::new(&path));
                    if !path.is_file() {
                        return Err(RuntimeProcessError::ConfigFileNotFound {
                            action: self.label.clone(),
                            path,
                        });
                    }
                    ros_args.extend([
                        "--params-file".to_string(),
                        path.to_string_lossy().into_owned(),
                    ]);
                }
                ResolvedParameter::Inline(values) => {
                    for (key, value) in values {
                        ros_args.extend(["-p".to_string(), format!("{}:={}", key, value)]);
                    }
                }
            }
        }
        for (from, to) in &self.remappings {
            ros_args.extend(["-r".to_string(), format!("{}:={}", from, to)]);
        }

        let mut args = self.arguments.clone();
        if self.package.is_some() && !ros_args.is_empty() {
            args.push("--ros-args".to_string());
            args.extend(ros_args);
        }

        Ok(LaunchCommand {
            name: self.label.clone(),
            program,
            args,
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
            output: self.output,
        })
    }
}

fn resolve_parameters(
    sources: &[ParameterSource],
    resolver: &mut Resolver,
) -> Result<Vec<ResolvedParameter>, ConfigurationError> {
    sources
        .iter()
        .map(|source| match source {
            ParameterSource::File(path) => resolver.resolve(path).map(ResolvedParameter::File),
            ParameterSource::Inline(map) => map
                .iter()
                .map(|(k, v)| Ok((k.clone(), resolver.resolve(v)?)))
                .collect::<Result<Vec<_>, ConfigurationError>>()
                .map(ResolvedParameter::Inline),
        })
        .collect()
}

/// Relative parameter paths are taken from the launcher's working directory
fn absolute_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// A launch graph after overrides, argument resolution and condition filtering
#[derive(Debug, Clone)]
pub struct PreparedLaunch {
    /// Final argument values in declaration order
    pub arguments: IndexMap<String, String>,
    /// Launch-level environment
    pub env: HashMap<String, String>,
    /// Enabled actions in graph order
    pub actions: Vec<ResolvedAction>,
    /// Labels of actions whose condition was false
    pub skipped: Vec<String>,
    /// Resolver with every argument memoized
    pub resolver: Resolver,
}

impl PreparedLaunch {
    /// Apply overrides and resolve everything that can be resolved without
    /// touching the filesystem. Any failure aborts before a process starts.
    pub fn prepare(
        graph: &LaunchGraph,
        overrides: &HashMap<String, String>,
        locator: Arc<dyn PackageLocator>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigurationError> {
        let mut registry = graph.registry();
        // Sorted so the reported unknown key does not depend on hash order
        let mut keys: Vec<_> = overrides.iter().collect();
        keys.sort();
        registry.apply_overrides(keys)?;

        let mut resolver = Resolver::new(Arc::new(registry), locator).with_envs(env.clone());

        for &id in graph.resolution_order() {
            let name = &graph.declaration(id).name;
            let value = resolver.resolve(&Expression::arg(name.as_str()))?;
            log::debug!("Argument {} = {}", name, value);
        }
        let arguments = resolver.resolve_all()?;

        let mut actions = Vec::new();
        let mut skipped = Vec::new();
        for (id, action) in graph.actions() {
            let Action::Process(process) = action;
            if !process.condition.is_enabled(&mut resolver)? {
                log::info!("[{}] Condition is false, not launching", process.label);
                skipped.push(process.label.clone());
                continue;
            }
            actions.push(ResolvedAction::resolve(id, process, &mut resolver, &env)?);
        }

        Ok(Self {
            arguments,
            env,
            actions,
            skipped,
            resolver,
        })
    }

    /// Describe what would be launched, without starting anything
    pub fn plan(&self) -> LaunchPlan {
        let mut resolver = self.resolver.clone();
        let nodes = self
            .actions
            .iter()
            .map(|action| {
                let (command, error) = match action.command(&mut resolver) {
                    Ok(cmd) => (cmd.display_line(), None),
                    Err(e) => (
                        format!("{} {}", action.executable, action.arguments.join(" ")),
                        Some(e.to_string()),
                    ),
                };
                LaunchPlanNode {
                    name: action.label.clone(),
                    package: action.package.clone(),
                    command,
                    parameters: action.parameters.clone(),
                    output: action.output,
                    respawn: action.respawn,
                    error,
                }
            })
            .collect();

        LaunchPlan {
            args: self.arguments.clone(),
            env: self.env.clone(),
            nodes,
            skipped: self.skipped.clone(),
        }
    }
}

/// Launch plan for dry-run mode
#[derive(Debug, Serialize)]
pub struct LaunchPlan {
    /// Resolved arguments
    pub args: IndexMap<String, String>,
    /// Global environment
    pub env: HashMap<String, String>,
    /// Enabled nodes in launch order
    pub nodes: Vec<LaunchPlanNode>,
    /// Nodes disabled by their condition
    pub skipped: Vec<String>,
}

/// A node in the launch plan
#[derive(Debug, Serialize)]
pub struct LaunchPlanNode {
    pub name: String,
    pub package: Option<String>,
    pub command: String,
    pub parameters: Vec<ResolvedParameter>,
    pub output: OutputMode,
    pub respawn: bool,
    /// Problem that would stop this node from starting
    pub error: Option<String>,
}

/// Display the launch plan in a human-readable format
impl std::fmt::Display for LaunchPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Launch Plan")?;
        writeln!(f, "===========")?;
        writeln!(f)?;

        if !self.args.is_empty() {
            writeln!(f, "Arguments:")?;
            for (key, value) in &self.args {
                writeln!(f, "  {}: {}", key, value)?;
            }
            writeln!(f)?;
        }

        if !self.env.is_empty() {
            writeln!(f, "Global Environment:")?;
            for (key, value) in &self.env {
                writeln!(f, "  {}={}", key, value)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Nodes (in launch order):")?;
        for (i, node) in self.nodes.iter().enumerate() {
            writeln!(f)?;
            writeln!(
                f,
                "  {}. {} {}",
                i + 1,
                node.name,
                node.package
                    .as_ref()
                    .map(|p| format!("[{}]", p))
                    .unwrap_or_default()
            )?;
            writeln!(f, "     Command: {}", node.command)?;
            writeln!(f, "     Output: {:?}, respawn: {}", node.output, node.respawn)?;
            if let Some(error) = &node.error {
                writeln!(f, "     Will fail: {}", error)?;
            }
        }

        if !self.skipped.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped (condition false): {}", self.skipped.join(", "))?;
        }

        Ok(())
    }
}
