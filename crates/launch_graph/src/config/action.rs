//! Launch actions: what to run, how, and under which guard

use crate::config::condition::Condition;
use crate::config::expression::Expression;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where a child's stdout/stderr go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Inherit the launcher's terminal
    Screen,
    /// Capture line by line into the launcher log
    #[default]
    Log,
}

/// One entry of a node's parameter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSource {
    /// Path to a parameter file, passed through uninterpreted
    File(Expression),
    /// Inline `name := value` pairs
    Inline(IndexMap<String, Expression>),
}

/// Topic/service name remapping `from -> to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remapping {
    pub from: Expression,
    pub to: Expression,
}

/// A process to launch, either a package node or a plain executable
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessAction {
    /// Unique label within the launch graph
    pub label: String,
    /// Package providing the executable; `None` for plain executables
    pub package: Option<Expression>,
    pub executable: Expression,
    /// Node name (`__node:=`); defaults to the label for package nodes
    pub name: Option<Expression>,
    pub namespace: Option<Expression>,
    /// Extra command-line arguments placed before `--ros-args`
    pub arguments: Vec<Expression>,
    pub parameters: Vec<ParameterSource>,
    pub remappings: Vec<Remapping>,
    pub env: IndexMap<String, Expression>,
    pub working_dir: Option<Expression>,
    pub output: OutputMode,
    /// Restart after an unexpected exit when this resolves truthy
    pub respawn: Condition,
    /// Fixed delay before each respawn, overriding the supervisor backoff
    pub respawn_delay: Option<Duration>,
    pub condition: Condition,
}

impl ProcessAction {
    /// A node provided by `package`
    pub fn node(
        label: impl Into<String>,
        package: impl Into<Expression>,
        executable: impl Into<Expression>,
    ) -> Self {
        let mut action = Self::executable(label, executable);
        action.package = Some(package.into());
        action
    }

    /// A plain executable found through a path or `PATH`
    pub fn executable(label: impl Into<String>, executable: impl Into<Expression>) -> Self {
        Self {
            label: label.into(),
            package: None,
            executable: executable.into(),
            name: None,
            namespace: None,
            arguments: Vec::new(),
            parameters: Vec::new(),
            remappings: Vec::new(),
            env: IndexMap::new(),
            working_dir: None,
            output: OutputMode::default(),
            respawn: Condition::never(),
            respawn_delay: None,
            condition: Condition::always(),
        }
    }

    pub fn with_name(mut self, name: impl Into<Expression>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<Expression>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_arguments<I, E>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expression>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    pub fn with_parameter_file(mut self, path: impl Into<Expression>) -> Self {
        self.parameters.push(ParameterSource::File(path.into()));
        self
    }

    pub fn with_parameters<I, K, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Expression>,
    {
        let map = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.parameters.push(ParameterSource::Inline(map));
        self
    }

    pub fn with_remapping(mut self, from: impl Into<Expression>, to: impl Into<Expression>) -> Self {
        self.remappings.push(Remapping {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<Expression>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<Expression>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    pub fn with_respawn(mut self, respawn: impl Into<Condition>) -> Self {
        self.respawn = respawn.into();
        self
    }

    pub fn with_respawn_delay(mut self, delay: Duration) -> Self {
        self.respawn_delay = Some(delay);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = condition;
        self
    }

    /// True for actions that receive a `--ros-args` block
    pub fn is_node(&self) -> bool {
        self.package.is_some()
    }

    /// Every expression the action evaluates, labelled by the field it came from
    pub fn expressions(&self) -> Vec<(String, &Expression)> {
        let mut out: Vec<(String, &Expression)> = Vec::new();
        if let Some(package) = &self.package {
            out.push(("package".to_string(), package));
        }
        out.push(("executable".to_string(), &self.executable));
        if let Some(name) = &self.name {
            out.push(("name".to_string(), name));
        }
        if let Some(ns) = &self.namespace {
            out.push(("namespace".to_string(), ns));
        }
        for (i, arg) in self.arguments.iter().enumerate() {
            out.push((format!("arguments[{}]", i), arg));
        }
        for (i, source) in self.parameters.iter().enumerate() {
            match source {
                ParameterSource::File(path) => out.push((format!("parameters[{}]", i), path)),
                ParameterSource::Inline(map) => {
                    for (key, value) in map {
                        out.push((format!("parameters[{}].{}", i, key), value));
                    }
                }
            }
        }
        for (i, remap) in self.remappings.iter().enumerate() {
            out.push((format!("remappings[{}].from", i), &remap.from));
            out.push((format!("remappings[{}].to", i), &remap.to));
        }
        for (key, value) in &self.env {
            out.push((format!("env.{}", key), value));
        }
        if let Some(dir) = &self.working_dir {
            out.push(("working_dir".to_string(), dir));
        }
        out.push(("respawn".to_string(), &self.respawn.expr));
        out.push(("condition".to_string(), &self.condition.expr));
        out
    }
}

/// An executable step of a launch graph.
///
/// Only process launches are supported; composable-node containers would be
/// a second variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Process(ProcessAction),
}

impl Action {
    pub fn label(&self) -> &str {
        match self {
            Action::Process(p) => &p.label,
        }
    }

    pub fn condition(&self) -> &Condition {
        match self {
            Action::Process(p) => &p.condition,
        }
    }

    pub fn expressions(&self) -> Vec<(String, &Expression)> {
        match self {
            Action::Process(p) => p.expressions(),
        }
    }
}

impl From<ProcessAction> for Action {
    fn from(action: ProcessAction) -> Self {
        Action::Process(action)
    }
}
