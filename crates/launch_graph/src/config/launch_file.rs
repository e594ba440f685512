//! Launch file YAML schema definitions

use crate::config::action::{Action, OutputMode, ParameterSource, ProcessAction, Remapping};
use crate::config::condition::Condition;
use crate::config::expression::Expression;
use crate::config::registry::ArgumentDeclaration;
use crate::error::ConfigurationError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Root launch file configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchFile {
    /// Launch file format version
    #[serde(default = "default_version")]
    pub version: String,

    /// Argument definitions with defaults
    #[serde(default)]
    pub args: IndexMap<String, ArgDefinition>,

    /// Environment variables (applied to all nodes and to `$(env ...)`)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Node definitions (ordered map for deterministic launch order)
    #[serde(default)]
    pub nodes: IndexMap<String, NodeConfig>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// Argument definition with default value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgDefinition {
    /// Default value for the argument
    pub default: ArgValue,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
}

/// Argument values can be strings, booleans, or numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ArgValue {
    /// Convert to string representation
    pub fn as_str(&self) -> String {
        match self {
            ArgValue::Bool(b) => b.to_string(),
            ArgValue::Int(i) => i.to_string(),
            ArgValue::Float(f) => f.to_string(),
            ArgValue::String(s) => s.clone(),
        }
    }
}

/// Node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Package providing the executable; omit for plain executables
    #[serde(default)]
    pub package: Option<String>,

    /// Executable name within the package, or a path / `PATH` command
    pub executable: String,

    /// Node name, defaults to the map key
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub namespace: Option<String>,

    /// Raw arguments passed directly to the executable
    #[serde(default)]
    pub arguments: Vec<String>,

    /// Parameter files or inline parameter maps
    #[serde(default)]
    pub parameters: Vec<ParameterEntry>,

    /// `[from, to]` name remappings
    #[serde(default)]
    pub remappings: Vec<(String, String)>,

    /// Environment variables specific to this node
    #[serde(default)]
    pub env: IndexMap<String, String>,

    /// Working directory for the process
    #[serde(default)]
    pub working_dir: Option<String>,

    #[serde(default)]
    pub output: OutputMode,

    /// Respawn on unexpected exit; a boolean or a substitution string
    #[serde(default = "default_respawn")]
    pub respawn: FlagValue,

    /// Seconds to wait before each respawn
    #[serde(default)]
    pub respawn_delay: Option<f64>,

    /// Launch only if this resolves truthy
    #[serde(default, rename = "if")]
    pub if_condition: Option<FlagValue>,

    /// Launch only if this does not resolve truthy
    #[serde(default)]
    pub unless: Option<FlagValue>,
}

fn default_respawn() -> FlagValue {
    FlagValue::Bool(false)
}

/// Parameter list entry: a file path or an inline map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterEntry {
    File(String),
    Inline(IndexMap<String, ArgValue>),
}

/// Flag value can be a direct boolean or a substitution string
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    String(String),
}

impl FlagValue {
    fn to_expression(&self) -> Result<Expression, ConfigurationError> {
        match self {
            FlagValue::Bool(b) => Ok(Expression::literal(b.to_string())),
            FlagValue::String(s) => Expression::parse(s),
        }
    }
}

impl LaunchFile {
    /// Load launch file from a YAML file
    pub fn from_file(path: &str) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_yaml(&content)
    }

    /// Parse launch file from YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        let launch_file: LaunchFile = serde_yaml::from_str(content)?;
        launch_file.validate()?;
        Ok(launch_file)
    }

    /// Validate the launch file configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (name, node) in &self.nodes {
            let invalid = |reason: &str| {
                Err(ConfigurationError::InvalidLaunchFile(format!(
                    "Node '{}': {}",
                    name, reason
                )))
            };

            if node.executable.trim().is_empty() {
                return invalid("'executable' must not be empty");
            }

            if node.if_condition.is_some() && node.unless.is_some() {
                return invalid("cannot specify both 'if' and 'unless'");
            }

            if node.package.is_none()
                && (!node.parameters.is_empty()
                    || !node.remappings.is_empty()
                    || node.namespace.is_some())
            {
                return invalid("'parameters', 'remappings' and 'namespace' require 'package'");
            }

            if let Some(delay) = node.respawn_delay {
                if Duration::try_from_secs_f64(delay).is_err() {
                    return invalid("'respawn_delay' must be a non-negative number of seconds");
                }
            }
        }

        Ok(())
    }

    /// Convert into argument declarations and actions, parsing every
    /// substitution string.
    pub fn into_parts(self) -> Result<(Vec<ArgumentDeclaration>, Vec<Action>), ConfigurationError> {
        let declarations = self
            .args
            .into_iter()
            .map(|(name, def)| {
                Ok(ArgumentDeclaration {
                    default: Expression::parse(&def.default.as_str())?,
                    description: def.description.unwrap_or_default(),
                    name,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let actions = self
            .nodes
            .into_iter()
            .map(|(label, node)| node.into_action(label).map(Action::Process))
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        Ok((declarations, actions))
    }
}

impl NodeConfig {
    fn into_action(self, label: String) -> Result<ProcessAction, ConfigurationError> {
        let parse = |s: &str| Expression::parse(s);

        let parameters = self
            .parameters
            .iter()
            .map(|entry| match entry {
                ParameterEntry::File(path) => parse(path).map(ParameterSource::File),
                ParameterEntry::Inline(map) => map
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), parse(&v.as_str())?)))
                    .collect::<Result<IndexMap<_, _>, ConfigurationError>>()
                    .map(ParameterSource::Inline),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let remappings = self
            .remappings
            .iter()
            .map(|(from, to)| {
                Ok(Remapping {
                    from: parse(from)?,
                    to: parse(to)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;

        let env = self
            .env
            .iter()
            .map(|(k, v)| Ok((k.clone(), parse(v)?)))
            .collect::<Result<IndexMap<_, _>, ConfigurationError>>()?;

        let condition = match (&self.if_condition, &self.unless) {
            (Some(flag), _) => Condition::if_true(flag.to_expression()?),
            (None, Some(flag)) => Condition::unless(flag.to_expression()?),
            (None, None) => Condition::always(),
        };

        let respawn_delay = self
            .respawn_delay
            .map(Duration::try_from_secs_f64)
            .transpose()
            .map_err(|e| {
                ConfigurationError::InvalidLaunchFile(format!(
                    "Node '{}': 'respawn_delay': {}",
                    label, e
                ))
            })?;

        Ok(ProcessAction {
            package: self.package.as_deref().map(parse).transpose()?,
            executable: parse(&self.executable)?,
            name: self.name.as_deref().map(parse).transpose()?,
            namespace: self.namespace.as_deref().map(parse).transpose()?,
            arguments: self
                .arguments
                .iter()
                .map(|a| parse(a))
                .collect::<Result<Vec<_>, _>>()?,
            parameters,
            remappings,
            env,
            working_dir: self.working_dir.as_deref().map(parse).transpose()?,
            output: self.output,
            respawn: Condition::if_true(self.respawn.to_expression()?),
            respawn_delay,
            condition,
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPPING_LAUNCH: &str = r#"
version: "1.0"
args:
  use_rviz:
    default: "True"
    description: "Whether to launch Rviz2"
  avia_params_file:
    default: "$(find-pkg-share fast_livo)/config/mid360.yaml"
  use_respawn:
    default: true
nodes:
  laserMapping:
    package: fast_livo
    executable: fastlivo_mapping
    parameters:
      - "$(arg avia_params_file)"
      - { use_sim_time: false }
    output: screen
    respawn: "$(arg use_respawn)"
  rviz2:
    package: rviz2
    executable: rviz2
    arguments: ["-d", "$(find-pkg-share fast_livo)/rviz_cfg/fast_livo2.rviz"]
    remappings:
      - ["in", "/left_camera/image"]
    if: "$(arg use_rviz)"
"#;

    #[test]
    fn test_parse_mapping_launch_file() {
        let launch_file = LaunchFile::from_yaml(MAPPING_LAUNCH).unwrap();
        assert_eq!(launch_file.args.len(), 3);
        assert_eq!(launch_file.nodes.len(), 2);
        assert_eq!(launch_file.nodes["laserMapping"].output, OutputMode::Screen);
        assert_eq!(launch_file.nodes["rviz2"].output, OutputMode::Log);
    }

    #[test]
    fn test_into_parts_parses_substitutions() {
        let (decls, actions) = LaunchFile::from_yaml(MAPPING_LAUNCH)
            .unwrap()
            .into_parts()
            .unwrap();

        assert_eq!(decls[0].name, "use_rviz");
        assert_eq!(decls[2].default, Expression::literal("true"));

        let Action::Process(mapping) = &actions[0];
        assert_eq!(mapping.label, "laserMapping");
        assert_eq!(
            mapping.parameters[0],
            ParameterSource::File(Expression::arg("avia_params_file"))
        );
        assert_eq!(mapping.respawn, Condition::if_true(Expression::arg("use_respawn")));

        let Action::Process(rviz) = &actions[1];
        assert_eq!(rviz.condition, Condition::if_true(Expression::arg("use_rviz")));
        assert_eq!(rviz.remappings.len(), 1);
    }

    #[test]
    fn test_validation_if_and_unless() {
        let yaml = r#"
nodes:
  bad_node:
    executable: "bin/bad"
    if: "true"
    unless: "false"
"#;
        let result = LaunchFile::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigurationError::InvalidLaunchFile(_))));
    }

    #[test]
    fn test_validation_plain_executable_with_parameters() {
        let yaml = r#"
nodes:
  bad_node:
    executable: "bin/bad"
    parameters: ["a.yaml"]
"#;
        let result = LaunchFile::from_yaml(yaml);
        assert!(matches!(result, Err(ConfigurationError::InvalidLaunchFile(_))));
    }

    #[test]
    fn test_unless_condition() {
        let yaml = r#"
args:
  headless:
    default: false
nodes:
  viewer:
    executable: "viewer"
    unless: "$(arg headless)"
    respawn_delay: 1.5
"#;
        let (_, actions) = LaunchFile::from_yaml(yaml).unwrap().into_parts().unwrap();
        let Action::Process(viewer) = &actions[0];
        assert!(viewer.condition.negate);
        assert_eq!(viewer.respawn_delay, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn test_respawn_delay_out_of_range() {
        for delay in ["-1.0", "1.0e30", ".nan", ".inf"] {
            let yaml = format!(
                "nodes:\n  viewer:\n    executable: viewer\n    respawn_delay: {}\n",
                delay
            );
            let result = LaunchFile::from_yaml(&yaml);
            assert!(
                matches!(result, Err(ConfigurationError::InvalidLaunchFile(_))),
                "respawn_delay {} accepted",
                delay
            );
        }
    }

    #[test]
    fn test_bad_substitution_rejected() {
        let yaml = r#"
nodes:
  n:
    executable: "$(timestamp)"
"#;
        let result = LaunchFile::from_yaml(yaml).unwrap().into_parts();
        assert!(matches!(result, Err(ConfigurationError::InvalidSubstitution(_))));
    }
}
