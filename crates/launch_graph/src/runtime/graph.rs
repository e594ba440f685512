//! Launch graph construction and static validation

use crate::config::{Action, ArgumentDeclaration, ArgumentRegistry, LaunchFile};
use crate::error::ConfigurationError;
use std::collections::{HashSet, VecDeque};

/// Index of an argument declaration in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub usize);

/// Index of an action in the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub usize);

/// Input element of a launch description, in textual order
#[derive(Debug, Clone)]
pub enum LaunchNode {
    Declaration(ArgumentDeclaration),
    Action(Action),
}

/// Validated, read-only launch graph.
///
/// Every argument reference points at a declared argument and argument
/// defaults form a DAG; `resolution_order` lists arguments so that each one
/// comes after everything its default reads.
#[derive(Debug, Clone)]
pub struct LaunchGraph {
    declarations: Vec<ArgumentDeclaration>,
    actions: Vec<Action>,
    registry: ArgumentRegistry,
    resolution_order: Vec<ArgId>,
}

impl LaunchGraph {
    /// Build a graph with all declarations ahead of all actions
    pub fn build(
        declarations: Vec<ArgumentDeclaration>,
        actions: Vec<Action>,
    ) -> Result<Self, ConfigurationError> {
        let nodes = declarations
            .into_iter()
            .map(LaunchNode::Declaration)
            .chain(actions.into_iter().map(LaunchNode::Action));
        Self::from_nodes(nodes)
    }

    /// Build a graph from a launch file
    pub fn from_launch_file(launch_file: LaunchFile) -> Result<Self, ConfigurationError> {
        let (declarations, actions) = launch_file.into_parts()?;
        Self::build(declarations, actions)
    }

    /// Build a graph from an interleaved sequence.
    ///
    /// Action position carries no dependency meaning: an action may
    /// reference an argument declared after it.
    pub fn from_nodes(
        nodes: impl IntoIterator<Item = LaunchNode>,
    ) -> Result<Self, ConfigurationError> {
        let mut declarations = Vec::new();
        let mut actions = Vec::new();
        let mut registry = ArgumentRegistry::new();
        let mut labels: HashSet<String> = HashSet::new();

        for node in nodes {
            match node {
                LaunchNode::Declaration(decl) => {
                    // Registry indices follow declaration order
                    registry.declare_argument(decl.clone())?;
                    declarations.push(decl);
                }
                LaunchNode::Action(action) => {
                    if !labels.insert(action.label().to_string()) {
                        return Err(ConfigurationError::DuplicateAction(
                            action.label().to_string(),
                        ));
                    }
                    actions.push(action);
                }
            }
        }

        Self::check_references(&declarations, &actions, &registry)?;
        Self::check_actions(&actions)?;
        let resolution_order = Self::topological_sort(&declarations, &registry)?;

        Ok(Self {
            declarations,
            actions,
            registry,
            resolution_order,
        })
    }

    /// Fail fast on references to undeclared arguments
    fn check_references(
        declarations: &[ArgumentDeclaration],
        actions: &[Action],
        registry: &ArgumentRegistry,
    ) -> Result<(), ConfigurationError> {
        for decl in declarations {
            for name in decl.default.referenced_arguments() {
                if !registry.contains(name) {
                    return Err(ConfigurationError::UndeclaredReference {
                        name: name.to_string(),
                        context: format!("Argument '{}' default", decl.name),
                    });
                }
            }
        }

        for action in actions {
            for (field, expr) in action.expressions() {
                for name in expr.referenced_arguments() {
                    if !registry.contains(name) {
                        return Err(ConfigurationError::UndeclaredReference {
                            name: name.to_string(),
                            context: format!("Action '{}' {}", action.label(), field),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    fn check_actions(actions: &[Action]) -> Result<(), ConfigurationError> {
        for action in actions {
            let Action::Process(process) = action;
            let reason = if process.is_node() {
                None
            } else if !process.parameters.is_empty() {
                Some("parameters require a package node")
            } else if !process.remappings.is_empty() {
                Some("remappings require a package node")
            } else if process.namespace.is_some() {
                Some("namespace requires a package node")
            } else {
                None
            };

            if let Some(reason) = reason {
                return Err(ConfigurationError::InvalidAction {
                    action: process.label.clone(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Topological sort of argument defaults using Kahn's algorithm
    fn topological_sort(
        declarations: &[ArgumentDeclaration],
        registry: &ArgumentRegistry,
    ) -> Result<Vec<ArgId>, ConfigurationError> {
        // Edges point from a referenced argument to the arguments reading it
        let mut in_degree = vec![0usize; declarations.len()];
        let mut dependents: Vec<Vec<ArgId>> = vec![Vec::new(); declarations.len()];
        let mut reads: Vec<Vec<ArgId>> = vec![Vec::new(); declarations.len()];

        for (i, decl) in declarations.iter().enumerate() {
            let mut seen = HashSet::new();
            let deps = decl
                .default
                .referenced_arguments()
                .into_iter()
                .filter_map(|name| registry.index_of(name))
                .map(ArgId);
            for dep in deps {
                if seen.insert(dep) {
                    in_degree[i] += 1;
                    dependents[dep.0].push(ArgId(i));
                    reads[i].push(dep);
                }
            }
        }

        let mut queue: VecDeque<ArgId> = (0..declarations.len())
            .filter(|&i| in_degree[i] == 0)
            .map(ArgId)
            .collect();
        let mut sorted = Vec::with_capacity(declarations.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for &dependent in &dependents[id.0] {
                in_degree[dependent.0] -= 1;
                if in_degree[dependent.0] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if sorted.len() != declarations.len() {
            let chain = Self::find_cycle(declarations, &reads, &in_degree);
            return Err(ConfigurationError::CyclicReference(chain));
        }

        Ok(sorted)
    }

    /// Walk read edges among unsorted arguments until one repeats
    fn find_cycle(
        declarations: &[ArgumentDeclaration],
        reads: &[Vec<ArgId>],
        in_degree: &[usize],
    ) -> Vec<String> {
        let stuck = |id: &ArgId| in_degree[id.0] > 0;
        let Some(start) = (0..declarations.len()).map(ArgId).find(|id| stuck(id)) else {
            return Vec::new();
        };

        let mut path = vec![start];
        let mut current = start;
        loop {
            // Every stuck argument reads at least one other stuck argument
            let Some(&next) = reads[current.0].iter().find(|id| stuck(id)) else {
                break;
            };
            if let Some(pos) = path.iter().position(|&id| id == next) {
                let mut names: Vec<String> = path[pos..]
                    .iter()
                    .map(|id| declarations[id.0].name.clone())
                    .collect();
                names.push(declarations[next.0].name.clone());
                return names;
            }
            path.push(next);
            current = next;
        }

        path.iter()
            .map(|id| declarations[id.0].name.clone())
            .collect()
    }

    /// Fresh registry holding this graph's declarations, ready for overrides
    pub fn registry(&self) -> ArgumentRegistry {
        self.registry.clone()
    }

    pub fn declarations(&self) -> &[ArgumentDeclaration] {
        &self.declarations
    }

    pub fn declaration(&self, id: ArgId) -> &ArgumentDeclaration {
        &self.declarations[id.0]
    }

    pub fn actions(&self) -> impl Iterator<Item = (ActionId, &Action)> {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, a)| (ActionId(i), a))
    }

    /// Arguments ordered so that dependencies resolve first
    pub fn resolution_order(&self) -> &[ArgId] {
        &self.resolution_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Condition, Expression, ProcessAction};

    fn decl(name: &str, default: Expression) -> ArgumentDeclaration {
        ArgumentDeclaration::new(name, default, "")
    }

    #[test]
    fn test_undeclared_reference_in_action() {
        let action = ProcessAction::node("mapper", "fast_livo", "fastlivo_mapping")
            .with_parameter_file(Expression::arg("foo_bar"));
        let result = LaunchGraph::build(
            vec![decl("use_rviz", Expression::literal("True"))],
            vec![action.into()],
        );

        match result {
            Err(ConfigurationError::UndeclaredReference { name, context }) => {
                assert_eq!(name, "foo_bar");
                assert!(context.contains("mapper"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_undeclared_reference_in_default() {
        let result = LaunchGraph::build(vec![decl("a", Expression::arg("missing"))], vec![]);
        assert!(matches!(
            result,
            Err(ConfigurationError::UndeclaredReference { name, .. }) if name == "missing"
        ));
    }

    #[test]
    fn test_cyclic_defaults_rejected() {
        let result = LaunchGraph::build(
            vec![
                decl("a", Expression::arg("b")),
                decl("b", Expression::arg("a")),
                decl("c", Expression::literal("ok")),
            ],
            vec![],
        );
        match result {
            Err(ConfigurationError::CyclicReference(chain)) => {
                assert_eq!(chain.first(), chain.last());
                assert!(chain.contains(&"a".to_string()));
                assert!(chain.contains(&"b".to_string()));
                assert!(!chain.contains(&"c".to_string()));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_rejected() {
        let result = LaunchGraph::build(vec![decl("a", Expression::arg("a"))], vec![]);
        assert!(matches!(result, Err(ConfigurationError::CyclicReference(c)) if c == vec!["a", "a"]));
    }

    #[test]
    fn test_resolution_order_respects_references() {
        let graph = LaunchGraph::build(
            vec![
                decl("outer", Expression::arg("inner")),
                decl("inner", Expression::literal("x")),
            ],
            vec![],
        )
        .unwrap();

        let order: Vec<_> = graph
            .resolution_order()
            .iter()
            .map(|&id| graph.declaration(id).name.as_str())
            .collect();
        assert_eq!(order, vec!["inner", "outer"]);
    }

    #[test]
    fn test_action_may_reference_later_declaration() {
        let rviz = ProcessAction::node("rviz2", "rviz2", "rviz2")
            .with_condition(Condition::if_true(Expression::arg("use_rviz")));
        let graph = LaunchGraph::from_nodes([
            LaunchNode::Action(rviz.into()),
            LaunchNode::Declaration(decl("use_rviz", Expression::literal("True"))),
        ])
        .unwrap();

        assert_eq!(graph.declaration(ArgId(0)).name, "use_rviz");
        let (id, action) = graph.actions().next().unwrap();
        assert_eq!(id, ActionId(0));
        assert_eq!(action.label(), "rviz2");
        assert!(graph.registry().contains("use_rviz"));
    }

    #[test]
    fn test_duplicates_rejected() {
        let result = LaunchGraph::build(
            vec![
                decl("a", Expression::literal("1")),
                decl("a", Expression::literal("2")),
            ],
            vec![],
        );
        assert!(matches!(result, Err(ConfigurationError::DuplicateArgument(n)) if n == "a"));

        let result = LaunchGraph::build(
            vec![],
            vec![
                ProcessAction::executable("x", "true").into(),
                ProcessAction::executable("x", "false").into(),
            ],
        );
        assert!(matches!(result, Err(ConfigurationError::DuplicateAction(n)) if n == "x"));
    }

    #[test]
    fn test_plain_executable_with_remapping_rejected() {
        let action = ProcessAction::executable("sh", "sh").with_remapping("a", "b");
        let result = LaunchGraph::build(vec![], vec![action.into()]);
        assert!(matches!(result, Err(ConfigurationError::InvalidAction { .. })));
    }
}
