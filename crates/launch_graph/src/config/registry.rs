//! Argument registry: declared launch arguments and caller overrides

use crate::config::expression::Expression;
use crate::error::ConfigurationError;
use indexmap::IndexMap;

/// A launch argument as written in the launch description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentDeclaration {
    /// Unique argument name
    pub name: String,
    /// Default value, possibly referencing other arguments
    pub default: Expression,
    /// Human readable description
    pub description: String,
}

impl ArgumentDeclaration {
    pub fn new(
        name: impl Into<String>,
        default: impl Into<Expression>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    declaration: ArgumentDeclaration,
    overridden: Option<String>,
}

/// Declared arguments in declaration order.
///
/// Overrides are plain strings supplied by the entry point; once resolution
/// starts the registry is only ever borrowed immutably.
#[derive(Debug, Clone, Default)]
pub struct ArgumentRegistry {
    entries: IndexMap<String, Entry>,
}

impl ArgumentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an argument. Each name may be declared once.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        default: Expression,
        description: impl Into<String>,
    ) -> Result<usize, ConfigurationError> {
        self.declare_argument(ArgumentDeclaration {
            name: name.into(),
            default,
            description: description.into(),
        })
    }

    /// Declare an argument from a prepared declaration, returning its index
    pub fn declare_argument(
        &mut self,
        declaration: ArgumentDeclaration,
    ) -> Result<usize, ConfigurationError> {
        if self.entries.contains_key(&declaration.name) {
            return Err(ConfigurationError::DuplicateArgument(declaration.name));
        }
        let (index, _) = self.entries.insert_full(
            declaration.name.clone(),
            Entry {
                declaration,
                overridden: None,
            },
        );
        Ok(index)
    }

    /// Replace the default of a declared argument. Last override wins.
    pub fn override_value(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), ConfigurationError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ConfigurationError::UnknownArgument(name.to_string()))?;
        entry.overridden = Some(value.into());
        Ok(())
    }

    /// Apply a batch of overrides, failing on the first unknown key
    pub fn apply_overrides<'a, I>(&mut self, overrides: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (name, value) in overrides {
            self.override_value(name, value.clone())?;
        }
        Ok(())
    }

    /// Effective expression for an argument: the override if any, else the default
    pub fn get(&self, name: &str) -> Result<Expression, ConfigurationError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigurationError::UnknownArgument(name.to_string()))?;
        Ok(match &entry.overridden {
            Some(value) => Expression::Literal(value.clone()),
            None => entry.declaration.default.clone(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|e| e.overridden.is_some())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get_index_of(name)
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ArgumentDeclaration> {
        self.entries.values().map(|e| &e.declaration)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_declaration_rejected() {
        let mut registry = ArgumentRegistry::new();
        registry
            .declare("use_rviz", Expression::literal("True"), "")
            .unwrap();
        let err = registry
            .declare("use_rviz", Expression::literal("False"), "")
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateArgument(n) if n == "use_rviz"));
    }

    #[test]
    fn test_override_takes_precedence() {
        let mut registry = ArgumentRegistry::new();
        registry
            .declare("use_rviz", Expression::literal("True"), "")
            .unwrap();
        registry.override_value("use_rviz", "False").unwrap();
        registry.override_value("use_rviz", "0").unwrap();

        assert_eq!(registry.get("use_rviz").unwrap(), Expression::literal("0"));
        assert!(registry.is_overridden("use_rviz"));
    }

    #[test]
    fn test_override_unknown_argument() {
        let mut registry = ArgumentRegistry::new();
        let err = registry.override_value("foo_bar", "1").unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownArgument(n) if n == "foo_bar"));
    }

    #[test]
    fn test_get_unknown_argument() {
        let registry = ArgumentRegistry::new();
        assert!(matches!(
            registry.get("missing"),
            Err(ConfigurationError::UnknownArgument(_))
        ));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let mut registry = ArgumentRegistry::new();
        for name in ["use_rviz", "avia_params_file", "camera_params_file"] {
            registry.declare(name, Expression::literal(""), "").unwrap();
        }
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["use_rviz", "avia_params_file", "camera_params_file"]);
        assert_eq!(registry.index_of("camera_params_file"), Some(2));
    }
}
