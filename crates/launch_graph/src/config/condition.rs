//! Boolean guards evaluated from substitutions

use crate::config::expression::Expression;
use crate::config::substitution::Resolver;
use crate::error::ConfigurationError;

/// A guard deciding whether an action takes part in the launch.
///
/// `IfCondition` semantics by default; `negate` gives `UnlessCondition`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub expr: Expression,
    pub negate: bool,
}

impl Condition {
    /// Enabled when `expr` is truthy
    pub fn if_true(expr: impl Into<Expression>) -> Self {
        Self {
            expr: expr.into(),
            negate: false,
        }
    }

    /// Enabled when `expr` is not truthy
    pub fn unless(expr: impl Into<Expression>) -> Self {
        Self {
            expr: expr.into(),
            negate: true,
        }
    }

    /// A condition that needs no resolution
    pub fn constant(value: bool) -> Self {
        Self::if_true(Expression::literal(if value { "true" } else { "false" }))
    }

    pub fn always() -> Self {
        Self::constant(true)
    }

    pub fn never() -> Self {
        Self::constant(false)
    }

    /// Resolve and interpret the condition.
    ///
    /// Resolution failures propagate: a broken guard is a configuration
    /// error, not a reason to skip the action.
    pub fn is_enabled(&self, resolver: &mut Resolver) -> Result<bool, ConfigurationError> {
        let value = resolver.resolve(&self.expr)?;
        Ok(is_truthy(&value) != self.negate)
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

impl From<bool> for Condition {
    fn from(value: bool) -> Self {
        Self::constant(value)
    }
}

/// `true`, `1` and `yes` (any case) are truthy; everything else is not
pub fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1" || value.eq_ignore_ascii_case("yes")
}
