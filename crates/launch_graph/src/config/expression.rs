//! Deferred string expressions and the `$(kind value)` text syntax

use crate::error::ConfigurationError;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Regex for matching substitution patterns: $(kind) or $(kind value)
static SUBSTITUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([A-Za-z][\w-]*)(?:\s+([^)]*))?\)").unwrap());

/// A value that is only turned into a string at resolution time
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Plain text
    Literal(String),
    /// Value of a declared launch argument
    ArgumentRef(String),
    /// Process environment variable, with an optional fallback literal
    EnvRef {
        name: String,
        default: Option<String>,
    },
    /// Installed share directory of a package, optionally joined with a subpath
    PackageShareLookup { package: String, subpath: Vec<String> },
    /// Children resolved in order and joined
    Concat(Vec<Expression>),
}

impl Expression {
    pub fn literal(value: impl Into<String>) -> Self {
        Expression::Literal(value.into())
    }

    pub fn arg(name: impl Into<String>) -> Self {
        Expression::ArgumentRef(name.into())
    }

    pub fn env(name: impl Into<String>) -> Self {
        Expression::EnvRef {
            name: name.into(),
            default: None,
        }
    }

    pub fn env_or(name: impl Into<String>, default: impl Into<String>) -> Self {
        Expression::EnvRef {
            name: name.into(),
            default: Some(default.into()),
        }
    }

    /// `package`'s share directory joined with each element of `subpath`
    pub fn package_share<I, S>(package: impl Into<String>, subpath: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expression::PackageShareLookup {
            package: package.into(),
            subpath: subpath.into_iter().map(Into::into).collect(),
        }
    }

    pub fn concat(parts: impl IntoIterator<Item = Expression>) -> Self {
        Expression::Concat(parts.into_iter().collect())
    }

    /// Parse launch-file text such as `$(find-pkg-share fast_livo)/config/a.yaml`.
    ///
    /// Recognized kinds: `arg`/`var`, `env`, `optenv` and `find-pkg-share`.
    pub fn parse(input: &str) -> Result<Self, ConfigurationError> {
        let mut parts: Vec<Expression> = Vec::new();
        let mut cursor = 0;

        for caps in SUBSTITUTION_PATTERN.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            push_literal(&mut parts, &input[cursor..whole.start()])?;
            cursor = whole.end();

            let kind = &caps[1];
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            parts.push(Self::parse_substitution(kind, value, whole.as_str())?);
        }
        push_literal(&mut parts, &input[cursor..])?;

        Ok(match parts.len() {
            0 => Expression::Literal(String::new()),
            1 => parts.remove(0),
            _ => Expression::Concat(parts),
        })
    }

    fn parse_substitution(
        kind: &str,
        value: &str,
        raw: &str,
    ) -> Result<Self, ConfigurationError> {
        let invalid = || ConfigurationError::InvalidSubstitution(raw.to_string());
        // Nested substitutions are not supported
        if value.contains("$(") {
            return Err(invalid());
        }

        match kind {
            "arg" | "var" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(invalid());
                }
                Ok(Expression::arg(value))
            }
            "env" | "optenv" => {
                let mut split = value.splitn(2, char::is_whitespace);
                let name = split.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
                let default = split.next().map(|d| d.trim().to_string());
                let default = match (kind, default) {
                    ("optenv", None) => Some(String::new()),
                    (_, d) => d,
                };
                Ok(Expression::EnvRef {
                    name: name.to_string(),
                    default,
                })
            }
            "find-pkg-share" => {
                if value.is_empty() || value.contains(char::is_whitespace) {
                    return Err(invalid());
                }
                Ok(Expression::package_share(value, Vec::<String>::new()))
            }
            _ => Err(invalid()),
        }
    }

    /// Names of every argument this expression reads, in encounter order
    pub fn referenced_arguments(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_arguments(&mut names);
        names
    }

    fn collect_arguments<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::ArgumentRef(name) => out.push(name),
            Expression::Concat(parts) => parts.iter().for_each(|p| p.collect_arguments(out)),
            _ => {}
        }
    }

    /// True when the expression needs no lookups at all
    pub fn is_literal(&self) -> bool {
        match self {
            Expression::Literal(_) => true,
            Expression::Concat(parts) => parts.iter().all(Expression::is_literal),
            _ => false,
        }
    }
}

fn push_literal(parts: &mut Vec<Expression>, text: &str) -> Result<(), ConfigurationError> {
    if text.is_empty() {
        return Ok(());
    }
    if let Some(pos) = text.find("$(") {
        return Err(ConfigurationError::InvalidSubstitution(text[pos..].to_string()));
    }
    if let Some(Expression::Literal(prev)) = parts.last_mut() {
        prev.push_str(text);
    } else {
        parts.push(Expression::Literal(text.to_string()));
    }
    Ok(())
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Literal(value.to_string())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Literal(value)
    }
}

/// Renders the launch-file text form
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(text) => write!(f, "{}", text),
            Expression::ArgumentRef(name) => write!(f, "$(arg {})", name),
            Expression::EnvRef { name, default: None } => write!(f, "$(env {})", name),
            Expression::EnvRef {
                name,
                default: Some(d),
            } if d.is_empty() => write!(f, "$(optenv {})", name),
            Expression::EnvRef {
                name,
                default: Some(d),
            } => write!(f, "$(env {} {})", name, d),
            Expression::PackageShareLookup { package, subpath } => {
                write!(f, "$(find-pkg-share {})", package)?;
                for segment in subpath {
                    write!(f, "/{}", segment)?;
                }
                Ok(())
            }
            Expression::Concat(parts) => parts.iter().try_for_each(|p| write!(f, "{}", p)),
        }
    }
}
