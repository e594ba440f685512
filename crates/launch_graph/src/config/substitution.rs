//! Substitution resolver for argument, environment and package-share lookups

use crate::config::expression::Expression;
use crate::config::registry::ArgumentRegistry;
use crate::error::ConfigurationError;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable holding the install prefixes searched for packages
pub const AMENT_PREFIX_PATH: &str = "AMENT_PREFIX_PATH";

/// Resolves package names to their installed locations
pub trait PackageLocator: Send + Sync {
    /// Installed data (share) directory of `package`
    fn package_share(&self, package: &str) -> Result<PathBuf, ConfigurationError>;

    /// Path of `executable` inside `package`.
    ///
    /// The default follows the ament layout: `<prefix>/share/<pkg>` pairs with
    /// `<prefix>/lib/<pkg>/<executable>`. The returned path may not exist.
    fn find_executable(
        &self,
        package: &str,
        executable: &str,
    ) -> Result<PathBuf, ConfigurationError> {
        let share = self.package_share(package)?;
        let prefix = share
            .parent()
            .and_then(Path::parent)
            .ok_or_else(|| ConfigurationError::PackageNotFound(package.to_string()))?;
        Ok(prefix.join("lib").join(package).join(executable))
    }
}

/// Package lookup over explicit overrides and the ament resource index
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    /// Package name -> share directory, consulted first
    overrides: HashMap<String, PathBuf>,
    /// Install prefixes in priority order
    prefixes: Vec<PathBuf>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over the prefixes listed in `AMENT_PREFIX_PATH`
    pub fn from_env() -> Self {
        let prefixes = std::env::var_os(AMENT_PREFIX_PATH)
            .map(|v| std::env::split_paths(&v).collect())
            .unwrap_or_default();
        Self {
            overrides: HashMap::new(),
            prefixes,
        }
    }

    /// Pin a package to an explicit share directory
    pub fn with_package(mut self, name: impl Into<String>, share_dir: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), share_dir.into());
        self
    }

    /// Add an install prefix searched after the existing ones
    pub fn with_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn prefixes(&self) -> &[PathBuf] {
        &self.prefixes
    }
}

impl PackageLocator for PackageIndex {
    fn package_share(&self, package: &str) -> Result<PathBuf, ConfigurationError> {
        if let Some(dir) = self.overrides.get(package) {
            return Ok(dir.clone());
        }

        for prefix in &self.prefixes {
            let marker = prefix
                .join("share/ament_index/resource_index/packages")
                .join(package);
            if marker.is_file() {
                return Ok(prefix.join("share").join(package));
            }
        }

        Err(ConfigurationError::PackageNotFound(package.to_string()))
    }
}

/// Evaluates expressions against the argument registry, the environment and
/// a package locator.
///
/// Argument values are memoized for the lifetime of the resolver, so the
/// same argument always yields the same string within one run. Environment
/// and package lookups are evaluated on every call.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<ArgumentRegistry>,
    locator: Arc<dyn PackageLocator>,
    /// Launch-level environment, consulted before the process environment
    env: HashMap<String, String>,
    cache: HashMap<String, String>,
    in_progress: Vec<String>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry)
            .field("env", &self.env)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(registry: Arc<ArgumentRegistry>, locator: Arc<dyn PackageLocator>) -> Self {
        Self {
            registry,
            locator,
            env: HashMap::new(),
            cache: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    /// Add launch-level environment variables
    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.env.extend(envs);
        self
    }

    pub fn registry(&self) -> &ArgumentRegistry {
        &self.registry
    }

    pub fn locator(&self) -> &dyn PackageLocator {
        self.locator.as_ref()
    }

    /// Resolve an expression to its final string
    pub fn resolve(&mut self, expr: &Expression) -> Result<String, ConfigurationError> {
        match expr {
            Expression::Literal(text) => Ok(text.clone()),
            Expression::ArgumentRef(name) => self.resolve_arg(name),
            Expression::EnvRef { name, default } => self.resolve_env(name, default.as_deref()),
            Expression::PackageShareLookup { package, subpath } => {
                let mut path = self.locator.package_share(package)?;
                for segment in subpath {
                    path.push(segment);
                }
                Ok(path.to_string_lossy().into_owned())
            }
            Expression::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    out.push_str(&self.resolve(part)?);
                }
                Ok(out)
            }
        }
    }

    /// Resolve every declared argument, in declaration order
    pub fn resolve_all(&mut self) -> Result<IndexMap<String, String>, ConfigurationError> {
        let registry = Arc::clone(&self.registry);
        registry
            .names()
            .map(|name| Ok((name.to_string(), self.resolve_arg(name)?)))
            .collect()
    }

    /// Resolve an argument reference
    fn resolve_arg(&mut self, name: &str) -> Result<String, ConfigurationError> {
        if let Some(value) = self.cache.get(name) {
            return Ok(value.clone());
        }

        if let Some(pos) = self.in_progress.iter().position(|n| n == name) {
            let mut chain = self.in_progress[pos..].to_vec();
            chain.push(name.to_string());
            return Err(ConfigurationError::CyclicReference(chain));
        }

        let expr = self.registry.get(name)?;
        self.in_progress.push(name.to_string());
        let result = self.resolve(&expr);
        self.in_progress.pop();

        let value = result?;
        self.cache.insert(name.to_string(), value.clone());
        Ok(value)
    }

    /// Resolve an environment variable reference
    fn resolve_env(&self, name: &str, default: Option<&str>) -> Result<String, ConfigurationError> {
        // First check launch-level env
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }

        // Then check system environment
        match (std::env::var(name), default) {
            (Ok(value), _) => Ok(value),
            (Err(_), Some(default)) => Ok(default.to_string()),
            (Err(_), None) => Err(ConfigurationError::MissingEnvironmentVariable(
                name.to_string(),
            )),
        }
    }
}
