//! Endpoint resolution and environment variable injection.
//!
//! Once a resource's dependencies are running, their endpoints are
//! gathered into a [`ResolvedConfiguration`] that the launcher hands to
//! the started instance, typically as environment variables.

use std::collections::BTreeMap;

use apphost_common::error::OrchestrationError;
use apphost_common::types::{Endpoint, ResourceKind};

use crate::graph::{CompositionGraph, ResourceHandle};

/// A running dependency as seen by its dependent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    /// Kind of the dependency.
    pub kind: ResourceKind,
    /// Where the dependency is reachable.
    pub endpoint: Endpoint,
}

/// Dependency name to endpoint mapping for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedConfiguration {
    dependencies: BTreeMap<String, ResolvedDependency>,
}

impl ResolvedConfiguration {
    /// Creates an empty configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the endpoint of a dependency.
    pub fn insert(&mut self, name: impl Into<String>, kind: ResourceKind, endpoint: Endpoint) {
        let _ = self
            .dependencies
            .insert(name.into(), ResolvedDependency { kind, endpoint });
    }

    /// Returns the endpoint of the named dependency.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&Endpoint> {
        self.dependencies.get(name).map(|d| &d.endpoint)
    }

    /// Iterates dependencies by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedDependency)> {
        self.dependencies.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of resolved dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the resource has no dependencies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Renders the configuration as environment variables.
    ///
    /// For each dependency `name`, the dependent receives:
    /// - `<NAME>_HOST`, `<NAME>_PORT` and `<NAME>_URL`.
    /// - `ConnectionStrings__<name>` set to `host:port` for external
    ///   dependencies, or `services__<name>__<scheme>__0` set to the URL
    ///   for deployables.
    #[must_use]
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut env = Vec::with_capacity(self.dependencies.len() * 4);
        for (name, dep) in &self.dependencies {
            let prefix = env_prefix(name);
            env.push((format!("{prefix}_HOST"), dep.endpoint.host.clone()));
            env.push((format!("{prefix}_PORT"), dep.endpoint.port.to_string()));
            env.push((format!("{prefix}_URL"), dep.endpoint.url()));
            match dep.kind {
                ResourceKind::ExternalDependency => {
                    env.push((format!("ConnectionStrings__{name}"), dep.endpoint.authority()));
                }
                ResourceKind::Deployable => env.push((
                    format!("services__{name}__{}__0", dep.endpoint.scheme),
                    dep.endpoint.url(),
                )),
            }
        }
        env
    }
}

/// Upper-cases a resource name and replaces anything that is not
/// alphanumeric with `_`.
#[must_use]
pub fn env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds the configuration of `handle` from its dependencies' endpoints.
///
/// `endpoint_of` returns the endpoint of a dependency that is running,
/// or `None` if it is not.
///
/// # Errors
///
/// Returns [`OrchestrationError::InternalOrdering`] if a dependency has
/// no endpoint yet.
pub fn resolve<F>(
    graph: &CompositionGraph,
    handle: ResourceHandle,
    mut endpoint_of: F,
) -> Result<ResolvedConfiguration, OrchestrationError>
where
    F: FnMut(ResourceHandle) -> Option<Endpoint>,
{
    let resource_name = graph
        .resource(handle)
        .map_or_else(|| handle.to_string(), |r| r.name().to_owned());

    let mut config = ResolvedConfiguration::new();
    for dependency in graph.dependencies(handle) {
        let Some(resource) = graph.resource(dependency) else {
            continue;
        };
        let endpoint =
            endpoint_of(dependency).ok_or_else(|| OrchestrationError::InternalOrdering {
                resource: resource_name.clone(),
                dependency: resource.name().to_owned(),
            })?;
        config.insert(resource.name(), resource.kind(), endpoint);
    }
    Ok(config)
}
