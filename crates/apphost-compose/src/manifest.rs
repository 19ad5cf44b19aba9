//! YAML composition manifests.
//!
//! A manifest lists resources with their kind, references and launch
//! settings. [`Manifest::build_graph`] turns it into a frozen
//! [`CompositionGraph`]; [`Manifest::launch_specs`] extracts what a
//! process launcher needs to start each resource.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use apphost_common::constants;
use apphost_common::error::{AppHostError, GraphError, Result};
use apphost_common::types::ResourceKind;
use serde::{Deserialize, Serialize};

use crate::graph::{CompositionGraph, GraphBuilder};

/// Root of a composition manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Optional composition name, used in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Declared resources, in declaration order.
    #[serde(default)]
    pub resources: Vec<ResourceDecl>,
}

/// One resource entry of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDecl {
    /// Unique resource name.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Names of the resources this one needs.
    #[serde(default)]
    pub references: Vec<String>,
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Port the resource listens on once ready.
    pub port: u16,
    /// Endpoint scheme advertised to dependents.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Host the resource is reachable at.
    #[serde(default = "default_host")]
    pub host: String,
    /// Extra environment variables for the process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory of the process.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ResourceDecl {
    /// Launch settings of this resource.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            port: self.port,
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
        }
    }
}

/// How to start a resource as a local process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Port the resource listens on once ready.
    pub port: u16,
    /// Endpoint scheme advertised to dependents.
    pub scheme: String,
    /// Host the resource is reachable at.
    pub host: String,
    /// Extra environment variables for the process.
    pub env: BTreeMap<String, String>,
    /// Working directory of the process.
    pub working_dir: Option<PathBuf>,
}

fn default_scheme() -> String {
    constants::DEFAULT_SCHEME.to_owned()
}

fn default_host() -> String {
    constants::DEFAULT_HOST.to_owned()
}

/// Parses a manifest from YAML text and validates it.
///
/// # Errors
///
/// Returns a configuration error if the YAML is malformed or a resource
/// entry is invalid.
pub fn parse_manifest(input: &str) -> Result<Manifest> {
    let manifest: Manifest = serde_yaml::from_str(input).map_err(|e| AppHostError::Config {
        message: format!("malformed manifest: {e}"),
    })?;
    manifest.validate()?;
    Ok(manifest)
}

/// Reads and parses a manifest file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or any error of
/// [`parse_manifest`].
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    tracing::info!(path = %path.display(), "loading manifest");
    let content = std::fs::read_to_string(path).map_err(|e| AppHostError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_manifest(&content)
}

impl Manifest {
    /// Checks per-resource settings that the graph builder does not cover.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty name, an empty command
    /// or a zero port.
    pub fn validate(&self) -> Result<()> {
        for decl in &self.resources {
            if decl.name.trim().is_empty() {
                return Err(invalid("resource name must not be empty"));
            }
            if decl.command.first().is_none_or(String::is_empty) {
                return Err(invalid(format!("resource {}: command is empty", decl.name)));
            }
            if decl.port == 0 {
                return Err(invalid(format!("resource {}: port must be non-zero", decl.name)));
            }
        }
        Ok(())
    }

    /// Declares every resource, adds every reference and freezes the graph.
    ///
    /// Resources are declared before any reference is added, so references
    /// may point forward in the document.
    ///
    /// # Errors
    ///
    /// Returns the graph error raised by the builder: duplicate names,
    /// references to undeclared names, cycles, or an empty manifest.
    pub fn build_graph(&self) -> Result<CompositionGraph> {
        let mut builder = GraphBuilder::new();
        let mut handles = HashMap::with_capacity(self.resources.len());
        for decl in &self.resources {
            let handle = builder.declare(&decl.name, decl.kind)?;
            let _ = handles.insert(decl.name.as_str(), handle);
        }

        for decl in &self.resources {
            let dependent = handles[decl.name.as_str()];
            let mut seen = HashSet::new();
            for reference in &decl.references {
                if !seen.insert(reference.as_str()) {
                    tracing::warn!(resource = %decl.name, %reference, "duplicate reference ignored");
                    continue;
                }
                let dependency = *handles.get(reference.as_str()).ok_or_else(|| {
                    GraphError::UnknownResource {
                        reference: reference.clone(),
                    }
                })?;
                builder.add_reference(dependent, dependency)?;
            }
        }

        let graph = builder.freeze()?;
        tracing::info!(
            composition = self.name.as_deref().unwrap_or(constants::APP_NAME),
            resources = graph.len(),
            references = graph.reference_count(),
            "composition graph built"
        );
        Ok(graph)
    }

    /// Launch settings keyed by resource name.
    #[must_use]
    pub fn launch_specs(&self) -> HashMap<String, LaunchSpec> {
        self.resources
            .iter()
            .map(|decl| (decl.name.clone(), decl.launch_spec()))
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> AppHostError {
    AppHostError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const WEATHER: &str = r#"
name: weather
resources:
  - name: web
    kind: deployable
    command: ["./web"]
    port: 5100
    references: [api]
  - name: api
    kind: deployable
    command: ["./api", "--verbose"]
    port: 5000
    references: [cache]
    env:
      RUST_LOG: debug
  - name: cache
    kind: external
    command: ["redis-server", "--port", "6379"]
    port: 6379
    scheme: tcp
"#;

    #[test]
    fn parse_applies_defaults() {
        let manifest = parse_manifest(WEATHER).expect("should parse");
        assert_eq!(manifest.name.as_deref(), Some("weather"));
        assert_eq!(manifest.resources.len(), 3);

        let web = &manifest.resources[0];
        assert_eq!(web.scheme, "http");
        assert_eq!(web.host, "localhost");
        assert!(web.env.is_empty());

        let cache = &manifest.resources[2];
        assert_eq!(cache.kind, ResourceKind::ExternalDependency);
        assert_eq!(cache.scheme, "tcp");
        assert!(cache.references.is_empty());
    }

    #[test]
    fn build_graph_allows_forward_references() {
        let manifest = parse_manifest(WEATHER).expect("should parse");
        let graph = manifest.build_graph().expect("should build");
        let order: Vec<_> = graph.startup_sequence().map(|(_, r)| r.name()).collect();
        assert_eq!(order, vec!["cache", "api", "web"]);
    }

    #[test]
    fn launch_specs_are_keyed_by_name() {
        let manifest = parse_manifest(WEATHER).expect("should parse");
        let specs = manifest.launch_specs();
        let api = specs.get("api").expect("api spec");
        assert_eq!(api.command, vec!["./api", "--verbose"]);
        assert_eq!(api.env.get("RUST_LOG").map(String::as_str), Some("debug"));
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let input = r#"
resources:
  - name: api
    kind: deployable
    command: ["./api"]
    port: 5000
    references: [db]
"#;
        let manifest = parse_manifest(input).expect("should parse");
        let err = manifest.build_graph().unwrap_err();
        assert!(
            matches!(err, AppHostError::Graph(GraphError::UnknownResource { ref reference }) if reference == "db"),
            "got: {err}"
        );
    }

    #[test]
    fn cyclic_manifest_is_rejected() {
        let input = r#"
resources:
  - name: a
    kind: deployable
    command: ["./a"]
    port: 1
    references: [b]
  - name: b
    kind: deployable
    command: ["./b"]
    port: 2
    references: [a]
"#;
        let manifest = parse_manifest(input).expect("should parse");
        let err = manifest.build_graph().unwrap_err();
        assert!(matches!(err, AppHostError::Graph(GraphError::Cycle { .. })), "got: {err}");
    }

    #[test]
    fn empty_manifest_cannot_build() {
        let manifest = parse_manifest("resources: []").expect("should parse");
        let err = manifest.build_graph().unwrap_err();
        assert!(matches!(err, AppHostError::Graph(GraphError::EmptyGraph)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let input = r#"
resources:
  - name: api
    kind: deployable
    command: []
    port: 5000
"#;
        let msg = parse_manifest(input).unwrap_err().to_string();
        assert!(msg.contains("command is empty"), "got: {msg}");
    }

    #[test]
    fn unknown_field_is_rejected() {
        let input = r#"
resources:
  - name: api
    kind: deployable
    command: ["./api"]
    port: 5000
    replicas: 3
"#;
        let msg = parse_manifest(input).unwrap_err().to_string();
        assert!(msg.contains("malformed manifest"), "got: {msg}");
    }

    #[test]
    fn load_manifest_reads_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(WEATHER.as_bytes()).expect("write");
        let manifest = load_manifest(file.path()).expect("should load");
        assert_eq!(manifest.resources.len(), 3);
    }

    #[test]
    fn load_manifest_reports_missing_file() {
        let err = load_manifest(Path::new("/nonexistent/apphost.yaml")).unwrap_err();
        assert!(matches!(err, AppHostError::Io { .. }));
    }
}
