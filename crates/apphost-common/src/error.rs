//! Unified error types for the apphost workspace.
//!
//! Build-time graph errors, launcher errors and orchestration errors each
//! get their own enum so callers can match on exactly the failures a
//! phase can produce. [`AppHostError`] wraps them for code that spans
//! several phases, such as loading a manifest and running it.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while describing or freezing a composition graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A resource with the same name was already declared.
    #[error("duplicate resource name: {name}")]
    DuplicateName {
        /// The offending name.
        name: String,
    },

    /// A handle or name does not belong to this graph.
    #[error("unknown resource: {reference}")]
    UnknownResource {
        /// Handle or name that could not be resolved.
        reference: String,
    },

    /// The reference would close a cycle.
    #[error("reference {dependent} -> {dependency} would create a cycle")]
    Cycle {
        /// Resource that would depend on `dependency`.
        dependent: String,
        /// Resource that already (transitively) depends on `dependent`.
        dependency: String,
    },

    /// `freeze` was called before any resource was declared.
    #[error("cannot freeze an empty composition graph")]
    EmptyGraph,

    /// The builder was already frozen.
    #[error("graph builder is closed; it was already frozen")]
    BuilderClosed,
}

/// Errors raised by a resource launcher.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The launcher has no launch settings for the resource.
    #[error("no launch settings for resource {resource}")]
    MissingLaunchSpec {
        /// Resource name.
        resource: String,
    },

    /// The resource process could not be spawned.
    #[error("failed to spawn {resource}: {source}")]
    Spawn {
        /// Resource name.
        resource: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Something already accepts connections on the resource's port.
    #[error("port {port} for {resource} is already in use")]
    PortInUse {
        /// Resource name.
        resource: String,
        /// Port that was found taken.
        port: u16,
    },

    /// The status of a spawned resource process could not be queried.
    #[error("failed to query status of {resource}: {source}")]
    Status {
        /// Resource name.
        resource: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The resource exited before it became ready.
    #[error("{resource} exited before becoming ready ({status})")]
    Exited {
        /// Resource name.
        resource: String,
        /// Exit status as reported by the OS.
        status: String,
    },

    /// The resource did not accept connections in time.
    #[error("{resource} not ready after {timeout_ms} ms")]
    NotReady {
        /// Resource name.
        resource: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The resource could not be stopped.
    #[error("failed to stop {resource}: {source}")]
    Stop {
        /// Resource name.
        resource: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Free-form failure reported by a custom launcher.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised while running a composition.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A dependency was not running when its dependent was about to start.
    ///
    /// This means the startup order is wrong and is never expected at runtime.
    #[error("internal ordering error: {dependency} is not running before {resource}")]
    InternalOrdering {
        /// Resource about to start.
        resource: String,
        /// Dependency that was not running.
        dependency: String,
    },

    /// A resource failed to start; startup was aborted.
    #[error("startup failed at resource {resource}: {source}")]
    StartupFailed {
        /// Name of the resource whose start failed.
        resource: String,
        /// Error reported by the launcher.
        source: LaunchError,
    },

    /// Some resources could not be stopped during shutdown.
    #[error("shutdown incomplete; failed to stop: {}", resources.join(", "))]
    ShutdownIncomplete {
        /// Names of the resources whose stop failed.
        resources: Vec<String>,
    },
}

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum AppHostError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or manifest is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// Building the composition graph failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Running the composition failed.
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, AppHostError>;
