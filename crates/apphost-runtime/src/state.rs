//! Runtime state of a composition run.
//!
//! The [`RuntimeView`] holds each resource's run state and endpoint. It is
//! owned and mutated by the orchestrator alone; everyone else gets a
//! shared reference or a [`StateSnapshot`].

use std::path::Path;

use apphost_common::error::{AppHostError, Result};
use apphost_common::types::{Endpoint, ResourceKind, RunId, RunState};
use apphost_compose::graph::{CompositionGraph, ResourceHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run state and endpoint of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    /// Resource name.
    pub name: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Current run state.
    pub state: RunState,
    /// Endpoint, once the resource reached `Running`.
    pub endpoint: Option<Endpoint>,
}

/// Per-resource runtime table, indexed like the graph's declaration order.
#[derive(Debug, Clone)]
pub struct RuntimeView {
    entries: Vec<ResourceStatus>,
}

impl RuntimeView {
    /// Creates a view with every resource `Pending`.
    #[must_use]
    pub fn new(graph: &CompositionGraph) -> Self {
        let entries = graph
            .resources()
            .map(|(_, resource)| ResourceStatus {
                name: resource.name().to_owned(),
                kind: resource.kind(),
                state: RunState::Pending,
                endpoint: None,
            })
            .collect();
        Self { entries }
    }

    /// Status of one resource.
    #[must_use]
    pub fn status(&self, handle: ResourceHandle) -> Option<&ResourceStatus> {
        self.entries.get(handle.index())
    }

    /// Status of one resource, by name.
    #[must_use]
    pub fn status_by_name(&self, name: &str) -> Option<&ResourceStatus> {
        self.entries.iter().find(|s| s.name == name)
    }

    /// Run state of one resource; `Pending` for unknown handles.
    #[must_use]
    pub fn state(&self, handle: ResourceHandle) -> RunState {
        self.status(handle).map_or(RunState::Pending, |s| s.state)
    }

    /// Endpoint of a resource that is currently `Running`.
    #[must_use]
    pub fn running_endpoint(&self, handle: ResourceHandle) -> Option<Endpoint> {
        self.status(handle)
            .filter(|s| s.state == RunState::Running)
            .and_then(|s| s.endpoint.clone())
    }

    /// All statuses in declaration order.
    #[must_use]
    pub fn statuses(&self) -> &[ResourceStatus] {
        &self.entries
    }

    /// Moves a resource to `to` and returns its previous state.
    pub(crate) fn transition(&mut self, handle: ResourceHandle, to: RunState) -> RunState {
        self.entries
            .get_mut(handle.index())
            .map_or(RunState::Pending, |entry| {
                std::mem::replace(&mut entry.state, to)
            })
    }

    pub(crate) fn set_endpoint(&mut self, handle: ResourceHandle, endpoint: Option<Endpoint>) {
        if let Some(entry) = self.entries.get_mut(handle.index()) {
            entry.endpoint = endpoint;
        }
    }

    /// Captures the current state for reporting or persistence.
    #[must_use]
    pub fn snapshot(&self, run_id: &RunId) -> StateSnapshot {
        StateSnapshot {
            run_id: run_id.clone(),
            captured_at: Utc::now(),
            resources: self.entries.clone(),
        }
    }
}

/// Point-in-time copy of a run's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Run the snapshot belongs to.
    pub run_id: RunId,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    /// Per-resource status in declaration order.
    pub resources: Vec<ResourceStatus>,
}

/// Loads a state snapshot from disk.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_snapshot(path: &Path) -> Result<StateSnapshot> {
    tracing::debug!(path = %path.display(), "loading state snapshot");
    let content = std::fs::read_to_string(path).map_err(|e| AppHostError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Persists a state snapshot to disk atomically.
///
/// The snapshot is written next to `path` and renamed over it.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<()> {
    tracing::debug!(path = %path.display(), "saving state snapshot");
    let io_err = |e| AppHostError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let json = serde_json::to_string_pretty(snapshot)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use apphost_compose::graph::GraphBuilder;

    use super::*;

    fn graph() -> (CompositionGraph, ResourceHandle, ResourceHandle) {
        let mut builder = GraphBuilder::new();
        let cache = builder
            .declare("cache", ResourceKind::ExternalDependency)
            .expect("cache");
        let api = builder.declare("api", ResourceKind::Deployable).expect("api");
        builder.add_reference(api, cache).expect("api -> cache");
        (builder.freeze().expect("freeze"), cache, api)
    }

    #[test]
    fn new_view_is_all_pending() {
        let (graph, cache, _) = graph();
        let view = RuntimeView::new(&graph);
        assert_eq!(view.statuses().len(), 2);
        assert_eq!(view.state(cache), RunState::Pending);
        assert!(view.running_endpoint(cache).is_none());
        assert!(view.statuses().iter().all(|s| s.state == RunState::Pending));
    }

    #[test]
    fn endpoint_only_visible_while_running() {
        let (graph, cache, _) = graph();
        let mut view = RuntimeView::new(&graph);
        let ep = Endpoint::new("tcp", "localhost", 6379);
        assert_eq!(view.transition(cache, RunState::Starting), RunState::Pending);
        view.set_endpoint(cache, Some(ep.clone()));
        assert!(view.running_endpoint(cache).is_none());

        let _ = view.transition(cache, RunState::Running);
        assert_eq!(view.running_endpoint(cache), Some(ep));

        let _ = view.transition(cache, RunState::Stopped);
        assert!(view.running_endpoint(cache).is_none());
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let (graph, cache, api) = graph();
        let mut view = RuntimeView::new(&graph);
        let _ = view.transition(cache, RunState::Running);
        view.set_endpoint(cache, Some(Endpoint::new("tcp", "localhost", 6379)));
        let _ = view.transition(api, RunState::Failed);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("apphost.json");
        let snapshot = view.snapshot(&RunId::new("run-1"));
        save_snapshot(&path, &snapshot).expect("save");

        let loaded = load_snapshot(&path).expect("load");
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.resources[1].name, "api");
        assert_eq!(loaded.resources[1].state, RunState::Failed);
    }

    #[test]
    fn load_snapshot_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").expect("write");
        assert!(matches!(
            load_snapshot(&path),
            Err(AppHostError::Serialization { .. })
        ));
    }
}
