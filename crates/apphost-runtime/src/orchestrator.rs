//! Composition orchestrator.
//!
//! Starts the resources of a frozen graph one at a time in startup order,
//! handing each one the endpoints of its dependencies, then supervises
//! them until asked to stop and tears everything down in reverse order.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use apphost_common::constants;
use apphost_common::error::OrchestrationError;
use apphost_common::types::{Endpoint, RunId, RunState};
use apphost_compose::graph::{CompositionGraph, Resource, ResourceHandle};
use apphost_compose::resolver;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::event::ResourceEvent;
use crate::launcher::ResourceLauncher;
use crate::state::{self, RuntimeView, StateSnapshot};

/// How startup ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Startup {
    Completed,
    Interrupted,
}

/// Owns one run of a composition: the graph, the launcher and all runtime state.
pub struct Orchestrator<L> {
    run_id: RunId,
    graph: CompositionGraph,
    launcher: L,
    runtime: RuntimeView,
    /// Resources whose start was issued, in startup order.
    started: Vec<ResourceHandle>,
    events: broadcast::Sender<ResourceEvent>,
    supervise_interval: Duration,
    state_file: Option<PathBuf>,
}

impl<L: ResourceLauncher> Orchestrator<L> {
    /// Creates an orchestrator with every resource `Pending`.
    #[must_use]
    pub fn new(graph: CompositionGraph, launcher: L) -> Self {
        let (events, _) = broadcast::channel(constants::EVENT_CHANNEL_CAPACITY);
        Self {
            run_id: RunId::generate(),
            runtime: RuntimeView::new(&graph),
            graph,
            launcher,
            started: Vec::new(),
            events,
            supervise_interval: Duration::from_millis(constants::DEFAULT_SUPERVISE_INTERVAL_MS),
            state_file: None,
        }
    }

    /// Sets the delay between liveness sweeps.
    #[must_use]
    pub const fn with_supervise_interval(mut self, interval: Duration) -> Self {
        self.supervise_interval = interval;
        self
    }

    /// Persists a state snapshot to `path` after every transition.
    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Subscribes to run-state transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ResourceEvent> {
        self.events.subscribe()
    }

    /// Identifier of this run.
    #[must_use]
    pub const fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// The composition being run.
    #[must_use]
    pub const fn graph(&self) -> &CompositionGraph {
        &self.graph
    }

    /// The launcher resources are started with.
    #[must_use]
    pub const fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Current per-resource state.
    #[must_use]
    pub const fn runtime(&self) -> &RuntimeView {
        &self.runtime
    }

    /// Captures the current state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.runtime.snapshot(&self.run_id)
    }

    /// Starts every resource, supervises until `shutdown` completes, then
    /// stops everything in reverse startup order.
    ///
    /// If `shutdown` completes during startup, the in-flight start is
    /// abandoned, the remaining resources are never started and the
    /// shutdown proceeds immediately.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::StartupFailed`] if a resource fails to
    /// start. Resources already running are left running; call
    /// [`Orchestrator::shutdown`] to stop them. Returns
    /// [`OrchestrationError::ShutdownIncomplete`] if some resources could
    /// not be stopped.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), OrchestrationError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            run_id = %self.run_id,
            resources = self.graph.len(),
            "starting composition"
        );

        match self.start_all(shutdown.as_mut()).await? {
            Startup::Completed => {
                tracing::info!(run_id = %self.run_id, "all resources running");
                self.supervise(shutdown.as_mut()).await;
            }
            Startup::Interrupted => {
                tracing::info!(run_id = %self.run_id, "stop requested during startup");
            }
        }

        self.shutdown().await
    }

    /// Stops every started resource in reverse startup order.
    ///
    /// A resource whose stop fails is marked `Failed` and shutdown moves on.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestrationError::ShutdownIncomplete`] naming every
    /// resource that could not be stopped.
    pub async fn shutdown(&mut self) -> Result<(), OrchestrationError> {
        let mut failed = Vec::new();
        while let Some(handle) = self.started.pop() {
            let Some(resource) = self.graph.resource(handle).cloned() else {
                continue;
            };
            tracing::debug!(resource = %resource.name(), "stopping resource");
            match self.launcher.stop(&resource).await {
                Ok(()) => self.set_state(handle, RunState::Stopped, None).await,
                Err(e) => {
                    tracing::warn!(resource = %resource.name(), error = %e, "failed to stop resource");
                    self.set_state(handle, RunState::Failed, None).await;
                    failed.push(resource.name().to_owned());
                }
            }
        }

        if failed.is_empty() {
            tracing::info!(run_id = %self.run_id, "composition stopped");
            Ok(())
        } else {
            Err(OrchestrationError::ShutdownIncomplete { resources: failed })
        }
    }

    async fn start_all<F>(&mut self, mut shutdown: Pin<&mut F>) -> Result<Startup, OrchestrationError>
    where
        F: Future<Output = ()>,
    {
        let sequence: Vec<(ResourceHandle, Resource)> = self
            .graph
            .startup_sequence()
            .map(|(handle, resource)| (handle, resource.clone()))
            .collect();

        for (handle, resource) in sequence {
            let config = resolver::resolve(&self.graph, handle, |dependency| {
                self.runtime.running_endpoint(dependency)
            })?;

            self.set_state(handle, RunState::Starting, None).await;
            tracing::info!(
                resource = %resource.name(),
                kind = %resource.kind(),
                dependencies = config.len(),
                "starting resource"
            );

            let outcome = tokio::select! {
                biased;
                () = shutdown.as_mut() => None,
                result = self.launcher.start(&resource, &config) => Some(result),
            };

            match outcome {
                None => {
                    // The start call was dropped mid-flight; stop it like a started one.
                    self.started.push(handle);
                    return Ok(Startup::Interrupted);
                }
                Some(Ok(endpoint)) => {
                    tracing::info!(resource = %resource.name(), %endpoint, "resource running");
                    self.started.push(handle);
                    self.set_state(handle, RunState::Running, Some(endpoint)).await;
                }
                Some(Err(e)) => {
                    tracing::error!(resource = %resource.name(), error = %e, "resource failed to start");
                    self.set_state(handle, RunState::Failed, None).await;
                    return Err(OrchestrationError::StartupFailed {
                        resource: resource.name().to_owned(),
                        source: e,
                    });
                }
            }
        }

        Ok(Startup::Completed)
    }

    async fn supervise<F>(&mut self, mut shutdown: Pin<&mut F>)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.supervise_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let _ = ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.as_mut() => break,
                _ = ticker.tick() => self.check_liveness().await,
            }
        }
    }

    async fn check_liveness(&mut self) {
        let mut dead = Vec::new();
        for &handle in &self.started {
            if self.runtime.state(handle) != RunState::Running {
                continue;
            }
            if let Some(resource) = self.graph.resource(handle) {
                if !self.launcher.is_alive(resource).await {
                    tracing::error!(resource = %resource.name(), "resource is no longer running");
                    dead.push(handle);
                }
            }
        }
        for handle in dead {
            self.set_state(handle, RunState::Failed, None).await;
        }
    }

    async fn set_state(&mut self, handle: ResourceHandle, to: RunState, endpoint: Option<Endpoint>) {
        self.runtime.set_endpoint(handle, endpoint.clone());
        let from = self.runtime.transition(handle, to);
        let resource = self
            .runtime
            .status(handle)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        tracing::debug!(%resource, %from, %to, "state changed");

        let _ = self.events.send(ResourceEvent::StateChanged {
            resource,
            from,
            to,
            endpoint,
        });

        if let Some(path) = self.state_file.clone() {
            let snapshot = self.runtime.snapshot(&self.run_id);
            let target = path.clone();
            let saved =
                tokio::task::spawn_blocking(move || state::save_snapshot(&target, &snapshot)).await;
            match saved {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to persist state");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "state writer task failed");
                }
            }
        }
    }
}

/// Runs `graph` with `launcher` until `shutdown` completes.
///
/// # Errors
///
/// See [`Orchestrator::run`].
pub async fn run<L, F>(graph: CompositionGraph, launcher: L, shutdown: F) -> Result<(), OrchestrationError>
where
    L: ResourceLauncher,
    F: Future<Output = ()>,
{
    Orchestrator::new(graph, launcher).run(shutdown).await
}
