//! Resource lifecycle event streaming.
//!
//! The orchestrator publishes every run-state transition on a broadcast
//! channel so observers (the CLI, tests) can follow a run without touching
//! its state.

use apphost_common::types::{Endpoint, RunState};

/// A resource lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceEvent {
    /// A resource changed run state.
    StateChanged {
        /// Resource that changed.
        resource: String,
        /// Previous state.
        from: RunState,
        /// New state.
        to: RunState,
        /// Endpoint, when the resource is now running.
        endpoint: Option<Endpoint>,
    },
}

impl ResourceEvent {
    /// Name of the resource the event is about.
    #[must_use]
    pub fn resource(&self) -> &str {
        match self {
            Self::StateChanged { resource, .. } => resource,
        }
    }
}
