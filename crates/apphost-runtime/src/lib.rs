//! # apphost-runtime
//!
//! Runs a frozen composition graph.
//!
//! - **Orchestrator**: sequential startup in dependency order, endpoint
//!   injection, liveness supervision and reverse-order shutdown.
//! - **Launcher**: the trait through which resources are started and stopped.
//! - **Process**: a launcher that runs each resource as a local process.
//! - **State**: per-resource run state and endpoints, with JSON snapshots.
//! - **Event**: broadcast of run-state transitions.

pub mod event;
pub mod launcher;
pub mod orchestrator;
pub mod process;
pub mod state;
