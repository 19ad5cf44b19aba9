//! # apphost-compose
//!
//! Describes a composition of resources and how they reference each other.
//!
//! Handles:
//! - **Graph**: Two-phase builder producing an immutable, acyclic graph
//!   with a deterministic startup order.
//! - **Resolver**: Endpoint lookup for a resource's dependencies and the
//!   environment variables derived from it.
//! - **Manifest**: YAML composition files driving the builder.

pub mod graph;
pub mod manifest;
pub mod resolver;

pub use graph::{CompositionGraph, GraphBuilder, Resource, ResourceHandle};
pub use resolver::ResolvedConfiguration;
