//! Composition graph construction using `petgraph`.
//!
//! A [`GraphBuilder`] accumulates resources and references, rejecting
//! duplicates, foreign handles and cycles as they are added. Freezing it
//! yields an immutable [`CompositionGraph`] that carries the startup
//! order.
//!
//! Edges point from the dependency to the dependent, so that walking
//! outgoing edges visits the resources unblocked by a start.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;

use apphost_common::error::GraphError;
use apphost_common::types::ResourceKind;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

/// A named, typed node of the composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
}

impl Resource {
    /// Returns the resource name, unique within its graph.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the resource kind.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }
}

/// Opaque reference to a resource declared by a specific builder.
///
/// Handles stay valid on the graph produced by that builder's `freeze`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    graph: uuid::Uuid,
    node: NodeIndex,
}

impl ResourceHandle {
    /// Position of the resource in declaration order.
    #[must_use]
    pub fn index(self) -> usize {
        self.node.index()
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resource #{}", self.node.index())
    }
}

/// Mutable first phase of the two-phase graph API.
#[derive(Debug)]
pub struct GraphBuilder {
    id: uuid::Uuid,
    graph: DiGraph<Resource, ()>,
    closed: bool,
}

impl GraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            graph: DiGraph::new(),
            closed: false,
        }
    }

    /// Registers a new resource.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateName`] if the name is taken and
    /// [`GraphError::BuilderClosed`] after `freeze`.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        kind: ResourceKind,
    ) -> Result<ResourceHandle, GraphError> {
        self.ensure_open()?;
        let name = name.into();
        if self.graph.node_weights().any(|r| r.name == name) {
            return Err(GraphError::DuplicateName { name });
        }
        tracing::debug!(resource = %name, %kind, "declared resource");
        let node = self.graph.add_node(Resource { name, kind });
        Ok(ResourceHandle {
            graph: self.id,
            node,
        })
    }

    /// Records that `dependent` needs the endpoint of `dependency`.
    ///
    /// Adding a reference that already exists is a no-op. On error the
    /// graph is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownResource`] for handles from another
    /// builder, [`GraphError::Cycle`] if the edge would close a cycle and
    /// [`GraphError::BuilderClosed`] after `freeze`.
    pub fn add_reference(
        &mut self,
        dependent: ResourceHandle,
        dependency: ResourceHandle,
    ) -> Result<(), GraphError> {
        self.ensure_open()?;
        let from = self.node(dependency)?;
        let to = self.node(dependent)?;

        if self.graph.find_edge(from, to).is_some() {
            return Ok(());
        }
        if from == to || petgraph::algo::has_path_connecting(&self.graph, to, from, None) {
            return Err(GraphError::Cycle {
                dependent: self.graph[to].name.clone(),
                dependency: self.graph[from].name.clone(),
            });
        }

        tracing::debug!(
            dependent = %self.graph[to].name,
            dependency = %self.graph[from].name,
            "added reference"
        );
        let _ = self.graph.add_edge(from, to, ());
        Ok(())
    }

    /// Whether `freeze` already succeeded.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Produces the immutable graph and closes the builder.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::EmptyGraph`] if nothing was declared (the
    /// builder stays open) and [`GraphError::BuilderClosed`] if it was
    /// already frozen.
    pub fn freeze(&mut self) -> Result<CompositionGraph, GraphError> {
        self.ensure_open()?;
        if self.graph.node_count() == 0 {
            return Err(GraphError::EmptyGraph);
        }

        let graph = std::mem::take(&mut self.graph);
        self.closed = true;

        let Some(order) = startup_order(&graph) else {
            // Unreachable while add_reference rejects cycles.
            return Err(residual_cycle(&graph));
        };
        let order = order
            .into_iter()
            .map(|node| ResourceHandle {
                graph: self.id,
                node,
            })
            .collect();

        tracing::debug!(
            resources = graph.node_count(),
            references = graph.edge_count(),
            "froze composition graph"
        );
        Ok(CompositionGraph {
            id: self.id,
            graph,
            order,
        })
    }

    fn ensure_open(&self) -> Result<(), GraphError> {
        if self.closed {
            Err(GraphError::BuilderClosed)
        } else {
            Ok(())
        }
    }

    fn node(&self, handle: ResourceHandle) -> Result<NodeIndex, GraphError> {
        if handle.graph == self.id && handle.node.index() < self.graph.node_count() {
            Ok(handle.node)
        } else {
            Err(GraphError::UnknownResource {
                reference: handle.to_string(),
            })
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable, acyclic set of resources and references.
#[derive(Debug, Clone)]
pub struct CompositionGraph {
    id: uuid::Uuid,
    graph: DiGraph<Resource, ()>,
    order: Vec<ResourceHandle>,
}

impl CompositionGraph {
    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Always false: an empty graph cannot be frozen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Number of references.
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Looks up a resource by handle.
    #[must_use]
    pub fn resource(&self, handle: ResourceHandle) -> Option<&Resource> {
        if handle.graph == self.id {
            self.graph.node_weight(handle.node)
        } else {
            None
        }
    }

    /// Looks up a resource handle by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ResourceHandle> {
        find_node(&self.graph, name).map(|node| self.handle(node))
    }

    /// Iterates over resources in declaration order.
    pub fn resources(&self) -> impl Iterator<Item = (ResourceHandle, &Resource)> + '_ {
        self.graph
            .node_indices()
            .map(|node| (self.handle(node), &self.graph[node]))
    }

    /// Resources that `handle` references, in declaration order.
    #[must_use]
    pub fn dependencies(&self, handle: ResourceHandle) -> Vec<ResourceHandle> {
        self.neighbors(handle, Direction::Incoming)
    }

    /// Resources that reference `handle`, in declaration order.
    #[must_use]
    pub fn dependents(&self, handle: ResourceHandle) -> Vec<ResourceHandle> {
        self.neighbors(handle, Direction::Outgoing)
    }

    /// Dependencies-first order; ties go to the earliest declared resource.
    #[must_use]
    pub fn startup_order(&self) -> &[ResourceHandle] {
        &self.order
    }

    /// Resources paired with their handles, in startup order.
    pub fn startup_sequence(&self) -> impl Iterator<Item = (ResourceHandle, &Resource)> + '_ {
        self.order
            .iter()
            .map(|&handle| (handle, &self.graph[handle.node]))
    }

    fn handle(&self, node: NodeIndex) -> ResourceHandle {
        ResourceHandle {
            graph: self.id,
            node,
        }
    }

    fn neighbors(&self, handle: ResourceHandle, direction: Direction) -> Vec<ResourceHandle> {
        if self.resource(handle).is_none() {
            return Vec::new();
        }
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(handle.node, direction)
            .collect();
        nodes.sort_unstable();
        nodes.into_iter().map(|node| self.handle(node)).collect()
    }
}

fn find_node(graph: &DiGraph<Resource, ()>, name: &str) -> Option<NodeIndex> {
    graph.node_indices().find(|&node| graph[node].name == name)
}

/// Kahn's algorithm with a min-heap on declaration index, so the earliest
/// declared ready resource always goes first.
///
/// Returns `None` if the graph contains a cycle.
fn startup_order(graph: &DiGraph<Resource, ()>) -> Option<Vec<NodeIndex>> {
    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|node| graph.neighbors_directed(node, Direction::Incoming).count())
        .collect();
    let mut ready: BinaryHeap<Reverse<NodeIndex>> = graph
        .node_indices()
        .filter(|node| in_degree[node.index()] == 0)
        .map(Reverse)
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());
    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            let degree = &mut in_degree[next.index()];
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    (order.len() == graph.node_count()).then_some(order)
}

fn residual_cycle(graph: &DiGraph<Resource, ()>) -> GraphError {
    let edge = graph
        .edge_indices()
        .filter_map(|edge| graph.edge_endpoints(edge))
        .find(|&(from, to)| petgraph::algo::has_path_connecting(graph, to, from, None));
    match edge {
        Some((from, to)) => GraphError::Cycle {
            dependent: graph[to].name.clone(),
            dependency: graph[from].name.clone(),
        },
        None => GraphError::Cycle {
            dependent: String::new(),
            dependency: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(graph: &CompositionGraph) -> Vec<&str> {
        graph.startup_sequence().map(|(_, r)| r.name()).collect()
    }

    #[test]
    fn single_resource_freezes() {
        let mut builder = GraphBuilder::new();
        let _ = builder
            .declare("api", ResourceKind::Deployable)
            .expect("declare");
        let graph = builder.freeze().expect("should freeze");
        assert_eq!(names(&graph), vec!["api"]);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn linear_chain_starts_dependencies_first() {
        let mut builder = GraphBuilder::new();
        let web = builder.declare("web", ResourceKind::Deployable).expect("web");
        let api = builder.declare("api", ResourceKind::Deployable).expect("api");
        let cache = builder
            .declare("cache", ResourceKind::ExternalDependency)
            .expect("cache");
        builder.add_reference(web, api).expect("web -> api");
        builder.add_reference(api, cache).expect("api -> cache");

        let graph = builder.freeze().expect("should freeze");
        assert_eq!(names(&graph), vec!["cache", "api", "web"]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let mut builder = GraphBuilder::new();
        let _ = builder.declare("z", ResourceKind::Deployable).expect("z");
        let y = builder.declare("y", ResourceKind::Deployable).expect("y");
        let x = builder.declare("x", ResourceKind::Deployable).expect("x");
        let w = builder.declare("w", ResourceKind::Deployable).expect("w");
        builder.add_reference(y, w).expect("y -> w");
        builder.add_reference(x, w).expect("x -> w");

        let graph = builder.freeze().expect("should freeze");
        assert_eq!(names(&graph), vec!["z", "w", "y", "x"]);
    }

    #[test]
    fn diamond_dependency() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let b = builder.declare("b", ResourceKind::Deployable).expect("b");
        let c = builder.declare("c", ResourceKind::Deployable).expect("c");
        let d = builder
            .declare("d", ResourceKind::ExternalDependency)
            .expect("d");
        builder.add_reference(a, b).expect("a -> b");
        builder.add_reference(a, c).expect("a -> c");
        builder.add_reference(b, d).expect("b -> d");
        builder.add_reference(c, d).expect("c -> d");

        let graph = builder.freeze().expect("should freeze");
        assert_eq!(names(&graph), vec!["d", "b", "c", "a"]);
        assert_eq!(graph.dependencies(a), vec![b, c]);
        assert_eq!(graph.dependents(d), vec![b, c]);
    }

    #[test]
    fn duplicate_name_is_rejected_and_first_stays_valid() {
        let mut builder = GraphBuilder::new();
        let api = builder.declare("api", ResourceKind::Deployable).expect("api");
        let err = builder
            .declare("api", ResourceKind::ExternalDependency)
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateName { name: "api".into() });

        let graph = builder.freeze().expect("should freeze");
        assert_eq!(graph.len(), 1);
        let resource = graph.resource(api).expect("first declaration");
        assert_eq!(resource.kind(), ResourceKind::Deployable);
    }

    #[test]
    fn two_node_cycle_is_rejected_and_graph_unchanged() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let b = builder.declare("b", ResourceKind::Deployable).expect("b");
        builder.add_reference(a, b).expect("a -> b");

        let err = builder.add_reference(b, a).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }), "got: {err}");

        let graph = builder.freeze().expect("still acyclic");
        assert_eq!(graph.reference_count(), 1);
        assert_eq!(names(&graph), vec!["b", "a"]);
    }

    #[test]
    fn three_node_cycle_is_rejected() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let b = builder.declare("b", ResourceKind::Deployable).expect("b");
        let c = builder.declare("c", ResourceKind::Deployable).expect("c");
        builder.add_reference(a, b).expect("a -> b");
        builder.add_reference(b, c).expect("b -> c");

        let err = builder.add_reference(c, a).unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle {
                dependent: "c".into(),
                dependency: "a".into(),
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let err = builder.add_reference(a, a).unwrap_err();
        assert!(matches!(err, GraphError::Cycle { .. }));
    }

    #[test]
    fn repeated_reference_is_idempotent() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let b = builder.declare("b", ResourceKind::Deployable).expect("b");
        builder.add_reference(a, b).expect("first");
        builder.add_reference(a, b).expect("second");
        let graph = builder.freeze().expect("should freeze");
        assert_eq!(graph.reference_count(), 1);
    }

    #[test]
    fn foreign_handle_is_unknown() {
        let mut other = GraphBuilder::new();
        let foreign = other.declare("x", ResourceKind::Deployable).expect("x");

        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let err = builder.add_reference(a, foreign).unwrap_err();
        assert!(matches!(err, GraphError::UnknownResource { .. }), "got: {err}");
        let err = builder.add_reference(foreign, a).unwrap_err();
        assert!(matches!(err, GraphError::UnknownResource { .. }), "got: {err}");
    }

    #[test]
    fn empty_builder_cannot_freeze_but_stays_open() {
        let mut builder = GraphBuilder::new();
        assert_eq!(builder.freeze().unwrap_err(), GraphError::EmptyGraph);
        assert!(!builder.is_closed());
        let _ = builder.declare("a", ResourceKind::Deployable).expect("a");
        assert!(builder.freeze().is_ok());
    }

    #[test]
    fn frozen_builder_rejects_mutation() {
        let mut builder = GraphBuilder::new();
        let a = builder.declare("a", ResourceKind::Deployable).expect("a");
        let _ = builder.freeze().expect("should freeze");

        assert_eq!(
            builder
                .declare("b", ResourceKind::Deployable)
                .unwrap_err(),
            GraphError::BuilderClosed
        );
        assert_eq!(builder.add_reference(a, a).unwrap_err(), GraphError::BuilderClosed);
        assert_eq!(builder.freeze().unwrap_err(), GraphError::BuilderClosed);
    }

    #[test]
    fn handles_survive_freeze() {
        let mut builder = GraphBuilder::new();
        let api = builder.declare("api", ResourceKind::Deployable).expect("api");
        let graph = builder.freeze().expect("should freeze");
        assert_eq!(graph.find("api"), Some(api));
        assert_eq!(graph.resource(api).map(Resource::name), Some("api"));
        assert!(graph.find("web").is_none());
    }

    #[test]
    fn independent_resources_keep_declaration_order() {
        let mut builder = GraphBuilder::new();
        for name in ["x", "y", "z"] {
            let _ = builder.declare(name, ResourceKind::Deployable).expect(name);
        }
        let graph = builder.freeze().expect("should freeze");
        assert_eq!(names(&graph), vec!["x", "y", "z"]);
        let declared: Vec<_> = graph.resources().map(|(_, r)| r.name()).collect();
        assert_eq!(declared, vec!["x", "y", "z"]);
    }
}
