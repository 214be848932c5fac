//! The graph store.
//!
//! Nodes and edges live in a `petgraph` stable arena, which also provides the
//! edges-by-node adjacency and the endpoints-by-edge mapping. On top of that
//! the store keeps one index per type: every resident entity is listed under
//! each type in its ancestor chain. All four indices are written only by the
//! mutation methods below.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::{debug, trace};

use super::events::{GraphEvent, Listeners};
use super::types::{Edge, Entity, EntityId, EntityKind, Node, TypeId, TypeRegistry};
use crate::config::Config;
use crate::error::{MotifError, Result};

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u32);

/// The graph each resident entity lives in. Entity ids are unique across the
/// process, so the table is too.
fn residency() -> MutexGuard<'static, HashMap<EntityId, GraphId>> {
    static TABLE: OnceLock<Mutex<HashMap<EntityId, GraphId>>> = OnceLock::new();
    TABLE
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

/// Selects edges by endpoint for [`Graph::remove_edges_by_nodes`].
///
/// `from` and `to` together select the edges running from one to the other;
/// `from_or_to` selects every edge touching a node in either role. When both
/// forms are given the result is their intersection. `ty` filters last.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeFilter {
    pub from: Option<EntityId>,
    pub to: Option<EntityId>,
    pub from_or_to: Option<EntityId>,
    pub ty: Option<TypeId>,
}

pub struct Graph {
    id: GraphId,
    types: Arc<TypeRegistry>,
    config: Config,
    arena: StableDiGraph<Node, Edge>,
    node_slots: HashMap<EntityId, NodeIndex>,
    edge_slots: HashMap<EntityId, EdgeIndex>,
    nodes_by_type: HashMap<TypeId, BTreeSet<EntityId>>,
    edges_by_type: HashMap<TypeId, BTreeSet<EntityId>>,
    listeners: Listeners,
}

impl Graph {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self::with_config(types, Config::default())
    }

    pub fn with_config(types: Arc<TypeRegistry>, config: Config) -> Self {
        Self {
            id: GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)),
            types,
            config,
            arena: StableDiGraph::new(),
            node_slots: HashMap::new(),
            edge_slots: HashMap::new(),
            nodes_by_type: HashMap::new(),
            edges_by_type: HashMap::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn shared_types(&self) -> Arc<TypeRegistry> {
        Arc::clone(&self.types)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The graph `id` is currently resident in, if any.
    pub fn residence(id: EntityId) -> Option<GraphId> {
        residency().get(&id).copied()
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub(crate) fn listeners_mut(&mut self) -> &mut Listeners {
        &mut self.listeners
    }

    // ─── Lookups ───────────────────────────────────────────────────────

    pub fn node_count(&self) -> usize {
        self.node_slots.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_slots.len()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.node_slots.contains_key(&id) || self.edge_slots.contains_key(&id)
    }

    pub fn contains_node(&self, id: EntityId) -> bool {
        self.node_slots.contains_key(&id)
    }

    pub fn contains_edge(&self, id: EntityId) -> bool {
        self.edge_slots.contains_key(&id)
    }

    pub fn node(&self, id: EntityId) -> Option<Node> {
        let ix = self.node_slots.get(&id)?;
        self.arena.node_weight(*ix).copied()
    }

    /// The resident copy of an edge, endpoints included.
    pub fn edge(&self, id: EntityId) -> Option<Edge> {
        let ix = self.edge_slots.get(&id)?;
        self.arena.edge_weight(*ix).copied()
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.node(id)
            .map(Entity::Node)
            .or_else(|| self.edge(id).map(Entity::Edge))
    }

    pub fn nodes(&self) -> impl Iterator<Item = Node> + '_ {
        self.nodes_of_type(TypeId::NODE)
    }

    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        self.edges_of_type(TypeId::EDGE)
    }

    /// Resident nodes of `ty` or any subtype, in identity order.
    pub fn nodes_of_type(&self, ty: TypeId) -> impl Iterator<Item = Node> + '_ {
        self.nodes_by_type
            .get(&ty)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.node(*id))
    }

    /// Resident edges of `ty` or any subtype, in identity order.
    pub fn edges_of_type(&self, ty: TypeId) -> impl Iterator<Item = Edge> + '_ {
        self.edges_by_type
            .get(&ty)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.edge(*id))
    }

    /// Size of the type index for `ty`, whichever kind it is.
    pub fn count_of_type(&self, ty: TypeId) -> usize {
        self.nodes_by_type
            .get(&ty)
            .or_else(|| self.edges_by_type.get(&ty))
            .map_or(0, BTreeSet::len)
    }

    /// Edges whose `from` endpoint is `node`.
    pub fn outgoing(&self, node: EntityId) -> impl Iterator<Item = Edge> + '_ {
        self.adjacent(node, petgraph::Direction::Outgoing)
    }

    /// Edges whose `to` endpoint is `node`.
    pub fn incoming(&self, node: EntityId) -> impl Iterator<Item = Edge> + '_ {
        self.adjacent(node, petgraph::Direction::Incoming)
    }

    fn adjacent(
        &self,
        node: EntityId,
        dir: petgraph::Direction,
    ) -> impl Iterator<Item = Edge> + '_ {
        self.node_slots
            .get(&node)
            .into_iter()
            .flat_map(move |ix| self.arena.edges_directed(*ix, dir))
            .map(|edge| *edge.weight())
    }

    /// `(from, to)` of a resident edge.
    pub fn endpoints(&self, edge: EntityId) -> Option<(Node, Node)> {
        let ix = self.edge_slots.get(&edge)?;
        let (from, to) = self.arena.edge_endpoints(*ix)?;
        Some((*self.arena.node_weight(from)?, *self.arena.node_weight(to)?))
    }

    // ─── Nodes ─────────────────────────────────────────────────────────

    /// Add a node under every type in its ancestor chain. Adding a resident
    /// node again is a no-op.
    ///
    /// A node resident in another graph is rejected; use
    /// [`Graph::move_node_from`] to move it here.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        self.check_kind(node.ty(), EntityKind::Node)?;
        self.check_unclaimed(node.id())?;
        self.insert_node(node);
        Ok(())
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) -> Result<()> {
        for node in nodes {
            self.add_node(node)?;
        }
        Ok(())
    }

    fn insert_node(&mut self, node: Node) {
        if self.node_slots.contains_key(&node.id()) {
            return;
        }
        let ix = self.arena.add_node(node);
        self.node_slots.insert(node.id(), ix);
        residency().insert(node.id(), self.id);
        for ty in self.types.ancestors(node.ty()) {
            self.nodes_by_type.entry(*ty).or_default().insert(node.id());
        }
        trace!(node = %node.id(), ty = self.types.name(node.ty()), "node added");
        self.emit(GraphEvent::Added(Entity::Node(node)));
    }

    /// Remove a node and, first, every edge touching it. Returns false if the
    /// node was not resident.
    pub fn remove_node(&mut self, id: EntityId) -> bool {
        let Some(&ix) = self.node_slots.get(&id) else {
            return false;
        };
        let touching: Vec<EntityId> = self
            .arena
            .edges_directed(ix, petgraph::Direction::Outgoing)
            .chain(self.arena.edges_directed(ix, petgraph::Direction::Incoming))
            .map(|edge| edge.weight().id())
            .collect();
        for edge in touching {
            self.remove_edge(edge);
        }

        self.node_slots.remove(&id);
        release(id, self.id);
        let Some(node) = self.arena.remove_node(ix) else {
            return false;
        };
        for ty in self.types.ancestors(node.ty()) {
            if let Some(set) = self.nodes_by_type.get_mut(ty) {
                set.remove(&id);
            }
        }
        trace!(node = %id, "node removed");
        self.emit(GraphEvent::Removed(Entity::Node(node)));
        true
    }

    pub fn remove_nodes(&mut self, ids: impl IntoIterator<Item = EntityId>) -> usize {
        ids.into_iter().filter(|id| self.remove_node(*id)).count()
    }

    pub fn remove_nodes_by_type(&mut self, ty: TypeId) -> usize {
        let ids: Vec<EntityId> = self
            .nodes_by_type
            .get(&ty)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let removed = self.remove_nodes(ids);
        debug!(ty = self.types.name(ty), removed, "nodes removed by type");
        removed
    }

    // ─── Edges ─────────────────────────────────────────────────────────

    /// Add an edge, and its endpoints if they are not resident yet.
    ///
    /// Adding a resident edge again is a no-op. An edge without endpoints, or
    /// one that (or whose endpoints) lives in another graph, is a broken
    /// invariant and is rejected before any index is touched.
    pub fn add_edge(&mut self, edge: Edge) -> Result<Edge> {
        if let Some(resident) = self.edge(edge.id()) {
            return Ok(resident);
        }
        self.check_kind(edge.ty(), EntityKind::Edge)?;
        let Some((from, to)) = edge.endpoints() else {
            return Err(MotifError::BrokenInvariant(format!(
                "edge {} has no endpoints",
                edge.id()
            )));
        };
        self.check_kind(from.ty(), EntityKind::Node)?;
        self.check_kind(to.ty(), EntityKind::Node)?;
        for id in [edge.id(), from.id(), to.id()] {
            self.check_unclaimed(id)?;
        }

        self.insert_node(from);
        self.insert_node(to);
        let (Some(&from_ix), Some(&to_ix)) =
            (self.node_slots.get(&from.id()), self.node_slots.get(&to.id()))
        else {
            return Err(MotifError::BrokenInvariant(format!(
                "endpoints of edge {} are not resident",
                edge.id()
            )));
        };

        let ix = self.arena.add_edge(from_ix, to_ix, edge);
        self.edge_slots.insert(edge.id(), ix);
        residency().insert(edge.id(), self.id);
        for ty in self.types.ancestors(edge.ty()) {
            self.edges_by_type.entry(*ty).or_default().insert(edge.id());
        }
        trace!(edge = %edge.id(), from = %from.id(), to = %to.id(), "edge added");
        self.emit(GraphEvent::Added(Entity::Edge(edge)));
        Ok(edge)
    }

    /// Create and add an edge of type `ty` from `from` to `to`.
    pub fn connect(&mut self, ty: TypeId, from: Node, to: Node) -> Result<Edge> {
        self.add_edge(Edge::new(ty, from, to))
    }

    /// Remove an edge. Its endpoints stay resident.
    pub fn remove_edge(&mut self, id: EntityId) -> bool {
        let Some(ix) = self.edge_slots.remove(&id) else {
            return false;
        };
        release(id, self.id);
        let Some(edge) = self.arena.remove_edge(ix) else {
            return false;
        };
        for ty in self.types.ancestors(edge.ty()) {
            if let Some(set) = self.edges_by_type.get_mut(ty) {
                set.remove(&id);
            }
        }
        trace!(edge = %id, "edge removed");
        self.emit(GraphEvent::Removed(Entity::Edge(edge)));
        true
    }

    pub fn remove_edges(&mut self, ids: impl IntoIterator<Item = EntityId>) -> usize {
        ids.into_iter().filter(|id| self.remove_edge(*id)).count()
    }

    pub fn remove_edges_by_type(&mut self, ty: TypeId) -> usize {
        let ids: Vec<EntityId> = self
            .edges_by_type
            .get(&ty)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let removed = self.remove_edges(ids);
        debug!(ty = self.types.name(ty), removed, "edges removed by type");
        removed
    }

    pub fn remove_edges_by_nodes(&mut self, filter: EdgeFilter) -> usize {
        let ids: Vec<EntityId> = self
            .select_edges(&filter)
            .into_iter()
            .filter(|id| match filter.ty {
                Some(ty) => self
                    .edge(*id)
                    .is_some_and(|edge| self.types.is_subtype(edge.ty(), ty)),
                None => true,
            })
            .collect();
        let removed = self.remove_edges(ids);
        debug!(removed, "edges removed by endpoints");
        removed
    }

    fn select_edges(&self, filter: &EdgeFilter) -> Vec<EntityId> {
        let directed = match (filter.from, filter.to) {
            (Some(from), Some(to)) => Some(
                edge_ids(self.outgoing(from))
                    .intersection(&edge_ids(self.incoming(to)))
                    .copied()
                    .collect(),
            ),
            (Some(from), None) => Some(edge_ids(self.outgoing(from))),
            (None, Some(to)) => Some(edge_ids(self.incoming(to))),
            (None, None) => None,
        };
        let either = filter.from_or_to.map(|node| {
            let mut set = edge_ids(self.outgoing(node));
            set.extend(edge_ids(self.incoming(node)));
            set
        });
        match (directed, either) {
            (Some(a), Some(b)) => a.intersection(&b).copied().collect(),
            (Some(set), None) | (None, Some(set)) => set.into_iter().collect(),
            (None, None) => Vec::new(),
        }
    }

    // ─── Moving between graphs ─────────────────────────────────────────

    /// Move `node` out of `source` into this graph, together with every edge
    /// reachable from it and those edges' endpoints. An entity lives in one
    /// graph at a time, so `source` loses the whole component.
    pub fn move_node_from(&mut self, source: &mut Graph, node: Node) -> Result<()> {
        if source.id == self.id {
            return self.add_node(node);
        }
        if !Arc::ptr_eq(&self.types, &source.types) {
            return Err(MotifError::BrokenInvariant(
                "graphs do not share a type registry".to_string(),
            ));
        }
        if !source.contains_node(node.id()) {
            return self.add_node(node);
        }

        let (nodes, edges) = source.component_of(node.id());
        for edge in &edges {
            source.remove_edge(edge.id());
        }
        for moved in &nodes {
            source.remove_node(moved.id());
        }
        debug!(nodes = nodes.len(), edges = edges.len(), "component moved between graphs");

        for moved in nodes {
            self.insert_node(moved);
        }
        for edge in edges {
            self.add_edge(edge)?;
        }
        Ok(())
    }

    /// Move `edge` out of `source`, along with the component it belongs to.
    pub fn move_edge_from(&mut self, source: &mut Graph, edge: Edge) -> Result<()> {
        match source.endpoints(edge.id()) {
            Some((from, _)) if source.id != self.id => self.move_node_from(source, from),
            _ => self.add_edge(edge).map(|_| ()),
        }
    }

    fn component_of(&self, start: EntityId) -> (Vec<Node>, Vec<Edge>) {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut seen_nodes = HashSet::new();
        let mut seen_edges = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen_nodes.insert(id) {
                continue;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            nodes.push(node);
            for edge in self.outgoing(id).chain(self.incoming(id)) {
                if !seen_edges.insert(edge.id()) {
                    continue;
                }
                if let Some((from, to)) = edge.endpoints() {
                    stack.push(from.id());
                    stack.push(to.id());
                }
                edges.push(edge);
            }
        }
        (nodes, edges)
    }

    fn check_unclaimed(&self, id: EntityId) -> Result<()> {
        match Graph::residence(id) {
            Some(owner) if owner != self.id => Err(MotifError::BrokenInvariant(format!(
                "{} is resident in another graph; move it with move_node_from or move_edge_from",
                id
            ))),
            _ => Ok(()),
        }
    }

    fn check_kind(&self, ty: TypeId, expected: EntityKind) -> Result<()> {
        let info = self.types.info(ty)?;
        if info.kind != expected {
            return Err(MotifError::KindMismatch {
                expected,
                found: info.name.clone(),
            });
        }
        Ok(())
    }
}

fn release(id: EntityId, owner: GraphId) {
    let mut table = residency();
    if table.get(&id) == Some(&owner) {
        table.remove(&id);
    }
}

fn edge_ids(edges: impl Iterator<Item = Edge>) -> BTreeSet<EntityId> {
    edges.map(|edge| edge.id()).collect()
}

impl Drop for Graph {
    fn drop(&mut self) {
        let mut table = residency();
        for id in self.node_slots.keys().chain(self.edge_slots.keys()) {
            if table.get(id) == Some(&self.id) {
                table.remove(id);
            }
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct World {
        types: Arc<TypeRegistry>,
        faction: TypeId,
        planet: TypeId,
        allied: TypeId,
        ruled_by: TypeId,
    }

    fn world() -> World {
        let mut types = TypeRegistry::new();
        let faction = types.register_node_type("Faction", None).unwrap();
        let planet = types.register_node_type("Planet", None).unwrap();
        let allied = types.register_edge_type("Allied", None).unwrap();
        let ruled_by = types.register_edge_type("RuledBy", None).unwrap();
        World {
            types: Arc::new(types),
            faction,
            planet,
            allied,
            ruled_by,
        }
    }

    fn ids<T>(iter: impl Iterator<Item = T>, id: impl Fn(&T) -> EntityId) -> Vec<EntityId> {
        iter.map(|item| id(&item)).collect()
    }

    #[test]
    fn test_add_node_registers_ancestor_chain() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f = Node::new(w.faction);
        graph.add_node(f).unwrap();

        assert_eq!(ids(graph.nodes_of_type(w.faction), Node::id), vec![f.id()]);
        assert_eq!(ids(graph.nodes_of_type(TypeId::NODE), Node::id), vec![f.id()]);
        assert_eq!(graph.nodes_of_type(w.planet).count(), 0);
        assert_eq!(graph.count_of_type(w.faction), 1);
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f = Node::new(w.faction);
        graph.add_node(f).unwrap();
        graph.add_node(f).unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.count_of_type(TypeId::NODE), 1);
    }

    #[test]
    fn test_add_node_rejects_edge_type() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let err = graph.add_node(Node::new(w.allied)).unwrap_err();
        assert!(matches!(err, MotifError::KindMismatch { expected: EntityKind::Node, .. }));
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_add_edge_adds_endpoints() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f1 = Node::new(w.faction);
        let f2 = Node::new(w.faction);
        let e = graph.connect(w.allied, f1, f2).unwrap();

        assert!(graph.contains_node(f1.id()));
        assert!(graph.contains_node(f2.id()));
        assert_eq!(graph.endpoints(e.id()), Some((f1, f2)));
        assert_eq!(ids(graph.outgoing(f1.id()), Edge::id), vec![e.id()]);
        assert_eq!(ids(graph.incoming(f2.id()), Edge::id), vec![e.id()]);
        assert_eq!(graph.incoming(f1.id()).count(), 0);
        assert_eq!(ids(graph.edges_of_type(TypeId::EDGE), Edge::id), vec![e.id()]);
    }

    #[test]
    fn test_add_edge_without_endpoints_is_broken_invariant() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let err = graph.add_edge(Edge::detached(w.allied)).unwrap_err();
        assert!(matches!(err, MotifError::BrokenInvariant(_)));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.count_of_type(w.allied), 0);
    }

    #[test]
    fn test_add_edge_is_idempotent() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let e = Edge::new(w.allied, Node::new(w.faction), Node::new(w.faction));
        graph.add_edge(e).unwrap();
        graph.add_edge(e).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.count_of_type(TypeId::EDGE), 1);
    }

    #[test]
    fn test_remove_node_cascades_edges() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f1 = Node::new(w.faction);
        let f2 = Node::new(w.faction);
        let p = Node::new(w.planet);
        graph.connect(w.allied, f1, f2).unwrap();
        graph.connect(w.ruled_by, p, f1).unwrap();

        assert!(graph.remove_node(f1.id()));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.count_of_type(w.allied), 0);
        assert!(!graph.remove_node(f1.id()));
    }

    #[test]
    fn test_remove_edge_keeps_endpoints() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f1 = Node::new(w.faction);
        let f2 = Node::new(w.faction);
        let e = graph.connect(w.allied, f1, f2).unwrap();

        assert!(graph.remove_edge(e.id()));
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.outgoing(f1.id()).count(), 0);
        assert!(!graph.remove_edge(e.id()));
    }

    #[test]
    fn test_remove_by_type() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let f1 = Node::new(w.faction);
        let p = Node::new(w.planet);
        graph.connect(w.ruled_by, p, f1).unwrap();
        graph.connect(w.allied, f1, Node::new(w.faction)).unwrap();

        assert_eq!(graph.remove_edges_by_type(w.ruled_by), 1);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.remove_nodes_by_type(w.faction), 2);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(ids(graph.nodes(), Node::id), vec![p.id()]);
    }

    #[test]
    fn test_remove_edges_by_nodes_shapes() {
        let w = world();
        let mut graph = Graph::new(Arc::clone(&w.types));
        let a = Node::new(w.faction);
        let b = Node::new(w.faction);
        let c = Node::new(w.planet);
        let ab = graph.connect(w.allied, a, b).unwrap();
        let ba = graph.connect(w.allied, b, a).unwrap();
        let ca = graph.connect(w.ruled_by, c, a).unwrap();
        let cb = graph.connect(w.ruled_by, c, b).unwrap();

        let both = EdgeFilter { from: Some(a.id()), to: Some(b.id()), ..Default::default() };
        assert_eq!(graph.remove_edges_by_nodes(both), 1);
        assert!(!graph.contains_edge(ab.id()));

        let typed = EdgeFilter {
            from_or_to: Some(a.id()),
            ty: Some(w.ruled_by),
            ..Default::default()
        };
        assert_eq!(graph.remove_edges_by_nodes(typed), 1);
        assert!(!graph.contains_edge(ca.id()));
        assert!(graph.contains_edge(ba.id()));

        let from_only = EdgeFilter { from: Some(c.id()), ..Default::default() };
        assert_eq!(graph.remove_edges_by_nodes(from_only), 1);
        assert!(!graph.contains_edge(cb.id()));

        let to_only = EdgeFilter { to: Some(a.id()), ..Default::default() };
        assert_eq!(graph.remove_edges_by_nodes(to_only), 1);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.node_count(), 3);

        assert_eq!(graph.remove_edges_by_nodes(EdgeFilter::default()), 0);
    }

    #[test]
    fn test_move_node_takes_component() {
        let w = world();
        let mut staging = Graph::new(Arc::clone(&w.types));
        let mut live = Graph::new(Arc::clone(&w.types));
        let f1 = Node::new(w.faction);
        let f2 = Node::new(w.faction);
        let p = Node::new(w.planet);
        let lonely = Node::new(w.planet);
        let allied = staging.connect(w.allied, f1, f2).unwrap();
        let ruled = staging.connect(w.ruled_by, p, f2).unwrap();
        staging.add_node(lonely).unwrap();

        live.move_node_from(&mut staging, f1).unwrap();

        assert_eq!(live.node_count(), 3);
        assert!(live.contains_edge(allied.id()));
        assert!(live.contains_edge(ruled.id()));
        assert_eq!(staging.node_count(), 1);
        assert_eq!(staging.edge_count(), 0);
        assert!(staging.contains_node(lonely.id()));
    }

    #[test]
    fn test_move_requires_shared_registry() {
        let w = world();
        let mut other = Graph::new(Arc::new(TypeRegistry::new()));
        let mut live = Graph::new(Arc::clone(&w.types));
        let n = Node::new(TypeId::NODE);
        other.add_node(n).unwrap();
        let err = live.move_node_from(&mut other, n).unwrap_err();
        assert!(matches!(err, MotifError::BrokenInvariant(_)));
        assert!(other.contains_node(n.id()));
    }

    #[test]
    fn test_add_rejects_entity_resident_elsewhere() {
        let w = world();
        let mut first = Graph::new(Arc::clone(&w.types));
        let mut second = Graph::new(Arc::clone(&w.types));
        let f = Node::new(w.faction);
        first.add_node(f).unwrap();

        let err = second.add_node(f).unwrap_err();
        assert!(matches!(err, MotifError::BrokenInvariant(_)));
        assert!(first.contains_node(f.id()));
        assert!(!second.contains_node(f.id()));

        // An edge touching it is refused before anything is indexed.
        let stranger = Node::new(w.faction);
        let err = second.connect(w.allied, stranger, f).unwrap_err();
        assert!(matches!(err, MotifError::BrokenInvariant(_)));
        assert_eq!(second.node_count(), 0);
        assert_eq!(second.edge_count(), 0);

        // Once moved, it belongs to the second graph only.
        second.move_node_from(&mut first, f).unwrap();
        assert_eq!(Graph::residence(f.id()), Some(second.id()));
        assert!(!first.contains_node(f.id()));
        assert!(first.add_node(f).is_err());
    }

    #[test]
    fn test_removed_or_dropped_entities_can_be_added_elsewhere() {
        let w = world();
        let mut first = Graph::new(Arc::clone(&w.types));
        let mut second = Graph::new(Arc::clone(&w.types));
        let f = Node::new(w.faction);
        let p = Node::new(w.planet);
        first.add_node(f).unwrap();
        first.add_node(p).unwrap();

        first.remove_node(f.id());
        assert_eq!(Graph::residence(f.id()), None);
        second.add_node(f).unwrap();

        drop(first);
        assert_eq!(Graph::residence(p.id()), None);
        second.add_node(p).unwrap();
        assert_eq!(second.node_count(), 2);
    }

    #[test]
    fn test_move_edge_takes_endpoints() {
        let w = world();
        let mut staging = Graph::new(Arc::clone(&w.types));
        let mut live = Graph::new(Arc::clone(&w.types));
        let e = staging
            .connect(w.allied, Node::new(w.faction), Node::new(w.faction))
            .unwrap();

        live.move_edge_from(&mut staging, e).unwrap();
        assert_eq!(live.edge_count(), 1);
        assert_eq!(live.node_count(), 2);
        assert_eq!(staging.node_count(), 0);
    }
}
