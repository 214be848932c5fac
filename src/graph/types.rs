//! Type registry and entity handles.
//!
//! Types form a closed world built up front: two roots (`Node`, `Edge`) and
//! any number of registered subtypes. Every type stores its full ancestor
//! chain, so subtype checks and index registration never walk parents.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{MotifError, Result};

// ─── Type identities ───────────────────────────────────────────────

/// Compact type handle, an index into a [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// Root of every node type.
    pub const NODE: TypeId = TypeId(0);
    /// Root of every edge type.
    pub const EDGE: TypeId = TypeId(1);

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Whether a type (or an entity) is a node or an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Edge,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Node => write!(f, "node"),
            EntityKind::Edge => write!(f, "edge"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub kind: EntityKind,
    pub parent: Option<TypeId>,
    /// Self first, root last.
    ancestors: Vec<TypeId>,
}

impl TypeInfo {
    pub fn ancestors(&self) -> &[TypeId] {
        &self.ancestors
    }
}

/// Closed-world type hierarchy shared by graphs and queries.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    types: Vec<TypeInfo>,
    by_name: HashMap<String, TypeId>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        registry.push("Node", EntityKind::Node, None);
        registry.push("Edge", EntityKind::Edge, None);
        registry
    }

    /// Register a node type. `parent` defaults to the `Node` root.
    pub fn register_node_type(&mut self, name: &str, parent: Option<TypeId>) -> Result<TypeId> {
        self.register(name, EntityKind::Node, parent.unwrap_or(TypeId::NODE))
    }

    /// Register an edge type. `parent` defaults to the `Edge` root.
    pub fn register_edge_type(&mut self, name: &str, parent: Option<TypeId>) -> Result<TypeId> {
        self.register(name, EntityKind::Edge, parent.unwrap_or(TypeId::EDGE))
    }

    fn register(&mut self, name: &str, kind: EntityKind, parent: TypeId) -> Result<TypeId> {
        if self.by_name.contains_key(name) {
            return Err(MotifError::DuplicateType(name.to_string()));
        }
        let parent_info = self.info(parent)?;
        if parent_info.kind != kind {
            return Err(MotifError::KindMismatch {
                expected: kind,
                found: parent_info.name.clone(),
            });
        }
        Ok(self.push(name, kind, Some(parent)))
    }

    fn push(&mut self, name: &str, kind: EntityKind, parent: Option<TypeId>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        let mut ancestors = vec![id];
        if let Some(parent) = parent {
            ancestors.extend_from_slice(&self.types[parent.0 as usize].ancestors);
        }
        self.types.push(TypeInfo {
            name: name.to_string(),
            kind,
            parent,
            ancestors,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, ty: TypeId) -> Option<&TypeInfo> {
        self.types.get(ty.0 as usize)
    }

    pub fn info(&self, ty: TypeId) -> Result<&TypeInfo> {
        self.get(ty).ok_or(MotifError::UnknownType(ty.0))
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn kind_of(&self, ty: TypeId) -> Result<EntityKind> {
        self.info(ty).map(|info| info.kind)
    }

    pub fn name(&self, ty: TypeId) -> &str {
        self.get(ty).map(|info| info.name.as_str()).unwrap_or("?")
    }

    /// Ancestor chain of `ty`, itself included. Empty for unknown types.
    pub fn ancestors(&self, ty: TypeId) -> &[TypeId] {
        self.get(ty).map(|info| info.ancestors()).unwrap_or(&[])
    }

    /// True if `ty` is `ancestor` or one of its subtypes.
    pub fn is_subtype(&self, ty: TypeId, ancestor: TypeId) -> bool {
        self.ancestors(ty).contains(&ancestor)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeInfo)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, info)| (TypeId(i as u32), info))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Entity handles ────────────────────────────────────────────────

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a node or an edge. Unique across both kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    fn fresh() -> Self {
        EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node handle. Created detached; becomes resident through `Graph::add_node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Node {
    id: EntityId,
    ty: TypeId,
}

impl Node {
    pub fn new(ty: TypeId) -> Self {
        Self {
            id: EntityId::fresh(),
            ty,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }
}

/// A directed edge handle. Equality and hashing use the identity only, so a
/// detached copy and the resident copy of the same edge compare equal.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Edge {
    id: EntityId,
    ty: TypeId,
    from: Option<Node>,
    to: Option<Node>,
}

impl Edge {
    pub fn new(ty: TypeId, from: Node, to: Node) -> Self {
        Self {
            id: EntityId::fresh(),
            ty,
            from: Some(from),
            to: Some(to),
        }
    }

    /// An edge without endpoints. It cannot be added to a graph until
    /// [`Edge::with_endpoints`] sets them.
    pub fn detached(ty: TypeId) -> Self {
        Self {
            id: EntityId::fresh(),
            ty,
            from: None,
            to: None,
        }
    }

    pub fn with_endpoints(mut self, from: Node, to: Node) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn from(&self) -> Option<Node> {
        self.from
    }

    pub fn to(&self) -> Option<Node> {
        self.to
    }

    pub fn endpoints(&self) -> Option<(Node, Node)> {
        self.from.zip(self.to)
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Either kind of graph item, as bound by queries and reported by events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Entity {
    Node(Node),
    Edge(Edge),
}

impl Entity {
    pub fn id(&self) -> EntityId {
        match self {
            Entity::Node(n) => n.id(),
            Entity::Edge(e) => e.id(),
        }
    }

    pub fn ty(&self) -> TypeId {
        match self {
            Entity::Node(n) => n.ty(),
            Entity::Edge(e) => e.ty(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Node(_) => EntityKind::Node,
            Entity::Edge(_) => EntityKind::Edge,
        }
    }

    pub fn as_node(&self) -> Option<Node> {
        match self {
            Entity::Node(n) => Some(*n),
            Entity::Edge(_) => None,
        }
    }

    pub fn as_edge(&self) -> Option<Edge> {
        match self {
            Entity::Edge(e) => Some(*e),
            Entity::Node(_) => None,
        }
    }
}

impl From<Node> for Entity {
    fn from(node: Node) -> Self {
        Entity::Node(node)
    }
}

impl From<Edge> for Entity {
    fn from(edge: Edge) -> Self {
        Entity::Edge(edge)
    }
}
