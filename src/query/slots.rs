//! Slot graph: the compiled form of a query input.
//!
//! Each slot is one query variable. Links join a node slot to an edge slot
//! and carry the node's role on that edge. A slot graph is built by the
//! parser and read-only afterwards.

use std::collections::HashMap;
use std::fmt;

use super::item::Direction;
use crate::graph::{Entity, EntityId, EntityKind, TypeId, TypeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub(crate) usize);

/// What a slot can bind to. `Unknown` slots come from references that are
/// never used in a position that decides between node and edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Node,
    Edge,
    Unknown,
}

impl SlotKind {
    pub fn accepts(self, kind: EntityKind) -> bool {
        matches!(
            (self, kind),
            (SlotKind::Unknown, _)
                | (SlotKind::Node, EntityKind::Node)
                | (SlotKind::Edge, EntityKind::Edge)
        )
    }
}

impl From<EntityKind> for SlotKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Node => SlotKind::Node,
            EntityKind::Edge => SlotKind::Edge,
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKind::Node => write!(f, "node"),
            SlotKind::Edge => write!(f, "edge"),
            SlotKind::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub name: String,
    pub kind: SlotKind,
    pub ty: Option<TypeId>,
    pub instance: Option<EntityId>,
    pub excluded: Vec<TypeId>,
    pub(crate) links: Vec<LinkId>,
}

impl Slot {
    pub(crate) fn new(name: String, kind: SlotKind) -> Self {
        Self {
            name,
            kind,
            ty: None,
            instance: None,
            excluded: Vec::new(),
            links: Vec::new(),
        }
    }

    /// Constraints that involve this slot alone: kind, exact instance,
    /// required type and excluded types.
    pub fn accepts(&self, entity: &Entity, types: &TypeRegistry) -> bool {
        if !self.kind.accepts(entity.kind()) {
            return false;
        }
        if self.instance.is_some_and(|id| id != entity.id()) {
            return false;
        }
        if self.ty.is_some_and(|ty| !types.is_subtype(entity.ty(), ty)) {
            return false;
        }
        !self
            .excluded
            .iter()
            .any(|excluded| types.is_subtype(entity.ty(), *excluded))
    }

    /// True when nothing but the kind restricts what the slot binds.
    pub fn is_unconstrained(&self) -> bool {
        self.kind == SlotKind::Unknown || (self.ty.is_none() && self.instance.is_none())
    }
}

/// A node slot's role on an edge slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub node: SlotId,
    pub edge: SlotId,
    pub dir: Direction,
}

impl Link {
    /// The slot at the other end from `slot`.
    pub fn other(&self, slot: SlotId) -> SlotId {
        if slot == self.node {
            self.edge
        } else {
            self.node
        }
    }
}

/// Where a slot's binding goes in each output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutputKey {
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputShape {
    Single(SlotId),
    List(usize),
    Map(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SlotGraph {
    pub(crate) slots: Vec<Slot>,
    pub(crate) links: Vec<Link>,
    pub(crate) names: HashMap<String, SlotId>,
    pub(crate) shape: OutputShape,
    pub(crate) positions: Vec<Vec<OutputKey>>,
}

impl SlotGraph {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &Slot)> {
        self.slots.iter().enumerate().map(|(i, slot)| (SlotId(i), slot))
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Links touching `slot`, in the order they were declared.
    pub fn links_of(&self, slot: SlotId) -> impl Iterator<Item = (LinkId, &Link)> {
        self.slots[slot.0]
            .links
            .iter()
            .map(move |id| (*id, &self.links[id.0]))
    }

    /// Slots linked to `slot` with the given direction.
    pub fn linked(&self, slot: SlotId, dir: Direction) -> impl Iterator<Item = SlotId> + '_ {
        self.links_of(slot)
            .filter(move |(_, link)| link.dir == dir)
            .map(move |(_, link)| link.other(slot))
    }

    /// Slot declared under an explicit name.
    pub fn lookup(&self, name: &str) -> Option<SlotId> {
        self.names.get(name).copied()
    }

    pub fn shape(&self) -> &OutputShape {
        &self.shape
    }

    pub fn positions(&self, slot: SlotId) -> &[OutputKey] {
        &self.positions[slot.0]
    }

    pub fn accepts(&self, slot: SlotId, entity: &Entity, types: &TypeRegistry) -> bool {
        self.slot(slot).accepts(entity, types)
    }

    /// Whether `entity` could bind to any slot. Adding or removing an entity
    /// that fails this check cannot change the query's results.
    pub fn could_bind(&self, entity: &Entity, types: &TypeRegistry) -> bool {
        self.slots.iter().any(|slot| {
            slot.is_unconstrained() || slot.accepts(entity, types)
        })
    }
}
