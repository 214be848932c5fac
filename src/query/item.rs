//! Declarative query input.
//!
//! A query is a shape: typed items, optionally named so that several
//! occurrences refer to the same variable, related to each other through
//! directional sub-items. Nothing here knows about graphs; the parser turns
//! these values into a slot graph.

use serde::{Deserialize, Serialize};

use crate::graph::{Edge, Node, TypeId};

/// The role a node plays relative to a directed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    From,
    To,
    FromOrTo,
}

impl Direction {
    /// `From` and `To` swap; `FromOrTo` stays.
    pub fn opposite(self) -> Self {
        match self {
            Direction::From => Direction::To,
            Direction::To => Direction::From,
            Direction::FromOrTo => Direction::FromOrTo,
        }
    }

    pub fn is_fixed(self) -> bool {
        self != Direction::FromOrTo
    }
}

/// One element of a query input.
#[derive(Debug, Clone)]
pub enum QueryItem {
    /// Every entity of a type (or subtype).
    Type(TypeId),
    /// Exactly this node.
    Node(Node),
    /// Exactly this edge.
    Edge(Edge),
    /// A named variable defined elsewhere in the query.
    Ref(String),
    /// A type with a name, exclusions or related sub-items.
    Pattern(Box<Pattern>),
}

impl QueryItem {
    pub fn reference(name: impl Into<String>) -> Self {
        QueryItem::Ref(name.into())
    }
}

impl From<TypeId> for QueryItem {
    fn from(ty: TypeId) -> Self {
        QueryItem::Type(ty)
    }
}

impl From<Node> for QueryItem {
    fn from(node: Node) -> Self {
        QueryItem::Node(node)
    }
}

impl From<Edge> for QueryItem {
    fn from(edge: Edge) -> Self {
        QueryItem::Edge(edge)
    }
}

impl From<Pattern> for QueryItem {
    fn from(pattern: Pattern) -> Self {
        QueryItem::Pattern(Box::new(pattern))
    }
}

impl From<&str> for QueryItem {
    fn from(name: &str) -> Self {
        QueryItem::Ref(name.to_string())
    }
}

/// A typed query item with optional constraints.
///
/// On a node pattern the related items must be edge-like; on an edge
/// pattern they must be node-like. The direction always names the node's
/// role on the edge, so `node.to(edge)` and `edge.to(node)` both mean the
/// node is the edge's target.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub ty: TypeId,
    pub name: Option<String>,
    pub excluded: Vec<TypeId>,
    pub related: Vec<(Direction, QueryItem)>,
}

impl Pattern {
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            name: None,
            excluded: Vec::new(),
            related: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Reject entities of `ty` or any of its subtypes.
    pub fn excluding(mut self, ty: TypeId) -> Self {
        self.excluded.push(ty);
        self
    }

    /// Related in either role. Same as [`Pattern::from_or_to`].
    pub fn with(self, item: impl Into<QueryItem>) -> Self {
        self.related(Direction::FromOrTo, item)
    }

    pub fn to(self, item: impl Into<QueryItem>) -> Self {
        self.related(Direction::To, item)
    }

    pub fn from(self, item: impl Into<QueryItem>) -> Self {
        self.related(Direction::From, item)
    }

    pub fn from_or_to(self, item: impl Into<QueryItem>) -> Self {
        self.related(Direction::FromOrTo, item)
    }

    pub fn related(mut self, dir: Direction, item: impl Into<QueryItem>) -> Self {
        self.related.push((dir, item.into()));
        self
    }
}

/// A whole query: one item, an ordered list, or named items.
///
/// The variant also fixes the shape of every output.
#[derive(Debug, Clone)]
pub enum QueryInput {
    Single(QueryItem),
    List(Vec<QueryItem>),
    Map(Vec<(String, QueryItem)>),
}

impl QueryInput {
    pub fn list<I: Into<QueryItem>>(items: impl IntoIterator<Item = I>) -> Self {
        QueryInput::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<K: Into<String>, I: Into<QueryItem>>(
        entries: impl IntoIterator<Item = (K, I)>,
    ) -> Self {
        QueryInput::Map(
            entries
                .into_iter()
                .map(|(key, item)| (key.into(), item.into()))
                .collect(),
        )
    }
}

impl From<QueryItem> for QueryInput {
    fn from(item: QueryItem) -> Self {
        QueryInput::Single(item)
    }
}

impl From<Pattern> for QueryInput {
    fn from(pattern: Pattern) -> Self {
        QueryInput::Single(pattern.into())
    }
}

impl From<TypeId> for QueryInput {
    fn from(ty: TypeId) -> Self {
        QueryInput::Single(ty.into())
    }
}

impl From<Node> for QueryInput {
    fn from(node: Node) -> Self {
        QueryInput::Single(node.into())
    }
}

impl From<Vec<QueryItem>> for QueryInput {
    fn from(items: Vec<QueryItem>) -> Self {
        QueryInput::List(items)
    }
}
