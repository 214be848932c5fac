//! Graph module: typed nodes and directed edges with multi-type indices.

pub mod events;
pub mod store;
pub mod types;

pub use events::{GraphEvent, ListenerId};
pub use store::{EdgeFilter, Graph, GraphId};
pub use types::{Edge, Entity, EntityId, EntityKind, Node, TypeId, TypeInfo, TypeRegistry};
