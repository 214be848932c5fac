//! # Motif
//!
//! An embeddable typed graph store with a declarative pattern-matching
//! query engine.
//!
//! Callers describe a shape (typed nodes and directed edges, with named
//! cross-references) and the engine returns every way the live graph
//! satisfies it. Reactive handles keep results current, or report
//! incremental add/remove diffs, as the graph mutates.
//!
//! ## Key Features
//!
//! - **Typed**: closed-world type hierarchy, every entity indexed under its
//!   full ancestor chain
//! - **Declarative**: patterns with names, exclusions and directional links
//! - **Lazy**: results are pulled one at a time and may be abandoned early
//! - **Reactive**: cached queries and observers driven by store notifications
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motif::{Graph, Node, Pattern, TypeRegistry};
//! use std::sync::Arc;
//!
//! let mut types = TypeRegistry::new();
//! let ship = types.register_node_type("Spaceship", None)?;
//! let planet = types.register_node_type("Planet", None)?;
//! let docked = types.register_edge_type("Docked", None)?;
//!
//! let mut graph = Graph::new(Arc::new(types));
//! graph.connect(docked, Node::new(ship), Node::new(planet))?;
//!
//! // Every ship docked at some planet
//! let ships = graph.select(Pattern::new(ship).from(Pattern::new(docked).to(planet)))?;
//! assert_eq!(ships.len(), 1);
//! # Ok::<(), motif::MotifError>(())
//! ```

pub mod config;
pub mod error;
pub mod fixture;
pub mod graph;
pub mod query;

// Re-exports for convenience
pub use config::{Config, QueryConfig, StartHeuristic};
pub use error::{MotifError, Result};

// Graph re-exports
pub use graph::{
    Edge, EdgeFilter, Entity, EntityId, EntityKind, Graph, GraphEvent, GraphId, ListenerId, Node,
    TypeId, TypeRegistry,
};
pub use query::{
    CachedQuery, CompiledQuery, Direction, Observer, Pattern, QueryInput, QueryItem, QueryMatch,
    QueryOptions, QueryOutput, QueryPlan,
};
