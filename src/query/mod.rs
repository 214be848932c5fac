//! Query module: declarative pattern matching over a graph.
//!
//! A query runs as a pipeline of lazy stages:
//!
//! ```text
//! QueryInput ──parse──▶ SlotGraph ──plan──▶ QueryPlan ──execute──▶ QueryMatch
//!                                                                    │
//!                                   QueryOutput ◀──dedup◀──shape ────┘
//! ```
//!
//! [`CompiledQuery`] keeps the parsed slot graph and runs the rest of the
//! pipeline against any graph sharing its type registry. The reactive
//! wrappers in [`reactive`] keep results current as the graph changes.

pub mod exec;
pub mod item;
pub mod output;
pub mod parser;
pub mod plan;
pub mod reactive;
pub mod slots;

use std::rc::Rc;
use tracing::debug;

use crate::error::Result;
use crate::graph::{Entity, Graph, TypeRegistry};

pub use exec::{Matches, QueryMatch};
pub use item::{Direction, Pattern, QueryInput, QueryItem};
pub use output::{dedup, shape, QueryOutput, Shaped, Unique};
pub use parser::parse;
pub use plan::{plan, IndexScan, QueryPlan, Step, SubqueryPlan};
pub use reactive::{CachedQuery, Observer, QueryOptions, Results};
pub use slots::{OutputShape, Slot, SlotGraph, SlotId, SlotKind};

/// Deduplicated outputs of one run.
pub type Outputs<'a> = Unique<Shaped<'a, Matches<'a>>>;

/// A parsed query, ready to run.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    slots: SlotGraph,
}

impl CompiledQuery {
    pub fn compile(input: &QueryInput, types: &TypeRegistry) -> Result<Self> {
        Ok(Self {
            slots: parse(input, types)?,
        })
    }

    pub fn slots(&self) -> &SlotGraph {
        &self.slots
    }

    /// Plan against the graph's current index sizes.
    pub fn plan(&self, graph: &Graph) -> QueryPlan {
        plan::plan(&self.slots, graph)
    }

    /// Raw matches, duplicates included. A fresh search on every call.
    pub fn matches<'a>(&'a self, graph: &'a Graph) -> Matches<'a> {
        Matches::new(graph, &self.slots, Rc::new(self.plan(graph)))
    }

    /// Shaped, deduplicated results.
    pub fn outputs<'a>(&'a self, graph: &'a Graph) -> Outputs<'a> {
        dedup(shape(self.matches(graph), &self.slots))
    }

    /// False only when adding or removing `entity` cannot change results.
    pub fn is_relevant(&self, entity: &Entity, types: &TypeRegistry) -> bool {
        self.slots.could_bind(entity, types)
    }
}

impl Graph {
    /// Compile `input` and collect its results once.
    pub fn select(&self, input: impl Into<QueryInput>) -> Result<Vec<QueryOutput>> {
        let query = CompiledQuery::compile(&input.into(), self.types())?;
        let outputs: Vec<QueryOutput> = query.outputs(self).collect();
        debug!(results = outputs.len(), "select finished");
        Ok(outputs)
    }
}
