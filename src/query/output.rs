//! Output shaping and deduplication.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::exec::QueryMatch;
use super::slots::{OutputKey, OutputShape, SlotGraph};
use crate::graph::{Entity, EntityId};

/// One result, in the shape of the query input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum QueryOutput {
    Single(Entity),
    List(Vec<Entity>),
    Map(BTreeMap<String, Entity>),
}

impl QueryOutput {
    /// Constituent ids in output order. Two outputs are the same result
    /// exactly when their identities are equal.
    pub fn identity(&self) -> Vec<EntityId> {
        match self {
            QueryOutput::Single(entity) => vec![entity.id()],
            QueryOutput::List(entities) => entities.iter().map(Entity::id).collect(),
            QueryOutput::Map(entries) => entries.values().map(Entity::id).collect(),
        }
    }

    pub fn as_single(&self) -> Option<&Entity> {
        match self {
            QueryOutput::Single(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Entity]> {
        match self {
            QueryOutput::List(entities) => Some(entities),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Entity> {
        match self {
            QueryOutput::Map(entries) => entries.get(key),
            _ => None,
        }
    }
}

/// Build the output for one match. `None` if a requested position was left
/// unbound.
pub fn shape_match(m: &QueryMatch, slots: &SlotGraph) -> Option<QueryOutput> {
    match slots.shape() {
        OutputShape::Single(slot) => m.get(*slot).copied().map(QueryOutput::Single),
        OutputShape::List(len) => {
            let mut items: Vec<Option<Entity>> = vec![None; *len];
            for (slot, _) in slots.slots() {
                for key in slots.positions(slot) {
                    if let OutputKey::Index(i) = key {
                        items[*i] = m.get(slot).copied();
                    }
                }
            }
            items.into_iter().collect::<Option<Vec<_>>>().map(QueryOutput::List)
        }
        OutputShape::Map(keys) => {
            let mut entries = BTreeMap::new();
            for (slot, _) in slots.slots() {
                for key in slots.positions(slot) {
                    if let (OutputKey::Key(k), Some(entity)) = (key, m.get(slot)) {
                        entries.insert(k.clone(), *entity);
                    }
                }
            }
            (entries.len() == keys.len()).then_some(QueryOutput::Map(entries))
        }
    }
}

/// Lazily shapes matches into outputs.
pub struct Shaped<'a, I> {
    matches: I,
    slots: &'a SlotGraph,
}

pub fn shape<I>(matches: I, slots: &SlotGraph) -> Shaped<'_, I>
where
    I: Iterator<Item = QueryMatch>,
{
    Shaped { matches, slots }
}

impl<I> Iterator for Shaped<'_, I>
where
    I: Iterator<Item = QueryMatch>,
{
    type Item = QueryOutput;

    fn next(&mut self) -> Option<QueryOutput> {
        let slots = self.slots;
        self.matches.find_map(|m| shape_match(&m, slots))
    }
}

/// Drops outputs whose identity was already emitted, keeping first-seen
/// order.
pub struct Unique<I> {
    outputs: I,
    seen: HashSet<Vec<EntityId>>,
}

pub fn dedup<I>(outputs: I) -> Unique<I>
where
    I: Iterator<Item = QueryOutput>,
{
    Unique {
        outputs,
        seen: HashSet::new(),
    }
}

impl<I> Iterator for Unique<I>
where
    I: Iterator<Item = QueryOutput>,
{
    type Item = QueryOutput;

    fn next(&mut self) -> Option<QueryOutput> {
        let seen = &mut self.seen;
        self.outputs.find(|output| seen.insert(output.identity()))
    }
}
