//! Plan execution.
//!
//! Each component runs as a backtracking search with an explicit stack of
//! frames, one frame per step. A frame holds the remaining candidates for
//! its step and the candidate currently applied. Components are combined by
//! cartesian product.
//!
//! Undirected links lock the role the first bound node took on an edge; a
//! second undirected link on the same edge must take the opposite role, so
//! one edge is never matched against the same endpoint twice.

use std::collections::HashMap;
use std::rc::Rc;

use super::item::Direction;
use super::plan::{IndexScan, QueryPlan, Step};
use super::slots::{SlotGraph, SlotId};
use crate::graph::{Edge, Entity, EntityId, Graph, Node};

/// One complete binding of every slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatch {
    bindings: Vec<Option<Entity>>,
}

impl QueryMatch {
    pub fn get(&self, slot: SlotId) -> Option<&Entity> {
        self.bindings.get(slot.index()).and_then(Option::as_ref)
    }

    pub fn by_name(&self, slots: &SlotGraph, name: &str) -> Option<&Entity> {
        slots.lookup(name).and_then(|slot| self.get(slot))
    }

    /// `(name, entity)` for every bound slot, anonymous ones included.
    pub fn named<'a>(
        &'a self,
        slots: &'a SlotGraph,
    ) -> impl Iterator<Item = (&'a str, &'a Entity)> {
        slots
            .slots()
            .filter_map(move |(id, slot)| self.get(id).map(|e| (slot.name.as_str(), e)))
    }

    pub fn len(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What applying a candidate changes: a slot binding, a lock, or both.
#[derive(Debug, Clone, Copy)]
struct Choice {
    bind: Option<(SlotId, Entity)>,
    lock: Option<(EntityId, Direction)>,
}

impl Choice {
    fn bind(slot: SlotId, entity: Entity) -> Self {
        Self {
            bind: Some((slot, entity)),
            lock: None,
        }
    }
}

struct Frame<'a> {
    choices: Box<dyn Iterator<Item = Choice> + 'a>,
    applied: Option<Choice>,
}

#[derive(Default)]
struct State {
    bindings: Vec<Option<Entity>>,
    /// Edge id → role of the node that first bound it through an
    /// undirected link.
    locks: HashMap<EntityId, Direction>,
}

impl State {
    fn apply(&mut self, choice: &Choice) {
        if let Some((slot, entity)) = choice.bind {
            self.bindings[slot.index()] = Some(entity);
        }
        if let Some((edge, dir)) = choice.lock {
            self.locks.insert(edge, dir);
        }
    }

    fn retract(&mut self, choice: &Choice) {
        if let Some((slot, _)) = choice.bind {
            self.bindings[slot.index()] = None;
        }
        if let Some((edge, _)) = choice.lock {
            self.locks.remove(&edge);
        }
    }

    fn node(&self, slot: SlotId) -> Option<Node> {
        self.bindings[slot.index()].and_then(|e| e.as_node())
    }

    fn edge(&self, slot: SlotId) -> Option<Edge> {
        self.bindings[slot.index()].and_then(|e| e.as_edge())
    }

    /// Choices for `node` taking `role` on `edge` through a link of `dir`.
    fn role_choice(
        &self,
        edge: EntityId,
        role: Direction,
        dir: Direction,
        bind: Option<(SlotId, Entity)>,
    ) -> Option<Choice> {
        if dir.is_fixed() {
            return (role == dir).then_some(Choice { bind, lock: None });
        }
        match self.locks.get(&edge) {
            Some(locked) => (role == locked.opposite()).then_some(Choice { bind, lock: None }),
            None => Some(Choice {
                bind,
                lock: Some((edge, role)),
            }),
        }
    }
}

/// Matches of one component. Bindings outside the component stay unset.
pub struct SubqueryMatches<'a> {
    graph: &'a Graph,
    slots: &'a SlotGraph,
    plan: Rc<QueryPlan>,
    component: usize,
    stack: Vec<Frame<'a>>,
    state: State,
    started: bool,
}

impl<'a> SubqueryMatches<'a> {
    pub fn new(
        graph: &'a Graph,
        slots: &'a SlotGraph,
        plan: Rc<QueryPlan>,
        component: usize,
    ) -> Self {
        Self {
            graph,
            slots,
            plan,
            component,
            stack: Vec::new(),
            state: State {
                bindings: vec![None; slots.len()],
                locks: HashMap::new(),
            },
            started: false,
        }
    }

    fn steps(&self) -> &[Step] {
        &self.plan.subqueries[self.component].steps
    }

    fn open(&self, step: Step) -> Frame<'a> {
        let choices: Box<dyn Iterator<Item = Choice> + 'a> = match step {
            Step::IterateIndex { slot, scan } => self.scan(slot, scan),
            Step::Traverse { from, to, dir } => Box::new(self.traverse(from, to, dir).into_iter()),
            Step::EnsureConnection { node, edge, dir } => {
                Box::new(self.ensure(node, edge, dir).into_iter())
            }
        };
        Frame {
            choices,
            applied: None,
        }
    }

    fn scan(&self, slot: SlotId, scan: IndexScan) -> Box<dyn Iterator<Item = Choice> + 'a> {
        let graph = self.graph;
        let slots = self.slots;
        let candidates: Box<dyn Iterator<Item = Entity> + 'a> = match scan {
            IndexScan::Instance(id) => Box::new(graph.entity(id).into_iter()),
            IndexScan::Nodes(ty) => Box::new(graph.nodes_of_type(ty).map(Entity::from)),
            IndexScan::Edges(ty) => Box::new(graph.edges_of_type(ty).map(Entity::from)),
            IndexScan::All => Box::new(
                graph
                    .nodes()
                    .map(Entity::from)
                    .chain(graph.edges().map(Entity::from)),
            ),
        };
        Box::new(
            candidates
                .filter(move |entity| slots.accepts(slot, entity, graph.types()))
                .map(move |entity| Choice::bind(slot, entity)),
        )
    }

    fn traverse(&self, from: SlotId, to: SlotId, dir: Direction) -> Vec<Choice> {
        let types = self.graph.types();
        let target = self.slots.slot(to);

        if let Some(node) = self.state.node(from) {
            let outgoing = self.graph.outgoing(node.id()).map(|e| (e, Direction::From));
            let incoming = self.graph.incoming(node.id()).map(|e| (e, Direction::To));
            return outgoing
                .chain(incoming)
                .filter(|(edge, _)| target.accepts(&Entity::Edge(*edge), types))
                .filter_map(|(edge, role)| {
                    let bind = Some((to, Entity::Edge(edge)));
                    self.state.role_choice(edge.id(), role, dir, bind)
                })
                .collect();
        }

        if let Some(edge) = self.state.edge(from) {
            let Some((source, sink)) = edge.endpoints() else {
                return Vec::new();
            };
            return [(source, Direction::From), (sink, Direction::To)]
                .into_iter()
                .filter(|(node, _)| target.accepts(&Entity::Node(*node), types))
                .filter_map(|(node, role)| {
                    let bind = Some((to, Entity::Node(node)));
                    self.state.role_choice(edge.id(), role, dir, bind)
                })
                .collect();
        }

        Vec::new()
    }

    fn ensure(&self, node: SlotId, edge: SlotId, dir: Direction) -> Vec<Choice> {
        let (Some(node), Some(edge)) = (self.state.node(node), self.state.edge(edge)) else {
            return Vec::new();
        };
        let mut choices = Vec::new();
        if edge.from() == Some(node) {
            choices.extend(self.state.role_choice(edge.id(), Direction::From, dir, None));
        }
        if edge.to() == Some(node) {
            choices.extend(self.state.role_choice(edge.id(), Direction::To, dir, None));
        }
        choices
    }

    fn snapshot(&self) -> Vec<(SlotId, Entity)> {
        self.state
            .bindings
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.map(|e| (SlotId(i), e)))
            .collect()
    }
}

impl Iterator for SubqueryMatches<'_> {
    /// The bindings this component contributes to a match.
    type Item = Vec<(SlotId, Entity)>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.started {
            self.started = true;
            let first = *self.steps().first()?;
            let frame = self.open(first);
            self.stack.push(frame);
        }

        loop {
            let mut frame = self.stack.pop()?;
            if let Some(previous) = frame.applied.take() {
                self.state.retract(&previous);
            }
            let Some(choice) = frame.choices.next() else {
                continue;
            };
            self.state.apply(&choice);
            frame.applied = Some(choice);
            self.stack.push(frame);

            let depth = self.stack.len();
            match self.steps().get(depth).copied() {
                None => return Some(self.snapshot()),
                Some(step) => {
                    let frame = self.open(step);
                    self.stack.push(frame);
                }
            }
        }
    }
}

/// Every match of a plan: the cartesian product of its components.
///
/// The first component is streamed; the others are collected the first
/// time they are needed and replayed for every match of the first.
pub struct Matches<'a> {
    slots: &'a SlotGraph,
    head: Option<SubqueryMatches<'a>>,
    tail: Option<Vec<Vec<Vec<(SlotId, Entity)>>>>,
    pending: Vec<SubqueryMatches<'a>>,
    current: Option<Vec<(SlotId, Entity)>>,
    odometer: Vec<usize>,
    done: bool,
}

impl<'a> Matches<'a> {
    pub fn new(graph: &'a Graph, slots: &'a SlotGraph, plan: Rc<QueryPlan>) -> Self {
        let mut subs: Vec<SubqueryMatches<'a>> = (0..plan.subqueries.len())
            .map(|i| SubqueryMatches::new(graph, slots, Rc::clone(&plan), i))
            .collect();
        let head = if subs.is_empty() {
            None
        } else {
            Some(subs.remove(0))
        };
        Self {
            slots,
            head,
            tail: None,
            pending: subs,
            current: None,
            odometer: Vec::new(),
            done: false,
        }
    }

    fn tail(&mut self) -> &[Vec<Vec<(SlotId, Entity)>>] {
        let pending = &mut self.pending;
        self.tail
            .get_or_insert_with(|| pending.drain(..).map(|sub| sub.collect()).collect())
    }

    fn assemble(
        &self,
        head: &[(SlotId, Entity)],
        tail: &[Vec<Vec<(SlotId, Entity)>>],
    ) -> QueryMatch {
        let mut bindings = vec![None; self.slots.len()];
        let parts = tail
            .iter()
            .zip(&self.odometer)
            .map(|(matches, i)| &matches[*i]);
        for part in std::iter::once(head).chain(parts.map(Vec::as_slice)) {
            for (slot, entity) in part {
                bindings[slot.index()] = Some(*entity);
            }
        }
        QueryMatch { bindings }
    }

    /// Advance the odometer over the tail; false when it wraps around.
    fn advance(&mut self) -> bool {
        let Some(tail) = &self.tail else {
            return false;
        };
        for (digit, matches) in self.odometer.iter_mut().zip(tail).rev() {
            *digit += 1;
            if *digit < matches.len() {
                return true;
            }
            *digit = 0;
        }
        false
    }
}

impl Iterator for Matches<'_> {
    type Item = QueryMatch;

    fn next(&mut self) -> Option<QueryMatch> {
        if self.done {
            return None;
        }
        if self.head.is_none() {
            // No components: the empty input has exactly one, empty, match.
            self.done = true;
            return Some(QueryMatch {
                bindings: vec![None; self.slots.len()],
            });
        }

        loop {
            if let Some(head) = self.current.take() {
                let tail = self.tail.take().unwrap_or_default();
                let assembled = self.assemble(&head, &tail);
                self.tail = Some(tail);
                if self.advance() {
                    self.current = Some(head);
                }
                return Some(assembled);
            }

            let next = self.head.as_mut().and_then(Iterator::next);
            let Some(head) = next else {
                self.done = true;
                return None;
            };
            if self.tail().iter().any(Vec::is_empty) {
                self.done = true;
                return None;
            }
            self.odometer = vec![0; self.tail().len()];
            self.current = Some(head);
        }
    }
}
