//! Query planning.
//!
//! The slot graph is split into connected components with union-find. Each
//! component gets one seed step over an index, then a depth-first walk along
//! its links: a link to an unvisited slot becomes a `Traverse`, a link back to
//! a visited slot becomes an `EnsureConnection`. Every link is planned once.

use petgraph::unionfind::UnionFind;
use std::fmt::{self, Write as _};
use tracing::debug;

use super::item::Direction;
use super::slots::{LinkId, SlotGraph, SlotId, SlotKind};
use crate::config::StartHeuristic;
use crate::graph::{EntityId, Graph, TypeId};

/// The index a seed step scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexScan {
    /// A single known entity.
    Instance(EntityId),
    /// Nodes of a type and its subtypes.
    Nodes(TypeId),
    /// Edges of a type and its subtypes.
    Edges(TypeId),
    /// Every node and every edge, for slots whose kind was never decided.
    All,
}

impl IndexScan {
    /// Scan for the slot's own constraints.
    pub fn for_slot(slots: &SlotGraph, slot: SlotId) -> Self {
        let slot = slots.slot(slot);
        if let Some(id) = slot.instance {
            return IndexScan::Instance(id);
        }
        match slot.kind {
            SlotKind::Node => IndexScan::Nodes(slot.ty.unwrap_or(TypeId::NODE)),
            SlotKind::Edge => IndexScan::Edges(slot.ty.unwrap_or(TypeId::EDGE)),
            SlotKind::Unknown => IndexScan::All,
        }
    }

    /// Number of candidates the scan would produce before filtering.
    pub fn estimate(&self, graph: &Graph) -> usize {
        match self {
            IndexScan::Instance(id) => usize::from(graph.contains(*id)),
            IndexScan::Nodes(ty) | IndexScan::Edges(ty) => graph.count_of_type(*ty),
            IndexScan::All => graph.node_count() + graph.edge_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Bind `slot` to each candidate of an index.
    IterateIndex { slot: SlotId, scan: IndexScan },
    /// Bind the unvisited `to` from the adjacency of the bound `from`.
    /// `dir` is the node's role on the edge.
    Traverse {
        from: SlotId,
        to: SlotId,
        dir: Direction,
    },
    /// Both slots are bound; check that `node` plays `dir` on `edge`.
    EnsureConnection {
        node: SlotId,
        edge: SlotId,
        dir: Direction,
    },
}

/// Steps for one connected component.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubqueryPlan {
    pub steps: Vec<Step>,
}

impl SubqueryPlan {
    /// Slots this component binds, in binding order.
    pub fn slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.steps.iter().filter_map(|step| match step {
            Step::IterateIndex { slot, .. } => Some(*slot),
            Step::Traverse { to, .. } => Some(*to),
            Step::EnsureConnection { .. } => None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPlan {
    pub subqueries: Vec<SubqueryPlan>,
}

impl QueryPlan {
    pub fn step_count(&self) -> usize {
        self.subqueries.iter().map(|sub| sub.steps.len()).sum()
    }

    /// One line per step, components separated by a header line.
    pub fn describe(&self, slots: &SlotGraph) -> String {
        let mut out = String::new();
        for (i, sub) in self.subqueries.iter().enumerate() {
            let _ = writeln!(out, "component {i}:");
            for step in &sub.steps {
                let _ = writeln!(out, "  {}", StepDisplay { step, slots });
            }
        }
        out
    }
}

struct StepDisplay<'a> {
    step: &'a Step,
    slots: &'a SlotGraph,
}

impl fmt::Display for StepDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |slot: SlotId| self.slots.slot(slot).name.as_str();
        match self.step {
            Step::IterateIndex { slot, scan } => {
                write!(f, "iterate {} over ", name(*slot))?;
                match scan {
                    IndexScan::Instance(id) => write!(f, "instance {id}"),
                    IndexScan::Nodes(ty) => write!(f, "nodes of type {}", ty.raw()),
                    IndexScan::Edges(ty) => write!(f, "edges of type {}", ty.raw()),
                    IndexScan::All => write!(f, "all items"),
                }
            }
            Step::Traverse { from, to, dir } => {
                write!(f, "traverse {} -> {} ({dir:?})", name(*from), name(*to))
            }
            Step::EnsureConnection { node, edge, dir } => {
                write!(f, "ensure {} is {dir:?} of {}", name(*node), name(*edge))
            }
        }
    }
}

/// Plan `slots` against the current state of `graph`.
///
/// The graph is only consulted for index sizes when choosing where each
/// component starts; results never depend on that choice.
pub fn plan(slots: &SlotGraph, graph: &Graph) -> QueryPlan {
    let heuristic = graph.config().query.start;
    let components = components(slots);

    let mut visited = vec![false; slots.len()];
    let mut consumed = vec![false; slots.links().len()];
    let subqueries: Vec<SubqueryPlan> = components
        .iter()
        .map(|members| {
            let start = starting_slot(slots, graph, members, heuristic);
            let mut steps = vec![Step::IterateIndex {
                slot: start,
                scan: IndexScan::for_slot(slots, start),
            }];
            visited[start.index()] = true;
            walk(slots, start, &mut visited, &mut consumed, &mut steps);
            SubqueryPlan { steps }
        })
        .collect();

    let plan = QueryPlan { subqueries };
    debug!(
        components = plan.subqueries.len(),
        steps = plan.step_count(),
        "query planned"
    );
    plan
}

/// Members of each connected component, ordered by their lowest slot.
fn components(slots: &SlotGraph) -> Vec<Vec<SlotId>> {
    let mut sets = UnionFind::<usize>::new(slots.len());
    for link in slots.links() {
        sets.union(link.node.index(), link.edge.index());
    }

    let mut order: Vec<usize> = Vec::new();
    let mut members: Vec<Vec<SlotId>> = Vec::new();
    for (slot, _) in slots.slots() {
        let root = sets.find(slot.index());
        match order.iter().position(|r| *r == root) {
            Some(i) => members[i].push(slot),
            None => {
                order.push(root);
                members.push(vec![slot]);
            }
        }
    }
    members
}

fn starting_slot(
    slots: &SlotGraph,
    graph: &Graph,
    members: &[SlotId],
    heuristic: StartHeuristic,
) -> SlotId {
    let first = members[0];
    match heuristic {
        StartHeuristic::FirstSlot => first,
        StartHeuristic::SmallestIndex => members
            .iter()
            .copied()
            .min_by_key(|slot| (IndexScan::for_slot(slots, *slot).estimate(graph), *slot))
            .unwrap_or(first),
    }
}

fn walk(
    slots: &SlotGraph,
    slot: SlotId,
    visited: &mut [bool],
    consumed: &mut [bool],
    steps: &mut Vec<Step>,
) {
    let links: Vec<LinkId> = slots.links_of(slot).map(|(id, _)| id).collect();
    for id in links {
        if consumed[id.0] {
            continue;
        }
        consumed[id.0] = true;
        let link = *slots.link(id);
        let other = link.other(slot);
        if visited[other.index()] {
            steps.push(Step::EnsureConnection {
                node: link.node,
                edge: link.edge,
                dir: link.dir,
            });
        } else {
            visited[other.index()] = true;
            steps.push(Step::Traverse {
                from: slot,
                to: other,
                dir: link.dir,
            });
            walk(slots, other, visited, consumed, steps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::{Node, TypeRegistry};
    use crate::query::item::{Pattern, QueryInput, QueryItem};
    use crate::query::parser::parse;
    use std::sync::Arc;

    fn registry() -> (Arc<TypeRegistry>, TypeId, TypeId, TypeId, TypeId) {
        let mut types = TypeRegistry::new();
        let a = types.register_node_type("A", None).unwrap();
        let b = types.register_node_type("B", None).unwrap();
        let r1 = types.register_edge_type("R1", None).unwrap();
        let r2 = types.register_edge_type("R2", None).unwrap();
        (Arc::new(types), a, b, r1, r2)
    }

    fn count(plan: &QueryPlan, f: impl Fn(&Step) -> bool) -> usize {
        plan.subqueries
            .iter()
            .flat_map(|sub| sub.steps.iter())
            .filter(|step| f(step))
            .count()
    }

    #[test]
    fn test_disjoint_items_make_components() {
        let (types, a, b, _, _) = registry();
        let graph = Graph::new(types.clone());
        let slots = parse(&QueryInput::list([a, b]), &types).unwrap();
        let plan = plan(&slots, &graph);
        assert_eq!(plan.subqueries.len(), 2);
        assert_eq!(plan.step_count(), 2);
    }

    #[test]
    fn test_empty_input_has_no_components() {
        let (types, ..) = registry();
        let graph = Graph::new(types.clone());
        let slots = parse(&QueryInput::List(Vec::new()), &types).unwrap();
        assert!(plan(&slots, &graph).subqueries.is_empty());
    }

    #[test]
    fn test_cycle_closes_with_one_check() {
        let (types, a, b, r1, r2) = registry();
        let graph = Graph::new(types.clone());
        // x -r1-> y -r2-> x
        let input = QueryInput::list([
            QueryItem::from(
                Pattern::new(a)
                    .named("x")
                    .from(Pattern::new(r1).to(Pattern::new(b).named("y"))),
            ),
            Pattern::new(b)
                .named("y")
                .from(Pattern::new(r2).to("x"))
                .into(),
        ]);
        let slots = parse(&input, &types).unwrap();
        let plan = plan(&slots, &graph);

        assert_eq!(plan.subqueries.len(), 1);
        assert_eq!(count(&plan, |s| matches!(s, Step::EnsureConnection { .. })), 1);
        assert_eq!(count(&plan, |s| matches!(s, Step::Traverse { .. })), 3);
        let extra = slots.links().len() - (slots.len() - 1);
        assert_eq!(plan.step_count(), slots.len() + extra);
    }

    #[test]
    fn test_every_slot_bound_once() {
        let (types, a, b, r1, _) = registry();
        let graph = Graph::new(types.clone());
        let input: QueryInput = Pattern::new(a)
            .from(Pattern::new(r1).to(b))
            .to(Pattern::new(r1).from(b))
            .into();
        let slots = parse(&input, &types).unwrap();
        let plan = plan(&slots, &graph);
        let mut bound: Vec<SlotId> = plan.subqueries[0].slots().collect();
        bound.sort();
        assert_eq!(bound, slots.slots().map(|(id, _)| id).collect::<Vec<_>>());
    }

    #[test]
    fn test_starts_from_smallest_index() {
        let (types, a, b, r1, _) = registry();
        let mut graph = Graph::new(types.clone());
        for _ in 0..5 {
            graph.add_node(Node::new(a)).unwrap();
        }
        graph.add_node(Node::new(b)).unwrap();

        let input: QueryInput = Pattern::new(a).from(Pattern::new(r1).to(b)).into();
        let slots = parse(&input, &types).unwrap();
        let plan = plan(&slots, &graph);
        // R1 has no edges at all, so it is the cheapest seed.
        assert_eq!(
            plan.subqueries[0].steps[0],
            Step::IterateIndex {
                slot: SlotId(1),
                scan: IndexScan::Edges(r1)
            }
        );
    }

    #[test]
    fn test_first_slot_heuristic() {
        let (types, a, b, r1, _) = registry();
        let mut config = Config::default();
        config.query.start = StartHeuristic::FirstSlot;
        let graph = Graph::with_config(types.clone(), config);

        let input: QueryInput = Pattern::new(a).from(Pattern::new(r1).to(b)).into();
        let slots = parse(&input, &types).unwrap();
        let plan = plan(&slots, &graph);
        assert!(matches!(
            plan.subqueries[0].steps[0],
            Step::IterateIndex { slot: SlotId(0), scan: IndexScan::Nodes(ty) } if ty == a
        ));
    }

    #[test]
    fn test_describe() {
        let (types, a, ..) = registry();
        let graph = Graph::new(types.clone());
        let slots = parse(&Pattern::new(a).named("x").into(), &types).unwrap();
        let text = plan(&slots, &graph).describe(&slots);
        assert!(text.starts_with("component 0:"));
        assert!(text.contains("iterate x over nodes of type"));
    }
}
