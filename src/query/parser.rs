//! Query input → slot graph.
//!
//! Walks the input recursively, allocating one slot per distinct name and
//! one anonymous slot per unnamed occurrence, and wires a link for every
//! directional sub-item. A trailing pass settles edge slots whose endpoint
//! roles were only partly given.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use super::item::{Direction, Pattern, QueryInput, QueryItem};
use super::slots::{Link, LinkId, OutputKey, OutputShape, Slot, SlotGraph, SlotId, SlotKind};
use crate::error::{MotifError, Result};
use crate::graph::{EntityId, TypeId, TypeRegistry};

/// An edge has two endpoints, so at most two undirected candidates.
const MAX_EITHER_ENDPOINTS: usize = 2;

/// Compile a query input into a slot graph.
pub fn parse(input: &QueryInput, types: &TypeRegistry) -> Result<SlotGraph> {
    let mut parser = Parser::new(types);

    let shape = match input {
        QueryInput::Single(item) => OutputShape::Single(parser.visit(item, SlotKind::Unknown)?),
        QueryInput::List(items) => {
            for (i, item) in items.iter().enumerate() {
                let slot = parser.visit(item, SlotKind::Unknown)?;
                parser.positions[slot.0].push(OutputKey::Index(i));
            }
            OutputShape::List(items.len())
        }
        QueryInput::Map(entries) => {
            let mut keys = HashSet::new();
            for (key, item) in entries {
                if !keys.insert(key.as_str()) {
                    return Err(MotifError::MalformedRelation(format!(
                        "output key `{}` is used twice",
                        key
                    )));
                }
                let slot = parser.visit(item, SlotKind::Unknown)?;
                parser.positions[slot.0].push(OutputKey::Key(key.clone()));
            }
            OutputShape::Map(entries.iter().map(|(key, _)| key.clone()).collect())
        }
    };
    parser.settle_directions();

    debug!(
        slots = parser.slots.len(),
        links = parser.links.len(),
        named = parser.names.len(),
        "query parsed"
    );

    Ok(SlotGraph {
        slots: parser.slots,
        links: parser.links,
        names: parser.names,
        shape,
        positions: parser.positions,
    })
}

struct Parser<'a> {
    types: &'a TypeRegistry,
    slots: Vec<Slot>,
    links: Vec<Link>,
    names: HashMap<String, SlotId>,
    positions: Vec<Vec<OutputKey>>,
}

impl<'a> Parser<'a> {
    fn new(types: &'a TypeRegistry) -> Self {
        Self {
            types,
            slots: Vec::new(),
            links: Vec::new(),
            names: HashMap::new(),
            positions: Vec::new(),
        }
    }

    /// Slot for `item`. `expected` is the kind the parent position demands,
    /// or `Unknown` at the top level.
    fn visit(&mut self, item: &QueryItem, expected: SlotKind) -> Result<SlotId> {
        match item {
            QueryItem::Type(ty) => {
                let kind = self.kind_in_position(*ty, expected)?;
                let slot = self.anonymous(kind);
                self.slots[slot.0].ty = Some(*ty);
                Ok(slot)
            }
            QueryItem::Node(node) => self.instance(node.id(), node.ty(), expected),
            QueryItem::Edge(edge) => self.instance(edge.id(), edge.ty(), expected),
            QueryItem::Ref(name) => self.named(name, expected),
            QueryItem::Pattern(pattern) => self.pattern(pattern, expected),
        }
    }

    fn instance(&mut self, id: EntityId, ty: TypeId, expected: SlotKind) -> Result<SlotId> {
        let kind = self.kind_in_position(ty, expected)?;
        let slot = self.anonymous(kind);
        self.slots[slot.0].ty = Some(ty);
        self.slots[slot.0].instance = Some(id);
        Ok(slot)
    }

    fn pattern(&mut self, pattern: &Pattern, expected: SlotKind) -> Result<SlotId> {
        let kind = self.kind_in_position(pattern.ty, expected)?;
        let slot = match &pattern.name {
            Some(name) => {
                let slot = self.named(name, kind)?;
                self.narrow_type(slot, pattern.ty)?;
                slot
            }
            None => {
                let slot = self.anonymous(kind);
                self.slots[slot.0].ty = Some(pattern.ty);
                slot
            }
        };
        for excluded in &pattern.excluded {
            self.types.info(*excluded)?;
            if !self.slots[slot.0].excluded.contains(excluded) {
                self.slots[slot.0].excluded.push(*excluded);
            }
        }

        let child_kind = match kind {
            SlotKind::Node => SlotKind::Edge,
            _ => SlotKind::Node,
        };
        for (dir, related) in &pattern.related {
            let child = self.visit(related, child_kind)?;
            match kind {
                SlotKind::Node => self.link(slot, child, *dir)?,
                _ => self.link(child, slot, *dir)?,
            }
        }
        Ok(slot)
    }

    /// Kind of `ty`, checked against what the parent position allows.
    fn kind_in_position(&self, ty: TypeId, expected: SlotKind) -> Result<SlotKind> {
        let kind = SlotKind::from(self.types.kind_of(ty)?);
        if expected != SlotKind::Unknown && expected != kind {
            return Err(MotifError::MalformedRelation(format!(
                "`{}` is a {} type but the position requires a {}",
                self.types.name(ty),
                kind,
                expected
            )));
        }
        Ok(kind)
    }

    fn anonymous(&mut self, kind: SlotKind) -> SlotId {
        let name = format!("${}", self.slots.len());
        self.push(Slot::new(name, kind))
    }

    /// Slot shared by every occurrence of `name`, specialized to `kind`.
    fn named(&mut self, name: &str, kind: SlotKind) -> Result<SlotId> {
        let slot = match self.names.get(name) {
            Some(slot) => *slot,
            None => {
                let slot = self.push(Slot::new(name.to_string(), kind));
                self.names.insert(name.to_string(), slot);
                return Ok(slot);
            }
        };
        let current = self.slots[slot.0].kind;
        match (current, kind) {
            (_, SlotKind::Unknown) => {}
            (SlotKind::Unknown, _) => self.slots[slot.0].kind = kind,
            (a, b) if a == b => {}
            (a, b) => {
                return Err(MotifError::ReferenceMismatch {
                    name: name.to_string(),
                    reason: format!("used as {a} and as {b}"),
                })
            }
        }
        Ok(slot)
    }

    /// Keep the more specific of the slot's type and `ty`.
    fn narrow_type(&mut self, slot: SlotId, ty: TypeId) -> Result<()> {
        let current = self.slots[slot.0].ty;
        let narrowed = match current {
            None => ty,
            Some(current) if self.types.is_subtype(ty, current) => ty,
            Some(current) if self.types.is_subtype(current, ty) => current,
            Some(current) => {
                return Err(MotifError::ReferenceMismatch {
                    name: self.slots[slot.0].name.clone(),
                    reason: format!(
                        "types `{}` and `{}` are unrelated",
                        self.types.name(current),
                        self.types.name(ty)
                    ),
                })
            }
        };
        self.slots[slot.0].ty = Some(narrowed);
        Ok(())
    }

    fn link(&mut self, node: SlotId, edge: SlotId, dir: Direction) -> Result<()> {
        let candidate = Link { node, edge, dir };
        if self.edge_links(edge).any(|existing| *existing == candidate) {
            return Ok(());
        }
        if dir == Direction::FromOrTo {
            let either = self
                .edge_links(edge)
                .filter(|link| link.dir == Direction::FromOrTo)
                .count();
            if either >= MAX_EITHER_ENDPOINTS {
                return Err(MotifError::MalformedRelation(format!(
                    "edge `{}` has more than {} undirected endpoints",
                    self.slots[edge.0].name, MAX_EITHER_ENDPOINTS
                )));
            }
        }
        let id = LinkId(self.links.len());
        self.links.push(candidate);
        self.slots[node.0].links.push(id);
        self.slots[edge.0].links.push(id);
        Ok(())
    }

    fn edge_links(&self, edge: SlotId) -> impl Iterator<Item = &Link> {
        self.slots[edge.0].links.iter().map(move |id| &self.links[id.0])
    }

    /// An edge slot with one fixed role and a single undirected endpoint has
    /// only one place left for that endpoint. An undirected link that repeats
    /// a node already linked with a fixed role adds nothing and is dropped.
    fn settle_directions(&mut self) {
        for edge in 0..self.slots.len() {
            if self.slots[edge].kind != SlotKind::Edge {
                continue;
            }
            let links = self.slots[edge].links.clone();
            let fixed: Vec<Link> = links
                .iter()
                .map(|id| self.links[id.0])
                .filter(|link| link.dir.is_fixed())
                .collect();

            let mut either = Vec::new();
            for id in &links {
                let link = self.links[id.0];
                if link.dir != Direction::FromOrTo {
                    continue;
                }
                if fixed.iter().any(|f| f.node == link.node) {
                    self.unlink(*id);
                } else {
                    either.push(*id);
                }
            }

            let has_from = fixed.iter().any(|l| l.dir == Direction::From);
            let has_to = fixed.iter().any(|l| l.dir == Direction::To);
            if let [single] = either[..] {
                if has_from != has_to {
                    let dir = if has_from { Direction::To } else { Direction::From };
                    self.links[single.0].dir = dir;
                }
            }
        }
    }

    fn unlink(&mut self, id: LinkId) {
        let Link { node, edge, .. } = self.links[id.0];
        self.slots[node.0].links.retain(|l| *l != id);
        self.slots[edge.0].links.retain(|l| *l != id);
    }

    fn push(&mut self, slot: Slot) -> SlotId {
        let id = SlotId(self.slots.len());
        self.slots.push(slot);
        self.positions.push(Vec::new());
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Node;

    struct Fleet {
        types: TypeRegistry,
        ship: TypeId,
        freighter: TypeId,
        planet: TypeId,
        faction: TypeId,
        docked: TypeId,
        ruled_by: TypeId,
    }

    fn fleet() -> Fleet {
        let mut types = TypeRegistry::new();
        let ship = types.register_node_type("Spaceship", None).unwrap();
        let freighter = types.register_node_type("Freighter", Some(ship)).unwrap();
        let planet = types.register_node_type("Planet", None).unwrap();
        let faction = types.register_node_type("Faction", None).unwrap();
        let docked = types.register_edge_type("Docked", None).unwrap();
        let ruled_by = types.register_edge_type("RuledBy", None).unwrap();
        Fleet {
            types,
            ship,
            freighter,
            planet,
            faction,
            docked,
            ruled_by,
        }
    }

    #[test]
    fn test_unnamed_occurrences_stay_distinct() {
        let f = fleet();
        let input = QueryInput::list([f.ship, f.ship]);
        let slots = parse(&input, &f.types).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.positions(SlotId(0)), &[OutputKey::Index(0)]);
        assert_eq!(slots.positions(SlotId(1)), &[OutputKey::Index(1)]);
    }

    #[test]
    fn test_names_share_a_slot() {
        let f = fleet();
        let input = QueryInput::map([
            ("a", QueryItem::from(Pattern::new(f.ship).named("s"))),
            ("b", QueryItem::reference("s")),
        ]);
        let slots = parse(&input, &f.types).unwrap();
        assert_eq!(slots.len(), 1);
        let s = slots.lookup("s").unwrap();
        assert_eq!(
            slots.positions(s),
            &[OutputKey::Key("a".into()), OutputKey::Key("b".into())]
        );
        assert_eq!(slots.slot(s).kind, SlotKind::Node);
    }

    #[test]
    fn test_reference_is_specialized_by_later_use() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::reference("d"),
            Pattern::new(f.ship).with("d").into(),
        ]);
        let slots = parse(&input, &f.types).unwrap();
        let d = slots.lookup("d").unwrap();
        assert_eq!(slots.slot(d).kind, SlotKind::Edge);
        assert_eq!(slots.slot(d).ty, None);
    }

    #[test]
    fn test_lone_reference_stays_unknown() {
        let f = fleet();
        let slots = parse(&QueryItem::reference("x").into(), &f.types).unwrap();
        assert_eq!(slots.slot(SlotId(0)).kind, SlotKind::Unknown);
        assert_eq!(slots.shape(), &OutputShape::Single(SlotId(0)));
    }

    #[test]
    fn test_node_edge_mismatch() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(Pattern::new(f.ship).named("x")),
            Pattern::new(f.planet).with("x").into(),
        ]);
        let err = parse(&input, &f.types).unwrap_err();
        assert!(matches!(err, MotifError::ReferenceMismatch { name, .. } if name == "x"));
    }

    #[test]
    fn test_type_narrows_to_subtype() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(Pattern::new(f.ship).named("s")),
            Pattern::new(f.freighter).named("s").into(),
            Pattern::new(f.ship).named("s").into(),
        ]);
        let slots = parse(&input, &f.types).unwrap();
        assert_eq!(slots.slot(slots.lookup("s").unwrap()).ty, Some(f.freighter));
    }

    #[test]
    fn test_unrelated_types_mismatch() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(Pattern::new(f.ship).named("s")),
            Pattern::new(f.planet).named("s").into(),
        ]);
        assert!(matches!(
            parse(&input, &f.types),
            Err(MotifError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn test_wrong_kind_in_relation() {
        let f = fleet();
        let input: QueryInput = Pattern::new(f.ship).with(f.planet).into();
        assert!(matches!(
            parse(&input, &f.types),
            Err(MotifError::MalformedRelation(_))
        ));
    }

    #[test]
    fn test_links_are_reciprocal() {
        let f = fleet();
        let input: QueryInput = Pattern::new(f.ship)
            .from(Pattern::new(f.docked).named("d").to(f.planet))
            .into();
        let slots = parse(&input, &f.types).unwrap();
        let ship = SlotId(0);
        let d = slots.lookup("d").unwrap();
        assert_eq!(slots.linked(ship, Direction::From).collect::<Vec<_>>(), vec![d]);
        assert_eq!(slots.linked(d, Direction::From).collect::<Vec<_>>(), vec![ship]);
        assert_eq!(slots.linked(d, Direction::To).count(), 1);
        assert_eq!(slots.links().len(), 2);
    }

    #[test]
    fn test_single_undirected_endpoint_is_settled() {
        let f = fleet();
        let input: QueryInput = Pattern::new(f.ship)
            .with(Pattern::new(f.docked).named("d").to(f.planet))
            .into();
        let slots = parse(&input, &f.types).unwrap();
        let d = slots.lookup("d").unwrap();
        assert_eq!(slots.linked(d, Direction::From).collect::<Vec<_>>(), vec![SlotId(0)]);
        assert_eq!(slots.linked(d, Direction::FromOrTo).count(), 0);
    }

    #[test]
    fn test_two_undirected_endpoints_stay_ambiguous() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(Pattern::new(f.ship).with(Pattern::new(f.docked).named("d"))),
            Pattern::new(f.planet).with("d").into(),
        ]);
        let slots = parse(&input, &f.types).unwrap();
        let d = slots.lookup("d").unwrap();
        assert_eq!(slots.linked(d, Direction::FromOrTo).count(), 2);
    }

    #[test]
    fn test_third_undirected_endpoint_is_malformed() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(Pattern::new(f.ship).with(Pattern::new(f.docked).named("d"))),
            Pattern::new(f.planet).with("d").into(),
            Pattern::new(f.faction).with("d").into(),
        ]);
        assert!(matches!(
            parse(&input, &f.types),
            Err(MotifError::MalformedRelation(_))
        ));
    }

    #[test]
    fn test_repeated_link_is_not_duplicated() {
        let f = fleet();
        let input = QueryInput::list([
            QueryItem::from(
                Pattern::new(f.ship)
                    .named("s")
                    .from(Pattern::new(f.ruled_by).named("r")),
            ),
            Pattern::new(f.ship).named("s").from("r").into(),
        ]);
        let slots = parse(&input, &f.types).unwrap();
        assert_eq!(slots.links().len(), 1);
    }

    #[test]
    fn test_repeated_output_key_is_malformed() {
        let f = fleet();
        let input = QueryInput::map([("ship", f.ship), ("ship", f.ship)]);
        assert!(matches!(
            parse(&input, &f.types),
            Err(MotifError::MalformedRelation(_))
        ));

        let distinct = QueryInput::map([("ship", f.ship), ("port", f.planet)]);
        assert_eq!(parse(&distinct, &f.types).unwrap().len(), 2);
    }

    #[test]
    fn test_instance_slot() {
        let f = fleet();
        let n = Node::new(f.planet);
        let slots = parse(&n.into(), &f.types).unwrap();
        let slot = slots.slot(SlotId(0));
        assert_eq!(slot.instance, Some(n.id()));
        assert_eq!(slot.kind, SlotKind::Node);
    }
}
