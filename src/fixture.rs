//! TOML fixtures: a type hierarchy, a graph and a query in one file.
//!
//! ```toml
//! query = { type = "Spaceship", as = "s", with = { type = "Docked", to = "Planet" } }
//!
//! [[types]]
//! name = "Spaceship"
//! kind = "node"
//!
//! [[types]]
//! name = "Planet"
//! kind = "node"
//!
//! [[types]]
//! name = "Docked"
//! kind = "edge"
//!
//! [[nodes]]
//! id = "enterprise"
//! type = "Spaceship"
//!
//! [[nodes]]
//! id = "vulcan"
//! type = "Planet"
//!
//! [[edges]]
//! type = "Docked"
//! from = "enterprise"
//! to = "vulcan"
//! ```
//!
//! Query items are a type name, `"@name"` for a reference, `{ instance = "id" }`
//! for a declared node or edge, or a pattern table. A query is one item, a
//! list of items, or a table of named items.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::{MotifError, Result};
use crate::graph::{Entity, EntityId, EntityKind, Graph, Node, TypeId, TypeRegistry};
use crate::query::{Direction, Pattern, QueryInput, QueryItem};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fixture {
    pub query: Option<QuerySpec>,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub types: Vec<TypeSpec>,
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeSpec {
    pub name: String,
    pub kind: EntityKind,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSpec {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
    pub from: String,
    pub to: String,
}

/// Untagged variants are tried in order. Lists come first: a derived struct
/// also accepts a sequence, so `["A", "B"]` would otherwise read as a pattern.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    List(Vec<ItemSpec>),
    Item(ItemSpec),
    Map(BTreeMap<String, ItemSpec>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemSpec {
    Instance(InstanceSpec),
    Pattern(Box<PatternSpec>),
    Name(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSpec {
    pub instance: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatternSpec {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(rename = "as")]
    pub name: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub with: Related,
    #[serde(default)]
    pub to: Related,
    #[serde(default)]
    pub from: Related,
    #[serde(default)]
    pub from_or_to: Related,
}

/// One related item or several.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Related {
    Many(Vec<ItemSpec>),
    One(ItemSpec),
}

impl Default for Related {
    fn default() -> Self {
        Related::Many(Vec::new())
    }
}

impl Related {
    fn items(&self) -> &[ItemSpec] {
        match self {
            Related::One(item) => std::slice::from_ref(item),
            Related::Many(items) => items,
        }
    }
}

/// A fixture turned into live values.
pub struct LoadedFixture {
    pub graph: Graph,
    pub input: Option<QueryInput>,
    entities: BTreeMap<String, Entity>,
    labels: HashMap<EntityId, String>,
}

impl LoadedFixture {
    /// Entity declared under `id`.
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.entities.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.entity(id).and_then(|e| e.as_node())
    }

    /// Declared id of an entity, or its numeric id for unnamed edges.
    pub fn label(&self, entity: &Entity) -> String {
        self.labels
            .get(&entity.id())
            .cloned()
            .unwrap_or_else(|| entity.id().to_string())
    }
}

impl Fixture {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| MotifError::Fixture(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading fixture");
        let source = fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn build(&self) -> Result<LoadedFixture> {
        let types = Arc::new(self.registry()?);
        let mut graph = Graph::with_config(Arc::clone(&types), self.config.clone());
        let mut entities = BTreeMap::new();
        let mut labels = HashMap::new();

        for spec in &self.nodes {
            let node = Node::new(resolve_type(&types, &spec.ty)?);
            graph.add_node(node)?;
            declare(&mut entities, &mut labels, &spec.id, node.into())?;
        }

        for spec in &self.edges {
            let endpoint = |id: &str| {
                entities
                    .get(id)
                    .and_then(Entity::as_node)
                    .ok_or_else(|| MotifError::Fixture(format!("unknown node `{id}`")))
            };
            let (from, to) = (endpoint(&spec.from)?, endpoint(&spec.to)?);
            let edge = graph.connect(resolve_type(&types, &spec.ty)?, from, to)?;
            if let Some(id) = &spec.id {
                declare(&mut entities, &mut labels, id, edge.into())?;
            }
        }

        let input = self
            .query
            .as_ref()
            .map(|query| query_input(query, &types, &entities))
            .transpose()?;

        debug!(
            types = types.len(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "fixture built"
        );
        Ok(LoadedFixture {
            graph,
            input,
            entities,
            labels,
        })
    }

    fn registry(&self) -> Result<TypeRegistry> {
        let mut types = TypeRegistry::new();
        for spec in &self.types {
            let parent = spec
                .parent
                .as_deref()
                .map(|name| resolve_type(&types, name))
                .transpose()?;
            match spec.kind {
                EntityKind::Node => types.register_node_type(&spec.name, parent)?,
                EntityKind::Edge => types.register_edge_type(&spec.name, parent)?,
            };
        }
        Ok(types)
    }
}

fn declare(
    entities: &mut BTreeMap<String, Entity>,
    labels: &mut HashMap<EntityId, String>,
    id: &str,
    entity: Entity,
) -> Result<()> {
    if entities.insert(id.to_string(), entity).is_some() {
        return Err(MotifError::Fixture(format!("duplicate id `{id}`")));
    }
    labels.insert(entity.id(), id.to_string());
    Ok(())
}

fn resolve_type(types: &TypeRegistry, name: &str) -> Result<TypeId> {
    types
        .lookup(name)
        .ok_or_else(|| MotifError::Fixture(format!("unknown type `{name}`")))
}

fn query_input(
    spec: &QuerySpec,
    types: &TypeRegistry,
    entities: &BTreeMap<String, Entity>,
) -> Result<QueryInput> {
    let item = |spec: &ItemSpec| query_item(spec, types, entities);
    Ok(match spec {
        QuerySpec::Item(spec) => QueryInput::Single(item(spec)?),
        QuerySpec::List(specs) => QueryInput::List(specs.iter().map(item).collect::<Result<_>>()?),
        QuerySpec::Map(specs) => QueryInput::Map(
            specs
                .iter()
                .map(|(key, spec)| Ok((key.clone(), item(spec)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

fn query_item(
    spec: &ItemSpec,
    types: &TypeRegistry,
    entities: &BTreeMap<String, Entity>,
) -> Result<QueryItem> {
    match spec {
        ItemSpec::Name(name) => match name.strip_prefix('@') {
            Some(reference) => Ok(QueryItem::reference(reference)),
            None => resolve_type(types, name).map(QueryItem::Type),
        },
        ItemSpec::Instance(InstanceSpec { instance }) => match entities.get(instance) {
            Some(Entity::Node(node)) => Ok(QueryItem::Node(*node)),
            Some(Entity::Edge(edge)) => Ok(QueryItem::Edge(*edge)),
            None => Err(MotifError::Fixture(format!("unknown instance `{instance}`"))),
        },
        ItemSpec::Pattern(spec) => {
            let mut pattern = Pattern::new(resolve_type(types, &spec.ty)?);
            if let Some(name) = &spec.name {
                pattern = pattern.named(name.as_str());
            }
            for excluded in &spec.exclude {
                pattern = pattern.excluding(resolve_type(types, excluded)?);
            }
            let groups = [
                (Direction::FromOrTo, &spec.with),
                (Direction::To, &spec.to),
                (Direction::From, &spec.from),
                (Direction::FromOrTo, &spec.from_or_to),
            ];
            for (dir, related) in groups {
                for item in related.items() {
                    pattern = pattern.related(dir, query_item(item, types, entities)?);
                }
            }
            Ok(pattern.into())
        }
    }
}
