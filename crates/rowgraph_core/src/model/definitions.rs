//! The metadata provider.

use crate::error::{CoreError, CoreResult};
use crate::model::{EntityType, EntityTypeSpec, KeyGeneration, NodeType, TypeConverter};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read access to entity type metadata.
///
/// The engine holds one provider per [`crate::Environment`] and passes it
/// to every component that needs metadata.
pub trait Definitions: Send + Sync {
    /// Looks up an entity type by name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `must_exist` is set and the type is
    /// unknown.
    fn entity_type_matching(&self, name: &str, must_exist: bool) -> CoreResult<Option<Arc<EntityType>>>;

    /// Returns the direct subtypes of `parent`.
    fn entity_types_extending(&self, parent: &str) -> Vec<Arc<EntityType>>;

    /// Looks up a registered type converter.
    fn type_converter(&self, id: &str) -> Option<Arc<dyn TypeConverter>>;

    /// Looks up an entity type that must exist.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the type is unknown.
    fn entity_type(&self, name: &str) -> CoreResult<Arc<EntityType>> {
        self.entity_type_matching(name, true)?
            .ok_or_else(|| CoreError::configuration(format!("unknown entity type '{name}'")))
    }

    /// Returns every concrete type extending `name`, at any depth.
    fn concrete_subtypes(&self, name: &str) -> Vec<Arc<EntityType>> {
        let mut out = Vec::new();
        let mut pending = self.entity_types_extending(name);
        while let Some(ty) = pending.pop() {
            pending.extend(self.entity_types_extending(ty.name()));
            if !ty.is_abstract() {
                out.push(ty);
            }
        }
        out.sort_by(|a, b| a.name().cmp(b.name()));
        out
    }
}

/// Validated, flattened metadata.
pub struct DefinitionsSet {
    types: HashMap<String, Arc<EntityType>>,
    children: HashMap<String, Vec<Arc<EntityType>>>,
    converters: HashMap<String, Arc<dyn TypeConverter>>,
}

impl DefinitionsSet {
    /// Starts building a set.
    #[must_use]
    pub fn builder() -> DefinitionsBuilder {
        DefinitionsBuilder::default()
    }

    /// Returns the number of entity types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types are defined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::fmt::Debug for DefinitionsSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.types.keys().collect();
        names.sort();
        f.debug_struct("DefinitionsSet")
            .field("types", &names)
            .finish_non_exhaustive()
    }
}

impl Definitions for DefinitionsSet {
    fn entity_type_matching(&self, name: &str, must_exist: bool) -> CoreResult<Option<Arc<EntityType>>> {
        match self.types.get(name) {
            Some(ty) => Ok(Some(Arc::clone(ty))),
            None if must_exist => Err(CoreError::configuration(format!(
                "unknown entity type '{name}'"
            ))),
            None => Ok(None),
        }
    }

    fn entity_types_extending(&self, parent: &str) -> Vec<Arc<EntityType>> {
        self.children.get(parent).cloned().unwrap_or_default()
    }

    fn type_converter(&self, id: &str) -> Option<Arc<dyn TypeConverter>> {
        self.converters.get(id).cloned()
    }
}

/// Collects declarations and converters, then validates them.
#[derive(Default)]
pub struct DefinitionsBuilder {
    specs: Vec<EntityTypeSpec>,
    converters: HashMap<String, Arc<dyn TypeConverter>>,
}

impl std::fmt::Debug for DefinitionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionsBuilder")
            .field("types", &self.specs.len())
            .field("converters", &self.converters.len())
            .finish()
    }
}

impl DefinitionsBuilder {
    /// Adds an entity type declaration.
    #[must_use]
    pub fn entity_type(mut self, spec: EntityTypeSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Registers a type converter under an identifier.
    #[must_use]
    pub fn converter(mut self, id: impl Into<String>, converter: Arc<dyn TypeConverter>) -> Self {
        self.converters.insert(id.into(), converter);
        self
    }

    /// Validates the declarations and flattens every type.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for duplicate or unknown types,
    /// inheritance cycles, missing keys or tables, dangling relations,
    /// unregistered converters, duplicate columns, or more than one
    /// optimistic lock per type.
    pub fn build(self) -> CoreResult<DefinitionsSet> {
        let mut specs: HashMap<String, EntityTypeSpec> = HashMap::new();
        let mut order = Vec::new();
        for spec in self.specs {
            if specs.contains_key(&spec.name) {
                return Err(CoreError::configuration(format!(
                    "entity type '{}' is defined twice",
                    spec.name
                )));
            }
            order.push(spec.name.clone());
            specs.insert(spec.name.clone(), spec);
        }

        let mut types = HashMap::new();
        for name in &order {
            let ty = flatten(name, &specs)?;
            types.insert(name.clone(), ty);
        }

        // Discriminators: nodes fixed by the type itself or any descendant.
        let mut discriminators: HashMap<String, Vec<String>> = HashMap::new();
        for ty in types.values() {
            for node in ty.fixed_nodes() {
                for owner in std::iter::once(&ty.name).chain(ty.ancestors.iter()) {
                    let list = discriminators.entry(owner.clone()).or_default();
                    if !list.iter().any(|n| n == node.name()) {
                        list.push(node.name().to_string());
                    }
                }
            }
        }
        for (name, list) in discriminators {
            if let Some(ty) = types.get_mut(&name) {
                ty.discriminators = list;
            }
        }

        for ty in types.values() {
            validate(ty, &types, &self.converters)?;
        }

        let types: HashMap<String, Arc<EntityType>> =
            types.into_iter().map(|(k, v)| (k, Arc::new(v))).collect();
        let mut children: HashMap<String, Vec<Arc<EntityType>>> = HashMap::new();
        for name in &order {
            let ty = &types[name];
            if let Some(parent) = ty.parent() {
                children
                    .entry(parent.to_string())
                    .or_default()
                    .push(Arc::clone(ty));
            }
        }

        tracing::debug!(types = types.len(), "definitions built");
        Ok(DefinitionsSet {
            types,
            children,
            converters: self.converters,
        })
    }
}

fn flatten(name: &str, specs: &HashMap<String, EntityTypeSpec>) -> CoreResult<EntityType> {
    // Walk up to the root, failing on unknown parents and cycles.
    let mut chain: Vec<&EntityTypeSpec> = Vec::new();
    let mut seen = HashSet::new();
    let mut current = Some(name);
    while let Some(n) = current {
        if !seen.insert(n) {
            return Err(CoreError::configuration(format!(
                "inheritance cycle through entity type '{n}'"
            )));
        }
        let spec = specs.get(n).ok_or_else(|| {
            CoreError::configuration(format!("entity type '{name}' extends unknown type '{n}'"))
        })?;
        chain.push(spec);
        current = spec.parent.as_deref();
    }

    let mut nodes: Vec<NodeType> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut table = None;
    let mut key_node = None;
    let mut key_generation = KeyGeneration::default();
    for spec in chain.iter().rev() {
        for node in &spec.nodes {
            match index.get(node.name()) {
                Some(&i) => nodes[i] = node.clone(),
                None => {
                    index.insert(node.name().to_string(), nodes.len());
                    nodes.push(node.clone());
                }
            }
        }
        table = spec.table.clone().or(table);
        key_node = spec.key_node.clone().or(key_node);
        key_generation = spec.key_generation.unwrap_or(key_generation);
    }

    let table = table.ok_or_else(|| {
        CoreError::configuration(format!("entity type '{name}' has no table"))
    })?;
    let key_node = key_node.ok_or_else(|| {
        CoreError::configuration(format!("entity type '{name}' has no key node"))
    })?;
    match index.get(&key_node).map(|&i| &nodes[i]) {
        Some(node) if node.column().is_some() => {}
        Some(_) => {
            return Err(CoreError::configuration(format!(
                "key node '{key_node}' of entity type '{name}' is not mapped to a column"
            )))
        }
        None => {
            return Err(CoreError::configuration(format!(
                "entity type '{name}' declares missing key node '{key_node}'"
            )))
        }
    }

    let spec = chain[0];
    Ok(EntityType {
        name: spec.name.clone(),
        table,
        key_node,
        is_abstract: spec.is_abstract,
        parent: spec.parent.clone(),
        ancestors: chain[1..].iter().map(|s| s.name.clone()).collect(),
        nodes,
        index,
        key_generation,
        discriminators: Vec::new(),
    })
}

fn validate(
    ty: &EntityType,
    types: &HashMap<String, EntityType>,
    converters: &HashMap<String, Arc<dyn TypeConverter>>,
) -> CoreResult<()> {
    let mut columns = HashSet::new();
    let mut locks = 0;
    for node in ty.nodes() {
        let context = || format!("node '{}.{}'", ty.name(), node.name());
        if let Some(column) = node.column() {
            if !columns.insert(column.name.to_ascii_lowercase()) {
                return Err(CoreError::configuration(format!(
                    "{} maps duplicate column '{}'",
                    context(),
                    column.name
                )));
            }
        }
        if node.is_optimistic_lock() {
            locks += 1;
            if locks > 1 {
                return Err(CoreError::configuration(format!(
                    "entity type '{}' has more than one optimistic lock",
                    ty.name()
                )));
            }
        }
        if let Some(id) = node.type_converter() {
            if !converters.contains_key(id) {
                return Err(CoreError::configuration(format!(
                    "{} uses unregistered converter '{id}'",
                    context()
                )));
            }
        }
        let Some(relation) = node.relation() else {
            continue;
        };
        let target = types.get(&relation.target_type).ok_or_else(|| {
            CoreError::configuration(format!(
                "{} relates to unknown entity type '{}'",
                context(),
                relation.target_type
            ))
        })?;
        if let Some(back) = &relation.back_reference {
            if node.column().is_some() {
                return Err(CoreError::configuration(format!(
                    "{} has a back reference and a column",
                    context()
                )));
            }
            match target.node(back) {
                Some(b) if b.is_reference() => {}
                _ => {
                    return Err(CoreError::configuration(format!(
                        "{} has unknown back reference '{}.{back}'",
                        context(),
                        target.name()
                    )))
                }
            }
        } else if node.column().is_none() {
            return Err(CoreError::configuration(format!(
                "{} is neither column mapped nor a to-many relation",
                context()
            )));
        }
        if let Some(sort) = &relation.sort_node {
            if target.node(sort).and_then(NodeType::column).is_none() {
                return Err(CoreError::configuration(format!(
                    "{} sorts by unknown node '{}.{sort}'",
                    context(),
                    target.name()
                )));
            }
        }
    }
    Ok(())
}
