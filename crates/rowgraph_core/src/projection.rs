//! Projection planning.

use crate::error::{CoreError, CoreResult};
use crate::model::{Definitions, EntityType, NodeType};
use crate::query::{QueryObject, QueryObjectId};
use std::sync::Arc;

/// One selected column: a node of one query object.
#[derive(Debug, Clone)]
pub struct ProjectionColumn {
    /// The query object the column belongs to.
    pub query_object: QueryObjectId,
    /// The static entity type of that query object.
    pub entity_type: Arc<EntityType>,
    /// Position of the node in the entity type.
    pub node_index: usize,
}

impl ProjectionColumn {
    /// Returns the node metadata.
    #[must_use]
    pub fn node(&self) -> &NodeType {
        &self.entity_type.nodes()[self.node_index]
    }
}

/// The ordered select list of a query tree.
///
/// Column `i` of the result set holds `columns()[i]`. The order is only
/// meaningful within one generated statement.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    columns: Vec<ProjectionColumn>,
}

impl Projection {
    /// Plans the projection of a query tree.
    ///
    /// Every column-mapped node is selected when it is the key, the
    /// optimistic lock, a discriminator or a foreign key, or when the query
    /// object selects it (all nodes when it has no explicit selection).
    ///
    /// # Errors
    ///
    /// Fails for unknown types and for selected properties that are not
    /// column-mapped nodes.
    pub fn build(definitions: &dyn Definitions, query: &QueryObject) -> CoreResult<Self> {
        let mut columns = Vec::new();
        for qo in query.walk() {
            let ty = definitions.entity_type(qo.entity_type())?;
            if let Some(selected) = qo.projection() {
                for name in selected {
                    match ty.node(name) {
                        Some(node) if node.column().is_some() => {}
                        Some(_) => {
                            return Err(CoreError::illegal_query_state(format!(
                                "'{}.{name}' is not a column and cannot be selected",
                                ty.name()
                            )))
                        }
                        None => {
                            return Err(CoreError::illegal_query_state(format!(
                                "entity type '{}' has no property '{name}'",
                                ty.name()
                            )))
                        }
                    }
                }
            }
            for (index, node) in ty.nodes().iter().enumerate() {
                if node.column().is_none() {
                    continue;
                }
                let forced = node.name() == ty.key_node_name()
                    || node.is_optimistic_lock()
                    || node.fixed().is_some()
                    || ty.is_discriminator(node.name())
                    || node.is_reference();
                let requested = qo
                    .projection()
                    .map_or(true, |names| names.iter().any(|n| n == node.name()));
                if forced || requested {
                    columns.push(ProjectionColumn {
                        query_object: qo.id(),
                        entity_type: Arc::clone(&ty),
                        node_index: index,
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Returns the columns in select order.
    #[must_use]
    pub fn columns(&self) -> &[ProjectionColumn] {
        &self.columns
    }

    /// Returns the number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the result position of a node of a query object.
    #[must_use]
    pub fn index_of(&self, query_object: QueryObjectId, node: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.query_object == query_object && c.node().name() == node)
    }

    /// Returns the columns of one query object with their result positions.
    pub fn columns_of(&self, query_object: QueryObjectId) -> impl Iterator<Item = (usize, &ProjectionColumn)> {
        self.columns
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.query_object == query_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, DefinitionsSet, EntityTypeSpec, RelationKind, SemanticType};
    use rowgraph_sql::JdbcType;

    fn definitions() -> DefinitionsSet {
        let col = |name: &str| ColumnSpec::new(name, JdbcType::Varchar);
        DefinitionsSet::builder()
            .entity_type(
                EntityTypeSpec::new("Author")
                    .table("AUTHOR")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::value("name", SemanticType::String, col("NAME")))
                    .node(NodeType::value("bio", SemanticType::String, col("BIO")))
                    .node(NodeType::value("version", SemanticType::Long, ColumnSpec::new("VERSION", JdbcType::BigInt)).optimistic_lock())
                    .node(NodeType::to_many("books", RelationKind::Owns, "Book", "author")),
            )
            .entity_type(
                EntityTypeSpec::new("Book")
                    .table("BOOK")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::value("title", SemanticType::String, col("TITLE")))
                    .node(NodeType::reference(
                        "author",
                        SemanticType::Long,
                        ColumnSpec::new("AUTHOR_ID", JdbcType::BigInt),
                        RelationKind::Refers,
                        "Author",
                    )),
            )
            .build()
            .unwrap()
    }

    fn names(p: &Projection) -> Vec<String> {
        p.columns()
            .iter()
            .map(|c| format!("{}.{}", c.entity_type.name(), c.node().name()))
            .collect()
    }

    #[test]
    fn default_selects_all_columns() {
        let defs = definitions();
        let p = Projection::build(&defs, &QueryObject::new("Author")).unwrap();
        assert_eq!(
            names(&p),
            vec!["Author.id", "Author.name", "Author.bio", "Author.version"]
        );
    }

    #[test]
    fn explicit_selection_keeps_forced_columns() {
        let defs = definitions();
        let mut author = QueryObject::new("Author");
        author.select(["name"]);
        let mut books = QueryObject::new("Book");
        books.select(Vec::<String>::new());
        let books_id = books.id();
        author.join("books", books);
        let p = Projection::build(&defs, &author).unwrap();
        assert_eq!(
            names(&p),
            vec!["Author.id", "Author.name", "Author.version", "Book.id", "Book.author"]
        );
        assert_eq!(p.index_of(books_id, "author"), Some(4));
        assert_eq!(p.columns_of(books_id).count(), 2);
    }

    #[test]
    fn rejects_unknown_or_non_column_properties() {
        let defs = definitions();
        let mut q = QueryObject::new("Author");
        q.select(["nope"]);
        assert!(matches!(
            Projection::build(&defs, &q),
            Err(CoreError::IllegalQueryState { .. })
        ));
        q.select(["books"]);
        assert!(Projection::build(&defs, &q).is_err());
    }
}
