//! Query objects and joins.

use crate::query::{Condition, QProperty};
use rowgraph_sql::LockMode;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_QUERY_OBJECT: AtomicU64 = AtomicU64::new(1);

/// Identity of a query object within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryObjectId(u64);

impl QueryObjectId {
    fn next() -> Self {
        Self(NEXT_QUERY_OBJECT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// How a joined query object is combined with its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Rows without a match are dropped.
    Inner,
    /// Rows without a match are kept with nulls.
    LeftOuter,
}

/// A join from a parent query object along one of its properties.
#[derive(Debug, Clone)]
pub struct QJoin {
    /// Join type.
    pub join_type: JoinType,
    /// Reference or to-many property of the parent.
    pub property: String,
    /// The joined query object.
    pub target: QueryObject,
}

/// Links a sub-query to the query object it is correlated with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correlation {
    /// The outer query object.
    pub parent: QueryObjectId,
    /// Entity type of the outer query object.
    pub parent_type: String,
    /// Property of the outer query object leading to the sub-query's type.
    pub property: String,
}

/// One `order by` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The ordered property.
    pub property: QProperty,
    /// Sort direction.
    pub ascending: bool,
}

/// A typed, composable query over one entity type.
#[derive(Debug, Clone)]
pub struct QueryObject {
    id: QueryObjectId,
    entity_type: String,
    projection: Option<Vec<String>>,
    joins: Vec<QJoin>,
    condition: Option<Condition>,
    order_by: Vec<OrderBy>,
    lock_mode: LockMode,
    correlation: Option<Correlation>,
}

impl QueryObject {
    /// Creates a query over `entity_type` selecting every mapped column.
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            id: QueryObjectId::next(),
            entity_type: entity_type.into(),
            projection: None,
            joins: Vec::new(),
            condition: None,
            order_by: Vec::new(),
            lock_mode: LockMode::None,
            correlation: None,
        }
    }

    /// Creates a sub-query correlated with `parent` through `property`.
    ///
    /// Embed it in a condition of the parent tree with
    /// [`Condition::exists`].
    pub fn sub_query(entity_type: impl Into<String>, parent: &Self, property: impl Into<String>) -> Self {
        let mut query = Self::new(entity_type);
        query.correlation = Some(Correlation {
            parent: parent.id,
            parent_type: parent.entity_type.clone(),
            property: property.into(),
        });
        query
    }

    /// Returns the identity of this query object.
    #[must_use]
    pub const fn id(&self) -> QueryObjectId {
        self.id
    }

    /// Returns the queried entity type name.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the explicitly selected properties; `None` selects all.
    #[must_use]
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    /// Returns the joins.
    #[must_use]
    pub fn joins(&self) -> &[QJoin] {
        &self.joins
    }

    /// Returns the condition.
    #[must_use]
    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Returns the ordering.
    #[must_use]
    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Returns the row locking mode.
    #[must_use]
    pub const fn lock_mode(&self) -> LockMode {
        self.lock_mode
    }

    /// Returns the correlation of a sub-query.
    #[must_use]
    pub fn correlation(&self) -> Option<&Correlation> {
        self.correlation.as_ref()
    }

    /// Returns `true` if the query object is joined on `property`.
    #[must_use]
    pub fn is_joined(&self, property: &str) -> bool {
        self.joins.iter().any(|j| j.property == property)
    }

    /// Returns a handle on one of this query object's properties.
    #[must_use]
    pub fn prop(&self, name: impl Into<String>) -> QProperty {
        QProperty::new(self.id, self.entity_type.clone(), name)
    }

    /// Restricts the projection to the named properties.
    ///
    /// Keys, optimistic locks, discriminators and foreign keys are always
    /// selected.
    pub fn select<I, S>(&mut self, properties: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(properties.into_iter().map(Into::into).collect());
        self
    }

    /// Inner joins `target` along `property`.
    pub fn join(&mut self, property: impl Into<String>, target: Self) -> &mut Self {
        self.add_join(JoinType::Inner, property.into(), target)
    }

    /// Left outer joins `target` along `property`.
    pub fn left_outer_join(&mut self, property: impl Into<String>, target: Self) -> &mut Self {
        self.add_join(JoinType::LeftOuter, property.into(), target)
    }

    fn add_join(&mut self, join_type: JoinType, property: String, target: Self) -> &mut Self {
        self.joins.push(QJoin {
            join_type,
            property,
            target,
        });
        self
    }

    /// ANDs `condition` into the existing condition.
    pub fn filter(&mut self, condition: Condition) -> &mut Self {
        self.condition = Some(match self.condition.take() {
            None => condition,
            Some(existing) => Condition::and([existing, condition]),
        });
        self
    }

    /// Appends an order by term.
    pub fn order_by(&mut self, property: QProperty, ascending: bool) -> &mut Self {
        self.order_by.push(OrderBy {
            property,
            ascending,
        });
        self
    }

    /// Sets the row locking mode of the top-level statement.
    pub fn lock(&mut self, mode: LockMode) -> &mut Self {
        self.lock_mode = mode;
        self
    }

    /// Visits this query object and every joined one, parents first.
    ///
    /// Sub-queries embedded in conditions are not visited.
    pub fn walk(&self) -> Vec<&Self> {
        let mut out = vec![self];
        for join in &self.joins {
            out.extend(join.target.walk());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::LogicalOp;

    #[test]
    fn ids_are_unique() {
        assert_ne!(QueryObject::new("A").id(), QueryObject::new("A").id());
    }

    #[test]
    fn filter_ands_conditions() {
        let mut q = QueryObject::new("A");
        let name = q.prop("name");
        q.filter(name.eq("x"));
        q.filter(name.is_not_null());
        match q.condition() {
            Some(Condition::Logical { op, children }) => {
                assert_eq!(*op, LogicalOp::And);
                assert_eq!(children.len(), 2);
            }
            other => panic!("unexpected condition {other:?}"),
        }
    }

    #[test]
    fn walk_is_pre_order() {
        let mut a = QueryObject::new("A");
        let mut b = QueryObject::new("B");
        let c = QueryObject::new("C");
        let d = QueryObject::new("D");
        b.join("c", c);
        a.left_outer_join("b", b);
        a.join("d", d);
        let types: Vec<&str> = a.walk().iter().map(|q| q.entity_type()).collect();
        assert_eq!(types, vec!["A", "B", "C", "D"]);
        assert!(a.is_joined("b"));
        assert!(!a.is_joined("c"));
    }

    #[test]
    fn sub_query_correlation() {
        let parent = QueryObject::new("Parent");
        let sub = QueryObject::sub_query("Child", &parent, "children");
        let corr = sub.correlation().unwrap();
        assert_eq!(corr.parent, parent.id());
        assert_eq!(corr.property, "children");
    }
}
