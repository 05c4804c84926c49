//! Query conditions.

use crate::query::{QueryObject, QueryObjectId};
use crate::types::Value;

/// Comparison operator of a property condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `like`
    Like,
    /// `is null`
    IsNull,
    /// `is not null`
    IsNotNull,
    /// `in (...)`
    In,
}

impl Operator {
    /// Returns the SQL text of the operator.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Like => "like",
            Self::IsNull => "is null",
            Self::IsNotNull => "is not null",
            Self::In => "in",
        }
    }
}

/// Logical combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// All children hold.
    And,
    /// Any child holds.
    Or,
}

/// A property of one query object in a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QProperty {
    query_object: QueryObjectId,
    entity_type: String,
    name: String,
}

#[allow(clippy::should_implement_trait)]
impl QProperty {
    pub(crate) fn new(query_object: QueryObjectId, entity_type: String, name: impl Into<String>) -> Self {
        Self {
            query_object,
            entity_type,
            name: name.into(),
        }
    }

    /// Returns the owning query object.
    #[must_use]
    pub const fn query_object(&self) -> QueryObjectId {
        self.query_object
    }

    /// Returns the entity type of the owning query object.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Returns the property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, operator: Operator, values: Vec<Value>) -> Condition {
        Condition::Property {
            property: self.clone(),
            operator,
            values,
        }
    }

    /// `property = value`
    #[must_use]
    pub fn eq(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Eq, vec![value.into()])
    }

    /// `property <> value`
    #[must_use]
    pub fn ne(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::NotEq, vec![value.into()])
    }

    /// `property > value`
    #[must_use]
    pub fn gt(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Greater, vec![value.into()])
    }

    /// `property >= value`
    #[must_use]
    pub fn ge(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::GreaterOrEqual, vec![value.into()])
    }

    /// `property < value`
    #[must_use]
    pub fn lt(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::Less, vec![value.into()])
    }

    /// `property <= value`
    #[must_use]
    pub fn le(&self, value: impl Into<Value>) -> Condition {
        self.compare(Operator::LessOrEqual, vec![value.into()])
    }

    /// `property like pattern`
    #[must_use]
    pub fn like(&self, pattern: impl Into<Value>) -> Condition {
        self.compare(Operator::Like, vec![pattern.into()])
    }

    /// `property is null`
    #[must_use]
    pub fn is_null(&self) -> Condition {
        self.compare(Operator::IsNull, Vec::new())
    }

    /// `property is not null`
    #[must_use]
    pub fn is_not_null(&self) -> Condition {
        self.compare(Operator::IsNotNull, Vec::new())
    }

    /// `property in (values...)`
    #[must_use]
    pub fn in_list<I, V>(&self, values: I) -> Condition
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.compare(Operator::In, values.into_iter().map(Into::into).collect())
    }
}

/// A boolean condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Compares a property with zero or more values.
    Property {
        /// The compared property.
        property: QProperty,
        /// The operator.
        operator: Operator,
        /// Operands; empty for null checks.
        values: Vec<Value>,
    },
    /// Combines children.
    Logical {
        /// The combinator.
        op: LogicalOp,
        /// The combined conditions.
        children: Vec<Condition>,
    },
    /// Negates a condition.
    Not(Box<Condition>),
    /// Holds when the correlated sub-query finds a row (or none, if negated).
    Exists {
        /// The correlated sub-query.
        sub_query: Box<QueryObject>,
        /// `not exists` when set.
        negated: bool,
    },
}

impl Condition {
    /// All conditions hold.
    pub fn and(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::Logical {
            op: LogicalOp::And,
            children: conditions.into_iter().collect(),
        }
    }

    /// Any condition holds.
    pub fn or(conditions: impl IntoIterator<Item = Self>) -> Self {
        Self::Logical {
            op: LogicalOp::Or,
            children: conditions.into_iter().collect(),
        }
    }

    /// The condition does not hold.
    #[must_use]
    pub fn negate(condition: Self) -> Self {
        Self::Not(Box::new(condition))
    }

    /// The correlated sub-query finds a row.
    #[must_use]
    pub fn exists(sub_query: QueryObject) -> Self {
        Self::Exists {
            sub_query: Box::new(sub_query),
            negated: false,
        }
    }

    /// The correlated sub-query finds no row.
    #[must_use]
    pub fn not_exists(sub_query: QueryObject) -> Self {
        Self::Exists {
            sub_query: Box::new(sub_query),
            negated: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_conditions() {
        let q = QueryObject::new("Book");
        let title = q.prop("title");
        match title.in_list(["a", "b"]) {
            Condition::Property {
                operator, values, ..
            } => {
                assert_eq!(operator, Operator::In);
                assert_eq!(values.len(), 2);
            }
            other => panic!("unexpected condition {other:?}"),
        }
        assert_eq!(Operator::NotEq.sql(), "<>");
        assert_eq!(title.query_object(), q.id());
    }
}
