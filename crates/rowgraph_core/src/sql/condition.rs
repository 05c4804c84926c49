//! Condition rendering.

use crate::error::{CoreError, CoreResult};
use crate::query::{Condition, LogicalOp, Operator};
use crate::sql::{QueryParameter, SqlGenerator};
use std::fmt::Write;

impl SqlGenerator<'_> {
    /// Renders a condition tree, appending one parameter per `?` in text
    /// order.
    pub(crate) fn render_condition(
        &mut self,
        condition: &Condition,
        out: &mut String,
        params: &mut Vec<QueryParameter>,
    ) -> CoreResult<()> {
        match condition {
            Condition::Property {
                property,
                operator,
                values,
            } => {
                let (alias, node) = self.column_of(property.query_object(), property.name())?;
                let column = format!("{alias}.{}", node.column_name().unwrap_or_default());
                let node = node.clone();
                match operator {
                    Operator::IsNull | Operator::IsNotNull => {
                        let _ = write!(out, "{column} {}", operator.sql());
                    }
                    Operator::In if values.is_empty() => out.push_str("1 = 0"),
                    Operator::In => {
                        let markers = vec!["?"; values.len()].join(", ");
                        let _ = write!(out, "{column} in ({markers})");
                        params.extend(values.iter().map(|value| QueryParameter {
                            node: node.clone(),
                            value: value.clone(),
                        }));
                    }
                    _ => {
                        let [value] = values.as_slice() else {
                            return Err(CoreError::illegal_query_state(format!(
                                "'{column} {}' needs exactly one operand, got {}",
                                operator.sql(),
                                values.len()
                            )));
                        };
                        let _ = write!(out, "{column} {} ?", operator.sql());
                        params.push(QueryParameter {
                            node,
                            value: value.clone(),
                        });
                    }
                }
            }
            Condition::Logical { op, children } => {
                if children.is_empty() {
                    out.push_str(match op {
                        LogicalOp::And => "1 = 1",
                        LogicalOp::Or => "1 = 0",
                    });
                    return Ok(());
                }
                let separator = match op {
                    LogicalOp::And => " and ",
                    LogicalOp::Or => " or ",
                };
                out.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(separator);
                    }
                    self.render_condition(child, out, params)?;
                }
                out.push(')');
            }
            Condition::Not(inner) => {
                out.push_str("not (");
                self.render_condition(inner, out, params)?;
                out.push(')');
            }
            Condition::Exists { sub_query, negated } => {
                let sql = self.render(sub_query, None, params)?;
                if *negated {
                    out.push_str("not ");
                }
                let _ = write!(out, "exists ({sql})");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ColumnSpec, DefinitionsSet, EntityTypeSpec, NodeType, SemanticType};
    use crate::query::QueryObject;
    use crate::types::Value;
    use rowgraph_sql::{Capabilities, JdbcType};

    fn definitions() -> DefinitionsSet {
        DefinitionsSet::builder()
            .entity_type(
                EntityTypeSpec::new("T")
                    .table("T")
                    .key("id")
                    .node(NodeType::value("id", SemanticType::Long, ColumnSpec::new("ID", JdbcType::BigInt)))
                    .node(NodeType::value("name", SemanticType::String, ColumnSpec::new("NAME", JdbcType::Varchar))),
            )
            .build()
            .unwrap()
    }

    fn render(query: &QueryObject, condition: &Condition) -> CoreResult<(String, Vec<QueryParameter>)> {
        let defs = definitions();
        let mut generator = SqlGenerator::new(&defs, Capabilities::default());
        let mut params = Vec::new();
        generator.render(query, None, &mut params)?;
        let mut out = String::new();
        generator.render_condition(condition, &mut out, &mut params)?;
        Ok((out, params))
    }

    #[test]
    fn empty_logical_nodes() {
        let q = QueryObject::new("T");
        assert_eq!(render(&q, &Condition::and([])).unwrap().0, "1 = 1");
        assert_eq!(render(&q, &Condition::or([])).unwrap().0, "1 = 0");
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let q = QueryObject::new("T");
        let (sql, params) = render(&q, &q.prop("id").in_list(Vec::<i64>::new())).unwrap();
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());
    }

    #[test]
    fn negation_and_null_checks() {
        let q = QueryObject::new("T");
        let name = q.prop("name");
        let cond = Condition::negate(Condition::or([name.is_null(), name.eq("a")]));
        let (sql, params) = render(&q, &cond).unwrap();
        assert_eq!(sql, "not ((t0.NAME is null or t0.NAME = ?))");
        assert_eq!(params[0].value, Value::from("a"));
        assert_eq!(params[0].node.name(), "name");
    }

    #[test]
    fn unknown_property_is_rejected() {
        let q = QueryObject::new("T");
        let err = render(&q, &q.prop("missing").eq(1_i64)).unwrap_err();
        assert!(matches!(err, CoreError::IllegalQueryState { .. }));
    }

    #[test]
    fn foreign_query_object_is_rejected() {
        let q = QueryObject::new("T");
        let other = QueryObject::new("T");
        assert!(render(&q, &other.prop("id").eq(1_i64)).is_err());
    }
}
