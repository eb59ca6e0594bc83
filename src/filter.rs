//! # Sea-ORM Condition Translation
//!
//! Maps the engine-neutral [`SearchCondition`] tree onto `sea_query`
//! expressions for execution through Sea-ORM. Dotted field paths address
//! join columns (`company.name`). String values that parse as UUIDs are
//! bound as native UUIDs.
//!
//! Case-insensitive operators translate to `ILIKE` (and `LOWER(..) IN` for
//! list membership) and the array operators to Postgres `@>` / `&&`, so
//! those require a Postgres backend; the rest is portable. Custom operators
//! have no SQL rendering and fail with `UnsupportedOperator`; execute
//! those through the in-memory executor or a host-side rewrite.

use crate::condition::{FieldCondition, SearchCondition};
use crate::errors::CrudError;
use crate::models::SortDirection;
use crate::operators::CondOperator;
use sea_orm::{
    Condition,
    sea_query::{Alias, Expr, Func, Order, SimpleExpr, extension::postgres::PgExpr},
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Translate a condition tree into a Sea-ORM [`Condition`].
pub fn to_sea_condition(tree: &SearchCondition) -> Result<Condition, CrudError> {
    match tree {
        SearchCondition::And(children) => {
            let mut condition = Condition::all();
            for child in children {
                condition = condition.add(to_sea_condition(child)?);
            }
            Ok(condition)
        }
        SearchCondition::Or(children) => {
            let mut condition = Condition::any();
            for child in children {
                condition = condition.add(to_sea_condition(child)?);
            }
            Ok(condition)
        }
        SearchCondition::Not(children) => {
            let mut condition = Condition::all();
            for child in children {
                condition = condition.add(to_sea_condition(child)?);
            }
            Ok(condition.not())
        }
        SearchCondition::Leaf(leaf) => leaf_condition(leaf),
    }
}

fn leaf_condition(leaf: &FieldCondition) -> Result<Condition, CrudError> {
    let mut condition = Condition::all();
    for (op, value) in &leaf.all {
        condition = condition.add(predicate(&leaf.field, op, value)?);
    }
    if !leaf.any.is_empty() {
        let mut any = Condition::any();
        for (op, value) in &leaf.any {
            any = any.add(predicate(&leaf.field, op, value)?);
        }
        condition = condition.add(any);
    }
    Ok(condition)
}

/// Sort direction mapping for `QueryOrder::order_by`.
#[must_use]
pub fn to_sea_order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

/// Column reference for a possibly dotted field path.
fn column(field: &str) -> Expr {
    match field.rsplit_once('.') {
        Some((relation, name)) => Expr::col((Alias::new(relation), Alias::new(name))),
        None => Expr::col(Alias::new(field)),
    }
}

/// Bind a scalar JSON value, upgrading UUID-shaped strings to native UUIDs.
fn bind(value: &JsonValue) -> sea_orm::Value {
    match value {
        JsonValue::String(s) => match Uuid::parse_str(s) {
            Ok(uuid) => uuid.into(),
            Err(_) => s.clone().into(),
        },
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.into()
            } else {
                n.as_f64().unwrap_or_default().into()
            }
        }
        JsonValue::Bool(b) => (*b).into(),
        _ => sea_orm::Value::String(None),
    }
}

fn bind_all(value: &JsonValue) -> Vec<sea_orm::Value> {
    value
        .as_array()
        .map(|items| items.iter().map(bind).collect())
        .unwrap_or_default()
}

fn text(op: &CondOperator, value: &JsonValue) -> Result<String, CrudError> {
    match value {
        JsonValue::String(s) => Ok(s.clone()),
        JsonValue::Number(n) => Ok(n.to_string()),
        _ => Err(CrudError::invalid_operator_value(
            op.token(),
            "expected a string value",
        )),
    }
}

fn pair(op: &CondOperator, value: &JsonValue) -> Result<(sea_orm::Value, sea_orm::Value), CrudError> {
    match value.as_array().map(Vec::as_slice) {
        Some([low, high]) => Ok((bind(low), bind(high))),
        _ => Err(CrudError::invalid_operator_value(
            op.token(),
            "expected exactly 2 elements",
        )),
    }
}

/// Postgres array literal bound through placeholders, for `@>` / `&&`.
fn array_predicate(field: &str, sql_op: &str, value: &JsonValue) -> SimpleExpr {
    let values = bind_all(value);
    let placeholders = vec!["?"; values.len()].join(", ");
    let col = match field.rsplit_once('.') {
        Some((relation, name)) => format!("\"{relation}\".\"{name}\""),
        None => format!("\"{field}\""),
    };
    Expr::cust_with_values(format!("{col} {sql_op} ARRAY[{placeholders}]"), values)
}

fn lowered(op: &CondOperator, value: &JsonValue) -> Result<Vec<sea_orm::Value>, CrudError> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| text(op, item).map(|s| sea_orm::Value::from(s.to_lowercase())))
                .collect()
        })
        .unwrap_or_else(|| {
            Err(CrudError::invalid_operator_value(
                op.token(),
                "expected an array value",
            ))
        })
}

/// One engine-level predicate for a `(field, operator, value)` triple.
fn predicate(field: &str, op: &CondOperator, value: &JsonValue) -> Result<SimpleExpr, CrudError> {
    let col = column(field);
    let expr = match op {
        // Null equality means absence in SQL, not `= NULL`
        CondOperator::Eq if value.is_null() => col.is_null(),
        CondOperator::Ne if value.is_null() => col.is_not_null(),
        CondOperator::Eq => col.eq(bind(value)),
        CondOperator::Ne => col.ne(bind(value)),
        CondOperator::Gt => col.gt(bind(value)),
        CondOperator::Gte => col.gte(bind(value)),
        CondOperator::Lt => col.lt(bind(value)),
        CondOperator::Lte => col.lte(bind(value)),
        CondOperator::Starts => col.like(format!("{}%", text(op, value)?)),
        CondOperator::Ends => col.like(format!("%{}", text(op, value)?)),
        CondOperator::Cont => col.like(format!("%{}%", text(op, value)?)),
        CondOperator::Excl => col.not_like(format!("%{}%", text(op, value)?)),
        CondOperator::In => col.is_in(bind_all(value)),
        CondOperator::NotIn => col.is_not_in(bind_all(value)),
        CondOperator::IsNull => col.is_null(),
        CondOperator::NotNull => col.is_not_null(),
        CondOperator::Between => {
            let (low, high) = pair(op, value)?;
            col.between(low, high)
        }
        CondOperator::EqL => col.ilike(text(op, value)?),
        CondOperator::NeL => col.not_ilike(text(op, value)?),
        CondOperator::StartsL => col.ilike(format!("{}%", text(op, value)?)),
        CondOperator::EndsL => col.ilike(format!("%{}", text(op, value)?)),
        CondOperator::ContL => col.ilike(format!("%{}%", text(op, value)?)),
        CondOperator::ExclL => col.not_ilike(format!("%{}%", text(op, value)?)),
        CondOperator::InL => Expr::expr(Func::lower(column(field))).is_in(lowered(op, value)?),
        CondOperator::NotInL => {
            Expr::expr(Func::lower(column(field))).is_not_in(lowered(op, value)?)
        }
        CondOperator::ContArr => array_predicate(field, "@>", value),
        CondOperator::IntersectsArr => array_predicate(field, "&&", value),
        CondOperator::Custom(_) => {
            return Err(CrudError::unsupported_operator(op.token()));
        }
    };
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::sea_query::{PostgresQueryBuilder, Query};
    use serde_json::json;

    fn render(tree: &SearchCondition) -> String {
        let condition = to_sea_condition(tree).expect("translatable condition");
        Query::select()
            .column(Alias::new("id"))
            .from(Alias::new("t"))
            .cond_where(condition)
            .to_string(PostgresQueryBuilder)
    }

    fn parse(raw: &str) -> SearchCondition {
        SearchCondition::from_json(raw, "search").expect("valid search")
    }

    #[test]
    fn contains_renders_like() {
        let sql = render(&parse(r#"{"name": {"$cont": "foo"}}"#));
        assert!(sql.contains(r#""name" LIKE '%foo%'"#), "{sql}");
    }

    #[test]
    fn case_insensitive_contains_renders_ilike() {
        let sql = render(&parse(r#"{"name": {"$contL": "foo"}}"#));
        assert!(sql.contains(r#""name" ILIKE '%foo%'"#), "{sql}");
    }

    #[test]
    fn between_renders_inclusive_range() {
        let sql = render(&parse(r#"{"age": {"$between": [18, 65]}}"#));
        assert!(sql.contains(r#""age" BETWEEN 18 AND 65"#), "{sql}");
    }

    #[test]
    fn in_renders_membership() {
        let sql = render(&parse(r#"{"status": {"$in": ["a", "b"]}}"#));
        assert!(sql.contains(r#""status" IN ('a', 'b')"#), "{sql}");
    }

    #[test]
    fn null_checks_render() {
        let sql = render(&parse(r#"{"deleted_at": {"$isnull": true}}"#));
        assert!(sql.contains(r#""deleted_at" IS NULL"#), "{sql}");
    }

    #[test]
    fn null_equality_renders_null_checks() {
        let sql = render(&parse(r#"{"a": null}"#));
        assert!(sql.contains(r#""a" IS NULL"#), "{sql}");
        let sql = render(&parse(r#"{"a": {"$ne": null}}"#));
        assert!(sql.contains(r#""a" IS NOT NULL"#), "{sql}");
    }

    #[test]
    fn or_node_renders_disjunction() {
        let sql = render(&parse(r#"{"$or": [{"a": 1}, {"b": 2}]}"#));
        assert!(sql.contains("OR"), "{sql}");
    }

    #[test]
    fn not_node_negates() {
        let sql = render(&parse(r#"{"$not": [{"a": 1}]}"#));
        assert!(sql.contains("NOT"), "{sql}");
    }

    #[test]
    fn field_level_or_mixes_with_conjuncts() {
        let sql = render(&parse(
            r#"{"age": {"$gte": 18, "$or": {"$isnull": true}}}"#,
        ));
        assert!(sql.contains(">= 18"), "{sql}");
        assert!(sql.contains("IS NULL"), "{sql}");
    }

    #[test]
    fn dotted_fields_address_join_columns() {
        let sql = render(&parse(r#"{"company.name": {"$eq": "acme"}}"#));
        assert!(sql.contains(r#""company"."name" = 'acme'"#), "{sql}");
    }

    #[test]
    fn uuid_strings_bind_natively() {
        let sql = render(&parse(
            r#"{"id": {"$eq": "550e8400-e29b-41d4-a716-446655440000"}}"#,
        ));
        assert!(sql.contains("550e8400-e29b-41d4-a716-446655440000"), "{sql}");
    }

    #[test]
    fn array_containment_renders_postgres_operator() {
        let sql = render(&parse(r#"{"tags": {"$contArr": ["a", "b"]}}"#));
        assert!(sql.contains("@> ARRAY['a', 'b']"), "{sql}");
    }

    #[test]
    fn custom_operators_are_not_translatable() {
        let tree = SearchCondition::Leaf(crate::condition::FieldCondition::new(
            "location",
            CondOperator::Custom("near".into()),
            json!([1, 2]),
        ));
        assert!(to_sea_condition(&tree).is_err());
    }
}
