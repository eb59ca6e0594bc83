//! # Condition Tree
//!
//! Recursive boolean structure over field-level predicates, matching the
//! JSON shape of the `search=` query parameter:
//!
//! ```json
//! {"$or": [
//!   {"name": {"$cont": "foo"}},
//!   {"age": {"$gte": 18, "$or": {"$isnull": true, "$lt": 65}}},
//!   {"status": "active"}
//! ]}
//! ```
//!
//! A leaf object maps field names to either a scalar (implicit `$eq`) or an
//! operator map; multiple field keys in one object are an implicit `$and`.
//! Inside a field's operator map, a `$or` key holds alternatives that are
//! OR-ed together and then AND-ed with the map's other entries.

use crate::errors::CrudError;
use crate::operators::CondOperator;
use serde_json::{Map, Value, json};

/// One field's predicate set within a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    /// Conjunctive predicates (every one must hold)
    pub all: Vec<(CondOperator, Value)>,
    /// Disjunctive predicates (at least one must hold, AND-ed with `all`)
    pub any: Vec<(CondOperator, Value)>,
}

impl FieldCondition {
    /// Implicit-equality leaf (`{"status": "active"}`).
    #[must_use]
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            all: vec![(CondOperator::Eq, value)],
            any: Vec::new(),
        }
    }

    #[must_use]
    pub fn new(field: impl Into<String>, operator: CondOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            all: vec![(operator, value)],
            any: Vec::new(),
        }
    }
}

/// Recursive boolean combination of field-level predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchCondition {
    And(Vec<SearchCondition>),
    Or(Vec<SearchCondition>),
    Not(Vec<SearchCondition>),
    Leaf(FieldCondition),
}

impl SearchCondition {
    /// Parse the JSON encoding of the `search=` parameter by recursive
    /// descent. The `parameter` name is only used in error messages.
    pub fn from_json(raw: &str, parameter: &str) -> Result<Self, CrudError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CrudError::parse(parameter, format!("invalid JSON: {e}")))?;
        Self::from_value(&value, parameter)
    }

    /// Parse an already-decoded JSON value into a condition tree.
    pub fn from_value(value: &Value, parameter: &str) -> Result<Self, CrudError> {
        let Value::Object(map) = value else {
            return Err(CrudError::parse(parameter, "condition must be a JSON object"));
        };

        // $and/$or/$not must be the object's only key
        if map.len() == 1 {
            if let Some(node) = Self::parse_node(map, parameter)? {
                return Ok(node);
            }
        }

        let mut leaves = Vec::with_capacity(map.len());
        for (field, spec) in map {
            if field.starts_with('$') {
                return Err(CrudError::parse(
                    parameter,
                    format!("'{field}' is not valid alongside field conditions"),
                ));
            }
            leaves.push(Self::Leaf(parse_field_condition(field, spec, parameter)?));
        }

        match leaves.len() {
            0 => Err(CrudError::parse(parameter, "empty condition object")),
            1 => Ok(leaves.remove(0)),
            _ => Ok(Self::And(leaves)),
        }
    }

    fn parse_node(map: &Map<String, Value>, parameter: &str) -> Result<Option<Self>, CrudError> {
        for (key, ctor) in [
            ("$and", Self::And as fn(Vec<Self>) -> Self),
            ("$or", Self::Or as fn(Vec<Self>) -> Self),
            ("$not", Self::Not as fn(Vec<Self>) -> Self),
        ] {
            if let Some(children) = map.get(key) {
                let Value::Array(items) = children else {
                    return Err(CrudError::parse(
                        parameter,
                        format!("'{key}' expects an array of conditions"),
                    ));
                };
                if items.is_empty() {
                    return Err(CrudError::parse(
                        parameter,
                        format!("'{key}' requires at least one condition"),
                    ));
                }
                let parsed = items
                    .iter()
                    .map(|item| Self::from_value(item, parameter))
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Some(ctor(parsed)));
            }
        }
        Ok(None)
    }

    /// Re-emit the canonical JSON encoding.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::And(children) => {
                // Plain field leaves collapse back into one object
                if children.iter().all(|c| matches!(c, Self::Leaf(_))) {
                    let mut map = Map::new();
                    for child in children {
                        if let Self::Leaf(leaf) = child {
                            map.insert(leaf.field.clone(), field_condition_value(leaf));
                        }
                    }
                    if map.len() == children.len() {
                        return Value::Object(map);
                    }
                }
                json!({ "$and": children.iter().map(Self::to_value).collect::<Vec<_>>() })
            }
            Self::Or(children) => {
                json!({ "$or": children.iter().map(Self::to_value).collect::<Vec<_>>() })
            }
            Self::Not(children) => {
                json!({ "$not": children.iter().map(Self::to_value).collect::<Vec<_>>() })
            }
            Self::Leaf(leaf) => {
                let mut map = Map::new();
                map.insert(leaf.field.clone(), field_condition_value(leaf));
                Value::Object(map)
            }
        }
    }

    /// Every field name referenced anywhere in the tree, for allowed-set
    /// validation by the normalizer.
    pub fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::And(children) | Self::Or(children) | Self::Not(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
            Self::Leaf(leaf) => out.push(&leaf.field),
        }
    }
}

fn parse_field_condition(
    field: &str,
    spec: &Value,
    parameter: &str,
) -> Result<FieldCondition, CrudError> {
    match spec {
        Value::Object(ops) => {
            let mut all = Vec::new();
            let mut any = Vec::new();
            for (token, value) in ops {
                if token == "$or" {
                    let Value::Object(alternatives) = value else {
                        return Err(CrudError::parse(
                            parameter,
                            format!("field '{field}': '$or' expects an operator map"),
                        ));
                    };
                    for (alt_token, alt_value) in alternatives {
                        any.push(parse_operator_entry(alt_token, alt_value)?);
                    }
                } else {
                    all.push(parse_operator_entry(token, value)?);
                }
            }
            if all.is_empty() && any.is_empty() {
                return Err(CrudError::parse(
                    parameter,
                    format!("field '{field}': empty operator map"),
                ));
            }
            Ok(FieldCondition {
                field: field.to_string(),
                all,
                any,
            })
        }
        // Arrays and nested objects are not valid implicit-equality values
        Value::Array(_) => Err(CrudError::parse(
            parameter,
            format!("field '{field}': array requires an explicit operator"),
        )),
        scalar => Ok(FieldCondition::eq(field, scalar.clone())),
    }
}

fn parse_operator_entry(token: &str, value: &Value) -> Result<(CondOperator, Value), CrudError> {
    let op = CondOperator::from_token(token)?;
    Ok((op, value.clone()))
}

fn field_condition_value(leaf: &FieldCondition) -> Value {
    // Bare implicit equality serializes back to the scalar form
    if leaf.any.is_empty() && leaf.all.len() == 1 && leaf.all[0].0 == CondOperator::Eq {
        return leaf.all[0].1.clone();
    }
    let mut map = Map::new();
    for (op, value) in &leaf.all {
        map.insert(op.token(), value.clone());
    }
    if !leaf.any.is_empty() {
        let mut or_map = Map::new();
        for (op, value) in &leaf.any {
            or_map.insert(op.token(), value.clone());
        }
        map.insert("$or".to_string(), Value::Object(or_map));
    }
    Value::Object(map)
}
