//! # Condition Grammar
//!
//! The vocabulary of comparison operators a filter condition may use, their
//! value-arity requirements, and a pure scalar evaluator used by the
//! in-memory executor. Operator tokens are case-sensitive and match the
//! query-string encoding exactly (`$eq`, `$contL`, ...).

use crate::errors::CrudError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Value shape an operator requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No value (`$isnull`, `$notnull`); any supplied value is ignored
    None,
    /// A single scalar
    Scalar,
    /// A non-empty array
    Array,
    /// An array of exactly 2 elements (`$between`)
    Pair,
}

/// A comparison operator as it appears in filter triples and search trees.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CondOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Starts,
    Ends,
    Cont,
    Excl,
    In,
    NotIn,
    IsNull,
    NotNull,
    Between,
    // Case-insensitive variants
    EqL,
    NeL,
    StartsL,
    EndsL,
    ContL,
    ExclL,
    InL,
    NotInL,
    // Native array-column operators
    ContArr,
    IntersectsArr,
    /// Registered by name in a [`CustomOperators`] registry
    Custom(String),
}

impl CondOperator {
    /// Parse an operator token. Unknown tokens become [`CondOperator::Custom`]
    /// and are resolved against the registry when the condition is
    /// normalized; tokens not starting with `$` are rejected outright.
    pub fn from_token(token: &str) -> Result<Self, CrudError> {
        let op = match token {
            "$eq" => Self::Eq,
            "$ne" => Self::Ne,
            "$gt" => Self::Gt,
            "$gte" => Self::Gte,
            "$lt" => Self::Lt,
            "$lte" => Self::Lte,
            "$starts" => Self::Starts,
            "$ends" => Self::Ends,
            "$cont" => Self::Cont,
            "$excl" => Self::Excl,
            "$in" => Self::In,
            "$notin" => Self::NotIn,
            "$isnull" => Self::IsNull,
            "$notnull" => Self::NotNull,
            "$between" => Self::Between,
            "$eqL" => Self::EqL,
            "$neL" => Self::NeL,
            "$startsL" => Self::StartsL,
            "$endsL" => Self::EndsL,
            "$contL" => Self::ContL,
            "$exclL" => Self::ExclL,
            "$inL" => Self::InL,
            "$notinL" => Self::NotInL,
            "$contArr" => Self::ContArr,
            "$intersectsArr" => Self::IntersectsArr,
            other if other.starts_with('$') && other.len() > 1 => {
                Self::Custom(other.trim_start_matches('$').to_string())
            }
            other => return Err(CrudError::unsupported_operator(other)),
        };
        Ok(op)
    }

    /// Canonical query-string token.
    #[must_use]
    pub fn token(&self) -> String {
        match self {
            Self::Eq => "$eq".into(),
            Self::Ne => "$ne".into(),
            Self::Gt => "$gt".into(),
            Self::Gte => "$gte".into(),
            Self::Lt => "$lt".into(),
            Self::Lte => "$lte".into(),
            Self::Starts => "$starts".into(),
            Self::Ends => "$ends".into(),
            Self::Cont => "$cont".into(),
            Self::Excl => "$excl".into(),
            Self::In => "$in".into(),
            Self::NotIn => "$notin".into(),
            Self::IsNull => "$isnull".into(),
            Self::NotNull => "$notnull".into(),
            Self::Between => "$between".into(),
            Self::EqL => "$eqL".into(),
            Self::NeL => "$neL".into(),
            Self::StartsL => "$startsL".into(),
            Self::EndsL => "$endsL".into(),
            Self::ContL => "$contL".into(),
            Self::ExclL => "$exclL".into(),
            Self::InL => "$inL".into(),
            Self::NotInL => "$notinL".into(),
            Self::ContArr => "$contArr".into(),
            Self::IntersectsArr => "$intersectsArr".into(),
            Self::Custom(name) => format!("${name}"),
        }
    }

    /// Value-arity requirement. Custom operators report their registry flag
    /// through [`CustomOperators::arity`]; here they default to scalar.
    #[must_use]
    pub fn arity(&self) -> Arity {
        match self {
            Self::IsNull | Self::NotNull => Arity::None,
            Self::In
            | Self::NotIn
            | Self::InL
            | Self::NotInL
            | Self::ContArr
            | Self::IntersectsArr => Arity::Array,
            Self::Between => Arity::Pair,
            _ => Arity::Scalar,
        }
    }

    /// Whether string comparison is case-folded.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Self::EqL
                | Self::NeL
                | Self::StartsL
                | Self::EndsL
                | Self::ContL
                | Self::ExclL
                | Self::InL
                | Self::NotInL
        )
    }

    /// Whether the query-string value of a filter triple is comma-split
    /// into an array before validation.
    #[must_use]
    pub fn takes_array_value(&self) -> bool {
        matches!(self.arity(), Arity::Array | Arity::Pair)
    }
}

/// Enforce an operator's arity against a parsed value.
///
/// No-value operators accept (and ignore) anything. `$between` requires
/// exactly 2 elements; array operators require a non-empty array; scalar
/// operators reject arrays and objects.
pub fn validate_value(op: &CondOperator, arity: Arity, value: &Value) -> Result<(), CrudError> {
    match arity {
        Arity::None => Ok(()),
        Arity::Scalar => match value {
            Value::Array(_) | Value::Object(_) => Err(CrudError::invalid_operator_value(
                op.token(),
                "expected a scalar value",
            )),
            _ => Ok(()),
        },
        Arity::Array => match value {
            Value::Array(items) if !items.is_empty() => Ok(()),
            Value::Array(_) => Err(CrudError::invalid_operator_value(
                op.token(),
                "expected a non-empty array",
            )),
            _ => Err(CrudError::invalid_operator_value(
                op.token(),
                "expected an array value",
            )),
        },
        Arity::Pair => match value {
            Value::Array(items) if items.len() == 2 => Ok(()),
            _ => Err(CrudError::invalid_operator_value(
                op.token(),
                "expected exactly 2 elements",
            )),
        },
    }
}

/// Predicate function for a custom operator: `(row_value, condition_value)`.
pub type CustomPredicate = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// A host-registered operator, addressed as `$<name>` in query strings.
#[derive(Clone)]
pub struct CustomOperator {
    pub arity: Arity,
    pub predicate: CustomPredicate,
}

/// Registry of custom operators, consulted whenever a condition carries a
/// [`CondOperator::Custom`].
#[derive(Clone, Default)]
pub struct CustomOperators {
    ops: HashMap<String, CustomOperator>,
}

impl CustomOperators {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, arity: Arity, predicate: F)
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        self.ops.insert(
            name.into(),
            CustomOperator {
                arity,
                predicate: Arc::new(predicate),
            },
        );
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CustomOperator> {
        self.ops.get(name)
    }

    /// Arity for any operator, resolving custom ones against the registry.
    pub fn arity(&self, op: &CondOperator) -> Result<Arity, CrudError> {
        match op {
            CondOperator::Custom(name) => self
                .get(name)
                .map(|c| c.arity)
                .ok_or_else(|| CrudError::unsupported_operator(op.token())),
            _ => Ok(op.arity()),
        }
    }

    /// Validate a `(operator, value)` pair, including custom operators.
    pub fn validate(&self, op: &CondOperator, value: &Value) -> Result<(), CrudError> {
        let arity = self.arity(op)?;
        validate_value(op, arity, value)
    }
}

impl std::fmt::Debug for CustomOperators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomOperators")
            .field("names", &self.ops.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Loose scalar equality: numbers compare numerically, everything else by
/// value. `fold` lowercases both sides of a string comparison.
fn scalar_eq(a: &Value, b: &Value, fold: bool) -> bool {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return (x - y).abs() < f64::EPSILON;
    }
    if fold {
        if let (Value::String(x), Value::String(y)) = (a, b) {
            return x.to_lowercase() == y.to_lowercase();
        }
    }
    a == b
}

/// Partial ordering used by range operators and by the in-memory sorter.
/// Numbers order numerically, strings lexicographically; mixed or
/// non-orderable types compare as unordered.
#[must_use]
pub fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_f64(a), as_f64(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn string_pair(row: &Value, cond: &Value, fold: bool) -> Option<(String, String)> {
    match (row, cond) {
        (Value::String(r), Value::String(c)) => {
            if fold {
                Some((r.to_lowercase(), c.to_lowercase()))
            } else {
                Some((r.clone(), c.clone()))
            }
        }
        _ => None,
    }
}

fn in_list(row: &Value, cond: &Value, fold: bool) -> bool {
    cond.as_array()
        .is_some_and(|items| items.iter().any(|item| scalar_eq(row, item, fold)))
}

/// Evaluate one built-in operator against a row value. This is the pure
/// operator evaluator: no I/O, no side effects. Custom operators are
/// dispatched by the caller through the registry.
#[must_use]
pub fn matches(op: &CondOperator, row: &Value, cond: &Value) -> bool {
    match op {
        CondOperator::Eq => scalar_eq(row, cond, false),
        CondOperator::EqL => scalar_eq(row, cond, true),
        CondOperator::Ne => !scalar_eq(row, cond, false),
        CondOperator::NeL => !scalar_eq(row, cond, true),
        CondOperator::Gt => compare(row, cond) == Some(std::cmp::Ordering::Greater),
        CondOperator::Gte => matches!(
            compare(row, cond),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        ),
        CondOperator::Lt => compare(row, cond) == Some(std::cmp::Ordering::Less),
        CondOperator::Lte => matches!(
            compare(row, cond),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        ),
        CondOperator::Starts | CondOperator::StartsL => {
            string_pair(row, cond, op.is_case_insensitive())
                .is_some_and(|(r, c)| r.starts_with(&c))
        }
        CondOperator::Ends | CondOperator::EndsL => {
            string_pair(row, cond, op.is_case_insensitive()).is_some_and(|(r, c)| r.ends_with(&c))
        }
        CondOperator::Cont | CondOperator::ContL => {
            string_pair(row, cond, op.is_case_insensitive()).is_some_and(|(r, c)| r.contains(&c))
        }
        CondOperator::Excl | CondOperator::ExclL => {
            string_pair(row, cond, op.is_case_insensitive()).is_some_and(|(r, c)| !r.contains(&c))
        }
        CondOperator::In => in_list(row, cond, false),
        CondOperator::InL => in_list(row, cond, true),
        CondOperator::NotIn => !in_list(row, cond, false),
        CondOperator::NotInL => !in_list(row, cond, true),
        CondOperator::IsNull => row.is_null(),
        CondOperator::NotNull => !row.is_null(),
        CondOperator::Between => cond.as_array().is_some_and(|bounds| {
            bounds.len() == 2
                && matches!(
                    compare(row, &bounds[0]),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                )
                && matches!(
                    compare(row, &bounds[1]),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                )
        }),
        CondOperator::ContArr => match (row.as_array(), cond.as_array()) {
            (Some(haystack), Some(needles)) => needles
                .iter()
                .all(|n| haystack.iter().any(|h| scalar_eq(h, n, false))),
            _ => false,
        },
        CondOperator::IntersectsArr => match (row.as_array(), cond.as_array()) {
            (Some(haystack), Some(needles)) => needles
                .iter()
                .any(|n| haystack.iter().any(|h| scalar_eq(h, n, false))),
            _ => false,
        },
        CondOperator::Custom(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_round_trip() {
        for token in [
            "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$starts", "$ends", "$cont", "$excl",
            "$in", "$notin", "$isnull", "$notnull", "$between", "$eqL", "$neL", "$startsL",
            "$endsL", "$contL", "$exclL", "$inL", "$notinL", "$contArr", "$intersectsArr",
        ] {
            let op = CondOperator::from_token(token).expect("known token");
            assert_eq!(op.token(), token);
        }
    }

    #[test]
    fn unknown_token_without_dollar_fails() {
        assert!(CondOperator::from_token("cont").is_err());
        assert!(CondOperator::from_token("$").is_err());
    }

    #[test]
    fn between_requires_exactly_two() {
        let op = CondOperator::Between;
        assert!(validate_value(&op, op.arity(), &json!([1, 2])).is_ok());
        assert!(validate_value(&op, op.arity(), &json!([1])).is_err());
        assert!(validate_value(&op, op.arity(), &json!([1, 2, 3])).is_err());
        assert!(validate_value(&op, op.arity(), &json!(1)).is_err());
    }

    #[test]
    fn in_rejects_empty_array() {
        let op = CondOperator::In;
        assert!(validate_value(&op, op.arity(), &json!([])).is_err());
        assert!(validate_value(&op, op.arity(), &json!([1])).is_ok());
    }

    #[test]
    fn null_checks_ignore_values() {
        let op = CondOperator::IsNull;
        assert!(validate_value(&op, op.arity(), &json!("ignored")).is_ok());
        assert!(matches(&op, &Value::Null, &Value::Null));
        assert!(!matches(&op, &json!(1), &Value::Null));
    }

    #[test]
    fn case_insensitive_variants_fold() {
        assert!(matches(&CondOperator::EqL, &json!("Foo"), &json!("foo")));
        assert!(!matches(&CondOperator::Eq, &json!("Foo"), &json!("foo")));
        assert!(matches(&CondOperator::ContL, &json!("HELLO"), &json!("ell")));
    }

    #[test]
    fn array_containment() {
        let row = json!(["a", "b", "c"]);
        assert!(matches(&CondOperator::ContArr, &row, &json!(["a", "c"])));
        assert!(!matches(&CondOperator::ContArr, &row, &json!(["a", "d"])));
        assert!(matches(&CondOperator::IntersectsArr, &row, &json!(["d", "b"])));
        assert!(!matches(&CondOperator::IntersectsArr, &row, &json!(["d"])));
    }

    #[test]
    fn unregistered_custom_operator_fails_validation() {
        let registry = CustomOperators::new();
        let op = CondOperator::Custom("near".into());
        assert!(registry.validate(&op, &json!(1)).is_err());
    }

    #[test]
    fn registered_custom_operator_validates_by_its_arity() {
        let mut registry = CustomOperators::new();
        registry.register("near", Arity::Array, |_, _| true);
        let op = CondOperator::Custom("near".into());
        assert!(registry.validate(&op, &json!([1, 2])).is_ok());
        assert!(registry.validate(&op, &json!(5)).is_err());
    }
}
