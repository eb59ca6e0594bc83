//! # Request-Query Parser
//!
//! Turns a flat set of query parameters into a [`QueryDescriptor`]. The
//! encoding is delimiter-joined triples for `filter`/`or`/`join`/`sort`
//! (`name||$cont||foo`), a JSON condition tree for `search`, and plain
//! integers for paging flags:
//!
//! ```text
//! ?fields=id,name&filter=name||$cont||foo&or=status||$eq||draft
//! &join=company||id,name&sort=id,DESC&limit=3&page=2&cache=0
//! ```
//!
//! Join `on`-conditions are semicolon-separated `field:$op:value` triples in
//! the third join segment: `join=company||id,name||kind:$eq:client`.
//!
//! Parsing is a pure transformation: every failure is a synchronous
//! [`CrudError`] naming the offending parameter, and no partial descriptor
//! is ever returned.

use crate::errors::CrudError;
use crate::condition::SearchCondition;
use crate::models::{QueryDescriptor, QueryFilter, QueryJoin, QuerySort, SortDirection};
use crate::operators::{CondOperator, CustomOperators};
use serde_json::Value;

/// Delimiter configuration for the triple-joined parameters.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Separates field/operator/value (default `||`)
    pub delimiter: String,
    /// Separates elements of array-typed values (default `,`)
    pub array_delimiter: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: "||".to_string(),
            array_delimiter: ",".to_string(),
        }
    }
}

/// Parses raw query parameters into a [`QueryDescriptor`].
#[derive(Debug, Clone, Default)]
pub struct RequestQueryParser {
    pub config: ParserConfig,
    /// Custom operators accepted in addition to the built-in grammar
    pub operators: CustomOperators,
}

impl RequestQueryParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_operators(mut self, operators: CustomOperators) -> Self {
        self.operators = operators;
        self
    }

    /// Parse `(name, value)` pairs as delivered by any HTTP layer (values
    /// already percent-decoded). Unknown parameter names are ignored, since
    /// host frameworks add their own.
    pub fn parse(&self, pairs: &[(String, String)]) -> Result<QueryDescriptor, CrudError> {
        let mut descriptor = QueryDescriptor::default();

        for (name, value) in pairs {
            match name.as_str() {
                "fields" | "select" => {
                    descriptor.fields.extend(
                        value
                            .split(self.config.array_delimiter.as_str())
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(ToString::to_string),
                    );
                }
                "filter" => descriptor.filters.push(self.parse_filter(name, value)?),
                "or" => descriptor.or_filters.push(self.parse_filter(name, value)?),
                "search" => {
                    let tree = SearchCondition::from_json(value, name)?;
                    self.validate_tree(&tree)?;
                    descriptor.search = Some(tree);
                }
                "join" => descriptor.joins.push(self.parse_join(value)?),
                "sort" => descriptor.sort.push(self.parse_sort(value)?),
                "limit" => descriptor.limit = Some(parse_integer(name, value)?),
                "offset" => descriptor.offset = Some(parse_integer(name, value)?),
                "page" => {
                    let page = parse_integer(name, value)?;
                    if page == 0 {
                        return Err(CrudError::parse(name, "page numbers start at 1"));
                    }
                    descriptor.page = Some(page);
                }
                "cache" => descriptor.cache_bypass = !parse_flag(name, value)?,
                "includeDeleted" => descriptor.include_deleted = parse_flag(name, value)?,
                _ => {}
            }
        }

        Ok(descriptor)
    }

    /// Convenience wrapper for an already percent-decoded query string.
    pub fn parse_query_string(&self, query: &str) -> Result<QueryDescriptor, CrudError> {
        let pairs: Vec<(String, String)> = query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| match part.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (part.to_string(), String::new()),
            })
            .collect();
        self.parse(&pairs)
    }

    fn parse_filter(&self, parameter: &str, raw: &str) -> Result<QueryFilter, CrudError> {
        let parts: Vec<&str> = raw.split(self.config.delimiter.as_str()).collect();
        let (field, token, raw_value) = match parts.as_slice() {
            [field, token] => (*field, *token, None),
            [field, token, value] => (*field, *token, Some(*value)),
            _ => {
                return Err(CrudError::parse(
                    parameter,
                    format!("expected field{d}operator{d}value, got '{raw}'", d = self.config.delimiter),
                ));
            }
        };
        if field.is_empty() {
            return Err(CrudError::parse(parameter, "empty field name"));
        }

        let operator = CondOperator::from_token(token)?;
        let arity = self.operators.arity(&operator)?;

        let value = match raw_value {
            None => Value::Null,
            Some(raw_value) => {
                if operator.takes_array_value() || matches!(arity, crate::operators::Arity::Array | crate::operators::Arity::Pair) {
                    Value::Array(
                        raw_value
                            .split(self.config.array_delimiter.as_str())
                            .filter(|s| !s.is_empty())
                            .map(parse_scalar)
                            .collect(),
                    )
                } else {
                    parse_scalar(raw_value)
                }
            }
        };

        if raw_value.is_none() && !matches!(arity, crate::operators::Arity::None) {
            return Err(CrudError::parse(
                parameter,
                format!("operator '{token}' requires a value"),
            ));
        }

        crate::operators::validate_value(&operator, arity, &value)?;
        Ok(QueryFilter::new(field, operator, value))
    }

    fn parse_join(&self, raw: &str) -> Result<QueryJoin, CrudError> {
        let parts: Vec<&str> = raw.split(self.config.delimiter.as_str()).collect();
        let (field, select, on) = match parts.as_slice() {
            [field] => (*field, None, None),
            [field, select] => (*field, Some(*select), None),
            [field, select, on] => (*field, Some(*select), Some(*on)),
            _ => {
                return Err(CrudError::parse(
                    "join",
                    format!("too many '{}' segments in '{raw}'", self.config.delimiter),
                ));
            }
        };
        if field.is_empty() {
            return Err(CrudError::parse("join", "empty relation field"));
        }

        let mut join = QueryJoin::new(field);
        if let Some(select) = select {
            join.select = select
                .split(self.config.array_delimiter.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        if let Some(on) = on {
            for triple in on.split(';').filter(|s| !s.is_empty()) {
                let mut it = triple.splitn(3, ':');
                let (Some(field), Some(token)) = (it.next(), it.next()) else {
                    return Err(CrudError::parse(
                        "join",
                        format!("on-condition '{triple}' must be field:operator:value"),
                    ));
                };
                let operator = CondOperator::from_token(token)?;
                let arity = self.operators.arity(&operator)?;
                let value = match it.next() {
                    Some(raw_value) if operator.takes_array_value() => Value::Array(
                        raw_value
                            .split(self.config.array_delimiter.as_str())
                            .filter(|s| !s.is_empty())
                            .map(parse_scalar)
                            .collect(),
                    ),
                    Some(raw_value) => parse_scalar(raw_value),
                    None => Value::Null,
                };
                crate::operators::validate_value(&operator, arity, &value)?;
                join.on.push(QueryFilter::new(field, operator, value));
            }
        }
        Ok(join)
    }

    fn parse_sort(&self, raw: &str) -> Result<QuerySort, CrudError> {
        // Accept both `field||DESC` and the compact `field,DESC`
        let parts: Vec<&str> = if raw.contains(self.config.delimiter.as_str()) {
            raw.split(self.config.delimiter.as_str()).collect()
        } else {
            raw.splitn(2, self.config.array_delimiter.as_str()).collect()
        };
        let (field, direction_token) = match parts.as_slice() {
            [field] => (field.trim(), ""),
            [field, direction] => (field.trim(), direction.trim()),
            _ => {
                return Err(CrudError::parse(
                    "sort",
                    format!("expected field and direction, got '{raw}'"),
                ));
            }
        };
        if field.is_empty() {
            return Err(CrudError::parse("sort", "empty field name"));
        }
        let direction = SortDirection::from_token(direction_token).ok_or_else(|| {
            CrudError::parse("sort", format!("unknown direction '{direction_token}'"))
        })?;
        Ok(QuerySort::new(field, direction))
    }

    /// Arity-check every `(operator, value)` pair in a search tree.
    fn validate_tree(&self, tree: &SearchCondition) -> Result<(), CrudError> {
        match tree {
            SearchCondition::And(children)
            | SearchCondition::Or(children)
            | SearchCondition::Not(children) => {
                for child in children {
                    self.validate_tree(child)?;
                }
                Ok(())
            }
            SearchCondition::Leaf(leaf) => {
                for (op, value) in leaf.all.iter().chain(leaf.any.iter()) {
                    self.operators.validate(op, value)?;
                }
                Ok(())
            }
        }
    }

    /// Canonical query-pair encoding of a descriptor. Re-parsing the output
    /// yields a structurally equal descriptor.
    #[must_use]
    pub fn to_query_pairs(&self, descriptor: &QueryDescriptor) -> Vec<(String, String)> {
        let d = self.config.delimiter.as_str();
        let a = self.config.array_delimiter.as_str();
        let mut pairs = Vec::new();

        if !descriptor.fields.is_empty() {
            pairs.push(("fields".to_string(), descriptor.fields.join(a)));
        }
        for (name, group) in [("filter", &descriptor.filters), ("or", &descriptor.or_filters)] {
            for filter in group {
                pairs.push((name.to_string(), self.encode_filter(filter)));
            }
        }
        if let Some(search) = &descriptor.search {
            pairs.push(("search".to_string(), search.to_value().to_string()));
        }
        for join in &descriptor.joins {
            let mut encoded = join.field.clone();
            if !join.select.is_empty() || !join.on.is_empty() {
                encoded.push_str(d);
                encoded.push_str(&join.select.join(a));
            }
            if !join.on.is_empty() {
                let on = join
                    .on
                    .iter()
                    .map(|f| {
                        format!("{}:{}:{}", f.field, f.operator.token(), scalar_to_string(&f.value, a))
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                encoded.push_str(d);
                encoded.push_str(&on);
            }
            pairs.push(("join".to_string(), encoded));
        }
        for sort in &descriptor.sort {
            pairs.push((
                "sort".to_string(),
                format!("{}{d}{}", sort.field, sort.direction.token()),
            ));
        }
        if let Some(limit) = descriptor.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(offset) = descriptor.offset {
            pairs.push(("offset".to_string(), offset.to_string()));
        }
        if let Some(page) = descriptor.page {
            pairs.push(("page".to_string(), page.to_string()));
        }
        if descriptor.cache_bypass {
            pairs.push(("cache".to_string(), "0".to_string()));
        }
        if descriptor.include_deleted {
            pairs.push(("includeDeleted".to_string(), "1".to_string()));
        }
        pairs
    }

    /// Canonical query-string encoding (no percent-encoding applied; the
    /// HTTP layer owns that).
    #[must_use]
    pub fn to_query_string(&self, descriptor: &QueryDescriptor) -> String {
        self.to_query_pairs(descriptor)
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn encode_filter(&self, filter: &QueryFilter) -> String {
        let d = self.config.delimiter.as_str();
        let a = self.config.array_delimiter.as_str();
        match &filter.value {
            Value::Null if filter.operator.arity() == crate::operators::Arity::None => {
                format!("{}{d}{}", filter.field, filter.operator.token())
            }
            value => format!(
                "{}{d}{}{d}{}",
                filter.field,
                filter.operator.token(),
                scalar_to_string(value, a)
            ),
        }
    }
}

/// Scalar coercion for delimiter-encoded values: integers, floats and
/// booleans become typed JSON values, everything else stays a string.
fn parse_scalar(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::from(f);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

fn scalar_to_string(value: &Value, array_delimiter: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| scalar_to_string(v, array_delimiter))
            .collect::<Vec<_>>()
            .join(array_delimiter),
        other => other.to_string(),
    }
}

fn parse_integer(parameter: &str, raw: &str) -> Result<u64, CrudError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| CrudError::parse(parameter, format!("'{raw}' is not a non-negative integer")))
}

fn parse_flag(parameter: &str, raw: &str) -> Result<bool, CrudError> {
    match raw.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(CrudError::parse(
            parameter,
            format!("'{other}' is not a boolean flag"),
        )),
    }
}
