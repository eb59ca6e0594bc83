//! Descriptor data model: the typed representation of a client's query
//! intent, plus the paginated response envelope and the OpenAPI-documented
//! query-parameter mirror.

use crate::condition::SearchCondition;
use crate::operators::CondOperator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};

/// A single `field||operator||value` predicate from `filter=` / `or=`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub field: String,
    pub operator: CondOperator,
    pub value: Value,
}

impl QueryFilter {
    #[must_use]
    pub fn new(field: impl Into<String>, operator: CondOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Sort direction, restricted to ASC/DESC (case-insensitive on parse).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
pub enum SortDirection {
    #[default]
    #[serde(rename = "ASC")]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortDirection {
    /// Parse a direction token; the empty string defaults to ascending.
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "" | "ASC" => Some(Self::Asc),
            "DESC" => Some(Self::Desc),
            _ => None,
        }
    }

    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One `sort=` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySort {
    pub field: String,
    pub direction: SortDirection,
}

impl QuerySort {
    #[must_use]
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }
}

/// One `join=` entry. Dot-separated field paths denote nested joins
/// (`company.projects`); `on` carries extra join conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryJoin {
    pub field: String,
    pub select: Vec<String>,
    pub on: Vec<QueryFilter>,
}

impl QueryJoin {
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            select: Vec::new(),
            on: Vec::new(),
        }
    }

    /// Parent path of a nested join (`"company.projects"` -> `"company"`).
    #[must_use]
    pub fn parent_path(&self) -> Option<&str> {
        self.field.rfind('.').map(|idx| &self.field[..idx])
    }
}

/// Parsed, engine-agnostic representation of one request's query
/// parameters. Built once per request by the parser, enriched once by the
/// normalizer, then handed to the executor; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDescriptor {
    /// `fields=`/`select=`: requested projection (unvalidated at this stage)
    pub fields: Vec<String>,
    /// `filter=` entries, implicitly AND-ed
    pub filters: Vec<QueryFilter>,
    /// `or=` entries, OR-ed as one group then AND-ed with the filter group
    pub or_filters: Vec<QueryFilter>,
    /// `search=`: JSON condition tree
    pub search: Option<SearchCondition>,
    /// `join=` entries in request order
    pub joins: Vec<QueryJoin>,
    /// `sort=` entries in request order
    pub sort: Vec<QuerySort>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    /// `cache=0` requests bypassing the executor's read cache
    pub cache_bypass: bool,
    /// `includeDeleted=1` overrides soft-delete visibility
    pub include_deleted: bool,
}

/// Paginated response envelope returned instead of a bare array whenever
/// pagination applies.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    /// Number of items in this page
    pub count: u64,
    /// Total items matching the query
    pub total: u64,
    /// 1-based page number
    pub page: u64,
    /// Total number of pages
    pub page_count: u64,
}

/// OpenAPI-facing mirror of the raw query parameters, for hosts that
/// document their list endpoints with utoipa. Parsing itself works on raw
/// `(name, value)` pairs so repeated parameters survive any HTTP layer.
#[skip_serializing_none]
#[derive(Debug, Default, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Projection, comma-separated field names.
    ///
    /// Example: `id,name`
    #[param(example = "id,name")]
    pub fields: Option<String>,
    /// Filter triple `field||operator||value`; repeatable, AND-ed.
    ///
    /// Example: `name||$cont||foo`
    #[param(example = "name||$cont||foo")]
    pub filter: Option<String>,
    /// Filter triple; repeatable, OR-ed as one group.
    #[param(example = "status||$eq||draft")]
    pub or: Option<String>,
    /// JSON-encoded condition tree.
    ///
    /// Example: `{"$or":[{"name":{"$cont":"foo"}},{"age":{"$gte":18}}]}`
    #[param(example = r#"{"name":{"$cont":"foo"}}"#)]
    pub search: Option<String>,
    /// Join spec `relation||comma-separated-select`; repeatable.
    #[param(example = "company||id,name")]
    pub join: Option<String>,
    /// Sort spec `field||direction` or `field,DIRECTION`; repeatable.
    #[param(example = "id,DESC")]
    pub sort: Option<String>,
    /// Maximum number of rows to return.
    #[param(example = 25)]
    pub limit: Option<u64>,
    /// Number of rows to skip.
    #[param(example = 0)]
    pub offset: Option<u64>,
    /// 1-based page number (alternative to offset).
    #[param(example = 1)]
    pub page: Option<u64>,
    /// `0` bypasses the executor's read cache for this request.
    #[param(example = 1)]
    pub cache: Option<u8>,
    /// `1` includes soft-deleted rows.
    #[serde(rename = "includeDeleted")]
    #[param(example = 0)]
    pub include_deleted: Option<u8>,
}

impl ListParams {
    /// Flatten into the `(name, value)` pairs the parser consumes.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                pairs.push((name.to_string(), value));
            }
        };
        push("fields", self.fields.clone());
        push("filter", self.filter.clone());
        push("or", self.or.clone());
        push("search", self.search.clone());
        push("join", self.join.clone());
        push("sort", self.sort.clone());
        push("limit", self.limit.map(|v| v.to_string()));
        push("offset", self.offset.map(|v| v.to_string()));
        push("page", self.page.map(|v| v.to_string()));
        push("cache", self.cache.map(|v| v.to_string()));
        push("includeDeleted", self.include_deleted.map(|v| v.to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_direction_tokens() {
        assert_eq!(SortDirection::from_token("asc"), Some(SortDirection::Asc));
        assert_eq!(SortDirection::from_token("DESC"), Some(SortDirection::Desc));
        assert_eq!(SortDirection::from_token(""), Some(SortDirection::Asc));
        assert_eq!(SortDirection::from_token("sideways"), None);
    }

    #[test]
    fn nested_join_parent_path() {
        assert_eq!(
            QueryJoin::new("company.projects").parent_path(),
            Some("company")
        );
        assert_eq!(QueryJoin::new("company").parent_path(), None);
    }

    #[test]
    fn list_params_flatten_in_order() {
        let params = ListParams {
            filter: Some("name||$cont||foo".into()),
            limit: Some(3),
            ..Default::default()
        };
        assert_eq!(
            params.to_pairs(),
            vec![
                ("filter".to_string(), "name||$cont||foo".to_string()),
                ("limit".to_string(), "3".to_string()),
            ]
        );
    }
}
