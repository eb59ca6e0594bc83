//! # Query Normalizer
//!
//! Merges a parsed [`QueryDescriptor`] with a route's static
//! [`QueryConfig`], producing the final [`NormalizedQuery`] handed to the
//! executor. Static configuration always wins: default filters are AND-ed
//! in front of request conditions and cannot be overridden, the join
//! allow-list bounds what can be eager-loaded, and the configured maximum
//! clamps the limit.
//!
//! Two deliberately different failure postures, preserved from the source
//! system: filtering or sorting on a field outside the allowed set is a
//! client error (`InvalidField`, 400), while requesting a join absent from
//! the allow-list is dropped silently (logged at debug) so that probing the
//! join surface does not leak schema details.

use crate::condition::{FieldCondition, SearchCondition};
use crate::errors::CrudError;
use crate::models::{QueryDescriptor, QueryFilter, QuerySort};
use std::collections::HashSet;

/// Fallback page size when pagination is forced but no limit is configured.
const DEFAULT_LIMIT: u64 = 25;

/// Static join allow-list entry.
#[derive(Debug, Clone, Default)]
pub struct JoinConfig {
    /// Always included, even when the request does not ask for it
    pub eager: bool,
    pub alias: Option<String>,
    /// Allow-list for the join's selected fields; `None` = any
    pub select: Option<Vec<String>>,
    /// INNER rather than LEFT join semantics downstream
    pub required: bool,
}

/// Static per-route query configuration.
#[derive(Debug, Clone, Default)]
pub struct QueryConfig {
    /// Fields a client may select/filter/sort on; empty = unrestricted
    pub allowed_fields: Vec<String>,
    /// Fields never exposed, regardless of `allowed_fields`
    pub excluded_fields: Vec<String>,
    /// Fields always selected, regardless of the requested projection
    pub persist_fields: Vec<String>,
    /// Primary-key fields, always selected
    pub primary_keys: Vec<String>,
    /// Default filter conditions, AND-ed with whatever the request sends
    pub filter: Vec<QueryFilter>,
    /// Sort applied when the request specifies none
    pub default_sort: Vec<QuerySort>,
    /// Join allow-list, in configuration order: `(path, config)`
    pub joins: Vec<(String, JoinConfig)>,
    pub default_limit: Option<u64>,
    pub max_limit: Option<u64>,
    /// Force a limit and the paginated envelope even for bare list requests
    pub always_paginate: bool,
    /// Whether the entity supports soft deletion at all
    pub soft_delete: bool,
    /// Read-cache TTL in seconds handed to the executor; `None` = no cache
    pub cache_ttl: Option<u64>,
}

impl QueryConfig {
    fn join_config(&self, path: &str) -> Option<&JoinConfig> {
        self.joins
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, cfg)| cfg)
    }

    fn is_field_allowed(&self, field: &str) -> bool {
        if self.excluded_fields.iter().any(|f| f == field) {
            return false;
        }
        // Dotted fields belong to a join; they are bounded by the join
        // allow-list instead of the scalar field set
        if let Some((relation, _)) = field.rsplit_once('.') {
            return self.join_config(relation).is_some();
        }
        self.allowed_fields.is_empty()
            || self.allowed_fields.iter().any(|f| f == field)
            || self.primary_keys.iter().any(|f| f == field)
            || self.persist_fields.iter().any(|f| f == field)
    }
}

/// A join that survived allow-list resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJoin {
    pub path: String,
    pub alias: Option<String>,
    pub select: Vec<String>,
    pub eager: bool,
    pub required: bool,
    pub on: Vec<QueryFilter>,
}

/// Cache applicability emitted to the executor; storage and invalidation
/// are the executor's contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheDirective {
    /// Request asked to skip the read cache (`cache=0`)
    pub bypass: bool,
    /// Configured TTL in seconds; `None` = caching disabled for the route
    pub ttl: Option<u64>,
}

/// Final, validated query handed to the storage executor. Consumed exactly
/// once; never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    /// Final projection; empty = all fields
    pub fields: Vec<String>,
    /// Composed condition: static filter AND request conditions
    pub condition: Option<SearchCondition>,
    pub joins: Vec<ResolvedJoin>,
    pub sort: Vec<QuerySort>,
    pub limit: Option<u64>,
    pub offset: u64,
    /// Whether to return the paginated envelope instead of a bare array
    pub paginate: bool,
    pub include_deleted: bool,
    pub cache: CacheDirective,
}

impl NormalizedQuery {
    /// Deterministic cache key for the executor's read cache, derived from
    /// the entity name and the query's canonical shape.
    #[must_use]
    pub fn cache_key(&self, entity: &str) -> String {
        let condition = self
            .condition
            .as_ref()
            .map(|c| c.to_value().to_string())
            .unwrap_or_default();
        let joins = self
            .joins
            .iter()
            .map(|j| j.path.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let sort = self
            .sort
            .iter()
            .map(|s| format!("{}.{}", s.field, s.direction.token()))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{entity}?f={}&c={condition}&j={joins}&s={sort}&l={}&o={}&d={}",
            self.fields.join(","),
            self.limit.map(|l| l.to_string()).unwrap_or_default(),
            self.offset,
            u8::from(self.include_deleted),
        )
    }
}

/// Merge a request descriptor with route configuration.
pub fn normalize(
    descriptor: &QueryDescriptor,
    config: &QueryConfig,
) -> Result<NormalizedQuery, CrudError> {
    validate_fields(descriptor, config)?;

    Ok(NormalizedQuery {
        fields: select_fields(descriptor, config),
        condition: compose_condition(descriptor, config),
        joins: resolve_joins(descriptor, config),
        sort: if descriptor.sort.is_empty() {
            config.default_sort.clone()
        } else {
            descriptor.sort.clone()
        },
        limit: effective_limit(descriptor, config),
        offset: effective_offset(descriptor, config),
        paginate: config.always_paginate
            || descriptor.page.is_some()
            || descriptor.offset.is_some(),
        include_deleted: config.soft_delete && descriptor.include_deleted,
        cache: CacheDirective {
            bypass: descriptor.cache_bypass,
            ttl: config.cache_ttl,
        },
    })
}

/// Every field referenced by filter/or/search/sort must be in the allowed
/// set. Stricter than join resolution: filtering on a forbidden field is a
/// client error worth surfacing.
fn validate_fields(descriptor: &QueryDescriptor, config: &QueryConfig) -> Result<(), CrudError> {
    let mut referenced: Vec<&str> = Vec::new();
    for filter in descriptor.filters.iter().chain(&descriptor.or_filters) {
        referenced.push(&filter.field);
    }
    if let Some(search) = &descriptor.search {
        search.collect_fields(&mut referenced);
    }
    for sort in &descriptor.sort {
        referenced.push(&sort.field);
    }

    for field in referenced {
        if !config.is_field_allowed(field) {
            return Err(CrudError::invalid_field(field));
        }
    }
    Ok(())
}

/// Requested ∩ allowed (or the whole allowed set), always unioned with
/// primary-key and persisted fields.
fn select_fields(descriptor: &QueryDescriptor, config: &QueryConfig) -> Vec<String> {
    let mut fields: Vec<String> = if descriptor.fields.is_empty() {
        config.allowed_fields.clone()
    } else if config.allowed_fields.is_empty() {
        descriptor
            .fields
            .iter()
            .filter(|f| !config.excluded_fields.contains(f))
            .cloned()
            .collect()
    } else {
        descriptor
            .fields
            .iter()
            .filter(|f| {
                config.allowed_fields.contains(f) && !config.excluded_fields.contains(f)
            })
            .cloned()
            .collect()
    };

    // Primary keys and persisted fields bypass selection filtering
    let mut seen: HashSet<&str> = fields.iter().map(String::as_str).collect();
    let mut forced: Vec<String> = Vec::new();
    for field in config.primary_keys.iter().chain(&config.persist_fields) {
        if !seen.contains(field.as_str()) {
            forced.push(field.clone());
            seen.insert(field.as_str());
        }
    }
    drop(seen);
    fields.extend(forced);
    fields
}

/// Static filter AND request filter group AND or-group AND search tree.
/// No semantic deduplication is attempted.
fn compose_condition(
    descriptor: &QueryDescriptor,
    config: &QueryConfig,
) -> Option<SearchCondition> {
    let mut conjuncts: Vec<SearchCondition> = Vec::new();

    for filter in config.filter.iter().chain(&descriptor.filters) {
        conjuncts.push(SearchCondition::Leaf(FieldCondition::new(
            filter.field.clone(),
            filter.operator.clone(),
            filter.value.clone(),
        )));
    }

    if !descriptor.or_filters.is_empty() {
        let mut alternatives: Vec<SearchCondition> = descriptor
            .or_filters
            .iter()
            .map(|filter| {
                SearchCondition::Leaf(FieldCondition::new(
                    filter.field.clone(),
                    filter.operator.clone(),
                    filter.value.clone(),
                ))
            })
            .collect();
        conjuncts.push(if alternatives.len() == 1 {
            alternatives.remove(0)
        } else {
            SearchCondition::Or(alternatives)
        });
    }

    if let Some(search) = &descriptor.search {
        conjuncts.push(search.clone());
    }

    match conjuncts.len() {
        0 => None,
        1 => conjuncts.pop(),
        _ => Some(SearchCondition::And(conjuncts)),
    }
}

/// Every eager join from config, then every requested join present in the
/// allow-list. Unlisted joins and nested joins with unresolvable ancestors
/// are dropped silently.
fn resolve_joins(descriptor: &QueryDescriptor, config: &QueryConfig) -> Vec<ResolvedJoin> {
    let mut resolved: Vec<ResolvedJoin> = Vec::new();

    for (path, join_config) in &config.joins {
        if join_config.eager {
            resolved.push(ResolvedJoin {
                path: path.clone(),
                alias: join_config.alias.clone(),
                select: join_config.select.clone().unwrap_or_default(),
                eager: true,
                required: join_config.required,
                on: Vec::new(),
            });
        }
    }

    for join in &descriptor.joins {
        if resolved.iter().any(|r| r.path == join.field) {
            continue;
        }
        let Some(join_config) = config.join_config(&join.field) else {
            tracing::debug!(join = %join.field, "requested join not in allow-list, dropping");
            continue;
        };
        // Nested joins need every ancestor segment resolvable; ancestors
        // that are themselves allow-listed are pulled in implicitly
        if let Some(parent) = join.parent_path() {
            if !ensure_ancestors(parent, config, &mut resolved) {
                tracing::debug!(join = %join.field, "ancestor join not resolvable, dropping");
                continue;
            }
        }
        resolved.push(ResolvedJoin {
            path: join.field.clone(),
            alias: join_config.alias.clone(),
            select: bounded_select(&join.select, join_config),
            eager: false,
            required: join_config.required,
            on: join.on.clone(),
        });
    }

    resolved
}

fn ensure_ancestors(
    path: &str,
    config: &QueryConfig,
    resolved: &mut Vec<ResolvedJoin>,
) -> bool {
    if let Some(parent) = path.rfind('.').map(|idx| &path[..idx]) {
        if !ensure_ancestors(parent, config, resolved) {
            return false;
        }
    }
    if resolved.iter().any(|r| r.path == path) {
        return true;
    }
    let Some(join_config) = config.join_config(path) else {
        return false;
    };
    resolved.push(ResolvedJoin {
        path: path.to_string(),
        alias: join_config.alias.clone(),
        select: join_config.select.clone().unwrap_or_default(),
        eager: false,
        required: join_config.required,
        on: Vec::new(),
    });
    true
}

/// Requested join fields bounded by the join's configured select list.
fn bounded_select(requested: &[String], join_config: &JoinConfig) -> Vec<String> {
    match (&join_config.select, requested.is_empty()) {
        (Some(allowed), true) => allowed.clone(),
        (Some(allowed), false) => requested
            .iter()
            .filter(|f| allowed.contains(f))
            .cloned()
            .collect(),
        (None, _) => requested.to_vec(),
    }
}

/// `min(requested ?? configured default, configured max)`; `always_paginate`
/// forces a limit even when the request omitted one.
fn effective_limit(descriptor: &QueryDescriptor, config: &QueryConfig) -> Option<u64> {
    let requested = descriptor.limit.or(config.default_limit);
    let requested = if requested.is_none() && config.always_paginate {
        Some(config.max_limit.unwrap_or(DEFAULT_LIMIT))
    } else {
        requested
    };
    match (requested, config.max_limit) {
        (Some(limit), Some(max)) => Some(limit.min(max)),
        (Some(limit), None) => Some(limit),
        (None, _) => None,
    }
}

/// Offset wins when both offset and page are present; otherwise page-based
/// pagination translates as `offset = (page - 1) * limit`.
fn effective_offset(descriptor: &QueryDescriptor, config: &QueryConfig) -> u64 {
    if let Some(offset) = descriptor.offset {
        return offset;
    }
    match (descriptor.page, effective_limit(descriptor, config)) {
        (Some(page), Some(limit)) => page.saturating_sub(1).saturating_mul(limit),
        _ => 0,
    }
}
