//! Storage-executor seam. The core produces a [`NormalizedQuery`]; a
//! storage layer (Sea-ORM service, in-memory store, anything) consumes it
//! exactly once per request.

use crate::errors::CrudError;
use crate::normalize::NormalizedQuery;
use async_trait::async_trait;

/// Result of executing a normalized query.
#[derive(Debug, Clone)]
pub struct ListResult<T> {
    pub data: Vec<T>,
    /// Total rows matching the condition, ignoring limit/offset. `None`
    /// when the executor skipped counting (no pagination requested).
    pub total: Option<u64>,
}

/// A storage-layer query executor.
///
/// The executor owns caching: when `query.cache` carries a TTL it may serve
/// a cached read keyed by [`NormalizedQuery::cache_key`], must skip the
/// cache when `bypass` is set, and must invalidate an entity's cached reads
/// on any write to that entity.
#[async_trait]
pub trait CrudExecutor {
    type Item;

    async fn execute(&self, query: &NormalizedQuery) -> Result<ListResult<Self::Item>, CrudError>;
}
