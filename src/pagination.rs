//! Pagination helpers: offset/page math, the paginated envelope, and a
//! `Content-Range` header for hosts exposing range-style pagination.

use crate::models::PaginatedResponse;
use axum::http::header::HeaderMap;

/// Translate 1-based page pagination into an offset.
#[must_use]
pub fn page_offset(page: u64, limit: u64) -> u64 {
    page.saturating_sub(1).saturating_mul(limit)
}

/// Build the paginated envelope for one executed page.
///
/// `limit = None` means the whole result set was returned as a single page.
#[must_use]
pub fn paginate<T>(data: Vec<T>, total: u64, limit: Option<u64>, offset: u64) -> PaginatedResponse<T> {
    let count = data.len() as u64;
    let (page, page_count) = match limit {
        Some(limit) if limit > 0 => (offset / limit + 1, total.div_ceil(limit)),
        _ => (1, 1),
    };
    PaginatedResponse {
        data,
        count,
        total,
        page,
        page_count,
    }
}

/// Generate the Content-Range header for a page of results.
///
/// # Panics
///
/// Panics if the formatted range cannot be parsed into a header value,
/// which cannot happen for numeric inputs.
#[must_use]
pub fn calculate_content_range(
    offset: u64,
    limit: u64,
    total_count: u64,
    resource_name: &str,
) -> HeaderMap {
    let max_offset_limit = (offset + limit.saturating_sub(1)).min(total_count);
    let content_range = format!("{resource_name} {offset}-{max_offset_limit}/{total_count}");

    let mut headers = HeaderMap::new();
    headers.insert("Content-Range", content_range.parse().unwrap());
    headers
}
