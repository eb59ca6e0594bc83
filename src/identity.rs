//! # Resource-Identity Extraction
//!
//! Computes the entity id a request is targeting, from the path parameters
//! and the decoded body, using route-supplied getter functions. A request
//! that references one entity via the URL and a different one via the
//! payload is rejected before policy evaluation: entity-scoped grants must
//! not be satisfiable by smuggling a second id through the body.
//!
//! We do not care who the caller is here, only what they are trying to
//! access; deciding whether they may is the policy evaluator's job.

use crate::errors::CrudError;
use serde_json::{Map, Value};

/// Target entity id as referenced by a request. Normalized to a string so
/// it can be compared against grant-string suffixes.
pub type EntityId = String;

/// Route-supplied getter mapping a param/body map to a candidate id.
pub type IdGetter = fn(&Map<String, Value>) -> Option<EntityId>;

/// Getter for the common case of an `"id"` key holding a string or number.
#[must_use]
pub fn id_key_getter(map: &Map<String, Value>) -> Option<EntityId> {
    value_to_id(map.get("id")?)
}

/// Normalize a JSON value to an id string; empty strings and non-scalar
/// values count as absent.
#[must_use]
pub fn value_to_id(value: &Value) -> Option<EntityId> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Compute the target entity id from body and path params.
///
/// Both ids present and unequal fails with [`CrudError::IdMismatch`];
/// otherwise the body id wins over the params id.
pub fn extract_entity_id(
    params: &Map<String, Value>,
    body: &Map<String, Value>,
    get_id_from_params: IdGetter,
    get_id_from_body: IdGetter,
) -> Result<Option<EntityId>, CrudError> {
    let id_from_body = get_id_from_body(body);
    let id_from_params = get_id_from_params(params);

    if let (Some(from_body), Some(from_params)) = (&id_from_body, &id_from_params) {
        if from_body != from_params {
            return Err(CrudError::IdMismatch);
        }
    }

    Ok(id_from_body.or(id_from_params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn mismatched_ids_fail() {
        let err = extract_entity_id(
            &map(json!({"id": "5"})),
            &map(json!({"id": "7"})),
            id_key_getter,
            id_key_getter,
        )
        .unwrap_err();
        assert_eq!(err, CrudError::IdMismatch);
    }

    #[test]
    fn params_id_used_when_body_is_silent() {
        let id = extract_entity_id(
            &map(json!({"id": "5"})),
            &Map::new(),
            id_key_getter,
            id_key_getter,
        )
        .unwrap();
        assert_eq!(id.as_deref(), Some("5"));
    }

    #[test]
    fn body_wins_when_both_agree() {
        let id = extract_entity_id(
            &map(json!({"id": "5"})),
            &map(json!({"id": "5"})),
            id_key_getter,
            id_key_getter,
        )
        .unwrap();
        assert_eq!(id.as_deref(), Some("5"));
    }

    #[test]
    fn no_ids_is_none() {
        let id = extract_entity_id(&Map::new(), &Map::new(), id_key_getter, id_key_getter)
            .unwrap();
        assert_eq!(id, None);
    }

    #[test]
    fn numeric_ids_normalize_to_strings() {
        let id = extract_entity_id(
            &map(json!({"id": 42})),
            &Map::new(),
            id_key_getter,
            id_key_getter,
        )
        .unwrap();
        assert_eq!(id.as_deref(), Some("42"));
    }

    #[test]
    fn empty_string_id_counts_as_absent() {
        let id = extract_entity_id(
            &map(json!({"id": ""})),
            &Map::new(),
            id_key_getter,
            id_key_getter,
        )
        .unwrap();
        assert_eq!(id, None);
    }
}
