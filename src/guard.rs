//! # Policy Guard
//!
//! Ties identity extraction and policy evaluation together for one route:
//! the host calls [`PolicyGuard::check`] before dispatching a CRUD
//! operation, converting the evaluator's boolean verdict into the error
//! taxonomy (`IdMismatch` distinct from `Forbidden`).

use crate::errors::CrudError;
use crate::identity::{self, EntityId, IdGetter};
use crate::policy::{CrudOperation, Policy, route_policies, validate_policies};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Per-resource guard configuration.
#[derive(Debug, Clone)]
pub struct PolicyGuard {
    /// Required policies per operation; operations absent from the table
    /// require nothing
    pub routes: HashMap<CrudOperation, Vec<Policy>>,
    /// Optional id extractors; without them no entity-scoped grant can match
    pub extractors: Option<(IdGetter, IdGetter)>,
}

impl PolicyGuard {
    /// Guard with the default policy table for `policy_name` (read ops need
    /// `Read`, mutations `Write`, delete/recover `Manage`), merged key-wise
    /// with `overrides`.
    #[must_use]
    pub fn new(policy_name: &str, overrides: &HashMap<CrudOperation, Vec<Policy>>) -> Self {
        Self {
            routes: route_policies(policy_name, overrides),
            extractors: None,
        }
    }

    /// Install `(get_id_from_params, get_id_from_body)` extractors to
    /// enable entity-scoped grants.
    #[must_use]
    pub fn with_extractors(mut self, from_params: IdGetter, from_body: IdGetter) -> Self {
        self.extractors = Some((from_params, from_body));
        self
    }

    /// Target entity id for this request, validating body/params agreement.
    pub fn resource_id(
        &self,
        params: &Map<String, Value>,
        body: &Map<String, Value>,
    ) -> Result<Option<EntityId>, CrudError> {
        match self.extractors {
            Some((from_params, from_body)) => {
                identity::extract_entity_id(params, body, from_params, from_body)
            }
            None => Ok(None),
        }
    }

    /// Gate one operation. Errors with `IdMismatch` when body and params
    /// disagree, `Forbidden` when the caller's grants are insufficient.
    pub fn check(
        &self,
        operation: CrudOperation,
        params: &Map<String, Value>,
        body: &Map<String, Value>,
        granted: &[String],
    ) -> Result<(), CrudError> {
        let Some(required) = self.routes.get(&operation) else {
            return Ok(());
        };
        if required.is_empty() {
            return Ok(());
        }

        let entity_id = self.resource_id(params, body)?;

        if validate_policies(required, granted, entity_id.as_deref()) {
            Ok(())
        } else {
            Err(CrudError::forbidden("Insufficient policy"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::id_key_getter;
    use crate::policy::{PolicyAction, entity_grant, wildcard_grant};
    use serde_json::json;

    fn params(id: &str) -> Map<String, Value> {
        match json!({ "id": id }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn guard() -> PolicyGuard {
        PolicyGuard::new("company", &HashMap::new())
            .with_extractors(id_key_getter, id_key_getter)
    }

    #[test]
    fn wildcard_grant_passes_read() {
        let granted = vec![wildcard_grant("company", PolicyAction::Read)];
        assert!(guard()
            .check(CrudOperation::ReadOne, &params("1"), &Map::new(), &granted)
            .is_ok());
    }

    #[test]
    fn missing_grant_is_forbidden() {
        let granted = vec![wildcard_grant("user", PolicyAction::Manage)];
        let err = guard()
            .check(CrudOperation::ReadOne, &params("1"), &Map::new(), &granted)
            .unwrap_err();
        assert!(matches!(err, CrudError::Forbidden { .. }));
    }

    #[test]
    fn entity_scoped_grant_is_bound_to_the_request_target() {
        let granted = vec![entity_grant("company", PolicyAction::Write, "1")];
        let guard = guard();
        assert!(guard
            .check(CrudOperation::UpdateOne, &params("1"), &Map::new(), &granted)
            .is_ok());
        assert!(guard
            .check(CrudOperation::UpdateOne, &params("2"), &Map::new(), &granted)
            .is_err());
    }

    #[test]
    fn body_params_disagreement_is_unauthorized_not_forbidden() {
        let granted = vec![wildcard_grant("company", PolicyAction::Manage)];
        let err = guard()
            .check(CrudOperation::UpdateOne, &params("1"), &params("2"), &granted)
            .unwrap_err();
        assert_eq!(err, CrudError::IdMismatch);
    }

    #[test]
    fn unlisted_operation_requires_nothing() {
        let guard = PolicyGuard {
            routes: HashMap::new(),
            extractors: None,
        };
        assert!(guard
            .check(CrudOperation::ReadAll, &Map::new(), &Map::new(), &[])
            .is_ok());
    }
}
