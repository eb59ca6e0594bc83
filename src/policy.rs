//! # Policy Evaluation
//!
//! Hierarchical, wildcard-capable authorization over flat granted-policy
//! strings. A grant is serialized as `"<name>:<action-code>"` (wildcard,
//! applies to every instance of the resource) or
//! `"<name>:<action-code>:<entityId>"` (entity-scoped), with action codes
//! `r`/`w`/`m`. Policy names may be dotted (`"company.feed"`); a grant on
//! the top-level segment subsumes all of its sub-resources.
//!
//! Evaluation is a pure function. Returning `false` is not an error; the
//! guard layer converts it into a forbidden response.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Action tier, ordered by privilege: `Manage` ⊇ `Write` ⊇ `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyAction {
    Read,
    Write,
    Manage,
}

impl PolicyAction {
    /// Single-letter code used in grant strings.
    #[must_use]
    pub fn code(self) -> char {
        match self {
            Self::Read => 'r',
            Self::Write => 'w',
            Self::Manage => 'm',
        }
    }

    #[must_use]
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'r' => Some(Self::Read),
            'w' => Some(Self::Write),
            'm' => Some(Self::Manage),
            _ => None,
        }
    }

    /// Actions whose grants satisfy a requirement for `self`.
    fn subsuming(self) -> &'static [PolicyAction] {
        match self {
            Self::Read => &[Self::Manage, Self::Write, Self::Read],
            Self::Write => &[Self::Manage, Self::Write],
            Self::Manage => &[Self::Manage],
        }
    }
}

/// A named permission required by a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub name: String,
    pub action: PolicyAction,
}

impl Policy {
    #[must_use]
    pub fn new(name: impl Into<String>, action: PolicyAction) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }

    #[must_use]
    pub fn read(name: impl Into<String>) -> Self {
        Self::new(name, PolicyAction::Read)
    }

    #[must_use]
    pub fn write(name: impl Into<String>) -> Self {
        Self::new(name, PolicyAction::Write)
    }

    #[must_use]
    pub fn manage(name: impl Into<String>) -> Self {
        Self::new(name, PolicyAction::Manage)
    }
}

/// Serialize a wildcard grant: `"company:r"`.
#[must_use]
pub fn wildcard_grant(name: &str, action: PolicyAction) -> String {
    format!("{name}:{}", action.code())
}

/// Serialize an entity-scoped grant: `"company:r:42"`.
#[must_use]
pub fn entity_grant(name: &str, action: PolicyAction, entity_id: &str) -> String {
    format!("{name}:{}:{entity_id}", action.code())
}

/// Whether the granted strings contain a grant for `name` whose action
/// subsumes `action`, optionally scoped to `entity_id`.
#[must_use]
pub fn validate_policy_wildcard(
    granted: &[String],
    name: &str,
    action: PolicyAction,
    entity_id: Option<&str>,
) -> bool {
    action.subsuming().iter().any(|grant_action| {
        let candidate = match entity_id {
            Some(id) => entity_grant(name, *grant_action, id),
            None => wildcard_grant(name, *grant_action),
        };
        granted.iter().any(|g| *g == candidate)
    })
}

fn top_level_segment(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

/// Whether every required policy is satisfied by the granted strings.
///
/// A single requirement `{name, action}` is satisfied by any of:
/// 1. a wildcard grant on `name`'s top-level segment,
/// 2. a wildcard grant on the full dotted `name`,
/// 3. an entity-scoped grant on the top-level segment for `entity_id`,
/// 4. an entity-scoped grant on the full `name` for `entity_id`,
///
/// each under action subsumption. The entity-scoped checks apply only when
/// a target id is present: a caller without a specific target can never
/// claim an entity-scoped grant.
#[must_use]
pub fn validate_policies(
    required: &[Policy],
    granted: &[String],
    entity_id: Option<&str>,
) -> bool {
    let entity_id = entity_id.filter(|id| !id.is_empty());

    required.iter().all(|Policy { name, action }| {
        if validate_policy_wildcard(granted, top_level_segment(name), *action, None) {
            return true;
        }
        if validate_policy_wildcard(granted, name, *action, None) {
            return true;
        }
        if let Some(id) = entity_id {
            if validate_policy_wildcard(granted, top_level_segment(name), *action, Some(id)) {
                return true;
            }
            if validate_policy_wildcard(granted, name, *action, Some(id)) {
                return true;
            }
        }
        false
    })
}

/// Generated CRUD route kinds, for keying per-operation policy tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrudOperation {
    ReadAll,
    ReadOne,
    CreateOne,
    CreateMany,
    UpdateOne,
    ReplaceOne,
    DeleteOne,
    RecoverOne,
}

impl CrudOperation {
    pub const ALL: [CrudOperation; 8] = [
        Self::ReadAll,
        Self::ReadOne,
        Self::CreateOne,
        Self::CreateMany,
        Self::UpdateOne,
        Self::ReplaceOne,
        Self::DeleteOne,
        Self::RecoverOne,
    ];

    /// Action tier the operation requires by default.
    #[must_use]
    pub fn default_action(self) -> PolicyAction {
        match self {
            Self::ReadAll | Self::ReadOne => PolicyAction::Read,
            Self::CreateOne | Self::CreateMany | Self::UpdateOne | Self::ReplaceOne => {
                PolicyAction::Write
            }
            Self::DeleteOne | Self::RecoverOne => PolicyAction::Manage,
        }
    }
}

/// Per-operation required policies: a default table for `policy_name`
/// merged key-wise with explicit overrides (an override replaces the whole
/// entry, no inheritance).
#[must_use]
pub fn route_policies(
    policy_name: &str,
    overrides: &HashMap<CrudOperation, Vec<Policy>>,
) -> HashMap<CrudOperation, Vec<Policy>> {
    let mut table = HashMap::new();
    for operation in CrudOperation::ALL {
        let policies = overrides.get(&operation).cloned().unwrap_or_else(|| {
            vec![Policy::new(policy_name, operation.default_action())]
        });
        table.insert(operation, policies);
    }
    table
}
