//! # crudquery
//!
//! Request-query parsing, normalization and policy validation for CRUD
//! APIs. A raw query string like
//!
//! ```text
//! ?filter=name||$cont||foo&sort=id,DESC&limit=3
//! ```
//!
//! parses into an engine-agnostic [`QueryDescriptor`], is merged with
//! per-route static configuration into a [`NormalizedQuery`], and is then
//! handed to a storage executor (the bundled Sea-ORM translation in
//! [`filter`], the reference [`memory::MemoryExecutor`], or your own
//! [`CrudExecutor`]). In parallel, [`guard::PolicyGuard`] evaluates
//! hierarchical wildcard/entity-scoped policy grants against the request's
//! target resource.

pub mod condition;
pub mod errors;
pub mod filter;
pub mod guard;
pub mod identity;
pub mod memory;
pub mod models;
pub mod normalize;
pub mod operators;
pub mod pagination;
pub mod parse;
pub mod policy;
pub mod traits;

pub use errors::CrudError;
pub use models::{ListParams, PaginatedResponse, QueryDescriptor};
pub use normalize::{NormalizedQuery, QueryConfig, normalize};
pub use parse::RequestQueryParser;
pub use policy::{Policy, PolicyAction, validate_policies};
pub use traits::{CrudExecutor, ListResult};

pub use serde_with;
