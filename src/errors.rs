//! # Error Handling
//!
//! Every failure in this crate is synchronous, deterministic, and raised at
//! the point of detection. Each variant carries a machine-distinguishable
//! kind plus the offending parameter, field, or operator name, so the HTTP
//! layer can map it to a status code without string matching.
//!
//! Internal detail is logged via `tracing` and never sent to clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// Crate-wide error type with HTTP status mapping and sanitized responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrudError {
    /// 400 Bad Request - malformed query syntax (bad delimiter count,
    /// invalid JSON, bad enum value, non-numeric paging value)
    Parse {
        /// Query parameter that failed to parse (e.g. "filter", "sort")
        parameter: String,
        /// Human-readable reason
        reason: String,
    },

    /// 400 Bad Request - operator token unknown to the grammar
    UnsupportedOperator {
        /// The offending operator token (e.g. "$foo")
        operator: String,
    },

    /// 400 Bad Request - operator given a value of the wrong shape
    InvalidOperatorValue {
        /// Operator token (e.g. "$between")
        operator: String,
        /// Human-readable reason (e.g. "expected exactly 2 elements")
        reason: String,
    },

    /// 400 Bad Request - filter/sort/search references a field outside the
    /// allowed set
    InvalidField {
        /// The forbidden or unknown field name
        field: String,
    },

    /// 401 Unauthorized - request body and path params disagree on the
    /// target entity id (potential confused-deputy attempt)
    IdMismatch,

    /// 403 Forbidden - policy validation rejected the request
    Forbidden {
        /// User-facing message
        message: String,
    },
}

impl CrudError {
    pub fn parse(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }

    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    pub fn invalid_operator_value(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOperatorValue {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Parse { .. }
            | Self::UnsupportedOperator { .. }
            | Self::InvalidOperatorValue { .. }
            | Self::InvalidField { .. } => StatusCode::BAD_REQUEST,
            Self::IdMismatch => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }

    /// Stable machine-readable error kind for response bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::InvalidOperatorValue { .. } => "invalid_operator_value",
            Self::InvalidField { .. } => "invalid_field",
            Self::IdMismatch => "id_mismatch",
            Self::Forbidden { .. } => "forbidden",
        }
    }

    fn user_message(&self) -> String {
        match self {
            Self::Parse { parameter, reason } => {
                format!("Invalid query parameter '{parameter}': {reason}")
            }
            Self::UnsupportedOperator { operator } => {
                format!("Unsupported filter operator '{operator}'")
            }
            Self::InvalidOperatorValue { operator, reason } => {
                format!("Invalid value for operator '{operator}': {reason}")
            }
            Self::InvalidField { field } => {
                format!("Field '{field}' is not available for filtering or sorting")
            }
            Self::IdMismatch => "Requested id does not match".to_string(),
            Self::Forbidden { message } => message.clone(),
        }
    }
}

impl fmt::Display for CrudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for CrudError {}

/// JSON body sent to clients for all error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
    status: u16,
}

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_client_error() {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        } else {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        }

        let body = ErrorResponse {
            error: self.user_message(),
            kind: self.kind(),
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            CrudError::parse("limit", "not a number").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CrudError::unsupported_operator("$foo").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CrudError::IdMismatch.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            CrudError::forbidden("no policy").status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let err = CrudError::invalid_operator_value("$between", "expected exactly 2 elements");
        assert!(err.to_string().contains("$between"));
        let err = CrudError::invalid_field("secret");
        assert!(err.to_string().contains("secret"));
    }
}
