//! Error types for plan lifecycle operations.
//!
//! Every gate in the lifecycle controller fails with one [`PlanError`]
//! variant. Each variant maps to exactly one HTTP status and a
//! machine-readable code, and renders into an [`ErrorEnvelope`] for the
//! response body.
//!
//! | Variant | Status | Code |
//! |---|---|---|
//! | `NotFound` | 404 | `NOT_FOUND` |
//! | `AlreadyExists` | 409 | `ALREADY_EXISTS` |
//! | `InvalidInput` | 400 | `INVALID_INPUT` |
//! | `PreconditionMissing` | 400 | `PRECONDITION_MISSING` |
//! | `PreconditionFailed` | 412 | `PRECONDITION_FAILED` |
//! | `Unexpected` | 500 | `INTERNAL_ERROR` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::etag::ETag;
use crate::store::StoreError;

/// Result type alias using [`PlanError`].
pub type PlanResult<T> = Result<T, PlanError>;

/// Failure of a plan lifecycle operation.
#[derive(Error, Debug)]
pub enum PlanError {
    /// No live plan exists for the identifier.
    #[error("Invalid ObjectId! - {object_id}")]
    NotFound {
        /// The identifier that was looked up.
        object_id: String,
    },

    /// A plan with the identifier already exists.
    #[error("Plan already exist! - {object_id}")]
    AlreadyExists {
        /// The colliding identifier.
        object_id: String,
    },

    /// The request body is missing, malformed or fails the plan schema.
    #[error("{message}")]
    InvalidInput {
        /// Human-readable error message.
        message: String,
        /// Identifier the request targeted, if known.
        object_id: Option<String>,
        /// Individual schema violations.
        details: Vec<String>,
    },

    /// A conditional write was attempted without an `If-Match` token.
    #[error("Etag not provided in if-match header! - {object_id}")]
    PreconditionMissing {
        /// The identifier of the targeted plan.
        object_id: String,
    },

    /// The `If-Match` token does not name the current version.
    #[error("ETag mismatch for {object_id}, current version is {current}")]
    PreconditionFailed {
        /// The identifier of the targeted plan.
        object_id: String,
        /// The fingerprint that is current at the time of the check.
        current: ETag,
    },

    /// Store failure or any other fault not attributable to the caller.
    #[error("Something went wrong: {message}")]
    Unexpected {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PlanError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(object_id: impl Into<String>) -> Self {
        Self::NotFound {
            object_id: object_id.into(),
        }
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(object_id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            object_id: object_id.into(),
        }
    }

    /// Creates an invalid input error without schema details.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>, object_id: Option<&str>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            object_id: object_id.map(ToString::to_string),
            details: Vec::new(),
        }
    }

    /// Creates an invalid input error carrying schema violations.
    #[must_use]
    pub fn invalid_schema(object_id: Option<&str>, details: Vec<String>) -> Self {
        Self::InvalidInput {
            message: "Invalid Schema!".to_string(),
            object_id: object_id.map(ToString::to_string),
            details,
        }
    }

    /// Creates a precondition missing error.
    #[must_use]
    pub fn precondition_missing(object_id: impl Into<String>) -> Self {
        Self::PreconditionMissing {
            object_id: object_id.into(),
        }
    }

    /// Creates a precondition failed error.
    #[must_use]
    pub fn precondition_failed(object_id: impl Into<String>, current: ETag) -> Self {
        Self::PreconditionFailed {
            object_id: object_id.into(),
            current,
        }
    }

    /// Creates an unexpected error with a source error.
    pub fn unexpected(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Unexpected {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::AlreadyExists { .. } => StatusCode::CONFLICT,
            Self::InvalidInput { .. } | Self::PreconditionMissing { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::PreconditionFailed { .. } => StatusCode::PRECONDITION_FAILED,
            Self::Unexpected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists { .. } => "ALREADY_EXISTS",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::PreconditionMissing { .. } => "PRECONDITION_MISSING",
            Self::PreconditionFailed { .. } => "PRECONDITION_FAILED",
            Self::Unexpected { .. } => "INTERNAL_ERROR",
        }
    }

    /// Returns the identifier the failed request targeted, if known.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { object_id }
            | Self::AlreadyExists { object_id }
            | Self::PreconditionMissing { object_id }
            | Self::PreconditionFailed { object_id, .. } => Some(object_id),
            Self::InvalidInput { object_id, .. } => object_id.as_deref(),
            Self::Unexpected { .. } => None,
        }
    }

    /// Returns the current fingerprint carried by a precondition failure.
    #[must_use]
    pub const fn current_etag(&self) -> Option<&ETag> {
        match self {
            Self::PreconditionFailed { current, .. } => Some(current),
            _ => None,
        }
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// Unexpected faults are rendered with a generic message; their sources
    /// stay in the logs.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        let message = match self {
            Self::Unexpected { .. } => "Something went wrong!!".to_string(),
            other => other.to_string(),
        };
        let details = match self {
            Self::InvalidInput { details, .. } if !details.is_empty() => Some(details.clone()),
            _ => None,
        };

        ErrorEnvelope {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                object_id: self.object_id().map(ToString::to_string),
                current_etag: self.current_etag().map(|etag| etag.as_str().to_string()),
                details,
            },
            request_id: request_id.map(ToString::to_string),
        }
    }
}

impl From<StoreError> for PlanError {
    fn from(err: StoreError) -> Self {
        Self::unexpected("plan store failure", err)
    }
}

/// Serializable error envelope for HTTP responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// The identifier the request targeted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    /// The current fingerprint, on precondition failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_etag: Option<String>,
    /// Schema violations, on invalid input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PlanError::not_found("p1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(PlanError::already_exists("p1").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            PlanError::invalid_input("Invalid body!", None).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PlanError::precondition_missing("p1").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PlanError::precondition_failed("p1", ETag::from_stored("e")).status_code(),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn test_unexpected_is_internal_not_unauthorized() {
        let err = PlanError::unexpected("boom", std::io::Error::other("down"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_ne!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_unexpected_envelope_hides_source() {
        let err = PlanError::unexpected("redis timeout", std::io::Error::other("secret"));
        let envelope = err.to_envelope(None);
        assert_eq!(envelope.error.code, "INTERNAL_ERROR");
        assert!(!envelope.error.message.contains("secret"));
        assert!(!envelope.error.message.contains("redis"));
    }

    #[test]
    fn test_precondition_failed_envelope_carries_current() {
        let err = PlanError::precondition_failed("p1", ETag::from_stored("e2"));
        let envelope = err.to_envelope(Some("req-1"));
        assert_eq!(envelope.error.current_etag.as_deref(), Some("e2"));
        assert_eq!(envelope.error.object_id.as_deref(), Some("p1"));
        assert_eq!(envelope.request_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_schema_envelope_carries_details() {
        let err = PlanError::invalid_schema(Some("p1"), vec!["\"objectId\" is a required property".into()]);
        let json = serde_json::to_value(err.to_envelope(None)).unwrap();
        assert_eq!(json["error"]["code"], "INVALID_INPUT");
        assert_eq!(json["error"]["message"], "Invalid Schema!");
        assert_eq!(json["error"]["details"].as_array().map(Vec::len), Some(1));
        assert!(json.get("request_id").is_none());
    }

    #[test]
    fn test_not_found_message_names_object() {
        let err = PlanError::not_found("p9");
        assert_eq!(err.to_string(), "Invalid ObjectId! - p9");
        assert_eq!(err.object_id(), Some("p9"));
    }
}
