//! Error types carried through a pipeline.
//!
//! Stages return [`StageResult`]. A failure is either a [`Failure`] (a
//! classified error that knows its HTTP status and what the client may see)
//! or an unclassified [`anyhow::Error`], which the boundary logs in full and
//! reports to the client as a generic 500.
//!
//! | Variant | Client sees |
//! |---|---|
//! | `Failure` (4xx) | status, message, fields |
//! | `Failure` (5xx) | status, message and fields unless suppressed |
//! | `Unclassified` | 500 with a generic message unless suppressed is off |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type returned by stages and terminal handlers.
pub type StageResult<T = ()> = Result<T, StageError>;

/// A classified failure with a status code and client-facing message.
///
/// # Example
///
/// ```
/// use ctxware_core::Failure;
/// use http::StatusCode;
///
/// let failure = Failure::bad_request("invalid payload").with_field("name", "required");
/// assert_eq!(failure.status(), StatusCode::BAD_REQUEST);
/// assert_eq!(failure.fields()["name"], "required");
/// ```
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} ({status})")]
pub struct Failure {
    status: StatusCode,
    message: String,
    fields: Map<String, Value>,
}

impl Failure {
    /// Creates a failure with an explicit status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: Map::new(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 409 Conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// 429 Too Many Requests.
    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attaches a structured field, replacing any previous value for `name`.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns the HTTP status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the structured fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Builds the client-facing body.
    ///
    /// With `suppress_internal` set, a 5xx failure reports only the canonical
    /// reason phrase and drops its fields.
    pub fn to_body(&self, suppress_internal: bool) -> FailureBody {
        if suppress_internal && self.status.is_server_error() {
            FailureBody::new(canonical_message(self.status))
        } else {
            FailureBody {
                message: self.message.clone(),
                fields: self.fields.clone(),
            }
        }
    }
}

/// Wire shape of an error response: `{"message": ..., "fields": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureBody {
    /// Human-readable message.
    pub message: String,
    /// Structured detail; omitted when empty.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

impl FailureBody {
    /// Creates a body without fields.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fields: Map::new(),
        }
    }
}

/// Returns the canonical reason phrase for `status`, or the numeric code.
pub fn canonical_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map_or_else(|| status.as_u16().to_string(), str::to_string)
}

/// Error returned by a stage or terminal handler.
#[derive(Debug, Error)]
pub enum StageError {
    /// A classified failure; its status and message reach the client.
    #[error(transparent)]
    Failure(#[from] Failure),

    /// Anything else; logged in full, reported to the client as a 500.
    #[error(transparent)]
    Unclassified(#[from] anyhow::Error),
}

impl StageError {
    /// Wraps any error as unclassified.
    pub fn unclassified<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unclassified(anyhow::Error::new(error))
    }

    /// Returns the status the client will see.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Failure(failure) => failure.status(),
            Self::Unclassified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for [`StageError::Failure`].
    pub fn is_classified(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the failure, if classified.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(failure) => Some(failure),
            Self::Unclassified(_) => None,
        }
    }
}
