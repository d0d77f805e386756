// Controller error taxonomy and the JSON error wire shape
pub mod classifier;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::controller::HttpResponse;
use crate::repository::StorageError;
use crate::schema::ValidationIssue;

pub use classifier::{classify, constraint_kind, extract_field, ConstraintKind};

/// Machine-readable codes carried in `fields[].code`.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const INVALID_JSON: &str = "invalid_json";
    pub const INVALID_FORMAT: &str = "invalid_format";
    pub const EMPTY_DATA: &str = "empty_data";

    pub const DUPLICATE_ENTRY: &str = "duplicate_entry";
    pub const INVALID_REFERENCE: &str = "invalid_reference";
    pub const REQUIRED_FIELD: &str = "required_field";
    pub const CONSTRAINT_VIOLATION: &str = "constraint_violation";

    pub const NOT_FOUND: &str = "not_found";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";

    pub const INTERNAL_ERROR: &str = "internal_server_error";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl From<ValidationIssue> for FieldError {
    fn from(issue: ValidationIssue) -> Self {
        Self { field: issue.path, message: issue.message, code: issue.code }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// `{ "error": { message, statusCode, details?, fields?, example? } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                status_code,
                details: None,
                fields: None,
                example: None,
            },
        }
    }

    pub fn with_details(mut self, details: impl Into<Value>) -> Self {
        self.error.details = Some(details.into());
        self
    }

    /// An empty list leaves `fields` out of the body.
    pub fn with_fields(mut self, fields: Vec<FieldError>) -> Self {
        self.error.fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }

    pub fn with_example(mut self, example: Value) -> Self {
        self.error.example = Some(example);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.error.status_code
    }

    pub fn message(&self) -> &str {
        &self.error.message
    }

    pub fn unauthorized(details: impl Into<String>) -> Self {
        Self::new("Unauthorized", 401).with_details(details.into())
    }

    pub fn forbidden(details: impl Into<String>) -> Self {
        Self::new("Forbidden", 403).with_details(details.into())
    }

    pub fn not_found(id: Option<&str>) -> Self {
        let details = match id {
            Some(id) => format!("Resource with id \"{}\" not found", id),
            None => "Resource not found".to_string(),
        };
        Self::new("Not found", 404).with_details(details)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({"error": {"message": self.message(), "statusCode": self.status_code()}}))
    }

    pub fn to_http(&self) -> HttpResponse {
        HttpResponse::json(self.to_json(), self.status_code())
    }
}

impl From<ErrorResponse> for HttpResponse {
    fn from(err: ErrorResponse) -> Self {
        err.to_http()
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.error.message, self.error.status_code)
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

/// Which write a body belongs to; shapes the 400 messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

/// Everything a controller action can fail with. Actions turn these into
/// responses with [`classify`].
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Request body must contain a \"data\" field")]
    MissingData(Operation),

    #[error("Request data cannot be empty")]
    EmptyData(Operation),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Resource with id \"{0}\" not found")]
    NotFound(String),

    #[error("{hook} hook returned a response instead of data")]
    HookContractViolation { hook: &'static str },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unclassified(String),
}

impl ControllerError {
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        ControllerError::Validation(issues.into_iter().map(FieldError::from).collect())
    }
}
