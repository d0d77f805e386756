//! Maps controller errors onto [`ErrorResponse`]s.
//!
//! Storage failures are recognised by backend signatures: SQLSTATE codes
//! (PostgreSQL), `SQLITE_CONSTRAINT` and message text (SQLite), errno
//! (MySQL).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use crate::config::AppConfig;
use crate::repository::StorageError;

use super::{codes, ControllerError, ErrorResponse, FieldError, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    ForeignKey,
    NotNull,
}

static FIELD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r#"(?i)column "([^"]+)""#, r"(?i)field '([^']+)'", r"`([^`]+)`", r"(?i)key '([^']+)'"]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

pub fn constraint_kind(err: &StorageError) -> Option<ConstraintKind> {
    let code = err.code.as_deref();
    let message = err.message.as_str();

    if code == Some("23505")
        || code == Some("SQLITE_CONSTRAINT")
        || err.errno == Some(1062)
        || message.contains("unique constraint")
        || message.contains("UNIQUE constraint")
    {
        return Some(ConstraintKind::Unique);
    }
    if code == Some("23503")
        || err.errno == Some(1452)
        || message.contains("foreign key constraint")
        || message.contains("FOREIGN KEY constraint")
    {
        return Some(ConstraintKind::ForeignKey);
    }
    if code == Some("23502") || err.errno == Some(1048) || message.contains("NOT NULL constraint") {
        return Some(ConstraintKind::NotNull);
    }
    None
}

/// First identifier quoted the way some backend quotes column names.
pub fn extract_field(message: &str) -> Option<String> {
    FIELD_PATTERNS
        .iter()
        .find_map(|re| re.captures(message))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn constraint_fields(kind: ConstraintKind, message: &str) -> Vec<FieldError> {
    let Some(field) = extract_field(message) else { return Vec::new() };
    let (message, code) = match kind {
        ConstraintKind::Unique => (format!("Value for \"{}\" already exists", field), codes::DUPLICATE_ENTRY),
        ConstraintKind::ForeignKey => (format!("Referenced {} does not exist", field), codes::INVALID_REFERENCE),
        ConstraintKind::NotNull => (format!("Field \"{}\" is required", field), codes::REQUIRED_FIELD),
    };
    vec![FieldError { field, message, code: code.to_string() }]
}

pub fn classify(err: &ControllerError, config: &AppConfig) -> ErrorResponse {
    match err {
        ControllerError::InvalidJson(_) => {
            ErrorResponse::new("Invalid JSON", 400).with_details("Request body must be valid JSON")
        }
        ControllerError::MissingData(operation) => {
            let example = match operation {
                Operation::Create => json!({"data": {"name": "John Doe", "email": "john@example.com"}}),
                Operation::Update => json!({"data": {"name": "Updated Name"}}),
            };
            ErrorResponse::new("Invalid request format", 400)
                .with_details("Request body must contain a \"data\" field")
                .with_example(example)
        }
        ControllerError::EmptyData(operation) => {
            let details = match operation {
                Operation::Create => "Request data cannot be empty",
                Operation::Update => "Update data cannot be empty",
            };
            ErrorResponse::new("Validation failed", 400).with_details(details)
        }
        ControllerError::Validation(fields) => ErrorResponse::new("Validation failed", 400)
            .with_details("Request data failed validation")
            .with_fields(fields.clone()),
        ControllerError::NotFound(id) => ErrorResponse::not_found(Some(id)),
        ControllerError::HookContractViolation { hook } => {
            tracing::error!("{} hook returned a response object; hooks must return data", hook);
            ErrorResponse::new("Hook contract violation", 500)
                .with_details(format!("{} hook must return data, not a response", hook))
        }
        ControllerError::Storage(storage) => match constraint_kind(storage) {
            Some(ConstraintKind::Unique) => ErrorResponse::new("Duplicate entry", 409)
                .with_details("A record with this value already exists")
                .with_fields(constraint_fields(ConstraintKind::Unique, &storage.message)),
            Some(ConstraintKind::ForeignKey) => ErrorResponse::new("Invalid reference", 400)
                .with_details("Referenced record does not exist")
                .with_fields(constraint_fields(ConstraintKind::ForeignKey, &storage.message)),
            Some(ConstraintKind::NotNull) => ErrorResponse::new("Missing required field", 400)
                .with_details("A required field is missing")
                .with_fields(constraint_fields(ConstraintKind::NotNull, &storage.message)),
            None => internal(&storage.message, config),
        },
        ControllerError::Unclassified(message) => internal(message, config),
    }
}

fn internal(message: &str, config: &AppConfig) -> ErrorResponse {
    tracing::error!("Unhandled controller error: {}", message);
    let response = ErrorResponse::new("Internal server error", 500);
    if config.errors.expose_internal_errors {
        response.with_details(message)
    } else {
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn storage(code: Option<&str>, errno: Option<i64>, message: &str) -> ControllerError {
        ControllerError::Storage(StorageError {
            code: code.map(String::from),
            errno,
            message: message.to_string(),
        })
    }

    fn dev() -> AppConfig {
        AppConfig::for_environment(Environment::Development)
    }

    #[test]
    fn unique_signatures_across_dialects() {
        let pg = classify(&storage(Some("23505"), None, "duplicate key value violates unique constraint \"users_email_key\""), &dev());
        assert_eq!((pg.status_code(), pg.message()), (409, "Duplicate entry"));
        assert!(pg.error.fields.is_none());

        let sqlite = classify(&storage(Some("SQLITE_CONSTRAINT"), None, "UNIQUE constraint failed: column \"email\""), &dev());
        assert_eq!(
            sqlite.error.fields,
            Some(vec![FieldError {
                field: "email".into(),
                message: "Value for \"email\" already exists".into(),
                code: "duplicate_entry".into(),
            }])
        );

        let mysql = classify(&storage(None, Some(1062), "Duplicate entry 'a@b' for key 'users.email'"), &dev());
        assert_eq!(mysql.status_code(), 409);
        assert_eq!(mysql.error.fields.unwrap()[0].field, "users.email");
    }

    #[test]
    fn foreign_key_and_not_null() {
        let fk = classify(&storage(None, Some(1452), "Cannot add row: FOREIGN KEY constraint `author_id`"), &dev());
        assert_eq!((fk.status_code(), fk.message()), (400, "Invalid reference"));
        assert_eq!(fk.error.fields.unwrap()[0].code, "invalid_reference");

        let nn = classify(&storage(Some("23502"), None, "null value in column \"name\" violates not-null constraint"), &dev());
        assert_eq!(nn.message(), "Missing required field");
        assert_eq!(nn.error.fields.unwrap()[0].message, "Field \"name\" is required");
    }

    #[test]
    fn internals_only_in_development() {
        let err = storage(None, None, "connection reset");
        assert_eq!(classify(&err, &dev()).error.details, Some(json!("connection reset")));

        let prod = AppConfig::for_environment(Environment::Production);
        let response = classify(&err, &prod);
        assert_eq!((response.status_code(), response.error.details.clone()), (500, None));
    }

    #[test]
    fn missing_data_carries_example() {
        let response = classify(&ControllerError::MissingData(Operation::Update), &dev());
        assert_eq!(response.message(), "Invalid request format");
        assert_eq!(response.error.example, Some(json!({"data": {"name": "Updated Name"}})));
    }
}
