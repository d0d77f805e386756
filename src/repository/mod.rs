pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::filter::FindOptions;

pub use memory::{InMemoryRepository, InMemoryStore};
pub use postgres::{PgRepository, PgRepositoryFactory};

/// Failure reported by a storage backend. `code` and `errno` carry the
/// backend's own identifiers (SQLSTATE, `SQLITE_CONSTRAINT`, MySQL errno) so
/// the error classifier can recognise constraint violations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StorageError {
    pub code: Option<String>,
    pub errno: Option<i64>,
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { code: None, errno: None, message: message.into() }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_errno(mut self, errno: i64) -> Self {
        self.errno = Some(errno);
        self
    }
}

static PG_KEY_DETAIL: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"Key \(([^)]+)\)=").ok());

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        let sqlx::Error::Database(db_err) = &err else {
            return StorageError::new(err.to_string());
        };

        let mut message = db_err.message().to_string();
        if let Some(pg) = db_err.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
            // Name the offending column the way the classifier looks for it.
            let column = pg.column().map(str::to_string).or_else(|| {
                let detail = pg.detail()?;
                let re = PG_KEY_DETAIL.as_ref()?;
                Some(re.captures(detail)?.get(1)?.as_str().to_string())
            });
            if let Some(column) = column {
                if !message.contains(&format!("column \"{}\"", column)) {
                    message = format!("{} (column \"{}\")", message, column);
                }
            }
        }

        StorageError {
            code: db_err.code().map(|c| c.into_owned()),
            errno: None,
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindResult {
    pub data: Vec<Value>,
    pub total: u64,
}

/// Storage contract the CRUD actions are written against. Records are JSON
/// objects; ids travel as strings.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn find(&self, options: FindOptions) -> Result<FindResult, StorageError>;

    async fn find_one(&self, id: &str) -> Result<Option<Value>, StorageError>;

    async fn create(&self, data: Value) -> Result<Value, StorageError>;

    /// `Ok(None)` when no record has that id.
    async fn update(&self, id: &str, data: Value) -> Result<Option<Value>, StorageError>;

    /// Returns the deleted record.
    async fn delete(&self, id: &str) -> Result<Option<Value>, StorageError>;
}

/// Resolves a schema name (`api::user.user`) to its repository.
pub trait RepositoryFactory: Send + Sync {
    fn repository(&self, schema: &str) -> Result<Arc<dyn Repository>, StorageError>;
}

impl<F> RepositoryFactory for F
where
    F: Fn(&str) -> Result<Arc<dyn Repository>, StorageError> + Send + Sync,
{
    fn repository(&self, schema: &str) -> Result<Arc<dyn Repository>, StorageError> {
        self(schema)
    }
}

pub(crate) fn no_repository(schema: &str) -> StorageError {
    StorageError::new(format!("No repository registered for schema '{}'", schema))
}
