//! Lifecycle hooks attached to a schema.
//!
//! Controller hooks run inside the CRUD actions and may substitute the
//! payload or the result. Repository hooks run around the storage write and
//! are invoked by the repository implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::controller::{ControllerContext, HttpResponse};
use crate::repository::StorageError;

/// What a controller hook hands back.
///
/// `Response` is never forwarded to the client; the engine reports it as a
/// hook contract violation (500).
#[derive(Debug)]
pub enum HookOutcome {
    Unchanged,
    Data(Value),
    Response(HttpResponse),
}

impl From<Value> for HookOutcome {
    fn from(value: Value) -> Self {
        HookOutcome::Data(value)
    }
}

impl From<HttpResponse> for HookOutcome {
    fn from(response: HttpResponse) -> Self {
        HookOutcome::Response(response)
    }
}

#[async_trait]
pub trait ControllerHooks: Send + Sync {
    async fn before_create(&self, _ctx: &mut ControllerContext, _data: &Value) -> HookOutcome {
        HookOutcome::Unchanged
    }

    async fn after_create(&self, _ctx: &mut ControllerContext, _result: &Value) -> HookOutcome {
        HookOutcome::Unchanged
    }

    async fn before_update(&self, _ctx: &mut ControllerContext, _id: &str, _data: &Value) -> HookOutcome {
        HookOutcome::Unchanged
    }

    async fn after_update(&self, _ctx: &mut ControllerContext, _result: &Value) -> HookOutcome {
        HookOutcome::Unchanged
    }
}

#[async_trait]
pub trait RepositoryHooks: Send + Sync {
    async fn before_create(&self, data: Value) -> Result<Value, StorageError> {
        Ok(data)
    }

    async fn after_create(&self, _record: &Value) -> Result<(), StorageError> {
        Ok(())
    }

    async fn before_update(&self, _id: &str, data: Value) -> Result<Value, StorageError> {
        Ok(data)
    }

    async fn after_update(&self, _record: &Value) -> Result<(), StorageError> {
        Ok(())
    }
}
