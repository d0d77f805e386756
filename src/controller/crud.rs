//! The five standard actions generated for every schema.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{classify, codes, ControllerError, FieldError, Operation};
use crate::filter::{create_pagination_response, parse_find_options, Pagination};
use crate::repository::{Repository, RepositoryFactory};
use crate::schema::{HookOutcome, SchemaDescriptor};

use super::{Action, Controller, ControllerContext, HttpResponse};

pub const CORE_ACTIONS: [&str; 5] = ["find", "findOne", "create", "update", "delete"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreActionKind {
    Find,
    FindOne,
    Create,
    Update,
    Delete,
}

impl CoreActionKind {
    pub fn name(&self) -> &'static str {
        match self {
            CoreActionKind::Find => "find",
            CoreActionKind::FindOne => "findOne",
            CoreActionKind::Create => "create",
            CoreActionKind::Update => "update",
            CoreActionKind::Delete => "delete",
        }
    }
}

struct CoreState {
    schema: Arc<SchemaDescriptor>,
    repositories: Arc<dyn RepositoryFactory>,
    config: AppConfig,
}

pub struct CoreAction {
    kind: CoreActionKind,
    state: Arc<CoreState>,
}

/// Builds find/findOne/create/update/delete for `schema`. Entries in
/// `extensions` replace built-ins of the same name and add new ones.
pub fn build_core_controller(
    schema: Arc<SchemaDescriptor>,
    repositories: Arc<dyn RepositoryFactory>,
    config: AppConfig,
    extensions: Option<HashMap<String, Arc<dyn Action>>>,
) -> Controller {
    let state = Arc::new(CoreState { schema, repositories, config });
    let mut controller = Controller::new();
    for kind in [
        CoreActionKind::Find,
        CoreActionKind::FindOne,
        CoreActionKind::Create,
        CoreActionKind::Update,
        CoreActionKind::Delete,
    ] {
        controller.insert(kind.name(), Arc::new(CoreAction { kind, state: state.clone() }));
    }
    if let Some(extensions) = extensions {
        debug!("Extending {} controller with {:?}", state.schema.name(), extensions.keys().collect::<Vec<_>>());
        controller.extend(extensions);
    }
    controller
}

#[async_trait]
impl Action for CoreAction {
    async fn call(&self, ctx: &mut ControllerContext) -> HttpResponse {
        let result = match self.kind {
            CoreActionKind::Find => self.find(ctx).await,
            CoreActionKind::FindOne => self.find_one(ctx).await,
            CoreActionKind::Create => self.create(ctx).await,
            CoreActionKind::Update => self.update(ctx).await,
            CoreActionKind::Delete => self.delete(ctx).await,
        };
        match result {
            Ok(response) => response,
            Err(err) => {
                debug!("{} {} failed: {}", self.state.schema.name(), self.kind.name(), err);
                classify(&err, &self.state.config).to_http()
            }
        }
    }
}

impl CoreAction {
    fn repository(&self) -> Result<Arc<dyn Repository>, ControllerError> {
        Ok(self.state.repositories.repository(self.state.schema.name())?)
    }

    async fn find(&self, ctx: &mut ControllerContext) -> Result<HttpResponse, ControllerError> {
        let options = parse_find_options(ctx.req.query(), &self.state.config.pagination);
        if self.state.config.filter.debug_logging {
            debug!("find {} filters={:?} sort={:?}", self.state.schema.name(), options.filters, options.sort);
        }
        let Pagination { page, page_size } = options.pagination.unwrap_or(Pagination {
            page: 1,
            page_size: self.state.config.pagination.default_page_size,
        });

        let result = self.repository()?.find(options).await?;

        Ok(ctx.res.json(
            json!({
                "data": result.data,
                "meta": { "pagination": create_pagination_response(page, page_size, result.total) }
            }),
            200,
        ))
    }

    async fn find_one(&self, ctx: &mut ControllerContext) -> Result<HttpResponse, ControllerError> {
        let id = required_id(ctx)?;
        match self.repository()?.find_one(&id).await? {
            Some(data) => Ok(ctx.res.json(json!({ "data": data }), 200)),
            None => Err(ControllerError::NotFound(id)),
        }
    }

    async fn create(&self, ctx: &mut ControllerContext) -> Result<HttpResponse, ControllerError> {
        let mut data = request_data(ctx, Operation::Create)?;

        if let Some(validator) = self.state.schema.create_validator() {
            data = validator.validate(&data).map_err(ControllerError::validation)?;
        }

        let hooks = self.state.schema.controller_hooks().cloned();
        if let Some(hooks) = &hooks {
            let outcome = hooks.before_create(ctx, &data).await;
            data = apply_hook("beforeCreate", outcome, data)?;
        }

        let mut result = self.repository()?.create(data).await?;

        if let Some(hooks) = &hooks {
            let outcome = hooks.after_create(ctx, &result).await;
            result = apply_hook("afterCreate", outcome, result)?;
        }

        Ok(ctx.res.json(json!({ "data": result }), 201))
    }

    async fn update(&self, ctx: &mut ControllerContext) -> Result<HttpResponse, ControllerError> {
        let mut data = request_data(ctx, Operation::Update)?;
        let id = required_id(ctx)?;

        if let Some(validator) = self.state.schema.update_validator() {
            data = validator.validate(&data).map_err(ControllerError::validation)?;
        }

        let hooks = self.state.schema.controller_hooks().cloned();
        if let Some(hooks) = &hooks {
            let outcome = hooks.before_update(ctx, &id, &data).await;
            data = apply_hook("beforeUpdate", outcome, data)?;
        }

        let Some(mut result) = self.repository()?.update(&id, data).await? else {
            return Err(ControllerError::NotFound(id));
        };

        if let Some(hooks) = &hooks {
            let outcome = hooks.after_update(ctx, &result).await;
            result = apply_hook("afterUpdate", outcome, result)?;
        }

        Ok(ctx.res.json(json!({ "data": result }), 200))
    }

    async fn delete(&self, ctx: &mut ControllerContext) -> Result<HttpResponse, ControllerError> {
        let id = required_id(ctx)?;
        match self.repository()?.delete(&id).await? {
            Some(data) => Ok(ctx.res.json(json!({ "data": data }), 200)),
            None => Err(ControllerError::NotFound(id)),
        }
    }
}

fn required_id(ctx: &ControllerContext) -> Result<String, ControllerError> {
    match ctx.req.param("id") {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(ControllerError::Validation(vec![FieldError {
            field: "id".to_string(),
            message: "Path parameter \"id\" is required".to_string(),
            code: codes::REQUIRED_FIELD.to_string(),
        }])),
    }
}

/// `{"data": {...}}` with a non-empty object; anything else is a 400.
fn request_data(ctx: &ControllerContext, operation: Operation) -> Result<Value, ControllerError> {
    let body = ctx.req.json().map_err(|e| ControllerError::InvalidJson(e.to_string()))?;

    let data = match body.get("data") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Err(ControllerError::MissingData(operation)),
        Some(data) => data.clone(),
    };

    match &data {
        Value::Object(map) if map.is_empty() => Err(ControllerError::EmptyData(operation)),
        Value::Object(_) => Ok(data),
        _ => Err(ControllerError::Validation(vec![FieldError {
            field: "data".to_string(),
            message: "\"data\" must be an object".to_string(),
            code: codes::INVALID_FORMAT.to_string(),
        }])),
    }
}

fn apply_hook(hook: &'static str, outcome: HookOutcome, current: Value) -> Result<Value, ControllerError> {
    match outcome {
        HookOutcome::Unchanged => Ok(current),
        HookOutcome::Data(data) => Ok(data),
        HookOutcome::Response(response) => {
            warn!("{} hook returned a {} response; discarding it", hook, response.status);
            Err(ControllerError::HookContractViolation { hook })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_outcomes() {
        let current = json!({"a": 1});
        assert_eq!(apply_hook("beforeCreate", HookOutcome::Unchanged, current.clone()).unwrap(), current);
        assert_eq!(apply_hook("beforeCreate", json!({"b": 2}).into(), current.clone()).unwrap(), json!({"b": 2}));
        let err = apply_hook("afterUpdate", HttpResponse::status(204).into(), current).unwrap_err();
        assert!(matches!(err, ControllerError::HookContractViolation { hook: "afterUpdate" }));
    }

    #[test]
    fn body_shape_checks() {
        let ctx = ControllerContext::new("POST", "/").with_json(&json!({}));
        assert!(matches!(request_data(&ctx, Operation::Create), Err(ControllerError::MissingData(Operation::Create))));

        let ctx = ControllerContext::new("POST", "/").with_json(&json!({"data": {}}));
        assert!(matches!(request_data(&ctx, Operation::Create), Err(ControllerError::EmptyData(_))));

        let ctx = ControllerContext::new("POST", "/").with_body("not json");
        assert!(matches!(request_data(&ctx, Operation::Update), Err(ControllerError::InvalidJson(_))));
    }
}
