pub mod context;
pub mod crud;
pub mod response;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

pub use context::{
    BodyError, ContextStore, ControllerContext, FormData, FormDataParser, MemoryContextStore, NoFormDataParser,
    RequestFacet, ResponseFacet, UrlEncodedFormParser,
};
pub use crud::{build_core_controller, CoreAction, CORE_ACTIONS};
pub use response::{HttpResponse, ResponseBody};

/// A controller action: takes the request context, always produces a
/// response. Failures are turned into error responses inside the action.
#[async_trait]
pub trait Action: Send + Sync {
    async fn call(&self, ctx: &mut ControllerContext) -> HttpResponse;
}

struct FnAction<F>(F);

#[async_trait]
impl<F> Action for FnAction<F>
where
    F: for<'a> Fn(&'a mut ControllerContext) -> BoxFuture<'a, HttpResponse> + Send + Sync,
{
    async fn call(&self, ctx: &mut ControllerContext) -> HttpResponse {
        (self.0)(ctx).await
    }
}

/// Wraps a closure as an [`Action`]:
///
/// ```ignore
/// action_fn(|ctx| Box::pin(async move { ctx.res.json(json!({"ok": true}), 200) }))
/// ```
pub fn action_fn<F>(f: F) -> Arc<dyn Action>
where
    F: for<'a> Fn(&'a mut ControllerContext) -> BoxFuture<'a, HttpResponse> + Send + Sync + 'static,
{
    Arc::new(FnAction(f))
}

/// Named actions of one resource.
#[derive(Clone, Default)]
pub struct Controller {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn with(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.insert(name, action);
        self
    }

    /// Entries in `overrides` replace same-named actions; the rest are kept.
    pub fn extend(&mut self, overrides: HashMap<String, Arc<dyn Action>>) {
        self.actions.extend(overrides);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("actions", &self.names()).finish()
    }
}

/// Controllers keyed by schema name (`api::user.user`).
#[derive(Clone, Default, Debug)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Controller>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, controller: Controller) {
        self.controllers.insert(key.into(), controller);
    }

    pub fn get(&self, key: &str) -> Option<&Controller> {
        self.controllers.get(key)
    }

    pub fn extend(&mut self, other: ControllerRegistry) {
        self.controllers.extend(other.controllers);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.controllers.keys().map(String::as_str)
    }
}
