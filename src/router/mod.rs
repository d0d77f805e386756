//! Route mapping: declarative route specs + controllers + named middleware
//! become a flat list of executable [`RouteMapping`]s.

pub mod routes;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::controller::{Action, ControllerContext, ControllerRegistry, HttpResponse};
use crate::error::ErrorResponse;

pub use routes::{create_core_routes, create_custom_routes, CoreRouterOptions};

/// Name under which the authentication middleware is looked up.
pub const AUTH_MIDDLEWARE: &str = "auth";

/// A link in a route's middleware chain. Call `next.run(ctx)` to continue;
/// returning without it ends the request with the returned response.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, ctx: &mut ControllerContext, next: Next<'_>) -> HttpResponse;
}

/// The remainder of a chain, ending in the bound action.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    action: &'a Arc<dyn Action>,
}

impl<'a> Next<'a> {
    pub async fn run(self, ctx: &mut ControllerContext) -> HttpResponse {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next { chain: rest, action: self.action }).await,
            None => self.action.call(ctx).await,
        }
    }
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut ControllerContext, Next<'a>) -> BoxFuture<'a, HttpResponse> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ControllerContext, next: Next<'_>) -> HttpResponse {
        (self.0)(ctx, next).await
    }
}

pub fn middleware_fn<F>(f: F) -> Arc<dyn Middleware>
where
    F: for<'a> Fn(&'a mut ControllerContext, Next<'a>) -> BoxFuture<'a, HttpResponse> + Send + Sync + 'static,
{
    Arc::new(FnMiddleware(f))
}

/// Allow/deny guard evaluated before the route's middlewares.
#[async_trait]
pub trait Policy: Send + Sync {
    async fn allows(&self, ctx: &ControllerContext) -> bool;
}

struct FnPolicy<F>(F);

#[async_trait]
impl<F> Policy for FnPolicy<F>
where
    F: Fn(&ControllerContext) -> bool + Send + Sync,
{
    async fn allows(&self, ctx: &ControllerContext) -> bool {
        (self.0)(ctx)
    }
}

pub fn policy_fn<F>(f: F) -> Arc<dyn Policy>
where
    F: Fn(&ControllerContext) -> bool + Send + Sync + 'static,
{
    Arc::new(FnPolicy(f))
}

/// Runs a policy as a chain link; denial answers 403.
struct PolicyGuard {
    name: String,
    policy: Arc<dyn Policy>,
}

#[async_trait]
impl Middleware for PolicyGuard {
    async fn handle(&self, ctx: &mut ControllerContext, next: Next<'_>) -> HttpResponse {
        if self.policy.allows(ctx).await {
            return next.run(ctx).await;
        }
        debug!("Policy {} denied {} {}", self.name, ctx.req.method(), ctx.req.path());
        ErrorResponse::forbidden(format!("Policy \"{}\" denied the request", self.name)).to_http()
    }
}

/// Named middlewares and policies, filled at startup and read by
/// [`map_routes`].
#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    middlewares: HashMap<String, Arc<dyn Middleware>>,
    policies: HashMap<String, Arc<dyn Policy>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_middleware(&mut self, name: impl Into<String>, middleware: Arc<dyn Middleware>) {
        let name = name.into();
        debug!("Registered middleware {}", name);
        self.middlewares.insert(name, middleware);
    }

    pub fn register_policy(&mut self, name: impl Into<String>, policy: Arc<dyn Policy>) {
        let name = name.into();
        debug!("Registered policy {}", name);
        self.policies.insert(name, policy);
    }

    pub fn middleware(&self, name: &str) -> Option<Arc<dyn Middleware>> {
        self.middlewares.get(name).cloned()
    }

    pub fn policy(&self, name: &str) -> Option<Arc<dyn Policy>> {
        self.policies.get(name).cloned()
    }
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("middlewares", &self.middlewares.keys().collect::<Vec<_>>())
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Clone)]
pub enum MiddlewareRef {
    Named(String),
    Inline(Arc<dyn Middleware>),
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        MiddlewareRef::Named(name.to_string())
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        MiddlewareRef::Inline(middleware)
    }
}

#[derive(Clone)]
pub enum PolicyRef {
    Named(String),
    Inline(Arc<dyn Policy>),
}

impl From<&str> for PolicyRef {
    fn from(name: &str) -> Self {
        PolicyRef::Named(name.to_string())
    }
}

impl From<Arc<dyn Policy>> for PolicyRef {
    fn from(policy: Arc<dyn Policy>) -> Self {
        PolicyRef::Inline(policy)
    }
}

/// Per-route options. `auth: None` means authenticated.
#[derive(Clone, Default)]
pub struct RouteConfig {
    pub auth: Option<bool>,
    pub policies: Vec<PolicyRef>,
    pub middlewares: Vec<MiddlewareRef>,
}

impl RouteConfig {
    pub fn public() -> Self {
        Self { auth: Some(false), ..Self::default() }
    }

    pub fn auth(mut self, enabled: bool) -> Self {
        self.auth = Some(enabled);
        self
    }

    pub fn policy(mut self, policy: impl Into<PolicyRef>) -> Self {
        self.policies.push(policy.into());
        self
    }

    pub fn middleware(mut self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.middlewares.push(middleware.into());
        self
    }
}

/// One declarative route. `handler` is `"<controller key>.<action>"`.
#[derive(Clone)]
pub struct RouteSpec {
    pub method: String,
    pub path: String,
    pub handler: String,
    pub config: Option<RouteConfig>,
}

impl RouteSpec {
    pub fn new(method: impl Into<String>, path: impl Into<String>, handler: impl Into<String>) -> Self {
        Self { method: method.into(), path: path.into(), handler: handler.into(), config: None }
    }

    pub fn with_config(mut self, config: RouteConfig) -> Self {
        self.config = Some(config);
        self
    }
}

#[derive(Clone, Default)]
pub struct RouteDefinition {
    pub routes: Vec<RouteSpec>,
}

/// A resolved route, ready for an adapter to mount.
#[derive(Clone)]
pub struct RouteMapping {
    /// Lower-cased.
    pub method: String,
    pub path: String,
    pub handler: String,
    pub action: Arc<dyn Action>,
    /// Outermost first.
    pub middlewares: Vec<Arc<dyn Middleware>>,
}

impl RouteMapping {
    /// Runs the middleware chain and then the action.
    pub async fn dispatch(&self, ctx: &mut ControllerContext) -> HttpResponse {
        Next { chain: &self.middlewares, action: &self.action }.run(ctx).await
    }
}

impl fmt::Debug for RouteMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMapping")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("handler", &self.handler)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

pub enum HandlerResolution {
    Resolved(Arc<dyn Action>),
    UnresolvedControllerKey(String),
    UnresolvedAction { controller: String, action: String },
    MalformedHandler(String),
}

impl fmt::Debug for HandlerResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResolution::Resolved(_) => f.write_str("Resolved"),
            HandlerResolution::UnresolvedControllerKey(key) => write!(f, "UnresolvedControllerKey({key})"),
            HandlerResolution::UnresolvedAction { controller, action } => {
                write!(f, "UnresolvedAction({controller}.{action})")
            }
            HandlerResolution::MalformedHandler(handler) => write!(f, "MalformedHandler({handler})"),
        }
    }
}

/// `api::user.user.findOne` → (`api::user.user`, `findOne`);
/// `users.find` → (`users`, `find`). Anything else is malformed.
pub fn split_handler(handler: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = handler.split('.').collect();
    match parts.as_slice() {
        [namespace, name, action] => Some((format!("{namespace}.{name}"), action.to_string())),
        [key, action] => Some((key.to_string(), action.to_string())),
        _ => None,
    }
}

pub fn resolve_handler(handler: &str, controllers: &ControllerRegistry) -> HandlerResolution {
    let Some((key, action)) = split_handler(handler) else {
        return HandlerResolution::MalformedHandler(handler.to_string());
    };
    let Some(controller) = controllers.get(&key) else {
        return HandlerResolution::UnresolvedControllerKey(key);
    };
    match controller.get(&action) {
        Some(bound) => HandlerResolution::Resolved(bound),
        None => HandlerResolution::UnresolvedAction { controller: key, action },
    }
}

fn build_chain(config: Option<&RouteConfig>, registry: &MiddlewareRegistry) -> Vec<Arc<dyn Middleware>> {
    let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();

    if config.and_then(|c| c.auth) != Some(false) {
        match registry.middleware(AUTH_MIDDLEWARE) {
            Some(auth) => chain.push(auth),
            None => warn!("Auth enabled but no auth middleware registered"),
        }
    }

    let Some(config) = config else {
        return chain;
    };

    for policy in &config.policies {
        match policy {
            PolicyRef::Named(name) => match registry.policy(name) {
                Some(policy) => chain.push(Arc::new(PolicyGuard { name: name.clone(), policy })),
                None => warn!("Policy not found: {}", name),
            },
            PolicyRef::Inline(policy) => {
                chain.push(Arc::new(PolicyGuard { name: "inline".to_string(), policy: policy.clone() }))
            }
        }
    }

    for middleware in &config.middlewares {
        match middleware {
            MiddlewareRef::Named(name) => match registry.middleware(name) {
                Some(middleware) => chain.push(middleware),
                None => warn!("Middleware not found: {}", name),
            },
            MiddlewareRef::Inline(middleware) => chain.push(middleware.clone()),
        }
    }

    chain
}

/// Flattens route definitions into mappings, in input order. Routes whose
/// handler cannot be resolved are logged and left out.
pub fn map_routes(
    definitions: &[RouteDefinition],
    controllers: &ControllerRegistry,
    registry: &MiddlewareRegistry,
) -> Vec<RouteMapping> {
    let mut mappings = Vec::new();

    for route in definitions.iter().flat_map(|definition| definition.routes.iter()) {
        let action = match resolve_handler(&route.handler, controllers) {
            HandlerResolution::Resolved(action) => action,
            HandlerResolution::MalformedHandler(handler) => {
                warn!("Invalid handler format: {}", handler);
                continue;
            }
            HandlerResolution::UnresolvedControllerKey(key) => {
                warn!("Controller not found: {} (route {} {})", key, route.method, route.path);
                continue;
            }
            HandlerResolution::UnresolvedAction { controller, action } => {
                warn!("Handler not found: {}.{} (route {} {})", controller, action, route.method, route.path);
                continue;
            }
        };

        let middlewares = build_chain(route.config.as_ref(), registry);
        info!("Registered: {} {} -> {}", route.method, route.path, route.handler);

        mappings.push(RouteMapping {
            method: route.method.to_ascii_lowercase(),
            path: route.path.clone(),
            handler: route.handler.clone(),
            action,
            middlewares,
        });
    }

    mappings
}
