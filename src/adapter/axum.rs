//! Mounts [`RouteMapping`]s on an axum [`Router`].

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request},
    http::{header::HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Router,
};
use tracing::warn;

use crate::controller::{
    ContextStore, ControllerContext, FormDataParser, HttpResponse, MemoryContextStore, ResponseBody,
    UrlEncodedFormParser,
};
use crate::error::ErrorResponse;
use crate::router::RouteMapping;

/// Largest request body buffered into the context.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

pub type StoreFactory = Arc<dyn Fn() -> Box<dyn ContextStore> + Send + Sync>;

/// Builds axum routers from mappings. The context store and form parser
/// used for each request are fixed here.
#[derive(Clone)]
pub struct AxumAdapter {
    store: StoreFactory,
    form_parser: Arc<dyn FormDataParser>,
    body_limit: usize,
}

impl Default for AxumAdapter {
    fn default() -> Self {
        Self {
            store: Arc::new(|| Box::new(MemoryContextStore::default()) as Box<dyn ContextStore>),
            form_parser: Arc::new(UrlEncodedFormParser),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl AxumAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store<F>(mut self, store: F) -> Self
    where
        F: Fn() -> Box<dyn ContextStore> + Send + Sync + 'static,
    {
        self.store = Arc::new(store);
        self
    }

    pub fn with_form_parser(mut self, parser: Arc<dyn FormDataParser>) -> Self {
        self.form_parser = parser;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// One axum route per distinct path. When two mappings share a method
    /// and path the first one is kept. Paths axum would reject (relative, or
    /// the same shape as an earlier path under other parameter names) are
    /// skipped.
    pub fn router(&self, mappings: Vec<RouteMapping>) -> Router {
        let mut paths: Vec<(String, Vec<(Method, RouteMapping)>)> = Vec::new();

        for mapping in mappings {
            if !mapping.path.starts_with('/') {
                warn!("Route path {:?} must start with '/'; {} ignored", mapping.path, mapping.handler);
                continue;
            }
            let Ok(method) = Method::from_bytes(mapping.method.to_ascii_uppercase().as_bytes()) else {
                warn!("Unsupported method {} for {}", mapping.method, mapping.path);
                continue;
            };
            if let Some((existing, _)) = paths
                .iter()
                .find(|(path, _)| path != &mapping.path && path_shape(path) == path_shape(&mapping.path))
            {
                warn!("Route {} conflicts with {}; {} ignored", mapping.path, existing, mapping.handler);
                continue;
            }
            match paths.iter_mut().find(|(path, _)| path == &mapping.path) {
                Some((_, routes)) if routes.iter().any(|(m, _)| *m == method) => {
                    warn!("Duplicate route {} {} -> {} ignored", method, mapping.path, mapping.handler);
                }
                Some((_, routes)) => routes.push((method, mapping)),
                None => paths.push((mapping.path.clone(), vec![(method, mapping)])),
            }
        }

        let mut router = Router::new();
        for (path, routes) in paths {
            let mut method_router = MethodRouter::new();
            for (method, mapping) in routes {
                let Ok(filter) = MethodFilter::try_from(method.clone()) else {
                    warn!("Unsupported method {} for {}", method, path);
                    continue;
                };
                method_router = method_router.on(filter, self.handler(mapping));
            }
            router = router.route(&path, method_router);
        }
        router
    }

    fn handler(
        &self,
        mapping: RouteMapping,
    ) -> impl Fn(Option<Path<HashMap<String, String>>>, Request) -> futures::future::BoxFuture<'static, Response>
           + Clone
           + Send
           + Sync
           + 'static {
        let adapter = self.clone();
        let mapping = Arc::new(mapping);
        move |params, request| {
            let adapter = adapter.clone();
            let mapping = mapping.clone();
            Box::pin(async move {
                let params = params.map(|Path(params)| params).unwrap_or_default();
                let mut ctx = match adapter.context(params, request).await {
                    Ok(ctx) => ctx,
                    Err(response) => return response,
                };
                mapping.dispatch(&mut ctx).await.into_response()
            })
        }
    }

    /// Normalizes an axum request into a [`ControllerContext`].
    pub async fn context(
        &self,
        params: HashMap<String, String>,
        request: Request,
    ) -> Result<ControllerContext, Response> {
        let (parts, body) = request.into_parts();

        let body = to_bytes(body, self.body_limit).await.map_err(|e| {
            warn!("Failed to read request body: {}", e);
            ErrorResponse::new("Payload too large", 413)
                .with_details(format!("Request body exceeds {} bytes", self.body_limit))
                .into_response()
        })?;

        let query: HashMap<String, String> = parts
            .uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let headers: HashMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        Ok(ControllerContext::new(parts.method.as_str(), parts.uri.path())
            .with_query(query)
            .with_params(params)
            .with_headers(headers)
            .with_body(body.to_vec())
            .with_store((self.store)())
            .with_form_parser(self.form_parser.clone())
            .with_raw(Box::new(parts)))
    }
}

/// `/users/:id` and `/users/:uid` share the shape `/users/:`.
fn path_shape(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.chars().next() {
            Some(':') => ":",
            Some('*') => "*",
            _ => segment,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Mounts `mappings` with the default store and form parser.
pub fn create_router(mappings: Vec<RouteMapping>) -> Router {
    AxumAdapter::new().router(mappings)
}

impl IntoResponse for HttpResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match self.body {
            ResponseBody::Empty => Body::empty(),
            ResponseBody::Text(text) => Body::from(text),
            ResponseBody::Json(value) => Body::from(value.to_string()),
        };

        let mut response = Response::new(body);
        *response.status_mut() = status;
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    response.headers_mut().insert(name, value);
                }
                _ => warn!("Dropping invalid response header {}", name),
            }
        }
        response
    }
}
