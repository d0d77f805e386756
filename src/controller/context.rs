//! Per-request context shared by middleware and actions.
//!
//! Adapters keep their native request in `raw`; [`ControllerContext::framework`]
//! is the typed escape hatch for code that needs it.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::response::HttpResponse;

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("Request body must be valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Request body is not valid UTF-8")]
    InvalidUtf8,
    #[error("Form data is not supported for content type {0}")]
    UnsupportedFormData(String),
}

/// Decoded form fields, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData(pub Vec<(String, String)>);

impl FormData {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.iter().filter(move |(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

/// Form body decoding, chosen when the adapter is built.
pub trait FormDataParser: Send + Sync {
    fn parse(&self, content_type: Option<&str>, body: &[u8]) -> Result<FormData, BodyError>;
}

/// Rejects every form body.
pub struct NoFormDataParser;

impl FormDataParser for NoFormDataParser {
    fn parse(&self, content_type: Option<&str>, _body: &[u8]) -> Result<FormData, BodyError> {
        Err(BodyError::UnsupportedFormData(content_type.unwrap_or("none").to_string()))
    }
}

/// `application/x-www-form-urlencoded` bodies.
pub struct UrlEncodedFormParser;

impl FormDataParser for UrlEncodedFormParser {
    fn parse(&self, content_type: Option<&str>, body: &[u8]) -> Result<FormData, BodyError> {
        let is_urlencoded = content_type
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);
        if !is_urlencoded {
            return Err(BodyError::UnsupportedFormData(content_type.unwrap_or("none").to_string()));
        }
        Ok(FormData(
            url::form_urlencoded::parse(body)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        ))
    }
}

/// Request-scoped scratch state (`ctx.set("user", ..)`).
pub trait ContextStore: Send + Sync {
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: String, value: Value);
}

#[derive(Debug, Default)]
pub struct MemoryContextStore(HashMap<String, Value>);

impl ContextStore for MemoryContextStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn set(&mut self, key: String, value: Value) {
        self.0.insert(key, value);
    }
}

pub struct RequestFacet {
    method: String,
    path: String,
    query: HashMap<String, String>,
    params: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    form_parser: Arc<dyn FormDataParser>,
}

impl RequestFacet {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Header names are stored lower-cased.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn json(&self) -> Result<Value, BodyError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> Result<String, BodyError> {
        String::from_utf8(self.body.clone()).map_err(|_| BodyError::InvalidUtf8)
    }

    pub fn form_data(&self) -> Result<FormData, BodyError> {
        self.form_parser.parse(self.header("content-type"), &self.body)
    }
}

/// Response constructors; `ctx.res.json(..)` mirrors the request facet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFacet;

impl ResponseFacet {
    pub fn json(&self, data: impl serde::Serialize, status: u16) -> HttpResponse {
        HttpResponse::json(data, status)
    }

    pub fn text(&self, body: impl Into<String>, status: u16) -> HttpResponse {
        HttpResponse::text(body, status)
    }

    /// 302 redirect.
    pub fn redirect(&self, url: impl Into<String>) -> HttpResponse {
        HttpResponse::redirect(url, 302)
    }

    pub fn redirect_with_status(&self, url: impl Into<String>, status: u16) -> HttpResponse {
        HttpResponse::redirect(url, status)
    }

    pub fn status(&self, code: u16) -> HttpResponse {
        HttpResponse::status(code)
    }
}

pub struct ControllerContext {
    pub req: RequestFacet,
    pub res: ResponseFacet,
    store: Box<dyn ContextStore>,
    /// The adapter's native request parts, opaque to the core.
    pub raw: Option<Box<dyn Any + Send + Sync>>,
}

impl ControllerContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            req: RequestFacet {
                method: method.into().to_ascii_uppercase(),
                path: path.into(),
                query: HashMap::new(),
                params: HashMap::new(),
                headers: HashMap::new(),
                body: Vec::new(),
                form_parser: Arc::new(UrlEncodedFormParser),
            },
            res: ResponseFacet,
            store: Box::new(MemoryContextStore::default()),
            raw: None,
        }
    }

    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.req.query = query;
        self
    }

    pub fn with_params(mut self, params: HashMap<String, String>) -> Self {
        self.req.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.req.params.insert(name.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.req.headers = headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.req.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.req.body = body.into();
        self
    }

    pub fn with_json(self, value: &Value) -> Self {
        let body = value.to_string();
        self.with_header("content-type", "application/json").with_body(body)
    }

    pub fn with_store(mut self, store: Box<dyn ContextStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_form_parser(mut self, parser: Arc<dyn FormDataParser>) -> Self {
        self.req.form_parser = parser;
        self
    }

    pub fn with_raw(mut self, raw: Box<dyn Any + Send + Sync>) -> Self {
        self.raw = Some(raw);
        self
    }

    /// The adapter's native request, when it is a `T` (axum adapter:
    /// `axum::http::request::Parts`).
    pub fn framework<T: Any>(&self) -> Option<&T> {
        self.raw.as_ref()?.downcast_ref::<T>()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.store.set(key.into(), value);
    }
}
