use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

/// Framework-neutral response produced by actions and middleware. Adapters
/// translate it into their native response type.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: ResponseBody,
}

impl HttpResponse {
    pub fn json(data: impl Serialize, status: u16) -> Self {
        let body = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return Self::json_value(
                    json!({"error": {"message": "Internal server error", "statusCode": 500}}),
                    500,
                );
            }
        };
        Self::json_value(body, status)
    }

    fn json_value(body: Value, status: u16) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: ResponseBody::Json(body),
        }
    }

    pub fn text(body: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: ResponseBody::Text(body.into()),
        }
    }

    pub fn redirect(url: impl Into<String>, status: u16) -> Self {
        Self {
            status,
            headers: vec![("location".to_string(), url.into())],
            body: ResponseBody::Empty,
        }
    }

    pub fn status(code: u16) -> Self {
        Self { status: code, headers: Vec::new(), body: ResponseBody::Empty }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        self.headers.retain(|(existing, _)| existing != &name);
        self.headers.push((name, value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn json_body(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
