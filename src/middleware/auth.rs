use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::controller::{ControllerContext, HttpResponse};
use crate::error::ErrorResponse;
use crate::router::{policy_fn, Middleware, Next, Policy};

/// Context key holding the authenticated claims.
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        Self {
            sub: sub.into(),
            role: None,
            exp: (now + Duration::hours(expiry_hours as i64)).timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
}

pub fn generate_jwt(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }
    encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Bearer-token authentication. Valid claims are stored under
/// [`USER_KEY`]; anything else answers 401.
pub struct JwtAuth {
    secret: String,
}

impl JwtAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.security.jwt_secret.clone())
    }

    pub fn into_middleware(self) -> Arc<dyn Middleware> {
        Arc::new(self)
    }

    fn validate(&self, token: &str) -> Result<Claims, String> {
        if self.secret.is_empty() {
            return Err("JWT secret not configured".to_string());
        }
        let key = DecodingKey::from_secret(self.secret.as_bytes());
        decode::<Claims>(token, &key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| format!("Invalid JWT token: {}", e))
    }
}

fn bearer_token(ctx: &ControllerContext) -> Result<&str, String> {
    let header = ctx
        .req
        .header("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| "Authorization header must use Bearer token format".to_string())?;
    if token.trim().is_empty() {
        return Err("Empty JWT token".to_string());
    }
    Ok(token.trim())
}

#[async_trait]
impl Middleware for JwtAuth {
    async fn handle(&self, ctx: &mut ControllerContext, next: Next<'_>) -> HttpResponse {
        let claims = match bearer_token(ctx).and_then(|token| self.validate(token)) {
            Ok(claims) => claims,
            Err(reason) => {
                debug!("Rejected {} {}: {}", ctx.req.method(), ctx.req.path(), reason);
                return ErrorResponse::unauthorized(reason).to_http();
            }
        };

        match serde_json::to_value(&claims) {
            Ok(user) => ctx.set(USER_KEY, user),
            Err(e) => return ErrorResponse::unauthorized(e.to_string()).to_http(),
        }
        next.run(ctx).await
    }
}

/// Allows requests whose authenticated user carries `role`.
pub fn has_role(role: impl Into<String>) -> Arc<dyn Policy> {
    let role = role.into();
    policy_fn(move |ctx| {
        ctx.get(USER_KEY)
            .and_then(|user| user.get("role"))
            .and_then(|r| r.as_str())
            .is_some_and(|r| r == role)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip() {
        let auth = JwtAuth::new("test-secret");
        let token = generate_jwt(&Claims::new("u-1", 1).with_role("admin"), "test-secret").unwrap();
        let claims = auth.validate(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role.as_deref(), Some("admin"));

        assert!(JwtAuth::new("other").validate(&token).is_err());
        assert!(matches!(generate_jwt(&Claims::new("u-1", 1), ""), Err(JwtError::InvalidSecret)));
    }

    #[test]
    fn bearer_format() {
        let ctx = ControllerContext::new("GET", "/").with_header("Authorization", "Token abc");
        assert!(bearer_token(&ctx).is_err());
        let ctx = ControllerContext::new("GET", "/").with_header("Authorization", "Bearer abc");
        assert_eq!(bearer_token(&ctx), Ok("abc"));
    }
}
