pub mod auth;
pub mod logging;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::router::{MiddlewareRegistry, AUTH_MIDDLEWARE};

pub use auth::{generate_jwt, has_role, Claims, JwtAuth, JwtError, USER_KEY};
pub use logging::RequestLogger;

pub const LOGGER_MIDDLEWARE: &str = "logger";

/// Registers `auth` (bearer JWT) and `logger` on `registry`.
pub fn register_builtin(registry: &mut MiddlewareRegistry, config: &AppConfig) {
    registry.register_middleware(AUTH_MIDDLEWARE, JwtAuth::from_config(config).into_middleware());
    registry.register_middleware(LOGGER_MIDDLEWARE, Arc::new(RequestLogger));
}
