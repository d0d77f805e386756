use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub pagination: PaginationConfig,
    pub filter: FilterConfig,
    pub errors: ErrorConfig,
    pub security: SecurityConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub default_page_size: u32,
    /// Upper bound applied to `pagination[pageSize]`; `None` means uncapped
    pub max_page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub debug_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Include the underlying error text in 500 responses
    pub expose_internal_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_app_env(env::var("APP_ENV").ok().as_deref()).with_env_overrides()
    }

    /// Defaults for an `APP_ENV` value. Anything but an explicit development
    /// value keeps internal error details out of responses.
    pub fn from_app_env(app_env: Option<&str>) -> Self {
        match app_env {
            Some("production") | Some("prod") => Self::production(),
            Some("staging") | Some("stage") => Self::staging(),
            Some("development") | Some("dev") => Self::development(),
            _ => {
                let mut config = Self::development();
                config.errors.expose_internal_errors = false;
                config
            }
        }
    }

    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    fn with_env_overrides(mut self) -> Self {
        // Pagination overrides
        if let Ok(v) = env::var("PAGINATION_DEFAULT_PAGE_SIZE") {
            self.pagination.default_page_size = v.parse().unwrap_or(self.pagination.default_page_size);
        }
        if let Ok(v) = env::var("PAGINATION_MAX_PAGE_SIZE") {
            self.pagination.max_page_size = v.parse().ok();
        }

        // Filter overrides
        if let Ok(v) = env::var("FILTER_DEBUG_LOGGING") {
            self.filter.debug_logging = v.parse().unwrap_or(self.filter.debug_logging);
        }

        // Error overrides
        if let Ok(v) = env::var("ERRORS_EXPOSE_INTERNAL") {
            self.errors.expose_internal_errors = v.parse().unwrap_or(self.errors.expose_internal_errors);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(port) = env::var("CRUDLOOM_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|s| s.parse::<u16>().ok())
        {
            self.server.port = port;
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            pagination: PaginationConfig {
                default_page_size: 25,
                max_page_size: None,
            },
            filter: FilterConfig { debug_logging: true },
            errors: ErrorConfig { expose_internal_errors: true },
            security: SecurityConfig {
                jwt_secret: "development-secret".to_string(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            pagination: PaginationConfig {
                default_page_size: 25,
                max_page_size: Some(500),
            },
            filter: FilterConfig { debug_logging: false },
            errors: ErrorConfig { expose_internal_errors: false },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            pagination: PaginationConfig {
                default_page_size: 25,
                max_page_size: Some(100),
            },
            filter: FilterConfig { debug_logging: false },
            errors: ErrorConfig { expose_internal_errors: false },
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::development()
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
