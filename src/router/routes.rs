use std::collections::HashMap;

use crate::controller::CORE_ACTIONS;
use crate::schema::SchemaDescriptor;

use super::{RouteConfig, RouteDefinition, RouteSpec};

/// Options for [`create_core_routes`].
#[derive(Clone, Default)]
pub struct CoreRouterOptions {
    /// Base path for the resource; defaults to `/{plural}`.
    pub prefix: Option<String>,
    pub only: Option<Vec<String>>,
    pub except: Vec<String>,
    /// Route config keyed by action name.
    pub config: HashMap<String, RouteConfig>,
}

impl CoreRouterOptions {
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn only<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = Some(actions.into_iter().map(Into::into).collect());
        self
    }

    pub fn except<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.except = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn config(mut self, action: impl Into<String>, config: RouteConfig) -> Self {
        self.config.insert(action.into(), config);
        self
    }
}

/// The five CRUD routes for `schema`, filtered by `only`/`except`:
///
/// | action  | method | path        |
/// |---------|--------|-------------|
/// | find    | GET    | `/base`     |
/// | findOne | GET    | `/base/:id` |
/// | create  | POST   | `/base`     |
/// | update  | PUT    | `/base/:id` |
/// | delete  | DELETE | `/base/:id` |
pub fn create_core_routes(schema: &SchemaDescriptor, options: &CoreRouterOptions) -> RouteDefinition {
    let base = options
        .prefix
        .clone()
        .unwrap_or_else(|| format!("/{}", schema.plural()));
    let base = match base.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    let item = format!("{}/:id", base.trim_end_matches('/'));

    let routes = CORE_ACTIONS
        .iter()
        .copied()
        .filter(|action| options.only.as_ref().map_or(true, |only| only.iter().any(|a| a == action)))
        .filter(|action| !options.except.iter().any(|a| a == action))
        .map(|action| {
            let (method, path) = match action {
                "find" => ("GET", base.as_str()),
                "findOne" => ("GET", item.as_str()),
                "create" => ("POST", base.as_str()),
                "update" => ("PUT", item.as_str()),
                _ => ("DELETE", item.as_str()),
            };
            RouteSpec {
                method: method.to_string(),
                path: path.to_string(),
                handler: format!("{}.{}", schema.name(), action),
                config: options.config.get(action).cloned(),
            }
        })
        .collect();

    RouteDefinition { routes }
}

pub fn create_custom_routes(routes: Vec<RouteSpec>) -> RouteDefinition {
    RouteDefinition { routes }
}
