//! Resource composer: one call per schema yields its controller and routes.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;
use crate::controller::{build_core_controller, Action, Controller, ControllerRegistry};
use crate::repository::RepositoryFactory;
use crate::router::{create_core_routes, create_custom_routes, CoreRouterOptions, RouteDefinition, RouteSpec};
use crate::schema::SchemaRegistry;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Schema not found: {0}")]
    UnknownSchema(String),
}

/// Shared state handed to controller extensions.
#[derive(Clone)]
pub struct FactoryContext {
    pub repository: Arc<dyn RepositoryFactory>,
    pub schemas: Arc<SchemaRegistry>,
    pub config: AppConfig,
}

/// Produces extra or replacement actions for a controller.
pub type ControllerExtensions = Arc<dyn Fn(&FactoryContext) -> HashMap<String, Arc<dyn Action>> + Send + Sync>;

#[derive(Clone)]
pub struct Factory {
    context: FactoryContext,
}

impl Factory {
    pub fn new(context: FactoryContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &FactoryContext {
        &self.context
    }

    pub fn create_core_controller(
        &self,
        schema_name: &str,
        extensions: Option<&ControllerExtensions>,
    ) -> Result<Controller, ResourceError> {
        let schema = self
            .context
            .schemas
            .get(schema_name)
            .ok_or_else(|| ResourceError::UnknownSchema(schema_name.to_string()))?;
        let extensions = extensions.map(|build| build(&self.context));
        Ok(build_core_controller(
            schema,
            self.context.repository.clone(),
            self.context.config.clone(),
            extensions,
        ))
    }

    pub fn create_core_routes(
        &self,
        schema_name: &str,
        options: &CoreRouterOptions,
    ) -> Result<RouteDefinition, ResourceError> {
        let schema = self
            .context
            .schemas
            .get(schema_name)
            .ok_or_else(|| ResourceError::UnknownSchema(schema_name.to_string()))?;
        Ok(create_core_routes(&schema, options))
    }
}

#[derive(Clone, Default)]
pub struct ResourceOptions {
    pub controller_extensions: Option<ControllerExtensions>,
    pub route_options: CoreRouterOptions,
    pub custom_routes: Vec<RouteSpec>,
}

impl ResourceOptions {
    pub fn extensions<F>(mut self, build: F) -> Self
    where
        F: Fn(&FactoryContext) -> HashMap<String, Arc<dyn Action>> + Send + Sync + 'static,
    {
        self.controller_extensions = Some(Arc::new(build));
        self
    }

    pub fn route_options(mut self, options: CoreRouterOptions) -> Self {
        self.route_options = options;
        self
    }

    pub fn custom_route(mut self, route: RouteSpec) -> Self {
        self.custom_routes.push(route);
        self
    }
}

/// Controllers plus the route definitions that reference them.
#[derive(Clone, Default)]
pub struct Resource {
    pub controller_registry: ControllerRegistry,
    pub route_definitions: Vec<RouteDefinition>,
}

impl Resource {
    pub fn merge(&mut self, other: Resource) {
        self.controller_registry.extend(other.controller_registry);
        self.route_definitions.extend(other.route_definitions);
    }
}

/// Custom routes come first so they win over `/:id` style core paths.
pub fn create_resource(
    factory: &Factory,
    schema_name: &str,
    options: &ResourceOptions,
) -> Result<Resource, ResourceError> {
    let controller = factory.create_core_controller(schema_name, options.controller_extensions.as_ref())?;
    let core_routes = factory.create_core_routes(schema_name, &options.route_options)?;

    let mut route_definitions = Vec::new();
    if !options.custom_routes.is_empty() {
        route_definitions.push(create_custom_routes(options.custom_routes.clone()));
    }
    route_definitions.push(core_routes);

    let mut controller_registry = ControllerRegistry::new();
    controller_registry.insert(schema_name, controller);

    debug!("Created resource {}", schema_name);
    Ok(Resource { controller_registry, route_definitions })
}

pub fn create_resource_registry<'a, I>(factory: &Factory, resources: I) -> Result<Resource, ResourceError>
where
    I: IntoIterator<Item = (&'a str, ResourceOptions)>,
{
    let mut registry = Resource::default();
    for (schema_name, options) in resources {
        registry.merge(create_resource(factory, schema_name, &options)?);
    }
    Ok(registry)
}
