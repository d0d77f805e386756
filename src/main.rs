use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{routing::get, Json, Router};
use clap::{Parser, Subcommand};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crudloom::adapter::AxumAdapter;
use crudloom::config::{config, AppConfig};
use crudloom::controller::{action_fn, CORE_ACTIONS};
use crudloom::middleware::{self, generate_jwt, has_role, Claims, USER_KEY};
use crudloom::repository::{InMemoryStore, PgRepositoryFactory, RepositoryFactory};
use crudloom::resource::{create_resource_registry, Factory, FactoryContext, ResourceOptions};
use crudloom::router::{map_routes, CoreRouterOptions, MiddlewareRegistry, RouteConfig, RouteSpec};
use crudloom::schema::{load_manifest, SchemaRegistry};

const USER_SCHEMA: &str = "api::user.user";
const PRODUCT_SCHEMA: &str = "api::product.product";

#[derive(Parser)]
#[command(name = "crudloom")]
#[command(about = "Serve CRUD resources generated from a schema manifest")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Start the HTTP server")]
    Serve {
        #[arg(long, default_value = "demos/schemas.yaml", help = "Schema manifest (YAML or JSON)")]
        schemas: PathBuf,

        #[arg(long, env = "DATABASE_URL", help = "PostgreSQL URL; in-memory storage when omitted")]
        database_url: Option<String>,

        #[arg(long, default_value = "/api", help = "Path prefix for generated routes")]
        prefix: String,

        #[arg(long, help = "Port to listen on (overrides config)")]
        port: Option<u16>,
    },

    #[command(about = "Print a bearer token signed with the configured secret")]
    Token {
        #[arg(help = "Subject claim")]
        sub: String,

        #[arg(long, help = "Role claim")]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, JWT_SECRET, etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,crudloom=debug")))
        .init();

    let config = config();
    tracing::info!("Starting crudloom in {:?} mode", config.environment);

    match Cli::parse().command {
        Commands::Serve { schemas, database_url, prefix, port } => {
            serve(config, schemas, database_url, prefix, port).await
        }
        Commands::Token { sub, role } => {
            let mut claims = Claims::new(sub, config.security.jwt_expiry_hours);
            if let Some(role) = role {
                claims = claims.with_role(role);
            }
            println!("{}", generate_jwt(&claims, &config.security.jwt_secret)?);
            Ok(())
        }
    }
}

async fn serve(
    config: &AppConfig,
    manifest: PathBuf,
    database_url: Option<String>,
    prefix: String,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let schemas = Arc::new(
        load_manifest(&manifest)
            .and_then(|m| m.into_registry())
            .with_context(|| format!("loading {}", manifest.display()))?,
    );

    let repository: Arc<dyn RepositoryFactory> = match database_url {
        Some(url) => {
            let factory = PgRepositoryFactory::connect(&url, schemas.clone()).await?;
            factory.ensure_tables().await?;
            tracing::info!("Using PostgreSQL storage");
            Arc::new(factory)
        }
        None => {
            tracing::info!("Using in-memory storage");
            Arc::new(InMemoryStore::new(&schemas))
        }
    };

    let factory = Factory::new(FactoryContext { repository, schemas: schemas.clone(), config: config.clone() });
    let resources = create_resource_registry(&factory, demo_resources(&schemas, &prefix))?;

    let mut registry = MiddlewareRegistry::new();
    middleware::register_builtin(&mut registry, config);
    registry.register_policy("is-admin", has_role("admin"));

    let mappings = map_routes(&resources.route_definitions, &resources.controller_registry, &registry);
    tracing::info!("Mounted {} routes", mappings.len());

    let app = Router::new()
        .route("/health", get(health))
        .merge(AxumAdapter::new().router(mappings))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, port.unwrap_or(config.server.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Users: reads are public, `GET /users/me` echoes the token claims.
/// Products: every route is logged, deletes need the admin role.
fn demo_resources<'a>(schemas: &'a SchemaRegistry, prefix: &str) -> Vec<(&'a str, ResourceOptions)> {
    let mut resources = Vec::new();

    for schema in schemas.iter() {
        let base = format!("{}/{}", prefix.trim_end_matches('/'), schema.plural());
        let mut route_options = CoreRouterOptions::default().prefix(base.clone());
        let mut options = ResourceOptions::default();

        match schema.name() {
            USER_SCHEMA => {
                route_options = route_options
                    .config("find", RouteConfig::public())
                    .config("findOne", RouteConfig::public());
                options = options
                    .extensions(|_| {
                        HashMap::from([(
                            "me".to_string(),
                            action_fn(|ctx| {
                                Box::pin(async move {
                                    let user = ctx.get(USER_KEY).cloned().unwrap_or_default();
                                    ctx.res.json(json!({ "data": user }), 200)
                                })
                            }),
                        )])
                    })
                    .custom_route(RouteSpec::new("GET", format!("{}/me", base), format!("{}.me", USER_SCHEMA)));
            }
            PRODUCT_SCHEMA => {
                for action in CORE_ACTIONS {
                    let mut route = RouteConfig::default().middleware(middleware::LOGGER_MIDDLEWARE);
                    if action == "delete" {
                        route = route.policy("is-admin");
                    }
                    route_options = route_options.config(action, route);
                }
            }
            _ => {}
        }

        resources.push((schema.name(), options.route_options(route_options)));
    }

    resources
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now(),
    }))
}
