mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde_json::json;

use crudloom::controller::{action_fn, Action, Controller, ControllerContext, ControllerRegistry};
use crudloom::config::AppConfig;
use crudloom::middleware::{generate_jwt, has_role, register_builtin, Claims, JwtAuth, LOGGER_MIDDLEWARE, USER_KEY};
use crudloom::router::{
    map_routes, middleware_fn, policy_fn, resolve_handler, HandlerResolution, Middleware, MiddlewareRegistry,
    RouteConfig, RouteDefinition, RouteSpec,
};

use common::body;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, name: &'static str) -> Arc<dyn Middleware> {
    let log = log.clone();
    middleware_fn(move |ctx, next| {
        let log = log.clone();
        Box::pin(async move {
            log.lock().unwrap().push(name.to_string());
            next.run(ctx).await
        })
    })
}

fn counting_action(calls: &Arc<AtomicUsize>) -> Arc<dyn Action> {
    let calls = calls.clone();
    action_fn(move |ctx| {
        let calls = calls.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            ctx.res.json(json!({"user": ctx.get(USER_KEY).cloned()}), 200)
        })
    })
}

fn controllers(calls: &Arc<AtomicUsize>) -> ControllerRegistry {
    let mut registry = ControllerRegistry::new();
    registry.insert(
        "api::user.user",
        Controller::new()
            .with("find", counting_action(calls))
            .with("findOne", counting_action(calls)),
    );
    registry.insert("health", Controller::new().with("check", counting_action(calls)));
    registry
}

fn single(route: RouteSpec) -> Vec<RouteDefinition> {
    vec![RouteDefinition { routes: vec![route] }]
}

#[tokio::test]
async fn namespaced_handler_resolves() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let controllers = controllers(&calls);

    assert!(matches!(resolve_handler("api::user.user.findOne", &controllers), HandlerResolution::Resolved(_)));

    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users/:id", "api::user.user.findOne").with_config(RouteConfig::public())),
        &controllers,
        &MiddlewareRegistry::new(),
    );
    assert_eq!(mappings.len(), 1);
    assert_eq!(mappings[0].method, "get");
    assert_eq!(mappings[0].path, "/users/:id");

    let mut ctx = ControllerContext::new("GET", "/users/1");
    assert_eq!(mappings[0].dispatch(&mut ctx).await.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn unresolvable_routes_are_dropped() -> Result<()> {
    common::init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let definitions = vec![
        RouteDefinition {
            routes: vec![
                RouteSpec::new("GET", "/a", "broken"),
                RouteSpec::new("GET", "/b", "a.b.c.d"),
                RouteSpec::new("GET", "/c", "api::post.post.find"),
                RouteSpec::new("GET", "/d", "api::user.user.missing"),
            ],
        },
        RouteDefinition { routes: vec![RouteSpec::new("POST", "/health", "health.check")] },
    ];

    let mappings = map_routes(&definitions, &controllers(&calls), &MiddlewareRegistry::new());

    assert_eq!(mappings.len(), 1);
    assert_eq!((mappings[0].method.as_str(), mappings[0].path.as_str()), ("post", "/health"));

    let only_broken = map_routes(&single(RouteSpec::new("GET", "/x", "broken")), &controllers(&calls), &MiddlewareRegistry::new());
    assert!(only_broken.is_empty());
    Ok(())
}

#[tokio::test]
async fn mapping_preserves_route_order() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let definitions = vec![
        RouteDefinition {
            routes: vec![
                RouteSpec::new("GET", "/users/me", "health.check"),
                RouteSpec::new("GET", "/users/:id", "api::user.user.findOne"),
            ],
        },
        RouteDefinition { routes: vec![RouteSpec::new("GET", "/users", "api::user.user.find")] },
    ];
    let paths: Vec<String> = map_routes(&definitions, &controllers(&calls), &MiddlewareRegistry::new())
        .into_iter()
        .map(|m| m.path)
        .collect();
    assert_eq!(paths, vec!["/users/me", "/users/:id", "/users"]);
    Ok(())
}

#[tokio::test]
async fn short_circuit_skips_the_action() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let log: Log = Arc::default();
    let gate = middleware_fn(|ctx, _next| Box::pin(async move { ctx.res.json(json!({"blocked": true}), 429) }));

    let config = RouteConfig::public()
        .middleware(recorder(&log, "outer"))
        .middleware(gate)
        .middleware(recorder(&log, "inner"));
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find").with_config(config)),
        &controllers(&calls),
        &MiddlewareRegistry::new(),
    );

    let response = mappings[0].dispatch(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(response.status, 429);
    assert_eq!(body(&response), json!({"blocked": true}));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(*log.lock().unwrap(), vec!["outer".to_string()]);
    Ok(())
}

#[tokio::test]
async fn auth_is_prepended_unless_disabled() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let log: Log = Arc::default();
    let mut registry = MiddlewareRegistry::new();
    registry.register_middleware("auth", recorder(&log, "auth"));
    registry.register_middleware("audit", recorder(&log, "audit"));

    let config = RouteConfig::default().middleware("audit");
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find").with_config(config.clone())),
        &controllers(&calls),
        &registry,
    );
    assert_eq!(mappings[0].middlewares.len(), 2);
    mappings[0].dispatch(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(*log.lock().unwrap(), vec!["auth".to_string(), "audit".to_string()]);

    log.lock().unwrap().clear();
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find").with_config(config.auth(false))),
        &controllers(&calls),
        &registry,
    );
    assert_eq!(mappings[0].middlewares.len(), 1);
    mappings[0].dispatch(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(*log.lock().unwrap(), vec!["audit".to_string()]);

    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find")),
        &controllers(&calls),
        &registry,
    );
    assert_eq!(mappings[0].middlewares.len(), 1, "no config still means auth");
    Ok(())
}

#[tokio::test]
async fn missing_auth_middleware_only_warns() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find")),
        &controllers(&calls),
        &MiddlewareRegistry::new(),
    );
    assert_eq!(mappings.len(), 1);
    assert!(mappings[0].middlewares.is_empty());
    Ok(())
}

#[tokio::test]
async fn policies_guard_before_middlewares() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let log: Log = Arc::default();
    let mut registry = MiddlewareRegistry::new();
    registry.register_policy("never", policy_fn(|_| false));

    let config = RouteConfig::public()
        .policy("never")
        .policy("unknown")
        .middleware(recorder(&log, "after-policy"));
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find").with_config(config)),
        &controllers(&calls),
        &registry,
    );
    assert_eq!(mappings[0].middlewares.len(), 2);

    let response = mappings[0].dispatch(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(response.status, 403);
    assert_eq!(body(&response)["error"]["message"], json!("Forbidden"));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let inline = RouteConfig::public().policy(policy_fn(|ctx| ctx.req.header("x-allow").is_some()));
    let mappings = map_routes(
        &single(RouteSpec::new("GET", "/users", "api::user.user.find").with_config(inline)),
        &controllers(&calls),
        &registry,
    );
    let mut ctx = ControllerContext::new("GET", "/users").with_header("X-Allow", "1");
    assert_eq!(mappings[0].dispatch(&mut ctx).await.status, 200);
    Ok(())
}

#[tokio::test]
async fn jwt_auth_sets_user_and_rejects_bad_tokens() -> Result<()> {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = MiddlewareRegistry::new();
    registry.register_middleware("auth", JwtAuth::new("s3cret").into_middleware());
    registry.register_policy("is-admin", has_role("admin"));

    let mappings = map_routes(
        &single(
            RouteSpec::new("GET", "/users", "api::user.user.find")
                .with_config(RouteConfig::default().policy("is-admin")),
        ),
        &controllers(&calls),
        &registry,
    );
    let route = &mappings[0];

    let response = route.dispatch(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(response.status, 401);
    assert_eq!(body(&response)["error"]["details"], json!("Missing Authorization header"));

    let forged = generate_jwt(&Claims::new("u-1", 1).with_role("admin"), "other")?;
    let mut ctx = ControllerContext::new("GET", "/users").with_header("authorization", format!("Bearer {}", forged));
    assert_eq!(route.dispatch(&mut ctx).await.status, 401);

    let member = generate_jwt(&Claims::new("u-2", 1).with_role("member"), "s3cret")?;
    let mut ctx = ControllerContext::new("GET", "/users").with_header("authorization", format!("Bearer {}", member));
    assert_eq!(route.dispatch(&mut ctx).await.status, 403);

    let admin = generate_jwt(&Claims::new("u-3", 1).with_role("admin"), "s3cret")?;
    let mut ctx = ControllerContext::new("GET", "/users").with_header("authorization", format!("Bearer {}", admin));
    let response = route.dispatch(&mut ctx).await;
    assert_eq!(response.status, 200);
    assert_eq!(body(&response)["user"]["sub"], json!("u-3"));
    assert_eq!(ctx.get(USER_KEY).map(|u| u["role"].clone()), Some(json!("admin")));
    Ok(())
}

#[tokio::test]
async fn builtin_registry_serves_auth_and_logger() -> Result<()> {
    common::init_tracing();
    let calls = Arc::new(AtomicUsize::new(0));
    let config = AppConfig::default();
    let mut registry = MiddlewareRegistry::new();
    register_builtin(&mut registry, &config);
    assert!(registry.middleware("auth").is_some());

    let mappings = map_routes(
        &single(
            RouteSpec::new("GET", "/users", "api::user.user.find")
                .with_config(RouteConfig::default().middleware(LOGGER_MIDDLEWARE)),
        ),
        &controllers(&calls),
        &registry,
    );
    assert_eq!(mappings[0].middlewares.len(), 2);

    let token = generate_jwt(&Claims::new("u-1", 1), &config.security.jwt_secret)?;
    let mut ctx = ControllerContext::new("GET", "/users").with_header("authorization", format!("Bearer {}", token));
    assert_eq!(mappings[0].dispatch(&mut ctx).await.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}
