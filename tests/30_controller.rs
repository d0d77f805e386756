mod common;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crudloom::config::{AppConfig, Environment};
use crudloom::controller::{action_fn, build_core_controller, ControllerContext, HttpResponse, CORE_ACTIONS};
use crudloom::repository::{Repository, RepositoryFactory, StorageError};
use crudloom::schema::{ControllerHooks, HookOutcome, RepositoryHooks};

use common::{body, post, query, FixedRepository, USERS};

fn users_controller(repositories: Arc<dyn RepositoryFactory>, config: AppConfig) -> crudloom::controller::Controller {
    let schemas = common::schemas();
    build_core_controller(schemas.get(USERS).expect("users"), repositories, config, None)
}

#[tokio::test]
async fn find_reports_pagination_meta() -> Result<()> {
    let repo = FixedRepository::new(vec![json!({"id": "1"}), json!({"id": "2"})]);
    let controller = users_controller(repo.factory(), AppConfig::default());

    let mut ctx = ControllerContext::new("GET", "/users").with_query(query(&[("pagination[pageSize]", "10")]));
    let response = controller.get("find").expect("find").call(&mut ctx).await;

    assert_eq!(response.status, 200);
    let payload = body(&response);
    assert_eq!(payload["data"].as_array().map(Vec::len), Some(2));
    assert_eq!(payload["meta"]["pagination"], json!({"page": 1, "pageSize": 10, "pageCount": 1, "total": 2}));

    let seen = repo.seen.lock().await;
    assert_eq!(seen[0].pagination.map(|p| (p.page, p.page_size)), Some((1, 10)));
    Ok(())
}

#[tokio::test]
async fn create_requires_data_field() -> Result<()> {
    let (factory, _) = common::factory();
    let controller = factory.create_core_controller(USERS, None)?;
    let create = controller.get("create").expect("create");

    let response = create.call(&mut post("/users", json!({}))).await;
    assert_eq!(response.status, 400);
    assert_eq!(body(&response)["error"]["message"], json!("Invalid request format"));
    assert!(body(&response)["error"]["example"]["data"].is_object());

    let response = create.call(&mut post("/users", json!({"data": {}}))).await;
    assert_eq!(response.status, 400);
    assert_eq!(body(&response)["error"]["message"], json!("Validation failed"));
    assert_eq!(body(&response)["error"]["details"], json!("Request data cannot be empty"));

    let mut ctx = ControllerContext::new("POST", "/users").with_body("{\"data\": ");
    let response = create.call(&mut ctx).await;
    assert_eq!((response.status, body(&response)["error"]["message"].clone()), (400, json!("Invalid JSON")));
    Ok(())
}

#[tokio::test]
async fn create_validates_then_stores() -> Result<()> {
    let (factory, store) = common::factory();
    let controller = factory.create_core_controller(USERS, None)?;
    let create = controller.get("create").expect("create");

    let response = create.call(&mut post("/users", json!({"data": {"age": "old"}}))).await;
    assert_eq!(response.status, 400);
    let fields = body(&response)["error"]["fields"].as_array().cloned().unwrap_or_default();
    let codes: Vec<(&str, &str)> = fields
        .iter()
        .filter_map(|f| Some((f["field"].as_str()?, f["code"].as_str()?)))
        .collect();
    assert!(codes.contains(&("name", "required_field")), "{:?}", codes);
    assert!(codes.contains(&("age", "invalid_type")), "{:?}", codes);

    let response = create
        .call(&mut post("/users", json!({"data": {"name": "Ann", "email": "ann@example.com", "extra": 1}})))
        .await;
    assert_eq!(response.status, 201);
    let created = body(&response)["data"].clone();
    assert_eq!(created["name"], json!("Ann"));
    assert!(created.get("extra").is_none());
    assert!(created["id"].is_string());
    assert!(created["createdAt"].is_string());

    let repo = store.get(USERS).expect("users");
    assert_eq!(repo.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn duplicate_entry_is_409_with_field() -> Result<()> {
    let (factory, _) = common::factory();
    let controller = factory.create_core_controller(USERS, None)?;
    let create = controller.get("create").expect("create");
    let payload = json!({"data": {"name": "Ann", "email": "ann@example.com"}});

    assert_eq!(create.call(&mut post("/users", payload.clone())).await.status, 201);
    let response = create.call(&mut post("/users", payload)).await;

    assert_eq!(response.status, 409);
    let error = &body(&response)["error"];
    assert_eq!(error["message"], json!("Duplicate entry"));
    assert_eq!(error["fields"][0]["field"], json!("email"));
    assert_eq!(error["fields"][0]["code"], json!("duplicate_entry"));
    Ok(())
}

#[tokio::test]
async fn find_one_update_delete_lifecycle() -> Result<()> {
    let (factory, store) = common::factory();
    let controller = factory.create_core_controller(USERS, None)?;
    let repo = store.get(USERS).expect("users");
    let ann = repo.create(json!({"name": "Ann", "email": "ann@example.com"})).await?;
    let id = ann["id"].as_str().expect("id").to_string();

    let mut ctx = ControllerContext::new("GET", "/users/x").with_param("id", &id);
    let response = controller.get("findOne").expect("findOne").call(&mut ctx).await;
    assert_eq!((response.status, body(&response)["data"]["name"].clone()), (200, json!("Ann")));

    let mut ctx = ControllerContext::new("PUT", "/users/x")
        .with_param("id", &id)
        .with_json(&json!({"data": {"age": 41}}));
    let response = controller.get("update").expect("update").call(&mut ctx).await;
    assert_eq!(response.status, 200);
    assert_eq!(body(&response)["data"]["age"], json!(41));
    assert_eq!(body(&response)["data"]["name"], json!("Ann"));

    let mut ctx = ControllerContext::new("PUT", "/users/x").with_param("id", &id).with_json(&json!({"data": {}}));
    let response = controller.get("update").expect("update").call(&mut ctx).await;
    assert_eq!(body(&response)["error"]["details"], json!("Update data cannot be empty"));

    let mut ctx = ControllerContext::new("DELETE", "/users/x").with_param("id", &id);
    let response = controller.get("delete").expect("delete").call(&mut ctx).await;
    assert_eq!((response.status, body(&response)["data"]["id"].clone()), (200, json!(id)));

    for action in ["findOne", "delete"] {
        let mut ctx = ControllerContext::new("GET", "/users/x").with_param("id", &id);
        let response = controller.get(action).expect("action").call(&mut ctx).await;
        assert_eq!(response.status, 404, "{}", action);
        assert_eq!(body(&response)["error"]["message"], json!("Not found"));
    }

    let mut ctx = ControllerContext::new("PUT", "/users/x")
        .with_param("id", "missing")
        .with_json(&json!({"data": {"age": 1}}));
    assert_eq!(controller.get("update").expect("update").call(&mut ctx).await.status, 404);
    Ok(())
}

struct LeakyHook;

#[async_trait]
impl ControllerHooks for LeakyHook {
    async fn before_update(&self, ctx: &mut ControllerContext, _id: &str, _data: &Value) -> HookOutcome {
        ctx.res.json(json!({"hijacked": true}), 418).into()
    }
}

#[tokio::test]
async fn hook_returning_response_is_a_500() -> Result<()> {
    let schemas = common::registry_with(vec![common::users_definition().controller_hooks(Arc::new(LeakyHook))]);
    let (factory, store) = common::factory_for(schemas, AppConfig::default());
    let controller = factory.create_core_controller(USERS, None)?;
    let ann = store.get(USERS).expect("users").create(json!({"name": "Ann", "email": "a@x.io"})).await?;

    let mut ctx = ControllerContext::new("PUT", "/users/x")
        .with_param("id", ann["id"].as_str().expect("id"))
        .with_json(&json!({"data": {"age": 3}}));
    let response = controller.get("update").expect("update").call(&mut ctx).await;

    assert_eq!(response.status, 500);
    assert_eq!(body(&response)["error"]["message"], json!("Hook contract violation"));
    assert!(body(&response).get("hijacked").is_none());
    Ok(())
}

struct Decorate;

#[async_trait]
impl ControllerHooks for Decorate {
    async fn before_create(&self, ctx: &mut ControllerContext, data: &Value) -> HookOutcome {
        ctx.set("seen", data.clone());
        let mut data = data.clone();
        data["name"] = json!(data["name"].as_str().unwrap_or_default().to_uppercase());
        data.into()
    }

    async fn after_create(&self, _ctx: &mut ControllerContext, result: &Value) -> HookOutcome {
        json!({"id": result["id"], "name": result["name"], "decorated": true}).into()
    }
}

struct DefaultAge;

#[async_trait]
impl RepositoryHooks for DefaultAge {
    async fn before_create(&self, mut data: Value) -> Result<Value, StorageError> {
        if data.get("age").is_none() {
            data["age"] = json!(18);
        }
        Ok(data)
    }
}

#[tokio::test]
async fn hooks_substitute_payload_and_result() -> Result<()> {
    let definition = common::users_definition()
        .controller_hooks(Arc::new(Decorate))
        .repository_hooks(Arc::new(DefaultAge));
    let (factory, store) = common::factory_for(common::registry_with(vec![definition]), AppConfig::default());
    let controller = factory.create_core_controller(USERS, None)?;

    let mut ctx = post("/users", json!({"data": {"name": "ann", "email": "a@x.io"}}));
    let response = controller.get("create").expect("create").call(&mut ctx).await;

    assert_eq!(response.status, 201);
    assert_eq!(body(&response)["data"]["name"], json!("ANN"));
    assert_eq!(body(&response)["data"]["decorated"], json!(true));
    assert_eq!(ctx.get("seen").map(|d| d["name"].clone()), Some(json!("ann")));

    let stored = store.get(USERS).expect("users").find_one(body(&response)["data"]["id"].as_str().expect("id")).await?;
    assert_eq!(stored.map(|s| s["age"].clone()), Some(json!(18)));
    Ok(())
}

#[tokio::test]
async fn extensions_override_by_name() -> Result<()> {
    let repo = FixedRepository::new(vec![]);
    let schemas = common::schemas();
    let custom = action_fn(|ctx| Box::pin(async move { ctx.res.json(json!({"custom": true}), 200) }));
    let controller = build_core_controller(
        schemas.get(USERS).expect("users"),
        repo.factory(),
        AppConfig::default(),
        Some(HashMap::from([("find".to_string(), custom.clone()), ("stats".to_string(), custom)])),
    );

    for action in CORE_ACTIONS {
        assert!(controller.contains(action), "{} missing", action);
    }
    let mut ctx = ControllerContext::new("GET", "/users");
    let response = controller.get("find").expect("find").call(&mut ctx).await;
    assert_eq!(body(&response), json!({"custom": true}));
    assert!(controller.contains("stats"));
    Ok(())
}

struct Broken;

#[async_trait]
impl Repository for Broken {
    async fn find(&self, _: crudloom::filter::FindOptions) -> Result<crudloom::repository::FindResult, StorageError> {
        Err(StorageError::new("connection reset by peer"))
    }
    async fn find_one(&self, _: &str) -> Result<Option<Value>, StorageError> {
        Err(StorageError::new("connection reset by peer"))
    }
    async fn create(&self, _: Value) -> Result<Value, StorageError> {
        Err(StorageError::new("insert or update on table \"orders\" violates foreign key constraint").with_code("23503"))
    }
    async fn update(&self, _: &str, _: Value) -> Result<Option<Value>, StorageError> {
        Ok(None)
    }
    async fn delete(&self, _: &str) -> Result<Option<Value>, StorageError> {
        Ok(None)
    }
}

#[tokio::test]
async fn storage_failures_are_classified() -> Result<()> {
    let broken: Arc<dyn RepositoryFactory> = Arc::new(|_: &str| Ok::<_, StorageError>(Arc::new(Broken) as Arc<dyn Repository>));

    let dev = users_controller(broken.clone(), AppConfig::for_environment(Environment::Development));
    let response = dev.get("find").expect("find").call(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(response.status, 500);
    assert_eq!(body(&response)["error"]["details"], json!("connection reset by peer"));

    let prod = users_controller(broken, AppConfig::for_environment(Environment::Production));
    let response = prod.get("find").expect("find").call(&mut ControllerContext::new("GET", "/users")).await;
    assert_eq!(body(&response)["error"], json!({"message": "Internal server error", "statusCode": 500}));

    let response = prod
        .get("create")
        .expect("create")
        .call(&mut post("/users", json!({"data": {"name": "Ann", "email": "a@x.io"}})))
        .await;
    assert_eq!((response.status, body(&response)["error"]["message"].clone()), (400, json!("Invalid reference")));
    Ok(())
}

#[tokio::test]
async fn responses_are_plain_values() -> Result<()> {
    let response = HttpResponse::json(json!({"ok": true}), 200);
    assert!(response.is_success());
    Ok(())
}
