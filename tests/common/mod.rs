#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Once};

use async_trait::async_trait;
use serde_json::{json, Value};

use crudloom::config::AppConfig;
use crudloom::controller::{ControllerContext, HttpResponse};
use crudloom::filter::FindOptions;
use crudloom::repository::{FindResult, InMemoryStore, Repository, RepositoryFactory, StorageError};
use crudloom::resource::{Factory, FactoryContext};
use crudloom::schema::{FieldDef, FieldType, SchemaDefinition, SchemaRegistry};

pub const USERS: &str = "api::user.user";
pub const PRODUCTS: &str = "api::product.product";

static TRACING: Once = Once::new();

/// Routes tracing output through the test harness. Set RUST_LOG to see it.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn users_definition() -> SchemaDefinition {
    SchemaDefinition::new(USERS, "users", "user", "users")
        .field(FieldDef::new("name", FieldType::String).required())
        .field(FieldDef::new("email", FieldType::String).unique().required())
        .field(FieldDef::new("age", FieldType::Integer))
        .timestamps(true)
}

pub fn products_definition() -> SchemaDefinition {
    SchemaDefinition::new(PRODUCTS, "products", "product", "products")
        .field(FieldDef::new("title", FieldType::String).required())
        .field(FieldDef::new("price", FieldType::Float))
}

pub fn registry_with(definitions: Vec<SchemaDefinition>) -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    for definition in definitions {
        registry.define(definition).expect("valid schema");
    }
    registry
}

pub fn schemas() -> SchemaRegistry {
    registry_with(vec![users_definition().with_field_rules(), products_definition().with_field_rules()])
}

pub fn factory_for(schemas: SchemaRegistry, config: AppConfig) -> (Factory, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new(&schemas));
    let factory = Factory::new(FactoryContext {
        repository: store.clone(),
        schemas: Arc::new(schemas),
        config,
    });
    (factory, store)
}

pub fn factory() -> (Factory, Arc<InMemoryStore>) {
    factory_for(schemas(), AppConfig::default())
}

pub fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub fn body(response: &HttpResponse) -> Value {
    response.json_body().cloned().unwrap_or(Value::Null)
}

pub fn post(path: &str, payload: Value) -> ControllerContext {
    ControllerContext::new("POST", path).with_json(&payload)
}

/// Repository that answers `find` with fixed rows and records the options it saw.
pub struct FixedRepository {
    pub rows: Vec<Value>,
    pub seen: tokio::sync::Mutex<Vec<FindOptions>>,
}

impl FixedRepository {
    pub fn new(rows: Vec<Value>) -> Arc<Self> {
        Arc::new(Self { rows, seen: tokio::sync::Mutex::new(Vec::new()) })
    }

    pub fn factory(self: &Arc<Self>) -> Arc<dyn RepositoryFactory> {
        let repo = self.clone();
        Arc::new(move |_: &str| Ok::<_, StorageError>(repo.clone() as Arc<dyn Repository>))
    }
}

#[async_trait]
impl Repository for FixedRepository {
    async fn find(&self, options: FindOptions) -> Result<FindResult, StorageError> {
        self.seen.lock().await.push(options);
        Ok(FindResult { data: self.rows.clone(), total: self.rows.len() as u64 })
    }

    async fn find_one(&self, id: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.rows.iter().find(|row| row["id"] == json!(id)).cloned())
    }

    async fn create(&self, data: Value) -> Result<Value, StorageError> {
        Ok(data)
    }

    async fn update(&self, id: &str, data: Value) -> Result<Option<Value>, StorageError> {
        Ok(self.rows.iter().any(|row| row["id"] == json!(id)).then_some(data))
    }

    async fn delete(&self, id: &str) -> Result<Option<Value>, StorageError> {
        self.find_one(id).await
    }
}
