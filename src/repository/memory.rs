//! In-memory repository. Records live in insertion order behind a tokio
//! `RwLock`; filters go through the same compiler as the SQL backend and are
//! evaluated with `filter::eval`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::filter::eval::{sort_records, values_equal};
use crate::filter::{compile, compile_sort, FindOptions};
use crate::schema::{FieldType, SchemaDescriptor, SchemaRegistry, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

use super::{no_repository, FindResult, Repository, RepositoryFactory, StorageError};

pub struct InMemoryRepository {
    schema: Arc<SchemaDescriptor>,
    records: RwLock<Vec<Map<String, Value>>>,
    next_id: RwLock<i64>,
}

impl InMemoryRepository {
    pub fn new(schema: Arc<SchemaDescriptor>) -> Self {
        Self {
            schema,
            records: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
        }
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    async fn generate_id(&self) -> Value {
        match self.schema.field(ID_FIELD).map(|f| f.field_type) {
            Some(FieldType::Integer) => {
                let mut next = self.next_id.write().await;
                let id = *next;
                *next += 1;
                Value::from(id)
            }
            _ => Value::String(Uuid::new_v4().to_string()),
        }
    }

    fn to_record(&self, data: Value) -> Result<Map<String, Value>, StorageError> {
        let Value::Object(map) = data else {
            return Err(StorageError::new(format!("Cannot store non-object value in {}", self.schema.storage_target())));
        };
        Ok(map
            .into_iter()
            .filter(|(key, _)| {
                let known = self.schema.field(key).is_some();
                if !known {
                    tracing::debug!("Dropping unknown column '{}' for {}", key, self.schema.storage_target());
                }
                known
            })
            .collect())
    }

    fn check_not_null(&self, record: &Map<String, Value>) -> Result<(), StorageError> {
        for field in self.schema.fields().iter().filter(|f| f.required) {
            if record.get(&field.name).map_or(true, Value::is_null) {
                return Err(StorageError::new(format!(
                    "NOT NULL constraint failed: {}.{} (column \"{}\")",
                    self.schema.storage_target(),
                    field.name,
                    field.name
                )));
            }
        }
        Ok(())
    }

    fn check_unique(
        &self,
        records: &[Map<String, Value>],
        candidate: &Map<String, Value>,
        skip: Option<usize>,
    ) -> Result<(), StorageError> {
        for field in self.schema.fields().iter().filter(|f| f.unique) {
            let Some(value) = candidate.get(&field.name).filter(|v| !v.is_null()) else { continue };
            let clash = records
                .iter()
                .enumerate()
                .filter(|(index, _)| Some(*index) != skip)
                .any(|(_, existing)| existing.get(&field.name).is_some_and(|v| values_equal(v, value)));
            if clash {
                return Err(StorageError::new(format!(
                    "UNIQUE constraint failed: {}.{} (column \"{}\")",
                    self.schema.storage_target(),
                    field.name,
                    field.name
                ))
                .with_code("SQLITE_CONSTRAINT"));
            }
        }
        Ok(())
    }

    fn position(records: &[Map<String, Value>], id: &str) -> Option<usize> {
        let id = Value::String(id.to_string());
        records
            .iter()
            .position(|r| r.get(ID_FIELD).is_some_and(|v| values_equal(v, &id)))
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find(&self, options: FindOptions) -> Result<FindResult, StorageError> {
        let condition = options.filters.as_ref().and_then(|tree| compile(self.schema.as_ref(), tree));
        let order = compile_sort(self.schema.as_ref(), &options.sort);

        let mut matched: Vec<Map<String, Value>> = {
            let records = self.records.read().await;
            records
                .iter()
                .filter(|r| condition.as_ref().map_or(true, |c| c.matches(r)))
                .cloned()
                .collect()
        };
        sort_records(&mut matched, &order);

        let total = matched.len() as u64;
        let data = match options.pagination {
            Some(pagination) => matched
                .into_iter()
                .skip(pagination.offset() as usize)
                .take(pagination.page_size as usize)
                .map(Value::Object)
                .collect(),
            None => matched.into_iter().map(Value::Object).collect(),
        };

        Ok(FindResult { data, total })
    }

    async fn find_one(&self, id: &str) -> Result<Option<Value>, StorageError> {
        let records = self.records.read().await;
        Ok(Self::position(&records, id).map(|index| Value::Object(records[index].clone())))
    }

    async fn create(&self, data: Value) -> Result<Value, StorageError> {
        let data = match self.schema.repository_hooks() {
            Some(hooks) => hooks.before_create(data).await?,
            None => data,
        };

        let mut record = self.to_record(data)?;
        if record.get(ID_FIELD).map_or(true, Value::is_null) {
            record.insert(ID_FIELD.to_string(), self.generate_id().await);
        }
        if self.schema.options().timestamps {
            let now = Value::String(Utc::now().to_rfc3339());
            record.insert(CREATED_AT_FIELD.to_string(), now.clone());
            record.insert(UPDATED_AT_FIELD.to_string(), now);
        }
        self.check_not_null(&record)?;

        {
            let mut records = self.records.write().await;
            self.check_unique(&records, &record, None)?;
            records.push(record.clone());
        }

        let created = Value::Object(record);
        if let Some(hooks) = self.schema.repository_hooks() {
            hooks.after_create(&created).await?;
        }
        Ok(created)
    }

    async fn update(&self, id: &str, data: Value) -> Result<Option<Value>, StorageError> {
        if self.find_one(id).await?.is_none() {
            return Ok(None);
        }

        let data = match self.schema.repository_hooks() {
            Some(hooks) => hooks.before_update(id, data).await?,
            None => data,
        };
        let mut changes = self.to_record(data)?;
        changes.remove(ID_FIELD);

        let updated = {
            let mut records = self.records.write().await;
            let Some(index) = Self::position(&records, id) else { return Ok(None) };

            let mut merged = records[index].clone();
            merged.extend(changes);
            if self.schema.options().timestamps {
                merged.insert(UPDATED_AT_FIELD.to_string(), Value::String(Utc::now().to_rfc3339()));
            }
            self.check_not_null(&merged)?;
            self.check_unique(&records, &merged, Some(index))?;
            records[index] = merged.clone();
            Value::Object(merged)
        };

        if let Some(hooks) = self.schema.repository_hooks() {
            hooks.after_update(&updated).await?;
        }
        Ok(Some(updated))
    }

    async fn delete(&self, id: &str) -> Result<Option<Value>, StorageError> {
        let mut records = self.records.write().await;
        Ok(Self::position(&records, id).map(|index| Value::Object(records.remove(index))))
    }
}

/// One [`InMemoryRepository`] per registered schema.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    repositories: HashMap<String, Arc<InMemoryRepository>>,
}

impl InMemoryStore {
    pub fn new(schemas: &SchemaRegistry) -> Self {
        let repositories = schemas
            .iter()
            .map(|schema| (schema.name().to_string(), Arc::new(InMemoryRepository::new(schema.clone()))))
            .collect();
        Self { repositories }
    }

    pub fn get(&self, schema: &str) -> Option<Arc<InMemoryRepository>> {
        self.repositories.get(schema).cloned()
    }
}

impl RepositoryFactory for InMemoryStore {
    fn repository(&self, schema: &str) -> Result<Arc<dyn Repository>, StorageError> {
        match self.repositories.get(schema) {
            Some(repo) => Ok(repo.clone() as Arc<dyn Repository>),
            None => Err(no_repository(schema)),
        }
    }
}
