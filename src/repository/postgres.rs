//! PostgreSQL repository on sqlx. Rows come back as `to_jsonb(row)` so the
//! backend never needs a Rust struct per table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::QueryScalar;
use sqlx::{PgPool, Postgres};
use tracing::{debug, info};
use uuid::Uuid;

use crate::filter::filter_where::quote_ident;
use crate::filter::{compile, compile_sort, Condition, FilterOrder, FilterWhere, FindOptions, Predicate};
use crate::schema::{FieldType, SchemaDescriptor, SchemaRegistry, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

use super::{no_repository, FindResult, Repository, RepositoryFactory, StorageError};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    schema: Arc<SchemaDescriptor>,
}

impl PgRepository {
    pub fn new(pool: PgPool, schema: Arc<SchemaDescriptor>) -> Self {
        Self { pool, schema }
    }

    fn table(&self) -> String {
        quote_ident(self.schema.storage_target())
    }

    fn cast_for(field_type: FieldType) -> Option<&'static str> {
        match field_type {
            FieldType::Uuid => Some("uuid"),
            FieldType::Timestamp => Some("timestamptz"),
            _ => None,
        }
    }

    fn casts(&self) -> HashMap<String, &'static str> {
        self.schema
            .fields()
            .iter()
            .filter_map(|f| Some((f.name.clone(), Self::cast_for(f.field_type)?)))
            .collect()
    }

    fn placeholder(&self, index: usize, column: &str) -> String {
        match self.schema.field(column).and_then(|f| Self::cast_for(f.field_type)) {
            Some(cast) => format!("${}::{}", index, cast),
            None => format!("${}", index),
        }
    }

    /// Ids that cannot exist in the id column's type match nothing.
    fn id_value(&self, id: &str) -> Option<Value> {
        match self.schema.field(ID_FIELD).map(|f| f.field_type) {
            Some(FieldType::Uuid) => Uuid::parse_str(id).ok().map(|u| Value::String(u.to_string())),
            Some(FieldType::Integer) => id.trim().parse::<i64>().ok().map(Value::from),
            _ => Some(Value::String(id.to_string())),
        }
    }

    fn id_condition(&self, id: Value) -> Condition {
        Condition::Column { column: ID_FIELD.to_string(), predicate: Predicate::Eq(id) }
    }

    fn columns(&self, data: Value) -> Result<Map<String, Value>, StorageError> {
        let Value::Object(map) = data else {
            return Err(StorageError::new(format!("Cannot store non-object value in {}", self.schema.storage_target())));
        };
        Ok(map.into_iter().filter(|(key, _)| self.schema.field(key).is_some()).collect())
    }

    /// `CREATE TABLE IF NOT EXISTS` for the schema's columns.
    pub fn create_table_ddl(&self) -> String {
        let mut columns = Vec::new();
        for field in self.schema.fields() {
            let mut column = format!("{} {}", quote_ident(&field.name), field.field_type.pg_type());
            if field.name == ID_FIELD {
                column += match field.field_type {
                    FieldType::Uuid => " PRIMARY KEY DEFAULT gen_random_uuid()",
                    FieldType::Integer => " GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
                    _ => " PRIMARY KEY",
                };
            } else {
                if field.required {
                    column += " NOT NULL";
                }
                if field.unique {
                    column += " UNIQUE";
                }
                if field.name == CREATED_AT_FIELD || field.name == UPDATED_AT_FIELD {
                    column += " DEFAULT now()";
                }
            }
            columns.push(column);
        }
        format!("CREATE TABLE IF NOT EXISTS {} (\n    {}\n)", self.table(), columns.join(",\n    "))
    }

    pub async fn ensure_table(&self) -> Result<(), StorageError> {
        sqlx::query(&self.create_table_ddl()).execute(&self.pool).await?;
        info!("Ensured table {} for schema {}", self.schema.storage_target(), self.schema.name());
        Ok(())
    }

    async fn fetch_optional(&self, sql: &str, params: &[Value]) -> Result<Option<Value>, StorageError> {
        debug!("SQL: {} {:?}", sql, params);
        let mut q = sqlx::query_scalar::<_, Value>(sql);
        for p in params {
            q = bind_param(q, p);
        }
        Ok(q.fetch_optional(&self.pool).await?)
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn find(&self, options: FindOptions) -> Result<FindResult, StorageError> {
        let condition = options.filters.as_ref().and_then(|tree| compile(self.schema.as_ref(), tree));
        let order = compile_sort(self.schema.as_ref(), &options.sort);

        let (where_sql, mut params) = FilterWhere::generate_with_casts(condition.as_ref(), 0, self.casts());
        let order_sql = FilterOrder::generate(&order);

        let count_sql = format!("SELECT COUNT(*) FROM {} WHERE {}", self.table(), where_sql);
        debug!("SQL: {} {:?}", count_sql, params);
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for p in &params {
            count_q = bind_param(count_q, p);
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let mut page_sql = String::new();
        if let Some(pagination) = options.pagination {
            params.push(Value::from(pagination.page_size as i64));
            page_sql += &format!(" LIMIT ${}", params.len());
            params.push(Value::from(pagination.offset() as i64));
            page_sql += &format!(" OFFSET ${}", params.len());
        }

        let sql = format!(
            "SELECT to_jsonb(t) FROM (SELECT * FROM {} WHERE {} {}{}) t",
            self.table(),
            where_sql,
            order_sql,
            page_sql
        );
        debug!("SQL: {} {:?}", sql, params);
        let mut q = sqlx::query_scalar::<_, Value>(&sql);
        for p in &params {
            q = bind_param(q, p);
        }
        let data = q.fetch_all(&self.pool).await?;

        Ok(FindResult { data, total: total.max(0) as u64 })
    }

    async fn find_one(&self, id: &str) -> Result<Option<Value>, StorageError> {
        let Some(id) = self.id_value(id) else { return Ok(None) };
        let condition = self.id_condition(id);
        let (where_sql, params) = FilterWhere::generate_with_casts(Some(&condition), 0, self.casts());
        let sql = format!("SELECT to_jsonb(t) FROM {} t WHERE {}", self.table(), where_sql);
        self.fetch_optional(&sql, &params).await
    }

    async fn create(&self, data: Value) -> Result<Value, StorageError> {
        let data = match self.schema.repository_hooks() {
            Some(hooks) => hooks.before_create(data).await?,
            None => data,
        };

        let mut record = self.columns(data)?;
        if record.get(ID_FIELD).map_or(true, Value::is_null) {
            record.remove(ID_FIELD);
        }
        if self.schema.options().timestamps {
            let now = Value::String(Utc::now().to_rfc3339());
            record.insert(CREATED_AT_FIELD.to_string(), now.clone());
            record.insert(UPDATED_AT_FIELD.to_string(), now);
        }

        let insert = if record.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING *", self.table())
        } else {
            let columns: Vec<String> = record.keys().map(|k| quote_ident(k)).collect();
            let placeholders: Vec<String> = record
                .keys()
                .enumerate()
                .map(|(i, k)| self.placeholder(i + 1, k))
                .collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
                self.table(),
                columns.join(", "),
                placeholders.join(", ")
            )
        };
        let sql = format!("WITH inserted AS ({}) SELECT to_jsonb(inserted) FROM inserted", insert);
        let params: Vec<Value> = record.into_iter().map(|(_, v)| v).collect();

        let created = self
            .fetch_optional(&sql, &params)
            .await?
            .ok_or_else(|| StorageError::new(format!("Insert into {} returned no row", self.schema.storage_target())))?;

        if let Some(hooks) = self.schema.repository_hooks() {
            hooks.after_create(&created).await?;
        }
        Ok(created)
    }

    async fn update(&self, id: &str, data: Value) -> Result<Option<Value>, StorageError> {
        let Some(id_value) = self.id_value(id) else { return Ok(None) };

        let data = match self.schema.repository_hooks() {
            Some(hooks) => hooks.before_update(id, data).await?,
            None => data,
        };
        let mut changes = self.columns(data)?;
        changes.remove(ID_FIELD);
        if self.schema.options().timestamps {
            changes.insert(UPDATED_AT_FIELD.to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        if changes.is_empty() {
            return self.find_one(id).await;
        }

        let assignments: Vec<String> = changes
            .keys()
            .enumerate()
            .map(|(i, k)| format!("{} = {}", quote_ident(k), self.placeholder(i + 1, k)))
            .collect();
        let mut params: Vec<Value> = changes.into_iter().map(|(_, v)| v).collect();
        let id_placeholder = self.placeholder(params.len() + 1, ID_FIELD);
        params.push(id_value);

        let sql = format!(
            "WITH updated AS (UPDATE {} SET {} WHERE {} = {} RETURNING *) SELECT to_jsonb(updated) FROM updated",
            self.table(),
            assignments.join(", "),
            quote_ident(ID_FIELD),
            id_placeholder
        );
        let updated = self.fetch_optional(&sql, &params).await?;

        if let (Some(record), Some(hooks)) = (&updated, self.schema.repository_hooks()) {
            hooks.after_update(record).await?;
        }
        Ok(updated)
    }

    async fn delete(&self, id: &str) -> Result<Option<Value>, StorageError> {
        let Some(id_value) = self.id_value(id) else { return Ok(None) };
        let sql = format!(
            "WITH deleted AS (DELETE FROM {} WHERE {} = {} RETURNING *) SELECT to_jsonb(deleted) FROM deleted",
            self.table(),
            quote_ident(ID_FIELD),
            self.placeholder(1, ID_FIELD)
        );
        self.fetch_optional(&sql, &[id_value]).await
    }
}

fn bind_param<'q, O>(
    q: QueryScalar<'q, Postgres, O, PgArguments>,
    v: &'q Value,
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(u) = n.as_u64() {
                q.bind(u as i64)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}

/// Hands out a [`PgRepository`] per registered schema over one pool.
#[derive(Clone)]
pub struct PgRepositoryFactory {
    pool: PgPool,
    schemas: Arc<SchemaRegistry>,
}

impl PgRepositoryFactory {
    pub fn new(pool: PgPool, schemas: Arc<SchemaRegistry>) -> Self {
        Self { pool, schemas }
    }

    pub async fn connect(database_url: &str, schemas: Arc<SchemaRegistry>) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        info!("Connected to PostgreSQL");
        Ok(Self::new(pool, schemas))
    }

    pub async fn ensure_tables(&self) -> Result<(), StorageError> {
        for schema in self.schemas.iter() {
            PgRepository::new(self.pool.clone(), schema.clone()).ensure_table().await?;
        }
        Ok(())
    }
}

impl RepositoryFactory for PgRepositoryFactory {
    fn repository(&self, schema: &str) -> Result<Arc<dyn Repository>, StorageError> {
        let descriptor = self.schemas.get(schema).ok_or_else(|| no_repository(schema))?;
        Ok(Arc::new(PgRepository::new(self.pool.clone(), descriptor)))
    }
}
