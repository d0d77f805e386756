pub mod hooks;
pub mod manifest;
pub mod validation;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::filter::CompileTarget;

pub use hooks::{ControllerHooks, HookOutcome, RepositoryHooks};
pub use manifest::{load_manifest, parse_manifest, Manifest, ManifestError, ManifestFormat};
pub use validation::{FieldRules, RuleValidator, ValidationIssue, Validator};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaDefinitionError {
    #[error("Invalid Schema definition: name is required")]
    MissingName,
    #[error("Invalid Schema definition: storage target is required for {0}")]
    MissingStorageTarget(String),
    #[error("Invalid Schema definition: singular and plural names are required for {0}")]
    MissingNames(String),
    #[error("Invalid Schema definition: field '{field}' is declared twice on {schema}")]
    DuplicateField { schema: String, field: String },
    #[error("Invalid Schema definition: schema '{0}' is already registered")]
    DuplicateSchema(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    Timestamp,
    Json,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Uuid => "uuid",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
        }
    }

    pub fn pg_type(&self) -> &'static str {
        match self {
            FieldType::String => "TEXT",
            FieldType::Text => "TEXT",
            FieldType::Integer => "BIGINT",
            FieldType::Float => "DOUBLE PRECISION",
            FieldType::Boolean => "BOOLEAN",
            FieldType::Uuid => "UUID",
            FieldType::Timestamp => "TIMESTAMPTZ",
            FieldType::Json => "JSONB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default, flatten)]
    pub rules: FieldRules,
}

fn default_field_type() -> FieldType {
    FieldType::String
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            unique: false,
            required: false,
            rules: FieldRules::default(),
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn rules(mut self, rules: FieldRules) -> Self {
        self.rules = rules;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemaKind {
    #[default]
    CollectionType,
    SingleType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub singular: String,
    pub plural: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaOptions {
    #[serde(default)]
    pub timestamps: bool,
}

#[derive(Clone, Default)]
pub struct SchemaHooks {
    pub repository: Option<Arc<dyn RepositoryHooks>>,
    pub controller: Option<Arc<dyn ControllerHooks>>,
}

impl std::fmt::Debug for SchemaHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaHooks")
            .field("repository", &self.repository.is_some())
            .field("controller", &self.controller.is_some())
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct SchemaValidators {
    pub create: Option<Arc<dyn Validator>>,
    pub update: Option<Arc<dyn Validator>>,
}

impl std::fmt::Debug for SchemaValidators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaValidators")
            .field("create", &self.create.is_some())
            .field("update", &self.update.is_some())
            .finish()
    }
}

/// Author-facing input to [`define_schema`]. The serde part is what a
/// manifest can express; hooks and validators are attached in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    pub name: String,
    pub storage_target: String,
    #[serde(default)]
    pub kind: SchemaKind,
    pub info: SchemaInfo,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub options: SchemaOptions,
    #[serde(skip)]
    pub hooks: SchemaHooks,
    #[serde(skip)]
    pub validators: SchemaValidators,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, storage_target: impl Into<String>, singular: &str, plural: &str) -> Self {
        Self {
            name: name.into(),
            storage_target: storage_target.into(),
            info: SchemaInfo {
                singular: singular.to_string(),
                plural: plural.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.options.timestamps = enabled;
        self
    }

    pub fn controller_hooks(mut self, hooks: Arc<dyn ControllerHooks>) -> Self {
        self.hooks.controller = Some(hooks);
        self
    }

    pub fn repository_hooks(mut self, hooks: Arc<dyn RepositoryHooks>) -> Self {
        self.hooks.repository = Some(hooks);
        self
    }

    pub fn create_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.create = Some(validator);
        self
    }

    pub fn update_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.update = Some(validator);
        self
    }

    /// Installs rule validators derived from the field list, unless a
    /// validator was already attached for that operation.
    pub fn with_field_rules(mut self) -> Self {
        if self.validators.create.is_none() {
            self.validators.create = Some(Arc::new(RuleValidator::for_create(&self.fields)));
        }
        if self.validators.update.is_none() {
            self.validators.update = Some(Arc::new(RuleValidator::for_update(&self.fields)));
        }
        self
    }
}

/// Validated, immutable description of one resource.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    name: String,
    storage_target: String,
    kind: SchemaKind,
    info: SchemaInfo,
    fields: Vec<FieldDef>,
    options: SchemaOptions,
    hooks: SchemaHooks,
    validators: SchemaValidators,
}

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Validates a definition and fills in defaults: the display name falls back
/// to the capitalized singular, and an `id` column is implied.
pub fn define_schema(definition: SchemaDefinition) -> Result<SchemaDescriptor, SchemaDefinitionError> {
    let SchemaDefinition { name, storage_target, kind, mut info, fields, options, hooks, validators } = definition;

    if name.trim().is_empty() {
        return Err(SchemaDefinitionError::MissingName);
    }
    if storage_target.trim().is_empty() {
        return Err(SchemaDefinitionError::MissingStorageTarget(name));
    }
    if info.singular.trim().is_empty() || info.plural.trim().is_empty() {
        return Err(SchemaDefinitionError::MissingNames(name));
    }

    if info.display_name.as_deref().map_or(true, |d| d.trim().is_empty()) {
        info.display_name = Some(capitalize(&info.singular));
    }

    let mut seen = std::collections::HashSet::new();
    for field in &fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaDefinitionError::DuplicateField { schema: name, field: field.name.clone() });
        }
    }

    let mut all_fields = Vec::with_capacity(fields.len() + 3);
    if !fields.iter().any(|f| f.name == ID_FIELD) {
        all_fields.push(FieldDef::new(ID_FIELD, FieldType::Uuid).unique());
    }
    all_fields.extend(fields);
    if options.timestamps {
        for column in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            if !all_fields.iter().any(|f| f.name == column) {
                all_fields.push(FieldDef::new(column, FieldType::Timestamp));
            }
        }
    }

    Ok(SchemaDescriptor {
        name,
        storage_target,
        kind,
        info,
        fields: all_fields,
        options,
        hooks,
        validators,
    })
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl SchemaDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage_target(&self) -> &str {
        &self.storage_target
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    pub fn singular(&self) -> &str {
        &self.info.singular
    }

    pub fn plural(&self) -> &str {
        &self.info.plural
    }

    pub fn display_name(&self) -> &str {
        self.info.display_name.as_deref().unwrap_or(&self.info.singular)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn options(&self) -> SchemaOptions {
        self.options
    }

    pub fn repository_hooks(&self) -> Option<&Arc<dyn RepositoryHooks>> {
        self.hooks.repository.as_ref()
    }

    pub fn controller_hooks(&self) -> Option<&Arc<dyn ControllerHooks>> {
        self.hooks.controller.as_ref()
    }

    pub fn create_validator(&self) -> Option<&Arc<dyn Validator>> {
        self.validators.create.as_ref()
    }

    pub fn update_validator(&self) -> Option<&Arc<dyn Validator>> {
        self.validators.update.as_ref()
    }
}

impl CompileTarget for SchemaDescriptor {
    fn target_name(&self) -> &str {
        &self.name
    }

    fn field_type(&self, field: &str) -> Option<FieldType> {
        self.field(field).map(|f| f.field_type)
    }
}

/// Descriptors keyed by schema name, e.g. `api::user.user`.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<SchemaDescriptor>>,
    order: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: SchemaDescriptor) -> Result<Arc<SchemaDescriptor>, SchemaDefinitionError> {
        if self.schemas.contains_key(descriptor.name()) {
            return Err(SchemaDefinitionError::DuplicateSchema(descriptor.name().to_string()));
        }
        let name = descriptor.name().to_string();
        let descriptor = Arc::new(descriptor);
        tracing::debug!("Registered schema {} ({})", name, descriptor.storage_target());
        self.order.push(name.clone());
        self.schemas.insert(name, descriptor.clone());
        Ok(descriptor)
    }

    pub fn define(&mut self, definition: SchemaDefinition) -> Result<Arc<SchemaDescriptor>, SchemaDefinitionError> {
        self.register(define_schema(definition)?)
    }

    pub fn get(&self, name: &str) -> Option<Arc<SchemaDescriptor>> {
        self.schemas.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SchemaDescriptor>> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
