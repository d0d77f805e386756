//! Schema manifests: a YAML or JSON document listing schema definitions.
//!
//! ```yaml
//! schemas:
//!   - name: api::user.user
//!     storageTarget: users
//!     info: { singular: user, plural: users }
//!     fields:
//!       - { name: email, type: string, unique: true, required: true, format: email }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{SchemaDefinition, SchemaDefinitionError, SchemaRegistry};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid YAML manifest: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Definition(#[from] SchemaDefinitionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ManifestFormat::Json,
            _ => ManifestFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub schemas: Vec<SchemaDefinition>,
}

impl Manifest {
    /// Defines every schema, attaching rule validators derived from the
    /// declared fields.
    pub fn into_registry(self) -> Result<SchemaRegistry, ManifestError> {
        let mut registry = SchemaRegistry::new();
        for definition in self.schemas {
            registry.define(definition.with_field_rules())?;
        }
        tracing::info!("Loaded {} schema(s) from manifest", registry.len());
        Ok(registry)
    }
}

pub fn parse_manifest(text: &str, format: ManifestFormat) -> Result<Manifest, ManifestError> {
    let manifest = match format {
        ManifestFormat::Yaml => serde_yaml::from_str(text)?,
        ManifestFormat::Json => serde_json::from_str(text)?,
    };
    Ok(manifest)
}

pub fn load_manifest(path: impl AsRef<Path>) -> Result<Manifest, ManifestError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_manifest(&text, ManifestFormat::from_path(path))
}
