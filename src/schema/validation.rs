//! Payload validators for create and update.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{FieldDef, FieldType, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};

/// One problem found in a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted path into the payload; the field name for top-level keys.
    pub path: String,
    pub message: String,
    pub code: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self { path: path.into(), message: message.into(), code: code.into() }
    }
}

/// Checks a payload and returns its sanitized form.
pub trait Validator: Send + Sync {
    fn validate(&self, data: &Value) -> Result<Value, Vec<ValidationIssue>>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<Value, Vec<ValidationIssue>> + Send + Sync,
{
    fn validate(&self, data: &Value) -> Result<Value, Vec<ValidationIssue>> {
        self(data)
    }
}

/// Per-field constraints, as written in a manifest next to the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// `email` or `uuid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

struct CompiledField {
    def: FieldDef,
    pattern: Option<Regex>,
}

/// Validator built from a schema's field list.
///
/// Server-managed columns (`id`, timestamps) are removed from the output.
/// Unknown keys are dropped, or rejected when `strict` is set.
pub struct RuleValidator {
    fields: Vec<CompiledField>,
    partial: bool,
    strict: bool,
}

impl RuleValidator {
    pub fn for_create(fields: &[FieldDef]) -> Self {
        Self::build(fields, false)
    }

    /// Required fields are only checked when present.
    pub fn for_update(fields: &[FieldDef]) -> Self {
        Self::build(fields, true)
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    fn build(fields: &[FieldDef], partial: bool) -> Self {
        let fields = fields
            .iter()
            .filter(|f| !is_managed(&f.name))
            .map(|def| {
                let pattern = def.rules.pattern.as_deref().and_then(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!("Ignoring invalid pattern for field {}: {}", def.name, e);
                        None
                    }
                });
                CompiledField { def: def.clone(), pattern }
            })
            .collect();
        Self { fields, partial, strict: false }
    }
}

fn is_managed(name: &str) -> bool {
    matches!(name, ID_FIELD | CREATED_AT_FIELD | UPDATED_AT_FIELD)
}

impl Validator for RuleValidator {
    fn validate(&self, data: &Value) -> Result<Value, Vec<ValidationIssue>> {
        let Some(input) = data.as_object() else {
            return Err(vec![ValidationIssue::new("", "Expected an object", "invalid_type")]);
        };

        let mut issues = Vec::new();
        let mut output = Map::new();

        for (key, value) in input {
            if self.fields.iter().any(|f| &f.def.name == key) {
                continue;
            }
            if is_managed(key) {
                continue;
            }
            if self.strict {
                issues.push(ValidationIssue::new(key, format!("Unrecognized key \"{}\"", key), "unrecognized_keys"));
            }
        }

        for field in &self.fields {
            let name = &field.def.name;
            match input.get(name) {
                None | Some(Value::Null) if field.def.required && !self.partial => {
                    issues.push(ValidationIssue::new(name, format!("{} is required", name), "required_field"));
                }
                Some(Value::Null) if field.def.required => {
                    issues.push(ValidationIssue::new(name, format!("{} is required", name), "required_field"));
                }
                Some(value) => {
                    let before = issues.len();
                    check_field(field, value, &mut issues);
                    if issues.len() == before {
                        output.insert(name.clone(), value.clone());
                    }
                }
                None => {}
            }
        }

        if issues.is_empty() {
            Ok(Value::Object(output))
        } else {
            Err(issues)
        }
    }
}

fn check_field(field: &CompiledField, value: &Value, issues: &mut Vec<ValidationIssue>) {
    let name = field.def.name.as_str();
    if value.is_null() {
        return;
    }

    if !type_matches(field.def.field_type, value) {
        issues.push(ValidationIssue::new(
            name,
            format!("{} must be of type {}", name, field.def.field_type.as_str()),
            "invalid_type",
        ));
        return;
    }

    let rules = &field.def.rules;
    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = rules.min_length {
            if len < min {
                issues.push(ValidationIssue::new(name, format!("{} must be at least {} characters", name, min), "too_short"));
            }
        }
        if let Some(max) = rules.max_length {
            if len > max {
                issues.push(ValidationIssue::new(name, format!("{} must be at most {} characters", name, max), "too_long"));
            }
        }
        if let Some(re) = &field.pattern {
            if !re.is_match(s) {
                issues.push(ValidationIssue::new(name, format!("{} does not match required pattern", name), "invalid_pattern"));
            }
        }
        if let Some(format) = &rules.format {
            if let Some(message) = check_format(name, s, format) {
                issues.push(ValidationIssue::new(name, message, "invalid_format"));
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = rules.minimum {
            if n < min {
                issues.push(ValidationIssue::new(name, format!("{} must be at least {}", name, min), "too_small"));
            }
        }
        if let Some(max) = rules.maximum {
            if n > max {
                issues.push(ValidationIssue::new(name, format!("{} must be at most {}", name, max), "too_big"));
            }
        }
    }

    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|a| value_eq(value, a)) {
            let shown: Vec<String> = allowed.iter().take(5).map(Value::to_string).collect();
            issues.push(ValidationIssue::new(
                name,
                format!("{} must be one of: {}", name, shown.join(", ")),
                "invalid_value",
            ));
        }
    }
}

fn type_matches(field_type: FieldType, value: &Value) -> bool {
    match field_type {
        FieldType::String | FieldType::Text | FieldType::Uuid | FieldType::Timestamp => value.is_string(),
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Float => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Json => true,
    }
}

fn check_format(name: &str, s: &str, format: &str) -> Option<String> {
    match format.to_lowercase().as_str() {
        "email" if !s.contains('@') || s.len() < 3 => Some(format!("{} must be a valid email", name)),
        "uuid" if uuid::Uuid::parse_str(s).is_err() => Some(format!("{} must be a valid UUID", name)),
        _ => None,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new(ID_FIELD, FieldType::Uuid),
            FieldDef::new("name", FieldType::String).required().rules(FieldRules {
                min_length: Some(2),
                ..Default::default()
            }),
            FieldDef::new("email", FieldType::String).required().rules(FieldRules {
                format: Some("email".into()),
                ..Default::default()
            }),
            FieldDef::new("age", FieldType::Integer).rules(FieldRules {
                minimum: Some(0.0),
                ..Default::default()
            }),
        ]
    }

    #[test]
    fn create_requires_fields_and_sanitizes() {
        let validator = RuleValidator::for_create(&user_fields());
        let out = validator
            .validate(&json!({"id": "x", "name": "Ann", "email": "ann@example.com", "extra": 1}))
            .unwrap();
        assert_eq!(out, json!({"name": "Ann", "email": "ann@example.com"}));

        let issues = validator.validate(&json!({"name": "A", "age": -1})).unwrap_err();
        let codes: Vec<(&str, &str)> = issues.iter().map(|i| (i.path.as_str(), i.code.as_str())).collect();
        assert_eq!(codes, vec![("name", "too_short"), ("email", "required_field"), ("age", "too_small")]);
    }

    #[test]
    fn update_is_partial() {
        let validator = RuleValidator::for_update(&user_fields());
        assert_eq!(validator.validate(&json!({"age": 4})).unwrap(), json!({"age": 4}));
        assert_eq!(validator.validate(&json!({"name": null})).unwrap_err()[0].code, "required_field");
    }

    #[test]
    fn strict_rejects_unknown_keys() {
        let validator = RuleValidator::for_update(&user_fields()).strict();
        let issues = validator.validate(&json!({"nickname": "x"})).unwrap_err();
        assert_eq!(issues, vec![ValidationIssue::new("nickname", "Unrecognized key \"nickname\"", "unrecognized_keys")]);
    }

    #[test]
    fn closures_are_validators() {
        let validator = |data: &Value| -> Result<Value, Vec<ValidationIssue>> { Ok(data.clone()) };
        assert_eq!(Validator::validate(&validator, &json!({"a": 1})).unwrap(), json!({"a": 1}));
    }
}
