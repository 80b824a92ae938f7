// validation/mod.rs - Per-verb payload validation
//
// Rules are declared per field in the resource registry. A payload is checked
// field by field in declaration order and the first failure wins. Keys that no
// rule mentions are rejected. The returned object only carries declared fields,
// already trimmed, cased and coerced.

use serde::Deserialize;
use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn expected(&self) -> &'static str {
        match self {
            FieldType::Any => "a value",
            FieldType::String => "a string",
            FieldType::Number => "a number",
            FieldType::Integer => "an integer",
            FieldType::Boolean => "a boolean",
            FieldType::Object => "of type object",
            FieldType::Array => "an array",
        }
    }
}

/// Constraints for a single field
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default)]
    pub uppercase: bool,
    /// Minimum length for strings and arrays, minimum value for numbers
    #[serde(default)]
    pub min: Option<f64>,
    /// Maximum length for strings and arrays, maximum value for numbers
    #[serde(default)]
    pub max: Option<f64>,
    /// Allowed values; empty means unrestricted
    #[serde(default)]
    pub valid: Vec<Value>,
    #[serde(default)]
    pub allow_empty: bool,
}

impl FieldRule {
    /// `required non-empty string`
    pub fn required_string() -> Self {
        Self {
            kind: FieldType::String,
            required: true,
            ..Default::default()
        }
    }

    pub fn optional_string() -> Self {
        Self {
            kind: FieldType::String,
            ..Default::default()
        }
    }
}

/// Ordered field → rule mapping for one verb
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct RuleSet {
    fields: Vec<(String, FieldRule)>,
}

impl TryFrom<Map<String, Value>> for RuleSet {
    type Error = serde_json::Error;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        let mut fields = Vec::with_capacity(map.len());
        for (name, rule) in map {
            fields.push((name, serde_json::from_value(rule)?));
        }
        Ok(Self { fields })
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the rule for `name`
    pub fn with(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = rule,
            None => self.fields.push((name, rule)),
        }
        self
    }

    /// Add `rule` only when `name` has no declared rule yet
    pub fn with_default(self, name: &str, rule: FieldRule) -> Self {
        if self.get(name).is_some() {
            self
        } else {
            self.with(name, rule)
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, rule)| rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("\"{0}\" is required")]
    Required(String),

    #[error("\"{0}\" is not allowed")]
    NotAllowed(String),

    #[error("\"{0}\" is not allowed to be empty")]
    Empty(String),

    #[error("\"{field}\" must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error("\"{field}\" must be one of [{allowed}]")]
    NotOneOf { field: String, allowed: String },

    #[error("\"{field}\" {constraint}")]
    OutOfRange { field: String, constraint: String },
}

impl ValidationError {
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required(field)
            | ValidationError::NotAllowed(field)
            | ValidationError::Empty(field) => field,
            ValidationError::WrongType { field, .. }
            | ValidationError::NotOneOf { field, .. }
            | ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

/// Check `payload` against `rules`, returning the sanitized object or the first error
pub fn validate(rules: &RuleSet, payload: &Map<String, Value>) -> Result<Map<String, Value>, ValidationError> {
    let mut value = Map::new();

    for (name, rule) in rules.iter() {
        match payload.get(name) {
            None => {
                if rule.required {
                    return Err(ValidationError::Required(name.to_string()));
                }
            }
            Some(raw) => {
                let sanitized = check_field(name, rule, raw)?;
                value.insert(name.to_string(), sanitized);
            }
        }
    }

    if let Some(unknown) = payload.keys().find(|key| rules.get(key).is_none()) {
        return Err(ValidationError::NotAllowed(unknown.clone()));
    }

    Ok(value)
}

fn check_field(name: &str, rule: &FieldRule, raw: &Value) -> Result<Value, ValidationError> {
    let wrong_type = || ValidationError::WrongType {
        field: name.to_string(),
        expected: rule.kind.expected(),
    };

    let value = match rule.kind {
        FieldType::Any => raw.clone(),
        FieldType::String => {
            let s = raw.as_str().ok_or_else(wrong_type)?;
            let s = if rule.trim { s.trim() } else { s };
            if s.is_empty() && !rule.allow_empty {
                return Err(ValidationError::Empty(name.to_string()));
            }
            let s = if rule.lowercase {
                s.to_lowercase()
            } else if rule.uppercase {
                s.to_uppercase()
            } else {
                s.to_string()
            };
            check_length(name, rule, s.chars().count(), "characters long")?;
            Value::String(s)
        }
        FieldType::Number | FieldType::Integer => {
            let number = coerce_number(raw).ok_or_else(wrong_type)?;
            if rule.kind == FieldType::Integer && !(number.is_i64() || number.is_u64()) {
                return Err(wrong_type());
            }
            let n = number.as_f64().ok_or_else(wrong_type)?;
            if let Some(min) = rule.min {
                if n < min {
                    return Err(out_of_range(name, format!("must be greater than or equal to {}", min)));
                }
            }
            if let Some(max) = rule.max {
                if n > max {
                    return Err(out_of_range(name, format!("must be less than or equal to {}", max)));
                }
            }
            Value::Number(number)
        }
        FieldType::Boolean => match raw {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Value::Bool(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Value::Bool(false),
            _ => return Err(wrong_type()),
        },
        FieldType::Object => match raw {
            Value::Object(_) => raw.clone(),
            _ => return Err(wrong_type()),
        },
        FieldType::Array => match raw {
            Value::Array(items) => {
                check_items(name, rule, items.len())?;
                raw.clone()
            }
            _ => return Err(wrong_type()),
        },
    };

    if !rule.valid.is_empty() && !rule.valid.contains(&value) {
        return Err(ValidationError::NotOneOf {
            field: name.to_string(),
            allowed: rule.valid.iter().map(display_value).collect::<Vec<_>>().join(", "),
        });
    }

    Ok(value)
}

// Query-string values always arrive as strings
fn coerce_number(raw: &Value) -> Option<Number> {
    match raw {
        Value::Number(n) => Some(n.clone()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                Some(Number::from(i))
            } else {
                s.parse::<f64>().ok().and_then(Number::from_f64)
            }
        }
        _ => None,
    }
}

fn check_length(name: &str, rule: &FieldRule, len: usize, unit: &str) -> Result<(), ValidationError> {
    if let Some(min) = rule.min {
        if (len as f64) < min {
            return Err(out_of_range(name, format!("length must be at least {} {}", min, unit)));
        }
    }
    if let Some(max) = rule.max {
        if (len as f64) > max {
            return Err(out_of_range(
                name,
                format!("length must be less than or equal to {} {}", max, unit),
            ));
        }
    }
    Ok(())
}

fn check_items(name: &str, rule: &FieldRule, len: usize) -> Result<(), ValidationError> {
    if let Some(min) = rule.min {
        if (len as f64) < min {
            return Err(out_of_range(name, format!("must contain at least {} items", min)));
        }
    }
    if let Some(max) = rule.max {
        if (len as f64) > max {
            return Err(out_of_range(
                name,
                format!("must contain less than or equal to {} items", max),
            ));
        }
    }
    Ok(())
}

fn out_of_range(name: &str, constraint: String) -> ValidationError {
    ValidationError::OutOfRange {
        field: name.to_string(),
        constraint,
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
