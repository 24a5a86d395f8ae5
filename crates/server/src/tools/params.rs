//! Parameter descriptors and typed coercion of raw tool arguments.
//!
//! Tool arguments arrive as loosely-typed JSON. Each declared parameter has a [`ParamKind`]
//! which selects one of a small set of parsers; there is no runtime type inspection beyond that.

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    String,
    Boolean,
}

impl ParamKind {
    /// JSON Schema `type` keyword.
    #[must_use]
    pub fn schema_type(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::String => "string",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Integer => "an integer",
            Self::String => "a string",
            Self::Boolean => "a boolean",
        })
    }
}

/// A bound, already-coerced argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl ParamValue {
    #[must_use]
    pub fn kind(&self) -> ParamKind {
        match self {
            Self::Int(_) => ParamKind::Integer,
            Self::Str(_) => ParamKind::String,
            Self::Bool(_) => ParamKind::Boolean,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => json!(i),
            Self::Str(s) => json!(s),
            Self::Bool(b) => json!(b),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub kind: ParamKind,
    pub required: bool,
    /// Only meaningful when `required == false`.
    pub default: Option<ParamValue>,
}

impl ParamDescriptor {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            required: true,
            default: None,
        }
    }

    /// Optional parameter without a default; absent or `null` binds to "no value".
    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            required: false,
            default: None,
        }
    }

    /// Optional parameter whose kind is taken from its default.
    #[must_use]
    pub fn with_default(name: impl Into<String>, default: impl Into<ParamValue>) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            description: None,
            kind: default.kind(),
            required: false,
            default: Some(default),
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(self.kind.schema_type()));
        if let Some(d) = &self.description {
            prop.insert("description".to_string(), json!(d));
        }
        if let Some(d) = &self.default {
            prop.insert("default".to_string(), d.to_json());
        }
        Value::Object(prop)
    }
}

/// Build the `inputSchema` object advertised for a tool.
#[must_use]
pub fn input_schema(params: &[ParamDescriptor]) -> Map<String, Value> {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in params {
        properties.insert(p.name.clone(), p.schema());
        if p.required {
            required.push(json!(p.name));
        }
    }

    let mut schema = Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), Value::Array(required));
    }
    schema
}

/// Why a raw argument set could not be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindError {
    pub parameter: String,
    pub message: String,
}

/// Arguments after binding: every declared parameter has an entry, `None` meaning
/// "optional and not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoundArgs {
    values: BTreeMap<String, Option<ParamValue>>,
}

impl BoundArgs {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn opt_int(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(ParamValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn opt_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(ParamValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub fn opt_bool(&self, name: &str) -> Option<bool> {
        match self.get(name) {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// A required integer argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter was not declared as an integer on this tool.
    pub fn int(&self, name: &str) -> Result<i64, super::ToolError> {
        self.opt_int(name).ok_or_else(|| unbound(name))
    }

    /// A required string argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameter was not declared as a string on this tool.
    pub fn str(&self, name: &str) -> Result<&str, super::ToolError> {
        self.opt_str(name).ok_or_else(|| unbound(name))
    }
}

fn unbound(name: &str) -> super::ToolError {
    super::ToolError::Internal(format!("parameter '{name}' is not bound"))
}

/// Bind raw JSON arguments against the declared parameter list.
///
/// Unknown argument names are ignored.
///
/// # Errors
///
/// Returns the first parameter that is missing (required, no default), `null` while required,
/// or not convertible to its declared kind.
pub fn bind(
    params: &[ParamDescriptor],
    raw: Option<&Map<String, Value>>,
) -> Result<BoundArgs, BindError> {
    let mut values = BTreeMap::new();

    for p in params {
        let supplied = raw
            .and_then(|m| m.get(&p.name))
            .filter(|v| !(v.is_null() && !p.required));

        let value = match supplied {
            Some(v) => Some(coerce(p, v)?),
            None if p.required => {
                return Err(BindError {
                    parameter: p.name.clone(),
                    message: format!("Missing required parameter '{}'", p.name),
                });
            }
            None => p.default.clone(),
        };
        values.insert(p.name.clone(), value);
    }

    Ok(BoundArgs { values })
}

fn coerce(p: &ParamDescriptor, raw: &Value) -> Result<ParamValue, BindError> {
    let converted = match p.kind {
        ParamKind::Integer => parse_int(raw).map(ParamValue::Int),
        ParamKind::Boolean => parse_bool(raw).map(ParamValue::Bool),
        ParamKind::String => parse_string(raw).map(ParamValue::Str),
    };

    converted.ok_or_else(|| {
        let message = if raw.is_null() {
            format!("Parameter '{}' must not be null", p.name)
        } else {
            format!("Parameter '{}' must be {} (got {raw})", p.name, p.kind)
        };
        BindError {
            parameter: p.name.clone(),
            message,
        }
    })
}

fn parse_int(raw: &Value) -> Option<i64> {
    match raw {
        Value::Number(n) => n.as_i64().or_else(|| {
            // Accept integral floats such as `5.0`.
            let f = n.as_f64()?;
            #[allow(clippy::cast_possible_truncation)]
            let i = f as i64;
            #[allow(clippy::cast_precision_loss)]
            (f.fract() == 0.0 && (i as f64) == f).then_some(i)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
