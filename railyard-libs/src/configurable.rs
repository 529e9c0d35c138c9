//! Schema-validated option objects.
//!
//! Every component that can appear in a configuration document declares a
//! static schema: an ordered list of [`Param`]s with a type, a default (or
//! "required") and a one-line description. Raw option maps are validated
//! against that schema with permissive coercion for simple scalars, then
//! deserialized into the component's typed struct.
//!
//! # Example YAML
//!
//! ```yaml
//! Subsamples:
//!   - Subsample:
//!       name: test_100k
//!       seed: "1234"        # coerced to an integer
//!       num_objects: 100000
//! ```

use crate::error::AppError;
use crate::Result;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// Declared type of a schema option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    List,
    Dict,
    /// Accepts any value unchanged
    Any,
}

impl ParamType {
    fn describe(&self) -> &'static str {
        match self {
            ParamType::Str => "a string",
            ParamType::Int => "an integer",
            ParamType::Float => "a number",
            ParamType::Bool => "a boolean",
            ParamType::List => "a list",
            ParamType::Dict => "a mapping",
            ParamType::Any => "any value",
        }
    }
}

/// Default value of a schema option.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    /// The option must be provided
    Required,
    /// Defaults to null; null is also accepted as an explicit value
    Null,
    Str(&'static str),
    Int(i64),
    Float(f64),
    Bool(bool),
    EmptyList,
    EmptyDict,
    StrList(&'static [&'static str]),
}

impl ParamDefault {
    /// Materialize the default, `None` for required options.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            ParamDefault::Required => None,
            ParamDefault::Null => Some(Value::Null),
            ParamDefault::Str(s) => Some(Value::String((*s).to_string())),
            ParamDefault::Int(i) => Some(Value::from(*i)),
            ParamDefault::Float(f) => Some(Value::from(*f)),
            ParamDefault::Bool(b) => Some(Value::Bool(*b)),
            ParamDefault::EmptyList => Some(Value::Array(Vec::new())),
            ParamDefault::EmptyDict => Some(Value::Object(Map::new())),
            ParamDefault::StrList(items) => Some(Value::Array(
                items.iter().map(|s| Value::String((*s).to_string())).collect(),
            )),
        }
    }
}

/// One entry of a component schema.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub ty: ParamType,
    pub default: ParamDefault,
    pub msg: &'static str,
}

impl Param {
    pub const fn required(name: &'static str, ty: ParamType, msg: &'static str) -> Self {
        Self {
            name,
            ty,
            default: ParamDefault::Required,
            msg,
        }
    }

    pub const fn optional(
        name: &'static str,
        ty: ParamType,
        default: ParamDefault,
        msg: &'static str,
    ) -> Self {
        Self {
            name,
            ty,
            default,
            msg,
        }
    }
}

/// How options absent from the schema are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Unknown options are violations
    Strict,
    /// Unknown options are kept as extras, after the schema options
    Lenient,
}

/// Validate a raw option map against a schema.
///
/// Returns the materialized options in schema order (defaults filled in,
/// values coerced), followed by extras in lenient mode. Every violation is
/// collected before failing.
///
/// # Errors
///
/// * `AppError::InvalidConfiguration` listing every violated option
pub fn validate_options(
    kind: &str,
    schema: &[Param],
    mode: ValidationMode,
    raw: &Value,
) -> Result<Map<String, Value>> {
    let name = raw
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("<unnamed>")
        .to_string();

    let Some(options) = raw.as_object() else {
        return Err(AppError::InvalidConfiguration {
            kind: kind.to_string(),
            name,
            violations: vec![format!(
                "expected a mapping of options, got {}",
                describe_value(raw)
            )],
        });
    };

    let mut violations = Vec::new();
    let mut validated = Map::new();

    for param in schema {
        match options.get(param.name) {
            Some(Value::Null) if param.default == ParamDefault::Null => {
                validated.insert(param.name.to_string(), Value::Null);
            }
            Some(Value::Null) => {
                violations.push(format!("{}: null is not allowed", param.name));
            }
            Some(value) => match coerce(param.ty, value) {
                Ok(coerced) => {
                    validated.insert(param.name.to_string(), coerced);
                }
                Err(reason) => violations.push(format!("{}: {}", param.name, reason)),
            },
            None => match param.default.to_value() {
                Some(default) => {
                    validated.insert(param.name.to_string(), default);
                }
                None => violations.push(format!("{}: required option is missing", param.name)),
            },
        }
    }

    for (key, value) in options {
        if schema.iter().any(|p| p.name == key) {
            continue;
        }
        match mode {
            ValidationMode::Strict => violations.push(format!("{}: unknown option", key)),
            ValidationMode::Lenient => {
                validated.insert(key.clone(), value.clone());
            }
        }
    }

    if !violations.is_empty() {
        return Err(AppError::InvalidConfiguration {
            kind: kind.to_string(),
            name,
            violations,
        });
    }

    Ok(validated)
}

/// Coerce a value to a declared type.
///
/// Scalars convert between string, number and boolean where the conversion
/// is lossless; a lone scalar is wrapped into a one-element list. Null is
/// handled by the caller.
pub fn coerce(ty: ParamType, value: &Value) -> std::result::Result<Value, String> {
    match (ty, value) {
        (ParamType::Any, v) => Ok(v.clone()),

        (ParamType::Str, Value::String(_)) => Ok(value.clone()),
        (ParamType::Str, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (ParamType::Str, Value::Bool(b)) => Ok(Value::String(b.to_string())),

        (ParamType::Int, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Value::from(i));
            }
            match n.as_f64() {
                Some(f)
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 =>
                {
                    Ok(Value::from(f as i64))
                }
                _ => Err(format!("expected an integer, got {}", n)),
            }
        }
        (ParamType::Int, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("expected an integer, got '{}'", s)),

        (ParamType::Float, Value::Number(n)) => n
            .as_f64()
            .map(Value::from)
            .ok_or_else(|| format!("expected a number, got {}", n)),
        (ParamType::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("expected a number, got '{}'", s)),

        (ParamType::Bool, Value::Bool(_)) => Ok(value.clone()),
        (ParamType::Bool, Value::String(s)) => parse_bool(s).map(Value::Bool),
        (ParamType::Bool, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(format!("expected a boolean, got {}", n)),
        },

        (ParamType::List, Value::Array(_)) => Ok(value.clone()),
        (ParamType::List, Value::String(_) | Value::Number(_) | Value::Bool(_)) => {
            Ok(Value::Array(vec![value.clone()]))
        }

        (ParamType::Dict, Value::Object(_)) => Ok(value.clone()),

        (ty, v) => Err(format!("expected {}, got {}", ty.describe(), describe_value(v))),
    }
}

fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!("expected a boolean, got '{}'", s)),
    }
}

pub(crate) fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// A named, schema-validated option object.
///
/// Implementors are plain serde structs whose field names match the schema
/// (use `#[serde(rename)]` for capitalized option names) and whose fields
/// are declared in schema order, so that [`Configurable::to_dict`] emits
/// options in the order they were declared.
pub trait Configurable: Sized + Serialize + DeserializeOwned {
    /// Type tag used in configuration documents (e.g. `CatalogTemplate`)
    const TAG: &'static str;

    /// Treatment of options absent from the schema
    const MODE: ValidationMode = ValidationMode::Strict;

    fn schema() -> &'static [Param];

    fn name(&self) -> &str;

    /// Cross-option checks run after the schema has been satisfied.
    fn check(&self) -> Result<()> {
        Ok(())
    }

    /// Build from a raw option map, validating against the schema.
    fn from_dict(raw: &Value) -> Result<Self> {
        let validated = validate_options(Self::TAG, Self::schema(), Self::MODE, raw)?;
        let object: Self = serde_json::from_value(Value::Object(validated))?;
        object.check()?;
        Ok(object)
    }

    /// Serialize back to the raw option map `from_dict` accepts.
    fn to_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Replace option values and re-validate. The name cannot change.
    fn update(&mut self, options: &Value) -> Result<()> {
        let Some(changes) = options.as_object() else {
            return Err(AppError::ConfigError(format!(
                "{} '{}' update expects a mapping, got {}",
                Self::TAG,
                self.name(),
                describe_value(options)
            )));
        };

        if let Some(new_name) = changes.get("name") {
            if new_name.as_str() != Some(self.name()) {
                return Err(AppError::InvalidConfiguration {
                    kind: Self::TAG.to_string(),
                    name: self.name().to_string(),
                    violations: vec!["name: cannot be changed by an update".to_string()],
                });
            }
        }

        let mut current = self.to_dict()?;
        if let Value::Object(map) = &mut current {
            for (key, value) in changes {
                map.insert(key.clone(), value.clone());
            }
        }
        *self = Self::from_dict(&current)?;
        Ok(())
    }
}
