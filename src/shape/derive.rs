//! Schema → Requirements
//!
//! Maps a scalar JSON-Schema fragment onto the [`ShapeRequirements`] a
//! property must satisfy. Formats that are recognized but have no catalog
//! analogue still produce a requirement (a `Format` constraint); the matcher
//! cannot check it, so such props simply find no matches.

use serde_json::{json, Map, Value};

use super::extensions::extension_pattern;
use super::{JsonSchemaType, PrimitiveInterface, ShapeRequirement, ShapeRequirements};
use crate::catalog::names;
use crate::error::{Result, ShapeError};

/// Constraint name for recognized formats the catalog cannot express
pub const UNSUPPORTED_FORMAT: &str = "Format";

/// Constraint name for media types other than images
pub const CONTENT_MEDIA_TYPE: &str = "ContentMediaType";

/// Constraint name for `multipleOf`
pub const DIVISIBLE_BY: &str = "DivisibleBy";

const URI_FORMATS: &[&str] = &["uri", "iri", "uri-reference", "iri-reference"];

const UNSUPPORTED_FORMATS: &[&str] = &[
    "time",
    "duration",
    "regex",
    "json-pointer",
    "relative-json-pointer",
    "uri-template",
];

/// Derive the requirement set for a scalar schema
pub fn derive_requirements<S: AsRef<str>>(
    primitive: JsonSchemaType,
    schema: &Value,
    image_extensions: &[S],
) -> Result<ShapeRequirements> {
    let obj = schema.as_object().ok_or_else(|| {
        ShapeError::UnsupportedSchema(format!("schema must be an object: {}", schema))
    })?;

    let mut requirements = match primitive {
        JsonSchemaType::String => string_requirements(obj, image_extensions)?,
        JsonSchemaType::Integer => numeric_requirements(obj, PrimitiveInterface::Integer)?,
        JsonSchemaType::Number => numeric_requirements(obj, PrimitiveInterface::Float)?,
        JsonSchemaType::Boolean => vec![ShapeRequirement::primitive(PrimitiveInterface::Boolean)],
        JsonSchemaType::Object | JsonSchemaType::Array => {
            return Err(ShapeError::UnsupportedSchema(format!(
                "{} is not a scalar type",
                primitive
            )))
        }
    };

    if let Some(choices) = obj.get("enum") {
        let choices = choices
            .as_array()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                ShapeError::UnsupportedSchema("'enum' must be a non-empty array".to_string())
            })?;
        requirements.push(ShapeRequirement::constraint(
            names::CHOICE,
            json!({ "choices": choices }),
        )?);
    }

    ShapeRequirements::new(requirements)
}

fn string_requirements<S: AsRef<str>>(
    obj: &Map<String, Value>,
    image_extensions: &[S],
) -> Result<Vec<ShapeRequirement>> {
    let mut requirements = Vec::new();
    let media_type = obj.get("contentMediaType").and_then(Value::as_str);

    match obj.get("format").and_then(Value::as_str) {
        None => requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String)),
        Some(format) if URI_FORMATS.contains(&format) => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::Uri));
            if media_type.map(|m| m.starts_with("image/")).unwrap_or(false) {
                requirements.push(ShapeRequirement::constraint(
                    names::REGEX,
                    json!({ "pattern": extension_pattern(image_extensions) }),
                )?);
            }
        }
        Some("date-time") => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::DateTime))
        }
        Some("date") => requirements.push(ShapeRequirement::primitive(PrimitiveInterface::Date)),
        Some("email") | Some("idn-email") => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String));
            requirements.push(ShapeRequirement::constraint(names::EMAIL, Value::Null)?);
        }
        Some("hostname") | Some("idn-hostname") => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String));
            requirements.push(ShapeRequirement::constraint(names::HOSTNAME, Value::Null)?);
        }
        Some("ipv4") | Some("ipv6") => {
            let version = if obj.get("format") == Some(&json!("ipv4")) { 4 } else { 6 };
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String));
            requirements.push(ShapeRequirement::constraint(
                names::IP,
                json!({ "version": version }),
            )?);
        }
        Some("uuid") => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String));
            requirements.push(ShapeRequirement::constraint(names::UUID, Value::Null)?);
        }
        Some(format) if UNSUPPORTED_FORMATS.contains(&format) => {
            requirements.push(ShapeRequirement::primitive(PrimitiveInterface::String));
            requirements.push(ShapeRequirement::constraint(
                UNSUPPORTED_FORMAT,
                json!({ "format": format }),
            )?);
        }
        Some(other) => {
            return Err(ShapeError::UnsupportedSchema(format!("unknown string format '{}'", other)))
        }
    }

    if let Some(media_type) = media_type.filter(|m| !m.starts_with("image/")) {
        requirements.push(ShapeRequirement::constraint(
            CONTENT_MEDIA_TYPE,
            json!({ "type": media_type }),
        )?);
    }

    if let Some(pattern) = obj.get("pattern") {
        let pattern = pattern.as_str().ok_or_else(|| {
            ShapeError::UnsupportedSchema("'pattern' must be a string".to_string())
        })?;
        requirements.push(ShapeRequirement::constraint(
            names::REGEX,
            json!({ "pattern": pattern }),
        )?);
    }

    let min = obj.get("minLength").and_then(Value::as_u64);
    let max = obj.get("maxLength").and_then(Value::as_u64);
    if min.is_some() || max.is_some() {
        let length = bounds(min.map(Value::from), max.map(Value::from));
        requirements.push(ShapeRequirement::constraint(names::LENGTH, length)?);
    }

    Ok(requirements)
}

fn numeric_requirements(
    obj: &Map<String, Value>,
    interface: PrimitiveInterface,
) -> Result<Vec<ShapeRequirement>> {
    let mut requirements = vec![ShapeRequirement::primitive(interface)];

    let integer = interface == PrimitiveInterface::Integer;
    let min = match (obj.get("minimum"), obj.get("exclusiveMinimum")) {
        (Some(min), _) => Some(min.clone()),
        (None, Some(exclusive)) => Some(exclusive_bound(exclusive, integer, 1)?),
        (None, None) => None,
    };
    let max = match (obj.get("maximum"), obj.get("exclusiveMaximum")) {
        (Some(max), _) => Some(max.clone()),
        (None, Some(exclusive)) => Some(exclusive_bound(exclusive, integer, -1)?),
        (None, None) => None,
    };
    if min.is_some() || max.is_some() {
        requirements.push(ShapeRequirement::constraint(names::RANGE, bounds(min, max))?);
    }

    if let Some(step) = obj.get("multipleOf") {
        requirements.push(ShapeRequirement::constraint(DIVISIBLE_BY, json!({ "value": step }))?);
    }

    Ok(requirements)
}

/// Integer exclusive bounds become inclusive; float ones are kept as-is
fn exclusive_bound(value: &Value, integer: bool, step: i64) -> Result<Value> {
    let unsupported =
        || ShapeError::UnsupportedSchema(format!("exclusive bound {} out of range", value));
    if integer {
        value
            .as_i64()
            .and_then(|v| v.checked_add(step))
            .map(Value::from)
            .ok_or_else(unsupported)
    } else {
        value.as_f64().map(Value::from).ok_or_else(unsupported)
    }
}

fn bounds(min: Option<Value>, max: Option<Value>) -> Value {
    let mut out = Map::new();
    if let Some(min) = min {
        out.insert("min".to_string(), min);
    }
    if let Some(max) = max {
        out.insert("max".to_string(), max);
    }
    Value::Object(out)
}
