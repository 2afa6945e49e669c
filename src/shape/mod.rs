//! Shape Requirements
//!
//! Translates a JSON-Schema primitive type plus its constraints into the set
//! of structural requirements a field item property must satisfy to count as
//! equivalent. This is pure description - checking happens in the matcher.

pub mod derive;
pub mod extensions;

pub use derive::derive_requirements;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::catalog::{names, PropertyKind};
use crate::error::{Result, ShapeError};

// =============================================================================
// JSON Schema Types
// =============================================================================

/// JSON-Schema `type` keyword values the matcher understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonSchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl JsonSchemaType {
    pub fn from_json_type(type_str: &str) -> Option<Self> {
        match type_str {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    /// Read the `type` keyword of a schema fragment
    pub fn of_schema(schema: &Value) -> Result<Self> {
        let raw = schema.get("type").and_then(Value::as_str).ok_or_else(|| {
            ShapeError::UnsupportedSchema(format!("schema has no string 'type': {}", schema))
        })?;
        Self::from_json_type(raw)
            .ok_or_else(|| ShapeError::UnsupportedSchema(format!("unknown schema type '{}'", raw)))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

impl fmt::Display for JsonSchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Primitive Interfaces
// =============================================================================

/// Interface tag carried by a `PrimitiveType` requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveInterface {
    String,
    Uri,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl PrimitiveInterface {
    /// Whether a property of `kind` implements this interface
    pub fn implemented_by(&self, kind: &PropertyKind) -> bool {
        matches!(
            (self, kind),
            (Self::String, PropertyKind::String)
                | (Self::Uri, PropertyKind::Uri)
                | (Self::Uri, PropertyKind::FileUri)
                | (Self::Integer, PropertyKind::Integer)
                | (Self::Float, PropertyKind::Float)
                | (Self::Boolean, PropertyKind::Boolean)
                | (Self::Date, PropertyKind::Date)
                | (Self::DateTime, PropertyKind::DateTime)
        )
    }
}

// =============================================================================
// Requirements
// =============================================================================

/// One named structural constraint a property must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawShapeRequirement")]
pub struct ShapeRequirement {
    constraint: String,
    #[serde(default)]
    options: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    interface: Option<PrimitiveInterface>,
}

impl ShapeRequirement {
    /// Build a requirement; an interface tag is only legal on `PrimitiveType`
    pub fn new(
        constraint: impl Into<String>,
        options: Value,
        interface: Option<PrimitiveInterface>,
    ) -> Result<Self> {
        let constraint = constraint.into();
        if constraint.is_empty() {
            return Err(ShapeError::InvalidRequirement("empty constraint name".to_string()));
        }
        if interface.is_some() && constraint != names::PRIMITIVE_TYPE {
            return Err(ShapeError::InvalidRequirement(format!(
                "interface tag only pairs with {}, not {}",
                names::PRIMITIVE_TYPE,
                constraint
            )));
        }
        if constraint == names::PRIMITIVE_TYPE && interface.is_none() {
            return Err(ShapeError::InvalidRequirement(format!(
                "{} requires an interface tag",
                names::PRIMITIVE_TYPE
            )));
        }
        Ok(Self {
            constraint,
            options,
            interface,
        })
    }

    /// `PrimitiveType` requirement for an interface
    pub fn primitive(interface: PrimitiveInterface) -> Self {
        Self {
            constraint: names::PRIMITIVE_TYPE.to_string(),
            options: Value::Null,
            interface: Some(interface),
        }
    }

    /// Named constraint requirement without an interface
    pub fn constraint(name: &str, options: Value) -> Result<Self> {
        Self::new(name, options, None)
    }

    pub fn constraint_name(&self) -> &str {
        &self.constraint
    }

    pub fn options(&self) -> &Value {
        &self.options
    }

    pub fn interface(&self) -> Option<PrimitiveInterface> {
        self.interface
    }
}

/// Wire form, checked by [`ShapeRequirement::new`]
#[derive(Deserialize)]
struct RawShapeRequirement {
    constraint: String,
    #[serde(default)]
    options: Value,
    #[serde(default)]
    interface: Option<PrimitiveInterface>,
}

impl TryFrom<RawShapeRequirement> for ShapeRequirement {
    type Error = ShapeError;

    fn try_from(raw: RawShapeRequirement) -> Result<Self> {
        Self::new(raw.constraint, raw.options, raw.interface)
    }
}

impl fmt::Display for ShapeRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.constraint)?;
        if let Some(interface) = self.interface {
            write!(f, "<{:?}>", interface)?;
        }
        if !self.options.is_null() {
            write!(f, "({})", self.options)?;
        }
        Ok(())
    }
}

/// Non-empty list of requirements that must all hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ShapeRequirement>")]
pub struct ShapeRequirements(Vec<ShapeRequirement>);

impl ShapeRequirements {
    pub fn new(requirements: Vec<ShapeRequirement>) -> Result<Self> {
        if requirements.is_empty() {
            return Err(ShapeError::InvalidRequirement(
                "a requirement set needs at least one requirement".to_string(),
            ));
        }
        Ok(Self(requirements))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ShapeRequirement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<ShapeRequirement>> for ShapeRequirements {
    type Error = ShapeError;

    fn try_from(requirements: Vec<ShapeRequirement>) -> Result<Self> {
        Self::new(requirements)
    }
}

impl<'a> IntoIterator for &'a ShapeRequirements {
    type Item = &'a ShapeRequirement;
    type IntoIter = std::slice::Iter<'a, ShapeRequirement>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interface_only_pairs_with_primitive_type() {
        let pattern = json!({"pattern": "x"});
        let string = Some(PrimitiveInterface::String);
        assert!(ShapeRequirement::new(names::REGEX, pattern, string).is_err());
        assert!(ShapeRequirement::new(names::PRIMITIVE_TYPE, Value::Null, None).is_err());
        let uri = Some(PrimitiveInterface::Uri);
        assert!(ShapeRequirement::new(names::PRIMITIVE_TYPE, Value::Null, uri).is_ok());
        assert!(ShapeRequirement::constraint(names::EMAIL, Value::Null).is_ok());
    }

    #[test]
    fn test_requirement_set_non_empty() {
        assert!(ShapeRequirements::new(Vec::new()).is_err());
        let string = ShapeRequirement::primitive(PrimitiveInterface::String);
        let set = ShapeRequirements::new(vec![string]).unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_deserialize_checks_interface_pairing() {
        let tagged_regex = json!({
            "constraint": "Regex",
            "options": {"pattern": "x"},
            "interface": "uri"
        });
        assert!(serde_json::from_value::<ShapeRequirement>(tagged_regex).is_err());
        let untagged = json!({"constraint": "PrimitiveType"});
        assert!(serde_json::from_value::<ShapeRequirement>(untagged).is_err());

        let tagged = json!({"constraint": "PrimitiveType", "interface": "uri"});
        let uri: ShapeRequirement = serde_json::from_value(tagged).unwrap();
        assert_eq!(uri, ShapeRequirement::primitive(PrimitiveInterface::Uri));

        assert!(serde_json::from_value::<ShapeRequirements>(json!([])).is_err());
    }

    #[test]
    fn test_interfaces() {
        assert!(PrimitiveInterface::Uri.implemented_by(&PropertyKind::FileUri));
        assert!(!PrimitiveInterface::String.implemented_by(&PropertyKind::Uri));
        assert!(!PrimitiveInterface::Float.implemented_by(&PropertyKind::Integer));
        assert!(PrimitiveInterface::DateTime.implemented_by(&PropertyKind::DateTime));
    }

    #[test]
    fn test_schema_type() {
        let array = JsonSchemaType::of_schema(&json!({"type": "array"})).unwrap();
        assert_eq!(array, JsonSchemaType::Array);
        assert!(JsonSchemaType::of_schema(&json!({"type": "null"})).is_err());
        assert!(JsonSchemaType::of_schema(&json!({"enum": [1]})).is_err());
    }
}
