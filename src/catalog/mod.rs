//! Schema Catalog
//!
//! Read-only description of the content model the matcher searches:
//! record types, their bundles, each bundle's fields, and the property
//! definitions of every field item.
//!
//! The matcher and evaluator only ever talk to the [`SchemaCatalog`] trait.
//! [`InMemoryCatalog`] is the bundled implementation, loaded from JSON.

pub mod memory;

pub use memory::InMemoryCatalog;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Result, ShapeError};

// =============================================================================
// Constraint Names
// =============================================================================

/// Well-known validation constraint names
pub mod names {
    pub const CHOICE: &str = "Choice";
    pub const REGEX: &str = "Regex";
    pub const RANGE: &str = "Range";
    pub const LENGTH: &str = "Length";
    pub const EMAIL: &str = "Email";
    pub const HOSTNAME: &str = "Hostname";
    pub const IP: &str = "Ip";
    pub const UUID: &str = "Uuid";
    pub const FILE_EXTENSION: &str = "FileExtension";
    pub const PRIMITIVE_TYPE: &str = "PrimitiveType";
}

// =============================================================================
// Cardinality
// =============================================================================

/// Legal number of field items per record
///
/// Serialized the way content models usually store it: `1`, `N`, or `-1`
/// for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Cardinality {
    Single,
    Limited(usize),
    Unlimited,
}

impl Cardinality {
    /// Build a finite cardinality; `1` normalizes to `Single`
    pub fn new(n: usize) -> Result<Self> {
        match n {
            0 => Err(ShapeError::InvalidExpression(
                "cardinality must be at least 1".to_string(),
            )),
            1 => Ok(Self::Single),
            n => Ok(Self::Limited(n)),
        }
    }

    /// Cardinality implied by an array schema's `maxItems`
    pub fn from_max_items(max_items: Option<u64>) -> Result<Self> {
        match max_items {
            None => Ok(Self::Unlimited),
            Some(n) => Self::new(n as usize),
        }
    }

    pub fn is_multiple(&self) -> bool {
        !matches!(self, Self::Single)
    }

    /// Whether a field of this cardinality can serve a prop needing `need`
    ///
    /// Exact matches always serve. A finite multi-valued field may also serve
    /// a smaller finite need; a smaller field never serves a larger need.
    pub fn can_serve(&self, need: Cardinality) -> bool {
        match (self, need) {
            (a, b) if *a == b => true,
            (Self::Limited(c), Self::Limited(m)) => m <= *c,
            _ => false,
        }
    }

    /// Whether `delta` is a legal index into a field of this cardinality
    pub fn allows_index(&self, delta: usize) -> bool {
        match self {
            Self::Single => delta == 0,
            Self::Limited(n) => delta < *n,
            Self::Unlimited => true,
        }
    }
}

impl TryFrom<i64> for Cardinality {
    type Error = String;

    fn try_from(value: i64) -> std::result::Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            1 => Ok(Self::Single),
            n if n > 1 => Ok(Self::Limited(n as usize)),
            n => Err(format!("invalid cardinality {}", n)),
        }
    }
}

impl From<Cardinality> for i64 {
    fn from(value: Cardinality) -> Self {
        match value {
            Cardinality::Single => 1,
            Cardinality::Limited(n) => n as i64,
            Cardinality::Unlimited => -1,
        }
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::Single
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "1"),
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => write!(f, "unlimited"),
        }
    }
}

// =============================================================================
// Constraints
// =============================================================================

/// A named validation constraint with options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    #[serde(default)]
    pub options: Value,
}

impl Constraint {
    pub fn new(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name == name
    }
}

// =============================================================================
// Properties
// =============================================================================

/// Primitive kind of a field item property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
    Uri,
    /// Stream-wrapper location of a stored file (`public://…`)
    FileUri,
    Date,
    /// Combined date and time stored without an offset
    DateTime,
    /// Identifies another record; the target is bound per field
    Reference {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// Non-primitive value, returned untouched
    Map,
}

impl PropertyKind {
    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference { .. })
    }

    pub fn reference_target(&self) -> Option<&str> {
        match self {
            Self::Reference { target } => target.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Boolean => write!(f, "boolean"),
            Self::Uri => write!(f, "uri"),
            Self::FileUri => write!(f, "file_uri"),
            Self::Date => write!(f, "date"),
            Self::DateTime => write!(f, "datetime"),
            Self::Reference { target: Some(t) } => write!(f, "reference<{}>", t),
            Self::Reference { target: None } => write!(f, "reference"),
            Self::Map => write!(f, "map"),
        }
    }
}

/// One named, typed facet of a field item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Name of the computed property this one feeds (e.g. `target_id` → `entity`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_for: Option<String>,
    /// Declared dependency of a computed property
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed_from: Option<String>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            constraints: Vec::new(),
            internal: false,
            computed: false,
            read_only: false,
            source_for: None,
            computed_from: None,
        }
    }

    /// Plumbing properties are never authorable data
    pub fn is_plumbing(&self) -> bool {
        self.internal || self.source_for.is_some() || (self.read_only && !self.computed)
    }

    /// Properties shown to humans when describing a field
    pub fn is_relevant(&self) -> bool {
        !self.internal && self.source_for.is_none()
    }
}

/// Property definitions of one field type's items
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemShape {
    #[serde(default)]
    pub field_type: String,
    pub properties: Vec<PropertyDef>,
}

impl ItemShape {
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Names of the properties that make up "the whole field"
    pub fn relevant_properties(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|p| p.is_relevant())
            .map(|p| p.name.as_str())
            .collect()
    }
}

// =============================================================================
// Fields
// =============================================================================

/// A named slot on a bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub field_type: String,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    /// Target record type for reference fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    /// Target bundles a reference field is restricted to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_bundles: Vec<String>,
    /// Field-level constraints (e.g. allowed file extensions)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    /// Narrowed constraints this field imposes on individual properties
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub property_constraints: std::collections::BTreeMap<String, Vec<Constraint>>,
    /// Resolved item shape; filled in by the catalog
    #[serde(default)]
    pub item: ItemShape,
}

impl FieldDef {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    /// Property constraints plus the narrowed overrides this field adds
    pub fn constraints_for(&self, property: &PropertyDef) -> Vec<Constraint> {
        let mut constraints = property.constraints.clone();
        if let Some(narrowed) = self.property_constraints.get(&property.name) {
            constraints.extend(narrowed.iter().cloned());
        }
        constraints
    }

    /// Field-level constraints with the given name
    pub fn field_constraints(&self, name: &str) -> impl Iterator<Item = &Constraint> + '_ {
        let name = name.to_string();
        self.constraints.iter().filter(move |c| c.name == name)
    }
}

// =============================================================================
// Catalog Interface
// =============================================================================

/// Read-only schema introspection
pub trait SchemaCatalog: Send + Sync {
    /// All record type ids, sorted
    fn record_types(&self) -> Vec<String>;

    /// Bundle ids of a record type, sorted; empty for bundle-less types
    fn bundles(&self, record_type: &str) -> Vec<String>;

    /// Fields of a bundle (base fields included), or base fields when `bundle` is None
    fn fields_of(&self, record_type: &str, bundle: Option<&str>) -> Result<Vec<FieldDef>>;

    /// Fields shared by every bundle of a record type
    fn base_fields_of(&self, record_type: &str) -> Result<Vec<FieldDef>> {
        self.fields_of(record_type, None)
    }

    /// Generic item shape of a field type (reference targets unbound)
    fn item_shape(&self, field_type: &str) -> Option<ItemShape>;

    /// Look up one field
    fn field(&self, record_type: &str, bundle: Option<&str>, name: &str) -> Result<FieldDef> {
        self.fields_of(record_type, bundle)?
            .into_iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ShapeError::UnknownField {
                record_type: record_type.to_string(),
                field: name.to_string(),
            })
    }
}
