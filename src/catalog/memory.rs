//! In-memory catalog loaded from JSON
//!
//! ## Layout
//!
//! ```json
//! {
//!   "field_types": {
//!     "string": { "properties": [{ "name": "value", "kind": { "type": "string" }, "required": true }] }
//!   },
//!   "record_types": [
//!     { "id": "node", "base_fields": [...], "bundles": [{ "id": "article", "fields": [...] }] }
//!   ]
//! }
//! ```
//!
//! A directory layout is also supported: `field_types.json` plus one JSON
//! file per record type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use super::{FieldDef, ItemShape, PropertyKind, SchemaCatalog};
use crate::error::{Result, ShapeError};

const FIELD_TYPES_FILE: &str = "field_types.json";

/// A record type with its bundles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordTypeDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub base_fields: Vec<FieldDef>,
    #[serde(default)]
    pub bundles: Vec<BundleDef>,
}

/// A bundle and the fields it adds on top of the base fields
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleDef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    #[serde(default)]
    field_types: BTreeMap<String, ItemShape>,
    #[serde(default)]
    record_types: Vec<RecordTypeDef>,
}

impl InMemoryCatalog {
    /// Build a catalog, resolving every field's item shape
    pub fn new(
        field_types: BTreeMap<String, ItemShape>,
        record_types: Vec<RecordTypeDef>,
    ) -> Result<Self> {
        let mut catalog = Self {
            field_types,
            record_types,
        };
        catalog.resolve()?;
        Ok(catalog)
    }

    /// Parse a catalog from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let raw: Self = serde_json::from_str(content)?;
        Self::new(raw.field_types, raw.record_types)
    }

    /// Parse a catalog from a JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let raw: Self = serde_json::from_value(value)?;
        Self::new(raw.field_types, raw.record_types)
    }

    /// Load a single-file catalog
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Load `field_types.json` plus one file per record type
    pub fn load_from_directory(dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false))
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        let mut field_types = BTreeMap::new();
        let mut record_types = Vec::new();
        for path in paths {
            let content = fs::read_to_string(&path)?;
            if path.file_name().map(|n| n == FIELD_TYPES_FILE).unwrap_or(false) {
                let types: BTreeMap<String, ItemShape> = serde_json::from_str(&content)?;
                field_types.extend(types);
            } else {
                record_types.push(serde_json::from_str::<RecordTypeDef>(&content)?);
            }
        }

        Self::new(field_types, record_types)
    }

    /// Fill in item shapes and bind reference targets
    fn resolve(&mut self) -> Result<()> {
        let field_types = &self.field_types;
        for record_type in &mut self.record_types {
            let fields = record_type
                .base_fields
                .iter_mut()
                .chain(record_type.bundles.iter_mut().flat_map(|b| b.fields.iter_mut()));
            for field in fields {
                let shape = field_types
                    .get(&field.field_type)
                    .ok_or_else(|| ShapeError::UnknownFieldType(field.field_type.clone()))?;
                let mut item = shape.clone();
                item.field_type = field.field_type.clone();
                for property in &mut item.properties {
                    if let PropertyKind::Reference { target } = &mut property.kind {
                        if target.is_none() {
                            *target = field.target_type.clone();
                        }
                    }
                }
                field.item = item;
            }
        }
        Ok(())
    }

    fn record_type(&self, id: &str) -> Result<&RecordTypeDef> {
        self.record_types
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| ShapeError::UnknownRecordType(id.to_string()))
    }
}

impl SchemaCatalog for InMemoryCatalog {
    fn record_types(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.record_types.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids
    }

    fn bundles(&self, record_type: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .record_type(record_type)
            .map(|r| r.bundles.iter().map(|b| b.id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    fn fields_of(&self, record_type: &str, bundle: Option<&str>) -> Result<Vec<FieldDef>> {
        let def = self.record_type(record_type)?;
        let mut fields = def.base_fields.clone();
        if let Some(bundle) = bundle {
            let bundle_def = def
                .bundles
                .iter()
                .find(|b| b.id == bundle)
                .ok_or_else(|| {
                    ShapeError::UnknownRecordType(format!("{}:{}", record_type, bundle))
                })?;
            fields.extend(bundle_def.fields.iter().cloned());
        }
        Ok(fields)
    }

    fn item_shape(&self, field_type: &str) -> Option<ItemShape> {
        self.field_types.get(field_type).map(|shape| {
            let mut shape = shape.clone();
            shape.field_type = field_type.to_string();
            shape
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Cardinality;
    use serde_json::json;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_value(json!({
            "field_types": {
                "string": {"properties": [{"name": "value", "kind": {"type": "string"}, "required": true}]},
                "entity_reference": {"properties": [
                    {"name": "target_id", "kind": {"type": "integer"}, "source_for": "entity"},
                    {"name": "entity", "kind": {"type": "reference"}, "computed": true, "computed_from": "target_id"}
                ]}
            },
            "record_types": [
                {"id": "user", "base_fields": [{"name": "name", "field_type": "string", "required": true}]},
                {"id": "node",
                 "base_fields": [{"name": "uid", "field_type": "entity_reference", "target_type": "user"}],
                 "bundles": [
                    {"id": "page", "fields": []},
                    {"id": "article", "fields": [{"name": "tags", "field_type": "string", "cardinality": -1}]}
                 ]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_record_types_sorted() {
        let catalog = catalog();
        assert_eq!(catalog.record_types(), vec!["node", "user"]);
        assert_eq!(catalog.bundles("node"), vec!["article", "page"]);
        assert!(catalog.bundles("user").is_empty());
    }

    #[test]
    fn test_bundle_fields_include_base_fields() {
        let catalog = catalog();
        let names: Vec<_> = catalog
            .fields_of("node", Some("article"))
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["uid", "tags"]);
        assert_eq!(catalog.base_fields_of("node").unwrap().len(), 1);

        let tags = catalog.field("node", Some("article"), "tags").unwrap();
        assert_eq!(tags.cardinality, Cardinality::Unlimited);
    }

    #[test]
    fn test_reference_target_bound_per_field() {
        let catalog = catalog();
        let uid = catalog.field("node", None, "uid").unwrap();
        let entity = uid.item.property("entity").unwrap();
        assert_eq!(entity.kind.reference_target(), Some("user"));

        let generic = catalog.item_shape("entity_reference").unwrap();
        assert_eq!(generic.property("entity").unwrap().kind.reference_target(), None);
    }

    #[test]
    fn test_unknown_field_type_rejected() {
        let result = InMemoryCatalog::from_value(json!({
            "record_types": [{"id": "x", "base_fields": [{"name": "f", "field_type": "nope"}]}]
        }));
        assert!(matches!(result, Err(ShapeError::UnknownFieldType(_))));
    }

    #[test]
    fn test_unknown_bundle() {
        assert!(catalog().fields_of("node", Some("blog")).is_err());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(FIELD_TYPES_FILE),
            r#"{"string": {"properties": [{"name": "value", "kind": {"type": "string"}}]}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("user.json"),
            r#"{"id": "user", "base_fields": [{"name": "name", "field_type": "string"}]}"#,
        )
        .unwrap();

        let catalog = InMemoryCatalog::load_from_directory(dir.path()).unwrap();
        assert_eq!(catalog.record_types(), vec!["user"]);
        assert_eq!(catalog.field("user", None, "name").unwrap().item.field_type, "string");
    }
}
