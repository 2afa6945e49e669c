//! Runtime Records
//!
//! Concrete record values the evaluator walks, and the [`RecordAccessor`]
//! seam through which references are followed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::catalog::PropertyDef;
use crate::error::Result;

/// One occurrence of a field's value: property name → raw value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldItem(pub Map<String, Value>);

impl FieldItem {
    pub fn get(&self, property: &str) -> Option<&Value> {
        self.0.get(property)
    }
}

impl From<Value> for FieldItem {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self(map)
            }
        }
    }
}

/// Positional items of one field; `None` marks an absent slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldItemList {
    pub field_type: String,
    #[serde(default)]
    pub items: Vec<Option<FieldItem>>,
}

impl FieldItemList {
    pub fn new(field_type: impl Into<String>, items: Vec<Option<FieldItem>>) -> Self {
        Self {
            field_type: field_type.into(),
            items,
        }
    }

    pub fn get(&self, delta: usize) -> Option<&FieldItem> {
        self.items.get(delta).and_then(Option::as_ref)
    }
}

/// A concrete record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle: Option<String>,
    pub id: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldItemList>,
}

impl Record {
    /// `type:bundle` description for diagnostics
    pub fn describe(&self) -> String {
        match &self.bundle {
            Some(bundle) => format!("{}:{}", self.record_type, bundle),
            None => self.record_type.clone(),
        }
    }
}

// =============================================================================
// Accessor
// =============================================================================

/// Reads field values and follows references
pub trait RecordAccessor: Send + Sync {
    /// Items of a named field
    fn field_items<'r>(&self, record: &'r Record, field: &str) -> Option<&'r FieldItemList> {
        record.fields.get(field)
    }

    /// Record a reference property on `item` points at
    fn referenced_record(
        &self,
        target_type: &str,
        item: &FieldItem,
        property: &PropertyDef,
    ) -> Option<Record>;
}

/// Records held in memory, keyed by `(record_type, id)`
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecords {
    records: HashMap<(String, String), Record>,
}

impl InMemoryRecords {
    pub fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: records
                .into_iter()
                .map(|r| ((r.record_type.clone(), r.id.clone()), r))
                .collect(),
        }
    }

    /// Load a JSON array of records
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let records: Vec<Record> = serde_json::from_str(&content)?;
        Ok(Self::new(records))
    }

    pub fn get(&self, record_type: &str, id: &str) -> Option<&Record> {
        self.records.get(&(record_type.to_string(), id.to_string()))
    }
}

impl RecordAccessor for InMemoryRecords {
    fn referenced_record(
        &self,
        target_type: &str,
        item: &FieldItem,
        property: &PropertyDef,
    ) -> Option<Record> {
        // Computed reference properties read the id from their source property
        let key = property.computed_from.as_deref().unwrap_or(&property.name);
        let id = match item.get(key)? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        self.get(target_type, &id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PropertyKind;
    use serde_json::json;

    #[test]
    fn test_record_deserializes_sparse_items() {
        let record: Record = serde_json::from_value(json!({
            "record_type": "node",
            "bundle": "article",
            "id": "1",
            "fields": {"tags": {"field_type": "string", "items": [{"value": "a"}, null, {"value": "c"}]}}
        }))
        .unwrap();
        let tags = &record.fields["tags"];
        assert_eq!(tags.items.len(), 3);
        assert!(tags.get(1).is_none());
        assert_eq!(tags.get(2).unwrap().get("value"), Some(&json!("c")));
        assert_eq!(record.describe(), "node:article");
    }

    #[test]
    fn test_referenced_record_uses_source_property() {
        let user = Record {
            record_type: "user".into(),
            bundle: None,
            id: "7".into(),
            fields: BTreeMap::new(),
        };
        let records = InMemoryRecords::new(vec![user.clone()]);
        let mut entity = PropertyDef::new("entity", PropertyKind::Reference { target: None });
        entity.computed_from = Some("target_id".into());

        let item = FieldItem::from(json!({"target_id": 7}));
        assert_eq!(records.referenced_record("user", &item, &entity), Some(user));
        assert_eq!(records.referenced_record("node", &item, &entity), None);
    }
}
