//! Suggestion Ranker
//!
//! Runs the matcher for every prop of a component, keeps the candidates
//! that apply to a host record type, and labels them for humans. Read-only:
//! nothing is evaluated here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::checksum::Checksum;
use crate::error::{Result, ShapeError};
use crate::expression::{Expression, RecordTarget};
use crate::matcher::ShapeMatcher;

// =============================================================================
// Components
// =============================================================================

/// A component and its prop contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Object schema whose properties are the props
    pub props: Value,
}

impl ComponentMetadata {
    /// Prop schemas in declared order
    pub fn prop_schemas(&self) -> Result<Vec<(&str, &Value)>> {
        let properties = self
            .props
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                ShapeError::UnsupportedSchema(format!(
                    "component '{}' props have no 'properties'",
                    self.id
                ))
            })?;
        Ok(properties.iter().map(|(k, v)| (k.as_str(), v)).collect())
    }

    pub fn required_props(&self) -> Vec<&str> {
        self.props
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Source of component metadata
pub trait ComponentCatalog: Send + Sync {
    fn component(&self, id: &str) -> Option<ComponentMetadata>;
}

/// Fixed set of components
#[derive(Debug, Clone, Default)]
pub struct StaticComponents {
    components: BTreeMap<String, ComponentMetadata>,
}

impl StaticComponents {
    pub fn new(components: impl IntoIterator<Item = ComponentMetadata>) -> Self {
        Self {
            components: components.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    /// Load a JSON array of components
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let components: Vec<ComponentMetadata> = serde_json::from_str(&content)?;
        Ok(Self::new(components))
    }
}

impl ComponentCatalog for StaticComponents {
    fn component(&self, id: &str) -> Option<ComponentMetadata> {
        self.components.get(id).cloned()
    }
}

// =============================================================================
// Adapters
// =============================================================================

/// An external value transformer producing a given shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    pub id: String,
    pub label: String,
    /// Schema of the value the adapter outputs
    pub output: Value,
}

/// Source of adapter descriptors
pub trait AdapterCatalog: Send + Sync {
    fn find_by_output_shape(&self, schema: &Value) -> Vec<AdapterDescriptor>;
}

/// Fixed set of adapters, matched by canonical output schema
#[derive(Debug, Clone, Default)]
pub struct StaticAdapters {
    adapters: Vec<AdapterDescriptor>,
}

impl StaticAdapters {
    pub fn new(adapters: Vec<AdapterDescriptor>) -> Self {
        Self { adapters }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&content)?))
    }
}

impl AdapterCatalog for StaticAdapters {
    fn find_by_output_shape(&self, schema: &Value) -> Vec<AdapterDescriptor> {
        let wanted = Checksum::from_json(schema);
        self.adapters
            .iter()
            .filter(|a| Checksum::from_json(&a.output) == wanted)
            .cloned()
            .collect()
    }
}

// =============================================================================
// Suggestions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledExpression {
    pub label: String,
    pub expression: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabeledAdapter {
    pub label: String,
    pub adapter_id: String,
}

/// Candidates for one prop
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropSuggestions {
    pub required: bool,
    pub instances: Vec<LabeledExpression>,
    pub adapters: Vec<LabeledAdapter>,
}

/// Per-component suggestion layer over the matcher
pub struct SuggestionRanker<'a> {
    matcher: ShapeMatcher<'a>,
    components: &'a dyn ComponentCatalog,
    adapters: &'a dyn AdapterCatalog,
}

impl<'a> SuggestionRanker<'a> {
    pub fn new(
        matcher: ShapeMatcher<'a>,
        components: &'a dyn ComponentCatalog,
        adapters: &'a dyn AdapterCatalog,
    ) -> Self {
        Self {
            matcher,
            components,
            adapters,
        }
    }

    /// Suggestions for every prop of a component, keyed by prop name
    pub fn suggest(
        &self,
        component_id: &str,
        host_record_type: Option<&str>,
    ) -> Result<BTreeMap<String, PropSuggestions>> {
        let component = self
            .components
            .component(component_id)
            .ok_or_else(|| ShapeError::UnknownComponent(component_id.to_string()))?;
        let required = component.required_props();

        let mut suggestions = BTreeMap::new();
        for (prop, schema) in component.prop_schemas()? {
            let is_required = required.contains(&prop);
            let primitive = self.matcher.schema_type(schema)?;
            let matches = self
                .matcher
                .find_matches(primitive, is_required, schema, None, None)?;

            let instances = matches
                .into_iter()
                .filter(|expr| host_record_type.map(|host| anchored_at(expr, host)).unwrap_or(true))
                .map(|expression| {
                    Ok(LabeledExpression {
                        label: self.label(&expression)?,
                        expression,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let mut adapters: Vec<LabeledAdapter> = self
                .adapters
                .find_by_output_shape(schema)
                .into_iter()
                .map(|a| LabeledAdapter {
                    label: a.label,
                    adapter_id: a.id,
                })
                .collect();
            adapters.sort_by(|a, b| a.label.cmp(&b.label));

            debug!(
                component = %component_id,
                prop = %prop,
                instances = instances.len(),
                adapters = adapters.len(),
                "ranked prop suggestions"
            );
            suggestions.insert(
                prop.to_string(),
                PropSuggestions {
                    required: is_required,
                    instances,
                    adapters,
                },
            );
        }
        Ok(suggestions)
    }

    /// Human label for a record-level expression
    ///
    /// References read `"<referencer> → <referenced>"`; a field used only in
    /// part names the properties used and left out.
    pub fn label(&self, expr: &Expression) -> Result<String> {
        match expr {
            Expression::ReferenceFieldProp(r) => {
                let referencer = Expression::FieldProp(r.referencer().clone());
                Ok(format!("{} → {}", self.label(&referencer)?, self.label(r.referenced())?))
            }
            Expression::FieldProp(_) | Expression::FieldObjectProps(_) => self.field_label(expr),
            other => Err(ShapeError::InvalidExpression(format!(
                "{} is not anchored at a record",
                other.kind_name()
            ))),
        }
    }

    fn field_label(&self, expr: &Expression) -> Result<String> {
        let invalid = || ShapeError::InvalidExpression(format!("{} has no field", expr));
        let target = expr.record_target().ok_or_else(invalid)?;
        let (name, _) = expr.field_ref().ok_or_else(invalid)?;
        let bundle = target.bundles().first().map(String::as_str);
        let field_name = name.for_bundle(bundle).unwrap_or_else(|| name.primary());
        let field = self
            .matcher
            .catalog()
            .field(target.record_type(), bundle, field_name)?;

        let used = expr.item_properties();
        let relevant = field.item.relevant_properties();
        let used_set: BTreeSet<&str> = used.iter().copied().collect();
        let relevant_set: BTreeSet<&str> = relevant.iter().copied().collect();
        if used_set == relevant_set {
            return Ok(field.label().to_string());
        }

        let unused: Vec<&str> = relevant.into_iter().filter(|p| !used_set.contains(p)).collect();
        if unused.is_empty() {
            Ok(format!("{} (using: {})", field.label(), used.join(", ")))
        } else {
            Ok(format!(
                "{} (using: {}; not using: {})",
                field.label(),
                used.join(", "),
                unused.join(", ")
            ))
        }
    }
}

/// Whether a candidate reads from the host record type
fn anchored_at(expr: &Expression, host_record_type: &str) -> bool {
    let target: Option<&RecordTarget> = match expr {
        Expression::ReferenceFieldProp(r) => Some(r.referencer().record()),
        other => other.record_target(),
    };
    target.map(|t| t.record_type() == host_record_type).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::matcher::DefinitionResolver;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::from_value(json!({
            "field_types": {
                "string": {"properties": [{"name": "value", "kind": {"type": "string"}, "required": true}]},
                "entity_reference": {"properties": [
                    {"name": "target_id", "kind": {"type": "integer"}, "required": true, "source_for": "entity"},
                    {"name": "entity", "kind": {"type": "reference"}, "computed": true, "computed_from": "target_id"}
                ]},
                "image": {"properties": [
                    {"name": "uri", "kind": {"type": "file_uri"}, "internal": true},
                    {"name": "src", "kind": {"type": "uri"}, "computed": true, "computed_from": "uri"},
                    {"name": "alt", "kind": {"type": "string"}}
                ]}
            },
            "record_types": [
                {"id": "article", "base_fields": [
                    {"name": "title", "label": "Title", "field_type": "string", "required": true},
                    {"name": "author", "label": "Author", "field_type": "entity_reference", "required": true, "target_type": "user"},
                    {"name": "field_image", "label": "Image", "field_type": "image",
                     "constraints": [{"name": "FileExtension", "options": {"extensions": "png jpg"}}]}
                ]},
                {"id": "user", "base_fields": [
                    {"name": "name", "label": "Name", "field_type": "string", "required": true}
                ]}
            ]
        }))
        .unwrap()
    }

    fn components() -> StaticComponents {
        StaticComponents::new(vec![ComponentMetadata {
            id: "card".to_string(),
            label: Some("Card".to_string()),
            props: json!({
                "type": "object",
                "properties": {
                    "heading": {"type": "string"},
                    "photo": {
                        "type": "object",
                        "properties": {
                            "src": {"type": "string", "format": "uri", "contentMediaType": "image/*"}
                        }
                    }
                },
                "required": ["heading"]
            }),
        }])
    }

    fn adapters() -> StaticAdapters {
        StaticAdapters::new(vec![
            AdapterDescriptor {
                id: "uppercase".to_string(),
                label: "Uppercase".to_string(),
                output: json!({"type": "string"}),
            },
            AdapterDescriptor {
                id: "day_of_week".to_string(),
                label: "Day of week".to_string(),
                output: json!({"type": "string"}),
            },
            AdapterDescriptor {
                id: "unix_time".to_string(),
                label: "Unix time".to_string(),
                output: json!({"type": "integer"}),
            },
        ])
    }

    #[test]
    fn test_suggest_labels_and_filters() {
        let catalog = catalog();
        let resolver = DefinitionResolver::new();
        let components = components();
        let adapters = adapters();
        let matcher = ShapeMatcher::new(&catalog, &resolver);
        let ranker = SuggestionRanker::new(matcher, &components, &adapters);

        let suggestions = ranker.suggest("card", Some("article")).unwrap();
        let heading = &suggestions["heading"];
        assert!(heading.required);
        let labels: Vec<&str> = heading.instances.iter().map(|i| i.label.as_str()).collect();
        assert_eq!(labels, vec!["Author → Name", "Title"]);
        let adapter_labels: Vec<&str> = heading.adapters.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(adapter_labels, vec!["Day of week", "Uppercase"]);

        let photo = &suggestions["photo"];
        assert!(!photo.required);
        assert_eq!(photo.instances.len(), 1);
        assert_eq!(photo.instances[0].label, "Image (using: src; not using: alt)");
        assert_eq!(
            photo.instances[0].expression.to_string(),
            "ℹ︎␜entity:article␝field_image␞␟{src↠src}"
        );
    }

    #[test]
    fn test_host_filter_drops_other_record_types() {
        let catalog = catalog();
        let resolver = DefinitionResolver::new();
        let components = components();
        let adapters = StaticAdapters::default();
        let matcher = ShapeMatcher::new(&catalog, &resolver);
        let ranker = SuggestionRanker::new(matcher, &components, &adapters);

        let on_user = ranker.suggest("card", Some("user")).unwrap();
        let labels: Vec<&str> = on_user["heading"]
            .instances
            .iter()
            .map(|i| i.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Name"]);

        let anywhere = ranker.suggest("card", None).unwrap();
        assert_eq!(anywhere["heading"].instances.len(), 3);
    }

    #[test]
    fn test_unknown_component() {
        let catalog = catalog();
        let resolver = DefinitionResolver::new();
        let components = StaticComponents::default();
        let adapters = StaticAdapters::default();
        let matcher = ShapeMatcher::new(&catalog, &resolver);
        let ranker = SuggestionRanker::new(matcher, &components, &adapters);
        assert!(matches!(ranker.suggest("missing", None), Err(ShapeError::UnknownComponent(_))));
    }
}
