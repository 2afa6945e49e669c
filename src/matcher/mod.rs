//! Shape Matcher
//!
//! Given a JSON-Schema fragment, searches the schema catalog for every
//! expression whose evaluated value would satisfy it.
//!
//! Pipeline:
//! 1. `$ref` resolution through the injected [`SchemaResolver`]
//! 2. Array unwrap (`type`, `items`, `maxItems` only) into a cardinality need
//! 3. Scalar schemas → [`scalar`], object schemas → [`object`]
//! 4. Dedup by canonical string, deterministic order, memoization
//!
//! Matching happens at field item level and is anchored at a record target
//! afterwards. References are followed while the hop budget lasts.

mod check;
mod object;
mod scalar;

use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

use crate::cache::CacheStore;
use crate::catalog::{Cardinality, FieldDef, SchemaCatalog};
use crate::checksum::Checksum;
use crate::config::MatchingConfig;
use crate::error::{Result, ShapeError};
use crate::expression::{Expression, FieldName, RecordTarget};
use crate::shape::JsonSchemaType;

/// Keys an array schema may carry and still be matchable
const ARRAY_KEYS: &[&str] = &["type", "items", "maxItems"];

/// Keys that never change what a schema accepts
const ANNOTATION_KEYS: &[&str] = &["title", "description", "examples", "$comment"];

/// Guards against `$ref` cycles
const MAX_REF_DEPTH: usize = 16;

// =============================================================================
// Schema Resolution
// =============================================================================

/// Resolves `$ref` strings to schema fragments
pub trait SchemaResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Option<Value>;
}

/// Resolver over a fixed set of named definitions
///
/// Accepts `#/$defs/<name>`, `#/definitions/<name>`, or the bare name (which
/// also covers URI-style ids).
#[derive(Debug, Clone, Default)]
pub struct DefinitionResolver {
    definitions: BTreeMap<String, Value>,
}

impl DefinitionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `$defs` and `definitions` from a schema document
    pub fn from_document(document: &Value) -> Self {
        let mut resolver = Self::new();
        for key in ["definitions", "$defs"] {
            if let Some(defs) = document.get(key).and_then(Value::as_object) {
                for (name, schema) in defs {
                    resolver.definitions.insert(name.clone(), schema.clone());
                }
            }
        }
        resolver
    }

    pub fn with_definition(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.definitions.insert(name.into(), schema);
        self
    }
}

impl SchemaResolver for DefinitionResolver {
    fn resolve(&self, reference: &str) -> Option<Value> {
        let name = reference
            .strip_prefix("#/$defs/")
            .or_else(|| reference.strip_prefix("#/definitions/"))
            .unwrap_or(reference);
        self.definitions.get(name).cloned()
    }
}

// =============================================================================
// Needs
// =============================================================================

/// Field-level conditions a candidate must meet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldFilter {
    /// Only required fields qualify
    pub field_required: bool,
    /// Only required (or computed) properties qualify
    pub property_required: bool,
    pub cardinality: Cardinality,
}

impl FieldFilter {
    fn new(is_required: bool, cardinality: Cardinality) -> Self {
        Self {
            field_required: is_required,
            property_required: is_required,
            cardinality,
        }
    }

    /// Filter for fields reached through a reference
    fn referenced(self) -> Self {
        Self {
            cardinality: Cardinality::Single,
            ..self
        }
    }
}

/// Where the top-level search looks
#[derive(Debug, Clone, Copy)]
enum Scope<'s> {
    Catalog,
    Host {
        record_type: &'s str,
        bundle: Option<&'s str>,
    },
}

// =============================================================================
// Matcher
// =============================================================================

/// Searches a schema catalog for expressions satisfying a schema
pub struct ShapeMatcher<'a> {
    catalog: &'a dyn SchemaCatalog,
    resolver: &'a dyn SchemaResolver,
    cache: Option<&'a dyn CacheStore>,
    config: MatchingConfig,
}

impl<'a> ShapeMatcher<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog, resolver: &'a dyn SchemaResolver) -> Self {
        Self {
            catalog,
            resolver,
            cache: None,
            config: MatchingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MatchingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cache(mut self, cache: &'a dyn CacheStore) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn catalog(&self) -> &'a dyn SchemaCatalog {
        self.catalog
    }

    /// JSON-Schema type of a schema, following `$ref`
    pub fn schema_type(&self, schema: &Value) -> Result<JsonSchemaType> {
        JsonSchemaType::of_schema(&*self.resolve(schema)?)
    }

    /// Every expression whose value would satisfy `schema`
    ///
    /// Scalar results are sorted by canonical string. Object results list
    /// complete groupings before minimal ones.
    pub fn find_matches(
        &self,
        primitive: JsonSchemaType,
        is_required: bool,
        schema: &Value,
        host_record_type: Option<&str>,
        host_bundle: Option<&str>,
    ) -> Result<Vec<Expression>> {
        let key = cache_key(primitive, is_required, schema, host_record_type, host_bundle);
        if let Some(cache) = self.cache {
            if let Some(hit) = cache.get(&key) {
                debug!(key = %key, count = hit.len(), "match cache hit");
                return hit.iter().map(|s| s.parse()).collect();
            }
            debug!(key = %key, "match cache miss");
        }

        let scope = match host_record_type {
            Some(record_type) => Scope::Host {
                record_type,
                bundle: host_bundle,
            },
            None => Scope::Catalog,
        };
        let filter = FieldFilter::new(is_required, Cardinality::Single);
        let matches = self.match_schema(primitive, schema, filter, scope)?;

        if let Some(cache) = self.cache {
            cache.set(&key, matches.iter().map(ToString::to_string).collect());
        }
        Ok(matches)
    }

    fn match_schema(
        &self,
        primitive: JsonSchemaType,
        schema: &Value,
        filter: FieldFilter,
        scope: Scope<'_>,
    ) -> Result<Vec<Expression>> {
        let schema = self.resolve(schema)?;
        match primitive {
            JsonSchemaType::Array => {
                let Some((items, cardinality)) = self.unwrap_array(&schema)? else {
                    return Ok(Vec::new());
                };
                let item_primitive = JsonSchemaType::of_schema(&items)?;
                if item_primitive == JsonSchemaType::Array {
                    warn!(schema = %schema, "nested array schemas have no catalog analogue");
                    return Ok(Vec::new());
                }
                let filter = FieldFilter { cardinality, ..filter };
                self.match_schema(item_primitive, &items, filter, scope)
            }
            JsonSchemaType::Object => {
                let found = self.match_object(&schema, filter, scope)?;
                Ok(dedup(found))
            }
            _ => {
                let mut found = self.match_scalar(primitive, &schema, filter, scope)?;
                found.sort_by_cached_key(ToString::to_string);
                Ok(dedup(found))
            }
        }
    }

    /// Resolve `$ref`, letting sibling keys override the resolved fragment
    fn resolve<'s>(&self, schema: &'s Value) -> Result<Cow<'s, Value>> {
        let mut current = Cow::Borrowed(schema);
        for _ in 0..MAX_REF_DEPTH {
            if current.get("$ref").is_none() {
                return Ok(current);
            }
            let reference = current
                .get("$ref")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ShapeError::UnsupportedSchema("'$ref' must be a string".to_string())
                })?;
            let resolved = self.resolver.resolve(reference).ok_or_else(|| {
                ShapeError::UnsupportedSchema(format!("unresolvable $ref '{}'", reference))
            })?;
            let mut merged: Map<String, Value> = resolved.as_object().cloned().ok_or_else(|| {
                ShapeError::UnsupportedSchema(format!(
                    "$ref '{}' does not resolve to an object",
                    reference
                ))
            })?;
            if let Some(siblings) = current.as_object() {
                for (key, value) in siblings.iter().filter(|(k, _)| k.as_str() != "$ref") {
                    merged.insert(key.clone(), value.clone());
                }
            }
            current = Cow::Owned(Value::Object(merged));
        }
        Err(ShapeError::UnsupportedSchema(format!(
            "$ref chain deeper than {}",
            MAX_REF_DEPTH
        )))
    }

    /// Element schema and cardinality need of an array schema
    ///
    /// `None` means the schema is recognized but has no catalog analogue.
    fn unwrap_array(&self, schema: &Value) -> Result<Option<(Value, Cardinality)>> {
        let obj = schema.as_object().ok_or_else(|| {
            ShapeError::UnsupportedSchema(format!("schema must be an object: {}", schema))
        })?;

        if let Some(key) = obj
            .keys()
            .find(|k| !ARRAY_KEYS.contains(&k.as_str()) && !ANNOTATION_KEYS.contains(&k.as_str()))
        {
            warn!(key = %key, "array schemas only support type, items and maxItems");
            return Ok(None);
        }

        let items = obj.get("items").ok_or_else(|| {
            ShapeError::UnsupportedSchema("array schema without 'items'".to_string())
        })?;
        let max_items = match obj.get("maxItems") {
            None => None,
            Some(v) => Some(v.as_u64().filter(|n| *n > 0).ok_or_else(|| {
                ShapeError::UnsupportedSchema(format!(
                    "'maxItems' must be a positive integer, got {}",
                    v
                ))
            })?),
        };
        let cardinality = Cardinality::from_max_items(max_items)?;
        Ok(Some((self.resolve(items)?.into_owned(), cardinality)))
    }

    // =========================================================================
    // Catalog traversal
    // =========================================================================

    /// Record targets and fields the top-level search visits
    fn scope_targets(&self, scope: Scope<'_>) -> Result<Vec<(RecordTarget, Vec<FieldDef>)>> {
        let record_types = match scope {
            Scope::Host {
                record_type,
                bundle: Some(bundle),
            } => {
                let fields = self.catalog.fields_of(record_type, Some(bundle))?;
                return Ok(vec![(RecordTarget::bundle(record_type, bundle)?, fields)]);
            }
            Scope::Host {
                record_type,
                bundle: None,
            } => vec![record_type.to_string()],
            Scope::Catalog => self.catalog.record_types(),
        };

        let mut targets = Vec::new();
        for record_type in &record_types {
            let bundles = self.catalog.bundles(record_type);
            if bundles.is_empty() || matches!(scope, Scope::Host { .. }) {
                let fields = self.catalog.base_fields_of(record_type)?;
                targets.push((RecordTarget::record_type_only(record_type.as_str())?, fields));
                if matches!(scope, Scope::Host { .. }) && !bundles.is_empty() {
                    debug!(
                        record_type = %record_type,
                        "no host bundle given, searching base fields only"
                    );
                }
                continue;
            }
            for bundle in &bundles {
                let fields = self.catalog.fields_of(record_type, Some(bundle))?;
                let target = RecordTarget::bundle(record_type.as_str(), bundle.as_str())?;
                targets.push((target, fields));
            }
        }
        Ok(targets)
    }

    /// Search the record type a reference points at
    ///
    /// `per_field` yields tagged item-level matches for one field; results
    /// come back anchored. With several target bundles the base fields are
    /// searched once, each bundle's own fields separately, and item matches
    /// present in every bundle are combined under a per-bundle field name.
    fn search_record<T: Clone>(
        &self,
        record_type: &str,
        target_bundles: &[String],
        mut per_field: impl FnMut(&FieldDef) -> Result<Vec<(T, Expression)>>,
    ) -> Result<Vec<(T, Expression)>> {
        match target_bundles {
            [] => {
                let target = RecordTarget::record_type_only(record_type)?;
                let fields = self.catalog.base_fields_of(record_type)?;
                anchor_fields(&target, &fields, &mut per_field)
            }
            [bundle] => {
                let target = RecordTarget::bundle(record_type, bundle.as_str())?;
                let fields = self.catalog.fields_of(record_type, Some(bundle))?;
                anchor_fields(&target, &fields, &mut per_field)
            }
            bundles => {
                let base = self.catalog.base_fields_of(record_type)?;
                let base_target = RecordTarget::record_type_only(record_type)?;
                let mut found = anchor_fields(&base_target, &base, &mut per_field)?;
                let base_names: HashSet<&str> = base.iter().map(|f| f.name.as_str()).collect();

                let mut per_bundle: Vec<Vec<BundleMatch<T>>> = Vec::new();
                for bundle in bundles {
                    let target = RecordTarget::bundle(record_type, bundle.as_str())?;
                    let mut matches = Vec::new();
                    for field in self
                        .catalog
                        .fields_of(record_type, Some(bundle))?
                        .iter()
                        .filter(|f| !base_names.contains(f.name.as_str()))
                    {
                        let name = FieldName::single(&field.name);
                        for (tag, item) in per_field(field)? {
                            found.push((tag.clone(), item.anchor_at(&target, &name, None)?));
                            matches.push(BundleMatch {
                                field: field.name.clone(),
                                tag,
                                item,
                            });
                        }
                    }
                    per_bundle.push(matches);
                }

                found.extend(combine_bundles(record_type, bundles, &per_bundle)?);
                Ok(found)
            }
        }
    }

    fn excludes(&self, field: &FieldDef) -> bool {
        self.config
            .excluded_field_types
            .iter()
            .any(|t| *t == field.field_type)
    }

    /// Field-level filter: exclusions, required-ness, cardinality
    fn field_applies(&self, field: &FieldDef, filter: FieldFilter) -> bool {
        !self.excludes(field)
            && (field.required || !filter.field_required)
            && field.cardinality.can_serve(filter.cardinality)
    }
}

/// One item-level match inside a single bundle
struct BundleMatch<T> {
    field: String,
    tag: T,
    item: Expression,
}

fn anchor_fields<T>(
    target: &RecordTarget,
    fields: &[FieldDef],
    per_field: &mut impl FnMut(&FieldDef) -> Result<Vec<(T, Expression)>>,
) -> Result<Vec<(T, Expression)>> {
    let mut out = Vec::new();
    for field in fields {
        for (tag, item) in per_field(field)? {
            out.push((tag, item.anchor_at(target, &FieldName::single(&field.name), None)?));
        }
    }
    Ok(out)
}

/// Multi-bundle expressions for item matches found in every bundle
fn combine_bundles<T: Clone>(
    record_type: &str,
    bundles: &[String],
    per_bundle: &[Vec<BundleMatch<T>>],
) -> Result<Vec<(T, Expression)>> {
    let Some((first, rest)) = per_bundle.split_first() else {
        return Ok(Vec::new());
    };
    let target = RecordTarget::new(record_type, bundles.to_vec())?;
    let mut out = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for candidate in first {
        let key = candidate.item.to_string();
        if !seen.insert(key.clone()) {
            continue;
        }
        // Field choices per bundle, then every combination of them
        let mut choices: Vec<Vec<&str>> = vec![first
            .iter()
            .filter(|m| m.item.to_string() == key)
            .map(|m| m.field.as_str())
            .collect()];
        for matches in rest {
            let fields: Vec<&str> = matches
                .iter()
                .filter(|m| m.item.to_string() == key)
                .map(|m| m.field.as_str())
                .collect();
            if fields.is_empty() {
                break;
            }
            choices.push(fields);
        }
        if choices.len() != per_bundle.len() {
            continue;
        }

        let mut combinations: Vec<Vec<(String, String)>> = vec![Vec::new()];
        for (bundle, fields) in bundles.iter().zip(&choices) {
            combinations = combinations
                .into_iter()
                .flat_map(|partial| {
                    fields.iter().map(move |field| {
                        let mut next = partial.clone();
                        next.push((bundle.clone(), field.to_string()));
                        next
                    })
                })
                .collect();
        }
        for names in combinations {
            let field = FieldName::PerBundle(names);
            out.push((candidate.tag.clone(), candidate.item.anchor_at(&target, &field, None)?));
        }
    }
    Ok(out)
}

/// Drop repeated expressions, keeping the first occurrence
fn dedup(expressions: Vec<Expression>) -> Vec<Expression> {
    let mut seen = HashSet::new();
    expressions
        .into_iter()
        .filter(|e| seen.insert(e.to_string()))
        .collect()
}

/// Stable cache key over the matcher's inputs
pub fn cache_key(
    primitive: JsonSchemaType,
    is_required: bool,
    schema: &Value,
    host_record_type: Option<&str>,
    host_bundle: Option<&str>,
) -> Checksum {
    Checksum::from_json(&json!({
        "primitive": primitive.as_str(),
        "required": is_required,
        "schema": schema,
        "host_record_type": host_record_type,
        "host_bundle": host_bundle,
    }))
}
