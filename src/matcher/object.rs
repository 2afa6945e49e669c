//! Object matching
//!
//! Each schema sub-property is scalar-matched against a field. Candidates
//! are then assigned to sub-properties, one grouping per field, with no
//! candidate used twice. Groupings covering every sub-property are complete;
//! groupings covering at least the required ones are minimal.

use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

use super::scalar::{candidate_properties, carried_extensions, reference_target};
use super::{FieldFilter, Scope, ShapeMatcher};
use crate::catalog::{Constraint, FieldDef};
use crate::error::{Result, ShapeError};
use crate::expression::{
    Expression, FieldName, FieldTypeObjectProps, FieldTypeProp, ReferenceFieldTypeProp,
};
use crate::shape::{derive_requirements, JsonSchemaType, ShapeRequirements};

/// How much of an object schema a grouping covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Completeness {
    Complete,
    Minimal,
}

/// One sub-property of an object schema
#[derive(Debug, Clone)]
struct ObjectKey {
    name: String,
    required: bool,
    requirements: ShapeRequirements,
}

impl<'a> ShapeMatcher<'a> {
    pub(super) fn match_object(
        &self,
        schema: &Value,
        filter: FieldFilter,
        scope: Scope<'_>,
    ) -> Result<Vec<Expression>> {
        let Some(keys) = self.object_keys(schema)? else {
            return Ok(Vec::new());
        };

        let mut found = Vec::new();
        for (target, fields) in self.scope_targets(scope)? {
            for field in &fields {
                for (completeness, item) in
                    self.match_object_field(field, &keys, filter, self.config.reference_hops, &[])?
                {
                    let expr = item.anchor_at(&target, &FieldName::single(&field.name), None)?;
                    found.push((completeness, expr));
                }
            }
        }

        // Complete before minimal, then by field name
        found.sort_by_cached_key(|(completeness, expr)| {
            let field = expr
                .field_ref()
                .map(|(name, _)| name.primary().to_string())
                .unwrap_or_default();
            (*completeness, field, expr.to_string())
        });
        Ok(found.into_iter().map(|(_, expr)| expr).collect())
    }

    /// Sub-properties of an object schema
    ///
    /// `None` when a sub-property is not scalar, which has no catalog analogue.
    fn object_keys(&self, schema: &Value) -> Result<Option<Vec<ObjectKey>>> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ShapeError::UnsupportedSchema("object schema without 'properties'".to_string())
            })?;
        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let extensions = self.config.image_extensions.as_slice();
        let mut keys = Vec::with_capacity(properties.len());
        for (name, sub) in properties {
            let sub = self.resolve(sub)?;
            let primitive = JsonSchemaType::of_schema(&sub)?;
            if !primitive.is_scalar() {
                warn!(
                    property = %name,
                    schema_type = %primitive,
                    "object sub-properties must be scalar"
                );
                return Ok(None);
            }
            keys.push(ObjectKey {
                name: name.clone(),
                required: required.contains(&name.as_str()),
                requirements: derive_requirements(primitive, &sub, extensions)?,
            });
        }
        Ok(Some(keys))
    }

    /// Item-level object matches on one field, including through references
    fn match_object_field(
        &self,
        field: &FieldDef,
        keys: &[ObjectKey],
        filter: FieldFilter,
        hops: u8,
        inherited: &[Constraint],
    ) -> Result<Vec<(Completeness, Expression)>> {
        if !self.field_applies(field, filter) {
            return Ok(Vec::new());
        }

        let mut candidates = Vec::with_capacity(keys.len());
        for key in keys {
            let need = FieldFilter {
                property_required: key.required,
                ..filter
            };
            let matches = self.match_field(field, &key.requirements, need, hops, inherited)?;
            candidates.push((key, matches));
        }

        let mut found = Vec::new();
        if let Some(grouping) = group(&field.field_type, keys, candidates)? {
            found.push(grouping);
        }

        if hops == 0 {
            return Ok(found);
        }
        for property in candidate_properties(field, filter).filter(|p| p.kind.is_reference()) {
            let Some(target_type) = reference_target(field, property) else {
                continue;
            };
            let carried = carried_extensions(field, inherited);
            let referenced = self.search_record(target_type, &field.target_bundles, |inner| {
                self.match_object_field(inner, keys, filter.referenced(), hops - 1, &carried)
            })?;
            let referencer = FieldTypeProp::new(&field.field_type, &property.name)?;
            for (completeness, expr) in referenced {
                let expr = ReferenceFieldTypeProp::new(referencer.clone(), expr)?;
                found.push((completeness, expr.into()));
            }
        }
        Ok(found)
    }
}

/// Choose one grouping for a field from per-key candidates
///
/// Assignments never give one candidate to two keys and must cover every
/// required key. Among those, the winner covers the most keys, then uses the
/// fewest references, then the most name-equal properties, then compares
/// lexically.
fn group(
    field_type: &str,
    keys: &[ObjectKey],
    candidates: Vec<(&ObjectKey, Vec<Expression>)>,
) -> Result<Option<(Completeness, Expression)>> {
    let options: Vec<Vec<Expression>> = candidates
        .into_iter()
        .map(|(key, mut options)| {
            options.sort_by_cached_key(|expr| preference(&key.name, expr));
            options.dedup();
            options
        })
        .collect();

    let mut search = Assignment {
        keys,
        options: &options,
        picks: Vec::with_capacity(keys.len()),
        used: HashSet::new(),
        best: None,
    };
    search.run();
    let Some((_, picks)) = search.best else {
        return Ok(None);
    };

    let chosen: Vec<(String, Expression)> = keys
        .iter()
        .zip(&options)
        .zip(picks)
        .filter_map(|((key, options), pick)| pick.map(|i| (key.name.clone(), options[i].clone())))
        .collect();
    if chosen.is_empty() {
        return Ok(None);
    }
    let completeness = if chosen.len() == keys.len() {
        Completeness::Complete
    } else {
        Completeness::Minimal
    };
    Ok(Some((completeness, FieldTypeObjectProps::new(field_type, chosen)?.into())))
}

/// Ranking of one assignment; lower is better
type Score = (usize, usize, usize, Vec<Option<String>>);

/// Backtracking search over key → candidate assignments
struct Assignment<'k> {
    keys: &'k [ObjectKey],
    options: &'k [Vec<Expression>],
    picks: Vec<Option<usize>>,
    used: HashSet<String>,
    best: Option<(Score, Vec<Option<usize>>)>,
}

impl Assignment<'_> {
    fn run(&mut self) {
        let k = self.picks.len();
        if k == self.keys.len() {
            let score = self.score();
            if self.best.as_ref().map(|(best, _)| score < *best).unwrap_or(true) {
                self.best = Some((score, self.picks.clone()));
            }
            return;
        }

        let options = self.options;
        for (i, expr) in options[k].iter().enumerate() {
            let canonical = expr.to_string();
            if self.used.contains(&canonical) {
                continue;
            }
            self.used.insert(canonical.clone());
            self.picks.push(Some(i));
            self.run();
            self.picks.pop();
            self.used.remove(&canonical);
        }
        if !self.keys[k].required {
            self.picks.push(None);
            self.run();
            self.picks.pop();
        }
    }

    fn score(&self) -> Score {
        let mut uncovered = 0;
        let mut references = 0;
        let mut renamed = 0;
        let mut strings = Vec::with_capacity(self.picks.len());
        for ((key, options), pick) in self.keys.iter().zip(self.options).zip(&self.picks) {
            match pick {
                Some(i) => {
                    let (is_reference, not_name_equal, canonical) =
                        preference(&key.name, &options[*i]);
                    references += usize::from(is_reference);
                    renamed += usize::from(not_name_equal);
                    strings.push(Some(canonical));
                }
                None => {
                    uncovered += 1;
                    strings.push(None);
                }
            }
        }
        (uncovered, references, renamed, strings)
    }
}

/// Sort key: direct before reference, name-equal before not, then lexical
fn preference(key: &str, expr: &Expression) -> (bool, bool, String) {
    let name_equal = leaf_property(expr).map(|p| p == key).unwrap_or(false);
    (expr.is_reference(), !name_equal, expr.to_string())
}

/// The property a scalar expression finally reads
fn leaf_property(expr: &Expression) -> Option<&str> {
    match expr {
        Expression::FieldProp(p) => Some(p.property()),
        Expression::FieldTypeProp(p) => Some(p.property()),
        Expression::ReferenceFieldProp(r) => leaf_property(r.referenced()),
        Expression::ReferenceFieldTypeProp(r) => leaf_property(r.referenced()),
        Expression::FieldObjectProps(_) | Expression::FieldTypeObjectProps(_) => None,
    }
}
