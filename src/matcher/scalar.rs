//! Scalar matching: one property per candidate

use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::debug;

use super::check;
use super::{FieldFilter, Scope, ShapeMatcher};
use crate::catalog::{names, Constraint, FieldDef, PropertyDef, PropertyKind};
use crate::error::Result;
use crate::expression::{Expression, FieldName, FieldTypeProp, ReferenceFieldTypeProp};
use crate::shape::extensions::{extension_pattern, split_allow_list};
use crate::shape::{derive_requirements, JsonSchemaType, ShapeRequirements};

impl<'a> ShapeMatcher<'a> {
    pub(super) fn match_scalar(
        &self,
        primitive: JsonSchemaType,
        schema: &Value,
        filter: FieldFilter,
        scope: Scope<'_>,
    ) -> Result<Vec<Expression>> {
        let extensions = self.config.image_extensions.as_slice();
        let requirements = derive_requirements(primitive, schema, extensions)?;
        debug!(requirements = requirements.len(), "matching scalar schema");

        let mut found = Vec::new();
        for (target, fields) in self.scope_targets(scope)? {
            for field in &fields {
                let hops = self.config.reference_hops;
                let name = FieldName::single(&field.name);
                for item in self.match_field(field, &requirements, filter, hops, &[])? {
                    found.push(item.anchor_at(&target, &name, None)?);
                }
            }
        }
        Ok(found)
    }

    /// Item-level matches on one field
    ///
    /// `inherited` carries file extension allow-lists from the field a
    /// reference was followed through.
    pub(super) fn match_field(
        &self,
        field: &FieldDef,
        requirements: &ShapeRequirements,
        filter: FieldFilter,
        hops: u8,
        inherited: &[Constraint],
    ) -> Result<Vec<Expression>> {
        if !self.field_applies(field, filter) {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for property in candidate_properties(field, filter) {
            if !property.kind.is_reference() {
                let constraints = effective_constraints(field, property, inherited);
                if check::satisfies(requirements, property, &constraints) {
                    found.push(FieldTypeProp::new(&field.field_type, &property.name)?.into());
                }
                continue;
            }

            if hops == 0 {
                continue;
            }
            let Some(target_type) = reference_target(field, property) else {
                debug!(
                    field = %field.name,
                    property = %property.name,
                    "reference without target type"
                );
                continue;
            };
            let carried = carried_extensions(field, inherited);
            let referenced = self.search_record(target_type, &field.target_bundles, |inner| {
                Ok(self
                    .match_field(inner, requirements, filter.referenced(), hops - 1, &carried)?
                    .into_iter()
                    .map(|item| ((), item))
                    .collect())
            })?;

            let referencer = FieldTypeProp::new(&field.field_type, &property.name)?;
            for ((), expr) in referenced {
                found.push(ReferenceFieldTypeProp::new(referencer.clone(), expr)?.into());
            }
        }
        Ok(found)
    }
}

/// Properties that may be produced as matches
pub(super) fn candidate_properties(
    field: &FieldDef,
    filter: FieldFilter,
) -> impl Iterator<Item = &PropertyDef> {
    field.item.properties.iter().filter(move |p| {
        !p.is_plumbing() && (p.computed || p.required || !filter.property_required)
    })
}

pub(super) fn reference_target<'f>(
    field: &'f FieldDef,
    property: &'f PropertyDef,
) -> Option<&'f str> {
    property
        .kind
        .reference_target()
        .or(field.target_type.as_deref())
}

/// Allow-lists that keep governing the fields behind a reference
pub(super) fn carried_extensions(field: &FieldDef, inherited: &[Constraint]) -> Vec<Constraint> {
    field
        .field_constraints(names::FILE_EXTENSION)
        .chain(inherited.iter().filter(|c| c.is(names::FILE_EXTENSION)))
        .cloned()
        .collect()
}

/// Property constraints, narrowed field overrides, folded file extensions
pub(super) fn effective_constraints(
    field: &FieldDef,
    property: &PropertyDef,
    inherited: &[Constraint],
) -> Vec<Constraint> {
    let mut constraints = field.constraints_for(property);
    if let Some(folded) = fold_file_extensions(field, property, inherited) {
        constraints.push(folded);
    }
    constraints
}

/// Allow-lists on a file location become a case-insensitive `Regex`
///
/// Applies to `FileUri` properties and to computed properties whose declared
/// dependency is one. Several allow-lists intersect.
fn fold_file_extensions(
    field: &FieldDef,
    property: &PropertyDef,
    inherited: &[Constraint],
) -> Option<Constraint> {
    let dependency = property
        .computed_from
        .as_deref()
        .and_then(|name| field.item.property(name));
    let is_file = property.kind == PropertyKind::FileUri
        || dependency.map(|d| d.kind == PropertyKind::FileUri).unwrap_or(false);
    if !is_file {
        return None;
    }

    let own = property.constraints.iter();
    let from_dependency = dependency.into_iter().flat_map(|d| d.constraints.iter());
    let allowed = field
        .field_constraints(names::FILE_EXTENSION)
        .chain(inherited.iter().filter(|c| c.is(names::FILE_EXTENSION)))
        .chain(own.chain(from_dependency).filter(|c| c.is(names::FILE_EXTENSION)))
        .filter_map(|c| allow_list(&c.options))
        .reduce(|acc, next| acc.intersection(&next).cloned().collect())?;

    let allowed: Vec<String> = allowed.into_iter().collect();
    Some(Constraint::new(
        names::REGEX,
        json!({ "pattern": extension_pattern(&allowed) }),
    ))
}

/// `{"extensions": "png gif"}` or `{"extensions": ["png", "gif"]}`
fn allow_list(options: &Value) -> Option<BTreeSet<String>> {
    let extensions = match options.get("extensions")? {
        Value::String(raw) => split_allow_list(raw),
        Value::Array(items) => {
            let joined: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            split_allow_list(&joined.join(" "))
        }
        _ => return None,
    };
    Some(extensions.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::extensions::extensions_from_pattern;

    fn image_field(extensions: &str) -> FieldDef {
        serde_json::from_value(json!({
            "name": "field_image",
            "field_type": "image",
            "constraints": [{"name": "FileExtension", "options": {"extensions": extensions}}],
            "item": {"field_type": "image", "properties": [
                {"name": "uri", "kind": {"type": "file_uri"}, "internal": true},
                {"name": "src", "kind": {"type": "uri"}, "computed": true, "computed_from": "uri"},
                {"name": "alt", "kind": {"type": "string"}}
            ]}
        }))
        .unwrap()
    }

    #[test]
    fn test_folds_extensions_through_computed_dependency() {
        let field = image_field("png GIF .jpg");
        let src = field.item.property("src").unwrap();
        let folded = fold_file_extensions(&field, src, &[]).unwrap();
        let pattern = folded.options["pattern"].as_str().unwrap();
        assert_eq!(
            extensions_from_pattern(pattern),
            Some(vec!["gif".to_string(), "jpg".to_string(), "png".to_string()])
        );

        let alt = field.item.property("alt").unwrap();
        assert!(fold_file_extensions(&field, alt, &[]).is_none());
    }

    #[test]
    fn test_inherited_allow_lists_intersect() {
        let field = image_field("png gif jpg");
        let inherited = [Constraint::new(
            names::FILE_EXTENSION,
            json!({"extensions": ["jpg", "webp"]}),
        )];
        let src = field.item.property("src").unwrap();
        let folded = fold_file_extensions(&field, src, &inherited).unwrap();
        assert_eq!(
            extensions_from_pattern(folded.options["pattern"].as_str().unwrap()),
            Some(vec!["jpg".to_string()])
        );
    }

    #[test]
    fn test_candidate_properties_skip_plumbing() {
        let field = image_field("png");
        let names = |is_required| {
            let filter = FieldFilter::new(is_required, Default::default());
            candidate_properties(&field, filter)
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(false), vec!["src", "alt"]);

        // Required props only accept required or computed properties
        assert_eq!(names(true), vec!["src"]);
        assert_eq!(names, vec!["src"]);
    }
}
