//! Requirement checks against catalog constraints
//!
//! A requirement holds only when the property's effective constraints
//! guarantee it. Anything the checks below cannot decide is logged and
//! rejected.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::warn;

use crate::catalog::{names, Constraint, PropertyDef};
use crate::shape::extensions::extensions_from_pattern;
use crate::shape::{ShapeRequirement, ShapeRequirements};

/// Outcome of checking one requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Holds,
    Fails,
    /// The matcher has no way to decide this requirement
    Unimplementable,
}

/// Whether every requirement holds for `property` under `constraints`
pub(crate) fn satisfies(
    requirements: &ShapeRequirements,
    property: &PropertyDef,
    constraints: &[Constraint],
) -> bool {
    for requirement in requirements {
        match verdict(requirement, property, constraints) {
            Verdict::Holds => continue,
            Verdict::Fails => return false,
            Verdict::Unimplementable => {
                warn!(
                    requirement = %requirement,
                    property = %property.name,
                    "requirement cannot be checked against catalog constraints, rejecting candidate"
                );
                return false;
            }
        }
    }
    true
}

pub(crate) fn verdict(
    requirement: &ShapeRequirement,
    property: &PropertyDef,
    constraints: &[Constraint],
) -> Verdict {
    let required = requirement.options();
    let holds = match requirement.constraint_name() {
        names::PRIMITIVE_TYPE => match requirement.interface() {
            Some(interface) => interface.implemented_by(&property.kind),
            None => return Verdict::Unimplementable,
        },
        names::CHOICE => {
            named(constraints, names::CHOICE).any(|c| choices_within(&c.options, required))
        }
        names::REGEX => {
            named(constraints, names::REGEX).any(|c| pattern_within(&c.options, required))
        }
        names::RANGE | names::LENGTH => named(constraints, requirement.constraint_name())
            .any(|c| bounds_within(&c.options, required)),
        names::EMAIL | names::HOSTNAME | names::IP | names::UUID => {
            named(constraints, requirement.constraint_name()).any(|c| c.options == *required)
        }
        _ => return Verdict::Unimplementable,
    };
    if holds {
        Verdict::Holds
    } else {
        Verdict::Fails
    }
}

fn named<'c>(
    constraints: &'c [Constraint],
    name: &'c str,
) -> impl Iterator<Item = &'c Constraint> + 'c {
    constraints.iter().filter(move |c| c.is(name))
}

/// Every value the property allows is one the schema allows
fn choices_within(property: &Value, required: &Value) -> bool {
    let (Some(allowed), Some(wanted)) = (
        property.get("choices").and_then(Value::as_array),
        required.get("choices").and_then(Value::as_array),
    ) else {
        return false;
    };
    !allowed.is_empty() && allowed.iter().all(|choice| wanted.contains(choice))
}

/// Equal patterns, or an extension allow-list that is a subset
fn pattern_within(property: &Value, required: &Value) -> bool {
    let (Some(own), Some(wanted)) = (
        property.get("pattern").and_then(Value::as_str),
        required.get("pattern").and_then(Value::as_str),
    ) else {
        return false;
    };
    if own == wanted {
        return true;
    }
    match (extensions_from_pattern(own), extensions_from_pattern(wanted)) {
        (Some(own), Some(wanted)) => {
            let wanted: BTreeSet<String> = wanted.into_iter().collect();
            !own.is_empty() && own.iter().all(|ext| wanted.contains(ext))
        }
        _ => false,
    }
}

/// The property's `[min, max]` lies inside the required one
fn bounds_within(property: &Value, required: &Value) -> bool {
    let bound = |v: &Value, key: &str| v.get(key).and_then(Value::as_f64);
    let min_ok = match bound(required, "min") {
        Some(wanted) => bound(property, "min").map(|own| own >= wanted).unwrap_or(false),
        None => true,
    };
    let max_ok = match bound(required, "max") {
        Some(wanted) => bound(property, "max").map(|own| own <= wanted).unwrap_or(false),
        None => true,
    };
    min_ok && max_ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PropertyKind;
    use crate::shape::extensions::extension_pattern;
    use crate::shape::PrimitiveInterface;
    use serde_json::json;

    fn string_property() -> PropertyDef {
        PropertyDef::new("value", PropertyKind::String)
    }

    fn requirement(name: &str, options: Value) -> ShapeRequirement {
        ShapeRequirement::constraint(name, options).unwrap()
    }

    #[test]
    fn test_primitive_type() {
        let uri = ShapeRequirement::primitive(PrimitiveInterface::Uri);
        let src = PropertyDef::new("src", PropertyKind::FileUri);
        assert_eq!(verdict(&uri, &src, &[]), Verdict::Holds);
        assert_eq!(verdict(&uri, &string_property(), &[]), Verdict::Fails);
    }

    #[test]
    fn test_choice_subset() {
        let wanted = requirement(names::CHOICE, json!({"choices": ["left", "right", "center"]}));
        let narrow = [Constraint::new(names::CHOICE, json!({"choices": ["left", "right"]}))];
        let wide = [Constraint::new(names::CHOICE, json!({"choices": ["left", "justify"]}))];
        assert_eq!(verdict(&wanted, &string_property(), &narrow), Verdict::Holds);
        assert_eq!(verdict(&wanted, &string_property(), &wide), Verdict::Fails);
        assert_eq!(verdict(&wanted, &string_property(), &[]), Verdict::Fails);
    }

    #[test]
    fn test_regex_extension_subset() {
        let pattern = |extensions: &[&str]| json!({"pattern": extension_pattern(extensions)});
        let wanted = requirement(names::REGEX, pattern(&["png", "jpg", "gif"]));
        let images = [Constraint::new(names::REGEX, pattern(&["PNG", "gif"]))];
        let documents = [Constraint::new(names::REGEX, pattern(&["png", "pdf"]))];
        assert_eq!(verdict(&wanted, &string_property(), &images), Verdict::Holds);
        assert_eq!(verdict(&wanted, &string_property(), &documents), Verdict::Fails);
    }

    #[test]
    fn test_range_containment() {
        let wanted = requirement(names::RANGE, json!({"min": 0, "max": 100}));
        let inside = [Constraint::new(names::RANGE, json!({"min": 1, "max": 10}))];
        let open = [Constraint::new(names::RANGE, json!({"min": 1}))];
        let value = PropertyDef::new("value", PropertyKind::Integer);
        assert_eq!(verdict(&wanted, &value, &inside), Verdict::Holds);
        assert_eq!(verdict(&wanted, &value, &open), Verdict::Fails);
    }

    #[test]
    fn test_unknown_requirement_is_rejected() {
        let format = requirement("Format", json!({"format": "duration"}));
        assert_eq!(verdict(&format, &string_property(), &[]), Verdict::Unimplementable);

        let string = ShapeRequirement::primitive(PrimitiveInterface::String);
        let set = ShapeRequirements::new(vec![string, format]).unwrap();
        assert!(!satisfies(&set, &string_property(), &[]));
    }
}
