//! Prop Expressions
//!
//! Immutable pointers describing how to read a (possibly object-shaped)
//! value out of a record graph. Every expression has a canonical string
//! form (see [`grammar`]) that round-trips exactly, because stored prop
//! bindings are persisted as strings.
//!
//! Two families exist:
//!
//! - **record level** (`FieldProp`, `ReferenceFieldProp`, `FieldObjectProps`):
//!   anchored at a record type, evaluated against a record;
//! - **item level** (`FieldTypeProp`, `ReferenceFieldTypeProp`,
//!   `FieldTypeObjectProps`): anchored at a field type only, evaluated
//!   against a field item. The matcher works at this level before anchoring.

pub mod grammar;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Result, ShapeError};

pub use grammar::parse;

// =============================================================================
// Record Target
// =============================================================================

/// Record type plus the bundles an expression applies to
///
/// An empty bundle list means "any bundle" (base fields).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordTarget {
    record_type: String,
    bundles: Vec<String>,
}

impl RecordTarget {
    pub fn new(record_type: impl Into<String>, bundles: Vec<String>) -> Result<Self> {
        let record_type = record_type.into();
        check_name("record type", &record_type)?;
        for (i, bundle) in bundles.iter().enumerate() {
            check_name("bundle", bundle)?;
            if bundles[..i].contains(bundle) {
                return Err(ShapeError::InvalidExpression(format!(
                    "duplicate bundle '{}' on record type '{}'",
                    bundle, record_type
                )));
            }
        }
        Ok(Self {
            record_type,
            bundles,
        })
    }

    /// Target without a bundle restriction
    pub fn record_type_only(record_type: impl Into<String>) -> Result<Self> {
        Self::new(record_type, Vec::new())
    }

    /// Target restricted to one bundle
    pub fn bundle(record_type: impl Into<String>, bundle: impl Into<String>) -> Result<Self> {
        Self::new(record_type, vec![bundle.into()])
    }

    pub fn record_type(&self) -> &str {
        &self.record_type
    }

    pub fn bundles(&self) -> &[String] {
        &self.bundles
    }

    /// Whether a record of this type/bundle can be evaluated against
    pub fn supports(&self, record_type: &str, bundle: Option<&str>) -> bool {
        if self.record_type != record_type {
            return false;
        }
        if self.bundles.is_empty() {
            return true;
        }
        bundle.map(|b| self.bundles.iter().any(|own| own == b)).unwrap_or(false)
    }
}

impl fmt::Display for RecordTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", grammar::RECORD_TYPE_PREFIX, self.record_type)?;
        if !self.bundles.is_empty() {
            write!(f, ":{}", self.bundles.join(&grammar::BUNDLE_SEPARATOR.to_string()))?;
        }
        Ok(())
    }
}

// =============================================================================
// Field Name
// =============================================================================

/// Field name, either shared or resolved per bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldName {
    Single(String),
    /// `(bundle, field)` pairs in the record target's bundle order
    PerBundle(Vec<(String, String)>),
}

impl FieldName {
    pub fn single(name: impl Into<String>) -> Self {
        Self::Single(name.into())
    }

    /// Concrete field name for a record of `bundle`
    pub fn for_bundle(&self, bundle: Option<&str>) -> Option<&str> {
        match self {
            Self::Single(name) => Some(name),
            Self::PerBundle(map) => {
                let bundle = bundle?;
                map.iter().find(|(b, _)| b == bundle).map(|(_, f)| f.as_str())
            }
        }
    }

    /// Field name used for the first bundle (labels, sorting)
    pub fn primary(&self) -> &str {
        match self {
            Self::Single(name) => name,
            Self::PerBundle(map) => map.first().map(|(_, f)| f.as_str()).unwrap_or_default(),
        }
    }

    fn validate(&self, record: &RecordTarget) -> Result<()> {
        match self {
            Self::Single(name) => check_name("field", name),
            Self::PerBundle(map) => {
                if record.bundles.len() <= 1 {
                    return Err(ShapeError::InvalidExpression(format!(
                        "per-bundle field names require more than one bundle on {}",
                        record
                    )));
                }
                let keys: Vec<&String> = map.iter().map(|(b, _)| b).collect();
                let bundles: Vec<&String> = record.bundles.iter().collect();
                if keys != bundles {
                    return Err(ShapeError::InvalidExpression(format!(
                        "per-bundle field names {:?} do not match bundles {:?}",
                        keys, bundles
                    )));
                }
                map.iter().try_for_each(|(_, f)| check_name("field", f))
            }
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(name) => write!(f, "{}", name),
            Self::PerBundle(map) => {
                let names: Vec<&str> = map.iter().map(|(_, n)| n.as_str()).collect();
                write!(f, "{}", names.join(&grammar::BUNDLE_SEPARATOR.to_string()))
            }
        }
    }
}

// =============================================================================
// Expression Variants
// =============================================================================

/// Points at one property of one field on a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldProp {
    record: RecordTarget,
    field: FieldName,
    delta: Option<usize>,
    property: String,
}

impl FieldProp {
    pub fn new(
        record: RecordTarget,
        field: FieldName,
        delta: Option<usize>,
        property: impl Into<String>,
    ) -> Result<Self> {
        let property = property.into();
        field.validate(&record)?;
        check_name("property", &property)?;
        Ok(Self {
            record,
            field,
            delta,
            property,
        })
    }

    pub fn record(&self) -> &RecordTarget {
        &self.record
    }

    pub fn field(&self) -> &FieldName {
        &self.field
    }

    pub fn delta(&self) -> Option<usize> {
        self.delta
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

/// Follows a reference property, then continues into the target record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceFieldProp {
    referencer: FieldProp,
    referenced: Box<Expression>,
}

impl ReferenceFieldProp {
    pub fn new(referencer: FieldProp, referenced: Expression) -> Result<Self> {
        if !referenced.is_record_level() {
            return Err(ShapeError::InvalidExpression(format!(
                "referenced expression must be record level, got {}",
                referenced.kind_name()
            )));
        }
        Ok(Self {
            referencer,
            referenced: Box::new(referenced),
        })
    }

    pub fn referencer(&self) -> &FieldProp {
        &self.referencer
    }

    pub fn referenced(&self) -> &Expression {
        &self.referenced
    }
}

/// Assembles several properties of one field into an object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldObjectProps {
    record: RecordTarget,
    field: FieldName,
    delta: Option<usize>,
    props: Vec<(String, Expression)>,
}

impl FieldObjectProps {
    pub fn new(
        record: RecordTarget,
        field: FieldName,
        delta: Option<usize>,
        props: Vec<(String, Expression)>,
    ) -> Result<Self> {
        field.validate(&record)?;
        check_object_keys(&props)?;
        for (key, expr) in &props {
            let anchor = match expr {
                Expression::FieldProp(p) => p,
                Expression::ReferenceFieldProp(r) => &r.referencer,
                other => {
                    return Err(ShapeError::InvalidExpression(format!(
                        "object property '{}' must be FieldProp or ReferenceFieldProp, got {}",
                        key,
                        other.kind_name()
                    )))
                }
            };
            if anchor.record != record || anchor.field != field || anchor.delta != delta {
                return Err(ShapeError::InvalidExpression(format!(
                    "object property '{}' points outside {}.{}",
                    key, record, field
                )));
            }
        }
        Ok(Self {
            record,
            field,
            delta,
            props,
        })
    }

    pub fn record(&self) -> &RecordTarget {
        &self.record
    }

    pub fn field(&self) -> &FieldName {
        &self.field
    }

    pub fn delta(&self) -> Option<usize> {
        self.delta
    }

    pub fn props(&self) -> &[(String, Expression)] {
        &self.props
    }
}

/// Points at one property of a field item of a given field type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldTypeProp {
    field_type: String,
    property: String,
}

impl FieldTypeProp {
    pub fn new(field_type: impl Into<String>, property: impl Into<String>) -> Result<Self> {
        let field_type = field_type.into();
        let property = property.into();
        check_name("field type", &field_type)?;
        check_name("property", &property)?;
        Ok(Self {
            field_type,
            property,
        })
    }

    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    pub fn property(&self) -> &str {
        &self.property
    }
}

/// Item-level analogue of [`ReferenceFieldProp`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceFieldTypeProp {
    referencer: FieldTypeProp,
    referenced: Box<Expression>,
}

impl ReferenceFieldTypeProp {
    pub fn new(referencer: FieldTypeProp, referenced: Expression) -> Result<Self> {
        if !referenced.is_record_level() {
            return Err(ShapeError::InvalidExpression(format!(
                "referenced expression must be record level, got {}",
                referenced.kind_name()
            )));
        }
        Ok(Self {
            referencer,
            referenced: Box::new(referenced),
        })
    }

    pub fn referencer(&self) -> &FieldTypeProp {
        &self.referencer
    }

    pub fn referenced(&self) -> &Expression {
        &self.referenced
    }
}

/// Item-level analogue of [`FieldObjectProps`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldTypeObjectProps {
    field_type: String,
    props: Vec<(String, Expression)>,
}

impl FieldTypeObjectProps {
    pub fn new(field_type: impl Into<String>, props: Vec<(String, Expression)>) -> Result<Self> {
        let field_type = field_type.into();
        check_name("field type", &field_type)?;
        check_object_keys(&props)?;
        for (key, expr) in &props {
            let anchor = match expr {
                Expression::FieldTypeProp(p) => p,
                Expression::ReferenceFieldTypeProp(r) => &r.referencer,
                other => {
                    return Err(ShapeError::InvalidExpression(format!(
                        "object property '{}' must be an item-level property, got {}",
                        key,
                        other.kind_name()
                    )))
                }
            };
            if anchor.field_type != field_type {
                return Err(ShapeError::InvalidExpression(format!(
                    "object property '{}' targets field type '{}', expected '{}'",
                    key, anchor.field_type, field_type
                )));
            }
        }
        Ok(Self { field_type, props })
    }

    pub fn field_type(&self) -> &str {
        &self.field_type
    }

    pub fn props(&self) -> &[(String, Expression)] {
        &self.props
    }
}

// =============================================================================
// Expression
// =============================================================================

/// Closed set of prop expressions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    FieldProp(FieldProp),
    ReferenceFieldProp(ReferenceFieldProp),
    FieldObjectProps(FieldObjectProps),
    FieldTypeProp(FieldTypeProp),
    ReferenceFieldTypeProp(ReferenceFieldTypeProp),
    FieldTypeObjectProps(FieldTypeObjectProps),
}

/// What an expression can be evaluated against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor<'a> {
    Record(&'a RecordTarget),
    Item(&'a str),
}

impl fmt::Display for Anchor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anchor::Record(target) => write!(f, "record {}", target),
            Anchor::Item(field_type) => write!(f, "field item of type {}", field_type),
        }
    }
}

impl Expression {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::FieldProp(_) => "FieldProp",
            Self::ReferenceFieldProp(_) => "ReferenceFieldProp",
            Self::FieldObjectProps(_) => "FieldObjectProps",
            Self::FieldTypeProp(_) => "FieldTypeProp",
            Self::ReferenceFieldTypeProp(_) => "ReferenceFieldTypeProp",
            Self::FieldTypeObjectProps(_) => "FieldTypeObjectProps",
        }
    }

    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            Self::FieldProp(_) | Self::ReferenceFieldProp(_) | Self::FieldObjectProps(_)
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::ReferenceFieldProp(_) | Self::ReferenceFieldTypeProp(_))
    }

    /// The input this expression declares it supports
    pub fn anchor(&self) -> Anchor<'_> {
        match self {
            Self::FieldProp(p) => Anchor::Record(&p.record),
            Self::ReferenceFieldProp(r) => Anchor::Record(&r.referencer.record),
            Self::FieldObjectProps(o) => Anchor::Record(&o.record),
            Self::FieldTypeProp(p) => Anchor::Item(&p.field_type),
            Self::ReferenceFieldTypeProp(r) => Anchor::Item(&r.referencer.field_type),
            Self::FieldTypeObjectProps(o) => Anchor::Item(&o.field_type),
        }
    }

    /// Record target for record-level expressions
    pub fn record_target(&self) -> Option<&RecordTarget> {
        match self.anchor() {
            Anchor::Record(target) => Some(target),
            Anchor::Item(_) => None,
        }
    }

    /// Field name and delta for record-level expressions
    pub fn field_ref(&self) -> Option<(&FieldName, Option<usize>)> {
        match self {
            Self::FieldProp(p) => Some((&p.field, p.delta)),
            Self::ReferenceFieldProp(r) => Some((&r.referencer.field, r.referencer.delta)),
            Self::FieldObjectProps(o) => Some((&o.field, o.delta)),
            _ => None,
        }
    }

    /// Item properties read directly off the anchored field item
    pub fn item_properties(&self) -> Vec<&str> {
        match self {
            Self::FieldProp(p) => vec![p.property.as_str()],
            Self::ReferenceFieldProp(r) => vec![r.referencer.property.as_str()],
            Self::FieldTypeProp(p) => vec![p.property.as_str()],
            Self::ReferenceFieldTypeProp(r) => vec![r.referencer.property.as_str()],
            Self::FieldObjectProps(o) => dedup_properties(&o.props),
            Self::FieldTypeObjectProps(o) => dedup_properties(&o.props),
        }
    }

    /// Item-level analogue of a record-level expression
    ///
    /// The delta is dropped; item-level expressions never index.
    pub fn to_item_level(&self, field_type: &str) -> Result<Expression> {
        match self {
            Self::FieldProp(p) => {
                let prop = FieldTypeProp::new(field_type, &p.property)?;
                Ok(Self::FieldTypeProp(prop))
            }
            Self::ReferenceFieldProp(r) => {
                let referencer = FieldTypeProp::new(field_type, &r.referencer.property)?;
                let reference = ReferenceFieldTypeProp::new(referencer, (*r.referenced).clone())?;
                Ok(Self::ReferenceFieldTypeProp(reference))
            }
            Self::FieldObjectProps(o) => {
                let props = o
                    .props
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), e.to_item_level(field_type)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::FieldTypeObjectProps(FieldTypeObjectProps::new(field_type, props)?))
            }
            Self::FieldTypeProp(_)
            | Self::ReferenceFieldTypeProp(_)
            | Self::FieldTypeObjectProps(_) => Ok(self.clone()),
        }
    }

    /// Anchor an item-level expression at a concrete record field
    pub fn anchor_at(
        &self,
        record: &RecordTarget,
        field: &FieldName,
        delta: Option<usize>,
    ) -> Result<Expression> {
        match self {
            Self::FieldTypeProp(p) => Ok(Self::FieldProp(FieldProp::new(
                record.clone(),
                field.clone(),
                delta,
                &p.property,
            )?)),
            Self::ReferenceFieldTypeProp(r) => Ok(Self::ReferenceFieldProp(ReferenceFieldProp::new(
                FieldProp::new(record.clone(), field.clone(), delta, &r.referencer.property)?,
                (*r.referenced).clone(),
            )?)),
            Self::FieldTypeObjectProps(o) => {
                let props = o
                    .props
                    .iter()
                    .map(|(k, e)| Ok((k.clone(), e.anchor_at(record, field, delta)?)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::FieldObjectProps(FieldObjectProps::new(
                    record.clone(),
                    field.clone(),
                    delta,
                    props,
                )?))
            }
            other => Err(ShapeError::InvalidExpression(format!(
                "{} is already anchored at a record",
                other.kind_name()
            ))),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", grammar::PREFIX)?;
        grammar::write_body(self, f)
    }
}

impl std::str::FromStr for Expression {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self> {
        grammar::parse(s)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        grammar::parse(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(impl From<$variant> for Expression {
            fn from(value: $variant) -> Self {
                Expression::$variant(value)
            }
        })*
    };
}

impl_from_variant!(
    FieldProp,
    ReferenceFieldProp,
    FieldObjectProps,
    FieldTypeProp,
    ReferenceFieldTypeProp,
    FieldTypeObjectProps
);

// =============================================================================
// Validation Helpers
// =============================================================================

fn check_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShapeError::InvalidExpression(format!("empty {} name", what)));
    }
    if let Some(c) = name.chars().find(|c| grammar::is_reserved(*c)) {
        return Err(ShapeError::InvalidExpression(format!(
            "{} name '{}' contains reserved character '{}'",
            what, name, c
        )));
    }
    Ok(())
}

fn check_object_keys(props: &[(String, Expression)]) -> Result<()> {
    if props.is_empty() {
        return Err(ShapeError::InvalidExpression(
            "object expression needs at least one property".to_string(),
        ));
    }
    for (i, (key, _)) in props.iter().enumerate() {
        check_name("object key", key)?;
        if props[..i].iter().any(|(k, _)| k == key) {
            return Err(ShapeError::InvalidExpression(format!("duplicate object key '{}'", key)));
        }
    }
    Ok(())
}

fn dedup_properties(props: &[(String, Expression)]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for (_, expr) in props {
        for p in expr.item_properties() {
            if !out.contains(&p) {
                out.push(p);
            }
        }
    }
    out
}
