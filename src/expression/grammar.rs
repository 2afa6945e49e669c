//! Expression String Grammar
//!
//! ```text
//! expression   := PREFIX body
//! body         := record | item
//! record       := "␜" target "␝" fields "␞" delta? "␟" (object | property ("␜" record)?)
//! item         := field_type "␟" (object | property ("␜" record)?)
//! object       := "{" entry ("," entry)* "}"
//! entry        := key "↠" property
//!               | key "↝" property "␜" record
//! target       := "entity:" record_type (":" bundle ("|" bundle)*)?
//! fields       := field ("|" field)*
//! ```
//!
//! A referenced expression is written without its `ℹ︎` prefix right after a
//! `␜`, so nesting shows up as a doubled record-level delimiter (`␜␜`).

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use super::{
    Expression, FieldName, FieldObjectProps, FieldProp, FieldTypeObjectProps, FieldTypeProp,
    RecordTarget, ReferenceFieldProp, ReferenceFieldTypeProp,
};
use crate::error::{Result, ShapeError};

pub const PREFIX: &str = "ℹ︎";
pub const RECORD_LEVEL: char = '␜';
pub const FIELD_LEVEL: char = '␝';
pub const ITEM_LEVEL: char = '␞';
pub const PROPERTY_LEVEL: char = '␟';
pub const OBJECT_OPEN: char = '{';
pub const OBJECT_CLOSE: char = '}';
pub const OBJECT_SEPARATOR: char = ',';
pub const USE_PROPERTY: char = '↠';
pub const FOLLOW_REFERENCE: char = '↝';
pub const BUNDLE_SEPARATOR: char = '|';
pub const RECORD_TYPE_PREFIX: &str = "entity:";

/// Characters that may not appear inside names
pub fn is_reserved(c: char) -> bool {
    matches!(
        c,
        RECORD_LEVEL
            | FIELD_LEVEL
            | ITEM_LEVEL
            | PROPERTY_LEVEL
            | OBJECT_OPEN
            | OBJECT_CLOSE
            | OBJECT_SEPARATOR
            | USE_PROPERTY
            | FOLLOW_REFERENCE
            | BUNDLE_SEPARATOR
            | ':'
            | 'ℹ'
            | '\u{FE0E}'
    )
}

// =============================================================================
// Formatting
// =============================================================================

/// Write an expression without the leading prefix
pub(crate) fn write_body(expr: &Expression, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expr {
        Expression::FieldProp(p) => {
            write_record_head(p.record(), p.field(), p.delta(), f)?;
            write!(f, "{}", p.property())
        }
        Expression::ReferenceFieldProp(r) => {
            write_body(&Expression::FieldProp(r.referencer().clone()), f)?;
            write!(f, "{}", RECORD_LEVEL)?;
            write_body(r.referenced(), f)
        }
        Expression::FieldObjectProps(o) => {
            write_record_head(o.record(), o.field(), o.delta(), f)?;
            write_object(o.props(), f)
        }
        Expression::FieldTypeProp(p) => {
            write!(f, "{}{}{}", p.field_type(), PROPERTY_LEVEL, p.property())
        }
        Expression::ReferenceFieldTypeProp(r) => {
            let referencer = r.referencer();
            write!(
                f,
                "{}{}{}{}",
                referencer.field_type(),
                PROPERTY_LEVEL,
                referencer.property(),
                RECORD_LEVEL
            )?;
            write_body(r.referenced(), f)
        }
        Expression::FieldTypeObjectProps(o) => {
            write!(f, "{}{}", o.field_type(), PROPERTY_LEVEL)?;
            write_object(o.props(), f)
        }
    }
}

fn write_record_head(
    record: &RecordTarget,
    field: &FieldName,
    delta: Option<usize>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(f, "{}{}{}{}{}", RECORD_LEVEL, record, FIELD_LEVEL, field, ITEM_LEVEL)?;
    if let Some(delta) = delta {
        write!(f, "{}", delta)?;
    }
    write!(f, "{}", PROPERTY_LEVEL)
}

fn write_object(props: &[(String, Expression)], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", OBJECT_OPEN)?;
    for (i, (key, expr)) in props.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", OBJECT_SEPARATOR)?;
        }
        match expr {
            Expression::FieldProp(p) => write!(f, "{}{}{}", key, USE_PROPERTY, p.property())?,
            Expression::FieldTypeProp(p) => write!(f, "{}{}{}", key, USE_PROPERTY, p.property())?,
            Expression::ReferenceFieldProp(r) => {
                let property = r.referencer().property();
                write!(f, "{}{}{}{}", key, FOLLOW_REFERENCE, property, RECORD_LEVEL)?;
                write_body(r.referenced(), f)?;
            }
            Expression::ReferenceFieldTypeProp(r) => {
                let property = r.referencer().property();
                write!(f, "{}{}{}{}", key, FOLLOW_REFERENCE, property, RECORD_LEVEL)?;
                write_body(r.referenced(), f)?;
            }
            // Constructors reject nested objects as object entries
            Expression::FieldObjectProps(_) | Expression::FieldTypeObjectProps(_) => {
                return Err(fmt::Error)
            }
        }
    }
    write!(f, "{}", OBJECT_CLOSE)
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse the canonical string form of an expression
pub fn parse(input: &str) -> Result<Expression> {
    let body = input
        .strip_prefix(PREFIX)
        .ok_or_else(|| invalid(input, "missing expression prefix"))?;
    let mut parser = Parser {
        input,
        chars: body.chars().peekable(),
    };
    let expr = if parser.peek() == Some(RECORD_LEVEL) {
        parser.record()?
    } else {
        parser.item()?
    };
    if let Some(c) = parser.peek() {
        return Err(invalid(input, &format!("unexpected trailing '{}'", c)));
    }
    Ok(expr)
}

fn invalid(input: &str, reason: &str) -> ShapeError {
    ShapeError::InvalidExpression(format!("{}: {}", reason, input))
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<Chars<'a>>,
}

/// Where an object entry's expression gets anchored
enum ObjectAnchor<'a> {
    Record(&'a RecordTarget, &'a FieldName, Option<usize>),
    Item(&'a str),
}

impl<'a> Parser<'a> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        match self.chars.next() {
            Some(c) if c == expected => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", expected, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", expected))),
        }
    }

    fn error(&self, reason: &str) -> ShapeError {
        invalid(self.input, reason)
    }

    /// Read until one of `stops` (not consumed) or end of input
    fn take_until(&mut self, stops: &[char]) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if stops.contains(&c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }

    /// Read a name: everything up to the next reserved character
    fn name(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if is_reserved(c) {
                break;
            }
            out.push(c);
            self.chars.next();
        }
        out
    }

    fn record(&mut self) -> Result<Expression> {
        self.expect(RECORD_LEVEL)?;
        let target = self.target()?;
        self.expect(FIELD_LEVEL)?;
        let field = self.field_name(&target)?;
        self.expect(ITEM_LEVEL)?;
        let delta = self.delta()?;
        self.expect(PROPERTY_LEVEL)?;

        if self.peek() == Some(OBJECT_OPEN) {
            let props = self.object(ObjectAnchor::Record(&target, &field, delta))?;
            return Ok(FieldObjectProps::new(target, field, delta, props)?.into());
        }

        let property = self.name();
        let prop = FieldProp::new(target, field, delta, property)?;
        if self.peek() == Some(RECORD_LEVEL) {
            self.chars.next();
            let referenced = self.record()?;
            return Ok(ReferenceFieldProp::new(prop, referenced)?.into());
        }
        Ok(prop.into())
    }

    fn item(&mut self) -> Result<Expression> {
        let field_type = self.name();
        self.expect(PROPERTY_LEVEL)?;

        if self.peek() == Some(OBJECT_OPEN) {
            let props = self.object(ObjectAnchor::Item(&field_type))?;
            return Ok(FieldTypeObjectProps::new(field_type, props)?.into());
        }

        let property = self.name();
        let prop = FieldTypeProp::new(field_type, property)?;
        if self.peek() == Some(RECORD_LEVEL) {
            self.chars.next();
            let referenced = self.record()?;
            return Ok(ReferenceFieldTypeProp::new(prop, referenced)?.into());
        }
        Ok(prop.into())
    }

    fn target(&mut self) -> Result<RecordTarget> {
        let raw = self.take_until(&[FIELD_LEVEL]);
        let rest = raw
            .strip_prefix(RECORD_TYPE_PREFIX)
            .ok_or_else(|| self.error("record target must start with 'entity:'"))?;
        match rest.split_once(':') {
            None => RecordTarget::record_type_only(rest),
            Some((record_type, bundles)) => RecordTarget::new(
                record_type,
                bundles.split(BUNDLE_SEPARATOR).map(String::from).collect(),
            ),
        }
    }

    fn field_name(&mut self, target: &RecordTarget) -> Result<FieldName> {
        let raw = self.take_until(&[ITEM_LEVEL]);
        if !raw.contains(BUNDLE_SEPARATOR) {
            return Ok(FieldName::Single(raw));
        }
        let names: Vec<&str> = raw.split(BUNDLE_SEPARATOR).collect();
        if names.len() != target.bundles().len() {
            return Err(self.error(&format!(
                "{} field names for {} bundles",
                names.len(),
                target.bundles().len()
            )));
        }
        Ok(FieldName::PerBundle(
            target
                .bundles()
                .iter()
                .cloned()
                .zip(names.into_iter().map(String::from))
                .collect(),
        ))
    }

    fn delta(&mut self) -> Result<Option<usize>> {
        let raw = self.take_until(&[PROPERTY_LEVEL]);
        if raw.is_empty() {
            return Ok(None);
        }
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(self.error(&format!("index '{}' must be a non-negative integer", raw)));
        }
        raw.parse::<usize>()
            .map(Some)
            .map_err(|e| self.error(&format!("index '{}': {}", raw, e)))
    }

    fn object(&mut self, anchor: ObjectAnchor<'_>) -> Result<Vec<(String, Expression)>> {
        self.expect(OBJECT_OPEN)?;
        let mut props = Vec::new();
        loop {
            let key = self.name();
            let symbol = self
                .chars
                .next()
                .ok_or_else(|| self.error("unterminated object expression"))?;
            let property = self.name();
            let expr: Expression = match (symbol, &anchor) {
                (USE_PROPERTY, ObjectAnchor::Record(target, field, delta)) => {
                    FieldProp::new((*target).clone(), (*field).clone(), *delta, property)?.into()
                }
                (USE_PROPERTY, ObjectAnchor::Item(field_type)) => {
                    FieldTypeProp::new(*field_type, property)?.into()
                }
                (FOLLOW_REFERENCE, ObjectAnchor::Record(target, field, delta)) => {
                    self.expect(RECORD_LEVEL)?;
                    let referencer =
                        FieldProp::new((*target).clone(), (*field).clone(), *delta, property)?;
                    ReferenceFieldProp::new(referencer, self.record()?)?.into()
                }
                (FOLLOW_REFERENCE, ObjectAnchor::Item(field_type)) => {
                    self.expect(RECORD_LEVEL)?;
                    let referencer = FieldTypeProp::new(*field_type, property)?;
                    ReferenceFieldTypeProp::new(referencer, self.record()?)?.into()
                }
                (other, _) => {
                    let message = format!("unexpected '{}' after object key '{}'", other, key);
                    return Err(self.error(&message));
                }
            };
            props.push((key, expr));

            match self.chars.next() {
                Some(OBJECT_SEPARATOR) => continue,
                Some(OBJECT_CLOSE) => break,
                Some(c) => {
                    let message = format!("unexpected '{}' in object expression", c);
                    return Err(self.error(&message));
                }
                None => return Err(self.error("unterminated object expression")),
            }
        }
        Ok(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(s: &str) -> Expression {
        let expr = parse(s).unwrap();
        assert_eq!(expr.to_string(), s);
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
        expr
    }

    #[test]
    fn test_field_prop() {
        let expr = round_trip("ℹ︎␜entity:node:article␝title␞␟value");
        match expr {
            Expression::FieldProp(p) => {
                assert_eq!(p.record().record_type(), "node");
                assert_eq!(p.record().bundles(), ["article".to_string()]);
                assert_eq!(p.field(), &FieldName::single("title"));
                assert_eq!(p.delta(), None);
                assert_eq!(p.property(), "value");
            }
            other => panic!("Expected FieldProp, got {:?}", other),
        }
    }

    #[test]
    fn test_field_prop_with_delta_and_no_bundle() {
        let expr = round_trip("ℹ︎␜entity:user␝roles␞2␟target_id");
        assert_eq!(expr.field_ref().unwrap().1, Some(2));
    }

    #[test]
    fn test_multi_bundle_field_names() {
        let expr = round_trip("ℹ︎␜entity:node:article|page␝field_hero|field_banner␞␟alt");
        let (field, _) = expr.field_ref().unwrap();
        assert_eq!(field.for_bundle(Some("article")), Some("field_hero"));
        assert_eq!(field.for_bundle(Some("page")), Some("field_banner"));
        round_trip("ℹ︎␜entity:node:article|page␝field_media␞␟target_id");
    }

    #[test]
    fn test_reference_chain() {
        let expr = round_trip("ℹ︎␜entity:node:page␝author␞␟entity␜␜entity:user␝name␞␟value");
        assert!(expr.is_reference());
        round_trip(
            "ℹ︎␜entity:node:page␝author␞␟entity␜␜entity:user␝picture␞␟entity␜␜entity:file␝uri␞␟url",
        );
    }

    #[test]
    fn test_object_props() {
        let expr = round_trip(
            "ℹ︎␜entity:node:article␝field_image␞␟{src↝entity␜␜entity:file␝uri␞␟url,alt↠alt,width↠width}",
        );
        match expr {
            Expression::FieldObjectProps(o) => {
                let keys: Vec<&str> = o.props().iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["src", "alt", "width"]);
            }
            other => panic!("Expected FieldObjectProps, got {:?}", other),
        }
    }

    #[test]
    fn test_item_level_forms() {
        round_trip("ℹ︎image␟alt");
        round_trip("ℹ︎image␟entity␜␜entity:file␝uri␞␟url");
        round_trip("ℹ︎image␟{src↝entity␜␜entity:file␝uri␞␟url,alt↠alt}");
    }

    #[test]
    fn test_reference_to_object() {
        round_trip(
            "ℹ︎␜entity:node:article␝field_media␞␟entity␜␜entity:media:image␝field_image␞␟{alt↠alt,width↠width}",
        );
    }

    #[test]
    fn test_object_entry_referencing_object() {
        round_trip(
            "ℹ︎␜entity:node:article␝field_media␞0␟{media↝entity␜␜entity:media:image␝field_image␞␟{alt↠alt},id↠target_id}",
        );
    }

    #[test]
    fn test_rejects_malformed() {
        for input in [
            "",
            "␜entity:node␝title␞␟value",
            "ℹ︎␜node␝title␞␟value",
            "ℹ︎␜entity:node␝title␞-1␟value",
            "ℹ︎␜entity:node␝title␞x␟value",
            "ℹ︎␜entity:node␝title␞␟",
            "ℹ︎␜entity:node:article␝a|b␞␟value",
            "ℹ︎image␟{alt↠alt",
            "ℹ︎image␟{alt↠alt,alt↠title}",
            "ℹ︎image␟alt}",
            "ℹ︎image␟entity␜image␟alt",
        ] {
            assert!(parse(input).is_err(), "should reject {:?}", input);
        }
    }
}
