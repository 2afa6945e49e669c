//! Expression Evaluator
//!
//! Walks an [`Expression`] against a live record, field item, or item list.
//! Pure: the only inputs are the catalog, the record accessor and the
//! context, and the only failure mode is a typed [`ShapeError`].

use chrono::{DateTime, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::debug;

use crate::catalog::{PropertyDef, PropertyKind, SchemaCatalog};
use crate::config::EvaluationConfig;
use crate::error::{Result, ShapeError};
use crate::expression::{Anchor, Expression};
use crate::record::{FieldItem, FieldItemList, Record, RecordAccessor};

/// What an expression is evaluated against
#[derive(Debug, Clone, Copy)]
pub enum EvalContext<'a> {
    Record(&'a Record),
    Item {
        field_type: &'a str,
        item: &'a FieldItem,
    },
    Items(&'a FieldItemList),
}

impl EvalContext<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Record(record) => format!("record {}", record.describe()),
            Self::Item { field_type, .. } => format!("field item of type {}", field_type),
            Self::Items(list) => format!("field item list of type {}", list.field_type),
        }
    }
}

/// Evaluates expressions against records
pub struct Evaluator<'a> {
    catalog: &'a dyn SchemaCatalog,
    records: &'a dyn RecordAccessor,
    config: EvaluationConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(catalog: &'a dyn SchemaCatalog, records: &'a dyn RecordAccessor) -> Self {
        Self::with_config(catalog, records, EvaluationConfig::default())
    }

    pub fn with_config(
        catalog: &'a dyn SchemaCatalog,
        records: &'a dyn RecordAccessor,
        config: EvaluationConfig,
    ) -> Self {
        Self {
            catalog,
            records,
            config,
        }
    }

    /// Evaluate `expr` against `context`
    ///
    /// A missing context yields `Null` for optional props and
    /// `MissingRequiredValue` for required ones.
    pub fn evaluate(
        &self,
        context: Option<EvalContext<'_>>,
        expr: &Expression,
        is_required: bool,
    ) -> Result<Value> {
        let Some(context) = context else {
            return missing(expr, is_required);
        };
        check_supported(&context, expr)?;

        match context {
            EvalContext::Items(list) => list
                .items
                .iter()
                .map(|slot| {
                    let item_context = slot.as_ref().map(|item| EvalContext::Item {
                        field_type: &list.field_type,
                        item,
                    });
                    self.evaluate(item_context, expr, is_required)
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            EvalContext::Item { field_type, item } => {
                self.evaluate_item(field_type, item, expr, is_required)
            }
            EvalContext::Record(record) => self.evaluate_record(record, expr, is_required),
        }
    }

    fn evaluate_item(
        &self,
        field_type: &str,
        item: &FieldItem,
        expr: &Expression,
        is_required: bool,
    ) -> Result<Value> {
        match expr {
            Expression::FieldTypeProp(p) => {
                let property = self.property_def(field_type, p.property())?;
                match item.get(p.property()) {
                    None | Some(Value::Null) => missing(expr, is_required),
                    Some(raw) => {
                        let value = cast(&property.kind, raw);
                        Ok(self.normalize(field_type, &property, value))
                    }
                }
            }
            Expression::FieldTypeObjectProps(o) => {
                let context = EvalContext::Item { field_type, item };
                let mut object = Map::new();
                for (key, sub) in o.props() {
                    object.insert(key.clone(), self.evaluate(Some(context), sub, is_required)?);
                }
                Ok(Value::Object(object))
            }
            Expression::ReferenceFieldTypeProp(r) => {
                let property = self.property_def(field_type, r.referencer().property())?;
                if !property.kind.is_reference() {
                    return Err(ShapeError::InvalidExpression(format!(
                        "{}.{} is {}, not a reference",
                        field_type, property.name, property.kind
                    )));
                }
                let target = r.referenced().record_target().ok_or_else(|| {
                    ShapeError::InvalidExpression(format!(
                        "{} has no record target",
                        r.referenced()
                    ))
                })?;
                let referenced = self
                    .records
                    .referenced_record(target.record_type(), item, &property);
                debug!(
                    expression = %expr,
                    found = referenced.is_some(),
                    "followed reference"
                );
                let context = referenced.as_ref().map(EvalContext::Record);
                self.evaluate(context, r.referenced(), is_required)
            }
            other => Err(ShapeError::mismatch(
                other.anchor(),
                format!("field item of type {}", field_type),
            )),
        }
    }

    fn evaluate_record(
        &self,
        record: &Record,
        expr: &Expression,
        is_required: bool,
    ) -> Result<Value> {
        let unanchored =
            || ShapeError::mismatch(expr.anchor(), format!("record {}", record.describe()));
        let (field_name, delta) = expr.field_ref().ok_or_else(unanchored)?;
        let name = field_name
            .for_bundle(record.bundle.as_deref())
            .ok_or_else(unanchored)?;
        let field = self
            .catalog
            .field(&record.record_type, record.bundle.as_deref(), name)?;

        // Index validation happens before any data is read
        if let Some(delta) = delta {
            if !field.cardinality.allows_index(delta) {
                return Err(ShapeError::InvalidIndex {
                    field: name.to_string(),
                    index: delta,
                    cardinality: field.cardinality.to_string(),
                });
            }
        }

        let item_expr = expr.to_item_level(&field.field_type)?;
        let items = self.records.field_items(record, name);
        let single_delta = match delta {
            Some(delta) => Some(delta),
            None if !field.cardinality.is_multiple() => Some(0),
            None => None,
        };

        match (single_delta, items) {
            (Some(delta), items) => {
                if let Some(list) = items {
                    check_list_type(list, &field.field_type)?;
                }
                let item = items.and_then(|list| list.get(delta));
                let context = item.map(|item| EvalContext::Item {
                    field_type: &field.field_type,
                    item,
                });
                self.evaluate(context, &item_expr, is_required)
            }
            (None, Some(list)) => {
                self.evaluate(Some(EvalContext::Items(list)), &item_expr, is_required)
            }
            (None, None) => self.evaluate(None, &item_expr, is_required),
        }
    }

    fn property_def(&self, field_type: &str, property: &str) -> Result<PropertyDef> {
        self.catalog
            .item_shape(field_type)
            .ok_or_else(|| ShapeError::UnknownFieldType(field_type.to_string()))?
            .property(property)
            .cloned()
            .ok_or_else(|| ShapeError::UnknownProperty {
                field_type: field_type.to_string(),
                property: property.to_string(),
            })
    }

    /// Offset-less date-times on configured field types are UTC
    fn normalize(&self, field_type: &str, property: &PropertyDef, value: Value) -> Value {
        if property.kind != PropertyKind::DateTime
            || !self.config.utc_normalized_field_types.iter().any(|t| t == field_type)
        {
            return value;
        }
        match value {
            Value::String(s) if lacks_offset(&s) => Value::String(format!("{}Z", s)),
            other => other,
        }
    }
}

fn missing(expr: &Expression, is_required: bool) -> Result<Value> {
    if is_required {
        Err(ShapeError::MissingRequiredValue {
            expression: expr.to_string(),
        })
    } else {
        Ok(Value::Null)
    }
}

fn check_supported(context: &EvalContext<'_>, expr: &Expression) -> Result<()> {
    let supported = match (context, expr.anchor()) {
        (EvalContext::Record(record), Anchor::Record(target)) => {
            target.supports(&record.record_type, record.bundle.as_deref())
        }
        (EvalContext::Item { field_type, .. }, Anchor::Item(expected)) => *field_type == expected,
        (EvalContext::Items(list), Anchor::Item(expected)) => list.field_type == expected,
        _ => false,
    };
    if supported {
        Ok(())
    } else {
        Err(ShapeError::mismatch(expr.anchor(), context.describe()))
    }
}

fn check_list_type(list: &FieldItemList, field_type: &str) -> Result<()> {
    if list.field_type == field_type {
        Ok(())
    } else {
        Err(ShapeError::mismatch(
            format!("field item list of type {}", field_type),
            format!("field item list of type {}", list.field_type),
        ))
    }
}

/// True for naive `YYYY-MM-DDTHH:MM:SS[.fff]` strings without an offset
fn lacks_offset(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_err()
        && NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// Cast a raw stored value to the property's canonical scalar form
fn cast(kind: &PropertyKind, raw: &Value) -> Value {
    match kind {
        PropertyKind::String
        | PropertyKind::Uri
        | PropertyKind::FileUri
        | PropertyKind::Date
        | PropertyKind::DateTime => match raw {
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(if *b { "1" } else { "0" }.to_string()),
            other => other.clone(),
        },
        PropertyKind::Integer => match raw {
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| raw.clone()),
            Value::Bool(b) => Value::from(*b as i64),
            other => other.clone(),
        },
        PropertyKind::Float => match raw {
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_else(|_| raw.clone()),
            Value::Number(n) => n.as_f64().map(Value::from).unwrap_or_else(|| raw.clone()),
            other => other.clone(),
        },
        PropertyKind::Boolean => match raw {
            Value::Number(n) => Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => Value::Bool(matches!(s.as_str(), "1" | "true" | "on")),
            other => other.clone(),
        },
        PropertyKind::Reference { .. } | PropertyKind::Map => raw.clone(),
    }
}
