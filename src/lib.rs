//! Prop Shapes
//!
//! Binds UI component props to structured content. A prop declares the shape
//! it wants as a JSON-Schema fragment; this crate finds every place in a
//! content schema catalog that can supply a value of that shape, names each
//! one with a compact string expression, and reads those expressions back
//! against concrete records.
//!
//! ## Features
//!
//! - **Expression Algebra**: Six expression kinds with a lossless string grammar
//! - **Shape Matching**: JSON-Schema fragments to candidate expressions, following references
//! - **Evaluation**: Expressions read against records, with casting and date-time normalization
//! - **Suggestions**: Per-component candidate lists with human labels and adapters
//! - **Result Caching**: Matcher results memoized under a canonical checksum
//!
//! ## Architecture
//!
//! ```text
//! JSON-Schema ──► shape ──► matcher ──► Vec<Expression> ──► ranker
//!                             │  ▲
//!                   catalog ◄─┘  └─► cache
//!
//! Expression + Record ──► evaluator ──► serde_json::Value
//!                            │
//!                  record ◄──┘
//! ```

pub mod cache;
pub mod catalog;
pub mod checksum;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod expression;
pub mod matcher;
pub mod ranker;
pub mod record;
pub mod shape;

pub use cache::{CacheStore, MemoryCacheStore};
pub use catalog::{
    Cardinality, FieldDef, InMemoryCatalog, ItemShape, PropertyDef, PropertyKind, SchemaCatalog,
};
pub use checksum::Checksum;
pub use config::ShapesConfig;
pub use error::{Result, ShapeError};
pub use evaluator::{EvalContext, Evaluator};
pub use expression::Expression;
pub use matcher::{DefinitionResolver, SchemaResolver, ShapeMatcher};
pub use ranker::{PropSuggestions, StaticAdapters, StaticComponents, SuggestionRanker};
pub use record::{InMemoryRecords, Record, RecordAccessor};
pub use shape::{JsonSchemaType, ShapeRequirements};
