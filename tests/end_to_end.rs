//! End-to-end tests over the fixture catalog
//!
//! The catalog under `tests/fixtures/catalog` has a `page` record type
//! referencing `user`; the records fixture holds two pages and one user.

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use prop_shapes::{
    DefinitionResolver, EvalContext, Evaluator, Expression, InMemoryCatalog, InMemoryRecords,
    JsonSchemaType, MemoryCacheStore, Record, SchemaCatalog, ShapeError, ShapeMatcher,
    StaticAdapters, StaticComponents, SuggestionRanker,
};
use serde_json::{json, Value};

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::load_from_directory(&fixtures_path().join("catalog")).unwrap()
}

fn records() -> InMemoryRecords {
    InMemoryRecords::load_from_file(&fixtures_path().join("records.json")).unwrap()
}

fn page(records: &InMemoryRecords, id: &str) -> Record {
    records.get("page", id).unwrap().clone()
}

fn strings(exprs: &[Expression]) -> Vec<String> {
    exprs.iter().map(Expression::to_string).collect()
}

fn expr(s: &str) -> Expression {
    s.parse().unwrap()
}

// =============================================================================
// Matching
// =============================================================================

#[test]
fn test_required_string_across_catalog() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);

    let matches = matcher
        .find_matches(JsonSchemaType::String, true, &json!({"type": "string"}), None, None)
        .unwrap();
    assert_eq!(
        strings(&matches),
        vec![
            "ℹ︎␜entity:page␝author␞␟entity␜␜entity:user␝name␞␟value",
            "ℹ︎␜entity:page␝title␞␟value",
            "ℹ︎␜entity:user␝name␞␟value",
        ]
    );
}

#[test]
fn test_required_props_only_bind_required_fields() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);

    for schema in [json!({"type": "string"}), json!({"type": "integer"})] {
        let primitive = matcher.schema_type(&schema).unwrap();
        for expr in matcher.find_matches(primitive, true, &schema, None, None).unwrap() {
            let target = expr.record_target().unwrap();
            let (name, _) = expr.field_ref().unwrap();
            let field = catalog.field(target.record_type(), None, name.primary()).unwrap();
            assert!(field.required, "{} binds optional field {}", expr, field.name);
        }
    }
}

#[test]
fn test_host_restricts_search() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);

    let matches = matcher
        .find_matches(JsonSchemaType::String, true, &json!({"type": "string"}), Some("user"), None)
        .unwrap();
    assert_eq!(strings(&matches), vec!["ℹ︎␜entity:user␝name␞␟value"]);
}

#[test]
fn test_array_prop_matches_multi_valued_field() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);

    let schema = json!({"type": "array", "items": {"type": "string"}, "maxItems": 3});
    let matches = matcher
        .find_matches(JsonSchemaType::Array, false, &schema, Some("page"), None)
        .unwrap();
    assert_eq!(strings(&matches), vec!["ℹ︎␜entity:page␝tags␞␟value"]);

    let wider = json!({"type": "array", "items": {"type": "string"}, "maxItems": 5});
    assert!(matcher
        .find_matches(JsonSchemaType::Array, false, &wider, Some("page"), None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_object_prop_binds_image_field() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);

    let schema = json!({
        "type": "object",
        "properties": {
            "src": {"type": "string", "format": "uri", "contentMediaType": "image/*"},
            "width": {"type": "integer"}
        },
        "required": ["src"]
    });
    let matches = matcher
        .find_matches(JsonSchemaType::Object, false, &schema, None, None)
        .unwrap();
    assert_eq!(strings(&matches), vec!["ℹ︎␜entity:page␝hero␞␟{src↠src,width↠width}"]);
}

#[test]
fn test_matching_is_deterministic_and_cached() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let cache = MemoryCacheStore::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver).with_cache(&cache);
    let schema = json!({"type": "string"});

    let first = matcher
        .find_matches(JsonSchemaType::String, false, &schema, None, None)
        .unwrap();
    let second = matcher
        .find_matches(JsonSchemaType::String, false, &schema, None, None)
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.stats().hits(), 1);

    let uncached = ShapeMatcher::new(&catalog, &resolver)
        .find_matches(JsonSchemaType::String, false, &schema, None, None)
        .unwrap();
    assert_eq!(first, uncached);
}

// =============================================================================
// Evaluation
// =============================================================================

#[test]
fn test_evaluates_scalar_and_list() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");
    let context = Some(EvalContext::Record(&page));

    assert_eq!(
        evaluator
            .evaluate(context, &expr("ℹ︎␜entity:page␝title␞␟value"), true)
            .unwrap(),
        json!("Hello")
    );
    // Absent middle item keeps its slot
    assert_eq!(
        evaluator
            .evaluate(context, &expr("ℹ︎␜entity:page␝tags␞␟value"), false)
            .unwrap(),
        json!(["rust", null, "cms"])
    );
    assert_eq!(
        evaluator
            .evaluate(context, &expr("ℹ︎␜entity:page␝tags␞2␟value"), false)
            .unwrap(),
        json!("cms")
    );
}

#[test]
fn test_absent_values_and_indexes() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");
    let context = Some(EvalContext::Record(&page));

    let hole = expr("ℹ︎␜entity:page␝tags␞1␟value");
    assert_eq!(evaluator.evaluate(context, &hole, false).unwrap(), Value::Null);
    assert!(evaluator.evaluate(context, &hole, true).unwrap_err().is_missing_value());

    let out_of_range = expr("ℹ︎␜entity:page␝tags␞3␟value");
    assert!(matches!(
        evaluator.evaluate(context, &out_of_range, false),
        Err(ShapeError::InvalidIndex { index: 3, .. })
    ));

    let title = expr("ℹ︎␜entity:page␝title␞␟value");
    assert_eq!(evaluator.evaluate(None, &title, false).unwrap(), Value::Null);
    assert!(evaluator.evaluate(None, &title, true).unwrap_err().is_missing_value());
}

#[test]
fn test_date_time_gets_utc_designator() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");

    assert_eq!(
        evaluator
            .evaluate(
                Some(EvalContext::Record(&page)),
                &expr("ℹ︎␜entity:page␝published␞␟value"),
                false
            )
            .unwrap(),
        json!("2024-01-01T10:00:00Z")
    );

    let list = &page.fields["published"];
    let item = list.get(0).unwrap();
    let context = EvalContext::Item {
        field_type: "datetime",
        item,
    };
    assert_eq!(
        evaluator
            .evaluate(Some(context), &expr("ℹ︎datetime␟value"), true)
            .unwrap(),
        json!("2024-01-01T10:00:00Z")
    );
}

#[test]
fn test_follows_references() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let author_name = expr("ℹ︎␜entity:page␝author␞␟entity␜␜entity:user␝name␞␟value");

    let published = page(&records, "1");
    assert_eq!(
        evaluator
            .evaluate(Some(EvalContext::Record(&published)), &author_name, true)
            .unwrap(),
        json!("Ada")
    );

    // Dangling reference
    let draft = page(&records, "2");
    assert_eq!(
        evaluator
            .evaluate(Some(EvalContext::Record(&draft)), &author_name, false)
            .unwrap(),
        Value::Null
    );
    assert!(evaluator
        .evaluate(Some(EvalContext::Record(&draft)), &author_name, true)
        .unwrap_err()
        .is_missing_value());
}

#[test]
fn test_object_evaluation_casts_properties() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");

    let value = evaluator
        .evaluate(
            Some(EvalContext::Record(&page)),
            &expr("ℹ︎␜entity:page␝hero␞␟{src↠src,width↠width}"),
            false,
        )
        .unwrap();
    assert_eq!(value, json!({"src": "https://example.com/hero.png", "width": 640}));
}

#[test]
fn test_wrong_record_type_is_a_mismatch() {
    let catalog = catalog();
    let records = records();
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");

    let err = evaluator
        .evaluate(
            Some(EvalContext::Record(&page)),
            &expr("ℹ︎␜entity:user␝name␞␟value"),
            false,
        )
        .unwrap_err();
    assert!(err.is_mismatch());
}

#[test]
fn test_matches_evaluate_against_records() {
    let catalog = catalog();
    let records = records();
    let resolver = DefinitionResolver::new();
    let matcher = ShapeMatcher::new(&catalog, &resolver);
    let evaluator = Evaluator::new(&catalog, &records);
    let page = page(&records, "1");

    let values: Vec<Value> = matcher
        .find_matches(JsonSchemaType::String, true, &json!({"type": "string"}), Some("page"), None)
        .unwrap()
        .iter()
        .map(|e| evaluator.evaluate(Some(EvalContext::Record(&page)), e, true).unwrap())
        .collect();
    assert_eq!(values, vec![json!("Ada"), json!("Hello")]);
}

// =============================================================================
// Suggestions
// =============================================================================

#[test]
fn test_card_suggestions() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let components =
        StaticComponents::load_from_file(&fixtures_path().join("components.json")).unwrap();
    let adapters = StaticAdapters::load_from_file(&fixtures_path().join("adapters.json")).unwrap();
    let matcher = ShapeMatcher::new(&catalog, &resolver);
    let ranker = SuggestionRanker::new(matcher, &components, &adapters);

    let suggestions = ranker.suggest("card", Some("page")).unwrap();
    assert_eq!(
        suggestions.keys().map(String::as_str).collect::<Vec<_>>(),
        vec!["heading", "image", "tags"]
    );

    let heading = &suggestions["heading"];
    assert!(heading.required);
    let labels: Vec<&str> = heading.instances.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(labels, vec!["Author → Name", "Title"]);
    let adapter_ids: Vec<&str> = heading.adapters.iter().map(|a| a.adapter_id.as_str()).collect();
    assert_eq!(adapter_ids, vec!["day_of_week", "uppercase"]);

    let image = &suggestions["image"];
    assert!(!image.required);
    assert_eq!(image.instances.len(), 1);
    assert_eq!(
        image.instances[0].label,
        "Hero image (using: src, width; not using: alt, height)"
    );
    assert!(image.adapters.is_empty());

    let tags = &suggestions["tags"];
    let labels: Vec<&str> = tags.instances.iter().map(|i| i.label.as_str()).collect();
    assert_eq!(labels, vec!["Tags"]);
}

#[test]
fn test_suggestions_for_other_host() {
    let catalog = catalog();
    let resolver = DefinitionResolver::new();
    let components =
        StaticComponents::load_from_file(&fixtures_path().join("components.json")).unwrap();
    let adapters = StaticAdapters::default();
    let matcher = ShapeMatcher::new(&catalog, &resolver);
    let ranker = SuggestionRanker::new(matcher, &components, &adapters);

    let suggestions = ranker.suggest("card", Some("user")).unwrap();
    let labels: Vec<&str> = suggestions["heading"]
        .instances
        .iter()
        .map(|i| i.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Name"]);
    assert!(suggestions["image"].instances.is_empty());
}
