//! Tool surface integration tests: argument defaults, response shaping,
//! and the stable error-kind mapping.

mod common;

use common::{FailingProvider, MockProvider};
use offerdex::engine::Engine;
use offerdex::ingest::IngestionPipeline;
use offerdex::tools::{dispatch, handle_line, kinds, ToolRequest};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

const HEADER: &str = "LINK ID,ADVERTISER,NAME,DESCRIPTION,KEYWORDS,CATEGORY,PROMOTION TYPE,SEVEN DAY EPC,THREE MONTH EPC,CLICK URL,COUPON CODE\n";

fn setup() -> (TempDir, Engine) {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");

    let csv = format!(
        "{HEADER}\
1,Acme,Cooking Book,Recipes to read,book,Books,Sale,$2.00 USD,,https://example.com/1,\n\
2,Acme,Novel Reader,A novel to read,book,Books,,1.50,,https://example.com/2,SAVE5\n\
3,Acme,Laptop Stand,For gadgets,tech,Tech,,,,https://example.com/3,\n"
    );

    IngestionPipeline::new(Arc::new(MockProvider), 100)
        .run(csv.as_bytes(), &db)
        .unwrap();

    let engine = Engine::open(&db, Arc::new(MockProvider)).unwrap();
    (temp, engine)
}

fn request(tool: &str, arguments: Value) -> ToolRequest {
    ToolRequest {
        tool: tool.to_string(),
        arguments,
    }
}

#[test]
fn test_search_products() {
    let (_temp, engine) = setup();

    let response = dispatch(
        &engine,
        &request(
            "search_products",
            json!({"query": "book to read", "num_results": 2}),
        ),
    );
    assert!(response.ok);

    let data = response.data.unwrap();
    let results = data.as_array().unwrap();
    assert_eq!(results.len(), 2);
    for result in results {
        assert!(result.get("relevance").is_some());
        assert!(result.get("epc").is_some());
        assert!(result.get("url").is_some());
    }
}

#[test]
fn test_search_filters_forwarded() {
    let (_temp, engine) = setup();

    let response = dispatch(
        &engine,
        &request(
            "search_products",
            json!({"query": "book", "min_epc": 1.6, "category": "Books"}),
        ),
    );
    assert!(response.ok);

    let data = response.data.unwrap();
    let results = data.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["name"], "Cooking Book");
}

#[test]
fn test_optional_arguments_normalize_to_defaults() {
    let (_temp, engine) = setup();

    // negative and mis-typed optional arguments fall back to defaults
    // instead of erroring
    for arguments in [
        json!({"query": "book", "num_results": -3}),
        json!({"query": "book", "num_results": "many"}),
        json!({"query": "book"}),
    ] {
        let response = dispatch(&engine, &request("search_products", arguments));
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 3);
    }
}

#[test]
fn test_missing_query_is_validation_error() {
    let (_temp, engine) = setup();

    let response = dispatch(&engine, &request("search_products", json!({})));
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().kind, kinds::VALIDATION_ERROR);

    let response = dispatch(
        &engine,
        &request("search_products", json!({"query": ""})),
    );
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().kind, kinds::VALIDATION_ERROR);
}

#[test]
fn test_get_categories() {
    let (_temp, engine) = setup();

    let response = dispatch(&engine, &request("get_categories", Value::Null));
    assert!(response.ok);

    let data = response.data.unwrap();
    let categories = data.as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["category"], "Books");
    assert_eq!(categories[0]["product_count"], 2);
}

#[test]
fn test_get_top_products() {
    let (_temp, engine) = setup();

    let response = dispatch(
        &engine,
        &request("get_top_products", json!({"category": "Books", "limit": 5})),
    );
    assert!(response.ok);

    let data = response.data.unwrap();
    let results = data.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["name"], "Cooking Book");
    assert_eq!(results[0]["epc"], 2.0);
    // relevance is a search-only field
    assert!(results[0].get("relevance").is_none());
}

#[test]
fn test_get_product_stats() {
    let (_temp, engine) = setup();

    let response = dispatch(&engine, &request("get_product_stats", Value::Null));
    assert!(response.ok);

    let data = response.data.unwrap();
    assert_eq!(data["total_products"], 3);
    assert_eq!(data["categories"], 2);
    assert_eq!(data["average_epc"], 1.75);
    assert_eq!(data["products_with_coupons"], 1);
    assert_eq!(data["top_categories"][0]["category"], "Books");
}

#[test]
fn test_unknown_tool() {
    let (_temp, engine) = setup();

    let response = dispatch(&engine, &request("drop_catalog", Value::Null));
    assert!(!response.ok);
    let error = response.error.unwrap();
    assert_eq!(error.kind, kinds::VALIDATION_ERROR);
    assert!(error.message.contains("drop_catalog"));
}

#[test]
fn test_provider_failure_maps_to_provider_error() {
    let temp = TempDir::new().unwrap();
    let db = temp.path().join("catalog.db");
    let csv =
        format!("{HEADER}1,Acme,Cooking Book,,,Books,,2.00,,https://example.com/1,\n");
    IngestionPipeline::new(Arc::new(MockProvider), 100)
        .run(csv.as_bytes(), &db)
        .unwrap();

    // open the populated catalog with a provider that always fails
    let engine = Engine::open(&db, Arc::new(FailingProvider::new(0))).unwrap();

    let response = dispatch(
        &engine,
        &request("search_products", json!({"query": "book"})),
    );
    assert!(!response.ok);
    assert_eq!(response.error.unwrap().kind, kinds::PROVIDER_ERROR);

    // the relational operations keep working without the provider
    let response = dispatch(&engine, &request("get_categories", Value::Null));
    assert!(response.ok);
}

#[test]
fn test_handle_line_roundtrip() {
    let (_temp, engine) = setup();

    let response = handle_line(
        &engine,
        r#"{"tool": "get_categories"}"#,
    );
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["ok"], true);
    assert!(parsed["data"].is_array());
}

#[test]
fn test_handle_line_malformed_json() {
    let (_temp, engine) = setup();

    let response = handle_line(&engine, "{not json");
    let parsed: Value = serde_json::from_str(&response).unwrap();
    assert_eq!(parsed["ok"], false);
    assert_eq!(parsed["error"]["kind"], kinds::VALIDATION_ERROR);
}
