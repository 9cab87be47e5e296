//! Stateless tool surface
//!
//! Thin request/response adapter over the query engine for an external
//! orchestrating caller. It validates argument shapes, applies documented
//! defaults for omitted optional arguments, calls exactly one engine
//! operation, and serializes the result. No caching, no retries, no
//! per-caller state; every invocation is independent.
//!
//! Optional arguments that are omitted or mis-typed normalize to their
//! defaults (the caller is a machine that may drop or mangle them);
//! required arguments that are missing or structurally invalid come back
//! as a `validation_error`.

use crate::engine::{Engine, QueryError, SearchRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable error identifiers surfaced to callers
pub mod kinds {
    pub const PROVIDER_ERROR: &str = "provider_error";
    pub const STORE_ERROR: &str = "store_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// One tool invocation: a tool name plus a JSON arguments object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Caller-visible error with a stable kind identifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: String,
    pub message: String,
}

/// Tool invocation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl ToolResponse {
    /// Create a successful response with data
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(ToolError {
                kind: kind.to_string(),
                message: message.into(),
            }),
        }
    }

    fn from_query_error(error: QueryError) -> Self {
        let kind = match &error {
            QueryError::Provider(_) => kinds::PROVIDER_ERROR,
            QueryError::Store(_) | QueryError::VectorSearch(_) => kinds::STORE_ERROR,
            QueryError::InvalidQuery(_) => kinds::VALIDATION_ERROR,
        };
        Self::error(kind, error.to_string())
    }
}

/// Dispatch one tool request against the engine.
pub fn dispatch(engine: &Engine, request: &ToolRequest) -> ToolResponse {
    let args = &request.arguments;
    match request.tool.as_str() {
        "search_products" => {
            let query = match required_str(args, "query") {
                Ok(q) => q,
                Err(response) => return response,
            };
            let search = SearchRequest {
                query,
                limit: optional_i64(args, "num_results"),
                min_epc: optional_f64(args, "min_epc"),
                category: optional_str(args, "category"),
            };
            to_response(engine.search(&search))
        }
        "get_categories" => to_response(engine.categories()),
        "get_top_products" => to_response(engine.top_products(
            optional_str(args, "category").as_deref(),
            optional_i64(args, "limit"),
        )),
        "get_product_stats" => to_response(engine.stats()),
        other => ToolResponse::error(
            kinds::VALIDATION_ERROR,
            format!("unknown tool: {}", other),
        ),
    }
}

/// Handle one serialized request line; always returns a serialized
/// response. Used by the stdio serve loop.
pub fn handle_line(engine: &Engine, line: &str) -> String {
    let response = match serde_json::from_str::<ToolRequest>(line) {
        Ok(request) => dispatch(engine, &request),
        Err(e) => ToolResponse::error(
            kinds::VALIDATION_ERROR,
            format!("malformed request: {}", e),
        ),
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            r#"{{"ok":false,"error":{{"kind":"{}","message":"failed to serialize response: {}"}}}}"#,
            kinds::INTERNAL_ERROR,
            e
        )
    })
}

fn to_response<T: Serialize>(result: Result<T, QueryError>) -> ToolResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(data) => ToolResponse::success(data),
            Err(e) => ToolResponse::error(
                kinds::INTERNAL_ERROR,
                format!("failed to serialize result: {}", e),
            ),
        },
        Err(e) => ToolResponse::from_query_error(e),
    }
}

fn required_str(args: &Value, key: &str) -> Result<String, ToolResponse> {
    match args.get(key).and_then(Value::as_str) {
        Some(s) => Ok(s.to_string()),
        None => Err(ToolResponse::error(
            kinds::VALIDATION_ERROR,
            format!("missing required argument: {}", key),
        )),
    }
}

fn optional_str(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn optional_i64(args: &Value, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn optional_f64(args: &Value, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}
