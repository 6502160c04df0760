use crate::error::ApiError;
use crate::metrics::QUERY_DURATION_SEC;
use crate::AppState;
use devcamper_core::{Fields, StructuredQuery};
use devcamper_storage::{execute, PageResult};
use serde_json::Value as JsonValue;
use tracing::debug;

pub mod bootcamps;
pub mod courses;

/// Request bodies must be JSON objects.
fn into_fields(body: JsonValue) -> Result<Fields, ApiError> {
    match body {
        JsonValue::Object(fields) => Ok(fields),
        other => Err(ApiError::BadRequest(format!(
            "request body must be a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(v: &JsonValue) -> &'static str {
    match v {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

async fn run_list(
    app: &AppState,
    collection: &str,
    query: &StructuredQuery,
) -> Result<PageResult, ApiError> {
    debug!(collection, filter = %query.filter.to_json(), page = query.page.page, limit = query.page.limit, "list");
    let timer = QUERY_DURATION_SEC
        .with_label_values(&[collection])
        .start_timer();
    let res = execute(app.store.as_ref(), collection, query).await;
    timer.observe_duration();
    Ok(res?)
}
