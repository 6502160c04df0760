use super::{bootcamps, into_fields, run_list};
use crate::error::ApiError;
use crate::response::Envelope;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use devcamper_core::{
    translate_query_string, Document, Filter, Projection, StoreError, BOOTCAMPS, COURSES,
};
use devcamper_storage::eval::project;
use serde_json::Value as JsonValue;
use tracing::info;

const BOOTCAMP: &str = "bootcamp";

/// Fields of the owning bootcamp embedded in course responses.
fn populated_fields() -> Projection {
    Projection::Fields(vec!["name".into(), "description".into()])
}

/// Replaces the `bootcamp` id with `{_id, name, description}`, or null if
/// the bootcamp no longer exists.
async fn populate(app: &AppState, doc: Document) -> Result<JsonValue, ApiError> {
    let mut out = doc.into_json();
    let id = match out.get(BOOTCAMP) {
        Some(JsonValue::String(id)) => id.clone(),
        _ => return Ok(out),
    };
    let embedded = match app.store.find_by_id(BOOTCAMPS, &id).await {
        Ok(b) => JsonValue::Object(project(&b.fields, &populated_fields())),
        Err(StoreError::NotFound) => JsonValue::Null,
        Err(e) => return Err(e.into()),
    };
    if let JsonValue::Object(fields) = &mut out {
        fields.insert(BOOTCAMP.into(), embedded);
    }
    Ok(out)
}

pub async fn list(
    State(app): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Envelope>, ApiError> {
    let query = translate_query_string(raw.as_deref())?;
    let page = run_list(&app, COURSES, &query).await?;
    let mut items = Vec::with_capacity(page.items.len());
    for doc in page.items {
        items.push(populate(&app, doc).await?);
    }
    Ok(Json(Envelope::page(items, page.pagination)))
}

pub async fn list_for_bootcamp(
    State(app): State<AppState>,
    Path(bootcamp_id): Path<String>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Envelope>, ApiError> {
    let mut query = translate_query_string(raw.as_deref())?;
    query.filter = query
        .filter
        .and(Filter::eq(BOOTCAMP, JsonValue::String(bootcamp_id)));
    let page = run_list(&app, COURSES, &query).await?;
    Ok(Json(Envelope::from_page(page)))
}

pub async fn get(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    let doc = app
        .store
        .find_by_id(COURSES, &id)
        .await
        .map_err(|e| not_found_as(e, &id))?;
    Ok(Json(Envelope::data(populate(&app, doc).await?)))
}

pub async fn create(
    State(app): State<AppState>,
    Path(bootcamp_id): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope>), ApiError> {
    let Json(body) = body?;
    let mut fields = into_fields(body)?;
    let bootcamp = bootcamps::find(&app, &bootcamp_id).await?;
    fields.insert(BOOTCAMP.into(), JsonValue::String(bootcamp.id().to_string()));
    let doc = app.store.create(COURSES, fields).await?;
    info!(id = doc.id(), bootcamp = %bootcamp_id, "course created");
    Ok((StatusCode::CREATED, Json(Envelope::document(doc))))
}

pub async fn update(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Json<Envelope>, ApiError> {
    let Json(body) = body?;
    let patch = into_fields(body)?;
    let doc = app
        .store
        .find_by_id_and_update(COURSES, &id, patch)
        .await
        .map_err(|e| not_found_as(e, &id))?;
    Ok(Json(Envelope::document(doc)))
}

pub async fn delete(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    app.store
        .find_by_id_and_delete(COURSES, &id)
        .await
        .map_err(|e| not_found_as(e, &id))?;
    info!(id = %id, "course deleted");
    Ok(Json(Envelope::empty()))
}

fn not_found_as(e: StoreError, id: &str) -> ApiError {
    match e {
        StoreError::NotFound => ApiError::not_found("Course", id),
        other => other.into(),
    }
}
