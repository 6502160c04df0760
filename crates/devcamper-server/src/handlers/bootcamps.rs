use super::{into_fields, run_list};
use crate::error::ApiError;
use crate::geocoder::lookup;
use crate::radius::RadiusResolver;
use crate::response::Envelope;
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::Json;
use devcamper_core::{
    translate_query_string, Document, Fields, Filter, StoreError, BOOTCAMPS, COURSES,
};
use serde_json::Value as JsonValue;
use tracing::info;

const ADDRESS: &str = "address";
const LOCATION: &str = "location";

pub async fn list(
    State(app): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Envelope>, ApiError> {
    let query = translate_query_string(raw.as_deref())?;
    let page = run_list(&app, BOOTCAMPS, &query).await?;
    Ok(Json(Envelope::from_page(page)))
}

pub async fn get(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    let doc = find(&app, &id).await?;
    Ok(Json(Envelope::document(doc)))
}

/// Bootcamps with an `address` but no `location` get their location from
/// the geocoder.
async fn locate(app: &AppState, fields: &mut Fields) -> Result<(), ApiError> {
    if fields.contains_key(LOCATION) {
        return Ok(());
    }
    let Some(JsonValue::String(address)) = fields.get(ADDRESS) else {
        return Ok(());
    };
    let found = lookup(app.geocoder.as_ref(), address, app.geocode_timeout).await?;
    let first = found
        .first()
        .ok_or_else(|| ApiError::BadRequest(format!("could not geocode address '{address}'")))?;
    let location = serde_json::to_value(first.to_location())
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    fields.insert(LOCATION.into(), location);
    Ok(())
}

pub async fn create(
    State(app): State<AppState>,
    body: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope>), ApiError> {
    let Json(body) = body?;
    let mut fields = into_fields(body)?;
    locate(&app, &mut fields).await?;
    let doc = app.store.create(BOOTCAMPS, fields).await?;
    info!(id = doc.id(), "bootcamp created");
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
        .find_by_id_and_update(BOOTCAMPS, &id, patch)
        .await
        .map_err(|e| not_found_as(e, &id))?;
    Ok(Json(Envelope::document(doc)))
}

/// Deletes the bootcamp and every course that references it.
pub async fn delete(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope>, ApiError> {
    app.store
        .find_by_id_and_delete(BOOTCAMPS, &id)
        .await
        .map_err(|e| not_found_as(e, &id))?;
    let courses = app
        .store
        .delete_many(COURSES, &Filter::eq("bootcamp", JsonValue::String(id.clone())))
        .await?;
    info!(id = %id, courses, "bootcamp deleted");
    Ok(Json(Envelope::empty()))
}

pub async fn within_radius(
    State(app): State<AppState>,
    Path((zipcode, distance)): Path<(String, String)>,
) -> Result<Json<Envelope>, ApiError> {
    let docs = RadiusResolver::new(app.geocoder.as_ref(), app.geocode_timeout)
        .search(app.store.as_ref(), &zipcode, &distance)
        .await?;
    Ok(Json(Envelope::items(
        docs.into_iter().map(Document::into_json).collect(),
    )))
}

pub(crate) async fn find(app: &AppState, id: &str) -> Result<Document, ApiError> {
    app.store
        .find_by_id(BOOTCAMPS, id)
        .await
        .map_err(|e| not_found_as(e, id))
}

fn not_found_as(e: StoreError, id: &str) -> ApiError {
    match e {
        StoreError::NotFound => ApiError::not_found("Bootcamp", id),
        other => other.into(),
    }
}
