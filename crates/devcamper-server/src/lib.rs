use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use devcamper_storage::DocumentStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod geocoder;
pub mod handlers;
pub mod metrics;
pub mod radius;
pub mod response;

pub use config::Config;
pub use error::ApiError;
pub use geocoder::{GeocodeError, GeocodeResult, Geocoder, MapQuestGeocoder, StaticGeocoder};
pub use radius::RadiusResolver;
pub use response::Envelope;

use handlers::{bootcamps, courses};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub geocode_timeout: Duration,
}

pub fn router(state: AppState) -> Router {
    metrics::init();
    let api = Router::new()
        .route("/bootcamps", get(bootcamps::list).post(bootcamps::create))
        .route(
            "/bootcamps/radius/:zipcode/:distance",
            get(bootcamps::within_radius),
        )
        .route(
            "/bootcamps/:id",
            get(bootcamps::get)
                .put(bootcamps::update)
                .delete(bootcamps::delete),
        )
        .route(
            "/bootcamps/:id/courses",
            get(courses::list_for_bootcamp).post(courses::create),
        )
        .route("/courses", get(courses::list))
        .route(
            "/courses/:id",
            get(courses::get).put(courses::update).delete(courses::delete),
        );

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .nest("/api/v1", api)
        .route_layer(middleware::from_fn(metrics::track))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_text() -> impl IntoResponse {
    (StatusCode::OK, metrics::render())
}
