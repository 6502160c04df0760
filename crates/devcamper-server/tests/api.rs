use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use devcamper_server::{router, AppState, GeocodeResult, StaticGeocoder};
use devcamper_storage::InMemoryStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn boston() -> GeocodeResult {
    GeocodeResult {
        latitude: 42.3389,
        longitude: -71.0707,
        formatted_address: Some("233 Bay State Rd, Boston, MA 02215, US".into()),
        street: Some("233 Bay State Rd".into()),
        city: Some("Boston".into()),
        state: Some("MA".into()),
        zipcode: Some("02215".into()),
        country: Some("US".into()),
    }
}

fn app() -> Router {
    let geocoder = StaticGeocoder::from_entries([
        ("02118", boston()),
        ("233 Bay State Road Boston MA 02215", boston()),
    ]);
    router(AppState {
        store: Arc::new(InMemoryStore::new()),
        geocoder: Arc::new(geocoder),
        geocode_timeout: Duration::from_secs(1),
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&v).unwrap())
        }
        None => Body::empty(),
    };
    let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, json)
}

async fn create_bootcamp(app: &Router, body: Value) -> String {
    let (status, res) = send(app, Method::POST, "/api/v1/bootcamps", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{res}");
    res["data"]["_id"].as_str().unwrap().to_string()
}

fn at(lat: f64, lng: f64) -> Value {
    json!({"type": "Point", "coordinates": [lng, lat]})
}

#[tokio::test]
async fn health_and_metrics() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("ok"));
    send(&app, Method::GET, "/api/v1/bootcamps", None).await;
    let (status, body) = send(&app, Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_str().unwrap().contains("devcamper_http_requests_total"));
}

#[tokio::test]
async fn create_then_fetch_returns_fields_plus_defaults() {
    let app = app();
    let id = create_bootcamp(
        &app,
        json!({"name": "Devworks Bootcamp", "careers": ["Web Development", "UI/UX"], "housing": true, "location": at(42.35, -71.06)}),
    )
    .await;
    let (status, res) = send(&app, Method::GET, &format!("/api/v1/bootcamps/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["success"], json!(true));
    assert_eq!(res["error"], Value::Null);
    let data = &res["data"];
    assert_eq!(data["name"], json!("Devworks Bootcamp"));
    assert_eq!(data["careers"], json!(["Web Development", "UI/UX"]));
    assert_eq!(data["_id"], json!(id));
    assert!(data["createdAt"].is_string());
}

#[tokio::test]
async fn address_is_geocoded_on_create() {
    let app = app();
    let (status, res) = send(
        &app,
        Method::POST,
        "/api/v1/bootcamps",
        Some(json!({"name": "ModernTech", "address": "233 Bay State Road Boston MA 02215"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let loc = &res["data"]["location"];
    assert_eq!(loc["type"], json!("Point"));
    assert_eq!(loc["coordinates"], json!([-71.0707, 42.3389]));
    assert_eq!(loc["city"], json!("Boston"));

    let (status, res) = send(
        &app,
        Method::POST,
        "/api/v1/bootcamps",
        Some(json!({"name": "Nowhere", "address": "1 Unknown St"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["success"], json!(false));
}

#[tokio::test]
async fn bad_bodies_are_client_errors() {
    let app = app();
    let (status, res) = send(&app, Method::POST, "/api/v1/bootcamps", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(res["data"], Value::Null);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/bootcamps")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_id_conflicts() {
    let app = app();
    create_bootcamp(&app, json!({"_id": "5d713995b721c3bb38c1f5d0", "name": "a"})).await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/bootcamps",
        Some(json!({"_id": "5d713995b721c3bb38c1f5d0", "name": "b"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_filters_sorts_and_paginates() {
    let app = app();
    for (name, cost, housing) in [
        ("A", 5000, true),
        ("B", 8000, false),
        ("C", 11000, true),
        ("D", 13000, true),
        ("E", 9000, true),
    ] {
        create_bootcamp(&app, json!({"name": name, "averageCost": cost, "housing": housing})).await;
    }

    let (status, res) = send(
        &app,
        Method::GET,
        "/api/v1/bootcamps?averageCost%5Blte%5D=10000&housing=true&select=name,averageCost&sort=-averageCost",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["count"], json!(2));
    assert_eq!(res["pagination"], json!({"total": 2}));
    assert_eq!(res["data"][0]["name"], json!("E"));
    assert_eq!(res["data"][1]["name"], json!("A"));
    assert!(res["data"][0].get("housing").is_none());
    assert!(res["data"][0]["_id"].is_string());

    let (_, res) = send(&app, Method::GET, "/api/v1/bootcamps?sort=name&limit=2&page=2", None).await;
    assert_eq!(res["count"], json!(2));
    assert_eq!(
        res["pagination"],
        json!({"total": 5, "next": {"page": 3, "limit": 2}, "prev": {"page": 1, "limit": 2}})
    );
    assert_eq!(res["data"][0]["name"], json!("C"));

    let (status, res) = send(&app, Method::GET, "/api/v1/bootcamps?page=abc&limit=xyz", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["count"], json!(5));

    let (_, res) = send(&app, Method::GET, "/api/v1/bootcamps?averageCost%5Bin%5D=5000&averageCost%5Bin%5D=13000&sort=name", None).await;
    assert_eq!(res["count"], json!(2));
    assert_eq!(res["data"][1]["name"], json!("D"));
}

#[tokio::test]
async fn malformed_filters_are_rejected() {
    let app = app();
    for uri in [
        "/api/v1/bootcamps?averageCost%5Blte=10",
        "/api/v1/bootcamps?averageCost%5Blte%5D=1&averageCost%5Bfoo%5D=2",
    ] {
        let (status, res) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(res["success"], json!(false));
        assert!(res["error"].as_str().unwrap().contains("malformed query"));
    }
}

#[tokio::test]
async fn missing_documents_are_not_found() {
    let app = app();
    for (method, uri) in [
        (Method::GET, "/api/v1/bootcamps/nope"),
        (Method::DELETE, "/api/v1/bootcamps/nope"),
        (Method::GET, "/api/v1/courses/nope"),
        (Method::DELETE, "/api/v1/courses/nope"),
    ] {
        let (status, res) = send(&app, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(res["success"], json!(false));
    }
    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/v1/bootcamps/nope",
        Some(json!({"name": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_merges_fields() {
    let app = app();
    let id = create_bootcamp(&app, json!({"name": "Devworks", "housing": false})).await;
    let (status, res) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/bootcamps/{id}"),
        Some(json!({"housing": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["housing"], json!(true));
    assert_eq!(res["data"]["name"], json!("Devworks"));
}

#[tokio::test]
async fn radius_search() {
    let app = app();
    create_bootcamp(&app, json!({"name": "Near", "location": at(42.3601, -71.0589)})).await;
    create_bootcamp(&app, json!({"name": "Far", "location": at(42.2626, -71.8023)})).await;

    let (status, res) = send(&app, Method::GET, "/api/v1/bootcamps/radius/02118/10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["count"], json!(1));
    assert_eq!(res["data"][0]["name"], json!("Near"));
    assert!(res.get("pagination").is_none());

    let (status, _) = send(&app, Method::GET, "/api/v1/bootcamps/radius/99999/10", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::GET, "/api/v1/bootcamps/radius/02118/-3", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn courses_nest_under_bootcamps_and_populate() {
    let app = app();
    let b1 = create_bootcamp(&app, json!({"name": "Devworks", "description": "Full stack", "website": "https://devworks.com"})).await;
    let b2 = create_bootcamp(&app, json!({"name": "ModernTech"})).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/bootcamps/missing/courses",
        Some(json!({"title": "Orphan"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut course_ids = Vec::new();
    for (bootcamp, title) in [(&b1, "Front End"), (&b1, "Back End"), (&b2, "Data Science")] {
        let (status, res) = send(
            &app,
            Method::POST,
            &format!("/api/v1/bootcamps/{bootcamp}/courses"),
            Some(json!({"title": title, "tuition": 8000})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(res["data"]["bootcamp"], json!(bootcamp));
        course_ids.push(res["data"]["_id"].as_str().unwrap().to_string());
    }

    let (_, res) = send(&app, Method::GET, &format!("/api/v1/bootcamps/{b1}/courses"), None).await;
    assert_eq!(res["count"], json!(2));
    assert_eq!(res["pagination"]["total"], json!(2));

    let (_, res) = send(&app, Method::GET, "/api/v1/courses?sort=title", None).await;
    assert_eq!(res["count"], json!(3));
    assert_eq!(res["data"][0]["title"], json!("Back End"));
    assert_eq!(
        res["data"][0]["bootcamp"],
        json!({"_id": b1, "name": "Devworks", "description": "Full stack"})
    );

    let (_, res) = send(&app, Method::GET, &format!("/api/v1/courses/{}", course_ids[2]), None).await;
    assert_eq!(res["data"]["bootcamp"]["name"], json!("ModernTech"));

    let (status, res) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/courses/{}", course_ids[2]),
        Some(json!({"tuition": 9000})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"]["tuition"], json!(9000));
}

#[tokio::test]
async fn deleting_a_bootcamp_cascades_to_courses() {
    let app = app();
    let b1 = create_bootcamp(&app, json!({"name": "Devworks"})).await;
    let b2 = create_bootcamp(&app, json!({"name": "ModernTech"})).await;
    for bootcamp in [&b1, &b1, &b2] {
        send(
            &app,
            Method::POST,
            &format!("/api/v1/bootcamps/{bootcamp}/courses"),
            Some(json!({"title": "x"})),
        )
        .await;
    }
    let (status, res) = send(&app, Method::DELETE, &format!("/api/v1/bootcamps/{b1}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(res["data"], json!({}));

    let (_, res) = send(&app, Method::GET, "/api/v1/courses", None).await;
    assert_eq!(res["count"], json!(1));
    assert_eq!(res["data"][0]["bootcamp"]["_id"], json!(b2));
}
