//! PostgREST backend tests against a fake PostgREST server
//!
//! The fake runs on an ephemeral local port and records every request it
//! receives so tests can check paths, filters, headers and payloads.

use axum::{
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use taproom::api::{create_router, AppState};
use taproom::store::postgrest::PostgrestStore;
use taproom::store::TapStore;
use taproom::types::{NewTap, PourParams, TapId};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceExt;

const SERVICE_KEY: &str = "service-role-key";

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: Option<String>,
    apikey: Option<String>,
    authorization: Option<String>,
    prefer: Option<String>,
    body: Value,
}

#[derive(Clone, Default)]
struct Fake {
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl Fake {
    async fn record(
        &self,
        method: Method,
        path: String,
        query: Option<String>,
        headers: &HeaderMap,
        body: &str,
    ) {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.requests.lock().await.push(Recorded {
            method,
            path,
            query,
            apikey: header("apikey"),
            authorization: header("authorization"),
            prefer: header("prefer"),
            body: serde_json::from_str(body).unwrap_or(Value::Null),
        });
    }

    async fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().await.clone()
    }
}

async fn table(
    State(fake): State<Fake>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    fake.record(method.clone(), "/rest/v1/taps".into(), query.clone(), &headers, &body)
        .await;
    let query = query.unwrap_or_default();

    match method {
        Method::GET if query.contains("id=eq.t1") => {
            Json(json!([{ "pours_remaining": 5 }])).into_response()
        }
        Method::GET if query.contains("id=eq.t-null") => {
            Json(json!([{ "pours_remaining": null }])).into_response()
        }
        Method::GET if query.contains("id=eq.t-readonly") || query.contains("id=eq.t-silent") => {
            Json(json!([{ "pours_remaining": 5 }])).into_response()
        }
        Method::GET if query.contains("id=eq.t-denied") => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid API key", "hint": "Double check your key" })),
        )
            .into_response(),
        Method::GET => Json(json!([])).into_response(),
        Method::PATCH if query.contains("id=eq.t-readonly") => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "code": "42501",
                "message": "permission denied for table taps",
                "details": null,
                "hint": null
            })),
        )
            .into_response(),
        Method::PATCH if query.contains("id=eq.t-silent") => {
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Method::PATCH => StatusCode::NO_CONTENT.into_response(),
        Method::POST => {
            let mut rows: Vec<Value> = serde_json::from_str(&body).unwrap_or_default();
            match rows.first().and_then(|row| row["name"].as_str()) {
                Some("Duplicate") => {
                    return (
                        StatusCode::CONFLICT,
                        Json(json!({
                            "code": "23505",
                            "message": "duplicate key value violates unique constraint",
                            "details": "Key (name)=(Duplicate) already exists.",
                            "hint": null
                        })),
                    )
                        .into_response()
                }
                Some("Quiet") => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
                _ => {}
            }
            for row in rows.iter_mut() {
                row["id"] = json!("8c6f2a52-2d1d-4a43-9a41-0d8b5c1c8f11");
            }
            (StatusCode::CREATED, Json(Value::Array(rows))).into_response()
        }
        _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

async fn rpc(
    State(fake): State<Fake>,
    Path(procedure): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Response {
    fake.record(Method::POST, format!("/rest/v1/rpc/{procedure}"), None, &headers, &body)
        .await;
    let args: Value = serde_json::from_str(&body).unwrap_or(Value::Null);

    match procedure.as_str() {
        "log_pour_and_decrement" if args["p_tap_id"] == "t1" => {
            Json(json!({ "pour_id": 77, "pours_remaining": 41 })).into_response()
        }
        "log_pour_and_decrement" if args["p_tap_id"] == "void" => {
            StatusCode::NO_CONTENT.into_response()
        }
        "log_pour_and_decrement" => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "code": "P0001",
                "message": "tap not found",
                "details": null,
                "hint": null
            })),
        )
            .into_response(),
        "adjust_pours_remaining" if args["p_tap_id"] == "t1" => Json(json!(7)).into_response(),
        "adjust_pours_remaining" => Json(Value::Null).into_response(),
        _ => (StatusCode::NOT_FOUND, "").into_response(),
    }
}

async fn spawn_fake() -> (Fake, String) {
    let fake = Fake::default();
    let app = Router::new()
        .route("/rest/v1/taps", any(table))
        .route("/rest/v1/rpc/:procedure", post(rpc))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (fake, format!("http://{addr}"))
}

fn app(url: &str) -> Router {
    let store: Arc<dyn TapStore> = Arc::new(store(url));
    create_router(AppState::new(
        Some(SecretString::new("secret".to_string())),
        Some(store),
    ))
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, HeaderMap, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("x-admin-secret", "secret")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

fn assert_cors(headers: &HeaderMap) {
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(headers["access-control-allow-methods"], "POST, OPTIONS");
    assert_eq!(
        headers["access-control-allow-headers"],
        "Content-Type, x-admin-secret"
    );
}

fn store(url: &str) -> PostgrestStore {
    PostgrestStore::new(
        url,
        SecretString::new(SERVICE_KEY.to_string()),
        "taps",
        Some(Duration::from_secs(5)),
    )
    .unwrap()
}

#[tokio::test]
async fn fetch_reads_counter_with_id_filter() {
    let (fake, url) = spawn_fake().await;
    let store = store(&url);

    assert_eq!(store.fetch_pours_remaining(&"t1".into()).await.unwrap(), Some(5));
    assert_eq!(store.fetch_pours_remaining(&"t-null".into()).await.unwrap(), Some(0));
    assert_eq!(store.fetch_pours_remaining(&"nope".into()).await.unwrap(), None);

    let requests = fake.requests().await;
    assert_eq!(requests.len(), 3);
    let first = &requests[0];
    assert_eq!(first.method, Method::GET);
    assert_eq!(first.query.as_deref(), Some("id=eq.t1&select=pours_remaining"));
    assert_eq!(first.apikey.as_deref(), Some(SERVICE_KEY));
    assert_eq!(
        first.authorization.as_deref(),
        Some("Bearer service-role-key")
    );
}

#[tokio::test]
async fn store_error_message_is_passed_through() {
    let (_fake, url) = spawn_fake().await;
    let store = store(&url);

    let err = store
        .fetch_pours_remaining(&"t-denied".into())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid API key");
}

#[tokio::test]
async fn update_patches_counter_and_timestamp() {
    let (fake, url) = spawn_fake().await;
    let store = store(&url);
    let now = Utc::now();

    store
        .update_pours_remaining(&TapId::Int(12), 3, now)
        .await
        .unwrap();

    let requests = fake.requests().await;
    let patch = &requests[0];
    assert_eq!(patch.method, Method::PATCH);
    assert_eq!(patch.query.as_deref(), Some("id=eq.12"));
    assert_eq!(patch.prefer.as_deref(), Some("return=minimal"));
    assert_eq!(patch.body["pours_remaining"], 3);
    let updated_at: chrono::DateTime<Utc> =
        serde_json::from_value(patch.body["updated_at"].clone()).unwrap();
    assert_eq!(updated_at, now);
}

#[tokio::test]
async fn insert_returns_representation() {
    let (fake, url) = spawn_fake().await;
    let store = store(&url);

    let rows = store
        .insert_tap(&NewTap {
            name: "Saison".to_string(),
            brewery: "Farmhouse".to_string(),
            style: None,
            abv: Some(6.5),
            keg_size_oz: None,
            pours_remaining: Some(80),
            cost_per_keg: None,
            is_on_tap: true,
            tapped_at: Utc::now(),
        })
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "8c6f2a52-2d1d-4a43-9a41-0d8b5c1c8f11");
    assert_eq!(rows[0]["is_on_tap"], true);

    let requests = fake.requests().await;
    let insert = &requests[0];
    assert_eq!(insert.method, Method::POST);
    assert_eq!(insert.prefer.as_deref(), Some("return=representation"));
    let sent = insert.body.as_array().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["name"], "Saison");
    assert!(sent[0].get("style").is_none());
}

#[tokio::test]
async fn log_pour_calls_procedure() {
    let (fake, url) = spawn_fake().await;
    let store = store(&url);

    let pour = PourParams {
        tap_id: "t1".into(),
        size_oz: 12.0,
        price: 0.0,
        source: "manual".to_string(),
        note: None,
    };
    let result = store.log_pour(&pour).await.unwrap();
    assert_eq!(result, json!({ "pour_id": 77, "pours_remaining": 41 }));

    let void = PourParams {
        tap_id: "void".into(),
        ..pour.clone()
    };
    assert_eq!(store.log_pour(&void).await.unwrap(), Value::Null);

    let missing = PourParams {
        tap_id: "t9".into(),
        ..pour
    };
    let err = store.log_pour(&missing).await.unwrap_err();
    assert_eq!(err.to_string(), "tap not found");
    match err {
        taproom::Error::Store { code, .. } => assert_eq!(code.as_deref(), Some("P0001")),
        other => panic!("unexpected error: {other:?}"),
    }

    let requests = fake.requests().await;
    assert_eq!(requests[0].path, "/rest/v1/rpc/log_pour_and_decrement");
}

#[tokio::test]
async fn atomic_adjust_calls_procedure() {
    let (fake, url) = spawn_fake().await;
    let store = store(&url);

    assert_eq!(
        store.adjust_pours_remaining(&"t1".into(), -3).await.unwrap(),
        Some(7)
    );
    assert_eq!(
        store.adjust_pours_remaining(&"zz".into(), -3).await.unwrap(),
        None
    );

    let requests = fake.requests().await;
    assert_eq!(requests[0].path, "/rest/v1/rpc/adjust_pours_remaining");
    assert_eq!(requests[0].body, json!({ "p_tap_id": "t1", "p_change": -3 }));
}

#[tokio::test]
async fn unreachable_store_is_a_store_error() {
    // Nothing listens on this port once the listener is dropped
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = store(&url)
        .fetch_pours_remaining(&"t1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, taproom::Error::Http(_)));
}

#[tokio::test]
async fn pour_endpoint_sends_defaults_on_the_wire() {
    let (fake, url) = spawn_fake().await;
    let store: Arc<dyn TapStore> = Arc::new(store(&url));
    let app = create_router(AppState::new(
        Some(SecretString::new("secret".to_string())),
        Some(store),
    ));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pour")
                .header("x-admin-secret", "secret")
                .body(Body::from(json!({ "tapId": "t1", "sizeOz": 12 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["result"]["pours_remaining"], 41);

    let requests = fake.requests().await;
    assert_eq!(requests.len(), 1);
    let args = requests[0].body.as_object().unwrap();
    assert_eq!(args["p_tap_id"], "t1");
    assert_eq!(args["p_size_oz"].as_f64(), Some(12.0));
    assert_eq!(args["p_price"].as_f64(), Some(0.0));
    assert_eq!(args["p_source"], "manual");
    assert!(args.contains_key("p_note"));
    assert!(args["p_note"].is_null());
}

#[tokio::test]
async fn pour_endpoint_relays_procedure_error() {
    let (_fake, url) = spawn_fake().await;
    let store: Arc<dyn TapStore> = Arc::new(store(&url));
    let app = create_router(AppState::new(
        Some(SecretString::new("secret".to_string())),
        Some(store),
    ));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pour")
                .header("x-admin-secret", "secret")
                .body(Body::from(json!({ "tapId": "t9", "sizeOz": 12 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, json!({ "error": "tap not found", "kind": "store" }));
}

#[tokio::test]
async fn failed_writes_report_store_message_or_status() {
    let (_fake, url) = spawn_fake().await;
    let store = store(&url);

    let err = store
        .update_pours_remaining(&"t-readonly".into(), 3, Utc::now())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "permission denied for table taps");

    // An empty error body leaves the message blank and keeps the status
    let err = store
        .update_pours_remaining(&"t-silent".into(), 3, Utc::now())
        .await
        .unwrap_err();
    match err {
        taproom::Error::Store { message, code } => {
            assert!(message.is_empty());
            assert_eq!(code.as_deref(), Some("500"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn adjust_endpoint_relays_write_failure() {
    let (fake, url) = spawn_fake().await;

    let (status, headers, body) =
        post_json(app(&url), "/adjust", json!({ "id": "t-readonly", "change": -1 })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "permission denied for table taps", "kind": "store" })
    );
    assert_cors(&headers);

    // The read went through, the write was refused
    let requests = fake.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[1].method, Method::PATCH);
    assert_eq!(requests[1].body["pours_remaining"], 4);
}

#[tokio::test]
async fn adjust_endpoint_falls_back_when_store_is_silent() {
    let (_fake, url) = spawn_fake().await;

    let (status, headers, body) =
        post_json(app(&url), "/adjust", json!({ "id": "t-silent", "change": 2 })).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Adjust failed", "kind": "store" }));
    assert_cors(&headers);
}

#[tokio::test]
async fn tap_new_endpoint_relays_insert_failure() {
    let (_fake, url) = spawn_fake().await;

    let (status, headers, body) = post_json(
        app(&url),
        "/tap-new",
        json!({ "name": "Duplicate", "brewery": "Copycat" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({ "error": "duplicate key value violates unique constraint", "kind": "store" })
    );
    assert_cors(&headers);

    let (status, headers, body) = post_json(
        app(&url),
        "/.netlify/functions/tap-new",
        json!({ "name": "Quiet", "brewery": "Library Ales" }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "error": "Insert failed", "kind": "store" }));
    assert_cors(&headers);
}
