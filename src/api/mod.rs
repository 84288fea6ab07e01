//! HTTP API server

use std::any::Any;

use axum::{
    handler::Handler,
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue,
    },
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod requests;
pub mod state;

pub use error::{ApiError, ErrorKind};
pub use state::{AppState, ADMIN_SECRET_HEADER};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, x-admin-secret";

/// Prefix the endpoints are also served under, for front-ends that still
/// call the serverless function paths.
pub const LEGACY_PREFIX: &str = "/.netlify/functions";

/// Build the API router using the provided application state
pub fn create_router(state: AppState) -> Router {
    let functions = Router::new()
        .route("/adjust", function(handlers::adjust))
        .route("/pour", function(handlers::pour))
        .route("/tap-new", function(handlers::tap_new));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(functions.clone())
        .nest(LEGACY_PREFIX, functions)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static(ALLOW_ORIGIN),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        ))
}

/// POST handler with a pre-flight answer and a JSON 405 for every other verb
fn function<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    post(handler)
        .options(handlers::preflight)
        .fallback(handlers::method_not_allowed)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Internal server error".to_string()
    };

    tracing::error!(panic = %message, "Handler panicked");
    ApiError::Internal(message).into_response()
}
