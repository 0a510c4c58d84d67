//! HTTP route handlers.

pub mod propagate;
pub mod usage;

use std::sync::Arc;

use axum::extract::OriginalUri;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use sfdaas_core::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "JSESSIONID";

/// Build the main Axum router with all routes under the context path.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(propagate::routes())
        .merge(usage::routes());

    let context = state.config.context_path.clone();
    let router = if context.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(&context, api)
    };

    router
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(OriginalUri(uri): OriginalUri) -> Response {
    let body = serde_json::json!({
        "status": "error",
        "message": format!("Endpoint not found: {}", uri.path()),
        "code": StatusCode::NOT_FOUND.as_u16(),
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Session id from the `JSESSIONID` cookie, if the client sent one.
pub fn session_from_cookies(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, id)| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

pub fn session_cookie(session_id: &str) -> String {
    format!("{}={}; Path=/; HttpOnly", SESSION_COOKIE, session_id)
}

/// Structured error body with the matching HTTP status.
pub fn error_response(err: &Error) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = serde_json::json!({
        "status": "error",
        "message": err.to_string(),
        "code": status.as_u16(),
        "kind": err.code(),
    });
    if let Error::MissingParameter(missing) = err {
        body["missingParameters"] = serde_json::json!(missing);
    }
    (status, Json(body))
}
