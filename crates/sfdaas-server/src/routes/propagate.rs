//! Propagation route.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sfdaas_runtime::PropagationRequest;
use tracing::{debug, error};

use super::{error_response, session_cookie, session_from_cookies};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orekit/propagate", get(propagate))
        .route("/orekit/propagate/", get(propagate))
}

/// GET /orekit/propagate: propagate a state, optionally through the cache.
async fn propagate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let request = PropagationRequest::from_params(session_from_cookies(&headers), &params);
    let handled = state.coordinator.handle(request).await;
    let cookie = [(header::SET_COOKIE, session_cookie(&handled.session_id))];

    match handled.result {
        Ok(report) => (StatusCode::OK, cookie, Json(report)).into_response(),
        Err(e) => {
            if e.status_code() >= 500 {
                error!("Propagation failed: {}", e);
            } else {
                debug!("Rejected propagation request: {}", e);
            }
            let (status, body) = error_response(&e);
            (status, cookie, body).into_response()
        }
    }
}
