//! Usage documentation route.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sfdaas_runtime::SessionSummary;

use super::{session_cookie, session_from_cookies};
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/orekit/propagate/usage", get(get_usage))
}

/// GET /orekit/propagate/usage: service documentation.
async fn get_usage(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session = state
        .coordinator
        .open_session(session_from_cookies(&headers).as_deref());

    let context = &state.config.context_path;
    let base = format!("http://localhost:{}{}/orekit/propagate", state.config.port, context);
    let propagation_query = "t0=2010-05-28T12:00:00.000&\
        tf=2010-05-29T12:00:00.000&\
        r0=[3198022.67,2901879.73,5142928.95]&\
        v0=[-6129.640631,4489.647187,1284.511245]";

    let body = serde_json::json!({
        "status": "success",
        "service": "Space Flight Dynamics as a Service (SFDaaS)",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "usage": format!("{}/orekit/propagate/usage", context),
            "propagate": format!("{}/orekit/propagate", context),
        },
        "parameters": {
            "caching": {
                "cf": "Caching flag (0=disabled, 1=enabled). Default: 0",
                "ca": "Caching server address(es), e.g., 127.0.0.1:11211",
                "ct": format!(
                    "Cache TTL in seconds, at most 2592000. Default: {}",
                    state.config.cache.default_ttl_seconds
                ),
                "ck": "Custom cache key (optional)",
                "cr": "Cache required (1=fail when the cache server is unreachable). Default: 0",
            },
            "session": {
                "sf": "Session flag (1=use session values)",
                "st": format!(
                    "Session timeout in seconds, at most 31536000. Default: {}",
                    state.config.session.default_ttl_seconds
                ),
            },
            "propagation": {
                "t0": "Initial epoch (format: YYYY-MM-DDTHH:MM:SS.SSS, UTC)",
                "tf": "Final epoch (same format as t0)",
                "r0": "Initial position vector [x,y,z] in meters (J2000 frame)",
                "v0": "Initial velocity vector [vx,vy,vz] in m/s",
            },
        },
        "examples": [
            {
                "description": "Basic propagation",
                "url": format!("{}?{}", base, propagation_query),
            },
            {
                "description": "Propagation with caching",
                "url": format!("{}?cf=1&ca=127.0.0.1:11211&{}", base, propagation_query),
            },
        ],
        "session": SessionSummary::from(&session),
    });

    (
        [(header::SET_COOKIE, session_cookie(&session.id))],
        Json(body),
    )
        .into_response()
}
