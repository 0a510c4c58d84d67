//! Router-level tests for response shapes and the session cookie.
//!
//! Requests go straight through the router with `oneshot`; no socket is bound.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use sfdaas_core::SfdConfig;
use sfdaas_server::routes::build_router;
use sfdaas_server::AppState;
use tower::ServiceExt;

const QUERY: &str = "t0=2010-05-28T12:00:00.000&tf=2010-05-29T12:00:00.000\
    &r0=%5B3198022.67,2901879.73,5142928.95%5D\
    &v0=%5B-6129.640631,4489.647187,1284.511245%5D";

fn app_with(config: SfdConfig) -> Router {
    build_router(Arc::new(AppState::new(config)))
}

fn app() -> Router {
    app_with(SfdConfig::default())
}

async fn send(
    app: Router,
    uri: &str,
    cookie: Option<&str>,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap();
    (status, set_cookie, json)
}

fn session_id(set_cookie: &str) -> &str {
    set_cookie
        .strip_prefix("JSESSIONID=")
        .and_then(|rest| rest.split(';').next())
        .unwrap()
}

#[tokio::test]
async fn test_usage_shape() {
    let (status, cookie, body) = send(app(), "/SFDaaS/orekit/propagate/usage", None).await;
    assert_eq!(status, StatusCode::OK);

    let cookie = cookie.unwrap();
    assert!(cookie.ends_with("; Path=/; HttpOnly"));
    let id = session_id(&cookie);
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

    assert_eq!(body["status"], "success");
    assert_eq!(body["endpoints"]["propagate"], "/SFDaaS/orekit/propagate");
    assert!(body["parameters"]["caching"]["cf"].is_string());
    assert!(body["examples"].is_array());
    assert_eq!(body["session"]["id"], id);
    assert_eq!(body["session"]["maxInactiveInterval"], 1800);
}

#[tokio::test]
async fn test_propagate_shape() {
    let uri = format!("/SFDaaS/orekit/propagate?{}", QUERY);
    let (status, cookie, body) = send(app(), &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.is_some());

    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["apriori"]["t0"], "2010-05-28T12:00:00.000");
    assert_eq!(body["data"]["aposteriori"]["tf"], "2010-05-29T12:00:00.000Z");
    assert!(body["data"]["aposteriori"]["rf"].as_str().unwrap().starts_with("[5631477."));

    let d = &body["diagnostics"];
    assert!(d["assumptions"]["1"].is_string());
    assert!(d["timing"]["totalTimeMs"].is_number());
    assert!(d["timing"]["propagationTimeMs"].is_number());
    assert_eq!(d["caching"]["enabled"], false);
    assert_eq!(d["propagator"]["steps"], 1440);
    assert_eq!(d["session"]["expiryIn"], "1800 seconds");
}

#[tokio::test]
async fn test_session_cookie_is_reused() {
    let app = app();
    let uri = format!("/SFDaaS/orekit/propagate/?cf=1&{}", QUERY);

    let (status, cookie, first) = send(app.clone(), &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.unwrap();
    let id = session_id(&cookie).to_string();
    assert_eq!(first["diagnostics"]["caching"]["hit"], false);

    let sent = format!("JSESSIONID={}", id);
    let (_, again, second) = send(app, &uri, Some(&sent)).await;
    assert_eq!(session_id(&again.unwrap()), id);
    assert_eq!(second["diagnostics"]["session"]["jsessionid"], id.as_str());
    assert_eq!(second["diagnostics"]["caching"]["hit"], true);
    assert_eq!(
        second["data"]["aposteriori"]["rf"],
        first["data"]["aposteriori"]["rf"]
    );
}

#[tokio::test]
async fn test_missing_parameters() {
    let (status, cookie, body) =
        send(app(), "/SFDaaS/orekit/propagate?t0=2010-05-28T12:00:00.000", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(cookie.is_some());
    assert_eq!(body["status"], "error");
    assert_eq!(body["code"], 400);
    assert_eq!(body["kind"], "missing_parameter");
    assert_eq!(body["missingParameters"], serde_json::json!(["r0", "v0", "tf"]));
}

#[tokio::test]
async fn test_malformed_vector() {
    let uri = "/SFDaaS/orekit/propagate?t0=2010-05-28T12:00:00.000\
        &tf=2010-05-29T12:00:00.000&r0=%5B1,2&v0=%5B1,2,3%5D";
    let (status, _, body) = send(app(), uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "parse_error");
}

#[tokio::test]
async fn test_span_limit_is_unprocessable() {
    let uri = "/SFDaaS/orekit/propagate?t0=2010-05-28T12:00:00.000\
        &tf=2040-05-29T12:00:00.000\
        &r0=%5B3198022.67,2901879.73,5142928.95%5D\
        &v0=%5B-6129.640631,4489.647187,1284.511245%5D";
    let (status, _, body) = send(app(), uri, None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "limit_exceeded");
}

#[tokio::test]
async fn test_oversized_session_ttl_is_bad_request() {
    let uri = format!("/SFDaaS/orekit/propagate?sf=1&st=10000000000000&{}", QUERY);
    let (status, cookie, body) = send(app(), &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(cookie.is_some());
    assert_eq!(body["kind"], "parse_error");
}

#[tokio::test]
async fn test_unknown_path() {
    let (status, _, body) = send(app(), "/SFDaaS/orekit/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Endpoint not found: /SFDaaS/orekit/nothing");
    assert_eq!(body["code"], 404);

    let (status, _, _) = send(app(), "/orekit/propagate/usage", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_root_context_path() {
    let config = SfdConfig {
        context_path: String::new(),
        ..SfdConfig::default()
    };
    let (status, _, body) = send(app_with(config), "/orekit/propagate/usage", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["usage"], "/orekit/propagate/usage");
}
