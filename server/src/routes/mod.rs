//! Router assembly and the security middleware.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the WebSocket endpoint, the OTLP trace proxy, the API routes and
//! static UI under one Axum router. Every non-WS route passes through the
//! security middleware: CORS reflection, cookie issuance, and CSRF + session
//! enforcement on `/api/*` (the WS handshake performs its own checks so the
//! cookie-issuing pass never touches the upgrade response).

pub mod flights;
pub mod otel;
pub mod ws;

use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tracing::{debug, warn};

use crate::services::auth;
use crate::state::AppState;

const AUTH_COOKIE: &str = "auth";
const CSRF_COOKIE: &str = "csrf";
const CSRF_HEADER: &str = "x-csrf-token";
/// Per-handler budget for regular HTTP routes (the WS endpoint is exempt).
const HANDLER_TIMEOUT: Duration = Duration::from_secs(15);
/// Body cap for proxied OTLP trace exports.
const MAX_TRACE_BODY: usize = 5 << 20;
/// Static UI directory served at `/`.
const UI_DIR: &str = "./ui";

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/flights", get(flights::all_flights))
        .route("/api/flight", get(flights::flight_by_callsign))
        .route("/api/flights/bbox", get(flights::flights_in_bbox))
        .route("/api/track", get(flights::track_by_callsign))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .fallback_service(ServeDir::new(UI_DIR).append_index_html_on_directories(true))
        .layer(TimeoutLayer::new(HANDLER_TIMEOUT))
        .layer(middleware::from_fn_with_state(state.clone(), security_middleware));

    Router::new()
        .route("/ws/flights", get(ws::handle_ws))
        .route(
            "/otel/v1/traces",
            post(otel::proxy_traces).layer(DefaultBodyLimit::max(MAX_TRACE_BODY)),
        )
        .merge(api)
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({"ok": true}))
}

async fn metrics_handler() -> Response {
    match crate::metrics::render_metrics() {
        Some(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            text,
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

// =============================================================================
// SECURITY MIDDLEWARE
// =============================================================================

/// CORS + cookies + enforcement, in one pass like the reverse-proxy-facing
/// edge it models:
/// - reflect the Origin with credentials allowed; answer preflights;
/// - issue the `auth` session cookie (or refresh one nearing expiry) and
///   the `csrf` double-submit cookie when missing;
/// - on `/api/*`, require the CSRF header to match the CSRF cookie (403)
///   and a valid session cookie (401). `/metrics` and `/healthz` stay open.
pub(crate) async fn security_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request.headers().get(header::ORIGIN).cloned();

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        decorate(&mut response, origin.as_ref(), &[]);
        return response;
    }

    let secure = auth::is_secure_request(request.headers());
    let jar = CookieJar::from_headers(request.headers());

    let mut issued: Vec<Cookie<'static>> = Vec::new();
    let claims = jar
        .get(AUTH_COOKIE)
        .map(Cookie::value)
        .and_then(|token| state.auth.validate(token));
    let session_stale =
        claims.as_ref().is_none_or(|c| auth::needs_refresh(c, auth::unix_now()));
    if session_stale {
        match state.auth.sign_session() {
            Ok(token) => issued.push(session_cookie(AUTH_COOKIE, token, secure, true)),
            Err(e) => warn!(error = %e, "session token signing failed"),
        }
    }
    if jar.get(CSRF_COOKIE).is_none() {
        issued.push(session_cookie(CSRF_COOKIE, auth::csrf_token(), secure, false));
    }

    let path = request.uri().path();
    if path.starts_with("/api/") && path != "/metrics" {
        let header_token = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let cookie_token = jar.get(CSRF_COOKIE).map(Cookie::value).unwrap_or_default();
        if header_token.is_empty() || cookie_token.is_empty() || header_token != cookie_token {
            debug!(path = %path, "csrf denied");
            let mut response = (StatusCode::FORBIDDEN, "forbidden").into_response();
            decorate(&mut response, origin.as_ref(), &issued);
            return response;
        }
        if claims.is_none() {
            debug!(path = %path, "session denied");
            let mut response = (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
            decorate(&mut response, origin.as_ref(), &issued);
            return response;
        }
    }

    let mut response = next.run(request).await;
    decorate(&mut response, origin.as_ref(), &issued);
    response
}

fn session_cookie(name: &'static str, value: String, secure: bool, http_only: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(http_only)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::days(30))
        .build()
}

/// Attach CORS reflection, baseline security headers, and issued cookies.
fn decorate(response: &mut Response, origin: Option<&HeaderValue>, issued: &[Cookie<'static>]) {
    let headers = response.headers_mut();
    if let Some(origin) = origin {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static("GET, OPTIONS"),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("Content-Type, X-CSRF-Token, Authorization"),
        );
    }

    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(header::REFERRER_POLICY, HeaderValue::from_static("no-referrer"));
    // Content-Security-Policy is omitted: a strict policy breaks map tiles.
    headers.insert(
        header::HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("geolocation=(self)"),
    );

    for cookie in issued {
        if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}

#[cfg(test)]
#[path = "middleware_test.rs"]
mod tests;
