//! Frontend trace proxy.
//!
//! Browsers cannot reach the OpenTelemetry collector directly, so OTLP/HTTP
//! export requests are relayed to the configured collector's `/v1/traces`
//! with content headers preserved. Without a configured collector the
//! endpoint answers 503.

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::state::AppState;

const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

fn proxy_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .timeout(COLLECTOR_TIMEOUT)
            .build()
            .unwrap_or_default()
    })
}

/// `POST /otel/v1/traces` — relay an OTLP/HTTP trace export to the
/// collector. The router caps the request body.
pub async fn proxy_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(base) = &state.otel_collector else {
        return (StatusCode::SERVICE_UNAVAILABLE, "otel collector endpoint is not configured")
            .into_response();
    };
    let target = format!("{base}/v1/traces");

    let mut request = proxy_client().post(&target).body(body);
    for name in ["content-type", "content-encoding"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            request = request.header(name, value);
        }
    }

    match request.send().await {
        Ok(upstream) => {
            let status = StatusCode::from_u16(upstream.status().as_u16())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            let body = upstream.bytes().await.unwrap_or_default();
            (status, body).into_response()
        }
        Err(e) => {
            debug!(error = %e, target = %target, "collector relay failed");
            (StatusCode::BAD_GATEWAY, "failed to reach collector").into_response()
        }
    }
}

/// Normalize a collector endpoint (`host:port` or full URL) into a base
/// URL without a trailing slash. Empty input means tracing is disabled.
#[must_use]
pub fn normalize_collector_endpoint(endpoint: Option<&str>) -> Option<String> {
    let endpoint = endpoint?.trim();
    if endpoint.is_empty() {
        return None;
    }
    let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", endpoint.trim_end_matches('/'))
    };
    Some(base)
}
