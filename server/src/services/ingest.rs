//! Upstream states ingester.
//!
//! DESIGN
//! ======
//! One long-running task polls the OpenSky states endpoint, normalises the
//! batch into the store, and publishes a tick on the update bus. Failure
//! handling keeps the map populated: rate-limit responses back off for
//! `max(Retry-After, poll interval)` and transient errors retry on the next
//! interval, and in both cases the current view's TTL is extended so
//! markers do not vanish while no fresh data arrives.
//!
//! The last successful batch is cached for one poll interval so overlapping
//! callers inside a tick do not re-poll upstream.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::services::store::Store;
use crate::services::updates::UpdateBus;

const STATES_URL: &str = "https://opensky-network.org/api/states/all";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on an upstream response body.
const MAX_BODY_BYTES: usize = 5 << 20;
/// Backoff applied when a throttling response carries no usable Retry-After.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);
/// Extra slack added to TTL extensions so entries outlive the wait.
const TOUCH_SLACK: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(10);

// =============================================================================
// TYPES
// =============================================================================

/// Decoded subset of the OpenSky `/api/states/all` response.
#[derive(Debug, Clone, Default)]
pub struct FlightData {
    /// Raw positional state rows; see `Store::upsert_states` for the
    /// field layout.
    pub states: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct StatesResponse {
    // Upstream sends `"states": null` when it has nothing.
    states: Option<Vec<Vec<serde_json::Value>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("rate limited: status={status} retry_after={retry_after:?}")]
    RateLimited { status: u16, retry_after: Duration },
    #[error("upstream status {0}")]
    UpstreamStatus(u16),
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream body exceeded {MAX_BODY_BYTES} bytes")]
    BodyTooLarge,
    #[error("upstream decode failed: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid proxy url: {0}")]
    Proxy(String),
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct OpenSkyClient {
    http: reqwest::Client,
    credentials: Option<(String, String)>,
    poll_interval: Duration,
    cache: Mutex<Option<CachedBatch>>,
}

struct CachedBatch {
    at: Instant,
    data: Arc<FlightData>,
}

impl OpenSkyClient {
    /// Build the upstream client.
    ///
    /// A CLI-provided `proxy` (http/https/socks5) overrides the environment
    /// and still honors the `NO_PROXY` bypass list; without it reqwest uses
    /// the standard environment proxies. Basic-Auth `credentials` improve
    /// upstream rate limits when configured.
    pub fn new(
        proxy: Option<&str>,
        credentials: Option<(String, String)>,
        poll_interval: Duration,
    ) -> Result<Self, IngestError> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT);

        if let Some(proxy) = proxy.map(str::trim).filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| IngestError::Proxy(e.to_string()))?
                .no_proxy(reqwest::NoProxy::from_env());
            builder = builder.proxy(proxy);
        }

        let http = builder.build()?;
        let poll_interval =
            if poll_interval.is_zero() { MIN_POLL_INTERVAL } else { poll_interval };
        Ok(Self { http, credentials, poll_interval, cache: Mutex::new(None) })
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Fetch the current states batch, serving from cache when the last
    /// successful response is younger than one poll interval.
    pub async fn fetch_states(&self) -> Result<Arc<FlightData>, IngestError> {
        if let Some(cached) = self.cached() {
            return Ok(cached);
        }

        let started = Instant::now();
        let mut request = self.http.get(STATES_URL);
        if let Some((user, pass)) = &self.credentials {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(IngestError::RateLimited { status: status.as_u16(), retry_after });
        }
        if !status.is_success() {
            return Err(IngestError::UpstreamStatus(status.as_u16()));
        }

        let body = read_capped(response).await?;
        let decoded: StatesResponse = serde_json::from_slice(&body)?;
        let data = Arc::new(FlightData { states: decoded.states.unwrap_or_default() });

        debug!(
            states = data.states.len(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched upstream states"
        );

        *self.cache.lock().expect("states cache lock poisoned") =
            Some(CachedBatch { at: Instant::now(), data: Arc::clone(&data) });
        Ok(data)
    }

    fn cached(&self) -> Option<Arc<FlightData>> {
        let cache = self.cache.lock().expect("states cache lock poisoned");
        let cached = cache.as_ref()?;
        if cached.at.elapsed() < self.poll_interval {
            debug!(
                age_ms = cached.at.elapsed().as_millis() as u64,
                states = cached.data.states.len(),
                "states cache hit"
            );
            Some(Arc::clone(&cached.data))
        } else {
            None
        }
    }
}

/// Read a response body, refusing anything beyond [`MAX_BODY_BYTES`].
async fn read_capped(mut response: reqwest::Response) -> Result<Vec<u8>, IngestError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(IngestError::BodyTooLarge);
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Parse a Retry-After header as delta seconds. HTTP-date values are not
/// supported and fall back to the caller's default.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let secs: u64 = value.trim().parse().ok()?;
    Some(Duration::from_secs(secs))
}

/// Backoff after a throttling response: respect Retry-After, but never poll
/// more often than the configured interval.
fn backoff_for(retry_after: Duration, poll_interval: Duration) -> Duration {
    retry_after.max(poll_interval)
}

// =============================================================================
// LOOP
// =============================================================================

/// Run the ingest loop until `stop` is cancelled. The first fetch happens
/// immediately to reduce startup latency.
pub async fn run_ingest_loop(
    client: Arc<OpenSkyClient>,
    store: Option<Store>,
    bus: UpdateBus,
    stop: CancellationToken,
) {
    let mut sleep = tick(&client, store.as_ref(), &bus).await;
    loop {
        tokio::select! {
            () = stop.cancelled() => return,
            () = tokio::time::sleep(sleep) => {}
        }
        sleep = tick(&client, store.as_ref(), &bus).await;
    }
}

/// One ingest attempt. Returns how long to sleep before the next one.
async fn tick(client: &OpenSkyClient, store: Option<&Store>, bus: &UpdateBus) -> Duration {
    let poll_interval = client.poll_interval();
    metrics::counter!("ingest_ticks_total").increment(1);

    match client.fetch_states().await {
        Ok(data) => {
            if let Some(store) = store {
                match store.upsert_states(&data.states).await {
                    Ok(()) => {
                        metrics::counter!("ingest_states_total")
                            .increment(data.states.len() as u64);
                        debug!(states = data.states.len(), "ingest upserted");
                        bus.publish();
                    }
                    Err(e) => warn!(error = %e, "ingest upsert failed"),
                }
            }
            poll_interval
        }
        Err(IngestError::RateLimited { status, retry_after }) => {
            let backoff = backoff_for(retry_after, poll_interval);
            metrics::counter!("ingest_rate_limited_total").increment(1);
            debug!(status, ?retry_after, ?backoff, "ingest rate-limited, backing off");
            touch_current_view(store, backoff + TOUCH_SLACK).await;
            backoff
        }
        Err(e) => {
            warn!(error = %e, "ingest fetch failed");
            touch_current_view(store, poll_interval + TOUCH_SLACK).await;
            poll_interval
        }
    }
}

/// Keep existing markers visible while no fresh data arrives.
async fn touch_current_view(store: Option<&Store>, ttl: Duration) {
    let Some(store) = store else { return };
    if let Err(e) = store.touch_now(ttl).await {
        warn!(error = %e, "current-view ttl extension failed");
    }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
