//! Flights WebSocket — snapshot + diff streaming with ACK backpressure.
//!
//! DESIGN
//! ======
//! After an authenticated upgrade the session enters a `select!` loop over:
//! - client frames (ACKs, viewport updates, close),
//! - update-bus notifications from the ingester,
//! - a 30 s heartbeat tick,
//! - the server-wide shutdown broadcast.
//!
//! The first send is a full snapshot; afterwards only changes go out. A new
//! diff is sent only when the previous one was ACKed and the client's
//! reported outbound buffer is below the high-water mark, so any number of
//! ingest ticks coalesce into a single pending diff for a slow client.
//!
//! Diff bookkeeping lives in [`DiffTracker`], which is pure state so the
//! algorithm, ACK gating and viewport scoping are tested without sockets.
//!
//! LIFECYCLE
//! =========
//! 1. Handshake: valid `auth` cookie (else 401), `csrf` query parameter
//!    equal to the `csrf` cookie (else 403), then upgrade.
//! 2. Initial snapshot diff, then diffs on ingest ticks, gated by ACKs.
//! 3. Heartbeat JSON (`hb`) when idle >25 s, WS ping otherwise.
//! 4. On shutdown broadcast: send `server_shutdown`, close.

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{debug, warn};

use crate::protocol::{ClientMessage, Item, ServerMessage, TrailPoint};
use crate::services::store::Point;
use crate::state::AppState;

const HEARTBEAT_TICK: Duration = Duration::from_secs(30);
/// Idle time after which the heartbeat tick sends a `hb` JSON message
/// instead of a bare WS ping.
const IDLE_BEFORE_HEARTBEAT: Duration = Duration::from_secs(25);
/// Client-reported outbound buffer level that pauses diff sending, bytes.
const BUFFER_HIGH_WATER: i64 = 1_000_000;
const TRAIL_LIMIT: usize = 24;
const TRAIL_WINDOW: Duration = Duration::from_secs(45 * 60);

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = jar.get("auth").map(Cookie::value).unwrap_or_default();
    if token.is_empty() || state.auth.validate(token).is_none() {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let csrf_query = params.get("csrf").map(String::as_str).unwrap_or_default();
    let csrf_cookie = jar.get("csrf").map(Cookie::value).unwrap_or_default();
    if csrf_query.is_empty() || csrf_query != csrf_cookie {
        return (StatusCode::FORBIDDEN, "forbidden").into_response();
    }

    ws.on_upgrade(move |socket| run_session(socket, state))
}

// =============================================================================
// SESSION LOOP
// =============================================================================

async fn run_session(mut socket: WebSocket, state: AppState) {
    metrics::gauge!("ws_sessions_active").increment(1.0);
    debug!("ws flights connected");

    let mut updates = state.updates.subscribe();
    let mut shutdown = state.shutdown.subscribe();
    let mut tracker = DiffTracker::new();
    let mut last_send = Instant::now();

    // First tick lands one heartbeat interval from now, not immediately.
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + HEARTBEAT_TICK,
        HEARTBEAT_TICK,
    );
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    // Initial snapshot.
    if try_send(&state, &mut socket, &mut tracker, &mut last_send).await.is_err() {
        finish_session();
        return;
    }

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                let notice = ServerMessage::ServerShutdown { ts: unix_now() };
                let _ = send_json(&mut socket, &notice).await;
                break;
            }
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                match message {
                    Message::Text(text) => {
                        if handle_client_text(&text, &mut tracker)
                            && try_send(&state, &mut socket, &mut tracker, &mut last_send).await.is_err()
                        {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    // Pings are answered by the transport; pongs are ignored.
                    _ => {}
                }
            }
            Some(()) = updates.recv() => {
                tracker.pending = true;
                if try_send(&state, &mut socket, &mut tracker, &mut last_send).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if last_send.elapsed() > IDLE_BEFORE_HEARTBEAT {
                    let hb = ServerMessage::Heartbeat { ts: unix_now() };
                    if send_json(&mut socket, &hb).await.is_err() {
                        break;
                    }
                    last_send = Instant::now();
                } else if socket
                    .send(Message::Ping(axum::body::Bytes::from_static(b"p")))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    finish_session();
}

fn finish_session() {
    metrics::gauge!("ws_sessions_active").decrement(1.0);
    debug!("ws flights disconnected");
}

/// Parse one inbound text frame and apply it to the tracker. Returns true
/// when a send attempt is warranted. Unknown or malformed messages and
/// invalid bboxes are ignored.
fn handle_client_text(text: &str, tracker: &mut DiffTracker) -> bool {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Ack { seq, buffered }) => tracker.on_ack(seq, buffered),
        Ok(ClientMessage::Viewport { bbox }) => match BBox::parse(&bbox) {
            Some(bbox) => {
                tracker.on_viewport(bbox);
                true
            }
            None => {
                debug!(bbox = %bbox, "ignoring invalid viewport");
                false
            }
        },
        Err(e) => {
            debug!(error = %e, len = text.len(), "ignoring unparseable client message");
            false
        }
    }
}

// =============================================================================
// SENDING
// =============================================================================

/// Send the next diff if the tracker allows one. Storage trouble is a quiet
/// no-op (the update stays pending); only wire errors end the session.
async fn try_send(
    state: &AppState,
    socket: &mut WebSocket,
    tracker: &mut DiffTracker,
    last_send: &mut Instant,
) -> Result<(), ()> {
    if !tracker.can_send() {
        return Ok(());
    }

    let current = match state.store() {
        Ok(store) => match store.current_all().await {
            Ok(points) => points,
            Err(e) => {
                warn!(error = %e, "current view read failed; keeping diff pending");
                return Ok(());
            }
        },
        Err(_) => return Ok(()),
    };

    let Some(planned) = tracker.plan(&current) else {
        return Ok(());
    };
    let PlannedDiff { seq, mut upsert, delete, cur } = planned;

    attach_trails(state, &mut upsert).await;

    let up_count = upsert.len();
    let del_count = delete.len();
    let diff = ServerMessage::Diff { seq, upsert, delete };
    send_json(socket, &diff).await?;

    tracker.committed(seq, cur);
    *last_send = Instant::now();
    metrics::counter!("ws_diffs_sent_total").increment(1);
    debug!(seq, up = up_count, del = del_count, "ws flights diff sent");
    Ok(())
}

/// Attach a short recent trail to each upserted aircraft.
async fn attach_trails(state: &AppState, upsert: &mut [Item]) {
    let Ok(store) = state.store() else { return };
    for item in upsert.iter_mut() {
        if item.icao24.is_empty() {
            continue;
        }
        match store.recent_track_by_icao(&item.icao24, TRAIL_LIMIT, TRAIL_WINDOW).await {
            Ok(points) if !points.is_empty() => {
                item.trail = points
                    .iter()
                    .map(|p| TrailPoint { lon: p.lon, lat: p.lat })
                    .collect();
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, icao = %item.icao24, "trail lookup failed"),
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), ()> {
    let Ok(json) = serde_json::to_string(message) else {
        warn!("ws message serialization failed");
        return Err(());
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

// =============================================================================
// DIFF TRACKER
// =============================================================================

/// Per-session diff bookkeeping: the last snapshot the client holds, the
/// sequence counter, and the send-gating flags.
#[derive(Debug)]
pub(crate) struct DiffTracker {
    /// Snapshot as of the last successful send, keyed by [`Item::key`].
    last: HashMap<String, Item>,
    /// Sequence number of the last diff sent.
    seq: i64,
    /// A diff is on the wire and unacknowledged.
    inflight: bool,
    /// Client reported an outbound buffer above the high-water mark.
    buffer_high: bool,
    /// An update arrived since the last successful send.
    pending: bool,
    /// Viewport scope for diffs, when the client declared one.
    bbox: Option<BBox>,
}

/// A diff ready to serialize. `cur` becomes the new `last` snapshot once
/// the wire write succeeds.
#[derive(Debug)]
pub(crate) struct PlannedDiff {
    pub seq: i64,
    pub upsert: Vec<Item>,
    pub delete: Vec<String>,
    cur: HashMap<String, Item>,
}

impl DiffTracker {
    pub(crate) fn new() -> Self {
        Self {
            last: HashMap::new(),
            seq: 0,
            inflight: false,
            buffer_high: false,
            // Send the initial snapshot as soon as the store has data.
            pending: true,
            bbox: None,
        }
    }

    pub(crate) fn can_send(&self) -> bool {
        !self.inflight && !self.buffer_high && self.pending
    }

    /// Compute the next diff against the current store view. Returns `None`
    /// when nothing changed (clearing `pending`); otherwise the planned
    /// diff, to be committed after the wire write succeeds.
    pub(crate) fn plan(&mut self, current: &[Point]) -> Option<PlannedDiff> {
        let cur = self.snapshot(current);

        let (upsert, delete) = if self.last.is_empty() {
            // Initial snapshot: everything is an upsert.
            (cur.values().cloned().collect::<Vec<_>>(), Vec::new())
        } else {
            let upsert = cur
                .iter()
                .filter(|(key, item)| {
                    self.last.get(*key).is_none_or(|previous| previous.differs(item))
                })
                .map(|(_, item)| item.clone())
                .collect::<Vec<_>>();
            let delete = self
                .last
                .keys()
                .filter(|key| !cur.contains_key(*key))
                .cloned()
                .collect::<Vec<_>>();
            (upsert, delete)
        };

        if upsert.is_empty() && delete.is_empty() {
            self.pending = false;
            self.last = cur;
            return None;
        }

        Some(PlannedDiff { seq: self.seq + 1, upsert, delete, cur })
    }

    /// Record a successfully written diff.
    pub(crate) fn committed(&mut self, seq: i64, cur: HashMap<String, Item>) {
        self.seq = seq;
        self.inflight = true;
        self.last = cur;
        self.pending = false;
    }

    /// Apply a client ACK. Returns true when another send attempt should
    /// follow. ACKs for stale sequence numbers are ignored; the next diff
    /// will carry the current one.
    pub(crate) fn on_ack(&mut self, seq: i64, buffered: i64) -> bool {
        if seq != self.seq {
            return false;
        }
        self.inflight = false;
        self.buffer_high = buffered > BUFFER_HIGH_WATER;
        !self.buffer_high
    }

    /// Apply a viewport change: future diffs are scoped to `bbox` and the
    /// next send carries a fresh snapshot of it.
    pub(crate) fn on_viewport(&mut self, bbox: BBox) {
        self.bbox = Some(bbox);
        self.pending = true;
    }

    /// Current view keyed for diffing, viewport-filtered when set.
    fn snapshot(&self, current: &[Point]) -> HashMap<String, Item> {
        let mut cur = HashMap::with_capacity(current.len());
        for point in current {
            if let Some(bbox) = &self.bbox {
                if !bbox.contains(point.lon, point.lat) {
                    continue;
                }
            }
            let item = Item::from(point);
            let Some(key) = item.key() else { continue };
            cur.insert(key, item);
        }
        cur
    }
}

// =============================================================================
// BOUNDING BOX
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct BBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BBox {
    /// Parse `"minLon,minLat,maxLon,maxLat"`. `None` for anything but four
    /// finite coordinates in range with positive extent.
    pub(crate) fn parse(s: &str) -> Option<Self> {
        let mut parts = s.split(',');
        let mut next = || -> Option<f64> {
            let v: f64 = parts.next()?.trim().parse().ok()?;
            v.is_finite().then_some(v)
        };
        let (min_lon, min_lat, max_lon, max_lat) = (next()?, next()?, next()?, next()?);
        if parts.next().is_some() {
            return None;
        }
        if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
            return None;
        }
        if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
            return None;
        }
        if max_lon <= min_lon || max_lat <= min_lat {
            return None;
        }
        Some(Self { min_lon, min_lat, max_lon, max_lat })
    }

    /// Inclusive containment.
    pub(crate) fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(0))
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
