//! One-shot flight query endpoints.
//!
//! Thin wrappers over the store: current items for the map, the latest
//! sample for a callsign (upstream-compatible row shape), a bbox query,
//! and the current flight segment for a callsign.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::protocol::Item;
use crate::services::store::{normalize_callsign, Point};
use crate::state::AppState;

/// History gap that starts a new flight segment.
const SEGMENT_GAP_SECS: i64 = 45 * 60;
/// Shorter gap that still splits a segment when both neighbors look parked.
const GROUND_IDLE_GAP_SECS: i64 = 5 * 60;
const GROUND_IDLE_MAX_SPEED: f64 = 1.5;
const GROUND_IDLE_MAX_ALT_DELTA: f64 = 20.0;

#[derive(Debug, Deserialize)]
pub struct CallsignQuery {
    #[serde(default)]
    callsign: String,
}

#[derive(Debug, Deserialize)]
pub struct BBoxQuery {
    #[serde(default)]
    bbox: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/flights` — all current aircraft as wire items (no trails).
/// The frontend filters to its viewport.
pub async fn all_flights(State(state): State<AppState>) -> Result<Json<Vec<Item>>, StatusCode> {
    let store = state.store().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let points = store
        .current_all()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(points.iter().map(Item::from).collect()))
}

/// `GET /api/flight?callsign=` — latest sample for a callsign in the
/// upstream states-array shape. Unknown callsigns yield an empty array.
pub async fn flight_by_callsign(
    State(state): State<AppState>,
    Query(query): Query<CallsignQuery>,
) -> Result<Json<Vec<Vec<Value>>>, StatusCode> {
    if query.callsign.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let store = state.store().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    match store.latest_by_callsign(&query.callsign).await {
        Ok(Some(point)) => Ok(Json(vec![opensky_row(&point)])),
        Ok(None) => {
            debug!(callsign = %query.callsign, "flight latest not found");
            Ok(Json(Vec::new()))
        }
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// `GET /api/flights/bbox?bbox=minLon,minLat,maxLon,maxLat` — current
/// non-landed aircraft inside the box.
pub async fn flights_in_bbox(
    State(state): State<AppState>,
    Query(query): Query<BBoxQuery>,
) -> Result<Json<Vec<Point>>, StatusCode> {
    let (min_lon, min_lat, max_lon, max_lat) =
        parse_query_bbox(&query.bbox).ok_or(StatusCode::BAD_REQUEST)?;
    let store = state.store().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let points = store
        .current_in_bbox(min_lon, min_lat, max_lon, max_lat)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(points))
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub callsign: String,
    pub icao24: String,
    pub points: Vec<Point>,
}

/// `GET /api/track?callsign=` — history for the most recent continuous
/// flight segment, so separate flights under one callsign are not merged.
pub async fn track_by_callsign(
    State(state): State<AppState>,
    Query(query): Query<CallsignQuery>,
) -> Result<Json<TrackResponse>, StatusCode> {
    if query.callsign.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let callsign = normalize_callsign(&query.callsign);
    let store = state.store().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let Some((points, icao24)) = store
        .track_by_callsign(&callsign, 0)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    else {
        return Ok(Json(TrackResponse { callsign, icao24: String::new(), points: Vec::new() }));
    };

    // Restrict to samples carrying exactly this callsign; an aircraft's
    // history can contain other identifiers.
    let mut filtered: Vec<Point> = points
        .iter()
        .filter(|p| normalize_callsign(&p.callsign) == callsign)
        .cloned()
        .collect();
    if filtered.is_empty() {
        filtered = points;
    }

    let start = current_segment_start(&filtered);
    Ok(Json(TrackResponse { callsign, icao24, points: filtered.split_off(start) }))
}

// =============================================================================
// HELPERS
// =============================================================================

/// Index where the most recent continuous segment begins. Walking backwards,
/// a segment breaks on a long time gap, or on a shorter gap where both
/// neighboring samples sit near-stationary at the same altitude.
fn current_segment_start(points: &[Point]) -> usize {
    if points.len() < 2 {
        return 0;
    }
    for i in (0..points.len() - 1).rev() {
        let earlier = &points[i];
        let later = &points[i + 1];
        let dt = later.ts - earlier.ts;
        if dt > SEGMENT_GAP_SECS {
            return i + 1;
        }
        if dt > GROUND_IDLE_GAP_SECS
            && earlier.speed <= GROUND_IDLE_MAX_SPEED
            && later.speed <= GROUND_IDLE_MAX_SPEED
            && (later.alt - earlier.alt).abs() < GROUND_IDLE_MAX_ALT_DELTA
        {
            return i + 1;
        }
    }
    0
}

/// Upstream-compatible states row for one point. Zero-valued optional
/// fields stay null, matching the feed's sparse rows.
fn opensky_row(point: &Point) -> Vec<Value> {
    let mut row = vec![Value::Null; 17];
    row[0] = json!(point.icao24);
    row[1] = json!(point.callsign);
    row[4] = json!(point.ts);
    row[5] = json!(point.lon);
    row[6] = json!(point.lat);
    if point.speed != 0.0 {
        row[9] = json!(point.speed);
    }
    if point.track != 0.0 {
        row[10] = json!(point.track);
    }
    if point.alt != 0.0 {
        row[13] = json!(point.alt);
    }
    row
}

/// Parse and sanity-check a bbox query. Out-of-range coordinates are
/// clamped; inverted or degenerate boxes are rejected.
fn parse_query_bbox(raw: &str) -> Option<(f64, f64, f64, f64)> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return None;
    }
    let mut values = [0.0f64; 4];
    for (slot, part) in values.iter_mut().zip(&parts) {
        let v: f64 = part.trim().parse().ok()?;
        if !v.is_finite() {
            return None;
        }
        *slot = v;
    }
    let [mut min_lon, mut min_lat, mut max_lon, mut max_lat] = values;
    min_lon = min_lon.max(-180.0);
    max_lon = max_lon.min(180.0);
    min_lat = min_lat.max(-90.0);
    max_lat = max_lat.min(90.0);
    if max_lon <= min_lon || max_lat <= min_lat {
        return None;
    }
    Some((min_lon, min_lat, max_lon, max_lat))
}

#[cfg(test)]
#[path = "flights_test.rs"]
mod tests;
