//! Wire protocol for the flights WebSocket.
//!
//! DESIGN
//! ======
//! Every message is a tagged JSON object (`"type"` discriminator). The server
//! speaks `ServerMessage`, clients speak `ClientMessage`. Numeric fields that
//! are zero and empty collections are omitted to keep diff payloads small for
//! large snapshots.

use serde::{Deserialize, Serialize};

use crate::services::store::Point;

// =============================================================================
// ITEMS
// =============================================================================

/// A single aircraft entry inside a diff. Mirrors [`Point`] plus an optional
/// short trail of recent coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub icao24: String,
    pub callsign: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub alt: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub track: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub speed: f64,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trail: Vec<TrailPoint>,
}

/// One trail coordinate. Timestamps are omitted to keep payloads small.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailPoint {
    pub lon: f64,
    pub lat: f64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl Item {
    /// Diff key for this item: the icao24 when present, otherwise the
    /// normalized callsign. Items with neither are dropped from diffs.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        if !self.icao24.is_empty() {
            return Some(self.icao24.clone());
        }
        let cs = self.callsign.trim().to_uppercase();
        if cs.is_empty() { None } else { Some(cs) }
    }

    /// Whether any client-visible field changed relative to `other`.
    /// Trail is excluded: it is derived data attached at send time.
    #[must_use]
    pub fn differs(&self, other: &Self) -> bool {
        self.lon != other.lon
            || self.lat != other.lat
            || self.alt != other.alt
            || self.track != other.track
            || self.speed != other.speed
            || self.ts != other.ts
            || self.callsign != other.callsign
    }
}

impl From<&Point> for Item {
    fn from(p: &Point) -> Self {
        Self {
            icao24: p.icao24.clone(),
            callsign: p.callsign.clone(),
            lon: p.lon,
            lat: p.lat,
            alt: p.alt,
            track: p.track,
            speed: p.speed,
            ts: p.ts,
            trail: Vec::new(),
        }
    }
}

// =============================================================================
// SERVER → CLIENT
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental update relative to the last snapshot the client holds.
    /// `seq` starts at 1 and increases by one per diff within a session.
    Diff {
        seq: i64,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        upsert: Vec<Item>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        delete: Vec<String>,
    },
    /// Keep-alive sent when no data frame went out recently.
    #[serde(rename = "hb")]
    Heartbeat { ts: i64 },
    /// One-off notice broadcast during graceful shutdown.
    ServerShutdown { ts: i64 },
}

// =============================================================================
// CLIENT → SERVER
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Acknowledges a diff by sequence number. `buffered` reports the
    /// client's outbound buffer fill in bytes for backpressure.
    Ack {
        seq: i64,
        #[serde(default)]
        buffered: i64,
    },
    /// Declares the client's visible bounding box as
    /// `"minLon,minLat,maxLon,maxLat"`.
    Viewport { bbox: String },
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
