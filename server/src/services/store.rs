//! Position store — a TTL-governed, ordered key-space on SQLite.
//!
//! DESIGN
//! ======
//! Three key families share one `kv` table (`key`, `value`, `expires_at`):
//! - `pos:{icao}:{ts:010}` → JSON point, expires after the retention period.
//!   Zero-padded timestamps make lexicographic order chronological, so
//!   prefix-range scans walk a track in time order.
//! - `now:{icao}` → JSON of the latest point, short TTL, refreshed on every
//!   upsert (or extended wholesale by [`Store::touch_now`] while the
//!   ingester backs off).
//! - `map:cs:{callsign}` → icao, retention TTL, plus the airline-code
//!   alternate form (IATA↔ICAO) when the prefix is known.
//!
//! SQLite has no per-key TTL, so expiry is a pair: readers filter rows by
//! `expires_at > now`, and a background sweeper deletes what has lapsed.
//! All mutation for one batch happens in a single transaction, which keeps
//! `now:*` consistent with the greatest-timestamp `pos:*` entry.
//!
//! Time-dependent operations have `*_at(now)` variants so tests can drive
//! the clock explicitly.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::services::airlines;

/// Default retention for historical points and callsign mappings.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

/// TTL for the `now:*` current view.
pub const NOW_TTL: Duration = Duration::from_secs(60);

/// Landed heuristic: maximum speed considered stationary, in m/s.
const LANDED_MAX_SPEED: f64 = 1.5;
/// Landed heuristic: maximum displacement over the window, in meters.
const LANDED_MAX_DISTANCE_M: f64 = 500.0;
/// Landed heuristic: maximum altitude change over the window, in meters.
const LANDED_MAX_ALT_DELTA_M: f64 = 10.0;
/// Landed heuristic: samples examined per decision.
const LANDED_MAX_SAMPLES: usize = 10;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

// =============================================================================
// TYPES
// =============================================================================

/// A single normalised aircraft position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub icao24: String,
    pub callsign: String,
    pub lon: f64,
    pub lat: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub alt: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub track: f64,
    /// Ground speed in m/s.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub speed: f64,
    /// Unix seconds.
    pub ts: i64,
}

fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store not initialised")]
    NotInitialised,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to create data directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

/// TTL key/value store over a single SQLite file. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    retention: Duration,
    now_ttl: Duration,
}

// =============================================================================
// OPEN / SCHEMA
// =============================================================================

impl Store {
    /// Open (or create) the store at `path` and rebuild the `now:*` view
    /// from persisted history.
    pub async fn open(path: &Path, retention: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(sqlx::Error::from)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self::with_pool(pool, retention);
        store.migrate().await?;
        store.rebuild_now().await?;
        Ok(store)
    }

    /// In-memory store for tests. Single connection so every query sees the
    /// same database.
    pub async fn open_in_memory(retention: Duration) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::with_pool(pool, retention);
        store.migrate().await?;
        Ok(store)
    }

    fn with_pool(pool: SqlitePool, retention: Duration) -> Self {
        let retention = if retention.is_zero() { DEFAULT_RETENTION } else { retention };
        Self { pool, retention, now_ttl: NOW_TTL }
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 expires_at INTEGER NOT NULL
             )",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS kv_expires_at ON kv (expires_at)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

// =============================================================================
// WRITES
// =============================================================================

impl Store {
    /// Store a batch of raw upstream state rows in one transaction.
    ///
    /// Positional fields used: 0=icao24, 1=callsign, 3=time_position,
    /// 4=last_contact, 5=lon, 6=lat, 7=baro altitude, 9=velocity (m/s),
    /// 10=true track, 13=geo altitude. Rows without a finite lon/lat or an
    /// icao are skipped; the batch proceeds.
    pub async fn upsert_states(&self, states: &[Vec<serde_json::Value>]) -> Result<(), StoreError> {
        self.upsert_states_at(states, unix_now()).await
    }

    pub(crate) async fn upsert_states_at(
        &self,
        states: &[Vec<serde_json::Value>],
        now: i64,
    ) -> Result<(), StoreError> {
        let retention = as_secs(self.retention);
        let now_ttl = as_secs(self.now_ttl);

        let mut tx = self.pool.begin().await?;
        for row in states {
            let Some(point) = normalize_state_row(row, now) else {
                continue;
            };
            let Ok(value) = serde_json::to_string(&point) else {
                continue;
            };

            let pos_key = format!("pos:{}:{:010}", point.icao24, point.ts);
            put(&mut tx, &pos_key, &value, now + retention).await?;
            put(&mut tx, &format!("now:{}", point.icao24), &value, now + now_ttl).await?;

            if !point.callsign.is_empty() {
                let map_key = format!("map:cs:{}", point.callsign);
                put(&mut tx, &map_key, &point.icao24, now + retention).await?;
                if let Some(alt) = airlines::alternate_callsign(&point.callsign) {
                    put(&mut tx, &format!("map:cs:{alt}"), &point.icao24, now + retention).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Extend the TTL of every live `now:*` entry without touching values.
    /// Used to keep current positions visible while the ingester backs off.
    /// A non-positive `ttl` falls back to the default now-TTL.
    pub async fn touch_now(&self, ttl: Duration) -> Result<(), StoreError> {
        self.touch_now_at(ttl, unix_now()).await
    }

    pub(crate) async fn touch_now_at(&self, ttl: Duration, now: i64) -> Result<(), StoreError> {
        let ttl = if ttl.is_zero() { self.now_ttl } else { ttl };
        sqlx::query(
            "UPDATE kv SET expires_at = ?1
             WHERE key >= 'now:' AND key < 'now;' AND expires_at > ?2",
        )
        .bind(now + as_secs(ttl))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rebuild `now:*` and `map:cs:*` from persisted history, so the server
    /// has a current view immediately after restart.
    pub async fn rebuild_now(&self) -> Result<(), StoreError> {
        self.rebuild_now_at(unix_now()).await
    }

    pub(crate) async fn rebuild_now_at(&self, now: i64) -> Result<(), StoreError> {
        // Ascending scan; last assignment per icao wins because zero-padded
        // timestamps sort chronologically.
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in self.scan_prefix(POS_PREFIX, Order::Asc, None, now).await? {
            if let Some(icao) = icao_from_pos_key(&key) {
                latest.insert(icao.to_string(), value);
            }
        }
        if latest.is_empty() {
            return Ok(());
        }

        let retention = as_secs(self.retention);
        let now_ttl = as_secs(self.now_ttl);
        let mut tx = self.pool.begin().await?;
        for (icao, value) in &latest {
            put(&mut tx, &format!("now:{icao}"), value, now + now_ttl).await?;
            let Ok(point) = serde_json::from_str::<Point>(value) else {
                continue;
            };
            if point.callsign.is_empty() {
                continue;
            }
            put(&mut tx, &format!("map:cs:{}", point.callsign), icao, now + retention).await?;
            if let Some(alt) = airlines::alternate_callsign(&point.callsign) {
                put(&mut tx, &format!("map:cs:{alt}"), icao, now + retention).await?;
            }
        }
        tx.commit().await?;
        debug!(aircraft = latest.len(), "rebuilt current view from history");
        Ok(())
    }

    /// Delete rows whose TTL has lapsed. Returns the number removed.
    pub async fn sweep_expired(&self) -> Result<u64, StoreError> {
        self.sweep_expired_at(unix_now()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM kv WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// READS
// =============================================================================

impl Store {
    /// Latest sample for a callsign, trying the airline-code alternate form
    /// when the direct mapping is absent. Dangling mappings resolve to
    /// `None`.
    pub async fn latest_by_callsign(&self, callsign: &str) -> Result<Option<Point>, StoreError> {
        self.latest_by_callsign_at(callsign, unix_now()).await
    }

    pub(crate) async fn latest_by_callsign_at(
        &self,
        callsign: &str,
        now: i64,
    ) -> Result<Option<Point>, StoreError> {
        let Some(icao) = self.resolve_icao(callsign, now).await? else {
            return Ok(None);
        };
        let Some(value) = self.get_live(&format!("now:{icao}"), now).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&value).ok())
    }

    /// Stored history for a callsign in ascending time order, with the
    /// resolved icao. `limit == 0` means unbounded.
    pub async fn track_by_callsign(
        &self,
        callsign: &str,
        limit: usize,
    ) -> Result<Option<(Vec<Point>, String)>, StoreError> {
        self.track_by_callsign_at(callsign, limit, unix_now()).await
    }

    pub(crate) async fn track_by_callsign_at(
        &self,
        callsign: &str,
        limit: usize,
        now: i64,
    ) -> Result<Option<(Vec<Point>, String)>, StoreError> {
        let Some(icao) = self.resolve_icao(callsign, now).await? else {
            return Ok(None);
        };
        let prefix = format!("pos:{icao}:");
        let mut points = Vec::new();
        for (_, value) in self.scan_prefix(&prefix, Order::Asc, None, now).await? {
            if let Ok(point) = serde_json::from_str::<Point>(&value) {
                points.push(point);
                if limit > 0 && points.len() >= limit {
                    break;
                }
            }
        }
        Ok(Some((points, icao)))
    }

    /// All current positions. No landed filtering.
    pub async fn current_all(&self) -> Result<Vec<Point>, StoreError> {
        self.current_all_at(unix_now()).await
    }

    pub(crate) async fn current_all_at(&self, now: i64) -> Result<Vec<Point>, StoreError> {
        let rows = self.scan_prefix(NOW_PREFIX, Order::Asc, None, now).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_str(&value).ok())
            .collect())
    }

    /// Current positions inside the bounding box (inclusive bounds), with
    /// likely-landed aircraft filtered out via a ten-minute history check.
    pub async fn current_in_bbox(
        &self,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Vec<Point>, StoreError> {
        self.current_in_bbox_at(min_lon, min_lat, max_lon, max_lat, unix_now()).await
    }

    pub(crate) async fn current_in_bbox_at(
        &self,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
        now: i64,
    ) -> Result<Vec<Point>, StoreError> {
        let candidates: Vec<Point> = self
            .current_all_at(now)
            .await?
            .into_iter()
            .filter(|p| {
                p.lon >= min_lon && p.lon <= max_lon && p.lat >= min_lat && p.lat <= max_lat
            })
            .collect();

        // Hide aircraft that have likely landed. Current speed alone is not
        // enough: many samples lack speed or report 0 in flight.
        let mut out = Vec::with_capacity(candidates.len());
        for point in candidates {
            let landed = self
                .is_landed_within_at(&point.icao24, Duration::from_secs(600), now)
                .await?;
            if !landed {
                out.push(point);
            }
        }
        Ok(out)
    }

    /// Recent history for an icao: at most `limit` points with
    /// `ts >= now - window`, in chronological order.
    pub async fn recent_track_by_icao(
        &self,
        icao: &str,
        limit: usize,
        window: Duration,
    ) -> Result<Vec<Point>, StoreError> {
        self.recent_track_by_icao_at(icao, limit, window, unix_now()).await
    }

    pub(crate) async fn recent_track_by_icao_at(
        &self,
        icao: &str,
        limit: usize,
        window: Duration,
        now: i64,
    ) -> Result<Vec<Point>, StoreError> {
        let cutoff = now - as_secs(window);
        let prefix = format!("pos:{icao}:");
        // Keys encode the timestamp, so the window bound is a key bound.
        let lower = format!("{prefix}{:010}", cutoff.max(0));
        let rows = self
            .scan_range(&lower, &prefix_end(&prefix), Order::Desc, None, now)
            .await?;

        let mut points = Vec::new();
        for (_, value) in rows {
            let Ok(point) = serde_json::from_str::<Point>(&value) else {
                continue;
            };
            if point.ts < cutoff {
                break;
            }
            points.push(point);
            if limit > 0 && points.len() >= limit {
                break;
            }
        }
        points.reverse();
        Ok(points)
    }

    /// Whether the aircraft looks parked: enough history inside `window`
    /// (span of at least half of it), near-zero latest speed, small
    /// displacement, and nearly no altitude change.
    pub async fn is_landed_within(&self, icao: &str, window: Duration) -> Result<bool, StoreError> {
        self.is_landed_within_at(icao, window, unix_now()).await
    }

    pub(crate) async fn is_landed_within_at(
        &self,
        icao: &str,
        window: Duration,
        now: i64,
    ) -> Result<bool, StoreError> {
        let window = if window.is_zero() { Duration::from_secs(900) } else { window };
        let cutoff = now - as_secs(window);

        let prefix = format!("pos:{icao}:");
        let rows = self
            .scan_prefix(&prefix, Order::Desc, Some(LANDED_MAX_SAMPLES), now)
            .await?;

        let mut newest: Option<Point> = None;
        let mut oldest: Option<Point> = None;
        let mut count = 0usize;
        for (_, value) in rows {
            let Ok(point) = serde_json::from_str::<Point>(&value) else {
                continue;
            };
            let ts = point.ts;
            if newest.is_none() {
                newest = Some(point.clone());
            }
            oldest = Some(point);
            count += 1;
            if ts < cutoff || count >= LANDED_MAX_SAMPLES {
                break;
            }
        }

        let (Some(newest), Some(oldest)) = (newest, oldest) else {
            return Ok(false);
        };
        if count < 2 {
            return Ok(false);
        }
        // Not enough history to decide.
        if newest.ts - oldest.ts < as_secs(window) / 2 {
            return Ok(false);
        }

        let alt_delta = (newest.alt - oldest.alt).abs();
        let distance = haversine_meters(oldest.lat, oldest.lon, newest.lat, newest.lon);
        Ok(newest.speed <= LANDED_MAX_SPEED
            && distance < LANDED_MAX_DISTANCE_M
            && alt_delta < LANDED_MAX_ALT_DELTA_M)
    }
}

// =============================================================================
// KEY-SPACE PRIMITIVES
// =============================================================================

const POS_PREFIX: &str = "pos:";
const NOW_PREFIX: &str = "now:";
const MAP_CS_PREFIX: &str = "map:cs:";

#[derive(Clone, Copy)]
enum Order {
    Asc,
    Desc,
}

impl Store {
    async fn resolve_icao(&self, callsign: &str, now: i64) -> Result<Option<String>, StoreError> {
        let callsign = normalize_callsign(callsign);
        if let Some(icao) = self.get_live(&format!("{MAP_CS_PREFIX}{callsign}"), now).await? {
            return Ok(Some(icao));
        }
        if let Some(alt) = airlines::alternate_callsign(&callsign) {
            return self.get_live(&format!("{MAP_CS_PREFIX}{alt}"), now).await;
        }
        Ok(None)
    }

    async fn get_live(&self, key: &str, now: i64) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv WHERE key = ?1 AND expires_at > ?2")
                .bind(key)
                .bind(now)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        order: Order,
        limit: Option<usize>,
        now: i64,
    ) -> Result<Vec<(String, String)>, StoreError> {
        self.scan_range(prefix, &prefix_end(prefix), order, limit, now).await
    }

    /// Live rows with `lower <= key < upper`, ordered by key.
    async fn scan_range(
        &self,
        lower: &str,
        upper: &str,
        order: Order,
        limit: Option<usize>,
        now: i64,
    ) -> Result<Vec<(String, String)>, StoreError> {
        let dir = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        let sql = format!(
            "SELECT key, value FROM kv
             WHERE key >= ?1 AND key < ?2 AND expires_at > ?3
             ORDER BY key {dir} LIMIT ?4"
        );
        let limit = limit.map_or(-1i64, |n| n as i64);
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(lower)
            .bind(upper)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

async fn put(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    key: &str,
    value: &str,
    expires_at: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO kv (key, value, expires_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
    )
    .bind(key)
    .bind(value)
    .bind(expires_at)
    .execute(tx.as_mut())
    .await?;
    Ok(())
}

/// Exclusive upper bound for a key prefix scan: the prefix with its final
/// byte incremented. All prefixes here end in ASCII `:`.
fn prefix_end(prefix: &str) -> String {
    let mut bytes = prefix.as_bytes().to_vec();
    if let Some(last) = bytes.last_mut() {
        *last += 1;
    }
    String::from_utf8(bytes).unwrap_or_else(|_| prefix.to_string())
}

/// The icao portion of a `pos:{icao}:{ts}` key.
fn icao_from_pos_key(key: &str) -> Option<&str> {
    let rest = key.strip_prefix(POS_PREFIX)?;
    let sep = rest.find(':')?;
    if sep == 0 { None } else { Some(&rest[..sep]) }
}

// =============================================================================
// NORMALISATION
// =============================================================================

/// Build a [`Point`] from one raw upstream row, or `None` when it lacks an
/// icao or finite coordinates.
fn normalize_state_row(row: &[serde_json::Value], now: i64) -> Option<Point> {
    let icao24 = normalize_icao(field_str(row, 0)?);
    if icao24.is_empty() {
        return None;
    }
    let callsign = normalize_callsign(field_str(row, 1).unwrap_or_default());

    let lon = field_f64(row, 5)?;
    let lat = field_f64(row, 6)?;
    if !lon.is_finite() || !lat.is_finite() {
        return None;
    }
    let lon = clamp(lon, -180.0, 180.0);
    let lat = clamp(lat, -90.0, 90.0);

    let mut ts = match field_i64(row, 4) {
        Some(v) if v > 0 => v,
        _ => field_i64(row, 3).unwrap_or(0),
    };
    if ts <= 0 {
        ts = now;
    }

    let mut alt = field_f64(row, 13).or_else(|| field_f64(row, 7)).unwrap_or(0.0);
    if !alt.is_finite() || alt < 0.0 {
        alt = 0.0;
    }
    let track = field_f64(row, 10).map_or(0.0, norm_angle_360);
    let mut speed = field_f64(row, 9).unwrap_or(0.0);
    if !speed.is_finite() || speed < 0.0 {
        speed = 0.0;
    }

    Some(Point { icao24, callsign, lon, lat, alt, track, speed, ts })
}

fn field_str(row: &[serde_json::Value], idx: usize) -> Option<&str> {
    row.get(idx)?.as_str()
}

fn field_f64(row: &[serde_json::Value], idx: usize) -> Option<f64> {
    row.get(idx)?.as_f64()
}

#[allow(clippy::cast_possible_truncation)]
fn field_i64(row: &[serde_json::Value], idx: usize) -> Option<i64> {
    let v = row.get(idx)?;
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

/// Uppercase and trim a callsign.
#[must_use]
pub fn normalize_callsign(s: &str) -> String {
    s.trim().to_uppercase()
}

/// Lowercase and trim an icao24 transponder id.
#[must_use]
pub fn normalize_icao(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Limit `v` to `[min, max]`; non-finite values become 0.
fn clamp(v: f64, min: f64, max: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    v.clamp(min, max)
}

/// Normalise an angle to `[0, 360)`; non-finite values become 0.
fn norm_angle_360(v: f64) -> f64 {
    if !v.is_finite() {
        return 0.0;
    }
    let mut r = v % 360.0;
    if r < 0.0 {
        r += 360.0;
    }
    if r == 360.0 {
        r = 0.0;
    }
    r
}

/// Great-circle distance between two lat/lon coordinates, in meters.
#[must_use]
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let la1 = lat1.to_radians();
    let la2 = lat2.to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + (d_lon / 2.0).sin().powi(2) * la1.cos() * la2.cos();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(0))
}

#[allow(clippy::cast_possible_wrap)]
fn as_secs(d: Duration) -> i64 {
    d.as_secs() as i64
}

// =============================================================================
// SWEEPER
// =============================================================================

/// Spawn the background TTL sweeper. Runs every minute until cancelled.
pub fn spawn_sweeper(store: Store, stop: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60));
        loop {
            tokio::select! {
                () = stop.cancelled() => return,
                _ = ticker.tick() => {}
            }
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "swept expired entries"),
                Err(e) => warn!(error = %e, "ttl sweep failed"),
            }
        }
    })
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
