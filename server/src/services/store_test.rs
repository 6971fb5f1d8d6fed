
use super::*;
use serde_json::{json, Value};

const T0: i64 = 1_000_000_000;
const RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

async fn test_store() -> Store {
    Store::open_in_memory(RETENTION)
        .await
        .expect("in-memory store should open")
}

/// Raw upstream row with the positional fields the ingester consumes:
/// 0=icao24, 1=callsign, 4=last_contact, 5=lon, 6=lat, 7=baro alt,
/// 9=velocity, 10=track, 13=geo alt.
fn state_row(icao: &str, callsign: &str, ts: i64, lon: f64, lat: f64, speed: f64, track: f64, geo_alt: f64) -> Vec<Value> {
    let mut row = vec![Value::Null; 17];
    row[0] = json!(icao);
    row[1] = json!(callsign);
    row[4] = json!(ts);
    row[5] = json!(lon);
    row[6] = json!(lat);
    row[9] = json!(speed);
    row[10] = json!(track);
    row[13] = json!(geo_alt);
    row
}

// =============================================================================
// UPSERT + LOOKUP
// =============================================================================

#[tokio::test]
async fn upsert_round_trip_by_callsign_and_iata_alternate() {
    let store = test_store().await;
    let batch = vec![state_row("ABC123", "AAL100", T0, -122.5, 37.7, 230.0, 90.0, 10000.0)];
    store.upsert_states_at(&batch, T0).await.unwrap();

    let p = store
        .latest_by_callsign_at("AAL100", T0)
        .await
        .unwrap()
        .expect("direct mapping should resolve");
    assert_eq!(p.icao24, "abc123", "icao is lowercased");
    assert_eq!(p.callsign, "AAL100");
    assert_eq!(p.lon, -122.5);
    assert_eq!(p.lat, 37.7);
    assert_eq!(p.alt, 10000.0);
    assert_eq!(p.track, 90.0);
    assert_eq!(p.speed, 230.0);
    assert_eq!(p.ts, T0);

    // AA is the IATA form of AAL; the alternate mapping resolves to the
    // same aircraft.
    let alt = store
        .latest_by_callsign_at("AA100", T0)
        .await
        .unwrap()
        .expect("alternate mapping should resolve");
    assert_eq!(alt, p);
}

#[tokio::test]
async fn upsert_normalises_callsign_case_and_whitespace() {
    let store = test_store().await;
    let batch = vec![state_row("AB12CD", " ual42 ", T0, 10.0, 50.0, 0.0, 0.0, 0.0)];
    store.upsert_states_at(&batch, T0).await.unwrap();

    let p = store.latest_by_callsign_at("ual42", T0).await.unwrap().unwrap();
    assert_eq!(p.callsign, "UAL42");
    assert_eq!(p.icao24, "ab12cd");
}

#[tokio::test]
async fn upsert_skips_invalid_rows_and_keeps_the_rest() {
    let store = test_store().await;
    let mut no_icao = state_row("", "AAL1", T0, 1.0, 2.0, 0.0, 0.0, 0.0);
    no_icao[0] = Value::Null;
    let mut no_coords = state_row("deed01", "AAL2", T0, 1.0, 2.0, 0.0, 0.0, 0.0);
    no_coords[5] = Value::Null;
    let good = state_row("deed02", "AAL3", T0, 1.0, 2.0, 0.0, 0.0, 0.0);

    store
        .upsert_states_at(&[no_icao, no_coords, good], T0)
        .await
        .unwrap();

    let current = store.current_all_at(T0).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].icao24, "deed02");
}

#[tokio::test]
async fn now_view_tracks_greatest_timestamp() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 100.0, 0.0, 500.0)], T0)
        .await
        .unwrap();
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0 + 60, 1.1, 2.1, 100.0, 0.0, 600.0)], T0 + 60)
        .await
        .unwrap();

    let current = store.current_all_at(T0 + 60).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].ts, T0 + 60);
    assert_eq!(current[0].lon, 1.1);
}

// =============================================================================
// RETENTION
// =============================================================================

#[tokio::test]
async fn track_returns_history_ascending_then_expires_with_retention() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 0.0, 0.0, 0.0)], T0)
        .await
        .unwrap();
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0 + 60, 1.1, 2.1, 0.0, 0.0, 0.0)], T0 + 60)
        .await
        .unwrap();

    let (points, icao) = store
        .track_by_callsign_at("XYZ", 0, T0 + 120)
        .await
        .unwrap()
        .expect("mapping should resolve");
    assert_eq!(icao, "deadbe");
    assert_eq!(points.len(), 2);
    assert!(points[0].ts < points[1].ts, "ascending time order");

    // Past the first point's retention only the second survives.
    let mid = T0 + as_secs(RETENTION) + 1;
    let (points, _) = store.track_by_callsign_at("XYZ", 0, mid).await.unwrap().unwrap();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].ts, T0 + 60);

    // Past both retentions everything, including the mapping, is gone.
    let late = T0 + 60 + as_secs(RETENTION) + 1;
    assert!(store.track_by_callsign_at("XYZ", 0, late).await.unwrap().is_none());
    assert!(store.latest_by_callsign_at("XYZ", late).await.unwrap().is_none());
}

#[tokio::test]
async fn track_limit_caps_point_count() {
    let store = test_store().await;
    for i in 0..5 {
        store
            .upsert_states_at(&[state_row("deadbe", "XYZ", T0 + i, 1.0, 2.0, 0.0, 0.0, 0.0)], T0 + i)
            .await
            .unwrap();
    }
    let (points, _) = store.track_by_callsign_at("XYZ", 3, T0 + 10).await.unwrap().unwrap();
    assert_eq!(points.len(), 3);
    assert_eq!(points[0].ts, T0, "limit truncates from the tail, not the head");
}

#[tokio::test]
async fn sweeper_deletes_expired_rows() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 0.0, 0.0, 0.0)], T0)
        .await
        .unwrap();

    // Nothing has lapsed yet.
    assert_eq!(store.sweep_expired_at(T0 + 30).await.unwrap(), 0);

    // now: entry lapses after its short TTL.
    assert_eq!(store.sweep_expired_at(T0 + 61).await.unwrap(), 1);

    // Everything is gone after retention (pos + two callsign mappings:
    // XYZ has no airline prefix match, so just pos + map).
    let removed = store.sweep_expired_at(T0 + as_secs(RETENTION) + 1).await.unwrap();
    assert_eq!(removed, 2);
}

// =============================================================================
// TOUCH-NOW
// =============================================================================

#[tokio::test]
async fn touch_now_extends_current_view_without_changing_values() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 50.0, 10.0, 900.0)], T0)
        .await
        .unwrap();

    // The now entry would lapse at T0+60; extend it during backoff.
    store.touch_now_at(Duration::from_secs(300), T0 + 30).await.unwrap();

    let current = store.current_all_at(T0 + 200).await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].speed, 50.0, "value untouched");

    assert!(store.current_all_at(T0 + 331).await.unwrap().is_empty());
}

#[tokio::test]
async fn touch_now_zero_ttl_uses_default() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 0.0, 0.0, 0.0)], T0)
        .await
        .unwrap();
    store.touch_now_at(Duration::ZERO, T0 + 30).await.unwrap();

    assert_eq!(store.current_all_at(T0 + 89).await.unwrap().len(), 1);
    assert!(store.current_all_at(T0 + 91).await.unwrap().is_empty());
}

#[tokio::test]
async fn touch_now_does_not_resurrect_expired_entries() {
    let store = test_store().await;
    store
        .upsert_states_at(&[state_row("deadbe", "XYZ", T0, 1.0, 2.0, 0.0, 0.0, 0.0)], T0)
        .await
        .unwrap();

    store.touch_now_at(Duration::from_secs(600), T0 + 61).await.unwrap();
    assert!(store.current_all_at(T0 + 62).await.unwrap().is_empty());
}

// =============================================================================
// REBUILD
// =============================================================================

#[tokio::test]
async fn rebuild_restores_now_view_and_mappings_from_history() {
    let store = test_store().await;
    store
        .upsert_states_at(
            &[
                state_row("aaaaaa", "AAL100", T0, 1.0, 1.0, 0.0, 0.0, 0.0),
                state_row("bbbbbb", "BAW200", T0, 2.0, 2.0, 0.0, 0.0, 0.0),
            ],
            T0,
        )
        .await
        .unwrap();
    store
        .upsert_states_at(&[state_row("aaaaaa", "AAL100", T0 + 30, 1.5, 1.5, 0.0, 0.0, 0.0)], T0 + 30)
        .await
        .unwrap();

    // Let the short-TTL now view lapse, as it would across a restart.
    let restart = T0 + 300;
    assert!(store.current_all_at(restart).await.unwrap().is_empty());

    store.rebuild_now_at(restart).await.unwrap();

    let mut current = store.current_all_at(restart).await.unwrap();
    current.sort_by(|a, b| a.icao24.cmp(&b.icao24));
    assert_eq!(current.len(), 2);
    assert_eq!(current[0].icao24, "aaaaaa");
    assert_eq!(current[0].ts, T0 + 30, "argmax-by-ts per icao");
    assert_eq!(current[1].icao24, "bbbbbb");

    // Mappings come back too, including the IATA alternate.
    let p = store.latest_by_callsign_at("AA100", restart).await.unwrap().unwrap();
    assert_eq!(p.icao24, "aaaaaa");
}

#[tokio::test]
async fn rebuild_on_empty_history_is_a_no_op() {
    let store = test_store().await;
    store.rebuild_now_at(T0).await.unwrap();
    assert!(store.current_all_at(T0).await.unwrap().is_empty());
}

// =============================================================================
// BBOX + LANDED
// =============================================================================

/// Park an aircraft: several stationary samples spanning most of the
/// landed-heuristic window.
async fn park_aircraft(store: &Store, icao: &str, cs: &str, lon: f64, lat: f64, now: i64) {
    for age in [500i64, 300, 50] {
        let ts = now - age;
        store
            .upsert_states_at(&[state_row(icao, cs, ts, lon, lat, 0.0, 0.0, 100.0)], ts)
            .await
            .unwrap();
    }
    store.touch_now_at(Duration::from_secs(600), now).await.unwrap();
}

#[tokio::test]
async fn landed_when_stationary_over_window() {
    let store = test_store().await;
    park_aircraft(&store, "deadbe", "XYZ", 10.0, 50.0, T0).await;
    assert!(store.is_landed_within_at("deadbe", Duration::from_secs(600), T0).await.unwrap());
}

#[tokio::test]
async fn not_landed_when_moving_or_history_too_short() {
    let store = test_store().await;

    // Fast latest sample.
    for (ts, speed) in [(T0 - 500, 0.0), (T0 - 50, 80.0)] {
        store
            .upsert_states_at(&[state_row("aaaa01", "A", ts, 10.0, 50.0, speed, 0.0, 100.0)], ts)
            .await
            .unwrap();
    }
    assert!(!store.is_landed_within_at("aaaa01", Duration::from_secs(600), T0).await.unwrap());

    // Large displacement (~1 degree of latitude is ~111 km).
    store
        .upsert_states_at(&[state_row("aaaa02", "B", T0 - 500, 10.0, 50.0, 0.0, 0.0, 100.0)], T0 - 500)
        .await
        .unwrap();
    store
        .upsert_states_at(&[state_row("aaaa02", "B", T0 - 50, 10.0, 51.0, 0.0, 0.0, 100.0)], T0 - 50)
        .await
        .unwrap();
    assert!(!store.is_landed_within_at("aaaa02", Duration::from_secs(600), T0).await.unwrap());

    // Span below half the window is insufficient history.
    for ts in [T0 - 200, T0 - 50] {
        store
            .upsert_states_at(&[state_row("aaaa03", "C", ts, 10.0, 50.0, 0.0, 0.0, 100.0)], ts)
            .await
            .unwrap();
    }
    assert!(!store.is_landed_within_at("aaaa03", Duration::from_secs(600), T0).await.unwrap());

    // A single sample can never be landed.
    store
        .upsert_states_at(&[state_row("aaaa04", "D", T0 - 50, 10.0, 50.0, 0.0, 0.0, 100.0)], T0 - 50)
        .await
        .unwrap();
    assert!(!store.is_landed_within_at("aaaa04", Duration::from_secs(600), T0).await.unwrap());
}

#[tokio::test]
async fn bbox_includes_boundary_points_and_drops_landed() {
    let store = test_store().await;

    // In flight, exactly on the min-lon boundary.
    store
        .upsert_states_at(&[state_row("f11911", "EDGE", T0 - 10, -10.0, 0.0, 200.0, 0.0, 9000.0)], T0 - 10)
        .await
        .unwrap();
    // In flight, outside the box.
    store
        .upsert_states_at(&[state_row("f11912", "OUT", T0 - 10, 20.0, 0.0, 200.0, 0.0, 9000.0)], T0 - 10)
        .await
        .unwrap();
    // Parked inside the box.
    park_aircraft(&store, "f11913", "PARKED", 0.0, 0.0, T0).await;

    let mut in_box = store
        .current_in_bbox_at(-10.0, -5.0, 10.0, 5.0, T0)
        .await
        .unwrap();
    in_box.sort_by(|a, b| a.icao24.cmp(&b.icao24));
    assert_eq!(in_box.len(), 1, "boundary point kept, outside and landed dropped");
    assert_eq!(in_box[0].icao24, "f11911");

    // current_all applies no landed filter.
    let all = store.current_all_at(T0).await.unwrap();
    assert!(all.iter().any(|p| p.icao24 == "f11913"));
}

// =============================================================================
// RECENT TRACK
// =============================================================================

#[tokio::test]
async fn recent_track_windows_and_orders_chronologically() {
    let store = test_store().await;
    let window = Duration::from_secs(2700);
    for age in [3000i64, 2700, 1000, 100] {
        let ts = T0 - age;
        store
            .upsert_states_at(&[state_row("deadbe", "XYZ", ts, 1.0, 2.0, 0.0, 0.0, 0.0)], ts)
            .await
            .unwrap();
    }

    let points = store
        .recent_track_by_icao_at("deadbe", 24, window, T0)
        .await
        .unwrap();
    let ages: Vec<i64> = points.iter().map(|p| T0 - p.ts).collect();
    assert_eq!(ages, vec![2700, 1000, 100], "window boundary is inclusive, order chronological");
}

#[tokio::test]
async fn recent_track_limit_keeps_newest_points() {
    let store = test_store().await;
    for age in [900i64, 600, 300] {
        let ts = T0 - age;
        store
            .upsert_states_at(&[state_row("deadbe", "XYZ", ts, 1.0, 2.0, 0.0, 0.0, 0.0)], ts)
            .await
            .unwrap();
    }
    let points = store
        .recent_track_by_icao_at("deadbe", 2, Duration::from_secs(2700), T0)
        .await
        .unwrap();
    let ages: Vec<i64> = points.iter().map(|p| T0 - p.ts).collect();
    assert_eq!(ages, vec![600, 300]);
}

#[tokio::test]
async fn recent_track_unknown_icao_is_empty() {
    let store = test_store().await;
    assert!(store
        .recent_track_by_icao_at("nobody", 24, Duration::from_secs(2700), T0)
        .await
        .unwrap()
        .is_empty());
}

// =============================================================================
// NORMALISATION HELPERS
// =============================================================================

#[test]
fn state_row_timestamp_fallback_chain() {
    // last_contact (4) wins when positive.
    let mut row = state_row("abc123", "X", 500, 1.0, 2.0, 0.0, 0.0, 0.0);
    row[3] = json!(400);
    assert_eq!(normalize_state_row(&row, 900).unwrap().ts, 500);

    // Zero last_contact falls back to time_position (3).
    row[4] = json!(0);
    assert_eq!(normalize_state_row(&row, 900).unwrap().ts, 400);

    // Neither present: current time.
    row[3] = Value::Null;
    assert_eq!(normalize_state_row(&row, 900).unwrap().ts, 900);
}

#[test]
fn state_row_prefers_geo_altitude_and_coerces_negatives() {
    let mut row = state_row("abc123", "X", 500, 1.0, 2.0, -3.0, 0.0, 11000.0);
    row[7] = json!(10000.0);
    let p = normalize_state_row(&row, 900).unwrap();
    assert_eq!(p.alt, 11000.0, "geo altitude preferred over baro");
    assert_eq!(p.speed, 0.0, "negative speed coerced to 0");

    row[13] = Value::Null;
    assert_eq!(normalize_state_row(&row, 900).unwrap().alt, 10000.0);

    row[7] = json!(-250.0);
    assert_eq!(normalize_state_row(&row, 900).unwrap().alt, 0.0);
}

#[test]
fn state_row_clamps_coordinates_and_wraps_track() {
    let mut row = state_row("abc123", "X", 500, 200.0, -95.0, 0.0, -90.0, 0.0);
    let p = normalize_state_row(&row, 900).unwrap();
    assert_eq!(p.lon, 180.0);
    assert_eq!(p.lat, -90.0);
    assert_eq!(p.track, 270.0);

    row[10] = json!(360.0);
    assert_eq!(normalize_state_row(&row, 900).unwrap().track, 0.0);
}

#[test]
fn state_row_requires_coordinates() {
    let mut row = state_row("abc123", "X", 500, 1.0, 2.0, 0.0, 0.0, 0.0);
    row[6] = Value::Null;
    assert!(normalize_state_row(&row, 900).is_none());
    assert!(normalize_state_row(&[], 900).is_none(), "short rows are skipped");
}

#[test]
fn haversine_one_degree_of_latitude() {
    let d = haversine_meters(0.0, 0.0, 1.0, 0.0);
    assert!((d - 111_195.0).abs() < 100.0, "got {d}");
}

#[test]
fn prefix_end_increments_final_byte() {
    assert_eq!(prefix_end("now:"), "now;");
    assert_eq!(prefix_end("pos:abc123:"), "pos:abc123;");
}

#[test]
fn icao_extraction_from_pos_keys() {
    assert_eq!(icao_from_pos_key("pos:abc123:0001000000"), Some("abc123"));
    assert_eq!(icao_from_pos_key("pos::0001000000"), None);
    assert_eq!(icao_from_pos_key("now:abc123"), None);
}
