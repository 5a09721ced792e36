use towermap_core::db::open_db_in_memory;
use towermap_core::{
    ClusterScanner, MarkerDraft, MarkerRepository, SqliteMarkerRepository,
};

// ~8 m of latitude.
const EIGHT_METERS_LAT: f64 = 8.0 / 111_320.0;

fn draft(lat: f64, lng: f64, description: &str) -> MarkerDraft {
    let mut draft = MarkerDraft::at(lat, lng);
    draft.description = Some(description.to_string());
    draft
}

#[test]
fn scan_merges_chained_markers_and_reports_eliminations() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();

    // A-B and B-C are within 10 m, A-C is not. The far marker stays alone.
    let id_a = markers.create_marker(&draft(46.0, 13.0, "a")).unwrap();
    markers
        .create_marker(&draft(46.0 + EIGHT_METERS_LAT, 13.0, "b"))
        .unwrap();
    markers
        .create_marker(&draft(46.0 + 2.0 * EIGHT_METERS_LAT, 13.0, "c"))
        .unwrap();
    let id_far = markers.create_marker(&draft(46.5, 13.0, "far")).unwrap();

    let eliminated = ClusterScanner::new(&markers).scan(10.0).unwrap();
    assert_eq!(eliminated, 2);

    let remaining = markers.list_markers().unwrap();
    let ids: Vec<i64> = remaining.iter().map(|marker| marker.id).collect();
    assert_eq!(ids, vec![id_a, id_far]);

    let survivor = &remaining[0];
    assert_eq!(survivor.description.as_deref(), Some("a | b | c"));
    // Aggregated position is the chain's mean.
    assert!((survivor.lat - (46.0 + EIGHT_METERS_LAT)).abs() < 1e-9);
}

#[test]
fn scan_is_idempotent_at_the_same_threshold() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();

    markers.create_marker(&draft(46.0, 13.0, "a")).unwrap();
    markers
        .create_marker(&draft(46.0 + EIGHT_METERS_LAT, 13.0, "b"))
        .unwrap();
    markers
        .create_marker(&draft(46.0 + 2.0 * EIGHT_METERS_LAT, 13.0, "c"))
        .unwrap();

    let scanner = ClusterScanner::new(&markers);
    let first = scanner.scan(10.0).unwrap();
    assert_eq!(first, 2);

    let second = scanner.scan(10.0).unwrap();
    assert_eq!(second, 0);
    assert_eq!(markers.list_markers().unwrap().len(), 1);
}

#[test]
fn scan_leaves_distant_markers_untouched() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();

    markers.create_marker(&draft(45.0, 9.0, "a")).unwrap();
    markers.create_marker(&draft(45.001, 9.0, "b")).unwrap();

    let eliminated = ClusterScanner::new(&markers).scan(10.0).unwrap();
    assert_eq!(eliminated, 0);
    assert_eq!(markers.list_markers().unwrap().len(), 2);
}

#[test]
fn scan_on_empty_store_is_a_no_op() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();

    assert_eq!(ClusterScanner::new(&markers).scan(25.0).unwrap(), 0);
}
