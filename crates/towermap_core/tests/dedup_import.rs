use std::path::Path;
use towermap_core::db::open_db_in_memory;
use towermap_core::ingest::IngestResult;
use towermap_core::{
    run_import, AuditAction, AuditRepository, Candidate, MarkerRepository, ReconcilePolicy,
    SourceAdapter, SourceProfile, SqliteAuditRepository, SqliteMarkerRepository, TagDetail,
};

/// Adapter stub that replays a fixed candidate list.
struct FixedAdapter {
    profile: SourceProfile,
    candidates: Vec<Candidate>,
}

impl FixedAdapter {
    fn new(policy: ReconcilePolicy, radius_m: f64, candidates: Vec<Candidate>) -> Self {
        Self {
            profile: SourceProfile {
                name: "Test Source".to_string(),
                dedup_radius_m: radius_m,
                policy,
                post_import_scan: false,
            },
            candidates,
        }
    }
}

impl SourceAdapter for FixedAdapter {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    fn read(&self, _path: &Path) -> IngestResult<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

// ~5 m of latitude.
const FIVE_METERS_LAT: f64 = 5.0 / 111_320.0;

#[test]
fn candidates_five_meters_apart_coalesce_at_radius_ten() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let adapter = FixedAdapter::new(
        ReconcilePolicy::SkipNearby,
        10.0,
        vec![
            Candidate::at(45.0, 9.0),
            Candidate::at(45.0 + FIVE_METERS_LAT, 9.0),
        ],
    );
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.parsed, 2);
    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(markers.list_markers().unwrap().len(), 1);
}

#[test]
fn candidates_five_meters_apart_stay_separate_at_radius_three() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let adapter = FixedAdapter::new(
        ReconcilePolicy::SkipNearby,
        3.0,
        vec![
            Candidate::at(45.0, 9.0),
            Candidate::at(45.0 + FIVE_METERS_LAT, 9.0),
        ],
    );
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 2);
    assert_eq!(markers.list_markers().unwrap().len(), 2);
}

#[test]
fn created_markers_carry_source_author_and_one_create_entry() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut candidate = Candidate::at(45.0, 9.0);
    candidate.name = Some("Sito".to_string());
    candidate.tags = vec![" TV ".to_string(), "TV".to_string()];
    let adapter = FixedAdapter::new(ReconcilePolicy::SkipNearby, 10.0, vec![candidate]);
    run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    let stored = markers.list_markers().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].author.as_deref(), Some("Test Source"));
    // Tags are normalized on create.
    assert_eq!(stored[0].tags, vec!["TV".to_string()]);

    let actor = audit.ensure_actor("Test Source").unwrap();
    let entries = audit.entries_for_marker(stored[0].id).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Create);
    assert_eq!(entries[0].user_id, Some(actor));
}

#[test]
fn repeated_source_keys_are_suppressed_within_one_batch() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut first = Candidate::at(45.0, 9.0);
    first.source_key = Some("site-1".to_string());
    // Same key, far away: suppressed by the key, not by proximity.
    let mut repeat = Candidate::at(46.0, 10.0);
    repeat.source_key = Some("site-1".to_string());

    let adapter = FixedAdapter::new(ReconcilePolicy::SkipNearby, 10.0, vec![first, repeat]);
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(markers.list_markers().unwrap().len(), 1);
}

#[test]
fn append_provider_joins_tokens_without_repeats() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut tim = Candidate::at(45.0, 9.0);
    tim.description = Some("Monte Alto | Provider:TIM".to_string());
    let mut vodafone = Candidate::at(45.0 + FIVE_METERS_LAT, 9.0);
    vodafone.description = Some("Monte Alto | Provider:Vodafone".to_string());
    let mut tim_again = Candidate::at(45.0, 9.0);
    tim_again.description = Some("Monte Alto | Provider:TIM".to_string());

    let adapter = FixedAdapter::new(
        ReconcilePolicy::AppendProvider,
        10.0,
        vec![tim, vodafone, tim_again],
    );
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.reconciled, 1);
    assert_eq!(report.skipped, 1);

    let stored = markers.list_markers().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].description.as_deref(),
        Some("Monte Alto | Provider:TIM | Provider:Vodafone")
    );
}

#[test]
fn append_provider_without_token_skips_the_candidate() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut base = Candidate::at(45.0, 9.0);
    base.description = Some("Monte Alto | Provider:TIM".to_string());
    let mut unlabeled = Candidate::at(45.0, 9.0);
    unlabeled.description = Some("Monte Alto".to_string());

    let adapter =
        FixedAdapter::new(ReconcilePolicy::AppendProvider, 10.0, vec![base, unlabeled]);
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.skipped, 1);
    let stored = markers.list_markers().unwrap();
    assert_eq!(
        stored[0].description.as_deref(),
        Some("Monte Alto | Provider:TIM")
    );
}

#[test]
fn merge_tag_details_unions_tags_and_per_tag_annotations() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut opnet = Candidate::at(46.0, 13.0);
    opnet.tags = vec!["Opnet".to_string()];
    opnet.tag_details.insert(
        "Opnet".to_string(),
        TagDetail {
            description: Some("Opnet".to_string()),
            frequencies: Some("3600 MHz".to_string()),
        },
    );
    let mut wisp = Candidate::at(46.0 + FIVE_METERS_LAT, 13.0);
    wisp.tags = vec!["WISP".to_string()];
    wisp.tag_details.insert(
        "WISP".to_string(),
        TagDetail {
            description: Some("Fastweb Air".to_string()),
            frequencies: None,
        },
    );

    let adapter = FixedAdapter::new(ReconcilePolicy::MergeTagDetails, 10.0, vec![opnet, wisp]);
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.reconciled, 1);

    let stored = markers.list_markers().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].tags,
        vec!["Opnet".to_string(), "WISP".to_string()]
    );
    assert_eq!(
        stored[0]
            .tag_details
            .get("WISP")
            .and_then(|d| d.description.as_deref()),
        Some("Fastweb Air")
    );
    assert_eq!(
        stored[0]
            .tag_details
            .get("Opnet")
            .and_then(|d| d.frequencies.as_deref()),
        Some("3600 MHz")
    );
}

#[test]
fn merge_tag_details_skips_when_nothing_changes() {
    let conn = open_db_in_memory().unwrap();
    let markers = SqliteMarkerRepository::try_new(&conn).unwrap();
    let audit = SqliteAuditRepository::try_new(&conn).unwrap();

    let mut first = Candidate::at(46.0, 13.0);
    first.tags = vec!["Opnet".to_string()];
    // Same tag, no annotations: reconciliation would be a no-op.
    let mut repeat = Candidate::at(46.0, 13.0);
    repeat.tags = vec!["Opnet".to_string()];

    let adapter = FixedAdapter::new(ReconcilePolicy::MergeTagDetails, 10.0, vec![first, repeat]);
    let report = run_import(&markers, &audit, &adapter, Path::new("unused")).unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.reconciled, 0);
    assert_eq!(report.skipped, 1);

    let stored = markers.list_markers().unwrap();
    let entries = audit.entries_for_marker(stored[0].id).unwrap();
    assert_eq!(entries.len(), 1, "no-op reconciliation must not audit");
}
