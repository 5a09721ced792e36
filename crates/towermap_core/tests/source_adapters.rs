use std::fs;
use std::path::PathBuf;
use towermap_core::ingest::sources::agcom::AgcomAdapter;
use towermap_core::ingest::sources::aria_veneto::AriaVenetoAdapter;
use towermap_core::ingest::sources::arpa_fvg::ArpaFvgAdapter;
use towermap_core::ingest::sources::arpat_toscana::ArpatToscanaAdapter;
use towermap_core::ingest::sources::lte_italy::LteItalyAdapter;
use towermap_core::{haversine_m, GeoPoint, ReconcilePolicy, SourceAdapter};

fn write_fixture(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn lte_italy_parses_ntm_lines_and_infers_provider_from_filename() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "tim.ntm",
        "1;2;3;4;5;6;7;45.5;9.2;A B C Monte Alto\n\
         short;line\n\
         1;2;3;4;5;6;7;not-a-number;9.2;A B C D\n",
    );

    let adapter = LteItalyAdapter::new();
    assert_eq!(adapter.profile().policy, ReconcilePolicy::AppendProvider);

    let candidates = adapter.read(&path).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].lat, 45.5);
    assert_eq!(candidates[0].lng, 9.2);
    assert_eq!(
        candidates[0].description.as_deref(),
        Some("Monte Alto | Provider:TIM")
    );
    assert_eq!(candidates[0].tags, vec!["LTE/5G".to_string()]);
    assert_eq!(candidates[0].source_key.as_deref(), Some("45.5,9.2"));
}

#[test]
fn agcom_parses_compact_dms_cells_and_maps_service_tags() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "agcom.csv",
        "BOUQUET,UBICAZIONE,TIPO,LAT.,LONG.\n\
         Rai Mux A,MONTE CAVO,TD - DVB-T,41N2430,12E3015\n\
         Rete locale,NOWHERE,TD,bogus,coords\n",
    );

    let candidates = AgcomAdapter::new().read(&path).unwrap();
    assert_eq!(candidates.len(), 1);
    let expected_lat = 41.0 + 24.0 / 60.0 + 30.0 / 3600.0;
    let expected_lng = 12.0 + 30.0 / 60.0 + 15.0 / 3600.0;
    assert!((candidates[0].lat - expected_lat).abs() < 1e-9);
    assert!((candidates[0].lng - expected_lng).abs() < 1e-9);
    assert_eq!(candidates[0].name.as_deref(), Some("Rai Mux A"));
    assert_eq!(candidates[0].locality.as_deref(), Some("MONTE CAVO"));
    assert_eq!(candidates[0].tags, vec!["TV".to_string()]);
}

#[test]
fn arpat_toscana_classifies_by_tipologia_and_drops_broadcast_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "arpat.csv",
        "Nome,Gestore,Tipologia,Indirizzo,Nord,Est,Tecnologia\n\
         Monte Serra,Vodafone,Telefonia Mobile,Via Roma 1,\"43,77\",\"10,55\",LTE\n\
         Impianto RAI,RAI,Radio - TV,Via Po 2,\"43,0\",\"10,0\",DVB-T\n\
         Ponte radio,EOLO S.p.A.,-,Via Arno 3,\"43,5\",\"10,5\",FWA\n",
    );

    let candidates = ArpatToscanaAdapter::new().read(&path).unwrap();
    assert_eq!(candidates.len(), 2);

    assert_eq!(candidates[0].lat, 43.77);
    assert_eq!(candidates[0].lng, 10.55);
    assert_eq!(candidates[0].name.as_deref(), Some("Monte Serra"));
    assert_eq!(candidates[0].tags, vec!["LTE/5G".to_string()]);
    assert_eq!(candidates[0].locality.as_deref(), Some("Via Roma 1"));
    assert_eq!(candidates[0].frequencies.as_deref(), Some("LTE"));

    // The dashed-tipologia row falls back to the operator substring table.
    assert_eq!(candidates[1].tags, vec!["EOLO".to_string()]);
}

#[test]
fn aria_veneto_imports_only_classified_operators() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "aria.csv",
        "nome,gestore,coord_x,coord_y\n\
         Sito VR,Vodafone Italia S.p.A.,\"11,25\",\"45,43\"\n\
         Sito misterioso,Gestore Ignoto S.r.l.,\"11,0\",\"45,0\"\n",
    );

    let candidates = AriaVenetoAdapter::new().read(&path).unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].lat, 45.43);
    assert_eq!(candidates[0].lng, 11.25);
    assert_eq!(candidates[0].tags, vec!["LTE/5G".to_string()]);
    assert_eq!(
        candidates[0].description.as_deref(),
        Some("Sito VR - Vodafone Italia S.p.A.")
    );
}

#[test]
fn arpa_fvg_projects_utm_coordinates_and_builds_tag_details() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(
        &dir,
        "fvg.csv",
        "ID Sito,Gestore,Comune,Coord. X (ETRS89),Coord. Y (ETRS89),Data Attivazione,Quota s.l.m. (ETRS89)\n\
         FVG123,OPNET,Udine,360000,5102000,2020-01-01,320\n\
         FVG124,3lettronica industriale,Udine,360100,5102100,2021-05-05,250\n",
    );

    let adapter = ArpaFvgAdapter::new();
    assert!(adapter.profile().post_import_scan);

    let candidates = adapter.read(&path).unwrap();
    // The excluded operator row is dropped entirely.
    assert_eq!(candidates.len(), 1);

    let candidate = &candidates[0];
    let reference = GeoPoint::new(46.057_242_75, 13.190_091_31);
    assert!(haversine_m(GeoPoint::new(candidate.lat, candidate.lng), reference) < 1.0);
    assert_eq!(candidate.name.as_deref(), Some("FVG123"));
    assert_eq!(candidate.locality.as_deref(), Some("Udine"));
    assert_eq!(
        candidate.description.as_deref(),
        Some("Opnet | Data attivazione: 2020-01-01 | Quota: 320 m")
    );
    assert_eq!(candidate.tags, vec!["Opnet".to_string()]);
    assert_eq!(
        candidate
            .tag_details
            .get("Opnet")
            .and_then(|d| d.description.as_deref()),
        Some("Opnet | Data attivazione: 2020-01-01 | Quota: 320 m")
    );
}
