//! ARPA Friuli Venezia Giulia site census adapter (CSV export).
//!
//! Coordinates are ETRS89 / UTM zone 33N eastings and northings and go
//! through the projection inverse; comma decimals are accepted. Operator
//! classification, activation date and altitude all fold into the marker
//! description, which is mirrored into per-tag details so later merges
//! keep the per-operator annotation.

use crate::geo::convert::{normalize, CoordSystem};
use crate::ingest::sources::{field, open_csv_reader};
use crate::ingest::{Candidate, IngestResult, ReconcilePolicy, SourceAdapter, SourceProfile};
use crate::model::marker::TagDetail;
use log::warn;
use std::path::Path;

const SOURCE: &str = "ARPA FVG";
const DEFAULT_RADIUS_M: f64 = 10.0;

/// `Gestore` (uppercased) → tags and replacement description.
const OPERATOR_RULES: &[(&str, &[&str], Option<&str>)] = &[
    ("RFI", &["Sconosciuto"], Some("Rete ferroviaria")),
    ("OPNET", &["Opnet"], Some("Opnet")),
    ("FASTWEB AIR", &["WISP"], Some("Fastweb Air")),
];

/// Operators excluded from the import entirely.
const SKIPPED_OPERATORS: &[&str] = &["3LETTRONICA INDUSTRIALE"];

pub struct ArpaFvgAdapter {
    profile: SourceProfile,
}

impl ArpaFvgAdapter {
    pub fn new() -> Self {
        Self::with_radius(DEFAULT_RADIUS_M)
    }

    /// Builds the adapter with a caller-chosen dedup radius; the same
    /// radius drives the post-import merge scan.
    pub fn with_radius(radius_m: f64) -> Self {
        Self {
            profile: SourceProfile {
                name: SOURCE.to_string(),
                dedup_radius_m: radius_m,
                policy: ReconcilePolicy::MergeTagDetails,
                post_import_scan: true,
            },
        }
    }
}

impl Default for ArpaFvgAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for ArpaFvgAdapter {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    fn read(&self, path: &Path) -> IngestResult<Vec<Candidate>> {
        let mut reader = open_csv_reader(path)?;
        let headers = reader.headers()?.clone();

        let mut candidates = Vec::new();
        for (index, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    warn!(
                        "event=import_parse module=ingest status=skipped source={SOURCE} reason=malformed_row row={} error={}",
                        index + 1,
                        err
                    );
                    continue;
                }
            };

            let operator = field(&headers, &record, "Gestore");
            let Some((tags, rule_description)) = classify(operator) else {
                continue;
            };

            let easting = field(&headers, &record, "Coord. X (ETRS89)");
            let northing = field(&headers, &record, "Coord. Y (ETRS89)");
            let (Some(easting), Some(northing)) = (easting, northing) else {
                warn!(
                    "event=import_parse module=ingest status=skipped source={SOURCE} reason=missing_coordinates row={}",
                    index + 1
                );
                continue;
            };
            let point = match normalize(CoordSystem::EtrsUtm33, easting, northing) {
                Ok(point) => point,
                Err(err) => {
                    warn!(
                        "event=import_parse module=ingest status=skipped source={SOURCE} reason=bad_coordinates row={} error={}",
                        index + 1,
                        err
                    );
                    continue;
                }
            };

            let mut description = rule_description;
            let mut extra: Vec<String> = Vec::new();
            if let Some(activated) = field(&headers, &record, "Data Attivazione") {
                extra.push(format!("Data attivazione: {activated}"));
            }
            if let Some(altitude) = field(&headers, &record, "Quota s.l.m. (ETRS89)") {
                extra.push(format!("Quota: {altitude} m"));
            }
            if !extra.is_empty() {
                let info = extra.join(" | ");
                description = Some(match description {
                    Some(existing) => format!("{existing} | {info}"),
                    None => info,
                });
            }

            let mut candidate = Candidate::at(point.lat, point.lng);
            candidate.name = field(&headers, &record, "ID Sito")
                .or_else(|| field(&headers, &record, "Codice Sito"))
                .or_else(|| field(&headers, &record, "feature_id"))
                .map(str::to_string)
                .or_else(|| Some(format!("{},{}", point.lat, point.lng)));
            candidate.locality = field(&headers, &record, "Comune").map(str::to_string);
            candidate.description = description.clone();
            for tag in &tags {
                candidate.tag_details.insert(
                    tag.clone(),
                    TagDetail {
                        description: description.clone(),
                        frequencies: None,
                    },
                );
            }
            candidate.tags = tags;
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

/// Maps the raw operator cell to tags plus a replacement description.
/// `None` drops the row.
fn classify(operator: Option<&str>) -> Option<(Vec<String>, Option<String>)> {
    let raw = operator.unwrap_or("");
    let key = raw.trim().to_uppercase();
    if SKIPPED_OPERATORS.contains(&key.as_str()) {
        return None;
    }
    if let Some((_, tags, description)) = OPERATOR_RULES.iter().find(|(known, _, _)| *known == key)
    {
        return Some((
            tags.iter().map(|tag| (*tag).to_string()).collect(),
            description.map(str::to_string),
        ));
    }
    let fallback = if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    };
    Some((vec!["Sconosciuto".to_string()], fallback))
}
