//! AGCOM broadcast-plant registry adapter (CSV export).
//!
//! Coordinates come as compact degree/minute/second cells (`41N2430`,
//! `12E3015`). The `TIPO` column classifies the plant by service prefix;
//! unmatched prefixes leave the marker untagged rather than dropping it.

use crate::geo::convert::{normalize, CoordSystem};
use crate::ingest::sources::{field, open_csv_reader};
use crate::ingest::{Candidate, IngestResult, ReconcilePolicy, SourceAdapter, SourceProfile};
use log::warn;
use std::path::Path;

const SOURCE: &str = "AGCOM";

/// `TIPO` prefix → tag label.
const SERVICE_TAGS: &[(&str, &str)] = &[("FM", "Radio"), ("RD", "Radio"), ("TD", "TV")];

pub struct AgcomAdapter {
    profile: SourceProfile,
}

impl AgcomAdapter {
    pub fn new() -> Self {
        Self {
            profile: SourceProfile {
                name: SOURCE.to_string(),
                dedup_radius_m: 30.0,
                policy: ReconcilePolicy::SkipNearby,
                post_import_scan: false,
            },
        }
    }
}

impl Default for AgcomAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for AgcomAdapter {
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

            let lat_raw = field(&headers, &record, "LAT.");
            let lng_raw = field(&headers, &record, "LONG.");
            let (Some(lat_raw), Some(lng_raw)) = (lat_raw, lng_raw) else {
                warn!(
                    "event=import_parse module=ingest status=skipped source={SOURCE} reason=missing_coordinates row={}",
                    index + 1
                );
                continue;
            };
            let point = match normalize(CoordSystem::CompactDms, lng_raw, lat_raw) {
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

            let bouquet = field(&headers, &record, "BOUQUET").map(str::to_string);
            let mut candidate = Candidate::at(point.lat, point.lng);
            candidate.name = bouquet.clone();
            candidate.description = bouquet;
            candidate.locality = field(&headers, &record, "UBICAZIONE").map(str::to_string);
            if let Some(tag) = field(&headers, &record, "TIPO").and_then(service_tag) {
                candidate.tags = vec![tag.to_string()];
            }
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

fn service_tag(raw: &str) -> Option<&'static str> {
    let value = raw.trim().to_uppercase();
    SERVICE_TAGS
        .iter()
        .find(|(prefix, _)| value.starts_with(prefix))
        .map(|(_, tag)| *tag)
}

#[cfg(test)]
mod tests {
    use super::service_tag;

    #[test]
    fn service_prefixes_map_to_tags() {
        assert_eq!(service_tag("FM"), Some("Radio"));
        assert_eq!(service_tag("rd-dab"), Some("Radio"));
        assert_eq!(service_tag("TD - DVB-T"), Some("TV"));
        assert_eq!(service_tag("SAT"), None);
    }
}
