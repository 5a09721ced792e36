//! ARIA Veneto antenna registry adapter (CSV export).
//!
//! Coordinates are decimal WGS84 in `coord_y` (north) and `coord_x`
//! (east) with comma decimals. Only rows whose operator appears in the
//! classification table are imported; everything else in the registry is
//! out of scope for this map.

use crate::geo::convert::{normalize, CoordSystem};
use crate::ingest::sources::{field, open_csv_reader};
use crate::ingest::{Candidate, IngestResult, ReconcilePolicy, SourceAdapter, SourceProfile};
use log::warn;
use std::path::Path;

const SOURCE: &str = "ARIA Veneto";

/// Exact operator name → tag; operators not listed are skipped.
const OPERATOR_TAGS: &[(&str, &str)] = &[
    ("Telecom Italia S.p.A.", "LTE/5G"),
    ("Vodafone Italia S.p.A.", "LTE/5G"),
    ("Wind Tre S.p.A.", "LTE/5G"),
    ("Zefiro Net S.r.l.", "LTE/5G"),
    ("Iliad Italia S.p.A.", "LTE/5G"),
    ("American Forces Network South", "TV"),
    ("INFRACOM IT S.p.A.", "WISP"),
    ("Net Global S.r.l.", "WISP"),
    ("NETDISH S.p.A.", "WISP"),
    ("TRIVENET S.p.A.", "WISP"),
    ("Rete Ferroviaria Italiana S.p.A.", "Sconosciuto"),
];

pub struct AriaVenetoAdapter {
    profile: SourceProfile,
}

impl AriaVenetoAdapter {
    pub fn new() -> Self {
        Self {
            profile: SourceProfile {
                name: SOURCE.to_string(),
                dedup_radius_m: 20.0,
                policy: ReconcilePolicy::SkipNearby,
                post_import_scan: false,
            },
        }
    }
}

impl Default for AriaVenetoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for AriaVenetoAdapter {
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

            let lat_raw = field(&headers, &record, "coord_y");
            let lng_raw = field(&headers, &record, "coord_x");
            let (Some(lat_raw), Some(lng_raw)) = (lat_raw, lng_raw) else {
                warn!(
                    "event=import_parse module=ingest status=skipped source={SOURCE} reason=missing_coordinates row={}",
                    index + 1
                );
                continue;
            };
            let point = match normalize(CoordSystem::Wgs84Decimal, lng_raw, lat_raw) {
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

            let operator = field(&headers, &record, "gestore");
            let Some(tag) = operator.and_then(operator_tag) else {
                continue;
            };

            let name = field(&headers, &record, "nome");
            let description_parts: Vec<&str> =
                [name, operator].into_iter().flatten().collect();

            let mut candidate = Candidate::at(point.lat, point.lng);
            candidate.name = name.or(operator).map(str::to_string);
            candidate.description = if description_parts.is_empty() {
                None
            } else {
                Some(description_parts.join(" - "))
            };
            candidate.tags = vec![tag.to_string()];
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

fn operator_tag(operator: &str) -> Option<&'static str> {
    OPERATOR_TAGS
        .iter()
        .find(|(known, _)| *known == operator)
        .map(|(_, tag)| *tag)
}

#[cfg(test)]
mod tests {
    use super::operator_tag;

    #[test]
    fn operator_table_matches_exact_names() {
        assert_eq!(operator_tag("Vodafone Italia S.p.A."), Some("LTE/5G"));
        assert_eq!(operator_tag("American Forces Network South"), Some("TV"));
        assert_eq!(operator_tag("TRIVENET S.p.A."), Some("WISP"));
        assert_eq!(
            operator_tag("Rete Ferroviaria Italiana S.p.A."),
            Some("Sconosciuto")
        );
        assert_eq!(operator_tag("Vodafone"), None);
    }
}
