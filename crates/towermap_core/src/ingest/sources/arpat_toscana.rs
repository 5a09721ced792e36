//! ARPAT Toscana radio-installation census adapter (CSV export).
//!
//! Coordinates are decimal WGS84 in `Nord`/`Est` with an Italian comma
//! decimal separator. Classification works off the `Tipologia` column,
//! with operator-substring fallbacks when the census left it as `"-"`.

use crate::geo::convert::{normalize, CoordSystem};
use crate::ingest::sources::{field, open_csv_reader};
use crate::ingest::{Candidate, IngestResult, ReconcilePolicy, SourceAdapter, SourceProfile};
use log::warn;
use std::path::Path;

const SOURCE: &str = "ARPAT Toscana";

/// Operator substring → tags, applied when `Tipologia` is `"-"`.
const OPERATOR_TAGS: &[(&str, &str)] = &[
    ("eolo", "EOLO"),
    ("open fiber", "Openfiber"),
    ("opnet", "Opnet"),
];

pub struct ArpatToscanaAdapter {
    profile: SourceProfile,
}

impl ArpatToscanaAdapter {
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

impl Default for ArpatToscanaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for ArpatToscanaAdapter {
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

            let lat_raw = field(&headers, &record, "Nord");
            let lng_raw = field(&headers, &record, "Est");
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

            let operator = field(&headers, &record, "Gestore");
            let Some(tags) = classify(field(&headers, &record, "Tipologia"), operator) else {
                continue;
            };

            let locality = field(&headers, &record, "Indirizzo").map(str::to_string);
            let mut candidate = Candidate::at(point.lat, point.lng);
            candidate.name = field(&headers, &record, "Nome")
                .map(str::to_string)
                .or_else(|| locality.clone());
            candidate.description = operator.map(str::to_string);
            candidate.tags = tags;
            candidate.locality = locality;
            candidate.frequencies = field(&headers, &record, "Tecnologia").map(str::to_string);
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

/// Maps the census `Tipologia` (and operator, for the `"-"` rows) to tags.
/// `None` means the row is out of scope and gets dropped.
fn classify(tipologia: Option<&str>, operator: Option<&str>) -> Option<Vec<String>> {
    let kind = tipologia.unwrap_or("").trim().to_lowercase();
    match kind.as_str() {
        "telefonia mobile" => Some(vec!["LTE/5G".to_string()]),
        "radio - tv" => None,
        "altro" => Some(vec!["Sconosciuto".to_string(), "WISP".to_string()]),
        "-" => {
            let operator = operator.unwrap_or("").trim().to_lowercase();
            let tag = OPERATOR_TAGS
                .iter()
                .find(|(needle, _)| operator.contains(needle))
                .map(|(_, tag)| *tag)
                .unwrap_or("Sconosciuto");
            Some(vec![tag.to_string()])
        }
        _ => Some(vec!["Sconosciuto".to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::classify;

    #[test]
    fn tipologia_rules_classify_rows() {
        assert_eq!(
            classify(Some("Telefonia Mobile"), None),
            Some(vec!["LTE/5G".to_string()])
        );
        assert_eq!(classify(Some("Radio - TV"), Some("RAI")), None);
        assert_eq!(
            classify(Some("Altro"), None),
            Some(vec!["Sconosciuto".to_string(), "WISP".to_string()])
        );
        assert_eq!(
            classify(Some("-"), Some("EOLO S.p.A.")),
            Some(vec!["EOLO".to_string()])
        );
        assert_eq!(
            classify(Some("-"), Some("Open Fiber S.p.A.")),
            Some(vec!["Openfiber".to_string()])
        );
        assert_eq!(
            classify(Some("-"), Some("Acme")),
            Some(vec!["Sconosciuto".to_string()])
        );
        assert_eq!(
            classify(None, None),
            Some(vec!["Sconosciuto".to_string()])
        );
    }
}
