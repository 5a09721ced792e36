//! lteitaly.it cell-site dump adapter (`.ntm` line format).
//!
//! Lines are semicolon-delimited positional records: latitude in field 7,
//! longitude in field 8, and a whitespace-tokenized site descriptor in
//! field 9 whose tokens from the fourth onward form the site name. The
//! mobile network provider is not in the file at all; it is inferred from
//! the file name.

use crate::geo::convert::{normalize, CoordSystem};
use crate::ingest::{Candidate, IngestResult, ReconcilePolicy, SourceAdapter, SourceProfile};
use log::warn;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const SOURCE: &str = "https://lteitaly.it";
const SITE_TAG: &str = "LTE/5G";

/// File stem → provider label; stems not listed are uppercased as-is.
const PROVIDER_LABELS: &[(&str, &str)] = &[
    ("tim", "TIM"),
    ("vodafone", "Vodafone"),
    ("wind3", "Wind3"),
    ("iliad", "Iliad"),
];

pub struct LteItalyAdapter {
    profile: SourceProfile,
}

impl LteItalyAdapter {
    pub fn new() -> Self {
        Self {
            profile: SourceProfile {
                name: SOURCE.to_string(),
                dedup_radius_m: 25.0,
                policy: ReconcilePolicy::AppendProvider,
                post_import_scan: false,
            },
        }
    }
}

impl Default for LteItalyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for LteItalyAdapter {
    fn profile(&self) -> &SourceProfile {
        &self.profile
    }

    fn read(&self, path: &Path) -> IngestResult<Vec<Candidate>> {
        let provider = provider_from_path(path);
        let reader = BufReader::new(File::open(path)?);

        let mut candidates = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let parts: Vec<&str> = line.split(';').collect();
            if parts.len() < 10 {
                warn!(
                    "event=import_parse module=ingest status=skipped source={SOURCE} reason=short_line line={}",
                    index + 1
                );
                continue;
            }

            let point = match normalize(CoordSystem::Wgs84Decimal, parts[8], parts[7]) {
                Ok(point) => point,
                Err(err) => {
                    warn!(
                        "event=import_parse module=ingest status=skipped source={SOURCE} reason=bad_coordinates line={} error={}",
                        index + 1,
                        err
                    );
                    continue;
                }
            };

            let site_name = parts[9]
                .split_whitespace()
                .skip(3)
                .collect::<Vec<_>>()
                .join(" ");
            let key = format!("{},{}", point.lat, point.lng);

            let mut candidate = Candidate::at(point.lat, point.lng);
            candidate.name = Some(key.clone());
            candidate.description = Some(format!("{site_name} | Provider:{provider}"));
            candidate.tags = vec![SITE_TAG.to_string()];
            candidate.source_key = Some(key);
            candidates.push(candidate);
        }
        Ok(candidates)
    }
}

fn provider_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("")
        .to_lowercase();
    PROVIDER_LABELS
        .iter()
        .find(|(known, _)| *known == stem)
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| stem.to_uppercase())
}
