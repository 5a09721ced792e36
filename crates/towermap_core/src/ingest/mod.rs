//! External source ingestion pipeline.
//!
//! # Responsibility
//! - Define the parsed-candidate shape and the per-source adapter contract.
//! - Run one import batch: parse, suppress within-file duplicates, match
//!   each candidate against nearby stored markers, and count outcomes.
//!
//! # Invariants
//! - Every created marker carries the source name as `author` and one
//!   `create` audit entry attributed to the source actor.
//! - A candidate that fails to persist is logged and counted, never fatal
//!   to the rest of the batch.
//! - Candidates are processed in file order, so earlier rows of a batch
//!   can absorb later ones through the proximity match.

pub mod dedup;
pub mod sources;

use crate::model::marker::TagDetail;
use crate::repo::audit_repo::AuditRepository;
use crate::repo::marker_repo::{MarkerRepository, RepoError};
use dedup::{DedupMatcher, MatchOutcome};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug)]
pub enum IngestError {
    Io(std::io::Error),
    Csv(csv::Error),
    Repo(RepoError),
}

impl Display for IngestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "source file read failed: {err}"),
            Self::Csv(err) => write!(f, "source file parse failed: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for IngestError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Csv(err) => Some(err),
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for IngestError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<csv::Error> for IngestError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<RepoError> for IngestError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// One parsed row from a source file, normalized to WGS84 and the marker
/// field vocabulary but not yet matched against the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub tag_details: BTreeMap<String, TagDetail>,
    pub locality: Option<String>,
    pub frequencies: Option<String>,
    /// Within-file duplicate key; rows repeating an already-seen key are
    /// dropped before matching.
    pub source_key: Option<String>,
}

impl Candidate {
    /// Creates an empty candidate at the given position.
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            name: None,
            description: None,
            tags: Vec::new(),
            tag_details: BTreeMap::new(),
            locality: None,
            frequencies: None,
            source_key: None,
        }
    }
}

/// What to do when a candidate lands within the dedup radius of a stored
/// marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePolicy {
    /// Drop the candidate.
    SkipNearby,
    /// Append the candidate's `Provider:` token to the nearby marker's
    /// description when it is not already listed.
    AppendProvider,
    /// Union the candidate's tags and tag details into the nearby marker.
    MergeTagDetails,
}

/// Declarative description of one import source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    /// Source identifier. Doubles as the audit actor username and as the
    /// `author` value on markers created from this source.
    pub name: String,
    pub dedup_radius_m: f64,
    pub policy: ReconcilePolicy,
    /// Run a store-wide merge scan at `dedup_radius_m` after the batch.
    pub post_import_scan: bool,
}

/// File-format adapter for one external source.
///
/// Object-safe so the CLI can dispatch over `Box<dyn SourceAdapter>`.
pub trait SourceAdapter {
    fn profile(&self) -> &SourceProfile;
    /// Parses the whole file into candidates, in file order. Rows that
    /// cannot be used are logged and dropped, not errors.
    fn read(&self, path: &Path) -> IngestResult<Vec<Candidate>>;
}

/// Outcome counters for one import batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub parsed: usize,
    pub created: usize,
    pub reconciled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Runs one import batch end to end.
///
/// # Side effects
/// - Creates the source actor row on first use.
/// - Emits `import` logging events with duration and outcome counters.
pub fn run_import<M, A, S>(
    markers: &M,
    audit: &A,
    source: &S,
    path: &Path,
) -> IngestResult<ImportReport>
where
    M: MarkerRepository,
    A: AuditRepository,
    S: SourceAdapter + ?Sized,
{
    let profile = source.profile();
    let started_at = Instant::now();
    info!(
        "event=import module=ingest status=start source={} file={}",
        profile.name,
        path.display()
    );

    let candidates = source.read(path)?;
    let actor = audit.ensure_actor(&profile.name)?;
    let matcher = DedupMatcher::new(markers, audit, profile, actor);

    let mut report = ImportReport {
        parsed: candidates.len(),
        ..ImportReport::default()
    };
    let mut seen_keys: HashSet<&str> = HashSet::new();

    for candidate in &candidates {
        if let Some(key) = candidate.source_key.as_deref() {
            if !seen_keys.insert(key) {
                report.skipped += 1;
                continue;
            }
        }
        match matcher.process(candidate) {
            Ok(MatchOutcome::Created(_)) => report.created += 1,
            Ok(MatchOutcome::Reconciled(_)) => report.reconciled += 1,
            Ok(MatchOutcome::Skipped) => report.skipped += 1,
            Err(err) => {
                error!(
                    "event=import module=ingest status=error source={} error_code=candidate_failed error={}",
                    profile.name, err
                );
                report.failed += 1;
            }
        }
    }

    info!(
        "event=import module=ingest status=ok source={} duration_ms={} parsed={} created={} reconciled={} skipped={} failed={}",
        profile.name,
        started_at.elapsed().as_millis(),
        report.parsed,
        report.created,
        report.reconciled,
        report.skipped,
        report.failed
    );
    Ok(report)
}
