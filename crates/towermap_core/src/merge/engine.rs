//! Merge aggregation over groups of marker records.
//!
//! # Responsibility
//! - Decide the survivor of a merge group and aggregate the other records
//!   into it (position mean, text unions, tag/frequency accumulation).
//! - Hand the whole mutation to the repository as one atomic merge.
//!
//! # Invariants
//! - The survivor is the first record, in caller order, whose trimmed
//!   description was not already seen in the group.
//! - Records that no longer exist are dropped from the group silently;
//!   fewer than two loaded records means no merge happens at all.
//! - Absorbed rows are always deleted and their audit history repointed,
//!   even when duplicate descriptions leave a single aggregation source.

use crate::model::marker::{
    non_blank, MarkerDraft, MarkerId, MarkerRecord, NewImage, TagDetail, MAX_MARKER_IMAGES,
};
use crate::repo::marker_repo::{MarkerRepository, RepoError};
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MergeResult<T> = Result<T, MergeError>;

#[derive(Debug)]
pub enum MergeError {
    Repo(RepoError),
}

impl Display for MergeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MergeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
        }
    }
}

impl From<RepoError> for MergeError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Merge orchestrator bound to one marker repository.
pub struct MergeEngine<'a, M: MarkerRepository> {
    markers: &'a M,
}

impl<'a, M: MarkerRepository> MergeEngine<'a, M> {
    pub fn new(markers: &'a M) -> Self {
        Self { markers }
    }

    /// Merges the markers named by `ids` into a single survivor.
    ///
    /// Returns `Ok(None)` when fewer than two of the ids still resolve to
    /// stored rows, `Ok(Some(survivor))` otherwise.
    pub fn merge_markers(&self, ids: &[MarkerId]) -> MergeResult<Option<MarkerId>> {
        let loaded = self.markers.get_markers_by_ids(ids)?;
        if loaded.len() < 2 {
            debug!(
                "event=merge module=merge status=skipped reason=insufficient_markers requested={} loaded={}",
                ids.len(),
                loaded.len()
            );
            return Ok(None);
        }

        let sources = filter_duplicate_descriptions(&loaded);
        let survivor = sources[0].id;
        // A single source after description filtering still absorbs the
        // duplicates; it just keeps its own fields untouched.
        let fields = (sources.len() >= 2).then(|| aggregate_markers(&sources));

        let absorbed: Vec<MarkerId> = loaded
            .iter()
            .map(|record| record.id)
            .filter(|&id| id != survivor)
            .collect();

        self.markers
            .apply_merge(survivor, &absorbed, fields.as_ref())?;
        info!(
            "event=merge module=merge status=ok survivor={} absorbed={}",
            survivor,
            absorbed.len()
        );
        Ok(Some(survivor))
    }
}

/// Keeps the first record for every distinct trimmed description.
///
/// Records without a description all share the empty key, so at most one
/// of them survives the filter.
fn filter_duplicate_descriptions(records: &[MarkerRecord]) -> Vec<&MarkerRecord> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();
    for record in records {
        let key = record
            .description
            .as_deref()
            .unwrap_or("")
            .trim()
            .to_string();
        if seen.insert(key) {
            kept.push(record);
        }
    }
    kept
}

/// Builds the aggregated field set for a merge group.
///
/// Position is the arithmetic mean; text fields are first-seen unions of
/// non-blank values; tags keep first-seen order across all records.
fn aggregate_markers(records: &[&MarkerRecord]) -> MarkerDraft {
    let count = records.len() as f64;
    let lat = records.iter().map(|record| record.lat).sum::<f64>() / count;
    let lng = records.iter().map(|record| record.lng).sum::<f64>() / count;

    let mut draft = MarkerDraft::at(lat, lng);
    draft.name = join_unique(records.iter().map(|record| record.name.as_deref()), " / ");
    draft.description = join_unique(
        records.iter().map(|record| record.description.as_deref()),
        " | ",
    );
    draft.locality = join_unique(
        records.iter().map(|record| record.locality.as_deref()),
        " | ",
    );
    draft.author = first_non_blank(records.iter().map(|record| record.author.as_deref()));
    draft.color = first_non_blank(records.iter().map(|record| record.color.as_deref()));
    draft.frequencies = records.iter().fold(None, |acc: Option<String>, record| {
        union_frequency_tokens(acc.as_deref(), record.frequencies.as_deref())
    });

    for record in records {
        for tag in &record.tags {
            if !draft.tags.contains(tag) {
                draft.tags.push(tag.clone());
            }
        }
    }
    for record in records {
        accumulate_tag_details(&mut draft.tag_details, &record.tag_details);
    }

    draft.images = records
        .iter()
        .flat_map(|record| record.images.iter())
        .take(MAX_MARKER_IMAGES)
        .map(|image| NewImage {
            url: image.url.clone(),
            caption: image.caption.clone(),
        })
        .collect();

    draft
}

/// Folds one tag-detail map into an accumulator.
///
/// First sighting of a tag installs its detail with blank fields collapsed
/// to `None`. Later sightings concatenate descriptions with `" | "` (no
/// de-duplication) and union frequency tokens.
pub(crate) fn accumulate_tag_details(
    accumulator: &mut BTreeMap<String, TagDetail>,
    incoming: &BTreeMap<String, TagDetail>,
) {
    for (tag, detail) in incoming {
        match accumulator.get_mut(tag) {
            None => {
                accumulator.insert(
                    tag.clone(),
                    TagDetail {
                        description: non_blank(detail.description.as_deref()).map(str::to_string),
                        frequencies: non_blank(detail.frequencies.as_deref()).map(str::to_string),
                    },
                );
            }
            Some(existing) => {
                if let Some(text) = non_blank(detail.description.as_deref()) {
                    existing.description = match existing.description.as_deref() {
                        Some(current) => Some(format!("{current} | {text}")),
                        None => Some(text.to_string()),
                    };
                }
                existing.frequencies = union_frequency_tokens(
                    existing.frequencies.as_deref(),
                    detail.frequencies.as_deref(),
                );
            }
        }
    }
}

/// Unions two comma-separated frequency strings into an ordered token set.
pub(crate) fn union_frequency_tokens(
    existing: Option<&str>,
    incoming: Option<&str>,
) -> Option<String> {
    let mut tokens: Vec<String> = Vec::new();
    for source in [existing, incoming] {
        let Some(text) = source else { continue };
        for token in text.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            if !tokens.iter().any(|existing_token| existing_token == token) {
                tokens.push(token.to_string());
            }
        }
    }
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(", "))
    }
}

fn join_unique<'v>(
    values: impl Iterator<Item = Option<&'v str>>,
    separator: &str,
) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for value in values {
        let Some(text) = non_blank(value) else { continue };
        if !seen.contains(&text) {
            seen.push(text);
        }
    }
    if seen.is_empty() {
        None
    } else {
        Some(seen.join(separator))
    }
}

fn first_non_blank<'v>(values: impl Iterator<Item = Option<&'v str>>) -> Option<String> {
    values
        .into_iter()
        .find_map(|value| non_blank(value).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::{
        accumulate_tag_details, aggregate_markers, filter_duplicate_descriptions,
        union_frequency_tokens,
    };
    use crate::model::marker::{MarkerImage, MarkerRecord, TagDetail};
    use std::collections::BTreeMap;

    fn record(id: i64, lat: f64, lng: f64) -> MarkerRecord {
        MarkerRecord {
            id,
            lat,
            lng,
            name: None,
            description: None,
            author: None,
            color: None,
            tags: Vec::new(),
            tag_details: BTreeMap::new(),
            locality: None,
            frequencies: None,
            created_at: 0,
            images: Vec::new(),
        }
    }

    #[test]
    fn duplicate_descriptions_keep_only_the_first_record() {
        let mut a = record(1, 45.0, 11.0);
        a.description = Some("Monte Venda".to_string());
        let mut b = record(2, 45.0, 11.0);
        b.description = Some("  Monte Venda  ".to_string());
        let mut c = record(3, 45.0, 11.0);
        c.description = Some("Monte Grande".to_string());

        let records = [a, b, c];
        let kept = filter_duplicate_descriptions(&records);
        let ids: Vec<i64> = kept.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn blank_descriptions_collapse_into_one_survivor() {
        let a = record(1, 45.0, 11.0);
        let mut b = record(2, 45.0, 11.0);
        b.description = Some("   ".to_string());
        let records = [a, b];

        let kept = filter_duplicate_descriptions(&records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 1);
    }

    #[test]
    fn aggregation_means_position_and_unions_text_fields() {
        let mut a = record(1, 46.0, 13.0);
        a.name = Some("Sito A".to_string());
        a.description = Some("RAI".to_string());
        a.author = Some("ARPA FVG".to_string());
        a.frequencies = Some("800 MHz, 1800 MHz".to_string());
        a.tags = vec!["LTE/5G".to_string()];
        let mut b = record(2, 46.2, 13.4);
        b.name = Some("Sito B".to_string());
        b.description = Some("Mediaset".to_string());
        b.author = Some("https://lteitaly.it".to_string());
        b.locality = Some("Udine".to_string());
        b.frequencies = Some("1800 MHz, 2600 MHz".to_string());
        b.tags = vec!["TV".to_string(), "LTE/5G".to_string()];

        let draft = aggregate_markers(&[&a, &b]);
        assert!((draft.lat - 46.1).abs() < 1e-12);
        assert!((draft.lng - 13.2).abs() < 1e-12);
        assert_eq!(draft.name.as_deref(), Some("Sito A / Sito B"));
        assert_eq!(draft.description.as_deref(), Some("RAI | Mediaset"));
        assert_eq!(draft.locality.as_deref(), Some("Udine"));
        assert_eq!(draft.author.as_deref(), Some("ARPA FVG"));
        assert_eq!(
            draft.frequencies.as_deref(),
            Some("800 MHz, 1800 MHz, 2600 MHz")
        );
        assert_eq!(
            draft.tags,
            vec!["LTE/5G".to_string(), "TV".to_string()]
        );
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn aggregation_caps_combined_images() {
        let mut a = record(1, 45.0, 11.0);
        a.description = Some("a".to_string());
        let mut b = record(2, 45.0, 11.0);
        b.description = Some("b".to_string());
        for i in 0..7 {
            a.images.push(MarkerImage {
                id: i,
                marker_id: 1,
                url: format!("https://img.example/a{i}.jpg"),
                caption: None,
            });
            b.images.push(MarkerImage {
                id: 100 + i,
                marker_id: 2,
                url: format!("https://img.example/b{i}.jpg"),
                caption: None,
            });
        }

        let draft = aggregate_markers(&[&a, &b]);
        assert_eq!(draft.images.len(), 10);
        assert_eq!(draft.images[0].url, "https://img.example/a0.jpg");
        assert_eq!(draft.images[9].url, "https://img.example/b2.jpg");
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn tag_detail_descriptions_concatenate_without_dedup() {
        let mut acc = BTreeMap::new();
        acc.insert(
            "LTE/5G".to_string(),
            TagDetail {
                description: Some("Opnet".to_string()),
                frequencies: Some("3600 MHz".to_string()),
            },
        );

        let mut incoming = BTreeMap::new();
        incoming.insert(
            "LTE/5G".to_string(),
            TagDetail {
                description: Some("Opnet".to_string()),
                frequencies: Some("3600 MHz, 26 GHz".to_string()),
            },
        );
        incoming.insert(
            "WISP".to_string(),
            TagDetail {
                description: Some("  ".to_string()),
                frequencies: None,
            },
        );

        accumulate_tag_details(&mut acc, &incoming);
        let lte = acc.get("LTE/5G").unwrap();
        assert_eq!(lte.description.as_deref(), Some("Opnet | Opnet"));
        assert_eq!(lte.frequencies.as_deref(), Some("3600 MHz, 26 GHz"));

        let wisp = acc.get("WISP").unwrap();
        assert_eq!(wisp.description, None);
        assert_eq!(wisp.frequencies, None);
    }

    #[test]
    fn frequency_union_drops_blank_tokens() {
        assert_eq!(
            union_frequency_tokens(Some("800 MHz, , 1800 MHz"), Some("800 MHz")).as_deref(),
            Some("800 MHz, 1800 MHz")
        );
        assert_eq!(union_frequency_tokens(None, None), None);
        assert_eq!(
            union_frequency_tokens(None, Some("  ")).as_deref(),
            None
        );
    }
}
