//! Marker domain model.
//!
//! # Responsibility
//! - Define the canonical transmission-site record and its image/tag shapes.
//! - Validate geographic range and structural invariants before persistence.
//!
//! # Invariants
//! - `lat` is within [-90, 90] and `lng` within [-180, 180] (WGS84 degrees).
//! - `tags` is an ordered set: insertion order preserved, no duplicates.
//! - `tag_details` keys are a subset of `tags`.
//! - A marker owns at most `MAX_MARKER_IMAGES` images.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stable row identifier for markers.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type MarkerId = i64;

/// Stable row identifier for marker images.
pub type ImageId = i64;

/// Stable row identifier for audit actors.
pub type UserId = i64;

/// Upper bound on images owned by one marker.
pub const MAX_MARKER_IMAGES: usize = 10;

/// Per-tag annotation carried alongside the marker's tag set.
///
/// Decoded from the `tag_details` JSON column strictly at the repository
/// boundary; the rest of the crate only sees this typed shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagDetail {
    /// Free text describing the tag for this specific site.
    #[serde(default)]
    pub description: Option<String>,
    /// Comma-separated frequency text, e.g. `"800 MHz, 1800 MHz"`.
    #[serde(default)]
    pub frequencies: Option<String>,
}

/// Stored image reference owned by exactly one marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerImage {
    pub id: ImageId,
    pub marker_id: MarkerId,
    pub url: String,
    pub caption: Option<String>,
}

/// Image payload for create/replace paths, before a row id exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub url: String,
    pub caption: Option<String>,
}

/// Write model for marker create/update and for merge aggregation output.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerDraft {
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Provenance string; import paths set the source identifier here.
    pub author: Option<String>,
    pub color: Option<String>,
    /// Ordered tag set, insertion order preserved.
    pub tags: Vec<String>,
    /// Per-tag annotations; keys must be a subset of `tags`.
    pub tag_details: BTreeMap<String, TagDetail>,
    pub locality: Option<String>,
    pub frequencies: Option<String>,
    pub images: Vec<NewImage>,
}

impl MarkerDraft {
    /// Creates an empty draft at the given position.
    pub fn at(lat: f64, lng: f64) -> Self {
        Self {
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
            images: Vec::new(),
        }
    }

    /// Checks every structural invariant listed in the module docs.
    ///
    /// # Errors
    /// - Position outside geographic range (NaN and infinities included).
    /// - More than `MAX_MARKER_IMAGES` images or an image with a blank URL.
    /// - Duplicate tag values or a tag-detail key without a matching tag.
    pub fn validate(&self) -> Result<(), MarkerValidationError> {
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(MarkerValidationError::LatitudeOutOfRange(self.lat));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(MarkerValidationError::LongitudeOutOfRange(self.lng));
        }
        if self.images.len() > MAX_MARKER_IMAGES {
            return Err(MarkerValidationError::TooManyImages(self.images.len()));
        }
        for image in &self.images {
            if image.url.trim().is_empty() {
                return Err(MarkerValidationError::BlankImageUrl);
            }
        }
        for (index, tag) in self.tags.iter().enumerate() {
            if self.tags[..index].contains(tag) {
                return Err(MarkerValidationError::DuplicateTag(tag.clone()));
            }
        }
        for tag in self.tag_details.keys() {
            if !self.tags.contains(tag) {
                return Err(MarkerValidationError::OrphanTagDetail(tag.clone()));
            }
        }
        Ok(())
    }
}

/// Read model for one stored marker with its owned images.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub id: MarkerId,
    pub lat: f64,
    pub lng: f64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    pub color: Option<String>,
    pub tags: Vec<String>,
    pub tag_details: BTreeMap<String, TagDetail>,
    pub locality: Option<String>,
    pub frequencies: Option<String>,
    /// Creation timestamp in epoch milliseconds.
    pub created_at: i64,
    pub images: Vec<MarkerImage>,
}

/// Structural validation failure for marker write models.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkerValidationError {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    TooManyImages(usize),
    BlankImageUrl,
    DuplicateTag(String),
    OrphanTagDetail(String),
}

impl Display for MarkerValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LatitudeOutOfRange(lat) => {
                write!(f, "latitude {lat} outside [-90, 90]")
            }
            Self::LongitudeOutOfRange(lng) => {
                write!(f, "longitude {lng} outside [-180, 180]")
            }
            Self::TooManyImages(count) => {
                write!(f, "marker carries {count} images, limit is {MAX_MARKER_IMAGES}")
            }
            Self::BlankImageUrl => write!(f, "image url cannot be blank"),
            Self::DuplicateTag(tag) => write!(f, "duplicate tag `{tag}`"),
            Self::OrphanTagDetail(tag) => {
                write!(f, "tag detail `{tag}` has no matching tag")
            }
        }
    }
}

impl Error for MarkerValidationError {}

/// Normalizes a raw tag list into an ordered set.
///
/// Values are trimmed, blanks dropped, and later duplicates removed while
/// the first-seen order is preserved. Case is kept as-is: tag labels such
/// as `LTE/5G` are display values, not identifiers.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut ordered = Vec::new();
    for tag in tags {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !ordered.iter().any(|existing: &String| existing == trimmed) {
            ordered.push(trimmed.to_string());
        }
    }
    ordered
}

/// Treats `None` and whitespace-only strings uniformly as absent.
///
/// The returned value keeps its original spelling; only the emptiness test
/// uses the trimmed form.
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{non_blank, normalize_tags, MarkerDraft, MarkerValidationError, NewImage, TagDetail};

    #[test]
    fn validate_rejects_out_of_range_positions() {
        let too_north = MarkerDraft::at(90.5, 0.0);
        assert!(matches!(
            too_north.validate(),
            Err(MarkerValidationError::LatitudeOutOfRange(_))
        ));

        let nan_lng = MarkerDraft::at(45.0, f64::NAN);
        assert!(matches!(
            nan_lng.validate(),
            Err(MarkerValidationError::LongitudeOutOfRange(_))
        ));
    }

    #[test]
    fn validate_rejects_orphan_tag_details() {
        let mut draft = MarkerDraft::at(45.0, 11.0);
        draft.tags = vec!["LTE/5G".to_string()];
        draft
            .tag_details
            .insert("WISP".to_string(), TagDetail::default());
        assert!(matches!(
            draft.validate(),
            Err(MarkerValidationError::OrphanTagDetail(tag)) if tag == "WISP"
        ));
    }

    #[test]
    fn validate_caps_image_count() {
        let mut draft = MarkerDraft::at(45.0, 11.0);
        draft.images = (0..11)
            .map(|idx| NewImage {
                url: format!("https://img.example/{idx}.jpg"),
                caption: None,
            })
            .collect();
        assert!(matches!(
            draft.validate(),
            Err(MarkerValidationError::TooManyImages(11))
        ));
    }

    #[test]
    fn normalize_tags_keeps_first_seen_order_and_case() {
        let raw = vec![
            " LTE/5G ".to_string(),
            "WISP".to_string(),
            "LTE/5G".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(
            normalize_tags(&raw),
            vec!["LTE/5G".to_string(), "WISP".to_string()]
        );
    }

    #[test]
    fn non_blank_treats_whitespace_as_absent() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" Monte Serra ")), Some(" Monte Serra "));
        assert_eq!(non_blank(None), None);
    }
}
