//! Marker repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide stable CRUD and proximity APIs over canonical `markers`
//!   storage, including owned image rows.
//! - Keep SQL and the tags/tag-details JSON encoding inside the
//!   persistence boundary.
//! - Apply whole-cluster merge mutations atomically.
//!
//! # Invariants
//! - Write paths must call `MarkerDraft::validate()` before SQL mutations.
//! - Radius results are ordered by (distance, id), nearest first.
//! - `apply_merge` commits survivor update, image replacement, audit
//!   repointing and absorbed-row deletion as one transaction.

use crate::db::DbError;
use crate::geo::{haversine_m, BoundingBox, GeoPoint};
use crate::model::marker::{
    ImageId, MarkerDraft, MarkerId, MarkerImage, MarkerRecord, MarkerValidationError, NewImage,
    TagDetail,
};
use crate::repo::{table_exists, table_has_column};
use rusqlite::{params, Connection, Row, Transaction, TransactionBehavior};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

const MARKER_SELECT_SQL: &str = "SELECT
    id,
    lat,
    lng,
    name,
    description,
    author,
    color,
    tags,
    tag_details,
    locality,
    frequencies,
    created_at
FROM markers";

pub type RepoResult<T> = Result<T, RepoError>;

/// Generic repository error for marker persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(MarkerValidationError),
    Db(DbError),
    NotFound(MarkerId),
    ImageNotFound(ImageId),
    TooManyImages(MarkerId),
    InvalidData(String),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "marker not found: {id}"),
            Self::ImageNotFound(id) => write!(f, "marker image not found: {id}"),
            Self::TooManyImages(id) => write!(f, "marker {id} already carries the maximum number of images"),
            Self::InvalidData(message) => write!(f, "invalid persisted marker data: {message}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{column}` in table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MarkerValidationError> for RepoError {
    fn from(value: MarkerValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Proximity query hit, ordered nearest first.
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyMarker {
    pub id: MarkerId,
    pub lat: f64,
    pub lng: f64,
    pub description: Option<String>,
    pub distance_m: f64,
}

/// Position snapshot row used by the cluster scanner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerPosition {
    pub id: MarkerId,
    pub lat: f64,
    pub lng: f64,
}

impl MarkerPosition {
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// Repository interface for marker persistence and proximity queries.
pub trait MarkerRepository {
    fn create_marker(&self, draft: &MarkerDraft) -> RepoResult<MarkerId>;
    /// Full-replacement update, images included.
    fn update_marker(&self, id: MarkerId, draft: &MarkerDraft) -> RepoResult<()>;
    fn get_marker(&self, id: MarkerId) -> RepoResult<Option<MarkerRecord>>;
    /// Loads the named markers preserving caller order; ids without a row
    /// are silently dropped.
    fn get_markers_by_ids(&self, ids: &[MarkerId]) -> RepoResult<Vec<MarkerRecord>>;
    fn list_markers(&self) -> RepoResult<Vec<MarkerRecord>>;
    fn delete_marker(&self, id: MarkerId) -> RepoResult<()>;
    /// All markers within `radius_m` of `center`, nearest first.
    fn find_within_radius(&self, center: GeoPoint, radius_m: f64) -> RepoResult<Vec<NearbyMarker>>;
    fn list_positions(&self) -> RepoResult<Vec<MarkerPosition>>;
    fn attach_image(&self, marker_id: MarkerId, image: &NewImage) -> RepoResult<ImageId>;
    /// Removes one image and returns the id of the marker that owned it.
    fn detach_image(&self, image_id: ImageId) -> RepoResult<MarkerId>;
    fn update_description(&self, id: MarkerId, description: Option<&str>) -> RepoResult<()>;
    fn update_tagging(
        &self,
        id: MarkerId,
        tags: &[String],
        tag_details: &BTreeMap<String, TagDetail>,
    ) -> RepoResult<()>;
    /// Applies a whole merge cluster in one transaction: optionally
    /// overwrite the survivor with aggregated fields and images, then for
    /// every absorbed id repoint its audit entries to the survivor, delete
    /// the row, and record one absorb entry on the survivor.
    fn apply_merge(
        &self,
        survivor: MarkerId,
        absorbed: &[MarkerId],
        fields: Option<&MarkerDraft>,
    ) -> RepoResult<()>;

    /// Nearest marker within `radius_m`, if any.
    fn nearest_within(&self, center: GeoPoint, radius_m: f64) -> RepoResult<Option<NearbyMarker>> {
        Ok(self.find_within_radius(center, radius_m)?.into_iter().next())
    }
}

/// SQLite-backed marker repository.
pub struct SqliteMarkerRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMarkerRepository<'conn> {
    /// Constructs a repository from a migrated/ready connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_marker_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl MarkerRepository for SqliteMarkerRepository<'_> {
    fn create_marker(&self, draft: &MarkerDraft) -> RepoResult<MarkerId> {
        draft.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO markers (
                lat,
                lng,
                name,
                description,
                author,
                color,
                tags,
                tag_details,
                locality,
                frequencies
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10);",
            params![
                draft.lat,
                draft.lng,
                draft.name.as_deref(),
                draft.description.as_deref(),
                draft.author.as_deref(),
                draft.color.as_deref(),
                tags_to_db(&draft.tags)?,
                tag_details_to_db(&draft.tag_details)?,
                draft.locality.as_deref(),
                draft.frequencies.as_deref(),
            ],
        )?;
        let marker_id = tx.last_insert_rowid();
        insert_images(&tx, marker_id, &draft.images)?;
        tx.commit()?;

        Ok(marker_id)
    }

    fn update_marker(&self, id: MarkerId, draft: &MarkerDraft) -> RepoResult<()> {
        draft.validate()?;

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE markers
             SET
                lat = ?1,
                lng = ?2,
                name = ?3,
                description = ?4,
                author = ?5,
                color = ?6,
                tags = ?7,
                tag_details = ?8,
                locality = ?9,
                frequencies = ?10
             WHERE id = ?11;",
            params![
                draft.lat,
                draft.lng,
                draft.name.as_deref(),
                draft.description.as_deref(),
                draft.author.as_deref(),
                draft.color.as_deref(),
                tags_to_db(&draft.tags)?,
                tag_details_to_db(&draft.tag_details)?,
                draft.locality.as_deref(),
                draft.frequencies.as_deref(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        tx.execute("DELETE FROM marker_images WHERE marker_id = ?1;", [id])?;
        insert_images(&tx, id, &draft.images)?;
        tx.commit()?;
        Ok(())
    }

    fn get_marker(&self, id: MarkerId) -> RepoResult<Option<MarkerRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MARKER_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            let mut marker = parse_marker_row(row)?;
            marker.images = load_images_for_marker(self.conn, marker.id)?;
            return Ok(Some(marker));
        }
        Ok(None)
    }

    fn get_markers_by_ids(&self, ids: &[MarkerId]) -> RepoResult<Vec<MarkerRecord>> {
        let mut markers = Vec::new();
        for &id in ids {
            if let Some(marker) = self.get_marker(id)? {
                markers.push(marker);
            }
        }
        Ok(markers)
    }

    fn list_markers(&self) -> RepoResult<Vec<MarkerRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{MARKER_SELECT_SQL} ORDER BY id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut markers = Vec::new();
        while let Some(row) = rows.next()? {
            let mut marker = parse_marker_row(row)?;
            marker.images = load_images_for_marker(self.conn, marker.id)?;
            markers.push(marker);
        }
        Ok(markers)
    }

    fn delete_marker(&self, id: MarkerId) -> RepoResult<()> {
        // Image rows cascade; audit references null out via FK actions.
        let changed = self
            .conn
            .execute("DELETE FROM markers WHERE id = ?1;", [id])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn find_within_radius(&self, center: GeoPoint, radius_m: f64) -> RepoResult<Vec<NearbyMarker>> {
        let bbox = BoundingBox::around(center, radius_m);
        let mut stmt = self.conn.prepare(
            "SELECT id, lat, lng, description
             FROM markers
             WHERE lat BETWEEN ?1 AND ?2
               AND lng BETWEEN ?3 AND ?4;",
        )?;
        let mut rows = stmt.query(params![
            bbox.min_lat,
            bbox.max_lat,
            bbox.min_lng,
            bbox.max_lng
        ])?;

        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let lat: f64 = row.get("lat")?;
            let lng: f64 = row.get("lng")?;
            let distance_m = haversine_m(center, GeoPoint::new(lat, lng));
            if distance_m <= radius_m {
                hits.push(NearbyMarker {
                    id: row.get("id")?,
                    lat,
                    lng,
                    description: row.get("description")?,
                    distance_m,
                });
            }
        }
        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    fn list_positions(&self) -> RepoResult<Vec<MarkerPosition>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, lat, lng FROM markers ORDER BY id ASC;")?;
        let mut rows = stmt.query([])?;
        let mut positions = Vec::new();
        while let Some(row) = rows.next()? {
            positions.push(MarkerPosition {
                id: row.get("id")?,
                lat: row.get("lat")?,
                lng: row.get("lng")?,
            });
        }
        Ok(positions)
    }

    fn attach_image(&self, marker_id: MarkerId, image: &NewImage) -> RepoResult<ImageId> {
        if image.url.trim().is_empty() {
            return Err(MarkerValidationError::BlankImageUrl.into());
        }
        if !marker_exists(self.conn, marker_id)? {
            return Err(RepoError::NotFound(marker_id));
        }

        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM marker_images WHERE marker_id = ?1;",
            [marker_id],
            |row| row.get(0),
        )?;
        if count as usize >= crate::model::marker::MAX_MARKER_IMAGES {
            return Err(RepoError::TooManyImages(marker_id));
        }

        self.conn.execute(
            "INSERT INTO marker_images (marker_id, url, caption) VALUES (?1, ?2, ?3);",
            params![marker_id, image.url.as_str(), image.caption.as_deref()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn detach_image(&self, image_id: ImageId) -> RepoResult<MarkerId> {
        let owner: Option<MarkerId> = self
            .conn
            .query_row(
                "SELECT marker_id FROM marker_images WHERE id = ?1;",
                [image_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        let Some(marker_id) = owner else {
            return Err(RepoError::ImageNotFound(image_id));
        };

        self.conn
            .execute("DELETE FROM marker_images WHERE id = ?1;", [image_id])?;
        Ok(marker_id)
    }

    fn update_description(&self, id: MarkerId, description: Option<&str>) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE markers SET description = ?1 WHERE id = ?2;",
            params![description, id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn update_tagging(
        &self,
        id: MarkerId,
        tags: &[String],
        tag_details: &BTreeMap<String, TagDetail>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE markers SET tags = ?1, tag_details = ?2 WHERE id = ?3;",
            params![tags_to_db(tags)?, tag_details_to_db(tag_details)?, id],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn apply_merge(
        &self,
        survivor: MarkerId,
        absorbed: &[MarkerId],
        fields: Option<&MarkerDraft>,
    ) -> RepoResult<()> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        match fields {
            Some(draft) => {
                draft.validate()?;
                let changed = tx.execute(
                    "UPDATE markers
                     SET
                        lat = ?1,
                        lng = ?2,
                        name = ?3,
                        description = ?4,
                        author = ?5,
                        color = ?6,
                        tags = ?7,
                        tag_details = ?8,
                        locality = ?9,
                        frequencies = ?10
                     WHERE id = ?11;",
                    params![
                        draft.lat,
                        draft.lng,
                        draft.name.as_deref(),
                        draft.description.as_deref(),
                        draft.author.as_deref(),
                        draft.color.as_deref(),
                        tags_to_db(&draft.tags)?,
                        tag_details_to_db(&draft.tag_details)?,
                        draft.locality.as_deref(),
                        draft.frequencies.as_deref(),
                        survivor,
                    ],
                )?;
                if changed == 0 {
                    return Err(RepoError::NotFound(survivor));
                }
                tx.execute(
                    "DELETE FROM marker_images WHERE marker_id = ?1;",
                    [survivor],
                )?;
                insert_images(&tx, survivor, &draft.images)?;
            }
            None => {
                if !marker_exists(&tx, survivor)? {
                    return Err(RepoError::NotFound(survivor));
                }
            }
        }

        for &absorbed_id in absorbed {
            if absorbed_id == survivor {
                continue;
            }
            // Repoint before delete so the FK null action never fires for
            // rows that must follow the survivor.
            tx.execute(
                "UPDATE audit_logs SET marker_id = ?1 WHERE marker_id = ?2;",
                params![survivor, absorbed_id],
            )?;
            let removed = tx.execute("DELETE FROM markers WHERE id = ?1;", [absorbed_id])?;
            if removed > 0 {
                tx.execute(
                    "INSERT INTO audit_logs (user_id, action, marker_id)
                     VALUES (NULL, 'update', ?1);",
                    [survivor],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

fn insert_images(tx: &Transaction<'_>, marker_id: MarkerId, images: &[NewImage]) -> RepoResult<()> {
    for image in images {
        tx.execute(
            "INSERT INTO marker_images (marker_id, url, caption) VALUES (?1, ?2, ?3);",
            params![marker_id, image.url.as_str(), image.caption.as_deref()],
        )?;
    }
    Ok(())
}

fn marker_exists(conn: &Connection, id: MarkerId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM markers WHERE id = ?1);",
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_marker_row(row: &Row<'_>) -> RepoResult<MarkerRecord> {
    Ok(MarkerRecord {
        id: row.get("id")?,
        lat: row.get("lat")?,
        lng: row.get("lng")?,
        name: row.get("name")?,
        description: row.get("description")?,
        author: row.get("author")?,
        color: row.get("color")?,
        tags: tags_from_db(row.get::<_, Option<String>>("tags")?),
        tag_details: tag_details_from_db(row.get::<_, Option<String>>("tag_details")?),
        locality: row.get("locality")?,
        frequencies: row.get("frequencies")?,
        created_at: row.get("created_at")?,
        images: Vec::new(),
    })
}

fn load_images_for_marker(conn: &Connection, marker_id: MarkerId) -> RepoResult<Vec<MarkerImage>> {
    let mut stmt = conn.prepare(
        "SELECT id, marker_id, url, caption
         FROM marker_images
         WHERE marker_id = ?1
         ORDER BY id ASC;",
    )?;
    let mut rows = stmt.query([marker_id])?;
    let mut images = Vec::new();
    while let Some(row) = rows.next()? {
        images.push(MarkerImage {
            id: row.get("id")?,
            marker_id: row.get("marker_id")?,
            url: row.get("url")?,
            caption: row.get("caption")?,
        });
    }
    Ok(images)
}

fn tags_to_db(tags: &[String]) -> RepoResult<Option<String>> {
    if tags.is_empty() {
        return Ok(None);
    }
    let encoded = serde_json::to_string(tags)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode tags: {err}")))?;
    Ok(Some(encoded))
}

/// Decodes the `tags` column. Legacy rows may hold a bare tag string
/// instead of a JSON array; those decode as a one-element list.
fn tags_from_db(raw: Option<String>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(text) => {
            serde_json::from_str::<Vec<String>>(&text).unwrap_or_else(|_| vec![text])
        }
    }
}

fn tag_details_to_db(details: &BTreeMap<String, TagDetail>) -> RepoResult<Option<String>> {
    if details.is_empty() {
        return Ok(None);
    }
    let encoded = serde_json::to_string(details)
        .map_err(|err| RepoError::InvalidData(format!("failed to encode tag details: {err}")))?;
    Ok(Some(encoded))
}

/// Decodes the `tag_details` column; undecodable text degrades to an empty
/// map rather than failing the whole read.
fn tag_details_from_db(raw: Option<String>) -> BTreeMap<String, TagDetail> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or_default()
}

fn ensure_marker_connection_ready(conn: &Connection) -> RepoResult<()> {
    for table in ["markers", "marker_images", "users", "audit_logs"] {
        if !table_exists(conn, table)? {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    for column in [
        "id",
        "lat",
        "lng",
        "name",
        "description",
        "author",
        "color",
        "tags",
        "tag_details",
        "locality",
        "frequencies",
        "created_at",
    ] {
        if !table_has_column(conn, "markers", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "markers",
                column,
            });
        }
    }

    for column in ["id", "marker_id", "url", "caption"] {
        if !table_has_column(conn, "marker_images", column)? {
            return Err(RepoError::MissingRequiredColumn {
                table: "marker_images",
                column,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{tag_details_from_db, tags_from_db, tags_to_db};

    #[test]
    fn tags_round_trip_and_tolerate_legacy_plain_strings() {
        let encoded = tags_to_db(&["LTE/5G".to_string(), "WISP".to_string()])
            .unwrap()
            .unwrap();
        assert_eq!(
            tags_from_db(Some(encoded)),
            vec!["LTE/5G".to_string(), "WISP".to_string()]
        );

        assert_eq!(
            tags_from_db(Some("Radio".to_string())),
            vec!["Radio".to_string()]
        );
        assert!(tags_from_db(None).is_empty());
    }

    #[test]
    fn empty_tags_encode_as_null() {
        assert_eq!(tags_to_db(&[]).unwrap(), None);
    }

    #[test]
    fn undecodable_tag_details_degrade_to_empty_map() {
        assert!(tag_details_from_db(Some("{not json".to_string())).is_empty());
        assert!(tag_details_from_db(None).is_empty());

        let decoded = tag_details_from_db(Some(
            r#"{"LTE/5G":{"description":"Opnet","frequencies":null}}"#.to_string(),
        ));
        assert_eq!(
            decoded.get("LTE/5G").and_then(|d| d.description.as_deref()),
            Some("Opnet")
        );
    }
}
