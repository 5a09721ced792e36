//! Marker use-case service.
//!
//! # Responsibility
//! - Provide the store boundary consumed by transport layers: marker CRUD,
//!   image attach/detach, explicit and store-wide merges, audit listing.
//! - Emit exactly one audit entry per mutation.
//!
//! # Invariants
//! - Every create/update/delete/attach/detach writes one audit entry; merge
//!   absorb entries are written inside the repository transaction instead.
//! - A delete entry carries a null marker id: the row is gone and the
//!   foreign key would null a dangling reference anyway.
//! - Service APIs never bypass repository validation contracts.

use crate::merge::engine::{MergeEngine, MergeError};
use crate::merge::scanner::ClusterScanner;
use crate::model::audit::{AuditAction, AuditLogEntry};
use crate::model::marker::{ImageId, MarkerDraft, MarkerId, MarkerRecord, NewImage, UserId};
use crate::repo::audit_repo::AuditRepository;
use crate::repo::marker_repo::{MarkerRepository, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for marker use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Target marker does not exist.
    MarkerNotFound(MarkerId),
    /// Target image does not exist.
    ImageNotFound(ImageId),
    /// Persistence-layer failure.
    Repo(RepoError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarkerNotFound(id) => write!(f, "marker not found: {id}"),
            Self::ImageNotFound(id) => write!(f, "marker image not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent marker state: {details}")
            }
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(id) => Self::MarkerNotFound(id),
            RepoError::ImageNotFound(id) => Self::ImageNotFound(id),
            other => Self::Repo(other),
        }
    }
}

impl From<MergeError> for ServiceError {
    fn from(value: MergeError) -> Self {
        match value {
            MergeError::Repo(err) => err.into(),
        }
    }
}

/// Marker service facade over repository implementations.
pub struct MarkerService<M: MarkerRepository, A: AuditRepository> {
    markers: M,
    audit: A,
}

impl<M: MarkerRepository, A: AuditRepository> MarkerService<M, A> {
    /// Creates a service using the provided repository implementations.
    pub fn new(markers: M, audit: A) -> Self {
        Self { markers, audit }
    }

    /// Lists all markers with their images, in id order.
    pub fn list_markers(&self) -> Result<Vec<MarkerRecord>, ServiceError> {
        Ok(self.markers.list_markers()?)
    }

    /// Gets one marker with its images.
    pub fn get_marker(&self, id: MarkerId) -> Result<Option<MarkerRecord>, ServiceError> {
        Ok(self.markers.get_marker(id)?)
    }

    /// Creates one marker with its images.
    pub fn create_marker(
        &self,
        actor: Option<UserId>,
        draft: &MarkerDraft,
    ) -> Result<MarkerRecord, ServiceError> {
        let marker_id = self.markers.create_marker(draft)?;
        self.audit
            .record(actor, AuditAction::Create, Some(marker_id))?;
        self.markers
            .get_marker(marker_id)?
            .ok_or(ServiceError::InconsistentState(
                "created marker not found in read-back",
            ))
    }

    /// Replaces a marker's fields and images wholesale.
    pub fn update_marker(
        &self,
        actor: Option<UserId>,
        id: MarkerId,
        draft: &MarkerDraft,
    ) -> Result<MarkerRecord, ServiceError> {
        self.markers.update_marker(id, draft)?;
        self.audit.record(actor, AuditAction::Update, Some(id))?;
        self.markers
            .get_marker(id)?
            .ok_or(ServiceError::InconsistentState(
                "updated marker not found in read-back",
            ))
    }

    /// Deletes a marker; owned images cascade and existing audit entries
    /// keep a nulled marker reference.
    pub fn delete_marker(&self, actor: Option<UserId>, id: MarkerId) -> Result<(), ServiceError> {
        self.markers.delete_marker(id)?;
        self.audit.record(actor, AuditAction::Delete, None)?;
        Ok(())
    }

    /// Attaches one image to a marker, enforcing the per-marker image cap.
    pub fn attach_image(
        &self,
        actor: Option<UserId>,
        marker_id: MarkerId,
        image: &NewImage,
    ) -> Result<ImageId, ServiceError> {
        let image_id = self.markers.attach_image(marker_id, image)?;
        self.audit
            .record(actor, AuditAction::Update, Some(marker_id))?;
        Ok(image_id)
    }

    /// Removes one image from whichever marker owns it.
    pub fn detach_image(
        &self,
        actor: Option<UserId>,
        image_id: ImageId,
    ) -> Result<(), ServiceError> {
        let owner = self.markers.detach_image(image_id)?;
        self.audit.record(actor, AuditAction::Update, Some(owner))?;
        Ok(())
    }

    /// Merges an explicit id list into one survivor.
    ///
    /// Returns `None` when fewer than two of the ids still exist.
    pub fn merge_markers(&self, ids: &[MarkerId]) -> Result<Option<MarkerId>, ServiceError> {
        let engine = MergeEngine::new(&self.markers);
        Ok(engine.merge_markers(ids)?)
    }

    /// Runs a store-wide merge scan and returns how many markers were
    /// eliminated.
    pub fn merge_nearby(&self, radius_m: f64) -> Result<u64, ServiceError> {
        let scanner = ClusterScanner::new(&self.markers);
        Ok(scanner.scan(radius_m)?)
    }

    /// Lists the most recent audit entries, newest first.
    pub fn list_audit_entries(&self, limit: u32) -> Result<Vec<AuditLogEntry>, ServiceError> {
        Ok(self.audit.list_recent(limit)?)
    }
}
