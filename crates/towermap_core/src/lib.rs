//! Core domain logic for TowerMap.
//! This crate is the single source of truth for business invariants.

pub mod db;
pub mod geo;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod model;
pub mod repo;
pub mod service;

pub use geo::convert::{normalize, ConvertError, CoordSystem};
pub use geo::{haversine_m, BoundingBox, GeoPoint};
pub use ingest::{run_import, Candidate, ImportReport, ReconcilePolicy, SourceAdapter, SourceProfile};
pub use logging::{default_log_level, init_logging, logging_status};
pub use merge::engine::{MergeEngine, MergeError};
pub use merge::scanner::ClusterScanner;
pub use model::audit::{AuditAction, AuditLogEntry, AuditLogId};
pub use model::marker::{
    MarkerDraft, MarkerId, MarkerRecord, MarkerValidationError, NewImage, TagDetail,
};
pub use repo::audit_repo::{AuditRepository, SqliteAuditRepository};
pub use repo::marker_repo::{
    MarkerRepository, NearbyMarker, RepoError, RepoResult, SqliteMarkerRepository,
};
pub use service::marker_service::{MarkerService, ServiceError};
