//! Proximity matching of import candidates against stored markers.
//!
//! # Responsibility
//! - Decide, per candidate, between creating a marker and reconciling with
//!   the nearest stored marker inside the source's dedup radius.
//! - Emit exactly one audit entry for every mutation it performs.
//!
//! # Invariants
//! - Matching uses the nearest marker within the radius, so the decision
//!   is deterministic for any store state.
//! - Reconciliations that would not change the stored row are reported as
//!   `Skipped` and write nothing, audit included.

use crate::geo::GeoPoint;
use crate::ingest::{Candidate, ReconcilePolicy, SourceProfile};
use crate::merge::engine::accumulate_tag_details;
use crate::model::audit::AuditAction;
use crate::model::marker::{normalize_tags, MarkerDraft, MarkerId, UserId};
use crate::repo::audit_repo::AuditRepository;
use crate::repo::marker_repo::{MarkerRepository, NearbyMarker, RepoResult};

const PROVIDER_PREFIX: &str = "Provider:";

/// How one candidate was resolved against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Created(MarkerId),
    Skipped,
    Reconciled(MarkerId),
}

/// Candidate matcher bound to one source profile and its audit actor.
pub struct DedupMatcher<'a, M: MarkerRepository, A: AuditRepository> {
    markers: &'a M,
    audit: &'a A,
    profile: &'a SourceProfile,
    actor: UserId,
}

impl<'a, M: MarkerRepository, A: AuditRepository> DedupMatcher<'a, M, A> {
    pub fn new(markers: &'a M, audit: &'a A, profile: &'a SourceProfile, actor: UserId) -> Self {
        Self {
            markers,
            audit,
            profile,
            actor,
        }
    }

    /// Resolves one candidate: create when nothing is nearby, otherwise
    /// apply the source's reconcile policy to the nearest marker.
    pub fn process(&self, candidate: &Candidate) -> RepoResult<MatchOutcome> {
        let center = GeoPoint::new(candidate.lat, candidate.lng);
        let nearest = self
            .markers
            .nearest_within(center, self.profile.dedup_radius_m)?;

        match nearest {
            None => self.create(candidate),
            Some(existing) => match self.profile.policy {
                ReconcilePolicy::SkipNearby => Ok(MatchOutcome::Skipped),
                ReconcilePolicy::AppendProvider => self.append_provider(&existing, candidate),
                ReconcilePolicy::MergeTagDetails => self.merge_tag_details(existing.id, candidate),
            },
        }
    }

    fn create(&self, candidate: &Candidate) -> RepoResult<MatchOutcome> {
        let draft = self.draft_from_candidate(candidate);
        let marker_id = self.markers.create_marker(&draft)?;
        self.audit
            .record(Some(self.actor), AuditAction::Create, Some(marker_id))?;
        Ok(MatchOutcome::Created(marker_id))
    }

    fn draft_from_candidate(&self, candidate: &Candidate) -> MarkerDraft {
        let mut draft = MarkerDraft::at(candidate.lat, candidate.lng);
        draft.name = candidate.name.clone();
        draft.description = candidate.description.clone();
        draft.author = Some(self.profile.name.clone());
        draft.tags = normalize_tags(&candidate.tags);
        draft.tag_details = candidate.tag_details.clone();
        draft.locality = candidate.locality.clone();
        draft.frequencies = candidate.frequencies.clone();
        draft
    }

    /// Appends the candidate's `Provider:` token to the nearby marker's
    /// description unless it is already listed there.
    fn append_provider(
        &self,
        existing: &NearbyMarker,
        candidate: &Candidate,
    ) -> RepoResult<MatchOutcome> {
        let token = candidate.description.as_deref().and_then(|description| {
            description
                .split(" | ")
                .map(str::trim)
                .find(|part| part.starts_with(PROVIDER_PREFIX))
                .map(str::to_string)
        });
        let Some(token) = token else {
            return Ok(MatchOutcome::Skipped);
        };

        let current = existing.description.as_deref().unwrap_or("");
        let already_listed = current.split(" | ").map(str::trim).any(|part| part == token);
        if already_listed {
            return Ok(MatchOutcome::Skipped);
        }

        let updated = if current.trim().is_empty() {
            token
        } else {
            format!("{current} | {token}")
        };
        self.markers
            .update_description(existing.id, Some(&updated))?;
        self.audit
            .record(Some(self.actor), AuditAction::Update, Some(existing.id))?;
        Ok(MatchOutcome::Reconciled(existing.id))
    }

    /// Unions the candidate's tags and per-tag details into the nearby
    /// marker, writing only when something actually changes.
    fn merge_tag_details(
        &self,
        existing_id: MarkerId,
        candidate: &Candidate,
    ) -> RepoResult<MatchOutcome> {
        let Some(marker) = self.markers.get_marker(existing_id)? else {
            // The proximity row vanished between query and load.
            return Ok(MatchOutcome::Skipped);
        };

        let mut tags = marker.tags.clone();
        let mut changed = false;
        for tag in normalize_tags(&candidate.tags) {
            if !tags.contains(&tag) {
                tags.push(tag);
                changed = true;
            }
        }

        let mut details = marker.tag_details.clone();
        accumulate_tag_details(&mut details, &candidate.tag_details);
        if details != marker.tag_details {
            changed = true;
        }

        if !changed {
            return Ok(MatchOutcome::Skipped);
        }

        self.markers.update_tagging(existing_id, &tags, &details)?;
        self.audit
            .record(Some(self.actor), AuditAction::Update, Some(existing_id))?;
        Ok(MatchOutcome::Reconciled(existing_id))
    }
}
