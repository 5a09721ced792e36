//! Audit trail model.
//!
//! Audit entries outlive the markers they reference: merges repoint them to
//! the survivor and hard deletes null the reference instead of dropping rows.

use crate::model::marker::{MarkerId, UserId};

/// Stable row identifier for audit entries.
pub type AuditLogId = i64;

/// Mutation kind recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One recorded mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditLogEntry {
    pub id: AuditLogId,
    /// Acting user; `None` for engine-driven mutations such as merges.
    pub user_id: Option<UserId>,
    pub action: AuditAction,
    /// Referenced marker; `None` after a hard delete.
    pub marker_id: Option<MarkerId>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::AuditAction;

    #[test]
    fn action_round_trips_through_storage_form() {
        for action in [AuditAction::Create, AuditAction::Update, AuditAction::Delete] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("merge"), None);
    }
}
