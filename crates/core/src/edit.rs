use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::details::EditDetails;
use crate::enums::{EditStatus, Operation, TargetType, VoteType};
use crate::ids::{CommentId, EditId, EntityId, UserId};

/// A proposed change to one record, together with its review state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    pub id: EditId,
    pub user_id: Option<UserId>,
    pub target_type: TargetType,
    pub operation: Operation,
    pub status: EditStatus,
    /// Set at submission for modify/destroy/merge; set on apply for create.
    pub target_id: Option<EntityId>,
    pub merge_source_ids: Vec<EntityId>,
    pub details: EditDetails,
    /// Net score over each user's latest vote: accepts minus rejects.
    pub vote_count: i32,
    pub update_count: u32,
    pub applied: bool,
    pub bot: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Edit {
    pub fn is_pending(&self) -> bool {
        self.status.is_pending()
    }

    /// Moves the edit out of pending. `applied` follows the final status.
    pub fn close(&mut self, status: EditStatus, at: DateTime<Utc>) {
        self.status = status;
        self.applied = status.is_applied();
        self.closed_at = Some(at);
    }

    /// Start of the current voting window: the last amendment, or creation.
    pub fn voting_started_at(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}

/// Comments are immutable. System comments have no author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditComment {
    pub id: CommentId,
    pub edit_id: EditId,
    pub user_id: Option<UserId>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditVote {
    pub edit_id: EditId,
    pub user_id: UserId,
    pub vote: VoteType,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_edit() -> Edit {
        Edit {
            id: EditId::new(),
            user_id: Some(UserId::new()),
            target_type: TargetType::Tag,
            operation: Operation::Create,
            status: EditStatus::Pending,
            target_id: None,
            merge_source_ids: vec![],
            details: EditDetails::empty(TargetType::Tag),
            vote_count: 0,
            update_count: 0,
            applied: false,
            bot: false,
            created_at: Utc::now(),
            updated_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn close_sets_applied_only_for_accepting_statuses() {
        let now = Utc::now();
        let mut edit = pending_edit();
        edit.close(EditStatus::ImmediateAccepted, now);
        assert!(edit.applied);
        assert_eq!(edit.closed_at, Some(now));

        let mut edit = pending_edit();
        edit.close(EditStatus::Failed, now);
        assert!(!edit.applied);
        assert!(!edit.is_pending());
    }

    #[test]
    fn amendment_restarts_voting_window() {
        let mut edit = pending_edit();
        assert_eq!(edit.voting_started_at(), edit.created_at);
        let later = edit.created_at + Duration::hours(5);
        edit.updated_at = Some(later);
        assert_eq!(edit.voting_started_at(), later);
    }
}
