use chrono::{DateTime, Duration, Utc};

use quorum_core::audit::{EditSnapshot, ModAudit};
use quorum_core::{Edit, UserId};
use quorum_storage::Store;

use crate::EngineError;

/// Records the edit's full state in the moderator audit log, then removes
/// the edit with its comments and votes.
pub(crate) fn delete_with_audit<S: Store + ?Sized>(
    store: &S,
    edit: Edit,
    deleted_by: UserId,
    reason: &str,
    at: DateTime<Utc>,
) -> Result<ModAudit, EngineError> {
    let snapshot = EditSnapshot {
        comments: store.get_comments(edit.id)?,
        votes: store.get_votes(edit.id)?,
        edit,
        deleted_by,
        deleted_at: at,
    };
    let audit = ModAudit::for_edit_delete(&snapshot, reason)?;
    store.insert_mod_audit(&audit)?;
    store.delete_edit(snapshot.edit.id)?;
    Ok(audit)
}

/// Audits older than this are due for removal. `None` keeps them forever.
pub(crate) fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> Option<DateTime<Utc>> {
    (retention_days > 0).then(|| now - Duration::days(i64::from(retention_days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_retention_keeps_everything() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, 0), None);
        assert_eq!(retention_cutoff(now, 30), Some(now - Duration::days(30)));
    }
}
