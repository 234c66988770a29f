use quorum_core::{EditStatus, Role, UserId};
use quorum_storage::Store;

use crate::EngineError;

/// Grants the vote role to `user` once enough of their edits were applied.
/// Returns true when the role was newly granted.
pub(crate) fn promote_voter<S: Store + ?Sized>(
    store: &S,
    user: UserId,
    threshold: u32,
) -> Result<bool, EngineError> {
    let roles = store.get_user_roles(user)?;
    if roles.iter().any(|r| *r == Role::ReadOnly || r.implies(Role::Vote)) {
        return Ok(false);
    }
    let applied = store.count_user_edits_by_status(
        user,
        &[EditStatus::Accepted, EditStatus::ImmediateAccepted],
    )?;
    if applied < u64::from(threshold) {
        return Ok(false);
    }
    Ok(store.grant_role(user, Role::Vote)?)
}
