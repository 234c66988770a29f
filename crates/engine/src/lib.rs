mod apply;
mod audit;
pub mod error;
pub mod notify;
mod promotion;
mod read;
pub mod submit;
pub mod tally;

pub use error::{EngineError, ErrorKind};
pub use notify::{NoopNotifier, Notifier, NotifyResult};
pub use submit::EditSubmission;
pub use tally::{Decision, Tally};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, info_span, warn};

use quorum_core::audit::{AuditFilter, ModAudit};
use quorum_core::diff::DetailsInput;
use quorum_core::entities::{Performer, Scene, Studio, Tag};
use quorum_core::enums::has_role;
use quorum_core::policy::{DefaultDestructivePolicy, DestructivePolicy};
use quorum_core::{
    Clock, CommentId, Edit, EditComment, EditId, EditStatus, EditVote, EngineConfig, EntityId,
    Operation, Role, SystemClock, TargetType, UserId, VoteType,
};
use quorum_storage::{SqliteStorage, SqliteTxn, Store};

use crate::error::UPDATE_LIMIT_REACHED;
use crate::notify::{Notification, SideEffect, SideEffects};

const APPLY_SAVEPOINT: &str = "apply_edit";

/// Review workflow over a single store: proposals, votes, resolution and
/// application. Every mutating call runs in one write transaction; side
/// effects run after it commits.
pub struct Engine {
    storage: SqliteStorage,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    policy: Arc<dyn DestructivePolicy>,
}

impl Engine {
    pub fn new(storage: SqliteStorage, config: EngineConfig) -> Self {
        Self {
            storage,
            config,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(NoopNotifier),
            policy: Arc::new(DefaultDestructivePolicy),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn DestructivePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs queued side effects. Failures are logged, never returned.
    fn dispatch(&mut self, effects: SideEffects) {
        for effect in effects.into_vec() {
            match effect {
                SideEffect::Notify(notification) => notification.deliver(self.notifier.as_ref()),
                SideEffect::PromoteVoter(user) => {
                    if let Err(err) = self.promote(user) {
                        warn!(%user, "vote promotion failed: {err}");
                    }
                }
            }
        }
    }

    fn promote(&mut self, user: UserId) -> Result<(), EngineError> {
        let Some(threshold) = self.config.vote_promotion_threshold else {
            return Ok(());
        };
        let tx = self.storage.transaction()?;
        if promotion::promote_voter(&tx, user, threshold)? {
            tx.commit()?;
            info!(%user, "granted vote role");
        }
        Ok(())
    }

    // ========================================================================
    // Users
    // ========================================================================

    pub fn register_user(&mut self, name: &str, roles: &[Role]) -> Result<UserId, EngineError> {
        let user = UserId::new();
        let now = self.clock.now();
        let tx = self.storage.transaction()?;
        tx.insert_user(user, name, now)?;
        for role in roles {
            tx.grant_role(user, *role)?;
        }
        tx.commit()?;
        Ok(user)
    }

    pub fn grant_role(&mut self, user: UserId, role: Role) -> Result<bool, EngineError> {
        let tx = self.storage.transaction()?;
        if !tx.user_exists(user)? {
            return Err(EngineError::NotFound(format!("user {user}")));
        }
        let granted = tx.grant_role(user, role)?;
        tx.commit()?;
        Ok(granted)
    }

    pub fn user_roles(&self, user: UserId) -> Result<Vec<Role>, EngineError> {
        Ok(self.storage.snapshot()?.get_user_roles(user)?)
    }

    // ========================================================================
    // Submission
    // ========================================================================

    pub fn create_edit(&mut self, caller: UserId, submission: EditSubmission) -> Result<Edit, EngineError> {
        let target_type = submission.target_type();
        let span = info_span!("create_edit", %caller, operation = %submission.operation, %target_type);
        let _guard = span.enter();
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        require_role(&roles, Role::Edit)?;
        if target_type == TargetType::Tag && self.config.require_tag_role {
            require_role(&roles, Role::EditTags)?;
        }
        if submission.bot {
            require_role(&roles, Role::Bot)?;
        }

        let details = submit::build_details(
            &tx,
            submission.operation,
            submission.target_id,
            &submission.merge_source_ids,
            &submission.details,
        )?;
        let mut edit = Edit {
            id: EditId::new(),
            user_id: Some(caller),
            target_type,
            operation: submission.operation,
            status: EditStatus::Pending,
            target_id: submission.target_id,
            merge_source_ids: submission.merge_source_ids,
            details,
            vote_count: 0,
            update_count: 0,
            applied: false,
            bot: submission.bot,
            created_at: now,
            updated_at: None,
            closed_at: None,
        };
        tx.insert_edit(&edit)?;
        if let Some(text) = submission.comment.as_deref().filter(|t| !t.trim().is_empty()) {
            insert_comment(&tx, edit.id, Some(caller), text, now)?;
        }

        let immediate = edit.operation == Operation::Create
            && self.config.auto_apply_creates
            && !self.policy.is_destructive(&edit);
        if immediate {
            apply::apply_edit(&tx, &mut edit, now)?;
            edit.close(EditStatus::ImmediateAccepted, now);
            tx.update_edit(&edit)?;
        }
        tx.commit()?;

        info!(edit_id = %edit.id, status = %edit.status, "edit created");
        effects.notify(Notification::CreateEdit(edit.clone()));
        if immediate {
            effects.applied(&edit);
        }
        self.dispatch(effects);
        Ok(edit)
    }

    /// Replaces the details of the caller's pending edit and restarts voting.
    pub fn update_edit(
        &mut self,
        caller: UserId,
        edit_id: EditId,
        details: DetailsInput,
        comment: Option<String>,
    ) -> Result<Edit, EngineError> {
        let span = info_span!("update_edit", %caller, %edit_id);
        let _guard = span.enter();
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        caller_roles(&tx, caller)?;
        let mut edit = load_edit(&tx, edit_id)?;
        if edit.user_id != Some(caller) {
            return Err(EngineError::Unauthorized("only the submitter may amend an edit".into()));
        }
        require_pending(&edit)?;
        if edit.operation == Operation::Destroy {
            return Err(EngineError::StateConflict("destroy edits cannot be amended".into()));
        }
        if edit.update_count >= self.config.edit_update_limit {
            return Err(EngineError::StateConflict(UPDATE_LIMIT_REACHED.into()));
        }
        if details.target_type() != edit.target_type {
            return Err(EngineError::Validation(format!(
                "{} details for a {} edit",
                details.target_type(),
                edit.target_type
            )));
        }

        edit.details = submit::build_details(
            &tx,
            edit.operation,
            edit.target_id,
            &edit.merge_source_ids,
            &details,
        )?;
        edit.update_count += 1;
        edit.updated_at = Some(now);
        edit.vote_count = 0;
        let cleared = tx.clear_votes(edit.id)?;
        tx.update_edit(&edit)?;
        if let Some(text) = comment.as_deref().filter(|t| !t.trim().is_empty()) {
            insert_comment(&tx, edit.id, Some(caller), text, now)?;
        }
        tx.commit()?;

        info!(update_count = edit.update_count, cleared_votes = cleared, "edit amended");
        effects.notify(Notification::UpdateEdit(edit.clone()));
        self.dispatch(effects);
        Ok(edit)
    }

    // ========================================================================
    // Review
    // ========================================================================

    pub fn vote_on_edit(&mut self, caller: UserId, edit_id: EditId, vote: VoteType) -> Result<Edit, EngineError> {
        let span = info_span!("vote_on_edit", %caller, %edit_id, %vote);
        let _guard = span.enter();
        if !vote.is_ballot() {
            return Err(EngineError::Validation(format!("{vote} is not a ballot")));
        }
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        require_role(&roles, Role::Vote)?;
        let mut edit = load_edit(&tx, edit_id)?;
        require_pending(&edit)?;
        if edit.user_id == Some(caller) {
            return Err(EngineError::Unauthorized("cannot vote on own edit".into()));
        }

        tx.upsert_vote(&EditVote { edit_id, user_id: caller, vote, created_at: now })?;
        let tally = Tally::from_votes(&tx.get_votes(edit_id)?);
        edit.vote_count = tally.net();

        let destructive = self.policy.is_destructive(&edit);
        let decision = tally::decide_on_vote(&edit, tally, destructive, now, &self.config);
        debug!(?tally, destructive, ?decision, "tallied");
        resolve(&tx, &mut edit, decision, now, &mut effects)?;
        tx.update_edit(&edit)?;
        tx.commit()?;

        if vote == VoteType::Reject {
            effects.notify(Notification::EditDownvote(edit.clone()));
        }
        self.dispatch(effects);
        Ok(edit)
    }

    pub fn comment_on_edit(&mut self, caller: UserId, edit_id: EditId, text: &str) -> Result<Edit, EngineError> {
        let span = info_span!("comment_on_edit", %caller, %edit_id);
        let _guard = span.enter();
        if text.trim().is_empty() {
            return Err(EngineError::Validation("comment is empty".into()));
        }
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        require_role(&roles, Role::Edit)?;
        let edit = load_edit(&tx, edit_id)?;
        let comment = insert_comment(&tx, edit_id, Some(caller), text, now)?;
        tx.commit()?;

        effects.notify(Notification::EditComment(edit.clone(), comment));
        self.dispatch(effects);
        Ok(edit)
    }

    /// Withdraws a pending edit. Open to its submitter and to admins.
    pub fn cancel_edit(&mut self, caller: UserId, edit_id: EditId) -> Result<Edit, EngineError> {
        let span = info_span!("cancel_edit", %caller, %edit_id);
        let _guard = span.enter();
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        let mut edit = load_edit(&tx, edit_id)?;
        let is_owner = edit.user_id == Some(caller);
        let is_admin = has_role(&roles, Role::Admin);
        if !is_owner && !is_admin {
            return Err(EngineError::Unauthorized("only the submitter or an admin may cancel".into()));
        }
        require_pending(&edit)?;

        if !is_owner {
            tx.upsert_vote(&EditVote {
                edit_id,
                user_id: caller,
                vote: VoteType::ImmediateReject,
                created_at: now,
            })?;
        }
        edit.close(EditStatus::ImmediateRejected, now);
        tx.update_edit(&edit)?;
        tx.commit()?;

        info!(by_admin = !is_owner, "edit canceled");
        effects.notify(Notification::CancelEdit(edit.clone()));
        self.dispatch(effects);
        Ok(edit)
    }

    /// Admin override: applies a pending edit regardless of votes. If the
    /// application fails nothing is written and the edit stays pending.
    pub fn apply_edit(&mut self, caller: UserId, edit_id: EditId) -> Result<Edit, EngineError> {
        let span = info_span!("apply_edit", %caller, %edit_id);
        let _guard = span.enter();
        let now = self.clock.now();
        let mut effects = SideEffects::default();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        require_role(&roles, Role::Admin)?;
        let mut edit = load_edit(&tx, edit_id)?;
        require_pending(&edit)?;

        tx.upsert_vote(&EditVote {
            edit_id,
            user_id: caller,
            vote: VoteType::ImmediateAccept,
            created_at: now,
        })?;
        apply::apply_edit(&tx, &mut edit, now)?;
        edit.close(EditStatus::ImmediateAccepted, now);
        tx.update_edit(&edit)?;
        tx.commit()?;

        info!(target_id = ?edit.target_id, "edit force-applied");
        effects.applied(&edit);
        self.dispatch(effects);
        Ok(edit)
    }

    /// Closes every pending edit whose voting window has ended. Each edit is
    /// resolved in its own transaction. Returns how many were closed.
    pub fn close_completed(&mut self) -> Result<usize, EngineError> {
        let span = info_span!("close_completed");
        let _guard = span.enter();
        let now = self.clock.now();

        let due: Vec<EditId> = {
            let snapshot = self.storage.snapshot()?;
            let mut due = Vec::new();
            for edit in snapshot.get_pending_edits()? {
                let tally = Tally::from_votes(&snapshot.get_votes(edit.id)?);
                if tally::voting_ends_at(&edit, tally, &self.config) <= now {
                    due.push(edit.id);
                }
            }
            due
        };
        debug!(due = due.len(), "expiry sweep");

        let mut closed = 0;
        for edit_id in due {
            let mut effects = SideEffects::default();
            let tx = self.storage.transaction()?;
            // Another caller may have resolved it since the scan.
            let Some(mut edit) = tx.get_edit(edit_id)? else {
                continue;
            };
            if !edit.is_pending() {
                continue;
            }
            let tally = Tally::from_votes(&tx.get_votes(edit_id)?);
            if tally::voting_ends_at(&edit, tally, &self.config) > now {
                continue;
            }

            let destructive = self.policy.is_destructive(&edit);
            let decision = tally::decide_on_expiry(tally, destructive);
            debug!(%edit_id, ?tally, destructive, ?decision, "voting period ended");
            edit.vote_count = tally.net();
            resolve(&tx, &mut edit, decision, now, &mut effects)?;
            tx.update_edit(&edit)?;
            tx.commit()?;
            closed += 1;
            self.dispatch(effects);
        }
        Ok(closed)
    }

    // ========================================================================
    // Moderation
    // ========================================================================

    /// Removes a closed edit, leaving a moderator audit record of its final
    /// state. Returns false if the edit does not exist.
    pub fn delete_edit(&mut self, caller: UserId, edit_id: EditId, reason: &str) -> Result<bool, EngineError> {
        let span = info_span!("delete_edit", %caller, %edit_id);
        let _guard = span.enter();
        let now = self.clock.now();

        let tx = self.storage.transaction()?;
        let roles = caller_roles(&tx, caller)?;
        require_role(&roles, Role::Admin)?;
        let Some(edit) = tx.get_edit(edit_id)? else {
            return Ok(false);
        };
        if edit.is_pending() {
            return Err(EngineError::StateConflict("pending edits cannot be deleted".into()));
        }
        let audit = audit::delete_with_audit(&tx, edit, caller, reason, now)?;
        tx.commit()?;

        info!(audit_id = %audit.id, "edit deleted");
        Ok(true)
    }

    pub fn mod_audits(&self, filter: &AuditFilter) -> Result<Vec<ModAudit>, EngineError> {
        Ok(self.storage.snapshot()?.get_mod_audits(filter)?)
    }

    pub fn count_mod_audits(&self, filter: &AuditFilter) -> Result<u64, EngineError> {
        Ok(self.storage.snapshot()?.count_mod_audits(filter)?)
    }

    /// Drops audits older than the configured retention. Zero keeps everything.
    pub fn delete_expired_audits(&mut self) -> Result<usize, EngineError> {
        let retention_days = self.config.mod_audit_retention_days;
        let Some(cutoff) = audit::retention_cutoff(self.clock.now(), retention_days) else {
            return Ok(0);
        };
        let tx = self.storage.transaction()?;
        let removed = tx.delete_mod_audits_before(cutoff)?;
        tx.commit()?;
        if removed > 0 {
            info!(removed, %cutoff, "expired moderator audits removed");
        }
        Ok(removed)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn edit(&self, edit_id: EditId) -> Result<Option<Edit>, EngineError> {
        Ok(self.storage.snapshot()?.get_edit(edit_id)?)
    }

    pub fn comments(&self, edit_id: EditId) -> Result<Vec<EditComment>, EngineError> {
        Ok(self.storage.snapshot()?.get_comments(edit_id)?)
    }

    pub fn votes(&self, edit_id: EditId) -> Result<Vec<EditVote>, EngineError> {
        Ok(self.storage.snapshot()?.get_votes(edit_id)?)
    }

    pub fn edits_for_target(&self, target_id: EntityId) -> Result<Vec<Edit>, EngineError> {
        Ok(self.storage.snapshot()?.get_edits_for_target(target_id)?)
    }

    pub fn pending_edits(&self) -> Result<Vec<Edit>, EngineError> {
        Ok(self.storage.snapshot()?.get_pending_edits()?)
    }

    pub fn tag(&self, id: EntityId) -> Result<Option<Tag>, EngineError> {
        read::load_tag(&self.storage.snapshot()?, id)
    }

    pub fn performer(&self, id: EntityId) -> Result<Option<Performer>, EngineError> {
        read::load_performer(&self.storage.snapshot()?, id)
    }

    pub fn studio(&self, id: EntityId) -> Result<Option<Studio>, EngineError> {
        read::load_studio(&self.storage.snapshot()?, id)
    }

    pub fn scene(&self, id: EntityId) -> Result<Option<Scene>, EngineError> {
        read::load_scene(&self.storage.snapshot()?, id)
    }

    /// The entity `id` was ultimately merged into, if any.
    pub fn merged_into(&self, id: EntityId) -> Result<Option<EntityId>, EngineError> {
        read::merged_into(&self.storage.snapshot()?, id)
    }

    /// Every entity merged into `id`, transitively.
    pub fn merged_ids(&self, id: EntityId) -> Result<Vec<EntityId>, EngineError> {
        read::merged_ids(&self.storage.snapshot()?, id)
    }

    pub fn voting_ends_at(&self, edit: &Edit) -> Result<DateTime<Utc>, EngineError> {
        let tally = Tally::from_votes(&self.votes(edit.id)?);
        Ok(tally::voting_ends_at(edit, tally, &self.config))
    }

    pub fn is_destructive(&self, edit: &Edit) -> bool {
        self.policy.is_destructive(edit)
    }
}

// ============================================================================
// Transaction helpers
// ============================================================================

fn caller_roles(tx: &SqliteTxn<'_>, caller: UserId) -> Result<Vec<Role>, EngineError> {
    if !tx.user_exists(caller)? {
        return Err(EngineError::Unauthorized(format!("unknown user {caller}")));
    }
    Ok(tx.get_user_roles(caller)?)
}

/// `read_only` overrides every other grant.
fn require_role(roles: &[Role], required: Role) -> Result<(), EngineError> {
    if required != Role::Read && roles.contains(&Role::ReadOnly) {
        return Err(EngineError::Unauthorized("user is read-only".into()));
    }
    if has_role(roles, required) {
        Ok(())
    } else {
        Err(EngineError::Unauthorized(format!("{required} role required")))
    }
}

fn load_edit<S: Store + ?Sized>(store: &S, edit_id: EditId) -> Result<Edit, EngineError> {
    store
        .get_edit(edit_id)?
        .ok_or_else(|| EngineError::NotFound(format!("edit {edit_id}")))
}

fn require_pending(edit: &Edit) -> Result<(), EngineError> {
    if edit.is_pending() {
        Ok(())
    } else {
        Err(EngineError::StateConflict(format!("edit is {}", edit.status)))
    }
}

fn insert_comment<S: Store + ?Sized>(
    store: &S,
    edit_id: EditId,
    user_id: Option<UserId>,
    text: &str,
    at: DateTime<Utc>,
) -> Result<EditComment, EngineError> {
    let comment = EditComment {
        id: CommentId::new(),
        edit_id,
        user_id,
        text: text.to_string(),
        created_at: at,
    };
    store.insert_comment(&comment)?;
    Ok(comment)
}

/// Carries out a vote or expiry decision on a pending edit.
fn resolve(
    tx: &SqliteTxn<'_>,
    edit: &mut Edit,
    decision: Decision,
    at: DateTime<Utc>,
    effects: &mut SideEffects,
) -> Result<(), EngineError> {
    match decision {
        Decision::Pending => {}
        Decision::Reject => {
            edit.close(EditStatus::Rejected, at);
            info!(edit_id = %edit.id, "edit rejected");
        }
        Decision::Accept => {
            tx.savepoint(APPLY_SAVEPOINT)?;
            let mut applied = edit.clone();
            match apply::apply_edit(tx, &mut applied, at) {
                Ok(()) => {
                    tx.release(APPLY_SAVEPOINT)?;
                    applied.close(EditStatus::Accepted, at);
                    *edit = applied;
                    info!(edit_id = %edit.id, "edit accepted");
                    effects.applied(edit);
                }
                Err(err) => {
                    tx.rollback_to(APPLY_SAVEPOINT)?;
                    warn!(edit_id = %edit.id, "edit application failed: {err}");
                    edit.close(EditStatus::Failed, at);
                    insert_comment(tx, edit.id, None, &format!("Edit application failed: {err}"), at)?;
                }
            }
        }
    }
    Ok(())
}
