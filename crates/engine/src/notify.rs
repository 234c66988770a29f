//! Post-commit side effects: notifications and vote-right promotion.

use quorum_core::{Edit, EditComment, UserId};

pub type NotifyResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Receives edit lifecycle events after the originating change has committed.
/// Failures are logged and never reach the caller of the engine operation.
pub trait Notifier: Send + Sync {
    fn on_create_edit(&self, _edit: &Edit) -> NotifyResult {
        Ok(())
    }

    fn on_update_edit(&self, _edit: &Edit) -> NotifyResult {
        Ok(())
    }

    fn on_edit_comment(&self, _edit: &Edit, _comment: &EditComment) -> NotifyResult {
        Ok(())
    }

    fn on_edit_downvote(&self, _edit: &Edit) -> NotifyResult {
        Ok(())
    }

    fn on_cancel_edit(&self, _edit: &Edit) -> NotifyResult {
        Ok(())
    }

    fn on_apply_edit(&self, _edit: &Edit) -> NotifyResult {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {}

#[derive(Debug, Clone)]
pub(crate) enum Notification {
    CreateEdit(Edit),
    UpdateEdit(Edit),
    EditComment(Edit, EditComment),
    EditDownvote(Edit),
    CancelEdit(Edit),
    ApplyEdit(Edit),
}

impl Notification {
    fn name(&self) -> &'static str {
        match self {
            Self::CreateEdit(_) => "create_edit",
            Self::UpdateEdit(_) => "update_edit",
            Self::EditComment(..) => "edit_comment",
            Self::EditDownvote(_) => "edit_downvote",
            Self::CancelEdit(_) => "cancel_edit",
            Self::ApplyEdit(_) => "apply_edit",
        }
    }

    pub(crate) fn deliver(&self, notifier: &dyn Notifier) {
        let result = match self {
            Self::CreateEdit(edit) => notifier.on_create_edit(edit),
            Self::UpdateEdit(edit) => notifier.on_update_edit(edit),
            Self::EditComment(edit, comment) => notifier.on_edit_comment(edit, comment),
            Self::EditDownvote(edit) => notifier.on_edit_downvote(edit),
            Self::CancelEdit(edit) => notifier.on_cancel_edit(edit),
            Self::ApplyEdit(edit) => notifier.on_apply_edit(edit),
        };
        if let Err(err) = result {
            tracing::warn!(event = self.name(), "notification failed: {err}");
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum SideEffect {
    Notify(Notification),
    PromoteVoter(UserId),
}

/// Effects collected while a transaction is open, run once it commits.
#[derive(Debug, Default)]
pub(crate) struct SideEffects {
    effects: Vec<SideEffect>,
}

impl SideEffects {
    pub(crate) fn notify(&mut self, notification: Notification) {
        self.effects.push(SideEffect::Notify(notification));
    }

    /// Queues the follow-ups of an applied edit.
    pub(crate) fn applied(&mut self, edit: &Edit) {
        self.notify(Notification::ApplyEdit(edit.clone()));
        if let Some(user) = edit.user_id {
            self.effects.push(SideEffect::PromoteVoter(user));
        }
    }

    pub(crate) fn into_vec(self) -> Vec<SideEffect> {
        self.effects
    }
}
