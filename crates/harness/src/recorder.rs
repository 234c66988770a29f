use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use quorum_core::{CommentId, Edit, EditComment, EditId};
use quorum_engine::{Notifier, NotifyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    CreateEdit(EditId),
    UpdateEdit(EditId),
    EditComment(EditId, CommentId),
    EditDownvote(EditId),
    CancelEdit(EditId),
    ApplyEdit(EditId),
}

/// Notifier that keeps every event it receives. With `set_failing(true)`
/// each call still records but then reports an error.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Event>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn record(&self, event: Event) -> NotifyResult {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
        if self.failing.load(Ordering::SeqCst) {
            return Err("notification sink unavailable".into());
        }
        Ok(())
    }
}

impl Notifier for RecordingNotifier {
    fn on_create_edit(&self, edit: &Edit) -> NotifyResult {
        self.record(Event::CreateEdit(edit.id))
    }

    fn on_update_edit(&self, edit: &Edit) -> NotifyResult {
        self.record(Event::UpdateEdit(edit.id))
    }

    fn on_edit_comment(&self, edit: &Edit, comment: &EditComment) -> NotifyResult {
        self.record(Event::EditComment(edit.id, comment.id))
    }

    fn on_edit_downvote(&self, edit: &Edit) -> NotifyResult {
        self.record(Event::EditDownvote(edit.id))
    }

    fn on_cancel_edit(&self, edit: &Edit) -> NotifyResult {
        self.record(Event::CancelEdit(edit.id))
    }

    fn on_apply_edit(&self, edit: &Edit) -> NotifyResult {
        self.record(Event::ApplyEdit(edit.id))
    }
}
