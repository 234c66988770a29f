use crate::details::EditDetails;
use crate::edit::Edit;
use crate::enums::Operation;

/// Decides which edits need the slower, vote-gated path.
pub trait DestructivePolicy: Send + Sync {
    fn is_destructive(&self, edit: &Edit) -> bool;
}

/// Destroy and merge are always destructive. So is renaming a performer
/// without carrying the old name onto existing scene credits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDestructivePolicy;

impl DestructivePolicy for DefaultDestructivePolicy {
    fn is_destructive(&self, edit: &Edit) -> bool {
        match edit.operation {
            Operation::Destroy | Operation::Merge => true,
            Operation::Create => false,
            Operation::Modify => match &edit.details {
                EditDetails::Performer(data) => match &data.new.name {
                    Some(new_name) => {
                        let old_name = data.old.name.as_deref().map(str::trim).unwrap_or("");
                        old_name != new_name && !data.modify_aliases
                    }
                    None => false,
                },
                _ => false,
            },
        }
    }
}
