//! Validates a proposed edit and turns its input into stored details.

use std::collections::BTreeSet;

use quorum_core::details::{EditData, EditDetails, PerformerEdit, SceneEdit, StudioEdit};
use quorum_core::diff::{DetailsInput, is_fuzzy_date};
use quorum_core::{EntityId, Operation, TargetType};
use quorum_storage::Store;

use crate::EngineError;
use crate::read;

/// Everything a caller supplies when proposing an edit. The target type
/// is taken from `details`.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSubmission {
    pub operation: Operation,
    pub target_id: Option<EntityId>,
    pub merge_source_ids: Vec<EntityId>,
    pub details: DetailsInput,
    pub comment: Option<String>,
    pub bot: bool,
}

impl EditSubmission {
    pub fn create(details: DetailsInput) -> Self {
        Self {
            operation: Operation::Create,
            target_id: None,
            merge_source_ids: Vec::new(),
            details,
            comment: None,
            bot: false,
        }
    }

    pub fn modify(target_id: EntityId, details: DetailsInput) -> Self {
        Self {
            operation: Operation::Modify,
            target_id: Some(target_id),
            ..Self::create(details)
        }
    }

    pub fn destroy(target_type: TargetType, target_id: EntityId) -> Self {
        Self {
            operation: Operation::Destroy,
            target_id: Some(target_id),
            ..Self::create(DetailsInput::empty(target_type))
        }
    }

    pub fn merge(target_id: EntityId, sources: Vec<EntityId>, details: DetailsInput) -> Self {
        Self {
            operation: Operation::Merge,
            target_id: Some(target_id),
            merge_source_ids: sources,
            ..Self::create(details)
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn as_bot(mut self) -> Self {
        self.bot = true;
        self
    }

    pub fn target_type(&self) -> TargetType {
        self.details.target_type()
    }
}

/// Fails unless `id` names a live entity of `expected` type.
pub(crate) fn require_live<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    expected: TargetType,
) -> Result<(), EngineError> {
    let Some(record) = store.get_entity(id)? else {
        return Err(EngineError::NotFound(format!("{expected} {id}")));
    };
    if record.entity_type != expected {
        return Err(EngineError::Validation(format!(
            "{id} is a {}, not a {expected}",
            record.entity_type
        )));
    }
    if record.deleted {
        return Err(EngineError::Validation(format!("{expected} {id} has been deleted")));
    }
    Ok(())
}

/// Builds the details of an edit against the current state of its target.
pub(crate) fn build_details<S: Store + ?Sized>(
    store: &S,
    operation: Operation,
    target_id: Option<EntityId>,
    merge_source_ids: &[EntityId],
    input: &DetailsInput,
) -> Result<EditDetails, EngineError> {
    let target_type = input.target_type();

    let target = match (operation.requires_target(), target_id) {
        (true, Some(id)) => {
            require_live(store, id, target_type)?;
            Some(id)
        }
        (true, None) => {
            return Err(EngineError::Validation(format!("{operation} edit needs a target")));
        }
        (false, Some(_)) => {
            return Err(EngineError::Validation("create edit cannot name a target".into()));
        }
        (false, None) => None,
    };

    match operation {
        Operation::Merge => {
            let Some(target) = target else {
                return Err(EngineError::Validation("merge edit needs a target".into()));
            };
            if merge_source_ids.is_empty() {
                return Err(EngineError::Validation("merge edit needs at least one source".into()));
            }
            let mut seen = BTreeSet::new();
            for source in merge_source_ids {
                if *source == target {
                    return Err(EngineError::Validation("cannot merge an entity into itself".into()));
                }
                if !seen.insert(*source) {
                    return Err(EngineError::Validation(format!("merge source {source} is listed twice")));
                }
                require_live(store, *source, target_type)?;
            }
        }
        _ if !merge_source_ids.is_empty() => {
            return Err(EngineError::Validation(format!("{operation} edit cannot have merge sources")));
        }
        _ => {}
    }

    if operation == Operation::Destroy {
        return Ok(EditDetails::empty(target_type));
    }

    let details = diff_against(store, target, input)?;

    if operation == Operation::Create {
        require_name(&details)?;
    }
    if operation == Operation::Modify && !details.has_changes() {
        return Err(EngineError::Validation("edit contains no changes".into()));
    }
    validate_values(&details)?;
    validate_references(store, &details, target)?;
    Ok(details)
}

fn diff_against<S: Store + ?Sized>(
    store: &S,
    target: Option<EntityId>,
    input: &DetailsInput,
) -> Result<EditDetails, EngineError> {
    Ok(match input {
        DetailsInput::Tag(i) => {
            let current = target.map(|id| read::load_tag(store, id)).transpose()?.flatten();
            EditDetails::Tag(i.diff(current.as_ref()))
        }
        DetailsInput::Performer(i) => {
            let current = target.map(|id| read::load_performer(store, id)).transpose()?.flatten();
            EditDetails::Performer(i.diff(current.as_ref()))
        }
        DetailsInput::Studio(i) => {
            let current = target.map(|id| read::load_studio(store, id)).transpose()?.flatten();
            EditDetails::Studio(i.diff(current.as_ref()))
        }
        DetailsInput::Scene(i) => {
            let current = target.map(|id| read::load_scene(store, id)).transpose()?.flatten();
            EditDetails::Scene(i.diff(current.as_ref()))
        }
    })
}

fn require_name(details: &EditDetails) -> Result<(), EngineError> {
    let (field, value) = match details {
        EditDetails::Tag(d) => ("name", d.new.name.as_deref()),
        EditDetails::Performer(d) => ("name", d.new.name.as_deref()),
        EditDetails::Studio(d) => ("name", d.new.name.as_deref()),
        EditDetails::Scene(d) => ("title", d.new.title.as_deref()),
    };
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(EngineError::Validation(format!("{field} is required"))),
    }
}

fn validate_values(details: &EditDetails) -> Result<(), EngineError> {
    let date = match details {
        EditDetails::Performer(EditData { new: PerformerEdit { birthdate, .. }, .. }) => {
            birthdate.as_deref().map(|d| ("birthdate", d))
        }
        EditDetails::Scene(EditData { new: SceneEdit { date, .. }, .. }) => {
            date.as_deref().map(|d| ("date", d))
        }
        _ => None,
    };
    if let Some((field, value)) = date {
        if !is_fuzzy_date(value) {
            return Err(EngineError::Validation(format!("invalid {field}: {value}")));
        }
    }
    Ok(())
}

/// Entities named by the new side must be live. Re-run at apply time.
pub(crate) fn validate_references<S: Store + ?Sized>(
    store: &S,
    details: &EditDetails,
    target: Option<EntityId>,
) -> Result<(), EngineError> {
    match details {
        EditDetails::Studio(EditData { new: StudioEdit { parent_id: Some(parent), .. }, .. }) => {
            if Some(*parent) == target {
                return Err(EngineError::Validation("studio cannot be its own parent".into()));
            }
            require_live(store, *parent, TargetType::Studio)?;
        }
        EditDetails::Scene(d) => {
            if let Some(studio) = d.new.studio_id {
                require_live(store, studio, TargetType::Studio)?;
            }
            for tag in &d.new.tags.added {
                require_live(store, *tag, TargetType::Tag)?;
            }
            for appearance in &d.new.performers.added {
                require_live(store, appearance.performer_id, TargetType::Performer)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Utc;
    use quorum_core::details::ListChange;
    use quorum_core::diff::{FieldInput, PerformerInput, SceneInput, TagInput};
    use quorum_storage::SqliteStorage;

    fn tag_named(name: &str) -> DetailsInput {
        DetailsInput::Tag(TagInput { name: name.to_string().into(), ..Default::default() })
    }

    #[test]
    fn create_requires_a_name() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let err = build_details(&tx, Operation::Create, None, &[], &tag_named("  ")).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let details = build_details(&tx, Operation::Create, None, &[], &tag_named("Outdoor"))?;
        assert!(details.has_changes());
        Ok(())
    }

    #[test]
    fn modify_without_changes_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let tag = EntityId::new();
        tx.insert_entity(tag, TargetType::Tag, Utc::now())?;
        tx.set_field(tag, "name", &"Outdoor".into())?;

        let err = build_details(&tx, Operation::Modify, Some(tag), &[], &tag_named("Outdoor")).unwrap_err();
        assert_eq!(err.to_string(), "invalid edit: edit contains no changes");
        Ok(())
    }

    #[test]
    fn targets_must_be_live_and_of_the_right_type() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let now = Utc::now();
        let (tag, studio) = (EntityId::new(), EntityId::new());
        tx.insert_entity(tag, TargetType::Tag, now)?;
        tx.insert_entity(studio, TargetType::Studio, now)?;

        let missing = build_details(&tx, Operation::Destroy, Some(EntityId::new()), &[], &DetailsInput::empty(TargetType::Tag));
        assert!(matches!(missing, Err(EngineError::NotFound(_))));

        let wrong_type = build_details(&tx, Operation::Destroy, Some(studio), &[], &DetailsInput::empty(TargetType::Tag));
        assert!(matches!(wrong_type, Err(EngineError::Validation(_))));

        tx.tombstone_entity(tag, now)?;
        let deleted = build_details(&tx, Operation::Destroy, Some(tag), &[], &DetailsInput::empty(TargetType::Tag));
        assert!(matches!(deleted, Err(EngineError::Validation(_))));
        Ok(())
    }

    #[test]
    fn merge_sources_are_checked() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let now = Utc::now();
        let (target, source) = (EntityId::new(), EntityId::new());
        tx.insert_entity(target, TargetType::Tag, now)?;
        tx.insert_entity(source, TargetType::Tag, now)?;
        let input = DetailsInput::empty(TargetType::Tag);

        let none = build_details(&tx, Operation::Merge, Some(target), &[], &input);
        assert!(matches!(none, Err(EngineError::Validation(_))));

        let itself = build_details(&tx, Operation::Merge, Some(target), &[target], &input);
        assert!(matches!(itself, Err(EngineError::Validation(_))));

        let twice = build_details(&tx, Operation::Merge, Some(target), &[source, source], &input);
        assert!(matches!(twice, Err(EngineError::Validation(_))));

        let ok = build_details(&tx, Operation::Merge, Some(target), &[source], &input)?;
        assert!(!ok.has_changes());
        Ok(())
    }

    #[test]
    fn dates_and_references_are_validated() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;

        let bad_date = DetailsInput::Performer(PerformerInput {
            name: "Jane".to_string().into(),
            birthdate: "1990-02-31".to_string().into(),
            ..Default::default()
        });
        let err = build_details(&tx, Operation::Create, None, &[], &bad_date).unwrap_err();
        assert_eq!(err.to_string(), "invalid edit: invalid birthdate: 1990-02-31");

        let dangling_tag = DetailsInput::Scene(SceneInput {
            title: "Opening".to_string().into(),
            date: FieldInput::Value("2004-05".to_string()),
            tags: ListChange { added: vec![EntityId::new()], removed: vec![] },
            ..Default::default()
        });
        let err = build_details(&tx, Operation::Create, None, &[], &dangling_tag).unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
        Ok(())
    }
}
