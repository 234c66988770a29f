//! Carries an accepted edit's details onto the records it targets.
//!
//! Runs inside the transaction that closes the edit. Any error leaves the
//! caller to roll back whatever was written.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use quorum_core::details::{EditData, EditDetails, EntityEdit, PerformerEdit, SceneEdit};
use quorum_core::field_value::display_opt;
use quorum_core::{Edit, EntityId, FieldValue, Operation, TargetType};
use quorum_storage::{EdgeType, Store};

use crate::EngineError;
use crate::submit::{require_live, validate_references};

pub(crate) fn apply_edit<S: Store + ?Sized>(
    store: &S,
    edit: &mut Edit,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    match edit.operation {
        Operation::Create => {
            let id = create(store, edit.target_type, &edit.details, at)?;
            edit.target_id = Some(id);
        }
        Operation::Modify => {
            let target = target_of(edit)?;
            modify(store, target, edit.target_type, &edit.details, at)?;
        }
        Operation::Destroy => {
            let target = target_of(edit)?;
            destroy(store, target, edit.target_type, at)?;
        }
        Operation::Merge => {
            let target = target_of(edit)?;
            modify(store, target, edit.target_type, &edit.details, at)?;
            for source in &edit.merge_source_ids {
                merge_source(store, *source, target, edit.target_type, &edit.details, at)?;
            }
        }
    }
    Ok(())
}

fn target_of(edit: &Edit) -> Result<EntityId, EngineError> {
    edit.target_id
        .ok_or_else(|| EngineError::Validation(format!("{} edit has no target", edit.operation)))
}

/// Like [`require_live`], but a tombstoned entity is a changed precondition.
fn require_still_live<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    expected: TargetType,
) -> Result<(), EngineError> {
    match store.get_entity(id)? {
        Some(record) if record.deleted => Err(EngineError::PrerequisiteMismatch {
            field: "deleted".into(),
            expected: "false".into(),
            actual: "true".into(),
        }),
        _ => require_live(store, id, expected),
    }
}

// ============================================================================
// Create
// ============================================================================

fn create<S: Store + ?Sized>(
    store: &S,
    target_type: TargetType,
    details: &EditDetails,
    at: DateTime<Utc>,
) -> Result<EntityId, EngineError> {
    validate_references(store, details, None)?;
    let id = EntityId::new();
    store.insert_entity(id, target_type, at)?;

    let new = details.new_side();
    for (key, value) in new.scalars() {
        store.set_field(id, key, &value)?;
    }
    write_lists(store, id, new)?;
    if let EditDetails::Scene(data) = details {
        write_associations(store, id, &data.new)?;
    }
    Ok(id)
}

// ============================================================================
// Modify
// ============================================================================

/// Every field the edit touches must still hold the value recorded as old.
fn check_prerequisites<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    details: &EditDetails,
) -> Result<(), EngineError> {
    let old = details.old_side().scalars();
    let new = details.new_side().scalars();
    let keys: BTreeSet<&str> = old.keys().chain(new.keys()).copied().collect();
    for key in keys {
        let live = store.get_field(id, key)?;
        let expected = old.get(key);
        if live.as_ref() != expected {
            return Err(EngineError::PrerequisiteMismatch {
                field: key.to_string(),
                expected: display_opt(expected),
                actual: display_opt(live.as_ref()),
            });
        }
    }
    Ok(())
}

fn modify<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    target_type: TargetType,
    details: &EditDetails,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    require_still_live(store, id, target_type)?;
    check_prerequisites(store, id, details)?;
    validate_references(store, details, Some(id))?;

    let new = details.new_side().scalars();
    for (key, value) in &new {
        store.set_field(id, key, value)?;
    }
    for key in details.old_side().scalars().keys() {
        if !new.contains_key(key) {
            store.clear_field(id, key)?;
        }
    }
    write_lists(store, id, details.new_side())?;

    match details {
        EditDetails::Scene(data) => write_associations(store, id, &data.new)?,
        EditDetails::Performer(data) if data.modify_aliases => credit_old_name(store, id, data)?,
        _ => {}
    }
    store.touch_entity(id, at)?;
    Ok(())
}

fn write_lists<S: Store + ?Sized>(store: &S, id: EntityId, side: &dyn EntityEdit) -> Result<(), EngineError> {
    for (key, change) in side.lists() {
        for member in &change.removed {
            store.remove_list_member(id, key, member)?;
        }
        for member in &change.added {
            store.add_list_member(id, key, member)?;
        }
    }
    Ok(())
}

fn write_associations<S: Store + ?Sized>(store: &S, scene: EntityId, new: &SceneEdit) -> Result<(), EngineError> {
    for tag in &new.tags.removed {
        store.delete_edge(EdgeType::SceneTag, scene, *tag)?;
    }
    for tag in &new.tags.added {
        store.insert_edge(EdgeType::SceneTag, scene, *tag, None)?;
    }
    for appearance in &new.performers.removed {
        store.delete_edge(EdgeType::ScenePerformer, scene, appearance.performer_id)?;
    }
    for appearance in &new.performers.added {
        let alias = appearance.as_name.as_deref();
        if !store.insert_edge(EdgeType::ScenePerformer, scene, appearance.performer_id, alias)? {
            store.set_edge_alias(EdgeType::ScenePerformer, scene, appearance.performer_id, alias)?;
        }
    }
    Ok(())
}

/// On rename, scenes that credited the performer by name keep showing it.
fn credit_old_name<S: Store + ?Sized>(
    store: &S,
    performer: EntityId,
    data: &EditData<PerformerEdit>,
) -> Result<(), EngineError> {
    let (Some(old_name), Some(new_name)) = (data.old.name.as_deref(), data.new.name.as_deref()) else {
        return Ok(());
    };
    if old_name == new_name {
        return Ok(());
    }
    for edge in store.get_edges_to(performer, EdgeType::ScenePerformer)? {
        match edge.alias.as_deref() {
            None => store.set_edge_alias(EdgeType::ScenePerformer, edge.source_id, performer, Some(old_name))?,
            Some(alias) if alias == new_name => {
                store.set_edge_alias(EdgeType::ScenePerformer, edge.source_id, performer, None)?
            }
            Some(_) => {}
        }
    }
    Ok(())
}

// ============================================================================
// Destroy
// ============================================================================

fn destroy<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    target_type: TargetType,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    require_still_live(store, id, target_type)?;
    if target_type == TargetType::Studio {
        for key in ["studio_id", "parent_id"] {
            for referrer in store.get_entities_referencing(key, id)? {
                store.clear_field(referrer, key)?;
                store.touch_entity(referrer, at)?;
            }
        }
    }
    store.tombstone_entity(id, at)?;
    Ok(())
}

// ============================================================================
// Merge
// ============================================================================

fn merge_source<S: Store + ?Sized>(
    store: &S,
    source: EntityId,
    target: EntityId,
    target_type: TargetType,
    details: &EditDetails,
    at: DateTime<Utc>,
) -> Result<(), EngineError> {
    require_still_live(store, source, target_type)?;

    match target_type {
        TargetType::Tag => {
            store.repoint_edges(EdgeType::SceneTag, source, target)?;
        }
        TargetType::Performer => {
            let merge_aliases = matches!(details, EditDetails::Performer(d) if d.merge_aliases);
            if merge_aliases {
                credit_source_name(store, source, target)?;
            }
            store.repoint_edges(EdgeType::ScenePerformer, source, target)?;
        }
        TargetType::Studio => {
            for key in ["studio_id", "parent_id"] {
                for referrer in store.get_entities_referencing(key, source)? {
                    if referrer == target {
                        store.clear_field(referrer, key)?;
                    } else {
                        store.set_field(referrer, key, &FieldValue::Ref(target))?;
                    }
                    store.touch_entity(referrer, at)?;
                }
            }
        }
        TargetType::Scene => {}
    }

    store.tombstone_entity(source, at)?;
    store.insert_redirect(source, target, at)?;
    tracing::debug!(%source, %target, "merged");
    Ok(())
}

/// Appearances of a merged performer keep the name they were credited under.
fn credit_source_name<S: Store + ?Sized>(store: &S, source: EntityId, target: EntityId) -> Result<(), EngineError> {
    let source_name = store.get_field(source, "name")?;
    let target_name = store.get_field(target, "name")?;
    let source_name = source_name.as_ref().and_then(FieldValue::as_text);
    let target_name = target_name.as_ref().and_then(FieldValue::as_text);

    for edge in store.get_edges_to(source, EdgeType::ScenePerformer)? {
        let alias = match edge.alias.as_deref() {
            None => source_name,
            Some(alias) if Some(alias) == target_name => None,
            Some(_) => continue,
        };
        let alias = alias.filter(|a| Some(*a) != target_name);
        store.set_edge_alias(EdgeType::ScenePerformer, edge.source_id, source, alias)?;
    }
    Ok(())
}
