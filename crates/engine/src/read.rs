//! Typed read models assembled from stored fields, lists and edges.

use std::collections::{BTreeMap, HashSet, VecDeque};

use quorum_core::entities::{
    BodyModification, EntityMeta, Performer, PerformerAppearance, Scene, Studio, Tag, Url,
};
use quorum_core::{EntityId, FieldValue, ImageId, TargetType};
use quorum_storage::{EdgeType, Store};

use crate::EngineError;

type Fields = BTreeMap<String, FieldValue>;

fn text(fields: &Fields, key: &str) -> Option<String> {
    fields.get(key).and_then(|v| v.as_text()).map(str::to_string)
}

fn integer(fields: &Fields, key: &str) -> Option<i64> {
    fields.get(key).and_then(FieldValue::as_integer)
}

fn reference(fields: &Fields, key: &str) -> Option<EntityId> {
    fields.get(key).and_then(FieldValue::as_ref_id)
}

fn texts<S: Store + ?Sized>(store: &S, id: EntityId, key: &str) -> Result<Vec<String>, EngineError> {
    Ok(store
        .get_list(id, key)?
        .into_iter()
        .filter_map(|v| v.as_text().map(str::to_string))
        .collect())
}

fn members<S, T>(store: &S, id: EntityId, key: &str) -> Result<Vec<T>, EngineError>
where
    S: Store + ?Sized,
    T: TryFrom<FieldValue>,
{
    Ok(store
        .get_list(id, key)?
        .into_iter()
        .filter_map(|v| T::try_from(v).ok())
        .collect())
}

fn images<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Vec<ImageId>, EngineError> {
    Ok(store
        .get_list(id, "images")?
        .into_iter()
        .filter_map(|v| match v {
            FieldValue::Image(image) => Some(image),
            _ => None,
        })
        .collect())
}

/// Entity bookkeeping, if `id` names an entity of `expected` type.
/// Tombstoned entities are returned with `deleted` set.
pub(crate) fn load_meta<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
    expected: TargetType,
) -> Result<Option<EntityMeta>, EngineError> {
    Ok(store
        .get_entity(id)?
        .filter(|record| record.entity_type == expected)
        .map(|record| EntityMeta {
            id: record.entity_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted: record.deleted,
        }))
}

pub(crate) fn load_tag<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Option<Tag>, EngineError> {
    let Some(meta) = load_meta(store, id, TargetType::Tag)? else {
        return Ok(None);
    };
    let fields = store.get_fields(id)?;
    Ok(Some(Tag {
        meta,
        name: text(&fields, "name"),
        description: text(&fields, "description"),
        category_id: reference(&fields, "category_id"),
        aliases: texts(store, id, "aliases")?,
    }))
}

pub(crate) fn load_performer<S: Store + ?Sized>(
    store: &S,
    id: EntityId,
) -> Result<Option<Performer>, EngineError> {
    let Some(meta) = load_meta(store, id, TargetType::Performer)? else {
        return Ok(None);
    };
    let fields = store.get_fields(id)?;
    Ok(Some(Performer {
        meta,
        name: text(&fields, "name"),
        disambiguation: text(&fields, "disambiguation"),
        gender: text(&fields, "gender"),
        birthdate: text(&fields, "birthdate"),
        ethnicity: text(&fields, "ethnicity"),
        country: text(&fields, "country"),
        eye_color: text(&fields, "eye_color"),
        hair_color: text(&fields, "hair_color"),
        height: integer(&fields, "height"),
        career_start_year: integer(&fields, "career_start_year"),
        career_end_year: integer(&fields, "career_end_year"),
        aliases: texts(store, id, "aliases")?,
        urls: members::<_, Url>(store, id, "urls")?,
        images: images(store, id)?,
        tattoos: members::<_, BodyModification>(store, id, "tattoos")?,
        piercings: members::<_, BodyModification>(store, id, "piercings")?,
    }))
}

pub(crate) fn load_studio<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Option<Studio>, EngineError> {
    let Some(meta) = load_meta(store, id, TargetType::Studio)? else {
        return Ok(None);
    };
    let fields = store.get_fields(id)?;
    Ok(Some(Studio {
        meta,
        name: text(&fields, "name"),
        parent_id: reference(&fields, "parent_id"),
        aliases: texts(store, id, "aliases")?,
        urls: members::<_, Url>(store, id, "urls")?,
        images: images(store, id)?,
    }))
}

pub(crate) fn load_scene<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Option<Scene>, EngineError> {
    let Some(meta) = load_meta(store, id, TargetType::Scene)? else {
        return Ok(None);
    };
    let fields = store.get_fields(id)?;
    let tags = store
        .get_edges_from(id, EdgeType::SceneTag)?
        .into_iter()
        .map(|edge| edge.target_id)
        .collect();
    let performers = store
        .get_edges_from(id, EdgeType::ScenePerformer)?
        .into_iter()
        .map(|edge| PerformerAppearance {
            performer_id: edge.target_id,
            as_name: edge.alias,
        })
        .collect();
    Ok(Some(Scene {
        meta,
        title: text(&fields, "title"),
        details: text(&fields, "details"),
        date: text(&fields, "date"),
        studio_id: reference(&fields, "studio_id"),
        duration: integer(&fields, "duration"),
        director: text(&fields, "director"),
        code: text(&fields, "code"),
        urls: members::<_, Url>(store, id, "urls")?,
        images: images(store, id)?,
        tags,
        performers,
    }))
}

/// Follows the redirect chain from a merged entity to the one that
/// survived. Returns `None` when `id` was never merged away.
pub(crate) fn merged_into<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Option<EntityId>, EngineError> {
    let mut seen = HashSet::from([id]);
    let mut current = id;
    while let Some(next) = store.get_redirect(current)? {
        if !seen.insert(next) {
            return Err(EngineError::StateConflict(format!("redirect cycle at {next}")));
        }
        current = next;
    }
    Ok((current != id).then_some(current))
}

/// Every entity merged into `id`, directly or through earlier merges.
pub(crate) fn merged_ids<S: Store + ?Sized>(store: &S, id: EntityId) -> Result<Vec<EntityId>, EngineError> {
    let mut seen = HashSet::from([id]);
    let mut out = Vec::new();
    let mut queue = VecDeque::from([id]);
    while let Some(current) = queue.pop_front() {
        for source in store.get_redirects_to(current)? {
            if seen.insert(source) {
                out.push(source);
                queue.push_back(source);
            }
        }
    }
    Ok(out)
}
