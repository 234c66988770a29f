use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::entities::{BodyModification, PerformerAppearance, Url};
use crate::enums::TargetType;
use crate::field_value::FieldValue;
use crate::ids::{EntityId, ImageId};

/// Members added to and removed from a list relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListChange<T> {
    pub added: Vec<T>,
    pub removed: Vec<T>,
}

impl<T> Default for ListChange<T> {
    fn default() -> Self {
        Self { added: Vec::new(), removed: Vec::new() }
    }
}

impl<T> ListChange<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl<T: Clone + Into<FieldValue>> ListChange<T> {
    pub fn to_values(&self) -> ListChange<FieldValue> {
        ListChange {
            added: self.added.iter().cloned().map(Into::into).collect(),
            removed: self.removed.iter().cloned().map(Into::into).collect(),
        }
    }
}

/// Field-level view over one side (old or new) of an edit's details.
pub trait EntityEdit {
    /// Scalar fields present on this side, keyed by storage field key.
    fn scalars(&self) -> BTreeMap<&'static str, FieldValue>;

    /// Non-empty list relation changes, keyed by list key.
    fn lists(&self) -> Vec<(&'static str, ListChange<FieldValue>)>;

    fn has_changes(&self) -> bool {
        !self.scalars().is_empty() || !self.lists().is_empty()
    }
}

fn put<V: Into<FieldValue> + Clone>(
    map: &mut BTreeMap<&'static str, FieldValue>,
    key: &'static str,
    value: &Option<V>,
) {
    if let Some(v) = value {
        map.insert(key, v.clone().into());
    }
}

fn push_list<V: Into<FieldValue> + Clone>(
    out: &mut Vec<(&'static str, ListChange<FieldValue>)>,
    key: &'static str,
    change: &ListChange<V>,
) {
    if !change.is_empty() {
        out.push((key, change.to_values()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<EntityId>,
    pub aliases: ListChange<String>,
}

impl EntityEdit for TagEdit {
    fn scalars(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut map = BTreeMap::new();
        put(&mut map, "name", &self.name);
        put(&mut map, "description", &self.description);
        put(&mut map, "category_id", &self.category_id);
        map
    }

    fn lists(&self) -> Vec<(&'static str, ListChange<FieldValue>)> {
        let mut out = Vec::new();
        push_list(&mut out, "aliases", &self.aliases);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformerEdit {
    pub name: Option<String>,
    pub disambiguation: Option<String>,
    pub gender: Option<String>,
    pub birthdate: Option<String>,
    pub ethnicity: Option<String>,
    pub country: Option<String>,
    pub eye_color: Option<String>,
    pub hair_color: Option<String>,
    pub height: Option<i64>,
    pub career_start_year: Option<i64>,
    pub career_end_year: Option<i64>,
    pub aliases: ListChange<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
    pub tattoos: ListChange<BodyModification>,
    pub piercings: ListChange<BodyModification>,
}

impl EntityEdit for PerformerEdit {
    fn scalars(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut map = BTreeMap::new();
        put(&mut map, "name", &self.name);
        put(&mut map, "disambiguation", &self.disambiguation);
        put(&mut map, "gender", &self.gender);
        put(&mut map, "birthdate", &self.birthdate);
        put(&mut map, "ethnicity", &self.ethnicity);
        put(&mut map, "country", &self.country);
        put(&mut map, "eye_color", &self.eye_color);
        put(&mut map, "hair_color", &self.hair_color);
        put(&mut map, "height", &self.height);
        put(&mut map, "career_start_year", &self.career_start_year);
        put(&mut map, "career_end_year", &self.career_end_year);
        map
    }

    fn lists(&self) -> Vec<(&'static str, ListChange<FieldValue>)> {
        let mut out = Vec::new();
        push_list(&mut out, "aliases", &self.aliases);
        push_list(&mut out, "urls", &self.urls);
        push_list(&mut out, "images", &self.images);
        push_list(&mut out, "tattoos", &self.tattoos);
        push_list(&mut out, "piercings", &self.piercings);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioEdit {
    pub name: Option<String>,
    pub parent_id: Option<EntityId>,
    pub aliases: ListChange<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
}

impl EntityEdit for StudioEdit {
    fn scalars(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut map = BTreeMap::new();
        put(&mut map, "name", &self.name);
        put(&mut map, "parent_id", &self.parent_id);
        map
    }

    fn lists(&self) -> Vec<(&'static str, ListChange<FieldValue>)> {
        let mut out = Vec::new();
        push_list(&mut out, "aliases", &self.aliases);
        push_list(&mut out, "urls", &self.urls);
        push_list(&mut out, "images", &self.images);
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneEdit {
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<String>,
    pub studio_id: Option<EntityId>,
    pub duration: Option<i64>,
    pub director: Option<String>,
    pub code: Option<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
    pub tags: ListChange<EntityId>,
    pub performers: ListChange<PerformerAppearance>,
}

impl EntityEdit for SceneEdit {
    fn scalars(&self) -> BTreeMap<&'static str, FieldValue> {
        let mut map = BTreeMap::new();
        put(&mut map, "title", &self.title);
        put(&mut map, "details", &self.details);
        put(&mut map, "date", &self.date);
        put(&mut map, "studio_id", &self.studio_id);
        put(&mut map, "duration", &self.duration);
        put(&mut map, "director", &self.director);
        put(&mut map, "code", &self.code);
        map
    }

    // Tags and performers are associations, not list members; see `SceneEdit::tags`.
    fn lists(&self) -> Vec<(&'static str, ListChange<FieldValue>)> {
        let mut out = Vec::new();
        push_list(&mut out, "urls", &self.urls);
        push_list(&mut out, "images", &self.images);
        out
    }

    fn has_changes(&self) -> bool {
        !self.scalars().is_empty()
            || !self.lists().is_empty()
            || !self.tags.is_empty()
            || !self.performers.is_empty()
    }
}

/// Old/new halves of an edit. List changes live on `new` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditData<T> {
    pub new: T,
    pub old: T,
    /// Performer only: credit existing scene appearances with the old name on rename.
    pub modify_aliases: bool,
    /// Performer only: keep merged performers' names as scene credits.
    pub merge_aliases: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EditDetails {
    Tag(EditData<TagEdit>),
    Performer(EditData<PerformerEdit>),
    Studio(EditData<StudioEdit>),
    Scene(EditData<SceneEdit>),
}

impl EditDetails {
    /// Empty details for `target_type`, as carried by destroy edits.
    pub fn empty(target_type: TargetType) -> Self {
        match target_type {
            TargetType::Tag => EditDetails::Tag(EditData::default()),
            TargetType::Performer => EditDetails::Performer(EditData::default()),
            TargetType::Studio => EditDetails::Studio(EditData::default()),
            TargetType::Scene => EditDetails::Scene(EditData::default()),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            EditDetails::Tag(_) => TargetType::Tag,
            EditDetails::Performer(_) => TargetType::Performer,
            EditDetails::Studio(_) => TargetType::Studio,
            EditDetails::Scene(_) => TargetType::Scene,
        }
    }

    pub fn new_side(&self) -> &dyn EntityEdit {
        match self {
            EditDetails::Tag(d) => &d.new,
            EditDetails::Performer(d) => &d.new,
            EditDetails::Studio(d) => &d.new,
            EditDetails::Scene(d) => &d.new,
        }
    }

    pub fn old_side(&self) -> &dyn EntityEdit {
        match self {
            EditDetails::Tag(d) => &d.old,
            EditDetails::Performer(d) => &d.old,
            EditDetails::Studio(d) => &d.old,
            EditDetails::Scene(d) => &d.old,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.new_side().has_changes() || self.old_side().has_changes()
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, CoreError> {
        rmp_serde::to_vec_named(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, CoreError> {
        rmp_serde::from_slice(bytes).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}
