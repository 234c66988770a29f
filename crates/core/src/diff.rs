//! Turns a caller's proposed field values into the old/new pairs an edit stores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::details::{EditData, ListChange, PerformerEdit, SceneEdit, StudioEdit, TagEdit};
use crate::entities::{
    BodyModification, Performer, PerformerAppearance, Scene, Studio, Tag, Url, vocab,
};
use crate::enums::TargetType;
use crate::ids::{EntityId, ImageId};

/// One submitted scalar. `Untouched` leaves the field out of the edit,
/// `Cleared` proposes removing the value, `Value` proposes a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldInput<T> {
    #[default]
    Untouched,
    Cleared,
    Value(T),
}

impl<T> FieldInput<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            FieldInput::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<T> for FieldInput<T> {
    fn from(v: T) -> Self {
        FieldInput::Value(v)
    }
}

/// Returns `(old, new)`: both absent when the field is untouched or unchanged.
pub fn diff_field<T: Clone + PartialEq>(input: &FieldInput<T>, current: &Option<T>) -> (Option<T>, Option<T>) {
    match input {
        FieldInput::Untouched => (None, None),
        FieldInput::Cleared => (current.clone(), None),
        FieldInput::Value(v) => {
            if current.as_ref() == Some(v) {
                (None, None)
            } else {
                (current.clone(), Some(v.clone()))
            }
        }
    }
}

/// Like [`diff_field`] for enum-valued text; values outside `allowed` count as absent.
pub fn diff_enum(
    input: &FieldInput<String>,
    current: &Option<String>,
    allowed: &[&str],
) -> (Option<String>, Option<String>) {
    let valid = |v: &String| allowed.contains(&v.as_str());
    let input = match input {
        FieldInput::Value(v) if !valid(v) => FieldInput::Untouched,
        other => other.clone(),
    };
    let current = current.clone().filter(valid);
    diff_field(&input, &current)
}

/// Accepts `YYYY`, `YYYY-MM` and `YYYY-MM-DD`.
pub fn is_fuzzy_date(s: &str) -> bool {
    let parts: Vec<&str> = s.split('-').collect();
    let numeric = |p: &str, len: usize| p.len() == len && p.bytes().all(|b| b.is_ascii_digit());
    match parts.as_slice() {
        [y] => numeric(*y, 4),
        [y, m] => numeric(*y, 4) && numeric(*m, 2) && NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d").is_ok(),
        [y, m, d] => numeric(*y, 4) && numeric(*m, 2) && numeric(*d, 2) && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}

macro_rules! diff_into {
    ($old:ident, $new:ident, $field:ident, $result:expr) => {{
        let (o, n) = $result;
        $old.$field = o;
        $new.$field = n;
    }};
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagInput {
    pub name: FieldInput<String>,
    pub description: FieldInput<String>,
    pub category_id: FieldInput<EntityId>,
    pub aliases: ListChange<String>,
}

impl TagInput {
    pub fn diff(&self, current: Option<&Tag>) -> EditData<TagEdit> {
        let (mut old, mut new) = (TagEdit::default(), TagEdit::default());
        diff_into!(old, new, name, diff_field(&self.name, &current.and_then(|t| t.name.clone())));
        diff_into!(old, new, description, diff_field(&self.description, &current.and_then(|t| t.description.clone())));
        diff_into!(old, new, category_id, diff_field(&self.category_id, &current.and_then(|t| t.category_id)));
        new.aliases = self.aliases.clone();
        EditData { new, old, modify_aliases: false, merge_aliases: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformerInput {
    pub name: FieldInput<String>,
    pub disambiguation: FieldInput<String>,
    pub gender: FieldInput<String>,
    pub birthdate: FieldInput<String>,
    pub ethnicity: FieldInput<String>,
    pub country: FieldInput<String>,
    pub eye_color: FieldInput<String>,
    pub hair_color: FieldInput<String>,
    pub height: FieldInput<i64>,
    pub career_start_year: FieldInput<i64>,
    pub career_end_year: FieldInput<i64>,
    pub aliases: ListChange<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
    pub tattoos: ListChange<BodyModification>,
    pub piercings: ListChange<BodyModification>,
    pub modify_aliases: bool,
    pub merge_aliases: bool,
}

impl PerformerInput {
    pub fn diff(&self, current: Option<&Performer>) -> EditData<PerformerEdit> {
        let (mut old, mut new) = (PerformerEdit::default(), PerformerEdit::default());
        let text = |f: fn(&Performer) -> Option<String>| current.and_then(f);
        let int = |f: fn(&Performer) -> Option<i64>| current.and_then(f);

        diff_into!(old, new, name, diff_field(&self.name, &text(|p| p.name.clone())));
        diff_into!(old, new, disambiguation, diff_field(&self.disambiguation, &text(|p| p.disambiguation.clone())));
        diff_into!(old, new, gender, diff_enum(&self.gender, &text(|p| p.gender.clone()), vocab::GENDERS));
        diff_into!(old, new, birthdate, diff_field(&self.birthdate, &text(|p| p.birthdate.clone())));
        diff_into!(old, new, ethnicity, diff_enum(&self.ethnicity, &text(|p| p.ethnicity.clone()), vocab::ETHNICITIES));
        diff_into!(old, new, country, diff_field(&self.country, &text(|p| p.country.clone())));
        diff_into!(old, new, eye_color, diff_enum(&self.eye_color, &text(|p| p.eye_color.clone()), vocab::EYE_COLORS));
        diff_into!(old, new, hair_color, diff_enum(&self.hair_color, &text(|p| p.hair_color.clone()), vocab::HAIR_COLORS));
        diff_into!(old, new, height, diff_field(&self.height, &int(|p| p.height)));
        diff_into!(old, new, career_start_year, diff_field(&self.career_start_year, &int(|p| p.career_start_year)));
        diff_into!(old, new, career_end_year, diff_field(&self.career_end_year, &int(|p| p.career_end_year)));

        new.aliases = self.aliases.clone();
        new.urls = self.urls.clone();
        new.images = self.images.clone();
        new.tattoos = self.tattoos.clone();
        new.piercings = self.piercings.clone();
        EditData {
            new,
            old,
            modify_aliases: self.modify_aliases,
            merge_aliases: self.merge_aliases,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudioInput {
    pub name: FieldInput<String>,
    pub parent_id: FieldInput<EntityId>,
    pub aliases: ListChange<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
}

impl StudioInput {
    pub fn diff(&self, current: Option<&Studio>) -> EditData<StudioEdit> {
        let (mut old, mut new) = (StudioEdit::default(), StudioEdit::default());
        diff_into!(old, new, name, diff_field(&self.name, &current.and_then(|s| s.name.clone())));
        diff_into!(old, new, parent_id, diff_field(&self.parent_id, &current.and_then(|s| s.parent_id)));
        new.aliases = self.aliases.clone();
        new.urls = self.urls.clone();
        new.images = self.images.clone();
        EditData { new, old, modify_aliases: false, merge_aliases: false }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneInput {
    pub title: FieldInput<String>,
    pub details: FieldInput<String>,
    pub date: FieldInput<String>,
    pub studio_id: FieldInput<EntityId>,
    pub duration: FieldInput<i64>,
    pub director: FieldInput<String>,
    pub code: FieldInput<String>,
    pub urls: ListChange<Url>,
    pub images: ListChange<ImageId>,
    pub tags: ListChange<EntityId>,
    pub performers: ListChange<PerformerAppearance>,
}

impl SceneInput {
    pub fn diff(&self, current: Option<&Scene>) -> EditData<SceneEdit> {
        let (mut old, mut new) = (SceneEdit::default(), SceneEdit::default());
        let text = |f: fn(&Scene) -> Option<String>| current.and_then(f);

        diff_into!(old, new, title, diff_field(&self.title, &text(|s| s.title.clone())));
        diff_into!(old, new, details, diff_field(&self.details, &text(|s| s.details.clone())));
        diff_into!(old, new, date, diff_field(&self.date, &text(|s| s.date.clone())));
        diff_into!(old, new, studio_id, diff_field(&self.studio_id, &current.and_then(|s| s.studio_id)));
        diff_into!(old, new, duration, diff_field(&self.duration, &current.and_then(|s| s.duration)));
        diff_into!(old, new, director, diff_field(&self.director, &text(|s| s.director.clone())));
        diff_into!(old, new, code, diff_field(&self.code, &text(|s| s.code.clone())));

        new.urls = self.urls.clone();
        new.images = self.images.clone();
        new.tags = self.tags.clone();
        new.performers = self.performers.clone();
        EditData { new, old, modify_aliases: false, merge_aliases: false }
    }
}

/// Proposed values for one edit, tagged by the kind of record they target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DetailsInput {
    Tag(TagInput),
    Performer(PerformerInput),
    Studio(StudioInput),
    Scene(SceneInput),
}

impl DetailsInput {
    pub fn empty(target_type: TargetType) -> Self {
        match target_type {
            TargetType::Tag => DetailsInput::Tag(TagInput::default()),
            TargetType::Performer => DetailsInput::Performer(PerformerInput::default()),
            TargetType::Studio => DetailsInput::Studio(StudioInput::default()),
            TargetType::Scene => DetailsInput::Scene(SceneInput::default()),
        }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            DetailsInput::Tag(_) => TargetType::Tag,
            DetailsInput::Performer(_) => TargetType::Performer,
            DetailsInput::Studio(_) => TargetType::Studio,
            DetailsInput::Scene(_) => TargetType::Scene,
        }
    }
}
