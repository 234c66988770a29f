//! Read models of the records edits act on.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field_value::FieldValue;
use crate::ids::{EntityId, ImageId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Url {
    pub url: String,
    pub site: String,
}

impl From<Url> for FieldValue {
    fn from(u: Url) -> Self {
        FieldValue::Url { url: u.url, site: u.site }
    }
}

impl TryFrom<FieldValue> for Url {
    type Error = FieldValue;

    fn try_from(value: FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::Url { url, site } => Ok(Url { url, site }),
            other => Err(other),
        }
    }
}

/// A tattoo or piercing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BodyModification {
    pub location: String,
    pub description: Option<String>,
}

impl From<BodyModification> for FieldValue {
    fn from(m: BodyModification) -> Self {
        FieldValue::BodyMod { location: m.location, description: m.description }
    }
}

impl TryFrom<FieldValue> for BodyModification {
    type Error = FieldValue;

    fn try_from(value: FieldValue) -> Result<Self, Self::Error> {
        match value {
            FieldValue::BodyMod { location, description } => {
                Ok(BodyModification { location, description })
            }
            other => Err(other),
        }
    }
}

/// A performer credited on a scene, optionally under a different name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerformerAppearance {
    pub performer_id: EntityId,
    pub as_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMeta {
    pub id: EntityId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub meta: EntityMeta,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<EntityId>,
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performer {
    pub meta: EntityMeta,
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
    pub aliases: Vec<String>,
    pub urls: Vec<Url>,
    pub images: Vec<ImageId>,
    pub tattoos: Vec<BodyModification>,
    pub piercings: Vec<BodyModification>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Studio {
    pub meta: EntityMeta,
    pub name: Option<String>,
    pub parent_id: Option<EntityId>,
    pub aliases: Vec<String>,
    pub urls: Vec<Url>,
    pub images: Vec<ImageId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub meta: EntityMeta,
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<String>,
    pub studio_id: Option<EntityId>,
    pub duration: Option<i64>,
    pub director: Option<String>,
    pub code: Option<String>,
    pub urls: Vec<Url>,
    pub images: Vec<ImageId>,
    pub tags: Vec<EntityId>,
    pub performers: Vec<PerformerAppearance>,
}

/// Allowed values for the enum-typed performer fields.
pub mod vocab {
    pub const GENDERS: &[&str] = &[
        "male",
        "female",
        "transgender_male",
        "transgender_female",
        "intersex",
        "non_binary",
    ];

    pub const ETHNICITIES: &[&str] = &[
        "caucasian",
        "black",
        "asian",
        "indian",
        "latin",
        "middle_eastern",
        "mixed",
        "other",
    ];

    pub const EYE_COLORS: &[&str] = &["blue", "brown", "grey", "green", "hazel", "red"];

    pub const HAIR_COLORS: &[&str] = &[
        "blonde", "brunette", "black", "red", "auburn", "grey", "bald", "various", "other",
    ];
}
