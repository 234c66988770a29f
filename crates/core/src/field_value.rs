use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, ImageId};

/// A single stored value: either a scalar field of an entity or one member of
/// a list relation (aliases, urls, images, body modifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Ref(EntityId),
    Url { url: String, site: String },
    BodyMod { location: String, description: Option<String> },
    Image(ImageId),
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => a == b,
            (
                Self::Url { url: a, site: sa },
                Self::Url { url: b, site: sb },
            ) => a == b && sa == sb,
            (
                Self::BodyMod { location: a, description: da },
                Self::BodyMod { location: b, description: db },
            ) => a == b && da == db,
            (Self::Image(a), Self::Image(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldValue {}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<EntityId> {
        match self {
            FieldValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => write!(f, "{s}"),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Ref(id) => write!(f, "{id}"),
            FieldValue::Url { url, site } => write!(f, "{url} ({site})"),
            FieldValue::BodyMod { location, description: Some(d) } => {
                write!(f, "{location}: {d}")
            }
            FieldValue::BodyMod { location, description: None } => write!(f, "{location}"),
            FieldValue::Image(id) => write!(f, "image {id}"),
        }
    }
}

/// Renders an optional value for human-facing messages; absent values show as `_blank_`.
pub fn display_opt(value: Option<&FieldValue>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "_blank_".to_string(),
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Integer(n)
    }
}

impl From<EntityId> for FieldValue {
    fn from(id: EntityId) -> Self {
        FieldValue::Ref(id)
    }
}

impl From<ImageId> for FieldValue {
    fn from(id: ImageId) -> Self {
        FieldValue::Image(id)
    }
}
