use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::edit::{Edit, EditComment, EditVote};
use crate::enums::TargetType;
use crate::ids::{AuditId, EditId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    EditDelete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EditDelete => "edit_delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "edit_delete" => Ok(Self::EditDelete),
            _ => Err(CoreError::InvalidData(format!("unknown audit action: {s}"))),
        }
    }
}

/// Everything known about an edit at the moment it was deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditSnapshot {
    pub edit: Edit,
    pub comments: Vec<EditComment>,
    pub votes: Vec<EditVote>,
    pub deleted_by: UserId,
    pub deleted_at: DateTime<Utc>,
}

impl EditSnapshot {
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(|e| CoreError::Serialization(e.to_string()))
    }

    pub fn from_json(s: &str) -> Result<Self, CoreError> {
        serde_json::from_str(s).map_err(|e| CoreError::Serialization(e.to_string()))
    }
}

/// Immutable record of a moderator action.
#[derive(Debug, Clone, PartialEq)]
pub struct ModAudit {
    pub id: AuditId,
    pub action: AuditAction,
    pub user_id: UserId,
    pub target_id: EditId,
    pub target_type: TargetType,
    /// JSON-encoded [`EditSnapshot`].
    pub data: String,
    /// BLAKE3 of `data`.
    pub digest: [u8; 32],
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ModAudit {
    pub fn for_edit_delete(snapshot: &EditSnapshot, reason: &str) -> Result<Self, CoreError> {
        let data = snapshot.to_json()?;
        let digest = *blake3::hash(data.as_bytes()).as_bytes();
        Ok(Self {
            id: AuditId::new(),
            action: AuditAction::EditDelete,
            user_id: snapshot.deleted_by,
            target_id: snapshot.edit.id,
            target_type: snapshot.edit.target_type,
            data,
            digest,
            reason: reason.to_string(),
            created_at: snapshot.deleted_at,
        })
    }

    pub fn verify(&self) -> bool {
        blake3::hash(self.data.as_bytes()).as_bytes() == &self.digest
    }

    pub fn snapshot(&self) -> Result<EditSnapshot, CoreError> {
        EditSnapshot::from_json(&self.data)
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub user_id: Option<UserId>,
    pub limit: Option<u32>,
    pub offset: u32,
}
