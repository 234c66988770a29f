use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use quorum_core::{
    audit::{AuditFilter, ModAudit},
    edit::{Edit, EditComment, EditVote},
    enums::{EditStatus, Role, TargetType},
    field_value::FieldValue,
    ids::*,
};

use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub entity_type: TargetType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeType {
    SceneTag,
    ScenePerformer,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SceneTag => "scene_tag",
            Self::ScenePerformer => "scene_performer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "scene_tag" => Ok(Self::SceneTag),
            "scene_performer" => Ok(Self::ScenePerformer),
            _ => Err(StorageError::Serialization(format!("unknown edge type: {s}"))),
        }
    }
}

/// A scene's association with a tag or performer. `alias` is the performer's
/// credited name on that scene, when it differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub edge_type: EdgeType,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub alias: Option<String>,
}

/// Persistence for edits and the records they change. Every method runs
/// inside the caller's transaction.
pub trait Store {
    // Entities

    fn insert_entity(
        &self,
        entity_id: EntityId,
        entity_type: TargetType,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError>;

    fn touch_entity(&self, entity_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Marks the entity deleted and drops every edge touching it.
    fn tombstone_entity(&self, entity_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError>;

    fn get_fields(&self, entity_id: EntityId) -> Result<BTreeMap<String, FieldValue>, StorageError>;

    fn get_field(&self, entity_id: EntityId, field_key: &str) -> Result<Option<FieldValue>, StorageError>;

    fn set_field(&self, entity_id: EntityId, field_key: &str, value: &FieldValue) -> Result<(), StorageError>;

    fn clear_field(&self, entity_id: EntityId, field_key: &str) -> Result<(), StorageError>;

    /// Entities whose `field_key` holds a reference to `target`.
    fn get_entities_referencing(
        &self,
        field_key: &str,
        target: EntityId,
    ) -> Result<Vec<EntityId>, StorageError>;

    fn get_list(&self, entity_id: EntityId, list_key: &str) -> Result<Vec<FieldValue>, StorageError>;

    /// Returns false if the member was already present.
    fn add_list_member(
        &self,
        entity_id: EntityId,
        list_key: &str,
        member: &FieldValue,
    ) -> Result<bool, StorageError>;

    fn remove_list_member(
        &self,
        entity_id: EntityId,
        list_key: &str,
        member: &FieldValue,
    ) -> Result<bool, StorageError>;

    // Edges

    /// Returns false if the edge already existed.
    fn insert_edge(
        &self,
        edge_type: EdgeType,
        source_id: EntityId,
        target_id: EntityId,
        alias: Option<&str>,
    ) -> Result<bool, StorageError>;

    fn delete_edge(
        &self,
        edge_type: EdgeType,
        source_id: EntityId,
        target_id: EntityId,
    ) -> Result<bool, StorageError>;

    fn set_edge_alias(
        &self,
        edge_type: EdgeType,
        source_id: EntityId,
        target_id: EntityId,
        alias: Option<&str>,
    ) -> Result<(), StorageError>;

    fn get_edges_from(&self, source_id: EntityId, edge_type: EdgeType) -> Result<Vec<EdgeRecord>, StorageError>;

    fn get_edges_to(&self, target_id: EntityId, edge_type: EdgeType) -> Result<Vec<EdgeRecord>, StorageError>;

    /// Moves every `edge_type` edge pointing at `from` onto `to`. Sources that
    /// already point at `to` keep their existing edge and lose the moved one.
    fn repoint_edges(&self, edge_type: EdgeType, from: EntityId, to: EntityId) -> Result<usize, StorageError>;

    // Redirects

    fn insert_redirect(&self, source_id: EntityId, target_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError>;

    fn get_redirect(&self, source_id: EntityId) -> Result<Option<EntityId>, StorageError>;

    fn get_redirects_to(&self, target_id: EntityId) -> Result<Vec<EntityId>, StorageError>;

    // Users

    fn insert_user(&self, user_id: UserId, name: &str, at: DateTime<Utc>) -> Result<(), StorageError>;

    fn user_exists(&self, user_id: UserId) -> Result<bool, StorageError>;

    fn get_user_roles(&self, user_id: UserId) -> Result<Vec<Role>, StorageError>;

    /// Returns false if the user already held the role.
    fn grant_role(&self, user_id: UserId, role: Role) -> Result<bool, StorageError>;

    // Edits

    fn insert_edit(&self, edit: &Edit) -> Result<(), StorageError>;

    fn update_edit(&self, edit: &Edit) -> Result<(), StorageError>;

    fn get_edit(&self, edit_id: EditId) -> Result<Option<Edit>, StorageError>;

    fn get_edits_for_target(&self, target_id: EntityId) -> Result<Vec<Edit>, StorageError>;

    /// Pending edits, oldest first.
    fn get_pending_edits(&self) -> Result<Vec<Edit>, StorageError>;

    /// Removes the edit with its votes and comments.
    fn delete_edit(&self, edit_id: EditId) -> Result<bool, StorageError>;

    fn count_user_edits_by_status(&self, user_id: UserId, statuses: &[EditStatus]) -> Result<u64, StorageError>;

    // Votes

    /// Inserts or replaces the user's vote on the edit.
    fn upsert_vote(&self, vote: &EditVote) -> Result<(), StorageError>;

    fn get_votes(&self, edit_id: EditId) -> Result<Vec<EditVote>, StorageError>;

    fn clear_votes(&self, edit_id: EditId) -> Result<usize, StorageError>;

    // Comments

    fn insert_comment(&self, comment: &EditComment) -> Result<(), StorageError>;

    fn get_comments(&self, edit_id: EditId) -> Result<Vec<EditComment>, StorageError>;

    // Moderator audits

    fn insert_mod_audit(&self, audit: &ModAudit) -> Result<(), StorageError>;

    fn get_mod_audits(&self, filter: &AuditFilter) -> Result<Vec<ModAudit>, StorageError>;

    fn count_mod_audits(&self, filter: &AuditFilter) -> Result<u64, StorageError>;

    fn delete_mod_audits_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError>;
}
