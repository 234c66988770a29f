use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use quorum_core::{
    audit::{AuditAction, AuditFilter, ModAudit},
    clock::millis_to_datetime,
    details::EditDetails,
    edit::{Edit, EditComment, EditVote},
    enums::{EditStatus, Operation, Role, TargetType, VoteType},
    field_value::FieldValue,
    ids::*,
};

use crate::error::StorageError;
use crate::traits::{EdgeRecord, EdgeType, EntityRecord, Store};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn encode_value(value: &FieldValue) -> Result<Vec<u8>, StorageError> {
    value
        .to_msgpack()
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode_value(bytes: &[u8]) -> Result<FieldValue, StorageError> {
    FieldValue::from_msgpack(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Begins a write transaction. The write lock is taken up front, so
    /// concurrent writers on the same database file queue behind each other.
    pub fn transaction(&mut self) -> Result<SqliteTxn<'_>, StorageError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(SqliteTxn { tx })
    }

    /// Begins a read-only view. It is rolled back when dropped.
    pub fn snapshot(&self) -> Result<SqliteTxn<'_>, StorageError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        Ok(SqliteTxn { tx })
    }
}

/// An open transaction. Dropping it without [`SqliteTxn::commit`] rolls back.
pub struct SqliteTxn<'a> {
    tx: Transaction<'a>,
}

impl SqliteTxn<'_> {
    pub fn commit(self) -> Result<(), StorageError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn savepoint(&self, name: &str) -> Result<(), StorageError> {
        self.tx.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(())
    }

    pub fn release(&self, name: &str) -> Result<(), StorageError> {
        self.tx.execute_batch(&format!("RELEASE {name}"))?;
        Ok(())
    }

    /// Undoes everything since the savepoint and discards it.
    pub fn rollback_to(&self, name: &str) -> Result<(), StorageError> {
        self.tx
            .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
        Ok(())
    }

    fn query_ids(&self, sql: &str, params: impl rusqlite::Params, label: &str) -> Result<Vec<EntityId>, StorageError> {
        let mut stmt = self.tx.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let bytes: Vec<u8> = row.get(0)?;
            result.push(EntityId::from_bytes(to_array::<16>(bytes, label)?));
        }
        Ok(result)
    }

    fn query_edges(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<EdgeRecord>, StorageError> {
        let mut stmt = self.tx.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let edge_type: String = row.get(0)?;
            let source_bytes: Vec<u8> = row.get(1)?;
            let target_bytes: Vec<u8> = row.get(2)?;
            let alias: Option<String> = row.get(3)?;
            result.push(EdgeRecord {
                edge_type: EdgeType::parse(&edge_type)?,
                source_id: EntityId::from_bytes(to_array::<16>(source_bytes, "source_id")?),
                target_id: EntityId::from_bytes(to_array::<16>(target_bytes, "target_id")?),
                alias,
            });
        }
        Ok(result)
    }

    fn query_edits(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Edit>, StorageError> {
        let mut stmt = self.tx.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(read_edit(row)?);
        }
        Ok(result)
    }
}

const EDIT_COLUMNS: &str = "edit_id, user_id, target_type, operation, status, target_id, merge_sources, details, vote_count, update_count, applied, bot, created_at, updated_at, closed_at";

fn read_edit(row: &rusqlite::Row) -> Result<Edit, StorageError> {
    let edit_id_bytes: Vec<u8> = row.get(0)?;
    let user_id_bytes: Option<Vec<u8>> = row.get(1)?;
    let target_type: String = row.get(2)?;
    let operation: String = row.get(3)?;
    let status: String = row.get(4)?;
    let target_id_bytes: Option<Vec<u8>> = row.get(5)?;
    let merge_sources_bytes: Vec<u8> = row.get(6)?;
    let details_bytes: Vec<u8> = row.get(7)?;
    let vote_count: i64 = row.get(8)?;
    let update_count: i64 = row.get(9)?;
    let applied: bool = row.get(10)?;
    let bot: bool = row.get(11)?;
    let created_at: i64 = row.get(12)?;
    let updated_at: Option<i64> = row.get(13)?;
    let closed_at: Option<i64> = row.get(14)?;

    let user_id = user_id_bytes
        .map(|b| to_array::<16>(b, "user_id").map(UserId::from_bytes))
        .transpose()?;
    let target_id = target_id_bytes
        .map(|b| to_array::<16>(b, "target_id").map(EntityId::from_bytes))
        .transpose()?;
    let merge_source_ids: Vec<EntityId> = rmp_serde::from_slice(&merge_sources_bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

    Ok(Edit {
        id: EditId::from_bytes(to_array::<16>(edit_id_bytes, "edit_id")?),
        user_id,
        target_type: TargetType::parse(&target_type)?,
        operation: Operation::parse(&operation)?,
        status: EditStatus::parse(&status)?,
        target_id,
        merge_source_ids,
        details: EditDetails::from_msgpack(&details_bytes)?,
        vote_count: vote_count as i32,
        update_count: update_count as u32,
        applied,
        bot,
        created_at: millis_to_datetime(created_at),
        updated_at: updated_at.map(millis_to_datetime),
        closed_at: closed_at.map(millis_to_datetime),
    })
}

fn read_mod_audit(row: &rusqlite::Row) -> Result<ModAudit, StorageError> {
    let audit_id_bytes: Vec<u8> = row.get(0)?;
    let action: String = row.get(1)?;
    let user_id_bytes: Vec<u8> = row.get(2)?;
    let target_id_bytes: Vec<u8> = row.get(3)?;
    let target_type: String = row.get(4)?;
    let data: String = row.get(5)?;
    let digest_bytes: Vec<u8> = row.get(6)?;
    let reason: String = row.get(7)?;
    let created_at: i64 = row.get(8)?;

    Ok(ModAudit {
        id: AuditId::from_bytes(to_array::<16>(audit_id_bytes, "audit_id")?),
        action: AuditAction::parse(&action)?,
        user_id: UserId::from_bytes(to_array::<16>(user_id_bytes, "user_id")?),
        target_id: EditId::from_bytes(to_array::<16>(target_id_bytes, "target_id")?),
        target_type: TargetType::parse(&target_type)?,
        data,
        digest: to_array::<32>(digest_bytes, "digest")?,
        reason,
        created_at: millis_to_datetime(created_at),
    })
}

fn status_list(statuses: &[EditStatus]) -> String {
    statuses
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Store for SqliteTxn<'_> {
    fn insert_entity(
        &self,
        entity_id: EntityId,
        entity_type: TargetType,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let result = self.tx.execute(
            "INSERT INTO entities (entity_id, entity_type, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![entity_id.as_bytes().as_slice(), entity_type.as_str(), ms(at)],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::ConstraintViolation(
                format!("entity {entity_id} already exists"),
            )),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn get_entity(&self, entity_id: EntityId) -> Result<Option<EntityRecord>, StorageError> {
        let row = self
            .tx
            .query_row(
                "SELECT entity_type, created_at, updated_at, (deleted_at IS NOT NULL) FROM entities WHERE entity_id = ?1",
                rusqlite::params![entity_id.as_bytes().as_slice()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((entity_type, created_at, updated_at, deleted)) => Ok(Some(EntityRecord {
                entity_id,
                entity_type: TargetType::parse(&entity_type)?,
                created_at: millis_to_datetime(created_at),
                updated_at: millis_to_datetime(updated_at),
                deleted,
            })),
            None => Ok(None),
        }
    }

    fn touch_entity(&self, entity_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.tx.execute(
            "UPDATE entities SET updated_at = ?1 WHERE entity_id = ?2",
            rusqlite::params![ms(at), entity_id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    fn tombstone_entity(&self, entity_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE entities SET deleted_at = ?1, updated_at = ?1 WHERE entity_id = ?2",
            rusqlite::params![ms(at), entity_id.as_bytes().as_slice()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("entity {entity_id}")));
        }
        self.tx.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            rusqlite::params![entity_id.as_bytes().as_slice()],
        )?;
        Ok(())
    }

    fn get_fields(&self, entity_id: EntityId) -> Result<BTreeMap<String, FieldValue>, StorageError> {
        let mut stmt = self
            .tx
            .prepare("SELECT field_key, value FROM fields WHERE entity_id = ?1")?;
        let rows = stmt.query_map(rusqlite::params![entity_id.as_bytes().as_slice()], |row| {
            let key: String = row.get(0)?;
            let val_bytes: Vec<u8> = row.get(1)?;
            Ok((key, val_bytes))
        })?;

        let mut result = BTreeMap::new();
        for row in rows {
            let (key, val_bytes) = row?;
            result.insert(key, decode_value(&val_bytes)?);
        }
        Ok(result)
    }

    fn get_field(&self, entity_id: EntityId, field_key: &str) -> Result<Option<FieldValue>, StorageError> {
        let bytes: Option<Vec<u8>> = self
            .tx
            .query_row(
                "SELECT value FROM fields WHERE entity_id = ?1 AND field_key = ?2",
                rusqlite::params![entity_id.as_bytes().as_slice(), field_key],
                |row| row.get(0),
            )
            .optional()?;
        bytes.map(|b| decode_value(&b)).transpose()
    }

    fn set_field(&self, entity_id: EntityId, field_key: &str, value: &FieldValue) -> Result<(), StorageError> {
        let ref_id = value.as_ref_id().map(|id| id.as_bytes().to_vec());
        self.tx.execute(
            "INSERT INTO fields (entity_id, field_key, value, ref_id) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(entity_id, field_key) DO UPDATE SET value = excluded.value, ref_id = excluded.ref_id",
            rusqlite::params![
                entity_id.as_bytes().as_slice(),
                field_key,
                encode_value(value)?,
                ref_id,
            ],
        )?;
        Ok(())
    }

    fn clear_field(&self, entity_id: EntityId, field_key: &str) -> Result<(), StorageError> {
        self.tx.execute(
            "DELETE FROM fields WHERE entity_id = ?1 AND field_key = ?2",
            rusqlite::params![entity_id.as_bytes().as_slice(), field_key],
        )?;
        Ok(())
    }

    fn get_entities_referencing(&self, field_key: &str, target: EntityId) -> Result<Vec<EntityId>, StorageError> {
        self.query_ids(
            "SELECT entity_id FROM fields WHERE field_key = ?1 AND ref_id = ?2",
            rusqlite::params![field_key, target.as_bytes().as_slice()],
            "entity_id",
        )
    }

    fn get_list(&self, entity_id: EntityId, list_key: &str) -> Result<Vec<FieldValue>, StorageError> {
        let mut stmt = self.tx.prepare(
            "SELECT member FROM list_members WHERE entity_id = ?1 AND list_key = ?2 ORDER BY rowid",
        )?;
        let mut rows = stmt.query(rusqlite::params![entity_id.as_bytes().as_slice(), list_key])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let bytes: Vec<u8> = row.get(0)?;
            result.push(decode_value(&bytes)?);
        }
        Ok(result)
    }

    fn add_list_member(&self, entity_id: EntityId, list_key: &str, member: &FieldValue) -> Result<bool, StorageError> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO list_members (entity_id, list_key, member) VALUES (?1, ?2, ?3)",
            rusqlite::params![entity_id.as_bytes().as_slice(), list_key, encode_value(member)?],
        )?;
        Ok(inserted > 0)
    }

    fn remove_list_member(&self, entity_id: EntityId, list_key: &str, member: &FieldValue) -> Result<bool, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM list_members WHERE entity_id = ?1 AND list_key = ?2 AND member = ?3",
            rusqlite::params![entity_id.as_bytes().as_slice(), list_key, encode_value(member)?],
        )?;
        Ok(removed > 0)
    }

    fn insert_edge(
        &self,
        edge_type: EdgeType,
        source_id: EntityId,
        target_id: EntityId,
        alias: Option<&str>,
    ) -> Result<bool, StorageError> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO edges (edge_type, source_id, target_id, alias) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                edge_type.as_str(),
                source_id.as_bytes().as_slice(),
                target_id.as_bytes().as_slice(),
                alias,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn delete_edge(&self, edge_type: EdgeType, source_id: EntityId, target_id: EntityId) -> Result<bool, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM edges WHERE edge_type = ?1 AND source_id = ?2 AND target_id = ?3",
            rusqlite::params![
                edge_type.as_str(),
                source_id.as_bytes().as_slice(),
                target_id.as_bytes().as_slice(),
            ],
        )?;
        Ok(removed > 0)
    }

    fn set_edge_alias(
        &self,
        edge_type: EdgeType,
        source_id: EntityId,
        target_id: EntityId,
        alias: Option<&str>,
    ) -> Result<(), StorageError> {
        self.tx.execute(
            "UPDATE edges SET alias = ?4 WHERE edge_type = ?1 AND source_id = ?2 AND target_id = ?3",
            rusqlite::params![
                edge_type.as_str(),
                source_id.as_bytes().as_slice(),
                target_id.as_bytes().as_slice(),
                alias,
            ],
        )?;
        Ok(())
    }

    fn get_edges_from(&self, source_id: EntityId, edge_type: EdgeType) -> Result<Vec<EdgeRecord>, StorageError> {
        self.query_edges(
            "SELECT edge_type, source_id, target_id, alias FROM edges WHERE source_id = ?1 AND edge_type = ?2 ORDER BY rowid",
            rusqlite::params![source_id.as_bytes().as_slice(), edge_type.as_str()],
        )
    }

    fn get_edges_to(&self, target_id: EntityId, edge_type: EdgeType) -> Result<Vec<EdgeRecord>, StorageError> {
        self.query_edges(
            "SELECT edge_type, source_id, target_id, alias FROM edges WHERE target_id = ?1 AND edge_type = ?2 ORDER BY rowid",
            rusqlite::params![target_id.as_bytes().as_slice(), edge_type.as_str()],
        )
    }

    fn repoint_edges(&self, edge_type: EdgeType, from: EntityId, to: EntityId) -> Result<usize, StorageError> {
        let params = rusqlite::params![
            edge_type.as_str(),
            from.as_bytes().as_slice(),
            to.as_bytes().as_slice(),
        ];
        self.tx.execute(
            "DELETE FROM edges WHERE edge_type = ?1 AND target_id = ?2
             AND source_id IN (SELECT source_id FROM edges WHERE edge_type = ?1 AND target_id = ?3)",
            params,
        )?;
        let moved = self.tx.execute(
            "UPDATE edges SET target_id = ?3 WHERE edge_type = ?1 AND target_id = ?2",
            params,
        )?;
        Ok(moved)
    }

    fn insert_redirect(&self, source_id: EntityId, target_id: EntityId, at: DateTime<Utc>) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO redirects (source_id, target_id, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(source_id) DO UPDATE SET target_id = excluded.target_id, created_at = excluded.created_at",
            rusqlite::params![source_id.as_bytes().as_slice(), target_id.as_bytes().as_slice(), ms(at)],
        )?;
        Ok(())
    }

    fn get_redirect(&self, source_id: EntityId) -> Result<Option<EntityId>, StorageError> {
        let ids = self.query_ids(
            "SELECT target_id FROM redirects WHERE source_id = ?1",
            rusqlite::params![source_id.as_bytes().as_slice()],
            "target_id",
        )?;
        Ok(ids.into_iter().next())
    }

    fn get_redirects_to(&self, target_id: EntityId) -> Result<Vec<EntityId>, StorageError> {
        self.query_ids(
            "SELECT source_id FROM redirects WHERE target_id = ?1 ORDER BY created_at",
            rusqlite::params![target_id.as_bytes().as_slice()],
            "source_id",
        )
    }

    fn insert_user(&self, user_id: UserId, name: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
        let result = self.tx.execute(
            "INSERT INTO users (user_id, name, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user_id.as_bytes().as_slice(), name, ms(at)],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(StorageError::ConstraintViolation(
                format!("user {name} already exists"),
            )),
            Err(e) => Err(StorageError::Sqlite(e)),
        }
    }

    fn user_exists(&self, user_id: UserId) -> Result<bool, StorageError> {
        let exists: bool = self.tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM users WHERE user_id = ?1)",
            rusqlite::params![user_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get_user_roles(&self, user_id: UserId) -> Result<Vec<Role>, StorageError> {
        let mut stmt = self
            .tx
            .prepare("SELECT role FROM user_roles WHERE user_id = ?1 ORDER BY role")?;
        let mut rows = stmt.query(rusqlite::params![user_id.as_bytes().as_slice()])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let role: String = row.get(0)?;
            result.push(Role::parse(&role)?);
        }
        Ok(result)
    }

    fn grant_role(&self, user_id: UserId, role: Role) -> Result<bool, StorageError> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
            rusqlite::params![user_id.as_bytes().as_slice(), role.as_str()],
        )?;
        Ok(inserted > 0)
    }

    fn insert_edit(&self, edit: &Edit) -> Result<(), StorageError> {
        let merge_sources = rmp_serde::to_vec(&edit.merge_source_ids)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.tx.execute(
            &format!("INSERT INTO edits ({EDIT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)"),
            rusqlite::params![
                edit.id.as_bytes().as_slice(),
                edit.user_id.map(|u| u.as_bytes().to_vec()),
                edit.target_type.as_str(),
                edit.operation.as_str(),
                edit.status.as_str(),
                edit.target_id.map(|t| t.as_bytes().to_vec()),
                merge_sources,
                edit.details.to_msgpack()?,
                edit.vote_count as i64,
                edit.update_count as i64,
                edit.applied,
                edit.bot,
                ms(edit.created_at),
                edit.updated_at.map(ms),
                edit.closed_at.map(ms),
            ],
        )?;
        Ok(())
    }

    fn update_edit(&self, edit: &Edit) -> Result<(), StorageError> {
        let changed = self.tx.execute(
            "UPDATE edits SET status = ?2, target_id = ?3, details = ?4, vote_count = ?5, update_count = ?6,
             applied = ?7, updated_at = ?8, closed_at = ?9 WHERE edit_id = ?1",
            rusqlite::params![
                edit.id.as_bytes().as_slice(),
                edit.status.as_str(),
                edit.target_id.map(|t| t.as_bytes().to_vec()),
                edit.details.to_msgpack()?,
                edit.vote_count as i64,
                edit.update_count as i64,
                edit.applied,
                edit.updated_at.map(ms),
                edit.closed_at.map(ms),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("edit {}", edit.id)));
        }
        Ok(())
    }

    fn get_edit(&self, edit_id: EditId) -> Result<Option<Edit>, StorageError> {
        let edits = self.query_edits(
            &format!("SELECT {EDIT_COLUMNS} FROM edits WHERE edit_id = ?1"),
            rusqlite::params![edit_id.as_bytes().as_slice()],
        )?;
        Ok(edits.into_iter().next())
    }

    fn get_edits_for_target(&self, target_id: EntityId) -> Result<Vec<Edit>, StorageError> {
        self.query_edits(
            &format!("SELECT {EDIT_COLUMNS} FROM edits WHERE target_id = ?1 ORDER BY created_at, edit_id"),
            rusqlite::params![target_id.as_bytes().as_slice()],
        )
    }

    fn get_pending_edits(&self) -> Result<Vec<Edit>, StorageError> {
        self.query_edits(
            &format!("SELECT {EDIT_COLUMNS} FROM edits WHERE status = 'pending' ORDER BY created_at, edit_id"),
            [],
        )
    }

    fn delete_edit(&self, edit_id: EditId) -> Result<bool, StorageError> {
        let id = edit_id.as_bytes().as_slice();
        // Explicit deletes so the cascade does not depend on the foreign_keys pragma.
        self.tx
            .execute("DELETE FROM edit_votes WHERE edit_id = ?1", rusqlite::params![id])?;
        self.tx
            .execute("DELETE FROM edit_comments WHERE edit_id = ?1", rusqlite::params![id])?;
        let removed = self
            .tx
            .execute("DELETE FROM edits WHERE edit_id = ?1", rusqlite::params![id])?;
        Ok(removed > 0)
    }

    fn count_user_edits_by_status(&self, user_id: UserId, statuses: &[EditStatus]) -> Result<u64, StorageError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let count: i64 = self.tx.query_row(
            &format!(
                "SELECT COUNT(*) FROM edits WHERE user_id = ?1 AND status IN ({})",
                status_list(statuses)
            ),
            rusqlite::params![user_id.as_bytes().as_slice()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn upsert_vote(&self, vote: &EditVote) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO edit_votes (edit_id, user_id, vote, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(edit_id, user_id) DO UPDATE SET vote = excluded.vote, created_at = excluded.created_at",
            rusqlite::params![
                vote.edit_id.as_bytes().as_slice(),
                vote.user_id.as_bytes().as_slice(),
                vote.vote.as_str(),
                ms(vote.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_votes(&self, edit_id: EditId) -> Result<Vec<EditVote>, StorageError> {
        let mut stmt = self.tx.prepare(
            "SELECT user_id, vote, created_at FROM edit_votes WHERE edit_id = ?1 ORDER BY created_at, user_id",
        )?;
        let mut rows = stmt.query(rusqlite::params![edit_id.as_bytes().as_slice()])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let user_bytes: Vec<u8> = row.get(0)?;
            let vote: String = row.get(1)?;
            let created_at: i64 = row.get(2)?;
            result.push(EditVote {
                edit_id,
                user_id: UserId::from_bytes(to_array::<16>(user_bytes, "user_id")?),
                vote: VoteType::parse(&vote)?,
                created_at: millis_to_datetime(created_at),
            });
        }
        Ok(result)
    }

    fn clear_votes(&self, edit_id: EditId) -> Result<usize, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM edit_votes WHERE edit_id = ?1",
            rusqlite::params![edit_id.as_bytes().as_slice()],
        )?;
        Ok(removed)
    }

    fn insert_comment(&self, comment: &EditComment) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO edit_comments (comment_id, edit_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                comment.id.as_bytes().as_slice(),
                comment.edit_id.as_bytes().as_slice(),
                comment.user_id.map(|u| u.as_bytes().to_vec()),
                comment.text,
                ms(comment.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_comments(&self, edit_id: EditId) -> Result<Vec<EditComment>, StorageError> {
        let mut stmt = self.tx.prepare(
            "SELECT comment_id, user_id, text, created_at FROM edit_comments WHERE edit_id = ?1 ORDER BY created_at, comment_id",
        )?;
        let mut rows = stmt.query(rusqlite::params![edit_id.as_bytes().as_slice()])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let comment_bytes: Vec<u8> = row.get(0)?;
            let user_bytes: Option<Vec<u8>> = row.get(1)?;
            let text: String = row.get(2)?;
            let created_at: i64 = row.get(3)?;
            result.push(EditComment {
                id: CommentId::from_bytes(to_array::<16>(comment_bytes, "comment_id")?),
                edit_id,
                user_id: user_bytes
                    .map(|b| to_array::<16>(b, "user_id").map(UserId::from_bytes))
                    .transpose()?,
                text,
                created_at: millis_to_datetime(created_at),
            });
        }
        Ok(result)
    }

    fn insert_mod_audit(&self, audit: &ModAudit) -> Result<(), StorageError> {
        self.tx.execute(
            "INSERT INTO mod_audits (audit_id, action, user_id, target_id, target_type, data, digest, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                audit.id.as_bytes().as_slice(),
                audit.action.as_str(),
                audit.user_id.as_bytes().as_slice(),
                audit.target_id.as_bytes().as_slice(),
                audit.target_type.as_str(),
                audit.data,
                &audit.digest[..],
                audit.reason,
                ms(audit.created_at),
            ],
        )?;
        Ok(())
    }

    fn get_mod_audits(&self, filter: &AuditFilter) -> Result<Vec<ModAudit>, StorageError> {
        let mut stmt = self.tx.prepare(
            "SELECT audit_id, action, user_id, target_id, target_type, data, digest, reason, created_at
             FROM mod_audits
             WHERE (?1 IS NULL OR action = ?1) AND (?2 IS NULL OR user_id = ?2)
             ORDER BY created_at DESC, audit_id DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let mut rows = stmt.query(rusqlite::params![
            filter.action.map(|a| a.as_str()),
            filter.user_id.map(|u| u.as_bytes().to_vec()),
            filter.limit.map(i64::from).unwrap_or(-1),
            i64::from(filter.offset),
        ])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(read_mod_audit(row)?);
        }
        Ok(result)
    }

    fn count_mod_audits(&self, filter: &AuditFilter) -> Result<u64, StorageError> {
        let count: i64 = self.tx.query_row(
            "SELECT COUNT(*) FROM mod_audits WHERE (?1 IS NULL OR action = ?1) AND (?2 IS NULL OR user_id = ?2)",
            rusqlite::params![
                filter.action.map(|a| a.as_str()),
                filter.user_id.map(|u| u.as_bytes().to_vec()),
            ],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn delete_mod_audits_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        let removed = self.tx.execute(
            "DELETE FROM mod_audits WHERE created_at < ?1",
            rusqlite::params![ms(cutoff)],
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use quorum_core::details::{EditData, TagEdit};

    fn now() -> DateTime<Utc> {
        millis_to_datetime(Utc::now().timestamp_millis())
    }

    fn pending_edit(user: UserId, target: Option<EntityId>) -> Edit {
        Edit {
            id: EditId::new(),
            user_id: Some(user),
            target_type: TargetType::Tag,
            operation: Operation::Modify,
            status: EditStatus::Pending,
            target_id: target,
            merge_source_ids: vec![EntityId::new()],
            details: EditDetails::Tag(EditData {
                new: TagEdit { name: Some("new".into()), ..Default::default() },
                old: TagEdit { name: Some("old".into()), ..Default::default() },
                modify_aliases: false,
                merge_aliases: false,
            }),
            vote_count: 0,
            update_count: 0,
            applied: false,
            bot: false,
            created_at: now(),
            updated_at: None,
            closed_at: None,
        }
    }

    #[test]
    fn edit_row_reads_back_identically() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let edit = pending_edit(UserId::new(), Some(EntityId::new()));
        tx.insert_edit(&edit)?;
        assert_eq!(tx.get_edit(edit.id)?, Some(edit.clone()));
        assert_eq!(tx.get_pending_edits()?.len(), 1);
        tx.commit()?;
        Ok(())
    }

    #[test]
    fn closed_at_must_match_status() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let mut edit = pending_edit(UserId::new(), None);
        edit.status = EditStatus::Rejected;
        assert!(tx.insert_edit(&edit).is_err());
        Ok(())
    }

    #[test]
    fn dropped_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let entity = EntityId::new();
        {
            let tx = storage.transaction()?;
            tx.insert_entity(entity, TargetType::Tag, now())?;
        }
        assert!(storage.snapshot()?.get_entity(entity)?.is_none());
        Ok(())
    }

    #[test]
    fn reopening_a_file_keeps_committed_rows() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("quorum.db");
        let path = path.to_str().ok_or("non-UTF-8 path")?;
        let edit = pending_edit(UserId::new(), None);
        {
            let mut storage = SqliteStorage::open(path)?;
            let tx = storage.transaction()?;
            tx.insert_edit(&edit)?;
            tx.commit()?;
        }

        let storage = SqliteStorage::open(path)?;
        assert_eq!(storage.snapshot()?.get_edit(edit.id)?, Some(edit));
        Ok(())
    }

    #[test]
    fn savepoint_rollback_keeps_earlier_writes() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let (kept, discarded) = (EntityId::new(), EntityId::new());
        let tx = storage.transaction()?;
        tx.insert_entity(kept, TargetType::Tag, now())?;
        tx.savepoint("apply")?;
        tx.insert_entity(discarded, TargetType::Tag, now())?;
        tx.rollback_to("apply")?;
        tx.commit()?;

        let snap = storage.snapshot()?;
        assert!(snap.get_entity(kept)?.is_some());
        assert!(snap.get_entity(discarded)?.is_none());
        Ok(())
    }

    #[test]
    fn list_members_have_set_semantics() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let id = EntityId::new();
        tx.insert_entity(id, TargetType::Performer, now())?;
        let alias = FieldValue::Text("JD".into());
        assert!(tx.add_list_member(id, "aliases", &alias)?);
        assert!(!tx.add_list_member(id, "aliases", &alias)?);
        assert_eq!(tx.get_list(id, "aliases")?, vec![alias.clone()]);
        assert!(tx.remove_list_member(id, "aliases", &alias)?);
        assert!(tx.get_list(id, "aliases")?.is_empty());
        Ok(())
    }

    #[test]
    fn repoint_edges_drops_duplicates() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let (scene_a, scene_b, from, to) = (EntityId::new(), EntityId::new(), EntityId::new(), EntityId::new());
        for (id, t) in [(scene_a, TargetType::Scene), (scene_b, TargetType::Scene), (from, TargetType::Tag), (to, TargetType::Tag)] {
            tx.insert_entity(id, t, now())?;
        }
        tx.insert_edge(EdgeType::SceneTag, scene_a, from, None)?;
        tx.insert_edge(EdgeType::SceneTag, scene_a, to, None)?;
        tx.insert_edge(EdgeType::SceneTag, scene_b, from, None)?;

        assert_eq!(tx.repoint_edges(EdgeType::SceneTag, from, to)?, 1);
        assert!(tx.get_edges_to(from, EdgeType::SceneTag)?.is_empty());
        let mut sources: Vec<_> = tx.get_edges_to(to, EdgeType::SceneTag)?.into_iter().map(|e| e.source_id).collect();
        sources.sort();
        let mut expected = vec![scene_a, scene_b];
        expected.sort();
        assert_eq!(sources, expected);
        Ok(())
    }

    #[test]
    fn tombstone_drops_edges() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let (scene, tag) = (EntityId::new(), EntityId::new());
        tx.insert_entity(scene, TargetType::Scene, now())?;
        tx.insert_entity(tag, TargetType::Tag, now())?;
        tx.insert_edge(EdgeType::SceneTag, scene, tag, None)?;
        tx.tombstone_entity(tag, now())?;
        assert!(tx.get_entity(tag)?.map(|e| e.deleted).unwrap_or(false));
        assert!(tx.get_edges_from(scene, EdgeType::SceneTag)?.is_empty());
        Ok(())
    }

    #[test]
    fn ref_fields_are_indexed_for_lookup() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let (studio, scene) = (EntityId::new(), EntityId::new());
        tx.insert_entity(studio, TargetType::Studio, now())?;
        tx.insert_entity(scene, TargetType::Scene, now())?;
        tx.set_field(scene, "studio_id", &FieldValue::Ref(studio))?;
        assert_eq!(tx.get_entities_referencing("studio_id", studio)?, vec![scene]);
        tx.clear_field(scene, "studio_id")?;
        assert!(tx.get_entities_referencing("studio_id", studio)?.is_empty());
        Ok(())
    }

    #[test]
    fn votes_replace_per_user_and_cascade_with_edit() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let edit = pending_edit(UserId::new(), None);
        tx.insert_edit(&edit)?;
        let voter = UserId::new();
        for vote in [VoteType::Accept, VoteType::Reject] {
            tx.upsert_vote(&EditVote { edit_id: edit.id, user_id: voter, vote, created_at: now() })?;
        }
        let votes = tx.get_votes(edit.id)?;
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].vote, VoteType::Reject);

        tx.insert_comment(&EditComment {
            id: CommentId::new(),
            edit_id: edit.id,
            user_id: None,
            text: "note".into(),
            created_at: now(),
        })?;
        assert!(tx.delete_edit(edit.id)?);
        assert!(tx.get_votes(edit.id)?.is_empty());
        assert!(tx.get_comments(edit.id)?.is_empty());
        assert!(!tx.delete_edit(edit.id)?);
        Ok(())
    }

    #[test]
    fn counts_edits_by_status() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let user = UserId::new();
        let at = now();
        for status in [EditStatus::Accepted, EditStatus::ImmediateAccepted, EditStatus::Rejected] {
            let mut edit = pending_edit(user, None);
            edit.close(status, at);
            tx.insert_edit(&edit)?;
        }
        tx.insert_edit(&pending_edit(user, None))?;
        let accepted = tx.count_user_edits_by_status(user, &[EditStatus::Accepted, EditStatus::ImmediateAccepted])?;
        assert_eq!(accepted, 2);
        assert_eq!(tx.count_user_edits_by_status(user, &[])?, 0);
        Ok(())
    }

    #[test]
    fn mod_audit_filtering_and_expiry() -> Result<(), Box<dyn std::error::Error>> {
        let mut storage = SqliteStorage::open_in_memory()?;
        let tx = storage.transaction()?;
        let (admin_a, admin_b) = (UserId::new(), UserId::new());
        let old = now() - Duration::days(40);
        for (admin, at) in [(admin_a, old), (admin_a, now()), (admin_b, now())] {
            tx.insert_mod_audit(&ModAudit {
                id: AuditId::new(),
                action: AuditAction::EditDelete,
                user_id: admin,
                target_id: EditId::new(),
                target_type: TargetType::Tag,
                data: "{}".into(),
                digest: [7u8; 32],
                reason: "cleanup".into(),
                created_at: at,
            })?;
        }
        let by_a = AuditFilter { user_id: Some(admin_a), ..Default::default() };
        assert_eq!(tx.count_mod_audits(&by_a)?, 2);
        assert_eq!(tx.get_mod_audits(&AuditFilter { limit: Some(2), ..Default::default() })?.len(), 2);
        assert_eq!(tx.delete_mod_audits_before(now() - Duration::days(30))?, 1);
        assert_eq!(tx.count_mod_audits(&AuditFilter::default())?, 2);
        Ok(())
    }
}
