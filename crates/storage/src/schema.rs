use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

// Timestamps are milliseconds since the Unix epoch; ids are 16-byte UUIDs.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS entities (
    entity_id BLOB PRIMARY KEY CHECK (length(entity_id) = 16),
    entity_type TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    deleted_at INTEGER
);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities (entity_type) WHERE deleted_at IS NULL;

CREATE TABLE IF NOT EXISTS fields (
    entity_id BLOB NOT NULL REFERENCES entities (entity_id),
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    ref_id BLOB CHECK (ref_id IS NULL OR length(ref_id) = 16),
    PRIMARY KEY (entity_id, field_key)
);
CREATE INDEX IF NOT EXISTS idx_fields_ref ON fields (field_key, ref_id) WHERE ref_id IS NOT NULL;

CREATE TABLE IF NOT EXISTS list_members (
    rowid INTEGER PRIMARY KEY,
    entity_id BLOB NOT NULL REFERENCES entities (entity_id),
    list_key TEXT NOT NULL,
    member BLOB NOT NULL,
    UNIQUE (entity_id, list_key, member)
);

CREATE TABLE IF NOT EXISTS edges (
    rowid INTEGER PRIMARY KEY,
    edge_type TEXT NOT NULL,
    source_id BLOB NOT NULL REFERENCES entities (entity_id),
    target_id BLOB NOT NULL REFERENCES entities (entity_id),
    alias TEXT,
    UNIQUE (edge_type, source_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges (target_id, edge_type);

CREATE TABLE IF NOT EXISTS redirects (
    source_id BLOB PRIMARY KEY REFERENCES entities (entity_id),
    target_id BLOB NOT NULL REFERENCES entities (entity_id),
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_redirects_target ON redirects (target_id);

CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY CHECK (length(user_id) = 16),
    name TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_roles (
    user_id BLOB NOT NULL REFERENCES users (user_id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    PRIMARY KEY (user_id, role)
);

CREATE TABLE IF NOT EXISTS edits (
    edit_id BLOB PRIMARY KEY CHECK (length(edit_id) = 16),
    user_id BLOB,
    target_type TEXT NOT NULL,
    operation TEXT NOT NULL,
    status TEXT NOT NULL,
    target_id BLOB,
    merge_sources BLOB NOT NULL,
    details BLOB NOT NULL,
    vote_count INTEGER NOT NULL DEFAULT 0,
    update_count INTEGER NOT NULL DEFAULT 0,
    applied INTEGER NOT NULL DEFAULT 0,
    bot INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER,
    closed_at INTEGER,
    CHECK ((status = 'pending') = (closed_at IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_edits_status ON edits (status, created_at);
CREATE INDEX IF NOT EXISTS idx_edits_target ON edits (target_id);
CREATE INDEX IF NOT EXISTS idx_edits_user ON edits (user_id, status);

CREATE TABLE IF NOT EXISTS edit_votes (
    edit_id BLOB NOT NULL REFERENCES edits (edit_id) ON DELETE CASCADE,
    user_id BLOB NOT NULL,
    vote TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (edit_id, user_id)
);

CREATE TABLE IF NOT EXISTS edit_comments (
    comment_id BLOB PRIMARY KEY CHECK (length(comment_id) = 16),
    edit_id BLOB NOT NULL REFERENCES edits (edit_id) ON DELETE CASCADE,
    user_id BLOB,
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_edit_comments_edit ON edit_comments (edit_id, created_at);

CREATE TABLE IF NOT EXISTS mod_audits (
    audit_id BLOB PRIMARY KEY CHECK (length(audit_id) = 16),
    action TEXT NOT NULL,
    user_id BLOB NOT NULL,
    target_id BLOB NOT NULL,
    target_type TEXT NOT NULL,
    data TEXT NOT NULL,
    digest BLOB NOT NULL CHECK (length(digest) = 32),
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_mod_audits_created ON mod_audits (created_at);
";
