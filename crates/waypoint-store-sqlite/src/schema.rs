//! SQL schema for the Waypoint SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS nodes (
    node_id    TEXT PRIMARY KEY,
    owner_id   TEXT NOT NULL,
    kind       TEXT NOT NULL,   -- discriminant of NodeMeta variant
    meta_json  TEXT NOT NULL,   -- JSON payload (inner data only)
    parent_id  TEXT REFERENCES nodes(node_id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    updated_at TEXT NOT NULL
);

-- Materialised transitive closure of the parent/child relation.
-- Every node has a depth-0 self row; every reachable ancestor/descendant
-- pair has exactly one row. Rewritten transactionally on every move.
CREATE TABLE IF NOT EXISTS node_closure (
    ancestor_id   TEXT NOT NULL,
    descendant_id TEXT NOT NULL,
    depth         INTEGER NOT NULL,
    UNIQUE (ancestor_id, descendant_id)
);

-- Policies are not FK-bound to nodes: the cascade after a node deletion is
-- an explicit separate call, and rows must stay deletable afterwards.
CREATE TABLE IF NOT EXISTS node_policies (
    policy_id    TEXT PRIMARY KEY,
    node_id      TEXT NOT NULL,
    subject_type TEXT NOT NULL,  -- 'user' | 'organization' | 'public'
    subject_id   TEXT,           -- NULL iff subject_type = 'public'
    action       TEXT NOT NULL,  -- 'view' | 'edit'
    level        TEXT NOT NULL,  -- 'overview' | 'full'
    effect       TEXT NOT NULL,  -- 'allow' | 'deny'
    expires_at   TEXT,           -- NULL = never expires
    created_by   TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS organizations (
    org_id     TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    org_type   TEXT NOT NULL,   -- 'company' | 'school' | 'community' | 'other'
    metadata   TEXT,            -- JSON or NULL
    created_at TEXT NOT NULL,
    UNIQUE (name, org_type)
);

CREATE TABLE IF NOT EXISTS org_members (
    org_id    TEXT NOT NULL REFERENCES organizations(org_id),
    user_id   TEXT NOT NULL,
    role      TEXT NOT NULL,    -- 'member' | 'admin'
    joined_at TEXT NOT NULL,
    UNIQUE (org_id, user_id)
);

CREATE INDEX IF NOT EXISTS nodes_owner_idx        ON nodes(owner_id);
CREATE INDEX IF NOT EXISTS nodes_parent_idx       ON nodes(parent_id);
CREATE INDEX IF NOT EXISTS closure_descendant_idx ON node_closure(descendant_id);
CREATE INDEX IF NOT EXISTS policies_node_idx      ON node_policies(node_id, subject_type, subject_id);
CREATE INDEX IF NOT EXISTS org_members_user_idx   ON org_members(user_id);

PRAGMA user_version = 1;
";
