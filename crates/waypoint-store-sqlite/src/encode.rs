//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings (which keeps SQL range
//! comparisons textual). Metadata payloads are stored as compact JSON next
//! to their kind discriminant. UUIDs are stored as hyphenated lowercase
//! strings.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use waypoint_core::{
  node::{NodeMeta, TimelineNode},
  org::{OrgMember, OrgRole, OrgType, Organization},
  policy::{NodePolicy, PolicyAction, PolicyEffect, PolicySubject, Visibility},
};

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

// ─── Enum discriminants ──────────────────────────────────────────────────────

pub fn decode_org_type(s: &str) -> Result<OrgType> {
  match s {
    "company" => Ok(OrgType::Company),
    "school" => Ok(OrgType::School),
    "community" => Ok(OrgType::Community),
    "other" => Ok(OrgType::Other),
    other => Err(Error::Decode(format!("unknown org type: {other:?}"))),
  }
}

pub fn decode_org_role(s: &str) -> Result<OrgRole> {
  match s {
    "member" => Ok(OrgRole::Member),
    "admin" => Ok(OrgRole::Admin),
    other => Err(Error::Decode(format!("unknown org role: {other:?}"))),
  }
}

pub fn decode_action(s: &str) -> Result<PolicyAction> {
  match s {
    "view" => Ok(PolicyAction::View),
    "edit" => Ok(PolicyAction::Edit),
    other => Err(Error::Decode(format!("unknown policy action: {other:?}"))),
  }
}

pub fn decode_visibility(s: &str) -> Result<Visibility> {
  match s {
    "overview" => Ok(Visibility::Overview),
    "full" => Ok(Visibility::Full),
    other => Err(Error::Decode(format!("unknown visibility level: {other:?}"))),
  }
}

pub fn decode_effect(s: &str) -> Result<PolicyEffect> {
  match s {
    "allow" => Ok(PolicyEffect::Allow),
    "deny" => Ok(PolicyEffect::Deny),
    other => Err(Error::Decode(format!("unknown policy effect: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `nodes` row.
pub struct RawNode {
  pub node_id:    String,
  pub owner_id:   String,
  pub kind:       String,
  pub meta_json:  String,
  pub parent_id:  Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawNode {
  /// Column list matching [`RawNode::from_row`]; keep the two in sync.
  pub const COLUMNS: &'static str =
    "node_id, owner_id, kind, meta_json, parent_id, created_at, updated_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      node_id:    row.get(0)?,
      owner_id:   row.get(1)?,
      kind:       row.get(2)?,
      meta_json:  row.get(3)?,
      parent_id:  row.get(4)?,
      created_at: row.get(5)?,
      updated_at: row.get(6)?,
    })
  }

  pub fn into_node(self) -> Result<TimelineNode> {
    let data: serde_json::Value = serde_json::from_str(&self.meta_json)?;
    let meta = NodeMeta::from_parts(&self.kind, data).map_err(Error::Core)?;

    Ok(TimelineNode {
      node_id:    decode_uuid(&self.node_id)?,
      owner_id:   decode_uuid(&self.owner_id)?,
      parent_id:  self.parent_id.as_deref().map(decode_uuid).transpose()?,
      meta,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from an `organizations` row.
pub struct RawOrganization {
  pub org_id:     String,
  pub name:       String,
  pub org_type:   String,
  pub metadata:   Option<String>,
  pub created_at: String,
}

impl RawOrganization {
  pub const COLUMNS: &'static str = "org_id, name, org_type, metadata, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      org_id:     row.get(0)?,
      name:       row.get(1)?,
      org_type:   row.get(2)?,
      metadata:   row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_organization(self) -> Result<Organization> {
    Ok(Organization {
      org_id:     decode_uuid(&self.org_id)?,
      name:       self.name,
      org_type:   decode_org_type(&self.org_type)?,
      metadata:   self
        .metadata
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `org_members` row.
pub struct RawOrgMember {
  pub org_id:    String,
  pub user_id:   String,
  pub role:      String,
  pub joined_at: String,
}

impl RawOrgMember {
  pub const COLUMNS: &'static str = "org_id, user_id, role, joined_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      org_id:    row.get(0)?,
      user_id:   row.get(1)?,
      role:      row.get(2)?,
      joined_at: row.get(3)?,
    })
  }

  pub fn into_member(self) -> Result<OrgMember> {
    Ok(OrgMember {
      org_id:    decode_uuid(&self.org_id)?,
      user_id:   decode_uuid(&self.user_id)?,
      role:      decode_org_role(&self.role)?,
      joined_at: decode_dt(&self.joined_at)?,
    })
  }
}

/// Raw strings read directly from a `node_policies` row.
pub struct RawPolicy {
  pub policy_id:    String,
  pub node_id:      String,
  pub subject_type: String,
  pub subject_id:   Option<String>,
  pub action:       String,
  pub level:        String,
  pub effect:       String,
  pub expires_at:   Option<String>,
  pub created_by:   String,
  pub created_at:   String,
}

impl RawPolicy {
  pub const COLUMNS: &'static str = "policy_id, node_id, subject_type, subject_id, \
     action, level, effect, expires_at, created_by, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      policy_id:    row.get(0)?,
      node_id:      row.get(1)?,
      subject_type: row.get(2)?,
      subject_id:   row.get(3)?,
      action:       row.get(4)?,
      level:        row.get(5)?,
      effect:       row.get(6)?,
      expires_at:   row.get(7)?,
      created_by:   row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_policy(self) -> Result<NodePolicy> {
    let subject_id = self.subject_id.as_deref().map(decode_uuid).transpose()?;
    let subject = PolicySubject::from_parts(&self.subject_type, subject_id)
      .map_err(Error::Core)?;

    Ok(NodePolicy {
      policy_id:  decode_uuid(&self.policy_id)?,
      node_id:    decode_uuid(&self.node_id)?,
      subject,
      action:     decode_action(&self.action)?,
      level:      decode_visibility(&self.level)?,
      effect:     decode_effect(&self.effect)?,
      expires_at: self.expires_at.as_deref().map(decode_dt).transpose()?,
      created_by: decode_uuid(&self.created_by)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
