//! Organizations and memberships.
//!
//! Organizations exist so a node can be shared with everyone in a company,
//! school, or community at once. Membership is a leaf dependency of the
//! permission resolver: an organization-scoped policy applies to a subject
//! exactly when a membership row links them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of entity an organization represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgType {
  Company,
  School,
  Community,
  Other,
}

impl OrgType {
  /// The discriminant string stored in the `org_type` column.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Company => "company",
      Self::School => "school",
      Self::Community => "community",
      Self::Other => "other",
    }
  }
}

/// A named entity users can belong to. Unique per (name, type); creation is
/// idempotent on that key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
  pub org_id:     Uuid,
  pub name:       String,
  pub org_type:   OrgType,
  pub metadata:   Option<serde_json::Value>,
  pub created_at: DateTime<Utc>,
}

/// A member's role within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
  Member,
  Admin,
}

impl OrgRole {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Member => "member",
      Self::Admin => "admin",
    }
  }
}

/// Membership of one user in one organization. At most one row exists per
/// (organization, user) pair; re-joining updates the role in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgMember {
  pub org_id:    Uuid,
  pub user_id:   Uuid,
  pub role:      OrgRole,
  pub joined_at: DateTime<Utc>,
}
