//! Access policies — the sharing rules attached to individual nodes.
//!
//! A policy never spans the hierarchy: sharing a subtree means writing one
//! policy per node in it. This keeps deny precedence unambiguous — a deny on
//! a node can only ever be contradicted by policies on that same node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// The operation a policy grants or denies.
///
/// Only `View` is written by the sharing flows today; `Edit` exists so the
/// ownership gate and future delegation share one vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
  View,
  Edit,
}

impl PolicyAction {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::View => "view",
      Self::Edit => "edit",
    }
  }
}

/// How much detail a grant exposes. The derived ordering is load-bearing:
/// later variants are strictly more permissive, and new intermediate levels
/// may be inserted without touching the resolver.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
  /// Title, kind, and date range only.
  Overview,
  /// The complete node payload.
  Full,
}

impl Visibility {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Overview => "overview",
      Self::Full => "full",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyEffect {
  Allow,
  Deny,
}

impl PolicyEffect {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Allow => "allow",
      Self::Deny => "deny",
    }
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

/// Who a policy applies to.
///
/// The shape makes the storage invariant unrepresentable in Rust: a subject
/// id is present exactly when the subject type requires one. Wire and
/// database representations are re-validated through [`PolicySubject::from_parts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subject_type", rename_all = "lowercase")]
pub enum PolicySubject {
  User { user_id: Uuid },
  Organization { org_id: Uuid },
  Public,
}

impl PolicySubject {
  /// The discriminant string stored in the `subject_type` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::User { .. } => "user",
      Self::Organization { .. } => "organization",
      Self::Public => "public",
    }
  }

  /// The id stored in the `subject_id` column; `None` only for `Public`.
  pub fn subject_id(&self) -> Option<Uuid> {
    match self {
      Self::User { user_id } => Some(*user_id),
      Self::Organization { org_id } => Some(*org_id),
      Self::Public => None,
    }
  }

  /// Rebuild from the split column representation, rejecting the malformed
  /// combinations (missing id for user/organization, spurious id for public).
  pub fn from_parts(subject_type: &str, subject_id: Option<Uuid>) -> Result<Self> {
    match (subject_type, subject_id) {
      ("user", Some(user_id)) => Ok(Self::User { user_id }),
      ("user", None) => Err(Error::SubjectIdMissing("user")),
      ("organization", Some(org_id)) => Ok(Self::Organization { org_id }),
      ("organization", None) => Err(Error::SubjectIdMissing("organization")),
      ("public", None) => Ok(Self::Public),
      ("public", Some(_)) => Err(Error::SubjectIdForbidden),
      (other, _) => Err(Error::UnknownSubjectType(other.to_string())),
    }
  }
}

// ─── NodePolicy ──────────────────────────────────────────────────────────────

/// A single access rule attached to one node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePolicy {
  pub policy_id:  Uuid,
  pub node_id:    Uuid,
  #[serde(flatten)]
  pub subject:    PolicySubject,
  pub action:     PolicyAction,
  pub level:      Visibility,
  pub effect:     PolicyEffect,
  /// Lazy expiry: an expired row is treated as absent by the resolver even
  /// before the periodic sweep physically deletes it.
  pub expires_at: Option<DateTime<Utc>>,
  pub created_by: Uuid,
  pub created_at: DateTime<Utc>,
}

impl NodePolicy {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|at| at <= now)
  }
}

// ─── NewPolicy ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::TimelineStore::set_policies`].
/// Id, creator, and creation timestamp are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewPolicy {
  pub subject:    PolicySubject,
  pub action:     PolicyAction,
  pub level:      Visibility,
  pub effect:     PolicyEffect,
  pub expires_at: Option<DateTime<Utc>>,
}

impl NewPolicy {
  /// Convenience constructor for a non-expiring allow rule.
  pub fn allow(subject: PolicySubject, action: PolicyAction, level: Visibility) -> Self {
    Self { subject, action, level, effect: PolicyEffect::Allow, expires_at: None }
  }

  /// Convenience constructor for a non-expiring deny rule.
  pub fn deny(subject: PolicySubject, action: PolicyAction, level: Visibility) -> Self {
    Self { subject, action, level, effect: PolicyEffect::Deny, expires_at: None }
  }
}
