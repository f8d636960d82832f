//! Error type for `waypoint-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;
use waypoint_core::{Classify, ErrorKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] waypoint_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  /// A stored discriminant or timestamp no longer decodes.
  #[error("malformed stored value: {0}")]
  Decode(String),

  #[error("node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("parent node {0} does not exist or belongs to another user")]
  InvalidParent(Uuid),

  #[error("moving {node_id} under {new_parent_id} would create a cycle")]
  CycleDetected { node_id: Uuid, new_parent_id: Uuid },

  #[error("organization not found: {0}")]
  OrganizationNotFound(Uuid),

  #[error("user {user_id} is not a member of organization {org_id}")]
  MembershipNotFound { org_id: Uuid, user_id: Uuid },

  #[error("policy {policy_id} not found on node {node_id}")]
  PolicyNotFound { node_id: Uuid, policy_id: Uuid },
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Error::Core(e) => e.kind(),
      Error::NodeNotFound(_)
      | Error::OrganizationNotFound(_)
      | Error::MembershipNotFound { .. }
      | Error::PolicyNotFound { .. } => ErrorKind::NotFound,
      Error::InvalidParent(_) => ErrorKind::InvalidParent,
      Error::CycleDetected { .. } => ErrorKind::CycleDetected,
      Error::Database(_) | Error::Json(_) | Error::Uuid(_) | Error::Decode(_) => {
        ErrorKind::Storage
      }
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
