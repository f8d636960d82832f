//! Error types for `waypoint-core`.

use thiserror::Error;

/// Coarse classification of an error, used by transport layers to pick a
/// response status without matching on concrete backend error types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// A referenced node, organization, membership, or policy does not exist.
  NotFound,
  /// A hierarchy mutation named a parent outside the owner's forest.
  InvalidParent,
  /// A hierarchy mutation would create a cycle.
  CycleDetected,
  /// Malformed input (unknown enum value, subject type/id mismatch, ...).
  Validation,
  /// Underlying storage failure. Callers must fail closed.
  Storage,
}

/// Implemented by every error type that crosses the store boundary, so the
/// API layer can map errors to statuses generically.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown subject type: {0:?}")]
  UnknownSubjectType(String),

  #[error("subject type {0:?} requires a subject id")]
  SubjectIdMissing(&'static str),

  #[error("public policies must not carry a subject id")]
  SubjectIdForbidden,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      // A serde failure here means a stored payload no longer decodes, not
      // bad caller input.
      Error::Serialization(_) => ErrorKind::Storage,
      _ => ErrorKind::Validation,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
