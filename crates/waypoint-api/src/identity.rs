//! Caller identity extraction.
//!
//! Session handling lives outside this service: an upstream gateway
//! authenticates the user and injects the trusted `x-user-id` header.
//! Requests without the header are the anonymous public. This core never
//! re-derives who is calling — it only evaluates the subject it is given.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;
use waypoint_core::access::AccessSubject;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The requesting subject, extracted from `x-user-id`.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub AccessSubject);

impl Caller {
  /// The authenticated user id, or 401 for anonymous callers.
  pub fn require_user(&self) -> Result<Uuid, ApiError> {
    self
      .0
      .user_id()
      .ok_or_else(|| ApiError::Unauthorized("authentication required".into()))
  }
}

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    let Some(value) = parts.headers.get(USER_ID_HEADER) else {
      return Ok(Caller(AccessSubject::Public));
    };

    let raw = value
      .to_str()
      .map_err(|_| ApiError::BadRequest(format!("{USER_ID_HEADER} is not valid UTF-8")))?;
    let user_id = Uuid::parse_str(raw)
      .map_err(|_| ApiError::BadRequest(format!("{USER_ID_HEADER} is not a valid UUID")))?;

    Ok(Caller(AccessSubject::User { user_id }))
  }
}
