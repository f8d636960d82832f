//! Handlers for `/organizations` endpoints.
//!
//! Organization administration (who may rename, who may remove members) is
//! an upstream concern; these routes only require an authenticated caller
//! for mutations.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;
use waypoint_core::{
  org::{OrgMember, OrgRole, OrgType, Organization},
  store::TimelineStore,
};

use crate::{error::ApiError, identity::Caller};

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateOrgBody {
  pub name:     String,
  pub org_type: OrgType,
  #[serde(default)]
  pub metadata: Option<serde_json::Value>,
}

/// `POST /organizations` — idempotent by (name, type): re-posting an
/// existing pair returns the original row unchanged.
pub async fn create<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<CreateOrgBody>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_user()?;

  let org = store
    .create_organization(body.name, body.org_type, body.metadata)
    .await
    .map_err(ApiError::from_classified)?;
  Ok((StatusCode::CREATED, Json(org)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// `GET /organizations/:id`
pub async fn get_one<S: TimelineStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Organization>, ApiError> {
  let org = store
    .get_organization(id)
    .await
    .map_err(ApiError::from_classified)?
    .ok_or_else(|| ApiError::NotFound(format!("organization {id} not found")))?;
  Ok(Json(org))
}

// ─── Members ─────────────────────────────────────────────────────────────────

/// `GET /organizations/:id/members`
pub async fn members<S: TimelineStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<OrgMember>>, ApiError> {
  let members = store
    .list_members(id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(members))
}

#[derive(Debug, Deserialize)]
pub struct MemberBody {
  pub role: OrgRole,
}

/// `PUT /organizations/:id/members/:user_id` — join, or change role.
pub async fn put_member<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path((org_id, user_id)): Path<(Uuid, Uuid)>,
  Json(body): Json<MemberBody>,
) -> Result<Json<OrgMember>, ApiError> {
  caller.require_user()?;

  let member = store
    .add_member(org_id, user_id, body.role)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(member))
}

/// `DELETE /organizations/:id/members/:user_id`
pub async fn delete_member<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path((org_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
  caller.require_user()?;

  store
    .remove_member(org_id, user_id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(StatusCode::NO_CONTENT)
}
