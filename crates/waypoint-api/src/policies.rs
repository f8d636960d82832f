//! Handlers for `/nodes/:id/policies` endpoints.
//!
//! All three routes pass the ownership gate before touching the policy
//! store; the gate runs immediately before the store call so a concurrent
//! ownership change cannot slip between check and write on this serialised
//! backend.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use waypoint_core::{
  policy::{NewPolicy, NodePolicy, PolicyAction, PolicyEffect, PolicySubject, Visibility},
  store::TimelineStore,
};

use crate::{error::ApiError, identity::Caller, nodes::require_edit};

// ─── List ────────────────────────────────────────────────────────────────────

/// `GET /nodes/:id/policies` — owner only; sharing rules are themselves
/// private.
pub async fn list<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<NodePolicy>>, ApiError> {
  require_edit(store.as_ref(), id, &caller.0).await?;

  let policies = store
    .policies_for_node(id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(policies))
}

// ─── Replace ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PolicyBody {
  #[serde(flatten)]
  pub subject:    PolicySubject,
  pub action:     PolicyAction,
  pub level:      Visibility,
  pub effect:     PolicyEffect,
  #[serde(default)]
  pub expires_at: Option<DateTime<Utc>>,
}

/// `PUT /nodes/:id/policies` — replaces the node's whole policy set.
/// Malformed subject combinations are rejected by deserialisation before
/// anything is written.
pub async fn set<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<Vec<PolicyBody>>,
) -> Result<impl IntoResponse, ApiError> {
  let user_id = caller.require_user()?;
  require_edit(store.as_ref(), id, &caller.0).await?;

  let policies = body
    .into_iter()
    .map(|p| NewPolicy {
      subject:    p.subject,
      action:     p.action,
      level:      p.level,
      effect:     p.effect,
      expires_at: p.expires_at,
    })
    .collect();

  let written = store
    .set_policies(id, policies, user_id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok((StatusCode::OK, Json(written)))
}

// ─── Delete one ──────────────────────────────────────────────────────────────

/// `DELETE /nodes/:id/policies/:policy_id`
pub async fn delete_one<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path((id, policy_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
  require_edit(store.as_ref(), id, &caller.0).await?;

  store
    .delete_policy(id, policy_id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(StatusCode::NO_CONTENT)
}
