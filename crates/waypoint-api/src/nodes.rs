//! Handlers for `/nodes` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/nodes` | Body: `{"meta": {...}, "parent_id": ...}` |
//! | `GET`    | `/nodes/:id` | 404 for missing *and* denied nodes |
//! | `PUT`    | `/nodes/:id` | owner only |
//! | `POST`   | `/nodes/:id/move` | owner only; body: `{"new_parent_id": ...}` |
//! | `DELETE` | `/nodes/:id` | owner only; cascades over the subtree |
//! | `GET`    | `/nodes/:id/access` | the caller's decision for this node |
//! | `POST`   | `/access/checks` | batched decisions for many nodes |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use waypoint_core::{
  access::{self, AccessSubject, Grant, GrantSource},
  node::{NewNode, NodeMeta, TimelineNode},
  policy::{PolicyAction, Visibility},
  store::TimelineStore,
};

use crate::{error::ApiError, identity::Caller};

// ─── Gates ───────────────────────────────────────────────────────────────────

/// Map resolver failures onto the HTTP taxonomy.
fn check_error<E>(err: access::CheckError<E>) -> ApiError
where
  E: std::error::Error + waypoint_core::Classify + Send + Sync + 'static,
{
  ApiError::from_classified(err)
}

/// The ownership gate for mutating operations: the caller must hold an edit
/// grant (today that means being the owner). Denied callers get 403; they
/// already learned the node exists, so there is nothing left to hide.
pub(crate) async fn require_edit<S: TimelineStore>(
  store: &S,
  node_id: Uuid,
  caller: &AccessSubject,
) -> Result<(), ApiError> {
  let grant = access::check(store, node_id, caller, PolicyAction::Edit)
    .await
    .map_err(check_error)?;
  match grant {
    Some(_) => Ok(()),
    None => Err(ApiError::Forbidden(format!("no edit access to node {node_id}"))),
  }
}

/// The view gate for reads: a deny is indistinguishable from a missing node
/// so unshared nodes do not leak their existence.
pub(crate) async fn require_view<S: TimelineStore>(
  store: &S,
  node_id: Uuid,
  caller: &AccessSubject,
) -> Result<Grant, ApiError> {
  let grant = access::check(store, node_id, caller, PolicyAction::View)
    .await
    .map_err(check_error)?;
  grant.ok_or_else(|| ApiError::NotFound(format!("node {node_id} not found")))
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateNodeBody {
  pub meta:      NodeMeta,
  pub parent_id: Option<Uuid>,
}

/// `POST /nodes`
pub async fn create<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<CreateNodeBody>,
) -> Result<impl IntoResponse, ApiError> {
  let owner_id = caller.require_user()?;

  let node = store
    .create_node(NewNode {
      owner_id,
      parent_id: body.parent_id,
      meta: body.meta,
    })
    .await
    .map_err(ApiError::from_classified)?;
  Ok((StatusCode::CREATED, Json(node)))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

/// A node together with the level the caller was granted. The presentation
/// layer decides which fields an `overview` grant actually renders.
#[derive(Debug, Serialize)]
pub struct NodeView {
  pub node:  TimelineNode,
  pub level: Visibility,
}

/// `GET /nodes/:id`
pub async fn get_one<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<NodeView>, ApiError> {
  let grant = require_view(store.as_ref(), id, &caller.0).await?;

  let node = store
    .get_node(id)
    .await
    .map_err(ApiError::from_classified)?
    .ok_or_else(|| ApiError::NotFound(format!("node {id} not found")))?;

  Ok(Json(NodeView { node, level: grant.level }))
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpdateNodeBody {
  pub meta: NodeMeta,
}

/// `PUT /nodes/:id`
pub async fn update<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<UpdateNodeBody>,
) -> Result<Json<TimelineNode>, ApiError> {
  require_edit(store.as_ref(), id, &caller.0).await?;

  let node = store
    .update_node(id, body.meta)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(node))
}

// ─── Move ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MoveNodeBody {
  /// `None` detaches the node into a new root.
  pub new_parent_id: Option<Uuid>,
}

/// `POST /nodes/:id/move`
pub async fn move_one<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<MoveNodeBody>,
) -> Result<Json<TimelineNode>, ApiError> {
  require_edit(store.as_ref(), id, &caller.0).await?;

  let node = store
    .move_node(id, body.new_parent_id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(node))
}

// ─── Delete ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
  pub deleted: usize,
}

/// `DELETE /nodes/:id` — removes the subtree, then its policies.
pub async fn delete_one<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, ApiError> {
  require_edit(store.as_ref(), id, &caller.0).await?;

  let deleted = store.delete_node(id).await.map_err(ApiError::from_classified)?;
  store
    .delete_policies_for_nodes(&deleted)
    .await
    .map_err(ApiError::from_classified)?;

  Ok(Json(DeleteResponse { deleted: deleted.len() }))
}

// ─── Access probe ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AccessResponse {
  pub allowed: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub level:   Option<Visibility>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source:  Option<GrantSource>,
}

impl From<Option<Grant>> for AccessResponse {
  fn from(grant: Option<Grant>) -> Self {
    match grant {
      Some(Grant { level, source }) => AccessResponse {
        allowed: true,
        level:   Some(level),
        source:  Some(source),
      },
      None => AccessResponse { allowed: false, level: None, source: None },
    }
  }
}

/// `GET /nodes/:id/access` — the caller's own decision for this node.
/// A deny is a normal 200 response, not an error.
pub async fn access_probe<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<AccessResponse>, ApiError> {
  let grant = access::check(store.as_ref(), id, &caller.0, PolicyAction::View)
    .await
    .map_err(check_error)?;
  Ok(Json(grant.into()))
}

// ─── Batched access checks ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BatchProbe {
  pub node_id: Uuid,
  pub action:  PolicyAction,
}

/// `POST /access/checks` — resolve many (node, action) probes for the
/// caller in one round trip. Results are positional. Any missing node fails
/// the whole request with 404, matching the single-node contract.
pub async fn batch_access<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<Vec<BatchProbe>>,
) -> Result<Json<Vec<AccessResponse>>, ApiError> {
  let probes: Vec<(Uuid, PolicyAction)> =
    body.iter().map(|p| (p.node_id, p.action)).collect();

  let grants = access::check_many(store.as_ref(), &caller.0, &probes)
    .await
    .map_err(check_error)?;
  Ok(Json(grants.into_iter().map(AccessResponse::from).collect()))
}
