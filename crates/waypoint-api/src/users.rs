//! Handlers for `/users/:id` endpoints — the profile-view path.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
};
use uuid::Uuid;
use waypoint_core::{
  filter::{self, VisibleNode},
  org::Organization,
  store::TimelineStore,
};

use crate::{error::ApiError, identity::Caller};

/// `GET /users/:id/nodes` — the subset of `id`'s timeline visible to the
/// caller, each node annotated with its granted level. Owners viewing their
/// own profile get everything at `full` without policy evaluation.
pub async fn visible_nodes<S: TimelineStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(owner_id): Path<Uuid>,
) -> Result<Json<Vec<VisibleNode>>, ApiError> {
  let nodes = store
    .list_by_owner(owner_id)
    .await
    .map_err(ApiError::from_classified)?;

  let visible = filter::filter_visible(store.as_ref(), &caller.0, nodes)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(visible))
}

/// `GET /users/:id/organizations`
pub async fn organizations<S: TimelineStore>(
  State(store): State<Arc<S>>,
  Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<Organization>>, ApiError> {
  let orgs = store
    .organizations_for_user(user_id)
    .await
    .map_err(ApiError::from_classified)?;
  Ok(Json(orgs))
}
