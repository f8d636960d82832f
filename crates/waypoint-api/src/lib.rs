//! JSON REST API for Waypoint.
//!
//! Exposes an axum [`Router`] backed by any
//! [`waypoint_core::store::TimelineStore`]. Session auth, TLS, and transport
//! concerns are the caller's responsibility; the trusted `x-user-id` header
//! carries the authenticated identity (see [`identity`]).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", waypoint_api::api_router(store.clone()))
//! ```

pub mod error;
pub mod identity;
pub mod nodes;
pub mod orgs;
pub mod policies;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use waypoint_core::store::TimelineStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: TimelineStore + 'static,
{
  Router::new()
    // Nodes
    .route("/nodes", post(nodes::create::<S>))
    .route(
      "/nodes/{id}",
      get(nodes::get_one::<S>)
        .put(nodes::update::<S>)
        .delete(nodes::delete_one::<S>),
    )
    .route("/nodes/{id}/move", post(nodes::move_one::<S>))
    .route("/nodes/{id}/access", get(nodes::access_probe::<S>))
    .route("/access/checks", post(nodes::batch_access::<S>))
    // Policies
    .route(
      "/nodes/{id}/policies",
      get(policies::list::<S>).put(policies::set::<S>),
    )
    .route(
      "/nodes/{id}/policies/{policy_id}",
      delete(policies::delete_one::<S>),
    )
    // Profile view
    .route("/users/{id}/nodes", get(users::visible_nodes::<S>))
    .route("/users/{id}/organizations", get(users::organizations::<S>))
    // Organizations
    .route("/organizations", post(orgs::create::<S>))
    .route("/organizations/{id}", get(orgs::get_one::<S>))
    .route("/organizations/{id}/members", get(orgs::members::<S>))
    .route(
      "/organizations/{id}/members/{user_id}",
      put(orgs::put_member::<S>).delete(orgs::delete_member::<S>),
    )
    .with_state(store)
}

// ─── Integration tests ───────────────────────────────────────────────────────
