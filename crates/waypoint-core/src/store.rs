//! The `TimelineStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `waypoint-store-sqlite`). Higher layers (the resolver, the batch filter,
//! `waypoint-api`) depend on this abstraction, not on any concrete backend.
//!
//! It covers three coupled concerns: the node hierarchy with its
//! materialized closure, the organization membership index, and the
//! per-node policy rows. A permission decision touches all three, so one
//! trait keeps the resolver's bounds simple.

use std::future::Future;

use uuid::Uuid;

use crate::{
  error::Classify,
  node::{NewNode, NodeMeta, TimelineNode},
  org::{OrgMember, OrgRole, OrgType, Organization},
  policy::{NewPolicy, NodePolicy},
};

/// Abstraction over a Waypoint storage backend.
///
/// Hierarchy mutations (`create_node`, `move_node`, `delete_node`) must be
/// atomic: the node row and every affected closure row commit together or
/// not at all. A partially applied move would corrupt the ancestor index and
/// could surface phantom access grants.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait TimelineStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Hierarchy ─────────────────────────────────────────────────────────

  /// Insert a node and its closure rows (the depth-0 self row plus one row
  /// per ancestor of the parent, depths incremented by one).
  ///
  /// Fails with an `InvalidParent`-classified error if `parent_id` is set
  /// but missing or owned by a different user.
  fn create_node(
    &self,
    input: NewNode,
  ) -> impl Future<Output = Result<TimelineNode, Self::Error>> + Send + '_;

  /// Replace a node's metadata payload and refresh `updated_at`.
  fn update_node(
    &self,
    node_id: Uuid,
    meta: NodeMeta,
  ) -> impl Future<Output = Result<TimelineNode, Self::Error>> + Send + '_;

  /// Re-parent a node (or detach it to a root when `new_parent_id` is
  /// `None`), rewriting the closure rows of the whole moved subtree.
  ///
  /// Fails with a `CycleDetected`-classified error if `new_parent_id` lies
  /// inside the node's own subtree (itself included), or `InvalidParent` as
  /// for [`TimelineStore::create_node`].
  fn move_node(
    &self,
    node_id: Uuid,
    new_parent_id: Option<Uuid>,
  ) -> impl Future<Output = Result<TimelineNode, Self::Error>> + Send + '_;

  /// Delete a node and every descendant, plus all closure rows referencing
  /// any of them. Returns the deleted node ids, deepest last; the caller is
  /// responsible for dropping policies on them via
  /// [`TimelineStore::delete_policies_for_nodes`].
  fn delete_node(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Retrieve a node by id. Returns `None` if not found.
  fn get_node(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Option<TimelineNode>, Self::Error>> + Send + '_;

  /// The node's ancestors, nearest first, excluding the node itself.
  fn ancestors(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TimelineNode>, Self::Error>> + Send + '_;

  /// The node's subtree in depth order. `include_self` controls whether the
  /// depth-0 entry (the node itself) is part of the result.
  fn descendants(
    &self,
    node_id: Uuid,
    include_self: bool,
  ) -> impl Future<Output = Result<Vec<TimelineNode>, Self::Error>> + Send + '_;

  /// Depth-1 descendants only.
  fn children(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TimelineNode>, Self::Error>> + Send + '_;

  /// All nodes belonging to one owner, in (created_at, id) order.
  fn list_by_owner(
    &self,
    owner_id: Uuid,
  ) -> impl Future<Output = Result<Vec<TimelineNode>, Self::Error>> + Send + '_;

  // ── Organizations ─────────────────────────────────────────────────────

  /// Create an organization, or return the existing one with the same
  /// (name, type) unchanged. Never errors on duplicates.
  fn create_organization(
    &self,
    name: String,
    org_type: OrgType,
    metadata: Option<serde_json::Value>,
  ) -> impl Future<Output = Result<Organization, Self::Error>> + Send + '_;

  fn get_organization(
    &self,
    org_id: Uuid,
  ) -> impl Future<Output = Result<Option<Organization>, Self::Error>> + Send + '_;

  /// Add a user to an organization, or update their role if already a
  /// member. Fails `NotFound`-classified if the organization is absent.
  fn add_member(
    &self,
    org_id: Uuid,
    user_id: Uuid,
    role: OrgRole,
  ) -> impl Future<Output = Result<OrgMember, Self::Error>> + Send + '_;

  /// Remove a membership. Fails `NotFound`-classified if it does not exist.
  fn remove_member(
    &self,
    org_id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn is_member(
    &self,
    user_id: Uuid,
    org_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  fn organizations_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Organization>, Self::Error>> + Send + '_;

  fn list_members(
    &self,
    org_id: Uuid,
  ) -> impl Future<Output = Result<Vec<OrgMember>, Self::Error>> + Send + '_;

  // ── Policies ──────────────────────────────────────────────────────────

  /// Atomically replace the policy set of one node. The ownership gate is
  /// the caller's responsibility (resolver check with `PolicyAction::Edit`
  /// immediately before this call).
  fn set_policies(
    &self,
    node_id: Uuid,
    policies: Vec<NewPolicy>,
    created_by: Uuid,
  ) -> impl Future<Output = Result<Vec<NodePolicy>, Self::Error>> + Send + '_;

  /// All non-expired policies attached to one node.
  fn policies_for_node(
    &self,
    node_id: Uuid,
  ) -> impl Future<Output = Result<Vec<NodePolicy>, Self::Error>> + Send + '_;

  /// All non-expired policies attached to any of `node_ids`, in one read.
  /// Used by the batch filter to avoid per-node round-trips.
  fn policies_for_nodes(
    &self,
    node_ids: &[Uuid],
  ) -> impl Future<Output = Result<Vec<NodePolicy>, Self::Error>> + Send + '_;

  /// Delete a single policy row. Fails `NotFound`-classified if no such
  /// policy exists on that node.
  fn delete_policy(
    &self,
    node_id: Uuid,
    policy_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Drop all policies attached to the given nodes; the cascade hook after
  /// [`TimelineStore::delete_node`]. Returns the number of rows removed.
  fn delete_policies_for_nodes(
    &self,
    node_ids: &[Uuid],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Physically delete rows whose expiry has passed. Lazy expiry makes this
  /// optional for correctness; the server runs it on an interval to keep
  /// the table compact. Returns the number of rows removed.
  fn purge_expired_policies(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
