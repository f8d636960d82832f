//! The batch access filter — reduce a candidate node set to what one
//! subject may see.
//!
//! The profile-view path calls this over an owner's entire forest, so the
//! cost must stay O(nodes + policies): one batched policy read, one
//! membership fetch, then the same pure decision per node as the single
//! check. Batch and single results are always identical for the same
//! inputs.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{
  access::{self, AccessSubject, Grant},
  node::TimelineNode,
  policy::{NodePolicy, PolicyAction, Visibility},
  store::TimelineStore,
};

/// A node that survived filtering, annotated with the granted level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibleNode {
  pub node:  TimelineNode,
  pub level: Visibility,
}

/// Filter `nodes` down to those `subject` may view, preserving input order.
///
/// Denied nodes are omitted entirely — never returned as placeholders. When
/// every candidate belongs to the requesting user the policy and membership
/// reads are skipped and everything comes back at `Full`.
pub async fn filter_visible<S: TimelineStore>(
  store: &S,
  subject: &AccessSubject,
  nodes: Vec<TimelineNode>,
) -> Result<Vec<VisibleNode>, S::Error> {
  if nodes.is_empty() {
    return Ok(Vec::new());
  }

  // Owner fast path.
  if let Some(user_id) = subject.user_id()
    && nodes.iter().all(|n| n.owner_id == user_id)
  {
    return Ok(
      nodes
        .into_iter()
        .map(|node| VisibleNode { node, level: Visibility::Full })
        .collect(),
    );
  }

  let node_ids: Vec<Uuid> = nodes.iter().map(|n| n.node_id).collect();
  let policies = store.policies_for_nodes(&node_ids).await?;
  let memberships = access::membership_set(store, subject).await?;

  let mut by_node: HashMap<Uuid, Vec<NodePolicy>> = HashMap::new();
  for policy in policies {
    by_node.entry(policy.node_id).or_default().push(policy);
  }

  let now = Utc::now();
  let empty = Vec::new();
  let candidates = nodes.len();

  let visible: Vec<VisibleNode> = nodes
    .into_iter()
    .filter_map(|node| {
      let node_policies = by_node.get(&node.node_id).unwrap_or(&empty);
      access::decide(
        node.owner_id,
        subject,
        PolicyAction::View,
        node_policies,
        &memberships,
        now,
      )
      .map(|Grant { level, .. }| VisibleNode { node, level })
    })
    .collect();

  debug!(candidates, visible = visible.len(), subject = ?subject, "filtered node set");
  Ok(visible)
}
