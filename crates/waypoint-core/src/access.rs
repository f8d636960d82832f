//! The permission resolver.
//!
//! [`decide`] is a pure function over (ownership, applicable policies,
//! membership set) so the precedence rules are unit-testable without a
//! database. [`check`] and [`check_many`] wrap it with the store reads a
//! live decision needs.
//!
//! Precedence, strictly in this order:
//!
//! 1. the owner always gets `Full` — no policy can lock an owner out;
//! 2. any applicable deny wins over every allow;
//! 3. among allows, a user-specific rule beats an organization rule beats a
//!    public rule;
//! 4. within the same tier the highest visibility wins;
//! 5. no applicable policy means deny.
//!
//! Policies on ancestors never cascade to descendants. "Access denied" is a
//! value (`None`), not an error; store failures propagate unchanged so the
//! caller can fail closed without mistaking an outage for a deny.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
  error::{Classify, ErrorKind},
  policy::{NodePolicy, PolicyAction, PolicyEffect, PolicySubject, Visibility},
  store::TimelineStore,
};

// ─── Subjects and grants ─────────────────────────────────────────────────────

/// The entity asking for access: an authenticated user or the anonymous
/// public.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "subject_type", rename_all = "lowercase")]
pub enum AccessSubject {
  User { user_id: Uuid },
  Public,
}

impl AccessSubject {
  pub fn user_id(&self) -> Option<Uuid> {
    match self {
      Self::User { user_id } => Some(*user_id),
      Self::Public => None,
    }
  }
}

/// Where a granted decision came from; carried for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantSource {
  Owner,
  User,
  Organization,
  Public,
}

/// A positive access decision: the action is allowed at `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
  pub level:  Visibility,
  pub source: GrantSource,
}

impl Grant {
  fn owner() -> Self {
    Self { level: Visibility::Full, source: GrantSource::Owner }
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Failure modes of a resolver call. A deny is never an error.
#[derive(Debug, Error)]
pub enum CheckError<E> {
  #[error("node not found: {0}")]
  NodeNotFound(Uuid),

  #[error("store error: {0}")]
  Store(#[source] E),
}

impl<E: Classify> Classify for CheckError<E> {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::NodeNotFound(_) => ErrorKind::NotFound,
      Self::Store(e) => e.kind(),
    }
  }
}

// ─── Pure decision ───────────────────────────────────────────────────────────

/// Does `policy` apply to `subject` for `action` at `now`?
fn applies(
  policy: &NodePolicy,
  subject: &AccessSubject,
  action: PolicyAction,
  memberships: &HashSet<Uuid>,
  now: DateTime<Utc>,
) -> bool {
  if policy.action != action || policy.is_expired(now) {
    return false;
  }
  match policy.subject {
    PolicySubject::Public => true,
    PolicySubject::User { user_id } => subject.user_id() == Some(user_id),
    PolicySubject::Organization { org_id } => memberships.contains(&org_id),
  }
}

/// The resolver's core: a deterministic function from the node's ownership,
/// its policies, and the subject's organization memberships to a decision.
///
/// `None` means deny. Expired policies are skipped here as well as at the
/// store layer, so the function is correct over unfiltered policy sets.
pub fn decide(
  owner_id: Uuid,
  subject: &AccessSubject,
  action: PolicyAction,
  policies: &[NodePolicy],
  memberships: &HashSet<Uuid>,
  now: DateTime<Utc>,
) -> Option<Grant> {
  // 1. Ownership overrides everything, including denies.
  if subject.user_id() == Some(owner_id) {
    return Some(Grant::owner());
  }

  let applicable: Vec<&NodePolicy> = policies
    .iter()
    .filter(|p| applies(p, subject, action, memberships, now))
    .collect();

  // 2. Deny precedence: one applicable deny defeats all allows.
  if applicable.iter().any(|p| p.effect == PolicyEffect::Deny) {
    return None;
  }

  // 3 + 4. Most specific subject tier wins; highest level within the tier.
  let grant_at = |level: Visibility, source: GrantSource| Grant { level, source };

  let best_level = |tier: fn(&PolicySubject) -> bool| {
    applicable
      .iter()
      .filter(|p| tier(&p.subject))
      .map(|p| p.level)
      .max()
  };

  if let Some(level) = best_level(|s| matches!(s, PolicySubject::User { .. })) {
    return Some(grant_at(level, GrantSource::User));
  }
  if let Some(level) = best_level(|s| matches!(s, PolicySubject::Organization { .. })) {
    return Some(grant_at(level, GrantSource::Organization));
  }
  if let Some(level) = best_level(|s| matches!(s, PolicySubject::Public)) {
    return Some(grant_at(level, GrantSource::Public));
  }

  // 5. Default deny.
  None
}

// ─── Store-backed checks ─────────────────────────────────────────────────────

/// The organization ids `subject` belongs to; empty for the public.
pub(crate) async fn membership_set<S: TimelineStore>(
  store: &S,
  subject: &AccessSubject,
) -> Result<HashSet<Uuid>, S::Error> {
  match subject.user_id() {
    Some(user_id) => {
      let orgs = store.organizations_for_user(user_id).await?;
      Ok(orgs.into_iter().map(|o| o.org_id).collect())
    }
    None => Ok(HashSet::new()),
  }
}

/// Can `subject` perform `action` on `node_id`, and at what level?
///
/// `Ok(None)` is an ordinary deny. Errors are raised only for a missing
/// node or a failing store.
pub async fn check<S: TimelineStore>(
  store: &S,
  node_id: Uuid,
  subject: &AccessSubject,
  action: PolicyAction,
) -> Result<Option<Grant>, CheckError<S::Error>> {
  let node = store
    .get_node(node_id)
    .await
    .map_err(CheckError::Store)?
    .ok_or(CheckError::NodeNotFound(node_id))?;

  // Owner shortcut: skip the policy and membership reads entirely.
  if subject.user_id() == Some(node.owner_id) {
    return Ok(Some(Grant::owner()));
  }

  let policies = store
    .policies_for_node(node_id)
    .await
    .map_err(CheckError::Store)?;
  let memberships = membership_set(store, subject)
    .await
    .map_err(CheckError::Store)?;

  let grant = decide(node.owner_id, subject, action, &policies, &memberships, Utc::now());
  debug!(
    %node_id,
    subject = ?subject,
    action = action.as_str(),
    granted = grant.is_some(),
    "resolved access"
  );
  Ok(grant)
}

/// Batched variant of [`check`] for several (node, action) probes by one
/// subject: one membership fetch and one batched policy read.
///
/// Results are positional; a missing node yields `CheckError::NodeNotFound`
/// like the single check would.
pub async fn check_many<S: TimelineStore>(
  store: &S,
  subject: &AccessSubject,
  probes: &[(Uuid, PolicyAction)],
) -> Result<Vec<Option<Grant>>, CheckError<S::Error>> {
  let node_ids: Vec<Uuid> = probes.iter().map(|(id, _)| *id).collect();

  let mut owners = HashMap::new();
  for id in &node_ids {
    let node = store
      .get_node(*id)
      .await
      .map_err(CheckError::Store)?
      .ok_or(CheckError::NodeNotFound(*id))?;
    owners.insert(*id, node.owner_id);
  }

  let policies = store
    .policies_for_nodes(&node_ids)
    .await
    .map_err(CheckError::Store)?;
  let memberships = membership_set(store, subject)
    .await
    .map_err(CheckError::Store)?;

  let mut by_node: HashMap<Uuid, Vec<NodePolicy>> = HashMap::new();
  for policy in policies {
    by_node.entry(policy.node_id).or_default().push(policy);
  }

  let now = Utc::now();
  let empty = Vec::new();
  Ok(
    probes
      .iter()
      .map(|(node_id, action)| {
        let node_policies = by_node.get(node_id).unwrap_or(&empty);
        decide(owners[node_id], subject, *action, node_policies, &memberships, now)
      })
      .collect(),
  )
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn policy(
    node_id: Uuid,
    subject: PolicySubject,
    level: Visibility,
    effect: PolicyEffect,
  ) -> NodePolicy {
    NodePolicy {
      policy_id: Uuid::new_v4(),
      node_id,
      subject,
      action: PolicyAction::View,
      level,
      effect,
      expires_at: None,
      created_by: Uuid::new_v4(),
      created_at: Utc::now(),
    }
  }

  fn user(user_id: Uuid) -> AccessSubject {
    AccessSubject::User { user_id }
  }

  #[test]
  fn owner_always_gets_full() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();

    // Denies targeting the owner directly and via an org they belong to.
    let org = Uuid::new_v4();
    let policies = vec![
      policy(node, PolicySubject::User { user_id: owner }, Visibility::Overview, PolicyEffect::Deny),
      policy(node, PolicySubject::Organization { org_id: org }, Visibility::Full, PolicyEffect::Deny),
    ];
    let memberships = HashSet::from([org]);

    let grant = decide(owner, &user(owner), PolicyAction::View, &policies, &memberships, Utc::now())
      .expect("owner must never be locked out");
    assert_eq!(grant.level, Visibility::Full);
    assert_eq!(grant.source, GrantSource::Owner);
  }

  #[test]
  fn no_policies_means_deny() {
    let owner = Uuid::new_v4();
    let viewer = user(Uuid::new_v4());
    let grant =
      decide(owner, &viewer, PolicyAction::View, &[], &HashSet::new(), Utc::now());
    assert!(grant.is_none());
  }

  #[test]
  fn public_subject_only_matches_public_policies() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let policies = vec![policy(
      node,
      PolicySubject::User { user_id: Uuid::new_v4() },
      Visibility::Full,
      PolicyEffect::Allow,
    )];

    let grant = decide(
      owner,
      &AccessSubject::Public,
      PolicyAction::View,
      &policies,
      &HashSet::new(),
      Utc::now(),
    );
    assert!(grant.is_none());
  }

  #[test]
  fn deny_beats_more_specific_allow() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    // User-specific Full allow, org-level deny. Deny wins regardless of
    // specificity.
    let policies = vec![
      policy(node, PolicySubject::User { user_id: viewer_id }, Visibility::Full, PolicyEffect::Allow),
      policy(node, PolicySubject::Organization { org_id: org }, Visibility::Overview, PolicyEffect::Deny),
    ];
    let memberships = HashSet::from([org]);

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &policies,
      &memberships,
      Utc::now(),
    );
    assert!(grant.is_none());
  }

  #[test]
  fn deny_for_someone_else_is_ignored() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();

    let policies = vec![
      policy(node, PolicySubject::User { user_id: Uuid::new_v4() }, Visibility::Full, PolicyEffect::Deny),
      policy(node, PolicySubject::Public, Visibility::Overview, PolicyEffect::Allow),
    ];

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &policies,
      &HashSet::new(),
      Utc::now(),
    )
    .expect("public allow applies");
    assert_eq!(grant.level, Visibility::Overview);
    assert_eq!(grant.source, GrantSource::Public);
  }

  #[test]
  fn user_tier_beats_org_and_public_tiers() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();
    let org = Uuid::new_v4();

    // The org rule is more permissive, but the user-specific rule wins the
    // tier comparison.
    let policies = vec![
      policy(node, PolicySubject::User { user_id: viewer_id }, Visibility::Overview, PolicyEffect::Allow),
      policy(node, PolicySubject::Organization { org_id: org }, Visibility::Full, PolicyEffect::Allow),
      policy(node, PolicySubject::Public, Visibility::Full, PolicyEffect::Allow),
    ];
    let memberships = HashSet::from([org]);

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &policies,
      &memberships,
      Utc::now(),
    )
    .unwrap();
    assert_eq!(grant.level, Visibility::Overview);
    assert_eq!(grant.source, GrantSource::User);
  }

  #[test]
  fn highest_level_wins_within_a_tier() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();

    let policies = vec![
      policy(node, PolicySubject::User { user_id: viewer_id }, Visibility::Overview, PolicyEffect::Allow),
      policy(node, PolicySubject::User { user_id: viewer_id }, Visibility::Full, PolicyEffect::Allow),
    ];

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &policies,
      &HashSet::new(),
      Utc::now(),
    )
    .unwrap();
    assert_eq!(grant.level, Visibility::Full);
  }

  #[test]
  fn org_policy_needs_membership() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let org = Uuid::new_v4();

    let policies = vec![policy(
      node,
      PolicySubject::Organization { org_id: org },
      Visibility::Full,
      PolicyEffect::Allow,
    )];

    let outsider = user(Uuid::new_v4());
    assert!(
      decide(owner, &outsider, PolicyAction::View, &policies, &HashSet::new(), Utc::now())
        .is_none()
    );

    let memberships = HashSet::from([org]);
    let grant =
      decide(owner, &outsider, PolicyAction::View, &policies, &memberships, Utc::now())
        .unwrap();
    assert_eq!(grant.source, GrantSource::Organization);
  }

  #[test]
  fn expired_policy_never_grants() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();

    let mut expired = policy(
      node,
      PolicySubject::User { user_id: viewer_id },
      Visibility::Full,
      PolicyEffect::Allow,
    );
    expired.expires_at = Some(Utc::now() - Duration::hours(1));

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &[expired],
      &HashSet::new(),
      Utc::now(),
    );
    assert!(grant.is_none());
  }

  #[test]
  fn expired_deny_no_longer_blocks() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();

    let mut stale_deny = policy(
      node,
      PolicySubject::User { user_id: viewer_id },
      Visibility::Overview,
      PolicyEffect::Deny,
    );
    stale_deny.expires_at = Some(Utc::now() - Duration::minutes(5));
    let live_allow = policy(
      node,
      PolicySubject::Public,
      Visibility::Overview,
      PolicyEffect::Allow,
    );

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::View,
      &[stale_deny, live_allow],
      &HashSet::new(),
      Utc::now(),
    );
    assert!(grant.is_some());
  }

  #[test]
  fn action_mismatch_is_not_applicable() {
    let owner = Uuid::new_v4();
    let node = Uuid::new_v4();
    let viewer_id = Uuid::new_v4();

    // A view grant says nothing about edit.
    let policies = vec![policy(
      node,
      PolicySubject::User { user_id: viewer_id },
      Visibility::Full,
      PolicyEffect::Allow,
    )];

    let grant = decide(
      owner,
      &user(viewer_id),
      PolicyAction::Edit,
      &policies,
      &HashSet::new(),
      Utc::now(),
    );
    assert!(grant.is_none());
  }
}
