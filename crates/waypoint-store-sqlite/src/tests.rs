//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use uuid::Uuid;
use waypoint_core::{
  access::{self, AccessSubject},
  filter,
  node::{ActionMeta, JobMeta, NewNode, NodeMeta, ProjectMeta},
  org::{OrgRole, OrgType},
  policy::{NewPolicy, PolicyAction, PolicyEffect, PolicySubject, Visibility},
  store::TimelineStore,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn job(title: &str) -> NodeMeta {
  NodeMeta::Job(JobMeta {
    title:        title.into(),
    organization: Some("Initech".into()),
    location:     None,
    start_date:   None,
    end_date:     None,
    description:  None,
  })
}

fn project(title: &str) -> NodeMeta {
  NodeMeta::Project(ProjectMeta {
    title:       title.into(),
    description: None,
    url:         None,
    start_date:  None,
    end_date:    None,
  })
}

fn action(title: &str) -> NodeMeta {
  NodeMeta::Action(ActionMeta {
    title:       title.into(),
    description: None,
    date:        None,
  })
}

fn user(user_id: Uuid) -> AccessSubject {
  AccessSubject::User { user_id }
}

// ─── Node creation ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_node() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Staff Engineer"))).await.unwrap();
  assert_eq!(node.owner_id, owner);
  assert!(node.parent_id.is_none());

  let fetched = s.get_node(node.node_id).await.unwrap().expect("node exists");
  assert_eq!(fetched.node_id, node.node_id);
  match fetched.meta {
    NodeMeta::Job(m) => {
      assert_eq!(m.title, "Staff Engineer");
      assert_eq!(m.organization.as_deref(), Some("Initech"));
    }
    other => panic!("wrong meta decoded: {other:?}"),
  }
}

#[tokio::test]
async fn get_node_missing_returns_none() {
  let s = store().await;
  assert!(s.get_node(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn create_with_missing_parent_fails() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let err = s
    .create_node(NewNode::child_of(owner, Uuid::new_v4(), project("Side quest")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidParent(_)), "got: {err:?}");
}

#[tokio::test]
async fn create_under_foreign_parent_fails() {
  let s = store().await;
  let alice = Uuid::new_v4();
  let bob = Uuid::new_v4();

  let root = s.create_node(NewNode::root(alice, job("Founder"))).await.unwrap();
  let err = s
    .create_node(NewNode::child_of(bob, root.node_id, project("Intrusion")))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidParent(_)), "got: {err:?}");
}

// ─── Closure queries ─────────────────────────────────────────────────────────

#[tokio::test]
async fn ancestors_are_nearest_first() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("Project"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, b.node_id, action("Ship it"))).await.unwrap();

  let ancestors = s.ancestors(c.node_id).await.unwrap();
  let ids: Vec<Uuid> = ancestors.iter().map(|n| n.node_id).collect();
  assert_eq!(ids, vec![b.node_id, a.node_id]);

  assert!(s.ancestors(a.node_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn descendants_cover_the_whole_subtree() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("Project"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, b.node_id, action("Ship it"))).await.unwrap();

  let with_self = s.descendants(a.node_id, true).await.unwrap();
  let ids: Vec<Uuid> = with_self.iter().map(|n| n.node_id).collect();
  assert_eq!(ids, vec![a.node_id, b.node_id, c.node_id]);

  let without_self = s.descendants(a.node_id, false).await.unwrap();
  assert!(!without_self.iter().any(|n| n.node_id == a.node_id));
  assert_eq!(without_self.len(), 2);
}

#[tokio::test]
async fn children_are_depth_one_only() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("P1"))).await.unwrap();
  let _g = s.create_node(NewNode::child_of(owner, b.node_id, action("Deep"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, a.node_id, project("P2"))).await.unwrap();

  let kids = s.children(a.node_id).await.unwrap();
  let ids: Vec<Uuid> = kids.iter().map(|n| n.node_id).collect();
  assert_eq!(ids, vec![b.node_id, c.node_id]);
}

#[tokio::test]
async fn closure_reads_on_missing_node_error() {
  let s = store().await;
  let missing = Uuid::new_v4();

  assert!(matches!(s.ancestors(missing).await.unwrap_err(), Error::NodeNotFound(_)));
  assert!(matches!(s.descendants(missing, true).await.unwrap_err(), Error::NodeNotFound(_)));
  assert!(matches!(s.children(missing).await.unwrap_err(), Error::NodeNotFound(_)));
}

#[tokio::test]
async fn list_by_owner_is_scoped() {
  let s = store().await;
  let alice = Uuid::new_v4();
  let bob = Uuid::new_v4();

  s.create_node(NewNode::root(alice, job("A1"))).await.unwrap();
  s.create_node(NewNode::root(alice, job("A2"))).await.unwrap();
  s.create_node(NewNode::root(bob, job("B1"))).await.unwrap();

  assert_eq!(s.list_by_owner(alice).await.unwrap().len(), 2);
  assert_eq!(s.list_by_owner(bob).await.unwrap().len(), 1);
  assert!(s.list_by_owner(Uuid::new_v4()).await.unwrap().is_empty());
}

// ─── Update ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn update_node_replaces_meta() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Junior Dev"))).await.unwrap();
  let updated = s.update_node(node.node_id, job("Senior Dev")).await.unwrap();

  assert_eq!(updated.meta.title(), "Senior Dev");
  assert!(updated.updated_at >= node.updated_at);

  let err = s.update_node(Uuid::new_v4(), job("Ghost")).await.unwrap_err();
  assert!(matches!(err, Error::NodeNotFound(_)));
}

// ─── Moves ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn move_rewrites_ancestor_chain() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let j1 = s.create_node(NewNode::root(owner, job("J1"))).await.unwrap();
  let j2 = s.create_node(NewNode::root(owner, job("J2"))).await.unwrap();
  let p1 = s.create_node(NewNode::child_of(owner, j1.node_id, project("P1"))).await.unwrap();

  let moved = s.move_node(p1.node_id, Some(j2.node_id)).await.unwrap();
  assert_eq!(moved.parent_id, Some(j2.node_id));

  let ancestors = s.ancestors(p1.node_id).await.unwrap();
  let ids: Vec<Uuid> = ancestors.iter().map(|n| n.node_id).collect();
  assert_eq!(ids, vec![j2.node_id]);

  // The old closure row (J1 -> P1) is gone.
  assert!(!s
    .descendants(j1.node_id, false)
    .await
    .unwrap()
    .iter()
    .any(|n| n.node_id == p1.node_id));
  assert!(s
    .descendants(j2.node_id, false)
    .await
    .unwrap()
    .iter()
    .any(|n| n.node_id == p1.node_id));
}

#[tokio::test]
async fn move_carries_the_whole_subtree() {
  let s = store().await;
  let owner = Uuid::new_v4();

  // a -> b -> c, d standalone; moving b under d must rewrite c's chain too.
  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, b.node_id, action("C"))).await.unwrap();
  let d = s.create_node(NewNode::root(owner, job("D"))).await.unwrap();

  s.move_node(b.node_id, Some(d.node_id)).await.unwrap();

  let ids: Vec<Uuid> = s
    .ancestors(c.node_id)
    .await
    .unwrap()
    .iter()
    .map(|n| n.node_id)
    .collect();
  assert_eq!(ids, vec![b.node_id, d.node_id]);

  assert!(s.descendants(a.node_id, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn move_to_root_detaches() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();

  let moved = s.move_node(b.node_id, None).await.unwrap();
  assert!(moved.parent_id.is_none());
  assert!(s.ancestors(b.node_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn move_into_own_subtree_is_a_cycle() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, b.node_id, action("C"))).await.unwrap();

  // Every descendant of a, including a itself, is a forbidden target.
  for target in [a.node_id, b.node_id, c.node_id] {
    let err = s.move_node(a.node_id, Some(target)).await.unwrap_err();
    assert!(matches!(err, Error::CycleDetected { .. }), "target {target}: {err:?}");
  }

  // The failed moves left the hierarchy untouched.
  let ids: Vec<Uuid> = s
    .ancestors(c.node_id)
    .await
    .unwrap()
    .iter()
    .map(|n| n.node_id)
    .collect();
  assert_eq!(ids, vec![b.node_id, a.node_id]);
}

#[tokio::test]
async fn move_under_foreign_parent_fails() {
  let s = store().await;
  let alice = Uuid::new_v4();
  let bob = Uuid::new_v4();

  let a = s.create_node(NewNode::root(alice, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::root(bob, job("B"))).await.unwrap();

  let err = s.move_node(a.node_id, Some(b.node_id)).await.unwrap_err();
  assert!(matches!(err, Error::InvalidParent(_)));
}

#[tokio::test]
async fn move_missing_node_fails() {
  let s = store().await;
  let err = s.move_node(Uuid::new_v4(), None).await.unwrap_err();
  assert!(matches!(err, Error::NodeNotFound(_)));
}

// ─── Cascade delete ──────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_cascades_over_the_subtree() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();
  let c = s.create_node(NewNode::child_of(owner, b.node_id, action("C"))).await.unwrap();
  let sibling = s.create_node(NewNode::root(owner, job("Sibling"))).await.unwrap();

  let deleted = s.delete_node(a.node_id).await.unwrap();
  assert_eq!(deleted.len(), 3);
  for id in [a.node_id, b.node_id, c.node_id] {
    assert!(deleted.contains(&id));
    assert!(s.get_node(id).await.unwrap().is_none());
  }

  // No orphaned closure rows: the sibling's subtree is intact and reads on
  // the deleted ids now fail NotFound.
  assert_eq!(s.descendants(sibling.node_id, true).await.unwrap().len(), 1);
  assert!(matches!(s.ancestors(c.node_id).await.unwrap_err(), Error::NodeNotFound(_)));

  let err = s.delete_node(a.node_id).await.unwrap_err();
  assert!(matches!(err, Error::NodeNotFound(_)));
}

#[tokio::test]
async fn delete_returns_ids_for_policy_cleanup() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();

  for id in [a.node_id, b.node_id] {
    s.set_policies(
      id,
      vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
      owner,
    )
    .await
    .unwrap();
  }

  let deleted = s.delete_node(a.node_id).await.unwrap();
  let dropped = s.delete_policies_for_nodes(&deleted).await.unwrap();
  assert_eq!(dropped, 2);
}

// ─── Organizations ───────────────────────────────────────────────────────────

#[tokio::test]
async fn organization_creation_is_idempotent() {
  let s = store().await;

  let first = s
    .create_organization("Acme".into(), OrgType::Company, None)
    .await
    .unwrap();
  let second = s
    .create_organization("Acme".into(), OrgType::Company, None)
    .await
    .unwrap();
  assert_eq!(first.org_id, second.org_id);

  // Same name, different type: a distinct organization.
  let school = s
    .create_organization("Acme".into(), OrgType::School, None)
    .await
    .unwrap();
  assert_ne!(first.org_id, school.org_id);
}

#[tokio::test]
async fn membership_roundtrip() {
  let s = store().await;
  let user_id = Uuid::new_v4();

  let org = s
    .create_organization("Acme".into(), OrgType::Company, None)
    .await
    .unwrap();

  assert!(!s.is_member(user_id, org.org_id).await.unwrap());

  let member = s.add_member(org.org_id, user_id, OrgRole::Member).await.unwrap();
  assert_eq!(member.role, OrgRole::Member);
  assert!(s.is_member(user_id, org.org_id).await.unwrap());

  // Promotion is an in-place role update, not a second row.
  let promoted = s.add_member(org.org_id, user_id, OrgRole::Admin).await.unwrap();
  assert_eq!(promoted.role, OrgRole::Admin);
  assert_eq!(s.list_members(org.org_id).await.unwrap().len(), 1);

  let orgs = s.organizations_for_user(user_id).await.unwrap();
  assert_eq!(orgs.len(), 1);
  assert_eq!(orgs[0].org_id, org.org_id);

  s.remove_member(org.org_id, user_id).await.unwrap();
  assert!(!s.is_member(user_id, org.org_id).await.unwrap());

  let err = s.remove_member(org.org_id, user_id).await.unwrap_err();
  assert!(matches!(err, Error::MembershipNotFound { .. }));
}

#[tokio::test]
async fn add_member_to_missing_org_fails() {
  let s = store().await;
  let err = s
    .add_member(Uuid::new_v4(), Uuid::new_v4(), OrgRole::Member)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::OrganizationNotFound(_)));
}

// ─── Policies ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn set_policies_roundtrip() {
  let s = store().await;
  let owner = Uuid::new_v4();
  let friend = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let expires = Utc::now() + Duration::days(30);

  let written = s
    .set_policies(
      node.node_id,
      vec![
        NewPolicy {
          subject:    PolicySubject::User { user_id: friend },
          action:     PolicyAction::View,
          level:      Visibility::Full,
          effect:     PolicyEffect::Allow,
          expires_at: Some(expires),
        },
        NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview),
      ],
      owner,
    )
    .await
    .unwrap();
  assert_eq!(written.len(), 2);

  let read = s.policies_for_node(node.node_id).await.unwrap();
  assert_eq!(read.len(), 2);

  let user_policy = read
    .iter()
    .find(|p| p.subject == PolicySubject::User { user_id: friend })
    .expect("user policy present");
  assert_eq!(user_policy.level, Visibility::Full);
  assert_eq!(user_policy.effect, PolicyEffect::Allow);
  assert_eq!(user_policy.created_by, owner);
  // RFC 3339 roundtrips to the same instant.
  assert_eq!(user_policy.expires_at.unwrap(), expires);
}

#[tokio::test]
async fn set_policies_replaces_the_previous_set() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();

  s.set_policies(
    node.node_id,
    vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Full)],
    owner,
  )
  .await
  .unwrap();

  s.set_policies(
    node.node_id,
    vec![NewPolicy::allow(
      PolicySubject::User { user_id: Uuid::new_v4() },
      PolicyAction::View,
      Visibility::Overview,
    )],
    owner,
  )
  .await
  .unwrap();

  let read = s.policies_for_node(node.node_id).await.unwrap();
  assert_eq!(read.len(), 1);
  assert!(matches!(read[0].subject, PolicySubject::User { .. }));
}

#[tokio::test]
async fn set_policies_on_missing_node_fails() {
  let s = store().await;
  let err = s
    .set_policies(
      Uuid::new_v4(),
      vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
      Uuid::new_v4(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::NodeNotFound(_)));
}

#[tokio::test]
async fn expired_policies_are_invisible_and_purgeable() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  s.set_policies(
    node.node_id,
    vec![
      NewPolicy {
        subject:    PolicySubject::Public,
        action:     PolicyAction::View,
        level:      Visibility::Full,
        effect:     PolicyEffect::Allow,
        expires_at: Some(Utc::now() - Duration::hours(1)),
      },
      NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview),
    ],
    owner,
  )
  .await
  .unwrap();

  // The expired row is filtered from reads without any sweep.
  let read = s.policies_for_node(node.node_id).await.unwrap();
  assert_eq!(read.len(), 1);
  assert_eq!(read[0].level, Visibility::Overview);

  // The sweep physically removes exactly the expired row.
  assert_eq!(s.purge_expired_policies().await.unwrap(), 1);
  assert_eq!(s.policies_for_node(node.node_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_policy_by_id() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let written = s
    .set_policies(
      node.node_id,
      vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
      owner,
    )
    .await
    .unwrap();

  s.delete_policy(node.node_id, written[0].policy_id).await.unwrap();
  assert!(s.policies_for_node(node.node_id).await.unwrap().is_empty());

  let err = s.delete_policy(node.node_id, written[0].policy_id).await.unwrap_err();
  assert!(matches!(err, Error::PolicyNotFound { .. }));
}

#[tokio::test]
async fn batched_policy_read_spans_nodes() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::root(owner, job("B"))).await.unwrap();
  let c = s.create_node(NewNode::root(owner, job("C"))).await.unwrap();

  for node in [&a, &b] {
    s.set_policies(
      node.node_id,
      vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
      owner,
    )
    .await
    .unwrap();
  }

  let batched = s
    .policies_for_nodes(&[a.node_id, b.node_id, c.node_id])
    .await
    .unwrap();
  assert_eq!(batched.len(), 2);
  assert!(s.policies_for_nodes(&[]).await.unwrap().is_empty());
}

// ─── Resolver against the store ──────────────────────────────────────────────

#[tokio::test]
async fn check_owner_shortcut() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  // Owner-targeting deny policies must not matter.
  s.set_policies(
    node.node_id,
    vec![NewPolicy::deny(
      PolicySubject::User { user_id: owner },
      PolicyAction::View,
      Visibility::Full,
    )],
    owner,
  )
  .await
  .unwrap();

  let grant = access::check(&s, node.node_id, &user(owner), PolicyAction::View)
    .await
    .unwrap()
    .expect("owner always allowed");
  assert_eq!(grant.level, Visibility::Full);
}

#[tokio::test]
async fn check_missing_node_is_an_error() {
  let s = store().await;
  let err = access::check(&s, Uuid::new_v4(), &AccessSubject::Public, PolicyAction::View)
    .await
    .unwrap_err();
  assert!(matches!(err, access::CheckError::NodeNotFound(_)));
}

#[tokio::test]
async fn check_org_deny_beats_direct_allow() {
  // U2 has a direct Full allow on P1, but Org1 (of which U2 is a member)
  // carries a deny. Deny precedence wins.
  let s = store().await;
  let owner = Uuid::new_v4();
  let u2 = Uuid::new_v4();

  let p1 = s.create_node(NewNode::root(owner, project("P1"))).await.unwrap();
  let org1 = s
    .create_organization("Org1".into(), OrgType::Community, None)
    .await
    .unwrap();
  s.add_member(org1.org_id, u2, OrgRole::Member).await.unwrap();

  s.set_policies(
    p1.node_id,
    vec![
      NewPolicy::allow(PolicySubject::User { user_id: u2 }, PolicyAction::View, Visibility::Full),
      NewPolicy::deny(
        PolicySubject::Organization { org_id: org1.org_id },
        PolicyAction::View,
        Visibility::Overview,
      ),
    ],
    owner,
  )
  .await
  .unwrap();

  let grant = access::check(&s, p1.node_id, &user(u2), PolicyAction::View)
    .await
    .unwrap();
  assert!(grant.is_none());
}

#[tokio::test]
async fn check_membership_gates_org_policies() {
  let s = store().await;
  let owner = Uuid::new_v4();
  let insider = Uuid::new_v4();
  let outsider = Uuid::new_v4();

  let node = s.create_node(NewNode::root(owner, job("Job"))).await.unwrap();
  let org = s
    .create_organization("Acme".into(), OrgType::Company, None)
    .await
    .unwrap();
  s.add_member(org.org_id, insider, OrgRole::Member).await.unwrap();

  s.set_policies(
    node.node_id,
    vec![NewPolicy::allow(
      PolicySubject::Organization { org_id: org.org_id },
      PolicyAction::View,
      Visibility::Overview,
    )],
    owner,
  )
  .await
  .unwrap();

  assert!(access::check(&s, node.node_id, &user(insider), PolicyAction::View)
    .await
    .unwrap()
    .is_some());
  assert!(access::check(&s, node.node_id, &user(outsider), PolicyAction::View)
    .await
    .unwrap()
    .is_none());

  // Revocation takes effect on the next check.
  s.remove_member(org.org_id, insider).await.unwrap();
  assert!(access::check(&s, node.node_id, &user(insider), PolicyAction::View)
    .await
    .unwrap()
    .is_none());
}

#[tokio::test]
async fn check_many_matches_single_checks() {
  let s = store().await;
  let owner = Uuid::new_v4();
  let viewer = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  let b = s.create_node(NewNode::root(owner, job("B"))).await.unwrap();

  s.set_policies(
    a.node_id,
    vec![NewPolicy::allow(
      PolicySubject::User { user_id: viewer },
      PolicyAction::View,
      Visibility::Full,
    )],
    owner,
  )
  .await
  .unwrap();

  let probes = vec![(a.node_id, PolicyAction::View), (b.node_id, PolicyAction::View)];
  let batched = access::check_many(&s, &user(viewer), &probes).await.unwrap();

  for (probe, batch_grant) in probes.iter().zip(&batched) {
    let single = access::check(&s, probe.0, &user(viewer), probe.1).await.unwrap();
    assert_eq!(single.map(|g| g.level), batch_grant.map(|g| g.level));
  }
}

// ─── Batch filter ────────────────────────────────────────────────────────────

#[tokio::test]
async fn filter_org_overview_on_parent_only() {
  // Org1 gets Overview on J1 only; P1 under J1 has no policies of its own.
  // A member sees exactly J1 at Overview — nothing cascades to P1.
  let s = store().await;
  let owner = Uuid::new_v4();
  let u1 = Uuid::new_v4();

  let j1 = s.create_node(NewNode::root(owner, job("J1"))).await.unwrap();
  let p1 = s.create_node(NewNode::child_of(owner, j1.node_id, project("P1"))).await.unwrap();

  let org1 = s
    .create_organization("Org1".into(), OrgType::Company, None)
    .await
    .unwrap();
  s.add_member(org1.org_id, u1, OrgRole::Member).await.unwrap();

  s.set_policies(
    j1.node_id,
    vec![NewPolicy::allow(
      PolicySubject::Organization { org_id: org1.org_id },
      PolicyAction::View,
      Visibility::Overview,
    )],
    owner,
  )
  .await
  .unwrap();

  let nodes = s.list_by_owner(owner).await.unwrap();
  let visible = filter::filter_visible(&s, &user(u1), nodes).await.unwrap();

  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].node.node_id, j1.node_id);
  assert_eq!(visible[0].level, Visibility::Overview);
  assert!(!visible.iter().any(|v| v.node.node_id == p1.node_id));
}

#[tokio::test]
async fn filter_owner_fast_path_returns_everything_full() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let a = s.create_node(NewNode::root(owner, job("A"))).await.unwrap();
  s.create_node(NewNode::child_of(owner, a.node_id, project("B"))).await.unwrap();

  let nodes = s.list_by_owner(owner).await.unwrap();
  let visible = filter::filter_visible(&s, &user(owner), nodes).await.unwrap();

  assert_eq!(visible.len(), 2);
  assert!(visible.iter().all(|v| v.level == Visibility::Full));
}

#[tokio::test]
async fn filter_preserves_order_and_matches_single_checks() {
  let s = store().await;
  let owner = Uuid::new_v4();
  let viewer = Uuid::new_v4();

  let mut nodes = Vec::new();
  for i in 0..5 {
    nodes.push(
      s.create_node(NewNode::root(owner, job(&format!("Job {i}"))))
        .await
        .unwrap(),
    );
  }

  // Mixed grants: Full, Overview, deny, nothing, public Overview.
  s.set_policies(
    nodes[0].node_id,
    vec![NewPolicy::allow(PolicySubject::User { user_id: viewer }, PolicyAction::View, Visibility::Full)],
    owner,
  )
  .await
  .unwrap();
  s.set_policies(
    nodes[1].node_id,
    vec![NewPolicy::allow(PolicySubject::User { user_id: viewer }, PolicyAction::View, Visibility::Overview)],
    owner,
  )
  .await
  .unwrap();
  s.set_policies(
    nodes[2].node_id,
    vec![
      NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Full),
      NewPolicy::deny(PolicySubject::User { user_id: viewer }, PolicyAction::View, Visibility::Full),
    ],
    owner,
  )
  .await
  .unwrap();
  s.set_policies(
    nodes[4].node_id,
    vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
    owner,
  )
  .await
  .unwrap();

  let candidates = s.list_by_owner(owner).await.unwrap();
  let visible = filter::filter_visible(&s, &user(viewer), candidates.clone()).await.unwrap();

  // Denied and unshared nodes are omitted; order of the rest is preserved.
  let got: Vec<Uuid> = visible.iter().map(|v| v.node.node_id).collect();
  assert_eq!(got, vec![nodes[0].node_id, nodes[1].node_id, nodes[4].node_id]);

  // Batch/single consistency over the full candidate set.
  for node in &candidates {
    let single = access::check(&s, node.node_id, &user(viewer), PolicyAction::View)
      .await
      .unwrap();
    let batch = visible.iter().find(|v| v.node.node_id == node.node_id);
    assert_eq!(single.map(|g| g.level), batch.map(|v| v.level));
  }
}

#[tokio::test]
async fn filter_for_the_public() {
  let s = store().await;
  let owner = Uuid::new_v4();

  let shared = s.create_node(NewNode::root(owner, job("Shared"))).await.unwrap();
  s.create_node(NewNode::root(owner, job("Private"))).await.unwrap();

  s.set_policies(
    shared.node_id,
    vec![NewPolicy::allow(PolicySubject::Public, PolicyAction::View, Visibility::Overview)],
    owner,
  )
  .await
  .unwrap();

  let nodes = s.list_by_owner(owner).await.unwrap();
  let visible = filter::filter_visible(&s, &AccessSubject::Public, nodes).await.unwrap();

  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].node.node_id, shared.node_id);
  assert_eq!(visible[0].level, Visibility::Overview);
}
