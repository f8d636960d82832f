//! [`SqliteStore`] — the SQLite implementation of [`TimelineStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tracing::info;
use uuid::Uuid;

use waypoint_core::{
  node::{NewNode, NodeMeta, TimelineNode},
  org::{OrgMember, OrgRole, OrgType, Organization},
  policy::{NewPolicy, NodePolicy},
  store::TimelineStore,
};

use crate::{
  encode::{encode_dt, encode_uuid, RawNode, RawOrgMember, RawOrganization, RawPolicy},
  schema::SCHEMA,
  Error, Result,
};

// ─── Closure-side outcomes ───────────────────────────────────────────────────
//
// Domain failures discovered inside a `conn.call` closure are carried out as
// values so the transaction scope stays intact and the error mapping stays
// in async code where the original ids are available.

enum CreateOutcome {
  Created,
  BadParent,
}

enum MoveOutcome {
  Moved(RawNode),
  NotFound,
  BadParent,
  Cycle,
}

enum DeleteOutcome {
  Deleted(Vec<String>),
  NotFound,
}

enum UpdateOutcome {
  Updated(RawNode),
  NotFound,
}

enum SubtreeOutcome {
  Rows(Vec<RawNode>),
  NotFound,
}

enum MemberOutcome {
  Member(RawOrgMember),
  OrgMissing,
}

enum SetPoliciesOutcome {
  Set,
  NodeMissing,
}

/// `?, ?, ?` — one unnumbered placeholder per element.
fn placeholders(n: usize) -> String {
  let mut s = String::with_capacity(n.saturating_mul(3));
  for i in 0..n {
    if i > 0 {
      s.push_str(", ");
    }
    s.push('?');
  }
  s
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Waypoint timeline store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All calls
/// are serialised onto one database thread, which is what makes the
/// multi-statement hierarchy transactions safe without extra locking.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── TimelineStore impl ──────────────────────────────────────────────────────

impl TimelineStore for SqliteStore {
  type Error = Error;

  // ── Hierarchy ─────────────────────────────────────────────────────────────

  async fn create_node(&self, input: NewNode) -> Result<TimelineNode> {
    let now = Utc::now();
    let node = TimelineNode {
      node_id:    Uuid::new_v4(),
      owner_id:   input.owner_id,
      parent_id:  input.parent_id,
      meta:       input.meta,
      created_at: now,
      updated_at: now,
    };

    let node_id_str = encode_uuid(node.node_id);
    let owner_str   = encode_uuid(node.owner_id);
    let parent_str  = node.parent_id.map(encode_uuid);
    let kind_str    = node.meta.kind().as_str().to_owned();
    let meta_json   = node.meta.to_json().map_err(Error::Core)?.to_string();
    let at_str      = encode_dt(now);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // The parent must exist and belong to the same owner.
        if let Some(parent) = &parent_str {
          let parent_owner: Option<String> = tx
            .query_row(
              "SELECT owner_id FROM nodes WHERE node_id = ?1",
              rusqlite::params![parent],
              |r| r.get(0),
            )
            .optional()?;
          if parent_owner.as_deref() != Some(owner_str.as_str()) {
            return Ok(CreateOutcome::BadParent);
          }
        }

        tx.execute(
          "INSERT INTO nodes (node_id, owner_id, kind, meta_json, parent_id, created_at, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
          rusqlite::params![node_id_str, owner_str, kind_str, meta_json, parent_str, at_str],
        )?;

        // Self entry, then one row per ancestor of the parent.
        tx.execute(
          "INSERT INTO node_closure (ancestor_id, descendant_id, depth) VALUES (?1, ?1, 0)",
          rusqlite::params![node_id_str],
        )?;
        if let Some(parent) = &parent_str {
          tx.execute(
            "INSERT INTO node_closure (ancestor_id, descendant_id, depth)
             SELECT ancestor_id, ?1, depth + 1 FROM node_closure WHERE descendant_id = ?2",
            rusqlite::params![node_id_str, parent],
          )?;
        }

        tx.commit()?;
        Ok(CreateOutcome::Created)
      })
      .await?;

    match outcome {
      CreateOutcome::Created => {
        info!(node_id = %node.node_id, owner_id = %node.owner_id, "created node");
        Ok(node)
      }
      // Checked above: BadParent is only returned when a parent was given.
      CreateOutcome::BadParent => Err(Error::InvalidParent(node.parent_id.unwrap())),
    }
  }

  async fn update_node(&self, node_id: Uuid, meta: NodeMeta) -> Result<TimelineNode> {
    let node_id_str = encode_uuid(node_id);
    let kind_str    = meta.kind().as_str().to_owned();
    let meta_json   = meta.to_json().map_err(Error::Core)?.to_string();
    let at_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE nodes SET kind = ?1, meta_json = ?2, updated_at = ?3 WHERE node_id = ?4",
          rusqlite::params![kind_str, meta_json, at_str, node_id_str],
        )?;
        if changed == 0 {
          return Ok(UpdateOutcome::NotFound);
        }
        let raw = conn.query_row(
          &format!("SELECT {} FROM nodes WHERE node_id = ?1", RawNode::COLUMNS),
          rusqlite::params![node_id_str],
          RawNode::from_row,
        )?;
        Ok(UpdateOutcome::Updated(raw))
      })
      .await?;

    match outcome {
      UpdateOutcome::Updated(raw) => raw.into_node(),
      UpdateOutcome::NotFound => Err(Error::NodeNotFound(node_id)),
    }
  }

  async fn move_node(
    &self,
    node_id: Uuid,
    new_parent_id: Option<Uuid>,
  ) -> Result<TimelineNode> {
    let node_id_str    = encode_uuid(node_id);
    let new_parent_str = new_parent_id.map(encode_uuid);
    let at_str         = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let owner: Option<String> = tx
          .query_row(
            "SELECT owner_id FROM nodes WHERE node_id = ?1",
            rusqlite::params![node_id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(owner) = owner else {
          return Ok(MoveOutcome::NotFound);
        };

        if let Some(parent) = &new_parent_str {
          // A parent inside the moved subtree (itself included) is a cycle.
          let in_subtree: bool = tx
            .query_row(
              "SELECT 1 FROM node_closure WHERE ancestor_id = ?1 AND descendant_id = ?2",
              rusqlite::params![node_id_str, parent],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
          if in_subtree {
            return Ok(MoveOutcome::Cycle);
          }

          let parent_owner: Option<String> = tx
            .query_row(
              "SELECT owner_id FROM nodes WHERE node_id = ?1",
              rusqlite::params![parent],
              |r| r.get(0),
            )
            .optional()?;
          if parent_owner.as_deref() != Some(owner.as_str()) {
            return Ok(MoveOutcome::BadParent);
          }
        }

        // Every node of the moved subtree, not just the moved root: all of
        // them lose their old out-of-subtree ancestors.
        let subtree: Vec<String> = {
          let mut stmt =
            tx.prepare("SELECT descendant_id FROM node_closure WHERE ancestor_id = ?1")?;
          let rows = stmt
            .query_map(rusqlite::params![node_id_str], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows
        };

        let ph = placeholders(subtree.len());
        tx.execute(
          &format!(
            "DELETE FROM node_closure
              WHERE descendant_id IN ({ph}) AND ancestor_id NOT IN ({ph})"
          ),
          rusqlite::params_from_iter(subtree.iter().chain(subtree.iter())),
        )?;

        // Cross product of the new ancestor chain with the moved subtree.
        if let Some(parent) = &new_parent_str {
          tx.execute(
            "INSERT INTO node_closure (ancestor_id, descendant_id, depth)
             SELECT a.ancestor_id, d.descendant_id, a.depth + d.depth + 1
               FROM node_closure a, node_closure d
              WHERE a.descendant_id = ?1 AND d.ancestor_id = ?2",
            rusqlite::params![parent, node_id_str],
          )?;
        }

        tx.execute(
          "UPDATE nodes SET parent_id = ?1, updated_at = ?2 WHERE node_id = ?3",
          rusqlite::params![new_parent_str, at_str, node_id_str],
        )?;

        let raw = tx.query_row(
          &format!("SELECT {} FROM nodes WHERE node_id = ?1", RawNode::COLUMNS),
          rusqlite::params![node_id_str],
          RawNode::from_row,
        )?;

        tx.commit()?;
        Ok(MoveOutcome::Moved(raw))
      })
      .await?;

    match outcome {
      MoveOutcome::Moved(raw) => {
        info!(%node_id, new_parent = ?new_parent_id, "moved node");
        raw.into_node()
      }
      MoveOutcome::NotFound => Err(Error::NodeNotFound(node_id)),
      // Both arms below are only reachable when a new parent was given.
      MoveOutcome::BadParent => Err(Error::InvalidParent(new_parent_id.unwrap())),
      MoveOutcome::Cycle => Err(Error::CycleDetected {
        node_id,
        new_parent_id: new_parent_id.unwrap(),
      }),
    }
  }

  async fn delete_node(&self, node_id: Uuid) -> Result<Vec<Uuid>> {
    let node_id_str = encode_uuid(node_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Deepest last, so parents precede children in the returned list.
        let subtree: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT descendant_id FROM node_closure WHERE ancestor_id = ?1 ORDER BY depth",
          )?;
          let rows = stmt
            .query_map(rusqlite::params![node_id_str], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          rows
        };
        if subtree.is_empty() {
          return Ok(DeleteOutcome::NotFound);
        }

        let ph = placeholders(subtree.len());
        tx.execute(
          &format!("DELETE FROM node_closure WHERE descendant_id IN ({ph})"),
          rusqlite::params_from_iter(subtree.iter()),
        )?;
        // Descendant node rows go via the parent_id ON DELETE CASCADE.
        tx.execute(
          "DELETE FROM nodes WHERE node_id = ?1",
          rusqlite::params![node_id_str],
        )?;

        tx.commit()?;
        Ok(DeleteOutcome::Deleted(subtree))
      })
      .await?;

    match outcome {
      DeleteOutcome::Deleted(ids) => {
        info!(%node_id, deleted = ids.len(), "deleted subtree");
        ids
          .iter()
          .map(|s| crate::encode::decode_uuid(s))
          .collect()
      }
      DeleteOutcome::NotFound => Err(Error::NodeNotFound(node_id)),
    }
  }

  async fn get_node(&self, node_id: Uuid) -> Result<Option<TimelineNode>> {
    let node_id_str = encode_uuid(node_id);

    let raw: Option<RawNode> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM nodes WHERE node_id = ?1", RawNode::COLUMNS),
              rusqlite::params![node_id_str],
              RawNode::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawNode::into_node).transpose()
  }

  async fn ancestors(&self, node_id: Uuid) -> Result<Vec<TimelineNode>> {
    self
      .subtree_query(
        node_id,
        "SELECT n.node_id, n.owner_id, n.kind, n.meta_json, n.parent_id,
                n.created_at, n.updated_at
           FROM node_closure c
           JOIN nodes n ON n.node_id = c.ancestor_id
          WHERE c.descendant_id = ?1 AND c.depth > 0
          ORDER BY c.depth",
      )
      .await
  }

  async fn descendants(&self, node_id: Uuid, include_self: bool) -> Result<Vec<TimelineNode>> {
    let min_depth = if include_self { 0 } else { 1 };
    self
      .subtree_query(
        node_id,
        // min_depth is an integer literal built here, not user input.
        &format!(
          "SELECT n.node_id, n.owner_id, n.kind, n.meta_json, n.parent_id,
                  n.created_at, n.updated_at
             FROM node_closure c
             JOIN nodes n ON n.node_id = c.descendant_id
            WHERE c.ancestor_id = ?1 AND c.depth >= {min_depth}
            ORDER BY c.depth, n.created_at"
        ),
      )
      .await
  }

  async fn children(&self, node_id: Uuid) -> Result<Vec<TimelineNode>> {
    self
      .subtree_query(
        node_id,
        "SELECT n.node_id, n.owner_id, n.kind, n.meta_json, n.parent_id,
                n.created_at, n.updated_at
           FROM node_closure c
           JOIN nodes n ON n.node_id = c.descendant_id
          WHERE c.ancestor_id = ?1 AND c.depth = 1
          ORDER BY n.created_at",
      )
      .await
  }

  async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<TimelineNode>> {
    let owner_str = encode_uuid(owner_id);

    let raws: Vec<RawNode> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM nodes WHERE owner_id = ?1 ORDER BY created_at, node_id",
          RawNode::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![owner_str], RawNode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawNode::into_node).collect()
  }

  // ── Organizations ─────────────────────────────────────────────────────────

  async fn create_organization(
    &self,
    name: String,
    org_type: OrgType,
    metadata: Option<serde_json::Value>,
  ) -> Result<Organization> {
    let org_id_str   = encode_uuid(Uuid::new_v4());
    let type_str     = org_type.as_str().to_owned();
    let metadata_str = metadata.as_ref().map(serde_json::Value::to_string);
    let at_str       = encode_dt(Utc::now());
    let name_arg     = name.clone();

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        // Idempotent by (name, type): return the existing row untouched.
        let existing: Option<RawOrganization> = tx
          .query_row(
            &format!(
              "SELECT {} FROM organizations WHERE name = ?1 AND org_type = ?2",
              RawOrganization::COLUMNS
            ),
            rusqlite::params![name_arg, type_str],
            RawOrganization::from_row,
          )
          .optional()?;
        if let Some(raw) = existing {
          tx.commit()?;
          return Ok(raw);
        }

        tx.execute(
          "INSERT INTO organizations (org_id, name, org_type, metadata, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![org_id_str, name_arg, type_str, metadata_str, at_str],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM organizations WHERE org_id = ?1",
            RawOrganization::COLUMNS
          ),
          rusqlite::params![org_id_str],
          RawOrganization::from_row,
        )?;

        tx.commit()?;
        Ok(raw)
      })
      .await?;

    raw.into_organization()
  }

  async fn get_organization(&self, org_id: Uuid) -> Result<Option<Organization>> {
    let org_id_str = encode_uuid(org_id);

    let raw: Option<RawOrganization> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM organizations WHERE org_id = ?1",
                RawOrganization::COLUMNS
              ),
              rusqlite::params![org_id_str],
              RawOrganization::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawOrganization::into_organization).transpose()
  }

  async fn add_member(&self, org_id: Uuid, user_id: Uuid, role: OrgRole) -> Result<OrgMember> {
    let org_id_str  = encode_uuid(org_id);
    let user_id_str = encode_uuid(user_id);
    let role_str    = role.as_str().to_owned();
    let at_str      = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let org_exists: bool = tx
          .query_row(
            "SELECT 1 FROM organizations WHERE org_id = ?1",
            rusqlite::params![org_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !org_exists {
          return Ok(MemberOutcome::OrgMissing);
        }

        // Re-joining updates the role; the original joined_at is kept.
        tx.execute(
          "INSERT INTO org_members (org_id, user_id, role, joined_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (org_id, user_id) DO UPDATE SET role = excluded.role",
          rusqlite::params![org_id_str, user_id_str, role_str, at_str],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {} FROM org_members WHERE org_id = ?1 AND user_id = ?2",
            RawOrgMember::COLUMNS
          ),
          rusqlite::params![org_id_str, user_id_str],
          RawOrgMember::from_row,
        )?;

        tx.commit()?;
        Ok(MemberOutcome::Member(raw))
      })
      .await?;

    match outcome {
      MemberOutcome::Member(raw) => {
        info!(%org_id, %user_id, role = role.as_str(), "membership upserted");
        raw.into_member()
      }
      MemberOutcome::OrgMissing => Err(Error::OrganizationNotFound(org_id)),
    }
  }

  async fn remove_member(&self, org_id: Uuid, user_id: Uuid) -> Result<()> {
    let org_id_str  = encode_uuid(org_id);
    let user_id_str = encode_uuid(user_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM org_members WHERE org_id = ?1 AND user_id = ?2",
          rusqlite::params![org_id_str, user_id_str],
        )?)
      })
      .await?;

    if removed == 0 {
      return Err(Error::MembershipNotFound { org_id, user_id });
    }
    info!(%org_id, %user_id, "membership removed");
    Ok(())
  }

  async fn is_member(&self, user_id: Uuid, org_id: Uuid) -> Result<bool> {
    let org_id_str  = encode_uuid(org_id);
    let user_id_str = encode_uuid(user_id);

    let found = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM org_members WHERE org_id = ?1 AND user_id = ?2",
              rusqlite::params![org_id_str, user_id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;
    Ok(found)
  }

  async fn organizations_for_user(&self, user_id: Uuid) -> Result<Vec<Organization>> {
    let user_id_str = encode_uuid(user_id);

    let raws: Vec<RawOrganization> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT o.org_id, o.name, o.org_type, o.metadata, o.created_at
             FROM organizations o
             JOIN org_members m ON m.org_id = o.org_id
            WHERE m.user_id = ?1
            ORDER BY o.name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id_str], RawOrganization::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawOrganization::into_organization)
      .collect()
  }

  async fn list_members(&self, org_id: Uuid) -> Result<Vec<OrgMember>> {
    let org_id_str = encode_uuid(org_id);

    let raws: Vec<RawOrgMember> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM org_members WHERE org_id = ?1 ORDER BY joined_at, user_id",
          RawOrgMember::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![org_id_str], RawOrgMember::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOrgMember::into_member).collect()
  }

  // ── Policies ──────────────────────────────────────────────────────────────

  async fn set_policies(
    &self,
    node_id: Uuid,
    policies: Vec<NewPolicy>,
    created_by: Uuid,
  ) -> Result<Vec<NodePolicy>> {
    let now = Utc::now();
    let rows: Vec<NodePolicy> = policies
      .into_iter()
      .map(|p| NodePolicy {
        policy_id:  Uuid::new_v4(),
        node_id,
        subject:    p.subject,
        action:     p.action,
        level:      p.level,
        effect:     p.effect,
        expires_at: p.expires_at,
        created_by,
        created_at: now,
      })
      .collect();

    let node_id_str = encode_uuid(node_id);
    let encoded: Vec<RawPolicy> = rows
      .iter()
      .map(|p| RawPolicy {
        policy_id:    encode_uuid(p.policy_id),
        node_id:      node_id_str.clone(),
        subject_type: p.subject.discriminant().to_owned(),
        subject_id:   p.subject.subject_id().map(encode_uuid),
        action:       p.action.as_str().to_owned(),
        level:        p.level.as_str().to_owned(),
        effect:       p.effect.as_str().to_owned(),
        expires_at:   p.expires_at.map(encode_dt),
        created_by:   encode_uuid(p.created_by),
        created_at:   encode_dt(p.created_at),
      })
      .collect();

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let node_exists: bool = tx
          .query_row(
            "SELECT 1 FROM nodes WHERE node_id = ?1",
            rusqlite::params![node_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !node_exists {
          return Ok(SetPoliciesOutcome::NodeMissing);
        }

        // Whole-set replacement: the sharing flows always write the full
        // policy list for a node.
        tx.execute(
          "DELETE FROM node_policies WHERE node_id = ?1",
          rusqlite::params![node_id_str],
        )?;
        for p in &encoded {
          tx.execute(
            "INSERT INTO node_policies
               (policy_id, node_id, subject_type, subject_id, action, level,
                effect, expires_at, created_by, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
              p.policy_id,
              p.node_id,
              p.subject_type,
              p.subject_id,
              p.action,
              p.level,
              p.effect,
              p.expires_at,
              p.created_by,
              p.created_at,
            ],
          )?;
        }

        tx.commit()?;
        Ok(SetPoliciesOutcome::Set)
      })
      .await?;

    match outcome {
      SetPoliciesOutcome::Set => {
        info!(%node_id, policies = rows.len(), "replaced node policies");
        Ok(rows)
      }
      SetPoliciesOutcome::NodeMissing => Err(Error::NodeNotFound(node_id)),
    }
  }

  async fn policies_for_node(&self, node_id: Uuid) -> Result<Vec<NodePolicy>> {
    let node_id_str = encode_uuid(node_id);
    let now_str     = encode_dt(Utc::now());

    let raws: Vec<RawPolicy> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM node_policies
            WHERE node_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)
            ORDER BY created_at, policy_id",
          RawPolicy::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![node_id_str, now_str], RawPolicy::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawPolicy::into_policy).collect()
  }

  fn policies_for_nodes(
    &self,
    node_ids: &[Uuid],
  ) -> impl std::future::Future<Output = Result<Vec<NodePolicy>>> + Send + '_ {
    let id_strs: Vec<String> = node_ids.iter().copied().map(encode_uuid).collect();
    let now_str = encode_dt(Utc::now());

    async move {
      if id_strs.is_empty() {
        return Ok(Vec::new());
      }

      let raws: Vec<RawPolicy> = self
        .conn
        .call(move |conn| {
          let ph = placeholders(id_strs.len());
          let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM node_policies
              WHERE node_id IN ({ph}) AND (expires_at IS NULL OR expires_at > ?)
              ORDER BY node_id, created_at, policy_id",
            RawPolicy::COLUMNS
          ))?;
          let rows = stmt
            .query_map(
              rusqlite::params_from_iter(
                id_strs.iter().cloned().chain(std::iter::once(now_str)),
              ),
              RawPolicy::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          Ok(rows)
        })
        .await?;

      raws.into_iter().map(RawPolicy::into_policy).collect()
    }
  }

  async fn delete_policy(&self, node_id: Uuid, policy_id: Uuid) -> Result<()> {
    let node_id_str   = encode_uuid(node_id);
    let policy_id_str = encode_uuid(policy_id);

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM node_policies WHERE node_id = ?1 AND policy_id = ?2",
          rusqlite::params![node_id_str, policy_id_str],
        )?)
      })
      .await?;

    if removed == 0 {
      return Err(Error::PolicyNotFound { node_id, policy_id });
    }
    info!(%node_id, %policy_id, "policy deleted");
    Ok(())
  }

  fn delete_policies_for_nodes(
    &self,
    node_ids: &[Uuid],
  ) -> impl std::future::Future<Output = Result<usize>> + Send + '_ {
    let id_strs: Vec<String> = node_ids.iter().copied().map(encode_uuid).collect();

    async move {
      if id_strs.is_empty() {
        return Ok(0);
      }

      let removed = self
        .conn
        .call(move |conn| {
          let ph = placeholders(id_strs.len());
          Ok(conn.execute(
            &format!("DELETE FROM node_policies WHERE node_id IN ({ph})"),
            rusqlite::params_from_iter(id_strs.iter()),
          )?)
        })
        .await?;

      Ok(removed)
    }
  }

  async fn purge_expired_policies(&self) -> Result<usize> {
    let now_str = encode_dt(Utc::now());

    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM node_policies WHERE expires_at IS NOT NULL AND expires_at <= ?1",
          rusqlite::params![now_str],
        )?)
      })
      .await?;

    if removed > 0 {
      info!(removed, "purged expired policies");
    }
    Ok(removed)
  }
}

// ─── Private helpers ─────────────────────────────────────────────────────────

impl SqliteStore {
  /// Run a closure-table read for `node_id`, erroring if the node itself is
  /// absent (distinguishes "no relatives" from "no such node").
  async fn subtree_query(&self, node_id: Uuid, sql: &str) -> Result<Vec<TimelineNode>> {
    let node_id_str = encode_uuid(node_id);
    let sql = sql.to_owned();

    let outcome = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM nodes WHERE node_id = ?1",
            rusqlite::params![node_id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok(SubtreeOutcome::NotFound);
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![node_id_str], RawNode::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(SubtreeOutcome::Rows(rows))
      })
      .await?;

    match outcome {
      SubtreeOutcome::Rows(raws) => raws.into_iter().map(RawNode::into_node).collect(),
      SubtreeOutcome::NotFound => Err(Error::NodeNotFound(node_id)),
    }
  }
}
