//! Timeline nodes — the career items that form each user's hierarchy.
//!
//! A node is owned by exactly one user and has at most one parent, which
//! must belong to the same owner. The parent/child relation is a forest;
//! children are always derived from the closure index, never stored on the
//! node itself.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

// ─── Node kind ───────────────────────────────────────────────────────────────

/// The fixed enumeration of career item kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
  Job,
  Education,
  Project,
  Event,
  Action,
  Transition,
}

impl NodeKind {
  /// The discriminant string stored in the `kind` column.
  /// Must match the `rename_all = "lowercase"` serde tags above.
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Job => "job",
      Self::Education => "education",
      Self::Project => "project",
      Self::Event => "event",
      Self::Action => "action",
      Self::Transition => "transition",
    }
  }
}

// ─── Per-kind payloads ───────────────────────────────────────────────────────

/// An employment entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMeta {
  pub title:        String,
  /// Employer name as entered; may also exist as an [`crate::org::Organization`].
  pub organization: Option<String>,
  pub location:     Option<String>,
  pub start_date:   Option<NaiveDate>,
  /// `None` while the position is current.
  pub end_date:     Option<NaiveDate>,
  pub description:  Option<String>,
}

/// A degree, certification programme, or other formal education.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EducationMeta {
  pub institution:    String,
  pub degree:         Option<String>,
  pub field_of_study: Option<String>,
  pub start_date:     Option<NaiveDate>,
  pub end_date:       Option<NaiveDate>,
  pub description:    Option<String>,
}

/// A project, either standalone or nested under a job or education entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
  pub title:       String,
  pub description: Option<String>,
  pub url:         Option<String>,
  pub start_date:  Option<NaiveDate>,
  pub end_date:    Option<NaiveDate>,
}

/// A point-in-time occurrence (conference talk, award, launch, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
  pub title:       String,
  pub location:    Option<String>,
  pub date:        Option<NaiveDate>,
  pub description: Option<String>,
}

/// A concrete step taken towards a goal, usually nested under another node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionMeta {
  pub title:       String,
  pub description: Option<String>,
  pub date:        Option<NaiveDate>,
}

/// A career change connecting two phases (role change, relocation, pivot).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionMeta {
  pub title:       String,
  pub description: Option<String>,
  pub from_role:   Option<String>,
  pub to_role:     Option<String>,
  pub date:        Option<NaiveDate>,
}

// ─── NodeMeta ────────────────────────────────────────────────────────────────

/// The typed payload of a node. The variant name serves as the `kind`
/// discriminant stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum NodeMeta {
  Job(JobMeta),
  Education(EducationMeta),
  Project(ProjectMeta),
  Event(EventMeta),
  Action(ActionMeta),
  Transition(TransitionMeta),
}

impl NodeMeta {
  pub fn kind(&self) -> NodeKind {
    match self {
      Self::Job(_) => NodeKind::Job,
      Self::Education(_) => NodeKind::Education,
      Self::Project(_) => NodeKind::Project,
      Self::Event(_) => NodeKind::Event,
      Self::Action(_) => NodeKind::Action,
      Self::Transition(_) => NodeKind::Transition,
    }
  }

  /// Display title, regardless of kind.
  pub fn title(&self) -> &str {
    match self {
      Self::Job(m) => &m.title,
      Self::Education(m) => &m.institution,
      Self::Project(m) => &m.title,
      Self::Event(m) => &m.title,
      Self::Action(m) => &m.title,
      Self::Transition(m) => &m.title,
    }
  }

  /// Serialise the inner payload (without the kind tag) for the `meta_json`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    // We want only the payload.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the kind discriminant and JSON payload stored in the
  /// database.
  pub fn from_parts(kind: &str, data: serde_json::Value) -> Result<Self> {
    let wrapped = serde_json::json!({ "type": kind, "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── TimelineNode ────────────────────────────────────────────────────────────

/// One career item in a user's timeline forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineNode {
  pub node_id:    Uuid,
  pub owner_id:   Uuid,
  /// `None` for root nodes.
  pub parent_id:  Option<Uuid>,
  pub meta:       NodeMeta,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

// ─── NewNode ─────────────────────────────────────────────────────────────────

/// Input to [`crate::store::TimelineStore::create_node`].
/// Timestamps and the node id are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewNode {
  pub owner_id:  Uuid,
  pub parent_id: Option<Uuid>,
  pub meta:      NodeMeta,
}

impl NewNode {
  /// Convenience constructor for a root node.
  pub fn root(owner_id: Uuid, meta: NodeMeta) -> Self {
    Self { owner_id, parent_id: None, meta }
  }

  /// Convenience constructor for a child node.
  pub fn child_of(owner_id: Uuid, parent_id: Uuid, meta: NodeMeta) -> Self {
    Self { owner_id, parent_id: Some(parent_id), meta }
  }
}
