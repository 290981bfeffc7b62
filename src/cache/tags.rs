//! Cache tags used to decide which entries a mutation invalidates.

use std::fmt;

/// Resource collections that cache entries can be filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
  Projects,
  Tasks,
  Users,
  Teams,
}

impl ResourceKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResourceKind::Projects => "Projects",
      ResourceKind::Tasks => "Tasks",
      ResourceKind::Users => "Users",
      ResourceKind::Teams => "Teams",
    }
  }
}

/// A label a query result is provided under, or a mutation invalidates.
///
/// Tags compare structurally, so `Scoped(Tasks, 7)` and `Scoped(Tasks, 9)` never
/// collide the way formatted strings could.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
  /// The whole collection of a resource kind
  Blanket(ResourceKind),
  /// One record of a resource kind, by id
  Scoped(ResourceKind, i64),
}

impl Tag {
  pub fn kind(&self) -> ResourceKind {
    match self {
      Tag::Blanket(kind) | Tag::Scoped(kind, _) => *kind,
    }
  }

  /// Whether invalidating `self` hits an entry that provided `provided`.
  ///
  /// A blanket tag hits every tag of its kind; a scoped tag only hits the
  /// identical scoped tag.
  pub fn invalidates(&self, provided: &Tag) -> bool {
    match self {
      Tag::Blanket(kind) => provided.kind() == *kind,
      Tag::Scoped(..) => self == provided,
    }
  }

  /// One scoped tag per id, or the blanket tag when there are no ids.
  ///
  /// An empty result must stay invalidatable by a later mutation on the
  /// same collection.
  pub fn per_id_or_blanket<I>(kind: ResourceKind, ids: I) -> Vec<Tag>
  where
    I: IntoIterator<Item = i64>,
  {
    let tags: Vec<Tag> = ids.into_iter().map(|id| Tag::Scoped(kind, id)).collect();
    if tags.is_empty() {
      vec![Tag::Blanket(kind)]
    } else {
      tags
    }
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Tag::Blanket(kind) => f.write_str(kind.as_str()),
      Tag::Scoped(kind, id) => write!(f, "{}:{}", kind.as_str(), id),
    }
  }
}
