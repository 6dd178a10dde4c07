use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::snapshot::Snapshot;
use crate::todo::Todo;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed
}

impl StatusFilter {
  pub fn matches(
    self,
    todo: &Todo
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Active => {
        !todo.completed
      }
      | StatusFilter::Completed => {
        todo.completed
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "active" | "pending" => {
        Ok(StatusFilter::Active)
      }
      | "completed" | "done" => {
        Ok(StatusFilter::Completed)
      }
      | other => Err(anyhow!(
        "invalid filter: {other} \
         (expected all, active or \
         completed)"
      ))
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | StatusFilter::All => "all",
      | StatusFilter::Active => "active",
      | StatusFilter::Completed => {
        "completed"
      }
    })
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum SortKey {
  #[default]
  Date,
  Priority,
  Category
}

impl FromStr for SortKey {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "date" | "due" => {
        Ok(SortKey::Date)
      }
      | "priority" => {
        Ok(SortKey::Priority)
      }
      | "category" => {
        Ok(SortKey::Category)
      }
      | other => Err(anyhow!(
        "invalid sort: {other} \
         (expected date, priority or \
         category)"
      ))
    }
  }
}

impl fmt::Display for SortKey {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(match self {
      | SortKey::Date => "date",
      | SortKey::Priority => "priority",
      | SortKey::Category => "category"
    })
  }
}

/// Transient list settings picked in
/// the UI; never persisted with the
/// snapshot.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct ViewParams {
  pub filter: StatusFilter,
  pub search: String,
  pub sort:   SortKey
}

impl ViewParams {
  fn keeps(
    &self,
    todo: &Todo,
    needle: &str
  ) -> bool {
    todo
      .text
      .to_lowercase()
      .contains(needle)
      && self.filter.matches(todo)
  }
}

/// Filters then stably sorts the todos
/// of `snapshot`. The snapshot is only
/// read; the result is a fresh vector.
#[tracing::instrument(skip(
  snapshot, params
), fields(
  filter = %params.filter,
  sort = %params.sort
))]
pub fn project<'a>(
  snapshot: &'a Snapshot,
  params: &ViewParams
) -> Vec<&'a Todo> {
  let needle =
    params.search.to_lowercase();

  let mut out: Vec<&Todo> = snapshot
    .todos
    .iter()
    .filter(|todo| {
      params.keeps(todo, &needle)
    })
    .collect();

  match params.sort {
    | SortKey::Date => {
      out.sort_by_key(|t| t.due_date)
    }
    | SortKey::Priority => {
      out.sort_by_key(|t| {
        t.priority.rank()
      })
    }
    | SortKey::Category => {
      out.sort_by(|a, b| {
        a.category.cmp(&b.category)
      })
    }
  }

  trace!(
    total = snapshot.todos.len(),
    shown = out.len(),
    "projected todos"
  );
  out
}

#[must_use]
pub fn active_count(
  snapshot: &Snapshot
) -> usize {
  snapshot
    .todos
    .iter()
    .filter(|t| !t.completed)
    .count()
}
