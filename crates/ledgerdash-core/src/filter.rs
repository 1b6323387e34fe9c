use chrono::NaiveDateTime;
use tracing::{
  debug,
  trace
};

use crate::item::{
  ReminderItem,
  TodoItem
};
use crate::store::{
  Reminders,
  TodoList
};

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum TodoFilter {
  #[default]
  All,
  Active,
  Completed
}

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq
)]
pub enum ReminderFilter {
  All,
  #[default]
  Upcoming,
  Completed,
  Overdue
}

impl TodoFilter {
  /// Selector by name; unknown names
  /// select everything.
  pub fn from_name(name: &str) -> Self {
    match name
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "active" => Self::Active,
      | "completed" => Self::Completed,
      | "all" => Self::All,
      | other => {
        debug!(
          selector = other,
          "unknown todo selector; \
           showing all"
        );
        Self::All
      }
    }
  }

  pub fn matches(
    self,
    item: &TodoItem
  ) -> bool {
    match self {
      | Self::All => true,
      | Self::Active => !item.completed,
      | Self::Completed => item.completed
    }
  }
}

impl ReminderFilter {
  /// Selector by name; unknown names
  /// select everything.
  pub fn from_name(name: &str) -> Self {
    match name
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "upcoming" => Self::Upcoming,
      | "completed" => Self::Completed,
      | "overdue" => Self::Overdue,
      | "all" => Self::All,
      | other => {
        debug!(
          selector = other,
          "unknown reminder selector; \
           showing all"
        );
        Self::All
      }
    }
  }

  pub fn matches(
    self,
    item: &ReminderItem,
    now: NaiveDateTime
  ) -> bool {
    let due = item.due_at();
    match self {
      | Self::All => true,
      | Self::Upcoming => {
        due > now && !item.completed
      }
      | Self::Completed => item.completed,
      | Self::Overdue => {
        due < now && !item.completed
      }
    }
  }
}

/// One displayed reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderView<'a> {
  pub item:       &'a ReminderItem,
  pub due_at:     NaiveDateTime,
  /// Past due and still open; set
  /// regardless of the selector.
  pub is_overdue: bool
}

/// Todos matching `filter`, in
/// insertion order.
pub fn todo_view(
  items: &[TodoItem],
  filter: TodoFilter
) -> Vec<&TodoItem> {
  let out: Vec<&TodoItem> = items
    .iter()
    .filter(|item| filter.matches(item))
    .collect();
  trace!(
    ?filter,
    total = items.len(),
    shown = out.len(),
    "built todo view"
  );
  out
}

/// Reminders matching `filter`, sorted
/// by due-time. The sort is stable so
/// equal due-times keep insertion
/// order.
pub fn reminder_view(
  items: &[ReminderItem],
  filter: ReminderFilter,
  now: NaiveDateTime
) -> Vec<ReminderView<'_>> {
  let mut out: Vec<ReminderView<'_>> =
    items
      .iter()
      .filter(|item| {
        filter.matches(item, now)
      })
      .map(|item| {
        let due_at = item.due_at();
        ReminderView {
          item,
          due_at,
          is_overdue: due_at < now
            && !item.completed
        }
      })
      .collect();
  out.sort_by_key(|view| view.due_at);
  trace!(
    ?filter,
    total = items.len(),
    shown = out.len(),
    "built reminder view"
  );
  out
}

impl TodoList {
  pub fn view(
    &self,
    filter: TodoFilter
  ) -> Vec<&TodoItem> {
    todo_view(self.items(), filter)
  }
}

impl Reminders {
  pub fn view(
    &self,
    filter: ReminderFilter,
    now: NaiveDateTime
  ) -> Vec<ReminderView<'_>> {
    reminder_view(
      self.items(),
      filter,
      now
    )
  }
}
