use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway::{ChangeEvent, ChangeKind};
use super::list::{List, ListId, ListKind};
use super::record::{Record, SortOrder};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TodoId(pub Uuid);

impl TodoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TodoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Due dates are calendar dates with no time component, so they never shift
/// across time zones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    pub id: TodoId,
    pub user_id: Uuid,
    pub list_id: Option<ListId>,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for Todo {
    type Patch = UpdateTodo;

    // Newest first.
    const ORDER: SortOrder = SortOrder::CreatedDesc;

    fn id(&self) -> Uuid {
        self.id.0
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn apply_patch(&mut self, patch: &UpdateTodo) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(completed) = patch.completed {
            self.completed = completed;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
    }
}

/// The list a new todo is filed under, as known to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListRef {
    pub id: ListId,
    pub kind: ListKind,
}

impl ListRef {
    pub fn of(list: &List) -> Self {
        Self {
            id: list.id,
            kind: list.kind,
        }
    }
}

/// Caller-supplied fields for a new todo; identity and ownership are stamped
/// by the synchronizer.
#[derive(Debug, Clone)]
pub struct CreateTodo {
    pub title: String,
    pub description: Option<String>,
    pub list: Option<ListRef>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
}

impl CreateTodo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            list: None,
            priority: None,
            due_date: None,
        }
    }

    /// Drops detail fields the owning list's kind does not carry, whatever
    /// the caller put in them.
    pub fn normalized(mut self) -> Self {
        if let Some(list) = &self.list {
            if !list.kind.carries_details() {
                self.priority = None;
                self.due_date = None;
            }
        }
        self
    }
}

/// Partial update. Nullable columns use a nested `Option` so that
/// `Some(None)` clears the stored value while `None` leaves it untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<Priority>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl UpdateTodo {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }
}

/// Narrows which todos a synchronizer fetches and which change events it
/// reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TodoScope {
    /// Every todo the user can see.
    #[default]
    All,
    /// Todos not filed under any list.
    Unlisted,
    /// Todos belonging to one list.
    InList(ListId),
}

impl TodoScope {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            TodoScope::All => true,
            TodoScope::Unlisted => todo.list_id.is_none(),
            TodoScope::InList(id) => todo.list_id == Some(*id),
        }
    }

    /// Whether a change event warrants a re-fetch under this scope.
    ///
    /// Row images are advisory: deletions always count, and an event whose
    /// images are both missing cannot prove itself irrelevant.
    pub fn is_relevant(&self, event: &ChangeEvent<Todo>) -> bool {
        if matches!(self, TodoScope::All) || event.kind == ChangeKind::Delete {
            return true;
        }
        if event.old.is_none() && event.new.is_none() {
            return true;
        }
        event.old.as_ref().is_some_and(|t| self.matches(t))
            || event.new.as_ref().is_some_and(|t| self.matches(t))
    }
}
