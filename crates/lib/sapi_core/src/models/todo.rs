//! Todo models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::UserId;

pub type TodoId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub owner_id: UserId,
    pub title: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTodo {
    pub title: String,
    pub done: bool,
}

/// Partial todo update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TodoUpdate {
    pub title: Option<String>,
    pub done: Option<bool>,
}

/// Which todos a listing returns. Counts are always over all of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TodoFilter {
    #[default]
    All,
    Completed,
    InWork,
}

impl TodoFilter {
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            TodoFilter::All => true,
            TodoFilter::Completed => todo.done,
            TodoFilter::InWork => !todo.done,
        }
    }
}

/// Counts over all of an owner's todos.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TodoSummary {
    pub all: i64,
    pub completed: i64,
    pub in_work: i64,
}

#[derive(Debug, Clone)]
pub struct TodoList {
    pub todos: Vec<Todo>,
    pub summary: TodoSummary,
}
