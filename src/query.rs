// Derived views: search, filter and sort over a task collection

use clap::ValueEnum;
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use crate::models::{Priority, Status, Task};

/// Filter value with an "All" passthrough sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Selection<T> {
    #[default]
    All,
    Only(T),
}

impl<T: PartialEq> Selection<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Selection::All => true,
            Selection::Only(wanted) => wanted == value,
        }
    }
}

impl<T: FromStr> FromStr for Selection<T> {
    type Err = T::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }
        s.parse().map(Selection::Only)
    }
}

impl<T: fmt::Display> fmt::Display for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => write!(f, "All"),
            Selection::Only(value) => write!(f, "{}", value),
        }
    }
}

/// Presentation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SortKey {
    /// Ascending; tasks without a due date last
    DueDate,
    /// Ascending by severity rank
    Priority,
    /// Most recently updated first
    #[default]
    UpdatedAt,
}

/// Parameters of a derived view
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    pub search: String,
    pub status: Selection<Status>,
    pub priority: Selection<Priority>,
    pub sort: SortKey,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = text.into();
        self
    }

    pub fn status(mut self, status: Selection<Status>) -> Self {
        self.status = status;
        self
    }

    pub fn priority(mut self, priority: Selection<Priority>) -> Self {
        self.priority = priority;
        self
    }

    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Search, then status filter, then priority filter, then stable sort
    ///
    /// The input slice is never modified.
    pub fn apply(&self, tasks: &[Task]) -> Vec<Task> {
        let needle = self.search.to_lowercase();

        let mut view: Vec<Task> = tasks
            .iter()
            .filter(|t| matches_search(t, &needle))
            .filter(|t| self.status.matches(&t.status))
            .filter(|t| self.priority.matches(&t.priority))
            .cloned()
            .collect();

        // slice::sort_by_key is stable
        match self.sort {
            SortKey::DueDate => view.sort_by_key(|t| (t.due_date.is_none(), t.due_date)),
            SortKey::Priority => view.sort_by_key(|t| t.priority.rank()),
            SortKey::UpdatedAt => view.sort_by_key(|t| Reverse(t.updated_at)),
        }

        view
    }
}

fn matches_search(task: &Task, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    task.title.to_lowercase().contains(needle)
        || task.description.to_lowercase().contains(needle)
        || task.assignee.to_lowercase().contains(needle)
}

/// Memoizes the last derived view
///
/// Recomputes only when the collection revision or the query changes.
#[derive(Debug, Default)]
pub struct ViewCache {
    key: Option<(u64, Query)>,
    view: Vec<Task>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&mut self, revision: u64, tasks: &[Task], query: &Query) -> &[Task] {
        let fresh = matches!(&self.key, Some((rev, q)) if *rev == revision && q == query);
        if !fresh {
            self.view = query.apply(tasks);
            self.key = Some((revision, query.clone()));
        }
        &self.view
    }
}
