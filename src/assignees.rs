// Distinct assignee names across a collection

use std::collections::BTreeSet;

use crate::models::Task;

/// Label the UI shows for tasks without an assignee; never indexed
pub const UNASSIGNED: &str = "Unassigned";

/// Sorted set of non-empty assignee names, rebuilt from the full collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssigneeIndex {
    names: BTreeSet<String>,
}

impl AssigneeIndex {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let names = tasks
            .iter()
            .map(|t| t.assignee.trim())
            .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case(UNASSIGNED))
            .map(str::to_string)
            .collect();
        Self { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
