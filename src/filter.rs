use std::collections::BTreeSet;

use crate::models::{Status, Task};

/// Board filter. Empty sets and a missing employee mean "everything".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub departments: BTreeSet<u64>,
    pub priorities: BTreeSet<u64>,
    pub employee: Option<u64>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        (self.departments.is_empty() || self.departments.contains(&task.department.id))
            && (self.priorities.is_empty() || self.priorities.contains(&task.priority.id))
            && self.employee.map_or(true, |id| task.employee.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.departments.is_empty() && self.priorities.is_empty() && self.employee.is_none()
    }

    pub fn toggle_department(&mut self, id: u64) {
        toggle(&mut self.departments, id);
    }

    pub fn toggle_priority(&mut self, id: u64) {
        toggle(&mut self.priorities, id);
    }

    /// Selecting the current employee again clears the selection.
    pub fn toggle_employee(&mut self, id: u64) {
        self.employee = if self.employee == Some(id) {
            None
        } else {
            Some(id)
        };
    }

    pub fn clear(&mut self) {
        *self = TaskFilter::default();
    }
}

fn toggle(set: &mut BTreeSet<u64>, id: u64) {
    if !set.remove(&id) {
        set.insert(id);
    }
}

pub struct Column {
    pub status: Status,
    pub tasks: Vec<Task>,
}

/// Id of the column that collects tasks whose status is not cached.
pub const UNKNOWN_STATUS_ID: u64 = 0;

/// One column per cached status, in status order. Tasks whose status is not
/// cached go to a trailing "Unknown status" column, shown only when it has
/// tasks. With no statuses cached there is no board at all.
pub fn board(statuses: &[Status], tasks: &[Task], filter: &TaskFilter) -> Vec<Column> {
    if statuses.is_empty() {
        return Vec::new();
    }
    let mut columns: Vec<Column> = statuses
        .iter()
        .map(|status| Column {
            status: status.clone(),
            tasks: tasks
                .iter()
                .filter(|t| t.status.id == status.id && filter.matches(t))
                .cloned()
                .collect(),
        })
        .collect();

    let unknown: Vec<Task> = tasks
        .iter()
        .filter(|t| !statuses.iter().any(|s| s.id == t.status.id) && filter.matches(t))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        columns.push(Column {
            status: Status {
                id: UNKNOWN_STATUS_ID,
                name: "Unknown status".to_string(),
            },
            tasks: unknown,
        });
    }
    columns
}
