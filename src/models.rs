use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Department {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Employee {
    pub id: u64,
    pub name: String,
    pub surname: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub department_id: Option<u64>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.surname)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Priority {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl Priority {
    pub fn level(&self) -> PriorityLevel {
        PriorityLevel::from_name(&self.name)
    }

    /// Server icon, or the level's bundled icon when the server sent none.
    pub fn icon_or_fallback(&self) -> &str {
        match self.icon.as_deref() {
            Some(icon) if !icon.trim().is_empty() => icon,
            _ => self.level().fallback_icon(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
}

impl PriorityLevel {
    /// Unknown names are treated as low.
    pub fn from_name(name: &str) -> PriorityLevel {
        match name.trim().to_lowercase().as_str() {
            "medium" | "საშუალო" => PriorityLevel::Medium,
            "high" | "მაღალი" => PriorityLevel::High,
            _ => PriorityLevel::Low,
        }
    }

    pub fn fallback_icon(self) -> &'static str {
        match self {
            PriorityLevel::Low => "/icons/Low.svg",
            PriorityLevel::Medium => "/icons/Medium.svg",
            PriorityLevel::High => "/icons/High.svg",
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub department: Department,
    pub employee: Employee,
    pub status: Status,
    pub priority: Priority,
    /// Client-side projection of comments plus replies.
    pub comment_count: usize,
}

/// Comments are one level deep: top-level comments own their replies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub id: u64,
    pub author_nickname: String,
    pub text: String,
    pub author_avatar: Option<String>,
    pub parent_id: Option<u64>,
    pub sub_comments: Vec<Comment>,
}

/// Total number of comments and replies in a comment tree.
pub fn comment_total(comments: &[Comment]) -> usize {
    comments.iter().map(|c| 1 + c.sub_comments.len()).sum()
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub status_id: u64,
    pub priority_id: u64,
    pub department_id: u64,
    pub employee_id: u64,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct NewComment {
    pub text: String,
    pub task_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewEmployee {
    pub name: String,
    pub surname: String,
    pub department_id: u64,
    pub avatar: Option<PathBuf>,
}

/// The four lookup collections loaded together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReferenceData {
    pub departments: Vec<Department>,
    pub employees: Vec<Employee>,
    pub priorities: Vec<Priority>,
    pub statuses: Vec<Status>,
}

impl ReferenceData {
    pub fn department(&self, id: u64) -> Option<&Department> {
        self.departments.iter().find(|d| d.id == id)
    }

    pub fn employee(&self, id: u64) -> Option<&Employee> {
        self.employees.iter().find(|e| e.id == id)
    }

    pub fn priority(&self, id: u64) -> Option<&Priority> {
        self.priorities.iter().find(|p| p.id == id)
    }

    pub fn status(&self, id: u64) -> Option<&Status> {
        self.statuses.iter().find(|s| s.id == id)
    }

    pub fn employees_in(&self, department_id: u64) -> impl Iterator<Item = &Employee> {
        self.employees
            .iter()
            .filter(move |e| e.department_id == Some(department_id))
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
            && self.employees.is_empty()
            && self.priorities.is_empty()
            && self.statuses.is_empty()
    }
}
