//! Form state for new tasks and new employees.

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::FieldError;
use crate::models::{NewEmployee, NewTask, PriorityLevel, ReferenceData};
use crate::parser::{format_due_date, parse_due_date};
use crate::validation;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskField {
    Name,
    Description,
    DueDate,
    Status,
    Priority,
    Department,
    Employee,
}

impl TaskField {
    const ORDER: [TaskField; 7] = [
        TaskField::Name,
        TaskField::Description,
        TaskField::DueDate,
        TaskField::Status,
        TaskField::Priority,
        TaskField::Department,
        TaskField::Employee,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskField::Name => "Title",
            TaskField::Description => "Description",
            TaskField::DueDate => "Due date",
            TaskField::Status => "Status",
            TaskField::Priority => "Priority",
            TaskField::Department => "Department",
            TaskField::Employee => "Employee",
        }
    }

    /// Field key used in `FieldError`.
    pub fn key(self) -> &'static str {
        match self {
            TaskField::Name => "name",
            TaskField::Description => "description",
            TaskField::DueDate => "due_date",
            TaskField::Status => "status",
            TaskField::Priority => "priority",
            TaskField::Department => "department",
            TaskField::Employee => "employee",
        }
    }

    pub fn all() -> &'static [TaskField] {
        &Self::ORDER
    }
}

#[derive(Clone, Debug)]
pub struct TaskForm {
    pub name: String,
    pub description: String,
    pub due_date: String,
    pub status_id: Option<u64>,
    pub priority_id: Option<u64>,
    pub department_id: Option<u64>,
    pub employee_id: Option<u64>,
    pub focus: TaskField,
    pub error: Option<FieldError>,
}

impl TaskForm {
    /// Defaults: first status, medium priority, due tomorrow.
    pub fn new(refs: &ReferenceData, today: NaiveDate) -> Self {
        let tomorrow = parse_due_date("tomorrow", today);
        let priority_id = refs
            .priorities
            .iter()
            .find(|p| p.level() == PriorityLevel::Medium)
            .or_else(|| refs.priorities.first())
            .map(|p| p.id);

        TaskForm {
            name: String::new(),
            description: String::new(),
            due_date: tomorrow.as_ref().map(format_due_date).unwrap_or_default(),
            status_id: refs.statuses.first().map(|s| s.id),
            priority_id,
            department_id: None,
            employee_id: None,
            focus: TaskField::Name,
            error: None,
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = step(TaskField::all(), self.focus, 1);
    }

    pub fn focus_prev(&mut self) {
        self.focus = step(TaskField::all(), self.focus, -1);
    }

    fn text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            TaskField::Name => Some(&mut self.name),
            TaskField::Description => Some(&mut self.description),
            TaskField::DueDate => Some(&mut self.due_date),
            _ => None,
        }
    }

    pub fn push(&mut self, c: char) {
        if let Some(text) = self.text_mut() {
            text.push(c);
        }
    }

    pub fn pop(&mut self) {
        if let Some(text) = self.text_mut() {
            text.pop();
        }
    }

    /// Moves the focused choice field to the next or previous option.
    pub fn cycle(&mut self, refs: &ReferenceData, forward: bool) {
        match self.focus {
            TaskField::Status => {
                let ids: Vec<u64> = refs.statuses.iter().map(|s| s.id).collect();
                self.status_id = cycle_id(&ids, self.status_id, forward);
            }
            TaskField::Priority => {
                let ids: Vec<u64> = refs.priorities.iter().map(|p| p.id).collect();
                self.priority_id = cycle_id(&ids, self.priority_id, forward);
            }
            TaskField::Department => {
                let ids: Vec<u64> = refs.departments.iter().map(|d| d.id).collect();
                self.department_id = cycle_id(&ids, self.department_id, forward);
                let still_valid = match (self.department_id, self.employee_id) {
                    (Some(department), Some(employee)) => refs
                        .employees_in(department)
                        .any(|e| e.id == employee),
                    _ => false,
                };
                if !still_valid {
                    self.employee_id = None;
                }
            }
            TaskField::Employee => {
                if let Some(department) = self.department_id {
                    let ids: Vec<u64> = refs.employees_in(department).map(|e| e.id).collect();
                    self.employee_id = cycle_id(&ids, self.employee_id, forward);
                }
            }
            _ => {}
        }
    }

    pub fn build(&self, refs: &ReferenceData, today: NaiveDate) -> Result<NewTask, FieldError> {
        validation::task_name(&self.name)?;
        validation::description(&self.description)?;

        let due_date = parse_due_date(&self.due_date, today).ok_or_else(|| {
            FieldError::new(
                "due_date",
                "use YYYY-MM-DD, DD.MM.YYYY, today, tomorrow or +Nd",
            )
        })?;
        if due_date.date_naive() < today {
            return Err(FieldError::new("due_date", "cannot be in the past"));
        }

        let status_id = self
            .status_id
            .filter(|id| refs.status(*id).is_some())
            .ok_or_else(|| FieldError::new("status", "required"))?;
        let priority_id = self
            .priority_id
            .filter(|id| refs.priority(*id).is_some())
            .ok_or_else(|| FieldError::new("priority", "required"))?;
        let department_id = self
            .department_id
            .filter(|id| refs.department(*id).is_some())
            .ok_or_else(|| FieldError::new("department", "choose a department"))?;
        let employee_id = self
            .employee_id
            .filter(|id| refs.employees_in(department_id).any(|e| e.id == *id))
            .ok_or_else(|| FieldError::new("employee", "choose an employee"))?;

        let description = self.description.trim();
        Ok(NewTask {
            name: self.name.trim().to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            due_date: Some(due_date),
            status_id,
            priority_id,
            department_id,
            employee_id,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmployeeField {
    Name,
    Surname,
    Department,
    Avatar,
}

impl EmployeeField {
    const ORDER: [EmployeeField; 4] = [
        EmployeeField::Name,
        EmployeeField::Surname,
        EmployeeField::Department,
        EmployeeField::Avatar,
    ];

    pub fn label(self) -> &'static str {
        match self {
            EmployeeField::Name => "Name",
            EmployeeField::Surname => "Surname",
            EmployeeField::Department => "Department",
            EmployeeField::Avatar => "Avatar file",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            EmployeeField::Name => "name",
            EmployeeField::Surname => "surname",
            EmployeeField::Department => "department",
            EmployeeField::Avatar => "avatar",
        }
    }

    pub fn all() -> &'static [EmployeeField] {
        &Self::ORDER
    }
}

#[derive(Clone, Debug)]
pub struct EmployeeForm {
    pub name: String,
    pub surname: String,
    pub department_id: Option<u64>,
    pub avatar: String,
    pub focus: EmployeeField,
    pub error: Option<FieldError>,
}

impl Default for EmployeeForm {
    fn default() -> Self {
        EmployeeForm {
            name: String::new(),
            surname: String::new(),
            department_id: None,
            avatar: String::new(),
            focus: EmployeeField::Name,
            error: None,
        }
    }
}

impl EmployeeForm {
    /// Starts with a department preselected, as when opened from the task form.
    pub fn for_department(department_id: Option<u64>) -> Self {
        EmployeeForm {
            department_id,
            ..EmployeeForm::default()
        }
    }

    pub fn focus_next(&mut self) {
        self.focus = step(EmployeeField::all(), self.focus, 1);
    }

    pub fn focus_prev(&mut self) {
        self.focus = step(EmployeeField::all(), self.focus, -1);
    }

    fn text_mut(&mut self) -> Option<&mut String> {
        match self.focus {
            EmployeeField::Name => Some(&mut self.name),
            EmployeeField::Surname => Some(&mut self.surname),
            EmployeeField::Avatar => Some(&mut self.avatar),
            EmployeeField::Department => None,
        }
    }

    pub fn push(&mut self, c: char) {
        if let Some(text) = self.text_mut() {
            text.push(c);
        }
    }

    pub fn pop(&mut self) {
        if let Some(text) = self.text_mut() {
            text.pop();
        }
    }

    pub fn cycle(&mut self, refs: &ReferenceData, forward: bool) {
        if self.focus == EmployeeField::Department {
            let ids: Vec<u64> = refs.departments.iter().map(|d| d.id).collect();
            self.department_id = cycle_id(&ids, self.department_id, forward);
        }
    }

    pub fn build(&self) -> Result<NewEmployee, FieldError> {
        let name = self.name.trim();
        let surname = self.surname.trim();
        validation::person_name("name", name)?;
        validation::person_name("surname", surname)?;
        let department_id = self
            .department_id
            .ok_or_else(|| FieldError::new("department", "choose a department"))?;
        let avatar = self.avatar.trim();

        Ok(NewEmployee {
            name: name.to_string(),
            surname: surname.to_string(),
            department_id,
            avatar: (!avatar.is_empty()).then(|| PathBuf::from(avatar)),
        })
    }
}

fn step<T: Copy + PartialEq>(order: &[T], current: T, delta: isize) -> T {
    let len = order.len() as isize;
    let pos = order.iter().position(|f| *f == current).unwrap_or(0) as isize;
    order[(pos + delta).rem_euclid(len) as usize]
}

/// Next or previous id in `ids`, wrapping. With nothing selected, forward
/// picks the first option and backward the last.
pub fn cycle_id(ids: &[u64], current: Option<u64>, forward: bool) -> Option<u64> {
    if ids.is_empty() {
        return None;
    }
    let len = ids.len() as isize;
    let delta = if forward { 1 } else { -1 };
    let next = match current.and_then(|id| ids.iter().position(|x| *x == id)) {
        Some(pos) => (pos as isize + delta).rem_euclid(len),
        None if forward => 0,
        None => len - 1,
    };
    Some(ids[next as usize])
}
