//! In-memory `TaskApi` for tests: seeded data, per-endpoint call counters,
//! an optional response delay and switchable failures.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;

use crate::api::TaskApi;
use crate::error::ApiError;
use crate::models::{
    Comment, Department, Employee, NewComment, NewEmployee, NewTask, Priority, Status, Task,
};

pub struct FakeData {
    pub departments: Vec<Department>,
    pub employees: Vec<Employee>,
    pub priorities: Vec<Priority>,
    pub statuses: Vec<Status>,
    pub tasks: Vec<Task>,
    pub comments: HashMap<u64, Vec<Comment>>,
}

pub struct FakeApi {
    pub data: Mutex<FakeData>,
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Duration>,
}

pub fn department(id: u64, name: &str) -> Department {
    Department {
        id,
        name: name.to_string(),
    }
}

pub fn employee(id: u64, name: &str, department_id: u64) -> Employee {
    Employee {
        id,
        name: name.to_string(),
        surname: "Beridze".to_string(),
        avatar: None,
        department_id: Some(department_id),
    }
}

pub fn status(id: u64, name: &str) -> Status {
    Status {
        id,
        name: name.to_string(),
    }
}

pub fn priority(id: u64, name: &str) -> Priority {
    Priority {
        id,
        name: name.to_string(),
        icon: None,
    }
}

pub fn task(id: u64, status: Status, employee: Employee, department: Department) -> Task {
    Task {
        id,
        name: format!("Task {}", id),
        description: None,
        due_date: None,
        department,
        employee,
        status,
        priority: priority(2, "საშუალო"),
        comment_count: 0,
    }
}

pub fn comment(id: u64, parent_id: Option<u64>, replies: Vec<Comment>) -> Comment {
    Comment {
        id,
        author_nickname: "nino".to_string(),
        text: format!("comment {}", id),
        author_avatar: None,
        parent_id,
        sub_comments: replies,
    }
}

impl FakeData {
    /// Statuses use the server's English names; ids 1 to 4.
    pub fn seeded() -> Self {
        let design = department(1, "Design Department");
        let it = department(2, "IT Department");
        let nino = employee(1, "Nino", 1);
        let giorgi = employee(2, "Giorgi", 2);

        let statuses = vec![
            status(1, "To Do"),
            status(2, "In Progress"),
            status(3, "Ready for Testing"),
            status(4, "Done"),
        ];

        let mut tasks = vec![
            task(1, statuses[0].clone(), nino.clone(), design.clone()),
            task(2, statuses[0].clone(), giorgi.clone(), it.clone()),
            task(3, statuses[1].clone(), nino.clone(), design.clone()),
        ];
        tasks[2].priority = priority(3, "მაღალი");
        tasks[0].comment_count = 2;

        let mut comments = HashMap::new();
        comments.insert(1, vec![comment(10, None, vec![comment(11, Some(10), vec![])])]);

        FakeData {
            departments: vec![design, it],
            employees: vec![nino, giorgi],
            priorities: vec![
                priority(1, "დაბალი"),
                priority(2, "საშუალო"),
                priority(3, "მაღალი"),
            ],
            statuses,
            tasks,
            comments,
        }
    }
}

impl FakeApi {
    pub fn new() -> Self {
        FakeApi {
            data: Mutex::new(FakeData::seeded()),
            calls: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    /// Every call suspends for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail(&self, endpoint: &str) {
        self.failing.lock().insert(endpoint.to_string());
    }

    pub fn recover(&self, endpoint: &str) {
        self.failing.lock().remove(endpoint);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls.lock().get(endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    async fn hit(&self, endpoint: &str) -> Result<(), ApiError> {
        *self.calls.lock().entry(endpoint.to_string()).or_insert(0) += 1;
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(endpoint) {
            return Err(ApiError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: format!("{} unavailable", endpoint),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl TaskApi for FakeApi {
    async fn departments(&self) -> Result<Vec<Department>, ApiError> {
        self.hit("departments").await?;
        Ok(self.data.lock().departments.clone())
    }

    async fn employees(&self) -> Result<Vec<Employee>, ApiError> {
        self.hit("employees").await?;
        Ok(self.data.lock().employees.clone())
    }

    async fn priorities(&self) -> Result<Vec<Priority>, ApiError> {
        self.hit("priorities").await?;
        Ok(self.data.lock().priorities.clone())
    }

    async fn statuses(&self) -> Result<Vec<Status>, ApiError> {
        self.hit("statuses").await?;
        Ok(self.data.lock().statuses.clone())
    }

    async fn tasks(&self) -> Result<Vec<Task>, ApiError> {
        self.hit("tasks").await?;
        Ok(self.data.lock().tasks.clone())
    }

    async fn create_task(&self, new: &NewTask) -> Result<u64, ApiError> {
        self.hit("create_task").await?;
        let mut data = self.data.lock();
        let id = data.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
        let status = data.statuses.iter().find(|s| s.id == new.status_id).cloned();
        let employee = data.employees.iter().find(|e| e.id == new.employee_id).cloned();
        let department = data
            .departments
            .iter()
            .find(|d| d.id == new.department_id)
            .cloned();
        let priority = data.priorities.iter().find(|p| p.id == new.priority_id).cloned();

        match (status, employee, department, priority) {
            (Some(status), Some(employee), Some(department), Some(priority)) => {
                let mut created = task(id, status, employee, department);
                created.name = new.name.clone();
                created.description = new.description.clone();
                created.due_date = new.due_date;
                created.priority = priority;
                data.tasks.push(created);
                Ok(id)
            }
            _ => Err(ApiError::Status {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "unknown reference".to_string(),
            }),
        }
    }

    async fn update_task_status(&self, task_id: u64, status_id: u64) -> Result<(), ApiError> {
        self.hit("update_task_status").await?;
        let mut data = self.data.lock();
        let status = data.statuses.iter().find(|s| s.id == status_id).cloned();
        match (data.tasks.iter_mut().find(|t| t.id == task_id), status) {
            (Some(task), Some(status)) => {
                task.status = status;
                Ok(())
            }
            _ => Err(ApiError::Status {
                status: StatusCode::NOT_FOUND,
                message: "not found".to_string(),
            }),
        }
    }

    /// The tree is read when the request arrives, before the delay.
    async fn comments(&self, task_id: u64) -> Result<Vec<Comment>, ApiError> {
        let tree = self
            .data
            .lock()
            .comments
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        self.hit(&format!("comments/{}", task_id)).await?;
        Ok(tree)
    }

    async fn create_comment(&self, task_id: u64, new: &NewComment) -> Result<u64, ApiError> {
        self.hit("create_comment").await?;
        let mut data = self.data.lock();
        let tree = data.comments.entry(task_id).or_default();
        let id = tree
            .iter()
            .flat_map(|c| std::iter::once(c.id).chain(c.sub_comments.iter().map(|r| r.id)))
            .max()
            .unwrap_or(100)
            + 1;
        let mut posted = comment(id, new.parent_id, vec![]);
        posted.text = new.text.clone();

        match new.parent_id {
            Some(parent) => match tree.iter_mut().find(|c| c.id == parent) {
                Some(top) => top.sub_comments.push(posted),
                None => {
                    return Err(ApiError::Status {
                        status: StatusCode::NOT_FOUND,
                        message: "no such parent".to_string(),
                    })
                }
            },
            None => tree.push(posted),
        }
        Ok(id)
    }

    async fn create_employee(&self, new: &NewEmployee) -> Result<u64, ApiError> {
        self.hit("create_employee").await?;
        let mut data = self.data.lock();
        let id = data.employees.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        data.employees.push(Employee {
            id,
            name: new.name.clone(),
            surname: new.surname.clone(),
            avatar: None,
            department_id: Some(new.department_id),
        });
        Ok(id)
    }
}
