//! Shared cache of tasks and reference data.
//!
//! One `Store` lives for the whole session and is handed around as
//! `Arc<Store>`. Consumers read owned snapshots; every write goes through one
//! of the named operations below. Locks are never held across a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::TaskApi;
use crate::debounce::Debouncer;
use crate::error::{ApiError, FieldError, StoreError};
use crate::models::{
    comment_total, Comment, Department, NewComment, NewEmployee, NewTask, ReferenceData, Status,
    Task,
};
use crate::normalizer::{
    department_to_canonical, department_to_display, status_to_canonical, status_to_display,
};
use crate::validation;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FetchState {
    #[default]
    NotStarted,
    InFlight,
    Loaded,
    Failed,
}

/// What a load call ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Load {
    Fetched,
    /// Already loaded or in flight; nothing was sent.
    Skipped,
    /// Invalidated while in flight; the answer was dropped.
    Superseded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resource {
    ReferenceData,
    Tasks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorScope {
    ReferenceData,
    Tasks,
    Employees,
    Comments(u64),
    Mutation,
}

impl From<Resource> for ErrorScope {
    fn from(resource: Resource) -> Self {
        match resource {
            Resource::ReferenceData => ErrorScope::ReferenceData,
            Resource::Tasks => ErrorScope::Tasks,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    state: FetchState,
    epoch: u64,
}

#[derive(Default)]
struct Cache {
    refs: ReferenceData,
    tasks: Vec<Task>,
    comments: HashMap<u64, Vec<Comment>>,
    reference: Slot,
    task_list: Slot,
    /// Task id to the comment epoch its running fetch started under.
    comments_in_flight: HashMap<u64, u64>,
    comment_epochs: HashMap<u64, u64>,
    errors: HashMap<ErrorScope, String>,
}

impl Cache {
    fn slot(&self, resource: Resource) -> &Slot {
        match resource {
            Resource::ReferenceData => &self.reference,
            Resource::Tasks => &self.task_list,
        }
    }

    fn slot_mut(&mut self, resource: Resource) -> &mut Slot {
        match resource {
            Resource::ReferenceData => &mut self.reference,
            Resource::Tasks => &mut self.task_list,
        }
    }

    fn task_mut(&mut self, task_id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == task_id)
    }

    fn fail(&mut self, scope: ErrorScope, err: &ApiError) {
        warn!("{:?} failed: {}", scope, err);
        self.errors.insert(scope, err.to_string());
    }
}

pub struct Store {
    api: Arc<dyn TaskApi>,
    cache: RwLock<Cache>,
    reload: Debouncer,
}

impl Store {
    pub fn new(api: Arc<dyn TaskApi>, reload_debounce: Duration) -> Self {
        Store {
            api,
            cache: RwLock::new(Cache::default()),
            reload: Debouncer::new(reload_debounce),
        }
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.cache.read().tasks.clone()
    }

    pub fn task(&self, task_id: u64) -> Option<Task> {
        self.cache
            .read()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    pub fn reference_data(&self) -> ReferenceData {
        self.cache.read().refs.clone()
    }

    pub fn comments(&self, task_id: u64) -> Option<Vec<Comment>> {
        self.cache.read().comments.get(&task_id).cloned()
    }

    pub fn comments_loading(&self, task_id: u64) -> bool {
        self.cache.read().comments_in_flight.contains_key(&task_id)
    }

    pub fn state(&self, resource: Resource) -> FetchState {
        self.cache.read().slot(resource).state
    }

    pub fn is_loading(&self) -> bool {
        let cache = self.cache.read();
        cache.reference.state == FetchState::InFlight || cache.task_list.state == FetchState::InFlight
    }

    pub fn error(&self, scope: ErrorScope) -> Option<String> {
        self.cache.read().errors.get(&scope).cloned()
    }

    /// Recorded errors, ordered by scope.
    pub fn errors(&self) -> Vec<(ErrorScope, String)> {
        let mut errors: Vec<_> = self
            .cache
            .read()
            .errors
            .iter()
            .map(|(scope, message)| (*scope, message.clone()))
            .collect();
        errors.sort();
        errors
    }

    pub fn clear_error(&self, scope: ErrorScope) {
        self.cache.write().errors.remove(&scope);
    }

    /// Marks a resource stale so the next load fetches it again. A fetch
    /// still in flight will have its answer dropped.
    pub fn invalidate(&self, resource: Resource) {
        let mut cache = self.cache.write();
        let slot = cache.slot_mut(resource);
        slot.state = FetchState::NotStarted;
        slot.epoch += 1;
        debug!("{:?} invalidated (epoch {})", resource, slot.epoch);
    }

    /// Claims a resource for fetching. Returns the epoch to hand back on
    /// completion, or `None` when it is already loaded or in flight.
    fn begin(&self, resource: Resource) -> Option<u64> {
        let mut cache = self.cache.write();
        let slot = cache.slot_mut(resource);
        if matches!(slot.state, FetchState::InFlight | FetchState::Loaded) {
            debug!("{:?} is {:?}, skipping fetch", resource, slot.state);
            return None;
        }
        slot.state = FetchState::InFlight;
        let epoch = slot.epoch;
        cache.errors.remove(&ErrorScope::from(resource));
        Some(epoch)
    }

    /// Departments, employees, priorities and statuses, all or nothing.
    pub async fn load_reference_data(&self) -> Result<Load, StoreError> {
        let Some(epoch) = self.begin(Resource::ReferenceData) else {
            return Ok(Load::Skipped);
        };

        let fetched = tokio::try_join!(
            self.api.departments(),
            self.api.employees(),
            self.api.priorities(),
            self.api.statuses(),
        );

        let mut cache = self.cache.write();
        if cache.reference.epoch != epoch {
            debug!("reference data superseded, dropping answer");
            return Ok(Load::Superseded);
        }

        match fetched {
            Ok((departments, employees, priorities, statuses)) => {
                cache.refs = ReferenceData {
                    departments: departments.into_iter().map(normalize_department).collect(),
                    employees,
                    priorities,
                    statuses: statuses.into_iter().map(normalize_status).collect(),
                };
                cache.reference.state = FetchState::Loaded;
                info!(
                    "reference data loaded: {} departments, {} employees, {} priorities, {} statuses",
                    cache.refs.departments.len(),
                    cache.refs.employees.len(),
                    cache.refs.priorities.len(),
                    cache.refs.statuses.len()
                );
                Ok(Load::Fetched)
            }
            Err(err) => {
                cache.refs = ReferenceData::default();
                cache.reference.state = FetchState::Failed;
                cache.fail(ErrorScope::ReferenceData, &err);
                Err(err.into())
            }
        }
    }

    pub async fn load_tasks(&self) -> Result<Load, StoreError> {
        let Some(epoch) = self.begin(Resource::Tasks) else {
            return Ok(Load::Skipped);
        };

        let fetched = self.api.tasks().await;

        let mut cache = self.cache.write();
        if cache.task_list.epoch != epoch {
            debug!("task list superseded, dropping answer");
            return Ok(Load::Superseded);
        }

        match fetched {
            Ok(tasks) => {
                cache.tasks = tasks.into_iter().map(normalize_task).collect();
                cache.task_list.state = FetchState::Loaded;
                info!("{} tasks loaded", cache.tasks.len());
                Ok(Load::Fetched)
            }
            Err(err) => {
                cache.tasks.clear();
                cache.task_list.state = FetchState::Failed;
                cache.fail(ErrorScope::Tasks, &err);
                Err(err.into())
            }
        }
    }

    /// Schedules a task list reload. Calls arriving within the debounce
    /// window collapse into one fetch. The handle resolves to whether this
    /// call was the one that fetched.
    pub fn invalidate_and_reload_tasks(self: &Arc<Self>) -> JoinHandle<bool> {
        debug!("task reload requested");
        let store = Arc::clone(self);
        self.reload.call(move || async move {
            store.invalidate(Resource::Tasks);
            if let Err(err) = store.load_tasks().await {
                debug!("debounced task reload failed: {}", err);
            }
        })
    }

    /// Posts a new task, then reloads the list so server-assigned fields
    /// show up. Returns the new task's id.
    pub async fn create_task(&self, task: NewTask) -> Result<u64, StoreError> {
        self.check_task_refs(&task)?;

        self.clear_error(ErrorScope::Mutation);
        let id = self
            .api
            .create_task(&task)
            .await
            .map_err(|err| self.mutation_failed(err))?;
        info!("task {} created", id);

        // The task exists now; a failed reload is recorded under Tasks.
        self.invalidate(Resource::Tasks);
        if let Err(err) = self.load_tasks().await {
            warn!("reload after creating task {} failed: {}", id, err);
        }
        Ok(id)
    }

    /// Moves a task to another status and patches only that task.
    pub async fn set_task_status(
        &self,
        task_id: u64,
        status_id: u64,
        status_name: &str,
    ) -> Result<(), StoreError> {
        let known = self.cache.read().refs.status(status_id).is_some();
        if !known {
            return Err(FieldError::new("status", format!("unknown status id {}", status_id)).into());
        }

        self.clear_error(ErrorScope::Mutation);
        self.api
            .update_task_status(task_id, status_id)
            .await
            .map_err(|err| self.mutation_failed(err))?;

        let mut cache = self.cache.write();
        if let Some(task) = cache.task_mut(task_id) {
            task.status = Status {
                id: status_id,
                name: status_name.to_string(),
            };
        }
        info!(
            "task {} moved to status {} ({})",
            task_id,
            status_id,
            status_to_canonical(status_name)
        );
        Ok(())
    }

    /// Local patch only; the next comment fetch reconciles it.
    pub fn set_comment_count(&self, task_id: u64, count: usize) {
        if let Some(task) = self.cache.write().task_mut(task_id) {
            task.comment_count = count;
        }
    }

    /// Fetches one task's comment tree. A second call for the same task
    /// while the first is outstanding is dropped.
    pub async fn load_comments_for_task(&self, task_id: u64) -> Result<Load, StoreError> {
        let epoch = {
            let mut cache = self.cache.write();
            if cache.comments_in_flight.contains_key(&task_id) {
                debug!("comments for task {} already loading, skipping", task_id);
                return Ok(Load::Skipped);
            }
            let epoch = cache.comment_epochs.get(&task_id).copied().unwrap_or(0);
            cache.comments_in_flight.insert(task_id, epoch);
            cache.errors.remove(&ErrorScope::Comments(task_id));
            epoch
        };

        let fetched = self.api.comments(task_id).await;

        let mut cache = self.cache.write();
        if cache.comment_epochs.get(&task_id).copied().unwrap_or(0) != epoch {
            debug!("comments for task {} superseded, dropping answer", task_id);
            return Ok(Load::Superseded);
        }
        cache.comments_in_flight.remove(&task_id);
        match fetched {
            Ok(comments) => {
                let total = comment_total(&comments);
                if let Some(task) = cache.task_mut(task_id) {
                    task.comment_count = total;
                }
                debug!("{} comments loaded for task {}", total, task_id);
                cache.comments.insert(task_id, comments);
                Ok(Load::Fetched)
            }
            Err(err) => {
                cache.fail(ErrorScope::Comments(task_id), &err);
                Err(err.into())
            }
        }
    }

    /// Drops any running comment fetch for the task so the next load sees
    /// the server's current tree.
    fn invalidate_comments(&self, task_id: u64) {
        let mut cache = self.cache.write();
        *cache.comment_epochs.entry(task_id).or_insert(0) += 1;
        cache.comments_in_flight.remove(&task_id);
    }

    /// Posts a comment, or a reply when `parent_id` is set, then refetches
    /// the task's comments.
    pub async fn post_comment(
        &self,
        task_id: u64,
        text: &str,
        parent_id: Option<u64>,
    ) -> Result<u64, StoreError> {
        validation::comment_text(text)?;

        let comment = NewComment {
            text: text.trim().to_string(),
            task_id,
            parent_id,
        };
        self.clear_error(ErrorScope::Mutation);
        let id = self
            .api
            .create_comment(task_id, &comment)
            .await
            .map_err(|err| self.mutation_failed(err))?;

        let count = self.task(task_id).map_or(0, |t| t.comment_count);
        self.set_comment_count(task_id, count + 1);
        self.invalidate_comments(task_id);

        if let Err(err) = self.load_comments_for_task(task_id).await {
            warn!("refetching comments for task {} failed: {}", task_id, err);
        }
        Ok(id)
    }

    /// Re-fetches employees only, leaving the reference data state alone.
    pub async fn refresh_employees(&self) -> Result<(), StoreError> {
        self.clear_error(ErrorScope::Employees);
        match self.api.employees().await {
            Ok(employees) => {
                info!("{} employees refreshed", employees.len());
                self.cache.write().refs.employees = employees;
                Ok(())
            }
            Err(err) => {
                self.cache.write().fail(ErrorScope::Employees, &err);
                Err(err.into())
            }
        }
    }

    pub async fn create_employee(&self, employee: NewEmployee) -> Result<u64, StoreError> {
        validation::person_name("name", &employee.name)?;
        validation::person_name("surname", &employee.surname)?;

        let department = self
            .cache
            .read()
            .refs
            .department(employee.department_id)
            .map(|d| department_to_canonical(&d.name));
        let Some(department) = department else {
            return Err(FieldError::new("department", "choose a department").into());
        };

        if let Some(path) = &employee.avatar {
            let size = tokio::fs::metadata(path)
                .await
                .map_err(|e| FieldError::new("avatar", format!("cannot read file: {}", e)))?
                .len();
            validation::avatar(path, size)?;
        }

        self.clear_error(ErrorScope::Mutation);
        let id = self
            .api
            .create_employee(&employee)
            .await
            .map_err(|err| self.mutation_failed(err))?;
        info!("employee {} created in {}", id, department);

        if let Err(err) = self.refresh_employees().await {
            warn!("refreshing employees after creating {} failed: {}", id, err);
        }
        Ok(id)
    }

    fn check_task_refs(&self, task: &NewTask) -> Result<(), FieldError> {
        let cache = self.cache.read();
        let refs = &cache.refs;

        if refs.status(task.status_id).is_none() {
            return Err(FieldError::new("status", "choose a status"));
        }
        if refs.priority(task.priority_id).is_none() {
            return Err(FieldError::new("priority", "choose a priority"));
        }
        if refs.department(task.department_id).is_none() {
            return Err(FieldError::new("department", "choose a department"));
        }
        match refs.employee(task.employee_id) {
            None => Err(FieldError::new("employee", "choose an employee")),
            Some(e) if e.department_id.is_some_and(|d| d != task.department_id) => Err(
                FieldError::new("employee", "employee is not in the chosen department"),
            ),
            Some(_) => Ok(()),
        }
    }

    fn mutation_failed(&self, err: ApiError) -> StoreError {
        self.cache.write().fail(ErrorScope::Mutation, &err);
        err.into()
    }
}

fn normalize_status(status: Status) -> Status {
    Status {
        name: status_to_display(&status.name),
        ..status
    }
}

fn normalize_department(department: Department) -> Department {
    Department {
        name: department_to_display(&department.name),
        ..department
    }
}

fn normalize_task(task: Task) -> Task {
    Task {
        status: normalize_status(task.status),
        department: normalize_department(task.department),
        ..task
    }
}
