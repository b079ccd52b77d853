use std::future::Future;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::widgets::ListState;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::error::{FieldError, StoreError};
use crate::filter::{board, Column, TaskFilter};
use crate::form::{cycle_id, EmployeeForm, TaskForm};
use crate::models::{Comment, Task};
use crate::store::{FetchState, Resource, Store};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Board,
    Detail,
    Comment,
    TaskForm,
    EmployeeForm,
    Filter,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterSection {
    Departments,
    Priorities,
    Employees,
}

impl FilterSection {
    fn next(self) -> FilterSection {
        match self {
            FilterSection::Departments => FilterSection::Priorities,
            FilterSection::Priorities => FilterSection::Employees,
            FilterSection::Employees => FilterSection::Departments,
        }
    }
}

/// What a background mutation reported back to the UI loop.
#[derive(Debug)]
pub enum Outcome {
    StatusChanged {
        status: String,
        result: Result<(), StoreError>,
    },
    CommentPosted(Result<u64, StoreError>),
    TaskCreated(Result<u64, StoreError>),
    EmployeeCreated(Result<u64, StoreError>),
}

/// A comment as shown in the detail view, replies flattened under their parent.
#[derive(Clone, Debug)]
pub struct CommentRow {
    pub comment: Comment,
    pub is_reply: bool,
    /// Top-level comment a reply to this row would attach to.
    pub thread_id: u64,
}

pub struct App {
    pub store: Arc<Store>,
    pub input_mode: InputMode,
    pub column: usize,
    pub state: ListState,
    pub filter: TaskFilter,
    pub filter_section: FilterSection,
    pub filter_state: ListState,
    pub detail: Option<u64>,
    pub comment_state: ListState,
    pub comment_input: String,
    pub reply_to: Option<u64>,
    pub task_form: Option<TaskForm>,
    pub employee_form: Option<EmployeeForm>,
    /// Whether the employee form was opened from the task form.
    employee_from_task: bool,
    pub message: Option<String>,
    /// Mutations sent but not answered yet.
    pub pending: usize,
    /// A form or comment submit is outstanding; further submits are ignored.
    pub submitting: bool,
    outcomes_tx: UnboundedSender<Outcome>,
    outcomes: UnboundedReceiver<Outcome>,
}

impl App {
    pub fn new(store: Arc<Store>) -> App {
        let mut state = ListState::default();
        state.select(Some(0));
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        App {
            store,
            input_mode: InputMode::Board,
            column: 0,
            state,
            filter: TaskFilter::default(),
            filter_section: FilterSection::Departments,
            filter_state: ListState::default(),
            detail: None,
            comment_state: ListState::default(),
            comment_input: String::new(),
            reply_to: None,
            task_form: None,
            employee_form: None,
            employee_from_task: false,
            message: None,
            pending: 0,
            submitting: false,
            outcomes_tx,
            outcomes,
        }
    }

    pub fn columns(&self) -> Vec<Column> {
        let refs = self.store.reference_data();
        board(&refs.statuses, &self.store.tasks(), &self.filter)
    }

    pub fn selected_task(&self) -> Option<Task> {
        let columns = self.columns();
        let column = columns.get(self.column)?;
        column.tasks.get(self.state.selected()?).cloned()
    }

    pub fn detail_task(&self) -> Option<Task> {
        self.store.task(self.detail?)
    }

    pub fn comment_rows(&self) -> Vec<CommentRow> {
        let Some(task_id) = self.detail else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        for top in self.store.comments(task_id).unwrap_or_default() {
            let thread_id = top.id;
            let replies = top.sub_comments.clone();
            rows.push(CommentRow {
                comment: top,
                is_reply: false,
                thread_id,
            });
            rows.extend(replies.into_iter().map(|reply| CommentRow {
                comment: reply,
                is_reply: true,
                thread_id,
            }));
        }
        rows
    }

    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    pub fn next(&mut self) {
        let len = self.column_len();
        let i = match self.state.selected() {
            Some(i) if len > 0 && i < len - 1 => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.column_len();
        let i = match self.state.selected() {
            Some(i) if i > 0 => i - 1,
            _ => len.saturating_sub(1),
        };
        self.state.select(Some(i));
    }

    pub fn next_column(&mut self) {
        let count = self.columns().len();
        if count > 0 {
            self.column = (self.column + 1) % count;
        }
        self.clamp_row();
    }

    pub fn previous_column(&mut self) {
        let count = self.columns().len();
        if count > 0 {
            self.column = (self.column + count - 1) % count;
        }
        self.clamp_row();
    }

    fn column_len(&self) -> usize {
        self.columns()
            .get(self.column)
            .map_or(0, |c| c.tasks.len())
    }

    fn clamp_row(&mut self) {
        // The unknown-status column comes and goes with its tasks.
        let count = self.columns().len();
        if self.column >= count {
            self.column = count.saturating_sub(1);
        }
        let len = self.column_len();
        let row = self.state.selected().unwrap_or(0).min(len.saturating_sub(1));
        self.state.select(Some(row));
    }

    /// Loads whatever has not been loaded yet. Failures land in the store's
    /// error state and show up in the status line.
    pub fn spawn_initial_loads(&self) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            let (refs, tasks) = tokio::join!(store.load_reference_data(), store.load_tasks());
            if let Err(err) = refs {
                debug!("reference data load failed: {}", err);
            }
            if let Err(err) = tasks {
                debug!("task load failed: {}", err);
            }
        });
    }

    pub fn refresh(&mut self) {
        if self.store.state(Resource::ReferenceData) == FetchState::Failed {
            self.spawn_initial_loads();
        }
        let _ = self.store.invalidate_and_reload_tasks();
        self.message = Some("Refreshing tasks…".to_string());
    }

    fn open_detail(&mut self) {
        let Some(task) = self.selected_task() else {
            return;
        };
        self.detail = Some(task.id);
        self.comment_state.select(None);
        self.input_mode = InputMode::Detail;
        self.spawn_comment_load(task.id);
    }

    fn spawn_comment_load(&self, task_id: u64) {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            if let Err(err) = store.load_comments_for_task(task_id).await {
                debug!("comment load for task {} failed: {}", task_id, err);
            }
        });
    }

    fn change_status(&mut self, forward: bool) {
        let Some(task) = self.detail_task() else {
            return;
        };
        let refs = self.store.reference_data();
        let ids: Vec<u64> = refs.statuses.iter().map(|s| s.id).collect();
        let Some(status) = cycle_id(&ids, Some(task.status.id), forward).and_then(|id| refs.status(id))
        else {
            return;
        };

        let (status_id, name) = (status.id, status.name.clone());
        let store = Arc::clone(&self.store);
        self.spawn_mutation(async move {
            let result = store.set_task_status(task.id, status_id, &name).await;
            Outcome::StatusChanged {
                status: name,
                result,
            }
        });
    }

    /// Runs a mutation off the input loop; its outcome is picked up by
    /// `drain_outcomes`.
    fn spawn_mutation<F>(&mut self, mutation: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        self.pending += 1;
        let tx = self.outcomes_tx.clone();
        tokio::spawn(async move {
            if tx.send(mutation.await).is_err() {
                debug!("app gone, dropping mutation outcome");
            }
        });
    }

    /// Applies every outcome that arrived since the last tick.
    pub fn drain_outcomes(&mut self) {
        while let Ok(outcome) = self.outcomes.try_recv() {
            self.apply(outcome);
        }
    }

    pub fn apply(&mut self, outcome: Outcome) {
        self.pending = self.pending.saturating_sub(1);
        match outcome {
            Outcome::StatusChanged { status, result } => {
                self.message = Some(match result {
                    Ok(()) => format!("Moved to {}", status),
                    Err(err) if err.field().is_some() => {
                        format!("Status change rejected: {}", err)
                    }
                    Err(err) => format!("Status change failed: {}", err),
                });
                self.clamp_row();
            }
            Outcome::CommentPosted(result) => {
                self.submitting = false;
                match result {
                    Ok(_) => {
                        if self.input_mode == InputMode::Comment {
                            self.comment_input.clear();
                            self.reply_to = None;
                            self.input_mode = InputMode::Detail;
                        }
                        self.message = Some("Comment posted".to_string());
                    }
                    Err(err) => self.message = Some(format!("Comment failed: {}", err)),
                }
            }
            Outcome::TaskCreated(result) => {
                self.submitting = false;
                match result {
                    Ok(id) => {
                        self.task_form = None;
                        if self.input_mode == InputMode::TaskForm {
                            self.input_mode = InputMode::Board;
                        }
                        self.message = Some(format!("Task {} created", id));
                    }
                    Err(err) => {
                        if let Some(form) = self.task_form.as_mut() {
                            form.error = Some(form_error(err, "name"));
                        }
                    }
                }
            }
            Outcome::EmployeeCreated(result) => {
                self.submitting = false;
                match result {
                    Ok(id) => {
                        self.message = Some(format!("Employee {} added", id));
                        if self.employee_form.is_some() {
                            self.close_employee_form();
                        }
                    }
                    Err(err) => {
                        if let Some(form) = self.employee_form.as_mut() {
                            form.error = Some(form_error(err, "name"));
                        }
                    }
                }
            }
        }
    }

    fn next_comment(&mut self, forward: bool) {
        let len = self.comment_rows().len();
        if len == 0 {
            self.comment_state.select(None);
            return;
        }
        let i = match (self.comment_state.selected(), forward) {
            (Some(i), true) => (i + 1) % len,
            (Some(i), false) => (i + len - 1) % len,
            (None, true) => 0,
            (None, false) => len - 1,
        };
        self.comment_state.select(Some(i));
    }

    fn start_comment(&mut self, reply: bool) {
        self.reply_to = if reply {
            let rows = self.comment_rows();
            match self.comment_state.selected().and_then(|i| rows.get(i)) {
                Some(row) => Some(row.thread_id),
                None => {
                    self.message = Some("Select a comment to reply to".to_string());
                    return;
                }
            }
        } else {
            None
        };
        self.comment_input.clear();
        self.input_mode = InputMode::Comment;
    }

    fn submit_comment(&mut self) {
        let Some(task_id) = self.detail else {
            return;
        };
        if self.submitting {
            return;
        }
        self.submitting = true;
        let store = Arc::clone(&self.store);
        let (text, parent_id) = (self.comment_input.clone(), self.reply_to);
        self.spawn_mutation(async move {
            Outcome::CommentPosted(store.post_comment(task_id, &text, parent_id).await)
        });
    }

    fn open_task_form(&mut self) {
        let refs = self.store.reference_data();
        if refs.statuses.is_empty() {
            self.message = Some("Reference data is not loaded yet".to_string());
            return;
        }
        self.task_form = Some(TaskForm::new(&refs, App::today()));
        self.input_mode = InputMode::TaskForm;
    }

    fn submit_task_form(&mut self) {
        if self.submitting {
            return;
        }
        let refs = self.store.reference_data();
        let Some(form) = self.task_form.as_mut() else {
            return;
        };
        let payload = match form.build(&refs, App::today()) {
            Ok(payload) => payload,
            Err(err) => {
                form.error = Some(err);
                return;
            }
        };

        form.error = None;
        self.submitting = true;
        let store = Arc::clone(&self.store);
        self.spawn_mutation(async move {
            Outcome::TaskCreated(store.create_task(payload).await)
        });
    }

    fn open_employee_form(&mut self, from_task: bool) {
        let department = if from_task {
            self.task_form.as_ref().and_then(|f| f.department_id)
        } else {
            None
        };
        self.employee_form = Some(EmployeeForm::for_department(department));
        self.employee_from_task = from_task;
        self.input_mode = InputMode::EmployeeForm;
    }

    fn close_employee_form(&mut self) {
        self.employee_form = None;
        self.input_mode = if self.employee_from_task {
            InputMode::TaskForm
        } else {
            InputMode::Board
        };
        self.employee_from_task = false;
    }

    fn submit_employee_form(&mut self) {
        if self.submitting {
            return;
        }
        let Some(form) = self.employee_form.as_mut() else {
            return;
        };
        let payload = match form.build() {
            Ok(payload) => payload,
            Err(err) => {
                form.error = Some(err);
                return;
            }
        };

        form.error = None;
        self.submitting = true;
        let store = Arc::clone(&self.store);
        self.spawn_mutation(async move {
            Outcome::EmployeeCreated(store.create_employee(payload).await)
        });
    }

    /// Ids listed in the current filter section, in display order.
    pub fn filter_options(&self) -> Vec<u64> {
        let refs = self.store.reference_data();
        match self.filter_section {
            FilterSection::Departments => refs.departments.iter().map(|d| d.id).collect(),
            FilterSection::Priorities => refs.priorities.iter().map(|p| p.id).collect(),
            FilterSection::Employees => refs.employees.iter().map(|e| e.id).collect(),
        }
    }

    fn toggle_filter_option(&mut self) {
        let options = self.filter_options();
        let Some(id) = self.filter_state.selected().and_then(|i| options.get(i)).copied() else {
            return;
        };
        match self.filter_section {
            FilterSection::Departments => self.filter.toggle_department(id),
            FilterSection::Priorities => self.filter.toggle_priority(id),
            FilterSection::Employees => self.filter.toggle_employee(id),
        }
        self.clamp_row();
    }

    fn move_filter_cursor(&mut self, forward: bool) {
        let len = self.filter_options().len();
        if len == 0 {
            self.filter_state.select(None);
            return;
        }
        let i = match self.filter_state.selected() {
            Some(i) if forward => (i + 1) % len,
            Some(i) => (i + len - 1) % len,
            None => 0,
        };
        self.filter_state.select(Some(i));
    }

    /// Returns `true` when the application should quit.
    pub fn handle_input(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return true;
        }

        match self.input_mode {
            InputMode::Board => match key.code {
                KeyCode::Char('q') => return true,
                KeyCode::Char('j') | KeyCode::Down => self.next(),
                KeyCode::Char('k') | KeyCode::Up => self.previous(),
                KeyCode::Char('l') | KeyCode::Right => self.next_column(),
                KeyCode::Char('h') | KeyCode::Left => self.previous_column(),
                KeyCode::Char('r') => self.refresh(),
                KeyCode::Char('a') => self.open_task_form(),
                KeyCode::Char('e') => self.open_employee_form(false),
                KeyCode::Char('f') => {
                    self.filter_state.select(Some(0));
                    self.input_mode = InputMode::Filter;
                }
                KeyCode::Enter => self.open_detail(),
                _ => {}
            },

            InputMode::Detail => match key.code {
                KeyCode::Char('q') | KeyCode::Esc => {
                    self.detail = None;
                    self.input_mode = InputMode::Board;
                    self.clamp_row();
                }
                KeyCode::Char('s') => self.change_status(true),
                KeyCode::Char('S') => self.change_status(false),
                KeyCode::Char('j') | KeyCode::Down => self.next_comment(true),
                KeyCode::Char('k') | KeyCode::Up => self.next_comment(false),
                KeyCode::Char('c') => self.start_comment(false),
                KeyCode::Char('R') => self.start_comment(true),
                KeyCode::Char('r') => {
                    if let Some(task_id) = self.detail {
                        self.spawn_comment_load(task_id);
                    }
                }
                _ => {}
            },

            InputMode::Comment => match key.code {
                KeyCode::Enter => self.submit_comment(),
                KeyCode::Esc => {
                    self.comment_input.clear();
                    self.reply_to = None;
                    self.input_mode = InputMode::Detail;
                }
                KeyCode::Backspace => {
                    self.comment_input.pop();
                }
                KeyCode::Char(c) => self.comment_input.push(c),
                _ => {}
            },

            InputMode::TaskForm => {
                let refs = self.store.reference_data();
                match key.code {
                    KeyCode::Esc => {
                        self.task_form = None;
                        self.input_mode = InputMode::Board;
                    }
                    KeyCode::Enter => self.submit_task_form(),
                    KeyCode::Char('n') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                        self.open_employee_form(true)
                    }
                    code => {
                        if let Some(form) = self.task_form.as_mut() {
                            match code {
                                KeyCode::Tab | KeyCode::Down => form.focus_next(),
                                KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
                                KeyCode::Left => form.cycle(&refs, false),
                                KeyCode::Right => form.cycle(&refs, true),
                                KeyCode::Backspace => form.pop(),
                                KeyCode::Char(c) => form.push(c),
                                _ => {}
                            }
                        }
                    }
                }
            }

            InputMode::EmployeeForm => {
                let refs = self.store.reference_data();
                match key.code {
                    KeyCode::Esc => self.close_employee_form(),
                    KeyCode::Enter => self.submit_employee_form(),
                    code => {
                        if let Some(form) = self.employee_form.as_mut() {
                            match code {
                                KeyCode::Tab | KeyCode::Down => form.focus_next(),
                                KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
                                KeyCode::Left => form.cycle(&refs, false),
                                KeyCode::Right => form.cycle(&refs, true),
                                KeyCode::Backspace => form.pop(),
                                KeyCode::Char(c) => form.push(c),
                                _ => {}
                            }
                        }
                    }
                }
            }

            InputMode::Filter => match key.code {
                KeyCode::Esc | KeyCode::Enter | KeyCode::Char('f') => {
                    self.input_mode = InputMode::Board;
                    self.clamp_row();
                }
                KeyCode::Tab => {
                    self.filter_section = self.filter_section.next();
                    self.filter_state.select(Some(0));
                }
                KeyCode::Char('j') | KeyCode::Down => self.move_filter_cursor(true),
                KeyCode::Char('k') | KeyCode::Up => self.move_filter_cursor(false),
                KeyCode::Char(' ') => self.toggle_filter_option(),
                KeyCode::Char('c') => {
                    self.filter.clear();
                    self.clamp_row();
                }
                _ => {}
            },
        }
        false
    }
}

/// Server failures are pinned to `fallback` so the form can show them.
/// Server failures are pinned to `fallback` so the form can show them.
fn form_error(err: StoreError, fallback: &'static str) -> FieldError {
    let field = err.field().unwrap_or(fallback);
    match err {
        StoreError::Validation(err) => err,
        err => FieldError::new(field, err.to_string()),
    }
}
