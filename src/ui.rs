use crate::app::{App, FilterSection, InputMode};
use crate::form::{EmployeeField, EmployeeForm, TaskField, TaskForm};
use crate::models::{PriorityLevel, ReferenceData, Task};
use crate::parser::format_due_date;
use crate::store::{ErrorScope, FetchState, Resource};
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn key_span(key: &'static str) -> Span<'static> {
    Span::styled(key, Style::default().fg(Color::Red))
}

fn get_legend(input_mode: &InputMode) -> Text<'static> {
    let spans = match input_mode {
        InputMode::Board => vec![
            key_span(" q "),
            Span::raw(": Quit "),
            key_span(" h/l "),
            Span::raw(": Column "),
            key_span(" j/k "),
            Span::raw(": Task "),
            key_span(" Enter "),
            Span::raw(": Open "),
            key_span(" a "),
            Span::raw(": Add Task "),
            key_span(" e "),
            Span::raw(": Add Employee "),
            key_span(" f "),
            Span::raw(": Filter "),
            key_span(" r "),
            Span::raw(": Refresh "),
        ],
        InputMode::Detail => vec![
            key_span(" Esc "),
            Span::raw(": Back "),
            key_span(" s/S "),
            Span::raw(": Next/Previous Status "),
            key_span(" j/k "),
            Span::raw(": Select Comment "),
            key_span(" c "),
            Span::raw(": Comment "),
            key_span(" R "),
            Span::raw(": Reply "),
            key_span(" r "),
            Span::raw(": Reload Comments "),
        ],
        InputMode::Comment => vec![
            key_span(" Enter "),
            Span::raw(": Submit "),
            key_span(" Esc "),
            Span::raw(": Cancel "),
        ],
        InputMode::TaskForm => vec![
            key_span(" Tab "),
            Span::raw(": Next Field "),
            key_span(" ←/→ "),
            Span::raw(": Choose "),
            key_span(" Ctrl-n "),
            Span::raw(": New Employee "),
            key_span(" Enter "),
            Span::raw(": Create "),
            key_span(" Esc "),
            Span::raw(": Cancel "),
        ],
        InputMode::EmployeeForm => vec![
            key_span(" Tab "),
            Span::raw(": Next Field "),
            key_span(" ←/→ "),
            Span::raw(": Choose "),
            key_span(" Enter "),
            Span::raw(": Add "),
            key_span(" Esc "),
            Span::raw(": Cancel "),
        ],
        InputMode::Filter => vec![
            key_span(" Tab "),
            Span::raw(": Section "),
            key_span(" Space "),
            Span::raw(": Toggle "),
            key_span(" c "),
            Span::raw(": Clear "),
            key_span(" Esc "),
            Span::raw(": Close "),
        ],
    };
    Text::from(Line::from(spans))
}

fn priority_color(level: PriorityLevel) -> Color {
    match level {
        PriorityLevel::Low => Color::Green,
        PriorityLevel::Medium => Color::Yellow,
        PriorityLevel::High => Color::Red,
    }
}

fn bold(text: &'static str) -> Span<'static> {
    Span::styled(text, Style::default().add_modifier(Modifier::BOLD))
}

fn due_text(task: &Task) -> String {
    task.due_date
        .as_ref()
        .map(format_due_date)
        .unwrap_or_else(|| "No due date".to_string())
}

fn task_card(task: &Task) -> ListItem<'static> {
    let color = priority_color(task.priority.level());
    ListItem::new(Text::from(vec![
        Line::from(vec![
            Span::styled(format!("● {}", task.priority.name), Style::default().fg(color)),
            Span::raw(format!("  {}", task.department.name)),
        ]),
        Line::from(Span::styled(
            task.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format!(
                "{} · {} · 💬 {}",
                task.employee.full_name(),
                due_text(task),
                task.comment_count
            ),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ]))
}

fn draw_board(f: &mut Frame, app: &mut App, area: Rect) {
    let columns = app.columns();
    if columns.is_empty() {
        let message = match app.store.state(Resource::ReferenceData) {
            FetchState::Failed => "Could not load statuses. Press r to retry.",
            _ => "Loading…",
        };
        let paragraph = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title("Tasks"))
            .alignment(Alignment::Center);
        f.render_widget(paragraph, area);
        return;
    }

    let placeholder = match app.store.state(Resource::Tasks) {
        FetchState::NotStarted | FetchState::InFlight => "Loading…",
        FetchState::Failed => "Could not load tasks",
        FetchState::Loaded => "No tasks",
    };
    let title_suffix = if app.filter.is_empty() { "" } else { " [filtered]" };

    let constraints: Vec<Constraint> = columns
        .iter()
        .map(|_| Constraint::Ratio(1, columns.len() as u32))
        .collect();
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (i, column) in columns.iter().enumerate() {
        let selected = i == app.column;
        let title = format!(
            "{} ({}){}",
            column.status.name,
            column.tasks.len(),
            title_suffix
        );
        let border_style = if selected {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(border_style)
            .title(title);

        if column.tasks.is_empty() {
            let paragraph = Paragraph::new(placeholder)
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            f.render_widget(paragraph, chunks[i]);
            continue;
        }

        let items: Vec<ListItem> = column.tasks.iter().map(task_card).collect();
        let list = List::new(items).block(block);
        if selected {
            let list = list
                .highlight_style(
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol(">> ");
            f.render_stateful_widget(list, chunks[i], &mut app.state);
        } else {
            f.render_widget(list, chunks[i]);
        }
    }
}

fn draw_detail(f: &mut Frame, app: &mut App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)].as_ref())
        .split(area);

    let detail_block = Block::default().borders(Borders::ALL).title("Task Details");
    let Some(task) = app.detail_task() else {
        let paragraph = Paragraph::new("This task is no longer on the board")
            .block(detail_block)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, chunks[0]);
        return;
    };

    let color = priority_color(task.priority.level());
    let lines = vec![
        Line::from(Span::styled(
            task.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![bold("Status: "), Span::raw(task.status.name.clone())]),
        Line::from(vec![
            bold("Priority: "),
            Span::styled(task.priority.name.clone(), Style::default().fg(color)),
            Span::styled(
                format!("  {}", task.priority.icon_or_fallback()),
                Style::default().fg(Color::DarkGray),
            ),
        ]),
        Line::from(vec![bold("Department: "), Span::raw(task.department.name.clone())]),
        Line::from(vec![bold("Employee: "), Span::raw(task.employee.full_name())]),
        Line::from(vec![bold("Due Date: "), Span::raw(due_text(&task))]),
        Line::from(""),
        Line::from(bold("Description:")),
        Line::from(Span::raw(
            task.description
                .clone()
                .unwrap_or_else(|| "No description".to_string()),
        )),
    ];
    let paragraph = Paragraph::new(lines)
        .block(detail_block)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, chunks[0]);

    let comments_block = Block::default()
        .borders(Borders::ALL)
        .title(format!("Comments ({})", task.comment_count));
    let rows = app.comment_rows();
    if rows.is_empty() {
        let (message, style) = if let Some(err) = app.store.error(ErrorScope::Comments(task.id)) {
            (err, Style::default().fg(Color::Red))
        } else if app.store.comments_loading(task.id) {
            ("Loading comments…".to_string(), Style::default())
        } else {
            ("No comments yet".to_string(), Style::default().fg(Color::DarkGray))
        };
        let paragraph = Paragraph::new(message)
            .style(style)
            .block(comments_block)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, chunks[1]);
        return;
    }

    let items: Vec<ListItem> = rows
        .iter()
        .map(|row| {
            let indent = if row.is_reply { "    ↳ " } else { "" };
            ListItem::new(Text::from(vec![
                Line::from(vec![
                    Span::raw(indent),
                    Span::styled(
                        row.comment.author_nickname.clone(),
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    ),
                ]),
                Line::from(vec![
                    Span::raw(if row.is_reply { "      " } else { "" }),
                    Span::raw(row.comment.text.clone()),
                ]),
            ]))
        })
        .collect();
    let list = List::new(items)
        .block(comments_block)
        .highlight_style(
            Style::default()
                .fg(Color::Green)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol(">> ");
    f.render_stateful_widget(list, chunks[1], &mut app.comment_state);
}

fn draw_comment_input(f: &mut Frame, app: &App, area: Rect) {
    let popup_width = (area.width * 60 / 100).saturating_sub(2).max(10);
    let lines_required = calculate_wrapped_lines(&app.comment_input, popup_width);
    let popup_height = (lines_required.max(1) as u16 + 2).min(area.height.saturating_sub(2));
    let popup_area = centered_rect_absolute(popup_width + 2, popup_height, area);

    let title = match app.reply_to {
        Some(id) => format!("Reply to #{} (Enter to post)", id),
        None => "New Comment (Enter to post)".to_string(),
    };
    let input = Paragraph::new(app.comment_input.as_str())
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Green)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, popup_area);
    f.render_widget(input, popup_area);
}

/// One line per field; the focused one is highlighted and its error, if
/// any, goes on the line below.
fn form_lines(
    fields: Vec<(&'static str, &'static str, String, bool)>,
    focused: &'static str,
    error: Option<&crate::error::FieldError>,
) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for (key, label, value, choice) in fields {
        let is_focused = key == focused;
        let marker = if is_focused { "> " } else { "  " };
        let value = if choice {
            format!("‹ {} ›", value)
        } else if is_focused {
            format!("{}_", value)
        } else {
            value
        };
        let style = if is_focused {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("{}{:<12}", marker, label), style.add_modifier(Modifier::BOLD)),
            Span::styled(value, style),
        ]));
        if let Some(err) = error.filter(|e| e.field == key) {
            lines.push(Line::from(Span::styled(
                format!("  {}", err.message),
                Style::default().fg(Color::Red),
            )));
        }
    }
    lines
}

fn choice(name: Option<String>) -> String {
    name.unwrap_or_else(|| "choose".to_string())
}

fn task_form_fields(
    form: &TaskForm,
    refs: &ReferenceData,
) -> Vec<(&'static str, &'static str, String, bool)> {
    TaskField::all()
        .iter()
        .map(|field| {
            let (value, is_choice) = match field {
                TaskField::Name => (form.name.clone(), false),
                TaskField::Description => (form.description.clone(), false),
                TaskField::DueDate => (form.due_date.clone(), false),
                TaskField::Status => (
                    choice(form.status_id.and_then(|id| refs.status(id)).map(|s| s.name.clone())),
                    true,
                ),
                TaskField::Priority => (
                    choice(
                        form.priority_id
                            .and_then(|id| refs.priority(id))
                            .map(|p| p.name.clone()),
                    ),
                    true,
                ),
                TaskField::Department => (
                    choice(
                        form.department_id
                            .and_then(|id| refs.department(id))
                            .map(|d| d.name.clone()),
                    ),
                    true,
                ),
                TaskField::Employee => (
                    if form.department_id.is_none() {
                        "pick a department first".to_string()
                    } else {
                        choice(
                            form.employee_id
                                .and_then(|id| refs.employee(id))
                                .map(|e| e.full_name()),
                        )
                    },
                    true,
                ),
            };
            (field.key(), field.label(), value, is_choice)
        })
        .collect()
}

fn employee_form_fields(
    form: &EmployeeForm,
    refs: &ReferenceData,
) -> Vec<(&'static str, &'static str, String, bool)> {
    EmployeeField::all()
        .iter()
        .map(|field| {
            let (value, is_choice) = match field {
                EmployeeField::Name => (form.name.clone(), false),
                EmployeeField::Surname => (form.surname.clone(), false),
                EmployeeField::Department => (
                    choice(
                        form.department_id
                            .and_then(|id| refs.department(id))
                            .map(|d| d.name.clone()),
                    ),
                    true,
                ),
                EmployeeField::Avatar => (form.avatar.clone(), false),
            };
            (field.key(), field.label(), value, is_choice)
        })
        .collect()
}

fn draw_form(f: &mut Frame, title: &'static str, lines: Vec<Line<'static>>, area: Rect) {
    let width = (area.width * 70 / 100).max(40).min(area.width);
    let height = (lines.len() as u16 + 2).min(area.height);
    let popup_area = centered_rect_absolute(width, height, area);

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Green)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(Clear, popup_area);
    f.render_widget(paragraph, popup_area);
}

fn draw_filter(f: &mut Frame, app: &mut App, area: Rect) {
    let refs = app.store.reference_data();
    let width = (area.width * 80 / 100).max(30).min(area.width);
    let height = area.height.min(14);
    let popup_area = centered_rect_absolute(width, height, area);
    f.render_widget(Clear, popup_area);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
                Constraint::Ratio(1, 3),
            ]
            .as_ref(),
        )
        .split(popup_area);

    let mark = |on: bool| if on { "[x] " } else { "[ ] " };
    let sections: [(FilterSection, &str, Vec<String>); 3] = [
        (
            FilterSection::Departments,
            "Departments",
            refs.departments
                .iter()
                .map(|d| format!("{}{}", mark(app.filter.departments.contains(&d.id)), d.name))
                .collect(),
        ),
        (
            FilterSection::Priorities,
            "Priorities",
            refs.priorities
                .iter()
                .map(|p| format!("{}{}", mark(app.filter.priorities.contains(&p.id)), p.name))
                .collect(),
        ),
        (
            FilterSection::Employees,
            "Employee",
            refs.employees
                .iter()
                .map(|e| format!("{}{}", mark(app.filter.employee == Some(e.id)), e.full_name()))
                .collect(),
        ),
    ];

    for (i, (section, title, rows)) in sections.into_iter().enumerate() {
        let active = section == app.filter_section;
        let border_style = if active {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        let items: Vec<ListItem> = rows.into_iter().map(ListItem::new).collect();
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(border_style)
                    .title(title),
            )
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol(">> ");
        if active {
            f.render_stateful_widget(list, chunks[i], &mut app.filter_state);
        } else {
            f.render_stateful_widget(list, chunks[i], &mut ListState::default());
        }
    }
}

/// The app's own message, or else the most relevant store error.
fn status_line(app: &App) -> Line<'static> {
    let errors = app.store.errors();
    if let Some((scope, message)) = errors.first() {
        let label = match scope {
            ErrorScope::ReferenceData => "Reference data",
            ErrorScope::Tasks => "Tasks",
            ErrorScope::Employees => "Employees",
            ErrorScope::Comments(_) => "Comments",
            ErrorScope::Mutation => "Save",
        };
        return Line::from(Span::styled(
            format!(" {} failed: {}", label, message),
            Style::default().fg(Color::Red),
        ));
    }
    if app.store.is_loading() {
        return Line::from(Span::styled(" Loading…", Style::default().fg(Color::Yellow)));
    }
    if app.pending > 0 {
        return Line::from(Span::styled(" Saving…", Style::default().fg(Color::Yellow)));
    }
    match &app.message {
        Some(message) => Line::from(Span::raw(format!(" {}", message))),
        None => Line::from(""),
    }
}

fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints(
            [
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(size);

    let body_chunk = chunks[0];

    match app.input_mode {
        InputMode::Detail | InputMode::Comment => draw_detail(f, app, body_chunk),
        _ => draw_board(f, app, body_chunk),
    }

    let refs = app.store.reference_data();
    match app.input_mode {
        InputMode::Comment => draw_comment_input(f, app, body_chunk),
        InputMode::TaskForm => {
            if let Some(form) = &app.task_form {
                let lines = form_lines(
                    task_form_fields(form, &refs),
                    form.focus.key(),
                    form.error.as_ref(),
                );
                draw_form(f, "New Task", lines, body_chunk);
            }
        }
        InputMode::EmployeeForm => {
            if let Some(form) = &app.employee_form {
                let lines = form_lines(
                    employee_form_fields(form, &refs),
                    form.focus.key(),
                    form.error.as_ref(),
                );
                draw_form(f, "New Employee", lines, body_chunk);
            }
        }
        InputMode::Filter => draw_filter(f, app, body_chunk),
        InputMode::Board | InputMode::Detail => {}
    }

    f.render_widget(Paragraph::new(status_line(app)), chunks[1]);

    let legend = Paragraph::new(get_legend(&app.input_mode))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(legend, chunks[2]);
}

pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    app.spawn_initial_loads();
    loop {
        app.drain_outcomes();
        terminal.draw(|f| draw(f, &mut app))?;

        // Handle input
        if event::poll(Duration::from_millis(100))? {
            if let CEvent::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if app.handle_input(key) {
                    return Ok(());
                }
            }
        }
    }
}

fn calculate_wrapped_lines(text: &str, max_width: u16) -> usize {
    let mut line_count = 0;
    for line in text.lines() {
        let line_width = line.chars().count() as u16;
        line_count += ((line_width + max_width - 1) / max_width) as usize;
    }
    line_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TaskApi;
    use crate::store::Store;
    use crate::testing::FakeApi;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use ratatui::backend::TestBackend;
    use std::sync::Arc;

    #[test]
    fn test_wrapped_lines() {
        assert_eq!(calculate_wrapped_lines("", 10), 0);
        assert_eq!(calculate_wrapped_lines("abcdefghij", 10), 1);
        assert_eq!(calculate_wrapped_lines("abcdefghijk\nab", 10), 3);
    }

    #[test]
    fn test_centered_rect() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect_absolute(40, 10, area);
        assert_eq!(popup, Rect::new(30, 15, 40, 10));
    }

    fn rendered(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[tokio::test]
    async fn test_board_shows_columns_and_tasks() {
        let api: Arc<dyn TaskApi> = Arc::new(FakeApi::new());
        let store = Arc::new(Store::new(api, Duration::from_millis(300)));
        store.load_reference_data().await.unwrap();
        store.load_tasks().await.unwrap();
        let mut app = App::new(store);

        let mut terminal = Terminal::new(TestBackend::new(160, 30)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();

        let screen = rendered(&terminal);
        assert!(screen.contains("(2)"));
        assert!(screen.contains("No tasks"));
        assert!(screen.contains("Add Task"));
    }

    #[tokio::test]
    async fn test_detail_shows_priority_icon_and_saving() {
        let api: Arc<dyn TaskApi> = Arc::new(FakeApi::new());
        let store = Arc::new(Store::new(api, Duration::from_millis(300)));
        store.load_reference_data().await.unwrap();
        store.load_tasks().await.unwrap();
        let mut app = App::new(store);
        app.handle_input(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        app.pending = 1;

        let mut terminal = Terminal::new(TestBackend::new(160, 40)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();

        let screen = rendered(&terminal);
        // No icon from the server, so the level's fallback is shown.
        assert!(screen.contains("/icons/Medium.svg"));
        assert!(screen.contains("Saving"));
    }

    #[tokio::test]
    async fn test_board_before_load() {
        let api: Arc<dyn TaskApi> = Arc::new(FakeApi::new());
        let store = Arc::new(Store::new(api, Duration::from_millis(300)));
        let mut app = App::new(store);

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| draw(f, &mut app)).unwrap();

        assert!(rendered(&terminal).contains("Loading"));
    }
}
