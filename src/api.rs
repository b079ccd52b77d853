use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ApiError;
use crate::models::{
    Comment, Department, Employee, NewComment, NewEmployee, NewTask, Priority, Status, Task,
};
use crate::parser::parse_timestamp;

/// Everything the client asks of the task server.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn departments(&self) -> Result<Vec<Department>, ApiError>;
    async fn employees(&self) -> Result<Vec<Employee>, ApiError>;
    async fn priorities(&self) -> Result<Vec<Priority>, ApiError>;
    async fn statuses(&self) -> Result<Vec<Status>, ApiError>;
    async fn tasks(&self) -> Result<Vec<Task>, ApiError>;

    /// Returns the id the server assigned.
    async fn create_task(&self, task: &NewTask) -> Result<u64, ApiError>;
    async fn update_task_status(&self, task_id: u64, status_id: u64) -> Result<(), ApiError>;

    async fn comments(&self, task_id: u64) -> Result<Vec<Comment>, ApiError>;
    async fn create_comment(&self, task_id: u64, comment: &NewComment) -> Result<u64, ApiError>;

    async fn create_employee(&self, employee: &NewEmployee) -> Result<u64, ApiError>;
}

pub struct HttpApi {
    client: Client,
    instance_url: String,
    api_key: String,
}

impl HttpApi {
    pub fn new(instance_url: &str, api_key: &str) -> Self {
        HttpApi {
            client: Client::new(),
            instance_url: instance_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.instance_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/json")
    }

    /// Sends the request and returns the body of a 2xx answer.
    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let res = self.authorized(request).send().await?;
        let status = res.status();
        let body = res.text().await?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(ApiError::Status {
                status,
                message: error_message(&body),
            })
        }
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let body = self.send(self.client.get(&url)).await?;
        parse_list(path, &body)
    }

    async fn post_for_id(&self, path: &str, request: RequestBuilder) -> Result<u64, ApiError> {
        let body = self.send(request).await?;
        let created: Created =
            serde_json::from_str(&body).map_err(|e| ApiError::malformed(path, e))?;
        Ok(created.id)
    }
}

#[async_trait]
impl TaskApi for HttpApi {
    async fn departments(&self) -> Result<Vec<Department>, ApiError> {
        self.get_list("/departments").await
    }

    async fn employees(&self) -> Result<Vec<Employee>, ApiError> {
        self.get_list("/employees").await
    }

    async fn priorities(&self) -> Result<Vec<Priority>, ApiError> {
        self.get_list("/priorities").await
    }

    async fn statuses(&self) -> Result<Vec<Status>, ApiError> {
        self.get_list("/statuses").await
    }

    async fn tasks(&self) -> Result<Vec<Task>, ApiError> {
        let raw: Vec<RawTask> = self.get_list("/tasks").await?;
        Ok(raw.into_iter().map(Task::from).collect())
    }

    async fn create_task(&self, task: &NewTask) -> Result<u64, ApiError> {
        let url = self.url("/tasks");
        debug!("POST {}", url);
        self.post_for_id("/tasks", self.client.post(&url).json(task))
            .await
    }

    async fn update_task_status(&self, task_id: u64, status_id: u64) -> Result<(), ApiError> {
        let url = self.url(&format!("/tasks/{}", task_id));
        debug!("PUT {} status_id={}", url, status_id);
        self.send(
            self.client
                .put(&url)
                .json(&json!({ "status_id": status_id })),
        )
        .await?;
        Ok(())
    }

    async fn comments(&self, task_id: u64) -> Result<Vec<Comment>, ApiError> {
        let raw: Vec<RawComment> = self
            .get_list(&format!("/tasks/{}/comments", task_id))
            .await?;
        Ok(raw.into_iter().map(RawComment::into_tree).collect())
    }

    async fn create_comment(&self, task_id: u64, comment: &NewComment) -> Result<u64, ApiError> {
        let path = format!("/tasks/{}/comments", task_id);
        let url = self.url(&path);
        debug!("POST {} parent={:?}", url, comment.parent_id);
        self.post_for_id(&path, self.client.post(&url).json(comment))
            .await
    }

    async fn create_employee(&self, employee: &NewEmployee) -> Result<u64, ApiError> {
        let url = self.url("/employees");
        debug!("POST {} (multipart)", url);

        let mut form = Form::new()
            .text("name", employee.name.clone())
            .text("surname", employee.surname.clone())
            .text("department_id", employee.department_id.to_string());

        if let Some(path) = &employee.avatar {
            form = form.part("avatar", avatar_part(path).await?);
        }

        self.post_for_id("/employees", self.client.post(&url).multipart(form))
            .await
    }
}

async fn avatar_part(path: &Path) -> Result<Part, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Avatar {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "avatar".to_string());

    Ok(Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(image_mime(path))?)
}

fn image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Error bodies arrive as JSON (`{"message": ...}`) or plain text.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => match value.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => value.to_string(),
        },
        Err(_) => body.trim().to_string(),
    }
}

/// A list endpoint must answer with a JSON array.
fn parse_list<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<Vec<T>, ApiError> {
    let value: Value = serde_json::from_str(body).map_err(|e| ApiError::malformed(endpoint, e))?;
    if !value.is_array() {
        return Err(ApiError::malformed(
            endpoint,
            format!("expected a sequence, got {}", json_kind(&value)),
        ));
    }
    serde_json::from_value(value).map_err(|e| ApiError::malformed(endpoint, e))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Deserialize)]
struct Created {
    id: u64,
}

#[derive(Deserialize)]
struct RawTask {
    id: u64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    department: Department,
    employee: Employee,
    status: Status,
    priority: Priority,
    #[serde(default)]
    total_comments: Option<usize>,
    #[serde(default)]
    comment_count: Option<usize>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Task {
        Task {
            id: raw.id,
            name: raw.name,
            description: raw.description.filter(|d| !d.trim().is_empty()),
            due_date: raw.due_date.as_deref().and_then(parse_timestamp),
            department: raw.department,
            employee: raw.employee,
            status: raw.status,
            priority: raw.priority,
            comment_count: raw.total_comments.or(raw.comment_count).unwrap_or(0),
        }
    }
}

#[derive(Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author_nickname: Option<String>,
    #[serde(default)]
    author_avatar: Option<String>,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    parent_id: Option<u64>,
    #[serde(default)]
    sub_comments: Option<Vec<RawComment>>,
}

impl RawComment {
    fn into_comment(self) -> (Comment, Vec<RawComment>) {
        let comment = Comment {
            id: self.id,
            author_nickname: self
                .author_nickname
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
            text: self.text.or(self.content).unwrap_or_default(),
            author_avatar: self.author_avatar.or(self.avatar),
            parent_id: self.parent_id,
            sub_comments: Vec::new(),
        };
        (comment, self.sub_comments.unwrap_or_default())
    }

    /// Replies of replies are hoisted so the tree stays one level deep.
    fn into_tree(self) -> Comment {
        let (mut top, children) = self.into_comment();
        let mut pending = children;
        pending.reverse();

        while let Some(raw) = pending.pop() {
            let (reply, mut nested) = raw.into_comment();
            top.sub_comments.push(reply);
            nested.reverse();
            pending.extend(nested);
        }
        top
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn task_json(id: u64, status: &str) -> Value {
        json!({
            "id": id,
            "name": "Landing page",
            "description": "Design the new landing page",
            "due_date": "2025-12-31T20:00:00.000000Z",
            "department": { "id": 2, "name": "Design Department" },
            "employee": {
                "id": 5,
                "name": "Nino",
                "surname": "Beridze",
                "avatar": null,
                "department_id": 2
            },
            "status": { "id": 1, "name": status },
            "priority": { "id": 2, "name": "საშუალო", "icon": "https://cdn.example/medium.svg" },
            "total_comments": 3
        })
    }

    #[tokio::test]
    async fn test_tasks_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .and(header("Authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([task_json(1, "To Do")])))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(&format!("{}/", server.uri()), "secret");
        let tasks = api.tasks().await.unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].comment_count, 3);
        assert_eq!(tasks[0].status.name, "To Do");
        assert!(tasks[0].due_date.is_some());
    }

    #[tokio::test]
    async fn test_non_sequence_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        let err = api.tasks().await.unwrap_err();
        match err {
            ApiError::Malformed { endpoint, reason } => {
                assert_eq!(endpoint, "/tasks");
                assert!(reason.contains("an object"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_plain_text_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/statuses"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down\n"))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        match api.statuses().await.unwrap_err() {
            ApiError::Status { status, message } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_json_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/employees"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "message": "Unauthenticated." })),
            )
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "wrong");
        match api.employees().await.unwrap_err() {
            ApiError::Status { status, message } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(message, "Unauthenticated.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_status_puts_status_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/tasks/7"))
            .and(body_json(json!({ "status_id": 2 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(task_json(7, "In Progress")))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        api.update_task_status(7, 2).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_task_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks"))
            .and(body_json(json!({
                "name": "Landing page",
                "description": null,
                "due_date": null,
                "status_id": 1,
                "priority_id": 2,
                "department_id": 3,
                "employee_id": 4
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 99, "name": "Landing page" })))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        let id = api
            .create_task(&NewTask {
                name: "Landing page".to_string(),
                description: None,
                due_date: None,
                status_id: 1,
                priority_id: 2,
                department_id: 3,
                employee_id: 4,
            })
            .await
            .unwrap();
        assert_eq!(id, 99);
    }

    #[tokio::test]
    async fn test_create_reply_sends_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tasks/7/comments"))
            .and(body_json(json!({ "text": "done", "task_id": 7, "parent_id": 12 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 13 })))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        let reply = NewComment {
            text: "done".to_string(),
            task_id: 7,
            parent_id: Some(12),
        };
        assert_eq!(api.create_comment(7, &reply).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn test_create_employee_without_avatar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/employees"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": 41 })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), "secret");
        let employee = NewEmployee {
            name: "Nino".to_string(),
            surname: "Beridze".to_string(),
            department_id: 2,
            avatar: None,
        };
        assert_eq!(api.create_employee(&employee).await.unwrap(), 41);
    }

    #[tokio::test]
    async fn test_missing_avatar_file() {
        let api = HttpApi::new("http://127.0.0.1:9", "secret");
        let employee = NewEmployee {
            name: "Nino".to_string(),
            surname: "Beridze".to_string(),
            department_id: 2,
            avatar: Some("/definitely/not/here.png".into()),
        };
        assert!(matches!(
            api.create_employee(&employee).await,
            Err(ApiError::Avatar { .. })
        ));
    }

    #[test]
    fn test_comment_fallback_fields() {
        let body = json!([{
            "id": 1,
            "content": "old field name",
            "author_nickname": null,
            "avatar": "https://cdn.example/a.png",
            "parent_id": null,
            "sub_comments": null
        }])
        .to_string();

        let raw: Vec<RawComment> = parse_list("/tasks/1/comments", &body).unwrap();
        let comments: Vec<Comment> = raw.into_iter().map(RawComment::into_tree).collect();

        assert_eq!(comments[0].text, "old field name");
        assert_eq!(comments[0].author_nickname, "Unknown");
        assert_eq!(
            comments[0].author_avatar.as_deref(),
            Some("https://cdn.example/a.png")
        );
        assert!(comments[0].sub_comments.is_empty());
    }

    #[test]
    fn test_deep_replies_are_hoisted() {
        let body = json!([{
            "id": 1,
            "text": "top",
            "author_nickname": "nino",
            "sub_comments": [
                {
                    "id": 2,
                    "text": "reply",
                    "author_nickname": "giorgi",
                    "parent_id": 1,
                    "sub_comments": [
                        { "id": 3, "text": "reply to reply", "author_nickname": "nino", "parent_id": 2 }
                    ]
                },
                { "id": 4, "text": "second reply", "author_nickname": "ana", "parent_id": 1 }
            ]
        }])
        .to_string();

        let raw: Vec<RawComment> = parse_list("/tasks/1/comments", &body).unwrap();
        let top = raw.into_iter().next().unwrap().into_tree();
        let ids: Vec<u64> = top.sub_comments.iter().map(|c| c.id).collect();

        assert_eq!(ids, vec![2, 3, 4]);
        assert!(top.sub_comments.iter().all(|c| c.sub_comments.is_empty()));
    }

    #[test]
    fn test_task_without_comment_total() {
        let mut value = task_json(1, "Done");
        value.as_object_mut().unwrap().remove("total_comments");
        value["description"] = Value::Null;
        value["due_date"] = json!("not a date");

        let raw: RawTask = serde_json::from_value(value).unwrap();
        let task = Task::from(raw);
        assert_eq!(task.comment_count, 0);
        assert_eq!(task.description, None);
        assert_eq!(task.due_date, None);
    }
}
