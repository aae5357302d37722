//! Request/response client for the backend's REST endpoints.
//!
//! Every call here is independent of the command channel. The backend often
//! reports failure as `{"error": "..."}` with a 200 status, so each response is
//! checked for that field before it is decoded.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::automation::{ContextSnapshot, NewTask, ScheduledTask, Shortcut, Suggestion};
use crate::error::RequestError;

pub type RequestResult<T> = Result<T, RequestError>;

/// Result of one voice capture as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    Recognized { command: String, response: String },
    NoSpeech,
    /// The backend answered without a response or an error.
    NoResponse,
    Failed(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
struct VoiceReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl VoiceReply {
    fn into_outcome(self) -> VoiceOutcome {
        match (self.status.as_deref(), self.response) {
            (Some("success"), Some(response)) if !response.is_empty() => VoiceOutcome::Recognized {
                command: self.command.unwrap_or_default(),
                response,
            },
            (Some("no_speech"), _) => VoiceOutcome::NoSpeech,
            _ => match self.error.filter(|e| !e.is_empty()) {
                Some(error) => VoiceOutcome::Failed(error),
                None => VoiceOutcome::NoResponse,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Calibrated(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Server-side speech capture.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn capture(&self) -> RequestResult<VoiceOutcome>;
    async fn calibrate(&self) -> RequestResult<CalibrationOutcome>;
}

/// Suggestion, task and context endpoints.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn suggestions(&self) -> RequestResult<Vec<Suggestion>>;
    async fn execute_suggestion(&self, action: &str) -> RequestResult<String>;
    async fn tasks(&self) -> RequestResult<Vec<ScheduledTask>>;
    async fn create_task(&self, task: &NewTask) -> RequestResult<ScheduledTask>;
    async fn set_task_enabled(&self, id: i64, enabled: bool) -> RequestResult<String>;
    async fn delete_task(&self, id: i64) -> RequestResult<String>;
    async fn context(&self) -> RequestResult<ContextSnapshot>;
    async fn create_shortcut(&self, shortcut: &Shortcut) -> RequestResult<String>;
}

#[derive(Debug, Deserialize)]
struct SuggestionsResponse {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
struct TasksResponse {
    #[serde(default)]
    tasks: Vec<ScheduledTask>,
}

#[derive(Debug, Deserialize)]
struct CreatedTaskResponse {
    task: ScheduledTask,
}

#[derive(Debug, Deserialize)]
struct ExecuteResponse {
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct StatusMessage {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    action: &'a str,
}

#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> RequestResult<HealthStatus> {
        self.get("/health").await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> RequestResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");
        let response = self.client.get(&url).send().await?;
        decode(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> RequestResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "POST");
        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(body);
        }
        decode(request.send().await?).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> RequestResult<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "DELETE");
        let response = self.client.delete(&url).send().await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> RequestResult<T> {
    if !response.status().is_success() {
        return Err(RequestError::Status(response.status()));
    }
    let body: Value = response.json().await?;
    decode_value(body)
}

/// Lift `{"error": ...}` into [`RequestError::Backend`], otherwise decode.
fn decode_value<T: DeserializeOwned>(body: Value) -> RequestResult<T> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(RequestError::Backend(message));
    }
    serde_json::from_value(body).map_err(|e| RequestError::Decode(e.to_string()))
}

fn status_text(reply: StatusMessage, fallback: String) -> String {
    reply
        .message
        .filter(|m| !m.is_empty())
        .or(reply.status)
        .unwrap_or(fallback)
}

#[async_trait]
impl VoiceBackend for BackendClient {
    async fn capture(&self) -> RequestResult<VoiceOutcome> {
        let url = format!("{}/voice", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RequestError::Status(response.status()));
        }
        // The voice endpoint carries its outcome in `status`, so `error` is
        // part of the payload rather than a request failure.
        let reply: VoiceReply = response
            .json()
            .await
            .map_err(|e| RequestError::Decode(e.to_string()))?;
        Ok(reply.into_outcome())
    }

    async fn calibrate(&self) -> RequestResult<CalibrationOutcome> {
        let url = format!("{}/voice/calibrate", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RequestError::Status(response.status()));
        }
        let reply: StatusMessage = response
            .json()
            .await
            .map_err(|e| RequestError::Decode(e.to_string()))?;
        let message = reply.message.unwrap_or_default();
        Ok(match reply.status.as_deref() {
            Some("success") => CalibrationOutcome::Calibrated(message),
            _ => CalibrationOutcome::Failed(message),
        })
    }
}

#[async_trait]
impl AutomationBackend for BackendClient {
    async fn suggestions(&self) -> RequestResult<Vec<Suggestion>> {
        let body: SuggestionsResponse = self.get("/automation/suggestions").await?;
        Ok(body.suggestions)
    }

    async fn execute_suggestion(&self, action: &str) -> RequestResult<String> {
        let body: ExecuteResponse = self
            .post("/automation/execute-suggestion", Some(&ExecuteRequest { action }))
            .await?;
        Ok(match body.result {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    async fn tasks(&self) -> RequestResult<Vec<ScheduledTask>> {
        let body: TasksResponse = self.get("/tasks").await?;
        Ok(body.tasks)
    }

    async fn create_task(&self, task: &NewTask) -> RequestResult<ScheduledTask> {
        let body: CreatedTaskResponse = self.post("/tasks", Some(task)).await?;
        Ok(body.task)
    }

    async fn set_task_enabled(&self, id: i64, enabled: bool) -> RequestResult<String> {
        let verb = if enabled { "enable" } else { "disable" };
        let reply: StatusMessage = self
            .post::<(), _>(&format!("/tasks/{}/{}", id, verb), None)
            .await?;
        Ok(status_text(reply, format!("Task {} {}d", id, verb)))
    }

    async fn delete_task(&self, id: i64) -> RequestResult<String> {
        let reply: StatusMessage = self.delete(&format!("/tasks/{}", id)).await?;
        Ok(status_text(reply, format!("Task {} deleted", id)))
    }

    async fn context(&self) -> RequestResult<ContextSnapshot> {
        self.get("/automation/context").await
    }

    async fn create_shortcut(&self, shortcut: &Shortcut) -> RequestResult<String> {
        let reply: StatusMessage = self.post("/automation/shortcut", Some(shortcut)).await?;
        Ok(status_text(reply, format!("Shortcut '{}' created", shortcut.name)))
    }
}
