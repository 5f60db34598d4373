//! Language-model client for the conversational assistant.
//!
//! The orchestrator talks to the model through the [`LanguageModel`] trait
//! so tests can plug in a scripted double. The production implementation is
//! [`HttpModelClient`], a reqwest client for a Cohere-style chat endpoint
//! with tool calling.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::ModelConfig;
use crate::dispatch::ToolCallRecord;
use crate::error::{Error, Result};
use crate::models::MessageRole;

/// One prior turn in the model's transcript shape.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMessage {
    pub role: MessageRole,
    pub message: String,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelToolCall {
    pub name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// The model's reply to a chat call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ModelToolCall>,
}

/// The two calls a chat turn can make: `chat` may return tool calls;
/// `respond` consolidates tool results into a final reply and permits no
/// further tools.
pub trait LanguageModel: Send + Sync {
    fn chat(
        &self,
        message: &str,
        history: &[TranscriptMessage],
        preamble: &str,
    ) -> impl Future<Output = Result<ModelReply>> + Send;

    fn respond(
        &self,
        message: &str,
        tool_results: &[ToolCallRecord],
        preamble: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// HTTP client for a Cohere-style `/v1/chat` endpoint.
pub struct HttpModelClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl HttpModelClient {
    /// Build a client from config. The API key is read from the environment
    /// variable named in the config; the request timeout bounds the only
    /// network suspension point of a chat turn.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Model(format!("failed to build HTTP client: {e}")))?;

        let api_key = std::env::var(&config.api_key_env).ok();

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat", self.base_url)
    }

    async fn post_chat(&self, body: serde_json::Value) -> Result<ModelReply> {
        let mut builder = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Model(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Model(format!("chat API error ({status}): {detail}")));
        }

        let reply: ModelReply = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("failed to parse chat response: {e}")))?;
        debug!(tool_calls = reply.tool_calls.len(), "model reply received");
        Ok(reply)
    }
}

impl LanguageModel for HttpModelClient {
    async fn chat(
        &self,
        message: &str,
        history: &[TranscriptMessage],
        preamble: &str,
    ) -> Result<ModelReply> {
        let chat_history: Vec<serde_json::Value> = history
            .iter()
            .map(|m| json!({"role": wire_role(m.role), "message": m.message}))
            .collect();

        self.post_chat(json!({
            "model": self.model,
            "message": message,
            "chat_history": chat_history,
            "tools": tool_schema(),
            "preamble": preamble,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        }))
        .await
    }

    async fn respond(
        &self,
        message: &str,
        tool_results: &[ToolCallRecord],
        preamble: &str,
    ) -> Result<String> {
        let reply = self
            .post_chat(json!({
                "model": self.model,
                "message": message,
                "tool_results": tool_results_payload(tool_results),
                "preamble": preamble,
                "force_single_step": true,
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
            }))
            .await?;
        Ok(reply.text)
    }
}

/// The wire vocabulary for roles exists only here, at the one boundary
/// that needs it.
fn wire_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "USER",
        MessageRole::Assistant => "CHATBOT",
    }
}

/// Shape executed tool calls into the API's `tool_results` payload.
pub fn tool_results_payload(records: &[ToolCallRecord]) -> serde_json::Value {
    let entries: Vec<serde_json::Value> = records
        .iter()
        .map(|record| {
            json!({
                "call": {"name": record.name, "parameters": record.parameters},
                "outputs": [record.result],
            })
        })
        .collect();
    serde_json::Value::Array(entries)
}

/// Schema for the five task tools. Identity is deliberately absent: the
/// dispatcher injects the authenticated owner and ignores anything
/// identity-shaped the model emits.
pub fn tool_schema() -> serde_json::Value {
    json!([
        {
            "name": "add_task",
            "description": "Create a new task for the user",
            "parameter_definitions": {
                "title": {
                    "description": "Task title (1-255 characters)",
                    "type": "string",
                    "required": true
                },
                "description": {
                    "description": "Optional task description (max 1000 characters)",
                    "type": "string",
                    "required": false
                }
            }
        },
        {
            "name": "list_tasks",
            "description": "List all tasks for the user with optional status filter",
            "parameter_definitions": {
                "status": {
                    "description": "Filter by status: 'all', 'completed', or 'incomplete'",
                    "type": "string",
                    "required": false
                }
            }
        },
        {
            "name": "complete_task",
            "description": "Mark a task as completed. Can use task_id OR title to find the task.",
            "parameter_definitions": {
                "task_id": {
                    "description": "ID of the task to complete (optional if title provided)",
                    "type": "string",
                    "required": false
                },
                "title": {
                    "description": "Title or partial title of the task to complete",
                    "type": "string",
                    "required": false
                }
            }
        },
        {
            "name": "delete_task",
            "description": "Permanently delete a task. Can use task_id OR title to find the task.",
            "parameter_definitions": {
                "task_id": {
                    "description": "ID of the task to delete (optional if title provided)",
                    "type": "string",
                    "required": false
                },
                "title": {
                    "description": "Title or partial title of the task to delete",
                    "type": "string",
                    "required": false
                }
            }
        },
        {
            "name": "update_task",
            "description": "Update task title and/or description. Can use task_id OR old_title to find the task.",
            "parameter_definitions": {
                "task_id": {
                    "description": "ID of the task to update (optional if old_title provided)",
                    "type": "string",
                    "required": false
                },
                "old_title": {
                    "description": "Current title or partial title to search for",
                    "type": "string",
                    "required": false
                },
                "title": {
                    "description": "New task title (1-255 characters)",
                    "type": "string",
                    "required": false
                },
                "description": {
                    "description": "New task description (max 1000 characters)",
                    "type": "string",
                    "required": false
                }
            }
        }
    ])
}

/// Fixed instruction preamble. Defines the disambiguation conventions the
/// resolver and orchestrator rely on: resolve ids from lists, surface
/// multiple-match candidates verbatim, and check tool result status before
/// claiming anything.
pub const ASSISTANT_PREAMBLE: &str = r#"You are a helpful task management assistant. Be conversational and remember context from the conversation.

Tool result verification:
- After every tool call, check the result status.
- status "success": confirm using details from the result, including the task id.
- status "error": show the error message and help the user fix it.
- status "warning": a duplicate was found; ask whether to update the existing task instead.
- status "multiple_matches": show the numbered candidate list verbatim and ask the user to choose.

Task reference resolution:
- If the user gives an explicit numeric id ("task 22"), pass task_id directly; no listing needed.
- If the user gives a title or partial title, call list_tasks first when unsure, then pass both task_id and the matched title.
- After you have shown a numbered list, "first one" or "1" means the first task id from that list, "second one" or "2" the second, and so on. Do not ask again.
- If nothing matches, show the user their current tasks.

Phrasing:
- "mark X done" means complete_task; "remove X" means delete_task; "change X to Y" means update_task with old_title X and title Y.
- When updating by title match, pass both task_id and old_title.
- Never call the same tool twice in one turn, and never claim success without a success status."#;
