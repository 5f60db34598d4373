//! Tool dispatch: maps a named tool call from the model onto the resolver.
//!
//! Parameters arrive as loose JSON from the model and are deserialized into
//! per-tool structs right here at the boundary. The structs carry no
//! identity field, so any `user_id`-shaped value the model hallucinates is
//! dropped on the floor; the owner id used downstream always comes from the
//! authenticated identity passed by the caller. That substitution is the
//! only barrier keeping a manipulated model inside its own user's data.
//!
//! Nothing raised by the resolver escapes this module: every error is
//! converted into the uniform [`ToolReply`] envelope.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::Error;
use crate::tools::{TaskTools, ToolReply};
use crate::models::StatusFilter;

/// One executed tool call with its parameters and result, as stored with
/// the assistant turn and returned to the HTTP caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub parameters: serde_json::Value,
    pub result: ToolReply,
}

#[derive(Debug, Deserialize)]
struct AddTaskParams {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListTasksParams {
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteTaskParams {
    #[serde(default, deserialize_with = "id_string_or_number")]
    task_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteTaskParams {
    #[serde(default, deserialize_with = "id_string_or_number")]
    task_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskParams {
    #[serde(default, deserialize_with = "id_string_or_number")]
    task_id: Option<String>,
    #[serde(default)]
    old_title: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Models emit task ids as strings or numbers interchangeably; accept both.
fn id_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }))
}

/// Routes named tool calls to the resolver under the trusted owner id.
pub struct ToolDispatcher {
    tools: TaskTools,
}

impl ToolDispatcher {
    pub fn new(tools: TaskTools) -> Self {
        Self { tools }
    }

    /// Execute one tool call. `owner_id` is the authenticated identity;
    /// `parameters` is the model's raw JSON. Never returns an error: all
    /// failures become a `status: "error"` envelope.
    pub async fn dispatch(
        &self,
        owner_id: &str,
        name: &str,
        parameters: &serde_json::Value,
    ) -> ToolReply {
        match self.try_dispatch(owner_id, name, parameters).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(tool = name, error = %err, "tool call failed");
                ToolReply::error(err.to_string())
            }
        }
    }

    async fn try_dispatch(
        &self,
        owner_id: &str,
        name: &str,
        parameters: &serde_json::Value,
    ) -> crate::Result<ToolReply> {
        match name {
            "add_task" => {
                let params: AddTaskParams = serde_json::from_value(parameters.clone())?;
                self.tools
                    .add(
                        owner_id,
                        params.title.as_deref().unwrap_or_default(),
                        params.description.as_deref(),
                    )
                    .await
            }
            "list_tasks" => {
                let params: ListTasksParams = serde_json::from_value(parameters.clone())?;
                let status = params
                    .status
                    .as_deref()
                    .map(StatusFilter::parse)
                    .unwrap_or_default();
                self.tools.list(owner_id, status).await
            }
            "complete_task" => {
                let params: CompleteTaskParams = serde_json::from_value(parameters.clone())?;
                self.tools
                    .complete(owner_id, params.task_id.as_deref(), params.title.as_deref())
                    .await
            }
            "delete_task" => {
                let params: DeleteTaskParams = serde_json::from_value(parameters.clone())?;
                self.tools
                    .delete(owner_id, params.task_id.as_deref(), params.title.as_deref())
                    .await
            }
            "update_task" => {
                let params: UpdateTaskParams = serde_json::from_value(parameters.clone())?;
                self.tools
                    .update(
                        owner_id,
                        params.task_id.as_deref(),
                        params.old_title.as_deref(),
                        params.title.as_deref(),
                        params.description.as_deref(),
                    )
                    .await
            }
            other => Err(Error::UnknownTool(other.to_string())),
        }
    }
}
