//! The five task tools and the shared reference-resolution algorithm.
//!
//! Every operation takes an `owner_id` supplied by the dispatcher from the
//! authenticated identity; model-provided parameters never carry identity.
//! Mutations are atomic: resolve, mutate, and reload happen inside one
//! store transaction, so partially-applied updates are never visible.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{SortKey, StatusFilter, Task, TaskCandidate};

/// Maximum title length in characters.
pub const MAX_TITLE_LEN: usize = 255;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// Uniform result envelope for tool execution. Serialized into the
/// tool-result payload fed back to the model and stored with the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolReply {
    Success(SuccessReply),
    /// Soft failure: the operation was skipped but nothing is wrong.
    /// Used for duplicate-title adds.
    Warning {
        message: String,
        existing_task: Task,
    },
    /// A title fragment matched more than one task. Not an error; the
    /// orchestrator surfaces the candidates for a follow-up turn.
    MultipleMatches {
        message: String,
        tasks: Vec<TaskCandidate>,
    },
    Error {
        error: String,
    },
}

/// Payload of a successful tool call. Which fields are present depends on
/// the tool: `task` for add/complete/update, `tasks` + `count` for list,
/// `task_id` for delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
    pub message: String,
}

impl ToolReply {
    pub fn task(task: Task, message: impl Into<String>) -> Self {
        ToolReply::Success(SuccessReply {
            task: Some(task),
            tasks: None,
            count: None,
            task_id: None,
            message: message.into(),
        })
    }

    pub fn tasks(tasks: Vec<Task>, message: impl Into<String>) -> Self {
        let count = tasks.len();
        ToolReply::Success(SuccessReply {
            task: None,
            tasks: Some(tasks),
            count: Some(count),
            task_id: None,
            message: message.into(),
        })
    }

    pub fn deleted(task_id: i64, message: impl Into<String>) -> Self {
        ToolReply::Success(SuccessReply {
            task: None,
            tasks: None,
            count: None,
            task_id: Some(task_id),
            message: message.into(),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ToolReply::Error {
            error: message.into(),
        }
    }
}

/// Outcome of the shared reference-resolution sub-algorithm.
#[derive(Debug, Clone)]
pub enum Resolution {
    Resolved(Task),
    NotFound,
    Ambiguous(Vec<TaskCandidate>),
}

/// Task tool implementations over the store.
pub struct TaskTools {
    db: Arc<Database>,
}

impl TaskTools {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a new task. Duplicate titles (case-insensitive, same owner)
    /// return a warning carrying the existing task instead of inserting.
    pub async fn add(
        &self,
        owner_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<ToolReply> {
        let title = normalize_text(title);
        let description = description.map(normalize_text).filter(|d| !d.is_empty());

        validate_title(&title)?;
        validate_description(description.as_deref())?;

        if let Some(existing) = self.db.find_task_by_exact_title(owner_id, &title).await? {
            debug!(task_id = existing.id, "duplicate title on add");
            return Ok(ToolReply::Warning {
                message: format!(
                    "Task with title '{title}' already exists (id {}). Update it instead?",
                    existing.id
                ),
                existing_task: existing,
            });
        }

        let task = self
            .db
            .insert_task(owner_id, &title, description.as_deref())
            .await?;
        debug!(task_id = task.id, "created task");
        let message = format!("Created task {} - {}", task.id, task.title);
        Ok(ToolReply::task(task, message))
    }

    /// List the owner's tasks, newest first. An empty list is a success.
    pub async fn list(&self, owner_id: &str, status: StatusFilter) -> Result<ToolReply> {
        let tasks = self
            .db
            .list_tasks(owner_id, status, SortKey::CreatedAt)
            .await?;
        let message = format!("Retrieved {} {status} tasks", tasks.len());
        Ok(ToolReply::tasks(tasks, message))
    }

    /// Resolve a task reference by id and/or title fragment.
    ///
    /// A non-numeric or unmatched id falls through to the title search when
    /// a fragment was also given; with neither identifying field this is a
    /// reference error.
    pub async fn resolve_reference(
        &self,
        owner_id: &str,
        id: Option<&str>,
        title_fragment: Option<&str>,
    ) -> Result<Resolution> {
        if id.is_none() && title_fragment.is_none() {
            return Err(Error::Reference(
                "Must provide either a task id or a title".to_string(),
            ));
        }

        if let Some(raw) = id {
            if let Ok(parsed) = raw.trim().parse::<i64>() {
                if let Some(task) = self.db.get_task(owner_id, parsed).await? {
                    debug!(task_id = task.id, "resolved by id");
                    return Ok(Resolution::Resolved(task));
                }
            }
        }

        let Some(fragment) = title_fragment else {
            return Ok(Resolution::NotFound);
        };

        let matches = self
            .db
            .find_tasks_by_title_fragment(owner_id, fragment)
            .await?;

        match matches.len() {
            0 => Ok(Resolution::NotFound),
            1 => Ok(Resolution::Resolved(matches.into_iter().next().ok_or_else(
                || Error::NotFound("task".to_string()),
            )?)),
            _ => Ok(Resolution::Ambiguous(
                matches.iter().map(TaskCandidate::from).collect(),
            )),
        }
    }

    /// Mark a task completed. Idempotent: completing a completed task
    /// succeeds silently.
    pub async fn complete(
        &self,
        owner_id: &str,
        id: Option<&str>,
        title: Option<&str>,
    ) -> Result<ToolReply> {
        let task = match self.resolve_reference(owner_id, id, title).await? {
            Resolution::Resolved(task) => task,
            Resolution::NotFound => {
                return Err(Error::NotFound("Task not found for this user".to_string()));
            }
            Resolution::Ambiguous(candidates) => {
                return Ok(multiple_matches(title.unwrap_or_default(), candidates));
            }
        };

        let updated = self
            .db
            .complete_task(owner_id, task.id)
            .await?
            .ok_or_else(|| Error::NotFound("Task not found for this user".to_string()))?;
        let message = format!("Marked '{}' as done", updated.title);
        Ok(ToolReply::task(updated, message))
    }

    /// Permanently delete a task. Irreversible; the reply carries the prior
    /// id and title for confirmation messaging.
    pub async fn delete(
        &self,
        owner_id: &str,
        id: Option<&str>,
        title: Option<&str>,
    ) -> Result<ToolReply> {
        let task = match self.resolve_reference(owner_id, id, title).await? {
            Resolution::Resolved(task) => task,
            Resolution::NotFound => {
                return Err(Error::NotFound("Task not found for this user".to_string()));
            }
            Resolution::Ambiguous(candidates) => {
                return Ok(multiple_matches(title.unwrap_or_default(), candidates));
            }
        };

        let (deleted_id, deleted_title) = self
            .db
            .delete_task(owner_id, task.id)
            .await?
            .ok_or_else(|| Error::NotFound("Task not found for this user".to_string()))?;
        debug!(task_id = deleted_id, "deleted task");
        Ok(ToolReply::deleted(
            deleted_id,
            format!("Deleted '{deleted_title}'"),
        ))
    }

    /// Update title and/or description. Only provided fields are touched;
    /// an explicit empty description clears the field, an empty title is
    /// rejected by the length check.
    pub async fn update(
        &self,
        owner_id: &str,
        id: Option<&str>,
        old_title: Option<&str>,
        title: Option<&str>,
        description: Option<&str>,
    ) -> Result<ToolReply> {
        if id.is_none() && old_title.is_none() {
            return Err(Error::Reference(
                "Must provide either a task id or the current title".to_string(),
            ));
        }
        if title.is_none() && description.is_none() {
            return Err(Error::Validation(
                "At least one field (title or description) must be provided".to_string(),
            ));
        }

        let new_title = title.map(normalize_text);
        if let Some(ref t) = new_title {
            validate_title(t)?;
        }
        let new_description = description.map(normalize_text);
        if let Some(ref d) = new_description {
            validate_description(Some(d))?;
        }

        let task = match self.resolve_reference(owner_id, id, old_title).await? {
            Resolution::Resolved(task) => task,
            Resolution::NotFound => {
                return Err(Error::NotFound("Task not found for this user".to_string()));
            }
            Resolution::Ambiguous(candidates) => {
                return Ok(multiple_matches(old_title.unwrap_or_default(), candidates));
            }
        };
        let prior_title = task.title.clone();

        // Empty description clears the column.
        let description_update = new_description
            .as_deref()
            .map(|d| if d.is_empty() { None } else { Some(d) });

        let updated = self
            .db
            .update_task_fields(
                owner_id,
                task.id,
                new_title.as_deref(),
                description_update,
                None,
            )
            .await?
            .ok_or_else(|| Error::NotFound("Task not found for this user".to_string()))?;

        let message = if new_title.is_some() {
            format!("Changed '{prior_title}' to '{}'", updated.title)
        } else {
            "Updated task description".to_string()
        };
        Ok(ToolReply::task(updated, message))
    }
}

fn multiple_matches(fragment: &str, candidates: Vec<TaskCandidate>) -> ToolReply {
    ToolReply::MultipleMatches {
        message: format!("Found {} tasks matching '{fragment}':", candidates.len()),
        tasks: candidates,
    }
}

/// Trim surrounding whitespace and strip control characters that have no
/// business in a title or description (keeps newlines and tabs).
fn normalize_text(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Shared title length check (1 to [`MAX_TITLE_LEN`] characters).
pub fn validate_title(title: &str) -> Result<()> {
    if title.is_empty() {
        return Err(Error::Validation("Title is required".to_string()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "Title must be {MAX_TITLE_LEN} characters or less"
        )));
    }
    Ok(())
}

/// Shared description length check (at most [`MAX_DESCRIPTION_LEN`] characters).
pub fn validate_description(description: Option<&str>) -> Result<()> {
    if let Some(description) = description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(Error::Validation(format!(
                "Description must be {MAX_DESCRIPTION_LEN} characters or less"
            )));
        }
    }
    Ok(())
}
