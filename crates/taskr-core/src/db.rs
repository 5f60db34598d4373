//! Database operations for taskr.
//!
//! Every task and conversation query is scoped by `owner_id`; no call here
//! can observe or mutate another owner's rows. Mutations that span more than
//! one statement run inside a single transaction.

use crate::error::Result;
use crate::models::*;
use crate::schema::SCHEMA;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Database handle for taskr.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create a database at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let parent = path.parent().unwrap_or(Path::new("."));
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Initialize schema.
    async fn init(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database.
    pub async fn close(self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    /// Insert a new task for the owner. Starts out incomplete.
    pub async fn insert_task(
        &self,
        owner_id: &str,
        title: &str,
        description: Option<&str>,
    ) -> Result<Task> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (owner_id, title, description, completed, created_at, updated_at)
            VALUES (?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;
        let task = task_from_row(&row);

        tx.commit().await?;
        Ok(task)
    }

    /// Get a task by id, owner-scoped.
    pub async fn get_task(&self, owner_id: &str, id: i64) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| task_from_row(&row)))
    }

    /// Case-insensitive exact title lookup, used for the duplicate check.
    pub async fn find_task_by_exact_title(
        &self,
        owner_id: &str,
        title: &str,
    ) -> Result<Option<Task>> {
        let row =
            sqlx::query("SELECT * FROM tasks WHERE owner_id = ? AND lower(title) = lower(?)")
                .bind(owner_id)
                .bind(title)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|row| task_from_row(&row)))
    }

    /// Case-insensitive substring match on title, in stable id order.
    ///
    /// `instr` rather than LIKE so that `%`/`_` in the fragment match
    /// literally instead of acting as wildcards.
    pub async fn find_tasks_by_title_fragment(
        &self,
        owner_id: &str,
        fragment: &str,
    ) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE owner_id = ? AND instr(lower(title), lower(?)) > 0
            ORDER BY id ASC
            "#,
        )
        .bind(owner_id)
        .bind(fragment)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// List the owner's tasks with a status filter and sort key.
    pub async fn list_tasks(
        &self,
        owner_id: &str,
        status: StatusFilter,
        sort: SortKey,
    ) -> Result<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE owner_id = ?");

        match status {
            StatusFilter::All => {}
            StatusFilter::Completed => sql.push_str(" AND completed = 1"),
            StatusFilter::Incomplete => sql.push_str(" AND completed = 0"),
        }

        match sort {
            SortKey::CreatedAt => sql.push_str(" ORDER BY created_at DESC, id DESC"),
            SortKey::Title => sql.push_str(" ORDER BY title COLLATE NOCASE ASC"),
        }

        let rows = sqlx::query(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(task_from_row).collect())
    }

    /// Mark a task completed and bump `updated_at`, in one transaction.
    ///
    /// Returns the updated record, or `None` if the row is gone. Completing
    /// an already-completed task is a no-op success.
    pub async fn complete_task(&self, owner_id: &str, id: i64) -> Result<Option<Task>> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE tasks SET completed = 1, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(now)
        .bind(id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;
        let task = task_from_row(&row);

        tx.commit().await?;
        Ok(Some(task))
    }

    /// Apply a partial update to a task, in one transaction.
    ///
    /// Outer `Option` means "field was provided". For the description the
    /// inner `Option` is the new value; `Some(None)` clears the column.
    pub async fn update_task_fields(
        &self,
        owner_id: &str,
        id: i64,
        title: Option<&str>,
        description: Option<Option<&str>>,
        completed: Option<bool>,
    ) -> Result<Option<Task>> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let mut sql = String::from("UPDATE tasks SET updated_at = ?");
        if title.is_some() {
            sql.push_str(", title = ?");
        }
        if description.is_some() {
            sql.push_str(", description = ?");
        }
        if completed.is_some() {
            sql.push_str(", completed = ?");
        }
        sql.push_str(" WHERE id = ? AND owner_id = ?");

        let mut query = sqlx::query(&sql).bind(now);
        if let Some(title) = title {
            query = query.bind(title);
        }
        if let Some(description) = description {
            query = query.bind(description);
        }
        if let Some(completed) = completed {
            query = query.bind(completed);
        }
        let result = query.bind(id).bind(owner_id).execute(&mut *tx).await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_one(&mut *tx)
            .await?;
        let task = task_from_row(&row);

        tx.commit().await?;
        Ok(Some(task))
    }

    /// Permanently delete a task. Returns the prior id and title for
    /// confirmation messaging, or `None` if nothing was owned under that id.
    pub async fn delete_task(&self, owner_id: &str, id: i64) -> Result<Option<(i64, String)>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT id, title FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let prior = (row.get::<i64, _>("id"), row.get::<String, _>("title"));

        sqlx::query("DELETE FROM tasks WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(prior))
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Create a fresh conversation for the owner.
    pub async fn create_conversation(&self, owner_id: &str) -> Result<Conversation> {
        let conv = Conversation {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO conversations (id, owner_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(conv.id.to_string())
        .bind(&conv.owner_id)
        .bind(conv.created_at.timestamp())
        .bind(conv.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(conv)
    }

    /// Get a conversation by id, owner-scoped.
    pub async fn get_conversation(&self, owner_id: &str, id: Uuid) -> Result<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| conversation_from_row(&row)))
    }

    /// The most recent `limit` messages of a conversation, oldest first,
    /// ready for transcript replay.
    pub async fn recent_messages(&self, conversation_id: Uuid, limit: i64) -> Result<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages WHERE conversation_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Persist one full chat turn: the user message, the assistant reply,
    /// and the conversation `updated_at` bump, committed as one unit.
    pub async fn append_turn(
        &self,
        conversation_id: Uuid,
        user: &Message,
        assistant: &Message,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for msg in [user, assistant] {
            sqlx::query(
                r#"
                INSERT INTO messages (id, conversation_id, role, content, tool_calls, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(msg.id.to_string())
            .bind(conversation_id.to_string())
            .bind(msg.role.to_string())
            .bind(&msg.content)
            .bind(msg.tool_calls.as_ref().map(ToString::to_string))
            .bind(msg.created_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().timestamp())
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Message count across all conversations.
    pub async fn count_messages(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Task {
    Task {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        description: row.get("description"),
        completed: row.get("completed"),
        created_at: chrono::DateTime::from_timestamp(row.get::<i64, _>("created_at"), 0)
            .unwrap_or_default(),
        updated_at: chrono::DateTime::from_timestamp(row.get::<i64, _>("updated_at"), 0)
            .unwrap_or_default(),
    }
}

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Conversation {
    Conversation {
        id: Uuid::parse_str(row.get::<&str, _>("id")).unwrap_or_default(),
        owner_id: row.get("owner_id"),
        created_at: chrono::DateTime::from_timestamp(row.get::<i64, _>("created_at"), 0)
            .unwrap_or_default(),
        updated_at: chrono::DateTime::from_timestamp(row.get::<i64, _>("updated_at"), 0)
            .unwrap_or_default(),
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        id: Uuid::parse_str(row.get::<&str, _>("id")).unwrap_or_default(),
        conversation_id: Uuid::parse_str(row.get::<&str, _>("conversation_id"))
            .unwrap_or_default(),
        role: MessageRole::from(row.get::<&str, _>("role")),
        content: row.get("content"),
        tool_calls: row
            .get::<Option<String>, _>("tool_calls")
            .and_then(|s| serde_json::from_str(&s).ok()),
        created_at: chrono::DateTime::from_timestamp(row.get::<i64, _>("created_at"), 0)
            .unwrap_or_default(),
    }
}
