//! Integration tests for database operations.

use chrono::Utc;
use taskr_core::Database;
use taskr_core::models::{Message, MessageRole, SortKey, StatusFilter};
use uuid::Uuid;

fn temp_db_path() -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    let filename = format!("taskr-test-{}.db", Uuid::new_v4());
    path.push(filename);
    path
}

// ============================================================================
// Task Operations
// ============================================================================

#[tokio::test]
async fn insert_task_returns_full_record() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db
        .insert_task("u1", "buy milk", Some("two liters"))
        .await
        .expect("insert");

    assert!(task.id > 0);
    assert_eq!(task.owner_id, "u1");
    assert_eq!(task.title, "buy milk");
    assert_eq!(task.description, Some("two liters".to_string()));
    assert!(!task.completed);
}

#[tokio::test]
async fn get_task_is_owner_scoped() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db.insert_task("u1", "buy milk", None).await.expect("insert");

    assert!(db.get_task("u1", task.id).await.expect("get").is_some());
    assert!(db.get_task("u2", task.id).await.expect("get").is_none());
}

#[tokio::test]
async fn list_tasks_never_crosses_owners() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    db.insert_task("alice", "alice task", None)
        .await
        .expect("insert");
    db.insert_task("bob", "bob task", None).await.expect("insert");

    let alice_tasks = db
        .list_tasks("alice", StatusFilter::All, SortKey::CreatedAt)
        .await
        .expect("list");
    assert_eq!(alice_tasks.len(), 1);
    assert_eq!(alice_tasks[0].title, "alice task");

    let bob_tasks = db
        .list_tasks("bob", StatusFilter::All, SortKey::CreatedAt)
        .await
        .expect("list");
    assert_eq!(bob_tasks.len(), 1);
    assert_eq!(bob_tasks[0].title, "bob task");
}

#[tokio::test]
async fn list_tasks_newest_first() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    // Same-second inserts; the id tiebreak keeps the order stable.
    db.insert_task("u1", "first", None).await.expect("insert");
    db.insert_task("u1", "second", None).await.expect("insert");
    db.insert_task("u1", "third", None).await.expect("insert");

    let tasks = db
        .list_tasks("u1", StatusFilter::All, SortKey::CreatedAt)
        .await
        .expect("list");
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["third", "second", "first"]);
}

#[tokio::test]
async fn list_tasks_status_filters() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let done = db.insert_task("u1", "done task", None).await.expect("insert");
    db.insert_task("u1", "open task", None).await.expect("insert");
    db.complete_task("u1", done.id).await.expect("complete");

    let completed = db
        .list_tasks("u1", StatusFilter::Completed, SortKey::CreatedAt)
        .await
        .expect("list");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].title, "done task");

    let incomplete = db
        .list_tasks("u1", StatusFilter::Incomplete, SortKey::CreatedAt)
        .await
        .expect("list");
    assert_eq!(incomplete.len(), 1);
    assert_eq!(incomplete[0].title, "open task");

    let all = db
        .list_tasks("u1", StatusFilter::All, SortKey::CreatedAt)
        .await
        .expect("list");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn list_tasks_sorted_by_title() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    db.insert_task("u1", "zebra", None).await.expect("insert");
    db.insert_task("u1", "Apple", None).await.expect("insert");
    db.insert_task("u1", "mango", None).await.expect("insert");

    let tasks = db
        .list_tasks("u1", StatusFilter::All, SortKey::Title)
        .await
        .expect("list");
    let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Apple", "mango", "zebra"]);
}

#[tokio::test]
async fn find_task_by_exact_title_ignores_case() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    db.insert_task("u1", "Buy Milk", None).await.expect("insert");

    let found = db
        .find_task_by_exact_title("u1", "buy milk")
        .await
        .expect("find");
    assert!(found.is_some());

    // Substrings are not exact matches.
    let not_found = db
        .find_task_by_exact_title("u1", "milk")
        .await
        .expect("find");
    assert!(not_found.is_none());

    // Other owners never match.
    let foreign = db
        .find_task_by_exact_title("u2", "buy milk")
        .await
        .expect("find");
    assert!(foreign.is_none());
}

#[tokio::test]
async fn find_tasks_by_fragment_stable_order() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let a = db
        .insert_task("u1", "make dinner", None)
        .await
        .expect("insert");
    let b = db
        .insert_task("u1", "mke dinner", None)
        .await
        .expect("insert");
    db.insert_task("u1", "walk dog", None).await.expect("insert");

    let matches = db
        .find_tasks_by_title_fragment("u1", "DINNER")
        .await
        .expect("find");
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, a.id);
    assert_eq!(matches[1].id, b.id);
}

#[tokio::test]
async fn fragment_wildcards_match_literally() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    db.insert_task("u1", "review 100% coverage", None)
        .await
        .expect("insert");
    db.insert_task("u1", "review budget", None)
        .await
        .expect("insert");

    // A literal `%` in the fragment must not act as a LIKE wildcard.
    let matches = db
        .find_tasks_by_title_fragment("u1", "100%")
        .await
        .expect("find");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].title, "review 100% coverage");
}

#[tokio::test]
async fn complete_task_sets_flag_and_bumps_updated_at() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db.insert_task("u1", "buy milk", None).await.expect("insert");
    let updated = db
        .complete_task("u1", task.id)
        .await
        .expect("complete")
        .expect("exists");

    assert!(updated.completed);
    assert!(updated.updated_at >= task.updated_at);
}

#[tokio::test]
async fn complete_task_foreign_owner_is_none() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db.insert_task("u1", "buy milk", None).await.expect("insert");
    let result = db.complete_task("u2", task.id).await.expect("complete");
    assert!(result.is_none());

    // And the row is untouched.
    let unchanged = db.get_task("u1", task.id).await.expect("get").expect("exists");
    assert!(!unchanged.completed);
}

#[tokio::test]
async fn update_task_fields_partial() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db
        .insert_task("u1", "old title", Some("keep me"))
        .await
        .expect("insert");

    // Title only: description untouched.
    let updated = db
        .update_task_fields("u1", task.id, Some("new title"), None, None)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(updated.title, "new title");
    assert_eq!(updated.description, Some("keep me".to_string()));

    // Clearing the description.
    let cleared = db
        .update_task_fields("u1", task.id, None, Some(None), None)
        .await
        .expect("update")
        .expect("exists");
    assert_eq!(cleared.title, "new title");
    assert_eq!(cleared.description, None);
}

#[tokio::test]
async fn delete_task_returns_prior_identity() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let task = db.insert_task("u1", "buy milk", None).await.expect("insert");
    let prior = db
        .delete_task("u1", task.id)
        .await
        .expect("delete")
        .expect("existed");
    assert_eq!(prior, (task.id, "buy milk".to_string()));

    assert!(db.get_task("u1", task.id).await.expect("get").is_none());
    assert!(db.delete_task("u1", task.id).await.expect("delete").is_none());
}

// ============================================================================
// Conversations & Messages
// ============================================================================

fn message(conversation_id: Uuid, role: MessageRole, content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        conversation_id,
        role,
        content: content.to_string(),
        tool_calls: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn create_and_get_conversation_owner_scoped() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let conv = db.create_conversation("u1").await.expect("create");

    assert!(
        db.get_conversation("u1", conv.id)
            .await
            .expect("get")
            .is_some()
    );
    assert!(
        db.get_conversation("u2", conv.id)
            .await
            .expect("get")
            .is_none()
    );
}

#[tokio::test]
async fn append_turn_persists_both_messages_and_bumps_conversation() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let conv = db.create_conversation("u1").await.expect("create");
    let user = message(conv.id, MessageRole::User, "add buy milk");
    let assistant = Message {
        tool_calls: Some(serde_json::json!([{"name": "add_task"}])),
        ..message(conv.id, MessageRole::Assistant, "Added task 1 'buy milk'")
    };

    db.append_turn(conv.id, &user, &assistant)
        .await
        .expect("append");

    let messages = db.recent_messages(conv.id, 50).await.expect("messages");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages[1].tool_calls.is_some());

    let bumped = db
        .get_conversation("u1", conv.id)
        .await
        .expect("get")
        .expect("exists");
    assert!(bumped.updated_at >= conv.updated_at);
}

#[tokio::test]
async fn recent_messages_keeps_latest_oldest_first() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    let conv = db.create_conversation("u1").await.expect("create");
    for i in 0..6 {
        let user = message(conv.id, MessageRole::User, &format!("user {i}"));
        let assistant = message(conv.id, MessageRole::Assistant, &format!("assistant {i}"));
        db.append_turn(conv.id, &user, &assistant)
            .await
            .expect("append");
    }

    // 12 messages stored; a limit of 4 returns the last two turns, in order.
    let recent = db.recent_messages(conv.id, 4).await.expect("messages");
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["user 4", "assistant 4", "user 5", "assistant 5"]);
}

#[tokio::test]
async fn count_messages_accurate() {
    let db = Database::open(&temp_db_path()).await.expect("open db");

    assert_eq!(db.count_messages().await.expect("count"), 0);

    let conv = db.create_conversation("u1").await.expect("create");
    let user = message(conv.id, MessageRole::User, "hello");
    let assistant = message(conv.id, MessageRole::Assistant, "hi");
    db.append_turn(conv.id, &user, &assistant)
        .await
        .expect("append");

    assert_eq!(db.count_messages().await.expect("count"), 2);
}

// ============================================================================
// Database Lifecycle
// ============================================================================

#[tokio::test]
async fn database_creates_parent_directories() {
    let mut path = std::env::temp_dir();
    path.push(format!("taskr-nested/{}/test.db", Uuid::new_v4()));

    let db = Database::open(&path).await.expect("open");
    assert!(path.exists());
    db.close().await;
}
