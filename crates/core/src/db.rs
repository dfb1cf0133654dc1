use coral_shared::{AgentRecord, MessageRecord, ThreadRecord};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::info;

const DB_TIMEOUT_SECS: u64 = 10;
const MIGRATION_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_MESSAGE_LIMIT: i64 = 100;
pub const MAX_MESSAGE_LIMIT: i64 = 1_000;

pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INACTIVE: &str = "inactive";

/// Run a database future under [`DB_TIMEOUT_SECS`], labelling failures with `what`.
async fn bounded<T, F>(what: &str, fut: F) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    timeout(Duration::from_secs(DB_TIMEOUT_SECS), fut)
        .await
        .map_err(|_| anyhow::anyhow!("Database operation timed out after {}s", DB_TIMEOUT_SECS))?
        .map_err(|e| anyhow::anyhow!("Failed to {}: {}", what, e))
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    info!("Running database migrations...");

    let migration_future = sqlx::migrate!("./migrations").run(pool);
    timeout(
        Duration::from_secs(MIGRATION_TIMEOUT_SECS),
        migration_future,
    )
    .await
    .map_err(|_| {
        anyhow::anyhow!(
            "Database migrations timed out after {}s",
            MIGRATION_TIMEOUT_SECS
        )
    })?
    .map_err(|e| anyhow::anyhow!("Database migration failed: {}", e))?;

    Ok(())
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AgentRow {
    pub id: String,
    pub description: Option<String>,
    pub status: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ThreadRow {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub sender_id: Option<String>,
    pub receiver_id: Option<String>,
    pub content: Option<String>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MirrorStats {
    pub agent_count: i64,
    pub thread_count: i64,
    pub message_count: i64,
    pub message_types: BTreeMap<String, i64>,
    /// Messages mirrored within the last hour.
    pub recent_activity: i64,
}

pub async fn upsert_agent(pool: &SqlitePool, agent: &AgentRecord) -> anyhow::Result<()> {
    bounded(
        &format!("upsert agent '{}'", agent.id),
        sqlx::query(
            "INSERT OR REPLACE INTO agents (id, description, status, last_seen) \
             VALUES (?, ?, ?, datetime('now'))",
        )
        .bind(&agent.id)
        .bind(&agent.description)
        .bind(STATUS_ACTIVE)
        .execute(pool),
    )
    .await?;
    Ok(())
}

/// Agents not seen within `threshold` become inactive. Returns how many changed.
pub async fn mark_stale_agents(pool: &SqlitePool, threshold: Duration) -> anyhow::Result<u64> {
    let modifier = format!("-{} seconds", threshold.as_secs());
    let result = bounded(
        "mark stale agents",
        sqlx::query(
            "UPDATE agents SET status = ? \
             WHERE status != ? AND last_seen < datetime('now', ?)",
        )
        .bind(STATUS_INACTIVE)
        .bind(STATUS_INACTIVE)
        .bind(modifier)
        .execute(pool),
    )
    .await?;
    Ok(result.rows_affected())
}

/// Insert a thread unless it already exists. The first name seen wins.
pub async fn insert_thread(pool: &SqlitePool, thread: &ThreadRecord) -> anyhow::Result<bool> {
    let result = bounded(
        &format!("insert thread '{}'", thread.id),
        sqlx::query(
            "INSERT OR IGNORE INTO threads (id, name, created_at) VALUES (?, ?, datetime('now'))",
        )
        .bind(&thread.id)
        .bind(&thread.name)
        .execute(pool),
    )
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Store a message under its fingerprint, creating a placeholder thread
/// first if needed. Returns `Some(id)` only when the row is new.
pub async fn insert_message(
    pool: &SqlitePool,
    message: &MessageRecord,
) -> anyhow::Result<Option<String>> {
    let id = message.fingerprint();
    let placeholder = ThreadRecord::placeholder(&message.thread_id);
    let content = message.content_text();

    let inserted = bounded(&format!("insert message into thread '{}'", message.thread_id), async {
        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT OR IGNORE INTO threads (id, name, created_at) VALUES (?, ?, datetime('now'))",
        )
        .bind(&placeholder.id)
        .bind(&placeholder.name)
        .execute(&mut *tx)
        .await?;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO messages \
             (id, thread_id, sender_id, receiver_id, content, type, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        )
        .bind(&id)
        .bind(&message.thread_id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&content)
        .bind(&message.message_type)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok::<_, sqlx::Error>(result.rows_affected() > 0)
    })
    .await?;

    Ok(inserted.then_some(id))
}

pub async fn list_agents(pool: &SqlitePool) -> anyhow::Result<Vec<AgentRow>> {
    bounded(
        "list agents",
        sqlx::query_as::<_, AgentRow>(
            "SELECT id, description, status, last_seen FROM agents \
             ORDER BY last_seen DESC, id ASC",
        )
        .fetch_all(pool),
    )
    .await
}

pub async fn list_threads(pool: &SqlitePool) -> anyhow::Result<Vec<ThreadRow>> {
    bounded(
        "list threads",
        sqlx::query_as::<_, ThreadRow>(
            "SELECT id, name, created_at FROM threads ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(pool),
    )
    .await
}

/// With a thread: that thread's latest `limit` messages (all when `None`),
/// oldest first. Without: the most recent `limit` messages newest first.
pub async fn list_messages(
    pool: &SqlitePool,
    thread_id: Option<&str>,
    limit: Option<i64>,
) -> anyhow::Result<Vec<MessageRow>> {
    let limit = limit.map(|l| l.clamp(1, MAX_MESSAGE_LIMIT));
    match thread_id {
        Some(thread_id) => {
            bounded(
                &format!("list messages for thread '{thread_id}'"),
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, thread_id, sender_id, receiver_id, content, type, timestamp \
                     FROM (SELECT rowid AS seq, * FROM messages WHERE thread_id = ? \
                           ORDER BY timestamp DESC, rowid DESC LIMIT ?) \
                     ORDER BY timestamp ASC, seq ASC",
                )
                .bind(thread_id)
                .bind(limit.unwrap_or(-1))
                .fetch_all(pool),
            )
            .await
        }
        None => {
            bounded(
                "list recent messages",
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, thread_id, sender_id, receiver_id, content, type, timestamp \
                     FROM messages ORDER BY timestamp DESC, rowid DESC LIMIT ?",
                )
                .bind(limit.unwrap_or(DEFAULT_MESSAGE_LIMIT))
                .fetch_all(pool),
            )
            .await
        }
    }
}

pub async fn stats(pool: &SqlitePool) -> anyhow::Result<MirrorStats> {
    let count = |sql: &'static str| async move {
        bounded("count rows", sqlx::query_scalar::<_, i64>(sql).fetch_one(pool)).await
    };

    let agent_count = count("SELECT COUNT(*) FROM agents").await?;
    let thread_count = count("SELECT COUNT(*) FROM threads").await?;
    let message_count = count("SELECT COUNT(*) FROM messages").await?;
    let recent_activity =
        count("SELECT COUNT(*) FROM messages WHERE timestamp > datetime('now', '-1 hour')").await?;

    let message_types = bounded(
        "count message types",
        sqlx::query_as::<_, (String, i64)>("SELECT type, COUNT(*) FROM messages GROUP BY type")
            .fetch_all(pool),
    )
    .await?
    .into_iter()
    .collect();

    Ok(MirrorStats {
        agent_count,
        thread_count,
        message_count,
        message_types,
        recent_activity,
    })
}
