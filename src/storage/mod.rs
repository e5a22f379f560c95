use anyhow::{Context as _, Result};
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRow {
    pub id: String,
    /// Workspace root the conversation belongs to. One thread per workspace.
    pub workspace: String,
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountLinkRow {
    pub workspace: String,
    pub user_id: String,
    /// Access token derived for this workspace. Sent upstream as a Bearer.
    pub token: String,
    pub linked_at: String,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it are
    /// logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("vicod.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("src/storage/migrations")
            .run(pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    // ─── Chat messages ──────────────────────────────────────────────────────

    pub async fn create_chat_message(
        &self,
        workspace: &str,
        role: &str,
        content: &str,
    ) -> Result<ChatMessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO chat_messages (id, workspace, role, content, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(workspace)
        .bind(role)
        .bind(content)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_chat_message(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("chat message not found after insert"))
    }

    pub async fn get_chat_message(&self, id: &str) -> Result<Option<ChatMessageRow>> {
        Ok(sqlx::query_as("SELECT * FROM chat_messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// The last `limit` messages for a workspace, oldest first.
    ///
    /// The inner query selects the newest rows with a composite
    /// (created_at DESC, id DESC) ordering so ties are broken
    /// deterministically, then flips to ASC for replay order.
    pub async fn recent_chat_messages(
        &self,
        workspace: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessageRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM (
                     SELECT * FROM chat_messages
                     WHERE workspace = ?
                     ORDER BY created_at DESC, id DESC LIMIT ?
                 ) ORDER BY created_at ASC, id ASC",
            )
            .bind(workspace)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn count_chat_messages(&self, workspace: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM chat_messages WHERE workspace = ?")
            .bind(workspace)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    /// Delete the whole conversation for a workspace. Returns rows removed.
    pub async fn clear_chat_messages(&self, workspace: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE workspace = ?")
            .bind(workspace)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ─── Account links ──────────────────────────────────────────────────────

    /// Insert or replace the account link for a workspace.
    pub async fn upsert_account_link(
        &self,
        workspace: &str,
        user_id: &str,
        token: &str,
    ) -> Result<AccountLinkRow> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO accounts (workspace, user_id, token, linked_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(workspace) DO UPDATE SET
                 user_id = excluded.user_id,
                 token = excluded.token,
                 linked_at = excluded.linked_at",
        )
        .bind(workspace)
        .bind(user_id)
        .bind(token)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        self.get_account_link(workspace)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account link not found after upsert"))
    }

    pub async fn get_account_link(&self, workspace: &str) -> Result<Option<AccountLinkRow>> {
        Ok(sqlx::query_as("SELECT * FROM accounts WHERE workspace = ?")
            .bind(workspace)
            .fetch_optional(&self.pool)
            .await?)
    }
}
