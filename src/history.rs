use crate::language::Language;
use crate::types::{Message, Role, VaidyaError, Result};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

pub type DbPool = SqlitePool;

pub async fn init_db<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let path_str = match path.as_ref().to_str() {
        Some(s) => s,
        None => {
            return Err(VaidyaError::Internal(
                "Invalid database path: Path contains non-UTF8 characters".to_string(),
                tracing_error::SpanTrace::capture(),
            )
            .into())
        }
    };
    let url = format!("sqlite:{}?mode=rwc", path_str);

    let pool = SqlitePool::connect(&url).await?;
    configure_db(&pool).await?;

    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        return Err(VaidyaError::Internal(
            format!("Migration failed: {}", e),
            tracing_error::SpanTrace::capture(),
        )
        .into());
    }

    verify_schema_version(&pool).await;
    Ok(pool)
}

async fn configure_db(pool: &DbPool) -> Result<()> {
    let pragmas = [
        "PRAGMA journal_mode = WAL",
        "PRAGMA synchronous = NORMAL",
        "PRAGMA busy_timeout = 5000",
    ];

    for pragma in pragmas {
        sqlx::query(pragma).execute(pool).await?;
    }
    Ok(())
}

async fn verify_schema_version(pool: &DbPool) {
    let version_row: std::result::Result<(String,), sqlx::Error> =
        sqlx::query_as("SELECT value FROM schema_metadata WHERE key = 'schema_version'")
            .fetch_one(pool)
            .await;

    match version_row {
        Ok((version,)) => {
            tracing::info!("History database ready. Schema version: {}", version);
        }
        Err(e) => {
            tracing::warn!("Could not verify schema version: {}", e);
        }
    }
}

/// Messages for one (user, language) pair, oldest first.
pub async fn load_history(pool: &DbPool, user_id: &str, language: Language) -> Result<Vec<Message>> {
    let rows = sqlx::query(
        "SELECT role, content FROM chat_history \
         WHERE user_id = ? AND language = ? \
         ORDER BY created_at ASC, id ASC",
    )
    .bind(user_id)
    .bind(language.as_str())
    .fetch_all(pool)
    .await?;

    let mut messages = Vec::with_capacity(rows.len());
    for row in rows {
        let role: String = row.get("role");
        let content: String = row.get("content");
        messages.push(Message {
            role: role.parse::<Role>()?,
            content,
        });
    }
    Ok(messages)
}

pub async fn append_message(
    pool: &DbPool,
    user_id: &str,
    language: Language,
    message: &Message,
) -> Result<()> {
    let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
    sqlx::query(
        "INSERT INTO chat_history (user_id, language, role, content, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(language.as_str())
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes one (user, language) history. Returns the number of rows removed.
pub async fn clear_history(pool: &DbPool, user_id: &str, language: Language) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM chat_history WHERE user_id = ? AND language = ?")
        .bind(user_id)
        .bind(language.as_str())
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected())
}
