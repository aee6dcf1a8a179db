use anyhow::Context;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{ChatMessage, Role};

pub async fn insert_message(
    db: &PgPool,
    user_id: Option<Uuid>,
    session_id: &str,
    role: Role,
    content: &str,
    meta: Value,
) -> anyhow::Result<ChatMessage> {
    let row = sqlx::query_as::<_, ChatMessage>(
        r#"
        INSERT INTO chat_messages (user_id, session_id, role, content, meta)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, session_id, role, content, meta, created_at
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(role.as_str())
    .bind(content)
    .bind(meta)
    .fetch_one(db)
    .await
    .context("insert chat message")?;
    Ok(row)
}

/// Last `limit` messages of a session, oldest first.
pub async fn recent_for_session(
    db: &PgPool,
    user_id: Uuid,
    session_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<ChatMessage>> {
    let rows = sqlx::query_as::<_, ChatMessage>(
        r#"
        SELECT * FROM (
            SELECT id, user_id, session_id, role, content, meta, created_at
              FROM chat_messages
             WHERE user_id = $1 AND session_id = $2
             ORDER BY created_at DESC, id DESC
             LIMIT $3
        ) recent
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .bind(user_id)
    .bind(session_id)
    .bind(limit)
    .fetch_all(db)
    .await
    .context("list chat messages")?;
    Ok(rows)
}
