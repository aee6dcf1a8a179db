use anyhow::Context;
use sqlx::PgPool;

use super::dto::{ChatMessageRow, LoginEventRow, MoodEntryRow};

/// Newest first. `pattern` matches username, note or session id.
pub async fn mood_entries(
    db: &PgPool,
    pattern: Option<&str>,
    mood: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<MoodEntryRow>> {
    let rows = sqlx::query_as::<_, MoodEntryRow>(
        r#"
        SELECT m.id, u.username, m.mood, m.note, m.session_id, m.day, m.created_at
          FROM mood_entries m
          JOIN users u ON u.id = m.user_id
         WHERE ($1::text IS NULL OR u.username ILIKE $1 OR m.note ILIKE $1 OR m.session_id ILIKE $1)
           AND ($2::text IS NULL OR m.mood = $2)
         ORDER BY m.created_at DESC, m.id DESC
         LIMIT $3 OFFSET $4
        "#,
    )
    .bind(pattern)
    .bind(mood)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("admin list mood entries")?;
    Ok(rows)
}

pub async fn login_events(
    db: &PgPool,
    pattern: Option<&str>,
    event: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<LoginEventRow>> {
    let rows = sqlx::query_as::<_, LoginEventRow>(
        r#"
        SELECT e.id, e.user_id, u.username, e.event, e.ip_address, e.user_agent,
               e.username_tried, e.timestamp
          FROM login_events e
          LEFT JOIN users u ON u.id = e.user_id
         WHERE ($1::text IS NULL OR u.username ILIKE $1 OR e.username_tried ILIKE $1
                OR e.ip_address ILIKE $1 OR e.user_agent ILIKE $1)
           AND ($2::text IS NULL OR e.event = $2)
         ORDER BY e.timestamp DESC, e.id DESC
         LIMIT $3 OFFSET $4
        "#,
    )
    .bind(pattern)
    .bind(event)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("admin list login events")?;
    Ok(rows)
}

pub async fn chat_messages(
    db: &PgPool,
    pattern: Option<&str>,
    role: Option<&str>,
    limit: i64,
    offset: i64,
) -> anyhow::Result<Vec<ChatMessageRow>> {
    let rows = sqlx::query_as::<_, ChatMessageRow>(
        r#"
        SELECT c.id, u.username, c.session_id, c.role, c.content, c.meta, c.created_at
          FROM chat_messages c
          LEFT JOIN users u ON u.id = c.user_id
         WHERE ($1::text IS NULL OR u.username ILIKE $1 OR c.content ILIKE $1 OR c.session_id ILIKE $1)
           AND ($2::text IS NULL OR c.role = $2)
         ORDER BY c.created_at DESC, c.id DESC
         LIMIT $3 OFFSET $4
        "#,
    )
    .bind(pattern)
    .bind(role)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("admin list chat messages")?;
    Ok(rows)
}
