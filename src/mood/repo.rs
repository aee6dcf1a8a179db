use anyhow::Context;
use sqlx::{PgConnection, PgPool};
use time::Date;
use uuid::Uuid;

use super::repo_types::{Mood, MoodEntry, MoodUpdate};

const COLUMNS: &str =
    "id, user_id, mood, note, session_id, day, chat_user_text, chat_assistant_text, created_at";

pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<MoodEntry>> {
    let rows = sqlx::query_as::<_, MoodEntry>(&format!(
        "SELECT {COLUMNS} FROM mood_entries WHERE user_id = $1 ORDER BY created_at ASC, id ASC"
    ))
    .bind(user_id)
    .fetch_all(db)
    .await
    .context("list mood entries")?;
    Ok(rows)
}

/// Serialises writers for one (user, day) so the upsert never forks a second row.
async fn lock_day(conn: &mut PgConnection, user_id: Uuid, day: Date) -> anyhow::Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("mood:{user_id}:{day}"))
        .execute(conn)
        .await
        .context("lock mood day")?;
    Ok(())
}

async fn find_for_day(
    conn: &mut PgConnection,
    user_id: Uuid,
    day: Date,
) -> anyhow::Result<Option<MoodEntry>> {
    let row = sqlx::query_as::<_, MoodEntry>(&format!(
        r#"
        SELECT {COLUMNS} FROM mood_entries
         WHERE user_id = $1 AND day = $2
         ORDER BY created_at DESC
         LIMIT 1
        "#
    ))
    .bind(user_id)
    .bind(day)
    .fetch_optional(conn)
    .await
    .context("find mood entry for day")?;
    Ok(row)
}

async fn insert(
    conn: &mut PgConnection,
    user_id: Uuid,
    day: Date,
    mood: Mood,
    update: &MoodUpdate<'_>,
) -> anyhow::Result<MoodEntry> {
    let row = sqlx::query_as::<_, MoodEntry>(&format!(
        r#"
        INSERT INTO mood_entries
            (user_id, mood, note, session_id, day, chat_user_text, chat_assistant_text)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(mood.as_str())
    .bind(update.note)
    .bind(update.session_id)
    .bind(day)
    .bind(update.chat_user_text)
    .bind(update.chat_assistant_text)
    .fetch_one(conn)
    .await
    .context("insert mood entry")?;
    Ok(row)
}

/// Writes the day's mood: overwrites the existing row, or creates one
/// (defaulting to `ok` when `update.mood` is unset). Empty session and chat
/// texts leave the stored values alone.
pub async fn upsert_for_day(
    db: &PgPool,
    user_id: Uuid,
    day: Date,
    update: &MoodUpdate<'_>,
) -> anyhow::Result<MoodEntry> {
    let mut tx = db.begin().await.context("begin tx")?;
    lock_day(&mut tx, user_id, day).await?;

    let entry = match find_for_day(&mut tx, user_id, day).await? {
        Some(existing) => sqlx::query_as::<_, MoodEntry>(&format!(
            r#"
            UPDATE mood_entries
               SET mood = $2,
                   note = $3,
                   session_id = CASE WHEN $4 = '' THEN session_id ELSE $4 END,
                   chat_user_text = CASE WHEN $5 = '' THEN chat_user_text ELSE $5 END,
                   chat_assistant_text = CASE WHEN $6 = '' THEN chat_assistant_text ELSE $6 END
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(existing.id)
        .bind(update.mood.map(Mood::as_str).unwrap_or(existing.mood.as_str()))
        .bind(update.note)
        .bind(update.session_id)
        .bind(update.chat_user_text)
        .bind(update.chat_assistant_text)
        .fetch_one(&mut *tx)
        .await
        .context("update mood entry")?,
        None => insert(&mut tx, user_id, day, update.mood.unwrap_or(Mood::Ok), update).await?,
    };

    tx.commit().await.context("commit tx")?;
    Ok(entry)
}

/// Adds a line to the day's note, keeping its mood; creates an `ok` row if
/// the day has none.
pub async fn append_note_for_day(
    db: &PgPool,
    user_id: Uuid,
    day: Date,
    line: &str,
    session_id: &str,
) -> anyhow::Result<MoodEntry> {
    let mut tx = db.begin().await.context("begin tx")?;
    lock_day(&mut tx, user_id, day).await?;

    let entry = match find_for_day(&mut tx, user_id, day).await? {
        Some(existing) => {
            let note = if existing.note.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}\n{}", existing.note.trim_end(), line)
            };
            sqlx::query_as::<_, MoodEntry>(&format!(
                "UPDATE mood_entries SET note = $2 WHERE id = $1 RETURNING {COLUMNS}"
            ))
            .bind(existing.id)
            .bind(note)
            .fetch_one(&mut *tx)
            .await
            .context("append mood note")?
        }
        None => {
            let update = MoodUpdate { note: line, session_id, ..Default::default() };
            insert(&mut tx, user_id, day, Mood::Ok, &update).await?
        }
    };

    tx.commit().await.context("commit tx")?;
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::state::testing;

    async fn day_count(db: &PgPool, user_id: Uuid, day: Date) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM mood_entries WHERE user_id = $1 AND day = $2")
            .bind(user_id)
            .bind(day)
            .fetch_one(db)
            .await
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_keeps_one_row_per_day(pool: PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let day = date!(2024 - 03 - 10);

        let first = MoodUpdate {
            mood: Some(Mood::Anxious),
            note: "from chat",
            session_id: "abc",
            chat_user_text: "so anxious",
            chat_assistant_text: "breathe with me",
        };
        let created = upsert_for_day(&pool, user_id, day, &first).await.unwrap();
        assert_eq!(created.mood, "anxious");

        let second = MoodUpdate { mood: Some(Mood::Good), note: "better now", ..Default::default() };
        let updated = upsert_for_day(&pool, user_id, day, &second).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.mood, "good");
        assert_eq!(updated.note, "better now");
        assert_eq!(updated.session_id, "abc", "empty session id keeps the stored one");
        assert_eq!(updated.chat_user_text, "so anxious");
        assert_eq!(updated.chat_assistant_text, "breathe with me");
        assert_eq!(day_count(&pool, user_id, day).await, 1);

        let next_day = date!(2024 - 03 - 11);
        upsert_for_day(&pool, user_id, next_day, &second).await.unwrap();
        assert_eq!(day_count(&pool, user_id, next_day).await, 1);
        assert_eq!(list_for_user(&pool, user_id).await.unwrap().len(), 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_without_mood_defaults_to_ok(pool: PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let entry = upsert_for_day(&pool, user_id, date!(2024 - 03 - 10), &MoodUpdate::default())
            .await
            .unwrap();
        assert_eq!(entry.mood, "ok");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_upserts_do_not_fork_the_day(pool: PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let day = date!(2024 - 03 - 10);
        let update = MoodUpdate { mood: Some(Mood::Sad), ..Default::default() };

        let (a, b) = tokio::join!(
            upsert_for_day(&pool, user_id, day, &update),
            upsert_for_day(&pool, user_id, day, &update),
        );
        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(day_count(&pool, user_id, day).await, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn note_lines_append_to_the_days_row(pool: PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let day = date!(2024 - 03 - 10);

        let created = append_note_for_day(&pool, user_id, day, "Exercise completed: sleep", "s1")
            .await
            .unwrap();
        assert_eq!(created.mood, "ok");
        assert_eq!(created.session_id, "s1");

        let update = MoodUpdate { mood: Some(Mood::Stressed), note: "rough shift", ..Default::default() };
        upsert_for_day(&pool, user_id, day, &update).await.unwrap();

        let appended = append_note_for_day(&pool, user_id, day, "Exercise completed: breathing", "s1")
            .await
            .unwrap();
        assert_eq!(appended.id, created.id);
        assert_eq!(appended.mood, "stressed");
        assert_eq!(appended.note, "rough shift\nExercise completed: breathing");
        assert_eq!(day_count(&pool, user_id, day).await, 1);
    }
}
