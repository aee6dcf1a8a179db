use anyhow::Context;
use sqlx::{PgExecutor, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo_types::{LoginEventKind, NewLoginEvent, Profile, User};

const USER_COLUMNS: &str =
    "id, username, email, first_name, last_name, password_hash, is_staff, created_at, last_login";

/// Fields collected by the signup form.
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub password_hash: &'a str,
    pub phone: &'a str,
}

impl User {
    pub async fn find_by_username(db: &PgPool, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    pub async fn username_taken(db: &PgPool, username: &str) -> anyhow::Result<bool> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(db)
                .await
                .context("check username")?;
        Ok(taken)
    }

    /// Case-insensitive; `except` skips the caller's own row on profile edits.
    pub async fn email_taken(db: &PgPool, email: &str, except: Option<Uuid>) -> anyhow::Result<bool> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                 WHERE lower(email) = lower($1)
                   AND ($2::uuid IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(email)
        .bind(except)
        .fetch_one(db)
        .await
        .context("check email")?;
        Ok(taken)
    }

    /// Inserts the user, its profile and the signup audit row in one transaction.
    pub async fn create_with_profile(
        db: &PgPool,
        new: NewUser<'_>,
        event: NewLoginEvent,
    ) -> anyhow::Result<User> {
        let mut tx = db.begin().await.context("begin tx")?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, first_name, last_name, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(new.username)
        .bind(new.email)
        .bind(new.first_name)
        .bind(new.last_name)
        .bind(new.password_hash)
        .fetch_one(&mut *tx)
        .await
        .context("insert user")?;

        let mut profile = Profile { user_id: user.id, phone: new.phone.to_string(), ..Default::default() };
        profile.sync_from(&user);
        upsert_profile(&mut *tx, &profile).await?;

        record_event(&mut *tx, &NewLoginEvent { user_id: Some(user.id), ..event }).await?;

        tx.commit().await.context("commit tx")?;
        Ok(user)
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .context("update last_login")?;
        Ok(())
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(db)
            .await
            .context("update password")?;
        Ok(())
    }

    /// Profile edit: writes the user's email, then brings the profile in line
    /// with the user row and stores the phone number.
    pub async fn update_contact(
        db: &PgPool,
        id: Uuid,
        email: &str,
        phone: &str,
    ) -> anyhow::Result<(User, Profile)> {
        let mut tx = db.begin().await.context("begin tx")?;

        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(email)
        .fetch_one(&mut *tx)
        .await
        .context("update user email")?;

        let mut profile = load_profile(&mut *tx, id)
            .await?
            .unwrap_or(Profile { user_id: id, ..Default::default() });
        profile.sync_from(&user);
        profile.phone = phone.to_string();
        upsert_profile(&mut *tx, &profile).await?;

        tx.commit().await.context("commit tx")?;
        Ok((user, profile))
    }
}

impl Profile {
    /// Loads the profile, creating and syncing it if the user has none yet.
    pub async fn get_or_create(db: &PgPool, user: &User) -> anyhow::Result<Profile> {
        let existing = load_profile(db, user.id).await?;
        let mut profile = existing.clone().unwrap_or(Profile { user_id: user.id, ..Default::default() });
        if profile.sync_from(user) || existing.is_none() {
            upsert_profile(db, &profile).await?;
        }
        Ok(profile)
    }
}

async fn load_profile<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> anyhow::Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT user_id, first_name, last_name, email, phone FROM profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
    .context("load profile")?;
    Ok(profile)
}

async fn upsert_profile<'e>(db: impl PgExecutor<'e>, profile: &Profile) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO profiles (user_id, first_name, last_name, email, phone)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE
           SET first_name = EXCLUDED.first_name,
               last_name  = EXCLUDED.last_name,
               email      = EXCLUDED.email,
               phone      = EXCLUDED.phone
        "#,
    )
    .bind(profile.user_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.email)
    .bind(&profile.phone)
    .execute(db)
    .await
    .context("upsert profile")?;
    Ok(())
}

pub async fn record_event<'e>(db: impl PgExecutor<'e>, event: &NewLoginEvent) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO login_events (user_id, event, ip_address, user_agent, username_tried)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.user_id)
    .bind(event.kind.as_str())
    .bind(&event.ip_address)
    .bind(&event.user_agent)
    .bind(&event.username_tried)
    .execute(db)
    .await
    .context("insert login event")?;
    Ok(())
}

/// Failed logins recorded for `username` since `since`.
pub async fn failures_since(db: &PgPool, username: &str, since: OffsetDateTime) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM login_events
         WHERE event = $1 AND username_tried = $2 AND timestamp >= $3
        "#,
    )
    .bind(LoginEventKind::LoginFailure.as_str())
    .bind(username)
    .bind(since)
    .fetch_one(db)
    .await
    .context("count login failures")?;
    Ok(count)
}
