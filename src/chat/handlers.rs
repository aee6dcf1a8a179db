use std::collections::HashMap;

use axum::{
    extract::State,
    response::Response,
    routing::get,
    Form, Router,
};
use minijinja::context;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{classifier, prompt, repo, repo_types::Role};
use crate::{
    auth::jwt::AuthUser,
    error::AppError,
    mood::{self, repo_types::MoodUpdate},
    state::AppState,
    web::{Flash, Viewer},
};

const HISTORY_LIMIT: i64 = 50;
const TEXT_FIELDS: [&str; 4] = ["message", "text", "prompt", "content"];
const EMPTY_PROMPT: &str = "Please tell me what I can help with today to serve your mental health needs.";

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/", get(chat_page).post(send_message))
}

/// First non-empty field among the accepted names, trimmed.
fn user_text(form: &HashMap<String, String>) -> Option<String> {
    TEXT_FIELDS
        .iter()
        .filter_map(|key| form.get(*key))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn chat_page(
    State(state): State<AppState>,
    user: AuthUser,
    viewer: Viewer,
) -> Result<Response, AppError> {
    let history = repo::recent_for_session(&state.db, user.user_id, &user.session_key(), HISTORY_LIMIT).await?;
    viewer.render(&state, "chat.html", context! { history => history })
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    mut viewer: Viewer,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, AppError> {
    let Some(text) = user_text(&form) else {
        viewer.flash(Flash::error(EMPTY_PROMPT));
        return viewer.render(&state, "chat.html", context! { reply => None::<String> });
    };

    let session_id = user.session_key();
    repo::insert_message(&state.db, Some(user.user_id), &session_id, Role::User, &text, json!({})).await?;

    let detected = classifier::detect_mood(&text);
    if classifier::is_crisis(&text) {
        warn!("crisis language in chat message");
    }

    let messages = prompt::build_messages(&text);
    let (reply, meta) = match state.chat.complete(&messages).await {
        Ok(answer) => {
            let ok = !answer.content.trim().is_empty();
            if !ok {
                warn!(source = answer.source.as_str(), "empty chat completion");
                viewer.flash(Flash::warning("I didn't get a usable response from the chat backend."));
            }
            let meta = json!({
                "source": answer.source.as_str(),
                "ok": ok,
                "model": state.config.chat.model,
            });
            (ok.then_some(answer.content), meta)
        }
        Err(e) => {
            error!(error = %e, "chat backend unavailable");
            viewer.flash(Flash::error(format!("Chat backend error: {e}")));
            (None, json!({ "source": "openai", "ok": false }))
        }
    };

    let reply_text = reply.as_deref().unwrap_or_default();
    repo::insert_message(&state.db, Some(user.user_id), &session_id, Role::Assistant, reply_text, meta).await?;

    if let Some(found) = detected {
        let update = MoodUpdate {
            mood: Some(found.mood),
            note: found.note,
            session_id: &session_id,
            chat_user_text: &text,
            chat_assistant_text: reply_text,
        };
        let entry = mood::repo::upsert_for_day(&state.db, user.user_id, state.today(), &update).await?;
        info!(entry_id = entry.id, mood = found.mood.as_str(), "mood inferred from chat");
    }

    let history = repo::recent_for_session(&state.db, user.user_id, &session_id, HISTORY_LIMIT).await?;
    viewer.render(
        &state,
        "chat.html",
        context! { reply => reply, user_text => text, history => history },
    )
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn text_comes_from_first_non_empty_field() {
        assert_eq!(user_text(&form(&[("text", "  hi  ")])).as_deref(), Some("hi"));
        assert_eq!(
            user_text(&form(&[("message", "   "), ("prompt", "p"), ("content", "c")])).as_deref(),
            Some("p")
        );
        assert_eq!(user_text(&form(&[("other", "x")])), None);
    }

    #[tokio::test]
    async fn chat_requires_login() {
        let app = routes().with_state(testing::fake());
        let res = app
            .oneshot(Request::get("/chat/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login/?next=%2Fchat%2F");
    }

    #[tokio::test]
    async fn blank_message_re_renders_with_prompt() {
        let state = testing::fake();
        let cookie = testing::session_cookie(&state, "sam");
        let app = routes().with_state(state);
        let res = app
            .oneshot(
                Request::post("/chat/")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("message=+++"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("Please tell me what I can help with today"));
    }

    fn post_chat(cookie: &str, body: &'static str) -> Request<Body> {
        Request::post("/chat/")
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn chat_post_stores_both_turns_and_the_days_mood(pool: sqlx::PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let (state, chat) = testing::with_db(pool.clone(), testing::config());
        let cookie = testing::session_cookie_for(&state, user_id, "sam");

        let res = routes()
            .with_state(state.clone())
            .oneshot(post_chat(&cookie, "message=I+feel+anxious+today"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let seen = chat.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][0].role, Role::System);
        assert_eq!(seen[0].last().unwrap().content, "I feel anxious today");

        let rows: Vec<(String, String, String, serde_json::Value)> = sqlx::query_as(
            "SELECT role, content, session_id, meta FROM chat_messages WHERE user_id = $1 ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].0.as_str(), rows[0].1.as_str()), ("user", "I feel anxious today"));
        assert_eq!((rows[1].0.as_str(), rows[1].1.as_str()), ("assistant", testing::FAKE_REPLY));
        assert_eq!(rows[1].3["ok"], json!(true));
        assert_eq!(rows[1].3["source"], json!("openai"));
        assert_eq!(rows[1].3["model"], json!("test-model"));

        let moods: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT mood, session_id, chat_user_text, chat_assistant_text FROM mood_entries WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(moods.len(), 1);
        assert_eq!(moods[0].0, "anxious");
        assert_eq!(moods[0].1, rows[0].2, "mood row shares the chat session");
        assert_eq!(moods[0].2, "I feel anxious today");
        assert_eq!(moods[0].3, testing::FAKE_REPLY);

        // a second detected mood the same day rewrites the row
        let res = routes()
            .with_state(state)
            .oneshot(post_chat(&cookie, "text=so+tired+and+exhausted"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let moods: Vec<(String, String)> =
            sqlx::query_as("SELECT mood, chat_user_text FROM mood_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(moods, vec![("stressed".to_string(), "so tired and exhausted".to_string())]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn neutral_chat_leaves_moods_alone(pool: sqlx::PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let (state, _) = testing::with_db(pool.clone(), testing::config());
        let cookie = testing::session_cookie_for(&state, user_id, "sam");

        let res = routes()
            .with_state(state)
            .oneshot(post_chat(&cookie, "prompt=where+is+the+nearest+vet+center"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mood_entries WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
