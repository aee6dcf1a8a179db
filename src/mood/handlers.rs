use axum::{
    extract::State,
    response::Response,
    routing::{get, post},
    Form, Json, Router,
};
use minijinja::Value;
use serde_json::json;
use tracing::{info, instrument, warn};

use super::{
    dto::{Dashboard, ExerciseForm, MoodForm},
    repo,
    repo_types::{Exercise, Mood, MoodUpdate},
    services,
};
use crate::{
    auth::jwt::AuthUser,
    chat::{repo as chat_repo, repo_types::Role},
    error::AppError,
    state::AppState,
    web::{flash, Flash, Viewer},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/mood/", get(dashboard))
        .route("/mood/add/", post(add_mood))
        .route("/api/mood", get(mood_json))
        .route("/exercise/complete/", post(complete_exercise))
}

async fn load_dashboard(state: &AppState, user: &AuthUser) -> Result<Dashboard, AppError> {
    let entries = repo::list_for_user(&state.db, user.user_id).await?;
    Ok(services::dashboard(entries, state.today()))
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    viewer: Viewer,
) -> Result<Response, AppError> {
    let view = load_dashboard(&state, &user).await?;
    viewer.render(&state, "mood_dashboard.html", Value::from_serialize(&view))
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn mood_json(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Dashboard>, AppError> {
    Ok(Json(load_dashboard(&state, &user).await?))
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn add_mood(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<MoodForm>,
) -> Result<Response, AppError> {
    let secure = state.secure_cookies();
    let mood = if form.mood.trim().is_empty() {
        Mood::Ok
    } else {
        match Mood::parse(&form.mood) {
            Some(m) => m,
            None => {
                warn!(mood = %form.mood, "rejected unknown mood");
                let msg = Flash::error(format!("\"{}\" is not a valid mood.", form.mood.trim()));
                return Ok(flash::redirect_with("/mood/", &[msg], secure));
            }
        }
    };

    let session_id = user.session_key();
    let update = MoodUpdate {
        mood: Some(mood),
        note: form.note.trim(),
        session_id: &session_id,
        ..Default::default()
    };
    let entry = repo::upsert_for_day(&state.db, user.user_id, state.today(), &update).await?;
    info!(entry_id = entry.id, mood = mood.as_str(), "mood saved");

    Ok(flash::redirect_with("/mood/", &[Flash::success("Mood saved.")], secure))
}

#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn complete_exercise(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<ExerciseForm>,
) -> Result<Response, AppError> {
    let secure = state.secure_cookies();
    let Some(exercise) = Exercise::parse(&form.exercise) else {
        warn!(exercise = %form.exercise, "unknown exercise");
        return Ok(flash::redirect_with("/chat/", &[Flash::error("Unknown exercise.")], secure));
    };

    let session_id = user.session_key();
    let line = format!("Exercise completed: {}", exercise.as_str());
    chat_repo::insert_message(
        &state.db,
        Some(user.user_id),
        &session_id,
        Role::System,
        &line,
        json!({ "exercise_completed": exercise.as_str() }),
    )
    .await?;
    repo::append_note_for_day(&state.db, user.user_id, state.today(), &line, &session_id).await?;
    info!(exercise = exercise.as_str(), "exercise completed");

    let msg = Flash::success(format!("Nice work finishing the {} exercise.", exercise.as_str()));
    Ok(flash::redirect_with("/chat/", &[msg], secure))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::state::testing;

    #[tokio::test]
    async fn dashboard_requires_login() {
        let app = super::routes().with_state(testing::fake());
        let res = app
            .oneshot(Request::get("/mood/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/login/?next=%2Fmood%2F");
    }

    #[tokio::test]
    async fn unknown_mood_is_rejected_before_touching_the_db() {
        let state = testing::fake();
        let cookie = testing::session_cookie(&state, "sam");
        let app = super::routes().with_state(state);
        let res = app
            .oneshot(
                Request::post("/mood/add/")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("mood=elated&note=hi"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/mood/");
        assert!(res.headers()[header::SET_COOKIE].to_str().unwrap().starts_with("vetmh_flash="));
    }

    #[tokio::test]
    async fn unknown_exercise_goes_back_to_chat() {
        let state = testing::fake();
        let cookie = testing::session_cookie(&state, "sam");
        let app = super::routes().with_state(state);
        let res = app
            .oneshot(
                Request::post("/exercise/complete/")
                    .header(header::COOKIE, cookie)
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("exercise=yoga"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/chat/");
    }

    fn post_form(uri: &str, cookie: &str, body: &'static str) -> Request<Body> {
        Request::post(uri)
            .header(header::COOKIE, cookie)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn adding_twice_in_a_day_rewrites_one_row(pool: sqlx::PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let (state, _) = testing::with_db(pool.clone(), testing::config());
        let cookie = testing::session_cookie_for(&state, user_id, "sam");
        let app = super::routes().with_state(state);

        for body in ["mood=down&note=long+night", "mood=Good&note=coffee+helped"] {
            let res = app.clone().oneshot(post_form("/mood/add/", &cookie, body)).await.unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
            assert_eq!(res.headers()[header::LOCATION], "/mood/");
        }

        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT mood, note FROM mood_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(rows, vec![("good".to_string(), "coffee helped".to_string())]);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn exercise_completion_logs_chat_and_mood(pool: sqlx::PgPool) {
        let user_id = testing::create_user(&pool, "sam").await;
        let (state, _) = testing::with_db(pool.clone(), testing::config());
        let cookie = testing::session_cookie_for(&state, user_id, "sam");

        let res = super::routes()
            .with_state(state)
            .oneshot(post_form("/exercise/complete/", &cookie, "exercise=breathing"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(res.headers()[header::LOCATION], "/chat/");

        let (role, meta): (String, serde_json::Value) =
            sqlx::query_as("SELECT role, meta FROM chat_messages WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(role, "system");
        assert_eq!(meta["exercise_completed"], "breathing");

        let (mood, note): (String, String) =
            sqlx::query_as("SELECT mood, note FROM mood_entries WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(mood, "ok");
        assert!(note.contains("Exercise completed: breathing"));
    }
}
