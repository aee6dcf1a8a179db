use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use tracing::{info, instrument};

use super::{
    dto::{ChatMessageRow, ListParams, LoginEventRow, MoodEntryRow, Page},
    extractors::StaffUser,
    repo,
};
use crate::{
    auth::repo_types::LoginEventKind,
    chat::repo_types::Role,
    error::AppError,
    mood::repo_types::Mood,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/mood-entries", get(list_mood_entries))
        .route("/admin/login-events", get(list_login_events))
        .route("/admin/chat-messages", get(list_chat_messages))
}

/// Validates an optional choice filter against its known values.
fn choice<T>(
    raw: Option<&str>,
    name: &str,
    parse: impl Fn(&str) -> Option<T>,
    as_str: impl Fn(T) -> &'static str,
) -> Result<Option<&'static str>, AppError> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse(v)
            .map(|c| Some(as_str(c)))
            .ok_or_else(|| AppError::BadRequest(format!("unknown {name} {v:?}"))),
    }
}

#[instrument(skip(state, _staff))]
pub async fn list_mood_entries(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<MoodEntryRow>>, AppError> {
    let mood = choice(params.mood.as_deref(), "mood", Mood::parse, Mood::as_str)?;
    let (limit, offset) = (params.limit(), params.offset());
    let items = repo::mood_entries(&state.db, params.pattern().as_deref(), mood, limit, offset).await?;
    info!(count = items.len(), "admin mood entries listed");
    Ok(Json(Page { items, limit, offset }))
}

#[instrument(skip(state, _staff))]
pub async fn list_login_events(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<LoginEventRow>>, AppError> {
    let event = choice(params.event.as_deref(), "event", LoginEventKind::parse, LoginEventKind::as_str)?;
    let (limit, offset) = (params.limit(), params.offset());
    let items = repo::login_events(&state.db, params.pattern().as_deref(), event, limit, offset).await?;
    info!(count = items.len(), "admin login events listed");
    Ok(Json(Page { items, limit, offset }))
}

#[instrument(skip(state, _staff))]
pub async fn list_chat_messages(
    State(state): State<AppState>,
    _staff: StaffUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Page<ChatMessageRow>>, AppError> {
    let role = choice(params.role.as_deref(), "role", Role::parse, Role::as_str)?;
    let (limit, offset) = (params.limit(), params.offset());
    let items = repo::chat_messages(&state.db, params.pattern().as_deref(), role, limit, offset).await?;
    info!(count = items.len(), "admin chat messages listed");
    Ok(Json(Page { items, limit, offset }))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing;

    #[test]
    fn paging_defaults_and_bounds() {
        let p = ListParams::default();
        assert_eq!((p.limit(), p.offset()), (50, 0));
        let p = ListParams { limit: Some(10_000), offset: Some(-3), ..Default::default() };
        assert_eq!((p.limit(), p.offset()), (200, 0));
        let p = ListParams { limit: Some(0), ..Default::default() };
        assert_eq!(p.limit(), 1);
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        let p = ListParams { q: Some(" 50%_off ".into()), ..Default::default() };
        assert_eq!(p.pattern().as_deref(), Some("%50\\%\\_off%"));
        assert_eq!(ListParams { q: Some("  ".into()), ..Default::default() }.pattern(), None);
    }

    #[test]
    fn choice_filters_are_validated() {
        assert_eq!(choice(Some("Anxious"), "mood", Mood::parse, Mood::as_str).unwrap(), Some("anxious"));
        assert_eq!(choice(None, "role", Role::parse, Role::as_str).unwrap(), None);
        assert!(matches!(
            choice(Some("login_failed"), "event", LoginEventKind::parse, LoginEventKind::as_str),
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn anonymous_requests_are_unauthorized() {
        let app = routes().with_state(testing::fake());
        for uri in ["/admin/mood-entries", "/admin/login-events", "/admin/chat-messages"] {
            let res = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn forged_tokens_are_unauthorized() {
        let app = routes().with_state(testing::fake());
        let res = app
            .oneshot(
                Request::get("/admin/login-events")
                    .header(header::AUTHORIZATION, "Bearer not-a-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
