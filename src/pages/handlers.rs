use axum::{
    extract::State,
    response::Response,
    routing::get,
    Router,
};
use minijinja::context;

use crate::{error::AppError, state::AppState, web::Viewer};

/// Pages that are a plain template render: (path, template).
const STATIC_PAGES: &[(&str, &str)] = &[
    ("/", "home.html"),
    ("/about/", "about.html"),
    ("/resources/", "resources.html"),
    ("/feedback/", "feedback.html"),
    ("/vets/", "vets.html"),
    ("/exercise/breathing/", "exercise_breathing.html"),
    ("/exercise/grounding/", "exercise_grounding.html"),
    ("/exercise/sleep/", "exercise_sleep.html"),
];

pub fn routes() -> Router<AppState> {
    STATIC_PAGES
        .iter()
        .fold(Router::new(), |router, &(path, template)| {
            router.route(
                path,
                get(move |State(state): State<AppState>, viewer: Viewer| async move {
                    render_page(state, viewer, template)
                }),
            )
        })
        .route("/health", get(health))
}

fn render_page(state: AppState, viewer: Viewer, template: &str) -> Result<Response, AppError> {
    viewer.render(&state, template, context! {})
}

pub async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing;

    #[tokio::test]
    async fn every_static_page_renders() {
        let state = testing::fake();
        for (path, _) in STATIC_PAGES {
            let res = routes()
                .with_state(state.clone())
                .oneshot(Request::get(*path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{path}");
        }
    }

    #[tokio::test]
    async fn pages_show_who_is_signed_in() {
        let state = testing::fake();
        let cookie = testing::session_cookie(&state, "corporal_k");
        let res = routes()
            .with_state(state)
            .oneshot(
                Request::get("/about/")
                    .header(axum::http::header::COOKIE, cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("corporal_k"));
    }

    #[tokio::test]
    async fn health_is_plain_ok() {
        let res = routes()
            .with_state(testing::fake())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }
}
