use std::net::SocketAddr;

use axum::{
    extract::{Request, State},
    http::{header::HOST, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

use crate::{admin, auth, chat, mood, pages, places, profile, state::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(pages::router())
        .merge(auth::router())
        .merge(profile::router())
        .merge(chat::router())
        .merge(mood::router())
        .merge(places::router())
        .merge(admin::router())
        .layer(middleware::from_fn_with_state(state.clone(), check_host))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

/// Host name without port; bracketed IPv6 literals keep their brackets off.
fn host_name(raw: &str) -> String {
    let raw = raw.trim();
    let host = if let Some(rest) = raw.strip_prefix('[') {
        rest.split(']').next().unwrap_or_default()
    } else {
        raw.rsplit_once(':').map_or(raw, |(h, _)| h)
    };
    host.trim_end_matches('.').to_lowercase()
}

/// `*` allows anything, a leading dot allows the domain and its subdomains.
pub(crate) fn host_allowed(host: &str, allowed: &[String]) -> bool {
    allowed.iter().any(|pattern| {
        if pattern == "*" {
            true
        } else if let Some(domain) = pattern.strip_prefix('.') {
            host == domain || host.ends_with(pattern.as_str())
        } else {
            host == pattern
        }
    })
}

async fn check_host(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| req.uri().authority().map(|a| a.as_str().to_string()))
        .map(|h| host_name(&h));

    match host {
        Some(h) if host_allowed(&h, &state.config.allowed_hosts) => next.run(req).await,
        other => {
            warn!(host = ?other, "rejected request for unknown host");
            (StatusCode::BAD_REQUEST, "Bad Request (invalid host)").into_response()
        }
    }
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::state::testing;

    fn get(uri: &str, host: &str) -> Request {
        axum::http::Request::get(uri)
            .header(HOST, host)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn host_names_drop_ports() {
        assert_eq!(host_name("Localhost:8080"), "localhost");
        assert_eq!(host_name("[::1]:8080"), "::1");
        assert_eq!(host_name("example.org."), "example.org");
    }

    #[test]
    fn host_patterns() {
        let allowed = vec!["localhost".to_string(), ".vetmh.org".to_string()];
        assert!(host_allowed("localhost", &allowed));
        assert!(host_allowed("vetmh.org", &allowed));
        assert!(host_allowed("app.vetmh.org", &allowed));
        assert!(!host_allowed("evilvetmh.org", &allowed));
        assert!(!host_allowed("example.com", &allowed));
        assert!(host_allowed("anything", &["*".to_string()]));
    }

    #[tokio::test]
    async fn home_renders() {
        let res = build_app(testing::fake()).oneshot(get("/", "localhost:8080")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_host_is_rejected() {
        let res = build_app(testing::fake()).oneshot(get("/", "evil.example")).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"Bad Request (invalid host)");
    }

    #[tokio::test]
    async fn login_required_pages_redirect() {
        for (path, location) in [
            ("/chat/", "/login/?next=%2Fchat%2F"),
            ("/mood/", "/login/?next=%2Fmood%2F"),
            ("/profile/", "/login/?next=%2Fprofile%2F"),
        ] {
            let res = build_app(testing::fake()).oneshot(get(path, "localhost")).await.unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER, "{path}");
            assert_eq!(res.headers()[header::LOCATION], location);
        }
    }

    #[tokio::test]
    async fn flash_cookie_is_shown_once_and_cleared() {
        let flashes = crate::web::flash::encode(&[crate::web::Flash::success("Profile updated.")]);
        let req = axum::http::Request::get("/about/")
            .header(HOST, "localhost")
            .header(header::COOKIE, format!("vetmh_flash={flashes}"))
            .body(Body::empty())
            .unwrap();
        let res = build_app(testing::fake()).oneshot(req).await.unwrap();
        let cleared = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cleared.starts_with("vetmh_flash=;"));
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&bytes).contains("Profile updated."));
    }

    #[tokio::test]
    async fn admin_listing_needs_a_session() {
        let res = build_app(testing::fake())
            .oneshot(get("/admin/chat-messages", "localhost"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
